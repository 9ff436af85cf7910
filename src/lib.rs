// Jetpack
// Copyright (C) Riff Labs Limited <team@riff.cc>
// Based on Jetporch by Michael DeHaan <michael@michaeldehaan.net> + contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// long with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Idempotent lifecycle automation for Cohesity clusters.
//!
//! Each module brings one cluster resource (an agent, a protection job, a
//! restore, a view...) to a declared state through the shared reconciler in
//! [`reconcile`]. [`ModuleRunner`] runs single modules or whole task files.

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod modules;
pub mod output;
pub mod reconcile;
pub mod tasks;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod util;

// Re-export commonly used types for library users
pub use api::{run_task_file, ModuleRunner, TaskFileResult, TaskFileRunnerBuilder};
pub use config::{ClusterConfig, ConnectionArgs};
pub use error::{CohesityError, Result};
pub use modules::Task;
pub use output::{LogLevel, NullOutputHandler, OutputHandler, OutputHandlerRef, RecapData, TerminalOutputHandler};
pub use reconcile::{reconcile, ReconcileResult};
pub use tasks::{TaskResponse, TaskStatus};
