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

//! The async-operation reconciler.
//!
//! Every module reduces to the same shape: probe the current status, let the
//! gate decide whether anything needs doing, submit exactly one mutating
//! call, then poll until the operation reaches a terminal state or the wait
//! budget runs out. The per-resource differences live in a
//! [`ResourcePolicy`]; [`reconcile`] is the one driver that runs them.

pub mod context;
pub mod driver;
pub mod gate;
pub mod policy;
pub mod poll;
pub mod result;
pub mod state;

pub use context::ModuleContext;
pub use driver::reconcile;
pub use gate::Gate;
pub use policy::{Outcome, ResourcePolicy, Submission};
pub use poll::{poll_until_terminal, OnTimeout, PollOutcome, PollPlan, Sleeper, Terminal, ThreadSleeper};
pub use result::ReconcileResult;
pub use state::{Classification, DesiredState, OperationRequest, ResourceKind, StatusSnapshot, StatusValue};
