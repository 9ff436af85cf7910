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

use crate::client::ClusterSession;
use crate::connection::{CommandRunner, LocalCommandRunner};
use crate::output::{NullOutputHandler, OutputHandlerRef};
use crate::reconcile::poll::{Sleeper, ThreadSleeper};
use std::sync::Arc;

/// Everything a policy may touch while reconciling. Passed explicitly;
/// there is no process-wide client.
#[derive(Clone)]
pub struct ModuleContext {
    pub session: Arc<ClusterSession>,
    pub commands: Arc<dyn CommandRunner>,
    pub sleeper: Arc<dyn Sleeper>,
    pub output: OutputHandlerRef,
    pub check_mode: bool,
}

impl ModuleContext {
    pub fn new(session: Arc<ClusterSession>) -> Self {
        Self {
            session,
            commands: Arc::new(LocalCommandRunner::new()),
            sleeper: Arc::new(ThreadSleeper),
            output: Arc::new(NullOutputHandler),
            check_mode: false,
        }
    }

    pub fn with_commands(mut self, commands: Arc<dyn CommandRunner>) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_output_handler(mut self, output: OutputHandlerRef) -> Self {
        self.output = output;
        self
    }

    pub fn check_mode(mut self, check: bool) -> Self {
        self.check_mode = check;
        self
    }
}
