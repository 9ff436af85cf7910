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

use crate::reconcile::{OperationRequest, ResourceKind};
use crate::tasks::response::{TaskResponse, TaskStatus};
use inline_colorization::{color_green, color_red, color_reset, color_yellow};
use std::sync::Arc;

/// Trait for handling output from module runs
pub trait OutputHandler: Send + Sync {
    fn on_run_start(&self, _source: &str) {}
    fn on_run_end(&self, _source: &str, _success: bool) {}

    fn on_task_start(&self, _module: &str, _target: &str) {}
    fn on_task_result(&self, _response: &TaskResponse) {}

    fn on_probe(&self, kind: ResourceKind, target: &str, status: &str) {
        self.debug(&format!("{} '{}' is {}", kind, target, status));
    }

    fn on_submit(&self, request: &OperationRequest) {
        self.info(&format!("submitting {} of {} '{}'", request.action, request.kind, request.target));
    }

    fn on_poll_attempt(&self, kind: ResourceKind, target: &str, attempt: u32, max_attempts: u32, status: &str) {
        self.debug(&format!("{} '{}' poll {}/{}: {}", kind, target, attempt, max_attempts, status));
    }

    fn on_recap(&self, _recap: RecapData) {}

    fn log(&self, level: LogLevel, message: &str);
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }
    fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecapData {
    pub ok: usize,
    pub changed: usize,
    pub failed: usize,
}

impl RecapData {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Failed => self.failed += 1,
            s if s.is_changed() => self.changed += 1,
            _ => self.ok += 1,
        }
    }
}

/// A no-op output handler for when output is not needed
pub struct NullOutputHandler;

impl OutputHandler for NullOutputHandler {
    fn on_probe(&self, _kind: ResourceKind, _target: &str, _status: &str) {}
    fn on_submit(&self, _request: &OperationRequest) {}
    fn on_poll_attempt(&self, _kind: ResourceKind, _target: &str, _attempt: u32, _max_attempts: u32, _status: &str) {}
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Terminal output with banners per task and a recap at the end
pub struct TerminalOutputHandler {
    pub verbosity: u32,
}

impl TerminalOutputHandler {
    pub fn new(verbosity: u32) -> Self {
        Self { verbosity }
    }
}

impl OutputHandler for TerminalOutputHandler {
    fn on_run_start(&self, source: &str) {
        crate::util::terminal::banner(&format!("TASKS: {}", source));
        println!();
    }

    fn on_run_end(&self, _source: &str, success: bool) {
        if !success {
            println!("\n{color_red}RUN FAILED{color_reset}");
        }
    }

    fn on_task_start(&self, module: &str, target: &str) {
        println!();
        crate::util::terminal::banner(&format!("TASK: {} => {}", module, target));
    }

    fn on_task_result(&self, response: &TaskResponse) {
        let status = match response.status {
            TaskStatus::Failed => format!("{color_red}FAILED{color_reset}"),
            TaskStatus::NeedsCreation | TaskStatus::NeedsRemoval | TaskStatus::NeedsModification
                | TaskStatus::NeedsStart | TaskStatus::NeedsStop => format!("{color_yellow}WOULD CHANGE{color_reset}"),
            s if s.is_changed() => format!("{color_yellow}CHANGED{color_reset}"),
            _ => format!("{color_green}OK{color_reset}"),
        };
        println!("{} => {}", status, response.target);

        if self.verbosity > 0 || response.status == TaskStatus::Failed {
            if let Some(msg) = &response.msg {
                println!("  {}", msg);
            }
            if let Some(details) = &response.error_details {
                println!("  {}", details);
            }
        }
    }

    fn on_recap(&self, recap: RecapData) {
        println!();
        crate::util::terminal::banner(&String::from("RECAP"));
        println!("ok={} changed={} failed={}", recap.ok, recap.changed, recap.failed);
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug if self.verbosity >= 3 => println!("DEBUG: {}", message),
            LogLevel::Info if self.verbosity >= 1 => println!("INFO: {}", message),
            LogLevel::Warning => println!("WARNING: {}", message),
            LogLevel::Error => eprintln!("ERROR: {}", message),
            _ => {}
        }
    }
}

/// Thread-safe wrapper for output handlers
pub type OutputHandlerRef = Arc<dyn OutputHandler>;
