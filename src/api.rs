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

use crate::client::{ClusterSession, Transport};
use crate::config::{ClusterConfig, ConnectionArgs};
use crate::connection::{CommandRunner, LocalCommandRunner};
use crate::error::{CohesityError, Result};
use crate::modules::Task;
use crate::output::{NullOutputHandler, OutputHandler, OutputHandlerRef, RecapData};
use crate::reconcile::{ModuleContext, ReconcileResult, Sleeper, ThreadSleeper};
use crate::tasks::{TaskResponse, TaskStatus};
use crate::util::template::Templar;
use indexmap::IndexMap;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Main API for running cluster modules and task files
pub struct ModuleRunner {
    config: ClusterConfig,
    output_handler: OutputHandlerRef,
    transport: Option<Arc<dyn Transport>>,
    sleeper: Arc<dyn Sleeper>,
    commands: Arc<dyn CommandRunner>,
    sessions: Mutex<IndexMap<String, Arc<ClusterSession>>>,
}

impl ModuleRunner {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            output_handler: Arc::new(NullOutputHandler),
            transport: None,
            sleeper: Arc::new(ThreadSleeper),
            commands: Arc::new(LocalCommandRunner::new()),
            sessions: Mutex::new(IndexMap::new()),
        }
    }

    /// Set a custom output handler
    pub fn with_output_handler(mut self, handler: Arc<dyn OutputHandler>) -> Self {
        self.output_handler = handler;
        self
    }

    /// Use this transport for every session instead of HTTPS.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_commands(mut self, commands: Arc<dyn CommandRunner>) -> Self {
        self.commands = commands;
        self
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// One session per cluster/user/domain, shared by every task of a run.
    fn session(&self, args: &ConnectionArgs) -> Result<Arc<ClusterSession>> {
        let connection = self.config.resolve(args)?;
        let key = connection.session_key();
        let mut sessions = self.sessions.lock()
            .map_err(|_| CohesityError::Other(String::from("session cache lock poisoned")))?;
        if let Some(session) = sessions.get(&key) {
            return Ok(Arc::clone(session));
        }
        let session = Arc::new(ClusterSession::from_connection(&connection, self.transport.clone())?);
        sessions.insert(key, Arc::clone(&session));
        Ok(session)
    }

    fn context(&self, task: &Task) -> Result<ModuleContext> {
        Ok(ModuleContext::new(self.session(&task.connection())?)
            .with_commands(Arc::clone(&self.commands))
            .with_sleeper(Arc::clone(&self.sleeper))
            .with_output_handler(Arc::clone(&self.output_handler))
            .check_mode(self.config.check_mode))
    }

    /// Run a single task and return its result, or the error that failed it.
    pub fn run_task(&self, task: &Task) -> Result<ReconcileResult> {
        let ctx = self.context(task)?;
        task.run(&ctx)
    }

    /// Run a module by name with a JSON argument document.
    pub fn run_module(&self, name: &str, args: Value) -> Result<ReconcileResult> {
        let task = Task::from_module_args(name, args)?;
        self.run_task(&task)
    }

    /// Run tasks in order, stopping at the first failure.
    pub fn run_tasks(&self, source: &str, tasks: &[Task]) -> TaskFileResult {
        self.output_handler.on_run_start(source);
        let mut responses = Vec::with_capacity(tasks.len());
        let mut recap = RecapData::default();
        for task in tasks {
            let module = task.module();
            let target = task.target();
            self.output_handler.on_task_start(module, &target);
            let response = match self.run_task(task) {
                Ok(result) => TaskResponse::from_result(module, &target, &result),
                Err(err) => TaskResponse::failed(module, &target, &err),
            };
            self.output_handler.on_task_result(&response);
            recap.record(response.status);
            let failed = response.status == TaskStatus::Failed;
            responses.push(response);
            if failed {
                break;
            }
        }
        let success = recap.failed == 0;
        self.output_handler.on_recap(recap.clone());
        self.output_handler.on_run_end(source, success);
        TaskFileResult { success, skipped: tasks.len() - responses.len(), responses, recap }
    }

    /// Render a task file against the configured extra vars, parse it and run it.
    pub fn run_task_file(&self, path: &Path) -> Result<TaskFileResult> {
        let tasks = self.load_task_file(path)?;
        Ok(self.run_tasks(&path.display().to_string(), &tasks))
    }

    pub fn load_task_file(&self, path: &Path) -> Result<Vec<Task>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CohesityError::Config(format!("unable to read task file {}: {}", path.display(), e)))?;
        let rendered = Templar::new().render(&path.display().to_string(), &contents, &self.config.extra_vars)?;
        let tasks: Option<Vec<Task>> = serde_yaml::from_str(&rendered)?;
        Ok(tasks.unwrap_or_default())
    }
}

/// Result of a task file run
#[derive(Debug, Clone)]
pub struct TaskFileResult {
    pub success: bool,
    pub responses: Vec<TaskResponse>,
    pub recap: RecapData,
    /// Tasks not attempted because an earlier one failed.
    pub skipped: usize,
}

/// Builder-style API for simpler use cases
pub fn run_task_file(path: &str) -> TaskFileRunnerBuilder {
    TaskFileRunnerBuilder::new(path)
}

pub struct TaskFileRunnerBuilder {
    path: String,
    config: ClusterConfig,
}

impl TaskFileRunnerBuilder {
    fn new(path: &str) -> Self {
        Self { path: path.to_string(), config: ClusterConfig::new().from_env() }
    }

    pub fn cluster(mut self, cluster: &str) -> Self {
        self.config = self.config.cluster(cluster);
        self
    }

    pub fn username(mut self, username: &str) -> Self {
        self.config = self.config.username(username);
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.config = self.config.password(password);
        self
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.config = self.config.domain(domain);
        self
    }

    pub fn insecure(mut self) -> Self {
        self.config = self.config.insecure();
        self
    }

    pub fn extra_vars(mut self, vars: serde_yaml::Value) -> Self {
        self.config = self.config.extra_vars(vars);
        self
    }

    pub fn check_mode(mut self) -> Self {
        self.config = self.config.check_mode(true);
        self
    }

    pub fn run(self) -> Result<TaskFileResult> {
        ModuleRunner::new(self.config).run_task_file(Path::new(&self.path))
    }

    pub fn run_with_output(self, handler: Arc<dyn OutputHandler>) -> Result<TaskFileResult> {
        ModuleRunner::new(self.config)
            .with_output_handler(handler)
            .run_task_file(Path::new(&self.path))
    }
}
