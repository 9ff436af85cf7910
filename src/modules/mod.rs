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

pub mod agent;
pub mod clone_vm;
pub mod common;
pub mod facts;
pub mod job;
pub mod license;
pub mod policy;
pub mod restore;
pub mod source;
pub mod view;
pub mod virtual_cluster;

use crate::config::ConnectionArgs;
use crate::error::{CohesityError, Result};
use crate::reconcile::{reconcile, ModuleContext, ReconcileResult, ResourcePolicy};
use serde::Deserialize;
use serde_json::Value;

pub const MODULE_NAMES: [&str; 10] = [
    agent::MODULE,
    source::MODULE,
    job::MODULE,
    restore::MODULE,
    clone_vm::MODULE,
    virtual_cluster::MODULE,
    view::MODULE,
    policy::MODULE,
    license::MODULE,
    facts::MODULE,
];

/// One module invocation as written in a task file, e.g.
/// `- !cohesity_job { name: nightly, state: started }`.
#[derive(Deserialize, Debug, Clone)]
pub enum Task {
    #[serde(rename = "cohesity_agent")]
    Agent(agent::AgentTask),
    #[serde(rename = "cohesity_source")]
    Source(source::SourceTask),
    #[serde(rename = "cohesity_job")]
    Job(job::JobTask),
    #[serde(rename = "cohesity_restore")]
    Restore(restore::RestoreTask),
    #[serde(rename = "cohesity_clone_vm")]
    CloneVm(clone_vm::CloneVmTask),
    #[serde(rename = "cohesity_virtual_cluster")]
    VirtualCluster(virtual_cluster::VirtualClusterTask),
    #[serde(rename = "cohesity_view")]
    View(view::ViewTask),
    #[serde(rename = "cohesity_policy")]
    Policy(policy::PolicyTask),
    #[serde(rename = "cohesity_license")]
    License(license::LicenseTask),
    #[serde(rename = "cohesity_facts")]
    Facts(facts::FactsTask),
}

impl Task {
    /// Build a task from a module name and its argument document.
    pub fn from_module_args(name: &str, args: Value) -> Result<Self> {
        if !MODULE_NAMES.contains(&name) {
            return Err(CohesityError::Parameter(format!(
                "unknown module '{}', expected one of: {}", name, MODULE_NAMES.join(", ")
            )));
        }
        let args = if args.is_null() { Value::Object(Default::default()) } else { args };
        let mut tagged = serde_json::Map::new();
        tagged.insert(name.to_string(), args);
        serde_json::from_value(Value::Object(tagged))
            .map_err(|e| CohesityError::Parameter(format!("invalid arguments for {}: {}", name, e)))
    }

    pub fn module(&self) -> &'static str {
        match self {
            Task::Agent(_) => agent::MODULE,
            Task::Source(_) => source::MODULE,
            Task::Job(_) => job::MODULE,
            Task::Restore(_) => restore::MODULE,
            Task::CloneVm(_) => clone_vm::MODULE,
            Task::VirtualCluster(_) => virtual_cluster::MODULE,
            Task::View(_) => view::MODULE,
            Task::Policy(_) => policy::MODULE,
            Task::License(_) => license::MODULE,
            Task::Facts(_) => facts::MODULE,
        }
    }

    pub fn target(&self) -> String {
        match self {
            Task::Agent(t) => t.evaluate().target(),
            Task::Source(t) => t.evaluate().target(),
            Task::Job(t) => t.evaluate().target(),
            Task::Restore(t) => t.evaluate().target(),
            Task::CloneVm(t) => t.evaluate().target(),
            Task::VirtualCluster(t) => t.evaluate().target(),
            Task::View(t) => t.evaluate().target(),
            Task::Policy(t) => t.evaluate().target(),
            Task::License(t) => t.evaluate().target(),
            Task::Facts(t) => t.evaluate().target(),
        }
    }

    pub fn connection(&self) -> ConnectionArgs {
        match self {
            Task::Agent(t) => t.connection(),
            Task::Source(t) => t.connection(),
            Task::Job(t) => t.connection(),
            Task::Restore(t) => t.connection(),
            Task::CloneVm(t) => t.connection(),
            Task::VirtualCluster(t) => t.connection(),
            Task::View(t) => t.connection(),
            Task::Policy(t) => t.connection(),
            Task::License(t) => t.connection(),
            Task::Facts(t) => t.connection(),
        }
    }

    /// Reconcile the task. A terminal error reported by the cluster comes
    /// back as `Err`, like any other failure.
    pub fn run(&self, ctx: &ModuleContext) -> Result<ReconcileResult> {
        let result = match self {
            Task::Agent(t) => reconcile(&t.evaluate(), ctx),
            Task::Source(t) => reconcile(&t.evaluate(), ctx),
            Task::Job(t) => reconcile(&t.evaluate(), ctx),
            Task::Restore(t) => reconcile(&t.evaluate(), ctx),
            Task::CloneVm(t) => reconcile(&t.evaluate(), ctx),
            Task::VirtualCluster(t) => reconcile(&t.evaluate(), ctx),
            Task::View(t) => reconcile(&t.evaluate(), ctx),
            Task::Policy(t) => reconcile(&t.evaluate(), ctx),
            Task::License(t) => reconcile(&t.evaluate(), ctx),
            Task::Facts(t) => reconcile(&t.evaluate(), ctx),
        }?;
        result.into_outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_module_args() {
        let task = Task::from_module_args("cohesity_job", json!({"name": "nightly", "state": "started"})).unwrap();
        assert_eq!(task.module(), "cohesity_job");
        assert_eq!(task.target(), "nightly");
    }

    #[test]
    fn test_restore_target_names_job_and_task() {
        let task = Task::from_module_args(
            "cohesity_restore",
            json!({"name": "etc", "job_name": "nightly", "endpoint": "web01", "file_names": ["/etc/hosts"]}),
        ).unwrap();
        assert_eq!(task.module(), "cohesity_restore");
        assert_eq!(task.target(), "nightly: etc");
    }

    #[test]
    fn test_unknown_module_is_rejected() {
        let err = Task::from_module_args("cohesity_bogus", json!({})).unwrap_err();
        assert!(err.to_string().contains("unknown module 'cohesity_bogus'"));
    }

    #[test]
    fn test_unknown_argument_is_rejected() {
        let err = Task::from_module_args("cohesity_license", json!({"license_key": "X", "colour": "red"})).unwrap_err();
        assert!(matches!(err, CohesityError::Parameter(_)));
    }

    #[test]
    fn test_tagged_task_list() {
        let yaml = "- !cohesity_facts {}\n- !cohesity_view\n  name: backups\n  storage_domain: DefaultStorageDomain\n  case_insensitive: false\n";
        let tasks: Vec<Task> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].target(), "backups");
        assert_eq!(tasks[0].connection(), ConnectionArgs::default());
    }
}
