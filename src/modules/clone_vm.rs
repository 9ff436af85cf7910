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

use crate::client::models::ProtectionJob;
use crate::client::Method;
use crate::config::ConnectionArgs;
use crate::error::{CohesityError, Result};
use crate::modules::common::{self, connection_args, Environment, TaskPhase};
use crate::reconcile::{
    DesiredState, ModuleContext, OnTimeout, Outcome, PollPlan, ResourceKind, ResourcePolicy, StatusSnapshot,
    Submission, Terminal,
};
use crate::tasks::TaskRequestType;
use serde::Deserialize;
use serde_json::json;

pub const MODULE: &str = "cohesity_clone_vm";

const CLONE_TASK_TYPE: &str = "kCloneVMs";
const POLL_SECS: u64 = 90;

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct CloneVmTask {
    pub name: String,
    #[serde(default)]
    pub state: DesiredState,
    #[serde(default)]
    pub job_name: String,
    #[serde(default)]
    pub view_name: String,
    pub backup_timestamp: Option<String>,
    #[serde(default = "vmware")]
    pub environment: Environment,
    #[serde(default)]
    pub vm_names: Vec<String>,
    #[serde(default = "yes")]
    pub wait_for_job: bool,
    #[serde(default = "thirty")]
    pub wait_minutes: u64,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    #[serde(default = "yes")]
    pub power_on: bool,
    #[serde(default = "yes")]
    pub network_connected: bool,
    pub resource_pool: Option<String>,
    pub cluster: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub validate_certs: Option<bool>,
}

fn vmware() -> Environment {
    Environment::VMware
}

fn yes() -> bool {
    true
}

fn thirty() -> u64 {
    30
}

impl CloneVmTask {
    pub fn connection(&self) -> ConnectionArgs {
        connection_args!(self)
    }

    pub fn evaluate(&self) -> CloneVmAction {
        CloneVmAction { args: self.clone() }
    }
}

#[derive(Debug, Clone)]
pub struct CloneVmAction {
    args: CloneVmTask,
}

impl CloneVmAction {
    fn clone_objects(&self, ctx: &ModuleContext, job: &ProtectionJob) -> Result<Vec<serde_json::Value>> {
        let at = self.args.backup_timestamp.as_deref().map(common::parse_backup_timestamp).transpose()?;
        let job_id = job.id.unwrap_or_default();
        let mut objects = Vec::new();
        for vm in &self.args.vm_names {
            let info = common::vm_snapshots(&ctx.session, vm, job_id)?
                .ok_or_else(|| CohesityError::NotFound(format!("There are no existing snapshots for {}", vm)))?;
            let version = common::pick_version(&info, at).ok_or_else(|| {
                CohesityError::NotFound(format!(
                    "Failed to get the snapshot of {} backed up at {}",
                    vm,
                    self.args.backup_timestamp.as_deref().unwrap_or_default()
                ))
            })?;
            objects.push(common::snapshot_object(job, &info, version));
        }
        Ok(objects)
    }

    fn resource_pool_id(&self, ctx: &ModuleContext, parent: u64) -> Result<u64> {
        let pool = self.args.resource_pool.as_deref().unwrap_or_default();
        let tree = common::source_tree(&ctx.session, parent, Some("kVirtualMachine"))?;
        common::find_typed_node(&tree, pool, "kResourcePool")
            .first()
            .copied()
            .ok_or_else(|| CohesityError::NotFound(format!("Failed to find the resource pool {}", pool)))
    }

    fn create(&self, ctx: &ModuleContext) -> Result<Submission> {
        let job = common::require_job(&ctx.session, &self.args.job_name, self.args.environment)?;
        let parent = job.parent_source_id
            .ok_or_else(|| CohesityError::NotFound(format!("The protection job {} has no parent source", self.args.job_name)))?;
        let objects = self.clone_objects(ctx, &job)?;

        let mut vmware = json!({
            "poweredOn": self.args.power_on,
            "disableNetwork": !self.args.network_connected,
            "resourcePoolId": self.resource_pool_id(ctx, parent)?,
        });
        if let Some(prefix) = self.args.prefix.as_ref().filter(|p| !p.is_empty()) {
            vmware["prefix"] = json!(prefix);
        }
        if let Some(suffix) = self.args.suffix.as_ref().filter(|s| !s.is_empty()) {
            vmware["suffix"] = json!(suffix);
        }
        let body = json!({
            "name": self.args.name,
            "type": CLONE_TASK_TYPE,
            "objects": objects,
            "newParentId": parent,
            "targetViewName": self.args.view_name,
            "vmwareParameters": vmware,
        });
        let task: crate::client::models::RestoreTask = ctx.session.post("/public/restore/clone", &body)?;
        let id = task.id.ok_or_else(|| CohesityError::Other(String::from("Failed to clone VMs")))?;
        Ok(Submission::new().with_id(id).with_data("task_name", json!(self.args.name)))
    }

    fn destroy(&self, ctx: &ModuleContext, id: &str) -> Result<Submission> {
        let response = ctx.session.execute(Method::Delete, &format!("/public/restore/clone/{}", id), None)?;
        if response.is_success() {
            return Ok(Submission::new().with_id(id).with_data("task_name", json!(self.args.name)));
        }
        let message = response.server_message();
        if message.contains("destroyed") {
            return Ok(Submission::unchanged("Cohesity clone task is already destroyed").with_id(id));
        }
        Err(CohesityError::Http { status: response.status, message })
    }
}

impl ResourcePolicy for CloneVmAction {
    type Status = TaskPhase;

    fn kind(&self) -> ResourceKind {
        ResourceKind::CloneTask
    }

    fn target(&self) -> String {
        self.args.name.clone()
    }

    fn desired(&self) -> DesiredState {
        self.args.state
    }

    fn validate(&self) -> Result<()> {
        common::require(&self.args.name, "name")?;
        match self.args.state {
            DesiredState::Present => {
                if self.args.environment != Environment::VMware {
                    return Err(CohesityError::Parameter(String::from("clones are only supported for the VMware environment")));
                }
                common::require(&self.args.job_name, "job_name")?;
                common::require(&self.args.view_name, "view_name")?;
                common::require(self.args.resource_pool.as_deref().unwrap_or_default(), "resource_pool")?;
                if self.args.vm_names.is_empty() {
                    return Err(CohesityError::Parameter(String::from("vm_names must name at least one VM")));
                }
                if let Some(ts) = &self.args.backup_timestamp {
                    common::parse_backup_timestamp(ts)?;
                }
                Ok(())
            }
            DesiredState::Absent => Ok(()),
            other => Err(CohesityError::Parameter(format!("state must be present or absent, not {}", other))),
        }
    }

    fn probe(&self, ctx: &ModuleContext) -> Result<StatusSnapshot<TaskPhase>> {
        let task = common::find_restore_task(&ctx.session, CLONE_TASK_TYPE, &self.args.name)?;
        Ok(common::task_snapshot(task))
    }

    fn submit(&self, ctx: &ModuleContext, action: TaskRequestType, snapshot: &StatusSnapshot<TaskPhase>) -> Result<Submission> {
        match action {
            TaskRequestType::Create => self.create(ctx),
            TaskRequestType::Remove => {
                let id = snapshot.id.as_deref()
                    .ok_or_else(|| CohesityError::NotFound(String::from("Cohesity clone task doesn't exist")))?;
                self.destroy(ctx, id)
            }
            other => Err(CohesityError::Other(format!("clone tasks do not support {}", other))),
        }
    }

    fn poll_plan(&self, action: TaskRequestType) -> Option<PollPlan> {
        if action == TaskRequestType::Create && self.args.wait_for_job {
            return Some(PollPlan::new(POLL_SECS, self.args.wait_minutes, OnTimeout::Accept));
        }
        None
    }

    fn poll_probe(&self, ctx: &ModuleContext, _action: TaskRequestType, submission: &Submission) -> Result<StatusSnapshot<TaskPhase>> {
        let id = submission.id.as_deref().unwrap_or_default();
        Ok(common::task_snapshot(common::fetch_task(&ctx.session, id)?))
    }

    fn terminal(&self, _action: TaskRequestType, snapshot: &StatusSnapshot<TaskPhase>) -> Terminal {
        common::task_terminal(snapshot)
    }

    fn message(&self, outcome: Outcome, _status: Option<&TaskPhase>) -> String {
        let msg = match outcome {
            Outcome::Unchanged if self.args.state == DesiredState::Absent => "Cohesity clone task doesn't exist",
            Outcome::Unchanged => "The clone task with specified name is already present",
            Outcome::WouldChange(TaskRequestType::Remove) => "Cohesity clone task is present. This action would tear down the Cohesity Clone.",
            Outcome::WouldChange(_) => "Cohesity clone task doesn't exist. This action would clone VMs",
            Outcome::Submitted(TaskRequestType::Remove) | Outcome::Completed(TaskRequestType::Remove) => "Cohesity clone is destroyed",
            Outcome::Submitted(_) => "The clone VMs request is accepted",
            Outcome::Completed(_) => "The clone VMs task is successful",
            Outcome::Accepted(_) | Outcome::TimedOut(_) => "The clone VMs request is accepted. The task is not finished in the wait time",
            Outcome::Failed(_) => "The clone VMs task failed",
        };
        msg.to_string()
    }
}
