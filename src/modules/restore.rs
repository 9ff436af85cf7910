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

//! File, VM and Oracle database restores.
//!
//! A restore task is created once and never removed; any task already
//! carrying the requested name satisfies the request.

use crate::client::models::{self, FileSearchResult, FileSnapshotInformation, SnapshotVersion, VmSearchResult};
use crate::client::with_query;
use crate::config::ConnectionArgs;
use crate::error::{CohesityError, Result};
use crate::modules::common::{self, connection_args, Environment, TaskPhase};
use crate::reconcile::{
    DesiredState, ModuleContext, OnTimeout, Outcome, PollPlan, ResourceKind, ResourcePolicy, StatusSnapshot,
    Submission, Terminal,
};
use crate::tasks::TaskRequestType;
use serde::Deserialize;
use serde_json::{json, Value};

pub const MODULE: &str = "cohesity_restore";

const POLL_SECS: u64 = 30;
const FILES_WAIT_MINUTES: u64 = 10;
const VMS_WAIT_MINUTES: u64 = 20;
const ORACLE_WAIT_MINUTES: u64 = 30;
const ORACLE_FAILED: &str = "Error occured during task recovery.";

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RestoreType {
    #[default]
    Files,
    Vms,
    Oracle,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RestoreTask {
    pub name: String,
    #[serde(default)]
    pub state: DesiredState,
    #[serde(default)]
    pub restore_type: RestoreType,
    pub environment: Option<Environment>,
    #[serde(default)]
    pub job_name: String,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub file_names: Vec<String>,
    #[serde(default)]
    pub vm_names: Vec<String>,
    pub backup_timestamp: Option<String>,
    #[serde(default = "yes")]
    pub wait_for_job: bool,
    pub wait_minutes: Option<u64>,
    #[serde(default = "yes")]
    pub overwrite: bool,
    #[serde(default = "yes")]
    pub preserve_attributes: bool,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub file_based: bool,
    pub restore_location: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    #[serde(default = "yes")]
    pub power_on: bool,
    #[serde(default = "yes")]
    pub network_connected: bool,
    pub restore_to_source: Option<String>,
    pub resource_pool: Option<String>,
    pub datastore: Option<String>,
    pub vm_name: Option<String>,
    pub vm_username: Option<String>,
    pub vm_password: Option<String>,
    pub source_db: Option<String>,
    pub source_server: Option<String>,
    pub target_db: Option<String>,
    pub target_server: Option<String>,
    pub oracle_home: Option<String>,
    pub oracle_base: Option<String>,
    #[serde(default = "fra_size_mb")]
    pub fra_size_mb: u64,
    #[serde(default)]
    pub clone_app_view: bool,
    pub cluster: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub validate_certs: Option<bool>,
}

fn yes() -> bool {
    true
}

fn fra_size_mb() -> u64 {
    2048
}

impl RestoreTask {
    pub fn connection(&self) -> ConnectionArgs {
        connection_args!(self)
    }

    pub fn evaluate(&self) -> RestoreAction {
        let environment = match self.restore_type {
            RestoreType::Files => self.environment.unwrap_or(Environment::PhysicalFiles),
            RestoreType::Vms => self.environment.unwrap_or(Environment::VMware),
            RestoreType::Oracle => Environment::Oracle,
        };
        let wait_minutes = self.wait_minutes.unwrap_or(match self.restore_type {
            RestoreType::Files => FILES_WAIT_MINUTES,
            RestoreType::Vms => VMS_WAIT_MINUTES,
            RestoreType::Oracle => ORACLE_WAIT_MINUTES,
        });
        let task_name = match self.restore_type {
            RestoreType::Oracle => self.name.clone(),
            _ => format!("{}: {}", self.job_name, self.name),
        };
        RestoreAction {
            args: self.clone(),
            task_name,
            environment,
            wait_minutes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestoreAction {
    args: RestoreTask,
    pub task_name: String,
    pub environment: Environment,
    pub wait_minutes: u64,
}

/// `C:\a\b` becomes `/C/a/b`; paths already in `/C/a/b` form pass through.
pub fn convert_windows_path(filename: &str) -> Result<String> {
    if filename.contains('\\') && !filename.contains(':') {
        return Err(CohesityError::Parameter(String::from(
            "Windows Based files must be in /Drive/path/to/file or Drive:\\path\\to\\file format.",
        )));
    }
    let (drive, path) = match filename.split_once(':') {
        Some((drive, path)) => (format!("/{}", drive), path),
        None => (String::new(), filename),
    };
    Ok(format!("{}{}", drive, path.replace("\\\\", "/").replace('\\', "/")))
}

fn strip_mount_prefix(prefix: &str, path: &str) -> String {
    path.strip_prefix(prefix).unwrap_or(path).to_string()
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    let value = value.as_deref().unwrap_or_default();
    common::require(value, field)?;
    Ok(value)
}

impl RestoreAction {
    fn task_type(&self) -> &'static str {
        match self.args.restore_type {
            RestoreType::Files => "kRestoreFiles",
            RestoreType::Vms => "kRecoverVMs",
            RestoreType::Oracle if self.args.clone_app_view => "kCloneAppView",
            RestoreType::Oracle => "kRecoverApp",
        }
    }

    fn restore_paths(&self) -> Result<Vec<String>> {
        let endpoint = self.args.endpoint.as_deref().unwrap_or_default();
        self.args.file_names.iter()
            .map(|file| match self.environment {
                Environment::GenericNas => Ok(strip_mount_prefix(endpoint, file)),
                Environment::VMware => Ok(file.clone()),
                _ => convert_windows_path(file),
            })
            .collect()
    }

    fn backup_minute(&self) -> Result<Option<i64>> {
        self.args.backup_timestamp.as_deref().map(common::parse_backup_timestamp).transpose()
    }

    fn job(&self, ctx: &ModuleContext) -> Result<models::ProtectionJob> {
        common::find_job(&ctx.session, &self.args.job_name, self.environment)?
            .ok_or_else(|| CohesityError::NotFound(String::from("Failed to find chosen Job name for the selected Environment Type.")))
    }

    fn file_snapshot(&self, ctx: &ModuleContext, job: &models::ProtectionJob, source_id: u64, file: &str, at: Option<i64>) -> Result<SnapshotVersion> {
        let uid = job.uid.clone().unwrap_or_default();
        let path = with_query("/public/restore/files/snapshotsInformation", &[
            ("jobId", job.id.unwrap_or_default().to_string()),
            ("clusterId", uid.cluster_id.to_string()),
            ("clusterIncarnationId", uid.cluster_incarnation_id.to_string()),
            ("sourceId", source_id.to_string()),
            ("filename", file.to_string()),
        ]);
        let listing: Option<Vec<FileSnapshotInformation>> = ctx.session.get(&path)?;
        let snapshots = listing.unwrap_or_default().into_iter().filter_map(|info| info.snapshot);
        let chosen = match at {
            Some(minute) => snapshots.into_iter().find(|s| common::started_in_minute(s.started_time_usecs, minute)),
            None => snapshots.max_by_key(|s| s.started_time_usecs),
        };
        chosen.ok_or_else(|| CohesityError::NotFound(format!("No snapshot exists for the file {}", file)))
    }

    fn submit_files(&self, ctx: &ModuleContext) -> Result<models::RestoreTask> {
        if self.environment == Environment::VMware {
            return self.submit_vmware_files(ctx);
        }
        let job = self.job(ctx)?;
        let endpoint = self.args.endpoint.as_deref().unwrap_or_default();
        let source_env = if self.environment == Environment::GenericNas { Environment::GenericNas } else { Environment::Physical };
        let source_id = common::find_source_id(&ctx.session, source_env, endpoint)?
            .ok_or_else(|| CohesityError::NotFound(String::from("Failed to find the endpoint on the cluster")))?;

        let at = self.backup_minute()?;
        let mut chosen: Option<SnapshotVersion> = None;
        for file in &self.args.file_names {
            let snapshot = self.file_snapshot(ctx, &job, source_id, file, at)?;
            chosen.get_or_insert(snapshot);
        }
        let snapshot = chosen.ok_or_else(|| CohesityError::Parameter(String::from("file_names must name at least one file")))?;

        let mut body = json!({
            "name": self.task_name,
            "filenames": self.restore_paths()?,
            "targetSourceId": source_id,
            "sourceObjectInfo": {
                "jobId": job.id,
                "jobUid": job.uid,
                "jobRunId": snapshot.job_run_id,
                "protectionSourceId": source_id,
                "startedTimeUsecs": snapshot.started_time_usecs,
            },
            "isFileBasedVolumeRestore": self.args.file_based,
            "overwrite": self.args.overwrite,
            "preserveAttributes": self.args.preserve_attributes,
            "continueOnError": self.args.continue_on_error,
        });
        if let Some(location) = &self.args.restore_location {
            body["newBaseDirectory"] = json!(location);
        }
        ctx.session.post("/public/restore/files", &body)
    }

    fn submit_vms(&self, ctx: &ModuleContext) -> Result<models::RestoreTask> {
        let job = self.job(ctx)?;
        let job_id = job.id.unwrap_or_default();
        let at = self.backup_minute()?;

        let mut objects = Vec::new();
        for vm in &self.args.vm_names {
            let info = common::vm_snapshots(&ctx.session, vm, job_id)?
                .ok_or_else(|| CohesityError::NotFound(String::from("Failed to find a snapshot on the cluster")))?;
            let version = common::pick_version(&info, at)
                .ok_or_else(|| CohesityError::NotFound(format!("No Snapshot Found for the VM: {}", vm)))?;
            objects.push(common::snapshot_object(&job, &info, version));
        }

        let mut vmware = json!({
            "poweredOn": self.args.power_on,
            "disableNetwork": !self.args.network_connected,
        });
        if let Some(prefix) = &self.args.prefix {
            vmware["prefix"] = json!(prefix);
        }
        if let Some(suffix) = &self.args.suffix {
            vmware["suffix"] = json!(suffix);
        }
        let mut body = json!({
            "name": self.task_name,
            "type": "kRecoverVMs",
            "objects": objects,
        });
        if let Some(target) = &self.args.restore_to_source {
            let (parent, pool, datastore) = self.new_location(ctx, target)?;
            body["newParentId"] = json!(parent);
            vmware["resourcePoolId"] = json!(pool);
            vmware["datastoreId"] = json!(datastore);
        }
        body["vmwareParameters"] = vmware;
        ctx.session.post("/public/restore/recover", &body)
    }

    /// Files out of a VMware VM backup, restored into the running guest.
    fn submit_vmware_files(&self, ctx: &ModuleContext) -> Result<models::RestoreTask> {
        let endpoint = self.args.endpoint.as_deref().unwrap_or_default();
        let vm_name = self.args.vm_name.as_deref().unwrap_or_default();

        let vcenter = common::root_nodes(&ctx.session, Environment::VMware)?
            .into_iter()
            .find(|source| source.name == endpoint)
            .map(|source| source.id)
            .ok_or_else(|| CohesityError::NotFound(format!("Vcenter '{}' is not registered to the cluster", endpoint)))?;

        let path = with_query("/public/protectionSources/virtualMachines", &[
            ("vCenterId", vcenter.to_string()),
            ("names", vm_name.to_string()),
        ]);
        let vms: Option<Vec<models::ProtectionSource>> = ctx.session.get(&path)?;
        let vm = vms.unwrap_or_default()
            .into_iter()
            .find(|vm| vm.name == vm_name)
            .map(|vm| vm.id)
            .ok_or_else(|| CohesityError::NotFound(format!(
                "Virtual machine '{}' is not protected on vCenter '{}'", vm_name, endpoint
            )))?;

        let mut source: Option<(u64, u64)> = None;
        for file in &self.args.file_names {
            let path = with_query("/public/restore/files", &[
                ("environments", Environment::VMware.code().to_string()),
                ("search", file.to_string()),
                ("sourceIds", vm.to_string()),
            ]);
            let found: Option<FileSearchResult> = ctx.session.get(&path)?;
            let files = found.map(|f| f.files).unwrap_or_default();
            if files.is_empty() {
                return Err(CohesityError::NotFound(format!("File '{}' is not available to restore", file)));
            }
            let hit = files.iter()
                .find(|f| f.filename == *file && f.protection_source.as_ref().map(|s| s.name.as_str()) == Some(vm_name))
                .ok_or_else(|| CohesityError::NotFound(format!(
                    "File '{}' is not available in virtual machine '{}' to restore", file, vm_name
                )))?;
            source.get_or_insert((hit.job_id.unwrap_or_default(), hit.source_id.unwrap_or(vm)));
        }
        let (job_id, source_id) = source
            .ok_or_else(|| CohesityError::Parameter(String::from("file_names must name at least one file")))?;

        let (run_id, started) = common::find_run(&ctx.session, job_id, self.backup_minute()?)?
            .ok_or_else(|| CohesityError::NotFound(String::from("Run details not available")))?;

        let mut body = json!({
            "name": self.task_name,
            "filenames": self.restore_paths()?,
            "targetSourceId": vm,
            "targetParentSourceId": vcenter,
            "sourceObjectInfo": {
                "jobId": job_id,
                "protectionSourceId": source_id,
                "environment": Environment::VMware.code(),
                "jobRunId": run_id,
                "startedTimeUsecs": started,
            },
            "overwrite": self.args.overwrite,
            "preserveAttributes": self.args.preserve_attributes,
            "username": self.args.vm_username,
            "password": self.args.vm_password,
        });
        if let Some(location) = &self.args.restore_location {
            body["newBaseDirectory"] = json!(location);
        }
        ctx.session.post("/public/restore/files", &body)
    }

    /// The newest indexed copy of the source database on the source server.
    fn oracle_database(&self, ctx: &ModuleContext) -> Result<models::VmDocument> {
        let source_db = self.args.source_db.as_deref().unwrap_or_default();
        let source_server = self.args.source_server.as_deref().unwrap_or_default();
        let path = with_query("/searchvms", &[
            ("entityTypes", Environment::Oracle.code().to_string()),
            ("vmName", source_db.to_string()),
        ]);
        let found: Option<VmSearchResult> = ctx.session.get(&path)?;
        let hits = found.map(|f| f.vms).unwrap_or_default();
        if hits.is_empty() {
            return Err(CohesityError::NotFound(format!("Source database {} not available.", source_db)));
        }
        hits.into_iter()
            .map(|hit| hit.vm_document)
            .filter(|doc| doc.object_aliases.iter().any(|alias| alias == source_server))
            .max_by_key(|doc| doc.latest_snapshot_usecs())
            .ok_or_else(|| CohesityError::NotFound(format!(
                "Source database {} not available in source {}.", source_db, source_server
            )))
    }

    fn oracle_params(&self) -> Value {
        let mut params = json!({"captureTailLogs": false});
        if self.args.clone_app_view {
            params["oracleCloneAppViewParamsVec"] = json!([{}]);
        } else if self.args.source_server != self.args.target_server || self.args.source_db != self.args.target_db {
            params["alternateLocationParams"] = json!({
                "newDatabaseName": self.args.target_db,
                "homeDir": self.args.oracle_home,
                "baseDir": self.args.oracle_base,
                "oracleDBConfig": {
                    "controlFilePathVec": [],
                    "enableArchiveLogMode": true,
                    "redoLogConf": {"groupMemberVec": [], "memberPrefix": "redo", "sizeMb": 20},
                    "fraSizeMb": self.args.fra_size_mb,
                },
                "databaseFileDestination": self.args.oracle_home,
            });
        }
        params
    }

    fn submit_oracle(&self, ctx: &ModuleContext) -> Result<u64> {
        let database = self.oracle_database(ctx)?;
        let object = &database.object_id;
        let (run_id, started) = common::find_run(&ctx.session, object.job_id, self.backup_minute()?)?
            .ok_or_else(|| CohesityError::NotFound(format!("No successful run available for job {}.", object.job_id)))?;

        let (action, vm_action) = if self.args.clone_app_view {
            ("kCloneAppView", "kCloneVMs")
        } else {
            ("kRecoverApp", "kRecoverVMs")
        };
        let body = json!({
            "name": self.task_name,
            "action": action,
            "restoreAppParams": {
                "type": 19,
                "ownerRestoreInfo": {
                    "ownerObject": {
                        "jobUid": object.job_uid,
                        "jobId": object.job_id,
                        "jobInstanceId": run_id,
                        "startTimeUsecs": started,
                        "entity": {"id": object.entity.get("parentId")},
                    },
                    "ownerRestoreParams": {"action": vm_action},
                    "performRestore": false,
                },
                "restoreAppObjectVec": [{
                    "appEntity": object.entity,
                    "restoreParams": {"oracleRestoreParams": self.oracle_params()},
                }],
            },
        });
        let created: Value = ctx.session.post("/recoverApplication", &body)?;
        created.pointer("/restoreTask/performRestoreTaskState/base/taskId")
            .and_then(Value::as_u64)
            .ok_or_else(|| CohesityError::Transport(String::from("The cluster did not return an id for the restore task")))
    }

    /// Parent, resource pool and datastore ids for restoring to another vCenter.
    fn new_location(&self, ctx: &ModuleContext, target: &str) -> Result<(u64, u64, u64)> {
        let parent = common::root_nodes(&ctx.session, Environment::VMware)?
            .into_iter()
            .find(|source| source.name == target)
            .map(|source| source.id)
            .ok_or_else(|| CohesityError::NotFound(format!("Failed to find the protection source {}", target)))?;
        let tree = common::source_tree(&ctx.session, parent, Some("kVirtualMachine"))?;
        let pool = common::find_typed_node(&tree, self.args.resource_pool.as_deref().unwrap_or_default(), "kResourcePool");
        let datastore = common::find_typed_node(&tree, self.args.datastore.as_deref().unwrap_or_default(), "kDatastore");
        match (pool.first(), datastore.first()) {
            (Some(pool), Some(datastore)) => Ok((parent, *pool, *datastore)),
            _ => Err(CohesityError::NotFound(String::from("Failed to find the resource pool or datastore on the target source"))),
        }
    }
}

impl ResourcePolicy for RestoreAction {
    type Status = TaskPhase;

    fn kind(&self) -> ResourceKind {
        ResourceKind::RestoreTask
    }

    fn target(&self) -> String {
        self.task_name.clone()
    }

    fn desired(&self) -> DesiredState {
        self.args.state
    }

    fn validate(&self) -> Result<()> {
        if self.args.state != DesiredState::Present {
            return Err(CohesityError::Parameter(String::from("Restore tasks cannot be removed; state must be present")));
        }
        common::require(&self.args.name, "name")?;
        if self.args.restore_type != RestoreType::Oracle {
            common::require(&self.args.job_name, "job_name")?;
        }
        self.backup_minute()?;
        match self.args.restore_type {
            RestoreType::Files => {
                if !matches!(self.environment, Environment::PhysicalFiles | Environment::GenericNas | Environment::VMware) {
                    return Err(CohesityError::Parameter(format!(
                        "file restores support PhysicalFiles, GenericNas and VMware, not {}", self.environment
                    )));
                }
                if self.environment == Environment::VMware {
                    required(&self.args.vm_name, "vm_name")?;
                    if required(&self.args.vm_username, "vm_username").is_err() || required(&self.args.vm_password, "vm_password").is_err() {
                        return Err(CohesityError::Parameter(String::from("Please provide VM credentials to proceed with restore.")));
                    }
                }
                if self.args.file_names.is_empty() {
                    return Err(CohesityError::Parameter(String::from("file_names must name at least one file")));
                }
                common::require(self.args.endpoint.as_deref().unwrap_or_default(), "endpoint")?;
                self.restore_paths()?;
            }
            RestoreType::Vms => {
                if self.args.vm_names.is_empty() {
                    return Err(CohesityError::Parameter(String::from("vm_names must name at least one VM")));
                }
                if self.args.restore_to_source.is_some() && (self.args.resource_pool.is_none() || self.args.datastore.is_none()) {
                    return Err(CohesityError::Parameter(String::from("The resource pool and datastore details are required for restoring to a new location")));
                }
            }
            RestoreType::Oracle => {
                required(&self.args.source_db, "source_db")?;
                required(&self.args.source_server, "source_server")?;
                required(&self.args.target_db, "target_db")?;
                required(&self.args.target_server, "target_server")?;
                required(&self.args.oracle_home, "oracle_home")?;
                required(&self.args.oracle_base, "oracle_base")?;
            }
        }
        Ok(())
    }

    fn probe(&self, ctx: &ModuleContext) -> Result<StatusSnapshot<TaskPhase>> {
        let task = common::find_restore_task(&ctx.session, self.task_type(), &self.task_name)?;
        Ok(common::task_snapshot(task))
    }

    fn submit(&self, ctx: &ModuleContext, _action: TaskRequestType, _snapshot: &StatusSnapshot<TaskPhase>) -> Result<Submission> {
        let missing_id = || CohesityError::Transport(String::from("The cluster did not return an id for the restore task"));
        let submission = match self.args.restore_type {
            RestoreType::Files => Submission::new()
                .with_id(self.submit_files(ctx)?.id.ok_or_else(missing_id)?)
                .with_data("filenames", json!(self.args.file_names)),
            RestoreType::Vms => Submission::new()
                .with_id(self.submit_vms(ctx)?.id.ok_or_else(missing_id)?)
                .with_data("vm_names", json!(self.args.vm_names)),
            RestoreType::Oracle => Submission::new()
                .with_id(self.submit_oracle(ctx)?)
                .with_data("source_db", json!(self.args.source_db))
                .with_data("target_db", json!(self.args.target_db)),
        };
        Ok(submission.with_data("name", json!(self.task_name)))
    }

    fn poll_plan(&self, _action: TaskRequestType) -> Option<PollPlan> {
        if !self.args.wait_for_job {
            return None;
        }
        Some(PollPlan::new(POLL_SECS, self.wait_minutes, OnTimeout::Fail))
    }

    fn poll_probe(&self, ctx: &ModuleContext, _action: TaskRequestType, submission: &Submission) -> Result<StatusSnapshot<TaskPhase>> {
        let id = submission.id.as_deref().unwrap_or_default();
        Ok(common::task_snapshot(common::fetch_task(&ctx.session, id)?))
    }

    fn terminal(&self, _action: TaskRequestType, snapshot: &StatusSnapshot<TaskPhase>) -> Terminal {
        match common::task_terminal(snapshot) {
            Terminal::Reached if self.args.restore_type == RestoreType::Oracle && snapshot.status == TaskPhase::Canceled => {
                Terminal::Failed(String::from("The restore task was canceled"))
            }
            verdict => verdict,
        }
    }

    fn message(&self, outcome: Outcome, status: Option<&TaskPhase>) -> String {
        if self.args.restore_type == RestoreType::Oracle {
            match outcome {
                Outcome::Submitted(_) | Outcome::Completed(_) | Outcome::Accepted(_) => {
                    return format!("Successfully created restore task \"{}\"", self.task_name);
                }
                Outcome::Failed(_) => return String::from(ORACLE_FAILED),
                _ => {}
            }
        }
        match outcome {
            Outcome::Unchanged => String::from("The Restore Job is already registered"),
            Outcome::WouldChange(_) => String::from(
                "Cohesity Protection Restore Job is not currently registered.  This action would register the Cohesity Protection Job.",
            ),
            Outcome::Failed(_) => String::from("Cohesity Restore Job Failed to complete"),
            Outcome::TimedOut(_) => {
                let mut msg = format!("Failed to wait for the restore to complete after {} minutes.", self.wait_minutes);
                if status.map(TaskPhase::is_running).unwrap_or(false) {
                    msg.push_str(" The restore is still in progress and the timeout might be too short.");
                }
                msg
            }
            _ => String::from("Registration of Cohesity Restore Job Complete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Method;
    use crate::reconcile::reconcile;
    use crate::testing::{context_with, MockTransport, RecordingSleeper};
    use std::sync::Arc;
    use std::time::Duration;

    fn files_task(extra: &str) -> RestoreAction {
        let yaml = format!(
            "name: etc\njob_name: nightly\nendpoint: db-01.corp.example.com\nfile_names: [/etc/hosts, /etc/fstab]\n{}",
            extra
        );
        serde_yaml::from_str::<RestoreTask>(&yaml).unwrap().evaluate()
    }

    fn cluster_with_snapshots() -> MockTransport {
        MockTransport::new()
            .on(Method::Get, "/public/restore/tasks?taskTypes", 200, json!([]))
            .on(Method::Get, "/public/protectionJobs", 200, json!([
                {"id": 12, "name": "nightly", "uid": {"clusterId": 1, "clusterIncarnationId": 2, "id": 12}}
            ]))
            .on(Method::Get, "/public/protectionSources?environments", 200, json!([
                {"protectionSource": {"id": 2, "name": "Physical Servers"},
                 "nodes": [{"protectionSource": {"id": 77, "name": "db-01.corp.example.com"}}]}
            ]))
            .on(Method::Get, "/public/restore/files/snapshotsInformation", 200, json!([
                {"snapshot": {"jobRunId": 4400, "startedTimeUsecs": 1_709_260_200_000_000_i64}},
                {"snapshot": {"jobRunId": 4300, "startedTimeUsecs": 1_709_173_800_000_000_i64}}
            ]))
            .on(Method::Post, "/public/restore/files", 201, json!({"id": 88, "name": "nightly: etc"}))
    }

    #[test]
    fn test_absent_restore_runs_until_finished() {
        let transport = Arc::new(cluster_with_snapshots()
            .on(Method::Get, "/public/restore/tasks/88", 200, json!({"id": 88, "status": "kRunning"}))
            .on(Method::Get, "/public/restore/tasks/88", 200, json!({"id": 88, "status": "kFinished"})));
        let sleeper = Arc::new(RecordingSleeper::default());
        let ctx = context_with(transport.clone(), sleeper.clone());

        let result = reconcile(&files_task(""), &ctx).unwrap();
        assert!(result.changed);
        assert_eq!(result.msg, "Registration of Cohesity Restore Job Complete");
        assert_eq!(result.status.as_deref(), Some("kFinished"));
        assert_eq!(sleeper.naps(), vec![Duration::from_secs(30)]);

        let posts = transport.sent(Method::Post, "/public/restore/files");
        assert_eq!(posts.len(), 1);
        let body = posts[0].body.clone().unwrap();
        assert_eq!(body["name"], json!("nightly: etc"));
        assert_eq!(body["targetSourceId"], json!(77));
        assert_eq!(body["sourceObjectInfo"]["jobRunId"], json!(4400));
        assert_eq!(body["sourceObjectInfo"]["jobUid"], json!({"clusterId": 1, "clusterIncarnationId": 2, "id": 12}));
    }

    #[test]
    fn test_existing_task_is_not_resubmitted() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/restore/tasks?taskTypes", 200, json!([{"id": 70, "name": "nightly: etc", "status": "kSuccess"}])));
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let result = reconcile(&files_task(""), &ctx).unwrap();
        assert!(!result.changed);
        assert_eq!(result.msg, "The Restore Job is already registered");
        assert_eq!(result.data.get("id"), Some(&json!("70")));
        assert_eq!(transport.count(Method::Post, "/public/restore"), 0);
    }

    #[test]
    fn test_backup_timestamp_selects_older_snapshot() {
        let transport = Arc::new(cluster_with_snapshots());
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let result = reconcile(&files_task("wait_for_job: false\nbackup_timestamp: '2024-02-29:02:30'"), &ctx).unwrap();
        assert!(result.changed);
        let body = transport.sent(Method::Post, "/public/restore/files")[0].body.clone().unwrap();
        assert_eq!(body["sourceObjectInfo"]["jobRunId"], json!(4300));
    }

    #[test]
    fn test_terminal_error_is_verbatim() {
        let transport = Arc::new(cluster_with_snapshots()
            .on(Method::Get, "/public/restore/tasks/88", 200, json!({
                "id": 88, "status": "kFinished", "error": {"message": "Access is denied to /etc/shadow"}
            })));
        let ctx = context_with(transport, Arc::new(RecordingSleeper::default()));
        let result = reconcile(&files_task(""), &ctx).unwrap();
        assert_eq!(result.msg, "Cohesity Restore Job Failed to complete");
        assert_eq!(result.error.as_deref(), Some("Access is denied to /etc/shadow"));
    }

    #[test]
    fn test_timeout_reports_restore_still_running() {
        let transport = Arc::new(cluster_with_snapshots()
            .on(Method::Get, "/public/restore/tasks/88", 200, json!({"id": 88, "status": "kInProgress"})));
        let sleeper = Arc::new(RecordingSleeper::default());
        let ctx = context_with(transport.clone(), sleeper.clone());

        let err = reconcile(&files_task("wait_minutes: 1"), &ctx).unwrap_err();
        match err {
            CohesityError::Timeout(msg) => assert_eq!(
                msg,
                "Failed to wait for the restore to complete after 1 minutes. The restore is still in progress and the timeout might be too short."
            ),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(transport.count(Method::Get, "/public/restore/tasks/88"), 2);
        assert_eq!(sleeper.count(), 1);
    }

    #[test]
    fn test_windows_paths() {
        assert_eq!(convert_windows_path("C:\\Users\\admin\\notes.txt").unwrap(), "/C/Users/admin/notes.txt");
        assert_eq!(convert_windows_path("/C/Users/admin").unwrap(), "/C/Users/admin");
        assert_eq!(convert_windows_path("/etc/hosts").unwrap(), "/etc/hosts");
        assert!(matches!(convert_windows_path("Users\\admin"), Err(CohesityError::Parameter(_))));
    }

    #[test]
    fn test_nas_paths_lose_the_mount_prefix() {
        let action = serde_yaml::from_str::<RestoreTask>(concat!(
            "name: share\njob_name: nas\nenvironment: GenericNas\n",
            "endpoint: nas.corp.example.com:/exports/home\n",
            "file_names: ['nas.corp.example.com:/exports/home/alice/report.pdf']\n",
        )).unwrap().evaluate();
        assert_eq!(action.restore_paths().unwrap(), vec![String::from("/alice/report.pdf")]);
    }

    #[test]
    fn test_absent_is_rejected_before_any_request() {
        let transport = Arc::new(MockTransport::new());
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let err = reconcile(&files_task("state: absent"), &ctx).unwrap_err();
        assert!(matches!(err, CohesityError::Parameter(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_vm_restore_payload() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/restore/tasks?taskTypes", 200, json!([]))
            .on(Method::Get, "/public/protectionJobs", 200, json!([
                {"id": 21, "name": "vms", "uid": {"clusterId": 1, "clusterIncarnationId": 2, "id": 21}}
            ]))
            .on(Method::Get, "/public/restore/objects", 200, json!({
                "totalCount": 1,
                "objectSnapshotInfo": [{
                    "objectName": "web-01",
                    "jobId": 21,
                    "jobUid": {"clusterId": 1, "clusterIncarnationId": 2, "id": 21},
                    "snapshottedSource": {"id": 41, "name": "web-01"},
                    "versions": [{"jobRunId": 900, "startedTimeUsecs": 1_709_260_200_000_000_i64}]
                }]
            }))
            .on(Method::Post, "/public/restore/recover", 201, json!({"id": 95})));
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let action = serde_yaml::from_str::<RestoreTask>(
            "name: web\njob_name: vms\nrestore_type: vms\nvm_names: [web-01]\nprefix: restored-\nnetwork_connected: false\nwait_for_job: false",
        ).unwrap().evaluate();

        let result = reconcile(&action, &ctx).unwrap();
        assert!(result.changed);
        assert_eq!(result.data.get("id"), Some(&json!("95")));
        let body = transport.sent(Method::Post, "/public/restore/recover")[0].body.clone().unwrap();
        assert_eq!(body["type"], json!("kRecoverVMs"));
        assert_eq!(body["objects"][0]["protectionSourceId"], json!(41));
        assert_eq!(body["objects"][0]["jobRunId"], json!(900));
        assert_eq!(body["vmwareParameters"], json!({"poweredOn": true, "disableNetwork": true, "prefix": "restored-"}));
    }

    #[test]
    fn test_vm_without_snapshot_fails() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/restore/tasks?taskTypes", 200, json!([]))
            .on(Method::Get, "/public/protectionJobs", 200, json!([{"id": 21, "name": "vms"}]))
            .on(Method::Get, "/public/restore/objects", 200, json!({"totalCount": 0})));
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let action = serde_yaml::from_str::<RestoreTask>("name: web\njob_name: vms\nrestore_type: vms\nvm_names: [web-01]")
            .unwrap().evaluate();
        let err = reconcile(&action, &ctx).unwrap_err();
        assert_eq!(err.to_string(), "Not found: Failed to find a snapshot on the cluster");
        assert_eq!(transport.count(Method::Post, "/public/restore/recover"), 0);
    }

    fn vmware_files_task(extra: &str) -> RestoreAction {
        let yaml = format!(
            concat!(
                "name: notes\njob_name: vms\nenvironment: VMware\nendpoint: vcenter.corp.example.com\n",
                "vm_name: web-01\nvm_username: administrator\nvm_password: secret\n",
                "file_names: [/home/alice/notes.txt]\n{}"
            ),
            extra
        );
        serde_yaml::from_str::<RestoreTask>(&yaml).unwrap().evaluate()
    }

    fn vcenter_with_file(vm: &str) -> MockTransport {
        MockTransport::new()
            .on(Method::Get, "/public/restore/tasks?taskTypes", 200, json!([]))
            .on(Method::Get, "/public/protectionSources/rootNodes", 200, json!([
                {"protectionSource": {"id": 1, "name": "vcenter.corp.example.com"}}
            ]))
            .on(Method::Get, "/public/protectionSources/virtualMachines", 200, json!([
                {"id": 41, "name": "web-01"}
            ]))
            .on(Method::Get, "/public/restore/files?environments", 200, json!({"files": [{
                "filename": "/home/alice/notes.txt", "jobId": 21, "sourceId": 41,
                "protectionSource": {"id": 41, "name": vm}
            }]}))
            .on(Method::Get, "/public/protectionRuns", 200, json!([
                {"backupRun": {"jobRunId": 902, "status": "kFailure", "stats": {"startTimeUsecs": 1_709_346_600_000_000_i64}}},
                {"backupRun": {"jobRunId": 901, "status": "kSuccess", "stats": {"startTimeUsecs": 1_709_260_200_000_000_i64}}}
            ]))
            .on(Method::Post, "/public/restore/files", 201, json!({"id": 88}))
    }

    #[test]
    fn test_vmware_file_restore_payload() {
        let transport = Arc::new(vcenter_with_file("web-01"));
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let result = reconcile(&vmware_files_task("wait_for_job: false\nrestore_location: /tmp/restored"), &ctx).unwrap();

        assert!(result.changed);
        assert_eq!(result.data.get("id"), Some(&json!("88")));
        assert!(transport.sent(Method::Get, "/public/protectionSources/virtualMachines")[0].url.contains("vCenterId=1"));
        let body = transport.sent(Method::Post, "/public/restore/files")[0].body.clone().unwrap();
        assert_eq!(body["name"], json!("vms: notes"));
        assert_eq!(body["filenames"], json!(["/home/alice/notes.txt"]));
        assert_eq!(body["targetSourceId"], json!(41));
        assert_eq!(body["targetParentSourceId"], json!(1));
        assert_eq!(body["sourceObjectInfo"], json!({
            "jobId": 21, "protectionSourceId": 41, "environment": "kVMware",
            "jobRunId": 901, "startedTimeUsecs": 1_709_260_200_000_000_i64
        }));
        assert_eq!(body["username"], json!("administrator"));
        assert_eq!(body["newBaseDirectory"], json!("/tmp/restored"));
    }

    #[test]
    fn test_vmware_file_from_another_vm_is_refused() {
        let transport = Arc::new(vcenter_with_file("web-02"));
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let err = reconcile(&vmware_files_task(""), &ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Not found: File '/home/alice/notes.txt' is not available in virtual machine 'web-01' to restore"
        );
        assert_eq!(transport.count(Method::Post, "/public/restore/files"), 0);
    }

    #[test]
    fn test_vmware_files_need_guest_credentials() {
        let transport = Arc::new(MockTransport::new());
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let action = serde_yaml::from_str::<RestoreTask>(concat!(
            "name: notes\njob_name: vms\nenvironment: VMware\nendpoint: vcenter.corp.example.com\n",
            "vm_name: web-01\nfile_names: [/home/alice/notes.txt]",
        )).unwrap().evaluate();
        let err = reconcile(&action, &ctx).unwrap_err();
        assert!(matches!(err, CohesityError::Parameter(_)));
        assert!(transport.requests().is_empty());
    }

    fn oracle_task(extra: &str) -> RestoreAction {
        let yaml = format!(
            concat!(
                "name: refresh-sales\nrestore_type: oracle\nsource_db: SALES\nsource_server: ora-01.corp.example.com\n",
                "target_db: SALESDEV\ntarget_server: ora-02.corp.example.com\n",
                "oracle_home: /u01/app/oracle/product/19c\noracle_base: /u01/app/oracle\n{}"
            ),
            extra
        );
        serde_yaml::from_str::<RestoreTask>(&yaml).unwrap().evaluate()
    }

    fn oracle_cluster() -> MockTransport {
        let hit = |alias: &str, usecs: i64, parent: u64| json!({"vmDocument": {
            "objectAliases": [alias],
            "objectId": {
                "jobId": 31,
                "jobUid": {"clusterId": 1, "clusterIncarnationId": 2, "objectId": 31},
                "entity": {"id": 610, "parentId": parent, "type": 19}
            },
            "versions": [{"snapshotTimestampUsecs": usecs}]
        }});
        MockTransport::new()
            .on(Method::Get, "/public/restore/tasks?taskTypes", 200, json!([]))
            .on(Method::Get, "/searchvms", 200, json!({"vms": [
                hit("ora-01.corp.example.com", 1_709_173_800_000_000, 600),
                hit("ora-09.corp.example.com", 1_709_260_200_000_000, 900),
                hit("ora-01.corp.example.com", 1_709_260_200_000_000, 601)
            ]}))
            .on(Method::Get, "/public/protectionRuns", 200, json!([
                {"backupRun": {"jobRunId": 7001, "status": "kSuccess", "stats": {"startTimeUsecs": 1_709_260_200_000_000_i64}}}
            ]))
            .on(Method::Post, "/recoverApplication", 200, json!({
                "restoreTask": {"performRestoreTaskState": {"base": {"taskId": 501}}}
            }))
    }

    #[test]
    fn test_oracle_restore_to_another_database() {
        let transport = Arc::new(oracle_cluster()
            .on(Method::Get, "/public/restore/tasks/501", 200, json!({"id": 501, "status": "kFinished"})));
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let result = reconcile(&oracle_task(""), &ctx).unwrap();

        assert!(result.changed);
        assert_eq!(result.msg, "Successfully created restore task \"refresh-sales\"");
        assert_eq!(result.data.get("id"), Some(&json!("501")));
        assert_eq!(transport.count(Method::Get, "taskTypes=kRecoverApp"), 1);
        assert!(transport.sent(Method::Get, "/searchvms")[0].url.contains("entityTypes=kOracle&vmName=SALES"));

        let body = transport.sent(Method::Post, "/recoverApplication")[0].body.clone().unwrap();
        assert_eq!(body["name"], json!("refresh-sales"));
        assert_eq!(body["action"], json!("kRecoverApp"));
        let owner = &body["restoreAppParams"]["ownerRestoreInfo"];
        assert_eq!(owner["ownerObject"]["jobInstanceId"], json!(7001));
        assert_eq!(owner["ownerObject"]["entity"], json!({"id": 601}));
        assert_eq!(owner["ownerRestoreParams"]["action"], json!("kRecoverVMs"));
        let app = &body["restoreAppParams"]["restoreAppObjectVec"][0];
        assert_eq!(app["appEntity"]["parentId"], json!(601));
        let alternate = &app["restoreParams"]["oracleRestoreParams"]["alternateLocationParams"];
        assert_eq!(alternate["newDatabaseName"], json!("SALESDEV"));
        assert_eq!(alternate["oracleDBConfig"]["fraSizeMb"], json!(2048));
    }

    #[test]
    fn test_oracle_clone_app_view() {
        let transport = Arc::new(oracle_cluster());
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        reconcile(&oracle_task("clone_app_view: true\nwait_for_job: false"), &ctx).unwrap();

        assert_eq!(transport.count(Method::Get, "taskTypes=kCloneAppView"), 1);
        let body = transport.sent(Method::Post, "/recoverApplication")[0].body.clone().unwrap();
        assert_eq!(body["action"], json!("kCloneAppView"));
        assert_eq!(body["restoreAppParams"]["ownerRestoreInfo"]["ownerRestoreParams"]["action"], json!("kCloneVMs"));
        let params = &body["restoreAppParams"]["restoreAppObjectVec"][0]["restoreParams"]["oracleRestoreParams"];
        assert_eq!(params["oracleCloneAppViewParamsVec"], json!([{}]));
        assert!(params.get("alternateLocationParams").is_none());
    }

    #[test]
    fn test_canceled_oracle_restore_fails() {
        let transport = Arc::new(oracle_cluster()
            .on(Method::Get, "/public/restore/tasks/501", 200, json!({"id": 501, "status": "kCanceled"})));
        let ctx = context_with(transport, Arc::new(RecordingSleeper::default()));
        let result = reconcile(&oracle_task(""), &ctx).unwrap();
        assert_eq!(result.msg, ORACLE_FAILED);
        let err = result.into_outcome().unwrap_err();
        assert_eq!(err.error_details(), Some("The restore task was canceled"));
    }

    #[test]
    fn test_oracle_database_on_other_server() {
        let transport = Arc::new(oracle_cluster());
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let action = serde_yaml::from_str::<RestoreTask>(concat!(
            "name: refresh-sales\nrestore_type: oracle\nsource_db: SALES\nsource_server: ora-05.corp.example.com\n",
            "target_db: SALES\ntarget_server: ora-05.corp.example.com\n",
            "oracle_home: /u01/app/oracle/product/19c\noracle_base: /u01/app/oracle",
        )).unwrap().evaluate();
        let err = reconcile(&action, &ctx).unwrap_err();
        assert_eq!(err.to_string(), "Not found: Source database SALES not available in source ora-05.corp.example.com.");
        assert_eq!(transport.count(Method::Post, "/recoverApplication"), 0);
    }
}
