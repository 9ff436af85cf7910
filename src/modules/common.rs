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

//! Lookups shared by the cluster modules: environments, protection jobs,
//! policies, storage domains, protection sources and restore tasks.

use crate::client::models::{
    BackupRun, NamedEntity, ObjectSearchResult, ObjectSnapshotInfo, ProtectionJob, ProtectionRun, ProtectionSource,
    ProtectionSourceNode, RestoreTask, SnapshotVersion,
};
use crate::client::{with_query, ClusterSession};
use crate::error::{CohesityError, Result};
use crate::reconcile::{Classification, DesiredState, StatusSnapshot, StatusValue, Terminal};
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;

pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d:%H:%M";

/// Builds the `ConnectionArgs` of a task struct carrying the standard
/// connection fields.
macro_rules! connection_args {
    ($task:expr) => {
        $crate::config::ConnectionArgs {
            cluster: $task.cluster.clone(),
            username: $task.username.clone(),
            password: $task.password.clone(),
            domain: $task.domain.clone(),
            validate_certs: $task.validate_certs,
        }
    };
}
pub(crate) use connection_args;

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Physical,
    PhysicalFiles,
    VMware,
    GenericNas,
    Oracle,
}

impl Environment {
    pub fn code(&self) -> &'static str {
        match self {
            Environment::Physical => "kPhysical",
            Environment::PhysicalFiles => "kPhysicalFiles",
            Environment::VMware => "kVMware",
            Environment::GenericNas => "kGenericNas",
            Environment::Oracle => "kOracle",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Physical => "Physical",
            Environment::PhysicalFiles => "PhysicalFiles",
            Environment::VMware => "VMware",
            Environment::GenericNas => "GenericNas",
            Environment::Oracle => "Oracle",
        };
        write!(f, "{}", name)
    }
}

pub fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CohesityError::Parameter(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// The live protection job with exactly this name, if any.
pub fn find_job(session: &ClusterSession, name: &str, environment: Environment) -> Result<Option<ProtectionJob>> {
    let path = with_query("/public/protectionJobs", &[
        ("names", name.to_string()),
        ("environments", environment.code().to_string()),
    ]);
    let jobs: Option<Vec<ProtectionJob>> = session.get(&path)?;
    Ok(jobs.unwrap_or_default()
        .into_iter()
        .filter(|job| !job.name.starts_with("_DELETED_") && !job.is_deleted.unwrap_or(false))
        .find(|job| job.name == name))
}

pub fn require_job(session: &ClusterSession, name: &str, environment: Environment) -> Result<ProtectionJob> {
    find_job(session, name, environment)?
        .ok_or_else(|| CohesityError::NotFound(format!("Failed to find the job name {} for the selected environment type {}", name, environment)))
}

pub fn policy_id_by_name(session: &ClusterSession, name: &str) -> Result<String> {
    let path = with_query("/public/protectionPolicies", &[("names", name.to_string())]);
    let policies: Option<Vec<NamedEntity>> = session.get(&path)?;
    policies.unwrap_or_default()
        .into_iter()
        .find(|p| p.name == name)
        .map(|p| p.id_string())
        .ok_or_else(|| CohesityError::NotFound(format!("Failed to find the protection policy {}", name)))
}

pub fn storage_domain_id(session: &ClusterSession, name: &str) -> Result<u64> {
    let path = with_query("/public/viewBoxes", &[("names", name.to_string())]);
    let domains: Option<Vec<NamedEntity>> = session.get(&path)?;
    domains.unwrap_or_default()
        .into_iter()
        .find(|d| d.name == name)
        .and_then(|d| d.id_string().parse::<u64>().ok())
        .ok_or_else(|| CohesityError::NotFound(format!("Failed to find the storage domain {}", name)))
}

pub fn source_roots(session: &ClusterSession, environment: Environment) -> Result<Vec<ProtectionSourceNode>> {
    let path = with_query("/public/protectionSources", &[("environments", environment.code().to_string())]);
    let roots: Option<Vec<ProtectionSourceNode>> = session.get(&path)?;
    Ok(roots.unwrap_or_default())
}

/// Top level sources (vCenters, the physical and NAS containers) of an environment.
pub fn root_nodes(session: &ClusterSession, environment: Environment) -> Result<Vec<ProtectionSource>> {
    let path = with_query("/public/protectionSources/rootNodes", &[("environments", environment.code().to_string())]);
    let roots: Option<Vec<ProtectionSourceNode>> = session.get(&path)?;
    Ok(roots.unwrap_or_default()
        .into_iter()
        .filter_map(|root| root.protection_source)
        .collect())
}

/// The tree below one source, optionally without the given node types.
pub fn source_tree(session: &ClusterSession, id: u64, exclude_types: Option<&str>) -> Result<Vec<ProtectionSourceNode>> {
    let mut params = vec![("id", id.to_string())];
    if let Some(types) = exclude_types {
        params.push(("excludeTypes", types.to_string()));
    }
    let tree: Option<Vec<ProtectionSourceNode>> = session.get(&with_query("/public/protectionSources", &params))?;
    Ok(tree.unwrap_or_default())
}

/// Id of the registered source for `endpoint`. vCenters are matched on the
/// registration endpoint, everything else on the child node name.
pub fn find_source_id(session: &ClusterSession, environment: Environment, endpoint: &str) -> Result<Option<u64>> {
    let roots = source_roots(session, environment)?;
    Ok(source_id_in(&roots, environment, endpoint))
}

pub fn source_id_in(roots: &[ProtectionSourceNode], environment: Environment, endpoint: &str) -> Option<u64> {
    if environment == Environment::VMware {
        return roots.iter()
            .find(|root| {
                root.registration_info.as_ref()
                    .and_then(|r| r.access_info.as_ref())
                    .and_then(|a| a.endpoint.as_deref())
                    == Some(endpoint)
            })
            .and_then(|root| root.protection_source.as_ref().map(|s| s.id));
    }
    roots.iter()
        .flat_map(|root| root.nodes.iter())
        .filter_map(|node| node.protection_source.as_ref())
        .find(|source| source.name == endpoint)
        .map(|source| source.id)
}

/// Depth-first search of a source tree for a node of `source_type` named `name`.
pub fn find_typed_node(nodes: &[ProtectionSourceNode], name: &str, source_type: &str) -> Vec<u64> {
    let mut found = Vec::new();
    let mut stack: Vec<&ProtectionSourceNode> = nodes.iter().collect();
    while let Some(node) = stack.pop() {
        if let Some(source) = &node.protection_source {
            let typed = source.vmware_protection_source.as_ref()
                .and_then(|v| v.source_type.as_deref());
            if source.name == name && typed == Some(source_type) && !found.contains(&source.id) {
                found.push(source.id);
            }
        }
        stack.extend(node.nodes.iter());
    }
    found
}

pub fn restore_tasks(session: &ClusterSession, task_type: &str) -> Result<Vec<RestoreTask>> {
    let path = with_query("/public/restore/tasks", &[("taskTypes", task_type.to_string())]);
    let tasks: Option<Vec<RestoreTask>> = session.get(&path)?;
    Ok(tasks.unwrap_or_default())
}

/// The newest restore or clone task named `name`.
pub fn find_restore_task(session: &ClusterSession, task_type: &str, name: &str) -> Result<Option<RestoreTask>> {
    Ok(restore_tasks(session, task_type)?
        .into_iter()
        .filter(|task| task.name == name)
        .max_by_key(|task| task.id.unwrap_or(0)))
}

/// Where a restore or clone task is in its lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskPhase {
    Missing,
    InFlight(String),
    Finished,
    Canceled,
}

impl TaskPhase {
    pub fn from_status(status: &str) -> Self {
        match status {
            "kFinished" => TaskPhase::Finished,
            "kCanceled" => TaskPhase::Canceled,
            other => TaskPhase::InFlight(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskPhase::InFlight(s) if s == "kRunning" || s == "kInProgress")
    }
}

impl StatusValue for TaskPhase {
    fn classify(&self, desired: DesiredState) -> Classification {
        match (self, desired) {
            (TaskPhase::Missing, DesiredState::Absent) => Classification::Satisfied,
            (TaskPhase::Missing, _) => Classification::Unsatisfied,
            (_, DesiredState::Absent) => Classification::Unsatisfied,
            _ => Classification::Satisfied,
        }
    }

    fn label(&self) -> String {
        match self {
            TaskPhase::Missing => String::from("absent"),
            TaskPhase::InFlight(s) => s.clone(),
            TaskPhase::Finished => String::from("kFinished"),
            TaskPhase::Canceled => String::from("kCanceled"),
        }
    }
}

pub fn task_snapshot(task: Option<RestoreTask>) -> StatusSnapshot<TaskPhase> {
    let task = match task {
        Some(task) => task,
        None => return StatusSnapshot::new(TaskPhase::Missing),
    };
    let phase = TaskPhase::from_status(task.status.as_deref().unwrap_or("kReadyToSchedule"));
    let mut snapshot = StatusSnapshot::new(phase)
        .with_error(task.error.as_ref().and_then(|e| e.detail()));
    if let Some(id) = task.id {
        snapshot = snapshot.with_id(id);
    }
    snapshot
}

/// Restore and clone tasks settle on kFinished or kCanceled; an error on
/// the task fails it whatever its status.
pub fn task_terminal(snapshot: &StatusSnapshot<TaskPhase>) -> Terminal {
    if let Some(error) = &snapshot.error {
        return Terminal::Failed(error.clone());
    }
    match snapshot.status {
        TaskPhase::Finished | TaskPhase::Canceled => Terminal::Reached,
        _ => Terminal::InFlight,
    }
}

pub fn fetch_task(session: &ClusterSession, id: &str) -> Result<Option<RestoreTask>> {
    let task: Option<RestoreTask> = session.get(&format!("/public/restore/tasks/{}", id))?;
    Ok(task)
}

/// Minutes since the epoch of a `YYYY-MM-DD:HH:MM` timestamp, read as UTC.
pub fn parse_backup_timestamp(value: &str) -> Result<i64> {
    let parsed = NaiveDateTime::parse_from_str(value, BACKUP_TIMESTAMP_FORMAT)
        .map_err(|_| CohesityError::Parameter(format!("backup_timestamp '{}' must be in YYYY-MM-DD:HH:MM format", value)))?;
    Ok(parsed.and_utc().timestamp() / 60)
}

/// True when a snapshot started within the given minute.
pub fn started_in_minute(started_time_usecs: i64, minute: i64) -> bool {
    DateTime::from_timestamp_micros(started_time_usecs)
        .map(|t| t.timestamp().div_euclid(60) == minute)
        .unwrap_or(false)
}

/// The newest successful run, or the run that started in the minute `at`.
/// Runs are listed newest first.
pub fn pick_run(runs: &[ProtectionRun], at: Option<i64>) -> Option<&BackupRun> {
    runs.iter()
        .filter_map(|run| run.backup_run.as_ref())
        .find(|run| match at {
            Some(minute) => run.stats.as_ref()
                .and_then(|s| s.start_time_usecs)
                .map(|t| started_in_minute(t, minute))
                .unwrap_or(false),
            None => run.status.as_deref() == Some("kSuccess"),
        })
}

/// Run id and start time of the run [`pick_run`] selects for a job.
pub fn find_run(session: &ClusterSession, job_id: u64, at: Option<i64>) -> Result<Option<(u64, i64)>> {
    let path = with_query("/public/protectionRuns", &[("jobId", job_id.to_string())]);
    let runs: Option<Vec<ProtectionRun>> = session.get(&path)?;
    let runs = runs.unwrap_or_default();
    Ok(pick_run(&runs, at).and_then(|run| {
        let started = run.stats.as_ref().and_then(|s| s.start_time_usecs)?;
        Some((run.job_run_id?, started))
    }))
}

/// Snapshot listing of one VM within a job.
pub fn vm_snapshots(session: &ClusterSession, vm: &str, job_id: u64) -> Result<Option<ObjectSnapshotInfo>> {
    let path = with_query("/public/restore/objects", &[("search", vm.to_string()), ("jobIds", job_id.to_string())]);
    let found: Option<ObjectSearchResult> = session.get(&path)?;
    let found = match found {
        Some(found) if found.total_count.unwrap_or(0) > 0 => found,
        _ => return Ok(None),
    };
    Ok(found.object_snapshot_info.into_iter().find(|info| info.object_name == vm))
}

/// The newest version, or the one taken in the minute `at`.
pub fn pick_version(info: &ObjectSnapshotInfo, at: Option<i64>) -> Option<&SnapshotVersion> {
    match at {
        Some(minute) => info.versions.iter().find(|v| started_in_minute(v.started_time_usecs, minute)),
        None => info.versions.iter().max_by_key(|v| v.started_time_usecs),
    }
}

/// The restore object document for one VM snapshot.
pub fn snapshot_object(job: &ProtectionJob, info: &ObjectSnapshotInfo, version: &SnapshotVersion) -> Value {
    json!({
        "jobId": info.job_id.or(job.id),
        "jobUid": info.job_uid.clone().or_else(|| job.uid.clone()),
        "jobRunId": version.job_run_id,
        "startedTimeUsecs": version.started_time_usecs,
        "protectionSourceId": info.snapshotted_source.as_ref().map(|s| s.id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roots() -> Vec<ProtectionSourceNode> {
        serde_json::from_value(json!([
            {
                "protectionSource": {"id": 1, "name": "vcenter.corp.example.com", "environment": "kVMware"},
                "registrationInfo": {"accessInfo": {"endpoint": "vcenter.corp.example.com"}},
                "nodes": [
                    {"protectionSource": {"id": 40, "name": "Resources", "vmWareProtectionSource": {"type": "kResourcePool"}},
                     "nodes": [
                        {"protectionSource": {"id": 41, "name": "web-01", "vmWareProtectionSource": {"type": "kVirtualMachine"}}}
                     ]}
                ]
            },
            {
                "protectionSource": {"id": 2, "name": "Physical Servers", "environment": "kPhysical"},
                "nodes": [
                    {"protectionSource": {"id": 77, "name": "db-01.corp.example.com", "environment": "kPhysical"}}
                ]
            }
        ])).unwrap()
    }

    #[test]
    fn test_vmware_source_matches_endpoint() {
        assert_eq!(source_id_in(&roots(), Environment::VMware, "vcenter.corp.example.com"), Some(1));
        assert_eq!(source_id_in(&roots(), Environment::VMware, "other"), None);
    }

    #[test]
    fn test_physical_source_matches_node_name() {
        assert_eq!(source_id_in(&roots(), Environment::Physical, "db-01.corp.example.com"), Some(77));
    }

    #[test]
    fn test_find_typed_node_descends() {
        let tree = roots();
        assert_eq!(find_typed_node(&tree[0].nodes, "web-01", "kVirtualMachine"), vec![41]);
        assert_eq!(find_typed_node(&tree[0].nodes, "Resources", "kResourcePool"), vec![40]);
        assert!(find_typed_node(&tree[0].nodes, "web-01", "kResourcePool").is_empty());
    }

    #[test]
    fn test_backup_timestamp_is_utc_minutes() {
        let minute = parse_backup_timestamp("2024-03-01:02:30").unwrap();
        assert_eq!(minute, 1_709_260_200 / 60);
        assert!(started_in_minute(1_709_260_200_000_000 + 42_000_000, minute));
        assert!(!started_in_minute(1_709_260_200_000_000 + 60_000_000, minute));
        assert!(matches!(parse_backup_timestamp("2024-03-01 02:30"), Err(CohesityError::Parameter(_))));
    }

    #[test]
    fn test_pick_run_by_success_or_minute() {
        let runs: Vec<ProtectionRun> = serde_json::from_value(json!([
            {"backupRun": {"jobRunId": 4402, "status": "kFailure", "stats": {"startTimeUsecs": 1_709_346_600_000_000_i64}}},
            {"backupRun": {"jobRunId": 4401, "status": "kSuccess", "stats": {"startTimeUsecs": 1_709_260_200_000_000_i64}}},
            {"backupRun": {"jobRunId": 4400, "status": "kSuccess", "stats": {"startTimeUsecs": 1_709_173_800_000_000_i64}}}
        ])).unwrap();
        assert_eq!(pick_run(&runs, None).and_then(|r| r.job_run_id), Some(4401));
        let minute = parse_backup_timestamp("2024-02-29:02:30").unwrap();
        assert_eq!(pick_run(&runs, Some(minute)).and_then(|r| r.job_run_id), Some(4400));
        assert!(pick_run(&runs, Some(minute + 1)).is_none());
    }

    #[test]
    fn test_task_snapshot_carries_error() {
        let task: RestoreTask = serde_json::from_value(json!({
            "id": 88, "name": "nightly: etc", "status": "kFinished",
            "error": {"message": "Access is denied to /etc/shadow"}
        })).unwrap();
        let snapshot = task_snapshot(Some(task));
        assert_eq!(snapshot.id.as_deref(), Some("88"));
        assert_eq!(task_terminal(&snapshot), Terminal::Failed(String::from("Access is denied to /etc/shadow")));
        assert_eq!(task_snapshot(None).status, TaskPhase::Missing);
    }

    #[test]
    fn test_task_phase_classification() {
        let phases = [TaskPhase::Missing, TaskPhase::InFlight(String::from("kRunning")), TaskPhase::Finished, TaskPhase::Canceled];
        for phase in &phases {
            let present = phase.classify(DesiredState::Present);
            let absent = phase.classify(DesiredState::Absent);
            assert_ne!(present, absent, "{:?}", phase);
            assert!(!matches!(present, Classification::Ambiguous(_)));
        }
        assert!(TaskPhase::from_status("kInProgress").is_running());
        assert!(!TaskPhase::from_status("kReadyToSchedule").is_running());
    }

    #[test]
    fn test_environment_codes() {
        assert_eq!(Environment::GenericNas.code(), "kGenericNas");
        let env: Environment = serde_yaml::from_str("VMware").unwrap();
        assert_eq!(env, Environment::VMware);
    }
}
