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

//! Protection jobs and their runs.
//!
//! `present`/`absent` manage the job definition; `started`/`stopped` manage
//! its most recent run. Starting is fire-and-forget once the run shows up,
//! stopping must be confirmed.

use crate::client::models::{ProtectionJob, ProtectionRun};
use crate::client::with_query;
use crate::config::ConnectionArgs;
use crate::error::{CohesityError, Result};
use crate::modules::common::{self, connection_args, Environment};
use crate::reconcile::gate::{self, Gate};
use crate::reconcile::{
    Classification, DesiredState, ModuleContext, OnTimeout, Outcome, PollPlan, ResourceKind, ResourcePolicy,
    StatusSnapshot, StatusValue, Submission, Terminal,
};
use crate::tasks::TaskRequestType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

pub const MODULE: &str = "cohesity_job";

const START_POLL_SECS: u64 = 5;
const STOP_POLL_SECS: u64 = 60;
const ORACLE_STOP_POLL_SECS: u64 = 5;
const DEFAULT_WAIT_MINUTES: u64 = 30;

static START_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([01]?[0-9]|2[0-3]):([0-5][0-9])$")
        .unwrap_or_else(|_| panic!("start time pattern failed to compile"))
});

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunType {
    #[default]
    Regular,
    Full,
    Log,
    System,
}

impl RunType {
    pub fn code(&self) -> &'static str {
        match self {
            RunType::Regular => "kRegular",
            RunType::Full => "kFull",
            RunType::Log => "kLog",
            RunType::System => "kSystem",
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct JobTask {
    #[serde(alias = "job_name")]
    pub name: String,
    #[serde(default)]
    pub state: DesiredState,
    #[serde(default = "default_environment")]
    pub environment: Environment,
    pub description: Option<String>,
    #[serde(default)]
    pub ondemand_run_type: RunType,
    pub wait_minutes: Option<u64>,
    pub protection_source: Option<String>,
    #[serde(default)]
    pub protection_sources: Vec<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    pub protection_policy: Option<String>,
    pub storage_domain: Option<String>,
    pub start_time: Option<String>,
    #[serde(default)]
    pub delete_snapshots: bool,
    #[serde(default)]
    pub cancel_active: bool,
    pub cluster: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub validate_certs: Option<bool>,
}

fn default_environment() -> Environment {
    Environment::Physical
}

fn default_timezone() -> String {
    String::from("America/Los_Angeles")
}

impl JobTask {
    pub fn connection(&self) -> ConnectionArgs {
        connection_args!(self)
    }

    pub fn evaluate(&self) -> JobAction {
        let mut sources = self.protection_sources.clone();
        if let Some(source) = &self.protection_source {
            if !sources.contains(source) {
                sources.insert(0, source.clone());
            }
        }
        JobAction {
            name: self.name.clone(),
            state: self.state,
            environment: self.environment,
            description: self.description.clone().unwrap_or_default(),
            run_type: self.ondemand_run_type,
            wait_minutes: self.wait_minutes.unwrap_or(DEFAULT_WAIT_MINUTES),
            sources,
            timezone: self.timezone.clone(),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            protection_policy: self.protection_policy.clone(),
            storage_domain: self.storage_domain.clone(),
            start_time: self.start_time.clone(),
            delete_snapshots: self.delete_snapshots,
            cancel_active: self.cancel_active,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobAction {
    pub name: String,
    pub state: DesiredState,
    pub environment: Environment,
    pub description: String,
    pub run_type: RunType,
    pub wait_minutes: u64,
    pub sources: Vec<String>,
    pub timezone: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub protection_policy: Option<String>,
    pub storage_domain: Option<String>,
    pub start_time: Option<String>,
    pub delete_snapshots: bool,
    pub cancel_active: bool,
}

/// State of the most recent run of a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    None,
    Accepted,
    Running,
    Success,
    Canceled,
    Failure,
    Other(String),
}

impl RunState {
    pub fn from_status(status: &str) -> Self {
        match status {
            "kAccepted" => RunState::Accepted,
            "kRunning" | "kCanceling" => RunState::Running,
            "kSuccess" | "kWarning" => RunState::Success,
            "kCanceled" => RunState::Canceled,
            "kFailure" => RunState::Failure,
            other => RunState::Other(other.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Accepted | RunState::Running)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Missing,
    Exists { run: RunState, run_id: Option<u64> },
}

impl StatusValue for JobStatus {
    fn classify(&self, desired: DesiredState) -> Classification {
        match (self, desired) {
            (JobStatus::Missing, DesiredState::Absent | DesiredState::Stopped) => Classification::Satisfied,
            (JobStatus::Missing, _) => Classification::Unsatisfied,
            (JobStatus::Exists { .. }, DesiredState::Present) => Classification::Satisfied,
            (JobStatus::Exists { .. }, DesiredState::Absent) => Classification::Unsatisfied,
            (JobStatus::Exists { run, .. }, DesiredState::Started) if run.is_active() => Classification::Satisfied,
            (JobStatus::Exists { .. }, DesiredState::Started) => Classification::Unsatisfied,
            (JobStatus::Exists { run, .. }, DesiredState::Stopped) if run.is_active() => Classification::Unsatisfied,
            (JobStatus::Exists { .. }, DesiredState::Stopped) => Classification::Satisfied,
        }
    }

    fn label(&self) -> String {
        match self {
            JobStatus::Missing => String::from("absent"),
            JobStatus::Exists { run, .. } => match run {
                RunState::None => String::from("present"),
                RunState::Accepted => String::from("kAccepted"),
                RunState::Running => String::from("kRunning"),
                RunState::Success => String::from("kSuccess"),
                RunState::Canceled => String::from("kCanceled"),
                RunState::Failure => String::from("kFailure"),
                RunState::Other(s) => s.clone(),
            },
        }
    }
}

impl JobAction {
    fn wants_runs(&self) -> bool {
        !matches!(self.state, DesiredState::Present)
    }

    fn job_id(snapshot: &StatusSnapshot<JobStatus>) -> Result<u64> {
        snapshot.id.as_deref()
            .and_then(|id| id.parse::<u64>().ok())
            .ok_or_else(|| CohesityError::NotFound(String::from("The Cohesity protection job doesn't exist on the cluster")))
    }

    fn last_run(ctx: &ModuleContext, job_id: u64) -> Result<Option<ProtectionRun>> {
        let path = with_query("/public/protectionRuns", &[("jobId", job_id.to_string()), ("numRuns", String::from("1"))]);
        let runs: Option<Vec<ProtectionRun>> = ctx.session.get(&path)?;
        Ok(runs.unwrap_or_default().into_iter().next())
    }

    fn cancel_run(ctx: &ModuleContext, job_id: u64, run_id: Option<u64>) -> Result<()> {
        let mut body = json!({});
        if let Some(run_id) = run_id {
            body["jobRunId"] = json!(run_id);
        }
        ctx.session.request(crate::client::Method::Post, &format!("/public/protectionRuns/cancel/{}", job_id), Some(&body))?;
        Ok(())
    }

    /// Parent source id plus the ids the job protects and excludes.
    fn resolve_sources(&self, ctx: &ModuleContext) -> Result<(u64, Vec<u64>, Vec<u64>)> {
        if self.environment == Environment::VMware {
            let vcenter = self.sources.first()
                .ok_or_else(|| CohesityError::Parameter(String::from("protection_source is required for VMware jobs")))?;
            let parent = common::root_nodes(&ctx.session, Environment::VMware)?
                .into_iter()
                .find(|source| &source.name == vcenter)
                .map(|source| source.id)
                .ok_or_else(|| CohesityError::NotFound(format!("Failed to find the protection source {}", vcenter)))?;
            let tree = common::source_tree(&ctx.session, parent, None)?;
            let included = if self.include.is_empty() { vec![parent] } else { vm_ids(&tree, &self.include)? };
            let excluded = if self.exclude.is_empty() { Vec::new() } else { vm_ids(&tree, &self.exclude)? };
            return Ok((parent, included, excluded));
        }

        let parent = common::root_nodes(&ctx.session, self.environment)?
            .into_iter()
            .next()
            .map(|source| source.id)
            .ok_or_else(|| CohesityError::NotFound(format!("No {} protection sources are registered", self.environment)))?;
        let roots = common::source_roots(&ctx.session, self.environment)?;
        let ids: Vec<u64> = self.sources.iter()
            .filter_map(|endpoint| common::source_id_in(&roots, self.environment, endpoint))
            .collect();
        if ids.len() < self.sources.len() {
            return Err(CohesityError::NotFound(String::from("Failed to find protection sources passed to the module")));
        }
        Ok((parent, ids, Vec::new()))
    }

    fn create(&self, ctx: &ModuleContext) -> Result<ProtectionJob> {
        let policy = self.protection_policy.as_deref().unwrap_or_default();
        let domain = self.storage_domain.as_deref().unwrap_or_default();
        let (parent, source_ids, exclude_ids) = self.resolve_sources(ctx)?;

        let mut body = json!({
            "name": self.name,
            "description": self.description,
            "environment": self.environment.code(),
            "policyId": common::policy_id_by_name(&ctx.session, policy)?,
            "viewBoxId": common::storage_domain_id(&ctx.session, domain)?,
            "parentSourceId": parent,
            "sourceIds": source_ids,
            "timezone": self.timezone,
        });
        if !exclude_ids.is_empty() {
            body["excludeSourceIds"] = json!(exclude_ids);
        }
        if let Some((hour, minute)) = self.start_time.as_deref().and_then(parse_start_time) {
            body["startTime"] = json!({"hour": hour, "minute": minute});
        }
        ctx.session.post("/public/protectionJobs", &body)
    }
}

/// `HH:MM` as hour and minute.
pub fn parse_start_time(value: &str) -> Option<(u32, u32)> {
    let caps = START_TIME.captures(value.trim())?;
    let hour = caps.get(1)?.as_str().parse().ok()?;
    let minute = caps.get(2)?.as_str().parse().ok()?;
    Some((hour, minute))
}

/// Object ids of the named VMs; each must appear exactly once in the tree.
fn vm_ids(tree: &[crate::client::models::ProtectionSourceNode], names: &[String]) -> Result<Vec<u64>> {
    let mut ids = Vec::new();
    for name in names {
        let found = common::find_typed_node(tree, name, "kVirtualMachine");
        match found.len() {
            0 => return Err(CohesityError::NotFound(String::from("Couldn't find some vm's passed to the module"))),
            1 => ids.push(found[0]),
            _ => return Err(CohesityError::Parameter(format!("Found multiple vm's with same name {}", name))),
        }
    }
    Ok(ids)
}

impl ResourcePolicy for JobAction {
    type Status = JobStatus;

    fn kind(&self) -> ResourceKind {
        ResourceKind::ProtectionJob
    }

    fn target(&self) -> String {
        self.name.clone()
    }

    fn desired(&self) -> DesiredState {
        self.state
    }

    fn validate(&self) -> Result<()> {
        common::require(&self.name, "name")?;
        if let Some(start_time) = &self.start_time {
            if parse_start_time(start_time).is_none() {
                return Err(CohesityError::Parameter(format!("start_time '{}' is not in HH:MM format", start_time)));
            }
        }
        if self.state == DesiredState::Present {
            if self.protection_policy.is_none() || self.storage_domain.is_none() {
                return Err(CohesityError::Parameter(String::from("protection_policy and storage_domain are required to create a protection job")));
            }
            if self.sources.is_empty() {
                return Err(CohesityError::Parameter(String::from("protection_sources must name at least one source")));
            }
        }
        Ok(())
    }

    fn probe(&self, ctx: &ModuleContext) -> Result<StatusSnapshot<JobStatus>> {
        let job = match common::find_job(&ctx.session, &self.name, self.environment)? {
            Some(job) => job,
            None => return Ok(StatusSnapshot::new(JobStatus::Missing)),
        };
        let id = job.id.unwrap_or_default();
        if !self.wants_runs() {
            return Ok(StatusSnapshot::new(JobStatus::Exists { run: RunState::None, run_id: None }).with_id(id));
        }

        let backup_run = Self::last_run(ctx, id)?.and_then(|run| run.backup_run);
        let (run, run_id, error) = match backup_run {
            Some(b) => (
                b.status.as_deref().map(RunState::from_status).unwrap_or(RunState::None),
                b.job_run_id,
                b.error.filter(|e| !e.is_empty()),
            ),
            None => (RunState::None, None, None),
        };
        let mut snapshot = StatusSnapshot::new(JobStatus::Exists { run, run_id })
            .with_id(id)
            .with_error(error);
        if let Some(run_id) = run_id {
            snapshot = snapshot.with_detail("run_id", json!(run_id));
        }
        Ok(snapshot)
    }

    fn gate(&self, snapshot: &StatusSnapshot<JobStatus>) -> Result<Gate> {
        match (&snapshot.status, self.state) {
            (JobStatus::Missing, DesiredState::Started) => {
                Err(CohesityError::NotFound(String::from("The Cohesity protection job doesn't exist on the cluster")))
            }
            (JobStatus::Exists { run, .. }, DesiredState::Absent) if run.is_active() && !self.cancel_active => {
                Err(CohesityError::Parameter(String::from("The protection job has an active run; set cancel_active to delete it")))
            }
            _ => gate::evaluate(self.state, snapshot),
        }
    }

    fn submit(&self, ctx: &ModuleContext, action: TaskRequestType, snapshot: &StatusSnapshot<JobStatus>) -> Result<Submission> {
        match action {
            TaskRequestType::Create => {
                let job = self.create(ctx)?;
                Ok(Submission::new().with_id(job.id.unwrap_or_default()))
            }
            TaskRequestType::Remove => {
                let id = Self::job_id(snapshot)?;
                if let JobStatus::Exists { run, run_id } = &snapshot.status {
                    if run.is_active() {
                        Self::cancel_run(ctx, id, *run_id)?;
                    }
                }
                ctx.session.delete(&format!("/public/protectionJobs/{}", id), Some(&json!({"deleteSnapshots": self.delete_snapshots})))?;
                Ok(Submission::new().with_id(id))
            }
            TaskRequestType::Start => {
                let id = Self::job_id(snapshot)?;
                let previous = match &snapshot.status {
                    JobStatus::Exists { run_id: Some(run_id), .. } => json!(run_id),
                    _ => Value::Null,
                };
                ctx.session.request(
                    crate::client::Method::Post,
                    &format!("/public/protectionJobs/run/{}", id),
                    Some(&json!({"runType": self.run_type.code()})),
                )?;
                Ok(Submission::new().with_id(id).with_data("previous_run_id", previous))
            }
            TaskRequestType::Stop => {
                let id = Self::job_id(snapshot)?;
                let run_id = match &snapshot.status {
                    JobStatus::Exists { run_id, .. } => *run_id,
                    JobStatus::Missing => None,
                };
                Self::cancel_run(ctx, id, run_id)?;
                Ok(Submission::new().with_id(id))
            }
            other => Err(CohesityError::Other(format!("protection jobs do not support {}", other))),
        }
    }

    fn poll_plan(&self, action: TaskRequestType) -> Option<PollPlan> {
        match action {
            TaskRequestType::Start => Some(PollPlan::new(START_POLL_SECS, self.wait_minutes, OnTimeout::Accept)),
            TaskRequestType::Stop => {
                let interval = if self.environment == Environment::Oracle { ORACLE_STOP_POLL_SECS } else { STOP_POLL_SECS };
                Some(PollPlan::new(interval, self.wait_minutes, OnTimeout::Fail))
            }
            _ => None,
        }
    }

    fn poll_probe(&self, ctx: &ModuleContext, action: TaskRequestType, submission: &Submission) -> Result<StatusSnapshot<JobStatus>> {
        let snapshot = self.probe(ctx)?;
        if action != TaskRequestType::Start {
            return Ok(snapshot);
        }
        // the run we started has not been listed yet
        let previous = submission.data.get("previous_run_id").and_then(Value::as_u64);
        match &snapshot.status {
            JobStatus::Exists { run_id, .. } if previous.is_some() && *run_id == previous => {
                let mut pending = StatusSnapshot::new(JobStatus::Exists { run: RunState::None, run_id: None });
                pending.id = snapshot.id.clone();
                Ok(pending)
            }
            _ => Ok(snapshot),
        }
    }

    fn terminal(&self, action: TaskRequestType, snapshot: &StatusSnapshot<JobStatus>) -> Terminal {
        let run = match &snapshot.status {
            JobStatus::Exists { run, .. } => run,
            JobStatus::Missing if action == TaskRequestType::Stop => return Terminal::Reached,
            JobStatus::Missing => return Terminal::InFlight,
        };
        match action {
            TaskRequestType::Start => match run {
                RunState::Accepted | RunState::Running | RunState::Success | RunState::Canceled => Terminal::Reached,
                RunState::Failure => Terminal::Failed(snapshot.error.clone().unwrap_or_else(|| String::from("kFailure"))),
                RunState::None | RunState::Other(_) => Terminal::InFlight,
            },
            TaskRequestType::Stop => {
                if run.is_active() { Terminal::InFlight } else { Terminal::Reached }
            }
            _ => Terminal::Reached,
        }
    }

    fn message(&self, outcome: Outcome, _status: Option<&JobStatus>) -> String {
        let msg = match outcome {
            Outcome::Unchanged => match self.state {
                DesiredState::Present => "The Cohesity protection job already exists on the cluster",
                DesiredState::Absent => "The Cohesity protection job doesn't exist on the cluster",
                DesiredState::Started => "The Protection Job is already started",
                DesiredState::Stopped => "There is no active running job to cancel",
            },
            Outcome::WouldChange(TaskRequestType::Create) => "The Cohesity protection job doesn't exist. This action would create the protection job.",
            Outcome::WouldChange(TaskRequestType::Remove) => "The Cohesity protection job exists. This action would delete the protection job.",
            Outcome::WouldChange(TaskRequestType::Start) => "The Protection Job is not running. This action would start a protection job run.",
            Outcome::WouldChange(_) => "The Protection Job is running. This action would stop the protection job run.",
            Outcome::Submitted(TaskRequestType::Create) | Outcome::Completed(TaskRequestType::Create) => "The Cohesity protection job is created",
            Outcome::Submitted(TaskRequestType::Remove) | Outcome::Completed(TaskRequestType::Remove) => "The Cohesity protection job is deleted",
            Outcome::Completed(TaskRequestType::Stop) => "The Protection job run is stopped",
            Outcome::TimedOut(TaskRequestType::Stop) => "Request to stop the protection job is made. Timed out while checking if the job is stopped",
            Outcome::Accepted(TaskRequestType::Start) => "The protection job run is requested. The run has not been confirmed in the wait time",
            Outcome::Failed(_) => "The protection job run failed",
            _ => "The protection job run is started",
        };
        msg.to_string()
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

    fn task(yaml: &str) -> JobAction {
        serde_yaml::from_str::<JobTask>(yaml).unwrap().evaluate()
    }

    fn job_listing() -> Value {
        json!([{"id": 12, "name": "nightly", "environment": "kPhysical"}])
    }

    fn run(id: u64, status: &str) -> Value {
        json!([{"jobId": 12, "backupRun": {"jobRunId": id, "status": status}}])
    }

    #[test]
    fn test_start_is_satisfied_by_active_run() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/protectionJobs", 200, job_listing())
            .on(Method::Get, "/public/protectionRuns", 200, run(4401, "kRunning")));
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let result = reconcile(&task("name: nightly\nstate: started"), &ctx).unwrap();
        assert!(!result.changed);
        assert_eq!(result.msg, "The Protection Job is already started");
        assert_eq!(transport.count(Method::Post, "/public/protectionJobs/run"), 0);
    }

    #[test]
    fn test_start_waits_for_the_new_run() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/protectionJobs", 200, job_listing())
            .on(Method::Get, "/public/protectionRuns", 200, run(4400, "kSuccess"))
            .on(Method::Get, "/public/protectionRuns", 200, run(4400, "kSuccess"))
            .on(Method::Get, "/public/protectionRuns", 200, run(4401, "kAccepted"))
            .on(Method::Post, "/public/protectionJobs/run/12", 204, Value::Null));
        let sleeper = Arc::new(RecordingSleeper::default());
        let ctx = context_with(transport.clone(), sleeper.clone());

        let result = reconcile(&task("name: nightly\nstate: started\nondemand_run_type: Full"), &ctx).unwrap();
        assert!(result.changed);
        assert_eq!(result.msg, "The protection job run is started");
        assert_eq!(result.status.as_deref(), Some("kAccepted"));
        assert_eq!(sleeper.naps(), vec![Duration::from_secs(5)]);

        let posts = transport.sent(Method::Post, "/public/protectionJobs/run/12");
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].body, Some(json!({"runType": "kFull"})));
    }

    #[test]
    fn test_start_failure_carries_run_error() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/protectionJobs", 200, job_listing())
            .on(Method::Get, "/public/protectionRuns", 200, json!([]))
            .on(Method::Get, "/public/protectionRuns", 200,
                json!([{"backupRun": {"jobRunId": 4402, "status": "kFailure", "error": "Agent on db-01 is unreachable"}}]))
            .on(Method::Post, "/public/protectionJobs/run/12", 204, Value::Null));
        let ctx = context_with(transport, Arc::new(RecordingSleeper::default()));
        let result = reconcile(&task("name: nightly\nstate: started"), &ctx).unwrap();
        assert_eq!(result.error.as_deref(), Some("Agent on db-01 is unreachable"));
        assert!(result.into_outcome().is_err());
    }

    #[test]
    fn test_start_of_missing_job_is_not_found() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/protectionJobs", 200, json!([])));
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let err = reconcile(&task("name: nightly\nstate: started"), &ctx).unwrap_err();
        assert!(matches!(err, CohesityError::NotFound(_)));
        assert_eq!(transport.count(Method::Post, "/public/protectionJobs"), 0);
    }

    #[test]
    fn test_stop_of_missing_job_is_satisfied() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/protectionJobs", 200, json!([])));
        let ctx = context_with(transport, Arc::new(RecordingSleeper::default()));
        let result = reconcile(&task("name: nightly\nstate: stopped"), &ctx).unwrap();
        assert!(!result.changed);
        assert_eq!(result.msg, "There is no active running job to cancel");
    }

    #[test]
    fn test_stop_without_confirmation_fails() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/protectionJobs", 200, job_listing())
            .on(Method::Get, "/public/protectionRuns", 200, run(4401, "kRunning"))
            .on(Method::Post, "/public/protectionRuns/cancel/12", 204, Value::Null));
        let sleeper = Arc::new(RecordingSleeper::default());
        let ctx = context_with(transport.clone(), sleeper.clone());

        let err = reconcile(&task("name: nightly\nstate: stopped\nwait_minutes: 2"), &ctx).unwrap_err();
        match err {
            CohesityError::Timeout(msg) => assert_eq!(msg, "Request to stop the protection job is made. Timed out while checking if the job is stopped"),
            other => panic!("unexpected {:?}", other),
        }
        let cancels = transport.sent(Method::Post, "/public/protectionRuns/cancel/12");
        assert_eq!(cancels.len(), 1);
        assert_eq!(cancels[0].body, Some(json!({"jobRunId": 4401})));
        assert_eq!(sleeper.naps(), vec![Duration::from_secs(60)]);
    }

    #[test]
    fn test_stop_confirmed_by_canceled_run() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/protectionJobs", 200, job_listing())
            .on(Method::Get, "/public/protectionRuns", 200, run(4401, "kRunning"))
            .on(Method::Get, "/public/protectionRuns", 200, run(4401, "kCanceled"))
            .on(Method::Post, "/public/protectionRuns/cancel/12", 204, Value::Null));
        let ctx = context_with(transport, Arc::new(RecordingSleeper::default()));
        let result = reconcile(&task("name: nightly\nstate: stopped\nenvironment: Oracle"), &ctx).unwrap();
        assert!(result.changed);
        assert_eq!(result.msg, "The Protection job run is stopped");
    }

    #[test]
    fn test_create_resolves_policy_domain_and_sources() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/protectionJobs", 200, json!([]))
            .on(Method::Get, "/public/protectionPolicies", 200, json!([{"id": "4471:1581:3", "name": "Gold"}]))
            .on(Method::Get, "/public/viewBoxes", 200, json!([{"id": 5, "name": "DefaultStorageDomain"}]))
            .on(Method::Get, "/public/protectionSources/rootNodes", 200, json!([{"protectionSource": {"id": 2, "name": "Physical Servers"}}]))
            .on(Method::Get, "/public/protectionSources?environments", 200, json!([
                {"protectionSource": {"id": 2, "name": "Physical Servers"},
                 "nodes": [{"protectionSource": {"id": 77, "name": "db-01.corp.example.com"}}]}
            ]))
            .on(Method::Post, "/public/protectionJobs", 201, json!({"id": 31, "name": "nightly"})));
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let action = task(concat!(
            "name: nightly\n",
            "protection_sources: [db-01.corp.example.com]\n",
            "protection_policy: Gold\n",
            "storage_domain: DefaultStorageDomain\n",
            "start_time: '02:30'\n",
        ));

        let result = reconcile(&action, &ctx).unwrap();
        assert!(result.changed);
        assert_eq!(result.msg, "The Cohesity protection job is created");
        assert_eq!(result.data.get("id"), Some(&json!("31")));

        let body = transport.sent(Method::Post, "/public/protectionJobs")[0].body.clone().unwrap();
        assert_eq!(body["policyId"], json!("4471:1581:3"));
        assert_eq!(body["viewBoxId"], json!(5));
        assert_eq!(body["parentSourceId"], json!(2));
        assert_eq!(body["sourceIds"], json!([77]));
        assert_eq!(body["startTime"], json!({"hour": 2, "minute": 30}));
        assert_eq!(body["timezone"], json!("America/Los_Angeles"));
    }

    #[test]
    fn test_bad_start_time_fails_before_any_request() {
        let transport = Arc::new(MockTransport::new());
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let action = task("name: nightly\nprotection_sources: [a]\nprotection_policy: Gold\nstorage_domain: d\nstart_time: '25:00'");
        assert!(matches!(reconcile(&action, &ctx), Err(CohesityError::Parameter(_))));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_delete_with_active_run_needs_cancel_active() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/protectionJobs", 200, job_listing())
            .on(Method::Get, "/public/protectionRuns", 200, run(4401, "kRunning"))
            .on(Method::Post, "/public/protectionRuns/cancel/12", 204, Value::Null)
            .on(Method::Delete, "/public/protectionJobs/12", 204, Value::Null));
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));

        let err = reconcile(&task("name: nightly\nstate: absent"), &ctx).unwrap_err();
        assert!(matches!(err, CohesityError::Parameter(_)));
        assert_eq!(transport.count(Method::Delete, "/public/protectionJobs"), 0);

        let result = reconcile(&task("name: nightly\nstate: absent\ncancel_active: true\ndelete_snapshots: true"), &ctx).unwrap();
        assert_eq!(result.msg, "The Cohesity protection job is deleted");
        assert_eq!(transport.count(Method::Post, "/public/protectionRuns/cancel/12"), 1);
        let deletes = transport.sent(Method::Delete, "/public/protectionJobs/12");
        assert_eq!(deletes[0].body, Some(json!({"deleteSnapshots": true})));
    }

    #[test]
    fn test_start_time_parsing() {
        assert_eq!(parse_start_time("02:30"), Some((2, 30)));
        assert_eq!(parse_start_time("23:59"), Some((23, 59)));
        assert_eq!(parse_start_time("24:00"), None);
        assert_eq!(parse_start_time("2:3"), None);
        assert_eq!(parse_start_time("noon"), None);
    }

    #[test]
    fn test_every_status_is_classified() {
        use Classification::*;
        let active = JobStatus::Exists { run: RunState::Running, run_id: Some(1) };
        let idle = JobStatus::Exists { run: RunState::Success, run_id: Some(1) };
        let other = JobStatus::Exists { run: RunState::Other(String::from("kOnHold")), run_id: None };
        let table = [
            (&JobStatus::Missing, [Unsatisfied, Satisfied, Unsatisfied, Satisfied]),
            (&active, [Satisfied, Unsatisfied, Satisfied, Unsatisfied]),
            (&idle, [Satisfied, Unsatisfied, Unsatisfied, Satisfied]),
            (&other, [Satisfied, Unsatisfied, Unsatisfied, Satisfied]),
        ];
        let states = [DesiredState::Present, DesiredState::Absent, DesiredState::Started, DesiredState::Stopped];
        for (status, expected) in table {
            for (desired, want) in states.iter().zip(expected.iter()) {
                assert_eq!(&status.classify(*desired), want, "{:?} for {}", status, desired);
            }
        }
    }
}
