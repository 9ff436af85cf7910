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

//! Protection policies: named retention and scheduling rules that protection
//! jobs refer to. A policy is created once and never updated in place.

use crate::client::models::NamedEntity;
use crate::client::{with_query, ClusterSession};
use crate::config::ConnectionArgs;
use crate::error::{CohesityError, Result};
use crate::modules::common::{self, connection_args};
use crate::reconcile::{
    Classification, DesiredState, ModuleContext, Outcome, ResourceKind, ResourcePolicy, StatusSnapshot, StatusValue,
    Submission,
};
use crate::tasks::TaskRequestType;
use chrono::{NaiveTime, Timelike};
use serde::Deserialize;
use serde_json::{json, Value};

pub const MODULE: &str = "cohesity_policy";

const PERIODICITIES: [&str; 3] = ["Daily", "Monthly", "Continuous"];

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Schedule {
    pub periodicity: String,
    #[serde(default)]
    pub days: Vec<String>,
    pub day: Option<String>,
    pub day_count: Option<String>,
    pub backup_interval_mins: Option<u64>,
    pub days_to_retain: Option<u64>,
}

impl Schedule {
    fn check(&self, field: &str) -> Result<()> {
        if !PERIODICITIES.contains(&self.periodicity.as_str()) {
            return Err(CohesityError::Parameter(format!(
                "{}.periodicity must be one of {}, not {}", field, PERIODICITIES.join(", "), self.periodicity
            )));
        }
        let missing = match self.periodicity.as_str() {
            "Monthly" if self.day.is_none() || self.day_count.is_none() => Some("day and day_count"),
            "Continuous" if self.backup_interval_mins.is_none() => Some("backup_interval_mins"),
            _ => None,
        };
        match missing {
            Some(what) => Err(CohesityError::Parameter(format!("{} with {} periodicity needs {}", field, self.periodicity, what))),
            None => Ok(()),
        }
    }

    fn document(&self) -> Value {
        let mut schedule = json!({"periodicity": format!("k{}", self.periodicity)});
        match self.periodicity.as_str() {
            "Daily" => {
                let days: Vec<String> = self.days.iter().map(|d| format!("k{}", d)).collect();
                schedule["dailySchedule"] = json!({"days": days});
            }
            "Monthly" => {
                schedule["monthlySchedule"] = json!({
                    "day": format!("k{}", self.day.as_deref().unwrap_or_default()),
                    "dayCount": format!("k{}", self.day_count.as_deref().unwrap_or_default()),
                });
            }
            _ => {
                schedule["continuousSchedule"] = json!({"backupIntervalMins": self.backup_interval_mins});
            }
        }
        schedule
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct BlackoutWindow {
    #[serde(default = "wednesday")]
    pub day: String,
    #[serde(default = "noon")]
    pub start_time: String,
    #[serde(default = "half_past_noon")]
    pub end_time: String,
}

fn wednesday() -> String {
    String::from("Wednesday")
}

fn noon() -> String {
    String::from("12:00")
}

fn half_past_noon() -> String {
    String::from("12:30")
}

fn time_of_day(value: &str) -> Result<Value> {
    let time = NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| CohesityError::Parameter(format!("blackout times must be HH:MM, not {}", value)))?;
    Ok(json!({"hour": time.hour(), "minute": time.minute()}))
}

impl BlackoutWindow {
    fn document(&self) -> Result<Value> {
        Ok(json!({
            "day": format!("k{}", self.day),
            "startTime": time_of_day(&self.start_time)?,
            "endTime": time_of_day(&self.end_time)?,
        }))
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ExtendedRetention {
    pub backup_run_type: Option<String>,
    #[serde(default = "week")]
    pub retention_periodicity: String,
    pub days_to_retain: Option<u64>,
    #[serde(default = "one")]
    pub multiplier: u32,
}

fn week() -> String {
    String::from("Week")
}

fn one() -> u32 {
    1
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ArchivalCopy {
    pub target_name: String,
    pub target_type: String,
    #[serde(default = "day")]
    pub periodicity: String,
    pub days_to_retain: Option<u64>,
    #[serde(default = "one")]
    pub multiplier: u32,
    #[serde(default = "yes")]
    pub copy_partial: bool,
}

fn day() -> String {
    String::from("Day")
}

fn yes() -> bool {
    true
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct PolicyTask {
    pub name: String,
    #[serde(default)]
    pub state: DesiredState,
    #[serde(default)]
    pub description: String,
    #[serde(default = "ninety")]
    pub days_to_retain: u64,
    pub incremental_backup_schedule: Option<Schedule>,
    pub full_backup_schedule: Option<Schedule>,
    pub log_backup_schedule: Option<Schedule>,
    pub bmr_backup_schedule: Option<Schedule>,
    #[serde(default)]
    pub blackout_window: Vec<BlackoutWindow>,
    #[serde(default = "three")]
    pub retries: u32,
    #[serde(default = "thirty")]
    pub retry_interval: u32,
    #[serde(default)]
    pub extended_retention: Vec<ExtendedRetention>,
    #[serde(default)]
    pub archival_copy: Vec<ArchivalCopy>,
    pub cluster: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub validate_certs: Option<bool>,
}

fn ninety() -> u64 {
    90
}

fn three() -> u32 {
    3
}

fn thirty() -> u32 {
    30
}

impl PolicyTask {
    pub fn connection(&self) -> ConnectionArgs {
        connection_args!(self)
    }

    pub fn evaluate(&self) -> PolicyAction {
        PolicyAction { args: self.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyStatus {
    Missing,
    Present(String),
}

impl StatusValue for PolicyStatus {
    fn classify(&self, desired: DesiredState) -> Classification {
        match (self, desired) {
            (PolicyStatus::Missing, DesiredState::Absent) | (PolicyStatus::Present(_), DesiredState::Present) => {
                Classification::Satisfied
            }
            _ => Classification::Unsatisfied,
        }
    }

    fn label(&self) -> String {
        match self {
            PolicyStatus::Missing => String::from("absent"),
            PolicyStatus::Present(_) => String::from("present"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyAction {
    args: PolicyTask,
}

fn vault_id(session: &ClusterSession, name: &str) -> Result<Value> {
    let path = with_query("/public/vaults", &[("name", name.to_string())]);
    let vaults: Option<Vec<NamedEntity>> = session.get(&path)?;
    vaults.unwrap_or_default()
        .into_iter()
        .find(|v| v.name == name)
        .map(|v| v.id)
        .ok_or_else(|| CohesityError::NotFound(format!("Failed to find external target {}", name)))
}

impl PolicyAction {
    fn retention_for(&self, schedule: &Schedule) -> u64 {
        schedule.days_to_retain.unwrap_or(self.args.days_to_retain)
    }

    fn document(&self, session: &ClusterSession) -> Result<Value> {
        let args = &self.args;
        let mut body = json!({
            "name": args.name,
            "description": args.description,
            "daysToKeep": args.days_to_retain,
            "retries": args.retries,
            "retryIntervalMins": args.retry_interval,
        });
        if !args.blackout_window.is_empty() {
            let windows = args.blackout_window.iter().map(BlackoutWindow::document).collect::<Result<Vec<Value>>>()?;
            body["blackoutPeriods"] = json!(windows);
        }
        if let Some(schedule) = &args.incremental_backup_schedule {
            body["incrementalSchedulingPolicy"] = schedule.document();
        }
        if let Some(schedule) = &args.full_backup_schedule {
            body["fullSchedulingPolicy"] = schedule.document();
        }
        if let Some(schedule) = &args.log_backup_schedule {
            body["logSchedulingPolicy"] = schedule.document();
            body["daysToKeepLog"] = json!(self.retention_for(schedule));
        }
        if let Some(schedule) = &args.bmr_backup_schedule {
            body["systemSchedulingPolicy"] = schedule.document();
            body["daysToKeepSystem"] = json!(self.retention_for(schedule));
        }
        if !args.extended_retention.is_empty() {
            let retentions: Vec<Value> = args.extended_retention.iter()
                .map(|r| {
                    let mut retention = json!({
                        "periodicity": format!("k{}", r.retention_periodicity),
                        "daysToKeep": r.days_to_retain.unwrap_or(args.days_to_retain),
                        "multiplier": r.multiplier,
                    });
                    // run type only applies alongside a full schedule
                    if let (Some(_), Some(run_type)) = (&args.full_backup_schedule, r.backup_run_type.as_ref().filter(|t| !t.is_empty())) {
                        retention["backupRunType"] = json!(format!("k{}", run_type));
                    }
                    retention
                })
                .collect();
            body["extendedRetentionPolicies"] = json!(retentions);
        }
        if !args.archival_copy.is_empty() {
            let mut copies = Vec::new();
            for copy in &args.archival_copy {
                copies.push(json!({
                    "multiplier": copy.multiplier,
                    "copyPartial": copy.copy_partial,
                    "daysToKeep": copy.days_to_retain.unwrap_or(args.days_to_retain),
                    "periodicity": format!("k{}", copy.periodicity),
                    "target": {
                        "vaultName": copy.target_name,
                        "vaultType": format!("k{}", copy.target_type),
                        "vaultId": vault_id(session, &copy.target_name)?,
                    },
                }));
            }
            body["snapshotArchivalCopyPolicies"] = json!(copies);
        }
        Ok(body)
    }
}

impl ResourcePolicy for PolicyAction {
    type Status = PolicyStatus;

    fn kind(&self) -> ResourceKind {
        ResourceKind::ProtectionPolicy
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
                let incremental = self.args.incremental_backup_schedule.as_ref().ok_or_else(|| {
                    CohesityError::Parameter(String::from("incremental_backup_schedule is required to create a policy"))
                })?;
                incremental.check("incremental_backup_schedule")?;
                let others = [
                    ("full_backup_schedule", &self.args.full_backup_schedule),
                    ("log_backup_schedule", &self.args.log_backup_schedule),
                    ("bmr_backup_schedule", &self.args.bmr_backup_schedule),
                ];
                for (field, schedule) in others {
                    if let Some(schedule) = schedule {
                        schedule.check(field)?;
                    }
                }
                for window in &self.args.blackout_window {
                    window.document()?;
                }
                Ok(())
            }
            DesiredState::Absent => Ok(()),
            other => Err(CohesityError::Parameter(format!("state must be present or absent, not {}", other))),
        }
    }

    fn probe(&self, ctx: &ModuleContext) -> Result<StatusSnapshot<PolicyStatus>> {
        let path = with_query("/public/protectionPolicies", &[("names", self.args.name.clone())]);
        let policies: Option<Vec<NamedEntity>> = ctx.session.get(&path)?;
        let found = policies.unwrap_or_default().into_iter().find(|p| p.name == self.args.name);
        Ok(match found {
            Some(policy) => {
                let id = policy.id_string();
                StatusSnapshot::new(PolicyStatus::Present(id.clone())).with_id(id)
            }
            None => StatusSnapshot::new(PolicyStatus::Missing),
        })
    }

    fn submit(&self, ctx: &ModuleContext, action: TaskRequestType, snapshot: &StatusSnapshot<PolicyStatus>) -> Result<Submission> {
        match (action, &snapshot.status) {
            (TaskRequestType::Create, _) => {
                let created: NamedEntity = ctx.session.post("/public/protectionPolicies", &self.document(&ctx.session)?)?;
                Ok(Submission::new().with_id(created.id_string()).with_data("task_name", json!(self.args.name)))
            }
            (TaskRequestType::Remove, PolicyStatus::Present(id)) => {
                ctx.session.delete(&format!("/public/protectionPolicies/{}", id), None)?;
                Ok(Submission::new().with_id(id))
            }
            (other, _) => Err(CohesityError::Other(format!("protection policies do not support {}", other))),
        }
    }

    fn message(&self, outcome: Outcome, _status: Option<&PolicyStatus>) -> String {
        match outcome {
            Outcome::Unchanged if self.args.state == DesiredState::Absent => String::from("Cohesity protection policy doesn't exist"),
            Outcome::Unchanged => String::from("The Cohesity protection policy with specified name is already present"),
            Outcome::WouldChange(TaskRequestType::Create) => {
                String::from("Cohesity protection policy doesn't exist. This action would create a protection policy")
            }
            Outcome::WouldChange(_) => String::from("Cohesity protection policy is present. This action would delete the policy."),
            Outcome::Submitted(TaskRequestType::Create) | Outcome::Completed(TaskRequestType::Create) => {
                String::from("Cohesity protection policy is created successfully")
            }
            Outcome::Submitted(_) | Outcome::Completed(_) => String::from("Cohesity protection policy is deleted"),
            _ => String::from("Failed to manage the Cohesity protection policy"),
        }
    }
}
