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

use crate::client::models::View;
use crate::client::with_query;
use crate::config::ConnectionArgs;
use crate::error::{CohesityError, Result};
use crate::modules::common::{self, connection_args};
use crate::reconcile::{
    Classification, DesiredState, Gate, ModuleContext, Outcome, ResourceKind, ResourcePolicy, StatusSnapshot,
    StatusValue, Submission,
};
use crate::tasks::TaskRequestType;
use serde::Deserialize;
use serde_json::{json, Value};

pub const MODULE: &str = "cohesity_view";

const GIB: u64 = 1024 * 1024 * 1024;
const PROTOCOLS: [&str; 4] = ["All", "NFSOnly", "SMBOnly", "S3Only"];

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct WhitelistEntry {
    pub subnet_ip: String,
    pub subnet_mask: String,
    #[serde(default = "read_write")]
    pub nfs_permission: String,
    #[serde(default = "read_write")]
    pub smb_permission: String,
    #[serde(default)]
    pub nfs_root_squash: bool,
    #[serde(default)]
    pub description: String,
}

fn read_write() -> String {
    String::from("ReadWrite")
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ViewSecurity {
    pub security_mode: Option<String>,
    #[serde(default)]
    pub override_global_whitelist: bool,
    #[serde(default)]
    pub whitelist: Vec<WhitelistEntry>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ViewQuota {
    #[serde(default)]
    pub set_logical_quota: bool,
    #[serde(default = "twenty_gib")]
    pub hard_limit_bytes: u64,
    #[serde(default)]
    pub set_alert_threshold: bool,
    #[serde(default = "eighteen_gib")]
    pub alert_limit_bytes: u64,
}

fn twenty_gib() -> u64 {
    20 * GIB
}

fn eighteen_gib() -> u64 {
    18 * GIB
}

impl ViewQuota {
    /// The `logicalQuota` document, or `None` when neither limit is enabled.
    fn document(&self) -> Option<Value> {
        let mut quota = serde_json::Map::new();
        if self.set_logical_quota {
            quota.insert(String::from("hardLimitBytes"), json!(self.hard_limit_bytes));
        }
        if self.set_alert_threshold {
            quota.insert(String::from("alertLimitBytes"), json!(self.alert_limit_bytes));
        }
        (!quota.is_empty()).then_some(Value::Object(quota))
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct NfsOptions {
    #[serde(default = "yes")]
    pub view_discovery: bool,
    pub user_id: Option<u32>,
    pub group_id: Option<u32>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SmbOptions {
    #[serde(default = "yes")]
    pub view_discovery: bool,
    #[serde(default)]
    pub access_based_enumeration: bool,
}

fn yes() -> bool {
    true
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ViewTask {
    pub name: String,
    #[serde(default)]
    pub state: DesiredState,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub storage_domain: String,
    #[serde(default = "backup_target_low")]
    pub qos_policy: String,
    #[serde(default = "all_protocols")]
    pub protocol: String,
    pub case_insensitive: Option<bool>,
    pub object_key_pattern: Option<String>,
    #[serde(default = "yes")]
    pub inline_dedupe_compression: bool,
    pub security: Option<ViewSecurity>,
    pub quota: Option<ViewQuota>,
    pub nfs_options: Option<NfsOptions>,
    pub smb_options: Option<SmbOptions>,
    pub cluster: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub validate_certs: Option<bool>,
}

fn backup_target_low() -> String {
    String::from("Backup Target Low")
}

fn all_protocols() -> String {
    String::from("All")
}

impl ViewTask {
    pub fn connection(&self) -> ConnectionArgs {
        connection_args!(self)
    }

    pub fn evaluate(&self) -> ViewAction {
        ViewAction { args: self.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewStatus {
    Missing,
    InSync,
    /// Present, with the names of the settings that differ.
    Drifted(Vec<String>),
}

impl StatusValue for ViewStatus {
    fn classify(&self, desired: DesiredState) -> Classification {
        match (self, desired) {
            (ViewStatus::Missing, DesiredState::Absent) => Classification::Satisfied,
            (ViewStatus::InSync, DesiredState::Absent) | (ViewStatus::Drifted(_), DesiredState::Absent) => Classification::Unsatisfied,
            (ViewStatus::InSync, _) => Classification::Satisfied,
            (ViewStatus::Missing, _) | (ViewStatus::Drifted(_), _) => Classification::Unsatisfied,
        }
    }

    fn label(&self) -> String {
        match self {
            ViewStatus::Missing => String::from("absent"),
            ViewStatus::InSync => String::from("present"),
            ViewStatus::Drifted(fields) => format!("differs in {}", fields.join(", ")),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ViewList {
    views: Vec<View>,
}

#[derive(Debug, Clone)]
pub struct ViewAction {
    args: ViewTask,
}

impl ViewAction {
    fn view_path(&self) -> String {
        format!("/public/views/{}", urlencoding::encode(&self.args.name))
    }

    fn quota(&self) -> Option<Value> {
        self.args.quota.as_ref().and_then(ViewQuota::document)
    }

    /// Settings shared by the create and update documents.
    fn settings(&self) -> Value {
        let mut body = json!({
            "description": self.args.description,
            "qos": {"principalName": self.args.qos_policy},
            "protocolAccess": format!("k{}", self.args.protocol),
            "storagePolicyOverride": {"disableInlineDedupAndCompression": !self.args.inline_dedupe_compression},
        });
        if let Some(security) = &self.args.security {
            if self.args.protocol == "All" {
                if let Some(mode) = &security.security_mode {
                    body["securityMode"] = json!(format!("k{}", mode));
                }
            }
            if security.override_global_whitelist && !security.whitelist.is_empty() {
                let subnets: Vec<Value> = security.whitelist.iter()
                    .map(|s| json!({
                        "ip": s.subnet_ip,
                        "netmaskIp4": s.subnet_mask,
                        "nfsAccess": format!("k{}", s.nfs_permission),
                        "smbAccess": format!("k{}", s.smb_permission),
                        "nfsRootSquash": s.nfs_root_squash,
                        "description": s.description,
                    }))
                    .collect();
                body["overrideGlobalWhitelist"] = json!(true);
                body["subnetWhitelist"] = json!(subnets);
            }
        }
        if let Some(quota) = self.quota() {
            body["logicalQuota"] = quota;
        }
        if let Some(nfs) = &self.args.nfs_options {
            body["enableNfsViewDiscovery"] = json!(nfs.view_discovery);
            if nfs.user_id.is_some() || nfs.group_id.is_some() {
                body["nfsRootPermissions"] = json!({"uid": nfs.user_id.unwrap_or(0), "gid": nfs.group_id.unwrap_or(0)});
            }
        }
        if let Some(smb) = &self.args.smb_options {
            body["enableSmbViewDiscovery"] = json!(smb.view_discovery);
            body["enableSmbAccessBasedEnumeration"] = json!(smb.access_based_enumeration);
        }
        body
    }

    /// Names of the requested settings the existing view does not carry.
    fn drift(&self, view: &View) -> Vec<String> {
        let mut fields = Vec::new();
        if view.description.as_deref().unwrap_or_default() != self.args.description {
            fields.push(String::from("description"));
        }
        let qos = view.qos.as_ref().and_then(|q| q.get("principalName")).and_then(Value::as_str);
        if qos.is_some_and(|q| q != self.args.qos_policy) {
            fields.push(String::from("qos_policy"));
        }
        let protocol = format!("k{}", self.args.protocol);
        if view.protocol_access.as_ref().is_some_and(|p| *p != protocol) {
            fields.push(String::from("protocol"));
        }
        if let Some(wanted) = self.quota() {
            let current = view.logical_quota.clone().unwrap_or(Value::Null);
            let matches = ["hardLimitBytes", "alertLimitBytes"].iter().all(|k| wanted.get(*k) == current.get(*k));
            if !matches {
                fields.push(String::from("quota"));
            }
        }
        fields
    }

    fn create(&self, ctx: &ModuleContext) -> Result<Submission> {
        let mut body = self.settings();
        body["name"] = json!(self.args.name);
        body["viewBoxId"] = json!(common::storage_domain_id(&ctx.session, &self.args.storage_domain)?);
        body["caseInsensitiveNamesEnabled"] = json!(self.args.case_insensitive.unwrap_or(false));
        if self.args.protocol == "S3Only" {
            if let Some(pattern) = self.args.object_key_pattern.as_ref().filter(|p| !p.is_empty()) {
                body["s3KeyMappingConfig"] = json!(format!("k{}", pattern));
            }
        }
        let created: Value = ctx.session.post("/public/views", &body)?;
        let mut submission = Submission::new();
        if let Some(id) = created.get("viewId").filter(|id| !id.is_null()) {
            submission = submission.with_id(id);
        }
        Ok(submission)
    }
}

impl ResourcePolicy for ViewAction {
    type Status = ViewStatus;

    fn kind(&self) -> ResourceKind {
        ResourceKind::View
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
                common::require(&self.args.storage_domain, "storage_domain")?;
                if self.args.case_insensitive.is_none() {
                    return Err(CohesityError::Parameter(String::from("case_insensitive is required to create a view")));
                }
                if !PROTOCOLS.contains(&self.args.protocol.as_str()) {
                    return Err(CohesityError::Parameter(format!(
                        "protocol must be one of {}, not {}", PROTOCOLS.join(", "), self.args.protocol
                    )));
                }
                Ok(())
            }
            DesiredState::Absent => Ok(()),
            other => Err(CohesityError::Parameter(format!("state must be present or absent, not {}", other))),
        }
    }

    fn probe(&self, ctx: &ModuleContext) -> Result<StatusSnapshot<ViewStatus>> {
        let path = with_query("/public/views", &[("viewNames", self.args.name.clone())]);
        let found: Option<ViewList> = ctx.session.get(&path)?;
        let view = found.unwrap_or_default().views.into_iter().find(|v| v.name == self.args.name);
        let view = match view {
            Some(view) => view,
            None => return Ok(StatusSnapshot::new(ViewStatus::Missing)),
        };
        let drift = self.drift(&view);
        let status = if drift.is_empty() { ViewStatus::InSync } else { ViewStatus::Drifted(drift) };
        Ok(StatusSnapshot::new(status).with_detail("view_name", json!(view.name)))
    }

    fn gate(&self, snapshot: &StatusSnapshot<ViewStatus>) -> Result<Gate> {
        match (&snapshot.status, self.args.state) {
            (ViewStatus::Drifted(_), DesiredState::Present) => Ok(Gate::Needs(TaskRequestType::Modify)),
            _ => crate::reconcile::gate::evaluate(self.args.state, snapshot),
        }
    }

    fn submit(&self, ctx: &ModuleContext, action: TaskRequestType, _snapshot: &StatusSnapshot<ViewStatus>) -> Result<Submission> {
        let submission = match action {
            TaskRequestType::Create => self.create(ctx)?,
            TaskRequestType::Modify => {
                let updated: Value = ctx.session.put(&self.view_path(), &self.settings())?;
                match updated.get("viewId").filter(|id| !id.is_null()) {
                    Some(id) => Submission::new().with_id(id),
                    None => Submission::new(),
                }
            }
            TaskRequestType::Remove => {
                ctx.session.delete(&self.view_path(), None)?;
                Submission::new()
            }
            other => return Err(CohesityError::Other(format!("views do not support {}", other))),
        };
        Ok(submission.with_data("view_name", json!(self.args.name)))
    }

    fn message(&self, outcome: Outcome, status: Option<&ViewStatus>) -> String {
        match outcome {
            Outcome::Unchanged if self.args.state == DesiredState::Absent => String::from("Cohesity view doesn't exist"),
            Outcome::Unchanged => String::from("Cohesity view is already present with the requested settings"),
            Outcome::WouldChange(TaskRequestType::Create) => String::from("Cohesity view doesn't exist. This action would create a new Cohesity view"),
            Outcome::WouldChange(TaskRequestType::Modify) => format!(
                "Cohesity view {}. This action would update the view.",
                status.map(|s| s.label()).unwrap_or_default()
            ),
            Outcome::WouldChange(_) => String::from("Cohesity view is present. This action would delete the view."),
            Outcome::Submitted(TaskRequestType::Create) | Outcome::Completed(TaskRequestType::Create) => {
                String::from("Cohesity view is created successfully")
            }
            Outcome::Submitted(TaskRequestType::Modify) | Outcome::Completed(TaskRequestType::Modify) => {
                String::from("Cohesity view is updated successfully")
            }
            Outcome::Submitted(_) | Outcome::Completed(_) => String::from("Cohesity view is deleted successfully"),
            _ => String::from("Failed to manage the Cohesity view"),
        }
    }
}
