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

use crate::config::ConnectionArgs;
use crate::error::{CohesityError, Result};
use crate::modules::common::{self, connection_args, Environment};
use crate::reconcile::{
    Classification, DesiredState, ModuleContext, Outcome, ResourceKind, ResourcePolicy, StatusSnapshot, StatusValue,
    Submission,
};
use crate::tasks::TaskRequestType;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const MODULE: &str = "cohesity_source";

const ORACLE_APP_ENV: u32 = 19;
const HOST_WAIT: Duration = Duration::from_secs(10);
const HOST_WAIT_ATTEMPTS: u32 = 5;
const GENERIC_NAS_ENTITY: u32 = 11;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostType {
    #[default]
    Linux,
    Windows,
    Aix,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhysicalType {
    #[default]
    Host,
    WindowsCluster,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NasProtocol {
    #[default]
    #[serde(rename = "NFS")]
    Nfs,
    #[serde(rename = "SMB")]
    Smb,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SourceTask {
    pub endpoint: String,
    #[serde(default)]
    pub state: DesiredState,
    pub environment: Environment,
    #[serde(default)]
    pub host_type: HostType,
    #[serde(default)]
    pub physical_type: PhysicalType,
    #[serde(default)]
    pub force_register: bool,
    #[serde(default = "vcenter")]
    pub vmware_type: String,
    pub source_username: Option<String>,
    pub source_password: Option<String>,
    #[serde(default)]
    pub nas_protocol: NasProtocol,
    pub nas_username: Option<String>,
    pub nas_password: Option<String>,
    pub db_username: Option<String>,
    pub db_password: Option<String>,
    pub cluster: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub validate_certs: Option<bool>,
}

fn vcenter() -> String {
    String::from("VCenter")
}

impl SourceTask {
    pub fn connection(&self) -> ConnectionArgs {
        connection_args!(self)
    }

    pub fn evaluate(&self) -> SourceAction {
        SourceAction { args: self.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Registration {
    NotRegistered,
    /// Oracle only: the host is a physical source but not yet an Oracle one.
    HostOnly(u64),
    Registered(u64),
}

impl StatusValue for Registration {
    fn classify(&self, desired: DesiredState) -> Classification {
        match (self, desired) {
            (Registration::NotRegistered, DesiredState::Absent) => Classification::Satisfied,
            (Registration::Registered(_), DesiredState::Absent) => Classification::Unsatisfied,
            (Registration::HostOnly(_), DesiredState::Absent) => Classification::Unsatisfied,
            (Registration::Registered(_), _) => Classification::Satisfied,
            (Registration::NotRegistered, _) | (Registration::HostOnly(_), _) => Classification::Unsatisfied,
        }
    }

    fn label(&self) -> String {
        match self {
            Registration::NotRegistered => String::from("unregistered"),
            Registration::HostOnly(_) => String::from("host registered"),
            Registration::Registered(_) => String::from("registered"),
        }
    }
}

/// `DOMAIN\user` splits into domain and user; a bare user gets the local domain `.`.
fn nas_credentials(username: &str) -> (String, String) {
    match username.split_once('\\') {
        Some((domain, user)) => (domain.to_string(), user.to_string()),
        None => (String::from("."), username.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct SourceAction {
    args: SourceTask,
}

impl SourceAction {
    fn register_payload(&self, environment: Environment) -> Value {
        let mut body = json!({
            "endpoint": self.args.endpoint,
            "environment": environment.code(),
            "forceRegister": self.args.force_register,
        });
        match environment {
            Environment::VMware => {
                body["vmwareType"] = json!(format!("k{}", self.args.vmware_type));
                body["username"] = json!(self.args.source_username);
                body["password"] = json!(self.args.source_password);
            }
            Environment::Oracle | Environment::Physical => {
                body["environment"] = json!(Environment::Physical.code());
                body["hostType"] = json!(format!("k{:?}", self.args.host_type));
                body["physicalType"] = json!(format!("k{:?}", self.args.physical_type));
            }
            _ => {}
        }
        body
    }

    fn generic_nas_payload(&self) -> Value {
        let protocol = match self.args.nas_protocol {
            NasProtocol::Nfs => 1,
            NasProtocol::Smb => 2,
        };
        let mut body = json!({
            "entity": {
                "type": GENERIC_NAS_ENTITY,
                "genericNasEntity": {"protocol": protocol, "type": 1, "path": self.args.endpoint},
            },
            "entityInfo": {"endpoint": self.args.endpoint, "type": GENERIC_NAS_ENTITY},
        });
        if self.args.nas_protocol == NasProtocol::Smb {
            let (domain, user) = nas_credentials(self.args.nas_username.as_deref().unwrap_or_default());
            let password = self.args.nas_password.clone().unwrap_or_default();
            body["entityInfo"]["credentials"] = json!({
                "username": user,
                "password": password,
                "nasMountCredentials": {"protocol": 2, "username": user, "password": password, "domainName": domain},
            });
        }
        body
    }

    fn register(&self, ctx: &ModuleContext) -> Result<Submission> {
        if self.args.environment == Environment::GenericNas {
            let response: Value = ctx.session.post("/backupsources", &self.generic_nas_payload())?;
            let entity = &response["entity"];
            let source = json!({
                "id": entity["id"],
                "environment": Environment::GenericNas.code(),
                "name": entity["displayName"],
                "path": entity["genericNasEntity"]["path"],
            });
            return Ok(Submission::new().with_id(&entity["id"]).with_data("ProtectionSource", source));
        }

        let response: Value = ctx.session.post("/public/protectionSources/register", &self.register_payload(self.args.environment))?;
        let source = match self.args.environment {
            Environment::VMware => response.get("vmWareProtectionSource").cloned().unwrap_or(response.clone()),
            _ => response.get("physicalProtectionSource").cloned().unwrap_or(response.clone()),
        };
        Ok(Submission::new().with_id(&response["id"]).with_data("ProtectionSource", source))
    }

    /// A freshly registered host takes a moment to show up as a physical source.
    fn wait_for_host(&self, ctx: &ModuleContext) -> Result<u64> {
        for attempt in 1..=HOST_WAIT_ATTEMPTS {
            ctx.sleeper.sleep(HOST_WAIT);
            if let Some(id) = common::find_source_id(&ctx.session, Environment::Physical, &self.args.endpoint)? {
                return Ok(id);
            }
            ctx.output.debug(&format!("waiting for {} to appear as a physical source ({}/{})", self.args.endpoint, attempt, HOST_WAIT_ATTEMPTS));
        }
        Err(CohesityError::TaskFailed {
            msg: String::from("Error while registering Cohesity Physical Protection Source"),
            details: format!("{} did not appear as a physical source", self.args.endpoint),
        })
    }

    fn register_oracle(&self, ctx: &ModuleContext, snapshot: &StatusSnapshot<Registration>) -> Result<Submission> {
        let host_id = match snapshot.status {
            Registration::HostOnly(id) => id,
            _ => {
                ctx.session.post::<Option<Value>>("/public/protectionSources/register", &self.register_payload(Environment::Physical))?;
                self.wait_for_host(ctx)?
            }
        };
        let mut body = json!({
            "appEnvVec": [ORACLE_APP_ENV],
            "usesPersistentAgent": true,
            "ownerEntity": {"type": 6, "id": host_id, "displayName": self.args.endpoint},
        });
        let user = self.args.db_username.as_deref().unwrap_or_default();
        let password = self.args.db_password.as_deref().unwrap_or_default();
        if !user.is_empty() && !password.is_empty() {
            body["appCredentialsVec"] = json!([
                {"credentials": {"username": user, "password": password}, "envType": ORACLE_APP_ENV}
            ]);
        }
        ctx.session.post::<Option<Value>>("/applicationSourceRegistration", &body)?;
        Ok(Submission::new().with_id(host_id))
    }

    fn unregister(&self, ctx: &ModuleContext, id: &str) -> Result<Submission> {
        let path = match self.args.environment {
            Environment::Oracle => format!("/public/protectionSources/{}", id),
            _ => format!("/backupsources/{}", id),
        };
        ctx.session.delete(&path, None)?;
        Ok(Submission::new().with_id(id))
    }
}

impl ResourcePolicy for SourceAction {
    type Status = Registration;

    fn kind(&self) -> ResourceKind {
        ResourceKind::ProtectionSource
    }

    fn target(&self) -> String {
        self.args.endpoint.clone()
    }

    fn desired(&self) -> DesiredState {
        self.args.state
    }

    fn validate(&self) -> Result<()> {
        common::require(&self.args.endpoint, "endpoint")?;
        match self.args.state {
            DesiredState::Present | DesiredState::Absent => {}
            other => return Err(CohesityError::Parameter(format!("state must be present or absent, not {}", other))),
        }
        if self.args.environment == Environment::PhysicalFiles {
            return Err(CohesityError::Parameter(String::from("environment must be one of Physical, VMware, GenericNas, Oracle")));
        }
        if self.args.state == DesiredState::Present
            && self.args.environment == Environment::GenericNas
            && self.args.nas_protocol == NasProtocol::Smb
        {
            let missing: Vec<&str> = [("nas_username", &self.args.nas_username), ("nas_password", &self.args.nas_password)]
                .iter()
                .filter(|(_, v)| v.as_deref().unwrap_or_default().is_empty())
                .map(|(k, _)| *k)
                .collect();
            if !missing.is_empty() {
                return Err(CohesityError::Parameter(format!(
                    "The following variables are mandatory for this action (creation) when working with environment type (GenericNas): {}",
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn probe(&self, ctx: &ModuleContext) -> Result<StatusSnapshot<Registration>> {
        let endpoint = &self.args.endpoint;
        if self.args.environment != Environment::Oracle {
            return Ok(match common::find_source_id(&ctx.session, self.args.environment, endpoint)? {
                Some(id) => StatusSnapshot::new(Registration::Registered(id)).with_id(id),
                None => StatusSnapshot::new(Registration::NotRegistered),
            });
        }

        let host = common::find_source_id(&ctx.session, Environment::Physical, endpoint)?;
        let oracle = common::find_source_id(&ctx.session, Environment::Oracle, endpoint)?;
        Ok(match (host, oracle) {
            (Some(host), Some(oracle)) => StatusSnapshot::new(Registration::Registered(host))
                .with_id(host)
                .with_detail("oracle_id", json!(oracle)),
            (Some(host), None) => StatusSnapshot::new(Registration::HostOnly(host)).with_id(host),
            (None, _) => StatusSnapshot::new(Registration::NotRegistered),
        })
    }

    fn submit(&self, ctx: &ModuleContext, action: TaskRequestType, snapshot: &StatusSnapshot<Registration>) -> Result<Submission> {
        let submission = match action {
            TaskRequestType::Create if self.args.environment == Environment::Oracle => self.register_oracle(ctx, snapshot)?,
            TaskRequestType::Create => self.register(ctx)?,
            TaskRequestType::Remove => {
                let id = snapshot.id.as_deref().ok_or_else(|| {
                    CohesityError::NotFound(String::from("The Protection Source for this host is currently not registered"))
                })?;
                self.unregister(ctx, id)?
            }
            other => return Err(CohesityError::Other(format!("protection sources do not support {}", other))),
        };
        Ok(submission.with_data("endpoint", json!(self.args.endpoint)))
    }

    fn message(&self, outcome: Outcome, _status: Option<&Registration>) -> String {
        let msg = match outcome {
            Outcome::Unchanged if self.args.state == DesiredState::Absent => "The Protection Source for this host is currently not registered",
            Outcome::Unchanged => "The Protection Source for this host is already registered",
            Outcome::WouldChange(TaskRequestType::Remove) => {
                "Cohesity Protection Source is currently registered.  This action would unregister the Protection Source."
            }
            Outcome::WouldChange(_) => {
                "Cohesity Protection Source is not currently registered.  This action would register the Protection Source."
            }
            Outcome::Submitted(TaskRequestType::Remove) | Outcome::Completed(TaskRequestType::Remove) => {
                "Unregistration of Cohesity Protection Source Complete"
            }
            Outcome::Submitted(_) | Outcome::Completed(_) => "Registration of Cohesity Protection Source Complete",
            _ => "Error while registering Cohesity Protection Source",
        };
        msg.to_string()
    }
}
