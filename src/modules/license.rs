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

use crate::client::Method;
use crate::config::ConnectionArgs;
use crate::error::{CohesityError, Result};
use crate::modules::common::{self, connection_args};
use crate::reconcile::{
    Classification, DesiredState, ModuleContext, Outcome, ResourceKind, ResourcePolicy, StatusSnapshot, StatusValue,
    Submission,
};
use crate::tasks::TaskRequestType;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

pub const MODULE: &str = "cohesity_license";

const EULA_VERSION: u32 = 2;

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct LicenseTask {
    pub license_key: String,
    #[serde(default)]
    pub state: DesiredState,
    pub cluster: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub validate_certs: Option<bool>,
}

impl LicenseTask {
    pub fn connection(&self) -> ConnectionArgs {
        connection_args!(self)
    }

    pub fn evaluate(&self) -> LicenseAction {
        LicenseAction { args: self.clone() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LicenseStatus {
    Unlicensed,
    Applied,
}

impl StatusValue for LicenseStatus {
    fn classify(&self, _desired: DesiredState) -> Classification {
        match self {
            LicenseStatus::Applied => Classification::Satisfied,
            LicenseStatus::Unlicensed => Classification::Unsatisfied,
        }
    }

    fn label(&self) -> String {
        match self {
            LicenseStatus::Applied => String::from("licensed"),
            LicenseStatus::Unlicensed => String::from("unlicensed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LicenseAction {
    args: LicenseTask,
}

impl ResourcePolicy for LicenseAction {
    type Status = LicenseStatus;

    fn kind(&self) -> ResourceKind {
        ResourceKind::License
    }

    fn target(&self) -> String {
        String::from("cluster license")
    }

    fn desired(&self) -> DesiredState {
        DesiredState::Present
    }

    fn validate(&self) -> Result<()> {
        common::require(&self.args.license_key, "license_key")?;
        match self.args.state {
            DesiredState::Present => Ok(()),
            other => Err(CohesityError::Parameter(format!("a cluster license can only be present, not {}", other))),
        }
    }

    /// A signed EULA is what marks the license as applied.
    fn probe(&self, ctx: &ModuleContext) -> Result<StatusSnapshot<LicenseStatus>> {
        let cluster: Option<Value> = ctx.session.get("/public/cluster")?;
        let applied = cluster.as_ref().and_then(|c| c.get("eulaConfig")).is_some_and(|e| !e.is_null());
        Ok(StatusSnapshot::new(if applied { LicenseStatus::Applied } else { LicenseStatus::Unlicensed }))
    }

    fn submit(&self, ctx: &ModuleContext, _action: TaskRequestType, _snapshot: &StatusSnapshot<LicenseStatus>) -> Result<Submission> {
        let body = json!({
            "signedVersion": EULA_VERSION,
            "signedByUser": ctx.session.username(),
            "licenseKey": self.args.license_key,
            "signedTime": Utc::now().timestamp(),
        });
        let response = ctx.session.execute(Method::Post, "/licenseAgreement", Some(&body))?;
        if response.status != 204 {
            return Err(CohesityError::TaskFailed {
                msg: String::from("Failed to apply cluster license"),
                details: response.server_message(),
            });
        }
        Ok(Submission::new())
    }

    fn message(&self, outcome: Outcome, _status: Option<&LicenseStatus>) -> String {
        match outcome {
            Outcome::Unchanged => String::from("The cluster license is already applied"),
            Outcome::WouldChange(_) => String::from("The cluster license is not applied. This action applies the cluster license"),
            Outcome::Submitted(_) | Outcome::Completed(_) => String::from("The cluster license is applied successfully"),
            _ => String::from("Failed to apply cluster license"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::reconcile;
    use crate::testing::{context_with, MockTransport, RecordingSleeper};
    use std::sync::Arc;

    fn license() -> LicenseAction {
        serde_yaml::from_str::<LicenseTask>("license_key: ABCD-1234").unwrap().evaluate()
    }

    #[test]
    fn test_apply_license() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/cluster", 200, json!({"name": "lab", "id": 12}))
            .on(Method::Post, "/licenseAgreement", 204, Value::Null));
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let result = reconcile(&license(), &ctx).unwrap();

        assert!(result.changed);
        assert_eq!(result.msg, "The cluster license is applied successfully");
        let body = transport.sent(Method::Post, "/licenseAgreement")[0].body.clone().unwrap();
        assert_eq!(body["signedVersion"], json!(2));
        assert_eq!(body["licenseKey"], json!("ABCD-1234"));
        assert!(body["signedTime"].as_i64().is_some_and(|t| t > 0));
    }

    #[test]
    fn test_signed_eula_is_unchanged() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/cluster", 200, json!({"name": "lab", "eulaConfig": {"signedVersion": 2}})));
        let ctx = context_with(transport.clone(), Arc::new(RecordingSleeper::default()));
        let result = reconcile(&license(), &ctx).unwrap();
        assert!(!result.changed);
        assert_eq!(result.msg, "The cluster license is already applied");
        assert_eq!(transport.count(Method::Post, "/licenseAgreement"), 0);
    }

    #[test]
    fn test_rejected_license_fails() {
        let transport = Arc::new(MockTransport::new()
            .on(Method::Get, "/public/cluster", 200, json!({"name": "lab"}))
            .on(Method::Post, "/licenseAgreement", 200, json!({"message": "License key is invalid"})));
        let ctx = context_with(transport, Arc::new(RecordingSleeper::default()));
        let err = reconcile(&license(), &ctx).unwrap_err();
        assert_eq!(err.msg(), "Failed to apply cluster license");
        assert_eq!(err.error_details(), Some("License key is invalid"));
    }

    #[test]
    fn test_only_present_is_accepted() {
        let task: LicenseTask = serde_yaml::from_str("license_key: ABCD-1234\nstate: absent").unwrap();
        assert!(matches!(task.evaluate().validate(), Err(CohesityError::Parameter(_))));
    }
}
