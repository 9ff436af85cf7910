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
    Classification, DesiredState, ModuleContext, OnTimeout, Outcome, PollPlan, ResourceKind, ResourcePolicy,
    StatusSnapshot, StatusValue, Submission,
};
use crate::tasks::TaskRequestType;
use serde::Deserialize;
use serde_json::{json, Value};

pub const MODULE: &str = "cohesity_virtual_cluster";

const POLL_SECS: u64 = 120;
const ALREADY_CLUSTERED: &str = "Node is already part of a cluster";

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct VirtualClusterTask {
    pub cluster_name: String,
    #[serde(default)]
    pub state: DesiredState,
    #[serde(default)]
    pub metadata_fault_tolerance: u32,
    #[serde(default = "yes")]
    pub enable_encryption: bool,
    #[serde(default = "yes")]
    pub enable_fips_mode: bool,
    #[serde(default = "one")]
    pub encryption_keys_rotation_period: u32,
    #[serde(default)]
    pub cluster_gateway: String,
    #[serde(default)]
    pub cluster_subnet_mask: String,
    #[serde(default)]
    pub domain_names: Vec<String>,
    #[serde(default)]
    pub ntp_servers: Vec<String>,
    #[serde(default)]
    pub dns_servers: Vec<String>,
    #[serde(default)]
    pub virtual_ips: Vec<String>,
    #[serde(default)]
    pub virtual_ip_hostname: String,
    #[serde(default)]
    pub nodes_ip: Vec<String>,
    #[serde(default = "yes")]
    pub wait: bool,
    #[serde(default = "two_hours")]
    pub wait_minutes: u64,
    pub cluster: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub validate_certs: Option<bool>,
}

fn yes() -> bool {
    true
}

fn one() -> u32 {
    1
}

fn two_hours() -> u64 {
    120
}

impl VirtualClusterTask {
    pub fn connection(&self) -> ConnectionArgs {
        connection_args!(self)
    }

    pub fn evaluate(&self) -> VirtualClusterAction {
        VirtualClusterAction { args: self.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterState {
    Unclustered,
    Clustered(String),
}

impl StatusValue for ClusterState {
    fn classify(&self, desired: DesiredState) -> Classification {
        match (self, desired) {
            (ClusterState::Unclustered, DesiredState::Absent) => Classification::Satisfied,
            (ClusterState::Unclustered, _) => Classification::Unsatisfied,
            (ClusterState::Clustered(_), DesiredState::Absent) => Classification::Unsatisfied,
            (ClusterState::Clustered(_), _) => Classification::Satisfied,
        }
    }

    fn label(&self) -> String {
        match self {
            ClusterState::Unclustered => String::from("absent"),
            ClusterState::Clustered(name) => name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VirtualClusterAction {
    args: VirtualClusterTask,
}

impl VirtualClusterAction {
    fn payload(&self) -> Value {
        let nodes: Vec<Value> = self.args.nodes_ip.iter().map(|ip| json!({"nodeIp": ip})).collect();
        json!({
            "clusterName": self.args.cluster_name,
            "metadataFaultTolerance": self.args.metadata_fault_tolerance,
            "encryptionConfig": {
                "enableEncryption": self.args.enable_encryption,
                "enableFipsMode": self.args.enable_fips_mode,
                "rotationPeriod": self.args.encryption_keys_rotation_period,
            },
            "networkConfig": {
                "clusterGateway": self.args.cluster_gateway,
                "clusterSubnetMask": self.args.cluster_subnet_mask,
                "dnsServers": self.args.dns_servers,
                "domainNames": self.args.domain_names,
                "ntpServers": self.args.ntp_servers,
                "vipHostname": self.args.virtual_ip_hostname,
                "vips": self.args.virtual_ips,
            },
            "nodeConfigs": nodes,
        })
    }

    fn create(&self, ctx: &ModuleContext) -> Result<Submission> {
        let response = ctx.session.execute(Method::Post, "/public/clusters/virtualEdition", Some(&self.payload()))?;
        if response.is_success() {
            let body: Option<Value> = response.json()?;
            let mut submission = Submission::new();
            if let Some(Value::Object(map)) = body {
                submission.data = map;
            }
            return Ok(submission.with_data("name", json!(self.args.cluster_name)));
        }
        let message = response.server_message();
        if message.contains(ALREADY_CLUSTERED) {
            ctx.output.info(&format!("{}, waiting for the cluster to form", ALREADY_CLUSTERED));
            return Ok(Submission::new().with_data("name", json!(self.args.cluster_name)));
        }
        Err(CohesityError::Http {
            status: response.status,
            message: format!("Failed to create virtual edition cluster: {}", message),
        })
    }

    fn destroy(&self, ctx: &ModuleContext, name: &str) -> Result<Submission> {
        let response = ctx.session.execute(Method::Delete, "/public/clusters", None)?;
        if !response.is_success() {
            return Err(CohesityError::Http {
                status: response.status,
                message: format!("Failed to destroy virtual edition cluster: {}", response.server_message()),
            });
        }
        Ok(Submission::new().with_data("name", json!(name)))
    }
}

impl ResourcePolicy for VirtualClusterAction {
    type Status = ClusterState;

    fn kind(&self) -> ResourceKind {
        ResourceKind::VirtualCluster
    }

    fn target(&self) -> String {
        self.args.cluster_name.clone()
    }

    fn desired(&self) -> DesiredState {
        self.args.state
    }

    fn validate(&self) -> Result<()> {
        common::require(&self.args.cluster_name, "cluster_name")?;
        match self.args.state {
            DesiredState::Present => {
                common::require(&self.args.cluster_gateway, "cluster_gateway")?;
                common::require(&self.args.cluster_subnet_mask, "cluster_subnet_mask")?;
                common::require(&self.args.virtual_ip_hostname, "virtual_ip_hostname")?;
                if self.args.nodes_ip.is_empty() {
                    return Err(CohesityError::Parameter(String::from("nodes_ip must list at least one node")));
                }
                Ok(())
            }
            DesiredState::Absent => Ok(()),
            other => Err(CohesityError::Parameter(format!("state must be present or absent, not {}", other))),
        }
    }

    fn probe(&self, ctx: &ModuleContext) -> Result<StatusSnapshot<ClusterState>> {
        let info: Option<Value> = ctx.session.get("/public/basicClusterInfo")?;
        let info = match info {
            Some(Value::Object(map)) => map,
            _ => return Ok(StatusSnapshot::new(ClusterState::Unclustered)),
        };
        let status = match info.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) {
            Some(name) => ClusterState::Clustered(name.to_string()),
            None => ClusterState::Unclustered,
        };
        let mut snapshot = StatusSnapshot::new(status);
        snapshot.detail = info;
        Ok(snapshot)
    }

    fn submit(&self, ctx: &ModuleContext, action: TaskRequestType, snapshot: &StatusSnapshot<ClusterState>) -> Result<Submission> {
        match (action, &snapshot.status) {
            (TaskRequestType::Create, _) => self.create(ctx),
            (TaskRequestType::Remove, ClusterState::Clustered(name)) => self.destroy(ctx, name),
            (other, _) => Err(CohesityError::Other(format!("virtual clusters do not support {}", other))),
        }
    }

    fn poll_plan(&self, _action: TaskRequestType) -> Option<PollPlan> {
        self.args.wait.then(|| PollPlan::new(POLL_SECS, self.args.wait_minutes, OnTimeout::Accept))
    }

    fn message(&self, outcome: Outcome, _status: Option<&ClusterState>) -> String {
        let msg = match outcome {
            Outcome::Unchanged if self.args.state == DesiredState::Absent => "The Virtual edition cluster doesn't exist",
            Outcome::Unchanged => "The Virtual edition cluster already exists",
            Outcome::WouldChange(TaskRequestType::Remove) => "Cohesity Virtual edition cluster exists. This action would destroy the cluster",
            Outcome::WouldChange(_) => "Cohesity Virtual edition doesn't exist. This action would create the cluster.",
            Outcome::Failed(TaskRequestType::Remove) | Outcome::TimedOut(TaskRequestType::Remove) => "Failed to destroy virtual edition cluster",
            Outcome::Failed(_) | Outcome::TimedOut(_) => "Failed to create virtual edition cluster",
            Outcome::Submitted(TaskRequestType::Remove) | Outcome::Completed(TaskRequestType::Remove) | Outcome::Accepted(TaskRequestType::Remove) => {
                "The Virtual edition cluster is destroyed"
            }
            Outcome::Submitted(_) | Outcome::Completed(_) | Outcome::Accepted(_) => "Successfully created the Virtual edition cluster",
        };
        msg.to_string()
    }
}
