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

use crate::error::CohesityError;
use crate::reconcile::poll::PollPlan;
use crate::tasks::TaskRequestType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    #[default]
    Present,
    Absent,
    Started,
    Stopped,
}

impl DesiredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredState::Present => "present",
            DesiredState::Absent => "absent",
            DesiredState::Started => "started",
            DesiredState::Stopped => "stopped",
        }
    }

    /// The state an action drives a resource towards.
    pub fn reached_by(action: TaskRequestType) -> Option<Self> {
        match action {
            TaskRequestType::Create | TaskRequestType::Modify => Some(DesiredState::Present),
            TaskRequestType::Remove => Some(DesiredState::Absent),
            TaskRequestType::Start => Some(DesiredState::Started),
            TaskRequestType::Stop => Some(DesiredState::Stopped),
            TaskRequestType::Query | TaskRequestType::Passive => None,
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DesiredState {
    type Err = CohesityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "present" => Ok(DesiredState::Present),
            "absent" => Ok(DesiredState::Absent),
            "started" => Ok(DesiredState::Started),
            "stopped" => Ok(DesiredState::Stopped),
            other => Err(CohesityError::Parameter(format!("state must be one of present, absent, started, stopped; got '{}'", other))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Agent,
    ProtectionSource,
    ProtectionJob,
    CloneTask,
    RestoreTask,
    VirtualCluster,
    View,
    ProtectionPolicy,
    License,
    ClusterFacts,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Agent => "agent",
            ResourceKind::ProtectionSource => "protection source",
            ResourceKind::ProtectionJob => "protection job",
            ResourceKind::CloneTask => "clone task",
            ResourceKind::RestoreTask => "restore task",
            ResourceKind::VirtualCluster => "virtual cluster",
            ResourceKind::View => "view",
            ResourceKind::ProtectionPolicy => "protection policy",
            ResourceKind::License => "license",
            ResourceKind::ClusterFacts => "cluster facts",
        };
        write!(f, "{}", label)
    }
}

/// How a probed status relates to a desired state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    Satisfied,
    Unsatisfied,
    Ambiguous(String),
}

/// A kind-specific status enumeration.
///
/// `classify` must be total: every value maps to exactly one
/// classification for every desired state the kind supports.
pub trait StatusValue: Clone + fmt::Debug {
    fn classify(&self, desired: DesiredState) -> Classification;
    fn label(&self) -> String;
}

/// What one probe saw. Lives for a single reconciliation.
#[derive(Clone, Debug)]
pub struct StatusSnapshot<S> {
    pub status: S,
    pub id: Option<String>,
    pub error: Option<String>,
    pub detail: Map<String, Value>,
}

impl<S: StatusValue> StatusSnapshot<S> {
    pub fn new(status: S) -> Self {
        Self { status, id: None, error: None, detail: Map::new() }
    }

    pub fn with_id(mut self, id: impl ToString) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.detail.insert(key.to_string(), value);
        self
    }
}

/// The immutable description of one mutating action, fixed once the gate
/// has decided what to do.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationRequest {
    pub kind: ResourceKind,
    pub target: String,
    pub desired: DesiredState,
    pub action: TaskRequestType,
    pub poll: Option<PollPlan>,
}

impl OperationRequest {
    pub fn new(kind: ResourceKind, target: String, desired: DesiredState, action: TaskRequestType, poll: Option<PollPlan>) -> Self {
        Self { kind, target, desired, action, poll }
    }
}
