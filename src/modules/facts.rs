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
use crate::error::Result;
use crate::modules::common::connection_args;
use crate::reconcile::{
    Classification, DesiredState, Gate, ModuleContext, Outcome, ResourceKind, ResourcePolicy, StatusSnapshot,
    StatusValue, Submission,
};
use crate::tasks::TaskRequestType;
use serde::Deserialize;
use serde_json::{Map, Value};

pub const MODULE: &str = "cohesity_facts";

/// Gathers cluster and node details. Never changes anything.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct FactsTask {
    pub cluster: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub validate_certs: Option<bool>,
}

impl FactsTask {
    pub fn connection(&self) -> ConnectionArgs {
        connection_args!(self)
    }

    pub fn evaluate(&self) -> FactsAction {
        FactsAction
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Uncollected;

impl StatusValue for Uncollected {
    fn classify(&self, _desired: DesiredState) -> Classification {
        Classification::Unsatisfied
    }

    fn label(&self) -> String {
        String::from("uncollected")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FactsAction;

impl ResourcePolicy for FactsAction {
    type Status = Uncollected;

    fn kind(&self) -> ResourceKind {
        ResourceKind::ClusterFacts
    }

    fn target(&self) -> String {
        String::from("cluster")
    }

    fn desired(&self) -> DesiredState {
        DesiredState::Present
    }

    fn probe(&self, _ctx: &ModuleContext) -> Result<StatusSnapshot<Uncollected>> {
        Ok(StatusSnapshot::new(Uncollected))
    }

    fn gate(&self, _snapshot: &StatusSnapshot<Uncollected>) -> Result<Gate> {
        Ok(Gate::Needs(TaskRequestType::Passive))
    }

    fn submit(&self, ctx: &ModuleContext, _action: TaskRequestType, _snapshot: &StatusSnapshot<Uncollected>) -> Result<Submission> {
        let info: Option<Map<String, Value>> = ctx.session.get("/public/basicClusterInfo")?;
        let nodes: Option<Value> = ctx.session.get("/public/nodes")?;
        let mut cluster = info.unwrap_or_default();
        cluster.insert(String::from("nodes"), nodes.unwrap_or_else(|| Value::Array(Vec::new())));
        Ok(Submission::unchanged(&self.message(Outcome::Completed(TaskRequestType::Passive), None))
            .with_data("cluster", Value::Object(cluster)))
    }

    fn message(&self, _outcome: Outcome, _status: Option<&Uncollected>) -> String {
        String::from("Gathered cluster facts")
    }
}
