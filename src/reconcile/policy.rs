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

use crate::error::Result;
use crate::reconcile::context::ModuleContext;
use crate::reconcile::gate::{self, Gate};
use crate::reconcile::poll::{PollPlan, Terminal};
use crate::reconcile::state::{Classification, DesiredState, ResourceKind, StatusSnapshot, StatusValue};
use crate::tasks::TaskRequestType;
use serde_json::{Map, Value};

/// Points in a reconciliation that get a human readable message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The gate found nothing to do.
    Unchanged,
    /// Check mode: this action would have been submitted.
    WouldChange(TaskRequestType),
    /// Submitted and not waited on.
    Submitted(TaskRequestType),
    /// Submitted and confirmed terminal.
    Completed(TaskRequestType),
    /// Submitted, wait budget spent, request stands.
    Accepted(TaskRequestType),
    /// Submitted, wait budget spent, confirmation was required.
    TimedOut(TaskRequestType),
    /// Terminal state carried an error.
    Failed(TaskRequestType),
}

/// What the one mutating call produced.
#[derive(Clone, Debug)]
pub struct Submission {
    pub id: Option<String>,
    pub changed: bool,
    pub msg: Option<String>,
    pub data: Map<String, Value>,
}

impl Default for Submission {
    fn default() -> Self {
        Self { id: None, changed: true, msg: None, data: Map::new() }
    }
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cluster reported the work was already done.
    pub fn unchanged(msg: &str) -> Self {
        Self { changed: false, msg: Some(msg.to_string()), ..Self::default() }
    }

    pub fn with_id(mut self, id: impl ToString) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }
}

/// The per-resource half of a reconciliation.
pub trait ResourcePolicy {
    type Status: StatusValue;

    fn kind(&self) -> ResourceKind;
    fn target(&self) -> String;
    fn desired(&self) -> DesiredState;

    /// Parameter checks that must pass before the cluster is contacted.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn probe(&self, ctx: &ModuleContext) -> Result<StatusSnapshot<Self::Status>>;

    fn gate(&self, snapshot: &StatusSnapshot<Self::Status>) -> Result<Gate> {
        gate::evaluate(self.desired(), snapshot)
    }

    /// Issue the single mutating call for `action`.
    fn submit(&self, ctx: &ModuleContext, action: TaskRequestType, snapshot: &StatusSnapshot<Self::Status>) -> Result<Submission>;

    /// `None` means the action completes synchronously.
    fn poll_plan(&self, _action: TaskRequestType) -> Option<PollPlan> {
        None
    }

    /// Probe used between polls. Task kinds look the submitted id up directly.
    fn poll_probe(&self, ctx: &ModuleContext, _action: TaskRequestType, _submission: &Submission) -> Result<StatusSnapshot<Self::Status>> {
        self.probe(ctx)
    }

    fn terminal(&self, action: TaskRequestType, snapshot: &StatusSnapshot<Self::Status>) -> Terminal {
        if let Some(error) = &snapshot.error {
            return Terminal::Failed(error.clone());
        }
        let reached = DesiredState::reached_by(action).unwrap_or(self.desired());
        match snapshot.status.classify(reached) {
            Classification::Satisfied => Terminal::Reached,
            _ => Terminal::InFlight,
        }
    }

    fn message(&self, outcome: Outcome, status: Option<&Self::Status>) -> String;
}
