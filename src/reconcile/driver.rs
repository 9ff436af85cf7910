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

use crate::error::{CohesityError, Result};
use crate::reconcile::context::ModuleContext;
use crate::reconcile::gate::Gate;
use crate::reconcile::policy::{Outcome, ResourcePolicy, Submission};
use crate::reconcile::poll::{poll_until_terminal, OnTimeout, PollOutcome};
use crate::reconcile::result::ReconcileResult;
use crate::reconcile::state::{OperationRequest, StatusValue};
use serde_json::Value;

/// probe -> gate -> (no-op | submit -> poll -> finalize)
///
/// A terminal error comes back as a result whose `error` is set; callers
/// turn it into a failure with [`ReconcileResult::into_outcome`].
pub fn reconcile<P: ResourcePolicy>(policy: &P, ctx: &ModuleContext) -> Result<ReconcileResult> {
    policy.validate()?;

    let kind = policy.kind();
    let target = policy.target();

    let snapshot = policy.probe(ctx)?;
    let label = snapshot.status.label();
    ctx.output.on_probe(kind, &target, &label);

    let action = match policy.gate(&snapshot)? {
        Gate::Satisfied => {
            let msg = check_mode_message(ctx, policy.message(Outcome::Unchanged, Some(&snapshot.status)));
            let mut result = ReconcileResult::unchanged(&msg, Some(label));
            if let Some(id) = &snapshot.id {
                result.insert("id", Value::String(id.clone()));
            }
            return Ok(result.with_data(&snapshot.detail));
        }
        Gate::Needs(action) => action,
    };

    if ctx.check_mode && action.is_mutating() {
        let msg = check_mode_message(ctx, policy.message(Outcome::WouldChange(action), Some(&snapshot.status)));
        let mut result = ReconcileResult::changed(action, &msg, Some(label));
        result.check_mode = true;
        if let Some(id) = &snapshot.id {
            result.insert("id", Value::String(id.clone()));
        }
        return Ok(result);
    }

    let request = OperationRequest::new(kind, target.clone(), policy.desired(), action, policy.poll_plan(action));
    ctx.output.on_submit(&request);
    let submission = policy.submit(ctx, action, &snapshot)?;

    if !submission.changed {
        let msg = submission.msg.clone()
            .unwrap_or_else(|| policy.message(Outcome::Completed(action), Some(&snapshot.status)));
        return Ok(finish(ReconcileResult::unchanged(&msg, Some(label)).with_action(action), &submission));
    }

    let plan = match &request.poll {
        Some(plan) => plan,
        None => {
            let msg = submission.msg.clone()
                .unwrap_or_else(|| policy.message(Outcome::Submitted(action), None));
            return Ok(finish(ReconcileResult::changed(action, &msg, None), &submission));
        }
    };

    let outcome = poll_until_terminal(
        plan,
        ctx.sleeper.as_ref(),
        || policy.poll_probe(ctx, action, &submission),
        |s| policy.terminal(action, s),
        |attempt, max_attempts, s| ctx.output.on_poll_attempt(kind, &target, attempt, max_attempts, &s.status.label()),
    )?;

    match outcome {
        PollOutcome::Reached { snapshot, .. } => {
            let msg = policy.message(Outcome::Completed(action), Some(&snapshot.status));
            Ok(finish(ReconcileResult::changed(action, &msg, Some(snapshot.status.label())), &submission))
        }
        PollOutcome::Failed { snapshot, details, .. } => {
            let msg = policy.message(Outcome::Failed(action), Some(&snapshot.status));
            Ok(finish(ReconcileResult::changed(action, &msg, Some(snapshot.status.label())), &submission).with_error(details))
        }
        PollOutcome::TimedOut { last, .. } => {
            let status = last.as_ref().map(|s| &s.status);
            match plan.on_timeout {
                OnTimeout::Accept => {
                    let msg = policy.message(Outcome::Accepted(action), status);
                    Ok(finish(ReconcileResult::changed(action, &msg, status.map(|s| s.label())), &submission))
                }
                OnTimeout::Fail => Err(CohesityError::Timeout(policy.message(Outcome::TimedOut(action), status))),
            }
        }
    }
}

fn check_mode_message(ctx: &ModuleContext, msg: String) -> String {
    if ctx.check_mode {
        format!("Check Mode: {}", msg)
    } else {
        msg
    }
}

fn finish(mut result: ReconcileResult, submission: &Submission) -> ReconcileResult {
    if let Some(id) = &submission.id {
        result.insert("id", Value::String(id.clone()));
    }
    result.with_data(&submission.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::poll::{PollPlan, Terminal};
    use crate::reconcile::state::{Classification, DesiredState, ResourceKind, StatusSnapshot};
    use crate::tasks::TaskRequestType;
    use crate::testing::{context_with, MockTransport, RecordingSleeper};
    use std::cell::RefCell;
    use std::sync::Arc;

    #[derive(Clone, Debug, PartialEq)]
    enum TaskState {
        Missing,
        Status(&'static str),
    }

    impl StatusValue for TaskState {
        fn classify(&self, desired: DesiredState) -> Classification {
            match (self, desired) {
                (TaskState::Status("unknown"), _) => Classification::Ambiguous(String::from("unknown")),
                (TaskState::Status(_), DesiredState::Present) => Classification::Satisfied,
                (TaskState::Missing, DesiredState::Absent) => Classification::Satisfied,
                _ => Classification::Unsatisfied,
            }
        }
        fn label(&self) -> String {
            match self {
                TaskState::Missing => String::from("absent"),
                TaskState::Status(s) => s.to_string(),
            }
        }
    }

    struct Scripted {
        desired: DesiredState,
        probes: RefCell<Vec<StatusSnapshot<TaskState>>>,
        submits: RefCell<u32>,
        plan: Option<PollPlan>,
    }

    impl Scripted {
        fn new(desired: DesiredState, mut probes: Vec<StatusSnapshot<TaskState>>, plan: Option<PollPlan>) -> Self {
            probes.reverse();
            Self { desired, probes: RefCell::new(probes), submits: RefCell::new(0), plan }
        }
    }

    impl ResourcePolicy for Scripted {
        type Status = TaskState;

        fn kind(&self) -> ResourceKind { ResourceKind::RestoreTask }
        fn target(&self) -> String { String::from("nightly: etc") }
        fn desired(&self) -> DesiredState { self.desired }

        fn probe(&self, _ctx: &ModuleContext) -> Result<StatusSnapshot<TaskState>> {
            self.probes.borrow_mut().pop().ok_or_else(|| CohesityError::Other(String::from("probe script exhausted")))
        }

        fn submit(&self, _ctx: &ModuleContext, _action: TaskRequestType, _snapshot: &StatusSnapshot<TaskState>) -> Result<Submission> {
            *self.submits.borrow_mut() += 1;
            Ok(Submission::new().with_id(77))
        }

        fn poll_plan(&self, _action: TaskRequestType) -> Option<PollPlan> {
            self.plan.clone()
        }

        fn terminal(&self, _action: TaskRequestType, snapshot: &StatusSnapshot<TaskState>) -> Terminal {
            if let Some(error) = &snapshot.error {
                return Terminal::Failed(error.clone());
            }
            match snapshot.status {
                TaskState::Status("kFinished") | TaskState::Status("kCanceled") => Terminal::Reached,
                _ => Terminal::InFlight,
            }
        }

        fn message(&self, outcome: Outcome, _status: Option<&TaskState>) -> String {
            format!("{:?}", outcome)
        }
    }

    fn ctx() -> ModuleContext {
        context_with(Arc::new(MockTransport::new()), Arc::new(RecordingSleeper::default()))
    }

    #[test]
    fn test_absent_then_finished_after_two_polls() {
        let policy = Scripted::new(
            DesiredState::Present,
            vec![
                StatusSnapshot::new(TaskState::Missing),
                StatusSnapshot::new(TaskState::Status("kRunning")),
                StatusSnapshot::new(TaskState::Status("kFinished")),
            ],
            Some(PollPlan::new(30, 10, OnTimeout::Fail)),
        );
        let result = reconcile(&policy, &ctx()).unwrap();
        assert!(result.changed);
        assert_eq!(result.status.as_deref(), Some("kFinished"));
        assert_eq!(result.data.get("id"), Some(&Value::String(String::from("77"))));
        assert_eq!(*policy.submits.borrow(), 1);
    }

    #[test]
    fn test_present_resource_is_not_submitted() {
        let policy = Scripted::new(DesiredState::Present, vec![StatusSnapshot::new(TaskState::Status("kSuccess"))], None);
        let result = reconcile(&policy, &ctx()).unwrap();
        assert!(!result.changed);
        assert_eq!(*policy.submits.borrow(), 0);
    }

    #[test]
    fn test_ambiguous_status_fails_before_submit() {
        let policy = Scripted::new(DesiredState::Absent, vec![StatusSnapshot::new(TaskState::Status("unknown"))], None);
        assert!(matches!(reconcile(&policy, &ctx()), Err(CohesityError::AmbiguousState(_))));
        assert_eq!(*policy.submits.borrow(), 0);
    }

    #[test]
    fn test_accepting_timeout_is_changed() {
        let policy = Scripted::new(
            DesiredState::Present,
            vec![
                StatusSnapshot::new(TaskState::Missing),
                StatusSnapshot::new(TaskState::Status("kRunning")),
                StatusSnapshot::new(TaskState::Status("kRunning")),
            ],
            Some(PollPlan::new(30, 1, OnTimeout::Accept)),
        );
        let result = reconcile(&policy, &ctx()).unwrap();
        assert!(result.changed);
        assert_eq!(result.msg, format!("{:?}", Outcome::Accepted(TaskRequestType::Create)));
    }

    #[test]
    fn test_confirming_timeout_fails() {
        let policy = Scripted::new(
            DesiredState::Present,
            vec![
                StatusSnapshot::new(TaskState::Missing),
                StatusSnapshot::new(TaskState::Status("kRunning")),
                StatusSnapshot::new(TaskState::Status("kRunning")),
            ],
            Some(PollPlan::new(30, 1, OnTimeout::Fail)),
        );
        assert!(matches!(reconcile(&policy, &ctx()), Err(CohesityError::Timeout(_))));
    }

    #[test]
    fn test_terminal_error_is_carried_verbatim() {
        let policy = Scripted::new(
            DesiredState::Present,
            vec![
                StatusSnapshot::new(TaskState::Missing),
                StatusSnapshot::new(TaskState::Status("kFinished")).with_error(Some(String::from("Target datastore is read-only."))),
            ],
            Some(PollPlan::new(30, 10, OnTimeout::Accept)),
        );
        let result = reconcile(&policy, &ctx()).unwrap();
        assert_eq!(result.error.as_deref(), Some("Target datastore is read-only."));
        let err = result.into_outcome().unwrap_err();
        assert_eq!(err.error_details(), Some("Target datastore is read-only."));
    }

    #[test]
    fn test_check_mode_does_not_submit() {
        let policy = Scripted::new(DesiredState::Present, vec![StatusSnapshot::new(TaskState::Missing)], None);
        let result = reconcile(&policy, &ctx().check_mode(true)).unwrap();
        assert!(result.changed);
        assert!(result.check_mode);
        assert!(result.msg.starts_with("Check Mode: "));
        assert_eq!(*policy.submits.borrow(), 0);
    }
}
