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
use crate::reconcile::ReconcileResult;
use crate::tasks::request::TaskRequestType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    IsMatched,
    IsCreated,
    IsRemoved,
    IsModified,
    IsStarted,
    IsStopped,
    IsPassive,
    NeedsCreation,
    NeedsRemoval,
    NeedsModification,
    NeedsStart,
    NeedsStop,
    Failed,
}

impl TaskStatus {
    pub fn needs(action: TaskRequestType) -> Self {
        match action {
            TaskRequestType::Create => TaskStatus::NeedsCreation,
            TaskRequestType::Remove => TaskStatus::NeedsRemoval,
            TaskRequestType::Modify => TaskStatus::NeedsModification,
            TaskRequestType::Start => TaskStatus::NeedsStart,
            TaskRequestType::Stop => TaskStatus::NeedsStop,
            TaskRequestType::Query | TaskRequestType::Passive => TaskStatus::IsPassive,
        }
    }

    pub fn done(action: TaskRequestType) -> Self {
        match action {
            TaskRequestType::Create => TaskStatus::IsCreated,
            TaskRequestType::Remove => TaskStatus::IsRemoved,
            TaskRequestType::Modify => TaskStatus::IsModified,
            TaskRequestType::Start => TaskStatus::IsStarted,
            TaskRequestType::Stop => TaskStatus::IsStopped,
            TaskRequestType::Query | TaskRequestType::Passive => TaskStatus::IsPassive,
        }
    }

    pub fn is_changed(&self) -> bool {
        !matches!(self, TaskStatus::IsMatched | TaskStatus::IsPassive | TaskStatus::Failed)
    }
}

/// One task's outcome as reported by the task file runner.
#[derive(Debug, Clone)]
pub struct TaskResponse {
    pub module: String,
    pub target: String,
    pub status: TaskStatus,
    pub msg: Option<String>,
    pub error_details: Option<String>,
    pub result: Option<ReconcileResult>,
}

impl TaskResponse {
    pub fn from_result(module: &str, target: &str, result: &ReconcileResult) -> Self {
        let status = match (result.changed, result.action) {
            (false, Some(TaskRequestType::Passive)) => TaskStatus::IsPassive,
            (false, _) => TaskStatus::IsMatched,
            (true, Some(action)) if result.check_mode => TaskStatus::needs(action),
            (true, Some(action)) => TaskStatus::done(action),
            (true, None) => TaskStatus::IsModified,
        };
        Self {
            module: module.to_string(),
            target: target.to_string(),
            status,
            msg: Some(result.msg.clone()),
            error_details: None,
            result: Some(result.clone()),
        }
    }

    pub fn failed(module: &str, target: &str, err: &CohesityError) -> Self {
        Self {
            module: module.to_string(),
            target: target.to_string(),
            status: TaskStatus::Failed,
            msg: Some(err.msg()),
            error_details: err.error_details().map(String::from),
            result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchanged_result_is_matched() {
        let result = ReconcileResult::unchanged("The Protection Job is already started", Some(String::from("kRunning")));
        let response = TaskResponse::from_result("cohesity_job", "nightly", &result);
        assert_eq!(response.status, TaskStatus::IsMatched);
        assert!(!response.status.is_changed());
    }

    #[test]
    fn test_check_mode_reports_needs() {
        let mut result = ReconcileResult::changed(TaskRequestType::Create, "Check Mode: would create", None);
        result.check_mode = true;
        let response = TaskResponse::from_result("cohesity_view", "backups", &result);
        assert_eq!(response.status, TaskStatus::NeedsCreation);
    }

    #[test]
    fn test_failed_response_keeps_details() {
        let err = CohesityError::TaskFailed {
            msg: String::from("The restore task failed"),
            details: String::from("kNotFound: /etc/missing"),
        };
        let response = TaskResponse::failed("cohesity_restore", "etc", &err);
        assert_eq!(response.status, TaskStatus::Failed);
        assert_eq!(response.error_details.as_deref(), Some("kNotFound: /etc/missing"));
    }
}
