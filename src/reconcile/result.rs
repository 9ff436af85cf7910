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
use crate::tasks::TaskRequestType;
use serde::Serialize;
use serde_json::{Map, Value};

/// The only thing a module invocation reports back.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ReconcileResult {
    pub changed: bool,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
    #[serde(skip)]
    pub action: Option<TaskRequestType>,
    #[serde(skip)]
    pub check_mode: bool,
}

impl ReconcileResult {
    pub fn unchanged(msg: &str, status: Option<String>) -> Self {
        Self {
            changed: false,
            msg: msg.to_string(),
            status,
            error: None,
            data: Map::new(),
            action: None,
            check_mode: false,
        }
    }

    pub fn changed(action: TaskRequestType, msg: &str, status: Option<String>) -> Self {
        Self {
            changed: true,
            msg: msg.to_string(),
            status,
            error: None,
            data: Map::new(),
            action: Some(action),
            check_mode: false,
        }
    }

    pub fn with_action(mut self, action: TaskRequestType) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_error(mut self, details: String) -> Self {
        self.error = Some(details);
        self
    }

    pub fn with_data(mut self, data: &Map<String, Value>) -> Self {
        for (k, v) in data.iter() {
            self.data.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// A result carrying a terminal error is a failure; turn it into one.
    pub fn into_outcome(self) -> Result<Self> {
        match self.error {
            Some(details) => Err(CohesityError::TaskFailed { msg: self.msg, details }),
            None => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_flat() {
        let mut result = ReconcileResult::changed(TaskRequestType::Create, "The clone VMs task is successful", Some(String::from("kFinished")));
        result.insert("id", json!(4021));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value, json!({
            "changed": true,
            "msg": "The clone VMs task is successful",
            "status": "kFinished",
            "id": 4021
        }));
    }

    #[test]
    fn test_error_becomes_failure() {
        let result = ReconcileResult::changed(TaskRequestType::Create, "The clone VMs task failed", None)
            .with_error(String::from("Failed to power on VM web-01-clone"));
        assert!(result.is_failed());
        match result.into_outcome() {
            Err(CohesityError::TaskFailed { msg, details }) => {
                assert_eq!(msg, "The clone VMs task failed");
                assert_eq!(details, "Failed to power on VM web-01-clone");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
