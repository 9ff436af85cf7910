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

mod common;

use common::{runner_with, test_config, write_tasks};
use jetpack_cohesity::client::Method;
use jetpack_cohesity::testing::{MockTransport, RecordingSleeper};
use jetpack_cohesity::{CohesityError, RecapData, TaskStatus};
use serde_json::json;
use std::sync::Arc;

const TASKS: &str = "
- !cohesity_license
  license_key: '{{license}}'
- !cohesity_view
  name: '{{view}}'
  storage_domain: DefaultStorageDomain
  case_insensitive: true
  protocol: NFSOnly
- !cohesity_facts {}
";

fn cluster() -> Arc<MockTransport> {
    Arc::new(MockTransport::new()
        .on(Method::Get, "/public/cluster", 200, json!({"name": "lab", "eulaConfig": {"signedVersion": 2}}))
        .on(Method::Get, "/public/views?viewNames", 200, json!({"views": []}))
        .on(Method::Get, "/public/viewBoxes", 200, json!([{"id": 5, "name": "DefaultStorageDomain"}]))
        .on(Method::Post, "/public/views", 201, json!({"viewId": 812}))
        .on(Method::Get, "/public/basicClusterInfo", 200, json!({"name": "lab"}))
        .on(Method::Get, "/public/nodes", 200, json!([])))
}

fn vars() -> serde_yaml::Value {
    serde_yaml::from_str("license: ABCD-1234\nview: backups").unwrap()
}

#[test]
fn test_task_file_runs_in_order() {
    let file = write_tasks(TASKS);
    let transport = cluster();
    let runner = runner_with(test_config().extra_vars(vars()), transport.clone(), Arc::new(RecordingSleeper::default()));

    let result = runner.run_task_file(file.path()).unwrap();
    assert!(result.success);
    assert_eq!(result.skipped, 0);
    assert_eq!(result.recap, RecapData { ok: 2, changed: 1, failed: 0 });
    let statuses: Vec<TaskStatus> = result.responses.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![TaskStatus::IsMatched, TaskStatus::IsCreated, TaskStatus::IsPassive]);
    assert_eq!(result.responses[1].target, "backups");

    let body = transport.sent(Method::Post, "/public/views")[0].body.clone().unwrap();
    assert_eq!(body["name"], json!("backups"));
}

#[test]
fn test_check_mode_reports_needed_changes() {
    let file = write_tasks(TASKS);
    let transport = cluster();
    let config = test_config().extra_vars(vars()).check_mode(true);
    let runner = runner_with(config, transport.clone(), Arc::new(RecordingSleeper::default()));

    let result = runner.run_task_file(file.path()).unwrap();
    assert_eq!(result.responses[1].status, TaskStatus::NeedsCreation);
    assert_eq!(transport.count(Method::Post, "/public/views"), 0);
}

#[test]
fn test_undefined_variable_fails_before_running() {
    let file = write_tasks(TASKS);
    let transport = cluster();
    let runner = runner_with(test_config(), transport.clone(), Arc::new(RecordingSleeper::default()));

    let err = runner.run_task_file(file.path()).unwrap_err();
    assert!(matches!(err, CohesityError::Template(_)));
    assert!(transport.requests().is_empty());
}

#[test]
fn test_unknown_module_tag_is_a_yaml_error() {
    let file = write_tasks("- !cohesity_teleport\n  name: x\n");
    let runner = runner_with(test_config(), cluster(), Arc::new(RecordingSleeper::default()));
    assert!(matches!(runner.run_task_file(file.path()), Err(CohesityError::Yaml(_))));
}

#[test]
fn test_empty_task_file_is_a_successful_run() {
    let file = write_tasks("");
    let runner = runner_with(test_config(), cluster(), Arc::new(RecordingSleeper::default()));
    let result = runner.run_task_file(file.path()).unwrap();
    assert!(result.success);
    assert!(result.responses.is_empty());
}

#[test]
fn test_failure_stops_the_run() {
    let file = write_tasks("- !cohesity_license\n  license_key: bad\n- !cohesity_facts {}\n");
    let transport = Arc::new(MockTransport::new()
        .on(Method::Get, "/public/cluster", 200, json!({"name": "lab"}))
        .on(Method::Post, "/licenseAgreement", 400, json!({"message": "License key is invalid"})));
    let runner = runner_with(test_config(), transport.clone(), Arc::new(RecordingSleeper::default()));

    let result = runner.run_task_file(file.path()).unwrap();
    assert!(!result.success);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.responses[0].error_details.as_deref(), Some("License key is invalid"));
    assert_eq!(transport.count(Method::Get, "/public/nodes"), 0);
}
