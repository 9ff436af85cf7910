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

use jetpack_cohesity::config::ENV_CLUSTER;
use jetpack_cohesity::{ClusterConfig, CohesityError, ConnectionArgs, ModuleRunner, NullOutputHandler, Task};
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_config_builder() {
    let config = ClusterConfig::new()
        .cluster("cohesity-01.example.com")
        .username("CORP\\backup")
        .password("secret")
        .insecure()
        .check_mode(true)
        .verbosity(2);

    assert_eq!(config.cluster.as_deref(), Some("cohesity-01.example.com"));
    assert!(!config.validate_certs);
    assert!(config.check_mode);
    assert_eq!(config.verbosity, 2);
}

#[test]
fn test_environment_does_not_override_flags() {
    let config = ClusterConfig::new()
        .cluster("from-flag")
        .from_lookup(|key| (key == ENV_CLUSTER).then(|| String::from("from-env")));
    assert_eq!(config.cluster.as_deref(), Some("from-flag"));
}

#[test]
fn test_runner_creation() {
    let runner = ModuleRunner::new(ClusterConfig::new().check_mode(true))
        .with_output_handler(Arc::new(NullOutputHandler));
    assert!(runner.config().check_mode);
}

#[test]
fn test_task_connection_overrides() {
    let task = Task::from_module_args("cohesity_facts", json!({"cluster": "other.example.com", "validate_certs": false})).unwrap();
    assert_eq!(task.connection(), ConnectionArgs {
        cluster: Some(String::from("other.example.com")),
        validate_certs: Some(false),
        ..Default::default()
    });
}

#[test]
fn test_unknown_module_fails_without_a_cluster() {
    let runner = ModuleRunner::new(ClusterConfig::new());
    let err = runner.run_module("cohesity_nope", json!({})).unwrap_err();
    assert!(matches!(err, CohesityError::Parameter(_)));
}

#[test]
fn test_builder_api() {
    let _builder = jetpack_cohesity::run_task_file("/tmp/tasks.yml")
        .cluster("cohesity-01.example.com")
        .username("admin")
        .insecure()
        .check_mode();
}
