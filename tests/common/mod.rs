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

// Common test utilities

#![allow(dead_code)]

use jetpack_cohesity::testing::{MockCommandRunner, MockTransport, RecordingSleeper, TEST_CLUSTER};
use jetpack_cohesity::{ClusterConfig, ModuleRunner};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

pub fn test_config() -> ClusterConfig {
    ClusterConfig::new()
        .cluster(TEST_CLUSTER)
        .username("admin")
        .password("secret")
}

pub fn runner_with(config: ClusterConfig, transport: Arc<MockTransport>, sleeper: Arc<RecordingSleeper>) -> ModuleRunner {
    ModuleRunner::new(config)
        .with_transport(transport)
        .with_sleeper(sleeper)
        .with_commands(Arc::new(MockCommandRunner::new()))
}

pub fn runner(transport: Arc<MockTransport>) -> ModuleRunner {
    runner_with(test_config(), transport, Arc::new(RecordingSleeper::default()))
}

pub fn write_tasks(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create task file");
    file.write_all(contents.as_bytes()).expect("failed to write task file");
    file
}

pub fn job_listing() -> Value {
    json!([{"id": 12, "name": "nightly", "environment": "kPhysical"}])
}

pub fn latest_run(run_id: u64, status: &str) -> Value {
    json!([{"jobId": 12, "backupRun": {"jobRunId": run_id, "status": status}}])
}
