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

//! JSON documents returned by the cluster. Only the fields the modules
//! read are modelled; everything else is ignored.

use serde::{Deserialize, Serialize};

/// Globally unique id of a protection job across cluster incarnations.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UniversalId {
    pub cluster_id: u64,
    pub cluster_incarnation_id: u64,
    pub id: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtectionJob {
    pub id: Option<u64>,
    pub name: String,
    pub environment: Option<String>,
    pub policy_id: Option<String>,
    pub view_box_id: Option<u64>,
    pub parent_source_id: Option<u64>,
    pub source_ids: Vec<u64>,
    pub uid: Option<UniversalId>,
    pub is_deleted: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtectionRun {
    pub job_id: Option<u64>,
    pub job_name: Option<String>,
    pub job_uid: Option<UniversalId>,
    pub backup_run: Option<BackupRun>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupRun {
    pub job_run_id: Option<u64>,
    pub status: Option<String>,
    pub error: Option<String>,
    pub stats: Option<RunStats>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RunStats {
    pub start_time_usecs: Option<i64>,
    pub end_time_usecs: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreTask {
    pub id: Option<u64>,
    pub name: String,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    pub error: Option<ErrorDetail>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorDetail {
    pub error_code: Option<String>,
    pub message: Option<String>,
}

impl ErrorDetail {
    /// The message as the cluster wrote it, or the error code when that is all there is.
    pub fn detail(&self) -> Option<String> {
        self.message.clone()
            .filter(|m| !m.is_empty())
            .or_else(|| self.error_code.clone())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtectionSourceNode {
    pub protection_source: Option<ProtectionSource>,
    pub registration_info: Option<RegistrationInfo>,
    pub nodes: Vec<ProtectionSourceNode>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtectionSource {
    pub id: u64,
    pub name: String,
    pub environment: Option<String>,
    pub parent_id: Option<u64>,
    #[serde(rename = "vmWareProtectionSource")]
    pub vmware_protection_source: Option<TypedSource>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TypedSource {
    #[serde(rename = "type")]
    pub source_type: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationInfo {
    pub access_info: Option<AccessInfo>,
    pub authentication_status: Option<String>,
    pub refresh_error_message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessInfo {
    pub endpoint: Option<String>,
}

/// Anything the cluster lists by name and numeric id (policies, storage domains).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct NamedEntity {
    pub id: serde_json::Value,
    pub name: String,
}

impl NamedEntity {
    pub fn id_string(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectSearchResult {
    pub total_count: Option<u64>,
    pub object_snapshot_info: Vec<ObjectSnapshotInfo>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectSnapshotInfo {
    pub object_name: String,
    pub job_id: Option<u64>,
    pub job_uid: Option<UniversalId>,
    pub snapshotted_source: Option<ProtectionSource>,
    pub versions: Vec<SnapshotVersion>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotVersion {
    pub job_run_id: u64,
    pub started_time_usecs: i64,
}

/// One backup of a file, from the file snapshot listing.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSnapshotInformation {
    pub snapshot: Option<SnapshotVersion>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSearchResult {
    pub files: Vec<RestorableFile>,
}

/// A backed up file found by the restore file search.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RestorableFile {
    pub filename: String,
    pub job_id: Option<u64>,
    pub source_id: Option<u64>,
    pub protection_source: Option<ProtectionSource>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct VmSearchResult {
    pub vms: Vec<VmSearchHit>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct VmSearchHit {
    pub vm_document: VmDocument,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct VmDocument {
    pub object_aliases: Vec<String>,
    pub object_id: ObjectId,
    pub versions: Vec<DocumentVersion>,
}

impl VmDocument {
    pub fn latest_snapshot_usecs(&self) -> i64 {
        self.versions.first().map(|v| v.snapshot_timestamp_usecs).unwrap_or(0)
    }
}

/// Job and entity of an indexed object. The entity is passed back to the
/// cluster untouched, so it stays a raw document.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectId {
    pub job_id: u64,
    pub job_uid: serde_json::Value,
    pub entity: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentVersion {
    pub snapshot_timestamp_usecs: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct View {
    pub name: String,
    pub description: Option<String>,
    pub view_box_id: Option<u64>,
    pub qos: Option<serde_json::Value>,
    pub protocol_access: Option<String>,
    pub logical_quota: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_task_error_detail() {
        let task: RestoreTask = serde_json::from_str(
            r#"{"id": 88, "name": "nightly: etc", "status": "kFinished", "type": "kRestoreFiles",
                "error": {"errorCode": "kPermissionDenied", "message": "Access is denied to /etc/shadow"}}"#,
        ).unwrap();
        assert_eq!(task.id, Some(88));
        assert_eq!(task.error.and_then(|e| e.detail()), Some(String::from("Access is denied to /etc/shadow")));
    }

    #[test]
    fn test_named_entity_id_forms() {
        let policy: NamedEntity = serde_json::from_str(r#"{"id": "4471:1581:3", "name": "Gold"}"#).unwrap();
        assert_eq!(policy.id_string(), "4471:1581:3");
        let domain: NamedEntity = serde_json::from_str(r#"{"id": 5, "name": "DefaultStorageDomain"}"#).unwrap();
        assert_eq!(domain.id_string(), "5");
    }

    #[test]
    fn test_protection_run_tolerates_missing_fields() {
        let runs: Vec<ProtectionRun> = serde_json::from_str(
            r#"[{"jobId": 12, "backupRun": {"jobRunId": 4401, "status": "kRunning"}}]"#,
        ).unwrap();
        let run = runs[0].backup_run.as_ref().unwrap();
        assert_eq!(run.status.as_deref(), Some("kRunning"));
        assert!(run.stats.is_none());
    }
}
