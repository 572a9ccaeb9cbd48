//! # contract: data model and backend interface for file operations
//!
//! This module defines the plain data types passed between the CLI, the
//! upload queue and the data platform, plus the [`FilesBackend`] trait that a
//! concrete client implements.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`, so tests (and dependent crates with
//!   the `test-export-mocks` feature) get a `MockFilesBackend`.
//!
//! ## Implementing a backend
//! - Convert every upstream failure into a [`CdfError`], usually
//!   [`CdfError::Transport`].
//! - `upload_files` reports per-unit outcomes; only a failure of the whole
//!   call should surface as `Err`.
//! - `list_files` returns every match; following cursors is the backend's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::CdfError;

/// Metadata describing one file on the data platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub external_id: String,
    pub source: String,
    /// Directory label on the platform, not a local path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_set_id: Option<i64>,
}

/// One unit of upload work: metadata plus the optional file contents.
///
/// `binary` is `None` for placeholders such as unreadable entries; the
/// metadata is still created on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUnit {
    pub metadata: FileMetadata,
    pub binary: Option<Vec<u8>>,
}

impl FileUnit {
    pub fn external_id(&self) -> &str {
        &self.metadata.external_id
    }
}

/// A unit the backend rejected while processing a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    pub external_id: String,
    pub reason: String,
}

/// Per-unit result of a bulk upload call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub uploaded: Vec<FileMetadata>,
    pub failed: Vec<FailedUpload>,
}

/// Identifies a file either by its internal or its external id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FileIdentity {
    #[serde(rename = "id")]
    Id(i64),
    #[serde(rename = "externalId")]
    ExternalId(String),
}

/// Filter for listing files: top-level field pairs plus metadata pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    pub fields: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
}

impl FileFilter {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.metadata.is_empty()
    }
}

/// A file as returned by a list call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: i64,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSet {
    pub id: i64,
    #[serde(default)]
    pub external_id: Option<String>,
}

/// Trait for the data platform operations the CLI needs.
/// The implementor owns authentication, transport and pagination.
///
/// The trait is `Send` + `Sync` and intended for async/await usage; the
/// upload queue shares one instance between the producer and its timer task.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FilesBackend: Send + Sync {
    /// Upload a batch of files (metadata and binary) in one bulk call.
    async fn upload_files(&self, batch: Vec<FileUnit>) -> Result<BatchOutcome, CdfError>;

    /// Delete the given files. Returns the number of identities submitted.
    async fn delete_files(&self, items: Vec<FileIdentity>) -> Result<usize, CdfError>;

    /// List every file matching the filter.
    async fn list_files(&self, filter: FileFilter) -> Result<Vec<FileRecord>, CdfError>;

    /// Look up data sets by external id. Unknown ids are omitted from the result.
    async fn retrieve_data_sets(&self, external_ids: Vec<String>)
        -> Result<Vec<DataSet>, CdfError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_serializes_camel_case_and_skips_absent_fields() {
        let meta = FileMetadata {
            name: "a.txt".into(),
            external_id: "pre-a.txt".into(),
            source: "file-upload-cli".into(),
            directory: None,
            data_set_id: Some(42),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["externalId"], "pre-a.txt");
        assert_eq!(json["dataSetId"], 42);
        assert!(json.get("directory").is_none());
    }

    #[test]
    fn identity_serializes_as_single_key_object() {
        let id = serde_json::to_value(FileIdentity::Id(7)).unwrap();
        let ext = serde_json::to_value(FileIdentity::ExternalId("x".into())).unwrap();
        assert_eq!(id, serde_json::json!({ "id": 7 }));
        assert_eq!(ext, serde_json::json!({ "externalId": "x" }));
    }
}
