//! Three-pass file deletion: by internal id, by external id, by filter.
//!
//! Each pass runs only when its input is present and reports its own count.
//! A request without any criteria is a no-op that makes no backend call.

use tracing::info;

use crate::contract::{FileFilter, FileIdentity, FilesBackend};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteRequest {
    pub ids: Vec<i64>,
    pub external_ids: Vec<String>,
    pub filter: FileFilter,
}

impl DeleteRequest {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.external_ids.is_empty() && self.filter.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub by_id: usize,
    pub by_external_id: usize,
    pub by_filter: usize,
}

impl DeleteReport {
    pub fn total(&self) -> usize {
        self.by_id + self.by_external_id + self.by_filter
    }
}

pub async fn delete_files<B>(backend: &B, request: DeleteRequest) -> Result<DeleteReport>
where
    B: FilesBackend + ?Sized,
{
    let mut report = DeleteReport::default();
    if request.is_empty() {
        info!("No file (external) ids specified nor any filter. No files to delete");
        return Ok(report);
    }

    if !request.ids.is_empty() {
        info!("[DELETE] Start deleting files based on id");
        let items = request.ids.iter().copied().map(FileIdentity::Id).collect();
        report.by_id = backend.delete_files(items).await?;
        info!(count = report.by_id, ids = ?request.ids, "[DELETE] Completed deleting files based on ids");
    }

    if !request.external_ids.is_empty() {
        info!("[DELETE] Start deleting files based on external id");
        let items = request
            .external_ids
            .iter()
            .cloned()
            .map(FileIdentity::ExternalId)
            .collect();
        report.by_external_id = backend.delete_files(items).await?;
        info!(
            count = report.by_external_id,
            external_ids = ?request.external_ids,
            "[DELETE] Completed deleting files based on external ids"
        );
    }

    if !request.filter.is_empty() {
        info!(filter = ?request.filter, "[DELETE] Start deleting files based on filter");
        let matches = backend.list_files(request.filter).await?;
        info!(matches = matches.len(), "[DELETE] Listed files matching the filter");
        if !matches.is_empty() {
            let items = matches.into_iter().map(|f| FileIdentity::Id(f.id)).collect();
            report.by_filter = backend.delete_files(items).await?;
        }
        info!(count = report.by_filter, "[DELETE] Completed deleting files based on filter");
    }

    info!(total = report.total(), "[DELETE] File delete completed");
    Ok(report)
}
