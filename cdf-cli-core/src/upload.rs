//! Upload pipeline: enumerate the input path, then feed every file through an
//! [`UploadQueue`].
//!
//! Path validation and the data set lookup both happen before the queue
//! starts, so either failure aborts the upload without any backend upload
//! call. Once the queue runs, batch failures are counted and logged but never
//! stop the enumeration.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::contract::FilesBackend;
use crate::enumerate::{build_file_unit, list_upload_candidates, UnitSettings};
use crate::error::{CdfError, Result};
use crate::queue::{QueueConfig, UploadQueue};

pub const DEFAULT_SOURCE: &str = "file-upload-cli";

/// Data set the uploaded files are attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DataSetRef {
    #[default]
    None,
    Id(i64),
    ExternalId(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub ext_id_prefix: String,
    pub file_directory: Option<String>,
    pub source: String,
    pub data_set: DataSetRef,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            ext_id_prefix: String::new(),
            file_directory: None,
            source: DEFAULT_SOURCE.to_string(),
            data_set: DataSetRef::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Files put on the queue.
    pub submitted: usize,
    /// Files the backend confirmed.
    pub uploaded: usize,
    /// Errors reported by the queue (whole batches or single files).
    pub errors: usize,
}

/// Translate a [`DataSetRef`] into an internal data set id.
///
/// An external id must match exactly one data set; anything else is
/// [`CdfError::NotFound`].
pub async fn resolve_data_set_id<B>(backend: &B, data_set: &DataSetRef) -> Result<Option<i64>>
where
    B: FilesBackend + ?Sized,
{
    match data_set {
        DataSetRef::None => Ok(None),
        DataSetRef::Id(id) => Ok(Some(*id)),
        DataSetRef::ExternalId(external_id) => {
            info!(data_set_external_id = %external_id, "Looking up the data set external id");
            let data_sets = backend
                .retrieve_data_sets(vec![external_id.clone()])
                .await?;
            match data_sets.as_slice() {
                [data_set] => {
                    info!(data_set_id = data_set.id, "Resolved data set");
                    Ok(Some(data_set.id))
                }
                _ => {
                    error!(
                        data_set_external_id = %external_id,
                        matches = data_sets.len(),
                        "The configured data set external id does not exist"
                    );
                    Err(CdfError::NotFound(format!(
                        "the configured data set external id does not exist: {external_id}"
                    )))
                }
            }
        }
    }
}

/// Upload a single file or the files directly inside a directory.
///
/// This is the library entry point. Callers that must validate the path
/// before constructing a backend (the `cdf` binary resolves credentials only
/// after the path check) call [`list_upload_candidates`] and
/// [`upload_candidates`] separately.
pub async fn upload_path<B>(
    backend: Arc<B>,
    path: &Path,
    options: &UploadOptions,
    queue_config: QueueConfig,
) -> Result<UploadReport>
where
    B: FilesBackend + 'static,
{
    info!(path = %path.display(), "[UPLOAD] Starting file upload");
    let candidates = list_upload_candidates(path)?;
    upload_candidates(backend, &candidates, options, queue_config).await
}

/// Upload already enumerated files (see [`list_upload_candidates`]).
///
/// The callbacks already present in `queue_config` are still invoked, after
/// the report counters are updated.
pub async fn upload_candidates<B>(
    backend: Arc<B>,
    candidates: &[PathBuf],
    options: &UploadOptions,
    queue_config: QueueConfig,
) -> Result<UploadReport>
where
    B: FilesBackend + 'static,
{
    let data_set_id = resolve_data_set_id(backend.as_ref(), &options.data_set).await?;

    let settings = UnitSettings {
        ext_id_prefix: options.ext_id_prefix.clone(),
        source: options.source.clone(),
        directory: options.file_directory.clone(),
        data_set_id,
    };

    let uploaded = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let config = {
        let uploaded = uploaded.clone();
        let errors = errors.clone();
        let on_batch = queue_config.on_batch_uploaded.clone();
        let on_error = queue_config.on_error.clone();
        queue_config
            .with_batch_callback(move |files| {
                uploaded.fetch_add(files.len(), Ordering::SeqCst);
                for file in files {
                    info!(name = %file.name, external_id = %file.external_id, "Finished uploading");
                }
                if let Some(callback) = &on_batch {
                    callback(files);
                }
            })
            .with_error_callback(move |e| {
                errors.fetch_add(1, Ordering::SeqCst);
                warn!(error = %e, "Error during upload");
                if let Some(callback) = &on_error {
                    callback(e);
                }
            })
    };

    let mut queue = UploadQueue::new(backend, config)?;
    queue.start()?;

    let mut submitted = 0;
    let submission = async {
        for candidate in candidates {
            let unit = build_file_unit(candidate, &settings)?;
            queue.put(unit).await?;
            info!(path = %candidate.display(), "Added to the upload queue");
            submitted += 1;
        }
        Ok::<(), CdfError>(())
    }
    .await;

    // Stop even when submission failed so that accepted units are flushed.
    queue.stop().await?;
    submission?;

    let report = UploadReport {
        submitted,
        uploaded: uploaded.load(Ordering::SeqCst),
        errors: errors.load(Ordering::SeqCst),
    };
    info!(?report, "[UPLOAD] File upload completed");
    Ok(report)
}
