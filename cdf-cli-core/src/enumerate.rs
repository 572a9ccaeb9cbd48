//! Input path enumeration and [`FileUnit`] construction.
//!
//! Directories are listed one level deep. Only regular files (symlinks are
//! followed) become upload candidates.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::contract::{FileMetadata, FileUnit};
use crate::error::{CdfError, Result};

/// Metadata values applied to every file built for one upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitSettings {
    pub ext_id_prefix: String,
    pub source: String,
    pub directory: Option<String>,
    pub data_set_id: Option<i64>,
}

/// List the files to upload for `path`, sorted by file name.
///
/// Fails with [`CdfError::NotFound`] when `path` is neither a readable file
/// nor a directory.
pub fn list_upload_candidates(path: &Path) -> Result<Vec<PathBuf>> {
    let metadata = fs::metadata(path).map_err(|e| {
        warn!(error = %e, path = %path.display(), "Input path is not accessible");
        CdfError::NotFound(format!(
            "the specified input path does not exist or is not readable: {}",
            path.display()
        ))
    })?;

    if metadata.is_file() {
        fs::File::open(path).map_err(|e| {
            CdfError::NotFound(format!("input file {} is not readable: {e}", path.display()))
        })?;
        info!(path = %path.display(), "The input path is a single file");
        return Ok(vec![path.to_path_buf()]);
    }

    if !metadata.is_dir() {
        return Err(CdfError::NotFound(format!(
            "the specified input path is neither a file nor a directory: {}",
            path.display()
        )));
    }

    info!(path = %path.display(), "The input path is a directory. Listing its entries");
    let entries = fs::read_dir(path).map_err(|e| {
        CdfError::NotFound(format!("input directory {} is not readable: {e}", path.display()))
    })?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry_path = entry?.path();
        // fs::metadata follows symlinks, matching what a reader of the file sees.
        match fs::metadata(&entry_path) {
            Ok(meta) if meta.is_file() => candidates.push(entry_path),
            Ok(_) => info!(path = %entry_path.display(), "Not a regular file. Skipping"),
            Err(e) => {
                info!(path = %entry_path.display(), error = %e, "Entry is not accessible. Skipping")
            }
        }
    }
    candidates.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(count = candidates.len(), "Listed upload candidates");
    Ok(candidates)
}

/// Build the upload unit for one file.
///
/// An unreadable file still yields a unit, without binary, so that its
/// metadata is registered.
pub fn build_file_unit(path: &Path, settings: &UnitSettings) -> Result<FileUnit> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            CdfError::Validation(format!("path {} has no file name", path.display()))
        })?;

    let metadata = FileMetadata {
        external_id: format!("{}{}", settings.ext_id_prefix, name),
        name,
        source: settings.source.clone(),
        directory: settings
            .directory
            .as_ref()
            .filter(|d| !d.trim().is_empty())
            .cloned(),
        data_set_id: settings.data_set_id,
    };

    let binary = match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            info!(
                path = %path.display(),
                error = %e,
                "File is a directory or not readable. Building an empty file unit"
            );
            None
        }
    };

    Ok(FileUnit { metadata, binary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn directory_listing_skips_subdirectories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), b"2").unwrap();
        fs::write(dir.path().join("a.csv"), b"1").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("deep.csv"), b"3").unwrap();

        let candidates = list_upload_candidates(dir.path()).unwrap();

        let names: Vec<_> = candidates
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn single_file_is_its_own_candidate() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("only.txt");
        fs::write(&file, b"x").unwrap();

        assert_eq!(list_upload_candidates(&file).unwrap(), vec![file]);
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = tempdir().unwrap();
        let err = list_upload_candidates(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, CdfError::NotFound(_)), "got {err:?}");
    }

    #[test]
    fn unit_carries_prefix_directory_and_data_set() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("report.pdf");
        fs::write(&file, b"%PDF").unwrap();
        let settings = UnitSettings {
            ext_id_prefix: "upload-".into(),
            source: "file-upload-cli".into(),
            directory: Some("/reports".into()),
            data_set_id: Some(9),
        };

        let unit = build_file_unit(&file, &settings).unwrap();

        assert_eq!(unit.metadata.name, "report.pdf");
        assert_eq!(unit.metadata.external_id, "upload-report.pdf");
        assert_eq!(unit.metadata.directory.as_deref(), Some("/reports"));
        assert_eq!(unit.metadata.data_set_id, Some(9));
        assert_eq!(unit.binary.as_deref(), Some(&b"%PDF"[..]));
    }

    #[test]
    fn blank_directory_is_dropped() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"a").unwrap();
        let settings = UnitSettings {
            directory: Some("   ".into()),
            ..Default::default()
        };

        let unit = build_file_unit(&file, &settings).unwrap();
        assert_eq!(unit.metadata.directory, None);
    }

    #[test]
    fn directory_path_yields_unit_without_binary() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("folder");
        fs::create_dir(&sub).unwrap();

        let unit = build_file_unit(&sub, &UnitSettings::default()).unwrap();
        assert_eq!(unit.metadata.name, "folder");
        assert!(unit.binary.is_none());
    }
}
