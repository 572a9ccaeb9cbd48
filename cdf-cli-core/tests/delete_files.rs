use std::collections::BTreeMap;

use cdf_cli_core::contract::{FileFilter, FileIdentity, FileRecord, MockFilesBackend};
use cdf_cli_core::delete::{delete_files, DeleteRequest};
use cdf_cli_core::CdfError;
use mockall::Sequence;

fn record(id: i64) -> FileRecord {
    FileRecord {
        id,
        external_id: None,
        name: format!("file-{id}"),
    }
}

#[tokio::test]
async fn empty_request_reports_zero_without_backend_calls() {
    let mut backend = MockFilesBackend::new();
    backend.expect_delete_files().never();
    backend.expect_list_files().never();

    let report = delete_files(&backend, DeleteRequest::default()).await.unwrap();

    assert_eq!(report.total(), 0);
}

#[tokio::test]
async fn runs_all_three_passes_in_order_and_sums_counts() {
    let mut seq = Sequence::new();
    let mut backend = MockFilesBackend::new();
    backend
        .expect_delete_files()
        .withf(|items: &Vec<FileIdentity>| {
            items == &vec![FileIdentity::Id(1), FileIdentity::Id(2)]
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|items| Ok(items.len()));
    backend
        .expect_delete_files()
        .withf(|items: &Vec<FileIdentity>| {
            items == &vec![FileIdentity::ExternalId("ext-a".into())]
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|items| Ok(items.len()));
    backend
        .expect_list_files()
        .withf(|filter: &FileFilter| {
            filter.fields.get("source").map(String::as_str) == Some("camera")
                && filter.metadata.get("site").map(String::as_str) == Some("north")
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(vec![record(10), record(11), record(12)]));
    backend
        .expect_delete_files()
        .withf(|items: &Vec<FileIdentity>| {
            items == &vec![FileIdentity::Id(10), FileIdentity::Id(11), FileIdentity::Id(12)]
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|items| Ok(items.len()));

    let request = DeleteRequest {
        ids: vec![1, 2],
        external_ids: vec!["ext-a".into()],
        filter: FileFilter {
            fields: BTreeMap::from([("source".to_string(), "camera".to_string())]),
            metadata: BTreeMap::from([("site".to_string(), "north".to_string())]),
        },
    };

    let report = delete_files(&backend, request).await.unwrap();

    assert_eq!(report.by_id, 2);
    assert_eq!(report.by_external_id, 1);
    assert_eq!(report.by_filter, 3);
    assert_eq!(report.total(), 6);
}

#[tokio::test]
async fn filter_without_matches_skips_the_delete_call() {
    let mut backend = MockFilesBackend::new();
    backend.expect_list_files().times(1).returning(|_| Ok(vec![]));
    backend.expect_delete_files().never();

    let request = DeleteRequest {
        filter: FileFilter {
            metadata: BTreeMap::from([("batch".to_string(), "42".to_string())]),
            ..Default::default()
        },
        ..Default::default()
    };
    let report = delete_files(&backend, request).await.unwrap();

    assert_eq!(report.total(), 0);
}

#[tokio::test]
async fn only_requested_passes_run() {
    let mut backend = MockFilesBackend::new();
    backend.expect_list_files().never();
    backend
        .expect_delete_files()
        .times(1)
        .returning(|items| Ok(items.len()));

    let request = DeleteRequest {
        external_ids: vec!["x".into(), "y".into()],
        ..Default::default()
    };
    let report = delete_files(&backend, request).await.unwrap();

    assert_eq!(report.by_id, 0);
    assert_eq!(report.by_external_id, 2);
    assert_eq!(report.by_filter, 0);
}

#[tokio::test]
async fn backend_failure_is_surfaced() {
    let mut backend = MockFilesBackend::new();
    backend
        .expect_delete_files()
        .returning(|_| Err(CdfError::Transport("401 Unauthorized".into())));

    let request = DeleteRequest {
        ids: vec![5],
        ..Default::default()
    };
    let err = delete_files(&backend, request).await.unwrap_err();

    assert!(matches!(err, CdfError::Transport(_)));
}
