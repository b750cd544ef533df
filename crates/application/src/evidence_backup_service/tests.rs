use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{Days, Utc};
use futures::StreamExt;

use evidex_core::AppError;
use evidex_domain::{
    AuditAction, BackupFileStatus, BackupManifest, BackupStatus, MANIFEST_FILE_NAME, SkipReason,
};

use super::{BackupPolicy, EvidenceBackupRequest, EvidenceBackupService};
use crate::audit_trail::AuditTrail;
use crate::evidence_locator::EvidenceLocator;
use crate::evidence_test_support::{
    FakeStorage, InMemoryStore, RecordingArchiveWriter, admin, practitioner, submission,
};

struct Harness {
    service: EvidenceBackupService,
    store: Arc<InMemoryStore>,
    storage: Arc<FakeStorage>,
    writer: Arc<RecordingArchiveWriter>,
}

fn harness(storage: FakeStorage, policy: BackupPolicy) -> Harness {
    let store = Arc::new(InMemoryStore::default());
    let storage = Arc::new(storage);
    let writer = Arc::new(RecordingArchiveWriter::default());
    let service = EvidenceBackupService::new(
        EvidenceLocator::new(store.clone()),
        storage.clone(),
        store.clone(),
        writer.clone(),
        AuditTrail::new(store.clone()),
        policy,
    );

    Harness {
        service,
        store,
        storage,
        writer,
    }
}

fn request(start: &str, end: &str) -> EvidenceBackupRequest {
    EvidenceBackupRequest {
        start_date: Some(start.to_owned()),
        end_date: Some(end.to_owned()),
        ip_address: Some("203.0.113.9".to_owned()),
    }
}

fn fast_policy() -> BackupPolicy {
    BackupPolicy {
        retry_backoff: Duration::from_millis(50),
        ..BackupPolicy::default()
    }
}

#[tokio::test]
async fn missing_dates_are_rejected_before_any_io() {
    let harness = harness(FakeStorage::new(), fast_policy());

    let result = harness
        .service
        .start_backup(
            &admin(),
            EvidenceBackupRequest {
                start_date: Some("2024-01-01".to_owned()),
                end_date: None,
                ip_address: None,
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(harness.store.state.lock().await.evidence_queries, 0);
    assert_eq!(harness.storage.open_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn inverted_range_is_rejected_without_side_effects() {
    let harness = harness(FakeStorage::new(), fast_policy());

    let result = harness
        .service
        .start_backup(&admin(), request("2024-03-01", "2024-03-01"))
        .await;

    let Err(AppError::Validation(message)) = result else {
        panic!("expected a validation error");
    };
    assert_eq!(message, "start date must be earlier than end date");

    let state = harness.store.state.lock().await;
    assert_eq!(state.evidence_queries, 0);
    assert!(state.backups.is_empty());
    assert!(state.audit.is_empty());
}

#[tokio::test]
async fn future_end_date_is_rejected() {
    let harness = harness(FakeStorage::new(), fast_policy());
    let today = Utc::now().date_naive();
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    let last_week = today.checked_sub_days(Days::new(7)).unwrap_or(today);

    let result = harness
        .service
        .start_backup(
            &admin(),
            request(&last_week.to_string(), &tomorrow.to_string()),
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn non_administrators_are_forbidden() {
    let harness = harness(FakeStorage::new(), fast_policy());

    let result = harness
        .service
        .start_backup(&practitioner(), request("2024-01-01", "2024-02-01"))
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn unconfigured_storage_fails_fast() {
    let harness = harness(FakeStorage::unconfigured(), fast_policy());

    let result = harness
        .service
        .start_backup(&admin(), request("2024-01-01", "2024-02-01"))
        .await;

    assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
    assert_eq!(harness.store.state.lock().await.evidence_queries, 0);
}

#[tokio::test]
async fn repository_failure_while_locating_is_audited() {
    let harness = harness(FakeStorage::new(), fast_policy());
    harness.store.state.lock().await.fail_evidence_queries = true;

    let result = harness
        .service
        .start_backup(&admin(), request("2024-01-01", "2024-03-01"))
        .await;

    assert!(matches!(result, Err(AppError::Internal(_))));
    let state = harness.store.state.lock().await;
    assert!(state.backups.is_empty());
    assert_eq!(state.audit.len(), 1);
    assert_eq!(
        state.audit[0].action,
        AuditAction::EvidenceBackupFailed.as_str()
    );
    assert_eq!(
        state.audit[0].payload["error"],
        "internal error: connection reset"
    );
}

#[tokio::test]
async fn empty_window_is_not_found() {
    let harness = harness(FakeStorage::new(), fast_policy());
    harness
        .store
        .seed_submissions(&[submission("evidence/a.pdf", "2023-05-01")])
        .await;

    let result = harness
        .service
        .start_backup(&admin(), request("2024-01-01", "2024-02-01"))
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(harness.store.state.lock().await.backups.is_empty());
}

#[tokio::test]
async fn candidate_count_above_cap_is_disclosed() {
    let harness = harness(
        FakeStorage::new(),
        BackupPolicy {
            max_files: 2,
            ..fast_policy()
        },
    );
    harness
        .store
        .seed_submissions(&[
            submission("evidence/a.pdf", "2024-01-02"),
            submission("evidence/b.pdf", "2024-01-03"),
            submission("evidence/c.pdf", "2024-01-04"),
        ])
        .await;

    let result = harness
        .service
        .start_backup(&admin(), request("2024-01-01", "2024-02-01"))
        .await;

    assert!(matches!(
        result,
        Err(AppError::LimitExceeded {
            requested: 3,
            limit: 2,
            ..
        })
    ));
    assert_eq!(harness.storage.open_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn partial_failures_are_skipped_and_listed_in_manifest() {
    let storage = FakeStorage::new()
        .with_object("evidence/ok-1.pdf", b"first certificate")
        .with_object("evidence/ok-2.pdf", b"second certificate")
        .with_object("evidence/flaky.pdf", b"eventually served")
        .with_object("evidence/broken.pdf", b"half of this arrives")
        .failing("evidence/down.pdf")
        .flaky("evidence/flaky.pdf", 2)
        .broken_stream("evidence/broken.pdf");
    let harness = harness(storage, fast_policy());

    let ok_1 = submission("evidence/ok-1.pdf", "2024-01-05");
    let ok_2 = submission("https://files.example.org/evidence/ok-2.pdf", "2024-01-06");
    let flaky = submission("evidence/flaky.pdf", "2024-01-07");
    let down = submission("evidence/down.pdf", "2024-01-08");
    let broken = submission("evidence/broken.pdf", "2024-01-09");
    let malformed = submission("ftp://legacy/evidence.pdf", "2024-01-10");
    harness
        .store
        .seed_submissions(&[
            ok_1.clone(),
            ok_2.clone(),
            flaky.clone(),
            down.clone(),
            broken.clone(),
            malformed.clone(),
        ])
        .await;

    let Ok(download) = harness
        .service
        .start_backup(&admin(), request("2024-01-01", "2024-01-31"))
        .await
    else {
        panic!("backup should start");
    };
    assert_eq!(download.total_files, 6);
    assert_eq!(
        download.file_name,
        "evidence-backup_2024-01-01_2024-01-31.zip"
    );

    let chunks: Vec<_> = download.body.collect().await;
    assert!(chunks.iter().all(Result::is_ok));

    let Ok(report) = download.completion.await else {
        panic!("archive run should not panic");
    };
    assert_eq!(report.status, BackupStatus::Completed);
    assert_eq!(report.added_files, 3);
    assert_eq!(report.skipped_files, 3);

    let recorded = harness.writer.record.lock().await;
    assert!(recorded.finished);
    assert_eq!(recorded.entries.len(), 4);
    let Some((manifest_path, manifest_bytes)) = recorded.entries.last() else {
        panic!("manifest entry missing");
    };
    assert_eq!(manifest_path, MANIFEST_FILE_NAME);

    let Ok(manifest) = serde_json::from_slice::<BackupManifest>(manifest_bytes) else {
        panic!("manifest should be valid JSON");
    };
    assert_eq!(manifest.total_files, 6);
    assert_eq!(manifest.added_files, 3);
    assert_eq!(manifest.skipped_count, 3);
    assert_eq!(manifest.backup_id, download.backup_id);

    let archived: HashSet<_> = manifest
        .files
        .iter()
        .map(|entry| entry.submission_id)
        .collect();
    assert_eq!(
        archived,
        HashSet::from([ok_1.submission_id, ok_2.submission_id, flaky.submission_id])
    );

    let reason_of = |id| {
        manifest
            .skipped_files
            .iter()
            .find(|entry| entry.submission_id == id)
            .map(|entry| entry.reason)
    };
    assert_eq!(
        reason_of(down.submission_id),
        Some(SkipReason::DownloadFailed)
    );
    assert_eq!(
        reason_of(broken.submission_id),
        Some(SkipReason::StreamError)
    );
    assert_eq!(
        reason_of(malformed.submission_id),
        Some(SkipReason::InvalidReference)
    );

    let state = harness.store.state.lock().await;
    let Some(record) = state.backups.first() else {
        panic!("backup record missing");
    };
    assert_eq!(record.status, BackupStatus::Completed);
    assert_eq!(record.note.as_deref(), Some("added 3, skipped 3"));
    assert_eq!(state.details.len(), 3);
    assert!(
        state
            .details
            .iter()
            .all(|detail| detail.status == BackupFileStatus::BackedUp)
    );
    assert_eq!(state.audit.len(), 1);
    assert_eq!(
        state.audit[0].action,
        AuditAction::EvidenceBackupCompleted.as_str()
    );
}

#[tokio::test(start_paused = true)]
async fn downloads_are_retried_three_times_before_skipping() {
    let storage = FakeStorage::new()
        .with_object("evidence/ok.pdf", b"ok")
        .failing("evidence/down.pdf");
    let harness = harness(storage, fast_policy());
    harness
        .store
        .seed_submissions(&[
            submission("evidence/ok.pdf", "2024-01-05"),
            submission("evidence/down.pdf", "2024-01-06"),
        ])
        .await;

    let Ok(download) = harness
        .service
        .start_backup(&admin(), request("2024-01-01", "2024-01-31"))
        .await
    else {
        panic!("backup should start");
    };
    let _chunks: Vec<_> = download.body.collect().await;
    let _report = download.completion.await;

    assert_eq!(harness.storage.open_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn zero_archived_files_fail_the_run_and_the_stream() {
    let storage = FakeStorage::new()
        .failing("evidence/a.pdf")
        .failing("evidence/b.pdf");
    let harness = harness(storage, fast_policy());
    harness
        .store
        .seed_submissions(&[
            submission("evidence/a.pdf", "2024-01-05"),
            submission("evidence/b.pdf", "2024-01-06"),
        ])
        .await;

    let Ok(download) = harness
        .service
        .start_backup(&admin(), request("2024-01-01", "2024-01-31"))
        .await
    else {
        panic!("backup should start");
    };

    let chunks: Vec<_> = download.body.collect().await;
    assert!(matches!(chunks.last(), Some(Err(_))));

    let Ok(report) = download.completion.await else {
        panic!("archive run should not panic");
    };
    assert_eq!(report.status, BackupStatus::Failed);
    assert_eq!(report.added_files, 0);

    let recorded = harness.writer.record.lock().await;
    assert!(!recorded.finished);
    assert!(recorded.aborted.is_some());

    let state = harness.store.state.lock().await;
    assert!(matches!(
        state.backups.first().map(|record| record.status),
        Some(BackupStatus::Failed)
    ));
    assert_eq!(state.audit.len(), 1);
    assert_eq!(
        state.audit[0].action,
        AuditAction::EvidenceBackupFailed.as_str()
    );
}

#[tokio::test(start_paused = true)]
async fn every_candidate_is_claimed_once_within_the_worker_bound() {
    let keys: Vec<String> = (0..40)
        .map(|index| format!("evidence/file-{index}.pdf"))
        .collect();
    let mut storage = FakeStorage::new();
    for key in &keys {
        storage = storage.with_object(key, b"pdf bytes");
    }
    let harness = harness(
        storage,
        BackupPolicy {
            concurrency: 4,
            ..fast_policy()
        },
    );
    let submissions: Vec<_> = keys
        .iter()
        .map(|key| submission(key, "2024-02-10"))
        .collect();
    harness.store.seed_submissions(&submissions).await;

    let Ok(download) = harness
        .service
        .start_backup(&admin(), request("2024-02-01", "2024-02-29"))
        .await
    else {
        panic!("backup should start");
    };
    let _chunks: Vec<_> = download.body.collect().await;
    let Ok(report) = download.completion.await else {
        panic!("archive run should not panic");
    };

    assert_eq!(report.added_files, 40);
    assert_eq!(harness.storage.open_calls.load(Ordering::SeqCst), 40);
    assert!(harness.storage.max_in_flight.load(Ordering::SeqCst) <= 4);

    let recorded = harness.writer.record.lock().await;
    let paths: HashSet<_> = recorded
        .entries
        .iter()
        .map(|(path, _)| path.clone())
        .collect();
    assert_eq!(paths.len(), 41);
}

#[tokio::test(start_paused = true)]
async fn disconnected_consumer_fails_the_run() {
    let storage = FakeStorage::new()
        .with_object("evidence/a.pdf", b"a")
        .with_object("evidence/b.pdf", b"b");
    let harness = harness(storage, fast_policy());
    harness
        .store
        .seed_submissions(&[
            submission("evidence/a.pdf", "2024-01-05"),
            submission("evidence/b.pdf", "2024-01-06"),
        ])
        .await;

    let Ok(download) = harness
        .service
        .start_backup(&admin(), request("2024-01-01", "2024-01-31"))
        .await
    else {
        panic!("backup should start");
    };
    drop(download.body);

    let Ok(report) = download.completion.await else {
        panic!("archive run should not panic");
    };
    assert_eq!(report.status, BackupStatus::Failed);

    let state = harness.store.state.lock().await;
    assert!(matches!(
        state.backups.first().map(|record| record.status),
        Some(BackupStatus::Failed)
    ));
    assert_eq!(state.audit.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unread_archive_is_not_marked_completed() {
    let storage = FakeStorage::new().with_object("evidence/a.pdf", b"a");
    let harness = harness(storage, fast_policy());
    harness
        .store
        .seed_submissions(&[submission("evidence/a.pdf", "2024-01-05")])
        .await;

    let Ok(download) = harness
        .service
        .start_backup(&admin(), request("2024-01-01", "2024-01-31"))
        .await
    else {
        panic!("backup should start");
    };

    while !harness.writer.record.lock().await.finished {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(matches!(
        harness
            .store
            .state
            .lock()
            .await
            .backups
            .first()
            .map(|record| record.status),
        Some(BackupStatus::InProgress)
    ));
    drop(download.body);

    let Ok(report) = download.completion.await else {
        panic!("archive run should not panic");
    };
    assert_eq!(report.status, BackupStatus::Failed);

    let state = harness.store.state.lock().await;
    assert!(matches!(
        state.backups.first().map(|record| record.status),
        Some(BackupStatus::Failed)
    ));
    assert_eq!(state.audit.len(), 1);
    assert_eq!(
        state.audit[0].action,
        AuditAction::EvidenceBackupFailed.as_str()
    );
}

#[tokio::test(start_paused = true)]
async fn unrecorded_completion_is_reported_as_failed() {
    let storage = FakeStorage::new().with_object("evidence/a.pdf", b"a");
    let harness = harness(storage, fast_policy());
    harness
        .store
        .seed_submissions(&[submission("evidence/a.pdf", "2024-01-05")])
        .await;

    let Ok(download) = harness
        .service
        .start_backup(&admin(), request("2024-01-01", "2024-01-31"))
        .await
    else {
        panic!("backup should start");
    };
    harness.store.state.lock().await.fail_finish_backup = true;

    let chunks: Vec<_> = download.body.collect().await;
    assert!(chunks.iter().all(Result::is_ok));
    let Ok(report) = download.completion.await else {
        panic!("archive run should not panic");
    };
    assert_eq!(report.status, BackupStatus::Failed);
    assert_eq!(report.added_files, 1);

    let state = harness.store.state.lock().await;
    assert_eq!(state.audit.len(), 1);
    assert_eq!(
        state.audit[0].action,
        AuditAction::EvidenceBackupFailed.as_str()
    );
    let recorded_error = state.audit[0].payload["error"].as_str().unwrap_or_default();
    assert!(recorded_error.contains("could not be completed"));
}

#[tokio::test(start_paused = true)]
async fn oversized_objects_are_skipped_as_stream_errors() {
    let storage = FakeStorage::new()
        .with_object("evidence/small.pdf", b"tiny")
        .with_object("evidence/huge.pdf", b"far more than sixteen bytes");
    let harness = harness(
        storage,
        BackupPolicy {
            max_file_bytes: 16,
            ..fast_policy()
        },
    );
    let huge = submission("evidence/huge.pdf", "2024-01-06");
    harness
        .store
        .seed_submissions(&[submission("evidence/small.pdf", "2024-01-05"), huge.clone()])
        .await;

    let Ok(download) = harness
        .service
        .start_backup(&admin(), request("2024-01-01", "2024-01-31"))
        .await
    else {
        panic!("backup should start");
    };
    let _chunks: Vec<_> = download.body.collect().await;
    let Ok(report) = download.completion.await else {
        panic!("archive run should not panic");
    };
    assert_eq!(report.status, BackupStatus::Completed);
    assert_eq!(report.added_files, 1);

    let recorded = harness.writer.record.lock().await;
    let Some((_, manifest_bytes)) = recorded.entries.last() else {
        panic!("manifest entry missing");
    };
    let Ok(manifest) = serde_json::from_slice::<BackupManifest>(manifest_bytes) else {
        panic!("manifest should be valid JSON");
    };
    assert!(matches!(
        manifest.skipped_files.as_slice(),
        [entry] if entry.submission_id == huge.submission_id && entry.reason == SkipReason::StreamError
    ));
}

#[tokio::test]
async fn history_requires_privileged_role() {
    let harness = harness(FakeStorage::new(), fast_policy());

    let denied = harness
        .service
        .list_recent_backups(&practitioner(), 20)
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let allowed = harness.service.list_recent_backups(&admin(), 20).await;
    assert!(matches!(allowed, Ok(ref records) if records.is_empty()));
}
