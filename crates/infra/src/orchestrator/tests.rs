//! Scenario tests for the orchestration core over in-memory adapters.

use std::sync::Arc;

use chrono::{Duration, Utc};

use datastory_core::{JobId, UserId};
use datastory_jobs::{
    CompletionPayload, DiscardReason, ErrorCode, JobStatus, Narratives, Stage, TransitionError,
    TransitionOutcome,
};
use datastory_quota::{QuotaError, Tier};

use super::*;
use crate::storage::InMemoryObjectStorage;
use crate::store::{InMemoryJobStore, InMemoryQuotaLedger, InMemoryStoryStore, JobStore, QuotaLedger, StoryStore};
use crate::worker::InMemoryWorkerClient;

struct Harness {
    orchestrator: Arc<Orchestrator>,
    jobs: Arc<InMemoryJobStore>,
    stories: Arc<InMemoryStoryStore>,
    ledger: Arc<InMemoryQuotaLedger>,
    storage: Arc<InMemoryObjectStorage>,
    worker: Arc<InMemoryWorkerClient>,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(OrchestratorSettings::default())
    }

    fn with_settings(settings: OrchestratorSettings) -> Self {
        let jobs = InMemoryJobStore::arc();
        let stories = InMemoryStoryStore::arc();
        let ledger = InMemoryQuotaLedger::arc();
        let storage = InMemoryObjectStorage::arc();
        let worker = InMemoryWorkerClient::arc();
        let orchestrator = Arc::new(Orchestrator::new(
            jobs.clone(),
            stories.clone(),
            ledger.clone(),
            storage.clone(),
            worker.clone(),
            settings,
        ));
        Self {
            orchestrator,
            jobs,
            stories,
            ledger,
            storage,
            worker,
        }
    }

    async fn user(&self, tier: Tier) -> UserId {
        let user = UserId::new();
        self.orchestrator.ensure_account(user, tier).await.unwrap();
        user
    }

    async fn stories_this_period(&self, user: UserId) -> u64 {
        self.ledger.snapshot(user, Utc::now()).await.unwrap().stories_this_period
    }

    async fn submit_csv(&self, user: UserId, rows: usize) -> datastory_jobs::Job {
        self.orchestrator.submit(user, csv_upload(rows)).await.unwrap()
    }
}

fn csv_upload(rows: usize) -> Upload {
    let mut text = String::from("region,month,revenue\n");
    for i in 0..rows {
        text.push_str(&format!("north,{i},{}\n", i * 10));
    }
    Upload {
        file_name: "sales.csv".to_string(),
        content_type: Some("text/csv".to_string()),
        bytes: text.into_bytes(),
        options: serde_json::json!({ "title": "Q3 revenue" }),
    }
}

fn progress(stage: Stage, progress: u8) -> WorkerSignal {
    WorkerSignal::Progress {
        stage: Some(stage),
        progress: Some(progress),
        attempt: None,
    }
}

fn failed(code: &str) -> WorkerSignal {
    WorkerSignal::Failed {
        code: code.to_string(),
        message: format!("{code} raised by worker"),
        attempt: None,
    }
}

fn completed() -> WorkerSignal {
    WorkerSignal::Completed {
        payload: CompletionPayload {
            narratives: Narratives {
                summary: "Revenue grew.".to_string(),
                key_findings: "- North leads".to_string(),
                recommendations: "Invest north.".to_string(),
            },
            charts: vec![serde_json::json!({ "type": "bar" })],
            statistics: serde_json::json!({ "rows": 10 }),
        },
        attempt: None,
    }
}

// ---- admission ----

#[tokio::test]
async fn wrong_type_is_reported_before_size() {
    let h = Harness::with_settings(OrchestratorSettings::default().with_max_upload_bytes(16));
    let user = h.user(Tier::Free).await;

    let upload = Upload {
        file_name: "report.pdf".to_string(),
        content_type: Some("application/pdf".to_string()),
        bytes: vec![b'x'; 1024],
        options: serde_json::json!({}),
    };
    let err = h.orchestrator.submit(user, upload).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidFileType);

    let err = h.orchestrator.submit(user, csv_upload(10)).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::FileTooLarge { limit: 16, .. }));
}

#[tokio::test]
async fn row_limit_rejection_carries_both_numbers() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;

    let err = h.orchestrator.submit(user, csv_upload(1_001)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::RowLimitExceeded);
    let message = err.to_string();
    assert!(message.contains("1001"), "{message}");
    assert!(message.contains("1000"), "{message}");
}

#[tokio::test]
async fn unreadable_dataset_is_rejected() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let upload = Upload {
        bytes: vec![0xff, 0xfe, 0xfd],
        ..csv_upload(0)
    };
    let err = h.orchestrator.submit(user, upload).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnreadableDataset);
}

#[tokio::test]
async fn quota_boundary() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;

    h.ledger.set_stories_this_period(user, 2).unwrap();
    let job = h.submit_csv(user, 10).await;
    assert_eq!(job.status, JobStatus::Processing);

    let other = h.user(Tier::Free).await;
    h.ledger.set_stories_this_period(other, 3).unwrap();
    let err = h.orchestrator.submit(other, csv_upload(10)).await.unwrap_err();
    match err {
        OrchestratorError::Quota(QuotaError::QuotaExceeded { used, limit, reset_at }) => {
            assert_eq!(used, 3);
            assert_eq!(limit, 3);
            assert!(reset_at > Utc::now());
        }
        other => panic!("expected QUOTA_EXCEEDED, got {other:?}"),
    }
}

#[tokio::test]
async fn unlimited_tier_is_never_rejected_for_quota() {
    let h = Harness::new();
    let user = h.user(Tier::Enterprise).await;
    h.ledger.set_stories_this_period(user, 1_000_000).unwrap();

    for _ in 0..5 {
        h.submit_csv(user, 10).await;
    }
}

#[tokio::test]
async fn rejected_uploads_leave_no_trace() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    h.ledger.set_stories_this_period(user, 3).unwrap();

    assert!(h.orchestrator.submit(user, csv_upload(10)).await.is_err());
    assert!(h.storage.is_empty());
    assert!(h.worker.requests().is_empty());
    assert!(h.jobs.list_stale(Utc::now() + Duration::days(1), 10).await.unwrap().is_empty());
    assert_eq!(h.ledger.snapshot(user, Utc::now()).await.unwrap().reserved, 0);
}

#[tokio::test]
async fn admitted_job_is_stored_and_dispatched() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;

    assert_eq!(job.attempts, 1);
    assert_eq!(job.progress, 0);
    assert_eq!(job.source.row_count, 10);
    assert_eq!(job.source.column_count, 3);
    assert!(h.storage.object(&job.source.storage_key).is_some());

    let requests = h.worker.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].job_id, job.id);
    assert_eq!(requests[0].options["title"], "Q3 revenue");
    assert!(requests[0].callback_url.ends_with(&format!("/callbacks/jobs/{}", job.id)));
    assert_eq!(h.ledger.snapshot(user, Utc::now()).await.unwrap().reserved, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_cannot_share_the_last_slot() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    h.ledger.set_stories_this_period(user, 2).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = h.orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.submit(user, csv_upload(5)).await
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(err) => assert_eq!(err.code(), ErrorCode::QuotaExceeded),
        }
    }
    assert_eq!(admitted, 1);
}

// ---- dispatch ----

#[tokio::test]
async fn dispatch_failure_fails_the_job_but_not_the_submission() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    h.worker.set_failing(true);

    let job = h.submit_csv(user, 10).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error.as_ref().map(|e| e.code.as_str()),
        Some(ErrorCode::DispatchFailed.as_str())
    );
    assert_eq!(h.ledger.snapshot(user, Utc::now()).await.unwrap().reserved, 0);

    let view = h.orchestrator.status(job.id, user).await.unwrap();
    assert!(view.can_retry);

    h.worker.set_failing(false);
    let retried = h.orchestrator.retry(job.id, user).await.unwrap();
    assert_eq!(retried.status, JobStatus::Processing);
    assert_eq!(retried.attempts, 2);
    assert_eq!(h.worker.requests().len(), 1);
}

// ---- callbacks & finalization ----

#[tokio::test]
async fn end_to_end_success() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;
    assert_eq!(job.status, JobStatus::Processing);

    h.orchestrator
        .handle_callback(job.id, progress(Stage::Analyzing, 40))
        .await
        .unwrap();
    let view = h.orchestrator.status(job.id, user).await.unwrap();
    assert_eq!(view.stage, Stage::Analyzing);
    assert_eq!(view.progress, 40);

    let outcome = h.orchestrator.handle_callback(job.id, completed()).await.unwrap();
    assert_eq!(outcome, TransitionOutcome::Applied);

    let view = h.orchestrator.status(job.id, user).await.unwrap();
    assert_eq!(view.status, JobStatus::Completed);
    let story_id = view.result_ref.expect("resultRef set on completion");
    assert_eq!(h.stories_this_period(user).await, 1);

    let story = h.orchestrator.story(story_id, user).await.unwrap();
    assert_eq!(story.job_id, job.id);
    assert_eq!(story.title, "Q3 revenue");
    assert_eq!(story.dataset.row_count, 10);
    assert_eq!(story.charts.len(), 1);
}

#[tokio::test]
async fn duplicate_completion_creates_one_story_and_counts_once() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;

    assert_eq!(
        h.orchestrator.handle_callback(job.id, completed()).await.unwrap(),
        TransitionOutcome::Applied
    );
    assert_eq!(
        h.orchestrator.handle_callback(job.id, completed()).await.unwrap(),
        TransitionOutcome::Duplicate
    );

    assert_eq!(h.stories.len(), 1);
    assert_eq!(h.stories_this_period(user).await, 1);
    let q = h.ledger.snapshot(user, Utc::now()).await.unwrap();
    assert_eq!(q.total_stories_created, 1);
    assert_eq!(q.reserved, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_completions_finalize_once() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = h.orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.handle_callback(job.id, completed()).await
        }));
    }
    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() == TransitionOutcome::Applied {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(h.stories.len(), 1);
    assert_eq!(h.stories_this_period(user).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_completion_and_failure_leave_one_consistent_outcome() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;

    let a = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.handle_callback(job.id, completed()).await })
    };
    let b = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.handle_callback(job.id, failed("ANALYSIS_ERROR")).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(results.iter().filter(|r| matches!(r, Ok(TransitionOutcome::Applied))).count(), 1);

    let stored = h.jobs.get(job.id).await.unwrap().unwrap();
    match stored.status {
        JobStatus::Completed => {
            assert!(stored.result_ref.is_some());
            assert!(stored.error.is_none());
            assert_eq!(h.stories.len(), 1);
            assert_eq!(h.stories_this_period(user).await, 1);
        }
        JobStatus::Failed => {
            assert!(stored.result_ref.is_none());
            assert!(h.stories.is_empty());
            assert_eq!(h.stories_this_period(user).await, 0);
        }
        JobStatus::Processing => panic!("one of the signals must win"),
    }
}

#[tokio::test]
async fn progress_after_completion_is_discarded() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;
    h.orchestrator.handle_callback(job.id, completed()).await.unwrap();
    let before = h.jobs.get(job.id).await.unwrap().unwrap();

    let outcome = h
        .orchestrator
        .handle_callback(job.id, progress(Stage::CreatingVisualizations, 80))
        .await
        .unwrap();
    assert_eq!(outcome, TransitionOutcome::Discarded(DiscardReason::TerminalState));

    let after = h.jobs.get(job.id).await.unwrap().unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.progress, before.progress);
    assert_eq!(after.result_ref, before.result_ref);
}

#[tokio::test]
async fn completion_of_failed_job_is_inconsistent_and_changes_nothing() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;
    h.orchestrator.handle_callback(job.id, failed("ANALYSIS_ERROR")).await.unwrap();
    let before = h.jobs.get(job.id).await.unwrap().unwrap();

    let err = h.orchestrator.handle_callback(job.id, completed()).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Transition(TransitionError::Inconsistent { current: JobStatus::Failed, .. })
    ));
    assert_eq!(err.code(), ErrorCode::InconsistentState);
    assert_eq!(h.jobs.get(job.id).await.unwrap().unwrap(), before);
    assert!(h.stories.is_empty());
    assert_eq!(h.stories_this_period(user).await, 0);
}

#[tokio::test]
async fn failure_of_completed_job_is_inconsistent() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;
    h.orchestrator.handle_callback(job.id, completed()).await.unwrap();

    let err = h
        .orchestrator
        .handle_callback(job.id, failed("ANALYSIS_ERROR"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InconsistentState);
    assert_eq!(
        h.jobs.get(job.id).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn callbacks_for_unknown_jobs_create_nothing() {
    let h = Harness::new();
    let missing = JobId::new();

    for signal in [progress(Stage::Analyzing, 10), failed("X"), completed()] {
        let err = h.orchestrator.handle_callback(missing, signal).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::JobNotFound(id) if id == missing));
    }
    assert!(h.jobs.get(missing).await.unwrap().is_none());
    assert!(h.stories.is_empty());
}

#[tokio::test]
async fn out_of_range_progress_is_an_invalid_callback() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;

    let err = h
        .orchestrator
        .handle_callback(job.id, progress(Stage::Analyzing, 140))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidCallback);
}

// ---- retry ----

#[tokio::test]
async fn failure_then_retry_then_completion() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;

    h.orchestrator.handle_callback(job.id, failed("PARSE_ERROR")).await.unwrap();
    let view = h.orchestrator.status(job.id, user).await.unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    assert_eq!(view.attempts, 1);
    assert!(view.can_retry);
    assert_eq!(view.error.as_ref().map(|e| e.code.as_str()), Some("PARSE_ERROR"));

    let retried = h.orchestrator.retry(job.id, user).await.unwrap();
    assert_eq!(retried.status, JobStatus::Processing);
    assert_eq!(retried.attempts, 2);
    assert_eq!(retried.progress, 0);
    assert!(retried.error.is_none());

    let requests = h.worker.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].attempt, 2);
    assert_eq!(requests[1].source, requests[0].source);
    assert_eq!(requests[1].options, requests[0].options);

    h.orchestrator.handle_callback(job.id, completed()).await.unwrap();
    let view = h.orchestrator.status(job.id, user).await.unwrap();
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(h.stories.len(), 1);
    assert_eq!(h.stories_this_period(user).await, 1);
}

#[tokio::test]
async fn retry_is_bounded_by_max_attempts() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;

    for _ in 1..3 {
        h.orchestrator.handle_callback(job.id, failed("ANALYSIS_ERROR")).await.unwrap();
        h.orchestrator.retry(job.id, user).await.unwrap();
    }
    h.orchestrator.handle_callback(job.id, failed("ANALYSIS_ERROR")).await.unwrap();

    let err = h.orchestrator.retry(job.id, user).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::MaxRetriesExceeded);

    let stored = h.jobs.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.attempts, 3);
    assert_eq!(stored.history.len(), 3);
    assert!(!h.orchestrator.status(job.id, user).await.unwrap().can_retry);
}

#[tokio::test]
async fn retry_of_active_job_is_not_retryable() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;

    let err = h.orchestrator.retry(job.id, user).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::JobNotRetryable);
}

#[tokio::test]
async fn retry_needs_a_free_quota_slot() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;
    h.orchestrator.handle_callback(job.id, failed("ANALYSIS_ERROR")).await.unwrap();

    h.ledger.set_stories_this_period(user, 3).unwrap();
    let err = h.orchestrator.retry(job.id, user).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::QuotaExceeded);
    assert_eq!(h.jobs.get(job.id).await.unwrap().unwrap().attempts, 1);
}

#[tokio::test]
async fn retry_after_a_tier_downgrade_keeps_the_admitted_row_count() {
    let h = Harness::new();
    let user = h.user(Tier::Professional).await;
    let job = h.submit_csv(user, 5_000).await;
    h.orchestrator.handle_callback(job.id, failed("ANALYSIS_ERROR")).await.unwrap();

    h.orchestrator.ensure_account(user, Tier::Free).await.unwrap();
    let retried = h.orchestrator.retry(job.id, user).await.unwrap();
    assert_eq!(retried.status, JobStatus::Processing);
    assert_eq!(retried.attempts, 2);
    assert_eq!(retried.source.row_count, 5_000);
    assert_eq!(h.ledger.snapshot(user, Utc::now()).await.unwrap().reserved, 1);
}

#[tokio::test]
async fn late_signals_from_a_previous_attempt_are_discarded() {
    let h = Harness::new();
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;
    h.orchestrator.handle_callback(job.id, failed("ANALYSIS_ERROR")).await.unwrap();
    h.orchestrator.retry(job.id, user).await.unwrap();

    let stale = WorkerSignal::Completed {
        payload: CompletionPayload::default(),
        attempt: Some(1),
    };
    let outcome = h.orchestrator.handle_callback(job.id, stale).await.unwrap();
    assert_eq!(outcome, TransitionOutcome::Discarded(DiscardReason::StaleAttempt));
    assert!(h.stories.is_empty());
    assert_eq!(
        h.jobs.get(job.id).await.unwrap().unwrap().status,
        JobStatus::Processing
    );
}

// ---- ownership ----

#[tokio::test]
async fn other_users_cannot_see_or_retry_a_job() {
    let h = Harness::new();
    let owner = h.user(Tier::Free).await;
    let intruder = h.user(Tier::Free).await;
    let job = h.submit_csv(owner, 10).await;
    h.orchestrator.handle_callback(job.id, failed("ANALYSIS_ERROR")).await.unwrap();

    assert!(matches!(
        h.orchestrator.status(job.id, intruder).await,
        Err(OrchestratorError::Forbidden)
    ));
    assert!(matches!(
        h.orchestrator.retry(job.id, intruder).await,
        Err(OrchestratorError::Forbidden)
    ));
    assert_eq!(h.jobs.get(job.id).await.unwrap().unwrap().attempts, 1);

    assert!(matches!(
        h.orchestrator.status(JobId::new(), owner).await,
        Err(OrchestratorError::JobNotFound(_))
    ));
}

#[tokio::test]
async fn stories_are_private_to_their_owner() {
    let h = Harness::new();
    let owner = h.user(Tier::Free).await;
    let intruder = h.user(Tier::Free).await;
    let job = h.submit_csv(owner, 10).await;
    h.orchestrator.handle_callback(job.id, completed()).await.unwrap();
    let story = h.stories.find_by_job(job.id).await.unwrap().unwrap();

    assert!(h.orchestrator.story(story.id, owner).await.is_ok());
    assert!(matches!(
        h.orchestrator.story(story.id, intruder).await,
        Err(OrchestratorError::Forbidden)
    ));
}

// ---- reaper ----

#[tokio::test]
async fn reaper_times_out_idle_jobs() {
    let h = Harness::with_settings(OrchestratorSettings::default().with_stale_after(Duration::minutes(30)));
    let user = h.user(Tier::Free).await;
    let idle = h.submit_csv(user, 10).await;
    let done = h.submit_csv(user, 10).await;
    h.orchestrator.handle_callback(done.id, completed()).await.unwrap();

    assert_eq!(h.orchestrator.reap_stale(Utc::now()).await.unwrap(), 0);

    let later = Utc::now() + Duration::minutes(31);
    assert_eq!(h.orchestrator.reap_stale(later).await.unwrap(), 1);

    let view = h.orchestrator.status(idle.id, user).await.unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    assert_eq!(view.error.as_ref().map(|e| e.code.as_str()), Some("JOB_TIMEOUT"));
    assert!(view.can_retry);
    assert_eq!(h.ledger.snapshot(user, Utc::now()).await.unwrap().reserved, 0);
}

#[tokio::test]
async fn reaper_task_sweeps_and_shuts_down() {
    let h = Harness::with_settings(OrchestratorSettings::default().with_stale_after(Duration::zero()));
    let user = h.user(Tier::Free).await;
    let job = h.submit_csv(user, 10).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let handle = StaleJobReaper::spawn(h.orchestrator.clone(), std::time::Duration::from_millis(10));
    let mut status = JobStatus::Processing;
    for _ in 0..100 {
        status = h.jobs.get(job.id).await.unwrap().unwrap().status;
        if status == JobStatus::Failed {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    handle.shutdown().await;
    assert_eq!(status, JobStatus::Failed);
}
