//! Property-Based Tests for Stats-Refresh Admission
//!
//! A subject present in the processing list is never admitted, fresh stats
//! are never requeued, and a failed enqueue is reported instead of dropped.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use pulseboard_api::{AdmissionError, JobAdmissionQueue};
use pulseboard_test_utils::fixtures::{failing_cache, memory_cache, test_clock};
use pulseboard_test_utils::generators::arb_user_id;
use pulseboard_test_utils::{Cache, Clock, KeyValueStore, ManualClock, QueueEntry, RefreshOutcome};

async fn admission() -> (JobAdmissionQueue, Arc<Cache>, Arc<ManualClock>) {
    let clock = test_clock();
    let (cache, _store) = memory_cache(clock.clone()).await;
    let queue = JobAdmissionQueue::new(cache.clone(), clock.clone());
    (queue, cache, clock)
}

async fn mark_processing(cache: &Cache, queue: &JobAdmissionQueue, user_id: &str, at: &ManualClock) {
    let entry = QueueEntry::new(user_id, at.now());
    cache.push_to_queue(queue.processing_key(), &entry).await;
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_admitted_job_lands_on_main_queue() -> Result<(), String> {
    let (queue, cache, clock) = admission().await;

    let outcome = queue
        .request_refresh("user-1", None)
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(outcome, RefreshOutcome::Admitted);

    let raw = cache
        .store()
        .list_range(queue.queue_key(), 0, -1)
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(raw.len(), 1);

    let entry: QueueEntry = serde_json::from_slice(&raw[0]).map_err(|e| e.to_string())?;
    assert_eq!(entry, QueueEntry::new("user-1", clock.now()));
    assert_eq!(entry.retry_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_processing_subject_is_rejected() {
    let (queue, cache, clock) = admission().await;
    mark_processing(&cache, &queue, "user-1", &clock).await;

    assert_eq!(
        queue.request_refresh("user-1", None).await,
        Ok(RefreshOutcome::RejectedInProgress)
    );
    assert_eq!(queue.pending_len().await, 0);

    assert_eq!(
        queue.request_refresh("user-2", None).await,
        Ok(RefreshOutcome::Admitted)
    );
}

#[tokio::test]
async fn test_up_to_date_check_runs_before_processing_check() {
    let (queue, cache, clock) = admission().await;
    mark_processing(&cache, &queue, "user-1", &clock).await;

    let last = clock.now();
    clock.advance(Duration::from_secs(60));

    assert_eq!(
        queue.request_refresh("user-1", Some(last)).await,
        Ok(RefreshOutcome::RejectedUpToDate {
            last_updated_at: last
        })
    );
}

#[tokio::test]
async fn test_pending_duplicates_are_not_deduplicated() {
    let (queue, _cache, _clock) = admission().await;

    for _ in 0..2 {
        assert_eq!(
            queue.request_refresh("user-1", None).await,
            Ok(RefreshOutcome::Admitted)
        );
    }
    assert_eq!(queue.pending_len().await, 2);
}

#[tokio::test]
async fn test_enqueue_failure_is_reported() {
    let (cache, _store) = failing_cache();
    let queue = JobAdmissionQueue::new(cache, test_clock());

    assert_eq!(
        queue.request_refresh("user-1", None).await,
        Err(AdmissionError::EnqueueFailed {
            queue: "queue:stats-refresh".to_string(),
            user_id: "user-1".to_string(),
        })
    );
    assert_eq!(queue.pending_len().await, 0);
}

#[tokio::test]
async fn test_enqueue_on_disconnected_store_is_reported() -> Result<(), String> {
    let (queue, cache, _clock) = admission().await;
    cache.store().destroy().await.map_err(|e| e.to_string())?;

    assert!(matches!(
        queue.request_refresh("user-1", None).await,
        Err(AdmissionError::EnqueueFailed { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_up_to_date_needs_no_store() {
    let (cache, store) = failing_cache();
    let clock = test_clock();
    let queue = JobAdmissionQueue::new(cache, clock.clone());

    let last = clock.now();
    assert!(matches!(
        queue.request_refresh("user-1", Some(last)).await,
        Ok(RefreshOutcome::RejectedUpToDate { .. })
    ));
    assert_eq!(store.calls(), 0);
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// While a subject is in the processing list no request for it is
    /// admitted, whatever its last update time.
    #[test]
    fn prop_processing_subject_never_admitted(
        user_id in arb_user_id(),
        attempts in 1usize..5,
        stale_secs in proptest::option::of(901u64..86_400),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (queue, cache, clock) = admission().await;
            mark_processing(&cache, &queue, &user_id, &clock).await;

            let last = stale_secs.map(|secs| clock.now() - chrono::Duration::seconds(secs as i64));
            for _ in 0..attempts {
                let outcome = queue.request_refresh(&user_id, last).await;
                prop_assert_eq!(outcome, Ok(RefreshOutcome::RejectedInProgress));
            }
            prop_assert_eq!(queue.pending_len().await, 0);
            Ok(())
        })?;
    }

    /// Stats younger than the refresh interval are never requeued.
    #[test]
    fn prop_fresh_stats_never_admitted(user_id in arb_user_id(), age_secs in 0u64..=900) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (queue, _cache, clock) = admission().await;
            let last = clock.now() - chrono::Duration::seconds(age_secs as i64);

            let outcome = queue.request_refresh(&user_id, Some(last)).await;
            prop_assert_eq!(outcome, Ok(RefreshOutcome::RejectedUpToDate { last_updated_at: last }));
            prop_assert_eq!(queue.pending_len().await, 0);
            Ok(())
        })?;
    }
}
