//! Stats-refresh admission.
//!
//! A refresh is admitted at most once per subject while a previous one is
//! still being processed, and not at all while the last computed stats are
//! younger than the refresh interval. Two lists back this:
//!
//! - the main queue `queue:stats-refresh`: pending jobs, FIFO
//! - the processing list `queue:stats-refresh:processing`: jobs a worker holds
//!
//! The membership check decodes the whole processing list on every request.
//! That list is bounded by worker concurrency, so a linear scan is kept
//! instead of a secondary index.

use std::sync::Arc;
use std::time::Duration;

use pulseboard_core::{Clock, QueueEntry, RefreshOutcome, Timestamp};
use pulseboard_storage::Cache;
use thiserror::Error;

use crate::constants::{
    PROCESSING_SUFFIX, QUEUE_KEY_PREFIX, REFRESH_INTERVAL_SECS, STATS_REFRESH_QUEUE,
};

/// Errors that prevent a refresh decision from being honored.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Refresh subject must not be empty")]
    InvalidSubject,

    /// The job passed every check but could not be appended. Surfaced instead
    /// of swallowed: a silently dropped job would never run.
    #[error("Failed to enqueue refresh for {user_id} on {queue}")]
    EnqueueFailed { queue: String, user_id: String },
}

/// Admission gate in front of a job queue.
pub struct JobAdmissionQueue {
    cache: Arc<Cache>,
    clock: Arc<dyn Clock>,
    queue_key: String,
    processing_key: String,
    refresh_interval: Duration,
}

impl JobAdmissionQueue {
    /// Gate for the stats-refresh queue.
    pub fn new(cache: Arc<Cache>, clock: Arc<dyn Clock>) -> Self {
        Self::for_queue(cache, clock, STATS_REFRESH_QUEUE)
    }

    /// Gate for an arbitrary named queue.
    pub fn for_queue(cache: Arc<Cache>, clock: Arc<dyn Clock>, name: &str) -> Self {
        let queue_key = format!("{}{}", QUEUE_KEY_PREFIX, name);
        let processing_key = format!("{}{}", queue_key, PROCESSING_SUFFIX);
        Self {
            cache,
            clock,
            queue_key,
            processing_key,
            refresh_interval: Duration::from_secs(REFRESH_INTERVAL_SECS),
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Logical key of the main queue.
    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    /// Logical key of the processing list.
    pub fn processing_key(&self) -> &str {
        &self.processing_key
    }

    /// Decide whether to queue a refresh for `user_id`.
    ///
    /// Checks run in order: freshness of `last_known_update`, then presence
    /// in the processing list, then the enqueue itself. Only the enqueue can
    /// fail; the membership check degrades to "not processing".
    pub async fn request_refresh(
        &self,
        user_id: &str,
        last_known_update: Option<Timestamp>,
    ) -> Result<RefreshOutcome, AdmissionError> {
        if user_id.trim().is_empty() {
            return Err(AdmissionError::InvalidSubject);
        }

        let now = self.clock.now();

        if let Some(last_updated_at) = last_known_update {
            if self.is_up_to_date(now, last_updated_at) {
                tracing::debug!(user_id = %user_id, %last_updated_at, "Refresh rejected: stats up to date");
                return Ok(RefreshOutcome::RejectedUpToDate { last_updated_at });
            }
        }

        let in_progress = self
            .cache
            .is_member_of_queue::<QueueEntry, _>(&self.processing_key, |entry| {
                entry.user_id == user_id
            })
            .await;
        if in_progress {
            tracing::debug!(user_id = %user_id, "Refresh rejected: already processing");
            return Ok(RefreshOutcome::RejectedInProgress);
        }

        let entry = QueueEntry::new(user_id, now);
        match self.cache.push_to_queue(&self.queue_key, &entry).await {
            Some(len) => {
                tracing::info!(user_id = %user_id, queue = %self.queue_key, len, "Refresh admitted");
                Ok(RefreshOutcome::Admitted)
            }
            None => Err(AdmissionError::EnqueueFailed {
                queue: self.queue_key.clone(),
                user_id: user_id.to_string(),
            }),
        }
    }

    /// Number of jobs waiting in the main queue; 0 on failure.
    pub async fn pending_len(&self) -> u64 {
        self.cache.queue_len(&self.queue_key).await
    }

    fn is_up_to_date(&self, now: Timestamp, last_updated_at: Timestamp) -> bool {
        // A timestamp from the future counts as fresh.
        match now.signed_duration_since(last_updated_at).to_std() {
            Ok(age) => age <= self.refresh_interval,
            Err(_) => true,
        }
    }
}
