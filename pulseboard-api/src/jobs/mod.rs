//! Job admission for Pulseboard API
//!
//! This module decides whether expensive background work should be queued:
//!
//! - `refresh`: Stats-refresh admission with dedup against in-flight jobs
//!
//! Dequeueing and processing belong to the external worker; nothing here
//! removes entries from a queue.
//!
//! # Usage
//!
//! ```ignore
//! use pulseboard_api::jobs::JobAdmissionQueue;
//!
//! let queue = JobAdmissionQueue::new(cache, clock);
//! match queue.request_refresh(&user_id, stats.last_updated_at).await? {
//!     RefreshOutcome::Admitted => { /* 202 */ }
//!     other => { /* report why nothing was queued */ }
//! }
//! ```

pub mod refresh;

pub use refresh::{AdmissionError, JobAdmissionQueue};
