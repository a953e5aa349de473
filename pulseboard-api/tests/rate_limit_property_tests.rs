//! Property-Based Tests for the Authentication-Failure Rate Limiter
//!
//! Counter monotonicity, window reset under simulated time, and fail-open
//! behavior against a store that rejects every command.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;
use pulseboard_api::{failure_key, RateLimiter};
use pulseboard_test_utils::fixtures::{failing_cache, memory_cache, test_clock};
use pulseboard_test_utils::generators::arb_client_ip;
use pulseboard_test_utils::{AuthFailureRecord, Clock, KeyValueStore, ManualClock};

async fn limiter() -> (RateLimiter, Arc<ManualClock>) {
    let clock = test_clock();
    let (cache, _store) = memory_cache(clock.clone()).await;
    (RateLimiter::new(cache, clock.clone()), clock)
}

/// `fmt` writer that keeps everything written to it.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn lines_at(&self, level: &str) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| line.contains(level))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_threshold_warning_logged_once_on_fifth_failure() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (limiter, clock) = limiter().await;
            let ip = "10.0.0.5";

            for _ in 0..4 {
                limiter.track_failure(ip).await;
                clock.advance(Duration::from_secs(15));
            }
            assert!(!limiter.is_blocked(ip).await);
            assert!(logs.lines_at("WARN").is_empty());

            limiter.track_failure(ip).await;
            assert!(limiter.is_blocked(ip).await);
            let warnings = logs.lines_at("WARN");
            assert_eq!(warnings.len(), 1);
            assert!(warnings[0].contains("Authentication failure threshold reached"));
            assert!(warnings[0].contains("10.0.0.5"));

            limiter.clear_failures(ip).await;
            assert!(!limiter.is_blocked(ip).await);
            assert_eq!(logs.lines_at("WARN").len(), 1);
        });
    });
}

#[tokio::test]
async fn test_five_failures_in_two_minutes_block_client() {
    let (limiter, clock) = limiter().await;
    let ip = "10.0.0.5";

    for _ in 0..5 {
        limiter.track_failure(ip).await;
        clock.advance(Duration::from_secs(24));
    }
    assert!(limiter.is_blocked(ip).await);
    assert_eq!(limiter.failure_count(ip).await, 5);

    // Lockout runs LOCKOUT_SECONDS from the last failure, 24s ago.
    clock.advance(Duration::from_secs(900 - 24 - 1));
    assert!(limiter.is_blocked(ip).await);

    clock.advance(Duration::from_secs(1));
    assert!(!limiter.is_blocked(ip).await);
    assert_eq!(limiter.failure_count(ip).await, 0);
}

#[tokio::test]
async fn test_clear_failures_unblocks() {
    let (limiter, _clock) = limiter().await;
    for _ in 0..5 {
        limiter.track_failure("10.0.0.9").await;
    }
    assert!(limiter.is_blocked("10.0.0.9").await);

    limiter.clear_failures("10.0.0.9").await;
    assert!(!limiter.is_blocked("10.0.0.9").await);
    assert_eq!(limiter.failure_count("10.0.0.9").await, 0);
}

#[tokio::test]
async fn test_clients_are_tracked_independently() {
    let (limiter, _clock) = limiter().await;
    for _ in 0..5 {
        limiter.track_failure("10.0.0.1").await;
    }
    assert!(limiter.is_blocked("10.0.0.1").await);
    assert!(!limiter.is_blocked("10.0.0.2").await);
}

#[tokio::test]
async fn test_retry_after_reports_remaining_lockout() {
    let (limiter, clock) = limiter().await;
    assert_eq!(limiter.retry_after("10.0.0.5").await, None);

    for _ in 0..5 {
        limiter.track_failure("10.0.0.5").await;
    }
    clock.advance(Duration::from_secs(100));

    assert_eq!(
        limiter.retry_after("10.0.0.5").await,
        Some(Duration::from_secs(800))
    );
}

#[tokio::test]
async fn test_lockout_remaining_reads_record_ttl() {
    let (limiter, clock) = limiter().await;
    assert_eq!(limiter.lockout_remaining("10.0.0.5").await, None);

    // Below the threshold the record still carries a TTL.
    limiter.track_failure("10.0.0.5").await;
    clock.advance(Duration::from_secs(30));
    assert!(!limiter.is_blocked("10.0.0.5").await);
    assert_eq!(
        limiter.lockout_remaining("10.0.0.5").await,
        Some(Duration::from_secs(870))
    );
    assert_eq!(limiter.retry_after("10.0.0.5").await, None);
}

#[tokio::test]
async fn test_failure_record_is_stored_under_auth_failure_key() -> Result<(), String> {
    let clock = test_clock();
    let (cache, store) = memory_cache(clock.clone()).await;
    let limiter = RateLimiter::new(cache.clone(), clock.clone());

    limiter.track_failure("10.0.0.5").await;

    let record: AuthFailureRecord = cache
        .get(&failure_key("10.0.0.5"))
        .await
        .ok_or("record missing")?;
    assert_eq!(record.count, 1);
    assert_eq!(record.first_failure, clock.now());

    let ttl = store
        .ttl("auth-failure:10.0.0.5")
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(ttl, Some(900));
    Ok(())
}

#[tokio::test]
async fn test_fail_open_on_failing_store() {
    let (cache, store) = failing_cache();
    let limiter = RateLimiter::new(cache, test_clock());

    for _ in 0..10 {
        limiter.track_failure("10.0.0.5").await;
    }
    assert!(!limiter.is_blocked("10.0.0.5").await);
    assert_eq!(limiter.failure_count("10.0.0.5").await, 0);
    assert_eq!(limiter.retry_after("10.0.0.5").await, None);
    limiter.clear_failures("10.0.0.5").await;

    assert!(store.calls() > 0);
}

#[tokio::test]
async fn test_fail_open_on_disconnected_store() -> Result<(), String> {
    let clock = test_clock();
    let (cache, store) = memory_cache(clock.clone()).await;
    let limiter = RateLimiter::new(cache, clock);

    for _ in 0..5 {
        limiter.track_failure("10.0.0.5").await;
    }
    assert!(limiter.is_blocked("10.0.0.5").await);

    store.destroy().await.map_err(|e| e.to_string())?;
    assert!(!limiter.is_blocked("10.0.0.5").await);
    Ok(())
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A client is blocked exactly when it has N >= 5 failures inside one
    /// window, and the count equals the number of failures recorded.
    #[test]
    fn prop_blocked_iff_threshold_reached(ip in arb_client_ip(), failures in 0u32..12) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (limiter, clock) = limiter().await;
            for i in 0..failures {
                limiter.track_failure(&ip).await;
                prop_assert_eq!(limiter.failure_count(&ip).await, i + 1);
                clock.advance(Duration::from_secs(10));
            }
            prop_assert_eq!(limiter.is_blocked(&ip).await, failures >= 5);
            Ok(())
        })?;
    }

    /// A failure arriving WINDOW_SECONDS or more after the first failure of
    /// the current window starts a new window with count 1.
    #[test]
    fn prop_window_resets_after_window_elapses(
        ip in arb_client_ip(),
        failures in 1u32..5,
        extra_secs in 0u64..600,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (limiter, clock) = limiter().await;
            for _ in 0..failures {
                limiter.track_failure(&ip).await;
            }
            clock.advance(Duration::from_secs(300 + extra_secs));

            limiter.track_failure(&ip).await;
            prop_assert_eq!(limiter.failure_count(&ip).await, 1);
            prop_assert!(!limiter.is_blocked(&ip).await);
            Ok(())
        })?;
    }

    /// Failures inside one window keep accumulating against the first failure.
    #[test]
    fn prop_window_does_not_slide_forward(ip in arb_client_ip(), step_secs in 1u64..60) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (limiter, clock) = limiter().await;
            limiter.track_failure(&ip).await;
            let mut elapsed = 0;
            let mut expected = 1;
            while elapsed + step_secs < 300 {
                clock.advance(Duration::from_secs(step_secs));
                elapsed += step_secs;
                limiter.track_failure(&ip).await;
                expected += 1;
            }
            prop_assert_eq!(limiter.failure_count(&ip).await, expected);
            Ok(())
        })?;
    }
}
