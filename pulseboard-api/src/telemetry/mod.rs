//! Pulseboard Telemetry - Logging Infrastructure
//!
//! Structured logging for the API layer via `tracing-subscriber`. Works
//! standalone; no collector is required.

pub mod logging;

pub use logging::{init_logging, TelemetryConfig};
