//! Probe module for fleet health checks.
//!
//! A probe is one HTTP exchange against a target's status endpoint,
//! wrapped in bounded retries. Every failure mode is folded into the
//! returned result's status; nothing here surfaces as an error to callers.

mod http;

pub use http::*;

use std::time::Duration;
use thiserror::Error;

/// Transport-level failure of a single probe attempt, internal to the
/// executor. Timeouts end the attempt sequence; other transport failures
/// are retried.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
}
