//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type recorded when a probe comes back in any non-healthy state.
pub const HEALTH_ALERT_EVENT: &str = "system_health_alert";

/// Outcome classification of one probe attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Healthy,
    Unhealthy,
    Timeout,
    Error,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Healthy => "healthy",
            ProbeStatus::Unhealthy => "unhealthy",
            ProbeStatus::Timeout => "timeout",
            ProbeStatus::Error => "error",
        }
    }

    /// Parse a stored status label. Unknown labels degrade to `Error`.
    pub fn parse(s: &str) -> Self {
        match s {
            "healthy" => ProbeStatus::Healthy,
            "unhealthy" => ProbeStatus::Unhealthy,
            "timeout" => ProbeStatus::Timeout,
            _ => ProbeStatus::Error,
        }
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded outcome of probing a target.
///
/// Append-only: rows are written by the fan-out runner and removed only by
/// the retention sweep. `latency_ms` is present iff an HTTP response was
/// received, whatever its status code; `metadata` carries the decoded
/// response body and is present only for healthy results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub id: Option<i64>,
    pub target_id: String,
    pub status: ProbeStatus,
    pub latency_ms: Option<u64>,
    pub observed_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl ProbeResult {
    fn base(target_id: &str, status: ProbeStatus) -> Self {
        Self {
            id: None,
            target_id: target_id.to_string(),
            status,
            latency_ms: None,
            observed_at: Utc::now(),
            error_message: None,
            metadata: None,
        }
    }

    /// HTTP 200 with a decoded body.
    pub fn healthy(target_id: &str, latency_ms: u64, metadata: serde_json::Value) -> Self {
        let mut result = Self::base(target_id, ProbeStatus::Healthy);
        result.latency_ms = Some(latency_ms);
        result.metadata = Some(metadata);
        result
    }

    /// A completed exchange with a non-200 status code.
    pub fn unhealthy(target_id: &str, latency_ms: u64, error: String) -> Self {
        let mut result = Self::base(target_id, ProbeStatus::Unhealthy);
        result.latency_ms = Some(latency_ms);
        result.error_message = Some(error);
        result
    }

    /// The attempt timed out before any response arrived.
    pub fn timeout(target_id: &str, error: String) -> Self {
        let mut result = Self::base(target_id, ProbeStatus::Timeout);
        result.error_message = Some(error);
        result
    }

    /// Transport failure or an unusable response.
    pub fn error(target_id: &str, latency_ms: Option<u64>, error: String) -> Self {
        let mut result = Self::base(target_id, ProbeStatus::Error);
        result.latency_ms = latency_ms;
        result.error_message = Some(error);
        result
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ProbeStatus::Healthy
    }
}

/// Alert record emitted whenever a probe result is not healthy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowAlertEvent {
    pub id: Option<i64>,
    pub event_type: String,
    pub target_id: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl WorkflowAlertEvent {
    /// Build the alert for a non-healthy probe result; the full result is
    /// carried as the payload.
    pub fn for_result(result: &ProbeResult) -> Self {
        Self {
            id: None,
            event_type: HEALTH_ALERT_EVENT.to_string(),
            target_id: result.target_id.clone(),
            payload: serde_json::to_value(result).unwrap_or(serde_json::Value::Null),
            created_at: Utc::now(),
        }
    }
}

/// A stored recommendation produced by a synthesis cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Option<i64>,
    pub recommendation_type: String,
    pub priority: String,
    pub title: String,
    pub description: String,
    pub target_id: String,
    pub actionable: bool,
    pub status: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
