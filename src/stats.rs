//! Stats aggregation over stored probe history.
//!
//! Reduces a bounded window of results per target into the compact summary
//! handed to the recommendation generator. Nothing here is persisted; a
//! summary lives only for the request or synthesis cycle that computed it.

use serde::Serialize;

use crate::db::{ProbeResult, ProbeStatus};
use crate::registry::TargetRegistry;

/// Distinct error messages carried per target summary.
pub const ERROR_SAMPLE_LIMIT: usize = 3;

/// Compact performance summary for one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetStats {
    pub target_id: String,
    pub sample_count: usize,
    pub healthy_count: usize,
    pub uptime_pct: f64,
    pub avg_latency_ms: Option<f64>,
    pub min_latency_ms: Option<u64>,
    pub max_latency_ms: Option<u64>,
    /// Distinct non-null error messages, most recent first.
    pub recent_errors: Vec<String>,
}

/// Reduce a newest-first window of results into a summary.
///
/// An empty window yields 0% uptime rather than a division fault, and a
/// window without any completed exchange yields `None` latencies rather
/// than zeroes.
pub fn summarize(target_id: &str, window: &[ProbeResult]) -> TargetStats {
    let sample_count = window.len();
    let healthy_count = window
        .iter()
        .filter(|r| r.status == ProbeStatus::Healthy)
        .count();

    let uptime_pct = if sample_count > 0 {
        healthy_count as f64 / sample_count as f64 * 100.0
    } else {
        0.0
    };

    let latencies: Vec<u64> = window.iter().filter_map(|r| r.latency_ms).collect();
    let (avg_latency_ms, min_latency_ms, max_latency_ms) = if latencies.is_empty() {
        (None, None, None)
    } else {
        let sum: u64 = latencies.iter().sum();
        (
            Some(sum as f64 / latencies.len() as f64),
            latencies.iter().copied().min(),
            latencies.iter().copied().max(),
        )
    };

    let mut recent_errors = Vec::new();
    for result in window {
        if let Some(message) = &result.error_message {
            if !recent_errors.contains(message) {
                recent_errors.push(message.clone());
                if recent_errors.len() == ERROR_SAMPLE_LIMIT {
                    break;
                }
            }
        }
    }

    TargetStats {
        target_id: target_id.to_string(),
        sample_count,
        healthy_count,
        uptime_pct,
        avg_latency_ms,
        min_latency_ms,
        max_latency_ms,
        recent_errors,
    }
}

/// Render the analysis context handed to the recommendation generator.
pub fn build_summary(registry: &TargetRegistry, stats: &[TargetStats]) -> String {
    let mut out = String::from("# Service Fleet Performance Analysis\n\n## Health Summary\n\n");

    for s in stats {
        let name = registry
            .get(&s.target_id)
            .map(|t| t.display_name.as_str())
            .unwrap_or(s.target_id.as_str());

        out.push_str(&format!("### {}\n", name));
        out.push_str(&format!("- Uptime: {:.1}%\n", s.uptime_pct));
        match s.avg_latency_ms {
            Some(avg) => out.push_str(&format!("- Avg Response: {:.0}ms\n", avg)),
            None => out.push_str("- Avg Response: n/a\n"),
        }
        out.push_str(&format!(
            "- Issues: {}/{} checks\n",
            s.sample_count - s.healthy_count,
            s.sample_count
        ));
        if !s.recent_errors.is_empty() {
            out.push_str(&format!("- Recent Errors: {}\n", s.recent_errors.join(", ")));
        }
        out.push('\n');
    }

    out
}
