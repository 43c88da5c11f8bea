//! HTTP request handlers.

use super::AppState;
use crate::cache::{
    HEALTH_OVERVIEW_KEY, HEALTH_OVERVIEW_TTL, RECOMMENDATIONS_KEY, RECOMMENDATIONS_TTL,
};
use crate::db::{DbError, ProbeStatus, Store};
use crate::registry::TargetRegistry;
use crate::stats;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

/// Results per target shown by the detailed health view.
const DETAILED_HISTORY: i64 = 10;

// ============================================================================
// Service info
// ============================================================================

pub async fn handle_root() -> impl IntoResponse {
    Json(json!({
        "service": "Vigil",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Service fleet monitoring and recommendation engine",
        "endpoints": {
            "health_overview": "/api/health/overview",
            "health_detailed": "/api/health/detailed",
            "recommendations": "/api/recommendations",
            "generate_recommendations": "/api/recommendations/generate",
            "performance_metrics": "/api/metrics/performance",
            "trigger_check": "/api/health/check",
        },
    }))
}

// ============================================================================
// Health
// ============================================================================

pub async fn handle_health_overview(State(state): State<AppState>) -> impl IntoResponse {
    let payload = state
        .cache
        .get_or_compute(HEALTH_OVERVIEW_KEY, HEALTH_OVERVIEW_TTL, || async {
            build_health_overview(&state.store, &state.registry)
        })
        .await;

    match payload {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn build_health_overview(store: &Store, registry: &TargetRegistry) -> Result<Value, DbError> {
    let mut targets = serde_json::Map::new();
    let mut healthy = 0usize;

    for target in registry.all() {
        let entry = match store.latest_probe_result(&target.id)? {
            Some(latest) => {
                if latest.status == ProbeStatus::Healthy {
                    healthy += 1;
                }
                json!({
                    "name": target.display_name,
                    "status": latest.status,
                    "latency_ms": latest.latency_ms,
                    "observed_at": latest.observed_at,
                    "priority": target.priority,
                })
            }
            None => json!({
                "name": target.display_name,
                "status": "unknown",
                "priority": target.priority,
            }),
        };
        targets.insert(target.id.clone(), entry);
    }

    Ok(json!({
        "overall_health": format!("{}/{}", healthy, registry.len()),
        "targets": targets,
        "timestamp": Utc::now(),
    }))
}

pub async fn handle_health_detailed(State(state): State<AppState>) -> impl IntoResponse {
    match build_health_detailed(&state.store, &state.registry) {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn build_health_detailed(store: &Store, registry: &TargetRegistry) -> Result<Value, DbError> {
    let mut targets = serde_json::Map::new();

    for target in registry.all() {
        let history = store.recent_probe_results(&target.id, DETAILED_HISTORY)?;
        if history.is_empty() {
            continue;
        }

        let summary = stats::summarize(&target.id, &history);
        let current = history[0].clone();
        targets.insert(
            target.id.clone(),
            json!({
                "name": target.display_name,
                "priority": target.priority,
                "cadence_seconds": target.cadence_seconds,
                "current_status": current,
                "recent_history": history,
                "uptime_percentage": round1(summary.uptime_pct),
            }),
        );
    }

    Ok(json!({
        "targets": targets,
        "timestamp": Utc::now(),
    }))
}

pub async fn handle_trigger_check(State(state): State<AppState>) -> impl IntoResponse {
    let results = state.runner.sweep_all().await;
    Json(json!({
        "message": "Health check completed",
        "targets_checked": results.len(),
        "timestamp": Utc::now(),
    }))
}

// ============================================================================
// Recommendations
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_status() -> String {
    "active".to_string()
}

fn default_limit() -> i64 {
    10
}

pub async fn handle_get_recommendations(
    State(state): State<AppState>,
    Query(query): Query<RecommendationsQuery>,
) -> impl IntoResponse {
    let payload = state
        .cache
        .get_or_compute(RECOMMENDATIONS_KEY, RECOMMENDATIONS_TTL, || async {
            build_recommendations_listing(&state.store, &query.status, query.limit)
        })
        .await;

    match payload {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn build_recommendations_listing(
    store: &Store,
    status: &str,
    limit: i64,
) -> Result<Value, DbError> {
    let recommendations = store.recommendations_by_status(status, limit)?;
    Ok(json!({
        "recommendations": recommendations,
        "count": recommendations.len(),
        "timestamp": Utc::now(),
    }))
}

pub async fn handle_generate_recommendations(State(state): State<AppState>) -> impl IntoResponse {
    let recommendations = state.advisor.synthesize().await;

    for rec in &recommendations {
        if let Err(e) = state.store.insert_recommendation(rec) {
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    }

    state.cache.invalidate(RECOMMENDATIONS_KEY);

    Json(json!({
        "message": "Recommendations generated",
        "count": recommendations.len(),
        "recommendations": recommendations,
    }))
    .into_response()
}

// ============================================================================
// Metrics
// ============================================================================

pub async fn handle_performance_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match build_performance_metrics(&state.store, &state.registry) {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn build_performance_metrics(store: &Store, registry: &TargetRegistry) -> Result<Value, DbError> {
    let cutoff = Utc::now() - ChronoDuration::hours(24);
    let mut targets = serde_json::Map::new();

    for target in registry.all() {
        let window = store.probe_results_since(&target.id, cutoff)?;
        if window.is_empty() {
            continue;
        }

        let summary = stats::summarize(&target.id, &window);
        targets.insert(
            target.id.clone(),
            json!({
                "name": target.display_name,
                "total_checks": summary.sample_count,
                "healthy_checks": summary.healthy_count,
                "uptime_24h": round2(summary.uptime_pct),
                "avg_latency_ms": summary.avg_latency_ms.map(round2),
                "min_latency_ms": summary.min_latency_ms,
                "max_latency_ms": summary.max_latency_ms,
            }),
        );
    }

    Ok(json!({
        "period": "24 hours",
        "targets": targets,
        "timestamp": Utc::now(),
    }))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ProbeResult;
    use serde_json::json;
    use tempfile::NamedTempFile;

    const FLEET: &str = r#"
[[targets]]
id = "alpha"
display_name = "Alpha"
base_address = "http://localhost:3000"
probe_path = "/api/status"
cadence_seconds = 300
priority = "high"

[[targets]]
id = "beta"
display_name = "Beta"
base_address = "http://localhost:3001"
probe_path = "/api/status"
cadence_seconds = 600
priority = "medium"
"#;

    fn fixtures() -> (NamedTempFile, Store, TargetRegistry) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let registry = TargetRegistry::from_toml_str(FLEET).unwrap();
        (tmp, store, registry)
    }

    #[test]
    fn overview_counts_healthy_targets() {
        let (_tmp, store, registry) = fixtures();

        store
            .insert_probe_result(&ProbeResult::healthy("alpha", 20, json!({})))
            .unwrap();
        store
            .insert_probe_result(&ProbeResult::unhealthy("beta", 30, "HTTP 503".to_string()))
            .unwrap();

        let overview = build_health_overview(&store, &registry).unwrap();
        assert_eq!(overview["overall_health"], "1/2");
        assert_eq!(overview["targets"]["alpha"]["status"], "healthy");
        assert_eq!(overview["targets"]["beta"]["status"], "unhealthy");
    }

    #[test]
    fn overview_marks_unprobed_targets_unknown() {
        let (_tmp, store, registry) = fixtures();

        let overview = build_health_overview(&store, &registry).unwrap();
        assert_eq!(overview["overall_health"], "0/2");
        assert_eq!(overview["targets"]["alpha"]["status"], "unknown");
    }

    #[test]
    fn detailed_reports_windowed_uptime() {
        let (_tmp, store, registry) = fixtures();

        for _ in 0..3 {
            store
                .insert_probe_result(&ProbeResult::healthy("alpha", 10, json!({})))
                .unwrap();
        }
        store
            .insert_probe_result(&ProbeResult::unhealthy("alpha", 10, "HTTP 500".to_string()))
            .unwrap();

        let detailed = build_health_detailed(&store, &registry).unwrap();
        let alpha = &detailed["targets"]["alpha"];
        assert_eq!(alpha["uptime_percentage"], 75.0);
        assert_eq!(alpha["current_status"]["status"], "unhealthy");
        assert_eq!(alpha["recent_history"].as_array().unwrap().len(), 4);
        // Beta has no history and is omitted.
        assert!(detailed["targets"].get("beta").is_none());
    }

    #[test]
    fn performance_metrics_cover_24_hours() {
        let (_tmp, store, registry) = fixtures();

        store
            .insert_probe_result(&ProbeResult::healthy("alpha", 100, json!({})))
            .unwrap();
        store
            .insert_probe_result(&ProbeResult::healthy("alpha", 200, json!({})))
            .unwrap();

        let mut stale = ProbeResult::healthy("alpha", 900, json!({}));
        stale.observed_at = Utc::now() - ChronoDuration::hours(30);
        store.insert_probe_result(&stale).unwrap();

        let metrics = build_performance_metrics(&store, &registry).unwrap();
        let alpha = &metrics["targets"]["alpha"];
        assert_eq!(alpha["total_checks"], 2);
        assert_eq!(alpha["uptime_24h"], 100.0);
        assert_eq!(alpha["avg_latency_ms"], 150.0);
        assert_eq!(alpha["min_latency_ms"], 100);
        assert_eq!(alpha["max_latency_ms"], 200);
    }

    #[test]
    fn rounding_helpers() {
        assert_eq!(round1(66.666), 66.7);
        assert_eq!(round2(66.666), 66.67);
    }
}
