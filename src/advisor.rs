//! Recommendation synthesis.
//!
//! Aggregates recent probe history into a performance summary, hands it to
//! an external text-completion service, and parses the free-form reply
//! into stored recommendations. A reply that cannot be parsed is preserved
//! verbatim as a single fallback record; a failed cycle yields zero
//! recommendations and never propagates to the scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::cache::{ResultCache, RECOMMENDATIONS_KEY};
use crate::config::GeneratorConfig;
use crate::db::{Recommendation, Store};
use crate::registry::TargetRegistry;
use crate::stats;

/// Results read per target when building the synthesis summary.
const SYNTHESIS_WINDOW: i64 = 100;

/// Generator error types.
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("generator request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("generator returned status {0}: {1}")]
    Api(u16, String),
    #[error("generator reply contained no text content")]
    EmptyReply,
}

/// Boundary to the external text-completion service.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce free-form analysis text for a pre-built performance summary.
    async fn generate(&self, summary: &str) -> Result<String, GeneratorError>;
}

const RECOMMENDATION_INSTRUCTION: &str = r#"Analyze this data and provide 3-5 actionable recommendations as JSON:

[{"title": "...", "description": "...", "priority": "high|medium|low", "target_id": "...", "recommendation_type": "performance|reliability|optimization", "action": "..."}]"#;

/// HTTP client for a messages-style completion API.
pub struct CompletionClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl CompletionClient {
    /// Build a client from config; `None` when no API key is configured.
    pub fn from_config(config: &GeneratorConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Generator for CompletionClient {
    async fn generate(&self, summary: &str) -> Result<String, GeneratorError> {
        let prompt = format!("{}\n\n{}", summary, RECOMMENDATION_INSTRUCTION);

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await?;

        let code = response.status();
        if !code.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Api(code.as_u16(), body));
        }

        let reply: serde_json::Value = response.json().await?;
        reply["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or(GeneratorError::EmptyReply)
    }
}

/// One element of the generator's JSON reply. Every field is optional so a
/// sloppy reply still maps onto a usable record.
#[derive(Debug, Deserialize)]
struct DraftRecommendation {
    title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    target_id: Option<String>,
    recommendation_type: Option<String>,
    action: Option<String>,
}

/// Extract a JSON recommendation array from free text.
///
/// When no parseable array is found, the reply is kept verbatim as one
/// analysis record rather than discarded.
fn parse_reply(reply: &str, source: &str, now: DateTime<Utc>) -> Vec<Recommendation> {
    let array = Regex::new(r"\[[\s\S]*\]")
        .ok()
        .and_then(|re| re.find(reply))
        .map(|m| m.as_str());

    if let Some(raw) = array {
        match serde_json::from_str::<Vec<DraftRecommendation>>(raw) {
            Ok(drafts) => {
                return drafts
                    .into_iter()
                    .map(|draft| Recommendation {
                        id: None,
                        recommendation_type: draft
                            .recommendation_type
                            .unwrap_or_else(|| "general".to_string()),
                        priority: draft.priority.unwrap_or_else(|| "medium".to_string()),
                        title: draft
                            .title
                            .unwrap_or_else(|| "Service Recommendation".to_string()),
                        description: draft.description.unwrap_or_default(),
                        target_id: draft.target_id.unwrap_or_else(|| "all".to_string()),
                        actionable: true,
                        status: "active".to_string(),
                        metadata: json!({
                            "source": source,
                            "action": draft.action.unwrap_or_default(),
                            "generated_at": now.to_rfc3339(),
                        }),
                        created_at: now,
                    })
                    .collect();
            }
            Err(e) => tracing::warn!("Could not parse recommendation JSON: {}", e),
        }
    }

    vec![Recommendation {
        id: None,
        recommendation_type: "analysis".to_string(),
        priority: "medium".to_string(),
        title: "Fleet Analysis".to_string(),
        description: reply.to_string(),
        target_id: "all".to_string(),
        actionable: true,
        status: "active".to_string(),
        metadata: json!({"source": source}),
        created_at: now,
    }]
}

/// Drives synthesis cycles: history → summary → generator → records.
pub struct Advisor {
    store: Arc<Store>,
    cache: Arc<ResultCache>,
    registry: Arc<TargetRegistry>,
    generator: Option<Arc<dyn Generator>>,
    source: String,
}

impl Advisor {
    pub fn new(
        store: Arc<Store>,
        cache: Arc<ResultCache>,
        registry: Arc<TargetRegistry>,
        generator: Option<Arc<dyn Generator>>,
        source: String,
    ) -> Self {
        Self {
            store,
            cache,
            registry,
            generator,
            source,
        }
    }

    /// Run one synthesis cycle. All failures are absorbed: a missing or
    /// unreachable generator yields an empty vec, never an error.
    pub async fn synthesize(&self) -> Vec<Recommendation> {
        let generator = match &self.generator {
            Some(g) => g.clone(),
            None => {
                tracing::warn!("Recommendation generator not configured; skipping synthesis");
                return Vec::new();
            }
        };

        let mut fleet_stats = Vec::new();
        for target in self.registry.all() {
            match self.store.recent_probe_results(&target.id, SYNTHESIS_WINDOW) {
                Ok(window) if !window.is_empty() => {
                    fleet_stats.push(stats::summarize(&target.id, &window));
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Failed to read history for {}: {}", target.id, e),
            }
        }

        if fleet_stats.is_empty() {
            tracing::info!("No probe history yet; skipping synthesis");
            return Vec::new();
        }

        let summary = stats::build_summary(&self.registry, &fleet_stats);
        let reply = match generator.generate(&summary).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Error generating recommendations: {}", e);
                return Vec::new();
            }
        };

        let recommendations = parse_reply(&reply, &self.source, Utc::now());
        tracing::info!("Generated {} recommendations", recommendations.len());
        recommendations
    }

    /// Scheduled synthesis: persist the cycle's output and refresh the
    /// recommendations cache. Per-record write failures are logged and
    /// skipped.
    pub async fn run_scheduled(&self) {
        let recommendations = self.synthesize().await;

        for rec in &recommendations {
            if let Err(e) = self.store.insert_recommendation(rec) {
                tracing::error!("Error storing recommendation: {}", e);
            }
        }

        self.cache.invalidate(RECOMMENDATIONS_KEY);
    }
}
