//! Fan-out probe runner.
//!
//! Executes a batch of probes concurrently, persists the results, emits
//! alert events for non-healthy outcomes, and invalidates the health
//! overview cache.

use std::sync::Arc;

use crate::cache::{ResultCache, HEALTH_OVERVIEW_KEY};
use crate::db::{ProbeResult, Store, WorkflowAlertEvent};
use crate::probe::ProbeExecutor;
use crate::registry::{Priority, Target, TargetRegistry};

pub struct ProbeRunner {
    executor: Arc<ProbeExecutor>,
    store: Arc<Store>,
    cache: Arc<ResultCache>,
    registry: Arc<TargetRegistry>,
}

impl ProbeRunner {
    pub fn new(
        executor: Arc<ProbeExecutor>,
        store: Arc<Store>,
        cache: Arc<ResultCache>,
        registry: Arc<TargetRegistry>,
    ) -> Self {
        Self {
            executor,
            store,
            cache,
            registry,
        }
    }

    /// Probe every target in the batch concurrently, then persist the
    /// collected results. Each probe runs in its own task so one failing
    /// (or panicking) probe cannot block collection of the others.
    pub async fn run(&self, targets: &[Target]) -> Vec<ProbeResult> {
        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let executor = self.executor.clone();
            let target = target.clone();
            handles.push(tokio::spawn(
                async move { executor.probe(&target).await },
            ));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!("Probe task failed: {}", e),
            }
        }

        for result in &results {
            if let Err(e) = self.store.insert_probe_result(result) {
                tracing::error!(
                    "Error storing probe result for {}: {}",
                    result.target_id,
                    e
                );
                continue;
            }

            tracing::info!("{}: {}", result.target_id, result.status);

            if !result.is_healthy() {
                let event = WorkflowAlertEvent::for_result(result);
                if let Err(e) = self.store.insert_alert_event(&event) {
                    tracing::error!(
                        "Error storing alert event for {}: {}",
                        result.target_id,
                        e
                    );
                }
            }
        }

        // At least one latest-result pointer moved, so readers must
        // recompute the overview even after an all-healthy batch.
        self.cache.invalidate(HEALTH_OVERVIEW_KEY);

        results
    }

    /// Sweep the high-priority tier.
    pub async fn sweep_high(&self) -> Vec<ProbeResult> {
        let targets = self.registry.with_priority(Priority::High);
        tracing::info!("Checking {} high-priority targets", targets.len());
        self.run(&targets).await
    }

    /// Sweep the medium-priority tier.
    pub async fn sweep_medium(&self) -> Vec<ProbeResult> {
        let targets = self.registry.with_priority(Priority::Medium);
        tracing::info!("Checking {} medium-priority targets", targets.len());
        self.run(&targets).await
    }

    /// Sweep the whole fleet (startup check and manual trigger).
    pub async fn sweep_all(&self) -> Vec<ProbeResult> {
        tracing::info!("Checking all {} targets", self.registry.len());
        self.run(self.registry.all()).await
    }
}
