//! Vigil - Service Fleet Monitoring & Recommendation Engine
//!
//! Probes a fixed fleet of remote services on tiered cadences, stores
//! their health history, and derives operational recommendations from it.

mod advisor;
mod cache;
mod config;
mod db;
mod probe;
mod registry;
mod runner;
mod scheduler;
mod stats;
mod web;

use advisor::{Advisor, CompletionClient, Generator};
use cache::ResultCache;
use config::ServerConfig;
use db::Store;
use probe::ProbeExecutor;
use registry::TargetRegistry;
use runner::ProbeRunner;
use scheduler::{
    RetentionManager, Scheduler, Trigger, HIGH_PRIORITY_INTERVAL, MEDIUM_PRIORITY_INTERVAL,
    RECOMMENDATION_HOUR, RETENTION_HOUR,
};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vigil=info".parse()?),
        )
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting Vigil on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Load the monitored fleet
    let registry = Arc::new(TargetRegistry::load(&cfg.targets_path)?);
    if registry.is_empty() {
        tracing::warn!("No targets configured; probe sweeps will be idle");
    }
    tracing::info!("Monitoring {} targets", registry.len());
    for target in registry.all() {
        tracing::info!(
            "  {} ({}, every {}s)",
            target.display_name,
            target.priority,
            target.cadence_seconds
        );
    }

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let cache = Arc::new(ResultCache::new());
    let executor = Arc::new(ProbeExecutor::new()?);
    let runner = Arc::new(ProbeRunner::new(
        executor,
        store.clone(),
        cache.clone(),
        registry.clone(),
    ));

    let generator =
        CompletionClient::from_config(&cfg.generator).map(|c| Arc::new(c) as Arc<dyn Generator>);
    if generator.is_none() {
        tracing::warn!("VIGIL_GENERATOR_API_KEY not set - recommendation synthesis disabled");
    }
    let advisor = Arc::new(Advisor::new(
        store.clone(),
        cache.clone(),
        registry.clone(),
        generator,
        cfg.generator.model.clone(),
    ));
    let retention = Arc::new(RetentionManager::new(store.clone()));

    // Register job slots and start the scheduler
    let scheduler = Arc::new(Scheduler::new());

    let sweep = runner.clone();
    scheduler
        .register(
            "probe_sweep_high",
            Trigger::Interval(HIGH_PRIORITY_INTERVAL),
            move || {
                let runner = sweep.clone();
                async move {
                    runner.sweep_high().await;
                }
            },
        )
        .await;

    let sweep = runner.clone();
    scheduler
        .register(
            "probe_sweep_medium",
            Trigger::Interval(MEDIUM_PRIORITY_INTERVAL),
            move || {
                let runner = sweep.clone();
                async move {
                    runner.sweep_medium().await;
                }
            },
        )
        .await;

    let daily_advisor = advisor.clone();
    scheduler
        .register(
            "daily_recommendations",
            Trigger::Daily {
                hour: RECOMMENDATION_HOUR,
                minute: 0,
            },
            move || {
                let advisor = daily_advisor.clone();
                async move {
                    advisor.run_scheduled().await;
                }
            },
        )
        .await;

    let sweep_retention = retention.clone();
    let retention_registry = registry.clone();
    scheduler
        .register(
            "retention_sweep",
            Trigger::Daily {
                hour: RETENTION_HOUR,
                minute: 0,
            },
            move || {
                let retention = sweep_retention.clone();
                let registry = retention_registry.clone();
                async move {
                    retention.sweep_all(&registry);
                }
            },
        )
        .await;

    // First full sweep runs in the background once startup completes.
    let boot_runner = runner.clone();
    scheduler
        .register("initial_probe_sweep", Trigger::Once, move || {
            let runner = boot_runner.clone();
            async move {
                runner.sweep_all().await;
            }
        })
        .await;

    scheduler.start().await;
    tracing::info!("Scheduler started");

    // Start the web server; Ctrl-C drains it, then the scheduler.
    let state = web::AppState {
        store,
        registry,
        cache,
        runner,
        advisor,
    };
    let server = Server::new(&cfg, state);
    server.start(shutdown_signal()).await?;

    tracing::info!("Shutting down Vigil");
    scheduler.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
