//! Web server module.

mod handlers;

pub use handlers::*;

use crate::advisor::Advisor;
use crate::cache::ResultCache;
use crate::config::ServerConfig;
use crate::db::Store;
use crate::registry::TargetRegistry;
use crate::runner::ProbeRunner;

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub registry: Arc<TargetRegistry>,
    pub cache: Arc<ResultCache>,
    pub runner: Arc<ProbeRunner>,
    pub advisor: Arc<Advisor>,
}

/// Web server for Vigil.
pub struct Server {
    port: u16,
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: &ServerConfig, state: AppState) -> Self {
        Self {
            port: config.http_port,
            state,
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/", get(handlers::handle_root))
            // API endpoints
            .route("/api/health/overview", get(handlers::handle_health_overview))
            .route("/api/health/detailed", get(handlers::handle_health_detailed))
            .route("/api/health/check", post(handlers::handle_trigger_check))
            .route(
                "/api/recommendations",
                get(handlers::handle_get_recommendations),
            )
            .route(
                "/api/recommendations/generate",
                post(handlers::handle_generate_recommendations),
            )
            .route(
                "/api/metrics/performance",
                get(handlers::handle_performance_metrics),
            )
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Serve until the shutdown future resolves.
    pub async fn start(
        &self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
