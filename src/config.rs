//! Configuration module for Vigil.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "vigil.db")
    pub db_path: String,
    /// Path to the monitored-fleet TOML file (default: "targets.toml")
    pub targets_path: String,
    /// Recommendation generator settings
    pub generator: GeneratorConfig,
}

/// Settings for the external text-completion service that turns fleet
/// summaries into recommendations.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Messages endpoint URL
    pub api_url: String,
    /// API key; when unset, recommendation synthesis is disabled
    pub api_key: Option<String>,
    /// Model identifier sent with each request
    pub model: String,
    /// Completion token budget per request
    pub max_tokens: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "vigil.db".to_string(),
            targets_path: "targets.toml".to_string(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 2000,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `VIGIL_HTTP_PORT`: HTTP port (default: 8080)
    /// - `VIGIL_DB_PATH`: Database file path (default: "vigil.db")
    /// - `VIGIL_TARGETS_PATH`: Fleet file path (default: "targets.toml")
    /// - `VIGIL_GENERATOR_URL`: Completion API endpoint
    /// - `VIGIL_GENERATOR_API_KEY`: Completion API key (unset disables synthesis)
    /// - `VIGIL_GENERATOR_MODEL`: Model identifier
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("VIGIL_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(db_path) = env::var("VIGIL_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Ok(targets_path) = env::var("VIGIL_TARGETS_PATH") {
            cfg.targets_path = targets_path;
        }

        if let Ok(api_url) = env::var("VIGIL_GENERATOR_URL") {
            cfg.generator.api_url = api_url;
        }

        if let Ok(api_key) = env::var("VIGIL_GENERATOR_API_KEY") {
            if !api_key.is_empty() {
                cfg.generator.api_key = Some(api_key);
            }
        }

        if let Ok(model) = env::var("VIGIL_GENERATOR_MODEL") {
            cfg.generator.model = model;
        }

        cfg
    }
}
