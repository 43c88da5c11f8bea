//! Target registry: the immutable description of the monitored fleet.
//!
//! Built once at startup from a TOML file and never mutated afterwards;
//! every component that needs the fleet receives a shared reference.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::{fmt, fs};
use thiserror::Error;

/// Registry error types.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to read targets file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse targets file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid target '{0}': {1}")]
    Invalid(String, String),
}

/// Scheduling tier of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
        }
    }
}

/// One monitored remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub display_name: String,
    pub base_address: String,
    pub probe_path: String,
    pub cadence_seconds: u64,
    pub priority: Priority,
}

impl Target {
    /// Full URL of the target's status endpoint.
    pub fn probe_url(&self) -> String {
        format!(
            "{}{}",
            self.base_address.trim_end_matches('/'),
            self.probe_path
        )
    }
}

#[derive(Debug, Deserialize)]
struct TargetsFile {
    #[serde(default)]
    targets: Vec<Target>,
}

/// Immutable collection of monitored targets.
pub struct TargetRegistry {
    targets: Vec<Target>,
}

/// Written on first run when no targets file exists yet.
const SAMPLE_TARGETS: &str = r#"# Vigil monitored fleet. One [[targets]] entry per remote service.

[[targets]]
id = "main-app"
display_name = "Main Application"
base_address = "http://localhost:3000"
probe_path = "/api/status"
cadence_seconds = 300
priority = "high"

[[targets]]
id = "worker-api"
display_name = "Worker API"
base_address = "http://localhost:3001"
probe_path = "/api/status"
cadence_seconds = 600
priority = "medium"
"#;

impl TargetRegistry {
    /// Build a registry, rejecting duplicate ids and empty addresses.
    pub fn new(targets: Vec<Target>) -> Result<Self, RegistryError> {
        let mut seen = std::collections::HashSet::new();
        for target in &targets {
            if !seen.insert(target.id.clone()) {
                return Err(RegistryError::Invalid(
                    target.id.clone(),
                    "duplicate target id".to_string(),
                ));
            }
            if target.base_address.is_empty() {
                return Err(RegistryError::Invalid(
                    target.id.clone(),
                    "base_address must not be empty".to_string(),
                ));
            }
        }
        Ok(Self { targets })
    }

    /// Load the fleet from a TOML file, writing a sample file first if none
    /// exists.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(
                "Targets file {} not found; writing sample fleet",
                path.display()
            );
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, SAMPLE_TARGETS)?;
        }
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// Parse a registry from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, RegistryError> {
        let file: TargetsFile = toml::from_str(raw)?;
        Self::new(file.targets)
    }

    pub fn all(&self) -> &[Target] {
        &self.targets
    }

    pub fn get(&self, id: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.id == id)
    }

    /// Targets belonging to one scheduling tier, in registry order.
    pub fn with_priority(&self, priority: Priority) -> Vec<Target> {
        self.targets
            .iter()
            .filter(|t| t.priority == priority)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
