//! Static configuration for LeaseKit.
//!
//! Loaded from YAML; every section has defaults so an empty document is a
//! valid configuration.
//!
//! ```yaml
//! storage:
//!   api_base_url: https://api.dropboxapi.com/2
//!   timeout_secs: 30
//! agencies:
//!   federal: /Federal Workspace
//!   state: /State Workspace
//! report:
//!   pattern: master documents
//!   public_links: true
//! logging:
//!   level: info
//!   json: false
//! ```

use crate::lease::Agency;
use crate::path::PathResolver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Agency has no usable base path
    #[error("No base path configured for agency {0}")]
    MissingAgency(Agency),

    /// A value is present but unusable
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Storage provider connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Base URL of the RPC endpoints
    pub api_base_url: String,
    /// Per-request timeout applied by the HTTP client
    pub timeout_secs: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.dropboxapi.com/2".to_string(),
            timeout_secs: 30,
            user_agent: format!("leasekit/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Closed mapping from agency to its top-level storage directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgencyPaths(BTreeMap<Agency, String>);

impl Default for AgencyPaths {
    fn default() -> Self {
        let mut paths = BTreeMap::new();
        paths.insert(Agency::Federal, "/Federal Workspace".to_string());
        paths.insert(Agency::State, "/State Workspace".to_string());
        Self(paths)
    }
}

impl AgencyPaths {
    /// Creates an empty mapping.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets the base path for an agency.
    pub fn with(mut self, agency: Agency, base_path: impl Into<String>) -> Self {
        self.0.insert(agency, base_path.into());
        self
    }

    /// Normalized base path for an agency, if configured and not the root.
    pub fn base_path(&self, agency: Agency) -> Option<String> {
        self.0
            .get(&agency)
            .map(|path| PathResolver::normalize(path))
            .filter(|path| !PathResolver::is_root(path))
    }

    /// Ensures every supported agency has a usable base path.
    pub fn ensure_complete(&self) -> Result<(), ConfigError> {
        for agency in Agency::ALL {
            if self.base_path(agency).is_none() {
                return Err(ConfigError::MissingAgency(agency));
            }
        }
        Ok(())
    }
}

/// Report detection and link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Phrase whose presence in a filename marks a completed report
    pub pattern: String,
    /// Whether newly created links are public
    pub public_links: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            pattern: "master documents".to_string(),
            public_links: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseKitConfig {
    /// Storage provider settings
    pub storage: StorageSettings,
    /// Agency base paths
    pub agencies: AgencyPaths,
    /// Report detection settings
    pub report: ReportSettings,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl LeaseKitConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: LeaseKitConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Checks cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.agencies.ensure_complete()?;
        if self.report.pattern.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "report.pattern".to_string(),
                reason: "must not be blank".to_string(),
            });
        }
        if self.storage.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "storage.timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
