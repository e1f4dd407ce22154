//! Configuration types for acgen.
//!
//! The project configuration lives in `acgen.yaml` at the project root.
//! Every field has a default, so an absent file yields the layout the
//! compiler expects out of the box:
//!
//! - **accesscontrol/<service>/*.yaml**: table spec files
//! - **accesscontrol/stage.json**: persisted stage records
//! - **migrations/<service>/**: generated SQL migrations
//! - Hasura metadata per service, in either the v1 single-file or the v2
//!   per-table layout

pub mod hasura;
pub mod postgres;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use hasura::{HasuraConfig, MetadataVersion};
pub use postgres::PostgresConfig;

/// File name of the persisted stage records inside the control root.
pub const STAGE_FILE: &str = "stage.json";

/// Complete acgen configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcgenConfig {
    /// Directory holding one subdirectory of table specs per service.
    #[serde(default = "default_control_root")]
    pub control_root: PathBuf,

    /// Directory holding one subdirectory of migrations per service.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,

    /// Hasura metadata layout and session variables.
    #[serde(default)]
    pub hasura: HasuraConfig,

    /// Postgres policy settings.
    #[serde(default)]
    pub postgres: PostgresConfig,
}

impl Default for AcgenConfig {
    fn default() -> Self {
        Self {
            control_root: default_control_root(),
            migrations_dir: default_migrations_dir(),
            hasura: HasuraConfig::default(),
            postgres: PostgresConfig::default(),
        }
    }
}

impl AcgenConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.hasura.v1_path.contains(hasura::SERVICE_PLACEHOLDER) {
            return Err(ConfigError::Config(format!(
                "hasura.v1_path must contain {}",
                hasura::SERVICE_PLACEHOLDER
            )));
        }
        if !self.hasura.v2_dir.contains(hasura::SERVICE_PLACEHOLDER) {
            return Err(ConfigError::Config(format!(
                "hasura.v2_dir must contain {}",
                hasura::SERVICE_PLACEHOLDER
            )));
        }
        if self.postgres.user_id_setting.trim().is_empty() {
            return Err(ConfigError::Config(
                "postgres.user_id_setting must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn stage_path(&self) -> PathBuf {
        self.control_root.join(STAGE_FILE)
    }

    pub fn service_dir(&self, service: &str) -> PathBuf {
        self.control_root.join(service)
    }

    pub fn service_migrations_dir(&self, service: &str) -> PathBuf {
        self.migrations_dir.join(service)
    }
}

fn default_control_root() -> PathBuf {
    PathBuf::from("accesscontrol")
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
