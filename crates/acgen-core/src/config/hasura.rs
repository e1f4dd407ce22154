//! Hasura metadata configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Placeholder substituted with the service name in path templates.
pub const SERVICE_PLACEHOLDER: &str = "{service}";

/// Layout of the Hasura metadata on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MetadataVersion {
    /// A single `tables.yaml` holding every table.
    #[default]
    #[serde(rename = "1")]
    V1,
    /// One `<schema>_<table>.yaml` per table plus a `tables.yaml` include manifest.
    #[serde(rename = "2")]
    V2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HasuraConfig {
    /// Metadata layout version.
    #[serde(default)]
    pub version: MetadataVersion,

    /// Path template of the v1 `tables.yaml`.
    #[serde(default = "default_v1_path")]
    pub v1_path: String,

    /// Directory template of the v2 per-table files.
    #[serde(default = "default_v2_dir")]
    pub v2_dir: String,

    /// Role that receives the generated permissions.
    #[serde(default = "default_role")]
    pub default_role: String,

    /// Session variable carrying the caller's user id.
    #[serde(default = "default_user_id_variable")]
    pub user_id_session_variable: String,

    /// Session variable carrying the caller's resource path.
    #[serde(default = "default_resource_path_variable")]
    pub resource_path_session_variable: String,
}

impl Default for HasuraConfig {
    fn default() -> Self {
        Self {
            version: MetadataVersion::default(),
            v1_path: default_v1_path(),
            v2_dir: default_v2_dir(),
            default_role: default_role(),
            user_id_session_variable: default_user_id_variable(),
            resource_path_session_variable: default_resource_path_variable(),
        }
    }
}

impl HasuraConfig {
    pub fn v1_path_for(&self, service: &str) -> PathBuf {
        PathBuf::from(self.v1_path.replace(SERVICE_PLACEHOLDER, service))
    }

    pub fn v2_dir_for(&self, service: &str) -> PathBuf {
        PathBuf::from(self.v2_dir.replace(SERVICE_PLACEHOLDER, service))
    }
}

fn default_v1_path() -> String {
    "deployments/helm/manabie-all-in-one/charts/{service}/files/hasura/metadata/tables.yaml"
        .to_string()
}

fn default_v2_dir() -> String {
    "deployments/helm/manabie-all-in-one/charts/{service}/files/hasurav2/metadata/databases/{service}/tables"
        .to_string()
}

fn default_role() -> String {
    "MANABIE".to_string()
}

fn default_user_id_variable() -> String {
    "X-Hasura-User-Id".to_string()
}

fn default_resource_path_variable() -> String {
    "X-Hasura-Resource-Path".to_string()
}
