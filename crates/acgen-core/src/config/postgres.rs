//! Postgres policy configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Setting read with `current_setting(...)` to identify the caller.
    #[serde(default = "default_user_id_setting")]
    pub user_id_setting: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            user_id_setting: default_user_id_setting(),
        }
    }
}

fn default_user_id_setting() -> String {
    "app.user_id".to_string()
}
