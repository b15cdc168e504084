use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which store backend the CRUD and auth services use.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

/// The existing store backends, selected with `store.backend` (or `STORE_BACKEND`).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
pub enum StoreBackend {
    /// Process-local tables; state is lost on restart.
    #[default]
    #[serde(rename = "memory")]
    Memory,
    /// A PostgreSQL database described by `database`.
    #[serde(rename = "postgres")]
    Postgres,
}

/// Connection settings for the relational store (`DB_*` keys).
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
}

fn default_db_name() -> String {
    "taskgate".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_port() -> u16 {
    5432
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            name: default_db_name(),
            host: default_db_host(),
            user: default_db_user(),
            password: String::new(),
            port: default_db_port(),
        }
    }
}
