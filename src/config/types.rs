use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::middleware::DEFAULT_HANDLER_TIMEOUT;
use super::logging::LoggingConfig;
use super::store::{DatabaseConfig, StoreConfig};

/// The version assumed when neither the file nor the environment names one.
pub const CURRENT_CONFIG_VERSION: &str = "1.0.0";

/// Environment keys understood by every service, and where they land in `ConfigV1`.
const ENV_KEYS: &[(&str, &str)] = &[
    ("DB_NAME", "database.name"),
    ("DB_HOST", "database.host"),
    ("DB_USER", "database.user"),
    ("DB_PASSWORD", "database.password"),
    ("DB_PORT", "database.port"),
    ("APP_PORT", "app_port"),
    ("APP_HOST", "bind_host"),
    ("APP_DEBUG", "debug"),
    ("API_ENDPOINT", "api_endpoint"),
    ("JWT_SK", "jwt.secret"),
    ("AUTH_ENDPOINT", "services.auth"),
    ("TODO_ENDPOINT", "services.todos"),
    ("USERS_ENDPOINT", "services.users"),
    ("STORE_BACKEND", "store.backend"),
];

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0. Every service reads the same shape and ignores
/// the sections it has no use for.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    #[serde(default = "default_app_port")]
    pub app_port: u16,
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default)]
    pub debug: bool,
    /// Overrides the mount path of the running backend service.
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub jwt: JWTConfig,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub password: PasswordConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ConfigV1 {
    /// `host:port` for a listener of this process.
    pub fn bind_address(&self, port: u16) -> String {
        format!("{}:{}", self.bind_host, port)
    }
}

fn default_app_port() -> u16 {
    8080
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

/// Base URLs of the upstream services, keyed by route.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct ServicesConfig {
    pub auth: Option<String>,
    pub todos: Option<String>,
    pub users: Option<String>,
}

/// Signing settings for the auth service's tokens.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct JWTConfig {
    #[serde(default)]
    pub secret: String,
    /// Token lifetime in seconds.
    #[serde(default = "default_jwt_exp")]
    pub exp: i64,
}

fn default_jwt_exp() -> i64 {
    3 * 60 * 60
}

impl Default for JWTConfig {
    fn default() -> Self {
        JWTConfig {
            secret: String::new(),
            exp: default_jwt_exp(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct TimeoutConfig {
    /// Deadline applied to every backend handler.
    #[serde(default = "default_handler_timeout")]
    pub handler_in_ms: u64,
    /// Optional deadline for the gateway's outbound calls. Unset means the
    /// gateway waits as long as the upstream takes.
    #[serde(default)]
    pub upstream_in_ms: Option<u64>,
}

fn default_handler_timeout() -> u64 {
    DEFAULT_HANDLER_TIMEOUT.as_millis() as u64
}

impl TimeoutConfig {
    pub fn handler(&self) -> Duration {
        Duration::from_millis(self.handler_in_ms)
    }

    pub fn upstream(&self) -> Option<Duration> {
        self.upstream_in_ms.map(Duration::from_millis)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            handler_in_ms: default_handler_timeout(),
            upstream_in_ms: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct PasswordConfig {
    /// bcrypt cost factor.
    #[serde(default = "default_bcrypt_cost")]
    pub cost: u32,
}

fn default_bcrypt_cost() -> u32 {
    10
}

impl Default for PasswordConfig {
    fn default() -> Self {
        PasswordConfig {
            cost: default_bcrypt_cost(),
        }
    }
}

/// Maps the flat environment keys onto their nested config paths.
fn env_provider() -> Env {
    Env::raw().filter_map(|key| {
        let upper = key.as_str().to_ascii_uppercase();
        ENV_KEYS
            .iter()
            .find(|(name, _)| *name == upper)
            .map(|(_, path)| (*path).into())
    })
}

/// Extracts the current config version from an assembled figment.
pub fn extract_config(figment: Figment) -> Result<ConfigV1, figment::Error> {
    let config = Figment::from(Serialized::default("version", CURRENT_CONFIG_VERSION))
        .merge(figment)
        .extract::<Config>()?;
    match config {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// Load config from a YAML file (missing files are skipped) overlaid with the environment.
pub fn load_config(path: impl AsRef<Path>) -> Result<ConfigV1, figment::Error> {
    extract_config(
        Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(env_provider()),
    )
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() -> Result<(), serde_json::Error> {
    let schema = schema_for!(Config);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
