//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (`ENGINE__MAX_CASCADE_DEPTH`, `NATS__URL`).

use reportek_workflow::EngineConfig;
use reportek_workflow::nats::NatsConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Maximum database connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Workflow engine limits.
    #[serde(default)]
    pub engine: EngineConfig,

    /// NATS notification publishing. Notifications stay in-process when
    /// absent.
    #[serde(default)]
    pub nats: Option<NatsConfig>,
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
