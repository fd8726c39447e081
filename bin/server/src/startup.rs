//! Wiring the server together from its configuration.

use crate::config::ServerConfig;
use crate::db::{PgEnvelopeStore, PgHistoryLog};
use crate::state::AppState;
use reportek_core::Result;
use reportek_reporting::{MockQaService, WorkflowCatalog};
use reportek_workflow::nats::NatsNotifier;
use reportek_workflow::{BroadcastNotifier, Engine, Notifier};
use sqlx::postgres::PgPoolOptions;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Buffered notifications per subscriber when notifications stay in-process.
const BROADCAST_CAPACITY: usize = 256;

/// Errors while bringing the server up.
#[derive(Debug)]
pub enum StartupError {
    Database { details: String },
    Migration { details: String },
    Notifier { details: String },
    /// A bundled workflow failed validation.
    Catalog { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database { details } => write!(f, "database connection failed: {details}"),
            Self::Migration { details } => write!(f, "migrations failed: {details}"),
            Self::Notifier { details } => write!(f, "notifier setup failed: {details}"),
            Self::Catalog { details } => write!(f, "workflow catalog invalid: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}

/// Publishes to NATS when configured, otherwise to an in-process broadcast
/// channel.
///
/// # Errors
///
/// Returns `Notifier` if the NATS server cannot be reached.
pub async fn connect_notifier(config: &ServerConfig) -> Result<Arc<dyn Notifier>, StartupError> {
    match &config.nats {
        Some(nats) => {
            info!(url = %nats.url, "connecting to NATS");
            let notifier = NatsNotifier::connect(nats)
                .await
                .map_err(|e| StartupError::Notifier {
                    details: e.to_string(),
                })?;
            Ok(Arc::new(notifier))
        }
        None => {
            info!("NATS not configured, notifications stay in-process");
            Ok(Arc::new(BroadcastNotifier::new(BROADCAST_CAPACITY)))
        }
    }
}

/// Connects to the database, runs migrations and assembles the handler
/// state.
///
/// # Errors
///
/// Returns the first step that failed.
pub async fn build_state(config: &ServerConfig) -> Result<Arc<AppState>, StartupError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| StartupError::Database {
            details: e.to_string(),
        })?;

    info!("running database migrations");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| StartupError::Migration {
            details: e.to_string(),
        })?;

    let envelopes = Arc::new(PgEnvelopeStore::new(pool.clone()));
    let engine = Engine::new(
        envelopes.clone(),
        Arc::new(PgHistoryLog::new(pool)),
        connect_notifier(config).await?,
    )
    .with_config(config.engine);

    let catalog = WorkflowCatalog::standard(Arc::new(MockQaService::new())).map_err(|e| {
        StartupError::Catalog {
            details: e.to_string(),
        }
    })?;
    info!(workflows = ?catalog.names().collect::<Vec<_>>(), "workflow catalog ready");

    Ok(Arc::new(AppState::new(engine, catalog, envelopes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_without_nats() {
        let config: ServerConfig = config::Config::builder()
            .set_override("database_url", "postgres://localhost/reportek")
            .expect("override")
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");
        assert!(connect_notifier(&config).await.is_ok());
    }

    #[test]
    fn errors_name_the_failed_step() {
        let err = StartupError::Migration {
            details: "checksum mismatch".into(),
        };
        assert_eq!(err.to_string(), "migrations failed: checksum mismatch");
    }
}
