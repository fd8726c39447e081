//! NATS JetStream publishing of lifecycle notifications.
//!
//! Notifications are wrapped in [`Versioned`] and published to
//! `<prefix>.<topic>.<bearer id>`, e.g.
//! `reportek.envelope.entered_state.env_01HV...`, so subscribers can filter
//! on event kind or on a single bearer.

use crate::error::NotifyError;
use crate::notify::{Notification, Notifier};
use crate::versioned::Versioned;
use async_nats::jetstream;
use async_trait::async_trait;
use serde::Deserialize;

/// Default subject prefix.
const SUBJECT_PREFIX: &str = "reportek";

/// Default stream name for notifications.
const EVENTS_STREAM_NAME: &str = "REPORTEK_EVENTS";

/// Configuration for the NATS notifier.
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL.
    pub url: String,
    /// Subject prefix (defaults to `reportek`).
    #[serde(default)]
    pub subject_prefix: Option<String>,
    /// Stream name (defaults to `REPORTEK_EVENTS`).
    #[serde(default)]
    pub stream_name: Option<String>,
}

impl NatsConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject_prefix: None,
            stream_name: None,
        }
    }

    fn prefix(&self) -> &str {
        self.subject_prefix.as_deref().unwrap_or(SUBJECT_PREFIX)
    }

    fn stream(&self) -> &str {
        self.stream_name.as_deref().unwrap_or(EVENTS_STREAM_NAME)
    }
}

/// Publishes notifications to a JetStream stream.
pub struct NatsNotifier {
    jetstream: jetstream::Context,
    prefix: String,
}

impl NatsNotifier {
    /// Connects and makes sure the notification stream exists.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` if the connection or stream setup fails.
    pub async fn connect(config: &NatsConfig) -> Result<Self, NotifyError> {
        let client = async_nats::connect(&config.url).await.map_err(|e| {
            NotifyError::ConnectionFailed {
                message: e.to_string(),
            }
        })?;

        let jetstream = jetstream::new(client);

        let stream_config = jetstream::stream::Config {
            name: config.stream().to_string(),
            subjects: vec![format!("{}.>", config.prefix())],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::Limits,
            ..Default::default()
        };

        jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| NotifyError::ConnectionFailed {
                message: format!("failed to create notification stream: {e}"),
            })?;

        tracing::info!(url = %config.url, stream = config.stream(), "connected to NATS");

        Ok(Self {
            jetstream,
            prefix: config.prefix().to_string(),
        })
    }

    fn subject(prefix: &str, notification: &Notification) -> String {
        format!(
            "{prefix}.{}.{}",
            notification.topic,
            notification.bearer.id_string()
        )
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        let subject = Self::subject(&self.prefix, &notification);
        let bytes = Versioned::new(notification)
            .to_json_bytes()
            .map_err(|e| NotifyError::PublishFailed {
                message: format!("failed to serialize notification: {e}"),
            })?;

        self.jetstream
            .publish(subject, bytes.into())
            .await
            .map_err(|e| NotifyError::PublishFailed {
                message: e.to_string(),
            })?
            .await
            .map_err(|e| NotifyError::PublishFailed {
                message: e.to_string(),
            })?;

        Ok(())
    }
}
