//! Lifecycle notifications.
//!
//! Topics are named `{bearer-kind}.{event}`, e.g. `envelope.entered_state`.
//! Publishing is best effort from the engine's point of view.

use crate::error::NotifyError;
use crate::instance::BearerRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// Events published about a bearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BearerEvent {
    EnteredState,
    AddedFile,
    ChangedFile,
    DeletedFile,
    AddedOriginalFile,
    ChangedOriginalFile,
    DeletedOriginalFile,
    AddedSupportFile,
    ChangedSupportFile,
    DeletedSupportFile,
    ReceivedAutoQaFeedback,
    CompletedAutoQa,
}

impl BearerEvent {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnteredState => "entered_state",
            Self::AddedFile => "added_file",
            Self::ChangedFile => "changed_file",
            Self::DeletedFile => "deleted_file",
            Self::AddedOriginalFile => "added_original_file",
            Self::ChangedOriginalFile => "changed_original_file",
            Self::DeletedOriginalFile => "deleted_original_file",
            Self::AddedSupportFile => "added_support_file",
            Self::ChangedSupportFile => "changed_support_file",
            Self::DeletedSupportFile => "deleted_support_file",
            Self::ReceivedAutoQaFeedback => "received_auto_qa_feedback",
            Self::CompletedAutoQa => "completed_auto_qa",
        }
    }
}

impl fmt::Display for BearerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    #[must_use]
    pub fn new(bearer: &BearerRef, event: BearerEvent) -> Self {
        Self(format!("{}.{}", bearer.kind(), event))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload of `entered_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnteredState {
    pub previous_state: String,
    pub current_state: String,
    pub finalized: bool,
}

/// A published notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub topic: Topic,
    pub bearer: BearerRef,
    pub data: serde_json::Value,
}

impl Notification {
    #[must_use]
    pub fn new(bearer: BearerRef, event: BearerEvent, data: serde_json::Value) -> Self {
        Self {
            topic: Topic::new(&bearer, event),
            bearer,
            data,
        }
    }

    /// Builds the `entered_state` notification.
    #[must_use]
    pub fn entered_state(bearer: BearerRef, payload: &EnteredState) -> Self {
        Self::new(
            bearer,
            BearerEvent::EnteredState,
            serde_json::json!({
                "previous_state": payload.previous_state,
                "current_state": payload.current_state,
                "finalized": payload.finalized,
            }),
        )
    }
}

/// Publish-only sink for notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// In-process fan-out to any number of subscribers.
///
/// Slow subscribers lose the oldest notifications once `capacity` is
/// exceeded.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Notifications about one bearer only, skipping over any lag.
    pub fn subscribe_bearer(
        &self,
        bearer: BearerRef,
    ) -> impl Stream<Item = Notification> + Send + 'static {
        BroadcastStream::new(self.sender.subscribe())
            .filter_map(move |item| item.ok().filter(|n| n.bearer == bearer))
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        // Sending only fails when nobody is listening.
        match self.sender.send(notification) {
            Ok(receivers) => tracing::debug!(receivers, "broadcast notification"),
            Err(_) => tracing::debug!("no subscribers for notification"),
        }
        Ok(())
    }
}
