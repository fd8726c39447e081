//! Append-only transition history.

use crate::error::StoreError;
use crate::instance::BearerRef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reportek_core::TransitionEventId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub id: TransitionEventId,
    pub timestamp: DateTime<Utc>,
    pub bearer: BearerRef,
    pub transition: String,
    pub from_state: String,
    pub to_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// A transition about to be recorded; the log assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransitionEvent {
    pub bearer: BearerRef,
    pub transition: String,
    pub from_state: String,
    pub to_state: String,
    pub extra: Option<serde_json::Value>,
}

impl NewTransitionEvent {
    #[must_use]
    pub fn new(
        bearer: BearerRef,
        transition: impl Into<String>,
        from_state: impl Into<String>,
        to_state: impl Into<String>,
    ) -> Self {
        Self {
            bearer,
            transition: transition.into(),
            from_state: from_state.into(),
            to_state: to_state.into(),
            extra: None,
        }
    }

    #[must_use]
    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Ordering used by [`HistoryLog::latest`]: newest first, ties broken by
/// transition name.
#[must_use]
pub fn latest_first(a: &TransitionEvent, b: &TransitionEvent) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| a.transition.cmp(&b.transition))
}

/// Append-only record of completed transitions.
#[async_trait]
pub trait HistoryLog: Send + Sync {
    /// Records one event.
    ///
    /// Fails with `StoreError::Duplicate` when an event with the same
    /// timestamp, bearer and state pair exists.
    async fn record(&self, event: NewTransitionEvent) -> Result<TransitionEvent, StoreError>;

    /// The most recent event of a bearer, per [`latest_first`].
    async fn latest(&self, bearer: BearerRef) -> Result<Option<TransitionEvent>, StoreError>;

    /// All events of a bearer in commit order.
    async fn list(&self, bearer: BearerRef) -> Result<Vec<TransitionEvent>, StoreError>;
}
