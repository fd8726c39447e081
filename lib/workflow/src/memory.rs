//! In-memory implementations of the engine's storage and publish seams.
//!
//! Used by tests and by single-process deployments that need no durability.

use crate::error::{NotifyError, StoreError};
use crate::history::{HistoryLog, NewTransitionEvent, TransitionEvent, latest_first};
use crate::instance::{Assignment, BearerRef, BearerSnapshot};
use crate::notify::{Notification, Notifier};
use crate::store::BearerStore;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reportek_core::TransitionEventId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Bearer snapshots held in a map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBearerStore {
    bearers: Arc<Mutex<HashMap<BearerRef, BearerSnapshot>>>,
}

impl MemoryBearerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a bearer.
    pub async fn insert(&self, snapshot: BearerSnapshot) {
        self.bearers.lock().await.insert(snapshot.bearer, snapshot);
    }
}

#[async_trait]
impl BearerStore for MemoryBearerStore {
    async fn load(&self, bearer: BearerRef) -> Result<BearerSnapshot, StoreError> {
        self.bearers
            .lock()
            .await
            .get(&bearer)
            .cloned()
            .ok_or(StoreError::NotFound { bearer })
    }

    async fn swap_state(
        &self,
        bearer: BearerRef,
        expected: &str,
        target: &str,
    ) -> Result<bool, StoreError> {
        let mut bearers = self.bearers.lock().await;
        let snapshot = bearers
            .get_mut(&bearer)
            .ok_or(StoreError::NotFound { bearer })?;

        if snapshot.instance.current_state != expected {
            return Ok(false);
        }
        snapshot.instance.advance(target);
        Ok(true)
    }

    async fn set_assignment(
        &self,
        bearer: BearerRef,
        assignment: Assignment,
    ) -> Result<(), StoreError> {
        let mut bearers = self.bearers.lock().await;
        let snapshot = bearers
            .get_mut(&bearer)
            .ok_or(StoreError::NotFound { bearer })?;
        snapshot.assignment = assignment;
        Ok(())
    }

    async fn set_finalized(&self, bearer: BearerRef, finalized: bool) -> Result<(), StoreError> {
        let mut bearers = self.bearers.lock().await;
        let snapshot = bearers
            .get_mut(&bearer)
            .ok_or(StoreError::NotFound { bearer })?;
        snapshot.finalized = finalized;
        Ok(())
    }

    async fn force_state(&self, bearer: BearerRef, state: &str) -> Result<(), StoreError> {
        let mut bearers = self.bearers.lock().await;
        let snapshot = bearers
            .get_mut(&bearer)
            .ok_or(StoreError::NotFound { bearer })?;
        snapshot.instance.advance(state);
        Ok(())
    }
}

/// History kept in insertion order.
///
/// Timestamps are kept strictly increasing per bearer so that ordering by
/// time matches commit order.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryLog {
    events: Arc<Mutex<Vec<TransitionEvent>>>,
}

impl MemoryHistoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events across all bearers.
    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[async_trait]
impl HistoryLog for MemoryHistoryLog {
    async fn record(&self, event: NewTransitionEvent) -> Result<TransitionEvent, StoreError> {
        let mut events = self.events.lock().await;

        let now = Utc::now();
        let timestamp = match events.iter().rev().find(|e| e.bearer == event.bearer) {
            Some(last) if now <= last.timestamp => last.timestamp + Duration::microseconds(1),
            _ => now,
        };

        let duplicate = events.iter().any(|e| {
            e.timestamp == timestamp
                && e.bearer == event.bearer
                && e.from_state == event.from_state
                && e.to_state == event.to_state
        });
        if duplicate {
            return Err(StoreError::Duplicate {
                bearer: event.bearer,
            });
        }

        let recorded = TransitionEvent {
            id: TransitionEventId::new(),
            timestamp,
            bearer: event.bearer,
            transition: event.transition,
            from_state: event.from_state,
            to_state: event.to_state,
            extra: event.extra,
        };
        events.push(recorded.clone());
        Ok(recorded)
    }

    async fn latest(&self, bearer: BearerRef) -> Result<Option<TransitionEvent>, StoreError> {
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .filter(|e| e.bearer == bearer)
            .min_by(|a, b| latest_first(a, b))
            .cloned())
    }

    async fn list(&self, bearer: BearerRef) -> Result<Vec<TransitionEvent>, StoreError> {
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .filter(|e| e.bearer == bearer)
            .cloned()
            .collect())
    }
}

/// Notifier that keeps everything it is asked to publish.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    published: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.published.lock().await.clone()
    }

    pub async fn topics(&self) -> Vec<String> {
        self.published
            .lock()
            .await
            .iter()
            .map(|n| n.topic.to_string())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        self.published.lock().await.push(notification);
        Ok(())
    }
}
