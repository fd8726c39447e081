//! In-memory envelope store for handler tests.

use crate::db::EnvelopeStore;
use async_trait::async_trait;
use reportek_core::EnvelopeId;
use reportek_reporting::Envelope;
use reportek_workflow::{Assignment, BearerRef, BearerSnapshot, BearerStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
pub struct MemoryEnvelopeStore {
    envelopes: Arc<Mutex<HashMap<EnvelopeId, Envelope>>>,
}

impl MemoryEnvelopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<T>(
        &self,
        bearer: BearerRef,
        f: impl FnOnce(&mut Envelope) -> T,
    ) -> Result<T, StoreError> {
        let BearerRef::Envelope(id) = bearer;
        let mut envelopes = self.envelopes.lock().await;
        let envelope = envelopes
            .get_mut(&id)
            .ok_or(StoreError::NotFound { bearer })?;
        Ok(f(envelope))
    }
}

#[async_trait]
impl EnvelopeStore for MemoryEnvelopeStore {
    async fn create(&self, envelope: &Envelope) -> Result<(), StoreError> {
        let mut envelopes = self.envelopes.lock().await;
        if envelopes.contains_key(&envelope.id) {
            return Err(StoreError::Duplicate {
                bearer: envelope.bearer(),
            });
        }
        envelopes.insert(envelope.id, envelope.clone());
        Ok(())
    }

    async fn get(&self, id: EnvelopeId) -> Result<Envelope, StoreError> {
        self.envelopes
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                bearer: BearerRef::Envelope(id),
            })
    }

    async fn record_auto_qa(&self, id: EnvelopeId, ok: bool) -> Result<Envelope, StoreError> {
        self.update(BearerRef::Envelope(id), |envelope| {
            envelope.record_auto_qa(ok);
            envelope.clone()
        })
        .await
    }
}

#[async_trait]
impl BearerStore for MemoryEnvelopeStore {
    async fn load(&self, bearer: BearerRef) -> Result<BearerSnapshot, StoreError> {
        self.update(bearer, |envelope| envelope.snapshot()).await
    }

    async fn swap_state(
        &self,
        bearer: BearerRef,
        expected: &str,
        target: &str,
    ) -> Result<bool, StoreError> {
        self.update(bearer, |envelope| {
            if envelope.workflow.current_state != expected {
                return false;
            }
            envelope.workflow.advance(target);
            true
        })
        .await
    }

    async fn set_assignment(
        &self,
        bearer: BearerRef,
        assignment: Assignment,
    ) -> Result<(), StoreError> {
        self.update(bearer, |envelope| envelope.assignment = assignment)
            .await
    }

    async fn set_finalized(&self, bearer: BearerRef, finalized: bool) -> Result<(), StoreError> {
        self.update(bearer, |envelope| envelope.finalized = finalized)
            .await
    }

    async fn force_state(&self, bearer: BearerRef, state: &str) -> Result<(), StoreError> {
        self.update(bearer, |envelope| envelope.workflow.advance(state))
            .await
    }
}
