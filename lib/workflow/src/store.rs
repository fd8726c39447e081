//! Persistence seam for bearers and their workflow instances.

use crate::error::StoreError;
use crate::instance::{Assignment, BearerRef, BearerSnapshot};
use async_trait::async_trait;

/// Storage for bearer state as seen by the engine.
///
/// Implementations must make [`swap_state`](Self::swap_state) atomic: it is
/// the only mutual exclusion the engine relies on.
#[async_trait]
pub trait BearerStore: Send + Sync {
    /// Loads the current snapshot of a bearer.
    async fn load(&self, bearer: BearerRef) -> Result<BearerSnapshot, StoreError>;

    /// Moves the bearer to `target` if it is still in `expected`.
    ///
    /// On success `previous_state` becomes `expected`. Returns false, without
    /// writing, when another writer moved the bearer first.
    async fn swap_state(
        &self,
        bearer: BearerRef,
        expected: &str,
        target: &str,
    ) -> Result<bool, StoreError>;

    async fn set_assignment(
        &self,
        bearer: BearerRef,
        assignment: Assignment,
    ) -> Result<(), StoreError>;

    async fn set_finalized(&self, bearer: BearerRef, finalized: bool) -> Result<(), StoreError>;

    /// Unconditionally sets the current state.
    async fn force_state(&self, bearer: BearerRef, state: &str) -> Result<(), StoreError>;
}
