//! State machines: a compiled workflow bound to one bearer.

use crate::actor::ActorContext;
use crate::compiled::CompiledWorkflow;
use crate::error::WorkflowError;
use crate::executor::Engine;
use crate::guard;
use crate::history::{HistoryLog, TransitionEvent};
use crate::instance::{BearerRef, BearerSnapshot};
use crate::json_graph::JsonGraph;
use crate::state::WorkflowState;
use crate::store::BearerStore;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Entry point for querying and driving one bearer's workflow.
///
/// Machines are cheap to create; build one per request.
#[derive(Clone)]
pub struct StateMachine {
    engine: Engine,
    workflow: Arc<CompiledWorkflow>,
    bearer: BearerRef,
}

impl StateMachine {
    pub(crate) fn new(engine: Engine, workflow: Arc<CompiledWorkflow>, bearer: BearerRef) -> Self {
        Self {
            engine,
            workflow,
            bearer,
        }
    }

    #[must_use]
    pub fn workflow(&self) -> &Arc<CompiledWorkflow> {
        &self.workflow
    }

    #[must_use]
    pub fn bearer(&self) -> BearerRef {
        self.bearer
    }

    /// The bearer as currently stored.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the store fails.
    pub async fn snapshot(&self) -> Result<BearerSnapshot, WorkflowError> {
        self.engine.load(&self.workflow, self.bearer).await
    }

    /// # Errors
    ///
    /// Returns `StateDoesNotExist` when the stored state is not part of the
    /// workflow.
    pub async fn current_state(&self) -> Result<WorkflowState, WorkflowError> {
        let snapshot = self.snapshot().await?;
        self.workflow
            .state(snapshot.current_state())
            .cloned()
            .ok_or_else(|| WorkflowError::StateDoesNotExist {
                state: snapshot.current_state().to_string(),
            })
    }

    /// Transitions `actor` may start now, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the store fails.
    pub async fn available_transitions(
        &self,
        actor: &ActorContext,
    ) -> Result<Vec<String>, WorkflowError> {
        let snapshot = self.snapshot().await?;
        Ok(guard::available(&self.workflow, &snapshot, actor))
    }

    /// Starts the named transition as `actor`.
    ///
    /// Automatic follow-on transitions run before this returns. The returned
    /// event is the one for `name`.
    ///
    /// # Errors
    ///
    /// - `TransitionDoesNotExist` for names the workflow does not declare
    /// - `TransitionNotAvailable` when the guard refuses
    /// - `DomainCallback` when the implementation fails (nothing committed)
    /// - `Conflict` when concurrent writers kept winning the swap
    /// - `CascadeDepthExceeded` or any of the above from an automatic
    ///   transition, after `name` itself was committed
    #[instrument(skip(self, actor), fields(bearer = %self.bearer, workflow = self.workflow.name(), actor = %actor.kind))]
    pub async fn start_transition(
        &self,
        name: &str,
        actor: &ActorContext,
    ) -> Result<TransitionEvent, WorkflowError> {
        let transition =
            self.workflow
                .transition(name)
                .ok_or_else(|| WorkflowError::TransitionDoesNotExist {
                    transition: name.to_string(),
                })?;

        let snapshot = self.snapshot().await?;
        if let Err(reason) = guard::check(&self.workflow, transition, &snapshot, actor) {
            debug!(%reason, "transition refused");
            return Err(WorkflowError::TransitionNotAvailable {
                transition: name.to_string(),
                state: snapshot.current_state().to_string(),
                reason,
            });
        }

        self.engine
            .run(&self.workflow, self.bearer, transition, actor)
            .await
    }

    /// All recorded transitions in commit order.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the log fails.
    pub async fn history(&self) -> Result<Vec<TransitionEvent>, WorkflowError> {
        Ok(self.engine.history().list(self.bearer).await?)
    }

    /// # Errors
    ///
    /// Returns `Persistence` if the log fails.
    pub async fn latest_event(&self) -> Result<Option<TransitionEvent>, WorkflowError> {
        Ok(self.engine.history().latest(self.bearer).await?)
    }

    /// The workflow as a JSON graph with the current state flagged.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the store fails.
    pub async fn graph(&self) -> Result<JsonGraph, WorkflowError> {
        let snapshot = self.snapshot().await?;
        Ok(JsonGraph::build(
            &self.workflow,
            Some(snapshot.current_state()),
        ))
    }

    /// Administrative override of the current state.
    ///
    /// Bypasses guards and history. The finalized flag follows the new state.
    ///
    /// # Errors
    ///
    /// Returns `StateDoesNotExist` for states outside the workflow.
    #[instrument(skip(self), fields(bearer = %self.bearer, workflow = self.workflow.name()))]
    pub async fn force_state(&self, state: &str) -> Result<(), WorkflowError> {
        if self.workflow.state(state).is_none() {
            return Err(WorkflowError::StateDoesNotExist {
                state: state.to_string(),
            });
        }

        let snapshot = self.snapshot().await?;
        self.engine.store().force_state(self.bearer, state).await?;

        let finalized =
            self.workflow.definition().finalize_on_end_state() && self.workflow.is_final(state);
        if finalized != snapshot.finalized {
            self.engine
                .store()
                .set_finalized(self.bearer, finalized)
                .await?;
        }

        info!(from = snapshot.current_state(), "forced state");
        Ok(())
    }

    /// True when the bearer is assigned and sits in an upload state.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the store fails.
    pub async fn upload_allowed(&self) -> Result<bool, WorkflowError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.assignment.is_assigned()
            && self.workflow.is_upload_state(snapshot.current_state()))
    }

    /// # Errors
    ///
    /// Returns `Persistence` if the store fails.
    pub async fn finished(&self) -> Result<bool, WorkflowError> {
        let snapshot = self.snapshot().await?;
        Ok(self.workflow.is_final(snapshot.current_state()))
    }

    /// Template of the current state, if it declares one.
    ///
    /// # Errors
    ///
    /// Same as [`current_state`](Self::current_state).
    pub async fn current_template_name(&self) -> Result<Option<String>, WorkflowError> {
        Ok(self
            .current_state()
            .await?
            .template_name()
            .map(str::to_string))
    }
}
