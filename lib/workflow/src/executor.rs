//! Transition execution.
//!
//! One execution is: reload the bearer, re-check the guard, run the
//! implementation, compare-and-swap the state, then apply the post-commit
//! effects (unassign, finalize, history, notification). A lost swap restarts
//! the whole sequence. Automatic follow-on transitions run afterwards on the
//! same call chain, as the system actor, with the bearer assigned to the
//! system until the cascade ends.

use crate::actor::ActorContext;
use crate::compiled::CompiledWorkflow;
use crate::config::EngineConfig;
use crate::error::WorkflowError;
use crate::guard;
use crate::history::{HistoryLog, NewTransitionEvent, TransitionEvent};
use crate::instance::{Assignment, BearerRef, BearerSnapshot};
use crate::machine::StateMachine;
use crate::notify::{EnteredState, Notification, Notifier};
use crate::store::BearerStore;
use crate::transition::{OnEnter, TransitionContext, WorkflowTransition};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared handles the runtime works against.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn BearerStore>,
    history: Arc<dyn HistoryLog>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
}

impl Engine {
    #[must_use]
    pub fn new(
        store: Arc<dyn BearerStore>,
        history: Arc<dyn HistoryLog>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            history,
            notifier,
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn BearerStore> {
        &self.store
    }

    #[must_use]
    pub fn history(&self) -> &Arc<dyn HistoryLog> {
        &self.history
    }

    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Binds `workflow` to `bearer`.
    #[must_use]
    pub fn machine(&self, workflow: Arc<CompiledWorkflow>, bearer: BearerRef) -> StateMachine {
        StateMachine::new(self.clone(), workflow, bearer)
    }

    /// Loads a bearer, defaulting an empty state to the initial state.
    pub(crate) async fn load(
        &self,
        workflow: &CompiledWorkflow,
        bearer: BearerRef,
    ) -> Result<BearerSnapshot, WorkflowError> {
        let mut snapshot = self.store.load(bearer).await?;
        snapshot.instance.ensure_state(workflow.definition());
        Ok(snapshot)
    }

    /// Runs `transition` and any automatic transitions it triggers.
    ///
    /// Returns the event of `transition` itself. A cascade failure is
    /// returned even though the initiating transition stays committed.
    pub(crate) async fn run(
        &self,
        workflow: &CompiledWorkflow,
        bearer: BearerRef,
        transition: &WorkflowTransition,
        actor: &ActorContext,
    ) -> Result<TransitionEvent, WorkflowError> {
        let event = self.execute(workflow, bearer, transition, actor).await?;

        if workflow.on_enter(transition.target().name()).is_some() {
            self.cascade(workflow, bearer, transition).await?;
        }

        Ok(event)
    }

    async fn execute(
        &self,
        workflow: &CompiledWorkflow,
        bearer: BearerRef,
        transition: &WorkflowTransition,
        actor: &ActorContext,
    ) -> Result<TransitionEvent, WorkflowError> {
        let attempts = self.config.max_commit_retries.saturating_add(1);
        for attempt in 1..=attempts {
            if let Some(event) = self.execute_once(workflow, bearer, transition, actor).await? {
                return Ok(event);
            }
            warn!(
                %bearer,
                transition = transition.name(),
                attempt,
                "state changed concurrently, retrying"
            );
        }

        Err(WorkflowError::Conflict { bearer, attempts })
    }

    /// One guarded attempt. Returns `None` when the swap lost a race.
    async fn execute_once(
        &self,
        workflow: &CompiledWorkflow,
        bearer: BearerRef,
        transition: &WorkflowTransition,
        actor: &ActorContext,
    ) -> Result<Option<TransitionEvent>, WorkflowError> {
        let mut snapshot = self.store.load(bearer).await?;
        let stored_state = snapshot.instance.current_state.clone();
        snapshot.instance.ensure_state(workflow.definition());

        guard::check(workflow, transition, &snapshot, actor).map_err(|reason| {
            WorkflowError::TransitionNotAvailable {
                transition: transition.name().to_string(),
                state: snapshot.current_state().to_string(),
                reason,
            }
        })?;

        let ctx = TransitionContext {
            bearer: &snapshot,
            transition: transition.name(),
            actor,
        };
        transition
            .implementation()
            .run(&ctx)
            .await
            .map_err(|source| WorkflowError::DomainCallback {
                transition: transition.name().to_string(),
                source,
            })?;

        let from = snapshot.current_state().to_string();
        let target = transition.target().name();
        if !self.store.swap_state(bearer, &stored_state, target).await? {
            return Ok(None);
        }
        debug!(%bearer, state = target, "persisted state change");

        let definition = workflow.definition();
        if definition.unassign_after_transition() && matches!(snapshot.assignment, Assignment::User(_)) {
            self.store
                .set_assignment(bearer, Assignment::Unassigned)
                .await?;
            info!(%bearer, label = %snapshot.label, "bearer was unassigned");
        }

        let finalized = definition.finalize_on_end_state() && workflow.is_final(target);
        if finalized != snapshot.finalized {
            self.store.set_finalized(bearer, finalized).await?;
            if finalized {
                info!(%bearer, label = %snapshot.label, "bearer has been finalized");
            } else {
                info!(%bearer, label = %snapshot.label, "bearer is no longer finalized");
            }
        }

        let event = self
            .history
            .record(
                NewTransitionEvent::new(bearer, transition.name(), from.clone(), target)
                    .with_extra(serde_json::json!({
                        "actor": actor.kind,
                        "user": actor.user,
                    })),
            )
            .await?;

        let notification = Notification::entered_state(
            bearer,
            &EnteredState {
                previous_state: from.clone(),
                current_state: target.to_string(),
                finalized,
            },
        );
        if let Err(e) = self.notifier.publish(notification).await {
            warn!(%bearer, error = %e, "failed to publish state change");
        }

        info!(
            %bearer,
            transition = transition.name(),
            from = %from,
            to = target,
            actor = %actor.kind,
            "completed transition"
        );

        Ok(Some(event))
    }

    /// Follows the on-enter hooks of the states entered from `first` on,
    /// restoring the bearer's assignment when done.
    async fn cascade(
        &self,
        workflow: &CompiledWorkflow,
        bearer: BearerRef,
        first: &WorkflowTransition,
    ) -> Result<(), WorkflowError> {
        let saved = self.store.load(bearer).await?.assignment;

        let result = self.follow_hooks(workflow, bearer, first).await;
        let restored = self.store.set_assignment(bearer, saved).await;

        result?;
        restored?;
        Ok(())
    }

    async fn follow_hooks<'w>(
        &self,
        workflow: &'w CompiledWorkflow,
        bearer: BearerRef,
        first: &'w WorkflowTransition,
    ) -> Result<(), WorkflowError> {
        let system = ActorContext::system();
        let limit = self.config.max_cascade_depth;
        let mut current = first;
        let mut depth = 0u32;

        while let Some(on_enter) = workflow.on_enter(current.target().name()) {
            self.store.set_assignment(bearer, Assignment::System).await?;

            let next = match on_enter {
                OnEnter::Start(name) => Some(name.clone()),
                OnEnter::Hook(hook) => {
                    let snapshot = self.load(workflow, bearer).await?;
                    let ctx = TransitionContext {
                        bearer: &snapshot,
                        transition: current.name(),
                        actor: &system,
                    };
                    hook.on_enter(&ctx)
                        .await
                        .map_err(|source| WorkflowError::DomainCallback {
                            transition: current.name().to_string(),
                            source,
                        })?
                }
            };
            let Some(next) = next else {
                debug!(%bearer, after = current.name(), "cascade stopped by hook");
                break;
            };

            depth += 1;
            if depth > limit {
                error!(%bearer, limit, transition = %next, "automatic transition cascade too deep");
                return Err(WorkflowError::CascadeDepthExceeded {
                    limit,
                    transition: next,
                });
            }

            let transition = workflow
                .transition(&next)
                .ok_or_else(|| WorkflowError::TransitionDoesNotExist {
                    transition: next.clone(),
                })?;

            debug!(%bearer, transition = %next, depth, "starting automatic transition");
            self.execute(workflow, bearer, transition, &system).await?;
            current = transition;
        }

        Ok(())
    }
}
