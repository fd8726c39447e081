//! The reference reporting workflow.
//!
//! Declared as data in `workflows/reference.json`. Every transition is a
//! mock that only logs; the QA chain after `delete_auto_qa_results` and
//! after each QA verdict runs automatically up to `receipt_confirmed`.

use crate::error::CatalogError;
use reportek_workflow::{CallbackRegistry, DefinitionSpec, WorkflowDefinition, handler_fn};
use tracing::info;

pub const NAME: &str = "reference";

const SPEC_JSON: &str = include_str!("../workflows/reference.json");

/// The bundled definition spec.
///
/// # Errors
///
/// Returns `InvalidSpec` if the bundled JSON does not parse.
pub fn spec() -> Result<DefinitionSpec, CatalogError> {
    DefinitionSpec::from_json(SPEC_JSON).map_err(|e| CatalogError::InvalidSpec {
        name: NAME.to_string(),
        message: e.to_string(),
    })
}

/// Mock implementations for every transition in `spec`.
#[must_use]
pub fn callbacks(spec: &DefinitionSpec) -> CallbackRegistry {
    let mut registry = CallbackRegistry::new();
    for transition in &spec.transitions {
        registry.implement(
            transition.name.clone(),
            handler_fn(|ctx| {
                info!(
                    transition = ctx.transition,
                    bearer = %ctx.bearer.bearer,
                    "mock-running transition"
                );
                Ok(())
            }),
        );
    }
    registry
}

/// Builds the reference workflow definition.
///
/// # Errors
///
/// Returns `InvalidSpec` or `Misconfigured` when the bundled definition is
/// broken.
pub fn definition() -> Result<WorkflowDefinition, CatalogError> {
    let spec = spec()?;
    let registry = callbacks(&spec);
    Ok(WorkflowDefinition::from_spec(&spec, &registry)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportek_core::{EnvelopeId, UserId};
    use reportek_workflow::memory::{MemoryBearerStore, MemoryHistoryLog, RecordingNotifier};
    use reportek_workflow::{
        ActorContext, ActorKind, BearerRef, BearerSnapshot, CompiledWorkflow, Engine,
        StateMachine, WorkflowError, WorkflowInstance,
    };
    use std::sync::Arc;

    fn compiled() -> Arc<CompiledWorkflow> {
        Arc::new(CompiledWorkflow::compile(definition().expect("definition")).expect("valid"))
    }

    async fn machine(
        workflow: &Arc<CompiledWorkflow>,
    ) -> (StateMachine, Arc<MemoryHistoryLog>) {
        let store = Arc::new(MemoryBearerStore::new());
        let history = Arc::new(MemoryHistoryLog::new());
        let bearer = BearerRef::Envelope(EnvelopeId::new());
        store
            .insert(BearerSnapshot::new(
                bearer,
                "reference envelope",
                WorkflowInstance::new(workflow.definition()),
            ))
            .await;
        let engine = Engine::new(store, history.clone(), Arc::new(RecordingNotifier::new()));
        (engine.machine(workflow.clone(), bearer), history)
    }

    #[test]
    fn reference_workflow_is_sound() {
        let workflow = compiled();
        assert_eq!(workflow.name(), NAME);
        assert_eq!(workflow.transitions().len(), 14);
        assert_eq!(workflow.initial_state().name(), "draft");
        assert_eq!(workflow.final_state().name(), "end");
        assert!(workflow.is_upload_state("draft"));
        assert!(!workflow.definition().unassign_after_transition());
    }

    #[test]
    fn unused_catalogue_states_are_left_out() {
        let workflow = compiled();
        assert_eq!(workflow.states().len(), 14);
        assert!(workflow.state("release_revoked").is_none());
        assert!(workflow.state("qa_rerun_requested").is_none());
        assert_eq!(
            workflow.state("qa_pending").map(|s| s.title()),
            Some("AQA Pending")
        );
    }

    #[test]
    fn every_transition_has_a_mock() {
        let spec = spec().expect("spec");
        let registry = callbacks(&spec);
        assert_eq!(registry.len(), spec.transitions.len());
    }

    #[tokio::test]
    async fn reporter_starts_the_qa_chain() {
        let workflow = compiled();
        let (machine, history) = machine(&workflow).await;
        let reporter = ActorContext::user(ActorKind::Reporter, UserId::new());

        assert_eq!(
            machine.available_transitions(&reporter).await.expect("available"),
            vec!["delete_auto_qa_results".to_string()]
        );

        machine
            .start_transition("delete_auto_qa_results", &reporter)
            .await
            .expect("delete results");

        // send_to_auto_qa follows automatically and the chain waits on QA.
        assert_eq!(machine.current_state().await.expect("state").name(), "qa_pending");
        assert_eq!(history.len().await, 2);
    }

    #[tokio::test]
    async fn qa_verdict_cascades_to_receipt_confirmed() {
        let workflow = compiled();
        let (machine, history) = machine(&workflow).await;
        let system = ActorContext::system();

        machine.force_state("qa_pending").await.expect("force");
        machine
            .start_transition("fail_auto_qa", &system)
            .await
            .expect("fail");

        assert_eq!(
            machine.current_state().await.expect("state").name(),
            "receipt_confirmed"
        );
        let names: Vec<String> = machine
            .history()
            .await
            .expect("history")
            .into_iter()
            .map(|e| e.transition)
            .collect();
        assert_eq!(
            names,
            ["fail_auto_qa", "ping_cr", "restrict_auto_qa_results", "confirm_receipt"]
        );
        assert_eq!(history.len().await, 4);
    }

    #[tokio::test]
    async fn client_feedback_paths() {
        let workflow = compiled();
        let (machine, _history) = machine(&workflow).await;
        let client = ActorContext::user(ActorKind::Client, UserId::new());
        let admin = ActorContext::anonymous(ActorKind::Admin);

        machine.force_state("final_feedback").await.expect("force");
        let err = machine
            .start_transition("request_correction", &admin)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::TransitionNotAvailable { .. }));

        machine
            .start_transition("request_correction", &client)
            .await
            .expect("correction");
        machine
            .start_transition("complete", &admin)
            .await
            .expect("complete");
        assert!(machine.finished().await.expect("finished"));
    }
}
