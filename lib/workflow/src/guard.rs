//! Transition guards.
//!
//! A transition is available when the bearer sits in one of its sources, the
//! actor kind is allowed, and the assignment gate lets the actor through.

use crate::actor::ActorContext;
use crate::compiled::CompiledWorkflow;
use crate::error::Unavailable;
use crate::instance::BearerSnapshot;
use crate::transition::WorkflowTransition;

/// Checks whether `actor` may start `transition` on `bearer`.
///
/// The system actor and system-only transitions bypass the assignment gate.
///
/// # Errors
///
/// Returns the first failing condition.
pub fn check(
    workflow: &CompiledWorkflow,
    transition: &WorkflowTransition,
    bearer: &BearerSnapshot,
    actor: &ActorContext,
) -> Result<(), Unavailable> {
    let current = bearer.current_state();
    if !transition.has_source(current) {
        return Err(Unavailable::WrongState {
            current: current.to_string(),
        });
    }

    if !transition.allows(actor.kind) {
        return Err(Unavailable::ActorNotAllowed { actor: actor.kind });
    }

    if actor.is_system() || transition.is_system_only() {
        return Ok(());
    }

    if bearer.assignment.is_system() {
        return Err(Unavailable::AssignedToSystem);
    }

    if workflow.definition().require_assignment() && !bearer.assignment.is_assigned() {
        return Err(Unavailable::NotAssigned);
    }

    Ok(())
}

/// Names of the transitions `actor` may start, in declaration order.
#[must_use]
pub fn available(
    workflow: &CompiledWorkflow,
    bearer: &BearerSnapshot,
    actor: &ActorContext,
) -> Vec<String> {
    workflow
        .transitions()
        .iter()
        .filter(|t| check(workflow, t, bearer, actor).is_ok())
        .map(|t| t.name().to_string())
        .collect()
}
