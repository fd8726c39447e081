//! Validated, indexed workflows ready to execute.

use crate::definition::WorkflowDefinition;
use crate::error::WorkflowError;
use crate::state::WorkflowState;
use crate::transition::{OnEnter, WorkflowTransition};
use std::collections::HashMap;

/// A workflow definition that passed validation.
///
/// Compiled workflows are read-only and meant to be shared behind an `Arc`
/// by every machine running them.
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    definition: WorkflowDefinition,
    states: Vec<WorkflowState>,
    state_index: HashMap<String, usize>,
    transition_index: HashMap<String, usize>,
    /// Entered state to the transition whose on-enter hook it runs.
    on_enter_index: HashMap<String, usize>,
}

impl CompiledWorkflow {
    /// Validates and indexes `definition`.
    ///
    /// # Errors
    ///
    /// Returns `MisconfiguredWorkflow` if validation fails.
    pub fn compile(definition: WorkflowDefinition) -> Result<Self, WorkflowError> {
        definition
            .validate()
            .map_err(|problem| WorkflowError::MisconfiguredWorkflow {
                workflow: definition.name().to_string(),
                problem,
            })?;

        let states = definition.states();
        let state_index = states
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name().to_string(), i))
            .collect();
        let transition_index = definition
            .transitions()
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();
        // Later declarations for the same target state win.
        let on_enter_index = definition
            .transitions()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.on_enter().is_some())
            .map(|(i, t)| (t.target().name().to_string(), i))
            .collect();

        tracing::debug!(
            workflow = definition.name(),
            states = states.len(),
            transitions = definition.transitions().len(),
            "compiled workflow"
        );

        Ok(Self {
            definition,
            states,
            state_index,
            transition_index,
            on_enter_index,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    #[must_use]
    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    #[must_use]
    pub fn states(&self) -> &[WorkflowState] {
        &self.states
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<&WorkflowState> {
        self.state_index.get(name).map(|&i| &self.states[i])
    }

    #[must_use]
    pub fn transition(&self, name: &str) -> Option<&WorkflowTransition> {
        self.transition_index
            .get(name)
            .map(|&i| &self.definition.transitions()[i])
    }

    /// The hook that runs whenever `state` is entered, whichever transition
    /// entered it.
    #[must_use]
    pub fn on_enter(&self, state: &str) -> Option<&OnEnter> {
        self.on_enter_index
            .get(state)
            .and_then(|&i| self.definition.transitions()[i].on_enter())
    }

    /// Transitions in declaration order.
    #[must_use]
    pub fn transitions(&self) -> &[WorkflowTransition] {
        self.definition.transitions()
    }

    #[must_use]
    pub fn initial_state(&self) -> &WorkflowState {
        self.definition.initial_state()
    }

    #[must_use]
    pub fn final_state(&self) -> &WorkflowState {
        self.definition.final_state()
    }

    #[must_use]
    pub fn is_final(&self, state: &str) -> bool {
        self.final_state().name() == state
    }

    #[must_use]
    pub fn is_upload_state(&self, state: &str) -> bool {
        self.definition
            .upload_states()
            .iter()
            .any(|s| s.name() == state)
    }
}
