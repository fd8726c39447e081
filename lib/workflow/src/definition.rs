//! Workflow definitions.
//!
//! A definition is immutable once built. It can be assembled in code through
//! [`WorkflowDefinition::builder`] or loaded from a [`DefinitionSpec`] (JSON)
//! combined with a [`CallbackRegistry`].
//!
//! Building never fails; soundness is checked by [`WorkflowDefinition::validate`],
//! which [`CompiledWorkflow::compile`](crate::compiled::CompiledWorkflow::compile)
//! always runs.

use crate::actor::ActorKind;
use crate::error::{Misconfiguration, WorkflowError};
use crate::graph::TransitionGraph;
use crate::state::WorkflowState;
use crate::transition::{CallbackRegistry, OnEnter, WorkflowTransition};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A complete declarative workflow.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    name: String,
    initial_state: WorkflowState,
    final_state: WorkflowState,
    transitions: Vec<WorkflowTransition>,
    explicit_states: Option<Vec<WorkflowState>>,
    upload_states: Vec<WorkflowState>,
    unassign_after_transition: bool,
    finalize_on_end_state: bool,
    require_assignment: bool,
}

impl WorkflowDefinition {
    /// Starts a definition named `name` entered at `initial_state`.
    ///
    /// The final state defaults to `end`.
    #[must_use]
    pub fn builder(name: impl Into<String>, initial_state: WorkflowState) -> WorkflowDefinitionBuilder {
        WorkflowDefinitionBuilder {
            definition: Self {
                name: name.into(),
                initial_state,
                final_state: WorkflowState::new("end", "End"),
                transitions: Vec::new(),
                explicit_states: None,
                upload_states: Vec::new(),
                unassign_after_transition: true,
                finalize_on_end_state: true,
                require_assignment: false,
            },
        }
    }

    /// Builds a definition from its data form, attaching callbacks from
    /// `registry`.
    ///
    /// A hook registered for a transition takes precedence over the spec's
    /// `auto_start`.
    ///
    /// # Errors
    ///
    /// Returns `MisconfiguredWorkflow` when a state name is not declared or
    /// a transition has no registered implementation. The result is not
    /// validated; compile it to check soundness.
    pub fn from_spec(spec: &DefinitionSpec, registry: &CallbackRegistry) -> Result<Self, WorkflowError> {
        Self::build_from_spec(spec, registry).map_err(|problem| WorkflowError::MisconfiguredWorkflow {
            workflow: spec.name.clone(),
            problem,
        })
    }

    fn build_from_spec(
        spec: &DefinitionSpec,
        registry: &CallbackRegistry,
    ) -> Result<Self, Misconfiguration> {
        let lookup: HashMap<&str, &WorkflowState> =
            spec.states.iter().map(|s| (s.name(), s)).collect();

        let initial = lookup
            .get(spec.initial_state.as_str())
            .map(|s| (*s).clone())
            .ok_or_else(|| Misconfiguration::InitialStateMissing {
                state: spec.initial_state.clone(),
            })?;
        let final_state = lookup
            .get(spec.final_state.as_str())
            .map(|s| (*s).clone())
            .ok_or_else(|| Misconfiguration::FinalStateMissing {
                state: spec.final_state.clone(),
            })?;

        let mut builder = Self::builder(spec.name.clone(), initial)
            .final_state(final_state)
            .unassign_after_transition(spec.unassign_after_transition)
            .finalize_on_end_state(spec.finalize_on_end_state)
            .require_assignment(spec.require_assignment);

        let mut upload_states = Vec::with_capacity(spec.upload_states.len());
        for name in &spec.upload_states {
            let state = lookup
                .get(name.as_str())
                .ok_or_else(|| Misconfiguration::UnknownUploadState {
                    state: name.clone(),
                })?;
            upload_states.push((*state).clone());
        }
        builder = builder.upload_states(upload_states);

        for t in &spec.transitions {
            let resolve = |name: &str| {
                lookup
                    .get(name)
                    .map(|s| (*s).clone())
                    .ok_or_else(|| Misconfiguration::UnknownState {
                        transition: t.name.clone(),
                        state: name.to_string(),
                    })
            };

            let sources = t
                .sources
                .iter()
                .map(|s| resolve(s))
                .collect::<Result<Vec<_>, _>>()?;
            let target = resolve(&t.target)?;

            let callbacks = registry
                .get(&t.name)
                .ok_or_else(|| Misconfiguration::MissingImplementation {
                    transition: t.name.clone(),
                })?;

            let mut transition = WorkflowTransition::new(
                t.name.clone(),
                sources,
                target,
                callbacks.implementation.clone(),
            );
            if let Some(actors) = &t.allowed_actors {
                transition = transition.allowed_actors(actors.iter().copied());
            }
            let on_enter = callbacks
                .on_enter_target
                .clone()
                .or_else(|| t.auto_start.clone().map(OnEnter::Start));
            if let Some(on_enter) = on_enter {
                transition = transition.on_enter_target(on_enter);
            }

            builder = builder.transition(transition);
        }

        Ok(builder.build())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn initial_state(&self) -> &WorkflowState {
        &self.initial_state
    }

    #[must_use]
    pub fn final_state(&self) -> &WorkflowState {
        &self.final_state
    }

    /// Transitions in declaration order.
    #[must_use]
    pub fn transitions(&self) -> &[WorkflowTransition] {
        &self.transitions
    }

    #[must_use]
    pub fn upload_states(&self) -> &[WorkflowState] {
        &self.upload_states
    }

    #[must_use]
    pub fn unassign_after_transition(&self) -> bool {
        self.unassign_after_transition
    }

    #[must_use]
    pub fn finalize_on_end_state(&self) -> bool {
        self.finalize_on_end_state
    }

    #[must_use]
    pub fn require_assignment(&self) -> bool {
        self.require_assignment
    }

    /// The state set: the explicit override if one was given, otherwise the
    /// union of all sources and targets in declaration order.
    #[must_use]
    pub fn states(&self) -> Vec<WorkflowState> {
        if let Some(states) = &self.explicit_states {
            return states.clone();
        }

        let mut seen = HashSet::new();
        let mut states = Vec::new();
        for transition in &self.transitions {
            for state in transition.sources().iter().chain([transition.target()]) {
                if seen.insert(state.name()) {
                    states.push(state.clone());
                }
            }
        }
        states
    }

    /// Checks the definition for structural soundness.
    ///
    /// # Errors
    ///
    /// Returns the first problem found, checking in order: initial state
    /// present, final state present, the final state is the only attracting
    /// component, then per-transition checks.
    pub fn validate(&self) -> Result<(), Misconfiguration> {
        let states = self.states();
        let names: HashSet<&str> = states.iter().map(WorkflowState::name).collect();

        if !names.contains(self.initial_state.name()) {
            return Err(Misconfiguration::InitialStateMissing {
                state: self.initial_state.name().to_string(),
            });
        }
        if !names.contains(self.final_state.name()) {
            return Err(Misconfiguration::FinalStateMissing {
                state: self.final_state.name().to_string(),
            });
        }

        let found = TransitionGraph::from_definition(self).attracting_components();
        if found != [vec![self.final_state.name().to_string()]] {
            return Err(Misconfiguration::InvalidEndStates {
                found,
                expected: self.final_state.name().to_string(),
            });
        }

        let mut declared = HashSet::new();
        for transition in &self.transitions {
            if transition.sources().is_empty() {
                return Err(Misconfiguration::EmptySources {
                    transition: transition.name().to_string(),
                });
            }
            if !declared.insert(transition.name()) {
                return Err(Misconfiguration::DuplicateTransition {
                    transition: transition.name().to_string(),
                });
            }
            if self.explicit_states.is_some() {
                for state in transition.sources().iter().chain([transition.target()]) {
                    if !names.contains(state.name()) {
                        return Err(Misconfiguration::UnknownState {
                            transition: transition.name().to_string(),
                            state: state.name().to_string(),
                        });
                    }
                }
            }
        }

        for transition in &self.transitions {
            let Some(target) = transition.on_enter().and_then(OnEnter::declared_target) else {
                continue;
            };
            if !declared.contains(target) {
                return Err(Misconfiguration::UnknownAutoTransition {
                    transition: transition.name().to_string(),
                    target: target.to_string(),
                });
            }
        }

        for state in &self.upload_states {
            if !names.contains(state.name()) {
                return Err(Misconfiguration::UnknownUploadState {
                    state: state.name().to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Builder for [`WorkflowDefinition`].
#[derive(Debug, Clone)]
pub struct WorkflowDefinitionBuilder {
    definition: WorkflowDefinition,
}

impl WorkflowDefinitionBuilder {
    #[must_use]
    pub fn final_state(mut self, state: WorkflowState) -> Self {
        self.definition.final_state = state;
        self
    }

    /// Appends a transition; declaration order is preserved.
    #[must_use]
    pub fn transition(mut self, transition: WorkflowTransition) -> Self {
        self.definition.transitions.push(transition);
        self
    }

    /// Overrides the derived state set.
    #[must_use]
    pub fn states(mut self, states: impl IntoIterator<Item = WorkflowState>) -> Self {
        self.definition.explicit_states = Some(states.into_iter().collect());
        self
    }

    /// States in which file uploads are accepted.
    #[must_use]
    pub fn upload_states(mut self, states: impl IntoIterator<Item = WorkflowState>) -> Self {
        self.definition.upload_states = states.into_iter().collect();
        self
    }

    #[must_use]
    pub fn unassign_after_transition(mut self, enabled: bool) -> Self {
        self.definition.unassign_after_transition = enabled;
        self
    }

    #[must_use]
    pub fn finalize_on_end_state(mut self, enabled: bool) -> Self {
        self.definition.finalize_on_end_state = enabled;
        self
    }

    /// Require non-system actors to work on an assigned bearer.
    #[must_use]
    pub fn require_assignment(mut self, enabled: bool) -> Self {
        self.definition.require_assignment = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> WorkflowDefinition {
        self.definition
    }
}

fn default_true() -> bool {
    true
}

/// Data form of a workflow definition.
///
/// `states` is the catalogue of titled states; transitions refer to them by
/// name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionSpec {
    pub name: String,
    pub states: Vec<WorkflowState>,
    pub initial_state: String,
    pub final_state: String,
    #[serde(default)]
    pub upload_states: Vec<String>,
    #[serde(default = "default_true")]
    pub unassign_after_transition: bool,
    #[serde(default = "default_true")]
    pub finalize_on_end_state: bool,
    #[serde(default)]
    pub require_assignment: bool,
    pub transitions: Vec<TransitionSpec>,
}

impl DefinitionSpec {
    /// Parses a spec from JSON.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Data form of a single transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub name: String,
    pub sources: Vec<String>,
    pub target: String,
    /// Defaults to system and admin when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_actors: Option<Vec<ActorKind>>,
    /// Transition started automatically on entering `target`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_start: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::noop;

    fn state(name: &str) -> WorkflowState {
        WorkflowState::new(name, name.to_uppercase())
    }

    fn transition(name: &str, sources: &[&str], target: &str) -> WorkflowTransition {
        WorkflowTransition::new(
            name,
            sources.iter().map(|s| state(s)),
            state(target),
            noop(),
        )
    }

    fn qa_definition() -> WorkflowDefinition {
        WorkflowDefinition::builder("demo", state("draft"))
            .final_state(state("end"))
            .transition(transition("send_to_qa", &["draft"], "auto_qa"))
            .transition(transition("fail_qa", &["auto_qa"], "draft"))
            .transition(transition("pass_qa", &["auto_qa"], "review"))
            .transition(transition("reject", &["review"], "draft"))
            .transition(transition("accept", &["review"], "end"))
            .build()
    }

    #[test]
    fn derived_states_follow_declaration_order() {
        let names: Vec<String> = qa_definition()
            .states()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, ["draft", "auto_qa", "review", "end"]);
    }

    #[test]
    fn defaults() {
        let def = qa_definition();
        assert!(def.unassign_after_transition());
        assert!(def.finalize_on_end_state());
        assert!(!def.require_assignment());
        assert!(def.upload_states().is_empty());
    }

    #[test]
    fn sound_definition_validates() {
        assert_eq!(qa_definition().validate(), Ok(()));
    }

    #[test]
    fn initial_state_must_be_reachable_in_graph() {
        let def = WorkflowDefinition::builder("bad", state("nowhere"))
            .final_state(state("end"))
            .transition(transition("finish", &["draft"], "end"))
            .build();
        let err = def.validate().unwrap_err();
        assert_eq!(
            err,
            Misconfiguration::InitialStateMissing {
                state: "nowhere".into()
            }
        );
        assert!(err.to_string().contains("not in states"));
    }

    #[test]
    fn final_state_must_be_in_states() {
        let def = WorkflowDefinition::builder("bad", state("draft"))
            .transition(transition("finish", &["draft"], "done"))
            .build();
        assert!(matches!(
            def.validate(),
            Err(Misconfiguration::FinalStateMissing { .. })
        ));
    }

    #[test]
    fn cycle_without_exit_is_rejected() {
        let def = WorkflowDefinition::builder("cyclic", state("a"))
            .final_state(state("end"))
            .transition(transition("ab", &["a"], "b"))
            .transition(transition("ba", &["b"], "a"))
            .transition(transition("a_end", &["a"], "end"))
            .transition(transition("bc", &["b"], "c"))
            .transition(transition("cd", &["c"], "d"))
            .transition(transition("dc", &["d"], "c"))
            .build();

        let err = def.validate().unwrap_err();
        assert!(err.to_string().starts_with("invalid end state(s)"));
        let Misconfiguration::InvalidEndStates { found, .. } = err else {
            panic!("expected InvalidEndStates");
        };
        assert_eq!(
            found,
            vec![
                vec!["c".to_string(), "d".to_string()],
                vec!["end".to_string()],
            ]
        );
    }

    #[test]
    fn second_sink_is_rejected() {
        let def = WorkflowDefinition::builder("two-ends", state("draft"))
            .final_state(state("end"))
            .transition(transition("finish", &["draft"], "end"))
            .transition(transition("abandon", &["draft"], "abandoned"))
            .build();
        assert!(matches!(
            def.validate(),
            Err(Misconfiguration::InvalidEndStates { .. })
        ));
    }

    #[test]
    fn final_state_with_outgoing_edge_is_rejected() {
        let def = WorkflowDefinition::builder("reopen", state("draft"))
            .final_state(state("end"))
            .transition(transition("finish", &["draft"], "end"))
            .transition(transition("reopen", &["end"], "draft"))
            .build();
        assert!(matches!(
            def.validate(),
            Err(Misconfiguration::InvalidEndStates { .. })
        ));
    }

    #[test]
    fn duplicate_transition_names_are_rejected() {
        let def = WorkflowDefinition::builder("dup", state("draft"))
            .final_state(state("end"))
            .transition(transition("finish", &["draft"], "end"))
            .transition(transition("finish", &["draft"], "end"))
            .build();
        assert_eq!(
            def.validate(),
            Err(Misconfiguration::DuplicateTransition {
                transition: "finish".into()
            })
        );
    }

    #[test]
    fn unknown_auto_transition_is_rejected() {
        let def = WorkflowDefinition::builder("auto", state("draft"))
            .final_state(state("end"))
            .transition(
                transition("finish", &["draft"], "end").on_enter_target(OnEnter::start("missing")),
            )
            .build();
        assert!(matches!(
            def.validate(),
            Err(Misconfiguration::UnknownAutoTransition { .. })
        ));
    }

    #[test]
    fn explicit_states_must_cover_transitions() {
        let def = WorkflowDefinition::builder("explicit", state("draft"))
            .final_state(state("end"))
            .states([state("draft"), state("end")])
            .transition(transition("submit", &["draft"], "review"))
            .transition(transition("accept", &["review"], "end"))
            .build();
        assert!(matches!(
            def.validate(),
            Err(Misconfiguration::UnknownState { .. })
        ));
    }

    const SPEC_JSON: &str = r#"{
        "name": "json-demo",
        "states": [
            {"name": "draft", "title": "Draft", "template_name": "draft.html"},
            {"name": "pending", "title": "Pending"},
            {"name": "end", "title": "End"}
        ],
        "initial_state": "draft",
        "final_state": "end",
        "upload_states": ["draft"],
        "unassign_after_transition": false,
        "transitions": [
            {"name": "submit", "sources": ["draft"], "target": "pending",
             "allowed_actors": ["reporter"], "auto_start": "close"},
            {"name": "close", "sources": ["pending"], "target": "end"}
        ]
    }"#;

    fn registry() -> CallbackRegistry {
        let mut registry = CallbackRegistry::new();
        registry.implement("submit", noop()).implement("close", noop());
        registry
    }

    #[test]
    fn spec_builds_definition() {
        let spec = DefinitionSpec::from_json(SPEC_JSON).expect("parse");
        assert!(spec.finalize_on_end_state);
        assert!(!spec.require_assignment);

        let def = WorkflowDefinition::from_spec(&spec, &registry()).expect("build");
        assert_eq!(def.name(), "json-demo");
        assert!(!def.unassign_after_transition());
        assert_eq!(def.initial_state().template_name(), Some("draft.html"));
        assert_eq!(def.upload_states().len(), 1);

        let submit = &def.transitions()[0];
        assert!(submit.allows(ActorKind::Reporter));
        assert!(!submit.allows(ActorKind::Admin));
        assert_eq!(
            submit.on_enter().and_then(OnEnter::declared_target),
            Some("close")
        );
        assert!(def.transitions()[1].allows(ActorKind::Admin));
        assert_eq!(def.validate(), Ok(()));
    }

    #[test]
    fn spec_requires_implementations() {
        let spec = DefinitionSpec::from_json(SPEC_JSON).expect("parse");
        let mut registry = CallbackRegistry::new();
        registry.implement("submit", noop());

        let err = WorkflowDefinition::from_spec(&spec, &registry).unwrap_err();
        assert_eq!(
            err,
            WorkflowError::MisconfiguredWorkflow {
                workflow: "json-demo".into(),
                problem: Misconfiguration::MissingImplementation {
                    transition: "close".into()
                },
            }
        );
    }

    #[test]
    fn registry_hook_overrides_auto_start() {
        let spec = DefinitionSpec::from_json(SPEC_JSON).expect("parse");
        let mut registry = registry();
        registry.on_enter("submit", OnEnter::start("other"));

        let def = WorkflowDefinition::from_spec(&spec, &registry).expect("build");
        assert_eq!(
            def.transitions()[0]
                .on_enter()
                .and_then(OnEnter::declared_target),
            Some("other")
        );
    }

    #[test]
    fn spec_rejects_undeclared_state() {
        let mut spec = DefinitionSpec::from_json(SPEC_JSON).expect("parse");
        spec.transitions[1].target = "closed".into();
        let err = WorkflowDefinition::from_spec(&spec, &registry()).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::MisconfiguredWorkflow {
                problem: Misconfiguration::UnknownState { .. },
                ..
            }
        ));
    }
}
