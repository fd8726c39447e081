//! Bearer-bound workflow records.
//!
//! A bearer is the domain entity that owns a workflow instance. The engine
//! never loads a bearer directly; it works on a [`BearerSnapshot`] handed
//! out by the [`BearerStore`](crate::store::BearerStore).

use crate::definition::WorkflowDefinition;
use chrono::{DateTime, Utc};
use reportek_core::{EnvelopeId, UserId, WorkflowInstanceId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to the entity bearing a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum BearerRef {
    /// A reporting envelope.
    Envelope(EnvelopeId),
}

impl BearerRef {
    /// The kind tag, used for topic names and persistence.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Envelope(_) => "envelope",
        }
    }

    /// The bearer's identifier rendered as a string.
    #[must_use]
    pub fn id_string(&self) -> String {
        match self {
            Self::Envelope(id) => id.to_string(),
        }
    }
}

impl fmt::Display for BearerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Envelope(id) => write!(f, "envelope:{id}"),
        }
    }
}

/// Who a bearer is currently assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "user", rename_all = "snake_case")]
pub enum Assignment {
    #[default]
    Unassigned,
    /// A human user is working on the bearer.
    User(UserId),
    /// An automatic cascade is in flight.
    System,
}

impl Assignment {
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        !matches!(self, Self::Unassigned)
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }
}

/// The runtime record of a bearer's position in its workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: WorkflowInstanceId,
    /// Name of the definition this instance runs.
    pub workflow: String,
    pub current_state: String,
    pub previous_state: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    /// Creates an instance positioned on the definition's initial state.
    #[must_use]
    pub fn new(definition: &WorkflowDefinition) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowInstanceId::new(),
            workflow: definition.name().to_string(),
            current_state: definition.initial_state().name().to_string(),
            previous_state: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fills in the initial state when the record was stored without one.
    pub fn ensure_state(&mut self, definition: &WorkflowDefinition) {
        if self.current_state.is_empty() {
            self.current_state = definition.initial_state().name().to_string();
        }
    }

    /// Moves to `target`, remembering the state being left.
    pub fn advance(&mut self, target: impl Into<String>) {
        let target = target.into();
        self.previous_state = Some(std::mem::replace(&mut self.current_state, target));
        self.updated_at = Utc::now();
    }
}

/// Everything the engine needs to know about a bearer at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerSnapshot {
    pub bearer: BearerRef,
    /// Human label for log lines (e.g. the envelope name).
    pub label: String,
    pub instance: WorkflowInstance,
    pub assignment: Assignment,
    pub finalized: bool,
}

impl BearerSnapshot {
    /// Creates an unassigned, unfinalized snapshot.
    #[must_use]
    pub fn new(bearer: BearerRef, label: impl Into<String>, instance: WorkflowInstance) -> Self {
        Self {
            bearer,
            label: label.into(),
            instance,
            assignment: Assignment::Unassigned,
            finalized: false,
        }
    }

    #[must_use]
    pub fn with_assignment(mut self, assignment: Assignment) -> Self {
        self.assignment = assignment;
        self
    }

    #[must_use]
    pub fn current_state(&self) -> &str {
        &self.instance.current_state
    }
}
