//! Workflow states.
//!
//! A state is a value object identified by its machine name. Two states with
//! the same name are the same state regardless of title or template, which
//! lets definitions reference states declared elsewhere by name alone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A named state in a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    name: String,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    template_name: Option<String>,
}

impl WorkflowState {
    /// Creates a state with the given machine name and human title.
    #[must_use]
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            template_name: None,
        }
    }

    /// Attaches the name of the template rendered while in this state.
    #[must_use]
    pub fn with_template(mut self, template_name: impl Into<String>) -> Self {
        self.template_name = Some(template_name.into());
        self
    }

    /// The machine name, unique within a definition.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The human-readable title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }
}

impl PartialEq for WorkflowState {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for WorkflowState {}

impl Hash for WorkflowState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
