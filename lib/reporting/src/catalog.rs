//! Registry of compiled workflows, keyed by definition name.
//!
//! Envelopes store the name of the workflow they run; the catalog resolves
//! it back to the compiled definition.

use crate::auto_qa::{self, QaService};
use crate::error::CatalogError;
use crate::reference;
use reportek_workflow::{CompiledWorkflow, WorkflowDefinition};
use rootcause::prelude::Report;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Compiled workflows available to the application.
#[derive(Clone, Default)]
pub struct WorkflowCatalog {
    workflows: BTreeMap<String, Arc<CompiledWorkflow>>,
}

impl WorkflowCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled workflows: the reference workflow and the demo auto QA
    /// workflow wired to `qa`.
    ///
    /// # Errors
    ///
    /// Fails if a bundled definition does not load or compile.
    pub fn standard(qa: Arc<dyn QaService>) -> Result<Self, Report<CatalogError>> {
        let mut catalog = Self::new();
        catalog.register(reference::definition()?)?;
        catalog.register(auto_qa::definition(qa))?;
        Ok(catalog)
    }

    /// Validates and adds `definition`.
    ///
    /// # Errors
    ///
    /// - `DuplicateWorkflow` if the name is taken
    /// - `Misconfigured` if the definition fails validation
    #[instrument(skip(self, definition), fields(workflow = definition.name()))]
    pub fn register(
        &mut self,
        definition: WorkflowDefinition,
    ) -> Result<Arc<CompiledWorkflow>, Report<CatalogError>> {
        let name = definition.name().to_string();
        if self.workflows.contains_key(&name) {
            return Err(CatalogError::DuplicateWorkflow { name }.into());
        }

        let compiled = Arc::new(CompiledWorkflow::compile(definition).map_err(CatalogError::from)?);
        info!(
            states = compiled.states().len(),
            transitions = compiled.transitions().len(),
            "registered workflow"
        );
        self.workflows.insert(name, compiled.clone());
        Ok(compiled)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CompiledWorkflow>> {
        self.workflows.get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
