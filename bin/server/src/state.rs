//! Shared application state.

use crate::db::EnvelopeStore;
use crate::error::ApiError;
use reportek_core::EnvelopeId;
use reportek_reporting::{QaWait, WorkflowCatalog};
use reportek_workflow::{BearerRef, BearerStore, Engine, StateMachine};
use std::sync::Arc;

/// Everything the handlers need.
pub struct AppState {
    pub engine: Engine,
    pub catalog: WorkflowCatalog,
    pub envelopes: Arc<dyn EnvelopeStore>,
    /// How long a QA verdict waits for its envelope to reach `auto_qa`.
    pub qa_wait: QaWait,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(engine: Engine, catalog: WorkflowCatalog, envelopes: Arc<dyn EnvelopeStore>) -> Self {
        Self {
            engine,
            catalog,
            envelopes,
            qa_wait: QaWait::default(),
        }
    }

    #[must_use]
    pub fn with_qa_wait(mut self, qa_wait: QaWait) -> Self {
        self.qa_wait = qa_wait;
        self
    }

    /// Binds the envelope's workflow to the envelope.
    ///
    /// # Errors
    ///
    /// `EnvelopeNotFound` for unknown ids, `UnknownWorkflow` when the
    /// envelope runs a workflow missing from the catalog.
    pub async fn machine(&self, id: EnvelopeId) -> Result<StateMachine, ApiError> {
        let bearer = BearerRef::Envelope(id);
        let snapshot = self.engine.store().load(bearer).await?;
        let workflow = self
            .catalog
            .get(&snapshot.instance.workflow)
            .ok_or_else(|| ApiError::UnknownWorkflow {
                name: snapshot.instance.workflow.clone(),
            })?;
        Ok(self.engine.machine(workflow, bearer))
    }
}
