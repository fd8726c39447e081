//! Demo workflow driven by an automatic QA service.
//!
//! `send_to_qa` submits the envelope to QA and parks it in `auto_qa`. When
//! the QA verdict arrives, [`handle_qa_result`] starts `pass_qa` or
//! `fail_qa` on the system's behalf.

use crate::error::QaError;
use async_trait::async_trait;
use reportek_workflow::{
    ActorContext, BearerRef, BearerSnapshot, CallbackError, StateMachine, TransitionContext,
    TransitionEvent, TransitionHandler, WorkflowDefinition, WorkflowError, WorkflowState,
    WorkflowTransition, handler_fn,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

pub const NAME: &str = "demo_auto_qa";

/// State the envelope waits in until QA answers.
pub const AUTO_QA: &str = "auto_qa";

/// A remote QA service.
#[async_trait]
pub trait QaService: Send + Sync {
    /// Submits the envelope for checking and returns the request id.
    async fn submit(&self, envelope: &BearerSnapshot) -> Result<String, QaError>;
}

/// The verdict sent back by the QA service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaResult {
    pub id: String,
    pub valid: bool,
}

impl QaResult {
    /// The transition this verdict triggers.
    #[must_use]
    pub fn transition(&self) -> &'static str {
        if self.valid { "pass_qa" } else { "fail_qa" }
    }
}

/// How long [`handle_qa_result`] waits for the envelope to reach `auto_qa`.
///
/// A verdict can arrive before the `send_to_qa` commit that requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QaWait {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for QaWait {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}

struct SubmitToQa {
    service: Arc<dyn QaService>,
}

#[async_trait]
impl TransitionHandler for SubmitToQa {
    async fn run(&self, ctx: &TransitionContext<'_>) -> Result<(), CallbackError> {
        info!(bearer = %ctx.bearer.bearer, label = %ctx.bearer.label, "sending to QA");
        let request_id = self.service.submit(ctx.bearer).await?;
        info!(%request_id, "QA submission successful");
        Ok(())
    }
}

fn running(transition: &'static str) -> Arc<dyn TransitionHandler> {
    handler_fn(move |ctx| {
        debug!(bearer = %ctx.bearer.bearer, "{transition} running");
        Ok(())
    })
}

/// Builds the demo auto QA workflow around `service`.
#[must_use]
pub fn definition(service: Arc<dyn QaService>) -> WorkflowDefinition {
    let draft = WorkflowState::new("draft", "Draft");
    let auto_qa = WorkflowState::new(AUTO_QA, "Auto QA");
    let review = WorkflowState::new("review", "Review");
    let end = WorkflowState::new("end", "End");

    WorkflowDefinition::builder(NAME, draft.clone())
        .final_state(end.clone())
        .upload_states([draft.clone()])
        .transition(WorkflowTransition::new(
            "send_to_qa",
            [draft.clone()],
            auto_qa.clone(),
            Arc::new(SubmitToQa { service }),
        ))
        .transition(WorkflowTransition::new(
            "fail_qa",
            [auto_qa.clone()],
            draft.clone(),
            running("fail_qa"),
        ))
        .transition(WorkflowTransition::new(
            "pass_qa",
            [auto_qa],
            review.clone(),
            running("pass_qa"),
        ))
        .transition(WorkflowTransition::new(
            "reject",
            [review.clone()],
            draft,
            running("reject"),
        ))
        .transition(WorkflowTransition::new(
            "accept",
            [review],
            end,
            running("accept"),
        ))
        .build()
}

/// Applies a QA verdict to the envelope behind `machine`.
///
/// Waits for the envelope to reach `auto_qa` before starting the verdict's
/// transition as the system actor.
///
/// # Errors
///
/// Returns whatever `start_transition` returns, typically
/// `TransitionNotAvailable` when the envelope never reached `auto_qa`.
#[instrument(skip(machine, result, wait), fields(bearer = %machine.bearer(), request_id = %result.id))]
pub async fn handle_qa_result(
    machine: &StateMachine,
    result: &QaResult,
    wait: QaWait,
) -> Result<TransitionEvent, WorkflowError> {
    let transition = result.transition();
    info!(
        transition,
        verdict = if result.valid { "VALID" } else { "INVALID" },
        "automatic transition triggered by QA response"
    );

    for _ in 0..wait.attempts {
        if machine.current_state().await?.name() == AUTO_QA {
            break;
        }
        debug!("waiting for state to become {AUTO_QA}");
        tokio::time::sleep(wait.interval).await;
    }

    machine
        .start_transition(transition, &ActorContext::system())
        .await
}

/// In-process QA service handing out sequential request ids.
#[derive(Clone, Default)]
pub struct MockQaService {
    next_id: Arc<AtomicU64>,
    submissions: Arc<Mutex<Vec<BearerRef>>>,
    failure: Option<String>,
}

impl MockQaService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A service that rejects every submission with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub async fn submissions(&self) -> Vec<BearerRef> {
        self.submissions.lock().await.clone()
    }
}

#[async_trait]
impl QaService for MockQaService {
    async fn submit(&self, envelope: &BearerSnapshot) -> Result<String, QaError> {
        if let Some(message) = &self.failure {
            return Err(QaError::SubmissionFailed {
                message: message.clone(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.submissions.lock().await.push(envelope.bearer);
        let request_id = format!("qa-{id:04}");
        info!(envelope = %envelope.label, %request_id, "[QA RPC] sending envelope to QA");
        Ok(request_id)
    }
}
