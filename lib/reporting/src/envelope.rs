//! The envelope: the bearer every reporting workflow runs on.
//!
//! An envelope groups the files of one delivery. Its workflow position lives
//! in a [`WorkflowInstance`]; the engine only ever sees it through a
//! [`BearerSnapshot`].

use reportek_core::EnvelopeId;
use reportek_workflow::{
    Assignment, BearerEvent, BearerRef, BearerSnapshot, Notification, Notifier, NotifyError,
    WorkflowDefinition, WorkflowInstance,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A reporting envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: EnvelopeId,
    pub name: String,
    pub assignment: Assignment,
    pub finalized: bool,
    pub auto_qa_complete: bool,
    pub auto_qa_ok: bool,
    pub workflow: WorkflowInstance,
}

impl Envelope {
    /// Creates an unassigned envelope on the definition's initial state.
    #[must_use]
    pub fn new(name: impl Into<String>, definition: &WorkflowDefinition) -> Self {
        Self {
            id: EnvelopeId::new(),
            name: name.into(),
            assignment: Assignment::Unassigned,
            finalized: false,
            auto_qa_complete: false,
            auto_qa_ok: false,
            workflow: WorkflowInstance::new(definition),
        }
    }

    #[must_use]
    pub fn bearer(&self) -> BearerRef {
        BearerRef::Envelope(self.id)
    }

    /// The engine's view of this envelope.
    #[must_use]
    pub fn snapshot(&self) -> BearerSnapshot {
        let mut snapshot = BearerSnapshot::new(self.bearer(), &self.name, self.workflow.clone())
            .with_assignment(self.assignment);
        snapshot.finalized = self.finalized;
        snapshot
    }

    /// Name of the per-envelope notification group.
    #[must_use]
    pub fn channel(&self) -> String {
        format!("envelope_{}", self.id)
    }

    #[must_use]
    pub fn auto_qa_status(&self) -> AutoQaStatus {
        AutoQaStatus {
            auto_qa_complete: self.auto_qa_complete,
            auto_qa_ok: self.auto_qa_ok,
        }
    }

    /// Records the outcome of an automatic QA run.
    pub fn record_auto_qa(&mut self, ok: bool) {
        self.auto_qa_complete = true;
        self.auto_qa_ok = ok;
    }
}

/// Payload of the auto QA notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoQaStatus {
    pub auto_qa_complete: bool,
    pub auto_qa_ok: bool,
}

/// Publishes the envelope's auto QA status under `event`.
///
/// # Errors
///
/// Returns the notifier's error; callers usually log and carry on.
pub async fn announce_auto_qa_status(
    notifier: &dyn Notifier,
    envelope: &Envelope,
    event: BearerEvent,
) -> Result<(), NotifyError> {
    let status = envelope.auto_qa_status();
    debug!(
        envelope = %envelope.id,
        %event,
        complete = status.auto_qa_complete,
        ok = status.auto_qa_ok,
        "announcing auto QA status"
    );
    let data = serde_json::to_value(status).map_err(|e| NotifyError::PublishFailed {
        message: e.to_string(),
    })?;
    notifier
        .publish(Notification::new(envelope.bearer(), event, data))
        .await
}

/// Which of an envelope's file collections changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Original,
    Support,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    Added,
    Changed,
    Deleted,
}

/// The notification event for a file change.
#[must_use]
pub fn file_event(kind: FileKind, change: FileChange) -> BearerEvent {
    match (kind, change) {
        (FileKind::Regular, FileChange::Added) => BearerEvent::AddedFile,
        (FileKind::Regular, FileChange::Changed) => BearerEvent::ChangedFile,
        (FileKind::Regular, FileChange::Deleted) => BearerEvent::DeletedFile,
        (FileKind::Original, FileChange::Added) => BearerEvent::AddedOriginalFile,
        (FileKind::Original, FileChange::Changed) => BearerEvent::ChangedOriginalFile,
        (FileKind::Original, FileChange::Deleted) => BearerEvent::DeletedOriginalFile,
        (FileKind::Support, FileChange::Added) => BearerEvent::AddedSupportFile,
        (FileKind::Support, FileChange::Changed) => BearerEvent::ChangedSupportFile,
        (FileKind::Support, FileChange::Deleted) => BearerEvent::DeletedSupportFile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportek_core::UserId;
    use reportek_workflow::memory::RecordingNotifier;
    use reportek_workflow::{WorkflowState, WorkflowTransition, noop};

    fn definition() -> WorkflowDefinition {
        let draft = WorkflowState::new("draft", "Draft");
        WorkflowDefinition::builder("tiny", draft.clone())
            .transition(WorkflowTransition::new(
                "submit",
                [draft],
                WorkflowState::new("end", "End"),
                noop(),
            ))
            .build()
    }

    #[test]
    fn new_envelope_starts_on_initial_state() {
        let envelope = Envelope::new("Q1 deliveries", &definition());
        assert_eq!(envelope.workflow.current_state, "draft");
        assert_eq!(envelope.workflow.workflow, "tiny");
        assert!(!envelope.finalized);
        assert_eq!(envelope.assignment, Assignment::Unassigned);
    }

    #[test]
    fn snapshot_carries_assignment_and_finalized() {
        let mut envelope = Envelope::new("Q1", &definition());
        let user = UserId::new();
        envelope.assignment = Assignment::User(user);
        envelope.finalized = true;

        let snapshot = envelope.snapshot();
        assert_eq!(snapshot.bearer, BearerRef::Envelope(envelope.id));
        assert_eq!(snapshot.label, "Q1");
        assert_eq!(snapshot.assignment, Assignment::User(user));
        assert!(snapshot.finalized);
        assert_eq!(snapshot.current_state(), "draft");
    }

    #[test]
    fn channel_is_per_envelope() {
        let envelope = Envelope::new("Q1", &definition());
        assert_eq!(envelope.channel(), format!("envelope_{}", envelope.id));
    }

    #[tokio::test]
    async fn announces_auto_qa_status() {
        let notifier = RecordingNotifier::new();
        let mut envelope = Envelope::new("Q1", &definition());
        envelope.record_auto_qa(true);

        announce_auto_qa_status(&notifier, &envelope, BearerEvent::CompletedAutoQa)
            .await
            .expect("publish");

        let sent = notifier.notifications().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic.as_str(), "envelope.completed_auto_qa");
        assert_eq!(
            sent[0].data,
            serde_json::json!({"auto_qa_complete": true, "auto_qa_ok": true})
        );
    }

    #[test]
    fn file_events_cover_each_collection() {
        assert_eq!(
            file_event(FileKind::Regular, FileChange::Added),
            BearerEvent::AddedFile
        );
        assert_eq!(
            file_event(FileKind::Original, FileChange::Deleted),
            BearerEvent::DeletedOriginalFile
        );
        assert_eq!(
            file_event(FileKind::Support, FileChange::Changed),
            BearerEvent::ChangedSupportFile
        );
    }
}
