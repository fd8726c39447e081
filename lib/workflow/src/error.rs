//! Error types for the workflow crate.
//!
//! - `Misconfiguration`: why a definition was rejected at load time
//! - `Unavailable`: why a guard refused a transition
//! - `CallbackError`: failures raised by transition implementations and hooks
//! - `StoreError` / `NotifyError`: failures at the persistence and publish seams
//! - `WorkflowError`: everything the runtime hands back to its caller

use crate::actor::ActorKind;
use crate::instance::BearerRef;
use std::fmt;

/// A structural problem found in a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Misconfiguration {
    InitialStateMissing { state: String },
    FinalStateMissing { state: String },
    /// The attracting components of the transition graph are not exactly
    /// the final state. `found` lists each component's states.
    InvalidEndStates {
        found: Vec<Vec<String>>,
        expected: String,
    },
    EmptySources { transition: String },
    DuplicateTransition { transition: String },
    /// A transition references a state outside an explicit state list.
    UnknownState { transition: String, state: String },
    /// An automatic on-enter hook names a transition that does not exist.
    UnknownAutoTransition { transition: String, target: String },
    /// A declared transition has no registered implementation.
    MissingImplementation { transition: String },
    UnknownUploadState { state: String },
}

impl fmt::Display for Misconfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitialStateMissing { state } => {
                write!(f, "initial state '{state}' not in states")
            }
            Self::FinalStateMissing { state } => {
                write!(f, "final state '{state}' not in states")
            }
            Self::InvalidEndStates { found, expected } => {
                write!(
                    f,
                    "invalid end state(s) {found:?}, expected only [\"{expected}\"]"
                )
            }
            Self::EmptySources { transition } => {
                write!(f, "transition '{transition}' has no source states")
            }
            Self::DuplicateTransition { transition } => {
                write!(f, "transition '{transition}' declared more than once")
            }
            Self::UnknownState { transition, state } => {
                write!(
                    f,
                    "transition '{transition}' references state '{state}' not in states"
                )
            }
            Self::UnknownAutoTransition { transition, target } => {
                write!(
                    f,
                    "transition '{transition}' automatically starts unknown transition '{target}'"
                )
            }
            Self::MissingImplementation { transition } => {
                write!(f, "transition '{transition}' has no implementation")
            }
            Self::UnknownUploadState { state } => {
                write!(f, "upload state '{state}' not in states")
            }
        }
    }
}

impl std::error::Error for Misconfiguration {}

/// Why a transition is not available to an actor right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// The current state is not one of the transition's sources.
    WrongState { current: String },
    ActorNotAllowed { actor: ActorKind },
    /// An automatic cascade owns the bearer.
    AssignedToSystem,
    /// The workflow requires an assignee and the bearer has none.
    NotAssigned,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongState { current } => write!(f, "not allowed from state '{current}'"),
            Self::ActorNotAllowed { actor } => write!(f, "not allowed for actor '{actor}'"),
            Self::AssignedToSystem => f.write_str("bearer is assigned to the system"),
            Self::NotAssigned => f.write_str("bearer is not assigned"),
        }
    }
}

impl std::error::Error for Unavailable {}

/// Failure raised by a transition implementation or an on-enter hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    Failed { message: String },
    /// A call to an external service (QA, conversion) failed.
    External { service: String, message: String },
}

impl CallbackError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::External {
            service: service.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { message } => f.write_str(message),
            Self::External { service, message } => write!(f, "{service}: {message}"),
        }
    }
}

impl std::error::Error for CallbackError {}

/// Errors from a [`BearerStore`](crate::store::BearerStore) or
/// [`HistoryLog`](crate::history::HistoryLog).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound { bearer: BearerRef },
    /// A history event with the same (timestamp, bearer, from, to) exists.
    Duplicate { bearer: BearerRef },
    Backend { message: String },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { bearer } => write!(f, "bearer not found: {bearer}"),
            Self::Duplicate { bearer } => write!(f, "duplicate history event for {bearer}"),
            Self::Backend { message } => write!(f, "store backend error: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from a [`Notifier`](crate::notify::Notifier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    ConnectionFailed { message: String },
    PublishFailed { message: String },
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { message } => write!(f, "connection failed: {message}"),
            Self::PublishFailed { message } => write!(f, "publish failed: {message}"),
        }
    }
}

impl std::error::Error for NotifyError {}

/// Errors returned by the workflow runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    MisconfiguredWorkflow {
        workflow: String,
        problem: Misconfiguration,
    },
    TransitionDoesNotExist { transition: String },
    TransitionNotAvailable {
        transition: String,
        state: String,
        reason: Unavailable,
    },
    StateDoesNotExist { state: String },
    /// The transition implementation failed; nothing was committed.
    DomainCallback {
        transition: String,
        source: CallbackError,
    },
    /// The compare-and-swap kept losing to concurrent writers.
    Conflict { bearer: BearerRef, attempts: u32 },
    CascadeDepthExceeded { limit: u32, transition: String },
    Persistence(StoreError),
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MisconfiguredWorkflow { workflow, problem } => {
                write!(f, "misconfigured workflow '{workflow}': {problem}")
            }
            Self::TransitionDoesNotExist { transition } => {
                write!(f, "transition '{transition}' does not exist")
            }
            Self::TransitionNotAvailable {
                transition,
                state,
                reason,
            } => {
                write!(
                    f,
                    "transition '{transition}' not available from '{state}': {reason}"
                )
            }
            Self::StateDoesNotExist { state } => write!(f, "state '{state}' does not exist"),
            Self::DomainCallback { transition, source } => {
                write!(f, "transition '{transition}' failed: {source}")
            }
            Self::Conflict { bearer, attempts } => {
                write!(
                    f,
                    "concurrent update on {bearer}, gave up after {attempts} attempt(s)"
                )
            }
            Self::CascadeDepthExceeded { limit, transition } => {
                write!(
                    f,
                    "automatic transition cascade exceeded {limit} steps at '{transition}'"
                )
            }
            Self::Persistence(e) => write!(f, "persistence error: {e}"),
        }
    }
}

impl std::error::Error for WorkflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MisconfiguredWorkflow { problem, .. } => Some(problem),
            Self::TransitionNotAvailable { reason, .. } => Some(reason),
            Self::DomainCallback { source, .. } => Some(source),
            Self::Persistence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        Self::Persistence(e)
    }
}
