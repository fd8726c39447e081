//! Error types for the reporting crate.

use reportek_workflow::{CallbackError, WorkflowError};
use std::fmt;

/// Failures while assembling the workflow catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    DuplicateWorkflow { name: String },
    /// A bundled definition could not be parsed.
    InvalidSpec { name: String, message: String },
    Misconfigured(WorkflowError),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateWorkflow { name } => {
                write!(f, "workflow '{name}' is already registered")
            }
            Self::InvalidSpec { name, message } => {
                write!(f, "invalid definition for workflow '{name}': {message}")
            }
            Self::Misconfigured(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Misconfigured(err) => Some(err),
            _ => None,
        }
    }
}

impl From<WorkflowError> for CatalogError {
    fn from(err: WorkflowError) -> Self {
        Self::Misconfigured(err)
    }
}

/// Failures talking to the QA service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QaError {
    SubmissionFailed { message: String },
}

impl fmt::Display for QaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubmissionFailed { message } => {
                write!(f, "QA submission failed: {message}")
            }
        }
    }
}

impl std::error::Error for QaError {}

impl From<QaError> for CallbackError {
    fn from(err: QaError) -> Self {
        CallbackError::external("qa", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qa_error_becomes_external_callback_error() {
        let err: CallbackError = QaError::SubmissionFailed {
            message: "timeout".into(),
        }
        .into();
        assert_eq!(
            err,
            CallbackError::external("qa", "QA submission failed: timeout")
        );
    }

    #[test]
    fn misconfigured_keeps_source() {
        let err = CatalogError::from(WorkflowError::StateDoesNotExist {
            state: "limbo".into(),
        });
        assert!(std::error::Error::source(&err).is_some());
    }
}
