//! HTTP-facing errors.
//!
//! Workflow errors map onto status codes the way clients of the envelope
//! API expect: unknown transitions are a bad request, refused ones are not
//! acceptable, lost races are a conflict.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use reportek_workflow::{StoreError, WorkflowError};
use std::fmt;

/// Errors returned by the API handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The actor headers are missing or malformed.
    InvalidActor { details: String },
    /// Only an administrator may do this.
    AdminRequired,
    InvalidId { id: String, reason: String },
    InvalidRequest { details: String },
    EnvelopeNotFound { id: String },
    /// The envelope references a workflow the catalog does not know.
    UnknownWorkflow { name: String },
    Workflow(WorkflowError),
    Store(StoreError),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidActor { details } => write!(f, "invalid actor: {details}"),
            Self::AdminRequired => write!(f, "admin access required"),
            Self::InvalidId { id, reason } => write!(f, "invalid id '{id}': {reason}"),
            Self::InvalidRequest { details } => write!(f, "invalid request: {details}"),
            Self::EnvelopeNotFound { id } => write!(f, "envelope '{id}' not found"),
            Self::UnknownWorkflow { name } => write!(f, "unknown workflow '{name}'"),
            Self::Workflow(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Persistence(store) => Self::from(store),
            other => Self::Workflow(other),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { bearer } => Self::EnvelopeNotFound {
                id: bearer.id_string(),
            },
            other => Self::Store(other),
        }
    }
}

/// Status code for a workflow error.
#[must_use]
pub fn workflow_status(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::TransitionDoesNotExist { .. } | WorkflowError::StateDoesNotExist { .. } => {
            StatusCode::BAD_REQUEST
        }
        WorkflowError::TransitionNotAvailable { .. } => StatusCode::NOT_ACCEPTABLE,
        WorkflowError::Conflict { .. } => StatusCode::CONFLICT,
        WorkflowError::Persistence(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        WorkflowError::MisconfiguredWorkflow { .. }
        | WorkflowError::DomainCallback { .. }
        | WorkflowError::CascadeDepthExceeded { .. }
        | WorkflowError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidActor { .. } | Self::InvalidId { .. } | Self::InvalidRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::AdminRequired => StatusCode::FORBIDDEN,
            Self::EnvelopeNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Workflow(err) => workflow_status(err),
            Self::UnknownWorkflow { .. } | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportek_core::EnvelopeId;
    use reportek_workflow::{BearerRef, Unavailable};

    #[test]
    fn workflow_errors_map_to_statuses() {
        let missing = WorkflowError::TransitionDoesNotExist {
            transition: "teleport".into(),
        };
        let refused = WorkflowError::TransitionNotAvailable {
            transition: "accept".into(),
            state: "draft".into(),
            reason: Unavailable::WrongState {
                current: "draft".into(),
            },
        };
        let conflict = WorkflowError::Conflict {
            bearer: BearerRef::Envelope(EnvelopeId::new()),
            attempts: 3,
        };

        assert_eq!(ApiError::from(missing).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(refused).status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(ApiError::from(conflict).status(), StatusCode::CONFLICT);
    }

    #[test]
    fn missing_bearer_is_not_found() {
        let id = EnvelopeId::new();
        let err = ApiError::from(WorkflowError::Persistence(StoreError::NotFound {
            bearer: BearerRef::Envelope(id),
        }));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), format!("envelope '{id}' not found"));
    }
}
