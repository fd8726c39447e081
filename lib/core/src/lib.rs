//! Core identifiers and shared utilities for the reportek platform.
//!
//! Every other crate in the workspace depends on this one for the
//! strongly-typed identifiers of envelopes, users, workflow instances and
//! history entries, and for the rootcause-based `Result` alias.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{EnvelopeId, ParseIdError, TransitionEventId, UserId, WorkflowInstanceId};
