//! Reporting domain for reportek.
//!
//! This crate provides:
//!
//! - **Envelope**: the bearer reporting workflows run on, plus its
//!   notification helpers
//! - **Reference workflow**: the bundled reporting workflow with its
//!   cascading QA chain
//! - **Auto QA**: the demo QA-driven workflow and the QA verdict handler
//! - **Catalog**: name to compiled workflow lookup

pub mod auto_qa;
pub mod catalog;
pub mod envelope;
pub mod error;
pub mod reference;

pub use auto_qa::{MockQaService, QaResult, QaService, QaWait, handle_qa_result};
pub use catalog::WorkflowCatalog;
pub use envelope::{AutoQaStatus, Envelope, FileChange, FileKind, announce_auto_qa_status, file_event};
pub use error::{CatalogError, QaError};
