//! PostgreSQL persistence for envelopes and their transition history.
//!
//! - [`PgEnvelopeStore`]: envelope records, doubling as the engine's
//!   [`BearerStore`](reportek_workflow::BearerStore)
//! - [`PgHistoryLog`]: the append-only transition log

pub mod envelope;
pub mod history;

pub use envelope::PgEnvelopeStore;
pub use history::PgHistoryLog;

use async_trait::async_trait;
use reportek_core::EnvelopeId;
use reportek_reporting::Envelope;
use reportek_workflow::{BearerRef, StoreError};

/// Envelope records beyond what the engine reads and writes.
#[async_trait]
pub trait EnvelopeStore: Send + Sync {
    /// Inserts a new envelope. Fails with `Duplicate` if the id is taken.
    async fn create(&self, envelope: &Envelope) -> Result<(), StoreError>;

    async fn get(&self, id: EnvelopeId) -> Result<Envelope, StoreError>;

    /// Stores the outcome of an automatic QA run and returns the updated
    /// envelope.
    async fn record_auto_qa(&self, id: EnvelopeId, ok: bool) -> Result<Envelope, StoreError>;
}

fn envelope_id(bearer: BearerRef) -> EnvelopeId {
    match bearer {
        BearerRef::Envelope(id) => id,
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::backend(err.to_string())
}

fn decode_error(column: &str, value: &str, reason: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {column} '{value}': {reason}"),
    )))
}
