//! Envelope records.

use super::{EnvelopeStore, backend, decode_error, envelope_id};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reportek_core::{EnvelopeId, UserId, WorkflowInstanceId};
use reportek_reporting::Envelope;
use reportek_workflow::{Assignment, BearerRef, BearerSnapshot, BearerStore, StoreError, WorkflowInstance};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tracing::{debug, instrument};

const SELECT_ENVELOPE: &str = r#"
    SELECT id, name, assignment_kind, assigned_user, finalized, auto_qa_complete,
           auto_qa_ok, workflow_id, workflow_name, current_state, previous_state,
           created_at, updated_at
    FROM envelopes
    WHERE id = $1
"#;

/// Row type for envelope queries.
#[derive(FromRow)]
struct EnvelopeRow {
    id: String,
    name: String,
    assignment_kind: String,
    assigned_user: Option<String>,
    finalized: bool,
    auto_qa_complete: bool,
    auto_qa_ok: bool,
    workflow_id: String,
    workflow_name: String,
    current_state: String,
    previous_state: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EnvelopeRow {
    fn try_into_envelope(self) -> Result<Envelope, sqlx::Error> {
        let id = EnvelopeId::from_str(&self.id)
            .map_err(|e| decode_error("envelope id", &self.id, e))?;
        let workflow_id = WorkflowInstanceId::from_str(&self.workflow_id)
            .map_err(|e| decode_error("workflow instance id", &self.workflow_id, e))?;
        let assignment = decode_assignment(&self.assignment_kind, self.assigned_user.as_deref())?;

        Ok(Envelope {
            id,
            name: self.name,
            assignment,
            finalized: self.finalized,
            auto_qa_complete: self.auto_qa_complete,
            auto_qa_ok: self.auto_qa_ok,
            workflow: WorkflowInstance {
                id: workflow_id,
                workflow: self.workflow_name,
                current_state: self.current_state,
                previous_state: self.previous_state,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
        })
    }
}

fn decode_assignment(kind: &str, user: Option<&str>) -> Result<Assignment, sqlx::Error> {
    match (kind, user) {
        ("unassigned", _) => Ok(Assignment::Unassigned),
        ("system", _) => Ok(Assignment::System),
        ("user", Some(user)) => UserId::from_str(user)
            .map(Assignment::User)
            .map_err(|e| decode_error("assigned user", user, e)),
        (kind, _) => Err(decode_error("assignment", kind, "unknown kind or missing user")),
    }
}

fn encode_assignment(assignment: Assignment) -> (&'static str, Option<String>) {
    match assignment {
        Assignment::Unassigned => ("unassigned", None),
        Assignment::User(user) => ("user", Some(user.to_string())),
        Assignment::System => ("system", None),
    }
}

/// Envelope repository backed by PostgreSQL.
#[derive(Clone)]
pub struct PgEnvelopeStore {
    pool: PgPool,
}

impl PgEnvelopeStore {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find(&self, id: EnvelopeId) -> Result<Option<Envelope>, sqlx::Error> {
        let row: Option<EnvelopeRow> = sqlx::query_as(SELECT_ENVELOPE)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(EnvelopeRow::try_into_envelope).transpose()
    }

    async fn exists(&self, id: EnvelopeId) -> Result<bool, sqlx::Error> {
        let found: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM envelopes WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Maps "no row touched" to `NotFound`.
    fn expect_row(bearer: BearerRef, rows_affected: u64) -> Result<(), StoreError> {
        if rows_affected == 0 {
            return Err(StoreError::NotFound { bearer });
        }
        Ok(())
    }
}

#[async_trait]
impl EnvelopeStore for PgEnvelopeStore {
    #[instrument(skip(self, envelope), fields(envelope = %envelope.id))]
    async fn create(&self, envelope: &Envelope) -> Result<(), StoreError> {
        let (assignment_kind, assigned_user) = encode_assignment(envelope.assignment);

        sqlx::query(
            r#"
            INSERT INTO envelopes
                (id, name, assignment_kind, assigned_user, finalized, auto_qa_complete,
                 auto_qa_ok, workflow_id, workflow_name, current_state, previous_state,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(envelope.id.to_string())
        .bind(&envelope.name)
        .bind(assignment_kind)
        .bind(assigned_user)
        .bind(envelope.finalized)
        .bind(envelope.auto_qa_complete)
        .bind(envelope.auto_qa_ok)
        .bind(envelope.workflow.id.to_string())
        .bind(&envelope.workflow.workflow)
        .bind(&envelope.workflow.current_state)
        .bind(&envelope.workflow.previous_state)
        .bind(envelope.workflow.created_at)
        .bind(envelope.workflow.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if duplicate {
                StoreError::Duplicate {
                    bearer: envelope.bearer(),
                }
            } else {
                backend(e)
            }
        })?;

        debug!("created envelope");
        Ok(())
    }

    async fn get(&self, id: EnvelopeId) -> Result<Envelope, StoreError> {
        self.find(id).await.map_err(backend)?.ok_or(StoreError::NotFound {
            bearer: BearerRef::Envelope(id),
        })
    }

    async fn record_auto_qa(&self, id: EnvelopeId, ok: bool) -> Result<Envelope, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE envelopes
            SET auto_qa_complete = TRUE, auto_qa_ok = $2
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(ok)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Self::expect_row(BearerRef::Envelope(id), result.rows_affected())?;

        self.get(id).await
    }
}

#[async_trait]
impl BearerStore for PgEnvelopeStore {
    async fn load(&self, bearer: BearerRef) -> Result<BearerSnapshot, StoreError> {
        let envelope = self.get(envelope_id(bearer)).await?;
        Ok(envelope.snapshot())
    }

    #[instrument(skip(self), fields(bearer = %bearer))]
    async fn swap_state(
        &self,
        bearer: BearerRef,
        expected: &str,
        target: &str,
    ) -> Result<bool, StoreError> {
        let id = envelope_id(bearer);
        let result = sqlx::query(
            r#"
            UPDATE envelopes
            SET previous_state = current_state, current_state = $3, updated_at = now()
            WHERE id = $1 AND current_state = $2
            "#,
        )
        .bind(id.to_string())
        .bind(expected)
        .bind(target)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            debug!("persisted state");
            return Ok(true);
        }
        if !self.exists(id).await.map_err(backend)? {
            return Err(StoreError::NotFound { bearer });
        }
        Ok(false)
    }

    async fn set_assignment(
        &self,
        bearer: BearerRef,
        assignment: Assignment,
    ) -> Result<(), StoreError> {
        let (assignment_kind, assigned_user) = encode_assignment(assignment);
        let result = sqlx::query(
            r#"
            UPDATE envelopes
            SET assignment_kind = $2, assigned_user = $3
            WHERE id = $1
            "#,
        )
        .bind(envelope_id(bearer).to_string())
        .bind(assignment_kind)
        .bind(assigned_user)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Self::expect_row(bearer, result.rows_affected())
    }

    async fn set_finalized(&self, bearer: BearerRef, finalized: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE envelopes SET finalized = $2 WHERE id = $1")
            .bind(envelope_id(bearer).to_string())
            .bind(finalized)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Self::expect_row(bearer, result.rows_affected())
    }

    #[instrument(skip(self), fields(bearer = %bearer))]
    async fn force_state(&self, bearer: BearerRef, state: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE envelopes
            SET previous_state = current_state, current_state = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(envelope_id(bearer).to_string())
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Self::expect_row(bearer, result.rows_affected())
    }
}
