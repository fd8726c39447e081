//! Transition history.

use super::{backend, decode_error, envelope_id};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reportek_core::{EnvelopeId, TransitionEventId};
use reportek_workflow::{BearerRef, HistoryLog, NewTransitionEvent, StoreError, TransitionEvent};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tracing::instrument;

/// Row type for history queries.
#[derive(FromRow)]
struct EventRow {
    id: String,
    envelope_id: String,
    occurred_at: DateTime<Utc>,
    transition: String,
    from_state: String,
    to_state: String,
    extra: Option<serde_json::Value>,
}

impl EventRow {
    fn try_into_event(self) -> Result<TransitionEvent, sqlx::Error> {
        let id = TransitionEventId::from_str(&self.id)
            .map_err(|e| decode_error("transition event id", &self.id, e))?;
        let envelope = EnvelopeId::from_str(&self.envelope_id)
            .map_err(|e| decode_error("envelope id", &self.envelope_id, e))?;

        Ok(TransitionEvent {
            id,
            timestamp: self.occurred_at,
            bearer: BearerRef::Envelope(envelope),
            transition: self.transition,
            from_state: self.from_state,
            to_state: self.to_state,
            extra: self.extra,
        })
    }
}

/// History log backed by PostgreSQL.
#[derive(Clone)]
pub struct PgHistoryLog {
    pool: PgPool,
}

impl PgHistoryLog {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryLog for PgHistoryLog {
    /// Timestamps come from the database clock and are bumped past the
    /// envelope's latest event, so time order is commit order.
    #[instrument(skip(self, event), fields(bearer = %event.bearer, transition = %event.transition))]
    async fn record(&self, event: NewTransitionEvent) -> Result<TransitionEvent, StoreError> {
        let bearer = event.bearer;
        let row: EventRow = sqlx::query_as(
            r#"
            INSERT INTO transition_events
                (id, envelope_id, occurred_at, transition, from_state, to_state, extra)
            VALUES (
                $1, $2,
                GREATEST(
                    clock_timestamp(),
                    (SELECT max(occurred_at) + interval '1 microsecond'
                     FROM transition_events WHERE envelope_id = $2)
                ),
                $3, $4, $5, $6
            )
            RETURNING id, envelope_id, occurred_at, transition, from_state, to_state, extra
            "#,
        )
        .bind(TransitionEventId::new().to_string())
        .bind(envelope_id(bearer).to_string())
        .bind(&event.transition)
        .bind(&event.from_state)
        .bind(&event.to_state)
        .bind(&event.extra)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if duplicate {
                StoreError::Duplicate { bearer }
            } else {
                backend(e)
            }
        })?;

        row.try_into_event().map_err(backend)
    }

    async fn latest(&self, bearer: BearerRef) -> Result<Option<TransitionEvent>, StoreError> {
        let row: Option<EventRow> = sqlx::query_as(
            r#"
            SELECT id, envelope_id, occurred_at, transition, from_state, to_state, extra
            FROM transition_events
            WHERE envelope_id = $1
            ORDER BY occurred_at DESC, transition ASC
            LIMIT 1
            "#,
        )
        .bind(envelope_id(bearer).to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(EventRow::try_into_event)
            .transpose()
            .map_err(backend)
    }

    async fn list(&self, bearer: BearerRef) -> Result<Vec<TransitionEvent>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT id, envelope_id, occurred_at, transition, from_state, to_state, extra
            FROM transition_events
            WHERE envelope_id = $1
            ORDER BY occurred_at ASC
            "#,
        )
        .bind(envelope_id(bearer).to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(EventRow::try_into_event)
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)
    }
}
