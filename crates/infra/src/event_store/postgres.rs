//! Postgres-backed event store.
//!
//! Persists events append-only with seller isolation and optimistic
//! concurrency enforced at the database level.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE events (
//!     event_id        UUID PRIMARY KEY,
//!     seller_id       UUID NOT NULL,
//!     aggregate_id    UUID NOT NULL,
//!     aggregate_type  TEXT NOT NULL,
//!     sequence_number BIGINT NOT NULL CHECK (sequence_number > 0),
//!     event_type      TEXT NOT NULL,
//!     event_version   INT NOT NULL,
//!     occurred_at     TIMESTAMPTZ NOT NULL,
//!     payload         JSONB NOT NULL,
//!     created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     UNIQUE (seller_id, aggregate_id, sequence_number)
//! );
//! ```
//!
//! The unique constraint on `(seller_id, aggregate_id, sequence_number)` is
//! the backstop for concurrent appends: if another transaction commits
//! between the version check and the insert, the insert fails with a unique
//! violation (`23505`), surfaced as `EventStoreError::Concurrency`.

use sqlx::{PgPool, Row};
use std::sync::Arc;

use marketpay_core::{AggregateId, ExpectedVersion, SellerId};

use super::query::{EventFilter, EventQuery, EventQueryResult, Pagination};
use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Postgres-backed append-only event store.
///
/// Every query includes `seller_id` in the WHERE clause, so cross-seller
/// reads cannot happen by accident. All appends run inside a transaction:
/// version check, then insert, then commit.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Load all events for a seller + aggregate stream, sequence-ordered.
    pub async fn load_stream_async(
        &self,
        seller_id: SellerId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, seller_id, aggregate_id, aggregate_type,
                   sequence_number, event_type, event_version, occurred_at, payload
            FROM events
            WHERE seller_id = $1 AND aggregate_id = $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(seller_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows.iter().map(row_to_stored_event).collect()
    }

    /// Append events with the version check and inserts in one transaction.
    pub async fn append_async(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let seller_id = events[0].seller_id;
        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.seller_id != seller_id {
                return Err(EventStoreError::SellerIsolation(format!(
                    "batch contains multiple seller_ids (index {idx})"
                )));
            }
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let row = sqlx::query(
            r#"
            SELECT COALESCE(MAX(sequence_number), 0) AS current_version,
                   MAX(aggregate_type) AS aggregate_type
            FROM events
            WHERE seller_id = $1 AND aggregate_id = $2
            "#,
        )
        .bind(seller_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("version_check", e))?;

        let current_version: i64 = row
            .try_get("current_version")
            .map_err(|e| EventStoreError::InvalidAppend(e.to_string()))?;
        let existing_type: Option<String> = row
            .try_get("aggregate_type")
            .map_err(|e| EventStoreError::InvalidAppend(e.to_string()))?;
        let current_version = current_version as u64;

        if let Some(ref existing) = existing_type {
            if existing != &aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        if !expected_version.matches(current_version) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current_version}"
            )));
        }

        let mut next = current_version + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    event_id, seller_id, aggregate_id, aggregate_type,
                    sequence_number, event_type, event_version, occurred_at, payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(e.event_id)
            .bind(e.seller_id.as_uuid())
            .bind(e.aggregate_id.as_uuid())
            .bind(&e.aggregate_type)
            .bind(next as i64)
            .bind(&e.event_type)
            .bind(e.event_version as i32)
            .bind(e.occurred_at)
            .bind(&e.payload)
            .execute(&mut *tx)
            .await
            .map_err(|err| map_sqlx_error("insert", err))?;

            committed.push(StoredEvent {
                event_id: e.event_id,
                seller_id: e.seller_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            });
            next += 1;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        Ok(committed)
    }
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on_handle(self.append_async(events, expected_version))?
    }

    fn load_stream(
        &self,
        seller_id: SellerId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on_handle(self.load_stream_async(seller_id, aggregate_id))?
    }
}

#[async_trait::async_trait]
impl EventQuery for PostgresEventStore {
    async fn query_events(
        &self,
        seller_id: SellerId,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        // Full seller slice, filtered in-process. Event volumes per seller are
        // small (one stream per seller); revisit with SQL-side filters if that
        // stops being true.
        let rows = sqlx::query(
            r#"
            SELECT event_id, seller_id, aggregate_id, aggregate_type,
                   sequence_number, event_type, event_version, occurred_at, payload
            FROM events
            WHERE seller_id = $1
            ORDER BY occurred_at DESC, sequence_number ASC
            "#,
        )
        .bind(seller_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_events", e))?;

        let matching: Vec<StoredEvent> = rows
            .iter()
            .map(row_to_stored_event)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();

        let total = matching.len() as u64;
        let start = (pagination.offset as usize).min(matching.len());
        let end = (start + pagination.limit as usize).min(matching.len());
        let events = matching[start..end].to_vec();
        let has_more = (end as u64) < total;

        Ok(EventQueryResult {
            events,
            total,
            pagination,
            has_more,
        })
    }

    async fn get_event_by_id(
        &self,
        seller_id: SellerId,
        event_id: uuid::Uuid,
    ) -> Result<Option<StoredEvent>, EventStoreError> {
        let row = sqlx::query(
            r#"
            SELECT event_id, seller_id, aggregate_id, aggregate_type,
                   sequence_number, event_type, event_version, occurred_at, payload
            FROM events
            WHERE seller_id = $1 AND event_id = $2
            "#,
        )
        .bind(seller_id.as_uuid())
        .bind(event_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_event_by_id", e))?;

        row.as_ref().map(row_to_stored_event).transpose()
    }
}

/// Bridge the sync `EventStore` trait onto the async sqlx calls.
///
/// Requires a tokio runtime on the calling thread's context; the API binary
/// always has one.
fn block_on_handle<T>(
    fut: impl Future<Output = Result<T, EventStoreError>>,
) -> Result<Result<T, EventStoreError>, EventStoreError> {
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        EventStoreError::InvalidAppend("no tokio runtime available for postgres store".to_string())
    })?;
    Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
}

fn row_to_stored_event(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let invalid = |e: sqlx::Error| EventStoreError::InvalidAppend(format!("bad event row: {e}"));

    let sequence_number: i64 = row.try_get("sequence_number").map_err(invalid)?;
    let event_version: i32 = row.try_get("event_version").map_err(invalid)?;

    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(invalid)?,
        seller_id: SellerId::from_uuid(row.try_get("seller_id").map_err(invalid)?),
        aggregate_id: AggregateId::from_uuid(row.try_get("aggregate_id").map_err(invalid)?),
        aggregate_type: row.try_get("aggregate_type").map_err(invalid)?,
        sequence_number: sequence_number as u64,
        event_type: row.try_get("event_type").map_err(invalid)?,
        event_version: event_version as u32,
        occurred_at: row.try_get("occurred_at").map_err(invalid)?,
        payload: row.try_get("payload").map_err(invalid)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        // 23505 = unique violation: a concurrent append won the race.
        if db_err.code().as_deref() == Some("23505") {
            return EventStoreError::Concurrency(format!("{operation}: {db_err}"));
        }
    }
    EventStoreError::InvalidAppend(format!("{operation}: {err}"))
}
