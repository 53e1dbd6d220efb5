//! Projection cursor/offset persistence.
//!
//! Cursors track the last processed sequence number per (seller, aggregate)
//! stream for a named projection. This gives idempotent projections (replays
//! at or below the cursor are skipped), crash resume, and deterministic
//! rebuilds (clear cursors and replay from scratch).

use std::sync::Arc;

use marketpay_core::{AggregateId, SellerId};
use sqlx::{PgPool, Row};

/// Projection cursor store for persisting offsets.
pub trait ProjectionCursorStore: Send + Sync {
    /// Last processed sequence number for a (seller, aggregate, projection) stream.
    fn get_cursor(
        &self,
        seller_id: SellerId,
        aggregate_id: AggregateId,
        projection_name: &str,
    ) -> Option<u64>;

    /// Advance the cursor to a new sequence number.
    fn update_cursor(
        &self,
        seller_id: SellerId,
        aggregate_id: AggregateId,
        projection_name: &str,
        sequence_number: u64,
    );

    /// Clear all cursors for a projection (for rebuilds).
    fn clear_cursors(&self, projection_name: &str);
}

/// In-memory cursor store (no persistence); projections keep their own
/// in-process cursor map on top of this, so it is a no-op.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore;

impl ProjectionCursorStore for InMemoryCursorStore {
    fn get_cursor(
        &self,
        _seller_id: SellerId,
        _aggregate_id: AggregateId,
        _projection_name: &str,
    ) -> Option<u64> {
        None
    }

    fn update_cursor(
        &self,
        _seller_id: SellerId,
        _aggregate_id: AggregateId,
        _projection_name: &str,
        _sequence_number: u64,
    ) {
        // no-op
    }

    fn clear_cursors(&self, _projection_name: &str) {
        // no-op
    }
}

/// Postgres-backed projection cursor store.
///
/// Expected schema:
///
/// ```sql
/// CREATE TABLE projection_offsets (
///     seller_id            UUID NOT NULL,
///     aggregate_id         UUID NOT NULL,
///     projection_name      TEXT NOT NULL,
///     last_sequence_number BIGINT NOT NULL,
///     updated_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (seller_id, aggregate_id, projection_name)
/// );
/// ```
#[derive(Debug)]
pub struct PostgresCursorStore {
    pool: Arc<PgPool>,
}

impl PostgresCursorStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn block_on<T>(fut: impl Future<Output = T>) -> Option<T> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        Some(tokio::task::block_in_place(|| handle.block_on(fut)))
    }
}

impl ProjectionCursorStore for PostgresCursorStore {
    fn get_cursor(
        &self,
        seller_id: SellerId,
        aggregate_id: AggregateId,
        projection_name: &str,
    ) -> Option<u64> {
        let pool = self.pool.clone();
        let seller_id = *seller_id.as_uuid();
        let aggregate_id = *aggregate_id.as_uuid();
        let projection_name = projection_name.to_string();

        Self::block_on(async move {
            let row = sqlx::query(
                r#"
                SELECT last_sequence_number
                FROM projection_offsets
                WHERE seller_id = $1 AND aggregate_id = $2 AND projection_name = $3
                "#,
            )
            .bind(seller_id)
            .bind(aggregate_id)
            .bind(&projection_name)
            .fetch_optional(&*pool)
            .await
            .ok()??;

            row.try_get::<i64, _>("last_sequence_number")
                .ok()
                .map(|seq| seq as u64)
        })?
    }

    fn update_cursor(
        &self,
        seller_id: SellerId,
        aggregate_id: AggregateId,
        projection_name: &str,
        sequence_number: u64,
    ) {
        let pool = self.pool.clone();
        let seller_id = *seller_id.as_uuid();
        let aggregate_id = *aggregate_id.as_uuid();
        let projection_name = projection_name.to_string();

        let _ = Self::block_on(async move {
            let _ = sqlx::query(
                r#"
                INSERT INTO projection_offsets (
                    seller_id, aggregate_id, projection_name, last_sequence_number
                )
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (seller_id, aggregate_id, projection_name)
                DO UPDATE SET
                    last_sequence_number = EXCLUDED.last_sequence_number,
                    updated_at = NOW()
                "#,
            )
            .bind(seller_id)
            .bind(aggregate_id)
            .bind(&projection_name)
            .bind(sequence_number as i64)
            .execute(&*pool)
            .await;
        });
    }

    fn clear_cursors(&self, projection_name: &str) {
        let pool = self.pool.clone();
        let projection_name = projection_name.to_string();

        let _ = Self::block_on(async move {
            let _ = sqlx::query(
                r#"
                DELETE FROM projection_offsets WHERE projection_name = $1
                "#,
            )
            .bind(&projection_name)
            .execute(&*pool)
            .await;
        });
    }
}
