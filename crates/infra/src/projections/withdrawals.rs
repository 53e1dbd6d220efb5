//! Withdrawal queue projection.
//!
//! Read model of withdrawal requests across sellers: the admin payout screen
//! lists pending requests from here, and `resolveWithdrawal(requestId, …)` is
//! routed to the owning seller through this index.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use marketpay_core::{AggregateId, SellerId};
use marketpay_events::EventEnvelope;
use marketpay_ledger::{ACCOUNT_AGGREGATE_TYPE, AccountEvent, WithdrawalId, WithdrawalStatus};

use crate::projections::cursor_store::ProjectionCursorStore;
use crate::read_model::ReadModelStore;

/// Read model: one withdrawal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalReadModel {
    pub withdrawal_id: WithdrawalId,
    pub seller_id: SellerId,
    pub amount: u64,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    seller_id: SellerId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum WithdrawalProjectionError {
    #[error("failed to deserialize account event: {0}")]
    Deserialize(String),

    #[error("seller isolation violation: {0}")]
    SellerIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projection: account events → withdrawal queue.
#[derive(Debug)]
pub struct WithdrawalQueueProjection<S, C = super::InMemoryCursorStore>
where
    S: ReadModelStore<WithdrawalId, WithdrawalReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
    cursor_store: Option<Arc<C>>,
    projection_name: String,
}

impl<S> WithdrawalQueueProjection<S>
where
    S: ReadModelStore<WithdrawalId, WithdrawalReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            cursor_store: None,
            projection_name: "withdrawals.queue".to_string(),
        }
    }

    pub fn with_persistent_cursors<C: ProjectionCursorStore + 'static>(
        self,
        cursor_store: Arc<C>,
        projection_name: impl Into<String>,
    ) -> WithdrawalQueueProjection<S, C> {
        WithdrawalQueueProjection {
            store: self.store,
            cursors: RwLock::new(HashMap::new()),
            cursor_store: Some(cursor_store),
            projection_name: projection_name.into(),
        }
    }
}

impl<S, C> WithdrawalQueueProjection<S, C>
where
    S: ReadModelStore<WithdrawalId, WithdrawalReadModel>,
    C: ProjectionCursorStore + 'static,
{
    fn get_cursor(&self, seller_id: SellerId, aggregate_id: AggregateId) -> u64 {
        if let Some(ref cursor_store) = self.cursor_store {
            cursor_store
                .get_cursor(seller_id, aggregate_id, &self.projection_name)
                .unwrap_or(0)
        } else {
            match self.cursors.read() {
                Ok(cursors) => *cursors
                    .get(&CursorKey {
                        seller_id,
                        aggregate_id,
                    })
                    .unwrap_or(&0),
                Err(_) => 0,
            }
        }
    }

    fn update_cursor(&self, seller_id: SellerId, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                CursorKey {
                    seller_id,
                    aggregate_id,
                },
                sequence_number,
            );
        }

        if let Some(ref cursor_store) = self.cursor_store {
            cursor_store.update_cursor(
                seller_id,
                aggregate_id,
                &self.projection_name,
                sequence_number,
            );
        }
    }

    /// Look up a withdrawal request.
    pub fn get(&self, withdrawal_id: &WithdrawalId) -> Option<WithdrawalReadModel> {
        self.store.get(withdrawal_id)
    }

    /// All requests for one seller, optionally filtered by status.
    pub fn list_for_seller(
        &self,
        seller_id: SellerId,
        status: Option<WithdrawalStatus>,
    ) -> Vec<WithdrawalReadModel> {
        let mut items: Vec<WithdrawalReadModel> = self
            .store
            .list()
            .into_iter()
            .filter(|rm| rm.seller_id == seller_id)
            .filter(|rm| status.is_none_or(|s| rm.status == s))
            .collect();
        items.sort_by_key(|rm| rm.requested_at);
        items
    }

    /// All pending requests across sellers (the payout work queue).
    pub fn list_pending(&self) -> Vec<WithdrawalReadModel> {
        let mut items: Vec<WithdrawalReadModel> = self
            .store
            .list()
            .into_iter()
            .filter(|rm| rm.status == WithdrawalStatus::Pending)
            .collect();
        items.sort_by_key(|rm| rm.requested_at);
        items
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), WithdrawalProjectionError> {
        if envelope.aggregate_type() != ACCOUNT_AGGREGATE_TYPE {
            return Ok(());
        }

        let seller_id = envelope.seller_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.get_cursor(seller_id, aggregate_id);

        if seq == 0 {
            return Err(WithdrawalProjectionError::NonMonotonicSequence { last, found: seq });
        }

        if seq <= last {
            return Ok(());
        }

        if seq != last + 1 && last != 0 {
            return Err(WithdrawalProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: AccountEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| WithdrawalProjectionError::Deserialize(e.to_string()))?;

        if ev.seller_id() != seller_id {
            return Err(WithdrawalProjectionError::SellerIsolation(
                "event seller_id does not match envelope seller_id".to_string(),
            ));
        }

        match ev {
            AccountEvent::WithdrawalRequested(e) => {
                self.store.upsert(
                    e.withdrawal_id,
                    WithdrawalReadModel {
                        withdrawal_id: e.withdrawal_id,
                        seller_id: e.seller_id,
                        amount: e.amount,
                        status: WithdrawalStatus::Pending,
                        requested_at: e.occurred_at,
                        resolved_at: None,
                    },
                );
            }
            AccountEvent::WithdrawalCompleted(e) => {
                if let Some(mut rm) = self.store.get(&e.withdrawal_id) {
                    rm.status = WithdrawalStatus::Completed;
                    rm.resolved_at = Some(e.occurred_at);
                    self.store.upsert(e.withdrawal_id, rm);
                }
            }
            AccountEvent::WithdrawalRejected(e) => {
                if let Some(mut rm) = self.store.get(&e.withdrawal_id) {
                    rm.status = WithdrawalStatus::Rejected;
                    rm.resolved_at = Some(e.occurred_at);
                    self.store.upsert(e.withdrawal_id, rm);
                }
            }
            AccountEvent::CommissionRecorded(_)
            | AccountEvent::RevenueConfirmed(_)
            | AccountEvent::CommissionVoided(_) => {}
        }

        self.update_cursor(seller_id, aggregate_id, seq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryReadModelStore;
    use marketpay_ledger::{WithdrawalCompleted, WithdrawalRequested};

    fn make_envelope(seller_id: SellerId, seq: u64, event: AccountEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            uuid::Uuid::now_v7(),
            seller_id,
            seller_id.account_aggregate(),
            ACCOUNT_AGGREGATE_TYPE.to_string(),
            seq,
            serde_json::to_value(&event).unwrap(),
        )
    }

    #[test]
    fn tracks_request_through_completion() {
        let store =
            Arc::new(InMemoryReadModelStore::<WithdrawalId, WithdrawalReadModel>::new());
        let proj = WithdrawalQueueProjection::new(store.clone());

        let seller_id = SellerId::new();
        let withdrawal_id = WithdrawalId::new();

        proj.apply_envelope(&make_envelope(
            seller_id,
            1,
            AccountEvent::WithdrawalRequested(WithdrawalRequested {
                seller_id,
                withdrawal_id,
                amount: 400,
                occurred_at: Utc::now(),
            }),
        ))
        .unwrap();

        assert_eq!(proj.list_pending().len(), 1);

        proj.apply_envelope(&make_envelope(
            seller_id,
            2,
            AccountEvent::WithdrawalCompleted(WithdrawalCompleted {
                seller_id,
                withdrawal_id,
                amount: 400,
                occurred_at: Utc::now(),
            }),
        ))
        .unwrap();

        let rm = proj.get(&withdrawal_id).unwrap();
        assert_eq!(rm.status, WithdrawalStatus::Completed);
        assert!(rm.resolved_at.is_some());
        assert!(proj.list_pending().is_empty());
    }
}
