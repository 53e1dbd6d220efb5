//! Order directory projection.
//!
//! Maps `order_id → seller + earned-commission status`. Revenue confirmation
//! is keyed by order only, so this read model is what routes a confirmation
//! to the right seller's account stream.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use marketpay_core::{AggregateId, OrderId, SellerId};
use marketpay_events::EventEnvelope;
use marketpay_ledger::{ACCOUNT_AGGREGATE_TYPE, AccountEvent, CommissionKind, CommissionStatus};

use crate::projections::cursor_store::ProjectionCursorStore;
use crate::read_model::ReadModelStore;

/// Read model: the earned commission recorded for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCommissionReadModel {
    pub order_id: OrderId,
    pub seller_id: SellerId,
    pub amount: u64,
    pub status: CommissionStatus,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    seller_id: SellerId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum OrderProjectionError {
    #[error("failed to deserialize account event: {0}")]
    Deserialize(String),

    #[error("seller isolation violation: {0}")]
    SellerIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projection: account events → order directory.
#[derive(Debug)]
pub struct OrderDirectoryProjection<S, C = super::InMemoryCursorStore>
where
    S: ReadModelStore<OrderId, OrderCommissionReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
    cursor_store: Option<Arc<C>>,
    projection_name: String,
}

impl<S> OrderDirectoryProjection<S>
where
    S: ReadModelStore<OrderId, OrderCommissionReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            cursor_store: None,
            projection_name: "orders.directory".to_string(),
        }
    }

    pub fn with_persistent_cursors<C: ProjectionCursorStore + 'static>(
        self,
        cursor_store: Arc<C>,
        projection_name: impl Into<String>,
    ) -> OrderDirectoryProjection<S, C> {
        OrderDirectoryProjection {
            store: self.store,
            cursors: RwLock::new(HashMap::new()),
            cursor_store: Some(cursor_store),
            projection_name: projection_name.into(),
        }
    }
}

impl<S, C> OrderDirectoryProjection<S, C>
where
    S: ReadModelStore<OrderId, OrderCommissionReadModel>,
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

    /// Look up the commission recorded for an order.
    pub fn get(&self, order_id: &OrderId) -> Option<OrderCommissionReadModel> {
        self.store.get(order_id)
    }

    /// All orders known to the directory.
    pub fn list(&self) -> Vec<OrderCommissionReadModel> {
        self.store.list()
    }

    /// Orders for one seller, optionally filtered by commission status.
    pub fn list_for_seller(
        &self,
        seller_id: SellerId,
        status: Option<CommissionStatus>,
    ) -> Vec<OrderCommissionReadModel> {
        self.store
            .list()
            .into_iter()
            .filter(|rm| rm.seller_id == seller_id)
            .filter(|rm| status.is_none_or(|s| rm.status == s))
            .collect()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), OrderProjectionError> {
        if envelope.aggregate_type() != ACCOUNT_AGGREGATE_TYPE {
            return Ok(());
        }

        let seller_id = envelope.seller_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.get_cursor(seller_id, aggregate_id);

        if seq == 0 {
            return Err(OrderProjectionError::NonMonotonicSequence { last, found: seq });
        }

        if seq <= last {
            return Ok(());
        }

        if seq != last + 1 && last != 0 {
            return Err(OrderProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: AccountEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| OrderProjectionError::Deserialize(e.to_string()))?;

        if ev.seller_id() != seller_id {
            return Err(OrderProjectionError::SellerIsolation(
                "event seller_id does not match envelope seller_id".to_string(),
            ));
        }

        match ev {
            AccountEvent::CommissionRecorded(e) => {
                // Only earned entries are addressable by order; reversals are
                // audit lines inside the account stream.
                if e.kind == CommissionKind::Earned {
                    self.store.upsert(
                        e.order_id,
                        OrderCommissionReadModel {
                            order_id: e.order_id,
                            seller_id: e.seller_id,
                            amount: e.amount,
                            status: e.status,
                            recorded_at: e.occurred_at,
                        },
                    );
                }
            }
            AccountEvent::RevenueConfirmed(e) => {
                if let Some(mut rm) = self.store.get(&e.order_id) {
                    rm.status = CommissionStatus::Confirmed;
                    rm.amount = e.confirmed_amount;
                    self.store.upsert(e.order_id, rm);
                }
            }
            AccountEvent::CommissionVoided(e) => {
                if let Some(mut rm) = self.store.get(&e.order_id) {
                    rm.status = CommissionStatus::Voided;
                    self.store.upsert(e.order_id, rm);
                }
            }
            AccountEvent::WithdrawalRequested(_)
            | AccountEvent::WithdrawalCompleted(_)
            | AccountEvent::WithdrawalRejected(_) => {}
        }

        self.update_cursor(seller_id, aggregate_id, seq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryReadModelStore;
    use marketpay_ledger::{CommissionRecorded, RevenueConfirmed};

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
    fn records_and_confirms_order_commission() {
        let store = Arc::new(InMemoryReadModelStore::<OrderId, OrderCommissionReadModel>::new());
        let proj = OrderDirectoryProjection::new(store.clone());

        let seller_id = SellerId::new();
        let order_id = OrderId::new();

        proj.apply_envelope(&make_envelope(
            seller_id,
            1,
            AccountEvent::CommissionRecorded(CommissionRecorded {
                seller_id,
                order_id,
                amount: 1000,
                kind: CommissionKind::Earned,
                status: CommissionStatus::Pending,
                description: None,
                occurred_at: Utc::now(),
            }),
        ))
        .unwrap();

        let rm = proj.get(&order_id).unwrap();
        assert_eq!(rm.seller_id, seller_id);
        assert_eq!(rm.status, CommissionStatus::Pending);

        // Partial confirmation replaces the amount.
        proj.apply_envelope(&make_envelope(
            seller_id,
            2,
            AccountEvent::RevenueConfirmed(RevenueConfirmed {
                seller_id,
                order_id,
                confirmed_amount: 800,
                occurred_at: Utc::now(),
            }),
        ))
        .unwrap();

        let rm = proj.get(&order_id).unwrap();
        assert_eq!(rm.status, CommissionStatus::Confirmed);
        assert_eq!(rm.amount, 800);
    }
}
