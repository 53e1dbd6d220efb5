//! Balance cache and reconciliation.
//!
//! The seller's `available` balance is denormalized into a read model for
//! fast reads. The cache is a derived, repairable artifact: it is always
//! written from a full recompute over the account stream, never incremented
//! in place, so it cannot drift by accumulation, only by a missed write.
//! The reconciliation sweep detects and repairs exactly that.
//!
//! Reconciliation never mutates commission or withdrawal records, only the
//! cache. Running it repeatedly or concurrently with live traffic is safe:
//! concurrent writers converge on the same authoritative value given the
//! same underlying event set (last-write-wins is acceptable).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use marketpay_core::{Aggregate, SellerId};
use marketpay_ledger::{AccountEvent, AccountId, BalanceBreakdown, SellerAccount};

use crate::command_dispatcher::DispatchError;
use crate::event_store::{EventStore, EventStoreError};
use crate::read_model::ReadModelStore;

/// Read model: cached balance for one seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerBalance {
    pub seller_id: SellerId,
    /// The cached available balance (floored at zero).
    pub available: u64,
    pub breakdown: BalanceBreakdown,
    pub refreshed_at: DateTime<Utc>,
}

/// Outcome of reconciling one seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub seller_id: SellerId,
    /// Cached value before the sweep (`None` when no cache entry existed).
    pub cached_before: Option<u64>,
    /// Authoritative value computed from the account stream.
    pub authoritative: u64,
    /// Whether the cache had to be overwritten.
    pub drifted: bool,
    /// The raw (un-floored) sum was negative: an anomaly worth chasing, not
    /// something reconciliation can repair.
    pub raw_negative: bool,
}

#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("event store error: {0}")]
    Store(#[from] EventStoreError),

    #[error("failed to deserialize account event: {0}")]
    Deserialize(String),
}

impl From<ReconciliationError> for DispatchError {
    fn from(value: ReconciliationError) -> Self {
        match value {
            ReconciliationError::Store(e) => DispatchError::from(e),
            ReconciliationError::Deserialize(msg) => DispatchError::Deserialize(msg),
        }
    }
}

/// Rehydrate a seller's account aggregate from its event stream.
pub fn rehydrate_account<S: EventStore>(
    store: &S,
    seller_id: SellerId,
) -> Result<SellerAccount, ReconciliationError> {
    let mut history = store.load_stream(seller_id, seller_id.account_aggregate())?;
    history.sort_by_key(|e| e.sequence_number);

    let mut account = SellerAccount::empty(AccountId::for_seller(seller_id));
    for stored in history {
        let ev: AccountEvent = serde_json::from_value(stored.payload)
            .map_err(|e| ReconciliationError::Deserialize(e.to_string()))?;
        account.apply(&ev);
    }

    Ok(account)
}

/// Detects drift between cached and authoritative balances and repairs the
/// cache, recording before/after values for audit.
#[derive(Debug)]
pub struct ReconciliationService<S, C> {
    store: S,
    cache: C,
}

impl<S, C> ReconciliationService<S, C>
where
    S: EventStore,
    C: ReadModelStore<SellerId, SellerBalance>,
{
    pub fn new(store: S, cache: C) -> Self {
        Self { store, cache }
    }

    /// Authoritative balance buckets, recomputed from the stream.
    pub fn authoritative(&self, seller_id: SellerId) -> Result<BalanceBreakdown, ReconciliationError> {
        Ok(rehydrate_account(&self.store, seller_id)?.balance())
    }

    /// Current cache entry, if one exists.
    pub fn cached(&self, seller_id: SellerId) -> Option<SellerBalance> {
        self.cache.get(&seller_id)
    }

    /// Unconditionally recompute and persist the cache for one seller.
    ///
    /// The mutation paths call this right after committing, so the cached
    /// value equals the calculator's output the moment an operation returns.
    pub fn refresh(&self, seller_id: SellerId) -> Result<SellerBalance, ReconciliationError> {
        let breakdown = self.authoritative(seller_id)?;
        let balance = SellerBalance {
            seller_id,
            available: breakdown.available(),
            breakdown,
            refreshed_at: Utc::now(),
        };
        self.cache.upsert(seller_id, balance.clone());
        Ok(balance)
    }

    /// Compare cached vs. authoritative for one seller; overwrite on drift.
    pub fn reconcile_seller(
        &self,
        seller_id: SellerId,
    ) -> Result<ReconciliationReport, ReconciliationError> {
        let breakdown = self.authoritative(seller_id)?;
        let authoritative = breakdown.available();
        let cached_before = self.cache.get(&seller_id).map(|c| c.available);
        let drifted = cached_before != Some(authoritative);

        if drifted {
            warn!(
                %seller_id,
                ?cached_before,
                authoritative,
                "cached balance drifted from authoritative value; overwriting"
            );
            self.cache.upsert(
                seller_id,
                SellerBalance {
                    seller_id,
                    available: authoritative,
                    breakdown,
                    refreshed_at: Utc::now(),
                },
            );
        }

        if breakdown.floor_engaged() {
            warn!(
                %seller_id,
                raw = breakdown.raw(),
                "raw balance is negative; zero floor engaged (data inconsistency)"
            );
        }

        Ok(ReconciliationReport {
            seller_id,
            cached_before,
            authoritative,
            drifted,
            raw_negative: breakdown.floor_engaged(),
        })
    }

    /// Batch sweep. Per-seller failures are logged and skipped so one broken
    /// stream cannot wedge the whole run.
    pub fn reconcile_all(
        &self,
        sellers: impl IntoIterator<Item = SellerId>,
    ) -> Vec<ReconciliationReport> {
        let mut reports = Vec::new();
        for seller_id in sellers {
            match self.reconcile_seller(seller_id) {
                Ok(report) => reports.push(report),
                Err(err) => {
                    warn!(%seller_id, error = %err, "reconciliation failed for seller; skipping");
                }
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::{InMemoryEventStore, UncommittedEvent};
    use crate::read_model::InMemoryReadModelStore;
    use marketpay_core::{ExpectedVersion, OrderId};
    use marketpay_ledger::{
        ACCOUNT_AGGREGATE_TYPE, CommissionKind, CommissionRecorded, CommissionStatus,
    };
    use std::sync::Arc;

    fn append_commission(store: &InMemoryEventStore, seller_id: SellerId, seq: u64, amount: u64) {
        let event = AccountEvent::CommissionRecorded(CommissionRecorded {
            seller_id,
            order_id: OrderId::new(),
            amount,
            kind: CommissionKind::Earned,
            status: CommissionStatus::Confirmed,
            description: None,
            occurred_at: Utc::now(),
        });
        let uncommitted = UncommittedEvent::from_typed(
            seller_id,
            seller_id.account_aggregate(),
            ACCOUNT_AGGREGATE_TYPE,
            uuid::Uuid::now_v7(),
            &event,
        )
        .unwrap();
        store
            .append(vec![uncommitted], ExpectedVersion::Exact(seq - 1))
            .unwrap();
    }

    #[test]
    fn reconcile_repairs_a_drifted_cache() {
        let store = Arc::new(InMemoryEventStore::new());
        let cache = Arc::new(InMemoryReadModelStore::<SellerId, SellerBalance>::new());
        let service = ReconciliationService::new(store.clone(), cache.clone());

        let seller_id = SellerId::new();
        append_commission(&store, seller_id, 1, 1000);

        // Simulate a stale cache write.
        cache.upsert(
            seller_id,
            SellerBalance {
                seller_id,
                available: 250,
                breakdown: BalanceBreakdown::default(),
                refreshed_at: Utc::now(),
            },
        );

        let report = service.reconcile_seller(seller_id).unwrap();
        assert!(report.drifted);
        assert_eq!(report.cached_before, Some(250));
        assert_eq!(report.authoritative, 1000);
        assert_eq!(service.cached(seller_id).unwrap().available, 1000);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let store = Arc::new(InMemoryEventStore::new());
        let cache = Arc::new(InMemoryReadModelStore::<SellerId, SellerBalance>::new());
        let service = ReconciliationService::new(store.clone(), cache);

        let seller_id = SellerId::new();
        append_commission(&store, seller_id, 1, 500);

        let first = service.reconcile_seller(seller_id).unwrap();
        assert!(first.drifted); // no cache entry existed

        let second = service.reconcile_seller(seller_id).unwrap();
        assert!(!second.drifted);
        assert_eq!(second.cached_before, Some(500));
        assert_eq!(second.authoritative, 500);
    }
}
