//! Ledger service facade: the operations the surrounding order/admin system
//! calls, orchestrated over the dispatcher, projections, and reconciliation.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use marketpay_core::{AggregateId, LedgerError, OrderId, SellerId};
use marketpay_events::{EventBus, EventEnvelope};
use marketpay_ledger::{
    ACCOUNT_AGGREGATE_TYPE, AccountCommand, AccountId, BalanceBreakdown, CommissionKind,
    CommissionStatus, ConfirmRevenue, RecordCommission, RequestWithdrawal, ResolveWithdrawal,
    SellerAccount, VoidCommission, WithdrawalId, WithdrawalOutcome,
};
use marketpay_sellers::{RegisterSeller, Seller, SellerCommand};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::projections::{
    OrderCommissionReadModel, OrderDirectoryProjection, SellerDirectoryProjection, SellerProfile,
    WithdrawalQueueProjection, WithdrawalReadModel,
};
use crate::read_model::InMemoryReadModelStore;
use crate::reconciliation::{ReconciliationReport, ReconciliationService, SellerBalance};

/// Aggregate type identifier for seller identity streams.
pub const SELLER_AGGREGATE_TYPE: &str = "sellers.seller";

/// Bounded retries for optimistic-concurrency conflicts. The retried attempt
/// reloads the stream, so the admission check re-runs against the winner's
/// committed state.
const MAX_DISPATCH_ATTEMPTS: u32 = 4;

/// Withdrawal admission thresholds, passed in explicitly at construction.
/// There is deliberately no ambient/global configuration in the ledger core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalPolicy {
    /// Smallest withdrawal a seller may request, in the smallest currency
    /// unit. Zero disables the threshold.
    pub min_amount: u64,
}

impl WithdrawalPolicy {
    pub fn new(min_amount: u64) -> Self {
        Self { min_amount }
    }
}

/// Target of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileTarget {
    Seller(SellerId),
    All,
}

/// Result of an admitted withdrawal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalReceipt {
    pub withdrawal_id: WithdrawalId,
    pub amount: u64,
    /// Available balance right after the reservation.
    pub available_after: u64,
}

type SellerStore = Arc<InMemoryReadModelStore<SellerId, SellerProfile>>;
type OrderStore = Arc<InMemoryReadModelStore<OrderId, OrderCommissionReadModel>>;
type WithdrawalStore = Arc<InMemoryReadModelStore<WithdrawalId, WithdrawalReadModel>>;
type BalanceStore = Arc<InMemoryReadModelStore<SellerId, SellerBalance>>;

/// Application service exposing the ledger to the surrounding system.
///
/// Read models are kept in-process and rebuilt from the event store when
/// needed; the store (generic `S`) is the durable source of truth.
#[derive(Debug)]
pub struct LedgerService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    policy: WithdrawalPolicy,
    sellers: SellerDirectoryProjection<SellerStore>,
    orders: OrderDirectoryProjection<OrderStore>,
    withdrawals: WithdrawalQueueProjection<WithdrawalStore>,
    reconciler: ReconciliationService<S, BalanceStore>,
}

impl<S, B> LedgerService<S, B>
where
    S: EventStore + Clone,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, policy: WithdrawalPolicy) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store.clone(), bus),
            policy,
            sellers: SellerDirectoryProjection::new(Arc::new(InMemoryReadModelStore::new())),
            orders: OrderDirectoryProjection::new(Arc::new(InMemoryReadModelStore::new())),
            withdrawals: WithdrawalQueueProjection::new(Arc::new(InMemoryReadModelStore::new())),
            reconciler: ReconciliationService::new(store, Arc::new(InMemoryReadModelStore::new())),
        }
    }

    pub fn policy(&self) -> &WithdrawalPolicy {
        &self.policy
    }

    pub fn sellers(&self) -> &SellerDirectoryProjection<SellerStore> {
        &self.sellers
    }

    pub fn orders(&self) -> &OrderDirectoryProjection<OrderStore> {
        &self.orders
    }

    pub fn withdrawal_queue(&self) -> &WithdrawalQueueProjection<WithdrawalStore> {
        &self.withdrawals
    }

    /// Register a new seller and initialize their zero balance cache entry.
    pub fn register_seller(&self, display_name: &str) -> Result<SellerId, DispatchError> {
        let seller_id = SellerId::new();
        let committed = self.dispatcher.dispatch::<Seller>(
            seller_id,
            AggregateId::from_uuid(*seller_id.as_uuid()),
            SELLER_AGGREGATE_TYPE,
            SellerCommand::RegisterSeller(RegisterSeller {
                seller_id,
                display_name: display_name.to_string(),
                occurred_at: chrono::Utc::now(),
            }),
            |_, aggregate_id| Seller::empty(SellerId::from_uuid(*aggregate_id.as_uuid())),
        )?;

        self.apply_committed(&committed);
        self.refresh_cache(seller_id)?;
        Ok(seller_id)
    }

    /// Record a commission for an order whose revenue became eligible.
    ///
    /// `initial_status` is `Pending` for cash-on-delivery orders (collection
    /// still unverified) and `Confirmed` for prepaid revenue.
    pub fn record_earned_commission(
        &self,
        seller_id: SellerId,
        order_id: OrderId,
        amount: u64,
        initial_status: CommissionStatus,
        description: Option<String>,
    ) -> Result<(), DispatchError> {
        self.ensure_seller(seller_id)?;

        let committed = self.dispatch_account(
            seller_id,
            AccountCommand::RecordCommission(RecordCommission {
                seller_id,
                order_id,
                amount,
                kind: CommissionKind::Earned,
                initial_status,
                description,
                occurred_at: chrono::Utc::now(),
            }),
        )?;

        self.apply_committed(&committed);
        self.refresh_cache(seller_id)?;
        Ok(())
    }

    /// Record a compensating reversal against previously confirmed revenue.
    pub fn record_reversal(
        &self,
        seller_id: SellerId,
        order_id: OrderId,
        amount: u64,
        description: Option<String>,
    ) -> Result<(), DispatchError> {
        self.ensure_seller(seller_id)?;

        let committed = self.dispatch_account(
            seller_id,
            AccountCommand::RecordCommission(RecordCommission {
                seller_id,
                order_id,
                amount,
                kind: CommissionKind::Reversed,
                initial_status: CommissionStatus::Confirmed,
                description,
                occurred_at: chrono::Utc::now(),
            }),
        )?;

        self.apply_committed(&committed);
        self.refresh_cache(seller_id)?;
        Ok(())
    }

    /// Operator verified collected funds for an order; confirm its commission
    /// with the verified amount and reconcile the seller.
    pub fn confirm_revenue(
        &self,
        order_id: OrderId,
        confirmed_amount: u64,
    ) -> Result<SellerId, DispatchError> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or(DispatchError::Domain(LedgerError::NotFound))?;
        let seller_id = order.seller_id;

        let committed = self.dispatch_account(
            seller_id,
            AccountCommand::ConfirmRevenue(ConfirmRevenue {
                seller_id,
                order_id,
                confirmed_amount,
                occurred_at: chrono::Utc::now(),
            }),
        )?;

        self.apply_committed(&committed);

        // Per the confirmation flow, follow up with a targeted reconciliation
        // for this seller (also writes the fresh cache value).
        if let Err(err) = self.reconciler.reconcile_seller(seller_id) {
            warn!(%seller_id, error = %err, "post-confirmation reconciliation failed");
        }

        Ok(seller_id)
    }

    /// Void an order's commission after cancellation/refund.
    pub fn void_commission(
        &self,
        seller_id: SellerId,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<(), DispatchError> {
        self.ensure_seller(seller_id)?;

        let committed = self.dispatch_account(
            seller_id,
            AccountCommand::VoidCommission(VoidCommission {
                seller_id,
                order_id,
                reason,
                occurred_at: chrono::Utc::now(),
            }),
        )?;

        self.apply_committed(&committed);
        self.refresh_cache(seller_id)?;
        Ok(())
    }

    /// Seller requests a payout of `amount` from their available balance.
    ///
    /// Admission (balance check) and reservation happen inside the account
    /// aggregate's serialized decision; concurrent requests either lose the
    /// optimistic version race (and retry against the new state) or see the
    /// reduced balance.
    pub fn request_withdrawal(
        &self,
        seller_id: SellerId,
        amount: u64,
    ) -> Result<WithdrawalReceipt, DispatchError> {
        self.ensure_seller(seller_id)?;

        if amount < self.policy.min_amount {
            return Err(DispatchError::Domain(LedgerError::invalid_amount(format!(
                "amount below minimum withdrawal of {}",
                self.policy.min_amount
            ))));
        }

        let withdrawal_id = WithdrawalId::new();
        let committed = self.dispatch_account(
            seller_id,
            AccountCommand::RequestWithdrawal(RequestWithdrawal {
                seller_id,
                withdrawal_id,
                amount,
                occurred_at: chrono::Utc::now(),
            }),
        )?;

        self.apply_committed(&committed);

        // Persist the reduced cached balance before returning, so every
        // subsequent read (and any concurrent admission path) sees the
        // reservation reflected.
        let balance = self.refresh_cache(seller_id)?;

        Ok(WithdrawalReceipt {
            withdrawal_id,
            amount,
            available_after: balance.available,
        })
    }

    /// Resolve a pending withdrawal as completed (paid out) or rejected
    /// (funds returned). Terminal states never re-open.
    pub fn resolve_withdrawal(
        &self,
        withdrawal_id: WithdrawalId,
        outcome: WithdrawalOutcome,
    ) -> Result<SellerId, DispatchError> {
        let request = self
            .withdrawals
            .get(&withdrawal_id)
            .ok_or(DispatchError::Domain(LedgerError::NotFound))?;
        let seller_id = request.seller_id;

        let committed = self.dispatch_account(
            seller_id,
            AccountCommand::ResolveWithdrawal(ResolveWithdrawal {
                seller_id,
                withdrawal_id,
                outcome,
                occurred_at: chrono::Utc::now(),
            }),
        )?;

        self.apply_committed(&committed);

        // Rejection returns the reserved amount: recompute the cache now.
        // Completion only moves the amount between buckets; the available
        // total is unchanged, so no recomputation is required.
        if outcome == WithdrawalOutcome::Rejected {
            self.refresh_cache(seller_id)?;
        }

        Ok(seller_id)
    }

    /// Authoritative available balance for one seller (full recompute).
    pub fn available_balance(&self, seller_id: SellerId) -> Result<BalanceBreakdown, DispatchError> {
        self.ensure_seller(seller_id)?;
        Ok(self.reconciler.authoritative(seller_id)?)
    }

    /// Cached balance read model for one seller, if present.
    pub fn cached_balance(&self, seller_id: SellerId) -> Option<SellerBalance> {
        self.reconciler.cached(seller_id)
    }

    /// Run reconciliation for one seller or every registered seller.
    pub fn reconcile(&self, target: ReconcileTarget) -> Result<Vec<ReconciliationReport>, DispatchError> {
        match target {
            ReconcileTarget::Seller(seller_id) => {
                self.ensure_seller(seller_id)?;
                Ok(vec![self.reconciler.reconcile_seller(seller_id)?])
            }
            ReconcileTarget::All => {
                let sellers = self.sellers.list().into_iter().map(|p| p.seller_id);
                Ok(self.reconciler.reconcile_all(sellers))
            }
        }
    }

    /// Feed historical envelopes through the projections (startup rebuild for
    /// a persistent store; projections skip anything already applied).
    pub fn rebuild_read_models(&self, events: impl IntoIterator<Item = StoredEvent>) {
        let stored: Vec<StoredEvent> = events.into_iter().collect();
        self.apply_committed(&stored);
        for event in &stored {
            if event.aggregate_type == ACCOUNT_AGGREGATE_TYPE {
                if let Err(err) = self.refresh_cache(event.seller_id) {
                    warn!(seller_id = %event.seller_id, error = ?err, "cache rebuild failed");
                }
            }
        }
    }

    fn ensure_seller(&self, seller_id: SellerId) -> Result<(), DispatchError> {
        self.sellers
            .get(&seller_id)
            .map(|_| ())
            .ok_or(DispatchError::Domain(LedgerError::NotFound))
    }

    fn refresh_cache(&self, seller_id: SellerId) -> Result<SellerBalance, DispatchError> {
        Ok(self.reconciler.refresh(seller_id)?)
    }

    fn dispatch_account(
        &self,
        seller_id: SellerId,
        command: AccountCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.dispatcher.dispatch::<SellerAccount>(
                seller_id,
                seller_id.account_aggregate(),
                ACCOUNT_AGGREGATE_TYPE,
                command.clone(),
                |owner, _| SellerAccount::empty(AccountId::for_seller(owner)),
            ) {
                Err(DispatchError::Concurrency(msg)) if attempt < MAX_DISPATCH_ATTEMPTS => {
                    debug!(%seller_id, attempt, "concurrency conflict, retrying: {msg}");
                    continue;
                }
                other => return other,
            }
        }
    }

    /// Apply freshly committed events to the in-process read models.
    ///
    /// The same envelopes also travel the bus to background consumers; the
    /// cursor guards make the double delivery a no-op.
    fn apply_committed(&self, committed: &[StoredEvent]) {
        for stored in committed {
            let envelope = stored.to_envelope();
            if let Err(err) = self.sellers.apply_envelope(&envelope) {
                warn!(error = %err, "seller directory projection failed");
            }
            if let Err(err) = self.orders.apply_envelope(&envelope) {
                warn!(error = %err, "order directory projection failed");
            }
            if let Err(err) = self.withdrawals.apply_envelope(&envelope) {
                warn!(error = %err, "withdrawal queue projection failed");
            }
        }
    }
}
