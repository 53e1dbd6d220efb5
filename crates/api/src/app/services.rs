use std::sync::Arc;

use sqlx::PgPool;

use marketpay_core::{OrderId, SellerId};
use marketpay_events::{EventEnvelope, InMemoryEventBus};
use marketpay_infra::command_dispatcher::DispatchError;
use marketpay_infra::event_store::{
    EventFilter, EventQuery, EventQueryResult, EventStoreError, InMemoryEventStore, Pagination,
    PostgresEventStore,
};
use marketpay_infra::notifications::{LoggingPayoutNotifier, spawn_payout_notifier};
use marketpay_infra::projections::{
    OrderCommissionReadModel, SellerProfile, WithdrawalReadModel,
};
use marketpay_infra::reconciliation::{ReconciliationReport, SellerBalance};
use marketpay_infra::services::{
    LedgerService, ReconcileTarget, WithdrawalPolicy, WithdrawalReceipt,
};
use marketpay_infra::workers::WorkerHandle;
use marketpay_ledger::{
    BalanceBreakdown, CommissionStatus, WithdrawalId, WithdrawalOutcome, WithdrawalStatus,
};

type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;

/// Storage backend selected at startup.
enum Backend {
    InMemory {
        ledger: LedgerService<Arc<InMemoryEventStore>, Bus>,
        store: Arc<InMemoryEventStore>,
    },
    Persistent {
        ledger: LedgerService<Arc<PostgresEventStore>, Bus>,
        store: Arc<PostgresEventStore>,
    },
}

/// Application services shared across request handlers.
pub struct AppServices {
    backend: Backend,
    // Held so the payout-notification worker outlives the router.
    _notifier: WorkerHandle,
}

/// Build services from the environment: `DATABASE_URL` selects the Postgres
/// backend, otherwise everything runs in-memory (dev/test).
/// `MARKETPAY_MIN_WITHDRAWAL` sets the withdrawal admission threshold.
pub async fn build_services() -> AppServices {
    let policy = WithdrawalPolicy::new(
        std::env::var("MARKETPAY_MIN_WITHDRAWAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
    );

    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let notifier = spawn_payout_notifier(bus.clone(), Arc::new(LoggingPayoutNotifier));

    let backend = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = PgPool::connect(&database_url)
                .await
                .expect("failed to connect to Postgres");
            let store = Arc::new(PostgresEventStore::new(pool));
            let ledger = LedgerService::new(store.clone(), bus, policy);
            tracing::info!("using postgres event store");
            Backend::Persistent { ledger, store }
        }
        Err(_) => {
            let store = Arc::new(InMemoryEventStore::new());
            let ledger = LedgerService::new(store.clone(), bus, policy);
            tracing::info!("using in-memory event store");
            Backend::InMemory { ledger, store }
        }
    };

    AppServices {
        backend,
        _notifier: notifier,
    }
}

impl AppServices {
    pub fn register_seller(&self, display_name: &str) -> Result<SellerId, DispatchError> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => ledger.register_seller(display_name),
            Backend::Persistent { ledger, .. } => ledger.register_seller(display_name),
        }
    }

    pub fn get_seller(&self, seller_id: SellerId) -> Option<SellerProfile> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => ledger.sellers().get(&seller_id),
            Backend::Persistent { ledger, .. } => ledger.sellers().get(&seller_id),
        }
    }

    pub fn list_sellers(&self) -> Vec<SellerProfile> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => ledger.sellers().list(),
            Backend::Persistent { ledger, .. } => ledger.sellers().list(),
        }
    }

    pub fn record_earned_commission(
        &self,
        seller_id: SellerId,
        order_id: OrderId,
        amount: u64,
        initial_status: CommissionStatus,
        description: Option<String>,
    ) -> Result<(), DispatchError> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => {
                ledger.record_earned_commission(seller_id, order_id, amount, initial_status, description)
            }
            Backend::Persistent { ledger, .. } => {
                ledger.record_earned_commission(seller_id, order_id, amount, initial_status, description)
            }
        }
    }

    pub fn record_reversal(
        &self,
        seller_id: SellerId,
        order_id: OrderId,
        amount: u64,
        description: Option<String>,
    ) -> Result<(), DispatchError> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => {
                ledger.record_reversal(seller_id, order_id, amount, description)
            }
            Backend::Persistent { ledger, .. } => {
                ledger.record_reversal(seller_id, order_id, amount, description)
            }
        }
    }

    pub fn confirm_revenue(
        &self,
        order_id: OrderId,
        confirmed_amount: u64,
    ) -> Result<SellerId, DispatchError> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => ledger.confirm_revenue(order_id, confirmed_amount),
            Backend::Persistent { ledger, .. } => ledger.confirm_revenue(order_id, confirmed_amount),
        }
    }

    pub fn void_commission(
        &self,
        seller_id: SellerId,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<(), DispatchError> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => ledger.void_commission(seller_id, order_id, reason),
            Backend::Persistent { ledger, .. } => ledger.void_commission(seller_id, order_id, reason),
        }
    }

    pub fn list_order_commissions(
        &self,
        seller_id: SellerId,
        status: Option<CommissionStatus>,
    ) -> Vec<OrderCommissionReadModel> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => ledger.orders().list_for_seller(seller_id, status),
            Backend::Persistent { ledger, .. } => ledger.orders().list_for_seller(seller_id, status),
        }
    }

    pub fn request_withdrawal(
        &self,
        seller_id: SellerId,
        amount: u64,
    ) -> Result<WithdrawalReceipt, DispatchError> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => ledger.request_withdrawal(seller_id, amount),
            Backend::Persistent { ledger, .. } => ledger.request_withdrawal(seller_id, amount),
        }
    }

    pub fn resolve_withdrawal(
        &self,
        withdrawal_id: WithdrawalId,
        outcome: WithdrawalOutcome,
    ) -> Result<SellerId, DispatchError> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => ledger.resolve_withdrawal(withdrawal_id, outcome),
            Backend::Persistent { ledger, .. } => ledger.resolve_withdrawal(withdrawal_id, outcome),
        }
    }

    pub fn get_withdrawal(&self, withdrawal_id: WithdrawalId) -> Option<WithdrawalReadModel> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => ledger.withdrawal_queue().get(&withdrawal_id),
            Backend::Persistent { ledger, .. } => ledger.withdrawal_queue().get(&withdrawal_id),
        }
    }

    pub fn list_withdrawals(
        &self,
        seller_id: SellerId,
        status: Option<WithdrawalStatus>,
    ) -> Vec<WithdrawalReadModel> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => {
                ledger.withdrawal_queue().list_for_seller(seller_id, status)
            }
            Backend::Persistent { ledger, .. } => {
                ledger.withdrawal_queue().list_for_seller(seller_id, status)
            }
        }
    }

    pub fn list_pending_withdrawals(&self) -> Vec<WithdrawalReadModel> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => ledger.withdrawal_queue().list_pending(),
            Backend::Persistent { ledger, .. } => ledger.withdrawal_queue().list_pending(),
        }
    }

    pub fn available_balance(&self, seller_id: SellerId) -> Result<BalanceBreakdown, DispatchError> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => ledger.available_balance(seller_id),
            Backend::Persistent { ledger, .. } => ledger.available_balance(seller_id),
        }
    }

    pub fn cached_balance(&self, seller_id: SellerId) -> Option<SellerBalance> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => ledger.cached_balance(seller_id),
            Backend::Persistent { ledger, .. } => ledger.cached_balance(seller_id),
        }
    }

    pub fn reconcile(
        &self,
        target: ReconcileTarget,
    ) -> Result<Vec<ReconciliationReport>, DispatchError> {
        match &self.backend {
            Backend::InMemory { ledger, .. } => ledger.reconcile(target),
            Backend::Persistent { ledger, .. } => ledger.reconcile(target),
        }
    }

    /// Query the audit trail with filters and pagination.
    pub async fn query_events(
        &self,
        seller_id: SellerId,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        match &self.backend {
            Backend::InMemory { store, .. } => {
                store.query_events(seller_id, filter, pagination).await
            }
            Backend::Persistent { store, .. } => {
                store.query_events(seller_id, filter, pagination).await
            }
        }
    }
}
