use criterion::{Criterion, black_box, criterion_group, criterion_main};

use chrono::Utc;
use marketpay_core::{OrderId, SellerId};
use marketpay_events::{EventEnvelope, InMemoryEventBus};
use marketpay_infra::command_dispatcher::CommandDispatcher;
use marketpay_infra::event_store::InMemoryEventStore;
use marketpay_ledger::{
    ACCOUNT_AGGREGATE_TYPE, AccountCommand, AccountId, CommissionKind, CommissionStatus,
    RecordCommission, RequestWithdrawal, SellerAccount, WithdrawalId,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Naive CRUD baseline: one mutable balance cell per seller, no history.
#[derive(Debug, Clone)]
struct NaiveBalanceStore {
    inner: Arc<RwLock<HashMap<SellerId, i128>>>,
}

impl NaiveBalanceStore {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn credit(&self, seller_id: SellerId, amount: u64) {
        let mut map = self.inner.write().unwrap();
        *map.entry(seller_id).or_insert(0) += amount as i128;
    }

    fn withdraw(&self, seller_id: SellerId, amount: u64) -> Result<(), ()> {
        let mut map = self.inner.write().unwrap();
        let balance = map.entry(seller_id).or_insert(0);
        if *balance < amount as i128 {
            return Err(());
        }
        *balance -= amount as i128;
        Ok(())
    }
}

type BenchDispatcher =
    CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>>;

fn setup_dispatcher() -> (BenchDispatcher, SellerId) {
    let store = InMemoryEventStore::new();
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> =
        Arc::new(InMemoryEventBus::new());
    (CommandDispatcher::new(store, bus), SellerId::new())
}

fn record_commission(dispatcher: &BenchDispatcher, seller_id: SellerId, amount: u64) {
    let cmd = AccountCommand::RecordCommission(RecordCommission {
        seller_id,
        order_id: OrderId::new(),
        amount,
        kind: CommissionKind::Earned,
        initial_status: CommissionStatus::Confirmed,
        description: None,
        occurred_at: Utc::now(),
    });
    dispatcher
        .dispatch::<SellerAccount>(
            seller_id,
            seller_id.account_aggregate(),
            ACCOUNT_AGGREGATE_TYPE,
            cmd,
            |owner, _| SellerAccount::empty(AccountId::for_seller(owner)),
        )
        .unwrap();
}

fn bench_command_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_latency");
    group.sample_size(500);

    // First commission on a fresh stream (no history to replay).
    group.bench_function("record_commission_fresh", |b| {
        let (dispatcher, _) = setup_dispatcher();
        b.iter(|| {
            let seller_id = SellerId::new();
            record_commission(&dispatcher, seller_id, black_box(750));
        });
    });

    // Withdrawal admission against a stream with history.
    group.bench_function("request_withdrawal_with_history", |b| {
        let (dispatcher, seller_id) = setup_dispatcher();
        for _ in 0..100 {
            record_commission(&dispatcher, seller_id, 1_000_000);
        }

        b.iter(|| {
            let cmd = AccountCommand::RequestWithdrawal(RequestWithdrawal {
                seller_id,
                withdrawal_id: WithdrawalId::new(),
                amount: black_box(1),
                occurred_at: Utc::now(),
            });
            dispatcher
                .dispatch::<SellerAccount>(
                    seller_id,
                    seller_id.account_aggregate(),
                    ACCOUNT_AGGREGATE_TYPE,
                    cmd,
                    |owner, _| SellerAccount::empty(AccountId::for_seller(owner)),
                )
                .unwrap();
        });
    });

    group.finish();
}

fn bench_naive_crud_baseline(c: &mut Criterion) {
    let mut group = c.benchmark_group("naive_crud_baseline");
    group.sample_size(500);

    group.bench_function("credit_and_withdraw", |b| {
        let store = NaiveBalanceStore::new();
        let seller_id = SellerId::new();
        store.credit(seller_id, u64::MAX / 2);

        b.iter(|| {
            store.credit(seller_id, black_box(750));
            store.withdraw(seller_id, black_box(1)).unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_command_latency, bench_naive_crud_baseline);
criterion_main!(benches);
