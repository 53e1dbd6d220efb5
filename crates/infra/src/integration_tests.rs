//! Cross-component scenarios: dispatcher + store + projections +
//! reconciliation, driven through the service facade.

use std::sync::Arc;
use std::thread;

use serde_json::Value as JsonValue;

use marketpay_core::{LedgerError, OrderId, SellerId};
use marketpay_events::{EventEnvelope, InMemoryEventBus};
use marketpay_ledger::{CommissionStatus, WithdrawalOutcome, WithdrawalStatus};

use crate::command_dispatcher::DispatchError;
use crate::event_store::InMemoryEventStore;
use crate::services::{LedgerService, ReconcileTarget, WithdrawalPolicy};

type TestBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type TestService = LedgerService<Arc<InMemoryEventStore>, TestBus>;

fn test_service(policy: WithdrawalPolicy) -> TestService {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: TestBus = Arc::new(InMemoryEventBus::new());
    LedgerService::new(store, bus, policy)
}

fn domain_err(result: Result<impl core::fmt::Debug, DispatchError>) -> LedgerError {
    match result {
        Err(DispatchError::Domain(e)) => e,
        other => panic!("expected domain error, got {other:?}"),
    }
}

#[test]
fn commission_lifecycle_with_partial_confirmation() {
    let service = test_service(WithdrawalPolicy::new(0));
    let seller_id = service.register_seller("Acme Outlet").unwrap();
    let order_id = OrderId::new();

    // COD order delivered: commission recorded pending, not yet spendable.
    service
        .record_earned_commission(seller_id, order_id, 1000, CommissionStatus::Pending, None)
        .unwrap();
    assert_eq!(service.available_balance(seller_id).unwrap().available(), 0);
    assert_eq!(service.cached_balance(seller_id).unwrap().available, 0);

    // Operator confirms a partial collection.
    let confirmed_for = service.confirm_revenue(order_id, 900).unwrap();
    assert_eq!(confirmed_for, seller_id);
    assert_eq!(
        service.available_balance(seller_id).unwrap().available(),
        900
    );
    assert_eq!(service.cached_balance(seller_id).unwrap().available, 900);

    let order = service.orders().get(&order_id).unwrap();
    assert_eq!(order.status, CommissionStatus::Confirmed);
    assert_eq!(order.amount, 900);
}

#[test]
fn confirming_revenue_twice_is_rejected() {
    let service = test_service(WithdrawalPolicy::new(0));
    let seller_id = service.register_seller("Acme Outlet").unwrap();
    let order_id = OrderId::new();

    service
        .record_earned_commission(seller_id, order_id, 500, CommissionStatus::Pending, None)
        .unwrap();
    service.confirm_revenue(order_id, 500).unwrap();

    let err = domain_err(service.confirm_revenue(order_id, 500));
    assert_eq!(err, LedgerError::AlreadyConfirmed);

    // One confirmation counted, not two.
    assert_eq!(
        service.available_balance(seller_id).unwrap().available(),
        500
    );
}

#[test]
fn confirming_unknown_order_is_not_found() {
    let service = test_service(WithdrawalPolicy::new(0));
    service.register_seller("Acme Outlet").unwrap();

    let err = domain_err(service.confirm_revenue(OrderId::new(), 100));
    assert_eq!(err, LedgerError::NotFound);
}

#[test]
fn withdrawal_round_trip_matches_the_ledger() {
    let service = test_service(WithdrawalPolicy::new(0));
    let seller_id = service.register_seller("Acme Outlet").unwrap();
    let order_id = OrderId::new();

    service
        .record_earned_commission(seller_id, order_id, 1000, CommissionStatus::Confirmed, None)
        .unwrap();
    assert_eq!(
        service.available_balance(seller_id).unwrap().available(),
        1000
    );

    // Withdraw everything.
    let receipt = service.request_withdrawal(seller_id, 1000).unwrap();
    assert_eq!(receipt.available_after, 0);
    assert_eq!(service.cached_balance(seller_id).unwrap().available, 0);

    // Nothing left: even one cent must be refused.
    let err = domain_err(service.request_withdrawal(seller_id, 1));
    assert_eq!(
        err,
        LedgerError::InsufficientBalance {
            requested: 1,
            available: 0
        }
    );

    // Reject the pending request: funds return to the pool.
    service
        .resolve_withdrawal(receipt.withdrawal_id, WithdrawalOutcome::Rejected)
        .unwrap();
    assert_eq!(
        service.available_balance(seller_id).unwrap().available(),
        1000
    );
    assert_eq!(service.cached_balance(seller_id).unwrap().available, 1000);

    let request = service.withdrawal_queue().get(&receipt.withdrawal_id).unwrap();
    assert_eq!(request.status, WithdrawalStatus::Rejected);
    assert!(request.resolved_at.is_some());
}

#[test]
fn pending_withdrawals_jointly_cannot_exceed_confirmed_commissions() {
    let service = test_service(WithdrawalPolicy::new(0));
    let seller_id = service.register_seller("Acme Outlet").unwrap();

    service
        .record_earned_commission(
            seller_id,
            OrderId::new(),
            500,
            CommissionStatus::Confirmed,
            None,
        )
        .unwrap();
    service
        .record_earned_commission(
            seller_id,
            OrderId::new(),
            500,
            CommissionStatus::Confirmed,
            None,
        )
        .unwrap();

    service.request_withdrawal(seller_id, 600).unwrap();
    assert_eq!(
        service.available_balance(seller_id).unwrap().available(),
        400
    );

    let err = domain_err(service.request_withdrawal(seller_id, 500));
    assert_eq!(
        err,
        LedgerError::InsufficientBalance {
            requested: 500,
            available: 400
        }
    );
}

#[test]
fn reversals_claw_back_confirmed_revenue() {
    let service = test_service(WithdrawalPolicy::new(0));
    let seller_id = service.register_seller("Acme Outlet").unwrap();
    let order_id = OrderId::new();

    service
        .record_earned_commission(seller_id, order_id, 1000, CommissionStatus::Confirmed, None)
        .unwrap();
    service
        .record_reversal(seller_id, order_id, 250, Some("partial refund".to_string()))
        .unwrap();

    let breakdown = service.available_balance(seller_id).unwrap();
    assert_eq!(breakdown.confirmed_reversed, 250);
    assert_eq!(breakdown.available(), 750);
    assert_eq!(service.cached_balance(seller_id).unwrap().available, 750);

    // One reversal per order; replays must not claw back twice.
    let err = domain_err(service.record_reversal(seller_id, order_id, 250, None));
    assert!(matches!(err, LedgerError::Conflict(_)));
}

#[test]
fn resolving_a_withdrawal_twice_is_rejected() {
    let service = test_service(WithdrawalPolicy::new(0));
    let seller_id = service.register_seller("Acme Outlet").unwrap();

    service
        .record_earned_commission(
            seller_id,
            OrderId::new(),
            1000,
            CommissionStatus::Confirmed,
            None,
        )
        .unwrap();
    let receipt = service.request_withdrawal(seller_id, 600).unwrap();

    service
        .resolve_withdrawal(receipt.withdrawal_id, WithdrawalOutcome::Completed)
        .unwrap();

    let err = domain_err(
        service.resolve_withdrawal(receipt.withdrawal_id, WithdrawalOutcome::Rejected),
    );
    assert!(matches!(err, LedgerError::InvalidTransition(_)));

    // Exactly one resolution reflected: 1000 - 600 paid out.
    assert_eq!(
        service.available_balance(seller_id).unwrap().available(),
        400
    );
}

#[test]
fn minimum_withdrawal_policy_is_enforced() {
    let service = test_service(WithdrawalPolicy::new(250));
    let seller_id = service.register_seller("Acme Outlet").unwrap();

    service
        .record_earned_commission(
            seller_id,
            OrderId::new(),
            1000,
            CommissionStatus::Confirmed,
            None,
        )
        .unwrap();

    let err = domain_err(service.request_withdrawal(seller_id, 100));
    assert!(matches!(err, LedgerError::InvalidAmount(_)));

    // At the threshold is fine.
    service.request_withdrawal(seller_id, 250).unwrap();
}

#[test]
fn operations_for_unknown_sellers_are_not_found() {
    let service = test_service(WithdrawalPolicy::new(0));
    let ghost = SellerId::new();

    let err = domain_err(service.request_withdrawal(ghost, 100));
    assert_eq!(err, LedgerError::NotFound);

    let err = domain_err(service.available_balance(ghost));
    assert_eq!(err, LedgerError::NotFound);

    let err = domain_err(service.record_earned_commission(
        ghost,
        OrderId::new(),
        100,
        CommissionStatus::Pending,
        None,
    ));
    assert_eq!(err, LedgerError::NotFound);
}

#[test]
fn reconciliation_converges_after_arbitrary_mutations() {
    let service = test_service(WithdrawalPolicy::new(0));
    let seller_a = service.register_seller("Seller A").unwrap();
    let seller_b = service.register_seller("Seller B").unwrap();

    let order_a = OrderId::new();
    service
        .record_earned_commission(seller_a, order_a, 1200, CommissionStatus::Pending, None)
        .unwrap();
    service.confirm_revenue(order_a, 1100).unwrap();
    let receipt = service.request_withdrawal(seller_a, 300).unwrap();
    service
        .resolve_withdrawal(receipt.withdrawal_id, WithdrawalOutcome::Completed)
        .unwrap();
    service
        .record_earned_commission(
            seller_b,
            OrderId::new(),
            700,
            CommissionStatus::Confirmed,
            None,
        )
        .unwrap();
    service.void_commission(seller_a, order_a, None).unwrap();

    let reports = service.reconcile(ReconcileTarget::All).unwrap();
    assert_eq!(reports.len(), 2);

    for report in reports {
        let authoritative = service
            .available_balance(report.seller_id)
            .unwrap()
            .available();
        assert_eq!(report.authoritative, authoritative);
        // The mutation paths keep the cache fresh, so the sweep finds no
        // drift; running it again must be a no-op as well.
        assert!(!report.drifted);
        assert_eq!(
            service.cached_balance(report.seller_id).unwrap().available,
            authoritative
        );
    }

    let again = service.reconcile(ReconcileTarget::All).unwrap();
    assert!(again.iter().all(|r| !r.drifted));
}

#[test]
fn voiding_after_payout_flags_the_floor_anomaly() {
    let service = test_service(WithdrawalPolicy::new(0));
    let seller_id = service.register_seller("Acme Outlet").unwrap();
    let order_id = OrderId::new();

    service
        .record_earned_commission(seller_id, order_id, 1000, CommissionStatus::Confirmed, None)
        .unwrap();
    let receipt = service.request_withdrawal(seller_id, 1000).unwrap();
    service
        .resolve_withdrawal(receipt.withdrawal_id, WithdrawalOutcome::Completed)
        .unwrap();

    // The order is refunded after the funds already left.
    service.void_commission(seller_id, order_id, None).unwrap();

    let reports = service
        .reconcile(ReconcileTarget::Seller(seller_id))
        .unwrap();
    let report = &reports[0];
    assert!(report.raw_negative);
    assert_eq!(report.authoritative, 0);
    assert_eq!(service.available_balance(seller_id).unwrap().available(), 0);
}

#[test]
fn concurrent_withdrawal_requests_never_overdraw() {
    let service = Arc::new(test_service(WithdrawalPolicy::new(0)));
    let seller_id = service.register_seller("Acme Outlet").unwrap();

    service
        .record_earned_commission(
            seller_id,
            OrderId::new(),
            1000,
            CommissionStatus::Confirmed,
            None,
        )
        .unwrap();

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || service.request_withdrawal(seller_id, 400))
        })
        .collect();

    let mut accepted: u64 = 0;
    for handle in threads {
        match handle.join().unwrap() {
            Ok(receipt) => accepted += receipt.amount,
            Err(DispatchError::Domain(LedgerError::InsufficientBalance { .. })) => {}
            // Under heavy contention a request may exhaust its bounded
            // retries; that is a refusal, not an overdraw.
            Err(DispatchError::Concurrency(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    // Whatever subset was admitted, its sum never exceeds the balance.
    assert!(accepted <= 1000);
    assert!(accepted >= 400, "at least one request should be admitted");

    let breakdown = service.available_balance(seller_id).unwrap();
    assert!(breakdown.raw() >= 0);
    assert_eq!(breakdown.pending_withdrawals as u64, accepted);
    assert_eq!(breakdown.available(), 1000 - accepted);

    // Concurrent cache refreshes may interleave (last-write-wins); the sweep
    // converges the cache on the authoritative value either way.
    let reports = service
        .reconcile(ReconcileTarget::Seller(seller_id))
        .unwrap();
    let report = &reports[0];
    assert_eq!(report.authoritative, 1000 - accepted);
    assert_eq!(
        service.cached_balance(seller_id).unwrap().available,
        1000 - accepted
    );
}
