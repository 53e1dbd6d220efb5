//! Payout notifications.
//!
//! Every withdrawal transition notifies the surrounding system: a completed
//! request becomes a payout instruction, a rejected one a notice to the
//! seller. The notifier runs on a background worker fed from the event bus,
//! so a transition commits first and notification failure never rolls it
//! back. The bus is at-least-once; the worker tracks a per-stream cursor so
//! each transition is delivered to the notifier at most once per process.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::info;

use marketpay_core::{AggregateId, SellerId};
use marketpay_events::{EventBus, EventEnvelope};
use marketpay_ledger::{ACCOUNT_AGGREGATE_TYPE, AccountEvent, WithdrawalId};

use crate::workers::{ProjectionWorker, WorkerHandle};

/// Channel to the surrounding system for withdrawal transitions.
///
/// Implementations must tolerate being called late or not at all for a given
/// transition (process crash between commit and notify); the event stream
/// remains the source of truth for what actually happened.
pub trait PayoutNotifier: Send + Sync {
    /// A seller created a withdrawal request (funds now reserved).
    fn withdrawal_requested(&self, seller_id: SellerId, withdrawal_id: WithdrawalId, amount: u64);

    /// A request was approved; instruct the payment side to move funds.
    fn payout_due(&self, seller_id: SellerId, withdrawal_id: WithdrawalId, amount: u64);

    /// A request was rejected; the reserved amount is back in the pool.
    fn withdrawal_rejected(&self, seller_id: SellerId, withdrawal_id: WithdrawalId, amount: u64);
}

/// Default notifier: structured log lines only. Production wires a real
/// payment/notification client here.
#[derive(Debug, Default)]
pub struct LoggingPayoutNotifier;

impl PayoutNotifier for LoggingPayoutNotifier {
    fn withdrawal_requested(&self, seller_id: SellerId, withdrawal_id: WithdrawalId, amount: u64) {
        info!(%seller_id, %withdrawal_id, amount, "withdrawal requested");
    }

    fn payout_due(&self, seller_id: SellerId, withdrawal_id: WithdrawalId, amount: u64) {
        info!(%seller_id, %withdrawal_id, amount, "withdrawal completed; payout due");
    }

    fn withdrawal_rejected(&self, seller_id: SellerId, withdrawal_id: WithdrawalId, amount: u64) {
        info!(%seller_id, %withdrawal_id, amount, "withdrawal rejected");
    }
}

/// Spawn the background worker that turns committed withdrawal events into
/// notifier calls.
pub fn spawn_payout_notifier<B>(bus: B, notifier: Arc<dyn PayoutNotifier>) -> WorkerHandle
where
    B: EventBus<EventEnvelope<JsonValue>> + Send + Sync + 'static,
{
    // Per-stream dedupe cursor: the bus may redeliver, the notifier must not.
    let mut cursors: HashMap<AggregateId, u64> = HashMap::new();

    ProjectionWorker::spawn(
        "payout-notifier",
        bus,
        None,
        move |envelope: EventEnvelope<JsonValue>| -> Result<(), String> {
            if envelope.aggregate_type() != ACCOUNT_AGGREGATE_TYPE {
                return Ok(());
            }

            let seq = envelope.sequence_number();
            let cursor = cursors.entry(envelope.aggregate_id()).or_insert(0);
            if seq <= *cursor {
                return Ok(());
            }
            *cursor = seq;

            let ev: AccountEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| e.to_string())?;

            match ev {
                AccountEvent::WithdrawalRequested(e) => {
                    notifier.withdrawal_requested(e.seller_id, e.withdrawal_id, e.amount);
                }
                AccountEvent::WithdrawalCompleted(e) => {
                    notifier.payout_due(e.seller_id, e.withdrawal_id, e.amount);
                }
                AccountEvent::WithdrawalRejected(e) => {
                    notifier.withdrawal_rejected(e.seller_id, e.withdrawal_id, e.amount);
                }
                AccountEvent::CommissionRecorded(_)
                | AccountEvent::RevenueConfirmed(_)
                | AccountEvent::CommissionVoided(_) => {}
            }

            Ok(())
        },
    )
}
