//! Infrastructure layer: event store, dispatcher, read models, projections,
//! reconciliation, notifications, and the ledger service facade.

pub mod command_dispatcher;
pub mod event_store;
pub mod notifications;
pub mod projections;
pub mod read_model;
pub mod reconciliation;
pub mod services;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use notifications::{LoggingPayoutNotifier, PayoutNotifier, spawn_payout_notifier};
pub use reconciliation::{ReconciliationReport, ReconciliationService, SellerBalance};
pub use services::{LedgerService, ReconcileTarget, WithdrawalPolicy, WithdrawalReceipt};
