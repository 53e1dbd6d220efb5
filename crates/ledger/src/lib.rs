//! Commission ledger core: the per-seller account aggregate and the pure
//! balance calculator.
//!
//! One seller owns one account stream. The stream is the authoritative record;
//! any cached balance elsewhere is a derived, repairable artifact.

pub mod account;
pub mod balance;

pub use account::{
    ACCOUNT_AGGREGATE_TYPE, AccountCommand, AccountEvent, AccountId, CommissionEntry,
    CommissionKind, CommissionRecorded, CommissionStatus, CommissionVoided, ConfirmRevenue,
    RecordCommission, RequestWithdrawal, ResolveWithdrawal, RevenueConfirmed, SellerAccount,
    VoidCommission, WithdrawalCompleted, WithdrawalEntry, WithdrawalId, WithdrawalOutcome,
    WithdrawalRejected, WithdrawalRequested, WithdrawalStatus,
};
pub use balance::BalanceBreakdown;
