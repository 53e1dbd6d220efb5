//! Pure balance calculation over the commission and withdrawal logs.
//!
//! The balance is always recomputed from the full entry set, never maintained
//! as an incremental counter. Pending withdrawals are subtracted the moment
//! they exist, so two requests can never jointly spend the same funds as long
//! as admission and subtraction happen inside one serialized operation (the
//! account aggregate guarantees that).

use serde::{Deserialize, Serialize};

use crate::account::{CommissionEntry, CommissionKind, CommissionStatus, WithdrawalEntry,
    WithdrawalStatus};

/// Aggregated money buckets for one seller, in the smallest currency unit.
///
/// `available()` floors at zero. A negative raw sum is not a normal state;
/// callers that care (the reconciliation sweep) check `floor_engaged()` and
/// flag it instead of silently normalizing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceBreakdown {
    pub confirmed_earned: u128,
    pub confirmed_reversed: u128,
    pub completed_withdrawals: u128,
    pub pending_withdrawals: u128,
}

impl BalanceBreakdown {
    /// Signed sum before flooring: confirmed earned minus confirmed reversals
    /// minus every withdrawal already committed or in flight.
    pub fn raw(&self) -> i128 {
        self.confirmed_earned as i128
            - self.confirmed_reversed as i128
            - self.completed_withdrawals as i128
            - self.pending_withdrawals as i128
    }

    /// Available balance, floored at zero.
    pub fn available(&self) -> u64 {
        let raw = self.raw();
        if raw <= 0 {
            0
        } else {
            u64::try_from(raw).unwrap_or(u64::MAX)
        }
    }

    /// True when the raw sum was negative and the zero floor masked it.
    /// This indicates drifted or inconsistent underlying data (e.g. revenue
    /// voided after the funds were already withdrawn).
    pub fn floor_engaged(&self) -> bool {
        self.raw() < 0
    }
}

/// Compute the balance buckets for one seller's entry set.
///
/// Only `confirmed` commissions count; `pending` commissions are money that
/// has not been verified as collected yet, and `voided` commissions never
/// count again. Both `pending` and `completed` withdrawals subtract.
pub fn compute(commissions: &[CommissionEntry], withdrawals: &[WithdrawalEntry]) -> BalanceBreakdown {
    let mut breakdown = BalanceBreakdown::default();

    for entry in commissions {
        if entry.status != CommissionStatus::Confirmed {
            continue;
        }
        match entry.kind {
            CommissionKind::Earned => breakdown.confirmed_earned += entry.amount as u128,
            CommissionKind::Reversed => breakdown.confirmed_reversed += entry.amount as u128,
        }
    }

    for entry in withdrawals {
        match entry.status {
            WithdrawalStatus::Pending => breakdown.pending_withdrawals += entry.amount as u128,
            WithdrawalStatus::Completed => breakdown.completed_withdrawals += entry.amount as u128,
            WithdrawalStatus::Rejected => {}
        }
    }

    breakdown
}
