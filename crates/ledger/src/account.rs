use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use marketpay_core::{Aggregate, AggregateId, AggregateRoot, LedgerError, OrderId, SellerId};
use marketpay_events::Event;

use crate::balance::{self, BalanceBreakdown};

/// Aggregate type identifier for seller account streams.
pub const ACCOUNT_AGGREGATE_TYPE: &str = "ledger.account";

/// Commission direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionKind {
    /// Money owed to the seller for an order.
    Earned,
    /// A compensating entry clawing back previously confirmed commission.
    Reversed,
}

/// Commission entry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    /// Created but the underlying funds are not yet verified as collected.
    Pending,
    /// Funds verified; the entry counts toward the available pool.
    Confirmed,
    /// Underlying order cancelled/refunded. Terminal; never counts again.
    Voided,
}

/// Withdrawal request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Rejected,
}

/// Terminal outcome chosen when resolving a pending withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalOutcome {
    Completed,
    Rejected,
}

/// Identifier of a withdrawal request (entity within a seller's account).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WithdrawalId(Uuid);

impl WithdrawalId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WithdrawalId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for WithdrawalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for WithdrawalId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| LedgerError::invalid_id(format!("WithdrawalId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Account identifier (aggregate id). One account per seller; the uuids match.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub AggregateId);

impl AccountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn for_seller(seller_id: SellerId) -> Self {
        Self(seller_id.account_aggregate())
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One commission event in the append-only log.
///
/// Entries are never removed; `status` is the only field that ever changes,
/// and `amount` is replaced once when revenue is confirmed for a different
/// amount than was recorded (partial confirmation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionEntry {
    pub order_id: OrderId,
    /// Positive amount in the smallest currency unit (e.g., cents).
    pub amount: u64,
    pub kind: CommissionKind,
    pub status: CommissionStatus,
    pub description: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// One withdrawal request in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalEntry {
    pub id: WithdrawalId,
    /// Positive amount in the smallest currency unit.
    pub amount: u64,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Aggregate root: SellerAccount.
///
/// One event stream per seller holding both the commission log and the
/// withdrawal request log. Keeping them in one stream makes "check available
/// balance, then create a pending withdrawal" a single serialized
/// read-modify-write: the admission check in `handle` and the subtraction it
/// relies on can never interleave with a concurrent request on the same
/// seller (the store's optimistic version check rejects the loser).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellerAccount {
    id: AccountId,
    seller_id: Option<SellerId>,
    commissions: Vec<CommissionEntry>,
    withdrawals: Vec<WithdrawalEntry>,
    version: u64,
    created: bool,
}

impl SellerAccount {
    /// Empty aggregate for rehydration.
    pub fn empty(id: AccountId) -> Self {
        Self {
            id,
            seller_id: None,
            commissions: Vec::new(),
            withdrawals: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> AccountId {
        self.id
    }

    pub fn seller_id(&self) -> Option<SellerId> {
        self.seller_id
    }

    pub fn commissions(&self) -> &[CommissionEntry] {
        &self.commissions
    }

    pub fn withdrawals(&self) -> &[WithdrawalEntry] {
        &self.withdrawals
    }

    /// Commission entries filtered by status and/or kind.
    pub fn commissions_filtered(
        &self,
        status: Option<CommissionStatus>,
        kind: Option<CommissionKind>,
    ) -> Vec<&CommissionEntry> {
        self.commissions
            .iter()
            .filter(|e| status.is_none_or(|s| e.status == s))
            .filter(|e| kind.is_none_or(|k| e.kind == k))
            .collect()
    }

    /// Withdrawal entries filtered by status.
    pub fn withdrawals_filtered(&self, status: Option<WithdrawalStatus>) -> Vec<&WithdrawalEntry> {
        self.withdrawals
            .iter()
            .filter(|e| status.is_none_or(|s| e.status == s))
            .collect()
    }

    /// The `earned` commission entry for an order, if any.
    pub fn earned_commission(&self, order_id: OrderId) -> Option<&CommissionEntry> {
        self.commissions
            .iter()
            .find(|e| e.order_id == order_id && e.kind == CommissionKind::Earned)
    }

    pub fn withdrawal(&self, id: WithdrawalId) -> Option<&WithdrawalEntry> {
        self.withdrawals.iter().find(|e| e.id == id)
    }

    /// Authoritative balance buckets, recomputed from the full entry set.
    pub fn balance(&self) -> BalanceBreakdown {
        balance::compute(&self.commissions, &self.withdrawals)
    }

    /// Available balance, floored at zero.
    pub fn available_balance(&self) -> u64 {
        self.balance().available()
    }
}

impl AggregateRoot for SellerAccount {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordCommission (append a commission entry for an order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCommission {
    pub seller_id: SellerId,
    pub order_id: OrderId,
    pub amount: u64,
    pub kind: CommissionKind,
    /// Initial status: `Pending` for cash-on-delivery orders awaiting
    /// collection, `Confirmed` for prepaid revenue.
    pub initial_status: CommissionStatus,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmRevenue (operator verified collected funds for an order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmRevenue {
    pub seller_id: SellerId,
    pub order_id: OrderId,
    /// May differ from the recorded amount; partial confirmation is legal.
    pub confirmed_amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidCommission (order cancelled/refunded after creation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidCommission {
    pub seller_id: SellerId,
    pub order_id: OrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RequestWithdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestWithdrawal {
    pub seller_id: SellerId,
    pub withdrawal_id: WithdrawalId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResolveWithdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveWithdrawal {
    pub seller_id: SellerId,
    pub withdrawal_id: WithdrawalId,
    pub outcome: WithdrawalOutcome,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountCommand {
    RecordCommission(RecordCommission),
    ConfirmRevenue(ConfirmRevenue),
    VoidCommission(VoidCommission),
    RequestWithdrawal(RequestWithdrawal),
    ResolveWithdrawal(ResolveWithdrawal),
}

/// Event: CommissionRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRecorded {
    pub seller_id: SellerId,
    pub order_id: OrderId,
    pub amount: u64,
    pub kind: CommissionKind,
    pub status: CommissionStatus,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RevenueConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueConfirmed {
    pub seller_id: SellerId,
    pub order_id: OrderId,
    pub confirmed_amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CommissionVoided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionVoided {
    pub seller_id: SellerId,
    pub order_id: OrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WithdrawalRequested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequested {
    pub seller_id: SellerId,
    pub withdrawal_id: WithdrawalId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WithdrawalCompleted (funds paid out).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalCompleted {
    pub seller_id: SellerId,
    pub withdrawal_id: WithdrawalId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WithdrawalRejected (reserved amount returned to the pool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRejected {
    pub seller_id: SellerId,
    pub withdrawal_id: WithdrawalId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    CommissionRecorded(CommissionRecorded),
    RevenueConfirmed(RevenueConfirmed),
    CommissionVoided(CommissionVoided),
    WithdrawalRequested(WithdrawalRequested),
    WithdrawalCompleted(WithdrawalCompleted),
    WithdrawalRejected(WithdrawalRejected),
}

impl AccountEvent {
    pub fn seller_id(&self) -> SellerId {
        match self {
            AccountEvent::CommissionRecorded(e) => e.seller_id,
            AccountEvent::RevenueConfirmed(e) => e.seller_id,
            AccountEvent::CommissionVoided(e) => e.seller_id,
            AccountEvent::WithdrawalRequested(e) => e.seller_id,
            AccountEvent::WithdrawalCompleted(e) => e.seller_id,
            AccountEvent::WithdrawalRejected(e) => e.seller_id,
        }
    }
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::CommissionRecorded(_) => "ledger.account.commission_recorded",
            AccountEvent::RevenueConfirmed(_) => "ledger.account.revenue_confirmed",
            AccountEvent::CommissionVoided(_) => "ledger.account.commission_voided",
            AccountEvent::WithdrawalRequested(_) => "ledger.account.withdrawal_requested",
            AccountEvent::WithdrawalCompleted(_) => "ledger.account.withdrawal_completed",
            AccountEvent::WithdrawalRejected(_) => "ledger.account.withdrawal_rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountEvent::CommissionRecorded(e) => e.occurred_at,
            AccountEvent::RevenueConfirmed(e) => e.occurred_at,
            AccountEvent::CommissionVoided(e) => e.occurred_at,
            AccountEvent::WithdrawalRequested(e) => e.occurred_at,
            AccountEvent::WithdrawalCompleted(e) => e.occurred_at,
            AccountEvent::WithdrawalRejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SellerAccount {
    type Command = AccountCommand;
    type Event = AccountEvent;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        if self.seller_id.is_none() {
            self.seller_id = Some(event.seller_id());
            self.created = true;
        }

        match event {
            AccountEvent::CommissionRecorded(e) => {
                self.commissions.push(CommissionEntry {
                    order_id: e.order_id,
                    amount: e.amount,
                    kind: e.kind,
                    status: e.status,
                    description: e.description.clone(),
                    recorded_at: e.occurred_at,
                });
            }
            AccountEvent::RevenueConfirmed(e) => {
                if let Some(entry) = self
                    .commissions
                    .iter_mut()
                    .find(|c| c.order_id == e.order_id && c.kind == CommissionKind::Earned)
                {
                    entry.status = CommissionStatus::Confirmed;
                    entry.amount = e.confirmed_amount;
                }
            }
            AccountEvent::CommissionVoided(e) => {
                if let Some(entry) = self
                    .commissions
                    .iter_mut()
                    .find(|c| c.order_id == e.order_id && c.kind == CommissionKind::Earned)
                {
                    entry.status = CommissionStatus::Voided;
                }
            }
            AccountEvent::WithdrawalRequested(e) => {
                self.withdrawals.push(WithdrawalEntry {
                    id: e.withdrawal_id,
                    amount: e.amount,
                    status: WithdrawalStatus::Pending,
                    requested_at: e.occurred_at,
                    resolved_at: None,
                });
            }
            AccountEvent::WithdrawalCompleted(e) => {
                if let Some(entry) = self.withdrawals.iter_mut().find(|w| w.id == e.withdrawal_id) {
                    entry.status = WithdrawalStatus::Completed;
                    entry.resolved_at = Some(e.occurred_at);
                }
            }
            AccountEvent::WithdrawalRejected(e) => {
                if let Some(entry) = self.withdrawals.iter_mut().find(|w| w.id == e.withdrawal_id) {
                    entry.status = WithdrawalStatus::Rejected;
                    entry.resolved_at = Some(e.occurred_at);
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AccountCommand::RecordCommission(cmd) => self.handle_record(cmd),
            AccountCommand::ConfirmRevenue(cmd) => self.handle_confirm(cmd),
            AccountCommand::VoidCommission(cmd) => self.handle_void(cmd),
            AccountCommand::RequestWithdrawal(cmd) => self.handle_request_withdrawal(cmd),
            AccountCommand::ResolveWithdrawal(cmd) => self.handle_resolve_withdrawal(cmd),
        }
    }
}

impl SellerAccount {
    fn ensure_seller(&self, seller_id: SellerId) -> Result<(), LedgerError> {
        if !self.created {
            return Ok(());
        }
        if self.seller_id != Some(seller_id) {
            return Err(LedgerError::conflict("seller_id mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordCommission) -> Result<Vec<AccountEvent>, LedgerError> {
        self.ensure_seller(cmd.seller_id)?;

        if cmd.amount == 0 {
            return Err(LedgerError::invalid_amount("amount must be positive"));
        }

        if cmd.initial_status == CommissionStatus::Voided {
            return Err(LedgerError::validation(
                "initial status must be pending or confirmed",
            ));
        }

        // One entry per (order, kind): replaying the order-delivered hook must
        // not double-pay the seller.
        if self
            .commissions
            .iter()
            .any(|c| c.order_id == cmd.order_id && c.kind == cmd.kind)
        {
            return Err(LedgerError::conflict(
                "commission already recorded for this order",
            ));
        }

        Ok(vec![AccountEvent::CommissionRecorded(CommissionRecorded {
            seller_id: cmd.seller_id,
            order_id: cmd.order_id,
            amount: cmd.amount,
            kind: cmd.kind,
            status: cmd.initial_status,
            description: cmd.description.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmRevenue) -> Result<Vec<AccountEvent>, LedgerError> {
        if !self.created {
            return Err(LedgerError::not_found());
        }
        self.ensure_seller(cmd.seller_id)?;

        if cmd.confirmed_amount == 0 {
            return Err(LedgerError::invalid_amount(
                "confirmed amount must be positive",
            ));
        }

        let entry = self
            .earned_commission(cmd.order_id)
            .ok_or(LedgerError::NotFound)?;

        match entry.status {
            CommissionStatus::Confirmed => Err(LedgerError::AlreadyConfirmed),
            CommissionStatus::Voided => Err(LedgerError::transition(
                "cannot confirm revenue for a voided commission",
            )),
            CommissionStatus::Pending => {
                Ok(vec![AccountEvent::RevenueConfirmed(RevenueConfirmed {
                    seller_id: cmd.seller_id,
                    order_id: cmd.order_id,
                    confirmed_amount: cmd.confirmed_amount,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }

    fn handle_void(&self, cmd: &VoidCommission) -> Result<Vec<AccountEvent>, LedgerError> {
        if !self.created {
            return Err(LedgerError::not_found());
        }
        self.ensure_seller(cmd.seller_id)?;

        let entry = self
            .earned_commission(cmd.order_id)
            .ok_or(LedgerError::NotFound)?;

        if entry.status == CommissionStatus::Voided {
            return Err(LedgerError::transition("commission already voided"));
        }

        Ok(vec![AccountEvent::CommissionVoided(CommissionVoided {
            seller_id: cmd.seller_id,
            order_id: cmd.order_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_request_withdrawal(
        &self,
        cmd: &RequestWithdrawal,
    ) -> Result<Vec<AccountEvent>, LedgerError> {
        self.ensure_seller(cmd.seller_id)?;

        if cmd.amount == 0 {
            return Err(LedgerError::invalid_amount("amount must be positive"));
        }

        if self.withdrawal(cmd.withdrawal_id).is_some() {
            return Err(LedgerError::conflict("withdrawal_id already used"));
        }

        // Admission check and reservation live in the same serialized
        // decision: the emitted event subtracts from the pool the moment it
        // is appended, so a concurrent request on this stream either loses
        // the version race or sees the reduced balance.
        let available = self.available_balance();
        if cmd.amount > available {
            return Err(LedgerError::insufficient_balance(cmd.amount, available));
        }

        Ok(vec![AccountEvent::WithdrawalRequested(WithdrawalRequested {
            seller_id: cmd.seller_id,
            withdrawal_id: cmd.withdrawal_id,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_resolve_withdrawal(
        &self,
        cmd: &ResolveWithdrawal,
    ) -> Result<Vec<AccountEvent>, LedgerError> {
        if !self.created {
            return Err(LedgerError::not_found());
        }
        self.ensure_seller(cmd.seller_id)?;

        let entry = self
            .withdrawal(cmd.withdrawal_id)
            .ok_or(LedgerError::NotFound)?;

        if entry.status != WithdrawalStatus::Pending {
            return Err(LedgerError::transition("withdrawal already resolved"));
        }

        let event = match cmd.outcome {
            WithdrawalOutcome::Completed => {
                AccountEvent::WithdrawalCompleted(WithdrawalCompleted {
                    seller_id: cmd.seller_id,
                    withdrawal_id: cmd.withdrawal_id,
                    amount: entry.amount,
                    occurred_at: cmd.occurred_at,
                })
            }
            WithdrawalOutcome::Rejected => AccountEvent::WithdrawalRejected(WithdrawalRejected {
                seller_id: cmd.seller_id,
                withdrawal_id: cmd.withdrawal_id,
                amount: entry.amount,
                occurred_at: cmd.occurred_at,
            }),
        };

        Ok(vec![event])
    }
}
