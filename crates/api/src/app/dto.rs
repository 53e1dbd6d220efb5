use axum::http::StatusCode;
use serde::Deserialize;

use marketpay_infra::event_store::StoredEvent;
use marketpay_infra::projections::{OrderCommissionReadModel, SellerProfile, WithdrawalReadModel};
use marketpay_infra::reconciliation::{ReconciliationReport, SellerBalance};
use marketpay_ledger::{BalanceBreakdown, CommissionStatus, WithdrawalOutcome, WithdrawalStatus};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterSellerRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordCommissionRequest {
    pub order_id: String,
    /// Amount in the smallest currency unit.
    pub amount: u64,
    /// "pending" (default; cash-on-delivery) or "confirmed" (prepaid).
    pub status: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordReversalRequest {
    pub amount: u64,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRevenueRequest {
    /// The amount the operator verified as collected; may be less than the
    /// order's recorded amount.
    pub confirmed_amount: u64,
}

#[derive(Debug, Deserialize)]
pub struct VoidCommissionRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequestWithdrawalRequest {
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
pub struct ResolveWithdrawalRequest {
    /// "completed" or "rejected".
    pub outcome: String,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    /// Reconcile one seller, or every registered seller when absent.
    pub seller_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub event_type: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// -------------------------
// Parsers
// -------------------------

pub fn parse_commission_status(s: &str) -> Result<CommissionStatus, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "pending" => Ok(CommissionStatus::Pending),
        "confirmed" => Ok(CommissionStatus::Confirmed),
        "voided" => Ok(CommissionStatus::Voided),
        _ => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_status",
            "status must be one of: pending, confirmed, voided",
        )),
    }
}

pub fn parse_initial_commission_status(
    s: Option<&str>,
) -> Result<CommissionStatus, axum::response::Response> {
    match s {
        None => Ok(CommissionStatus::Pending),
        Some(raw) => match parse_commission_status(raw)? {
            CommissionStatus::Voided => Err(errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_status",
                "initial status must be pending or confirmed",
            )),
            status => Ok(status),
        },
    }
}

pub fn parse_withdrawal_status(s: &str) -> Result<WithdrawalStatus, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "pending" => Ok(WithdrawalStatus::Pending),
        "completed" => Ok(WithdrawalStatus::Completed),
        "rejected" => Ok(WithdrawalStatus::Rejected),
        _ => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_status",
            "status must be one of: pending, completed, rejected",
        )),
    }
}

pub fn parse_withdrawal_outcome(s: &str) -> Result<WithdrawalOutcome, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "completed" => Ok(WithdrawalOutcome::Completed),
        "rejected" => Ok(WithdrawalOutcome::Rejected),
        _ => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_outcome",
            "outcome must be one of: completed, rejected",
        )),
    }
}

// -------------------------
// JSON mapping helpers
// -------------------------

fn commission_status_str(status: CommissionStatus) -> &'static str {
    match status {
        CommissionStatus::Pending => "pending",
        CommissionStatus::Confirmed => "confirmed",
        CommissionStatus::Voided => "voided",
    }
}

fn withdrawal_status_str(status: WithdrawalStatus) -> &'static str {
    match status {
        WithdrawalStatus::Pending => "pending",
        WithdrawalStatus::Completed => "completed",
        WithdrawalStatus::Rejected => "rejected",
    }
}

pub fn seller_to_json(rm: SellerProfile) -> serde_json::Value {
    serde_json::json!({
        "id": rm.seller_id.to_string(),
        "name": rm.display_name,
        "registered_at": rm.registered_at.to_rfc3339(),
    })
}

pub fn order_commission_to_json(rm: OrderCommissionReadModel) -> serde_json::Value {
    serde_json::json!({
        "order_id": rm.order_id.to_string(),
        "seller_id": rm.seller_id.to_string(),
        "amount": rm.amount,
        "status": commission_status_str(rm.status),
        "recorded_at": rm.recorded_at.to_rfc3339(),
    })
}

pub fn withdrawal_to_json(rm: WithdrawalReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.withdrawal_id.to_string(),
        "seller_id": rm.seller_id.to_string(),
        "amount": rm.amount,
        "status": withdrawal_status_str(rm.status),
        "requested_at": rm.requested_at.to_rfc3339(),
        "resolved_at": rm.resolved_at.map(|t| t.to_rfc3339()),
    })
}

pub fn balance_to_json(breakdown: BalanceBreakdown) -> serde_json::Value {
    serde_json::json!({
        "available": breakdown.available(),
        "confirmed_earned": breakdown.confirmed_earned as u64,
        "confirmed_reversed": breakdown.confirmed_reversed as u64,
        "pending_withdrawals": breakdown.pending_withdrawals as u64,
        "completed_withdrawals": breakdown.completed_withdrawals as u64,
    })
}

pub fn cached_balance_to_json(cached: SellerBalance) -> serde_json::Value {
    serde_json::json!({
        "available": cached.available,
        "refreshed_at": cached.refreshed_at.to_rfc3339(),
    })
}

pub fn report_to_json(report: ReconciliationReport) -> serde_json::Value {
    serde_json::json!({
        "seller_id": report.seller_id.to_string(),
        "cached_before": report.cached_before,
        "authoritative": report.authoritative,
        "drifted": report.drifted,
        "raw_negative": report.raw_negative,
    })
}

pub fn stored_event_to_json(event: StoredEvent) -> serde_json::Value {
    serde_json::json!({
        "event_id": event.event_id.to_string(),
        "aggregate_type": event.aggregate_type,
        "sequence_number": event.sequence_number,
        "event_type": event.event_type,
        "occurred_at": event.occurred_at.to_rfc3339(),
        "payload": event.payload,
    })
}
