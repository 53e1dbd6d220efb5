use axum::http::StatusCode;

use marketpay_core::{OrderId, SellerId};
use marketpay_ledger::WithdrawalId;

use crate::app::errors;

pub fn parse_seller_id(raw: &str) -> Result<SellerId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "malformed seller id")
    })
}

pub fn parse_order_id(raw: &str) -> Result<OrderId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "malformed order id")
    })
}

pub fn parse_withdrawal_id(raw: &str) -> Result<WithdrawalId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            "malformed withdrawal id",
        )
    })
}
