use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route(
            "/sellers/:id/commissions",
            post(record_commission).get(list_commissions),
        )
        .route("/sellers/:id/commissions/:order_id/void", post(void_commission))
        .route(
            "/sellers/:id/commissions/:order_id/reversal",
            post(record_reversal),
        )
        .route("/orders/:order_id/confirm-revenue", post(confirm_revenue))
}

/// Order revenue became eligible: append the seller's commission entry.
pub async fn record_commission(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordCommissionRequest>,
) -> axum::response::Response {
    let seller_id = match common::parse_seller_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let order_id = match common::parse_order_id(&body.order_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let initial_status = match dto::parse_initial_commission_status(body.status.as_deref()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.record_earned_commission(
        seller_id,
        order_id,
        body.amount,
        initial_status,
        body.description,
    ) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "order_id": order_id.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_commissions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::StatusQuery>,
) -> axum::response::Response {
    let seller_id = match common::parse_seller_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let status = match query.status.as_deref().map(dto::parse_commission_status) {
        Some(Ok(s)) => Some(s),
        Some(Err(resp)) => return resp,
        None => None,
    };

    let items = services
        .list_order_commissions(seller_id, status)
        .into_iter()
        .map(dto::order_commission_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

/// Order cancelled/refunded: void its commission (status transition only,
/// the audit trail keeps the entry).
pub async fn void_commission(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, order_id)): Path<(String, String)>,
    Json(body): Json<dto::VoidCommissionRequest>,
) -> axum::response::Response {
    let seller_id = match common::parse_seller_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let order_id = match common::parse_order_id(&order_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.void_commission(seller_id, order_id, body.reason) {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "voided": true }))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Claw back previously confirmed revenue with a compensating entry.
pub async fn record_reversal(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, order_id)): Path<(String, String)>,
    Json(body): Json<dto::RecordReversalRequest>,
) -> axum::response::Response {
    let seller_id = match common::parse_seller_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let order_id = match common::parse_order_id(&order_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.record_reversal(seller_id, order_id, body.amount, body.description) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "order_id": order_id.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Operator verified collected funds (e.g. cash-on-delivery remittance).
pub async fn confirm_revenue(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
    Json(body): Json<dto::ConfirmRevenueRequest>,
) -> axum::response::Response {
    let order_id = match common::parse_order_id(&order_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.confirm_revenue(order_id, body.confirmed_amount) {
        Ok(seller_id) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "order_id": order_id.to_string(),
                "seller_id": seller_id.to_string(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
