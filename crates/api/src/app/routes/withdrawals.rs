use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route(
            "/sellers/:id/withdrawals",
            post(request_withdrawal).get(list_withdrawals),
        )
        .route("/withdrawals/pending", get(list_pending))
        .route("/withdrawals/:id", get(get_withdrawal))
        .route("/withdrawals/:id/resolve", post(resolve_withdrawal))
}

/// Seller requests a payout. Admission is checked against the available
/// balance inside the seller's serialized account stream.
pub async fn request_withdrawal(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RequestWithdrawalRequest>,
) -> axum::response::Response {
    let seller_id = match common::parse_seller_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.request_withdrawal(seller_id, body.amount) {
        Ok(receipt) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": receipt.withdrawal_id.to_string(),
                "amount": receipt.amount,
                "available_after": receipt.available_after,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_withdrawals(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::StatusQuery>,
) -> axum::response::Response {
    let seller_id = match common::parse_seller_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let status = match query.status.as_deref().map(dto::parse_withdrawal_status) {
        Some(Ok(s)) => Some(s),
        Some(Err(resp)) => return resp,
        None => None,
    };

    let items = services
        .list_withdrawals(seller_id, status)
        .into_iter()
        .map(dto::withdrawal_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

/// The admin payout work queue: every pending request across sellers.
pub async fn list_pending(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let items = services
        .list_pending_withdrawals()
        .into_iter()
        .map(dto::withdrawal_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_withdrawal(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let withdrawal_id = match common::parse_withdrawal_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.get_withdrawal(withdrawal_id) {
        Some(rm) => (StatusCode::OK, Json(dto::withdrawal_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "withdrawal not found"),
    }
}

/// Terminal resolution: completed pays out, rejected returns the funds.
/// A second resolution attempt is refused with a conflict.
pub async fn resolve_withdrawal(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ResolveWithdrawalRequest>,
) -> axum::response::Response {
    let withdrawal_id = match common::parse_withdrawal_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let outcome = match dto::parse_withdrawal_outcome(&body.outcome) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.resolve_withdrawal(withdrawal_id, outcome) {
        Ok(seller_id) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": withdrawal_id.to_string(),
                "seller_id": seller_id.to_string(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
