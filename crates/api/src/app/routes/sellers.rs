use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use marketpay_infra::event_store::{EventFilter, Pagination};

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/sellers", post(register_seller).get(list_sellers))
        .route("/sellers/:id", get(get_seller))
        .route("/sellers/:id/balance", get(get_balance))
        .route("/sellers/:id/events", get(list_events))
}

pub async fn register_seller(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterSellerRequest>,
) -> axum::response::Response {
    match services.register_seller(&body.name) {
        Ok(seller_id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": seller_id.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_sellers(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let items = services
        .list_sellers()
        .into_iter()
        .map(dto::seller_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_seller(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let seller_id = match common::parse_seller_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.get_seller(seller_id) {
        Some(profile) => (StatusCode::OK, Json(dto::seller_to_json(profile))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "seller not found"),
    }
}

/// Authoritative balance (recomputed from the event log) plus the cached
/// read-model value, so operators can see both sides of a reconciliation.
pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let seller_id = match common::parse_seller_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let breakdown = match services.available_balance(seller_id) {
        Ok(b) => b,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    let cached = services.cached_balance(seller_id).map(dto::cached_balance_to_json);

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "seller_id": seller_id.to_string(),
            "balance": dto::balance_to_json(breakdown),
            "cached": cached,
        })),
    )
        .into_response()
}

pub async fn list_events(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::EventsQuery>,
) -> axum::response::Response {
    let seller_id = match common::parse_seller_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let filter = EventFilter {
        event_type: query.event_type,
        ..Default::default()
    };
    let pagination = Pagination::new(query.limit, query.offset);

    match services.query_events(seller_id, filter, pagination).await {
        Ok(result) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "items": result.events.into_iter().map(dto::stored_event_to_json).collect::<Vec<_>>(),
                "total": result.total,
                "has_more": result.has_more,
            })),
        )
            .into_response(),
        Err(e) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
    }
}
