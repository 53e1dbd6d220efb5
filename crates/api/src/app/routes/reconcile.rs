use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use marketpay_infra::services::ReconcileTarget;

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/reconcile", post(reconcile))
}

/// Administrative/scheduled trigger: realign cached balances with the
/// authoritative calculator, for one seller or all of them.
pub async fn reconcile(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ReconcileRequest>,
) -> axum::response::Response {
    let target = match body.seller_id.as_deref() {
        Some(raw) => match common::parse_seller_id(raw) {
            Ok(seller_id) => ReconcileTarget::Seller(seller_id),
            Err(resp) => return resp,
        },
        None => ReconcileTarget::All,
    };

    match services.reconcile(target) {
        Ok(reports) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "reports": reports.into_iter().map(dto::report_to_json).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
