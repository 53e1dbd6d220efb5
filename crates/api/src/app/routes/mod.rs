use axum::{Router, routing::get};

pub mod commissions;
pub mod common;
pub mod reconcile;
pub mod sellers;
pub mod system;
pub mod withdrawals;

/// Assemble the full route table.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .merge(sellers::router())
        .merge(commissions::router())
        .merge(withdrawals::router())
        .merge(reconcile::router())
}
