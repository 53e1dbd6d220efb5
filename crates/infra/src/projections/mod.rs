//! Projection implementations (read model builders).
//!
//! Projections consume domain events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: reconstructable from the event stream
//! - **Seller-isolated**: records carry and are checked against the seller
//! - **Idempotent**: safe for at-least-once delivery (cursor-guarded)

pub mod cursor_store;
pub mod orders;
pub mod sellers;
pub mod withdrawals;

pub use cursor_store::{InMemoryCursorStore, PostgresCursorStore, ProjectionCursorStore};
pub use orders::{OrderCommissionReadModel, OrderDirectoryProjection, OrderProjectionError};
pub use sellers::{SellerDirectoryProjection, SellerProfile, SellerProjectionError};
pub use withdrawals::{
    WithdrawalProjectionError, WithdrawalQueueProjection, WithdrawalReadModel,
};
