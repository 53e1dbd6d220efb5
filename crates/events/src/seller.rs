use marketpay_core::SellerId;

use crate::EventEnvelope;

/// Helper trait for seller-scoped messages.
///
/// Marks types carrying a seller id so infrastructure components (workers,
/// handlers) can filter or validate per-seller. A worker pinned to one seller
/// ignores everyone else's events; an unpinned worker sees the full firehose.
pub trait SellerScoped {
    fn seller_id(&self) -> SellerId;
}

impl<E> SellerScoped for EventEnvelope<E> {
    fn seller_id(&self) -> SellerId {
        self.seller_id()
    }
}
