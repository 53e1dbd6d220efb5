//! Seller directory projection.
//!
//! Registry of all registered sellers; the enumeration source for
//! reconcile-all sweeps and the admin seller list.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use marketpay_core::{AggregateId, SellerId};
use marketpay_events::EventEnvelope;
use marketpay_sellers::SellerEvent;

use crate::projections::cursor_store::ProjectionCursorStore;
use crate::read_model::ReadModelStore;

/// Read model: one registered seller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellerProfile {
    pub seller_id: SellerId,
    pub display_name: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    seller_id: SellerId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum SellerProjectionError {
    #[error("failed to deserialize seller event: {0}")]
    Deserialize(String),

    #[error("seller isolation violation: {0}")]
    SellerIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projection: seller events → seller directory.
#[derive(Debug)]
pub struct SellerDirectoryProjection<S, C = super::InMemoryCursorStore>
where
    S: ReadModelStore<SellerId, SellerProfile>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
    cursor_store: Option<Arc<C>>,
    projection_name: String,
}

impl<S> SellerDirectoryProjection<S>
where
    S: ReadModelStore<SellerId, SellerProfile>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            cursor_store: None,
            projection_name: "sellers.directory".to_string(),
        }
    }

    pub fn with_persistent_cursors<C: ProjectionCursorStore + 'static>(
        self,
        cursor_store: Arc<C>,
        projection_name: impl Into<String>,
    ) -> SellerDirectoryProjection<S, C> {
        SellerDirectoryProjection {
            store: self.store,
            cursors: RwLock::new(HashMap::new()),
            cursor_store: Some(cursor_store),
            projection_name: projection_name.into(),
        }
    }
}

impl<S, C> SellerDirectoryProjection<S, C>
where
    S: ReadModelStore<SellerId, SellerProfile>,
    C: ProjectionCursorStore + 'static,
{
    fn get_cursor(&self, seller_id: SellerId, aggregate_id: AggregateId) -> u64 {
        if let Some(ref cursor_store) = self.cursor_store {
            cursor_store
                .get_cursor(seller_id, aggregate_id, &self.projection_name)
                .unwrap_or(0)
        } else {
            match self.cursors.read() {
                Ok(cursors) => *cursors
                    .get(&CursorKey {
                        seller_id,
                        aggregate_id,
                    })
                    .unwrap_or(&0),
                Err(_) => 0,
            }
        }
    }

    fn update_cursor(&self, seller_id: SellerId, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                CursorKey {
                    seller_id,
                    aggregate_id,
                },
                sequence_number,
            );
        }

        if let Some(ref cursor_store) = self.cursor_store {
            cursor_store.update_cursor(
                seller_id,
                aggregate_id,
                &self.projection_name,
                sequence_number,
            );
        }
    }

    /// Look up a registered seller.
    pub fn get(&self, seller_id: &SellerId) -> Option<SellerProfile> {
        self.store.get(seller_id)
    }

    /// All registered sellers.
    pub fn list(&self) -> Vec<SellerProfile> {
        self.store.list()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), SellerProjectionError> {
        if envelope.aggregate_type() != "sellers.seller" {
            return Ok(());
        }

        let seller_id = envelope.seller_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.get_cursor(seller_id, aggregate_id);

        if seq == 0 {
            return Err(SellerProjectionError::NonMonotonicSequence { last, found: seq });
        }

        if seq <= last {
            return Ok(());
        }

        if seq != last + 1 && last != 0 {
            return Err(SellerProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: SellerEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| SellerProjectionError::Deserialize(e.to_string()))?;

        let event_seller = match &ev {
            SellerEvent::SellerRegistered(e) => e.seller_id,
            SellerEvent::SellerRenamed(e) => e.seller_id,
        };

        if event_seller != seller_id {
            return Err(SellerProjectionError::SellerIsolation(
                "event seller_id does not match envelope seller_id".to_string(),
            ));
        }

        match ev {
            SellerEvent::SellerRegistered(e) => {
                self.store.upsert(
                    e.seller_id,
                    SellerProfile {
                        seller_id: e.seller_id,
                        display_name: e.display_name,
                        registered_at: e.occurred_at,
                    },
                );
            }
            SellerEvent::SellerRenamed(e) => {
                if let Some(mut profile) = self.store.get(&e.seller_id) {
                    profile.display_name = e.display_name;
                    self.store.upsert(e.seller_id, profile);
                }
            }
        }

        self.update_cursor(seller_id, aggregate_id, seq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryReadModelStore;
    use marketpay_sellers::SellerRegistered;

    fn make_envelope(seller_id: SellerId, seq: u64, event: SellerEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            uuid::Uuid::now_v7(),
            seller_id,
            seller_id.account_aggregate(),
            "sellers.seller".to_string(),
            seq,
            serde_json::to_value(&event).unwrap(),
        )
    }

    #[test]
    fn registration_populates_the_directory() {
        let store = Arc::new(InMemoryReadModelStore::<SellerId, SellerProfile>::new());
        let proj = SellerDirectoryProjection::new(store.clone());

        let seller_id = SellerId::new();
        let event = SellerEvent::SellerRegistered(SellerRegistered {
            seller_id,
            display_name: "Acme Outlet".to_string(),
            occurred_at: Utc::now(),
        });

        proj.apply_envelope(&make_envelope(seller_id, 1, event))
            .unwrap();

        let profile = proj.get(&seller_id).unwrap();
        assert_eq!(profile.display_name, "Acme Outlet");
        assert_eq!(proj.list().len(), 1);
    }

    #[test]
    fn replayed_envelopes_are_skipped() {
        let store = Arc::new(InMemoryReadModelStore::<SellerId, SellerProfile>::new());
        let proj = SellerDirectoryProjection::new(store.clone());

        let seller_id = SellerId::new();
        let event = SellerEvent::SellerRegistered(SellerRegistered {
            seller_id,
            display_name: "Acme Outlet".to_string(),
            occurred_at: Utc::now(),
        });
        let env = make_envelope(seller_id, 1, event);

        proj.apply_envelope(&env).unwrap();
        // At-least-once delivery: duplicates are a no-op, not an error.
        proj.apply_envelope(&env).unwrap();

        assert_eq!(proj.list().len(), 1);
    }
}
