use std::collections::HashMap;
use std::sync::RwLock;

use marketpay_core::{AggregateId, ExpectedVersion, SellerId};

use super::query::{EventFilter, EventQuery, EventQueryResult, Pagination};
use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    seller_id: SellerId,
    aggregate_id: AggregateId,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    /// All events across all streams (rebuild support for projections).
    pub fn all_events(&self) -> Vec<StoredEvent> {
        let streams = match self.streams.read() {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        let mut events: Vec<StoredEvent> = streams.values().flatten().cloned().collect();
        events.sort_by(|a, b| {
            (a.seller_id.as_uuid(), a.aggregate_id.as_uuid(), a.sequence_number)
                .cmp(&(b.seller_id.as_uuid(), b.aggregate_id.as_uuid(), b.sequence_number))
        });
        events
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        // All events must target the same seller + aggregate stream.
        let seller_id = events[0].seller_id;
        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.seller_id != seller_id {
                return Err(EventStoreError::SellerIsolation(format!(
                    "batch contains multiple seller_ids (index {idx})"
                )));
            }
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let key = StreamKey {
            seller_id,
            aggregate_id,
        };

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let stream = streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        // Enforce aggregate type stability across the stream.
        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        // Assign sequence numbers and append (append-only).
        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                seller_id: e.seller_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        seller_id: SellerId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            seller_id,
            aggregate_id,
        };

        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams.get(&key).cloned().unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl EventQuery for InMemoryEventStore {
    async fn query_events(
        &self,
        seller_id: SellerId,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let mut matching: Vec<StoredEvent> = streams
            .iter()
            .filter(|(key, _)| key.seller_id == seller_id)
            .flat_map(|(_, events)| events.iter())
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        // Newest first for inspection; stable within a stream by sequence.
        matching.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then(a.sequence_number.cmp(&b.sequence_number))
        });

        let total = matching.len() as u64;
        let start = (pagination.offset as usize).min(matching.len());
        let end = (start + pagination.limit as usize).min(matching.len());
        let events = matching[start..end].to_vec();
        let has_more = (end as u64) < total;

        Ok(EventQueryResult {
            events,
            total,
            pagination,
            has_more,
        })
    }

    async fn get_event_by_id(
        &self,
        seller_id: SellerId,
        event_id: uuid::Uuid,
    ) -> Result<Option<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams
            .iter()
            .filter(|(key, _)| key.seller_id == seller_id)
            .flat_map(|(_, events)| events.iter())
            .find(|e| e.event_id == event_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn uncommitted(
        seller_id: SellerId,
        aggregate_id: AggregateId,
        event_type: &str,
    ) -> UncommittedEvent {
        UncommittedEvent {
            event_id: uuid::Uuid::now_v7(),
            seller_id,
            aggregate_id,
            aggregate_type: "ledger.account".to_string(),
            event_type: event_type.to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn append_assigns_monotonic_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let seller_id = SellerId::new();
        let aggregate_id = seller_id.account_aggregate();

        let committed = store
            .append(
                vec![
                    uncommitted(seller_id, aggregate_id, "a"),
                    uncommitted(seller_id, aggregate_id, "b"),
                ],
                ExpectedVersion::Exact(0),
            )
            .unwrap();

        assert_eq!(committed[0].sequence_number, 1);
        assert_eq!(committed[1].sequence_number, 2);

        let committed = store
            .append(
                vec![uncommitted(seller_id, aggregate_id, "c")],
                ExpectedVersion::Exact(2),
            )
            .unwrap();
        assert_eq!(committed[0].sequence_number, 3);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let seller_id = SellerId::new();
        let aggregate_id = seller_id.account_aggregate();

        store
            .append(
                vec![uncommitted(seller_id, aggregate_id, "a")],
                ExpectedVersion::Exact(0),
            )
            .unwrap();

        let err = store
            .append(
                vec![uncommitted(seller_id, aggregate_id, "b")],
                ExpectedVersion::Exact(0),
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn mixed_seller_batch_is_rejected() {
        let store = InMemoryEventStore::new();
        let seller_a = SellerId::new();
        let seller_b = SellerId::new();
        let aggregate_id = seller_a.account_aggregate();

        let mut other = uncommitted(seller_b, aggregate_id, "b");
        other.aggregate_id = aggregate_id;

        let err = store
            .append(
                vec![uncommitted(seller_a, aggregate_id, "a"), other],
                ExpectedVersion::Exact(0),
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::SellerIsolation(_)));
    }

    #[test]
    fn load_stream_is_seller_scoped() {
        let store = InMemoryEventStore::new();
        let seller_a = SellerId::new();
        let seller_b = SellerId::new();

        store
            .append(
                vec![uncommitted(seller_a, seller_a.account_aggregate(), "a")],
                ExpectedVersion::Exact(0),
            )
            .unwrap();

        let stream = store
            .load_stream(seller_b, seller_a.account_aggregate())
            .unwrap();
        assert!(stream.is_empty());
    }
}
