//! Append-only event streams, one per aggregate.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use atelier_core::{AggregateId, ExpectedVersion};
use atelier_events::Event;

use crate::error::{SettlementError, SettlementResult};

/// An event ready to be appended (no sequence number yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl UncommittedEvent {
    /// Serialize a typed domain event, keeping its metadata alongside.
    pub fn from_typed<E: Event>(
        aggregate_id: AggregateId,
        aggregate_type: &str,
        event: &E,
    ) -> SettlementResult<Self> {
        Ok(Self {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload: serde_json::to_value(event)?,
        })
    }
}

/// A persisted event with its position in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    /// Starts at 1 and equals the aggregate version after this event.
    pub sequence_number: u64,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn decode<E: DeserializeOwned>(&self) -> SettlementResult<E> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Storage seam for aggregate streams.
pub trait EventStore: Send + Sync {
    /// Append a batch to a single stream, all or nothing.
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> SettlementResult<Vec<StoredEvent>>;

    fn load_stream(&self, aggregate_id: AggregateId) -> SettlementResult<Vec<StoredEvent>>;

    /// Ids of every stream holding `aggregate_type`, in id order.
    fn stream_ids(&self, aggregate_type: &str) -> SettlementResult<Vec<AggregateId>>;
}

/// In-memory event store for tests and single-process use.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<BTreeMap<AggregateId, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> SettlementResult<Vec<StoredEvent>> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let aggregate_id = first.aggregate_id;
        let aggregate_type = first.aggregate_type.clone();

        if let Some((idx, _)) = events
            .iter()
            .enumerate()
            .find(|(_, e)| e.aggregate_id != aggregate_id || e.aggregate_type != aggregate_type)
        {
            return Err(SettlementError::InvalidAppend(format!(
                "batch mixes streams (index {idx})"
            )));
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| SettlementError::LockPoisoned)?;
        let stream = streams.entry(aggregate_id).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(SettlementError::Concurrency(format!(
                "stream {aggregate_id}: expected {expected_version:?}, found {current}"
            )));
        }
        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(SettlementError::InvalidAppend(format!(
                    "stream holds '{}', attempted append of '{aggregate_type}'",
                    existing.aggregate_type
                )));
            }
        }

        let committed: Vec<StoredEvent> = events
            .into_iter()
            .zip(current + 1..)
            .map(|(e, sequence_number)| StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            })
            .collect();
        stream.extend(committed.iter().cloned());

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> SettlementResult<Vec<StoredEvent>> {
        let streams = self
            .streams
            .read()
            .map_err(|_| SettlementError::LockPoisoned)?;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn stream_ids(&self, aggregate_type: &str) -> SettlementResult<Vec<AggregateId>> {
        let streams = self
            .streams
            .read()
            .map_err(|_| SettlementError::LockPoisoned)?;
        Ok(streams
            .iter()
            .filter(|(_, stream)| {
                stream
                    .first()
                    .is_some_and(|e| e.aggregate_type == aggregate_type)
            })
            .map(|(id, _)| *id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({ "n": 1 }),
        }
    }

    #[test]
    fn append_assigns_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let first = store
            .append(vec![event(id, "order"), event(id, "order")], ExpectedVersion::Exact(0))
            .unwrap();
        assert_eq!(
            first.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![1, 2]
        );

        let next = store
            .append(vec![event(id, "order")], ExpectedVersion::Exact(2))
            .unwrap();
        assert_eq!(next[0].sequence_number, 3);
        assert_eq!(store.load_stream(id).unwrap().len(), 3);
    }

    #[test]
    fn stale_expected_version_is_a_conflict() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, "order")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![event(id, "order")], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, SettlementError::Concurrency(_)));
        assert_eq!(store.load_stream(id).unwrap().len(), 1);
    }

    #[test]
    fn mixed_batches_are_rejected() {
        let store = InMemoryEventStore::new();
        let err = store
            .append(
                vec![event(AggregateId::new(), "order"), event(AggregateId::new(), "order")],
                ExpectedVersion::Any,
            )
            .unwrap_err();
        assert!(matches!(err, SettlementError::InvalidAppend(_)));
    }

    #[test]
    fn stream_ids_filter_by_type() {
        let store = InMemoryEventStore::new();
        let order = AggregateId::new();
        let other = AggregateId::new();
        store
            .append(vec![event(order, "order")], ExpectedVersion::Any)
            .unwrap();
        store
            .append(vec![event(other, "product")], ExpectedVersion::Any)
            .unwrap();

        assert_eq!(store.stream_ids("order").unwrap(), vec![order]);
    }
}
