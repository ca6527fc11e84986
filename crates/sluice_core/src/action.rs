//! Queued actions and their opaque payloads.

use crate::error::{CoreError, CoreResult};
use crate::types::{ActionId, ActionType, Priority, Timestamp};
use ciborium::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;

/// Opaque structured payload carried by an action.
///
/// The queue never interprets payloads beyond the minimal enqueue-time
/// validation: the bytes must form a well-formed CBOR map, and required
/// correlation fields (declared by the handler for the action type) must
/// be present. Everything else is the dispatch handler's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Creates a payload from raw CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the bytes are empty, not
    /// well-formed CBOR, or not a CBOR map at the top level.
    pub fn from_bytes(bytes: Vec<u8>) -> CoreResult<Self> {
        if bytes.is_empty() {
            return Err(CoreError::validation("payload must not be empty"));
        }
        let value: Value = ciborium::de::from_reader(bytes.as_slice())
            .map_err(|e| CoreError::validation(format!("payload is not well-formed CBOR: {e}")))?;
        if !matches!(value, Value::Map(_)) {
            return Err(CoreError::validation("payload must be a CBOR map"));
        }
        Ok(Self(bytes))
    }

    /// Builds a payload from string-keyed map entries.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the map cannot be encoded.
    pub fn from_map(entries: Vec<(&str, Value)>) -> CoreResult<Self> {
        let map = Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::Text(k.to_string()), v))
                .collect(),
        );
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&map, &mut bytes)
            .map_err(|e| CoreError::codec(format!("failed to encode payload: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Returns the raw CBOR bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed payload; present for completeness.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes the payload into a CBOR value.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the bytes do not decode; cannot happen
    /// for payloads built through [`Payload::from_bytes`].
    pub fn decode(&self) -> CoreResult<Value> {
        ciborium::de::from_reader(self.0.as_slice())
            .map_err(|e| CoreError::codec(format!("failed to decode payload: {e}")))
    }

    /// True if the top-level map contains the given string key.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        match self.decode() {
            Ok(Value::Map(entries)) => entries
                .iter()
                .any(|(k, _)| matches!(k, Value::Text(t) if t == key)),
            _ => false,
        }
    }

    /// Returns the required keys that are absent from the top-level map.
    #[must_use]
    pub fn missing_fields(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|key| !self.contains_key(key))
            .map(|key| (*key).to_string())
            .collect()
    }
}

/// A request to enqueue an action, before the queue has accepted it.
#[derive(Debug, Clone)]
pub struct ActionDraft {
    /// Which dispatch handler the action is for.
    pub action_type: ActionType,
    /// Opaque payload handed to the handler on dispatch.
    pub payload: Payload,
    /// Priority band, fixed for the action's lifetime.
    pub priority: Priority,
}

impl ActionDraft {
    /// Creates a draft from validated parts.
    #[must_use]
    pub fn new(action_type: ActionType, payload: Payload, priority: Priority) -> Self {
        Self {
            action_type,
            payload,
            priority,
        }
    }
}

/// An action accepted into the queue.
///
/// Created only by `ActionQueue::enqueue`; mutated only by the sync
/// engine's retry bookkeeping; destroyed only by removal (success,
/// permanent failure, retry exhaustion, or expiry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    /// Unique identifier, assigned at enqueue time.
    pub id: ActionId,
    /// Which dispatch handler applies.
    pub action_type: ActionType,
    /// Opaque payload for the handler.
    pub payload: Payload,
    /// Priority band, fixed at creation.
    pub priority: Priority,
    /// When the action was accepted.
    pub enqueued_at: Timestamp,
    /// Monotonic per-queue enqueue sequence; stabilizes FIFO order when
    /// two actions share a timestamp.
    pub sequence: u64,
    /// Recoverable failures so far.
    pub retry_count: u32,
    /// Retry budget derived from priority at creation; never recomputed.
    pub max_retries: u32,
    /// Last failure description, for diagnostics only.
    pub last_error: Option<String>,
}

impl QueuedAction {
    /// Time spent in the queue as of `now`.
    #[must_use]
    pub fn age(&self, now: Timestamp) -> Duration {
        now.since(self.enqueued_at)
    }

    /// True once the action has outlived the retention window.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp, retention_window: Duration) -> bool {
        self.age(now) > retention_window
    }

    /// True once the retry budget is spent.
    #[must_use]
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Drain ordering: priority descending, then enqueue time ascending,
    /// then enqueue sequence ascending.
    #[must_use]
    pub fn drain_cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.enqueued_at.cmp(&other.enqueued_at))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}
