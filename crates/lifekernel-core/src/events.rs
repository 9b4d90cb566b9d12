//! Command/Event envelopes and the handler/reducer contract.
//!
//! Every domain owns a closed event enum. The envelope around it is shared:
//!
//! ```text
//! Command { type, idempotencyKey, requestedAt, payload, meta }
//! Event   { type, occurredAt,     idempotencyKey, payload, meta }
//! ```
//!
//! A [`Kernel`] turns `(prior events, command)` into new events and folds
//! events into state. Deduplication by idempotency key happens before a
//! handler is ever called (see [`crate::dispatch`]).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Free-form metadata carried from a command onto every event it produces.
pub type Meta = BTreeMap<String, serde_json::Value>;

/// A request to change state. `C` is the domain's command enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command<C> {
    pub idempotency_key: String,
    pub requested_at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: C,
    #[serde(default)]
    pub meta: Meta,
}

impl<C> Command<C> {
    pub fn new(idempotency_key: impl Into<String>, requested_at: DateTime<Utc>, body: C) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            requested_at,
            body,
            meta: Meta::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Wrap an event body produced in response to this command.
    pub fn emit<E>(&self, body: E) -> Event<E> {
        Event {
            occurred_at: self.requested_at,
            idempotency_key: self.idempotency_key.clone(),
            body,
            meta: self.meta.clone(),
        }
    }
}

/// A fact that happened. `E` is the domain's event enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event<E> {
    pub occurred_at: DateTime<Utc>,
    pub idempotency_key: String,
    #[serde(flatten)]
    pub body: E,
    #[serde(default)]
    pub meta: Meta,
}

impl<E> Event<E> {
    pub fn new(idempotency_key: impl Into<String>, occurred_at: DateTime<Utc>, body: E) -> Self {
        Self {
            occurred_at,
            idempotency_key: idempotency_key.into(),
            body,
            meta: Meta::new(),
        }
    }
}

/// A pure command handler paired with its reducer.
///
/// Implementations hold only immutable configuration. `handle` must not
/// consult anything besides its arguments; `reduce` must treat every event
/// it cannot apply as a no-op.
pub trait Kernel {
    type Command;
    type Event: Clone;
    type State: Default + Clone;

    /// Produce new events. `Ok(vec![])` is a benign rejection; `Err` is a
    /// true invariant violation and nothing is emitted.
    fn handle(
        &self,
        prior: &[Event<Self::Event>],
        command: &Command<Self::Command>,
    ) -> Result<Vec<Event<Self::Event>>>;

    fn reduce(&self, state: Self::State, event: &Event<Self::Event>) -> Self::State;

    /// Fold from the empty state.
    fn replay(&self, events: &[Event<Self::Event>]) -> Self::State {
        self.replay_from(Self::State::default(), events)
    }

    /// Fold from an explicit initial state.
    fn replay_from(&self, initial: Self::State, events: &[Event<Self::Event>]) -> Self::State {
        events
            .iter()
            .fold(initial, |state, event| self.reduce(state, event))
    }
}

/// Event as stored on the wire: the type tag is kept as a plain string and the
/// payload as raw JSON, so a log written by a newer build still loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub idempotency_key: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub meta: Meta,
}

/// Shape every domain event enum serializes to: `{"type": ..., "payload": ...}`.
#[derive(Serialize, Deserialize)]
struct Tagged {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl WireEvent {
    /// Encode a typed event.
    pub fn encode<E: Serialize>(event: &Event<E>) -> Result<Self> {
        let tagged: Tagged = serde_json::from_value(serde_json::to_value(&event.body)?)?;
        Ok(Self {
            event_type: tagged.event_type,
            occurred_at: event.occurred_at,
            idempotency_key: event.idempotency_key.clone(),
            payload: tagged.payload,
            meta: event.meta.clone(),
        })
    }

    /// Decode into a typed event. Returns `None` when the type tag (or its
    /// payload shape) is unknown to this build.
    pub fn decode<E: DeserializeOwned>(&self) -> Option<Event<E>> {
        let tagged = serde_json::json!({
            "type": self.event_type,
            "payload": self.payload,
        });
        match serde_json::from_value::<E>(tagged) {
            Ok(body) => Some(Event {
                occurred_at: self.occurred_at,
                idempotency_key: self.idempotency_key.clone(),
                body,
                meta: self.meta.clone(),
            }),
            Err(err) => {
                tracing::debug!(
                    event_type = %self.event_type,
                    error = %err,
                    "skipping event this build cannot decode"
                );
                None
            }
        }
    }
}

/// Decode a wire log, dropping events of unknown type.
pub fn decode_all<E: DeserializeOwned>(wire: &[WireEvent]) -> Vec<Event<E>> {
    wire.iter().filter_map(WireEvent::decode).collect()
}

/// Fold a wire log with `kernel`, treating unknown event types as no-ops.
pub fn replay_wire<K>(kernel: &K, initial: K::State, wire: &[WireEvent]) -> K::State
where
    K: Kernel,
    K::Event: DeserializeOwned,
{
    kernel.replay_from(initial, &decode_all(wire))
}
