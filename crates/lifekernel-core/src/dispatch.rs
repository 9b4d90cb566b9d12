//! In-memory caller layer: dedupe, load, handle, append, fold.
//!
//! The kernels never see the store. This module plays the part of the
//! surrounding command layer so the full flow can run in tests and in the
//! CLI. Nothing here is persisted.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::events::{decode_all, replay_wire, Command, Kernel, WireEvent};
use crate::hard_mode::{HardModeCommand, HardModeKernel};

/// One aggregate family's event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stream {
    Habits,
    Tasks,
    Checkins,
    Reviews,
    HardMode,
}

impl Stream {
    pub const ALL: [Stream; 5] = [
        Stream::Habits,
        Stream::Tasks,
        Stream::Checkins,
        Stream::Reviews,
        Stream::HardMode,
    ];

    /// Event type prefix, e.g. `habit` for `habit.completed`.
    pub fn type_prefix(&self) -> &'static str {
        match self {
            Stream::Habits => "habit",
            Stream::Tasks => "task",
            Stream::Checkins => "checkin",
            Stream::Reviews => "review",
            Stream::HardMode => "hard_mode",
        }
    }

    /// Stream an event type belongs to, by prefix.
    pub fn of_event_type(event_type: &str) -> Option<Stream> {
        let (prefix, _) = event_type.split_once('.')?;
        Stream::ALL.into_iter().find(|s| s.type_prefix() == prefix)
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Habits => write!(f, "habits"),
            Stream::Tasks => write!(f, "tasks"),
            Stream::Checkins => write!(f, "checkins"),
            Stream::Reviews => write!(f, "reviews"),
            Stream::HardMode => write!(f, "hard-mode"),
        }
    }
}

impl FromStr for Stream {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Stream::ALL
            .into_iter()
            .find(|stream| stream.to_string() == s)
            .ok_or_else(|| CoreError::Custom(format!("unknown stream: {s}")))
    }
}

/// Append-only per-stream log with a uniqueness index on idempotency key.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    streams: BTreeMap<Stream, Vec<WireEvent>>,
    keys: BTreeSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a mixed log, routing events by type prefix.
    /// Events with an unrecognised prefix are dropped.
    pub fn from_log(events: impl IntoIterator<Item = WireEvent>) -> Self {
        let mut store = Self::new();
        for event in events {
            match Stream::of_event_type(&event.event_type) {
                Some(stream) => {
                    store.keys.insert(event.idempotency_key.clone());
                    store.streams.entry(stream).or_default().push(event);
                }
                None => {
                    tracing::debug!(event_type = %event.event_type, "event with unknown stream dropped");
                }
            }
        }
        store
    }

    pub fn contains_key(&self, idempotency_key: &str) -> bool {
        self.keys.contains(idempotency_key)
    }

    pub fn stream(&self, stream: Stream) -> &[WireEvent] {
        self.streams.get(&stream).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.streams.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record `key` and append `events`. Rejects a key seen before.
    pub fn append(&mut self, stream: Stream, key: &str, events: Vec<WireEvent>) -> Result<()> {
        if !self.keys.insert(key.to_string()) {
            return Err(CoreError::Custom(format!(
                "idempotency key '{key}' already recorded"
            )));
        }
        self.streams.entry(stream).or_default().extend(events);
        Ok(())
    }
}

/// What happened to a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// The handler ran; `events` may be zero for a benign no-op.
    Applied { events: usize },
    /// The idempotency key was already recorded; the handler did not run.
    Duplicate,
}

/// Runs commands against a [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    store: MemoryStore,
}

impl Dispatcher {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn into_store(self) -> MemoryStore {
        self.store
    }

    /// Dedupe, load the stream, run the handler and append its events.
    ///
    /// # Errors
    ///
    /// Propagates validation and constraint errors from the handler. Nothing
    /// is appended and the key is not recorded, so a corrected retry can
    /// reuse it.
    pub fn dispatch<K>(
        &mut self,
        stream: Stream,
        kernel: &K,
        command: &Command<K::Command>,
    ) -> Result<Dispatched>
    where
        K: Kernel,
        K::Event: Serialize + DeserializeOwned,
    {
        if self.store.contains_key(&command.idempotency_key) {
            tracing::debug!(%stream, key = %command.idempotency_key, "duplicate command skipped");
            return Ok(Dispatched::Duplicate);
        }

        let prior = decode_all::<K::Event>(self.store.stream(stream));
        let events = kernel.handle(&prior, command)?;
        let wire = events
            .iter()
            .map(WireEvent::encode)
            .collect::<Result<Vec<_>>>()?;
        let count = wire.len();
        self.store.append(stream, &command.idempotency_key, wire)?;
        Ok(Dispatched::Applied { events: count })
    }

    /// Fold a stream from the default state.
    pub fn state<K>(&self, stream: Stream, kernel: &K) -> K::State
    where
        K: Kernel,
        K::Event: DeserializeOwned,
    {
        replay_wire(kernel, K::State::default(), self.store.stream(stream))
    }

    /// Dispatch a Hard Mode command, refusing activation while a different
    /// session is still active.
    pub fn dispatch_hard_mode(
        &mut self,
        kernel: &HardModeKernel,
        command: &Command<HardModeCommand>,
    ) -> Result<Dispatched> {
        if let HardModeCommand::Activate { session_id, .. } = &command.body {
            if !self.store.contains_key(&command.idempotency_key) {
                let state = self.state(Stream::HardMode, kernel);
                if let Some(active) = state.active_session().filter(|s| s.id != *session_id) {
                    tracing::warn!(active = %active.id, requested = %session_id, "activation refused");
                    return Err(CoreError::SessionAlreadyActive {
                        session_id: active.id.clone(),
                    });
                }
            }
        }
        self.dispatch(Stream::HardMode, kernel, command)
    }
}
