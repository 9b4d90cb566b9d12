//! Given/when/expect fixture over the handler/reducer contract.
//!
//! ```ignore
//! Trace::<TaskKernel>::given(prior_events)
//!     .when(command)
//!     .expect(expected_state);
//! ```
//!
//! `given` events are fed to the handler as history; the handler's output is
//! appended and the whole list is folded from the initial state, then
//! compared. Mismatches panic, so this is meant for tests.

use std::fmt::Debug;

use crate::error::{CoreError, Result};
use crate::events::{Command, Event, Kernel};

pub struct Trace<K: Kernel> {
    kernel: K,
    initial: K::State,
    given: Vec<Event<K::Event>>,
}

impl<K: Kernel + Default> Trace<K> {
    pub fn given(events: impl IntoIterator<Item = Event<K::Event>>) -> Self {
        Self::with_kernel(K::default()).and_given(events)
    }
}

impl<K: Kernel> Trace<K> {
    /// Start from an explicitly configured kernel with no history.
    pub fn with_kernel(kernel: K) -> Self {
        Self {
            kernel,
            initial: K::State::default(),
            given: Vec::new(),
        }
    }

    pub fn and_given(mut self, events: impl IntoIterator<Item = Event<K::Event>>) -> Self {
        self.given.extend(events);
        self
    }

    /// Fold from `initial` instead of the default state.
    pub fn starting_from(mut self, initial: K::State) -> Self {
        self.initial = initial;
        self
    }

    pub fn when(self, command: Command<K::Command>) -> Outcome<K> {
        let result = self.kernel.handle(&self.given, &command);
        Outcome {
            kernel: self.kernel,
            initial: self.initial,
            given: self.given,
            result,
        }
    }
}

/// Result of running one command against a history.
pub struct Outcome<K: Kernel> {
    kernel: K,
    initial: K::State,
    given: Vec<Event<K::Event>>,
    result: Result<Vec<Event<K::Event>>>,
}

impl<K: Kernel> Outcome<K> {
    /// Events the handler emitted. Panics if it raised.
    pub fn events(&self) -> &[Event<K::Event>] {
        match &self.result {
            Ok(events) => events,
            Err(err) => panic!("handler raised: {err}"),
        }
    }

    /// Fold of history plus emitted events. Panics if the handler raised.
    pub fn state(&self) -> K::State {
        let all: Vec<_> = self
            .given
            .iter()
            .chain(self.events().iter())
            .cloned()
            .collect();
        self.kernel.replay_from(self.initial.clone(), &all)
    }

    pub fn expect(self, expected: K::State) -> K::State
    where
        K::State: PartialEq + Debug,
    {
        let actual = self.state();
        assert_eq!(actual, expected, "folded state differs from expectation");
        actual
    }

    /// Compare emitted event bodies, ignoring envelopes.
    pub fn expect_events(self, expected: &[K::Event]) -> Self
    where
        K::Event: PartialEq + Debug,
    {
        let bodies: Vec<&K::Event> = self.events().iter().map(|e| &e.body).collect();
        let expected: Vec<&K::Event> = expected.iter().collect();
        assert_eq!(bodies, expected, "emitted events differ from expectation");
        self
    }

    /// The command was absorbed as a benign no-op.
    pub fn expect_no_events(self) -> Self {
        assert!(
            self.events().is_empty(),
            "expected no events, handler emitted {}",
            self.events().len()
        );
        self
    }

    /// The handler raised and the error satisfies `check`.
    pub fn expect_error(self, check: impl FnOnce(&CoreError) -> bool) {
        match &self.result {
            Ok(events) => panic!("expected an error, handler emitted {} events", events.len()),
            Err(err) => assert!(check(err), "unexpected error: {err}"),
        }
    }
}
