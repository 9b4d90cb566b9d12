//! # Lifekernel Core Library
//!
//! Event-sourced domain kernel for a personal life-management app. All state
//! is derived by folding an ordered, append-only event log; handlers are pure
//! functions of `(prior events, command)`.
//!
//! ## Architecture
//!
//! - **Envelopes**: generic `Command`/`Event` types and the [`Kernel`] trait
//! - **Domain kernels**: habits, check-ins, tasks and the weekly review
//! - **Hard Mode**: constrained daily planner with a four-operation flag protocol
//!   and a low-energy failsafe
//! - **Suggestions**: independent policies merged under a hard cap of three
//! - **Dispatch**: in-memory dedupe/append layer used by the CLI and tests
//!
//! ## Key Components
//!
//! - [`Kernel`]: handler/reducer contract every domain implements
//! - [`HardModeKernel`]: session lifecycle and plan validation
//! - [`suggest()`]: policy engine entry point
//! - [`Trace`]: given/when/expect fixture over any [`Kernel`]
//! - [`KernelConfig`]: TOML configuration

pub mod checkin;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod habit;
pub mod hard_mode;
pub mod review;
pub mod suggest;
pub mod task;
pub mod text;
pub mod trace;

pub use checkin::{CheckinCommand, CheckinEvent, CheckinKernel, CheckinState, MoodTrend};
pub use config::KernelConfig;
pub use dispatch::{Dispatched, Dispatcher, MemoryStore, Stream};
pub use error::{ConfigError, ConstraintViolation, CoreError, ValidationError};
pub use events::{Command, Event, Kernel, WireEvent};
pub use habit::{replay_habit_events, HabitCommand, HabitEvent, HabitKernel, HabitState};
pub use hard_mode::{
    validate_plan, HardModeCommand, HardModeConstraint, HardModeEvent, HardModeKernel,
    HardModeState, PlannedItem,
};
pub use review::{ReviewCommand, ReviewEvent, ReviewKernel, ReviewState};
pub use suggest::{suggest, PolicyInput, Suggestion};
pub use task::{TaskCommand, TaskEvent, TaskKernel, TaskState};
pub use trace::Trace;
