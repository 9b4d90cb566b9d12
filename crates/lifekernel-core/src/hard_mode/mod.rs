//! Hard Mode: a time-boxed, constrained daily planner.
//!
//! ## Session lifecycle
//!
//! ```text
//! activate -> [extend] -> plan_generated* -> item_flagged* -> [crisis_override] -> deactivate
//! ```
//!
//! The reducer follows a single `current_session` and ignores events for any
//! other session id. Keeping only one session active at a time is the job of
//! the dispatch layer (see [`crate::dispatch::Dispatcher::dispatch_hard_mode`]).
//!
//! ## Plans
//!
//! A generated plan is validated all-or-nothing against the session's
//! constraints ([`validate_plan`]), passed through the low-energy failsafe
//! ([`apply_low_energy_failsafe`]) and then corrected only through the four
//! flag operations in [`flags`].

mod constraints;
mod failsafe;
pub mod flags;
mod kernel;

pub use constraints::{effective_max_items, validate_plan, validate_scope};
pub use failsafe::{apply_low_energy_failsafe, is_low_energy, LOW_ENERGY_THRESHOLD};
pub use flags::{apply_flag, crisis_override, Flag, NOT_NOW_SHIFT_HOURS};
pub use kernel::{HardModeCommand, HardModeEvent, HardModeKernel, HardModeState};

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Application area a planned item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Habits,
    Tasks,
    Checkin,
    Review,
}

impl Module {
    /// Modules that survive the low-energy failsafe, one item each.
    pub const FAILSAFE_MODULES: [Module; 3] = [Module::Habits, Module::Tasks, Module::Checkin];
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Module::Habits => write!(f, "habits"),
            Module::Tasks => write!(f, "tasks"),
            Module::Checkin => write!(f, "checkin"),
            Module::Review => write!(f, "review"),
        }
    }
}

/// Which modules a session plans for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleScope {
    #[serde(default = "default_true")]
    pub habits: bool,
    #[serde(default = "default_true")]
    pub tasks: bool,
    #[serde(default = "default_true")]
    pub checkin: bool,
    #[serde(default = "default_true")]
    pub review: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ModuleScope {
    fn default() -> Self {
        Self {
            habits: true,
            tasks: true,
            checkin: true,
            review: true,
        }
    }
}

impl ModuleScope {
    pub fn includes(&self, module: Module) -> bool {
        match module {
            Module::Habits => self.habits,
            Module::Tasks => self.tasks,
            Module::Checkin => self.checkin,
            Module::Review => self.review,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.habits || self.tasks || self.checkin || self.review)
    }
}

/// Closed set of session constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HardModeConstraint {
    /// Every habit item must carry one of these anchors.
    AllowedHabitAnchors { anchors: Vec<String> },
    /// Upper bound on plan size. The smallest of several wins.
    MaxPlannedItems { max: usize },
    /// No item may belong to this module.
    DisallowModule { module: Module },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Action,
    Prompt,
    Rest,
}

impl Default for ItemKind {
    fn default() -> Self {
        ItemKind::Action
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Planned,
    Done,
    Dropped,
}

impl Default for ItemStatus {
    fn default() -> Self {
        ItemStatus::Planned
    }
}

/// Unit of Hard Mode planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedItem {
    pub id: String,
    pub module: Module,
    #[serde(default)]
    pub kind: ItemKind,
    pub title: String,
    pub scheduled_at: DateTime<Utc>,
    /// 0.0..=1.0
    pub confidence: f64,
    /// Opaque text from the plan generator, length-capped on intake.
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub habit_anchor: Option<String>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub flagged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_flag: Option<Flag>,
}

impl PlannedItem {
    pub fn new(
        id: impl Into<String>,
        module: Module,
        title: impl Into<String>,
        scheduled_at: DateTime<Utc>,
        confidence: f64,
    ) -> Self {
        Self {
            id: id.into(),
            module,
            kind: ItemKind::Action,
            title: title.into(),
            scheduled_at,
            confidence,
            rationale: String::new(),
            habit_anchor: None,
            status: ItemStatus::Planned,
            flagged_at: None,
            last_flag: None,
        }
    }

    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.habit_anchor = Some(anchor.into());
        self
    }

    pub fn is_planned(&self) -> bool {
        self.status == ItemStatus::Planned
    }
}

/// A validated plan for one day of the session window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    pub day: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub items: Vec<PlannedItem>,
    pub mood: Option<u8>,
    pub energy: Option<u8>,
    /// Whether the low-energy failsafe trimmed this plan.
    pub low_energy_applied: bool,
}

impl DayPlan {
    pub fn item(&self, item_id: &str) -> Option<&PlannedItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn planned(&self) -> impl Iterator<Item = &PlannedItem> {
        self.items.iter().filter(|i| i.is_planned())
    }
}

/// Inclusive range of days a session covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SessionWindow {
    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardModeSession {
    pub id: String,
    pub scope: ModuleScope,
    pub constraints: Vec<HardModeConstraint>,
    pub window: SessionWindow,
    pub is_active: bool,
    pub plan: Option<DayPlan>,
    pub activated_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub crisis_override_at: Option<DateTime<Utc>>,
}
