//! Habit definitions, scheduling rules and per-day completion rules.
//!
//! A habit is *active* on a day when the day lies inside its start/end window
//! and outside its pause window. It is *scheduled* on a day when the weekday
//! matches its cadence. Only active, scheduled habits are expected to be
//! logged.

mod kernel;

pub use kernel::{replay_habit_events, HabitCommand, HabitEvent, HabitKernel, HabitState};

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How often a habit is expected.
///
/// Custom days use `0 = Monday .. 6 = Sunday`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cadence {
    Daily,
    Weekdays,
    Custom { days: Vec<u8> },
}

impl Default for Cadence {
    fn default() -> Self {
        Cadence::Daily
    }
}

impl Cadence {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Cadence::Custom { days } = self {
            if days.is_empty() {
                return Err(ValidationError::EmptyCollection(
                    "custom cadence days".to_string(),
                ));
            }
            if let Some(bad) = days.iter().find(|d| **d > 6) {
                return Err(ValidationError::OutOfRange {
                    field: "cadence.days".to_string(),
                    value: f64::from(*bad),
                    min: 0.0,
                    max: 6.0,
                });
            }
        }
        Ok(())
    }

    /// Sorted, deduplicated copy.
    pub fn normalized(&self) -> Self {
        match self {
            Cadence::Custom { days } => {
                let mut days = days.clone();
                days.sort_unstable();
                days.dedup();
                Cadence::Custom { days }
            }
            other => other.clone(),
        }
    }

    pub fn includes(&self, weekday: Weekday) -> bool {
        let index = weekday.num_days_from_monday() as u8;
        match self {
            Cadence::Daily => true,
            Cadence::Weekdays => index < 5,
            Cadence::Custom { days } => days.contains(&index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Medium
    }
}

/// Build habits are things to do; break habits are things to do less of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HabitKind {
    Build,
    Break,
}

impl Default for HabitKind {
    fn default() -> Self {
        HabitKind::Build
    }
}

/// What a log entry measures for a build habit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    /// Done or not done.
    Binary,
    /// A count toward `target_value`.
    Quantity,
    /// Minutes toward `target_value`.
    Duration,
}

impl Default for Measure {
    fn default() -> Self {
        Measure::Binary
    }
}

/// Goal of a break habit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakGoal {
    /// Allowed daily total is zero.
    Quit,
    /// Allowed daily total is `target_value`.
    Limit,
}

/// Inclusive pause window. `until = None` pauses indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseWindow {
    pub from: NaiveDate,
    #[serde(default)]
    pub until: Option<NaiveDate>,
}

impl PauseWindow {
    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.from && self.until.map_or(true, |until| day <= until)
    }
}

/// Payload of `habit.create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHabit {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cadence: Cadence,
    #[serde(default)]
    pub anchor: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub kind: HabitKind,
    #[serde(default)]
    pub measure: Measure,
    #[serde(default)]
    pub break_goal: Option<BreakGoal>,
    #[serde(default)]
    pub target_value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub start_day: Option<NaiveDate>,
    #[serde(default)]
    pub end_day: Option<NaiveDate>,
}

impl NewHabit {
    /// A daily binary build habit.
    pub fn daily(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cadence: Cadence::Daily,
            anchor: None,
            difficulty: Difficulty::Medium,
            kind: HabitKind::Build,
            measure: Measure::Binary,
            break_goal: None,
            target_value: None,
            unit: None,
            start_day: None,
            end_day: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::empty("id"));
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::empty("name"));
        }
        self.cadence.validate()?;
        if let Some(target) = self.target_value {
            if !target.is_finite() || target < 0.0 {
                return Err(ValidationError::invalid(
                    "target_value",
                    "must be a non-negative number",
                ));
            }
        }
        match self.kind {
            HabitKind::Build if self.measure != Measure::Binary => {
                if !self.target_value.is_some_and(|t| t > 0.0) {
                    return Err(ValidationError::invalid(
                        "target_value",
                        "quantity and duration habits need a positive target",
                    ));
                }
            }
            HabitKind::Break if self.break_goal == Some(BreakGoal::Limit) => {
                if self.target_value.is_none() {
                    return Err(ValidationError::invalid(
                        "target_value",
                        "limit goals need a target",
                    ));
                }
            }
            _ => {}
        }
        if let (Some(start), Some(end)) = (self.start_day, self.end_day) {
            if end < start {
                return Err(ValidationError::invalid(
                    "end_day",
                    "must not be before start_day",
                ));
            }
        }
        Ok(())
    }
}

/// A habit as folded from its event history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub name: String,
    pub cadence: Cadence,
    pub anchor: Option<String>,
    pub difficulty: Difficulty,
    pub kind: HabitKind,
    pub measure: Measure,
    pub break_goal: Option<BreakGoal>,
    pub target_value: Option<f64>,
    pub unit: Option<String>,
    pub start_day: Option<NaiveDate>,
    pub end_day: Option<NaiveDate>,
    pub pause: Option<PauseWindow>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Habit {
    pub fn from_new(new: NewHabit, at: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            name: new.name.trim().to_string(),
            cadence: new.cadence.normalized(),
            anchor: new.anchor,
            difficulty: new.difficulty,
            kind: new.kind,
            measure: new.measure,
            break_goal: match new.kind {
                HabitKind::Break => Some(new.break_goal.unwrap_or(BreakGoal::Quit)),
                HabitKind::Build => None,
            },
            target_value: new.target_value,
            unit: new.unit,
            start_day: new.start_day,
            end_day: new.end_day,
            pause: None,
            archived: false,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        if self.archived {
            return false;
        }
        if self.start_day.is_some_and(|start| day < start) {
            return false;
        }
        if self.end_day.is_some_and(|end| day > end) {
            return false;
        }
        !self.pause.is_some_and(|p| p.contains(day))
    }

    pub fn is_scheduled_on(&self, day: NaiveDate) -> bool {
        self.cadence.includes(day.weekday())
    }

    /// Active and scheduled.
    pub fn is_due_on(&self, day: NaiveDate) -> bool {
        self.is_active_on(day) && self.is_scheduled_on(day)
    }

    /// Daily total a break habit may reach and still count as completed.
    pub fn allowed_limit(&self) -> f64 {
        match self.break_goal {
            Some(BreakGoal::Limit) => self.target_value.unwrap_or(0.0),
            Some(BreakGoal::Quit) | None => 0.0,
        }
    }

    /// Status implied by a cumulative logged total for the day.
    pub fn status_for_total(&self, total: f64) -> LogStatus {
        match self.kind {
            HabitKind::Break => {
                if total <= self.allowed_limit() {
                    LogStatus::Completed
                } else {
                    LogStatus::Relapsed
                }
            }
            HabitKind::Build => match self.target_value {
                Some(target) if total >= target => LogStatus::Completed,
                Some(_) => LogStatus::Partial,
                None => LogStatus::Completed,
            },
        }
    }
}

/// Field patch carried by `habit.updated`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HabitPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadence: Option<Cadence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_day: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause: Option<PauseWindow>,
    #[serde(default)]
    pub clear_pause: bool,
}

impl HabitPatch {
    pub fn is_empty(&self) -> bool {
        *self == HabitPatch::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ValidationError::empty("name"));
        }
        if let Some(cadence) = &self.cadence {
            cadence.validate()?;
        }
        if self
            .target_value
            .is_some_and(|t| !t.is_finite() || t < 0.0)
        {
            return Err(ValidationError::invalid(
                "target_value",
                "must be a non-negative number",
            ));
        }
        if let Some(pause) = &self.pause {
            if pause.until.is_some_and(|until| until < pause.from) {
                return Err(ValidationError::invalid(
                    "pause.until",
                    "must not be before pause.from",
                ));
            }
        }
        Ok(())
    }

    /// Checks that depend on the habit being patched: the same kind and
    /// measure rules a new habit must pass.
    pub fn validate_for(&self, habit: &Habit) -> Result<(), ValidationError> {
        let measured_build = habit.kind == HabitKind::Build && habit.measure != Measure::Binary;
        if measured_build && self.target_value.is_some_and(|t| t <= 0.0) {
            return Err(ValidationError::invalid(
                "target_value",
                "quantity and duration habits need a positive target",
            ));
        }
        if let (Some(start), Some(end)) = (habit.start_day, self.end_day) {
            if end < start {
                return Err(ValidationError::invalid(
                    "end_day",
                    "must not be before start_day",
                ));
            }
        }
        Ok(())
    }

    pub fn apply_to(&self, habit: &mut Habit, at: DateTime<Utc>) {
        if let Some(name) = &self.name {
            habit.name = name.trim().to_string();
        }
        if let Some(cadence) = &self.cadence {
            habit.cadence = cadence.normalized();
        }
        if let Some(anchor) = &self.anchor {
            habit.anchor = Some(anchor.clone());
        }
        if let Some(difficulty) = self.difficulty {
            habit.difficulty = difficulty;
        }
        if let Some(target) = self.target_value {
            habit.target_value = Some(target);
        }
        if let Some(unit) = &self.unit {
            habit.unit = Some(unit.clone());
        }
        if let Some(end) = self.end_day {
            habit.end_day = Some(end);
        }
        if self.clear_pause {
            habit.pause = None;
        }
        if let Some(pause) = self.pause {
            habit.pause = Some(pause);
        }
        habit.updated_at = at;
    }
}

/// Outcome of a habit on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Completed,
    /// Logged below target so far.
    Partial,
    Skipped,
    Snoozed,
    Missed,
    Relapsed,
}

/// Today's log for one habit. Always rebuilt from the day's events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitLog {
    pub status: LogStatus,
    pub occurred_at: DateTime<Utc>,
    /// Cumulative value logged today.
    pub value: f64,
    #[serde(default)]
    pub snoozed_until: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        // 2026-03-02 is a Monday
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn habit(new: NewHabit) -> Habit {
        Habit::from_new(new, Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap())
    }

    #[test]
    fn weekday_cadence_skips_weekend() {
        let h = habit(NewHabit {
            cadence: Cadence::Weekdays,
            ..NewHabit::daily("h1", "Stretch")
        });
        assert!(h.is_scheduled_on(day(6))); // Friday
        assert!(!h.is_scheduled_on(day(7))); // Saturday
        assert!(!h.is_scheduled_on(day(8))); // Sunday
    }

    #[test]
    fn custom_cadence_matches_listed_days() {
        let h = habit(NewHabit {
            cadence: Cadence::Custom { days: vec![2, 0, 2] },
            ..NewHabit::daily("h1", "Swim")
        });
        assert_eq!(h.cadence, Cadence::Custom { days: vec![0, 2] });
        assert!(h.is_scheduled_on(day(2)));
        assert!(!h.is_scheduled_on(day(3)));
        assert!(h.is_scheduled_on(day(4)));
    }

    #[test]
    fn custom_cadence_rejects_empty_and_out_of_range() {
        assert!(Cadence::Custom { days: vec![] }.validate().is_err());
        assert!(Cadence::Custom { days: vec![1, 7] }.validate().is_err());
        assert!(Cadence::Custom { days: vec![6] }.validate().is_ok());
    }

    #[test]
    fn active_window_and_pause() {
        let mut h = habit(NewHabit {
            start_day: Some(day(2)),
            end_day: Some(day(20)),
            ..NewHabit::daily("h1", "Read")
        });
        assert!(!h.is_active_on(day(1)));
        assert!(h.is_active_on(day(2)));
        assert!(!h.is_active_on(day(21)));

        h.pause = Some(PauseWindow {
            from: day(10),
            until: Some(day(12)),
        });
        assert!(h.is_active_on(day(9)));
        assert!(!h.is_active_on(day(11)));
        assert!(h.is_active_on(day(13)));
    }

    #[test]
    fn break_habit_limits() {
        let quit = habit(NewHabit {
            kind: HabitKind::Break,
            ..NewHabit::daily("h1", "Smoking")
        });
        assert_eq!(quit.break_goal, Some(BreakGoal::Quit));
        assert_eq!(quit.status_for_total(0.0), LogStatus::Completed);
        assert_eq!(quit.status_for_total(1.0), LogStatus::Relapsed);

        let limit = habit(NewHabit {
            kind: HabitKind::Break,
            break_goal: Some(BreakGoal::Limit),
            target_value: Some(2.0),
            ..NewHabit::daily("h2", "Coffee")
        });
        assert_eq!(limit.status_for_total(2.0), LogStatus::Completed);
        assert_eq!(limit.status_for_total(3.0), LogStatus::Relapsed);
    }

    #[test]
    fn quantity_habit_needs_positive_target() {
        let bad = NewHabit {
            measure: Measure::Quantity,
            ..NewHabit::daily("h1", "Pushups")
        };
        assert!(bad.validate().is_err());

        let good = NewHabit {
            measure: Measure::Quantity,
            target_value: Some(20.0),
            ..NewHabit::daily("h1", "Pushups")
        };
        assert!(good.validate().is_ok());
        let h = habit(good);
        assert_eq!(h.status_for_total(10.0), LogStatus::Partial);
        assert_eq!(h.status_for_total(20.0), LogStatus::Completed);
    }

    #[test]
    fn blank_name_is_rejected() {
        assert_eq!(
            NewHabit::daily("h1", "  ").validate(),
            Err(ValidationError::EmptyField("name".to_string()))
        );
    }
}
