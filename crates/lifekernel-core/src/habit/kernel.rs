//! Habit command handler and reducer.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Habit, HabitKind, HabitLog, HabitPatch, LogStatus, Measure, NewHabit};
use crate::error::{Result, ValidationError};
use crate::events::{Command, Event, Kernel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum HabitCommand {
    #[serde(rename = "habit.create")]
    Create(NewHabit),
    #[serde(rename = "habit.update")]
    Update { habit_id: String, patch: HabitPatch },
    /// Log progress. Binary habits ignore `value`; quantity and duration
    /// habits require it; break habits default to one occurrence.
    #[serde(rename = "habit.log")]
    Log {
        habit_id: String,
        #[serde(default)]
        value: Option<f64>,
    },
    #[serde(rename = "habit.skip")]
    Skip {
        habit_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename = "habit.snooze")]
    Snooze {
        habit_id: String,
        #[serde(default)]
        until: Option<DateTime<Utc>>,
    },
    #[serde(rename = "habit.archive")]
    Archive { habit_id: String },
    #[serde(rename = "habit.restore")]
    Restore { habit_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum HabitEvent {
    #[serde(rename = "habit.created")]
    Created { habit: Habit },
    #[serde(rename = "habit.updated")]
    Updated { habit_id: String, patch: HabitPatch },
    #[serde(rename = "habit.completed")]
    Completed { habit_id: String },
    #[serde(rename = "habit.logged")]
    Logged { habit_id: String, value: f64 },
    #[serde(rename = "habit.skipped")]
    Skipped {
        habit_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename = "habit.snoozed")]
    Snoozed {
        habit_id: String,
        #[serde(default)]
        until: Option<DateTime<Utc>>,
    },
    #[serde(rename = "habit.archived")]
    Archived { habit_id: String },
    #[serde(rename = "habit.restored")]
    Restored { habit_id: String },
}

/// Folded habit projection.
///
/// `habits` reflects the full history. `today_log` only ever contains
/// entries built from events inside the UTC day `today`, and is empty when
/// `today` is `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HabitState {
    pub habits: BTreeMap<String, Habit>,
    pub today: Option<NaiveDate>,
    pub today_log: BTreeMap<String, HabitLog>,
}

impl HabitState {
    /// Empty state whose today-log window is `day`.
    pub fn for_date(day: NaiveDate) -> Self {
        Self {
            today: Some(day),
            ..Self::default()
        }
    }

    /// Habit that exists and is not archived.
    pub fn live(&self, habit_id: &str) -> Option<&Habit> {
        self.habits.get(habit_id).filter(|h| !h.archived)
    }

    pub fn active_habits(&self) -> impl Iterator<Item = &Habit> {
        self.habits.values().filter(|h| !h.archived)
    }

    /// Habits that are active and scheduled on `day`.
    pub fn due_on(&self, day: NaiveDate) -> Vec<&Habit> {
        self.habits.values().filter(|h| h.is_due_on(day)).collect()
    }

    pub fn log_for(&self, habit_id: &str) -> Option<&HabitLog> {
        self.today_log.get(habit_id)
    }

    /// Whether anything was completed or partially logged today.
    pub fn has_progress_today(&self) -> bool {
        self.today_log
            .values()
            .any(|log| matches!(log.status, LogStatus::Completed | LogStatus::Partial))
    }

    /// Status of every due habit on `day`.
    ///
    /// Unlogged habits only appear once the day (plus `grace_hours`) is over:
    /// a build habit reads `missed`, a break habit that saw no occurrences
    /// reads `completed`.
    pub fn day_statuses(
        &self,
        day: NaiveDate,
        now: DateTime<Utc>,
        grace_hours: u32,
    ) -> BTreeMap<String, LogStatus> {
        let deadline = day.and_time(NaiveTime::MIN).and_utc()
            + Duration::days(1)
            + Duration::hours(i64::from(grace_hours));
        let mut statuses = BTreeMap::new();
        for habit in self.due_on(day) {
            let logged = if self.today == Some(day) {
                self.today_log.get(&habit.id).map(|l| l.status)
            } else {
                None
            };
            let status = match logged {
                Some(status) => status,
                None if now < deadline => continue,
                None if habit.kind == HabitKind::Break => LogStatus::Completed,
                None => LogStatus::Missed,
            };
            statuses.insert(habit.id.clone(), status);
        }
        statuses
    }

    fn log_today(
        &mut self,
        habit_id: &str,
        at: DateTime<Utc>,
        update: impl FnOnce(&Habit, Option<&HabitLog>) -> HabitLog,
    ) {
        if self.today != Some(at.date_naive()) {
            return;
        }
        let Some(habit) = self.habits.get(habit_id).filter(|h| !h.archived) else {
            return;
        };
        let next = update(habit, self.today_log.get(habit_id));
        self.today_log.insert(habit_id.to_string(), next);
    }
}

/// Fold the full history, rebuilding today's log for `for_date` from scratch.
pub fn replay_habit_events(events: &[Event<HabitEvent>], for_date: Option<NaiveDate>) -> HabitState {
    let initial = match for_date {
        Some(day) => HabitState::for_date(day),
        None => HabitState::default(),
    };
    HabitKernel.replay_from(initial, events)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HabitKernel;

fn ignored(reason: &str, habit_id: &str) -> Result<Vec<Event<HabitEvent>>> {
    tracing::debug!(habit_id, reason, "habit command ignored");
    Ok(Vec::new())
}

impl Kernel for HabitKernel {
    type Command = HabitCommand;
    type Event = HabitEvent;
    type State = HabitState;

    fn handle(
        &self,
        prior: &[Event<HabitEvent>],
        command: &Command<HabitCommand>,
    ) -> Result<Vec<Event<HabitEvent>>> {
        let state = self.replay(prior);
        let at = command.requested_at;

        let event = match &command.body {
            HabitCommand::Create(new) => {
                new.validate()?;
                if state.habits.contains_key(&new.id) {
                    return ignored("already exists", &new.id);
                }
                HabitEvent::Created {
                    habit: Habit::from_new(new.clone(), at),
                }
            }
            HabitCommand::Update { habit_id, patch } => {
                patch.validate()?;
                let Some(habit) = state.live(habit_id) else {
                    return ignored("missing or archived", habit_id);
                };
                patch.validate_for(habit)?;
                if patch.is_empty() {
                    return ignored("empty patch", habit_id);
                }
                HabitEvent::Updated {
                    habit_id: habit_id.clone(),
                    patch: patch.clone(),
                }
            }
            HabitCommand::Log { habit_id, value } => {
                if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
                    return Err(
                        ValidationError::invalid("value", "must be a non-negative number").into(),
                    );
                }
                let Some(habit) = state.live(habit_id) else {
                    return ignored("missing or archived", habit_id);
                };
                match (habit.kind, habit.measure) {
                    (HabitKind::Build, Measure::Binary) => HabitEvent::Completed {
                        habit_id: habit_id.clone(),
                    },
                    (HabitKind::Build, _) => {
                        let value = value.ok_or_else(|| {
                            ValidationError::invalid(
                                "value",
                                "quantity and duration habits need a logged value",
                            )
                        })?;
                        HabitEvent::Logged {
                            habit_id: habit_id.clone(),
                            value,
                        }
                    }
                    (HabitKind::Break, _) => HabitEvent::Logged {
                        habit_id: habit_id.clone(),
                        value: value.unwrap_or(1.0),
                    },
                }
            }
            HabitCommand::Skip { habit_id, reason } => {
                if state.live(habit_id).is_none() {
                    return ignored("missing or archived", habit_id);
                }
                HabitEvent::Skipped {
                    habit_id: habit_id.clone(),
                    reason: reason.clone(),
                }
            }
            HabitCommand::Snooze { habit_id, until } => {
                if until.is_some_and(|until| until <= at) {
                    return Err(ValidationError::invalid("until", "must be in the future").into());
                }
                if state.live(habit_id).is_none() {
                    return ignored("missing or archived", habit_id);
                }
                HabitEvent::Snoozed {
                    habit_id: habit_id.clone(),
                    until: *until,
                }
            }
            HabitCommand::Archive { habit_id } => {
                if state.live(habit_id).is_none() {
                    return ignored("missing or archived", habit_id);
                }
                HabitEvent::Archived {
                    habit_id: habit_id.clone(),
                }
            }
            HabitCommand::Restore { habit_id } => match state.habits.get(habit_id) {
                Some(habit) if habit.archived => HabitEvent::Restored {
                    habit_id: habit_id.clone(),
                },
                _ => return ignored("not archived", habit_id),
            },
        };

        Ok(vec![command.emit(event)])
    }

    fn reduce(&self, mut state: HabitState, event: &Event<HabitEvent>) -> HabitState {
        let at = event.occurred_at;
        match &event.body {
            HabitEvent::Created { habit } => {
                state
                    .habits
                    .entry(habit.id.clone())
                    .or_insert_with(|| habit.clone());
            }
            HabitEvent::Updated { habit_id, patch } => {
                if let Some(habit) = state.habits.get_mut(habit_id).filter(|h| !h.archived) {
                    patch.apply_to(habit, at);
                }
            }
            HabitEvent::Archived { habit_id } => {
                if let Some(habit) = state.habits.get_mut(habit_id) {
                    habit.archived = true;
                    habit.updated_at = at;
                }
            }
            HabitEvent::Restored { habit_id } => {
                if let Some(habit) = state.habits.get_mut(habit_id) {
                    habit.archived = false;
                    habit.updated_at = at;
                }
            }
            HabitEvent::Completed { habit_id } => {
                state.log_today(habit_id, at, |_, prev| HabitLog {
                    status: LogStatus::Completed,
                    occurred_at: at,
                    value: prev.map_or(0.0, |l| l.value),
                    snoozed_until: None,
                });
            }
            HabitEvent::Logged { habit_id, value } => {
                state.log_today(habit_id, at, |habit, prev| {
                    let total = prev.map_or(0.0, |l| l.value) + value;
                    HabitLog {
                        status: habit.status_for_total(total),
                        occurred_at: at,
                        value: total,
                        snoozed_until: None,
                    }
                });
            }
            HabitEvent::Skipped { habit_id, .. } => {
                state.log_today(habit_id, at, |_, prev| HabitLog {
                    status: LogStatus::Skipped,
                    occurred_at: at,
                    value: prev.map_or(0.0, |l| l.value),
                    snoozed_until: None,
                });
            }
            HabitEvent::Snoozed { habit_id, until } => {
                state.log_today(habit_id, at, |_, prev| HabitLog {
                    status: LogStatus::Snoozed,
                    occurred_at: at,
                    value: prev.map_or(0.0, |l| l.value),
                    snoozed_until: *until,
                });
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::habit::{BreakGoal, Cadence, PauseWindow};
    use crate::trace::Trace;
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, h, 0, 0).unwrap()
    }

    fn cmd(key: &str, when: DateTime<Utc>, body: HabitCommand) -> Command<HabitCommand> {
        Command::new(key, when, body)
    }

    fn created(new: NewHabit, when: DateTime<Utc>) -> Event<HabitEvent> {
        Event::new(
            format!("create-{}", new.id),
            when,
            HabitEvent::Created {
                habit: Habit::from_new(new, when),
            },
        )
    }

    fn log(habit_id: &str, when: DateTime<Utc>, value: Option<f64>) -> Command<HabitCommand> {
        cmd(
            &format!("log-{habit_id}-{when}"),
            when,
            HabitCommand::Log {
                habit_id: habit_id.to_string(),
                value,
            },
        )
    }

    #[test]
    fn binary_habit_log_completes_today() {
        let state = Trace::<HabitKernel>::given([created(NewHabit::daily("walk", "Walk"), at(2, 7))])
            .starting_from(HabitState::for_date(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()))
            .when(log("walk", at(2, 18), None))
            .expect_events(&[HabitEvent::Completed {
                habit_id: "walk".to_string(),
            }])
            .state();
        assert_eq!(state.log_for("walk").unwrap().status, LogStatus::Completed);
    }

    #[test]
    fn quantity_habit_accumulates_until_target() {
        let new = NewHabit {
            measure: Measure::Quantity,
            target_value: Some(30.0),
            unit: Some("pushups".to_string()),
            ..NewHabit::daily("push", "Pushups")
        };
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let mut events = vec![created(new, at(2, 6))];
        for (i, value) in [10.0, 10.0].into_iter().enumerate() {
            events.extend(HabitKernel.handle(&events, &log("push", at(2, 8 + i as u32), Some(value))).unwrap());
        }
        let partial = replay_habit_events(&events, Some(day));
        assert_eq!(partial.log_for("push").unwrap().status, LogStatus::Partial);
        assert_eq!(partial.log_for("push").unwrap().value, 20.0);

        events.extend(HabitKernel.handle(&events, &log("push", at(2, 12), Some(15.0))).unwrap());
        let done = replay_habit_events(&events, Some(day));
        assert_eq!(done.log_for("push").unwrap().status, LogStatus::Completed);
    }

    #[test]
    fn quantity_log_without_value_is_rejected() {
        let new = NewHabit {
            measure: Measure::Duration,
            target_value: Some(20.0),
            ..NewHabit::daily("read", "Read")
        };
        Trace::<HabitKernel>::given([created(new, at(2, 6))])
            .when(log("read", at(2, 9), None))
            .expect_error(|e| matches!(e, CoreError::Validation(_)));
    }

    #[test]
    fn break_habit_relapses_past_limit() {
        let new = NewHabit {
            kind: HabitKind::Break,
            break_goal: Some(BreakGoal::Limit),
            target_value: Some(2.0),
            ..NewHabit::daily("coffee", "Coffee")
        };
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let mut events = vec![created(new, at(2, 6))];
        for h in [8, 11] {
            events.extend(HabitKernel.handle(&events, &log("coffee", at(2, h), None)).unwrap());
        }
        assert_eq!(
            replay_habit_events(&events, Some(day)).log_for("coffee").unwrap().status,
            LogStatus::Completed
        );
        events.extend(HabitKernel.handle(&events, &log("coffee", at(2, 15), None)).unwrap());
        let state = replay_habit_events(&events, Some(day));
        assert_eq!(state.log_for("coffee").unwrap().status, LogStatus::Relapsed);
        assert_eq!(state.log_for("coffee").unwrap().value, 3.0);
    }

    #[test]
    fn today_log_only_sees_events_from_that_day() {
        let mut events = vec![created(NewHabit::daily("walk", "Walk"), at(2, 7))];
        events.extend(HabitKernel.handle(&events, &log("walk", at(2, 18), None)).unwrap());

        let next_day = replay_habit_events(&events, NaiveDate::from_ymd_opt(2026, 3, 3));
        assert!(next_day.today_log.is_empty());
        assert!(next_day.habits.contains_key("walk"));

        let same_day = replay_habit_events(&events, NaiveDate::from_ymd_opt(2026, 3, 2));
        assert_eq!(same_day.today_log.len(), 1);
        assert_eq!(replay_habit_events(&events, None).today_log.len(), 0);
    }

    #[test]
    fn acting_on_missing_or_archived_habit_is_a_noop() {
        Trace::<HabitKernel>::given([])
            .when(log("ghost", at(2, 9), None))
            .expect_no_events();

        let archived = Event::new(
            "archive-walk",
            at(2, 8),
            HabitEvent::Archived {
                habit_id: "walk".to_string(),
            },
        );
        Trace::<HabitKernel>::given([created(NewHabit::daily("walk", "Walk"), at(2, 7)), archived.clone()])
            .when(log("walk", at(2, 9), None))
            .expect_no_events();
        Trace::<HabitKernel>::given([created(NewHabit::daily("walk", "Walk"), at(2, 7)), archived])
            .when(cmd(
                "restore",
                at(2, 10),
                HabitCommand::Restore {
                    habit_id: "walk".to_string(),
                },
            ))
            .expect_events(&[HabitEvent::Restored {
                habit_id: "walk".to_string(),
            }]);
    }

    fn pushups() -> NewHabit {
        NewHabit {
            measure: Measure::Quantity,
            target_value: Some(30.0),
            ..NewHabit::daily("push", "Pushups")
        }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn skip_marks_today_and_keeps_logged_value() {
        let mut events = vec![created(pushups(), at(2, 6))];
        events.extend(HabitKernel.handle(&events, &log("push", at(2, 8), Some(10.0))).unwrap());

        let state = Trace::<HabitKernel>::given(events)
            .starting_from(HabitState::for_date(monday()))
            .when(cmd(
                "skip",
                at(2, 9),
                HabitCommand::Skip {
                    habit_id: "push".to_string(),
                    reason: Some("sore".to_string()),
                },
            ))
            .expect_events(&[HabitEvent::Skipped {
                habit_id: "push".to_string(),
                reason: Some("sore".to_string()),
            }])
            .state();
        let entry = state.log_for("push").unwrap();
        assert_eq!(entry.status, LogStatus::Skipped);
        assert_eq!(entry.value, 10.0);
        assert!(!state.has_progress_today());
    }

    #[test]
    fn snooze_records_until_and_keeps_logged_value() {
        let mut events = vec![created(pushups(), at(2, 6))];
        events.extend(HabitKernel.handle(&events, &log("push", at(2, 8), Some(10.0))).unwrap());

        let state = Trace::<HabitKernel>::given(events)
            .starting_from(HabitState::for_date(monday()))
            .when(cmd(
                "snooze",
                at(2, 9),
                HabitCommand::Snooze {
                    habit_id: "push".to_string(),
                    until: Some(at(2, 15)),
                },
            ))
            .state();
        let entry = state.log_for("push").unwrap();
        assert_eq!(entry.status, LogStatus::Snoozed);
        assert_eq!(entry.snoozed_until, Some(at(2, 15)));
        assert_eq!(entry.value, 10.0);
        assert_eq!(entry.occurred_at, at(2, 9));
    }

    #[test]
    fn snooze_into_the_past_raises() {
        for until in [at(2, 8), at(2, 9)] {
            Trace::<HabitKernel>::given([created(NewHabit::daily("walk", "Walk"), at(2, 7))])
                .when(cmd(
                    "snooze",
                    at(2, 9),
                    HabitCommand::Snooze {
                        habit_id: "walk".to_string(),
                        until: Some(until),
                    },
                ))
                .expect_error(|e| matches!(e, CoreError::Validation(_)));
        }
    }

    #[test]
    fn archived_habit_ignores_update_and_log() {
        let archive = Trace::<HabitKernel>::given([created(NewHabit::daily("walk", "Walk"), at(2, 7))])
            .starting_from(HabitState::for_date(monday()))
            .when(cmd(
                "archive",
                at(2, 8),
                HabitCommand::Archive {
                    habit_id: "walk".to_string(),
                },
            ))
            .expect_events(&[HabitEvent::Archived {
                habit_id: "walk".to_string(),
            }]);
        let history = archive.events().to_vec();
        assert!(archive.state().habits["walk"].archived);

        let mut given = vec![created(NewHabit::daily("walk", "Walk"), at(2, 7))];
        given.extend(history);
        Trace::<HabitKernel>::given(given.clone())
            .when(cmd(
                "rename",
                at(2, 9),
                HabitCommand::Update {
                    habit_id: "walk".to_string(),
                    patch: HabitPatch {
                        name: Some("Run".to_string()),
                        ..HabitPatch::default()
                    },
                },
            ))
            .expect_no_events();
        let state = Trace::<HabitKernel>::given(given.clone())
            .starting_from(HabitState::for_date(monday()))
            .when(log("walk", at(2, 10), None))
            .expect_no_events()
            .state();
        assert!(state.today_log.is_empty());
        Trace::<HabitKernel>::given(given)
            .when(cmd(
                "archive-again",
                at(2, 11),
                HabitCommand::Archive {
                    habit_id: "walk".to_string(),
                },
            ))
            .expect_no_events();
    }

    #[test]
    fn patch_cannot_zero_a_quantity_target() {
        let zero = HabitPatch {
            target_value: Some(0.0),
            ..HabitPatch::default()
        };
        Trace::<HabitKernel>::given([created(pushups(), at(2, 6))])
            .when(cmd(
                "zero",
                at(2, 7),
                HabitCommand::Update {
                    habit_id: "push".to_string(),
                    patch: zero.clone(),
                },
            ))
            .expect_error(|e| matches!(e, CoreError::Validation(_)));

        // A break habit may lower its limit to zero.
        let limit = NewHabit {
            kind: HabitKind::Break,
            break_goal: Some(BreakGoal::Limit),
            target_value: Some(2.0),
            ..NewHabit::daily("coffee", "Coffee")
        };
        Trace::<HabitKernel>::given([created(limit, at(2, 6))])
            .when(cmd(
                "zero",
                at(2, 7),
                HabitCommand::Update {
                    habit_id: "coffee".to_string(),
                    patch: zero,
                },
            ))
            .expect_events(&[HabitEvent::Updated {
                habit_id: "coffee".to_string(),
                patch: HabitPatch {
                    target_value: Some(0.0),
                    ..HabitPatch::default()
                },
            }]);
    }

    #[test]
    fn invalid_custom_cadence_raises() {
        let new = NewHabit {
            cadence: Cadence::Custom { days: vec![] },
            ..NewHabit::daily("h", "Swim")
        };
        Trace::<HabitKernel>::given([])
            .when(cmd("c", at(2, 7), HabitCommand::Create(new)))
            .expect_error(|e| matches!(e, CoreError::Validation(ValidationError::EmptyCollection(_))));
    }

    #[test]
    fn update_patches_and_pauses() {
        let patch = HabitPatch {
            name: Some("Evening walk".to_string()),
            pause: Some(PauseWindow {
                from: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
                until: None,
            }),
            ..HabitPatch::default()
        };
        let state = Trace::<HabitKernel>::given([created(NewHabit::daily("walk", "Walk"), at(2, 7))])
            .when(cmd(
                "u",
                at(3, 7),
                HabitCommand::Update {
                    habit_id: "walk".to_string(),
                    patch,
                },
            ))
            .state();
        let habit = &state.habits["walk"];
        assert_eq!(habit.name, "Evening walk");
        assert!(habit.is_active_on(NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()));
        assert!(!habit.is_active_on(NaiveDate::from_ymd_opt(2026, 3, 30).unwrap()));
    }

    #[test]
    fn day_statuses_report_missed_after_day_end() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let quit = NewHabit {
            kind: HabitKind::Break,
            ..NewHabit::daily("smoke", "Smoking")
        };
        let events = vec![
            created(NewHabit::daily("walk", "Walk"), at(1, 7)),
            created(quit, at(1, 7)),
        ];
        let state = replay_habit_events(&events, Some(day));

        assert!(state.day_statuses(day, at(2, 20), 0).is_empty());
        let statuses = state.day_statuses(day, at(3, 1), 0);
        assert_eq!(statuses["walk"], LogStatus::Missed);
        assert_eq!(statuses["smoke"], LogStatus::Completed);
        assert!(state.day_statuses(day, at(3, 1), 2).is_empty());
    }
}
