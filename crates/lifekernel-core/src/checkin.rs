//! Daily and weekly check-ins with a rolling mood/energy trend.
//!
//! The trend is never stored as a running counter. Every submit or update
//! recomputes it from the check-ins inside the window ending at that event,
//! so any replay reproduces it exactly.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CheckinConfig;
use crate::error::{Result, ValidationError};
use crate::events::{Command, Event, Kernel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckinKind {
    Daily,
    Weekly,
}

impl Default for CheckinKind {
    fn default() -> Self {
        CheckinKind::Daily
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkin {
    /// Idempotency key of the submitting command.
    pub id: String,
    pub kind: CheckinKind,
    /// 1-5
    pub mood: u8,
    /// 1-5
    pub energy: u8,
    pub flags: Vec<String>,
    pub note: Option<String>,
    pub weekly_answers: BTreeMap<String, String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload of `checkin.submit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckinSubmission {
    #[serde(default)]
    pub kind: CheckinKind,
    pub mood: u8,
    pub energy: u8,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub weekly_answers: BTreeMap<String, String>,
}

/// Named fields to replace; everything else is left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckinPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_answers: Option<BTreeMap<String, String>>,
}

impl CheckinPatch {
    pub fn is_empty(&self) -> bool {
        *self == CheckinPatch::default()
    }

    fn apply_to(&self, checkin: &mut Checkin, at: DateTime<Utc>) {
        if let Some(mood) = self.mood {
            checkin.mood = mood;
        }
        if let Some(energy) = self.energy {
            checkin.energy = energy;
        }
        if let Some(flags) = &self.flags {
            checkin.flags = flags.clone();
        }
        if let Some(note) = &self.note {
            checkin.note = Some(note.clone());
        }
        if let Some(answers) = &self.weekly_answers {
            checkin.weekly_answers = answers.clone();
        }
        checkin.updated_at = at;
    }
}

pub(crate) fn check_scale(field: &str, value: u8) -> Result<(), ValidationError> {
    if (1..=5).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value: f64::from(value),
            min: 1.0,
            max: 5.0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CheckinCommand {
    #[serde(rename = "checkin.submit")]
    Submit(CheckinSubmission),
    #[serde(rename = "checkin.update")]
    Update {
        checkin_id: String,
        patch: CheckinPatch,
    },
}

/// Both events carry the trend window so the reducer never reads config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CheckinEvent {
    #[serde(rename = "checkin.submitted")]
    Submitted { checkin: Checkin, window_days: u32 },
    #[serde(rename = "checkin.updated")]
    Updated {
        checkin_id: String,
        patch: CheckinPatch,
        window_days: u32,
    },
}

/// Averages over the rolling window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoodTrend {
    pub average_mood: f64,
    pub average_energy: f64,
    /// Distinct UTC days with at least one check-in.
    pub days_tracked: u32,
}

impl MoodTrend {
    /// Compute over check-ins submitted in `(end - window_days, end]`.
    pub fn compute<'a>(
        checkins: impl IntoIterator<Item = &'a Checkin>,
        end: DateTime<Utc>,
        window_days: u32,
    ) -> Self {
        let start = end - Duration::days(i64::from(window_days));
        let mut mood_sum = 0u32;
        let mut energy_sum = 0u32;
        let mut count = 0u32;
        let mut days: Vec<NaiveDate> = Vec::new();

        for checkin in checkins {
            if checkin.submitted_at <= start || checkin.submitted_at > end {
                continue;
            }
            mood_sum += u32::from(checkin.mood);
            energy_sum += u32::from(checkin.energy);
            count += 1;
            let day = checkin.submitted_at.date_naive();
            if !days.contains(&day) {
                days.push(day);
            }
        }

        if count == 0 {
            return Self::default();
        }
        Self {
            average_mood: f64::from(mood_sum) / f64::from(count),
            average_energy: f64::from(energy_sum) / f64::from(count),
            days_tracked: days.len() as u32,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckinState {
    pub checkins: BTreeMap<String, Checkin>,
    pub trend: MoodTrend,
}

impl CheckinState {
    /// Most recently submitted check-in.
    pub fn latest(&self) -> Option<&Checkin> {
        self.checkins
            .values()
            .max_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.id.cmp(&b.id)))
    }

    pub fn last_submitted_at(&self) -> Option<DateTime<Utc>> {
        self.latest().map(|c| c.submitted_at)
    }

    fn recompute_trend(&mut self, end: DateTime<Utc>, window_days: u32) {
        self.trend = MoodTrend::compute(self.checkins.values(), end, window_days);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CheckinKernel {
    trend_window_days: u32,
}

impl CheckinKernel {
    pub fn new(config: &CheckinConfig) -> Self {
        Self {
            trend_window_days: config.trend_window_days,
        }
    }
}

impl Default for CheckinKernel {
    fn default() -> Self {
        Self::new(&CheckinConfig::default())
    }
}

impl Kernel for CheckinKernel {
    type Command = CheckinCommand;
    type Event = CheckinEvent;
    type State = CheckinState;

    fn handle(
        &self,
        prior: &[Event<CheckinEvent>],
        command: &Command<CheckinCommand>,
    ) -> Result<Vec<Event<CheckinEvent>>> {
        let state = self.replay(prior);
        let at = command.requested_at;

        let event = match &command.body {
            CheckinCommand::Submit(submission) => {
                check_scale("mood", submission.mood)?;
                check_scale("energy", submission.energy)?;
                if submission.kind == CheckinKind::Daily && !submission.weekly_answers.is_empty() {
                    return Err(ValidationError::invalid(
                        "weekly_answers",
                        "only weekly check-ins carry answers",
                    )
                    .into());
                }
                if state.checkins.contains_key(&command.idempotency_key) {
                    tracing::debug!(checkin_id = %command.idempotency_key, "check-in already submitted");
                    return Ok(Vec::new());
                }
                CheckinEvent::Submitted {
                    checkin: Checkin {
                        id: command.idempotency_key.clone(),
                        kind: submission.kind,
                        mood: submission.mood,
                        energy: submission.energy,
                        flags: submission.flags.clone(),
                        note: submission.note.clone(),
                        weekly_answers: submission.weekly_answers.clone(),
                        submitted_at: at,
                        updated_at: at,
                    },
                    window_days: self.trend_window_days,
                }
            }
            CheckinCommand::Update { checkin_id, patch } => {
                if let Some(mood) = patch.mood {
                    check_scale("mood", mood)?;
                }
                if let Some(energy) = patch.energy {
                    check_scale("energy", energy)?;
                }
                if patch.is_empty() || !state.checkins.contains_key(checkin_id) {
                    tracing::debug!(%checkin_id, "check-in update ignored");
                    return Ok(Vec::new());
                }
                CheckinEvent::Updated {
                    checkin_id: checkin_id.clone(),
                    patch: patch.clone(),
                    window_days: self.trend_window_days,
                }
            }
        };

        Ok(vec![command.emit(event)])
    }

    fn reduce(&self, mut state: CheckinState, event: &Event<CheckinEvent>) -> CheckinState {
        match &event.body {
            CheckinEvent::Submitted {
                checkin,
                window_days,
            } => {
                state
                    .checkins
                    .entry(checkin.id.clone())
                    .or_insert_with(|| checkin.clone());
                state.recompute_trend(event.occurred_at, *window_days);
            }
            CheckinEvent::Updated {
                checkin_id,
                patch,
                window_days,
            } => {
                if let Some(checkin) = state.checkins.get_mut(checkin_id) {
                    patch.apply_to(checkin, event.occurred_at);
                    state.recompute_trend(event.occurred_at, *window_days);
                }
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::trace::Trace;
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, h, 0, 0).unwrap()
    }

    fn submit(key: &str, when: DateTime<Utc>, mood: u8, energy: u8) -> Command<CheckinCommand> {
        Command::new(
            key,
            when,
            CheckinCommand::Submit(CheckinSubmission {
                mood,
                energy,
                ..CheckinSubmission::default()
            }),
        )
    }

    fn run(commands: &[Command<CheckinCommand>]) -> Vec<Event<CheckinEvent>> {
        let kernel = CheckinKernel::default();
        let mut events = Vec::new();
        for command in commands {
            events.extend(kernel.handle(&events, command).unwrap());
        }
        events
    }

    #[test]
    fn trend_averages_three_days() {
        let events = run(&[
            submit("c1", at(2, 20), 3, 2),
            submit("c2", at(3, 20), 4, 3),
            submit("c3", at(4, 20), 5, 4),
        ]);
        let state = CheckinKernel::default().replay(&events);
        assert_eq!(
            state.trend,
            MoodTrend {
                average_mood: 4.0,
                average_energy: 3.0,
                days_tracked: 3,
            }
        );
    }

    #[test]
    fn trend_window_drops_old_checkins() {
        let events = run(&[
            submit("old", at(1, 8), 1, 1),
            submit("new", at(20, 8), 5, 5),
        ]);
        let state = CheckinKernel::default().replay(&events);
        assert_eq!(state.trend.days_tracked, 1);
        assert_eq!(state.trend.average_mood, 5.0);
        assert_eq!(state.checkins.len(), 2);
    }

    #[test]
    fn update_patches_named_fields_and_recomputes() {
        let history = run(&[submit("c1", at(2, 20), 2, 2)]);
        let state = Trace::<CheckinKernel>::given(history)
            .when(Command::new(
                "u1",
                at(2, 21),
                CheckinCommand::Update {
                    checkin_id: "c1".to_string(),
                    patch: CheckinPatch {
                        mood: Some(4),
                        ..CheckinPatch::default()
                    },
                },
            ))
            .state();
        let checkin = &state.checkins["c1"];
        assert_eq!(checkin.mood, 4);
        assert_eq!(checkin.energy, 2);
        assert_eq!(state.trend.average_mood, 4.0);
    }

    #[test]
    fn out_of_range_mood_raises() {
        Trace::<CheckinKernel>::given([])
            .when(submit("c1", at(2, 20), 6, 3))
            .expect_error(|e| matches!(e, CoreError::Validation(ValidationError::OutOfRange { .. })));
    }

    #[test]
    fn updating_unknown_checkin_is_a_noop() {
        Trace::<CheckinKernel>::given([])
            .when(Command::new(
                "u1",
                at(2, 21),
                CheckinCommand::Update {
                    checkin_id: "missing".to_string(),
                    patch: CheckinPatch {
                        energy: Some(3),
                        ..CheckinPatch::default()
                    },
                },
            ))
            .expect_no_events();
    }

    #[test]
    fn latest_picks_most_recent() {
        let events = run(&[submit("a", at(2, 8), 3, 3), submit("b", at(3, 8), 2, 1)]);
        let state = CheckinKernel::default().replay(&events);
        assert_eq!(state.latest().unwrap().id, "b");
    }
}
