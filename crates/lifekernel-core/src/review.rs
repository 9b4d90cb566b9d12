//! Weekly review kernel.
//!
//! ```text
//! lookback -> reflect -> intentions -> closed
//!     \__________\___________\______> (skip)
//! ```
//!
//! `close` moves the review into history; `skip` removes it without a trace.
//! Week bounds are fixed when the review starts and never recomputed.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ReviewConfig;
use crate::error::{Result, ValidationError};
use crate::events::{Command, Event, Kernel};
use crate::text::{non_blank, truncate_chars};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewPhase {
    Lookback,
    Reflect,
    Intentions,
    Closed,
}

impl ReviewPhase {
    /// Phase reached by `advance`. Closing is its own operation.
    pub fn next(&self) -> Option<ReviewPhase> {
        match self {
            ReviewPhase::Lookback => Some(ReviewPhase::Reflect),
            ReviewPhase::Reflect => Some(ReviewPhase::Intentions),
            ReviewPhase::Intentions | ReviewPhase::Closed => None,
        }
    }

    pub fn accepts_answers(&self) -> bool {
        matches!(self, ReviewPhase::Lookback | ReviewPhase::Reflect)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    /// Monday, local to the offset given at start.
    pub week_start: NaiveDate,
    /// Sunday.
    pub week_end: NaiveDate,
    pub phase: ReviewPhase,
    pub answers: BTreeMap<String, String>,
    pub intentions: Vec<String>,
    pub summary_generated: bool,
    /// Opaque text from the summary collaborator.
    pub summary: Option<String>,
    pub started_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Monday..Sunday week containing `at` in the given UTC offset.
pub fn week_bounds(
    at: DateTime<Utc>,
    utc_offset_minutes: i32,
) -> Result<(NaiveDate, NaiveDate), ValidationError> {
    let offset = utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| ValidationError::invalid("utc_offset_minutes", "offset out of range"))?;
    let local = at.with_timezone(&offset).date_naive();
    let monday = local - Duration::days(i64::from(local.weekday().num_days_from_monday()));
    Ok((monday, monday + Duration::days(6)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ReviewCommand {
    #[serde(rename = "review.start")]
    Start {
        review_id: String,
        #[serde(default)]
        utc_offset_minutes: i32,
    },
    #[serde(rename = "review.answer")]
    Answer {
        review_id: String,
        question: String,
        answer: String,
    },
    #[serde(rename = "review.advance")]
    Advance { review_id: String },
    #[serde(rename = "review.set_intentions")]
    SetIntentions {
        review_id: String,
        intentions: Vec<String>,
    },
    #[serde(rename = "review.close")]
    Close {
        review_id: String,
        summary_generated: bool,
        #[serde(default)]
        summary: Option<String>,
    },
    #[serde(rename = "review.skip")]
    Skip { review_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ReviewEvent {
    #[serde(rename = "review.started")]
    Started {
        review_id: String,
        week_start: NaiveDate,
        week_end: NaiveDate,
    },
    #[serde(rename = "review.answered")]
    Answered {
        review_id: String,
        question: String,
        answer: String,
    },
    #[serde(rename = "review.phase_advanced")]
    PhaseAdvanced { review_id: String, to: ReviewPhase },
    #[serde(rename = "review.intentions_set")]
    IntentionsSet {
        review_id: String,
        intentions: Vec<String>,
    },
    #[serde(rename = "review.closed")]
    Closed {
        review_id: String,
        summary_generated: bool,
        #[serde(default)]
        summary: Option<String>,
    },
    #[serde(rename = "review.skipped")]
    Skipped { review_id: String },
}

impl ReviewEvent {
    fn review_id(&self) -> &str {
        match self {
            ReviewEvent::Started { review_id, .. }
            | ReviewEvent::Answered { review_id, .. }
            | ReviewEvent::PhaseAdvanced { review_id, .. }
            | ReviewEvent::IntentionsSet { review_id, .. }
            | ReviewEvent::Closed { review_id, .. }
            | ReviewEvent::Skipped { review_id } => review_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
    pub active: Option<Review>,
    /// Closed reviews, oldest first.
    pub history: Vec<Review>,
}

impl ReviewState {
    fn active_with_id(&self, review_id: &str) -> Option<&Review> {
        self.active.as_ref().filter(|r| r.id == review_id)
    }

    pub fn last_closed(&self) -> Option<&Review> {
        self.history.last()
    }

    /// Whether a review covering the week starting `week_start` was closed.
    pub fn closed_week(&self, week_start: NaiveDate) -> bool {
        self.history.iter().any(|r| r.week_start == week_start)
    }
}

#[derive(Debug, Clone)]
pub struct ReviewKernel {
    config: ReviewConfig,
}

impl ReviewKernel {
    pub fn new(config: ReviewConfig) -> Self {
        Self { config }
    }
}

impl Default for ReviewKernel {
    fn default() -> Self {
        Self::new(ReviewConfig::default())
    }
}

fn ignored(reason: &str, review_id: &str) -> Result<Vec<Event<ReviewEvent>>> {
    tracing::debug!(review_id, reason, "review command ignored");
    Ok(Vec::new())
}

impl Kernel for ReviewKernel {
    type Command = ReviewCommand;
    type Event = ReviewEvent;
    type State = ReviewState;

    fn handle(
        &self,
        prior: &[Event<ReviewEvent>],
        command: &Command<ReviewCommand>,
    ) -> Result<Vec<Event<ReviewEvent>>> {
        let state = self.replay(prior);

        let event = match &command.body {
            ReviewCommand::Start {
                review_id,
                utc_offset_minutes,
            } => {
                if review_id.trim().is_empty() {
                    return Err(ValidationError::empty("review_id").into());
                }
                let (week_start, week_end) = week_bounds(command.requested_at, *utc_offset_minutes)?;
                if state.active.is_some() {
                    return ignored("a review is already active", review_id);
                }
                ReviewEvent::Started {
                    review_id: review_id.clone(),
                    week_start,
                    week_end,
                }
            }
            ReviewCommand::Answer {
                review_id,
                question,
                answer,
            } => {
                let question = non_blank(question).ok_or_else(|| ValidationError::empty("question"))?;
                match state.active_with_id(review_id) {
                    Some(review) if review.phase.accepts_answers() => ReviewEvent::Answered {
                        review_id: review_id.clone(),
                        question,
                        answer: answer.trim().to_string(),
                    },
                    _ => return ignored("not answerable", review_id),
                }
            }
            ReviewCommand::Advance { review_id } => {
                match state.active_with_id(review_id).and_then(|r| r.phase.next()) {
                    Some(to) => ReviewEvent::PhaseAdvanced {
                        review_id: review_id.clone(),
                        to,
                    },
                    None => return ignored("cannot advance", review_id),
                }
            }
            ReviewCommand::SetIntentions {
                review_id,
                intentions,
            } => {
                let cleaned: Vec<String> = intentions.iter().filter_map(|i| non_blank(i)).collect();
                if cleaned.len() != intentions.len() {
                    return Err(ValidationError::empty("intentions").into());
                }
                if cleaned.len() > self.config.max_intentions {
                    return Err(ValidationError::OutOfRange {
                        field: "intentions".to_string(),
                        value: cleaned.len() as f64,
                        min: 0.0,
                        max: self.config.max_intentions as f64,
                    }
                    .into());
                }
                match state.active_with_id(review_id) {
                    Some(review) if review.phase == ReviewPhase::Intentions => {
                        ReviewEvent::IntentionsSet {
                            review_id: review_id.clone(),
                            intentions: cleaned,
                        }
                    }
                    _ => return ignored("not in intentions phase", review_id),
                }
            }
            ReviewCommand::Close {
                review_id,
                summary_generated,
                summary,
            } => match state.active_with_id(review_id) {
                Some(review) if review.phase == ReviewPhase::Intentions => ReviewEvent::Closed {
                    review_id: review_id.clone(),
                    summary_generated: *summary_generated,
                    summary: summary
                        .as_deref()
                        .map(|s| truncate_chars(s, self.config.summary_max_chars)),
                },
                _ => return ignored("not closable", review_id),
            },
            ReviewCommand::Skip { review_id } => {
                if state.active_with_id(review_id).is_none() {
                    return ignored("no such active review", review_id);
                }
                ReviewEvent::Skipped {
                    review_id: review_id.clone(),
                }
            }
        };

        Ok(vec![command.emit(event)])
    }

    fn reduce(&self, mut state: ReviewState, event: &Event<ReviewEvent>) -> ReviewState {
        let at = event.occurred_at;

        if let ReviewEvent::Started {
            review_id,
            week_start,
            week_end,
        } = &event.body
        {
            if state.active.is_none() {
                state.active = Some(Review {
                    id: review_id.clone(),
                    week_start: *week_start,
                    week_end: *week_end,
                    phase: ReviewPhase::Lookback,
                    answers: BTreeMap::new(),
                    intentions: Vec::new(),
                    summary_generated: false,
                    summary: None,
                    started_at: at,
                    closed_at: None,
                });
            }
            return state;
        }

        let Some(mut review) = state.active.take() else {
            return state;
        };
        if review.id != event.body.review_id() {
            state.active = Some(review);
            return state;
        }

        match &event.body {
            ReviewEvent::Started { .. } => {}
            ReviewEvent::Answered {
                question, answer, ..
            } => {
                if review.phase.accepts_answers() {
                    review.answers.insert(question.clone(), answer.clone());
                }
            }
            ReviewEvent::PhaseAdvanced { to, .. } => {
                if review.phase.next() == Some(*to) {
                    review.phase = *to;
                }
            }
            ReviewEvent::IntentionsSet { intentions, .. } => {
                if review.phase == ReviewPhase::Intentions {
                    review.intentions = intentions.clone();
                }
            }
            ReviewEvent::Closed {
                summary_generated,
                summary,
                ..
            } => {
                review.phase = ReviewPhase::Closed;
                review.summary_generated = *summary_generated;
                review.summary = summary.clone();
                review.closed_at = Some(at);
                state.history.push(review);
                return state;
            }
            ReviewEvent::Skipped { .. } => return state,
        }

        state.active = Some(review);
        state
    }
}
