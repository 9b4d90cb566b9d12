//! Suggestion policy engine.
//!
//! Each policy reads already-folded projections and returns candidate
//! suggestions without seeing what other policies produced. The engine merges
//! them:
//!
//! 1. flatten every policy's output
//! 2. dedupe by id, keeping the highest priority (a later equal priority wins)
//! 3. sort by priority, highest first, keeping merge order on ties
//! 4. keep at most [`SUGGESTION_CAP`] entries

mod policies;

pub use policies::{
    checkin_prompt, envelope_approaching, focus_empty, morning_habit_prompt, pattern_surface,
    rest_permission, weekly_review_ready,
};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::checkin::CheckinState;
use crate::config::{SuggestionConfig, SUGGESTION_CAP};
use crate::habit::HabitState;
use crate::review::ReviewState;
use crate::task::TaskState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyTag {
    MorningHabits,
    CheckinPrompt,
    WeeklyReview,
    EnvelopeApproaching,
    PatternSurface,
    FocusEmpty,
    RestPermission,
}

/// What the UI should open when a suggestion is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuggestionAction {
    OpenHabits,
    StartCheckin,
    StartReview,
    OpenEnvelope { envelope_id: String },
    FocusTask { task_id: String },
    ViewPattern { pattern_id: String },
    Rest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub policy: PolicyTag,
    pub headline: String,
    pub subtext: String,
    /// 1 (lowest) to 5 (highest)
    pub priority: u8,
    pub action: Option<SuggestionAction>,
}

impl Suggestion {
    pub fn new(
        id: impl Into<String>,
        policy: PolicyTag,
        priority: u8,
        headline: impl Into<String>,
        subtext: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            policy,
            headline: headline.into(),
            subtext: subtext.into(),
            priority: priority.clamp(1, 5),
            action: None,
        }
    }

    pub fn with_action(mut self, action: SuggestionAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Spending envelope utilisation, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeUsage {
    pub id: String,
    pub label: String,
    pub spent: f64,
    pub limit: f64,
}

impl EnvelopeUsage {
    /// `spent / limit`, or `None` for a non-positive limit.
    pub fn utilization(&self) -> Option<f64> {
        (self.limit > 0.0).then(|| self.spent / self.limit)
    }
}

/// Pattern detected elsewhere, with opaque explanation text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInsight {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub explanation: String,
    pub confidence: f64,
}

/// Everything a policy may look at.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    pub now: DateTime<Utc>,
    pub habits: &'a HabitState,
    pub tasks: &'a TaskState,
    pub checkins: &'a CheckinState,
    pub reviews: &'a ReviewState,
    pub envelopes: &'a [EnvelopeUsage],
    pub patterns: &'a [PatternInsight],
}

impl PolicyInput<'_> {
    /// `now` shifted into the configured local offset. Only clock checks
    /// (morning window, review weekday) use it.
    pub fn local_now(&self, config: &SuggestionConfig) -> NaiveDateTime {
        self.now.naive_utc() + Duration::minutes(i64::from(config.utc_offset_minutes))
    }

    /// The UTC day of `now`. Day-scoped projections (the habit today-log,
    /// task completions) are keyed by this day, so callers fold habits with
    /// `HabitState::for_date(input.today())`.
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

pub type Policy = fn(&PolicyInput<'_>, &SuggestionConfig) -> Vec<Suggestion>;

/// Registered policies, in merge order.
pub const POLICIES: [(PolicyTag, Policy); 7] = [
    (PolicyTag::RestPermission, rest_permission),
    (PolicyTag::CheckinPrompt, checkin_prompt),
    (PolicyTag::MorningHabits, morning_habit_prompt),
    (PolicyTag::FocusEmpty, focus_empty),
    (PolicyTag::WeeklyReview, weekly_review_ready),
    (PolicyTag::EnvelopeApproaching, envelope_approaching),
    (PolicyTag::PatternSurface, pattern_surface),
];

/// Merge candidates into the final ranked list of at most `cap` (itself
/// bounded by [`SUGGESTION_CAP`]) suggestions.
pub fn aggregate(candidates: impl IntoIterator<Item = Suggestion>, cap: usize) -> Vec<Suggestion> {
    let mut by_id: IndexMap<String, Suggestion> = IndexMap::new();
    for candidate in candidates {
        match by_id.get(&candidate.id) {
            Some(existing) if candidate.priority < existing.priority => {}
            _ => {
                by_id.insert(candidate.id.clone(), candidate);
            }
        }
    }

    let mut ranked: Vec<Suggestion> = by_id.into_values().collect();
    ranked.sort_by(|a, b| b.priority.cmp(&a.priority));
    ranked.truncate(cap.min(SUGGESTION_CAP));
    ranked
}

/// Run every registered policy and merge the results.
pub fn suggest(input: &PolicyInput<'_>, config: &SuggestionConfig) -> Vec<Suggestion> {
    let candidates: Vec<Suggestion> = POLICIES
        .iter()
        .flat_map(|(tag, policy)| {
            let out = policy(input, config);
            if !out.is_empty() {
                tracing::debug!(policy = ?tag, count = out.len(), "policy fired");
            }
            out
        })
        .collect();
    aggregate(candidates, config.cap())
}
