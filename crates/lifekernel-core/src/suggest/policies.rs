//! The individual suggestion policies. Each is pure and independent.

use chrono::{Datelike, Duration, Timelike};

use super::{PolicyInput, PolicyTag, Suggestion, SuggestionAction};
use crate::config::SuggestionConfig;
use crate::review::week_bounds;

/// Morning window, habits due today, nothing logged yet.
pub fn morning_habit_prompt(input: &PolicyInput<'_>, config: &SuggestionConfig) -> Vec<Suggestion> {
    let local = input.local_now(config);
    let hour = local.hour();
    if hour < config.morning_start_hour || hour >= config.morning_end_hour {
        return Vec::new();
    }
    let today = input.today();
    let due = input.habits.due_on(today);
    if due.is_empty() || !input.habits.today_log.is_empty() {
        return Vec::new();
    }

    let subtext = match due.as_slice() {
        [only] => format!("{} is on for today.", only.name),
        many => format!("{} habits are on for today.", many.len()),
    };
    vec![Suggestion::new(
        format!("morning-habits-{today}"),
        PolicyTag::MorningHabits,
        3,
        "Start the day with a habit",
        subtext,
    )
    .with_action(SuggestionAction::OpenHabits)]
}

/// No check-in within the configured gap.
pub fn checkin_prompt(input: &PolicyInput<'_>, config: &SuggestionConfig) -> Vec<Suggestion> {
    let gap = Duration::hours(i64::from(config.checkin_gap_hours));
    let recent = input
        .checkins
        .last_submitted_at()
        .is_some_and(|last| input.now - last < gap);
    if recent {
        return Vec::new();
    }
    vec![Suggestion::new(
        "checkin-prompt",
        PolicyTag::CheckinPrompt,
        4,
        "How are you doing?",
        "A quick check-in helps plan around your energy.",
    )
    .with_action(SuggestionAction::StartCheckin)]
}

/// Review day, no review running, this week not yet closed.
pub fn weekly_review_ready(input: &PolicyInput<'_>, config: &SuggestionConfig) -> Vec<Suggestion> {
    let Some(review_day) = config.review_day() else {
        return Vec::new();
    };
    if input.local_now(config).weekday() != review_day || input.reviews.active.is_some() {
        return Vec::new();
    }
    let Ok((week_start, _)) = week_bounds(input.now, config.utc_offset_minutes) else {
        return Vec::new();
    };
    if input.reviews.closed_week(week_start) {
        return Vec::new();
    }
    vec![Suggestion::new(
        format!("weekly-review-{week_start}"),
        PolicyTag::WeeklyReview,
        3,
        "Your weekly review is ready",
        "Look back, reflect, and pick a few intentions.",
    )
    .with_action(SuggestionAction::StartReview)]
}

/// The most-used envelope, when it sits in `[warn_ratio, 1.0)`.
pub fn envelope_approaching(input: &PolicyInput<'_>, config: &SuggestionConfig) -> Vec<Suggestion> {
    let highest = input
        .envelopes
        .iter()
        .filter_map(|e| e.utilization().map(|u| (e, u)))
        .max_by(|(_, a), (_, b)| a.total_cmp(b));

    match highest {
        Some((envelope, used)) if used >= config.envelope_warn_ratio && used < 1.0 => {
            vec![Suggestion::new(
                format!("envelope-{}", envelope.id),
                PolicyTag::EnvelopeApproaching,
                4,
                format!("{} is nearly spent", envelope.label),
                format!("{:.0}% of this envelope is used.", used * 100.0),
            )
            .with_action(SuggestionAction::OpenEnvelope {
                envelope_id: envelope.id.clone(),
            })]
        }
        _ => Vec::new(),
    }
}

/// The most confident pattern above the threshold.
pub fn pattern_surface(input: &PolicyInput<'_>, config: &SuggestionConfig) -> Vec<Suggestion> {
    input
        .patterns
        .iter()
        .filter(|p| p.confidence >= config.pattern_min_confidence)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .map(|pattern| {
            Suggestion::new(
                format!("pattern-{}", pattern.id),
                PolicyTag::PatternSurface,
                2,
                pattern.title.clone(),
                pattern.explanation.clone(),
            )
            .with_action(SuggestionAction::ViewPattern {
                pattern_id: pattern.id.clone(),
            })
        })
        .into_iter()
        .collect()
}

/// Focus is empty while the inbox is not.
pub fn focus_empty(input: &PolicyInput<'_>, _config: &SuggestionConfig) -> Vec<Suggestion> {
    if input.tasks.focus_count() > 0 {
        return Vec::new();
    }
    let inbox = input.tasks.inbox();
    let Some(oldest) = inbox.first() else {
        return Vec::new();
    };
    vec![Suggestion::new(
        "focus-empty",
        PolicyTag::FocusEmpty,
        3,
        "Pick something to focus on",
        format!("{} waiting in your inbox, starting with \"{}\".", inbox.len(), oldest.title),
    )
    .with_action(SuggestionAction::FocusTask {
        task_id: oldest.id.clone(),
    })]
}

/// Nothing done today and the last known energy is low.
pub fn rest_permission(input: &PolicyInput<'_>, config: &SuggestionConfig) -> Vec<Suggestion> {
    let Some(latest) = input.checkins.latest() else {
        return Vec::new();
    };
    if latest.energy >= config.rest_energy_threshold {
        return Vec::new();
    }
    if !input.tasks.completed_on(input.today()).is_empty() || input.habits.has_progress_today() {
        return Vec::new();
    }
    vec![Suggestion::new(
        "rest-permission",
        PolicyTag::RestPermission,
        5,
        "It's okay to rest today",
        "Energy is low. Resting counts.",
    )
    .with_action(SuggestionAction::Rest)]
}
