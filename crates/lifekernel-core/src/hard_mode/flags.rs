//! The four flag-correction operations.
//!
//! | Flag            | Effect                                                      |
//! |-----------------|-------------------------------------------------------------|
//! | `not_now`       | reschedule target +2h, status back to `planned`             |
//! | `not_aligned`   | drop target                                                 |
//! | `too_much`      | drop target and the lowest-confidence other planned item    |
//! | crisis override | drop every item                                             |
//!
//! Flagging an id that is not in the plan leaves the plan unchanged.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{ItemStatus, PlannedItem};

/// How far `not_now` pushes an item.
pub const NOT_NOW_SHIFT_HOURS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    NotNow,
    NotAligned,
    TooMuch,
}

/// Apply `flag` to `item_id`, returning the corrected items.
pub fn apply_flag(
    items: &[PlannedItem],
    item_id: &str,
    flag: Flag,
    at: DateTime<Utc>,
) -> Vec<PlannedItem> {
    let mut items = items.to_vec();
    let Some(target) = items.iter().position(|i| i.id == item_id) else {
        tracing::debug!(item_id, ?flag, "flag on unknown item ignored");
        return items;
    };

    match flag {
        Flag::NotNow => {
            let item = &mut items[target];
            item.scheduled_at += Duration::hours(NOT_NOW_SHIFT_HOURS);
            item.status = ItemStatus::Planned;
        }
        Flag::NotAligned => {
            items[target].status = ItemStatus::Dropped;
        }
        Flag::TooMuch => {
            let lowest = items
                .iter()
                .enumerate()
                .filter(|(index, item)| *index != target && item.is_planned())
                .min_by(|(_, a), (_, b)| a.confidence.total_cmp(&b.confidence))
                .map(|(index, _)| index);
            items[target].status = ItemStatus::Dropped;
            if let Some(index) = lowest {
                items[index].status = ItemStatus::Dropped;
            }
        }
    }

    let item = &mut items[target];
    item.flagged_at = Some(at);
    item.last_flag = Some(flag);
    items
}

/// Drop every item in the plan.
pub fn crisis_override(items: &[PlannedItem]) -> Vec<PlannedItem> {
    items
        .iter()
        .cloned()
        .map(|mut item| {
            item.status = ItemStatus::Dropped;
            item
        })
        .collect()
}
