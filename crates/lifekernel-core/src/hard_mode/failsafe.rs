//! Low-energy failsafe.
//!
//! On a low-capacity day the plan shrinks to at most one habit, one task and
//! one check-in item: the earliest scheduled of each. Everything else,
//! including any other module, is removed.

use super::{ItemStatus, Module, PlannedItem};

/// Mood or energy at or below this marks a low-capacity day.
pub const LOW_ENERGY_THRESHOLD: u8 = 2;

/// True when any supplied reading is at or below [`LOW_ENERGY_THRESHOLD`].
/// With no readings at all the failsafe does not apply.
pub fn is_low_energy(mood: Option<u8>, energy: Option<u8>) -> bool {
    let low = |reading: u8| reading <= LOW_ENERGY_THRESHOLD;
    mood.is_some_and(low) || energy.is_some_and(low)
}

/// Keep the earliest-scheduled item per failsafe module, in original order,
/// with status reset to `planned`. Ties go to the item listed first.
pub fn apply_low_energy_failsafe(items: Vec<PlannedItem>) -> Vec<PlannedItem> {
    let survivors: Vec<usize> = Module::FAILSAFE_MODULES
        .iter()
        .filter_map(|module| {
            items
                .iter()
                .enumerate()
                .filter(|(_, item)| item.module == *module)
                .min_by_key(|(index, item)| (item.scheduled_at, *index))
                .map(|(index, _)| index)
        })
        .collect();

    items
        .into_iter()
        .enumerate()
        .filter(|(index, _)| survivors.contains(index))
        .map(|(_, mut item)| {
            item.status = ItemStatus::Planned;
            item.flagged_at = None;
            item.last_flag = None;
            item
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, 0, 0).unwrap()
    }

    #[test]
    fn threshold_is_inclusive_and_missing_readings_bypass() {
        assert!(is_low_energy(Some(2), Some(4)));
        assert!(is_low_energy(Some(4), Some(2)));
        assert!(is_low_energy(None, Some(1)));
        assert!(!is_low_energy(Some(3), Some(3)));
        assert!(!is_low_energy(None, None));
    }

    #[test]
    fn keeps_earliest_item_per_module() {
        let items = vec![
            PlannedItem::new("h-late", Module::Habits, "Stretch", at(18), 0.9),
            PlannedItem::new("t-early", Module::Tasks, "Email", at(9), 0.5),
            PlannedItem::new("h-early", Module::Habits, "Walk", at(8), 0.4),
            PlannedItem::new("r", Module::Review, "Reflect", at(7), 0.9),
            PlannedItem::new("t-late", Module::Tasks, "Taxes", at(14), 0.8),
            PlannedItem::new("c", Module::Checkin, "Check in", at(20), 0.7),
        ];
        let kept: Vec<_> = apply_low_energy_failsafe(items)
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(kept, vec!["t-early", "h-early", "c"]);
    }

    #[test]
    fn survivors_are_reset_to_planned() {
        let mut done = PlannedItem::new("h", Module::Habits, "Walk", at(8), 0.4);
        done.status = ItemStatus::Dropped;
        done.flagged_at = Some(at(7));
        let out = apply_low_energy_failsafe(vec![done]);
        assert_eq!(out[0].status, ItemStatus::Planned);
        assert!(out[0].flagged_at.is_none());
    }

    #[test]
    fn equal_times_prefer_first_listed() {
        let items = vec![
            PlannedItem::new("a", Module::Tasks, "A", at(9), 0.1),
            PlannedItem::new("b", Module::Tasks, "B", at(9), 0.9),
        ];
        let out = apply_low_energy_failsafe(items);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "a");
    }
}
