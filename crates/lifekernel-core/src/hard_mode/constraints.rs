//! All-or-nothing plan validation.

use super::{HardModeConstraint, Module, ModuleScope, PlannedItem};
use crate::error::ConstraintViolation;

/// Smallest `max_planned_items` among the constraints, if any.
pub fn effective_max_items(constraints: &[HardModeConstraint]) -> Option<usize> {
    constraints
        .iter()
        .filter_map(|c| match c {
            HardModeConstraint::MaxPlannedItems { max } => Some(*max),
            _ => None,
        })
        .min()
}

/// Check every item against every constraint. The first violation rejects
/// the whole plan.
pub fn validate_plan(
    items: &[PlannedItem],
    constraints: &[HardModeConstraint],
) -> Result<(), ConstraintViolation> {
    for constraint in constraints {
        match constraint {
            HardModeConstraint::DisallowModule { module } => {
                if let Some(item) = items.iter().find(|i| i.module == *module) {
                    return Err(ConstraintViolation::DisallowedModule {
                        item_id: item.id.clone(),
                        module: *module,
                    });
                }
            }
            HardModeConstraint::AllowedHabitAnchors { anchors } => {
                let outside = items.iter().find(|i| {
                    i.module == Module::Habits
                        && !i.habit_anchor.as_ref().is_some_and(|a| anchors.contains(a))
                });
                if let Some(item) = outside {
                    return Err(ConstraintViolation::AnchorNotAllowed {
                        item_id: item.id.clone(),
                        anchor: item.habit_anchor.clone(),
                    });
                }
            }
            HardModeConstraint::MaxPlannedItems { .. } => {}
        }
    }

    if let Some(max) = effective_max_items(constraints) {
        if items.len() > max {
            return Err(ConstraintViolation::TooManyItems {
                count: items.len(),
                max,
            });
        }
    }
    Ok(())
}

/// Reject items for modules the session does not plan for.
pub fn validate_scope(items: &[PlannedItem], scope: &ModuleScope) -> Result<(), ConstraintViolation> {
    match items.iter().find(|i| !scope.includes(i.module)) {
        Some(item) => Err(ConstraintViolation::ModuleOutOfScope {
            item_id: item.id.clone(),
            module: item.module,
        }),
        None => Ok(()),
    }
}
