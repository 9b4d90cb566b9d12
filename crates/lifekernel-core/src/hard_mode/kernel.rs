use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{
    apply_flag, apply_low_energy_failsafe, crisis_override, is_low_energy, validate_plan,
    validate_scope, DayPlan, Flag, HardModeConstraint, HardModeSession, ItemStatus, ModuleScope,
    PlannedItem, SessionWindow,
};
use crate::checkin::check_scale;
use crate::config::HardModeConfig;
use crate::error::{Result, ValidationError};
use crate::events::{Command, Event, Kernel};
use crate::text::truncate_chars;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum HardModeCommand {
    #[serde(rename = "hard_mode.activate")]
    Activate {
        session_id: String,
        #[serde(default)]
        scope: ModuleScope,
        #[serde(default)]
        constraints: Vec<HardModeConstraint>,
        window: SessionWindow,
    },
    #[serde(rename = "hard_mode.extend")]
    Extend { session_id: String, until: NaiveDate },
    /// Issued by the external scheduler with generator output for `day`.
    #[serde(rename = "hard_mode.generate_plan")]
    GeneratePlan {
        session_id: String,
        day: NaiveDate,
        items: Vec<PlannedItem>,
        #[serde(default)]
        mood: Option<u8>,
        #[serde(default)]
        energy: Option<u8>,
    },
    #[serde(rename = "hard_mode.flag_item")]
    FlagItem {
        session_id: String,
        item_id: String,
        flag: Flag,
    },
    #[serde(rename = "hard_mode.complete_item")]
    CompleteItem { session_id: String, item_id: String },
    #[serde(rename = "hard_mode.crisis_override")]
    CrisisOverride { session_id: String },
    #[serde(rename = "hard_mode.deactivate")]
    Deactivate { session_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum HardModeEvent {
    #[serde(rename = "hard_mode.activated")]
    Activated {
        session_id: String,
        scope: ModuleScope,
        constraints: Vec<HardModeConstraint>,
        window: SessionWindow,
    },
    #[serde(rename = "hard_mode.extended")]
    Extended { session_id: String, until: NaiveDate },
    /// Carries the plan as adopted: validated, truncated and failsafe-trimmed.
    #[serde(rename = "hard_mode.plan_generated")]
    PlanGenerated { session_id: String, plan: DayPlan },
    #[serde(rename = "hard_mode.item_flagged")]
    ItemFlagged {
        session_id: String,
        item_id: String,
        flag: Flag,
    },
    #[serde(rename = "hard_mode.item_completed")]
    ItemCompleted { session_id: String, item_id: String },
    #[serde(rename = "hard_mode.crisis_override")]
    CrisisOverride { session_id: String },
    #[serde(rename = "hard_mode.deactivated")]
    Deactivated { session_id: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardModeState {
    pub current_session: Option<HardModeSession>,
}

impl HardModeState {
    pub fn active_session(&self) -> Option<&HardModeSession> {
        self.current_session.as_ref().filter(|s| s.is_active)
    }

    /// Plan of the active session, if one was generated.
    pub fn plan(&self) -> Option<&DayPlan> {
        self.active_session().and_then(|s| s.plan.as_ref())
    }

    fn active(&self, session_id: &str) -> Option<&HardModeSession> {
        self.active_session().filter(|s| s.id == session_id)
    }

    fn active_mut(&mut self, session_id: &str) -> Option<&mut HardModeSession> {
        let session = self
            .current_session
            .as_mut()
            .filter(|s| s.is_active && s.id == session_id);
        if session.is_none() {
            tracing::debug!(session_id, "event for inactive or foreign session ignored");
        }
        session
    }
}

#[derive(Debug, Clone, Default)]
pub struct HardModeKernel {
    config: HardModeConfig,
}

impl HardModeKernel {
    pub fn new(config: HardModeConfig) -> Self {
        Self { config }
    }

    /// Validate generator output and turn it into the plan that gets adopted.
    fn adopt_plan(
        &self,
        session: &HardModeSession,
        day: NaiveDate,
        items: &[PlannedItem],
        mood: Option<u8>,
        energy: Option<u8>,
        at: DateTime<Utc>,
    ) -> Result<DayPlan> {
        if !session.window.contains(day) {
            return Err(ValidationError::invalid(
                "day",
                format!(
                    "{day} is outside the session window {}..={}",
                    session.window.start, session.window.end
                ),
            )
            .into());
        }
        if let Some(mood) = mood {
            check_scale("mood", mood)?;
        }
        if let Some(energy) = energy {
            check_scale("energy", energy)?;
        }
        validate_items(items)?;

        if let Err(violation) = validate_scope(items, &session.scope)
            .and_then(|()| validate_plan(items, &session.constraints))
        {
            tracing::warn!(session_id = %session.id, %day, %violation, "plan rejected");
            return Err(violation.into());
        }

        let items: Vec<PlannedItem> = items
            .iter()
            .cloned()
            .map(|mut item| {
                item.rationale = truncate_chars(&item.rationale, self.config.rationale_max_chars);
                item.status = ItemStatus::Planned;
                item.flagged_at = None;
                item.last_flag = None;
                item
            })
            .collect();

        let low_energy_applied = is_low_energy(mood, energy);
        let items = if low_energy_applied {
            let generated = items.len();
            let kept = apply_low_energy_failsafe(items);
            tracing::debug!(session_id = %session.id, generated, kept = kept.len(), "low-energy failsafe applied");
            kept
        } else {
            items
        };

        Ok(DayPlan {
            day,
            generated_at: at,
            items,
            mood,
            energy,
            low_energy_applied,
        })
    }
}

fn validate_items(items: &[PlannedItem]) -> Result<(), ValidationError> {
    let mut seen = BTreeSet::new();
    for item in items {
        if item.id.trim().is_empty() {
            return Err(ValidationError::empty("items.id"));
        }
        if item.title.trim().is_empty() {
            return Err(ValidationError::empty(format!("items[{}].title", item.id)));
        }
        if !(0.0..=1.0).contains(&item.confidence) {
            return Err(ValidationError::OutOfRange {
                field: format!("items[{}].confidence", item.id),
                value: item.confidence,
                min: 0.0,
                max: 1.0,
            });
        }
        if !seen.insert(item.id.as_str()) {
            return Err(ValidationError::invalid(
                "items",
                format!("duplicate item id '{}'", item.id),
            ));
        }
    }
    Ok(())
}

fn validate_constraints(constraints: &[HardModeConstraint]) -> Result<(), ValidationError> {
    for constraint in constraints {
        if let HardModeConstraint::MaxPlannedItems { max: 0 } = constraint {
            return Err(ValidationError::invalid(
                "max_planned_items",
                "must allow at least one item",
            ));
        }
    }
    Ok(())
}

fn ignored(reason: &str, id: &str) -> Result<Vec<Event<HardModeEvent>>> {
    tracing::debug!(id, reason, "hard mode command ignored");
    Ok(Vec::new())
}

impl Kernel for HardModeKernel {
    type Command = HardModeCommand;
    type Event = HardModeEvent;
    type State = HardModeState;

    fn handle(
        &self,
        prior: &[Event<HardModeEvent>],
        command: &Command<HardModeCommand>,
    ) -> Result<Vec<Event<HardModeEvent>>> {
        let state = self.replay(prior);

        let event = match &command.body {
            HardModeCommand::Activate {
                session_id,
                scope,
                constraints,
                window,
            } => {
                if session_id.trim().is_empty() {
                    return Err(ValidationError::empty("session_id").into());
                }
                if window.end < window.start {
                    return Err(ValidationError::invalid("window", "end is before start").into());
                }
                if scope.is_empty() {
                    return Err(ValidationError::EmptyCollection("scope".to_string()).into());
                }
                validate_constraints(constraints)?;
                if state
                    .current_session
                    .as_ref()
                    .is_some_and(|s| s.id == *session_id)
                {
                    return ignored("session id already used", session_id);
                }
                HardModeEvent::Activated {
                    session_id: session_id.clone(),
                    scope: *scope,
                    constraints: constraints.clone(),
                    window: *window,
                }
            }
            HardModeCommand::Extend { session_id, until } => {
                let Some(session) = state.active(session_id) else {
                    return ignored("session not active", session_id);
                };
                if *until < session.window.end {
                    return Err(ValidationError::invalid(
                        "until",
                        format!("{until} is before the window end {}", session.window.end),
                    )
                    .into());
                }
                HardModeEvent::Extended {
                    session_id: session_id.clone(),
                    until: *until,
                }
            }
            HardModeCommand::GeneratePlan {
                session_id,
                day,
                items,
                mood,
                energy,
            } => {
                let Some(session) = state.active(session_id) else {
                    return ignored("session not active", session_id);
                };
                let plan =
                    self.adopt_plan(session, *day, items, *mood, *energy, command.requested_at)?;
                HardModeEvent::PlanGenerated {
                    session_id: session_id.clone(),
                    plan,
                }
            }
            HardModeCommand::FlagItem {
                session_id,
                item_id,
                flag,
            } => {
                let known = state
                    .active(session_id)
                    .and_then(|s| s.plan.as_ref())
                    .is_some_and(|plan| plan.item(item_id).is_some());
                if !known {
                    return ignored("no such item in the current plan", item_id);
                }
                HardModeEvent::ItemFlagged {
                    session_id: session_id.clone(),
                    item_id: item_id.clone(),
                    flag: *flag,
                }
            }
            HardModeCommand::CompleteItem {
                session_id,
                item_id,
            } => {
                let planned = state
                    .active(session_id)
                    .and_then(|s| s.plan.as_ref())
                    .and_then(|plan| plan.item(item_id))
                    .is_some_and(PlannedItem::is_planned);
                if !planned {
                    return ignored("item missing or not planned", item_id);
                }
                HardModeEvent::ItemCompleted {
                    session_id: session_id.clone(),
                    item_id: item_id.clone(),
                }
            }
            HardModeCommand::CrisisOverride { session_id } if state.active(session_id).is_some() => {
                HardModeEvent::CrisisOverride {
                    session_id: session_id.clone(),
                }
            }
            HardModeCommand::Deactivate { session_id } if state.active(session_id).is_some() => {
                HardModeEvent::Deactivated {
                    session_id: session_id.clone(),
                }
            }
            HardModeCommand::CrisisOverride { session_id }
            | HardModeCommand::Deactivate { session_id } => {
                return ignored("session not active", session_id);
            }
        };
        Ok(vec![command.emit(event)])
    }

    fn reduce(&self, mut state: HardModeState, event: &Event<HardModeEvent>) -> HardModeState {
        let at = event.occurred_at;
        match &event.body {
            HardModeEvent::Activated {
                session_id,
                scope,
                constraints,
                window,
            } => {
                if state
                    .current_session
                    .as_ref()
                    .is_some_and(|s| s.id == *session_id)
                {
                    tracing::debug!(%session_id, "duplicate activation ignored");
                } else {
                    state.current_session = Some(HardModeSession {
                        id: session_id.clone(),
                        scope: *scope,
                        constraints: constraints.clone(),
                        window: *window,
                        is_active: true,
                        plan: None,
                        activated_at: at,
                        deactivated_at: None,
                        crisis_override_at: None,
                    });
                }
            }
            HardModeEvent::Extended { session_id, until } => {
                if let Some(session) = state.active_mut(session_id) {
                    session.window.end = session.window.end.max(*until);
                }
            }
            HardModeEvent::PlanGenerated { session_id, plan } => {
                if let Some(session) = state.active_mut(session_id) {
                    session.plan = Some(plan.clone());
                }
            }
            HardModeEvent::ItemFlagged {
                session_id,
                item_id,
                flag,
            } => {
                if let Some(plan) = state.active_mut(session_id).and_then(|s| s.plan.as_mut()) {
                    plan.items = apply_flag(&plan.items, item_id, *flag, at);
                }
            }
            HardModeEvent::ItemCompleted {
                session_id,
                item_id,
            } => {
                let item = state
                    .active_mut(session_id)
                    .and_then(|s| s.plan.as_mut())
                    .and_then(|plan| plan.items.iter_mut().find(|i| i.id == *item_id));
                if let Some(item) = item.filter(|i| i.is_planned()) {
                    item.status = ItemStatus::Done;
                }
            }
            HardModeEvent::CrisisOverride { session_id } => {
                if let Some(session) = state.active_mut(session_id) {
                    session.crisis_override_at = Some(at);
                    if let Some(plan) = session.plan.as_mut() {
                        plan.items = crisis_override(&plan.items);
                    }
                }
            }
            HardModeEvent::Deactivated { session_id } => {
                if let Some(session) = state.active_mut(session_id) {
                    session.is_active = false;
                    session.deactivated_at = Some(at);
                }
            }
        }
        state
    }
}
