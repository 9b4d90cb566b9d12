//! Task inbox/focus kernel.
//!
//! States follow strict transitions:
//!
//! ```text
//!   INBOX ──────────> FOCUS ──────────> COMPLETED
//!     │                 ^  │
//!     │ defer   focus   │  └──────────> ABANDONED
//!     v                 │                   ^
//!   DEFERRED ───────────┘                   │
//!     └─────────────────────────────────────┘
//!   (inbox and deferred may also be abandoned)
//! ```
//!
//! Terminal tasks are never revived. The focus cap lives in the reducer:
//! `task.focused` is emitted optimistically and silently ignored when focus
//! is already full, so callers must read the folded state to see whether a
//! focus attempt took effect. Defer, complete and abandon are only emitted
//! for transitions the current status allows.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::events::{Command, Event, Kernel};

/// Maximum number of tasks in focus at once.
pub const MAX_FOCUS: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Inbox,
    Focus,
    Deferred,
    Completed,
    Abandoned,
}

impl TaskStatus {
    /// Check if a transition is valid.
    pub fn can_transition_to(&self, to: &TaskStatus) -> bool {
        match self {
            TaskStatus::Inbox => matches!(
                to,
                TaskStatus::Focus | TaskStatus::Deferred | TaskStatus::Abandoned
            ),
            TaskStatus::Deferred => matches!(to, TaskStatus::Focus | TaskStatus::Abandoned),
            TaskStatus::Focus => matches!(to, TaskStatus::Completed | TaskStatus::Abandoned),
            TaskStatus::Completed | TaskStatus::Abandoned => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Abandoned)
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Inbox
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub focused_at: Option<DateTime<Utc>>,
    pub deferred_at: Option<DateTime<Utc>>,
    /// Day the task should resurface, if deferred with one.
    pub defer_until: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub abandoned_at: Option<DateTime<Utc>>,
    pub abandon_reason: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, at: DateTime<Utc>) -> Self {
        Task {
            id: id.into(),
            title: title.into(),
            status: TaskStatus::Inbox,
            created_at: at,
            updated_at: at,
            focused_at: None,
            deferred_at: None,
            defer_until: None,
            completed_at: None,
            abandoned_at: None,
            abandon_reason: None,
        }
    }

    /// Move to `to`, stamping the matching timestamp. Returns false and leaves
    /// the task untouched if the transition is not allowed.
    fn transition_to(&mut self, to: TaskStatus, at: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(&to) {
            return false;
        }
        match to {
            TaskStatus::Focus => self.focused_at = Some(at),
            TaskStatus::Deferred => self.deferred_at = Some(at),
            TaskStatus::Completed => self.completed_at = Some(at),
            TaskStatus::Abandoned => self.abandoned_at = Some(at),
            TaskStatus::Inbox => {}
        }
        self.status = to;
        self.updated_at = at;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum TaskCommand {
    #[serde(rename = "task.capture")]
    Capture { task_id: String, title: String },
    #[serde(rename = "task.focus")]
    Focus { task_id: String },
    #[serde(rename = "task.defer")]
    Defer {
        task_id: String,
        #[serde(default)]
        until: Option<NaiveDate>,
    },
    #[serde(rename = "task.complete")]
    Complete { task_id: String },
    #[serde(rename = "task.abandon")]
    Abandon {
        task_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum TaskEvent {
    #[serde(rename = "task.created")]
    Created { task_id: String, title: String },
    #[serde(rename = "task.focused")]
    Focused { task_id: String },
    #[serde(rename = "task.deferred")]
    Deferred {
        task_id: String,
        #[serde(default)]
        until: Option<NaiveDate>,
    },
    #[serde(rename = "task.completed")]
    Completed { task_id: String },
    #[serde(rename = "task.abandoned")]
    Abandoned {
        task_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub tasks: BTreeMap<String, Task>,
}

impl TaskState {
    fn with_status(&self, status: TaskStatus) -> Vec<&Task> {
        self.tasks.values().filter(|t| t.status == status).collect()
    }

    /// Focused tasks, oldest focus first.
    pub fn focus(&self) -> Vec<&Task> {
        let mut tasks = self.with_status(TaskStatus::Focus);
        tasks.sort_by(|a, b| a.focused_at.cmp(&b.focused_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    /// Inbox tasks in capture order.
    pub fn inbox(&self) -> Vec<&Task> {
        let mut tasks = self.with_status(TaskStatus::Inbox);
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub fn deferred(&self) -> Vec<&Task> {
        let mut tasks = self.with_status(TaskStatus::Deferred);
        tasks.sort_by(|a, b| a.deferred_at.cmp(&b.deferred_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub fn focus_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Focus)
            .count()
    }

    /// Tasks completed during the UTC day `day`.
    pub fn completed_on(&self, day: NaiveDate) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|t| t.completed_at.is_some_and(|c| c.date_naive() == day))
            .collect()
    }

    /// Exists and is not terminal.
    pub fn is_open(&self, task_id: &str) -> bool {
        self.tasks
            .get(task_id)
            .is_some_and(|t| !t.status.is_terminal())
    }

    /// Exists and may move to `to` from its current status.
    pub fn can_move(&self, task_id: &str, to: TaskStatus) -> bool {
        self.tasks
            .get(task_id)
            .is_some_and(|t| t.status.can_transition_to(&to))
    }

    fn transition(&mut self, task_id: &str, to: TaskStatus, at: DateTime<Utc>) -> Option<&mut Task> {
        let task = self.tasks.get_mut(task_id)?;
        if task.transition_to(to, at) {
            Some(task)
        } else {
            tracing::debug!(task_id, from = ?task.status, ?to, "invalid task transition ignored");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskKernel;

fn ignored(reason: &str, task_id: &str) -> Result<Vec<Event<TaskEvent>>> {
    tracing::debug!(task_id, reason, "task command ignored");
    Ok(Vec::new())
}

impl Kernel for TaskKernel {
    type Command = TaskCommand;
    type Event = TaskEvent;
    type State = TaskState;

    fn handle(
        &self,
        prior: &[Event<TaskEvent>],
        command: &Command<TaskCommand>,
    ) -> Result<Vec<Event<TaskEvent>>> {
        let state = self.replay(prior);

        let event = match &command.body {
            TaskCommand::Capture { task_id, title } => {
                if task_id.trim().is_empty() {
                    return Err(ValidationError::empty("task_id").into());
                }
                if title.trim().is_empty() {
                    return Err(ValidationError::empty("title").into());
                }
                if state.tasks.contains_key(task_id) {
                    return ignored("task id already used", task_id);
                }
                TaskEvent::Created {
                    task_id: task_id.clone(),
                    title: title.trim().to_string(),
                }
            }
            TaskCommand::Focus { task_id } if state.is_open(task_id) => TaskEvent::Focused {
                task_id: task_id.clone(),
            },
            TaskCommand::Defer { task_id, until }
                if state.can_move(task_id, TaskStatus::Deferred) =>
            {
                TaskEvent::Deferred {
                    task_id: task_id.clone(),
                    until: *until,
                }
            }
            TaskCommand::Complete { task_id } if state.can_move(task_id, TaskStatus::Completed) => {
                TaskEvent::Completed {
                    task_id: task_id.clone(),
                }
            }
            TaskCommand::Abandon { task_id, reason }
                if state.can_move(task_id, TaskStatus::Abandoned) =>
            {
                TaskEvent::Abandoned {
                    task_id: task_id.clone(),
                    reason: reason.clone(),
                }
            }
            TaskCommand::Focus { task_id }
            | TaskCommand::Defer { task_id, .. }
            | TaskCommand::Complete { task_id }
            | TaskCommand::Abandon { task_id, .. } => {
                return ignored("task missing, closed or transition not allowed", task_id);
            }
        };
        Ok(vec![command.emit(event)])
    }

    fn reduce(&self, mut state: TaskState, event: &Event<TaskEvent>) -> TaskState {
        let at = event.occurred_at;
        match &event.body {
            TaskEvent::Created { task_id, title } => {
                state
                    .tasks
                    .entry(task_id.clone())
                    .or_insert_with(|| Task::new(task_id.clone(), title.clone(), at));
            }
            TaskEvent::Focused { task_id } => {
                if state.focus_count() >= MAX_FOCUS {
                    tracing::debug!(%task_id, "focus is full");
                } else {
                    state.transition(task_id, TaskStatus::Focus, at);
                }
            }
            TaskEvent::Deferred { task_id, until } => {
                if let Some(task) = state.transition(task_id, TaskStatus::Deferred, at) {
                    task.defer_until = *until;
                }
            }
            TaskEvent::Completed { task_id } => {
                state.transition(task_id, TaskStatus::Completed, at);
            }
            TaskEvent::Abandoned { task_id, reason } => {
                if let Some(task) = state.transition(task_id, TaskStatus::Abandoned, at) {
                    task.abandon_reason = reason.clone();
                }
            }
        }
        state
    }
}
