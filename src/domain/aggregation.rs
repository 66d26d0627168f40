use crate::domain::models::{Day, EntityId, EntityKind, Rollup, Task, TaskStatus, Week};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// A child whose parent row is gone. Roll-up along that path stops here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind} {id} references missing {parent_kind} {parent_id}")]
pub struct OrphanContainer {
    pub kind: EntityKind,
    pub id: EntityId,
    pub parent_kind: EntityKind,
    pub parent_id: EntityId,
}

/// What a container sees of one child when rolling up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildState {
    pub status: TaskStatus,
    pub work_seconds: i64,
    pub break_seconds: i64,
    pub pause_seconds: i64,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
}

impl From<&Task> for ChildState {
    fn from(task: &Task) -> Self {
        Self {
            status: task.status,
            work_seconds: task.work_seconds,
            break_seconds: task.break_seconds,
            pause_seconds: task.pause_seconds,
            actual_start: task.first_started_at,
            actual_end: task.completed_at,
        }
    }
}

impl From<&Day> for ChildState {
    fn from(day: &Day) -> Self {
        Self::from_rollup(day.effective_status(), &day.rollup)
    }
}

impl From<&Week> for ChildState {
    fn from(week: &Week) -> Self {
        Self::from_rollup(week.rollup.status, &week.rollup)
    }
}

impl ChildState {
    fn from_rollup(status: TaskStatus, rollup: &Rollup) -> Self {
        Self {
            status,
            work_seconds: rollup.work_seconds,
            break_seconds: rollup.break_seconds,
            pause_seconds: rollup.pause_seconds,
            actual_start: rollup.actual_start,
            actual_end: rollup.actual_end,
        }
    }
}

/// Most active child wins; COMPLETED only when every child is.
pub fn derive_status(statuses: impl IntoIterator<Item = TaskStatus>) -> TaskStatus {
    let mut any_working = false;
    let mut any_break = false;
    let mut any_paused = false;
    let mut all_completed = true;
    let mut count = 0usize;

    for status in statuses {
        count += 1;
        match status {
            TaskStatus::Working => any_working = true,
            TaskStatus::Break => any_break = true,
            TaskStatus::Paused => any_paused = true,
            TaskStatus::Completed => {}
            TaskStatus::Pending => {}
        }
        if status != TaskStatus::Completed {
            all_completed = false;
        }
    }

    if any_working {
        TaskStatus::Working
    } else if any_break {
        TaskStatus::Break
    } else if any_paused {
        TaskStatus::Paused
    } else if count > 0 && all_completed {
        TaskStatus::Completed
    } else {
        TaskStatus::Pending
    }
}

pub fn aggregate(children: &[ChildState]) -> Rollup {
    Rollup {
        status: derive_status(children.iter().map(|child| child.status)),
        work_seconds: children.iter().map(|child| child.work_seconds).sum(),
        break_seconds: children.iter().map(|child| child.break_seconds).sum(),
        pause_seconds: children.iter().map(|child| child.pause_seconds).sum(),
        actual_start: children.iter().filter_map(|child| child.actual_start).min(),
        actual_end: children.iter().filter_map(|child| child.actual_end).max(),
    }
}

pub fn aggregate_day(tasks: &[Task]) -> Rollup {
    let children = tasks.iter().map(ChildState::from).collect::<Vec<_>>();
    aggregate(&children)
}

/// A week rolls up its days plus any tasks filed directly under it.
pub fn aggregate_week(days: &[Day], loose_tasks: &[Task]) -> Rollup {
    let children = days
        .iter()
        .map(ChildState::from)
        .chain(loose_tasks.iter().map(ChildState::from))
        .collect::<Vec<_>>();
    aggregate(&children)
}

pub fn aggregate_phase(weeks: &[Week]) -> Rollup {
    let children = weeks.iter().map(ChildState::from).collect::<Vec<_>>();
    aggregate(&children)
}
