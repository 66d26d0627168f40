//! Per-task work/break/pause state machine.
//!
//! Every function here is pure: it takes the current task value and an
//! instant and returns the next value. Persistence and roll-up happen in
//! `application::engine`.

use crate::domain::models::{EntityId, Task, TaskAction, TaskStatus, TimingSnapshot};
use crate::domain::time::elapsed_seconds;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("cannot {action} task {task_id} while it is {from}")]
pub struct InvalidTransition {
    pub task_id: EntityId,
    pub action: TaskAction,
    pub from: TaskStatus,
}

pub fn is_allowed(from: TaskStatus, action: TaskAction) -> bool {
    match action {
        TaskAction::Start => matches!(from, TaskStatus::Pending | TaskStatus::Paused),
        TaskAction::Pause | TaskAction::TakeBreak => from == TaskStatus::Working,
        TaskAction::Resume => matches!(from, TaskStatus::Break | TaskStatus::Paused),
        TaskAction::Complete => from != TaskStatus::Completed,
    }
}

pub fn apply_action(
    task: &Task,
    action: TaskAction,
    now: DateTime<Utc>,
) -> Result<Task, InvalidTransition> {
    if !is_allowed(task.status, action) {
        return Err(InvalidTransition {
            task_id: task.id,
            action,
            from: task.status,
        });
    }

    let mut next = task.clone();
    flush_running_segment(&mut next, now);

    match action {
        TaskAction::Start | TaskAction::Resume => {
            next.status = TaskStatus::Working;
            next.state_started_at = Some(now);
            next.first_started_at.get_or_insert(now);
        }
        TaskAction::Pause => {
            next.status = TaskStatus::Paused;
        }
        TaskAction::TakeBreak => {
            next.status = TaskStatus::Break;
            next.state_started_at = Some(now);
        }
        TaskAction::Complete => {
            next.status = TaskStatus::Completed;
            next.completed_at = Some(now);
        }
    }
    next.status_updated_at = now;
    Ok(next)
}

/// Credit the open WORKING/BREAK segment to its bucket and close it.
fn flush_running_segment(task: &mut Task, now: DateTime<Utc>) {
    let Some(started_at) = task.state_started_at.take() else {
        return;
    };
    let elapsed = elapsed_seconds(started_at, now);
    match task.status {
        TaskStatus::Working => task.work_seconds += elapsed,
        TaskStatus::Break => task.break_seconds += elapsed,
        TaskStatus::Pending | TaskStatus::Paused | TaskStatus::Completed => {}
    }
}

/// Reset a task left running by a session that never shut down cleanly.
///
/// The stale `state_started_at` spans process downtime, so nothing is
/// credited. Returns `None` when the task needs no recovery.
pub fn recover_zombie(task: &Task, now: DateTime<Utc>) -> Option<Task> {
    if !task.status.is_timed() {
        return None;
    }

    let never_started = task.state_started_at.is_none()
        && task.first_started_at.is_none()
        && task.total_seconds() == 0;

    let mut next = task.clone();
    next.status = if never_started {
        TaskStatus::Pending
    } else {
        TaskStatus::Paused
    };
    next.state_started_at = None;
    next.status_updated_at = now;
    Some(next)
}

pub fn timing_snapshot(task: &Task, now: DateTime<Utc>) -> TimingSnapshot {
    let live = match task.state_started_at {
        Some(started_at) if task.status.is_timed() => elapsed_seconds(started_at, now),
        _ => 0,
    };
    let (live_work, live_break) = match task.status {
        TaskStatus::Working => (live, 0),
        TaskStatus::Break => (0, live),
        TaskStatus::Pending | TaskStatus::Paused | TaskStatus::Completed => (0, 0),
    };

    TimingSnapshot {
        status: task.status,
        work_seconds: task.work_seconds + live_work,
        break_seconds: task.break_seconds + live_break,
        pause_seconds: task.pause_seconds,
        running: task.status == TaskStatus::Working,
        on_break: task.status == TaskStatus::Break,
        paused: task.status == TaskStatus::Paused,
    }
}
