use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type EntityId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Working,
    Break,
    Paused,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        Self::Pending,
        Self::Working,
        Self::Break,
        Self::Paused,
        Self::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Working => "working",
            Self::Break => "break",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    /// States that own a running `state_started_at`.
    pub fn is_timed(self) -> bool {
        matches!(self, Self::Working | Self::Break)
    }

    /// States a live display must keep refreshing.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Working | Self::Break | Self::Paused)
    }

    pub fn is_open(self) -> bool {
        self != Self::Completed
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" | "planned" => Ok(Self::Pending),
            "working" | "in_progress" => Ok(Self::Working),
            "break" => Ok(Self::Break),
            "paused" | "blocked" => Ok(Self::Paused),
            "completed" | "complete" => Ok(Self::Completed),
            _ => Err(format!("unknown task status '{value}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Start,
    Pause,
    TakeBreak,
    Resume,
    Complete,
}

impl TaskAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::TakeBreak => "take_break",
            Self::Resume => "resume",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "pause" => Ok(Self::Pause),
            "break" | "take_break" | "take-break" => Ok(Self::TakeBreak),
            "resume" => Ok(Self::Resume),
            "complete" | "done" => Ok(Self::Complete),
            _ => Err(format!("unknown task action '{value}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Phase,
    Week,
    Day,
    Task,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phase => "phase",
            Self::Week => "week",
            Self::Day => "day",
            Self::Task => "task",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: EntityId,
    pub title: String,
    pub description: Option<String>,
    pub hour_number: Option<i64>,
    pub week_id: EntityId,
    pub day_id: Option<EntityId>,
    pub status: TaskStatus,
    pub work_seconds: i64,
    pub break_seconds: i64,
    pub pause_seconds: i64,
    pub state_started_at: Option<DateTime<Utc>>,
    pub first_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status_updated_at: DateTime<Utc>,
}

impl Task {
    /// A fresh task: PENDING, empty buckets, never started. The id is
    /// assigned by the repository on insert.
    pub fn new_pending(
        title: impl Into<String>,
        week_id: EntityId,
        day_id: Option<EntityId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            title: title.into(),
            description: None,
            hour_number: None,
            week_id,
            day_id,
            status: TaskStatus::Pending,
            work_seconds: 0,
            break_seconds: 0,
            pause_seconds: 0,
            state_started_at: None,
            first_started_at: None,
            completed_at: None,
            status_updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "task.title")?;
        if self.work_seconds < 0 || self.break_seconds < 0 || self.pause_seconds < 0 {
            return Err("task buckets must be >= 0".to_string());
        }
        if self.status.is_timed() && self.state_started_at.is_none() {
            return Err(format!(
                "task.state_started_at is required while {}",
                self.status
            ));
        }
        if !self.status.is_timed() && self.state_started_at.is_some() {
            return Err(format!(
                "task.state_started_at must be empty while {}",
                self.status
            ));
        }
        if self.status == TaskStatus::Completed && self.completed_at.is_none() {
            return Err("task.completed_at is required once completed".to_string());
        }
        Ok(())
    }

    pub fn total_seconds(&self) -> i64 {
        self.work_seconds + self.break_seconds + self.pause_seconds
    }
}

/// Fields recomputed bottom-up from a container's children.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rollup {
    pub status: TaskStatus,
    pub work_seconds: i64,
    pub break_seconds: i64,
    pub pause_seconds: i64,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
}

impl Default for Rollup {
    fn default() -> Self {
        Self {
            status: TaskStatus::Pending,
            work_seconds: 0,
            break_seconds: 0,
            pause_seconds: 0,
            actual_start: None,
            actual_end: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Phase {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub rollup: Rollup,
}

impl Phase {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description,
            start_date: None,
            end_date: None,
            rollup: Rollup::default(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.name, "phase.name")?;
        validate_date_range(self.start_date, self.end_date, "phase")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Week {
    pub id: EntityId,
    pub phase_id: EntityId,
    pub number: i64,
    pub focus: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub rollup: Rollup,
}

impl Week {
    pub fn new(phase_id: EntityId, number: i64, focus: Option<String>) -> Self {
        Self {
            id: 0,
            phase_id,
            number,
            focus,
            start_date: None,
            end_date: None,
            rollup: Rollup::default(),
        }
    }

    /// Whether `date` falls inside the planned span. Unplanned weeks cover nothing.
    pub fn covers(&self, date: NaiveDate) -> bool {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => start <= date && date <= end,
            _ => false,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.number < 1 {
            return Err("week.number must be >= 1".to_string());
        }
        validate_date_range(self.start_date, self.end_date, "week")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Day {
    pub id: EntityId,
    pub week_id: EntityId,
    pub number: i64,
    pub focus: Option<String>,
    pub notes: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub override_status: Option<TaskStatus>,
    #[serde(flatten)]
    pub rollup: Rollup,
}

impl Day {
    pub fn new(week_id: EntityId, number: i64, focus: Option<String>) -> Self {
        Self {
            id: 0,
            week_id,
            number,
            focus,
            notes: None,
            scheduled_date: None,
            override_status: None,
            rollup: Rollup::default(),
        }
    }

    /// The status ancestors aggregate over: a manual override wins over the
    /// value derived from the day's tasks.
    pub fn effective_status(&self) -> TaskStatus {
        self.override_status.unwrap_or(self.rollup.status)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.number < 1 {
            return Err("day.number must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Display view of a task's buckets including time accruing right now.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingSnapshot {
    pub status: TaskStatus,
    pub work_seconds: i64,
    pub break_seconds: i64,
    pub pause_seconds: i64,
    pub running: bool,
    pub on_break: bool,
    pub paused: bool,
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    entity: &str,
) -> Result<(), String> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => Err(format!(
            "{entity}.start_date ({start}) cannot be after {entity}.end_date ({end})"
        )),
        _ => Ok(()),
    }
}
