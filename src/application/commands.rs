use crate::application::bootstrap::bootstrap_workspace;
use crate::application::cascade::CascadeReport;
use crate::application::engine::{
    DayChanges, NewTask, PhaseChanges, PhaseUpdateOutcome, ProgressEngine, TaskChanges, UpdateOutcome,
    WeekChanges,
};
use crate::application::schedule::ScheduleOutcome;
use crate::domain::aggregation::OrphanContainer;
use crate::domain::models::{
    Day, EntityId, Phase, Task, TaskAction, TaskStatus, TimingSnapshot, Week,
};
use crate::domain::time::{self, NowProvider, format_duration, parse_instant, to_display};
use crate::domain::timer::timing_snapshot;
use crate::infrastructure::error::TrackerError;
use crate::infrastructure::repository::TaskFilter;
use crate::infrastructure::sqlite_store::SqliteTrackerStore;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct AppState {
    logs_dir: PathBuf,
    app_name: String,
    timezone: Tz,
    engine: ProgressEngine<SqliteTrackerStore>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, TrackerError> {
        Self::with_now_provider(workspace_root, Arc::new(time::now))
    }

    /// Bootstraps the workspace, then parks tasks a previous session left
    /// running before any command can mutate state.
    pub fn with_now_provider(workspace_root: PathBuf, now_provider: NowProvider) -> Result<Self, TrackerError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config = bootstrap.config;

        let store = Arc::new(SqliteTrackerStore::new(&bootstrap.database_path));
        let engine = ProgressEngine::new(store)
            .with_now_provider(now_provider)
            .with_refresh_policy(config.refresh)
            .with_calendar(config.calendar)
            .with_timezone(config.timezone);

        let state = Self {
            logs_dir: bootstrap.logs_dir,
            app_name: config.app_name,
            timezone: config.timezone,
            engine,
            log_guard: Mutex::new(()),
        };

        let recovered = state
            .engine
            .reconcile_on_startup()
            .map_err(|error| {
                state.log_error("reconcile_on_startup", &error.to_string());
                error
            })?;
        for task in &recovered {
            state.log_info(
                "reconcile_on_startup",
                &format!("recovered task_id={} status={}", task.id, task.status),
            );
        }
        Ok(state)
    }

    pub fn command_error(&self, command: &str, error: &TrackerError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn log_orphans(&self, command: &str, orphans: &[OrphanContainer]) {
        for orphan in orphans {
            self.log_error(command, &format!("orphaned roll-up: {orphan}"));
        }
    }

    fn local_time(&self, instant: DateTime<Utc>) -> String {
        to_display(instant, self.timezone).to_rfc3339()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResponse {
    #[serde(flatten)]
    pub task: Task,
    pub live: TimingSnapshot,
    pub work_display: String,
    pub break_display: String,
    pub first_started_local: Option<String>,
    pub completed_local: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskActionResponse {
    pub task: TaskResponse,
    pub day_status: Option<TaskStatus>,
    pub week_status: Option<TaskStatus>,
    pub phase_status: Option<TaskStatus>,
    pub orphans: Vec<OrphanContainer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayResponse {
    #[serde(flatten)]
    pub day: Day,
    pub effective_status: TaskStatus,
    pub work_display: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayOverrideResponse {
    pub day: DayResponse,
    pub week_status: Option<TaskStatus>,
    pub phase_status: Option<TaskStatus>,
    pub orphans: Vec<OrphanContainer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub removed: usize,
    pub orphans: Vec<OrphanContainer>,
}

/// Container statuses along one roll-up chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStatuses {
    pub day_status: Option<TaskStatus>,
    pub week_status: Option<TaskStatus>,
    pub phase_status: Option<TaskStatus>,
}

impl From<&CascadeReport> for ChainStatuses {
    fn from(cascade: &CascadeReport) -> Self {
        let (day_status, week_status, phase_status) = cascade_statuses(cascade);
        Self {
            day_status,
            week_status,
            phase_status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateResponse<T> {
    pub updated: T,
    pub statuses: ChainStatuses,
    /// The chain the entity moved away from.
    pub previous: Option<ChainStatuses>,
    pub orphans: Vec<OrphanContainer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgendaItem {
    pub phase_name: String,
    pub week_number: i64,
    pub day_number: Option<i64>,
    pub task: TaskResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct TodayResponse {
    pub date: NaiveDate,
    pub tasks: Vec<AgendaItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollResponse {
    pub app_name: String,
    pub generated_at: String,
    pub refresh_interval_ms: u64,
    pub active_tasks: Vec<TaskResponse>,
}

fn task_response(state: &AppState, task: Task, now: DateTime<Utc>) -> TaskResponse {
    let live = timing_snapshot(&task, now);
    TaskResponse {
        work_display: format_duration(live.work_seconds),
        break_display: format_duration(live.break_seconds),
        first_started_local: task.first_started_at.map(|instant| state.local_time(instant)),
        completed_local: task.completed_at.map(|instant| state.local_time(instant)),
        live,
        task,
    }
}

fn day_response(day: Day) -> DayResponse {
    DayResponse {
        effective_status: day.effective_status(),
        work_display: format_duration(day.rollup.work_seconds),
        day,
    }
}

fn cascade_statuses(cascade: &CascadeReport) -> (Option<TaskStatus>, Option<TaskStatus>, Option<TaskStatus>) {
    (
        cascade.day.as_ref().map(Day::effective_status),
        cascade.week.as_ref().map(|week| week.rollup.status),
        cascade.phase.as_ref().map(|phase| phase.rollup.status),
    )
}

fn required_text(value: String, field_name: &str) -> Result<String, TrackerError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TrackerError::Validation(format!("{field_name} must not be empty")));
    }
    Ok(value.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn parse_status(value: &str) -> Result<TaskStatus, TrackerError> {
    value.parse::<TaskStatus>().map_err(TrackerError::Validation)
}

fn parse_action(value: &str) -> Result<TaskAction, TrackerError> {
    value.parse::<TaskAction>().map_err(TrackerError::Validation)
}

fn parse_instant_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, TrackerError> {
    parse_instant(value).map_err(|error| TrackerError::Validation(format!("{field_name}: {error}")))
}

fn parse_date_input(value: &str, field_name: &str) -> Result<NaiveDate, TrackerError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|error| TrackerError::Validation(format!("{field_name}: expected YYYY-MM-DD, {error}")))
}

/// A blank value clears the field.
fn text_change(value: Option<String>) -> Option<Option<String>> {
    value.map(|raw| optional_text(Some(raw)))
}

/// A blank value or `none` clears the date.
fn date_change(value: Option<String>, field_name: &str) -> Result<Option<Option<NaiveDate>>, TrackerError> {
    value
        .map(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
                Ok(None)
            } else {
                parse_date_input(raw, field_name).map(Some)
            }
        })
        .transpose()
}

fn update_response<T, U>(
    state: &AppState,
    command: &str,
    outcome: UpdateOutcome<T>,
    present: impl FnOnce(T) -> U,
) -> UpdateResponse<U> {
    let mut orphans = outcome
        .previous
        .as_ref()
        .map(|report| report.orphans.clone())
        .unwrap_or_default();
    orphans.extend(outcome.cascade.orphans.iter().cloned());
    state.log_orphans(command, &orphans);
    UpdateResponse {
        statuses: ChainStatuses::from(&outcome.cascade),
        previous: outcome.previous.as_ref().map(ChainStatuses::from),
        updated: present(outcome.updated),
        orphans,
    }
}

pub fn create_phase_impl(
    state: &AppState,
    name: String,
    description: Option<String>,
) -> Result<Phase, TrackerError> {
    let name = required_text(name, "name")?;
    let phase = state.engine.create_phase(&name, optional_text(description))?;
    state.log_info("create_phase", &format!("created phase_id={}", phase.id));
    Ok(phase)
}

pub fn list_phases_impl(state: &AppState) -> Result<Vec<Phase>, TrackerError> {
    state.engine.list_phases()
}

pub fn delete_phase_impl(state: &AppState, phase_id: EntityId) -> Result<DeleteResponse, TrackerError> {
    let outcome = state.engine.delete_phase(phase_id)?;
    state.log_info(
        "delete_phase",
        &format!("deleted phase_id={phase_id} removed={}", outcome.removed),
    );
    Ok(DeleteResponse {
        removed: outcome.removed,
        orphans: outcome.cascade.orphans,
    })
}

pub fn update_phase_impl(
    state: &AppState,
    phase_id: EntityId,
    name: Option<String>,
    description: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
) -> Result<PhaseUpdateOutcome, TrackerError> {
    let changes = PhaseChanges {
        name: name.map(|name| required_text(name, "name")).transpose()?,
        description: text_change(description),
        start_date: date_change(start_date, "start_date")?,
        end_date: date_change(end_date, "end_date")?,
    };
    let outcome = state.engine.update_phase(phase_id, changes)?;
    let replanned = outcome
        .schedule
        .as_ref()
        .map(|schedule| schedule.weeks_planned)
        .unwrap_or_default();
    state.log_info(
        "update_phase",
        &format!("updated phase_id={phase_id} replanned_weeks={replanned}"),
    );
    Ok(outcome)
}

pub fn create_week_impl(
    state: &AppState,
    phase_id: EntityId,
    number: i64,
    focus: Option<String>,
) -> Result<Week, TrackerError> {
    let week = state.engine.create_week(phase_id, number, optional_text(focus))?;
    state.log_info(
        "create_week",
        &format!("created week_id={} phase_id={phase_id}", week.id),
    );
    Ok(week)
}

pub fn list_weeks_impl(state: &AppState, phase_id: Option<EntityId>) -> Result<Vec<Week>, TrackerError> {
    state.engine.list_weeks(phase_id)
}

pub fn update_week_impl(
    state: &AppState,
    week_id: EntityId,
    number: Option<i64>,
    focus: Option<String>,
    phase_id: Option<EntityId>,
    start_date: Option<String>,
    end_date: Option<String>,
) -> Result<UpdateResponse<Week>, TrackerError> {
    let changes = WeekChanges {
        number,
        focus: text_change(focus),
        phase_id,
        start_date: date_change(start_date, "start_date")?,
        end_date: date_change(end_date, "end_date")?,
    };
    let outcome = state.engine.update_week(week_id, changes)?;
    state.log_info(
        "update_week",
        &format!("updated week_id={week_id} phase_id={}", outcome.updated.phase_id),
    );
    Ok(update_response(state, "update_week", outcome, |week| week))
}

pub fn delete_week_impl(state: &AppState, week_id: EntityId) -> Result<DeleteResponse, TrackerError> {
    let outcome = state.engine.delete_week(week_id)?;
    state.log_orphans("delete_week", &outcome.cascade.orphans);
    state.log_info(
        "delete_week",
        &format!("deleted week_id={week_id} removed={}", outcome.removed),
    );
    Ok(DeleteResponse {
        removed: outcome.removed,
        orphans: outcome.cascade.orphans,
    })
}

pub fn create_day_impl(
    state: &AppState,
    week_id: EntityId,
    number: i64,
    focus: Option<String>,
) -> Result<DayResponse, TrackerError> {
    let day = state.engine.create_day(week_id, number, optional_text(focus))?;
    state.log_info(
        "create_day",
        &format!("created day_id={} week_id={week_id}", day.id),
    );
    Ok(day_response(day))
}

pub fn list_days_impl(state: &AppState, week_id: Option<EntityId>) -> Result<Vec<DayResponse>, TrackerError> {
    Ok(state
        .engine
        .list_days(week_id)?
        .into_iter()
        .map(day_response)
        .collect())
}

pub fn update_day_impl(
    state: &AppState,
    day_id: EntityId,
    number: Option<i64>,
    focus: Option<String>,
    notes: Option<String>,
    scheduled_date: Option<String>,
    week_id: Option<EntityId>,
) -> Result<UpdateResponse<DayResponse>, TrackerError> {
    let changes = DayChanges {
        number,
        focus: text_change(focus),
        notes: text_change(notes),
        scheduled_date: date_change(scheduled_date, "scheduled_date")?,
        week_id,
    };
    let outcome = state.engine.update_day(day_id, changes)?;
    state.log_info(
        "update_day",
        &format!("updated day_id={day_id} week_id={}", outcome.updated.week_id),
    );
    Ok(update_response(state, "update_day", outcome, day_response))
}

pub fn delete_day_impl(state: &AppState, day_id: EntityId) -> Result<DeleteResponse, TrackerError> {
    let outcome = state.engine.delete_day(day_id)?;
    state.log_orphans("delete_day", &outcome.cascade.orphans);
    state.log_info(
        "delete_day",
        &format!("deleted day_id={day_id} removed={}", outcome.removed),
    );
    Ok(DeleteResponse {
        removed: outcome.removed,
        orphans: outcome.cascade.orphans,
    })
}

pub fn override_day_status_impl(
    state: &AppState,
    day_id: EntityId,
    status: String,
) -> Result<DayOverrideResponse, TrackerError> {
    let status = parse_status(&status)?;
    let outcome = state.engine.override_day_status(day_id, status)?;
    state.log_orphans("override_day_status", &outcome.cascade.orphans);
    state.log_info(
        "override_day_status",
        &format!("pinned day_id={day_id} status={status}"),
    );
    let (_, week_status, phase_status) = cascade_statuses(&outcome.cascade);
    Ok(DayOverrideResponse {
        day: day_response(outcome.day),
        week_status,
        phase_status,
        orphans: outcome.cascade.orphans,
    })
}

pub fn clear_day_override_impl(state: &AppState, day_id: EntityId) -> Result<DayOverrideResponse, TrackerError> {
    let outcome = state.engine.clear_day_override(day_id)?;
    state.log_orphans("clear_day_override", &outcome.cascade.orphans);
    state.log_info("clear_day_override", &format!("cleared day_id={day_id}"));
    let (_, week_status, phase_status) = cascade_statuses(&outcome.cascade);
    Ok(DayOverrideResponse {
        day: day_response(outcome.day),
        week_status,
        phase_status,
        orphans: outcome.cascade.orphans,
    })
}

pub fn create_task_impl(
    state: &AppState,
    title: String,
    description: Option<String>,
    hour_number: Option<i64>,
    week_id: EntityId,
    day_id: Option<EntityId>,
) -> Result<TaskResponse, TrackerError> {
    let title = required_text(title, "title")?;
    let outcome = state.engine.create_task(NewTask {
        title,
        description: optional_text(description),
        hour_number,
        week_id,
        day_id,
    })?;
    state.log_orphans("create_task", &outcome.cascade.orphans);
    state.log_info(
        "create_task",
        &format!("created task_id={} week_id={week_id}", outcome.task.id),
    );
    Ok(task_response(state, outcome.task, state.engine.now()))
}

pub fn list_tasks_impl(
    state: &AppState,
    week_id: Option<EntityId>,
    day_id: Option<EntityId>,
    status: Option<String>,
    only_open: bool,
) -> Result<Vec<TaskResponse>, TrackerError> {
    let mut filter = if only_open {
        TaskFilter::open()
    } else {
        TaskFilter::default()
    };
    filter.week_id = week_id;
    filter.day_id = day_id;
    if let Some(status) = status {
        let status = parse_status(&status)?;
        if only_open && status == TaskStatus::Completed {
            return Ok(Vec::new());
        }
        filter.statuses = vec![status];
    }

    let now = state.engine.now();
    Ok(state
        .engine
        .list_tasks(&filter)?
        .into_iter()
        .map(|task| task_response(state, task, now))
        .collect())
}

pub fn get_task_impl(state: &AppState, task_id: EntityId) -> Result<TaskResponse, TrackerError> {
    let task = state.engine.task(task_id)?;
    Ok(task_response(state, task, state.engine.now()))
}

/// Raw task edits as they arrive from the CLI.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub hour_number: Option<i64>,
    pub week_id: Option<EntityId>,
    pub day_id: Option<EntityId>,
    /// Moves the task up to week level.
    pub detach_day: bool,
}

pub fn update_task_impl(
    state: &AppState,
    task_id: EntityId,
    edit: TaskEdit,
) -> Result<UpdateResponse<TaskResponse>, TrackerError> {
    if edit.detach_day && edit.day_id.is_some() {
        return Err(TrackerError::Validation(
            "a day and detaching from the day are mutually exclusive".to_string(),
        ));
    }
    let changes = TaskChanges {
        title: edit.title.map(|title| required_text(title, "title")).transpose()?,
        description: text_change(edit.description),
        hour_number: edit.hour_number.map(Some),
        week_id: edit.week_id,
        day_id: if edit.detach_day {
            Some(None)
        } else {
            edit.day_id.map(Some)
        },
    };
    let outcome = state.engine.update_task(task_id, changes)?;
    state.log_info(
        "update_task",
        &format!(
            "updated task_id={task_id} week_id={} day_id={:?}",
            outcome.updated.week_id, outcome.updated.day_id
        ),
    );
    let now = state.engine.now();
    Ok(update_response(state, "update_task", outcome, |task| {
        task_response(state, task, now)
    }))
}

pub fn delete_task_impl(state: &AppState, task_id: EntityId) -> Result<DeleteResponse, TrackerError> {
    let outcome = state.engine.delete_task(task_id)?;
    state.log_orphans("delete_task", &outcome.cascade.orphans);
    state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    Ok(DeleteResponse {
        removed: outcome.removed,
        orphans: outcome.cascade.orphans,
    })
}

/// `at` pins the transition instant; it defaults to the engine clock.
pub fn task_action_impl(
    state: &AppState,
    task_id: EntityId,
    action: String,
    at: Option<String>,
) -> Result<TaskActionResponse, TrackerError> {
    let action = parse_action(&action)?;
    let at = at
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| parse_instant_input(value, "at"))
        .transpose()?;

    let outcome = state.engine.apply_task_action(task_id, action, at)?;
    state.log_orphans("task_action", &outcome.cascade.orphans);
    state.log_info(
        "task_action",
        &format!("task_id={task_id} action={action} status={}", outcome.task.status),
    );

    let (day_status, week_status, phase_status) = cascade_statuses(&outcome.cascade);
    let now = at.unwrap_or_else(|| state.engine.now());
    Ok(TaskActionResponse {
        task: task_response(state, outcome.task, now),
        day_status,
        week_status,
        phase_status,
        orphans: outcome.cascade.orphans,
    })
}

/// Replaces the planned dates of every week and day, starting on `start`
/// or today.
pub fn plan_schedule_impl(state: &AppState, start: Option<String>) -> Result<ScheduleOutcome, TrackerError> {
    let start = start
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| parse_date_input(value, "start"))
        .transpose()?;
    let outcome = state.engine.plan_schedule(start)?;
    state.log_info(
        "plan_schedule",
        &format!(
            "planned from {} weeks={} days={}",
            outcome.start, outcome.weeks_planned, outcome.days_planned
        ),
    );
    Ok(outcome)
}

/// Tasks planned for `date`, today in the display timezone by default.
pub fn today_impl(state: &AppState, date: Option<String>) -> Result<TodayResponse, TrackerError> {
    let date = match date.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_date_input(value, "date")?,
        None => state.engine.current_date(),
    };
    let now = state.engine.now();
    let tasks = state
        .engine
        .agenda_for(date)?
        .into_iter()
        .map(|entry| AgendaItem {
            phase_name: entry.phase_name,
            week_number: entry.week_number,
            day_number: entry.day_number,
            task: task_response(state, entry.task, now),
        })
        .collect();
    Ok(TodayResponse { date, tasks })
}

pub fn poll_impl(state: &AppState) -> Result<PollResponse, TrackerError> {
    let now = state.engine.now();
    let interval = state.engine.refresh_interval()?;
    let active = state.engine.list_tasks(&TaskFilter::active())?;
    Ok(PollResponse {
        app_name: state.app_name.clone(),
        generated_at: state.local_time(now),
        refresh_interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        active_tasks: active
            .into_iter()
            .map(|task| task_response(state, task, now))
            .collect(),
    })
}
