use crate::application::cascade::{
    CascadeReport, cascade_from_day, cascade_from_task, cascade_from_week, cascade_into_phase,
    cascade_into_week, refresh_phase,
};
use crate::application::schedule::{ScheduleOutcome, is_planned, refresh_phase_spans, replan};
use crate::domain::calendar::WorkCalendar;
use crate::domain::models::{
    Day, EntityId, EntityKind, Phase, Task, TaskAction, TaskStatus, TimingSnapshot, Week,
};
use crate::domain::time::{self, NowProvider};
use crate::domain::timer::{apply_action, recover_zombie, timing_snapshot};
use crate::infrastructure::config::RefreshPolicy;
use crate::infrastructure::error::TrackerError;
use crate::infrastructure::repository::{TaskFilter, TrackerRepository, TrackerStore};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskActionOutcome {
    pub task: Task,
    pub cascade: CascadeReport,
    /// Set when this action laid out the roadmap's planned dates.
    pub schedule: Option<ScheduleOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayOutcome {
    pub day: Day,
    pub effective_status: TaskStatus,
    pub cascade: CascadeReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// Rows removed, descendants included.
    pub removed: usize,
    pub cascade: CascadeReport,
}

/// An edited entity with the roll-up it triggered. `previous` covers the
/// parent the entity moved away from, if it moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome<T> {
    pub updated: T,
    pub cascade: CascadeReport,
    pub previous: Option<CascadeReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseUpdateOutcome {
    pub phase: Phase,
    pub schedule: Option<ScheduleOutcome>,
}

/// One line of the agenda for a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgendaEntry {
    pub phase_name: String,
    pub week_number: i64,
    pub day_number: Option<i64>,
    pub task: Task,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub hour_number: Option<i64>,
    pub week_id: EntityId,
    pub day_id: Option<EntityId>,
}

/// Field edits; `None` leaves a field alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekChanges {
    pub number: Option<i64>,
    pub focus: Option<Option<String>>,
    pub phase_id: Option<EntityId>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayChanges {
    pub number: Option<i64>,
    pub focus: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub scheduled_date: Option<Option<NaiveDate>>,
    pub week_id: Option<EntityId>,
}

/// Status is not editable here; it only moves through task actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub hour_number: Option<Option<i64>>,
    pub week_id: Option<EntityId>,
    pub day_id: Option<Option<EntityId>>,
}

/// Timer, roll-up and override operations over one store. Each mutation runs
/// as a single store transaction, cascade included.
pub struct ProgressEngine<S: TrackerStore> {
    store: Arc<S>,
    now_provider: NowProvider,
    refresh_policy: RefreshPolicy,
    calendar: WorkCalendar,
    timezone: Tz,
    ready: AtomicBool,
}

impl<S: TrackerStore> ProgressEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            now_provider: Arc::new(time::now),
            refresh_policy: RefreshPolicy::default(),
            calendar: WorkCalendar::default(),
            timezone: chrono_tz::UTC,
            ready: AtomicBool::new(false),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn with_refresh_policy(mut self, refresh_policy: RefreshPolicy) -> Self {
        self.refresh_policy = refresh_policy;
        self
    }

    pub fn with_calendar(mut self, calendar: WorkCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    /// Zone whose calendar date counts as "today".
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn current_date(&self) -> NaiveDate {
        self.local_date(self.now())
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        time::to_display(instant, self.timezone).date_naive()
    }

    fn ensure_ready(&self) -> Result<(), TrackerError> {
        if !self.is_ready() {
            return Err(TrackerError::StartupPending);
        }
        Ok(())
    }

    /// Parks every task a previous session left on the clock and opens the
    /// engine for mutations.
    pub fn reconcile_on_startup(&self) -> Result<Vec<Task>, TrackerError> {
        let now = self.now();
        let recovered = self.store.write(|repo| {
            let running = repo.tasks(&TaskFilter::with_statuses(&[
                TaskStatus::Working,
                TaskStatus::Break,
            ]))?;
            let mut recovered = Vec::with_capacity(running.len());
            for task in running {
                let Some(next) = recover_zombie(&task, now) else {
                    continue;
                };
                repo.save_task(&next)?;
                cascade_from_task(repo, &next)?;
                tracing::info!(
                    task_id = next.id,
                    from = %task.status,
                    to = %next.status,
                    "recovered task left running by previous session"
                );
                recovered.push(next);
            }
            Ok(recovered)
        })?;
        self.ready.store(true, Ordering::Release);
        Ok(recovered)
    }

    /// The first start of the first task also lays out planned dates for
    /// the whole roadmap, in the same transaction.
    pub fn apply_task_action(
        &self,
        task_id: EntityId,
        action: TaskAction,
        at: Option<DateTime<Utc>>,
    ) -> Result<TaskActionOutcome, TrackerError> {
        self.ensure_ready()?;
        let now = at.unwrap_or_else(|| self.now());
        let today = self.local_date(now);
        self.store.write(|repo| {
            let task = load_task(repo, task_id)?;
            let next = apply_action(&task, action, now)?;
            repo.save_task(&next)?;
            let first_start = task.first_started_at.is_none() && next.first_started_at.is_some();
            let schedule = if first_start && !is_planned(repo)? {
                Some(replan(repo, &self.calendar, today, None)?)
            } else {
                None
            };
            let cascade = cascade_from_task(repo, &next)?;
            Ok(TaskActionOutcome {
                task: next,
                cascade,
                schedule,
            })
        })
    }

    pub fn override_day_status(&self, day_id: EntityId, status: TaskStatus) -> Result<DayOutcome, TrackerError> {
        self.set_day_override(day_id, Some(status))
    }

    pub fn clear_day_override(&self, day_id: EntityId) -> Result<DayOutcome, TrackerError> {
        self.set_day_override(day_id, None)
    }

    fn set_day_override(&self, day_id: EntityId, status: Option<TaskStatus>) -> Result<DayOutcome, TrackerError> {
        self.ensure_ready()?;
        self.store.write(|repo| {
            let mut day = load_day(repo, day_id)?;
            day.override_status = status;
            repo.save_day(&day)?;
            let cascade = cascade_from_day(repo, day_id)?;
            let day = cascade.day.clone().unwrap_or(day);
            Ok(DayOutcome {
                effective_status: day.effective_status(),
                day,
                cascade,
            })
        })
    }

    /// Unavailable until startup reconciliation has run.
    pub fn get_timing_snapshot(&self, task_id: EntityId) -> Result<TimingSnapshot, TrackerError> {
        self.ensure_ready()?;
        let now = self.now();
        self.store
            .read(|repo| load_task(repo, task_id))
            .map(|task| timing_snapshot(&task, now))
    }

    pub fn create_phase(&self, name: &str, description: Option<String>) -> Result<Phase, TrackerError> {
        self.ensure_ready()?;
        let mut phase = Phase::new(name.trim(), description);
        phase.validate().map_err(TrackerError::Validation)?;
        self.store.write(|repo| {
            phase.id = repo.insert_phase(&phase)?;
            Ok(phase)
        })
    }

    pub fn create_week(&self, phase_id: EntityId, number: i64, focus: Option<String>) -> Result<Week, TrackerError> {
        self.ensure_ready()?;
        let mut week = Week::new(phase_id, number, focus);
        week.validate().map_err(TrackerError::Validation)?;
        self.store.write(|repo| {
            load_phase(repo, phase_id)?;
            week.id = repo.insert_week(&week)?;
            refresh_phase(repo, phase_id)?;
            Ok(week)
        })
    }

    pub fn create_day(&self, week_id: EntityId, number: i64, focus: Option<String>) -> Result<Day, TrackerError> {
        self.ensure_ready()?;
        let mut day = Day::new(week_id, number, focus);
        day.validate().map_err(TrackerError::Validation)?;
        self.store.write(|repo| {
            load_week(repo, week_id)?;
            day.id = repo.insert_day(&day)?;
            let cascade = cascade_from_day(repo, day.id)?;
            Ok(cascade.day.unwrap_or(day))
        })
    }

    /// New tasks start PENDING with empty buckets.
    pub fn create_task(&self, request: NewTask) -> Result<TaskActionOutcome, TrackerError> {
        self.ensure_ready()?;
        let mut task = Task::new_pending(request.title.trim(), request.week_id, request.day_id, self.now());
        task.description = request.description;
        task.hour_number = request.hour_number;
        task.validate().map_err(TrackerError::Validation)?;

        self.store.write(|repo| {
            check_task_placement(repo, &task)?;
            task.id = repo.insert_task(&task)?;
            let cascade = cascade_from_task(repo, &task)?;
            Ok(TaskActionOutcome {
                task,
                cascade,
                schedule: None,
            })
        })
    }

    /// A new start date moves this phase's weeks and everything after them.
    pub fn update_phase(&self, phase_id: EntityId, changes: PhaseChanges) -> Result<PhaseUpdateOutcome, TrackerError> {
        self.ensure_ready()?;
        self.store.write(|repo| {
            let mut phase = load_phase(repo, phase_id)?;
            let previous_start = phase.start_date;
            if let Some(name) = changes.name {
                phase.name = name.trim().to_string();
            }
            if let Some(description) = changes.description {
                phase.description = description;
            }
            if let Some(start_date) = changes.start_date {
                phase.start_date = start_date;
            }
            if let Some(end_date) = changes.end_date {
                phase.end_date = end_date;
            }
            repo.save_phase(&phase)?;

            let schedule = match phase.start_date {
                Some(start) if phase.start_date != previous_start => {
                    Some(replan(repo, &self.calendar, start, Some(phase_id))?)
                }
                _ => None,
            };
            let phase = load_phase(repo, phase_id)?;
            phase.validate().map_err(TrackerError::Validation)?;
            Ok(PhaseUpdateOutcome { phase, schedule })
        })
    }

    /// Moving a week to another phase re-aggregates both phases.
    pub fn update_week(&self, week_id: EntityId, changes: WeekChanges) -> Result<UpdateOutcome<Week>, TrackerError> {
        self.ensure_ready()?;
        self.store.write(|repo| {
            let mut week = load_week(repo, week_id)?;
            let previous_phase = week.phase_id;
            let dates_changed = changes.start_date.is_some() || changes.end_date.is_some();
            if let Some(number) = changes.number {
                week.number = number;
            }
            if let Some(focus) = changes.focus {
                week.focus = focus;
            }
            if let Some(start_date) = changes.start_date {
                week.start_date = start_date;
            }
            if let Some(end_date) = changes.end_date {
                week.end_date = end_date;
            }
            if let Some(phase_id) = changes.phase_id {
                load_phase(repo, phase_id)?;
                week.phase_id = phase_id;
            }
            week.validate().map_err(TrackerError::Validation)?;
            repo.save_week(&week)?;

            let moved = week.phase_id != previous_phase;
            if moved || dates_changed {
                refresh_phase_spans(repo)?;
            }
            let cascade = cascade_from_week(repo, week_id)?;
            let previous = if moved {
                Some(cascade_into_phase(repo, week_id, previous_phase)?)
            } else {
                None
            };
            Ok(UpdateOutcome {
                updated: cascade.week.clone().unwrap_or(week),
                cascade,
                previous,
            })
        })
    }

    /// A day moved to another week takes its tasks along; both weeks are
    /// re-aggregated.
    pub fn update_day(&self, day_id: EntityId, changes: DayChanges) -> Result<UpdateOutcome<Day>, TrackerError> {
        self.ensure_ready()?;
        self.store.write(|repo| {
            let mut day = load_day(repo, day_id)?;
            let previous_week = day.week_id;
            if let Some(number) = changes.number {
                day.number = number;
            }
            if let Some(focus) = changes.focus {
                day.focus = focus;
            }
            if let Some(notes) = changes.notes {
                day.notes = notes;
            }
            if let Some(scheduled_date) = changes.scheduled_date {
                day.scheduled_date = scheduled_date;
            }
            if let Some(week_id) = changes.week_id {
                load_week(repo, week_id)?;
                day.week_id = week_id;
            }
            day.validate().map_err(TrackerError::Validation)?;
            repo.save_day(&day)?;

            let moved = day.week_id != previous_week;
            if moved {
                for mut task in repo.tasks(&TaskFilter::in_day(day_id))? {
                    task.week_id = day.week_id;
                    repo.save_task(&task)?;
                }
            }
            let cascade = cascade_from_day(repo, day_id)?;
            let previous = if moved {
                Some(cascade_into_week(repo, EntityKind::Day, day_id, previous_week)?)
            } else {
                None
            };
            Ok(UpdateOutcome {
                updated: cascade.day.clone().unwrap_or(day),
                cascade,
                previous,
            })
        })
    }

    /// Giving only a day moves the task into that day's week. Moving parents
    /// re-aggregates the old chain before the new one.
    pub fn update_task(&self, task_id: EntityId, changes: TaskChanges) -> Result<UpdateOutcome<Task>, TrackerError> {
        self.ensure_ready()?;
        self.store.write(|repo| {
            let original = load_task(repo, task_id)?;
            let mut task = original.clone();
            if let Some(title) = changes.title {
                task.title = title.trim().to_string();
            }
            if let Some(description) = changes.description {
                task.description = description;
            }
            if let Some(hour_number) = changes.hour_number {
                task.hour_number = hour_number;
            }
            if let Some(day_id) = changes.day_id {
                task.day_id = day_id;
            }
            match (changes.week_id, task.day_id) {
                (Some(week_id), _) => task.week_id = week_id,
                (None, Some(day_id)) if changes.day_id.is_some() => {
                    task.week_id = load_day(repo, day_id)?.week_id;
                }
                _ => {}
            }
            task.validate().map_err(TrackerError::Validation)?;
            check_task_placement(repo, &task)?;
            repo.save_task(&task)?;

            let moved = (task.week_id, task.day_id) != (original.week_id, original.day_id);
            let previous = if moved {
                Some(cascade_from_task(repo, &original)?)
            } else {
                None
            };
            let cascade = cascade_from_task(repo, &task)?;
            Ok(UpdateOutcome {
                updated: task,
                cascade,
                previous,
            })
        })
    }

    /// Lays planned dates out for every week from `start`, replacing any
    /// earlier plan. Defaults to today.
    pub fn plan_schedule(&self, start: Option<NaiveDate>) -> Result<ScheduleOutcome, TrackerError> {
        self.ensure_ready()?;
        let start = start.unwrap_or_else(|| self.current_date());
        self.store
            .write(|repo| replan(repo, &self.calendar, start, None))
    }

    /// Tasks planned for `date`: tasks of every week whose planned span
    /// covers it, minus those sitting in a day scheduled for another date.
    pub fn agenda_for(&self, date: NaiveDate) -> Result<Vec<AgendaEntry>, TrackerError> {
        self.store.read(|repo| {
            let mut entries = Vec::new();
            for week in repo.weeks(None)? {
                if !week.covers(date) {
                    continue;
                }
                let Some(phase) = repo.phase(week.phase_id)? else {
                    continue;
                };
                for task in repo.tasks(&TaskFilter::in_week(week.id))? {
                    let day = match task.day_id {
                        Some(day_id) => repo.day(day_id)?,
                        None => None,
                    };
                    if day.as_ref().is_some_and(|day| day.scheduled_date != Some(date)) {
                        continue;
                    }
                    entries.push(AgendaEntry {
                        phase_name: phase.name.clone(),
                        week_number: week.number,
                        day_number: day.map(|day| day.number),
                        task,
                    });
                }
            }
            Ok(entries)
        })
    }

    pub fn list_phases(&self) -> Result<Vec<Phase>, TrackerError> {
        self.store.read(|repo| repo.phases())
    }

    pub fn list_weeks(&self, phase_id: Option<EntityId>) -> Result<Vec<Week>, TrackerError> {
        self.store.read(|repo| repo.weeks(phase_id))
    }

    pub fn list_days(&self, week_id: Option<EntityId>) -> Result<Vec<Day>, TrackerError> {
        self.store.read(|repo| repo.days(week_id))
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, TrackerError> {
        self.store.read(|repo| repo.tasks(filter))
    }

    pub fn phase(&self, phase_id: EntityId) -> Result<Phase, TrackerError> {
        self.store.read(|repo| load_phase(repo, phase_id))
    }

    pub fn week(&self, week_id: EntityId) -> Result<Week, TrackerError> {
        self.store.read(|repo| load_week(repo, week_id))
    }

    pub fn day(&self, day_id: EntityId) -> Result<Day, TrackerError> {
        self.store.read(|repo| load_day(repo, day_id))
    }

    pub fn task(&self, task_id: EntityId) -> Result<Task, TrackerError> {
        self.store.read(|repo| load_task(repo, task_id))
    }

    pub fn delete_task(&self, task_id: EntityId) -> Result<DeleteOutcome, TrackerError> {
        self.ensure_ready()?;
        self.store.write(|repo| {
            let task = load_task(repo, task_id)?;
            repo.delete_task(task_id)?;
            let cascade = cascade_from_task(repo, &task)?;
            Ok(DeleteOutcome { removed: 1, cascade })
        })
    }

    pub fn delete_day(&self, day_id: EntityId) -> Result<DeleteOutcome, TrackerError> {
        self.ensure_ready()?;
        self.store.write(|repo| {
            let day = load_day(repo, day_id)?;
            let removed = remove_day(repo, day_id)?;
            let cascade = cascade_into_week(repo, EntityKind::Day, day_id, day.week_id)?;
            Ok(DeleteOutcome { removed, cascade })
        })
    }

    pub fn delete_week(&self, week_id: EntityId) -> Result<DeleteOutcome, TrackerError> {
        self.ensure_ready()?;
        self.store.write(|repo| {
            let week = load_week(repo, week_id)?;
            let removed = remove_week(repo, week_id)?;
            let cascade = cascade_into_phase(repo, week_id, week.phase_id)?;
            Ok(DeleteOutcome { removed, cascade })
        })
    }

    pub fn delete_phase(&self, phase_id: EntityId) -> Result<DeleteOutcome, TrackerError> {
        self.ensure_ready()?;
        self.store.write(|repo| {
            load_phase(repo, phase_id)?;
            let mut removed = 0;
            for week in repo.weeks(Some(phase_id))? {
                removed += remove_week(repo, week.id)?;
            }
            if repo.delete_phase(phase_id)? {
                removed += 1;
            }
            Ok(DeleteOutcome {
                removed,
                cascade: CascadeReport::default(),
            })
        })
    }

    /// Live interval while any task is on the clock or paused, idle otherwise.
    pub fn refresh_interval(&self) -> Result<Duration, TrackerError> {
        self.ensure_ready()?;
        let active = self.store.read(|repo| repo.tasks(&TaskFilter::active()))?;
        Ok(self.refresh_policy.interval_for(!active.is_empty()))
    }
}

fn check_task_placement(repo: &dyn TrackerRepository, task: &Task) -> Result<(), TrackerError> {
    load_week(repo, task.week_id)?;
    if let Some(day_id) = task.day_id {
        let day = load_day(repo, day_id)?;
        if day.week_id != task.week_id {
            return Err(TrackerError::Validation(format!(
                "day {day_id} belongs to week {}, not week {}",
                day.week_id, task.week_id
            )));
        }
    }
    Ok(())
}

fn remove_day(repo: &mut dyn TrackerRepository, day_id: EntityId) -> Result<usize, TrackerError> {
    let mut removed = 0;
    for task in repo.tasks(&TaskFilter::in_day(day_id))? {
        if repo.delete_task(task.id)? {
            removed += 1;
        }
    }
    if repo.delete_day(day_id)? {
        removed += 1;
    }
    Ok(removed)
}

fn remove_week(repo: &mut dyn TrackerRepository, week_id: EntityId) -> Result<usize, TrackerError> {
    let mut removed = 0;
    for day in repo.days(Some(week_id))? {
        removed += remove_day(repo, day.id)?;
    }
    for task in repo.tasks(&TaskFilter::in_week(week_id))? {
        if repo.delete_task(task.id)? {
            removed += 1;
        }
    }
    if repo.delete_week(week_id)? {
        removed += 1;
    }
    Ok(removed)
}

fn load_phase(repo: &dyn TrackerRepository, phase_id: EntityId) -> Result<Phase, TrackerError> {
    repo.phase(phase_id)?
        .ok_or(TrackerError::not_found(EntityKind::Phase, phase_id))
}

fn load_week(repo: &dyn TrackerRepository, week_id: EntityId) -> Result<Week, TrackerError> {
    repo.week(week_id)?
        .ok_or(TrackerError::not_found(EntityKind::Week, week_id))
}

fn load_day(repo: &dyn TrackerRepository, day_id: EntityId) -> Result<Day, TrackerError> {
    repo.day(day_id)?
        .ok_or(TrackerError::not_found(EntityKind::Day, day_id))
}

fn load_task(repo: &dyn TrackerRepository, task_id: EntityId) -> Result<Task, TrackerError> {
    repo.task(task_id)?
        .ok_or(TrackerError::not_found(EntityKind::Task, task_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repository::InMemoryTrackerStore;
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("2026-02-16T{value}Z"))
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn date(value: &str) -> NaiveDate {
        value.parse().expect("valid date")
    }

    fn fixed_clock(value: &str) -> NowProvider {
        let instant = at(value);
        Arc::new(move || instant)
    }

    fn ready_engine() -> ProgressEngine<InMemoryTrackerStore> {
        let engine = ProgressEngine::new(Arc::new(InMemoryTrackerStore::default()))
            .with_now_provider(fixed_clock("09:00:00"));
        engine.reconcile_on_startup().expect("reconcile");
        engine
    }

    struct Plan {
        phase: Phase,
        week: Week,
        day: Day,
    }

    fn plan(engine: &ProgressEngine<InMemoryTrackerStore>) -> Plan {
        let phase = engine.create_phase("Foundations", None).expect("create phase");
        let week = engine.create_week(phase.id, 1, None).expect("create week");
        let day = engine.create_day(week.id, 1, None).expect("create day");
        Plan { phase, week, day }
    }

    fn add_task(engine: &ProgressEngine<InMemoryTrackerStore>, plan: &Plan, title: &str) -> Task {
        engine
            .create_task(NewTask {
                title: title.to_string(),
                description: None,
                hour_number: None,
                week_id: plan.week.id,
                day_id: Some(plan.day.id),
            })
            .expect("create task")
            .task
    }

    fn act(
        engine: &ProgressEngine<InMemoryTrackerStore>,
        task: &Task,
        action: TaskAction,
        when: &str,
    ) -> TaskActionOutcome {
        engine
            .apply_task_action(task.id, action, Some(at(when)))
            .expect("apply action")
    }

    #[test]
    fn mutations_wait_for_startup_reconciliation() {
        let engine = ProgressEngine::new(Arc::new(InMemoryTrackerStore::default()));
        assert!(matches!(
            engine.create_phase("Foundations", None),
            Err(TrackerError::StartupPending)
        ));
        assert!(matches!(
            engine.apply_task_action(1, TaskAction::Start, None),
            Err(TrackerError::StartupPending)
        ));
        assert!(engine.list_phases().expect("reads are allowed").is_empty());

        engine.reconcile_on_startup().expect("reconcile");
        assert!(engine.is_ready());
        assert!(engine.create_phase("Foundations", None).is_ok());
    }

    #[test]
    fn live_timing_reads_wait_for_startup_reconciliation() {
        let store = Arc::new(InMemoryTrackerStore::default());
        let task_id = store
            .write(|repo| {
                let phase_id = repo.insert_phase(&Phase::new("Foundations", None))?;
                let week_id = repo.insert_week(&Week::new(phase_id, 1, None))?;
                let mut task = Task::new_pending("Left running", week_id, None, at("09:00:00"));
                task.status = TaskStatus::Working;
                task.state_started_at = Some(at("10:00:00"));
                task.first_started_at = Some(at("10:00:00"));
                repo.insert_task(&task)
            })
            .expect("seed running task");
        let engine = ProgressEngine::new(store).with_now_provider(fixed_clock("23:00:00"));

        assert!(matches!(
            engine.get_timing_snapshot(task_id),
            Err(TrackerError::StartupPending)
        ));
        assert!(matches!(engine.refresh_interval(), Err(TrackerError::StartupPending)));

        engine.reconcile_on_startup().expect("reconcile");
        let snapshot = engine.get_timing_snapshot(task_id).expect("snapshot");
        assert!(!snapshot.running);
        assert_eq!(snapshot.work_seconds, 0);
        assert_eq!(engine.refresh_interval().expect("paused is live"), Duration::from_secs(1));
    }

    #[test]
    fn work_break_scenario_accumulates_buckets_and_cascades() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let task = add_task(&engine, &plan, "Task A");

        act(&engine, &task, TaskAction::Start, "10:00:00");
        let paused = act(&engine, &task, TaskAction::Pause, "10:00:30");
        assert_eq!(paused.task.work_seconds, 30);
        assert_eq!(paused.cascade.day.as_ref().map(|day| day.rollup.status), Some(TaskStatus::Paused));

        act(&engine, &task, TaskAction::Resume, "10:05:00");
        let on_break = act(&engine, &task, TaskAction::TakeBreak, "10:07:00");
        assert_eq!(on_break.task.work_seconds, 150);
        assert_eq!(on_break.cascade.phase.as_ref().map(|phase| phase.rollup.status), Some(TaskStatus::Break));

        let resumed = act(&engine, &task, TaskAction::Resume, "10:08:00");
        assert_eq!(resumed.task.break_seconds, 60);

        let done = act(&engine, &task, TaskAction::Complete, "10:10:00");
        assert_eq!(done.task.work_seconds, 270);
        assert_eq!(done.task.break_seconds, 60);
        assert_eq!(done.task.status, TaskStatus::Completed);

        let phase = engine.phase(plan.phase.id).expect("load phase");
        assert_eq!(phase.rollup.status, TaskStatus::Completed);
        assert_eq!(phase.rollup.work_seconds, 270);
        assert_eq!(phase.rollup.break_seconds, 60);
        assert_eq!(phase.rollup.actual_start, Some(at("10:00:00")));
        assert_eq!(phase.rollup.actual_end, Some(at("10:10:00")));
    }

    #[test]
    fn week_level_task_cascades_to_week_and_phase() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let task = engine
            .create_task(NewTask {
                title: "Review datasheet".to_string(),
                description: None,
                hour_number: None,
                week_id: plan.week.id,
                day_id: None,
            })
            .expect("create week-level task")
            .task;

        let started = act(&engine, &task, TaskAction::Start, "10:00:00");
        assert!(started.cascade.day.is_none());
        assert!(started.cascade.orphans.is_empty());
        assert_eq!(
            started.cascade.week.map(|week| week.rollup.status),
            Some(TaskStatus::Working)
        );
        assert_eq!(
            started.cascade.phase.map(|phase| phase.rollup.status),
            Some(TaskStatus::Working)
        );

        let done = act(&engine, &task, TaskAction::Complete, "10:30:00");
        let week = done.cascade.week.expect("week refreshed");
        assert_eq!(week.rollup.work_seconds, 1800);
        assert_eq!(week.rollup.actual_end, Some(at("10:30:00")));
        let phase = done.cascade.phase.expect("phase refreshed");
        assert_eq!(phase.rollup.work_seconds, 1800);

        let day = engine.day(plan.day.id).expect("load day");
        assert_eq!(day.rollup.status, TaskStatus::Pending);
        assert_eq!(day.rollup.work_seconds, 0);
    }

    #[test]
    fn first_start_plans_the_roadmap_once() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let second_week = engine.create_week(plan.phase.id, 2, None).expect("second week");
        let first = add_task(&engine, &plan, "First");
        let second = add_task(&engine, &plan, "Second");
        assert!(engine.week(plan.week.id).expect("load week").start_date.is_none());

        let started = act(&engine, &first, TaskAction::Start, "10:00:00");
        let schedule = started.schedule.expect("roadmap planned");
        assert_eq!(schedule.start, date("2026-02-16"));
        assert_eq!(schedule.weeks_planned, 2);
        assert_eq!(schedule.days_planned, 1);

        let week = engine.week(plan.week.id).expect("load week");
        assert_eq!((week.start_date, week.end_date), (Some(date("2026-02-16")), Some(date("2026-02-23"))));
        let later = engine.week(second_week.id).expect("load week");
        assert_eq!(later.start_date, Some(date("2026-02-24")));
        assert_eq!(
            engine.day(plan.day.id).expect("load day").scheduled_date,
            Some(date("2026-02-16"))
        );
        let phase = engine.phase(plan.phase.id).expect("load phase");
        assert_eq!((phase.start_date, phase.end_date), (Some(date("2026-02-16")), Some(date("2026-03-03"))));

        act(&engine, &first, TaskAction::Pause, "10:10:00");
        assert!(act(&engine, &first, TaskAction::Resume, "10:20:00").schedule.is_none());
        assert!(act(&engine, &second, TaskAction::Start, "10:30:00").schedule.is_none());
    }

    #[test]
    fn planning_uses_the_display_timezone_date() {
        let engine = ProgressEngine::new(Arc::new(InMemoryTrackerStore::default()))
            .with_now_provider(fixed_clock("13:00:00"))
            .with_timezone(chrono_tz::Pacific::Auckland);
        engine.reconcile_on_startup().expect("reconcile");
        assert_eq!(engine.current_date(), date("2026-02-17"));

        let plan = plan(&engine);
        let outcome = engine.plan_schedule(None).expect("plan");
        assert_eq!(outcome.start, date("2026-02-17"));
        assert_eq!(
            engine.week(plan.week.id).expect("load week").start_date,
            Some(date("2026-02-17"))
        );
    }

    #[test]
    fn updating_phase_start_replans_and_ranges_are_checked() {
        let engine = ready_engine();
        let plan = plan(&engine);
        engine.plan_schedule(Some(date("2026-02-16"))).expect("initial plan");

        let outcome = engine
            .update_phase(
                plan.phase.id,
                PhaseChanges {
                    start_date: Some(Some(date("2026-03-07"))),
                    ..PhaseChanges::default()
                },
            )
            .expect("move phase");
        assert!(outcome.schedule.is_some());
        assert_eq!(outcome.phase.start_date, Some(date("2026-03-09")));
        assert_eq!(
            engine.day(plan.day.id).expect("load day").scheduled_date,
            Some(date("2026-03-09"))
        );

        let renamed = engine
            .update_phase(
                plan.phase.id,
                PhaseChanges {
                    name: Some("  Bring-up ".to_string()),
                    ..PhaseChanges::default()
                },
            )
            .expect("rename");
        assert_eq!(renamed.phase.name, "Bring-up");
        assert!(renamed.schedule.is_none());

        let inverted = engine.update_week(
            plan.week.id,
            WeekChanges {
                start_date: Some(Some(date("2026-03-20"))),
                end_date: Some(Some(date("2026-03-10"))),
                ..WeekChanges::default()
            },
        );
        assert!(matches!(inverted, Err(TrackerError::Validation(_))));
        assert_eq!(
            engine.week(plan.week.id).expect("load week").start_date,
            Some(date("2026-03-09"))
        );
    }

    #[test]
    fn moving_week_reaggregates_both_phases() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let task = add_task(&engine, &plan, "Running");
        act(&engine, &task, TaskAction::Start, "10:00:00");
        let target = engine.create_phase("Drivers", None).expect("second phase");

        let outcome = engine
            .update_week(
                plan.week.id,
                WeekChanges {
                    phase_id: Some(target.id),
                    ..WeekChanges::default()
                },
            )
            .expect("move week");
        assert_eq!(outcome.updated.phase_id, target.id);
        assert_eq!(
            outcome.cascade.phase.as_ref().map(|phase| (phase.id, phase.rollup.status)),
            Some((target.id, TaskStatus::Working))
        );
        let previous = outcome.previous.expect("old phase refreshed");
        assert_eq!(
            previous.phase.map(|phase| (phase.id, phase.rollup.status)),
            Some((plan.phase.id, TaskStatus::Pending))
        );
        assert!(matches!(
            engine.update_week(
                plan.week.id,
                WeekChanges {
                    phase_id: Some(99),
                    ..WeekChanges::default()
                },
            ),
            Err(TrackerError::NotFound { kind: EntityKind::Phase, id: 99 })
        ));
    }

    #[test]
    fn moving_day_carries_its_tasks_to_the_new_week() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let task = add_task(&engine, &plan, "Solder header");
        act(&engine, &task, TaskAction::Start, "10:00:00");
        act(&engine, &task, TaskAction::Complete, "10:20:00");
        let target = engine.create_week(plan.phase.id, 2, None).expect("second week");

        let outcome = engine
            .update_day(
                plan.day.id,
                DayChanges {
                    week_id: Some(target.id),
                    notes: Some(Some("moved after review".to_string())),
                    ..DayChanges::default()
                },
            )
            .expect("move day");
        assert_eq!(outcome.updated.week_id, target.id);
        assert_eq!(outcome.updated.notes.as_deref(), Some("moved after review"));
        assert_eq!(engine.task(task.id).expect("load task").week_id, target.id);

        let new_week = outcome.cascade.week.expect("new week refreshed");
        assert_eq!(new_week.rollup.work_seconds, 1200);
        assert_eq!(new_week.rollup.status, TaskStatus::Completed);
        let old_week = outcome
            .previous
            .and_then(|report| report.week)
            .expect("old week refreshed");
        assert_eq!(old_week.id, plan.week.id);
        assert_eq!(old_week.rollup.work_seconds, 0);
        assert_eq!(old_week.rollup.status, TaskStatus::Pending);
    }

    #[test]
    fn moving_task_reaggregates_old_and_new_parents() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let task = add_task(&engine, &plan, "Flash bootloader");
        act(&engine, &task, TaskAction::Start, "10:00:00");
        act(&engine, &task, TaskAction::Complete, "10:15:00");
        let other_day = engine.create_day(plan.week.id, 2, None).expect("second day");

        let outcome = engine
            .update_task(
                task.id,
                TaskChanges {
                    day_id: Some(Some(other_day.id)),
                    hour_number: Some(Some(3)),
                    ..TaskChanges::default()
                },
            )
            .expect("move task");
        assert_eq!(outcome.updated.day_id, Some(other_day.id));
        assert_eq!(outcome.updated.hour_number, Some(3));
        assert_eq!(outcome.updated.status, TaskStatus::Completed);
        assert_eq!(
            outcome.cascade.day.map(|day| (day.id, day.rollup.work_seconds)),
            Some((other_day.id, 900))
        );
        assert_eq!(
            outcome.previous.and_then(|report| report.day).map(|day| (day.id, day.rollup.work_seconds)),
            Some((plan.day.id, 0))
        );

        let detached = engine
            .update_task(
                task.id,
                TaskChanges {
                    day_id: Some(None),
                    ..TaskChanges::default()
                },
            )
            .expect("detach from day");
        assert_eq!(detached.updated.day_id, None);
        assert!(detached.cascade.day.is_none());
        assert_eq!(
            engine.day(other_day.id).expect("load day").rollup.work_seconds,
            0
        );
        assert_eq!(engine.week(plan.week.id).expect("load week").rollup.work_seconds, 900);

        let other_week = engine.create_week(plan.phase.id, 2, None).expect("second week");
        let misplaced = engine.update_task(
            task.id,
            TaskChanges {
                week_id: Some(other_week.id),
                day_id: Some(Some(plan.day.id)),
                ..TaskChanges::default()
            },
        );
        assert!(matches!(misplaced, Err(TrackerError::Validation(_))));

        let retitled = engine
            .update_task(
                task.id,
                TaskChanges {
                    title: Some("Flash bootloader v2".to_string()),
                    ..TaskChanges::default()
                },
            )
            .expect("retitle");
        assert!(retitled.previous.is_none());
        assert!(matches!(
            engine.update_task(
                task.id,
                TaskChanges {
                    title: Some("  ".to_string()),
                    ..TaskChanges::default()
                },
            ),
            Err(TrackerError::Validation(_))
        ));
    }

    #[test]
    fn agenda_lists_tasks_planned_for_the_date() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let second_day = engine.create_day(plan.week.id, 2, None).expect("second day");
        let monday = add_task(&engine, &plan, "Monday task");
        let tuesday = engine
            .create_task(NewTask {
                title: "Tuesday task".to_string(),
                description: None,
                hour_number: Some(1),
                week_id: plan.week.id,
                day_id: Some(second_day.id),
            })
            .expect("tuesday task")
            .task;
        let loose = engine
            .create_task(NewTask {
                title: "Any day".to_string(),
                description: None,
                hour_number: None,
                week_id: plan.week.id,
                day_id: None,
            })
            .expect("week task")
            .task;

        assert!(engine.agenda_for(date("2026-02-16")).expect("unplanned").is_empty());
        engine.plan_schedule(Some(date("2026-02-16"))).expect("plan");

        let planned_ids = |day: &str| {
            engine
                .agenda_for(date(day))
                .expect("agenda")
                .into_iter()
                .map(|entry| entry.task.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(planned_ids("2026-02-16"), vec![monday.id, loose.id]);
        assert_eq!(planned_ids("2026-02-17"), vec![tuesday.id, loose.id]);
        assert_eq!(planned_ids("2026-02-18"), vec![loose.id]);
        assert!(planned_ids("2026-03-01").is_empty());

        let entry = engine
            .agenda_for(date("2026-02-17"))
            .expect("agenda")
            .remove(0);
        assert_eq!(entry.phase_name, "Foundations");
        assert_eq!(entry.week_number, 1);
        assert_eq!(entry.day_number, Some(2));
    }

    #[test]
    fn invalid_transition_leaves_state_untouched() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let task = add_task(&engine, &plan, "Task A");

        let error = engine
            .apply_task_action(task.id, TaskAction::Pause, Some(at("10:00:00")))
            .expect_err("pending task cannot pause");
        match error {
            TrackerError::InvalidTransition(transition) => {
                assert_eq!(transition.task_id, task.id);
                assert_eq!(transition.action, TaskAction::Pause);
                assert_eq!(transition.from, TaskStatus::Pending);
            }
            other => panic!("expected invalid transition, got {other:?}"),
        }
        assert_eq!(engine.task(task.id).expect("load task"), task);
    }

    #[test]
    fn missing_task_is_not_found() {
        let engine = ready_engine();
        assert!(matches!(
            engine.apply_task_action(42, TaskAction::Start, None),
            Err(TrackerError::NotFound { kind: EntityKind::Task, id: 42 })
        ));
    }

    #[test]
    fn day_status_follows_most_active_task_and_week_follows_day() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let first = add_task(&engine, &plan, "First");
        let second = add_task(&engine, &plan, "Second");
        let third = add_task(&engine, &plan, "Third");

        act(&engine, &first, TaskAction::Start, "10:00:00");
        act(&engine, &first, TaskAction::Complete, "10:10:00");
        act(&engine, &second, TaskAction::Start, "10:10:00");

        assert_eq!(engine.day(plan.day.id).expect("load day").rollup.status, TaskStatus::Working);
        assert_eq!(engine.week(plan.week.id).expect("load week").rollup.status, TaskStatus::Working);

        act(&engine, &second, TaskAction::Complete, "10:20:00");
        act(&engine, &third, TaskAction::Complete, "10:20:00");

        let day = engine.day(plan.day.id).expect("load day");
        assert_eq!(day.rollup.status, TaskStatus::Completed);
        assert_eq!(day.rollup.work_seconds, 1200);
        assert_eq!(engine.week(plan.week.id).expect("load week").rollup.status, TaskStatus::Completed);
    }

    #[test]
    fn rest_day_override_counts_as_completed_without_timing() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let task = add_task(&engine, &plan, "Only task");
        act(&engine, &task, TaskAction::Start, "10:00:00");
        act(&engine, &task, TaskAction::Complete, "11:00:00");

        let rest = engine.create_day(plan.week.id, 2, Some("rest".to_string())).expect("create rest day");
        assert_eq!(engine.week(plan.week.id).expect("load week").rollup.status, TaskStatus::Pending);

        let outcome = engine
            .override_day_status(rest.id, TaskStatus::Completed)
            .expect("override");
        assert_eq!(outcome.effective_status, TaskStatus::Completed);
        assert_eq!(outcome.day.rollup.work_seconds, 0);
        assert_eq!(outcome.day.rollup.status, TaskStatus::Pending);
        let week = outcome.cascade.week.expect("week refreshed");
        assert_eq!(week.rollup.status, TaskStatus::Completed);
        assert_eq!(week.rollup.work_seconds, 3600);
        assert_eq!(
            outcome.cascade.phase.map(|phase| phase.rollup.status),
            Some(TaskStatus::Completed)
        );
    }

    #[test]
    fn clearing_override_reverts_ancestors_to_derived_status() {
        let engine = ready_engine();
        let plan = plan(&engine);
        add_task(&engine, &plan, "Unstarted");

        let pinned = engine
            .override_day_status(plan.day.id, TaskStatus::Completed)
            .expect("override");
        assert_eq!(pinned.cascade.week.map(|week| week.rollup.status), Some(TaskStatus::Completed));

        let again = engine
            .override_day_status(plan.day.id, TaskStatus::Completed)
            .expect("override twice");
        assert_eq!(again.day, pinned.day);

        let cleared = engine.clear_day_override(plan.day.id).expect("clear");
        assert_eq!(cleared.day.override_status, None);
        assert_eq!(cleared.effective_status, TaskStatus::Pending);
        assert_eq!(cleared.cascade.week.map(|week| week.rollup.status), Some(TaskStatus::Pending));
        assert_eq!(
            engine.phase(plan.phase.id).expect("load phase").rollup.status,
            TaskStatus::Pending
        );

        engine.clear_day_override(plan.day.id).expect("clear twice");
    }

    #[test]
    fn override_of_orphaned_day_is_applied_and_reported() {
        let engine = ready_engine();
        let plan = plan(&engine);
        engine
            .store()
            .write(|repo| repo.delete_week(plan.week.id))
            .expect("drop week row");

        let outcome = engine
            .override_day_status(plan.day.id, TaskStatus::Paused)
            .expect("override");
        assert_eq!(outcome.effective_status, TaskStatus::Paused);
        assert_eq!(outcome.cascade.orphans.len(), 1);
        assert_eq!(outcome.cascade.orphans[0].parent_kind, EntityKind::Week);
    }

    #[test]
    fn startup_recovers_zombies_without_crediting_downtime() {
        let store = Arc::new(InMemoryTrackerStore::default());
        let first_session = ProgressEngine::new(Arc::clone(&store))
            .with_now_provider(fixed_clock("09:00:00"));
        first_session.reconcile_on_startup().expect("reconcile");
        let plan = plan(&first_session);
        let task = add_task(&first_session, &plan, "Left running");
        act(&first_session, &task, TaskAction::Start, "10:00:00");
        act(&first_session, &task, TaskAction::Pause, "10:01:00");
        act(&first_session, &task, TaskAction::Resume, "10:02:00");

        let stale = store
            .write(|repo| {
                let mut ghost = Task::new_pending("Ghost", plan.week.id, Some(plan.day.id), at("09:00:00"));
                ghost.status = TaskStatus::Break;
                ghost.id = repo.insert_task(&ghost)?;
                Ok(ghost)
            })
            .expect("insert inconsistent row");

        let second_session = ProgressEngine::new(Arc::clone(&store))
            .with_now_provider(fixed_clock("23:00:00"));
        let recovered = second_session.reconcile_on_startup().expect("reconcile");
        assert_eq!(recovered.len(), 2);

        let task = second_session.task(task.id).expect("load task");
        assert_eq!(task.status, TaskStatus::Paused);
        assert_eq!(task.work_seconds, 60);
        assert!(task.state_started_at.is_none());

        let ghost = second_session.task(stale.id).expect("load ghost");
        assert_eq!(ghost.status, TaskStatus::Pending);

        assert_eq!(
            second_session.day(plan.day.id).expect("load day").rollup.status,
            TaskStatus::Paused
        );
        assert!(second_session.reconcile_on_startup().expect("second pass").is_empty());
    }

    #[test]
    fn snapshot_includes_live_segment_without_persisting_it() {
        let store = Arc::new(InMemoryTrackerStore::default());
        let clock = Arc::new(Mutex::new(at("10:00:00")));
        let reader = Arc::clone(&clock);
        let engine = ProgressEngine::new(store).with_now_provider(Arc::new(move || {
            *reader.lock().expect("clock lock")
        }));
        engine.reconcile_on_startup().expect("reconcile");
        let plan = plan(&engine);
        let task = add_task(&engine, &plan, "Live");
        engine
            .apply_task_action(task.id, TaskAction::Start, None)
            .expect("start");

        *clock.lock().expect("clock lock") = at("10:00:45");
        let snapshot = engine.get_timing_snapshot(task.id).expect("snapshot");
        assert!(snapshot.running);
        assert_eq!(snapshot.work_seconds, 45);
        assert_eq!(engine.task(task.id).expect("load task").work_seconds, 0);
    }

    #[test]
    fn create_task_requires_day_in_same_week() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let other_week = engine.create_week(plan.phase.id, 2, None).expect("second week");

        let result = engine.create_task(NewTask {
            title: "Misfiled".to_string(),
            description: None,
            hour_number: Some(1),
            week_id: other_week.id,
            day_id: Some(plan.day.id),
        });
        assert!(matches!(result, Err(TrackerError::Validation(_))));

        let result = engine.create_task(NewTask {
            title: "   ".to_string(),
            description: None,
            hour_number: None,
            week_id: plan.week.id,
            day_id: None,
        });
        assert!(matches!(result, Err(TrackerError::Validation(_))));
    }

    #[test]
    fn deletes_remove_descendants_and_reaggregate_parents() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let task = add_task(&engine, &plan, "Running");
        act(&engine, &task, TaskAction::Start, "10:00:00");
        let done_day = engine.create_day(plan.week.id, 2, None).expect("second day");
        engine
            .override_day_status(done_day.id, TaskStatus::Completed)
            .expect("override");

        let outcome = engine.delete_day(plan.day.id).expect("delete day");
        assert_eq!(outcome.removed, 2);
        assert_eq!(
            outcome.cascade.week.map(|week| week.rollup.status),
            Some(TaskStatus::Completed)
        );
        assert!(matches!(
            engine.task(task.id),
            Err(TrackerError::NotFound { kind: EntityKind::Task, .. })
        ));

        let outcome = engine.delete_week(plan.week.id).expect("delete week");
        assert_eq!(outcome.removed, 2);
        assert_eq!(
            outcome.cascade.phase.map(|phase| phase.rollup.status),
            Some(TaskStatus::Pending)
        );

        let outcome = engine.delete_phase(plan.phase.id).expect("delete phase");
        assert_eq!(outcome.removed, 1);
        assert!(engine.list_phases().expect("list phases").is_empty());
    }

    #[test]
    fn deleting_task_reaggregates_day() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let keep = add_task(&engine, &plan, "Keep");
        let dropped = add_task(&engine, &plan, "Drop");
        act(&engine, &keep, TaskAction::Complete, "10:00:00");

        assert_eq!(engine.day(plan.day.id).expect("load day").rollup.status, TaskStatus::Pending);
        let outcome = engine.delete_task(dropped.id).expect("delete task");
        assert_eq!(outcome.removed, 1);
        assert_eq!(
            outcome.cascade.day.map(|day| day.rollup.status),
            Some(TaskStatus::Completed)
        );
    }

    #[test]
    fn refresh_interval_tracks_activity() {
        let engine = ready_engine();
        let plan = plan(&engine);
        let task = add_task(&engine, &plan, "Poll me");
        assert_eq!(engine.refresh_interval().expect("idle"), Duration::from_secs(15));

        act(&engine, &task, TaskAction::Start, "10:00:00");
        assert_eq!(engine.refresh_interval().expect("live"), Duration::from_secs(1));

        act(&engine, &task, TaskAction::Pause, "10:00:10");
        assert_eq!(engine.refresh_interval().expect("paused"), Duration::from_secs(1));

        act(&engine, &task, TaskAction::Complete, "10:00:20");
        assert_eq!(engine.refresh_interval().expect("done"), Duration::from_secs(15));
    }

    fn action_strategy() -> impl Strategy<Value = TaskAction> {
        prop::sample::select(vec![
            TaskAction::Start,
            TaskAction::Pause,
            TaskAction::TakeBreak,
            TaskAction::Resume,
            TaskAction::Complete,
        ])
    }

    proptest! {
        #[test]
        fn containers_always_equal_fresh_aggregation(
            steps in prop::collection::vec((0usize..3, action_strategy(), 1i64..600), 1..30)
        ) {
            let engine = ready_engine();
            let plan = plan(&engine);
            let tasks = ["A", "B", "C"].map(|title| add_task(&engine, &plan, title));
            let mut now = at("10:00:00");

            for (index, action, gap) in steps {
                now += chrono::Duration::seconds(gap);
                let _ = engine.apply_task_action(tasks[index].id, action, Some(now));

                let stored_tasks = engine
                    .list_tasks(&TaskFilter::in_day(plan.day.id))
                    .expect("list tasks");
                let day = engine.day(plan.day.id).expect("load day");
                let week = engine.week(plan.week.id).expect("load week");
                let phase = engine.phase(plan.phase.id).expect("load phase");

                prop_assert_eq!(&day.rollup, &crate::domain::aggregation::aggregate_day(&stored_tasks));
                prop_assert_eq!(&week.rollup, &crate::domain::aggregation::aggregate_week(&[day], &[]));
                prop_assert_eq!(&phase.rollup, &crate::domain::aggregation::aggregate_phase(&[week]));
            }
        }
    }
}
