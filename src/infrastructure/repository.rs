use crate::domain::models::{Day, EntityId, EntityKind, Phase, Task, TaskStatus, Week};
use crate::infrastructure::error::TrackerError;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub week_id: Option<EntityId>,
    pub day_id: Option<EntityId>,
    /// Only tasks filed directly under a week.
    pub without_day: bool,
    /// Empty means any status.
    pub statuses: Vec<TaskStatus>,
}

impl TaskFilter {
    pub fn in_day(day_id: EntityId) -> Self {
        Self {
            day_id: Some(day_id),
            ..Self::default()
        }
    }

    pub fn in_week(week_id: EntityId) -> Self {
        Self {
            week_id: Some(week_id),
            ..Self::default()
        }
    }

    pub fn loose_in_week(week_id: EntityId) -> Self {
        Self {
            week_id: Some(week_id),
            without_day: true,
            ..Self::default()
        }
    }

    pub fn with_statuses(statuses: &[TaskStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    pub fn open() -> Self {
        Self::statuses_where(TaskStatus::is_open)
    }

    /// Tasks a live display keeps refreshing.
    pub fn active() -> Self {
        Self::statuses_where(TaskStatus::is_active)
    }

    fn statuses_where(predicate: fn(TaskStatus) -> bool) -> Self {
        Self {
            statuses: TaskStatus::ALL
                .into_iter()
                .filter(|status| predicate(*status))
                .collect(),
            ..Self::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        if self.week_id.is_some_and(|week_id| task.week_id != week_id) {
            return false;
        }
        if self.day_id.is_some() && task.day_id != self.day_id {
            return false;
        }
        if self.without_day && task.day_id.is_some() {
            return false;
        }
        self.statuses.is_empty() || self.statuses.contains(&task.status)
    }
}

/// Entity access inside one unit of work. Ids are assigned on insert;
/// parent/child links are plain id fields.
pub trait TrackerRepository {
    fn phase(&self, id: EntityId) -> Result<Option<Phase>, TrackerError>;
    fn week(&self, id: EntityId) -> Result<Option<Week>, TrackerError>;
    fn day(&self, id: EntityId) -> Result<Option<Day>, TrackerError>;
    fn task(&self, id: EntityId) -> Result<Option<Task>, TrackerError>;

    fn phases(&self) -> Result<Vec<Phase>, TrackerError>;
    fn weeks(&self, phase_id: Option<EntityId>) -> Result<Vec<Week>, TrackerError>;
    fn days(&self, week_id: Option<EntityId>) -> Result<Vec<Day>, TrackerError>;
    fn tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, TrackerError>;

    fn insert_phase(&mut self, phase: &Phase) -> Result<EntityId, TrackerError>;
    fn insert_week(&mut self, week: &Week) -> Result<EntityId, TrackerError>;
    fn insert_day(&mut self, day: &Day) -> Result<EntityId, TrackerError>;
    fn insert_task(&mut self, task: &Task) -> Result<EntityId, TrackerError>;

    fn save_phase(&mut self, phase: &Phase) -> Result<(), TrackerError>;
    fn save_week(&mut self, week: &Week) -> Result<(), TrackerError>;
    fn save_day(&mut self, day: &Day) -> Result<(), TrackerError>;
    fn save_task(&mut self, task: &Task) -> Result<(), TrackerError>;

    fn delete_phase(&mut self, id: EntityId) -> Result<bool, TrackerError>;
    fn delete_week(&mut self, id: EntityId) -> Result<bool, TrackerError>;
    fn delete_day(&mut self, id: EntityId) -> Result<bool, TrackerError>;
    fn delete_task(&mut self, id: EntityId) -> Result<bool, TrackerError>;
}

/// Transaction boundary. Everything a `write` closure does is applied
/// together or not at all.
pub trait TrackerStore: Send + Sync {
    fn read<T>(
        &self,
        operation: impl FnOnce(&dyn TrackerRepository) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError>;

    fn write<T>(
        &self,
        operation: impl FnOnce(&mut dyn TrackerRepository) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError>;
}

pub(crate) fn task_order_key(task: &Task) -> (EntityId, bool, EntityId, bool, i64, EntityId) {
    (
        task.week_id,
        task.day_id.is_none(),
        task.day_id.unwrap_or_default(),
        task.hour_number.is_none(),
        task.hour_number.unwrap_or_default(),
        task.id,
    )
}

#[derive(Debug, Clone, Default)]
struct Arena {
    last_id: EntityId,
    phases: BTreeMap<EntityId, Phase>,
    weeks: BTreeMap<EntityId, Week>,
    days: BTreeMap<EntityId, Day>,
    tasks: BTreeMap<EntityId, Task>,
}

impl Arena {
    fn allocate_id(&mut self) -> EntityId {
        self.last_id += 1;
        self.last_id
    }
}

fn replace<T: Clone>(
    entries: &mut BTreeMap<EntityId, T>,
    kind: EntityKind,
    id: EntityId,
    value: &T,
) -> Result<(), TrackerError> {
    let Some(slot) = entries.get_mut(&id) else {
        return Err(TrackerError::not_found(kind, id));
    };
    *slot = value.clone();
    Ok(())
}

impl TrackerRepository for Arena {
    fn phase(&self, id: EntityId) -> Result<Option<Phase>, TrackerError> {
        Ok(self.phases.get(&id).cloned())
    }

    fn week(&self, id: EntityId) -> Result<Option<Week>, TrackerError> {
        Ok(self.weeks.get(&id).cloned())
    }

    fn day(&self, id: EntityId) -> Result<Option<Day>, TrackerError> {
        Ok(self.days.get(&id).cloned())
    }

    fn task(&self, id: EntityId) -> Result<Option<Task>, TrackerError> {
        Ok(self.tasks.get(&id).cloned())
    }

    fn phases(&self) -> Result<Vec<Phase>, TrackerError> {
        Ok(self.phases.values().cloned().collect())
    }

    fn weeks(&self, phase_id: Option<EntityId>) -> Result<Vec<Week>, TrackerError> {
        let mut weeks = self
            .weeks
            .values()
            .filter(|week| phase_id.map(|id| week.phase_id == id).unwrap_or(true))
            .cloned()
            .collect::<Vec<_>>();
        weeks.sort_by_key(|week| (week.phase_id, week.number, week.id));
        Ok(weeks)
    }

    fn days(&self, week_id: Option<EntityId>) -> Result<Vec<Day>, TrackerError> {
        let mut days = self
            .days
            .values()
            .filter(|day| week_id.map(|id| day.week_id == id).unwrap_or(true))
            .cloned()
            .collect::<Vec<_>>();
        days.sort_by_key(|day| (day.week_id, day.number, day.id));
        Ok(days)
    }

    fn tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, TrackerError> {
        let mut tasks = self
            .tasks
            .values()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect::<Vec<_>>();
        tasks.sort_by_key(task_order_key);
        Ok(tasks)
    }

    fn insert_phase(&mut self, phase: &Phase) -> Result<EntityId, TrackerError> {
        let id = self.allocate_id();
        self.phases.insert(id, Phase { id, ..phase.clone() });
        Ok(id)
    }

    fn insert_week(&mut self, week: &Week) -> Result<EntityId, TrackerError> {
        let id = self.allocate_id();
        self.weeks.insert(id, Week { id, ..week.clone() });
        Ok(id)
    }

    fn insert_day(&mut self, day: &Day) -> Result<EntityId, TrackerError> {
        let id = self.allocate_id();
        self.days.insert(id, Day { id, ..day.clone() });
        Ok(id)
    }

    fn insert_task(&mut self, task: &Task) -> Result<EntityId, TrackerError> {
        let id = self.allocate_id();
        self.tasks.insert(id, Task { id, ..task.clone() });
        Ok(id)
    }

    fn save_phase(&mut self, phase: &Phase) -> Result<(), TrackerError> {
        replace(&mut self.phases, EntityKind::Phase, phase.id, phase)
    }

    fn save_week(&mut self, week: &Week) -> Result<(), TrackerError> {
        replace(&mut self.weeks, EntityKind::Week, week.id, week)
    }

    fn save_day(&mut self, day: &Day) -> Result<(), TrackerError> {
        replace(&mut self.days, EntityKind::Day, day.id, day)
    }

    fn save_task(&mut self, task: &Task) -> Result<(), TrackerError> {
        replace(&mut self.tasks, EntityKind::Task, task.id, task)
    }

    fn delete_phase(&mut self, id: EntityId) -> Result<bool, TrackerError> {
        Ok(self.phases.remove(&id).is_some())
    }

    fn delete_week(&mut self, id: EntityId) -> Result<bool, TrackerError> {
        Ok(self.weeks.remove(&id).is_some())
    }

    fn delete_day(&mut self, id: EntityId) -> Result<bool, TrackerError> {
        Ok(self.days.remove(&id).is_some())
    }

    fn delete_task(&mut self, id: EntityId) -> Result<bool, TrackerError> {
        Ok(self.tasks.remove(&id).is_some())
    }
}

/// Arena-backed store. A write works on a copy of the arena and swaps it in
/// only when the closure succeeds.
#[derive(Debug, Default)]
pub struct InMemoryTrackerStore {
    arena: Mutex<Arena>,
}

impl InMemoryTrackerStore {
    fn lock(&self) -> Result<MutexGuard<'_, Arena>, TrackerError> {
        self.arena
            .lock()
            .map_err(|error| TrackerError::LockPoisoned(format!("tracker arena lock poisoned: {error}")))
    }
}

impl TrackerStore for InMemoryTrackerStore {
    fn read<T>(
        &self,
        operation: impl FnOnce(&dyn TrackerRepository) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        let arena = self.lock()?;
        operation(&*arena)
    }

    fn write<T>(
        &self,
        operation: impl FnOnce(&mut dyn TrackerRepository) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        let mut arena = self.lock()?;
        let mut working = arena.clone();
        let output = operation(&mut working)?;
        *arena = working;
        Ok(output)
    }
}
