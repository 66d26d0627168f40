use crate::domain::models::{Day, EntityId, EntityKind, Phase, Rollup, Task, TaskStatus, Week};
use crate::domain::time::parse_instant;
use crate::infrastructure::error::TrackerError;
use crate::infrastructure::repository::{TaskFilter, TrackerRepository, TrackerStore};
use crate::infrastructure::storage::initialize_database;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::path::{Path, PathBuf};

const PHASE_COLUMNS: &str = "id, name, description, start_date, end_date, status, work_seconds, break_seconds, pause_seconds, actual_start, actual_end";
const WEEK_COLUMNS: &str = "id, phase_id, number, focus, start_date, end_date, status, work_seconds, break_seconds, pause_seconds, actual_start, actual_end";
const DAY_COLUMNS: &str = "id, week_id, number, focus, notes, scheduled_date, override_status, status, work_seconds, break_seconds, pause_seconds, actual_start, actual_end";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TASK_COLUMNS: &str = "id, title, description, hour_number, week_id, day_id, status, work_seconds, break_seconds, pause_seconds, state_started_at, first_started_at, completed_at, status_updated_at";

#[derive(Debug, Clone)]
pub struct SqliteTrackerStore {
    db_path: PathBuf,
}

impl SqliteTrackerStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Applies the schema before handing out the store.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let store = Self::new(db_path);
        initialize_database(&store.db_path)?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, TrackerError> {
        Connection::open(&self.db_path).map_err(TrackerError::from)
    }
}

impl TrackerStore for SqliteTrackerStore {
    fn read<T>(
        &self,
        operation: impl FnOnce(&dyn TrackerRepository) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        let connection = self.connect()?;
        let repository = SqliteRepository { conn: &connection };
        operation(&repository)
    }

    fn write<T>(
        &self,
        operation: impl FnOnce(&mut dyn TrackerRepository) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        let output = {
            let mut repository = SqliteRepository { conn: &*transaction };
            operation(&mut repository)?
        };
        transaction.commit()?;
        Ok(output)
    }
}

struct SqliteRepository<'c> {
    conn: &'c Connection,
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}

fn status_column(row: &Row<'_>, index: usize) -> rusqlite::Result<TaskStatus> {
    let raw: String = row.get(index)?;
    raw.parse::<TaskStatus>()
        .map_err(|error| conversion_error(index, error))
}

fn optional_status_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<TaskStatus>> {
    let raw: Option<String> = row.get(index)?;
    raw.map(|value| {
        value
            .parse::<TaskStatus>()
            .map_err(|error| conversion_error(index, error))
    })
    .transpose()
}

fn instant_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(index)?;
    raw.map(|value| parse_instant(&value).map_err(|error| conversion_error(index, error)))
        .transpose()
}

fn to_text(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|instant| instant.to_rfc3339())
}

fn date_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(index)?;
    raw.map(|value| {
        NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
            .map_err(|error| conversion_error(index, format!("invalid date '{value}': {error}")))
    })
    .transpose()
}

fn date_text(value: Option<NaiveDate>) -> Option<String> {
    value.map(|date| date.format(DATE_FORMAT).to_string())
}

fn rollup_columns(row: &Row<'_>, offset: usize) -> rusqlite::Result<Rollup> {
    Ok(Rollup {
        status: status_column(row, offset)?,
        work_seconds: row.get(offset + 1)?,
        break_seconds: row.get(offset + 2)?,
        pause_seconds: row.get(offset + 3)?,
        actual_start: instant_column(row, offset + 4)?,
        actual_end: instant_column(row, offset + 5)?,
    })
}

fn map_phase(row: &Row<'_>) -> rusqlite::Result<Phase> {
    Ok(Phase {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        start_date: date_column(row, 3)?,
        end_date: date_column(row, 4)?,
        rollup: rollup_columns(row, 5)?,
    })
}

fn map_week(row: &Row<'_>) -> rusqlite::Result<Week> {
    Ok(Week {
        id: row.get(0)?,
        phase_id: row.get(1)?,
        number: row.get(2)?,
        focus: row.get(3)?,
        start_date: date_column(row, 4)?,
        end_date: date_column(row, 5)?,
        rollup: rollup_columns(row, 6)?,
    })
}

fn map_day(row: &Row<'_>) -> rusqlite::Result<Day> {
    Ok(Day {
        id: row.get(0)?,
        week_id: row.get(1)?,
        number: row.get(2)?,
        focus: row.get(3)?,
        notes: row.get(4)?,
        scheduled_date: date_column(row, 5)?,
        override_status: optional_status_column(row, 6)?,
        rollup: rollup_columns(row, 7)?,
    })
}

fn map_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status_updated_at = instant_column(row, 13)?
        .ok_or_else(|| conversion_error(13, "task.status_updated_at is empty".to_string()))?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        hour_number: row.get(3)?,
        week_id: row.get(4)?,
        day_id: row.get(5)?,
        status: status_column(row, 6)?,
        work_seconds: row.get(7)?,
        break_seconds: row.get(8)?,
        pause_seconds: row.get(9)?,
        state_started_at: instant_column(row, 10)?,
        first_started_at: instant_column(row, 11)?,
        completed_at: instant_column(row, 12)?,
        status_updated_at,
    })
}

fn ensure_updated(changed: usize, kind: EntityKind, id: EntityId) -> Result<(), TrackerError> {
    if changed == 0 {
        return Err(TrackerError::not_found(kind, id));
    }
    Ok(())
}

impl SqliteRepository<'_> {
    fn list<T>(
        &self,
        sql: &str,
        values: Vec<Value>,
        mapper: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, TrackerError> {
        let mut statement = self.conn.prepare(sql)?;
        let rows = statement
            .query_map(params_from_iter(values), mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl TrackerRepository for SqliteRepository<'_> {
    fn phase(&self, id: EntityId) -> Result<Option<Phase>, TrackerError> {
        let sql = format!("SELECT {PHASE_COLUMNS} FROM phase WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], map_phase).optional()?)
    }

    fn week(&self, id: EntityId) -> Result<Option<Week>, TrackerError> {
        let sql = format!("SELECT {WEEK_COLUMNS} FROM week WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], map_week).optional()?)
    }

    fn day(&self, id: EntityId) -> Result<Option<Day>, TrackerError> {
        let sql = format!("SELECT {DAY_COLUMNS} FROM day_plan WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], map_day).optional()?)
    }

    fn task(&self, id: EntityId) -> Result<Option<Task>, TrackerError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM task WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], map_task).optional()?)
    }

    fn phases(&self) -> Result<Vec<Phase>, TrackerError> {
        let sql = format!("SELECT {PHASE_COLUMNS} FROM phase ORDER BY id");
        self.list(&sql, Vec::new(), map_phase)
    }

    fn weeks(&self, phase_id: Option<EntityId>) -> Result<Vec<Week>, TrackerError> {
        match phase_id {
            Some(phase_id) => {
                let sql = format!(
                    "SELECT {WEEK_COLUMNS} FROM week WHERE phase_id = ?1 ORDER BY phase_id, number, id"
                );
                self.list(&sql, vec![Value::Integer(phase_id)], map_week)
            }
            None => {
                let sql = format!("SELECT {WEEK_COLUMNS} FROM week ORDER BY phase_id, number, id");
                self.list(&sql, Vec::new(), map_week)
            }
        }
    }

    fn days(&self, week_id: Option<EntityId>) -> Result<Vec<Day>, TrackerError> {
        match week_id {
            Some(week_id) => {
                let sql = format!(
                    "SELECT {DAY_COLUMNS} FROM day_plan WHERE week_id = ?1 ORDER BY week_id, number, id"
                );
                self.list(&sql, vec![Value::Integer(week_id)], map_day)
            }
            None => {
                let sql = format!("SELECT {DAY_COLUMNS} FROM day_plan ORDER BY week_id, number, id");
                self.list(&sql, Vec::new(), map_day)
            }
        }
    }

    fn tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, TrackerError> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(week_id) = filter.week_id {
            clauses.push("week_id = ?".to_string());
            values.push(Value::Integer(week_id));
        }
        if let Some(day_id) = filter.day_id {
            clauses.push("day_id = ?".to_string());
            values.push(Value::Integer(day_id));
        }
        if filter.without_day {
            clauses.push("day_id IS NULL".to_string());
        }
        if !filter.statuses.is_empty() {
            let placeholders = vec!["?"; filter.statuses.len()].join(", ");
            clauses.push(format!("status IN ({placeholders})"));
            values.extend(
                filter
                    .statuses
                    .iter()
                    .map(|status| Value::Text(status.as_str().to_string())),
            );
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM task{where_clause}
             ORDER BY week_id, day_id IS NULL, day_id, hour_number IS NULL, hour_number, id"
        );
        self.list(&sql, values, map_task)
    }

    fn insert_phase(&mut self, phase: &Phase) -> Result<EntityId, TrackerError> {
        let rollup = &phase.rollup;
        self.conn.execute(
            "INSERT INTO phase (name, description, start_date, end_date, status, work_seconds, break_seconds, pause_seconds, actual_start, actual_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                phase.name,
                phase.description,
                date_text(phase.start_date),
                date_text(phase.end_date),
                rollup.status.as_str(),
                rollup.work_seconds,
                rollup.break_seconds,
                rollup.pause_seconds,
                to_text(rollup.actual_start),
                to_text(rollup.actual_end),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_week(&mut self, week: &Week) -> Result<EntityId, TrackerError> {
        let rollup = &week.rollup;
        self.conn.execute(
            "INSERT INTO week (phase_id, number, focus, start_date, end_date, status, work_seconds, break_seconds, pause_seconds, actual_start, actual_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                week.phase_id,
                week.number,
                week.focus,
                date_text(week.start_date),
                date_text(week.end_date),
                rollup.status.as_str(),
                rollup.work_seconds,
                rollup.break_seconds,
                rollup.pause_seconds,
                to_text(rollup.actual_start),
                to_text(rollup.actual_end),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_day(&mut self, day: &Day) -> Result<EntityId, TrackerError> {
        let rollup = &day.rollup;
        self.conn.execute(
            "INSERT INTO day_plan (week_id, number, focus, notes, scheduled_date, override_status, status, work_seconds, break_seconds, pause_seconds, actual_start, actual_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                day.week_id,
                day.number,
                day.focus,
                day.notes,
                date_text(day.scheduled_date),
                day.override_status.map(TaskStatus::as_str),
                rollup.status.as_str(),
                rollup.work_seconds,
                rollup.break_seconds,
                rollup.pause_seconds,
                to_text(rollup.actual_start),
                to_text(rollup.actual_end),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_task(&mut self, task: &Task) -> Result<EntityId, TrackerError> {
        self.conn.execute(
            "INSERT INTO task (title, description, hour_number, week_id, day_id, status, work_seconds, break_seconds, pause_seconds, state_started_at, first_started_at, completed_at, status_updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                task.title,
                task.description,
                task.hour_number,
                task.week_id,
                task.day_id,
                task.status.as_str(),
                task.work_seconds,
                task.break_seconds,
                task.pause_seconds,
                to_text(task.state_started_at),
                to_text(task.first_started_at),
                to_text(task.completed_at),
                task.status_updated_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn save_phase(&mut self, phase: &Phase) -> Result<(), TrackerError> {
        let rollup = &phase.rollup;
        let changed = self.conn.execute(
            "UPDATE phase SET name = ?2, description = ?3, start_date = ?4, end_date = ?5,
               status = ?6, work_seconds = ?7, break_seconds = ?8, pause_seconds = ?9,
               actual_start = ?10, actual_end = ?11
             WHERE id = ?1",
            params![
                phase.id,
                phase.name,
                phase.description,
                date_text(phase.start_date),
                date_text(phase.end_date),
                rollup.status.as_str(),
                rollup.work_seconds,
                rollup.break_seconds,
                rollup.pause_seconds,
                to_text(rollup.actual_start),
                to_text(rollup.actual_end),
            ],
        )?;
        ensure_updated(changed, EntityKind::Phase, phase.id)
    }

    fn save_week(&mut self, week: &Week) -> Result<(), TrackerError> {
        let rollup = &week.rollup;
        let changed = self.conn.execute(
            "UPDATE week SET phase_id = ?2, number = ?3, focus = ?4, start_date = ?5, end_date = ?6,
               status = ?7, work_seconds = ?8, break_seconds = ?9, pause_seconds = ?10,
               actual_start = ?11, actual_end = ?12
             WHERE id = ?1",
            params![
                week.id,
                week.phase_id,
                week.number,
                week.focus,
                date_text(week.start_date),
                date_text(week.end_date),
                rollup.status.as_str(),
                rollup.work_seconds,
                rollup.break_seconds,
                rollup.pause_seconds,
                to_text(rollup.actual_start),
                to_text(rollup.actual_end),
            ],
        )?;
        ensure_updated(changed, EntityKind::Week, week.id)
    }

    fn save_day(&mut self, day: &Day) -> Result<(), TrackerError> {
        let rollup = &day.rollup;
        let changed = self.conn.execute(
            "UPDATE day_plan SET week_id = ?2, number = ?3, focus = ?4, notes = ?5, scheduled_date = ?6,
               override_status = ?7, status = ?8, work_seconds = ?9, break_seconds = ?10,
               pause_seconds = ?11, actual_start = ?12, actual_end = ?13
             WHERE id = ?1",
            params![
                day.id,
                day.week_id,
                day.number,
                day.focus,
                day.notes,
                date_text(day.scheduled_date),
                day.override_status.map(TaskStatus::as_str),
                rollup.status.as_str(),
                rollup.work_seconds,
                rollup.break_seconds,
                rollup.pause_seconds,
                to_text(rollup.actual_start),
                to_text(rollup.actual_end),
            ],
        )?;
        ensure_updated(changed, EntityKind::Day, day.id)
    }

    fn save_task(&mut self, task: &Task) -> Result<(), TrackerError> {
        let changed = self.conn.execute(
            "UPDATE task SET title = ?2, description = ?3, hour_number = ?4, week_id = ?5, day_id = ?6,
               status = ?7, work_seconds = ?8, break_seconds = ?9, pause_seconds = ?10,
               state_started_at = ?11, first_started_at = ?12, completed_at = ?13, status_updated_at = ?14
             WHERE id = ?1",
            params![
                task.id,
                task.title,
                task.description,
                task.hour_number,
                task.week_id,
                task.day_id,
                task.status.as_str(),
                task.work_seconds,
                task.break_seconds,
                task.pause_seconds,
                to_text(task.state_started_at),
                to_text(task.first_started_at),
                to_text(task.completed_at),
                task.status_updated_at.to_rfc3339(),
            ],
        )?;
        ensure_updated(changed, EntityKind::Task, task.id)
    }

    fn delete_phase(&mut self, id: EntityId) -> Result<bool, TrackerError> {
        Ok(self.conn.execute("DELETE FROM phase WHERE id = ?1", [id])? > 0)
    }

    fn delete_week(&mut self, id: EntityId) -> Result<bool, TrackerError> {
        Ok(self.conn.execute("DELETE FROM week WHERE id = ?1", [id])? > 0)
    }

    fn delete_day(&mut self, id: EntityId) -> Result<bool, TrackerError> {
        Ok(self.conn.execute("DELETE FROM day_plan WHERE id = ?1", [id])? > 0)
    }

    fn delete_task(&mut self, id: EntityId) -> Result<bool, TrackerError> {
        Ok(self.conn.execute("DELETE FROM task WHERE id = ?1", [id])? > 0)
    }
}
