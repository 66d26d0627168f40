//! Progress tracking over a Phase → Week → Day → Task hierarchy.
//!
//! Tasks carry a work/break/pause timer; every container above them holds a
//! roll-up of its children that is recomputed in the same transaction as
//! the change that caused it.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::cascade::CascadeReport;
pub use application::commands::AppState;
pub use application::engine::{
    AgendaEntry, DayChanges, DayOutcome, DeleteOutcome, NewTask, PhaseChanges, PhaseUpdateOutcome,
    ProgressEngine, TaskActionOutcome, TaskChanges, UpdateOutcome, WeekChanges,
};
pub use application::schedule::ScheduleOutcome;
pub use domain::aggregation::OrphanContainer;
pub use domain::calendar::{DateSpan, SchedulePlan, WorkCalendar};
pub use domain::models::{
    Day, EntityId, EntityKind, Phase, Rollup, Task, TaskAction, TaskStatus, TimingSnapshot, Week,
};
pub use domain::timer::InvalidTransition;
pub use infrastructure::config::TrackerConfig;
pub use infrastructure::error::TrackerError;
pub use infrastructure::repository::{InMemoryTrackerStore, TaskFilter, TrackerRepository, TrackerStore};
pub use infrastructure::sqlite_store::SqliteTrackerStore;
