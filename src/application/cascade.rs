use crate::domain::aggregation::{OrphanContainer, aggregate_day, aggregate_phase, aggregate_week};
use crate::domain::models::{Day, EntityId, EntityKind, Phase, Task, Week};
use crate::infrastructure::error::TrackerError;
use crate::infrastructure::repository::{TaskFilter, TrackerRepository};
use serde::Serialize;

/// Containers recomputed by one cascade, plus any broken parent links met
/// on the way up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub day: Option<Day>,
    pub week: Option<Week>,
    pub phase: Option<Phase>,
    pub orphans: Vec<OrphanContainer>,
}

impl CascadeReport {
    fn record_orphan(
        &mut self,
        kind: EntityKind,
        id: EntityId,
        parent_kind: EntityKind,
        parent_id: EntityId,
    ) {
        let orphan = OrphanContainer {
            kind,
            id,
            parent_kind,
            parent_id,
        };
        tracing::warn!(%orphan, "skipping roll-up above orphaned entity");
        self.orphans.push(orphan);
    }
}

pub fn refresh_day(repo: &mut dyn TrackerRepository, day_id: EntityId) -> Result<Day, TrackerError> {
    let mut day = repo
        .day(day_id)?
        .ok_or(TrackerError::not_found(EntityKind::Day, day_id))?;
    let tasks = repo.tasks(&TaskFilter::in_day(day_id))?;
    day.rollup = aggregate_day(&tasks);
    repo.save_day(&day)?;
    Ok(day)
}

pub fn refresh_week(repo: &mut dyn TrackerRepository, week_id: EntityId) -> Result<Week, TrackerError> {
    let mut week = repo
        .week(week_id)?
        .ok_or(TrackerError::not_found(EntityKind::Week, week_id))?;
    let days = repo.days(Some(week_id))?;
    let loose_tasks = repo.tasks(&TaskFilter::loose_in_week(week_id))?;
    week.rollup = aggregate_week(&days, &loose_tasks);
    repo.save_week(&week)?;
    Ok(week)
}

pub fn refresh_phase(repo: &mut dyn TrackerRepository, phase_id: EntityId) -> Result<Phase, TrackerError> {
    let mut phase = repo
        .phase(phase_id)?
        .ok_or(TrackerError::not_found(EntityKind::Phase, phase_id))?;
    let weeks = repo.weeks(Some(phase_id))?;
    phase.rollup = aggregate_phase(&weeks);
    repo.save_phase(&phase)?;
    Ok(phase)
}

/// Day (when the task has one), then Week, then Phase. A missing Day does
/// not stop the Week from being refreshed.
pub fn cascade_from_task(repo: &mut dyn TrackerRepository, task: &Task) -> Result<CascadeReport, TrackerError> {
    let mut report = CascadeReport::default();
    if let Some(day_id) = task.day_id {
        if repo.day(day_id)?.is_some() {
            report.day = Some(refresh_day(repo, day_id)?);
        } else {
            report.record_orphan(EntityKind::Task, task.id, EntityKind::Day, day_id);
        }
    }
    cascade_week(repo, &mut report, EntityKind::Task, task.id, task.week_id)?;
    Ok(report)
}

pub fn cascade_from_day(repo: &mut dyn TrackerRepository, day_id: EntityId) -> Result<CascadeReport, TrackerError> {
    let day = refresh_day(repo, day_id)?;
    let week_id = day.week_id;
    let mut report = CascadeReport {
        day: Some(day),
        ..CascadeReport::default()
    };
    cascade_week(repo, &mut report, EntityKind::Day, day_id, week_id)?;
    Ok(report)
}

pub fn cascade_from_week(repo: &mut dyn TrackerRepository, week_id: EntityId) -> Result<CascadeReport, TrackerError> {
    let week = refresh_week(repo, week_id)?;
    let phase_id = week.phase_id;
    let mut report = CascadeReport {
        week: Some(week),
        ..CascadeReport::default()
    };
    cascade_phase(repo, &mut report, EntityKind::Week, week_id, phase_id)?;
    Ok(report)
}

/// Roll-up after a child of `week_id` went away.
pub fn cascade_into_week(
    repo: &mut dyn TrackerRepository,
    child_kind: EntityKind,
    child_id: EntityId,
    week_id: EntityId,
) -> Result<CascadeReport, TrackerError> {
    let mut report = CascadeReport::default();
    cascade_week(repo, &mut report, child_kind, child_id, week_id)?;
    Ok(report)
}

/// Roll-up after a week of `phase_id` went away.
pub fn cascade_into_phase(
    repo: &mut dyn TrackerRepository,
    week_id: EntityId,
    phase_id: EntityId,
) -> Result<CascadeReport, TrackerError> {
    let mut report = CascadeReport::default();
    cascade_phase(repo, &mut report, EntityKind::Week, week_id, phase_id)?;
    Ok(report)
}

fn cascade_week(
    repo: &mut dyn TrackerRepository,
    report: &mut CascadeReport,
    child_kind: EntityKind,
    child_id: EntityId,
    week_id: EntityId,
) -> Result<(), TrackerError> {
    if repo.week(week_id)?.is_none() {
        report.record_orphan(child_kind, child_id, EntityKind::Week, week_id);
        return Ok(());
    }
    let week = refresh_week(repo, week_id)?;
    let phase_id = week.phase_id;
    report.week = Some(week);
    cascade_phase(repo, report, EntityKind::Week, week_id, phase_id)
}

fn cascade_phase(
    repo: &mut dyn TrackerRepository,
    report: &mut CascadeReport,
    child_kind: EntityKind,
    child_id: EntityId,
    phase_id: EntityId,
) -> Result<(), TrackerError> {
    if repo.phase(phase_id)?.is_none() {
        report.record_orphan(child_kind, child_id, EntityKind::Phase, phase_id);
        return Ok(());
    }
    report.phase = Some(refresh_phase(repo, phase_id)?);
    Ok(())
}
