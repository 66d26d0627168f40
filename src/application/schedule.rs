use crate::domain::calendar::{WorkCalendar, plan_schedule};
use crate::domain::models::{EntityId, Week};
use crate::infrastructure::error::TrackerError;
use crate::infrastructure::repository::TrackerRepository;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleOutcome {
    pub start: NaiveDate,
    pub weeks_planned: usize,
    pub days_planned: usize,
}

/// True once any week carries a planned start.
pub fn is_planned(repo: &dyn TrackerRepository) -> Result<bool, TrackerError> {
    Ok(repo.weeks(None)?.iter().any(|week| week.start_date.is_some()))
}

/// Weeks in roadmap order: week number first, then phase and id.
fn roadmap_weeks(repo: &dyn TrackerRepository) -> Result<Vec<Week>, TrackerError> {
    let mut weeks = repo.weeks(None)?;
    weeks.sort_by_key(|week| (week.number, week.phase_id, week.id));
    Ok(weeks)
}

/// Lays planned dates out from `start`. With `from_phase`, only weeks from
/// that phase's first week onwards move; earlier weeks keep their dates.
/// Every phase that owns a planned week gets the span of its weeks.
pub fn replan(
    repo: &mut dyn TrackerRepository,
    calendar: &WorkCalendar,
    start: NaiveDate,
    from_phase: Option<EntityId>,
) -> Result<ScheduleOutcome, TrackerError> {
    let mut weeks = roadmap_weeks(repo)?;
    if let Some(phase_id) = from_phase {
        let first_number = weeks
            .iter()
            .filter(|week| week.phase_id == phase_id)
            .map(|week| week.number)
            .min();
        match first_number {
            Some(first_number) => weeks.retain(|week| week.number >= first_number),
            None => weeks.clear(),
        }
    }

    let days = repo.days(None)?;
    let plan = plan_schedule(calendar, start, &weeks, &days);

    for mut week in weeks {
        let Some(span) = plan.weeks.get(&week.id) else {
            continue;
        };
        week.start_date = Some(span.start);
        week.end_date = Some(span.end);
        repo.save_week(&week)?;
    }
    for mut day in days {
        let Some(date) = plan.days.get(&day.id) else {
            continue;
        };
        day.scheduled_date = Some(*date);
        repo.save_day(&day)?;
    }
    refresh_phase_spans(repo)?;

    tracing::info!(
        %start,
        from_phase = ?from_phase,
        weeks = plan.weeks.len(),
        days = plan.days.len(),
        "planned schedule dates"
    );
    Ok(ScheduleOutcome {
        start,
        weeks_planned: plan.weeks.len(),
        days_planned: plan.days.len(),
    })
}

/// Phase start/end follow the earliest and latest planned week.
pub fn refresh_phase_spans(repo: &mut dyn TrackerRepository) -> Result<(), TrackerError> {
    for mut phase in repo.phases()? {
        let weeks = repo.weeks(Some(phase.id))?;
        let start = weeks.iter().filter_map(|week| week.start_date).min();
        let end = weeks.iter().filter_map(|week| week.end_date).max();
        if start.is_none() && end.is_none() {
            continue;
        }
        if (phase.start_date, phase.end_date) != (start, end) {
            phase.start_date = start;
            phase.end_date = end;
            repo.save_phase(&phase)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Day, Phase};
    use crate::infrastructure::repository::{InMemoryTrackerStore, TrackerStore};

    fn date(value: &str) -> NaiveDate {
        value.parse().expect("valid date")
    }

    struct Roadmap {
        first_phase: EntityId,
        second_phase: EntityId,
        weeks: [EntityId; 3],
        day: EntityId,
    }

    fn roadmap(store: &InMemoryTrackerStore) -> Roadmap {
        store
            .write(|repo| {
                let first_phase = repo.insert_phase(&Phase::new("Foundations", None))?;
                let second_phase = repo.insert_phase(&Phase::new("Drivers", None))?;
                let week_one = repo.insert_week(&Week::new(first_phase, 1, None))?;
                let week_three = repo.insert_week(&Week::new(second_phase, 3, None))?;
                let week_two = repo.insert_week(&Week::new(first_phase, 2, None))?;
                let day = repo.insert_day(&Day::new(week_three, 1, None))?;
                Ok(Roadmap {
                    first_phase,
                    second_phase,
                    weeks: [week_one, week_two, week_three],
                    day,
                })
            })
            .expect("seed roadmap")
    }

    #[test]
    fn replan_orders_weeks_by_number_and_spans_phases() {
        let store = InMemoryTrackerStore::default();
        let ids = roadmap(&store);
        let calendar = WorkCalendar::default();

        let outcome = store
            .write(|repo| {
                assert!(!is_planned(repo)?);
                replan(repo, &calendar, date("2026-02-14"), None)
            })
            .expect("replan");
        assert_eq!(outcome.weeks_planned, 3);
        assert_eq!(outcome.days_planned, 1);

        store
            .read(|repo| {
                assert!(is_planned(repo)?);
                let starts = ids
                    .weeks
                    .iter()
                    .map(|id| repo.week(*id).map(|week| week.and_then(|week| week.start_date)))
                    .collect::<Result<Vec<_>, _>>()?;
                assert_eq!(
                    starts,
                    vec![
                        Some(date("2026-02-16")),
                        Some(date("2026-02-24")),
                        Some(date("2026-03-04")),
                    ]
                );
                let first = repo.phase(ids.first_phase)?.expect("phase exists");
                assert_eq!(first.start_date, Some(date("2026-02-16")));
                assert_eq!(first.end_date, Some(date("2026-03-03")));
                let second = repo.phase(ids.second_phase)?.expect("phase exists");
                assert_eq!(second.start_date, Some(date("2026-03-04")));
                let day = repo.day(ids.day)?.expect("day exists");
                assert_eq!(day.scheduled_date, Some(date("2026-03-04")));
                Ok(())
            })
            .expect("inspect plan");
    }

    #[test]
    fn replan_from_phase_keeps_earlier_weeks() {
        let store = InMemoryTrackerStore::default();
        let ids = roadmap(&store);
        let calendar = WorkCalendar::default();

        store
            .write(|repo| replan(repo, &calendar, date("2026-02-16"), None))
            .expect("initial plan");
        let outcome = store
            .write(|repo| replan(repo, &calendar, date("2026-04-01"), Some(ids.second_phase)))
            .expect("shift second phase");
        assert_eq!(outcome.weeks_planned, 1);

        store
            .read(|repo| {
                let week_one = repo.week(ids.weeks[0])?.expect("week exists");
                assert_eq!(week_one.start_date, Some(date("2026-02-16")));
                let week_three = repo.week(ids.weeks[2])?.expect("week exists");
                assert_eq!(week_three.start_date, Some(date("2026-04-01")));
                let second = repo.phase(ids.second_phase)?.expect("phase exists");
                assert_eq!(second.start_date, Some(date("2026-04-01")));
                Ok(())
            })
            .expect("inspect plan");

        let untouched = store
            .write(|repo| replan(repo, &calendar, date("2026-05-01"), Some(99)))
            .expect("phase without weeks");
        assert_eq!(untouched.weeks_planned, 0);
    }
}
