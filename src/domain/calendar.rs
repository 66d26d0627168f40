use crate::domain::models::{Day, EntityId, Week};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_DAYS_PER_WEEK: u32 = 6;

/// Which dates count as working days when a plan is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkCalendar {
    pub work_days: Vec<Weekday>,
    pub holidays: BTreeSet<NaiveDate>,
    /// Work days one planned week spans.
    pub days_per_week: u32,
}

impl Default for WorkCalendar {
    fn default() -> Self {
        Self {
            work_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            holidays: BTreeSet::new(),
            days_per_week: DEFAULT_DAYS_PER_WEEK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WorkCalendar {
    pub fn validate(&self) -> Result<(), String> {
        if self.work_days.is_empty() {
            return Err("workDays must name at least one weekday".to_string());
        }
        if self.days_per_week == 0 {
            return Err("daysPerWeek must be >= 1".to_string());
        }
        Ok(())
    }

    pub fn is_work_day(&self, date: NaiveDate) -> bool {
        self.work_days.contains(&date.weekday()) && !self.holidays.contains(&date)
    }

    /// `date` itself when it is a work day, otherwise the first one after it.
    pub fn next_work_day(&self, date: NaiveDate) -> NaiveDate {
        if self.work_days.is_empty() {
            return date;
        }
        let mut current = date;
        while !self.is_work_day(current) {
            match current.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// Moves onto a work day first, then counts `count` further work days.
    pub fn add_work_days(&self, start: NaiveDate, count: u32) -> NaiveDate {
        let mut current = self.next_work_day(start);
        if self.work_days.is_empty() {
            return current;
        }
        let mut remaining = count;
        while remaining > 0 {
            let Some(next) = current.succ_opt() else {
                break;
            };
            current = next;
            if self.is_work_day(current) {
                remaining -= 1;
            }
        }
        current
    }

    pub fn work_days_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|date| *date <= end)
            .filter(|date| self.is_work_day(*date))
            .collect()
    }

    /// First and last date of a week holding `days_per_week` work days.
    pub fn week_span(&self, start: NaiveDate) -> DateSpan {
        let start = self.next_work_day(start);
        DateSpan {
            start,
            end: self.add_work_days(start, self.days_per_week.saturating_sub(1)),
        }
    }
}

/// Planned dates for a run of weeks laid end to end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulePlan {
    pub weeks: BTreeMap<EntityId, DateSpan>,
    pub days: BTreeMap<EntityId, NaiveDate>,
}

/// Lays `weeks` (in roadmap order) out from `start`. Each week's days take
/// its work days in day-number order; days beyond the week's work days keep
/// counting work days past its end.
pub fn plan_schedule(
    calendar: &WorkCalendar,
    start: NaiveDate,
    weeks: &[Week],
    days: &[Day],
) -> SchedulePlan {
    let mut plan = SchedulePlan::default();
    let mut cursor = start;

    for week in weeks {
        let span = calendar.week_span(cursor);
        let work_days = calendar.work_days_between(span.start, span.end);

        let mut week_days = days
            .iter()
            .filter(|day| day.week_id == week.id)
            .collect::<Vec<_>>();
        week_days.sort_by_key(|day| (day.number, day.id));
        for (index, day) in week_days.into_iter().enumerate() {
            let date = work_days.get(index).copied().unwrap_or_else(|| {
                calendar.add_work_days(span.start, u32::try_from(index).unwrap_or(u32::MAX))
            });
            plan.days.insert(day.id, date);
        }

        plan.weeks.insert(week.id, span);
        cursor = span.end.succ_opt().unwrap_or(span.end);
    }
    plan
}
