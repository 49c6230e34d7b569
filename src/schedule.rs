use crate::model::{ScheduleGrid, Teacher, GRID_SLOTS, GRID_WEEKDAYS};
use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;

/// Holidays and suspension days; nobody is expected on these.
#[derive(Debug, Clone, Default)]
pub struct CalendarExceptions(HashSet<NaiveDate>);

impl CalendarExceptions {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.0.contains(&date)
    }
}

impl FromIterator<NaiveDate> for CalendarExceptions {
    fn from_iter<I: IntoIterator<Item = NaiveDate>>(iter: I) -> Self {
        CalendarExceptions(iter.into_iter().collect())
    }
}

/// Monday = 0 .. Sunday = 6.
pub fn weekday_index(date: NaiveDate) -> usize {
    date.weekday().num_days_from_monday() as usize
}

/// Jan 1 and Dec 31 of `year`, or `None` outside chrono's range.
pub fn year_bounds(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

/// First and last day of the month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

pub fn days_of_month(year: i32, month: u32) -> Vec<NaiveDate> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };
    first
        .iter_days()
        .take_while(|d| d.month() == month)
        .collect()
}

/// Monday to Friday days of the month that are not calendar exceptions.
pub fn business_days(year: i32, month: u32, exceptions: &CalendarExceptions) -> Vec<NaiveDate> {
    days_of_month(year, month)
        .into_iter()
        .filter(|d| weekday_index(*d) < 5 && !exceptions.contains(*d))
        .collect()
}

/// Weekday columns holding at least one non-blank cell.
pub fn schedule_weekdays(grid: &ScheduleGrid) -> [bool; GRID_WEEKDAYS] {
    let mut days = [false; GRID_WEEKDAYS];
    for (weekday, scheduled) in days.iter_mut().enumerate() {
        *scheduled = (0..GRID_SLOTS).any(|slot| !grid.cell(slot, weekday).trim().is_empty());
    }
    days
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// On site every business day.
    Weekdays,
    /// On site only on the listed weekday columns of the timetable.
    Timetable([bool; GRID_WEEKDAYS]),
}

impl Expectation {
    pub fn for_teacher(teacher: &Teacher) -> Self {
        if teacher.is_substitute_only() {
            Expectation::Timetable(schedule_weekdays(&teacher.grid))
        } else {
            Expectation::Weekdays
        }
    }

    fn covers_weekday(&self, weekday: usize) -> bool {
        match self {
            Expectation::Weekdays => weekday < 5,
            Expectation::Timetable(days) => days.get(weekday).copied().unwrap_or(false),
        }
    }

    pub fn is_expected(&self, date: NaiveDate, exceptions: &CalendarExceptions) -> bool {
        !exceptions.contains(date) && self.covers_weekday(weekday_index(date))
    }

    pub fn base_days_in_month(
        &self,
        year: i32,
        month: u32,
        exceptions: &CalendarExceptions,
    ) -> u32 {
        if let Expectation::Timetable(days) = self {
            if !days.iter().any(|d| *d) {
                return 0;
            }
        }
        business_days(year, month, exceptions)
            .into_iter()
            .filter(|d| self.covers_weekday(weekday_index(*d)))
            .count() as u32
    }
}

pub fn is_expected(teacher: &Teacher, date: NaiveDate, exceptions: &CalendarExceptions) -> bool {
    Expectation::for_teacher(teacher).is_expected(date, exceptions)
}

pub fn base_days_in_month(
    teacher: &Teacher,
    year: i32,
    month: u32,
    exceptions: &CalendarExceptions,
) -> u32 {
    Expectation::for_teacher(teacher).base_days_in_month(year, month, exceptions)
}
