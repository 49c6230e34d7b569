use crate::causes::{self, Category};
use crate::config::QuotaLimits;
use crate::error::CoreResult;
use crate::model::{iso, Absence, Teacher};
use crate::schedule::{
    business_days, days_of_month, weekday_index, year_bounds, CalendarExceptions, Expectation,
};
use crate::store::{self, AbsenceQuery};
use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// `absences / base * 100`, one decimal, capped at 100; zero when there is no base.
pub fn percentage(absences: u32, base: u32) -> f64 {
    if base == 0 {
        return 0.0;
    }
    let pct = absences as f64 / base as f64 * 100.0;
    ((pct * 10.0).round() / 10.0).min(100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthRow {
    pub month: u32,
    pub absences: u32,
    pub base_days: u32,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingRow {
    pub teacher_id: String,
    pub teacher_name: String,
    pub roles: Vec<String>,
    pub absences: u32,
    pub base_days: u32,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRow {
    pub date: String,
    pub absences: u32,
    pub expected: u32,
    pub percentage: f64,
}

/// Everything the institutional reports for one year read, fetched once.
#[derive(Debug, Clone)]
pub struct YearSnapshot {
    pub year: i32,
    pub teachers: Vec<Teacher>,
    pub absences: Vec<Absence>,
    pub exceptions: CalendarExceptions,
}

impl YearSnapshot {
    pub fn load(conn: &Connection, year: i32) -> CoreResult<Self> {
        let teachers = store::list_teachers(conn)?;
        let Some((from, to)) = year_bounds(year) else {
            return Ok(Self {
                year,
                teachers,
                absences: Vec::new(),
                exceptions: CalendarExceptions::default(),
            });
        };
        let absences = store::query_absences(conn, &AbsenceQuery::between(from, to))?;
        let exception_rows = store::exceptions_for_year(conn, year)?;
        debug!(
            year,
            teachers = teachers.len(),
            absences = absences.len(),
            exceptions = exception_rows.len(),
            "year snapshot loaded"
        );
        Ok(Self {
            year,
            teachers,
            absences,
            exceptions: exception_rows.into_iter().map(|e| e.date).collect(),
        })
    }

    fn absences_by_teacher_month(&self) -> HashMap<(&str, u32), u32> {
        let mut out = HashMap::new();
        for a in &self.absences {
            *out.entry((a.teacher_id.as_str(), a.date.month())).or_insert(0) += 1;
        }
        out
    }

    pub fn monthly(&self) -> Vec<MonthRow> {
        let expectations: Vec<Expectation> =
            self.teachers.iter().map(Expectation::for_teacher).collect();
        let mut by_month = [0u32; 12];
        for a in &self.absences {
            by_month[a.date.month0() as usize] += 1;
        }
        (1..=12u32)
            .map(|month| {
                let base_days = expectations
                    .iter()
                    .map(|e| e.base_days_in_month(self.year, month, &self.exceptions))
                    .sum();
                let absences = by_month[(month - 1) as usize];
                MonthRow {
                    month,
                    absences,
                    base_days,
                    percentage: percentage(absences, base_days),
                }
            })
            .collect()
    }

    /// Highest percentage first; equal percentages keep teacher listing order.
    pub fn ranking(&self) -> Vec<RankingRow> {
        let counts = self.absences_by_teacher_month();
        let mut rows: Vec<RankingRow> = self
            .teachers
            .iter()
            .map(|t| {
                let expectation = Expectation::for_teacher(t);
                let mut absences = 0;
                let mut base_days = 0;
                for month in 1..=12u32 {
                    absences += counts.get(&(t.id.as_str(), month)).copied().unwrap_or(0);
                    base_days += expectation.base_days_in_month(self.year, month, &self.exceptions);
                }
                RankingRow {
                    teacher_id: t.id.clone(),
                    teacher_name: t.display_name(),
                    roles: t.roles.clone(),
                    absences,
                    base_days,
                    percentage: percentage(absences, base_days),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
        rows
    }

    pub fn daily(&self) -> Vec<DayRow> {
        let expectations: Vec<Expectation> =
            self.teachers.iter().map(Expectation::for_teacher).collect();
        let mut by_date: HashMap<NaiveDate, u32> = HashMap::new();
        for a in &self.absences {
            *by_date.entry(a.date).or_insert(0) += 1;
        }
        let mut rows = Vec::new();
        for month in 1..=12u32 {
            for date in business_days(self.year, month, &self.exceptions) {
                let expected = expectations
                    .iter()
                    .filter(|e| e.is_expected(date, &self.exceptions))
                    .count() as u32;
                let absences = by_date.get(&date).copied().unwrap_or(0);
                rows.push(DayRow {
                    date: iso(date),
                    absences,
                    expected,
                    percentage: percentage(absences, expected),
                });
            }
        }
        rows
    }
}

pub fn monthly_institutional_report(conn: &Connection, year: i32) -> CoreResult<Vec<MonthRow>> {
    Ok(YearSnapshot::load(conn, year)?.monthly())
}

pub fn annual_ranking(conn: &Connection, year: i32) -> CoreResult<Vec<RankingRow>> {
    Ok(YearSnapshot::load(conn, year)?.ranking())
}

pub fn daily_institutional_report(conn: &Connection, year: i32) -> CoreResult<Vec<DayRow>> {
    Ok(YearSnapshot::load(conn, year)?.daily())
}

// ------------------------------------------------------- per-teacher sheets

pub fn category_totals(absences: &[Absence]) -> BTreeMap<Category, u32> {
    let mut totals: BTreeMap<Category, u32> = Category::ALL.iter().map(|c| (*c, 0)).collect();
    for a in absences {
        *totals.entry(causes::bucket(&a.cause)).or_insert(0) += 1;
    }
    totals
}

fn totals_json(totals: &BTreeMap<Category, u32>) -> serde_json::Value {
    let mut map: serde_json::Map<String, serde_json::Value> = totals
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), json!(v)))
        .collect();
    map.insert("sum".to_string(), json!(totals.values().sum::<u32>()));
    serde_json::Value::Object(map)
}

/// Category totals and the dated list for one teacher, optionally bounded.
pub fn teacher_summary(
    conn: &Connection,
    teacher_id: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> CoreResult<serde_json::Value> {
    let teacher = store::require_teacher(conn, teacher_id)?;
    let absences = store::query_absences(
        conn,
        &AbsenceQuery {
            teacher_id: Some(teacher.id.clone()),
            from,
            to,
        },
    )?;
    let list: Vec<serde_json::Value> = absences
        .iter()
        .map(|a| json!({ "date": iso(a.date), "cause": a.cause, "notes": a.notes }))
        .collect();
    Ok(json!({
        "teacher": teacher.to_json(),
        "period": {
            "from": from.map(iso).unwrap_or_default(),
            "to": to.map(iso).unwrap_or_default(),
        },
        "totals": totals_json(&category_totals(&absences)),
        "absences": list,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarCell {
    pub day: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'static str>,
}

/// Monday..Friday rows of one month. Calendar exceptions stay in the grid.
pub fn month_weeks(
    year: i32,
    month: u32,
    colors: &HashMap<NaiveDate, &'static str>,
) -> Vec<[Option<CalendarCell>; 5]> {
    let mut weeks = Vec::new();
    let mut current: [Option<CalendarCell>; 5] = Default::default();
    for date in days_of_month(year, month) {
        let wd = weekday_index(date);
        if wd >= 5 {
            continue;
        }
        if wd == 0 && current.iter().any(|c| c.is_some()) {
            weeks.push(std::mem::take(&mut current));
        }
        current[wd] = Some(CalendarCell {
            day: date.day(),
            color: colors.get(&date).copied(),
        });
    }
    if current.iter().any(|c| c.is_some()) {
        weeks.push(current);
    }
    weeks
}

pub fn teacher_calendar(
    conn: &Connection,
    teacher_id: &str,
    year: i32,
) -> CoreResult<serde_json::Value> {
    let teacher = store::require_teacher(conn, teacher_id)?;
    let absences = match year_bounds(year) {
        Some((from, to)) => {
            store::query_absences(conn, &AbsenceQuery::teacher_between(&teacher.id, from, to))?
        }
        None => Vec::new(),
    };
    let colors: HashMap<NaiveDate, &'static str> = absences
        .iter()
        .map(|a| (a.date, causes::color_for(&a.cause)))
        .collect();
    let months: Vec<serde_json::Value> = (1..=12u32)
        .map(|month| {
            json!({
                "month": month,
                "weeks": month_weeks(year, month, &colors),
            })
        })
        .collect();
    Ok(json!({
        "teacher": teacher.to_json(),
        "year": year,
        "months": months,
        "totals": totals_json(&category_totals(&absences)),
    }))
}

// ------------------------------------------------------------------ history

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub teacher_id: Option<String>,
    /// Substring matched against the normalized cause; "all" or empty disables it.
    pub cause: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

fn history_rows(conn: &Connection, filter: &HistoryFilter) -> CoreResult<Vec<Absence>> {
    let rows = store::query_absences(
        conn,
        &AbsenceQuery {
            teacher_id: filter.teacher_id.clone(),
            from: filter.from,
            to: filter.to,
        },
    )?;
    let needle = filter
        .cause
        .as_deref()
        .map(causes::normalize)
        .filter(|n| !n.is_empty() && n != "all");
    Ok(match needle {
        Some(n) => rows
            .into_iter()
            .filter(|a| causes::normalize(&a.cause).contains(&n))
            .collect(),
        None => rows,
    })
}

pub fn history_summary(
    conn: &Connection,
    limits: &QuotaLimits,
    filter: &HistoryFilter,
) -> CoreResult<serde_json::Value> {
    let rows = history_rows(conn, filter)?;
    let by_category: serde_json::Map<String, serde_json::Value> = category_totals(&rows)
        .into_iter()
        .map(|(k, v)| (k.as_str().to_string(), json!(v)))
        .collect();
    Ok(json!({
        "total": rows.len(),
        "limits": limits.to_json(),
        "byCategory": by_category,
    }))
}

/// Rows ordered by teacher (last name, first name) and then by date.
pub fn history_list(
    conn: &Connection,
    filter: &HistoryFilter,
) -> CoreResult<Vec<serde_json::Value>> {
    let rows = history_rows(conn, filter)?;
    let teachers: HashMap<String, Teacher> = store::list_teachers(conn)?
        .into_iter()
        .map(|t| (t.id.clone(), t))
        .collect();
    let sort_key = |a: &Absence| {
        let (last, first) = teachers
            .get(&a.teacher_id)
            .map(|t| (t.last_name.to_uppercase(), t.first_name.to_uppercase()))
            .unwrap_or_default();
        (last, first, a.date)
    };
    let mut keyed: Vec<_> = rows.into_iter().map(|a| (sort_key(&a), a)).collect();
    keyed.sort_by(|x, y| x.0.cmp(&y.0));
    Ok(keyed
        .into_iter()
        .map(|(_, a)| {
            let mut v = a.to_json();
            v["teacherName"] = json!(teachers
                .get(&a.teacher_id)
                .map(|t| t.display_name())
                .unwrap_or_default());
            v
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScheduleGrid;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    fn teacher(id: &str, last: &str, roles: &[&str]) -> Teacher {
        Teacher {
            id: id.to_string(),
            last_name: last.to_string(),
            first_name: "X".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            status: String::new(),
            grid: ScheduleGrid::default(),
        }
    }

    fn absence(teacher_id: &str, date: NaiveDate) -> Absence {
        Absence {
            id: format!("{teacher_id}-{date}"),
            teacher_id: teacher_id.to_string(),
            date,
            cause: "Enfermedad personal".to_string(),
            notes: String::new(),
            coverage: None,
            covered: false,
            coverage_kind: String::new(),
        }
    }

    #[test]
    fn percentage_rounds_and_caps() {
        assert_eq!(percentage(3, 23), 13.0);
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(5, 0), 0.0);
        assert_eq!(percentage(30, 20), 100.0);
    }

    #[test]
    fn monthly_report_for_single_group_a_teacher() {
        let snap = YearSnapshot {
            year: 2025,
            teachers: vec![teacher("t1", "Gomez", &["classroom-teacher"])],
            absences: vec![
                absence("t1", ymd(2025, 1, 6)),
                absence("t1", ymd(2025, 1, 7)),
                absence("t1", ymd(2025, 1, 8)),
            ],
            exceptions: CalendarExceptions::default(),
        };
        let rows = snap.monthly();
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].base_days, 23);
        assert_eq!(rows[0].absences, 3);
        assert_eq!(rows[0].percentage, 13.0);
        assert_eq!(rows[1].absences, 0);
        assert_eq!(rows[1].percentage, 0.0);
    }

    #[test]
    fn ranking_is_descending_and_stable() {
        let snap = YearSnapshot {
            year: 2025,
            teachers: vec![
                teacher("a", "Alvarez", &["principal"]),
                teacher("b", "Benitez", &["principal"]),
                teacher("c", "Castro", &["principal"]),
            ],
            absences: vec![absence("b", ymd(2025, 2, 3)), absence("b", ymd(2025, 2, 4))],
            exceptions: CalendarExceptions::default(),
        };
        let rows = snap.ranking();
        let order: Vec<&str> = rows.iter().map(|r| r.teacher_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(rows[0].absences, 2);
        assert_eq!(rows[1].percentage, 0.0);
    }

    #[test]
    fn daily_report_skips_exceptions_and_counts_expected() {
        let holiday = ymd(2025, 1, 1);
        let mut sub = teacher("s", "Suarez", &["substitute-teacher"]);
        let mut rows = vec![vec![String::new(); 5]; 5];
        rows[0][1] = "3A".to_string(); // Tuesday
        sub.grid = ScheduleGrid::from_json(&json!(rows)).expect("grid");
        let snap = YearSnapshot {
            year: 2025,
            teachers: vec![teacher("a", "Alvarez", &["principal"]), sub],
            absences: vec![absence("a", ymd(2025, 1, 7))],
            exceptions: [holiday].into_iter().collect(),
        };
        let days = snap.daily();
        assert!(days.iter().all(|d| d.date != "2025-01-01"));
        let tue = days.iter().find(|d| d.date == "2025-01-07").expect("tuesday");
        assert_eq!(tue.expected, 2);
        assert_eq!(tue.absences, 1);
        assert_eq!(tue.percentage, 50.0);
        let wed = days.iter().find(|d| d.date == "2025-01-08").expect("wednesday");
        assert_eq!(wed.expected, 1);
    }

    #[test]
    fn month_weeks_break_on_monday() {
        let colors: HashMap<NaiveDate, &'static str> =
            [(ymd(2025, 1, 3), causes::COLOR_RED)].into_iter().collect();
        let weeks = month_weeks(2025, 1, &colors);
        // Jan 2025 starts on a Wednesday and ends on a Friday.
        assert_eq!(weeks.len(), 5);
        assert!(weeks[0][0].is_none());
        assert!(weeks[0][1].is_none());
        assert_eq!(weeks[0][2].as_ref().map(|c| c.day), Some(1));
        assert_eq!(weeks[0][4].as_ref().and_then(|c| c.color), Some(causes::COLOR_RED));
        assert_eq!(weeks[4][4].as_ref().map(|c| c.day), Some(31));
    }

    #[test]
    fn category_totals_cover_every_bucket() {
        let mut a = absence("t", ymd(2025, 3, 3));
        a.cause = "Paro".to_string();
        let totals = category_totals(&[a, absence("t", ymd(2025, 3, 4))]);
        assert_eq!(totals.len(), Category::ALL.len());
        assert_eq!(totals[&Category::LaborStoppage], 1);
        assert_eq!(totals[&Category::PersonalIllness], 1);
        let v = totals_json(&totals);
        assert_eq!(v["sum"], json!(2));
    }
}
