use crate::causes::{self, Category};
use crate::config::QuotaLimits;
use crate::error::{CoreError, CoreResult};
use crate::model::{parse_date, Absence, Coverage};
use crate::quota;
use crate::schedule::month_bounds;
use crate::store::{self, AbsenceQuery};
use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Longest range accepted in one registration.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Categories whose annual overage is recorded anyway, with a warning.
const SOFT_LIMITED: [Category; 3] = [
    Category::PersonalIllness,
    Category::FamilyIllness,
    Category::PreExam,
];

#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub teacher_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub cause: String,
    pub notes: String,
    pub coverage: Option<Coverage>,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub ids: Vec<String>,
    pub category: Category,
    pub warning: Option<String>,
}

impl Registration {
    pub fn inserted(&self) -> usize {
        self.ids.len()
    }
}

/// Inclusive range; `to` defaults to `from` and a reversed range is swapped.
pub fn resolve_range(from: Option<&str>, to: Option<&str>) -> CoreResult<(NaiveDate, NaiveDate)> {
    let from = from
        .and_then(parse_date)
        .ok_or_else(|| CoreError::validation("date required"))?;
    let to = match to.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_date(raw)
            .ok_or_else(|| CoreError::validation("date_to must be YYYY-MM-DD or DD/MM/YYYY"))?,
        None => from,
    };
    let (from, to) = if to < from { (to, from) } else { (from, to) };
    if (to - from).num_days() >= MAX_RANGE_DAYS {
        return Err(CoreError::validation(format!(
            "date range longer than {MAX_RANGE_DAYS} days"
        )));
    }
    Ok((from, to))
}

/// First month of `from..=to` whose personal-matters days, added to those
/// already `recorded`, would exceed `cap`. Returns the "YYYY-MM" key and the
/// first range date falling in that month.
pub fn personal_matters_overflow(
    recorded: &BTreeMap<String, u32>,
    from: NaiveDate,
    to: NaiveDate,
    cap: u32,
) -> Option<(String, NaiveDate)> {
    let mut requested: BTreeMap<String, (u32, NaiveDate)> = BTreeMap::new();
    for date in from.iter_days().take_while(|d| *d <= to) {
        requested
            .entry(quota::month_key(date.year(), date.month()))
            .or_insert((0, date))
            .0 += 1;
    }
    requested.into_iter().find_map(|(month, (days, first))| {
        let total = recorded.get(&month).copied().unwrap_or(0) + days;
        (total > cap).then_some((month, first))
    })
}

fn day_first(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn register(
    conn: &Connection,
    limits: &QuotaLimits,
    req: &RegisterRequest,
) -> CoreResult<Registration> {
    let teacher_id = req
        .teacher_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::validation("teacher required"))?;
    let (from, to) = resolve_range(req.date_from.as_deref(), req.date_to.as_deref())?;
    let cause = req.cause.trim().to_string();
    if cause.is_empty() {
        return Err(CoreError::validation("cause required"));
    }
    let teacher = store::require_teacher(conn, teacher_id)?;

    let category = causes::bucket(&cause);
    let status = quota::remaining_quota(conn, limits, &teacher.id, from)?;

    if category == Category::PersonalMatters {
        let (month_start, month_end) = match (
            month_bounds(from.year(), from.month()),
            month_bounds(to.year(), to.month()),
        ) {
            (Some((start, _)), Some((_, end))) => (start, end),
            _ => (from, to),
        };
        let existing = store::query_absences(
            conn,
            &AbsenceQuery::teacher_between(&teacher.id, month_start, month_end),
        )?;
        let recorded = quota::personal_matters_by_month(&existing);
        if let Some((month, first)) =
            personal_matters_overflow(&recorded, from, to, limits.personal_matters_per_month)
        {
            warn!(teacher = %teacher.id, month = %month, "personal-matters monthly cap reached");
            return Err(CoreError::conflict(
                format!(
                    "personal-matters cap reached for {month}: {} already recorded, \
                     only {} per month is allowed",
                    recorded.get(&month).copied().unwrap_or(0),
                    limits.personal_matters_per_month
                ),
                Some(first),
            ));
        }
    }

    let mut warning = None;
    if SOFT_LIMITED.contains(&category) && status.remaining(category).unwrap_or(1) == 0 {
        let limit = limits.annual(category).unwrap_or(0);
        warning = Some(format!(
            "teacher exceeded the {} quota (limit: {}); absence recorded anyway, \
             payroll deduction applies",
            category.as_str(),
            limit
        ));
    }

    let mut rows = Vec::new();
    for date in from.iter_days().take_while(|d| *d <= to) {
        if store::absence_on(conn, &teacher.id, date)?.is_some() {
            warn!(teacher = %teacher.id, date = %date, "duplicate absence rejected");
            return Err(CoreError::conflict(
                format!(
                    "an absence is already recorded for this teacher on {}",
                    day_first(date)
                ),
                Some(date),
            ));
        }
        rows.push(Absence {
            id: store::new_id(),
            teacher_id: teacher.id.clone(),
            date,
            cause: cause.clone(),
            notes: req.notes.trim().to_string(),
            coverage: req.coverage.clone().filter(|c| !c.is_empty()),
            covered: false,
            coverage_kind: String::new(),
        });
    }

    store::insert_absences(conn, &rows)?;
    info!(
        teacher = %teacher.id,
        from = %from,
        to = %to,
        inserted = rows.len(),
        category = category.as_str(),
        warned = warning.is_some(),
        "absences registered"
    );

    Ok(Registration {
        ids: rows.into_iter().map(|a| a.id).collect(),
        category,
        warning,
    })
}

/// Field patch for a recorded absence. The teacher cannot be changed.
#[derive(Debug, Clone, Default)]
pub struct AbsencePatch {
    pub date: Option<NaiveDate>,
    pub cause: Option<String>,
    pub notes: Option<String>,
    pub coverage: Option<Coverage>,
    pub covered: Option<bool>,
    pub coverage_kind: Option<String>,
}

impl AbsencePatch {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.cause.is_none()
            && self.notes.is_none()
            && self.coverage.is_none()
            && self.covered.is_none()
            && self.coverage_kind.is_none()
    }
}

/// Applies `patch` to an existing absence and returns the stored row.
pub fn amend(conn: &Connection, absence_id: &str, patch: &AbsencePatch) -> CoreResult<Absence> {
    if patch.is_empty() {
        return Err(CoreError::validation("no changes"));
    }
    let mut a = store::get_absence(conn, absence_id)?.ok_or(CoreError::NotFound("absence"))?;

    if let Some(date) = patch.date.filter(|d| *d != a.date) {
        if let Some(other) = store::absence_on(conn, &a.teacher_id, date)? {
            if other != a.id {
                return Err(CoreError::conflict(
                    format!(
                        "an absence is already recorded for this teacher on {}",
                        day_first(date)
                    ),
                    Some(date),
                ));
            }
        }
        a.date = date;
    }
    if let Some(cause) = &patch.cause {
        let cause = cause.trim();
        if cause.is_empty() {
            return Err(CoreError::validation("cause must not be empty"));
        }
        a.cause = cause.to_string();
    }
    if let Some(notes) = &patch.notes {
        a.notes = notes.trim().to_string();
    }
    if let Some(coverage) = &patch.coverage {
        a.coverage = Some(coverage.clone()).filter(|c| !c.is_empty());
    }
    if let Some(covered) = patch.covered {
        a.covered = covered;
    }
    if let Some(kind) = &patch.coverage_kind {
        a.coverage_kind = kind.trim().to_uppercase();
    }

    store::update_absence(conn, &a)?;
    info!(absence = %a.id, teacher = %a.teacher_id, date = %a.date, "absence updated");
    Ok(a)
}
