use crate::causes::{self, Category};
use crate::config::QuotaLimits;
use crate::error::CoreResult;
use crate::model::Absence;
use crate::schedule::year_bounds;
use crate::store::{self, AbsenceQuery};
use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeMap;

pub fn month_key(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

/// Personal-matters absences per "YYYY-MM" among `absences`.
pub fn personal_matters_by_month(absences: &[Absence]) -> BTreeMap<String, u32> {
    let mut by_month = BTreeMap::new();
    for a in absences {
        if causes::bucket(&a.cause) == Category::PersonalMatters {
            *by_month
                .entry(month_key(a.date.year(), a.date.month()))
                .or_insert(0) += 1;
        }
    }
    by_month
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuotaStatus {
    pub consumed: BTreeMap<Category, u32>,
    pub remaining: BTreeMap<Category, u32>,
    /// "YYYY-MM" -> whether the personal-matters allowance for that month is used up.
    pub personal_matters_months_full: BTreeMap<String, bool>,
}

impl QuotaStatus {
    pub fn remaining(&self, category: Category) -> Option<u32> {
        self.remaining.get(&category).copied()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let by_name = |m: &BTreeMap<Category, u32>| {
            m.iter()
                .map(|(k, v)| (k.as_str().to_string(), json!(v)))
                .collect::<serde_json::Map<_, _>>()
        };
        json!({
            "consumed": by_name(&self.consumed),
            "remaining": by_name(&self.remaining),
            "personalMattersMonthsFull": self.personal_matters_months_full,
        })
    }
}

/// Counts a year's worth of absences against the limits. The caller picks the
/// window; every record passed in is counted.
pub fn tally(limits: &QuotaLimits, absences: &[Absence]) -> QuotaStatus {
    let mut consumed: BTreeMap<Category, u32> =
        Category::ALL.iter().map(|c| (*c, 0)).collect();

    for a in absences {
        let normalized = causes::normalize(&a.cause);
        let category = causes::classify(&normalized);
        *consumed.entry(category).or_insert(0) += 1;
        // A pre-exam day filed under another heading still uses pre-exam allowance.
        if category != Category::PreExam && causes::is_pre_exam(&normalized) {
            *consumed.entry(Category::PreExam).or_insert(0) += 1;
        }
    }

    let remaining = QuotaLimits::LIMITED
        .iter()
        .filter_map(|c| {
            limits.annual(*c).map(|limit| {
                let used = consumed.get(c).copied().unwrap_or(0);
                (*c, limit.saturating_sub(used))
            })
        })
        .collect();

    let personal_matters_months_full = personal_matters_by_month(absences)
        .into_iter()
        .map(|(k, n)| (k, n >= limits.personal_matters_per_month))
        .collect();

    QuotaStatus {
        consumed,
        remaining,
        personal_matters_months_full,
    }
}

/// Quota position of a teacher for the calendar year containing `reference`.
pub fn remaining_quota(
    conn: &Connection,
    limits: &QuotaLimits,
    teacher_id: &str,
    reference: NaiveDate,
) -> CoreResult<QuotaStatus> {
    store::require_teacher(conn, teacher_id)?;
    let Some((from, to)) = year_bounds(reference.year()) else {
        return Ok(tally(limits, &[]));
    };
    let absences =
        store::query_absences(conn, &AbsenceQuery::teacher_between(teacher_id, from, to))?;
    Ok(tally(limits, &absences))
}
