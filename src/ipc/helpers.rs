use crate::config::Config;
use crate::error::CoreError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{iso, parse_date};
use chrono::{Datelike, Local, NaiveDate};
use rusqlite::Connection;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<CoreError> for HandlerErr {
    fn from(e: CoreError) -> Self {
        let details = match &e {
            CoreError::Conflict {
                date: Some(date), ..
            } => Some(json!({ "blocking": true, "date": iso(*date) })),
            e if e.is_blocking() => Some(json!({ "blocking": true })),
            _ => None,
        };
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

/// Runs `f` against the open workspace, or answers `no_workspace`.
pub fn with_db(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &Config) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &state.config) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    get_opt_str(params, key).ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Trimmed string value; blank counts as absent.
pub fn get_opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Like `get_opt_str`, but keeps an explicit empty string so a patch can clear a field.
pub fn get_patch_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
}

pub fn get_opt_date(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<NaiveDate>, HandlerErr> {
    match get_opt_str(params, key) {
        None => Ok(None),
        Some(raw) => parse_date(&raw).map(Some).ok_or_else(|| {
            HandlerErr::bad_params(format!("{} must be YYYY-MM-DD or DD/MM/YYYY", key))
        }),
    }
}

pub fn get_required_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    get_opt_date(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// `params.year` as a number or numeric string; defaults to the current year.
pub fn get_year(params: &serde_json::Value) -> Result<i32, HandlerErr> {
    let year = match params.get("year") {
        None | Some(serde_json::Value::Null) => return Ok(Local::now().year()),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(v) => v.as_i64(),
    };
    year.filter(|y| (1900..=9999).contains(y))
        .map(|y| y as i32)
        .ok_or_else(|| HandlerErr::bad_params("year must be a number between 1900 and 9999"))
}

/// `params.month` (1..12) as a number or numeric string.
pub fn get_month(params: &serde_json::Value) -> Result<u32, HandlerErr> {
    let month = match params.get("month") {
        Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(v) => v.as_u64(),
        None => None,
    };
    month
        .filter(|m| (1..=12).contains(m))
        .map(|m| m as u32)
        .ok_or_else(|| HandlerErr::bad_params("month must be 1..12"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_details_carry_the_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).expect("date");
        let e: HandlerErr = CoreError::conflict("taken", Some(date)).into();
        assert_eq!(e.code, "conflict");
        assert_eq!(e.details, Some(json!({ "blocking": true, "date": "2025-03-10" })));
    }

    #[test]
    fn not_found_is_not_blocking() {
        let e: HandlerErr = CoreError::NotFound("teacher").into();
        assert_eq!(e.code, "not_found");
        assert_eq!(e.message, "teacher not found");
        assert!(e.details.is_none());
    }

    #[test]
    fn year_accepts_numbers_and_strings() {
        assert_eq!(get_year(&json!({ "year": 2025 })).ok(), Some(2025));
        assert_eq!(get_year(&json!({ "year": "2024" })).ok(), Some(2024));
        assert!(get_year(&json!({ "year": "soon" })).is_err());
        assert!(get_year(&json!({})).is_ok());
    }

    #[test]
    fn month_accepts_numbers_and_strings() {
        assert_eq!(get_month(&json!({ "month": 2 })).ok(), Some(2));
        assert_eq!(get_month(&json!({ "month": " 11 " })).ok(), Some(11));
        assert!(get_month(&json!({ "month": "13" })).is_err());
        assert!(get_month(&json!({ "month": "feb" })).is_err());
        assert!(get_month(&json!({ "month": 0 })).is_err());
        assert!(get_month(&json!({})).is_err());
    }

    #[test]
    fn blank_strings_are_missing() {
        let params = json!({ "teacherId": "   ", "notes": "" });
        assert!(get_required_str(&params, "teacherId").is_err());
        assert_eq!(get_patch_str(&params, "notes"), Some(String::new()));
        assert_eq!(get_opt_str(&params, "notes"), None);
    }
}
