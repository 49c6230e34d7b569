use crate::ipc::helpers::{
    get_opt_date, get_opt_str, get_patch_str, get_required_str, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Coverage;
use crate::quota;
use crate::registrar::{self, AbsencePatch, RegisterRequest};
use crate::reports::{self, HistoryFilter};
use crate::store;
use chrono::{Datelike, Local};
use serde_json::json;
use tracing::info;

fn get_coverage(params: &serde_json::Value) -> Result<Option<Coverage>, HandlerErr> {
    let Some(v) = params.get("coverage").filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    if !v.is_object() {
        return Err(HandlerErr::bad_params("coverage must be an object"));
    }
    let field = |key: &str| get_opt_str(v, key).unwrap_or_default();
    Ok(Some(Coverage {
        name: field("name"),
        id_number: field("idNumber"),
        class_name: field("className"),
        subject: field("subject"),
    }))
}

fn history_filter(params: &serde_json::Value) -> Result<HistoryFilter, HandlerErr> {
    Ok(HistoryFilter {
        teacher_id: get_opt_str(params, "teacherId"),
        cause: get_opt_str(params, "cause"),
        from: get_opt_date(params, "from")?,
        to: get_opt_date(params, "to")?,
    })
}

fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, config| {
        let params = &req.params;
        let request = RegisterRequest {
            teacher_id: get_opt_str(params, "teacherId"),
            date_from: get_opt_str(params, "dateFrom").or_else(|| get_opt_str(params, "date")),
            date_to: get_opt_str(params, "dateTo"),
            cause: get_opt_str(params, "cause").unwrap_or_default(),
            notes: get_opt_str(params, "notes").unwrap_or_default(),
            coverage: get_coverage(params)?,
        };
        let reg = registrar::register(conn, &config.limits, &request)?;
        Ok(json!({
            "inserted": reg.inserted(),
            "absenceIds": reg.ids,
            "category": reg.category,
            "warning": reg.warning,
        }))
    })
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let absence_id = get_required_str(&req.params, "absenceId")?;
        let absence = store::get_absence(conn, &absence_id)?.ok_or_else(|| HandlerErr {
            code: "not_found",
            message: "absence not found".to_string(),
            details: None,
        })?;
        Ok(json!({ "absence": absence.to_json() }))
    })
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let params = &req.params;
        let absence_id = get_required_str(params, "absenceId")?;
        let covered = match params.get("covered") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(
                v.as_bool()
                    .ok_or_else(|| HandlerErr::bad_params("covered must be a boolean"))?,
            ),
        };
        let patch = AbsencePatch {
            date: get_opt_date(params, "date")?,
            cause: get_patch_str(params, "cause"),
            notes: get_patch_str(params, "notes"),
            coverage: get_coverage(params)?,
            covered,
            coverage_kind: get_patch_str(params, "coverageKind"),
        };
        let absence = registrar::amend(conn, &absence_id, &patch)?;
        Ok(json!({ "absence": absence.to_json() }))
    })
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let absence_id = get_required_str(&req.params, "absenceId")?;
        if !store::delete_absence(conn, &absence_id)? {
            return Err(HandlerErr {
                code: "not_found",
                message: "absence not found".to_string(),
                details: None,
            });
        }
        info!(absence = %absence_id, "absence deleted");
        Ok(json!({ "ok": true }))
    })
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let filter = history_filter(&req.params)?;
        let rows = reports::history_list(conn, &filter)?;
        Ok(json!({ "absences": rows }))
    })
}

fn handle_history_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, config| {
        let filter = history_filter(&req.params)?;
        Ok(reports::history_summary(conn, &config.limits, &filter)?)
    })
}

fn handle_quota_remaining(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, config| {
        let teacher_id = get_required_str(&req.params, "teacherId")?;
        let reference =
            get_opt_date(&req.params, "date")?.unwrap_or_else(|| Local::now().date_naive());
        let status = quota::remaining_quota(conn, &config.limits, &teacher_id, reference)?;
        let mut out = status.to_json();
        out["year"] = json!(reference.year());
        out["limits"] = config.limits.to_json();
        Ok(out)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "absences.register" => Some(handle_register(state, req)),
        "absences.get" => Some(handle_get(state, req)),
        "absences.update" => Some(handle_update(state, req)),
        "absences.delete" => Some(handle_delete(state, req)),
        "absences.list" => Some(handle_list(state, req)),
        "absences.historySummary" => Some(handle_history_summary(state, req)),
        "quota.remaining" => Some(handle_quota_remaining(state, req)),
        _ => None,
    }
}
