use crate::ipc::helpers::{
    get_opt_str, get_required_date, get_required_str, get_year, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::ExceptionKind;
use crate::store;
use serde_json::json;
use tracing::info;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let year = get_year(&req.params)?;
        let rows = store::exceptions_for_year(conn, year)?;
        Ok(json!({
            "year": year,
            "exceptions": rows.iter().map(|e| e.to_json()).collect::<Vec<_>>(),
        }))
    })
}

fn handle_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let date = get_required_date(&req.params, "date")?;
        let raw_kind = get_required_str(&req.params, "kind")?;
        let kind = ExceptionKind::parse(&raw_kind)
            .ok_or_else(|| HandlerErr::bad_params("kind must be holiday or suspension"))?;
        let reason = get_opt_str(&req.params, "reason").unwrap_or_default();
        let id = store::upsert_exception(conn, date, kind, &reason)?;
        info!(date = %date, kind = kind.as_str(), "calendar exception saved");
        Ok(json!({ "exceptionId": id }))
    })
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let id = get_required_str(&req.params, "exceptionId")?;
        if !store::delete_exception(conn, &id)? {
            return Err(HandlerErr {
                code: "not_found",
                message: "calendar exception not found".to_string(),
                details: None,
            });
        }
        Ok(json!({ "ok": true }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calendar.list" => Some(handle_list(state, req)),
        "calendar.upsert" => Some(handle_upsert(state, req)),
        "calendar.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
