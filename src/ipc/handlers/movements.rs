use crate::ipc::helpers::{get_opt_str, get_required_str, with_db};
use crate::ipc::types::{AppState, Request};
use crate::movements::{self, Movement};
use serde_json::json;

fn handle_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, config| {
        let params = &req.params;
        let m = Movement {
            student_id: get_required_str(params, "studentId")?,
            kind: get_required_str(params, "kind")?.to_lowercase(),
            course_from: get_opt_str(params, "courseFrom"),
            course_to: get_opt_str(params, "courseTo"),
            course: get_opt_str(params, "course"),
            reason: get_opt_str(params, "reason"),
            destination_school: get_opt_str(params, "destinationSchool"),
        };
        let id = movements::record_movement(conn, config.movement_dedup_window, &m)?;
        Ok(json!({
            "recorded": id.is_some(),
            "movementId": id,
        }))
    })
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let student_id = get_opt_str(&req.params, "studentId");
        let rows = movements::list_movements(conn, student_id.as_deref())?;
        Ok(json!({ "movements": rows }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "movements.record" => Some(handle_record(state, req)),
        "movements.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
