use crate::ipc::helpers::{get_opt_str, get_patch_str, get_required_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{split_roles, ScheduleGrid, Teacher};
use crate::store::{self, TeacherPatch};
use serde_json::json;
use tracing::info;

/// `roles` may arrive as an array of names or as one comma-separated string.
fn get_roles(params: &serde_json::Value) -> Result<Option<Vec<String>>, HandlerErr> {
    match params.get("roles") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(split_roles(s))),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| HandlerErr::bad_params("roles must be strings"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|roles| Some(roles.into_iter().filter(|r| !r.is_empty()).collect())),
        Some(_) => Err(HandlerErr::bad_params("roles must be an array or a string")),
    }
}

fn get_grid(params: &serde_json::Value, key: &str) -> Result<Option<ScheduleGrid>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => ScheduleGrid::from_json(v)
            .map(Some)
            .map_err(HandlerErr::bad_params),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let teachers = store::list_teachers(conn)?;
        Ok(json!({
            "teachers": teachers.iter().map(|t| t.to_json()).collect::<Vec<_>>()
        }))
    })
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let params = &req.params;
        let last_name = get_required_str(params, "lastName")?;
        let teacher = Teacher {
            id: store::new_id(),
            last_name,
            first_name: get_opt_str(params, "firstName").unwrap_or_default(),
            roles: get_roles(params)?.unwrap_or_default(),
            status: get_opt_str(params, "status").unwrap_or_else(|| "active".to_string()),
            grid: get_grid(params, "scheduleGrid")?.unwrap_or_default(),
        };
        store::insert_teacher(conn, &teacher).map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: None,
        })?;
        info!(teacher = %teacher.id, "teacher created");
        Ok(json!({ "teacherId": teacher.id }))
    })
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let params = &req.params;
        let teacher_id = get_required_str(params, "teacherId")?;
        // scheduleGrid is ignored here; teachers.setSchedule owns the timetable.
        let patch = TeacherPatch {
            last_name: get_opt_str(params, "lastName"),
            first_name: get_patch_str(params, "firstName"),
            roles: get_roles(params)?,
            status: get_opt_str(params, "status"),
        };
        store::update_teacher(conn, &teacher_id, &patch)?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_set_schedule(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let teacher_id = get_required_str(&req.params, "teacherId")?;
        let grid = get_grid(&req.params, "grid")?
            .ok_or_else(|| HandlerErr::bad_params("missing grid"))?;
        store::set_schedule(conn, &teacher_id, &grid)?;
        info!(teacher = %teacher_id, "schedule grid replaced");
        Ok(json!({ "ok": true }))
    })
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let teacher_id = get_required_str(&req.params, "teacherId")?;
        let removed = store::delete_teacher(conn, &teacher_id)?;
        info!(teacher = %teacher_id, absences = removed, "teacher deleted");
        Ok(json!({ "ok": true, "absencesRemoved": removed }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_list(state, req)),
        "teachers.create" => Some(handle_create(state, req)),
        "teachers.update" => Some(handle_update(state, req)),
        "teachers.setSchedule" => Some(handle_set_schedule(state, req)),
        "teachers.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
