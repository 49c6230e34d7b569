use crate::ipc::helpers::{
    get_month, get_opt_date, get_required_date, get_required_str, get_year, with_db,
};
use crate::ipc::types::{AppState, Request};
use crate::model::iso;
use crate::reports;
use crate::schedule;
use crate::store;
use chrono::Datelike;
use serde_json::json;

fn handle_schedule_expected(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let teacher_id = get_required_str(&req.params, "teacherId")?;
        let date = get_required_date(&req.params, "date")?;
        let teacher = store::require_teacher(conn, &teacher_id)?;
        let exceptions = store::exception_dates(conn, date.year())?;
        Ok(json!({
            "teacherId": teacher.id,
            "date": iso(date),
            "expected": schedule::is_expected(&teacher, date, &exceptions),
        }))
    })
}

fn handle_schedule_base_days(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let teacher_id = get_required_str(&req.params, "teacherId")?;
        let year = get_year(&req.params)?;
        let month = get_month(&req.params)?;
        let teacher = store::require_teacher(conn, &teacher_id)?;
        let exceptions = store::exception_dates(conn, year)?;
        Ok(json!({
            "teacherId": teacher.id,
            "year": year,
            "month": month,
            "baseDays": schedule::base_days_in_month(&teacher, year, month, &exceptions),
        }))
    })
}

fn handle_monthly(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let year = get_year(&req.params)?;
        let rows = reports::monthly_institutional_report(conn, year)?;
        Ok(json!({ "year": year, "rows": rows }))
    })
}

fn handle_ranking(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let year = get_year(&req.params)?;
        let rows = reports::annual_ranking(conn, year)?;
        Ok(json!({ "year": year, "rows": rows }))
    })
}

fn handle_daily(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let year = get_year(&req.params)?;
        let rows = reports::daily_institutional_report(conn, year)?;
        Ok(json!({ "year": year, "rows": rows }))
    })
}

fn handle_teacher_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let teacher_id = get_required_str(&req.params, "teacherId")?;
        let from = get_opt_date(&req.params, "from")?;
        let to = get_opt_date(&req.params, "to")?;
        Ok(reports::teacher_summary(conn, &teacher_id, from, to)?)
    })
}

fn handle_teacher_calendar(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let teacher_id = get_required_str(&req.params, "teacherId")?;
        let year = get_year(&req.params)?;
        Ok(reports::teacher_calendar(conn, &teacher_id, year)?)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.expected" => Some(handle_schedule_expected(state, req)),
        "schedule.baseDays" => Some(handle_schedule_base_days(state, req)),
        "reports.monthly" => Some(handle_monthly(state, req)),
        "reports.ranking" => Some(handle_ranking(state, req)),
        "reports.daily" => Some(handle_daily(state, req)),
        "reports.teacherSummary" => Some(handle_teacher_summary(state, req)),
        "reports.teacherCalendar" => Some(handle_teacher_calendar(state, req)),
        _ => None,
    }
}
