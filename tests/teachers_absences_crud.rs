mod test_support;

use rusqlite::Connection;
use serde_json::json;
use test_support::{
    create_teacher, request_err, request_ok, select_workspace, spawn_sidecar, temp_dir,
    workspace_db_path,
};

#[test]
fn update_never_touches_the_timetable_and_delete_cascades() {
    let workspace = temp_dir("schoolbook-teachers-crud");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    let teacher_id = create_teacher(&mut stdin, &mut reader, "Diaz", json!(["substitute-teacher"]));

    let grid = json!([
        ["", "Art", "", "", ""],
        ["", "", "", "", ""],
        ["", "", "", "", ""],
        ["", "", "", "", ""],
        ["", "", "", "", "Music"]
    ]);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "teachers.setSchedule",
        json!({ "teacherId": teacher_id, "grid": grid }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.update",
        json!({
            "teacherId": teacher_id,
            "lastName": "Diaz Soto",
            "roles": "substitute-teacher, Head of Department",
            "scheduleGrid": [["x"]]
        }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "3", "teachers.list", json!({}));
    let t = &listed["teachers"][0];
    assert_eq!(t["lastName"], json!("Diaz Soto"));
    assert_eq!(t["scheduleGrid"], grid);
    assert_eq!(t["roles"], json!(["Head of Department", "substitute-teacher"]));

    let bad_grid = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.setSchedule",
        json!({ "teacherId": teacher_id, "grid": [["a", "b"]] }),
    );
    assert_eq!(bad_grid["code"], json!("bad_params"));

    let no_changes = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.update",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(no_changes["code"], json!("bad_params"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "absences.register",
        json!({
            "teacherId": teacher_id,
            "dateFrom": "2025-03-03",
            "dateTo": "2025-03-04",
            "cause": "Duelo"
        }),
    );
    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "teachers.delete",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(deleted["absencesRemoved"], json!(2));

    let conn = Connection::open(workspace_db_path(&workspace)).expect("open workspace db");
    let left: i64 = conn
        .query_row("SELECT COUNT(*) FROM absences", [], |r| r.get(0))
        .expect("count absences");
    assert_eq!(left, 0);

    let gone = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "teachers.delete",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(gone["code"], json!("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn absence_update_rejects_a_taken_date() {
    let workspace = temp_dir("schoolbook-absences-crud");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    let teacher_id = create_teacher(&mut stdin, &mut reader, "Fuentes", json!(["teacher"]));

    let reg = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "absences.register",
        json!({
            "teacherId": teacher_id,
            "dateFrom": "2025-09-01",
            "dateTo": "2025-09-02",
            "cause": "Enfermedad familiar",
            "coverage": { "name": "L. Reyes", "className": "2B" }
        }),
    );
    let ids = reg["absenceIds"].as_array().cloned().unwrap_or_default();
    assert_eq!(ids.len(), 2);
    let first = ids[0].as_str().expect("id").to_string();

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "absences.get",
        json!({ "absenceId": first }),
    );
    assert_eq!(got["absence"]["date"], json!("2025-09-01"));
    assert_eq!(got["absence"]["coverage"]["name"], json!("L. Reyes"));
    assert_eq!(got["absence"]["category"], json!("family-illness"));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "absences.update",
        json!({ "absenceId": first, "date": "2025-09-02" }),
    );
    assert_eq!(e["code"], json!("conflict"));
    assert_eq!(e["details"]["date"], json!("2025-09-02"));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "absences.update",
        json!({
            "absenceId": first,
            "date": "2025-09-05",
            "covered": true,
            "coverageKind": "internal",
            "notes": "swapped"
        }),
    );
    assert_eq!(updated["absence"]["date"], json!("2025-09-05"));
    assert_eq!(updated["absence"]["covered"], json!(true));
    assert_eq!(updated["absence"]["coverageKind"], json!("INTERNAL"));
    assert_eq!(updated["absence"]["cause"], json!("Enfermedad familiar"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "absences.delete",
        json!({ "absenceId": first }),
    );
    let missing = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "absences.get",
        json!({ "absenceId": first }),
    );
    assert_eq!(missing["code"], json!("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn calendar_exceptions_upsert_by_date() {
    let workspace = temp_dir("schoolbook-calendar-crud");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.upsert",
        json!({ "date": "2025-05-01", "kind": "holiday", "reason": "Labour Day" }),
    );
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.upsert",
        json!({ "date": "01/05/2025", "kind": "suspension", "reason": "Strike" }),
    );
    assert_eq!(first["exceptionId"], again["exceptionId"]);

    let listed = request_ok(&mut stdin, &mut reader, "3", "calendar.list", json!({ "year": 2025 }));
    let rows = listed["exceptions"].as_array().cloned().unwrap_or_default();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["kind"], json!("suspension"));

    let bad = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "calendar.upsert",
        json!({ "date": "2025-05-02", "kind": "vacation" }),
    );
    assert_eq!(bad["code"], json!("bad_params"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calendar.delete",
        json!({ "exceptionId": first["exceptionId"] }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "6", "calendar.list", json!({ "year": 2025 }));
    assert_eq!(listed["exceptions"].as_array().map(|a| a.len()), Some(0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
