mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{request, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("schoolbook-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert!(health["result"]["workspacePath"].is_null());
    assert_eq!(health["result"]["limits"]["personal-matters"], json!(6));

    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.create",
        json!({ "lastName": "Smoke", "roles": ["teacher"] }),
    );
    let teacher_id = created["result"]["teacherId"]
        .as_str()
        .expect("teacherId")
        .to_string();

    let calls = [
        ("teachers.list", json!({})),
        ("calendar.list", json!({ "year": 2025 })),
        ("absences.list", json!({})),
        ("absences.historySummary", json!({})),
        ("quota.remaining", json!({ "teacherId": teacher_id })),
        ("schedule.expected", json!({ "teacherId": teacher_id, "date": "2025-01-06" })),
        ("schedule.baseDays", json!({ "teacherId": teacher_id, "year": 2025, "month": 2 })),
        ("reports.monthly", json!({ "year": 2025 })),
        ("reports.ranking", json!({ "year": 2025 })),
        ("reports.daily", json!({ "year": 2025 })),
        ("reports.teacherSummary", json!({ "teacherId": teacher_id })),
        ("reports.teacherCalendar", json!({ "teacherId": teacher_id, "year": 2025 })),
        ("movements.list", json!({})),
    ];
    for (i, (method, params)) in calls.iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("c{i}"), method, params.clone());
        assert_eq!(resp["ok"], json!(true), "{} failed: {}", method, resp);
    }

    let unknown = request(&mut stdin, &mut reader, "u", "grades.open", json!({}));
    assert_eq!(unknown["error"]["code"], json!("not_implemented"));

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json reply");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("parse reply");
    assert_eq!(bad["error"]["code"], json!("bad_json"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
