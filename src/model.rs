use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;

pub const SUBSTITUTE_ROLE: &str = "substitute-teacher";
pub const GRID_SLOTS: usize = 5;
pub const GRID_WEEKDAYS: usize = 5;

/// Weekly timetable: `cells[slot][weekday]`, Monday = column 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleGrid(Vec<Vec<String>>);

impl Default for ScheduleGrid {
    fn default() -> Self {
        ScheduleGrid(vec![vec![String::new(); GRID_WEEKDAYS]; GRID_SLOTS])
    }
}

impl ScheduleGrid {
    /// Accepts exactly 5 rows of 5 cells; a cell is a string or null (blank).
    pub fn from_json(value: &serde_json::Value) -> Result<Self, String> {
        let rows = value
            .as_array()
            .filter(|rows| rows.len() == GRID_SLOTS)
            .ok_or_else(|| "schedule grid must be a 5x5 matrix".to_string())?;
        let mut out = Vec::with_capacity(GRID_SLOTS);
        for row in rows {
            let cells = row
                .as_array()
                .filter(|cells| cells.len() == GRID_WEEKDAYS)
                .ok_or_else(|| "schedule grid must be a 5x5 matrix".to_string())?;
            let mut parsed = Vec::with_capacity(GRID_WEEKDAYS);
            for cell in cells {
                match cell {
                    serde_json::Value::Null => parsed.push(String::new()),
                    serde_json::Value::String(s) => parsed.push(s.clone()),
                    _ => return Err("schedule grid cells must be strings".to_string()),
                }
            }
            out.push(parsed);
        }
        Ok(ScheduleGrid(out))
    }

    pub fn cell(&self, slot: usize, weekday: usize) -> &str {
        self.0
            .get(slot)
            .and_then(|r| r.get(weekday))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!(self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Teacher {
    pub id: String,
    pub last_name: String,
    pub first_name: String,
    pub roles: Vec<String>,
    pub status: String,
    pub grid: ScheduleGrid,
}

impl Teacher {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
            .trim_matches(|c| c == ',' || c == ' ')
            .to_string()
    }

    /// Only a teacher whose sole role is the substitute role follows the
    /// timetable; any other role set is on site Monday to Friday.
    pub fn is_substitute_only(&self) -> bool {
        let mut roles: Vec<String> = self
            .roles
            .iter()
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty())
            .collect();
        roles.sort();
        roles.dedup();
        roles.len() == 1 && roles[0] == SUBSTITUTE_ROLE
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "lastName": self.last_name,
            "firstName": self.first_name,
            "displayName": self.display_name(),
            "roles": self.roles,
            "status": self.status,
            "scheduleGrid": self.grid.to_json(),
        })
    }
}

/// Splits the stored "role a, role b" form.
pub fn split_roles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(|r| r.to_string())
        .collect()
}

pub fn join_roles(roles: &[String]) -> String {
    let mut cleaned: Vec<&str> = roles
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .collect();
    cleaned.sort();
    cleaned.dedup();
    cleaned.join(", ")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coverage {
    pub name: String,
    pub id_number: String,
    pub class_name: String,
    pub subject: String,
}

impl Coverage {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.id_number.is_empty()
            && self.class_name.is_empty()
            && self.subject.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "idNumber": self.id_number,
            "className": self.class_name,
            "subject": self.subject,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Absence {
    pub id: String,
    pub teacher_id: String,
    pub date: NaiveDate,
    pub cause: String,
    pub notes: String,
    pub coverage: Option<Coverage>,
    pub covered: bool,
    pub coverage_kind: String,
}

impl Absence {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "teacherId": self.teacher_id,
            "date": iso(self.date),
            "cause": self.cause,
            "category": crate::causes::bucket(&self.cause),
            "color": crate::causes::color_for(&self.cause),
            "notes": self.notes,
            "coverage": self.coverage.as_ref().map(|c| c.to_json()),
            "covered": self.covered,
            "coverageKind": self.coverage_kind,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Holiday,
    Suspension,
}

impl ExceptionKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "holiday" | "feriado" => Some(ExceptionKind::Holiday),
            "suspension" | "suspensión" => Some(ExceptionKind::Suspension),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExceptionKind::Holiday => "holiday",
            ExceptionKind::Suspension => "suspension",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalendarException {
    pub id: String,
    pub date: NaiveDate,
    pub kind: ExceptionKind,
    pub reason: String,
}

impl CalendarException {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "date": iso(self.date),
            "kind": self.kind.as_str(),
            "reason": self.reason,
        })
    }
}

pub fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Accepts "YYYY-MM-DD" and "DD/MM/YYYY".
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    ["%Y-%m-%d", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(t, fmt).ok())
}
