pub mod absences;
pub mod calendar;
pub mod core;
pub mod movements;
pub mod reports;
pub mod teachers;
