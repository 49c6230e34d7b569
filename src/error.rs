use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{message}")]
    Conflict {
        message: String,
        date: Option<NaiveDate>,
    },
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Stored data that no longer parses. Replacing it is the only way out.
    #[error("schedule grid of teacher {teacher_id} is unreadable: {reason}")]
    Corrupt { teacher_id: String, reason: String },
    #[error("{0}")]
    Db(#[from] rusqlite::Error),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>, date: Option<NaiveDate>) -> Self {
        CoreError::Conflict {
            message: message.into(),
            date,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "bad_params",
            CoreError::Conflict { .. } => "conflict",
            CoreError::NotFound(_) => "not_found",
            CoreError::Corrupt { .. } => "corrupt_data",
            CoreError::Db(_) => "db_query_failed",
        }
    }

    /// Rejections the user has to act on, as opposed to infrastructure failures.
    pub fn is_blocking(&self) -> bool {
        matches!(self, CoreError::Validation(_) | CoreError::Conflict { .. })
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
