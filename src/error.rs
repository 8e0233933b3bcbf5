use std::fmt;

use rusqlite;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

/// Reasons a recurrence rule is refused at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceViolation {
    TimesPerDayTooSmall,
    IntervalTooSmall,
    SpecificTimesMismatch,
    NoWeekdaysSelected,
    EmptyActiveHours,
    EndBeforeAnchor,
}

impl RecurrenceViolation {
    pub fn as_str(self) -> &'static str {
        match self {
            RecurrenceViolation::TimesPerDayTooSmall => "TIMES_PER_DAY_TOO_SMALL",
            RecurrenceViolation::IntervalTooSmall => "INTERVAL_TOO_SMALL",
            RecurrenceViolation::SpecificTimesMismatch => "SPECIFIC_TIMES_MISMATCH",
            RecurrenceViolation::NoWeekdaysSelected => "NO_WEEKDAYS_SELECTED",
            RecurrenceViolation::EmptyActiveHours => "EMPTY_ACTIVE_HOURS",
            RecurrenceViolation::EndBeforeAnchor => "END_BEFORE_ANCHOR",
        }
    }
}

impl fmt::Display for RecurrenceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {message}")]
    Database { message: String },

    #[error("record not found")]
    NotFound,

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("validation failed: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        details: Option<JsonValue>,
    },

    #[error("invalid recurrence rule ({violation}): {message}")]
    InvalidRecurrence {
        violation: RecurrenceViolation,
        message: String,
    },

    #[error("no staged change is pending")]
    NothingPending,

    #[error("calendar unavailable: {0}")]
    CalendarUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            source: None,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            source: None,
            details: Some(details),
        }
    }

    pub fn invalid_recurrence(violation: RecurrenceViolation, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::recurrence", %violation, %message, "recurrence rule rejected");
        AppError::InvalidRecurrence { violation, message }
    }

    pub fn recurrence_violation(&self) -> Option<RecurrenceViolation> {
        match self {
            AppError::InvalidRecurrence { violation, .. } => Some(*violation),
            _ => None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::conflict", %message, "conflict error");
        AppError::Conflict { message }
    }

    pub fn not_found() -> Self {
        warn!(target: "app::database", "resource not found");
        AppError::NotFound
    }

    pub fn nothing_pending() -> Self {
        warn!(target: "app::staging", "no staged change to resolve");
        AppError::NothingPending
    }

    pub fn calendar_unavailable(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::calendar", %message, "calendar unavailable");
        AppError::CalendarUnavailable(message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::database", %message, "database error");
        AppError::Database { message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::Error::{QueryReturnedNoRows, SqliteFailure};
        use rusqlite::ErrorCode;

        match &error {
            QueryReturnedNoRows => AppError::not_found(),
            SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                AppError::conflict("unique or check constraint violated")
            }
            _ => {
                error!(target: "app::database", error = ?error, "sqlite error");
                AppError::database(error.to_string())
            }
        }
    }
}
