//! Outcomes - the record of one step's execution
//!
//! Failures are data: every step ends in exactly one Outcome, and the
//! error kind is one of a closed set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy surfaced to the user and the session log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No language-model provider reachable
    Unavailable,
    /// Provider returned non-JSON or schema-invalid content
    BadResponse,
    /// Provider or handler exceeded its timeout
    Timeout,
    /// Step rejected before execution
    InvalidParameters,
    /// No handler for the action
    UnknownAction,
    /// Confirmation refused
    UserDeclined,
    /// Handler raised; message preserved
    HandlerFailure,
    /// Provider refused credentials
    Authentication,
    /// Startup cannot proceed
    FatalConfig,
    /// Anything else the gateway could not classify
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::BadResponse => "bad_response",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidParameters => "invalid_parameters",
            ErrorKind::UnknownAction => "unknown_action",
            ErrorKind::UserDeclined => "user_declined",
            ErrorKind::HandlerFailure => "handler_failure",
            ErrorKind::Authentication => "authentication",
            ErrorKind::FatalConfig => "fatal_config",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub ok: bool,

    /// Human-readable result or preserved error message
    pub message: String,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    #[serde(default)]
    pub retries_used: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Outcome {
    pub fn success(message: impl Into<String>, started_at: DateTime<Utc>, retries_used: u32) -> Self {
        Self {
            ok: true,
            message: message.into(),
            started_at,
            finished_at: Utc::now(),
            retries_used,
            error_kind: None,
        }
    }

    pub fn failure(
        kind: ErrorKind,
        message: impl Into<String>,
        started_at: DateTime<Utc>,
        retries_used: u32,
    ) -> Self {
        Self {
            ok: false,
            message: message.into(),
            started_at,
            finished_at: Utc::now(),
            retries_used,
            error_kind: Some(kind),
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::InvalidParameters).unwrap();
        assert_eq!(json, "\"invalid_parameters\"");
        assert_eq!(ErrorKind::UserDeclined.to_string(), "user_declined");
    }

    #[test]
    fn test_success_omits_error_kind() {
        let outcome = Outcome::success("done", Utc::now(), 0);
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json.get("error_kind").is_none());
        assert_eq!(json["ok"], true);
        assert!(outcome.duration_ms() >= 0);
    }

    #[test]
    fn test_failure_keeps_message() {
        let outcome = Outcome::failure(ErrorKind::HandlerFailure, "notepad.exe not found", Utc::now(), 2);
        assert!(!outcome.ok);
        assert_eq!(outcome.error_kind, Some(ErrorKind::HandlerFailure));
        assert_eq!(outcome.message, "notepad.exe not found");
        assert_eq!(outcome.retries_used, 2);
    }
}
