use std::fmt::Display;

use thiserror::Error;

/// Session actions that can be rejected locally before any request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    ClockIn,
    StartBreak,
    EndBreak,
    ClockOut,
}

impl Display for SessionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionAction::ClockIn => write!(f, "clock in"),
            SessionAction::StartBreak => write!(f, "start break"),
            SessionAction::EndBreak => write!(f, "end break"),
            SessionAction::ClockOut => write!(f, "clock out"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TimekeepingError {
    #[error("Can't {action} while {state}")]
    InvalidTransition {
        action: SessionAction,
        state: &'static str,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Request could not complete: {0}")]
    NetworkFailure(String),

    #[error("Server rejected the request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    #[error("Unexpected response from server: {0}")]
    MalformedResponse(String),

    #[error("Shift overlaps with existing shift {existing}")]
    ShiftConflict { existing: String },

    #[error("Invalid slot: {0}")]
    InvalidSlot(String),
}

impl From<reqwest::Error> for TimekeepingError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            TimekeepingError::MalformedResponse(value.to_string())
        } else {
            TimekeepingError::NetworkFailure(value.to_string())
        }
    }
}

impl From<serde_json::Error> for TimekeepingError {
    fn from(value: serde_json::Error) -> Self {
        TimekeepingError::MalformedResponse(value.to_string())
    }
}

pub type Result<T, E = TimekeepingError> = std::result::Result<T, E>;
