use serde::{Deserialize, Serialize};
use std::fmt;

pub const INVALID_INPUT: &str = "INVALID_INPUT";
pub const CONFIGURATION: &str = "CONFIGURATION";
pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
pub const INVALID_TIME: &str = "INVALID_TIME";
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const OUTAGE_CHANGED: &str = "OUTAGE_CHANGED";
pub const OUTAGE_ENDED: &str = "OUTAGE_ENDED";
pub const PLUGIN_CONFIGURATION: &str = "PLUGIN_CONFIGURATION";

/// Single structured error shape used across the library and the automation commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

/// Coarse classification of an [`AppError`], derived from its code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Storage,
    InvalidInput,
    Configuration,
    InvalidArgument,
    InvalidTime,
    NotFound,
    OutageChanged,
    OutageEnded,
    PluginConfiguration,
}

impl ErrorKind {
    /// Process exit code used by the automation commands. Success is 0.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Storage => 1,
            ErrorKind::InvalidInput => 2,
            ErrorKind::Configuration => 3,
            ErrorKind::InvalidArgument => 4,
            ErrorKind::InvalidTime => 5,
            ErrorKind::NotFound => 6,
            ErrorKind::OutageChanged => 7,
            ErrorKind::OutageEnded => 8,
            ErrorKind::PluginConfiguration => 9,
        }
    }
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(INVALID_INPUT, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(CONFIGURATION, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(INVALID_ARGUMENT, message)
    }

    pub fn invalid_time(message: impl Into<String>) -> Self {
        Self::new(INVALID_TIME, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(NOT_FOUND, message)
    }

    pub fn kind(&self) -> ErrorKind {
        match self.code.as_str() {
            INVALID_INPUT => ErrorKind::InvalidInput,
            CONFIGURATION => ErrorKind::Configuration,
            INVALID_ARGUMENT => ErrorKind::InvalidArgument,
            INVALID_TIME => ErrorKind::InvalidTime,
            NOT_FOUND => ErrorKind::NotFound,
            OUTAGE_CHANGED => ErrorKind::OutageChanged,
            OUTAGE_ENDED => ErrorKind::OutageEnded,
            PLUGIN_CONFIGURATION => ErrorKind::PluginConfiguration,
            _ => ErrorKind::Storage,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

/// Wraps a rusqlite failure into the storage error shape.
pub(crate) fn db_error(code: &str, message: &str, e: rusqlite::Error) -> AppError {
    AppError::new(code, message).with_details(e.to_string())
}
