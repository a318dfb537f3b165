use crate::error::*;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::RemoteApi(e) => {
                error!("Remote API error details: {:?}", e);
            }
            CoreError::Transport(e) => {
                error!("Transport error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Transport(e) => e.user_friendly_message(),
            CoreError::RemoteApi(e) => e.user_friendly_message(),
            CoreError::Format(e) => e.user_friendly_message(),
            CoreError::Scheduling(e) => e.user_friendly_message(),
            CoreError::Database(e) => e.user_friendly_message(),
            CoreError::Io(_) => "A file system error occurred.".to_string(),
            CoreError::Serialization(_) => {
                "Stored data could not be read or written.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Transport(_) => "TRANSPORT".to_string(),
            CoreError::RemoteApi(_) => "REMOTE_API".to_string(),
            CoreError::Format(_) => "FORMAT".to_string(),
            CoreError::Scheduling(_) => "SCHEDULING".to_string(),
            CoreError::Database(_) => "DATABASE".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::InvalidFormat { .. } => {
                "Configuration file format is invalid. Please check the settings.".to_string()
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::MissingCredentials => {
                "Bluesky username or password not configured.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::InvalidFormat { .. } => "CONFIG_INVALID_FORMAT".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingCredentials => "CONFIG_MISSING_CREDENTIALS".to_string(),
        }
    }
}

impl ErrorExt for TransportError {
    fn log_error(&self) -> &Self {
        error!("TransportError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("TransportError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            TransportError::Timeout { seconds, .. } => format!(
                "The request took longer than {} seconds. Please try again.",
                seconds
            ),
            TransportError::Connection { .. } => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            TransportError::UnexpectedStatus { status, .. } => {
                format!("The server answered with HTTP {}.", status)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            TransportError::Timeout { .. } => "TRANSPORT_TIMEOUT".to_string(),
            TransportError::Connection { .. } => "TRANSPORT_CONNECTION".to_string(),
            TransportError::UnexpectedStatus { .. } => "TRANSPORT_STATUS".to_string(),
        }
    }
}

impl ErrorExt for RemoteApiError {
    fn log_error(&self) -> &Self {
        error!("RemoteApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("RemoteApiError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RemoteApiError::AuthenticationFailed { reason } => format!(
                "Bluesky authentication failed ({}). Please check your credentials.",
                reason
            ),
            RemoteApiError::RequestFailed { reason, .. } => {
                format!("Bluesky rejected the request: {}", reason)
            }
            RemoteApiError::InvalidResponse { .. } => {
                "Bluesky returned a response that could not be understood.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            RemoteApiError::AuthenticationFailed { .. } => "REMOTE_AUTH_FAILED".to_string(),
            RemoteApiError::RequestFailed { .. } => "REMOTE_REQUEST_FAILED".to_string(),
            RemoteApiError::InvalidResponse { .. } => "REMOTE_INVALID_RESPONSE".to_string(),
        }
    }
}

impl ErrorExt for FormatError {
    fn log_error(&self) -> &Self {
        error!("FormatError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("FormatError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            FormatError::EmptyFeed => "The weather feed returned no data.".to_string(),
            FormatError::TooFewFields { found, .. } => format!(
                "The weather feed is incomplete ({} fields). Check the clientraw URL.",
                found
            ),
        }
    }

    fn error_code(&self) -> String {
        match self {
            FormatError::EmptyFeed => "FORMAT_EMPTY_FEED".to_string(),
            FormatError::TooFewFields { .. } => "FORMAT_TOO_FEW_FIELDS".to_string(),
        }
    }
}

impl ErrorExt for SchedulingError {
    fn log_error(&self) -> &Self {
        error!("SchedulingError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("SchedulingError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            SchedulingError::NotScheduled => {
                "Posting is not scheduled. Save settings or run a post manually to schedule posts."
                    .to_string()
            }
            SchedulingError::InvalidTime { value } => {
                format!("'{}' is not a valid HH:MM time.", value)
            }
            SchedulingError::NonexistentLocalTime { value } => {
                format!("{} is skipped by a clock change today.", value)
            }
            SchedulingError::ServiceStopped => {
                "The background service has stopped. Start it again with `run`.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            SchedulingError::NotScheduled => "SCHEDULING_NOT_SCHEDULED".to_string(),
            SchedulingError::InvalidTime { .. } => "SCHEDULING_INVALID_TIME".to_string(),
            SchedulingError::NonexistentLocalTime { .. } => {
                "SCHEDULING_NONEXISTENT_TIME".to_string()
            }
            SchedulingError::ServiceStopped => "SCHEDULING_SERVICE_STOPPED".to_string(),
        }
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => {
                "Database connection failed. Please try again.".to_string()
            }
            DatabaseError::NotConnected => "The state database is not open.".to_string(),
            _ => "Database error occurred. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            DatabaseError::MigrationFailed { .. } => "DB_MIGRATION_FAILED".to_string(),
            DatabaseError::NotConnected => "DB_NOT_CONNECTED".to_string(),
            DatabaseError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

/// Traces failures for the operator: the error itself, its code and the
/// user-facing message. Either half can be switched off.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!("User message: {}", error.user_friendly_message());
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
