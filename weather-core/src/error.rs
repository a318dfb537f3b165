use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Remote API error: {0}")]
    RemoteApi(#[from] RemoteApiError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for CoreError {
    fn from(error: reqwest::Error) -> Self {
        CoreError::Transport(TransportError::from(error))
    }
}

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration format: {details}")]
    InvalidFormat { details: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Credentials not configured")]
    MissingCredentials,
}

impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        ConfigError::InvalidFormat {
            details: error.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Request to {url} timed out after {seconds} seconds")]
    Timeout { url: String, seconds: u64 },

    #[error("HTTP Error: {reason}")]
    Connection { reason: String },

    #[error("HTTP {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        let url = error
            .url()
            .map(|u| u.to_string())
            .unwrap_or_default();
        if error.is_timeout() {
            TransportError::Timeout {
                url,
                seconds: crate::REQUEST_TIMEOUT.as_secs(),
            }
        } else {
            TransportError::Connection {
                reason: error.to_string(),
            }
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum RemoteApiError {
    #[error("Session creation failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("API Error: {reason}")]
    RequestFailed {
        method: String,
        status_code: u16,
        reason: String,
    },

    #[error("Invalid API response from {method}: {details}")]
    InvalidResponse { method: String, details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    #[error("Empty response")]
    EmptyFeed,

    #[error("Invalid clientraw format: expected at least {required} fields, found {found}")]
    TooFewFields { found: usize, required: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulingError {
    #[error("No event scheduled")]
    NotScheduled,

    #[error("Invalid time format: {value}")]
    InvalidTime { value: String },

    #[error("Local time {value} does not exist today")]
    NonexistentLocalTime { value: String },

    #[error("Background service is not running")]
    ServiceStopped,
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Not connected")]
    NotConnected,

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}
