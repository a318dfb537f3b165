use crate::error::CoreError;
use crate::error_utils::ErrorExt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One decoded reading from the telemetry feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature_c: f64,
    pub humidity_pct: i64,
    pub wind_speed_kmh: i64,
    pub wind_direction: String,
}

/// Credentials returned by `createSession`. Lives for a single operation.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_jwt: String,
    pub did: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReference {
    pub uri: String,
    pub cid: Option<String>,
}

/// A direct reply to a published post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub author: String,
    pub text: String,
    pub created_at: String,
    pub like_count: u64,
    pub repost_count: u64,
}

/// Result of one publish pipeline run, handed back to whoever triggered it.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub success: bool,
    pub message: String,
    pub post_text: Option<String>,
    pub post_uri: Option<String>,
    /// What to do about a failure, in words meant for the operator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PublishOutcome {
    pub fn succeeded(post_text: String, post_uri: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            message: "Post successful".to_string(),
            post_text: Some(post_text),
            post_uri: Some(post_uri),
            hint: None,
            error_code: None,
            timestamp,
        }
    }

    pub fn failed(error: &CoreError, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            post_text: None,
            post_uri: None,
            hint: Some(error.user_friendly_message()),
            error_code: Some(error.error_code()),
            timestamp,
        }
    }
}
