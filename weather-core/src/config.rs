//! Poster settings and the schedule derived from them.
//!
//! Settings arrive as a plain record (normally a TOML file). Nothing here
//! assumes the values were sanitised by whoever wrote them: post times and
//! the interval are re-validated every time a [`ScheduleConfig`] is built.

use crate::error::{ConfigError, SchedulingError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://bsky.social/xrpc";
pub const DEFAULT_LOCATION: &str = "Unknown Location";
pub const MIN_INTERVAL_MINUTES: u32 = 30;
pub const DEFAULT_INTERVAL_MINUTES: u32 = 60;
pub const MIN_FEED_LIMIT: usize = 1;
pub const MAX_FEED_LIMIT: usize = 20;
pub const DEFAULT_FEED_LIMIT: usize = 5;

pub const USERNAME_ENV: &str = "WEATHER_POSTER_USERNAME";
pub const PASSWORD_ENV: &str = "WEATHER_POSTER_PASSWORD";

static TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-1]?[0-9]|2[0-3]):[0-5][0-9]$").unwrap());

/// Accepts `H:MM` / `HH:MM` between 00:00 and 23:59.
pub fn is_valid_time(value: &str) -> bool {
    TIME_PATTERN.is_match(value)
}

/// Intervals under the minimum fall back to the hourly default.
pub fn sanitize_interval(minutes: i64) -> u32 {
    if minutes >= i64::from(MIN_INTERVAL_MINUTES) {
        u32::try_from(minutes).unwrap_or(u32::MAX)
    } else {
        DEFAULT_INTERVAL_MINUTES
    }
}

pub fn clamp_feed_limit(limit: i64) -> usize {
    let clamped = limit.clamp(MIN_FEED_LIMIT as i64, MAX_FEED_LIMIT as i64);
    clamped as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostTime {
    pub hour: u32,
    pub minute: u32,
}

impl FromStr for PostTime {
    type Err = SchedulingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || SchedulingError::InvalidTime {
            value: value.to_string(),
        };
        if !is_valid_time(value) {
            return Err(invalid());
        }
        let (hour, minute) = value.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            hour: hour.parse().map_err(|_| invalid())?,
            minute: minute.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for PostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Which cadence the scheduler should follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleMode {
    Daily(BTreeSet<PostTime>),
    Interval { minutes: u32 },
    Unscheduled,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScheduleConfig {
    times_of_day: BTreeSet<PostTime>,
    interval_minutes: Option<u32>,
    rejected: Vec<String>,
}

impl ScheduleConfig {
    /// Builds a schedule from the raw `post_times` list and interval setting.
    /// Invalid entries are kept aside so the scheduler can report them.
    pub fn from_settings(post_times: &str, interval_minutes: Option<i64>) -> Self {
        let mut times_of_day = BTreeSet::new();
        let mut rejected = Vec::new();

        for entry in post_times.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match entry.parse::<PostTime>() {
                Ok(time) => {
                    times_of_day.insert(time);
                }
                Err(_) => rejected.push(entry.to_string()),
            }
        }

        Self {
            times_of_day,
            interval_minutes: interval_minutes.map(sanitize_interval),
            rejected,
        }
    }

    pub fn daily<I: IntoIterator<Item = PostTime>>(times: I) -> Self {
        Self {
            times_of_day: times.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn every(minutes: i64) -> Self {
        Self {
            interval_minutes: Some(sanitize_interval(minutes)),
            ..Self::default()
        }
    }

    pub fn times_of_day(&self) -> &BTreeSet<PostTime> {
        &self.times_of_day
    }

    pub fn interval_minutes(&self) -> Option<u32> {
        self.interval_minutes
    }

    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    /// Daily times win over the interval whenever any are present.
    pub fn mode(&self) -> ScheduleMode {
        if !self.times_of_day.is_empty() {
            ScheduleMode::Daily(self.times_of_day.clone())
        } else if let Some(minutes) = self.interval_minutes {
            ScheduleMode::Interval { minutes }
        } else {
            ScheduleMode::Unscheduled
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PosterConfig {
    pub username: String,
    pub password: String,
    pub telemetry_url: String,
    pub live_weather_url: String,
    pub location: String,
    pub website_url: String,
    pub post_times: String,
    pub post_interval_minutes: i64,
    pub feed_limit: i64,
    pub api_base: String,
    pub database_url: String,
    pub log_filter: String,
}

impl Default for PosterConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            telemetry_url: String::new(),
            live_weather_url: String::new(),
            location: DEFAULT_LOCATION.to_string(),
            website_url: String::new(),
            post_times: String::new(),
            post_interval_minutes: i64::from(DEFAULT_INTERVAL_MINUTES),
            feed_limit: DEFAULT_FEED_LIMIT as i64,
            api_base: DEFAULT_API_BASE.to_string(),
            database_url: "sqlite://weather-poster.db".to_string(),
            log_filter: "weather_poster=info,background_service=info,bluesky_client=info"
                .to_string(),
        }
    }
}

impl fmt::Debug for PosterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PosterConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("telemetry_url", &self.telemetry_url)
            .field("live_weather_url", &self.live_weather_url)
            .field("location", &self.location)
            .field("website_url", &self.website_url)
            .field("post_times", &self.post_times)
            .field("post_interval_minutes", &self.post_interval_minutes)
            .field("feed_limit", &self.feed_limit)
            .field("api_base", &self.api_base)
            .field("database_url", &self.database_url)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

impl PosterConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let config = Self::from_toml_str(&raw)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Credentials from the environment take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var(USERNAME_ENV) {
            debug!("Using username from {}", USERNAME_ENV);
            self.username = username;
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            debug!("Using password from {}", PASSWORD_ENV);
            self.password = password;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::check_url("api_base", &self.api_base, true)?;
        Self::check_url("telemetry_url", &self.telemetry_url, false)?;
        Self::check_url("live_weather_url", &self.live_weather_url, false)?;
        Self::check_url("website_url", &self.website_url, false)?;
        Ok(())
    }

    fn check_url(field: &str, value: &str, required: bool) -> Result<(), ConfigError> {
        if value.is_empty() {
            return if required {
                Err(ConfigError::MissingField {
                    field: field.to_string(),
                })
            } else {
                Ok(())
            };
        }
        Url::parse(value).map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        })?;
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        if self.has_credentials() {
            Ok((&self.username, &self.password))
        } else {
            Err(ConfigError::MissingCredentials)
        }
    }

    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig::from_settings(&self.post_times, Some(self.post_interval_minutes))
    }

    pub fn feed_limit(&self) -> usize {
        clamp_feed_limit(self.feed_limit)
    }
}
