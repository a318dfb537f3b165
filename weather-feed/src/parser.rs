//! Reader for the station's `clientraw.txt` feed.
//!
//! The feed is a single line of space separated values whose meaning is
//! fixed by position. Only four positions are used:
//!
//! | index | value                    |
//! |-------|--------------------------|
//! | 1     | wind speed (km/h)        |
//! | 3     | wind direction (degrees) |
//! | 4     | temperature (°C)         |
//! | 5     | humidity (%)             |

use std::sync::Arc;
use tracing::warn;
use weather_core::{
    ActivityLog, ConfigError, CoreError, FormatError, HttpTransport, TransportError,
    UploadStatus, WeatherSnapshot,
};

pub const MIN_FIELDS: usize = 6;

const WIND_SPEED: usize = 1;
const WIND_DIRECTION: usize = 3;
const TEMPERATURE: usize = 4;
const HUMIDITY: usize = 5;

pub const USER_AGENT: &str = concat!("weather-poster/", env!("CARGO_PKG_VERSION"));

pub const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Maps a bearing in degrees onto one of 16 compass points, 22.5° apart.
pub fn wind_direction(degrees: f64) -> &'static str {
    if !degrees.is_finite() {
        return COMPASS_POINTS[0];
    }
    let sector = (degrees / 22.5).round() as i64;
    COMPASS_POINTS[sector.rem_euclid(16) as usize]
}

fn numeric_field(fields: &[&str], index: usize) -> f64 {
    fields
        .get(index)
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

fn round_to_tenth(value: f64) -> f64 {
    let rounded = (value * 10.0).round() / 10.0;
    // avoid printing "-0"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Decodes one feed body. Extra trailing fields are ignored.
pub fn parse_clientraw(body: &str) -> Result<WeatherSnapshot, FormatError> {
    let content = body.trim();
    if content.is_empty() {
        return Err(FormatError::EmptyFeed);
    }

    let fields: Vec<&str> = content.split(' ').collect();
    if fields.len() < MIN_FIELDS {
        return Err(FormatError::TooFewFields {
            found: fields.len(),
            required: MIN_FIELDS,
        });
    }

    Ok(WeatherSnapshot {
        temperature_c: round_to_tenth(numeric_field(&fields, TEMPERATURE)),
        humidity_pct: numeric_field(&fields, HUMIDITY).round() as i64,
        wind_speed_kmh: numeric_field(&fields, WIND_SPEED).round() as i64,
        wind_direction: wind_direction(numeric_field(&fields, WIND_DIRECTION)).to_string(),
    })
}

pub struct TelemetryParser<T> {
    transport: T,
    log: Arc<ActivityLog>,
}

impl<T: HttpTransport> TelemetryParser<T> {
    pub fn new(transport: T, log: Arc<ActivityLog>) -> Self {
        Self { transport, log }
    }

    /// Fetches and decodes the feed. Every call leaves one upload-log entry.
    pub async fn fetch(&self, url: &str) -> Result<WeatherSnapshot, CoreError> {
        match self.fetch_weather_data(url).await {
            Ok(snapshot) => {
                let details = serde_json::to_string(&snapshot)
                    .unwrap_or_else(|_| format!("{:?}", snapshot));
                self.log
                    .debug(format!("Weather data fetched: {}", details));
                self.log.upload(UploadStatus::Success, details);
                Ok(snapshot)
            }
            Err(e) => {
                warn!("Telemetry fetch from {} failed: {}", url, e);
                self.log.upload(UploadStatus::Failed, "No data");
                Err(e)
            }
        }
    }

    async fn fetch_weather_data(&self, url: &str) -> Result<WeatherSnapshot, CoreError> {
        if url.is_empty() {
            self.log.debug("Fetch failed: Empty clientraw URL");
            return Err(ConfigError::MissingField {
                field: "telemetry_url".to_string(),
            }
            .into());
        }

        self.log
            .debug(format!("Fetching clientraw.txt from: {}", url));
        let response = match self.transport.get(url, &[], None).await {
            Ok(response) => response,
            Err(e) => {
                self.log.debug(format!("Fetch failed: {}", e));
                return Err(e);
            }
        };

        if !response.is_ok() {
            self.log
                .debug(format!("Fetch failed: HTTP {}", response.status));
            return Err(TransportError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status,
            }
            .into());
        }

        parse_clientraw(&response.body).map_err(|e| {
            self.log.debug(format!("Fetch failed: {}", e));
            e.into()
        })
    }
}
