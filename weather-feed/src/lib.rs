pub mod composer;
pub mod parser;

pub use composer::{compose, format_weather_update, HASHTAG};
pub use parser::{parse_clientraw, wind_direction, TelemetryParser, MIN_FIELDS, USER_AGENT};
