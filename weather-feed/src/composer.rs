use weather_core::WeatherSnapshot;

pub const HASHTAG: &str = "#weather";

/// The three reading lines, each ending in a newline.
pub fn format_weather_update(snapshot: &WeatherSnapshot) -> String {
    format!(
        "🌡️ Temperature: {}°C\n💧 Humidity: {}%\n💨 Wind: {} km/h {}\n",
        snapshot.temperature_c,
        snapshot.humidity_pct,
        snapshot.wind_speed_kmh,
        snapshot.wind_direction
    )
}

/// Builds the post body. The link line is only present when `website_url`
/// is non-empty.
pub fn compose(snapshot: &WeatherSnapshot, location: &str, website_url: &str) -> String {
    let mut text = format!("📍 {}\n\n", location);
    text.push_str(&format_weather_update(snapshot));
    text.push(' ');
    text.push_str(HASHTAG);

    if !website_url.is_empty() {
        text.push_str("\n\n🌐 ");
        text.push_str(website_url);
    }

    text
}
