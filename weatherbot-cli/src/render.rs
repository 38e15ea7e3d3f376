//! Plain-text formatting of core results.

use std::fmt::Write;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use weatherbot_core::{
    AirQualityAnalysis, ForecastPoint, WeatherRecord,
    model::{forecast_days, points_on},
};

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn clock(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%H:%M UTC").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

fn place_name(record: &WeatherRecord) -> String {
    match (&record.location_name, &record.country) {
        (name, _) if name.is_empty() => record.coordinates.to_string(),
        (name, Some(country)) => format!("{name}, {country}"),
        (name, None) => name.clone(),
    }
}

pub fn weather(record: &WeatherRecord) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} Weather in {}",
        record.condition.icon(),
        place_name(record)
    );
    let _ = writeln!(
        out,
        "Temperature: {:.1}°C (feels like {:.1}°C)",
        record.temperature_c, record.feels_like_c
    );
    let _ = writeln!(out, "Humidity: {}%", record.humidity_pct);
    let _ = writeln!(out, "Pressure: {} hPa", record.pressure_hpa);

    let _ = match record.wind_direction_deg {
        Some(deg) => writeln!(out, "Wind: {} m/s ({deg}°)", record.wind_speed_mps),
        None => writeln!(out, "Wind: {} m/s", record.wind_speed_mps),
    };

    if let Some(visibility) = record.visibility_m {
        let _ = writeln!(out, "Visibility: {:.1} km", visibility / 1000.0);
    }
    let _ = write!(out, "{}", capitalize(&record.condition.description));

    out
}

pub fn stale_notice(record: &WeatherRecord) -> String {
    format!(
        "Showing cached data observed at {}; it may be out of date.",
        record.observation_time.format("%Y-%m-%d %H:%M UTC")
    )
}

fn local_offset(point: &ForecastPoint) -> FixedOffset {
    FixedOffset::east_opt(point.city.timezone_offset_secs).unwrap_or_else(|| Utc.fix())
}

pub fn forecast_overview(points: &[ForecastPoint]) -> String {
    let Some(first) = points.first() else {
        return "No forecast data.".to_string();
    };

    let mut out = format!("5-day forecast for {}\n", first.city.name);

    for (date, day) in forecast_days(points) {
        let min = day
            .iter()
            .map(|p| p.temperature_c)
            .fold(f64::INFINITY, f64::min);
        let max = day
            .iter()
            .map(|p| p.temperature_c)
            .fold(f64::NEG_INFINITY, f64::max);
        let _ = writeln!(
            out,
            "{} {}: {:.0}..{:.0}°C",
            date.format("%d.%m.%Y"),
            date.format("%A"),
            min,
            max
        );
    }

    out.trim_end().to_string()
}

pub fn forecast_day(points: &[ForecastPoint], date: NaiveDate) -> String {
    let day = points_on(points, date);
    let Some(first) = day.first() else {
        return "No data for the selected date.".to_string();
    };

    let mut out = format!(
        "Forecast for {} - {}\nCity: {}\n",
        date.format("%d.%m.%Y"),
        date.format("%A"),
        first.city.name
    );

    let offset = local_offset(first);
    for point in day {
        let _ = writeln!(
            out,
            "{} {}: {:.2}°C, {}",
            point.condition.icon(),
            point.time.with_timezone(&offset).format("%H:%M"),
            point.temperature_c,
            capitalize(&point.condition.description)
        );
    }

    out.trim_end().to_string()
}

pub fn extended(record: &WeatherRecord, analysis: &AirQualityAnalysis) -> String {
    let mut out = format!("Extended weather for {}\n\n", place_name(record));

    let _ = writeln!(out, "Temperature: {:.1}°C", record.temperature_c);
    let _ = writeln!(out, "Humidity: {}%", record.humidity_pct);
    let _ = writeln!(out, "Pressure: {} hPa", record.pressure_hpa);
    let _ = writeln!(out, "Wind: {} m/s", record.wind_speed_mps);
    if let Some(visibility) = record.visibility_m {
        let _ = writeln!(out, "Visibility: {:.1} km", visibility / 1000.0);
    }
    if let Some(clouds) = record.cloud_cover_pct {
        let _ = writeln!(out, "Cloud cover: {clouds}%");
    }
    let _ = writeln!(out, "Sunrise: {}", clock(record.sunrise));
    let _ = writeln!(out, "Sunset: {}", clock(record.sunset));

    let _ = writeln!(
        out,
        "\nAir quality: {} ({}/5)",
        analysis.overall_status(),
        analysis.overall_index()
    );
    if analysis.breakdown.is_some() {
        let _ = match analysis.worst_exceeded() {
            Some(r) => writeln!(
                out,
                "Above norm: {} : {:.2} µg/m³ - {}",
                r.pollutant, r.value, r.tier
            ),
            None => writeln!(out, "Above norm: none"),
        };
    }
    let _ = write!(out, "Conditions: {}", capitalize(&record.condition.description));

    out
}
