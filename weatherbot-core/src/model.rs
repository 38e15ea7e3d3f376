use std::{collections::BTreeMap, fmt, sync::Arc};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::provider::openweather;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both axes differ by at most `tolerance` (a box, not a radius).
    pub fn within(&self, other: &Coordinates, tolerance: f64) -> bool {
        (self.lat - other.lat).abs() <= tolerance && (self.lon - other.lon).abs() <= tolerance
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// What a caller asked for: a free-text city or a coordinate pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    City(String),
    Coordinates(Coordinates),
}

impl Lookup {
    pub fn city(name: impl Into<String>) -> Self {
        Lookup::City(name.into())
    }

    pub fn coordinates(lat: f64, lon: f64) -> Self {
        Lookup::Coordinates(Coordinates::new(lat, lon))
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::City(name) => write!(f, "city '{name}'"),
            Lookup::Coordinates(c) => write!(f, "coordinates {c}"),
        }
    }
}

/// Primary weather condition as reported upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Upstream condition id, e.g. 500 for light rain.
    pub code: u32,
    /// Condition group, e.g. "Rain" or "Clouds".
    pub group: String,
    pub description: String,
}

impl Condition {
    /// Emoji used by the chat front end for this condition.
    pub fn icon(&self) -> &'static str {
        let group = self.group.to_lowercase();

        if group.contains("clear") {
            "☀️"
        } else if group.contains("clouds") {
            if (801..=802).contains(&self.code) {
                "⛅"
            } else {
                "☁️"
            }
        } else if group.contains("drizzle") {
            "🌦️"
        } else if group.contains("rain") {
            "🌧️"
        } else if group.contains("thunderstorm") {
            "⛈️"
        } else if group.contains("snow") {
            "❄️"
        } else if group.contains("mist") || group.contains("fog") {
            "🌫️"
        } else {
            "🌤️"
        }
    }
}

/// Normalized snapshot of current conditions for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub location_name: String,
    pub country: Option<String>,
    pub coordinates: Coordinates,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity_pct: u8,
    pub pressure_hpa: f64,
    pub wind_speed_mps: f64,
    pub wind_direction_deg: Option<f64>,
    pub visibility_m: Option<f64>,
    pub cloud_cover_pct: Option<u8>,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub condition: Condition,
    pub observation_time: DateTime<Utc>,
}

/// Location metadata from a forecast envelope, shared by every point.
#[derive(Debug, Clone, PartialEq)]
pub struct CityInfo {
    pub name: String,
    pub country: Option<String>,
    pub coordinates: Coordinates,
    pub timezone_offset_secs: i32,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
}

/// One 3-hour slice of a 5-day forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPoint {
    pub time: DateTime<Utc>,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity_pct: u8,
    pub condition: Condition,
    pub city: Arc<CityInfo>,
}

/// Groups forecast points by UTC calendar day, days in chronological order.
pub fn forecast_days(points: &[ForecastPoint]) -> BTreeMap<NaiveDate, Vec<&ForecastPoint>> {
    let mut days: BTreeMap<NaiveDate, Vec<&ForecastPoint>> = BTreeMap::new();
    for point in points {
        days.entry(point.time.date_naive()).or_default().push(point);
    }
    days
}

pub fn points_on(points: &[ForecastPoint], date: NaiveDate) -> Vec<&ForecastPoint> {
    points.iter().filter(|p| p.time.date_naive() == date).collect()
}

/// A cached weather record together with the key(s) it was fetched by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub fetched_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_weather_data")]
    pub weather_data: WeatherRecord,
}

impl CacheEntry {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }

    pub fn matches_city(&self, city: &str) -> bool {
        self.city
            .as_deref()
            .is_some_and(|stored| stored.to_lowercase() == city.to_lowercase())
    }
}

/// Accepts RFC 3339 as well as naive ISO-8601 timestamps (read as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Accepts a normalized record or the raw current-weather payload that older
/// cache files stored verbatim.
fn deserialize_weather_data<'de, D>(deserializer: D) -> Result<WeatherRecord, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;

    if raw.get("location_name").is_some() {
        return WeatherRecord::deserialize(raw).map_err(serde::de::Error::custom);
    }

    openweather::record_from_payload(raw).map_err(serde::de::Error::custom)
}
