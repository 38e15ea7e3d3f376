use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    Config,
    air_quality::AirQualityComponents,
    cache::WeatherCache,
    config::Endpoints,
    error::WeatherError,
    http::{HttpReply, RetryingFetcher},
    model::{CityInfo, Condition, Coordinates, ForecastPoint, Lookup, WeatherRecord},
};

use super::WeatherProvider;

const GEOCODING_PATH: &str = "/geo/1.0/direct";
const WEATHER_PATH: &str = "/data/2.5/weather";
const FORECAST_PATH: &str = "/data/2.5/forecast";
const AIR_POLLUTION_PATH: &str = "/data/2.5/air_pollution";

const CITY_NOT_FOUND: &str = "No city with that name was found";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    lang: String,
    units: String,
    endpoints: Endpoints,
    fetcher: RetryingFetcher,
    cache: WeatherCache,
}

impl OpenWeatherProvider {
    pub fn from_config(config: &Config) -> Result<Self, WeatherError> {
        let api_key = config.require_api_key()?.to_owned();
        let fetcher = RetryingFetcher::new(&config.retry)
            .map_err(|e| WeatherError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            lang: config.lang.clone(),
            units: config.units.clone(),
            endpoints: config.endpoints.clone(),
            fetcher,
            cache: WeatherCache::new(config.cache_file_path(), config.cache.capacity),
        })
    }

    fn url(base: &str, path: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    fn located_query(&self, coordinates: Coordinates) -> Vec<(&'static str, String)> {
        vec![
            ("lat", coordinates.lat.to_string()),
            ("lon", coordinates.lon.to_string()),
            ("appid", self.api_key.clone()),
            ("units", self.units.clone()),
            ("lang", self.lang.clone()),
        ]
    }

    /// GET through the retrying fetcher and decode a 200 body into `T`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        lookup: &Lookup,
    ) -> Result<T, WeatherError> {
        let reply = self.fetcher.get(url, query).await.map_err(|e| WeatherError::Network {
            lookup: lookup.clone(),
            attempts: e.attempts,
            source: e.cause,
        })?;

        if reply.status != StatusCode::OK {
            return Err(reply_error(&reply, lookup));
        }

        serde_json::from_str(&reply.body).map_err(|e| WeatherError::Api {
            lookup: lookup.clone(),
            status: reply.status,
            message: format!("malformed response: {e}"),
        })
    }

    /// Best-effort cache write; failures are logged and dropped.
    fn remember(
        &self,
        record: &WeatherRecord,
        city: Option<&str>,
        coordinates: Option<Coordinates>,
    ) {
        if let Err(e) = self.cache.record_entry(record, city, coordinates) {
            tracing::warn!("weather cache not updated: {}", e);
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn resolve_coordinates(&self, city: &str) -> Result<Coordinates, WeatherError> {
        let city = non_empty_city(city)?;
        let lookup = Lookup::city(city);
        let url = Self::url(&self.endpoints.geocoding, GEOCODING_PATH);
        let query = [
            ("q", city.to_string()),
            ("limit", "1".to_string()),
            ("appid", self.api_key.clone()),
            ("lang", self.lang.clone()),
        ];

        let matches: Vec<OwGeoMatch> = self.get_json(&url, &query, &lookup).await?;

        let top = matches.first().ok_or_else(|| WeatherError::NotFound {
            lookup: lookup.clone(),
            message: format!("City '{city}' was not found"),
        })?;

        tracing::debug!(city, lat = top.lat, lon = top.lon, "geocoded");
        Ok(Coordinates::new(top.lat, top.lon))
    }

    async fn current_weather_by_coordinates(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<WeatherRecord, WeatherError> {
        let coordinates = Coordinates::new(lat, lon);
        let lookup = Lookup::Coordinates(coordinates);
        let url = Self::url(&self.endpoints.data, WEATHER_PATH);
        let query = self.located_query(coordinates);

        let parsed: OwCurrentResponse = self.get_json(&url, &query, &lookup).await?;
        let record = parsed.into_record(&lookup)?;

        self.remember(&record, None, Some(coordinates));
        Ok(record)
    }

    async fn current_weather_by_city(&self, city: &str) -> Result<WeatherRecord, WeatherError> {
        let city = non_empty_city(city)?;
        let lookup = Lookup::city(city);
        let url = Self::url(&self.endpoints.data, WEATHER_PATH);
        let query = [
            ("q", city.to_string()),
            ("appid", self.api_key.clone()),
            ("units", self.units.clone()),
            ("lang", self.lang.clone()),
        ];

        let parsed: OwCurrentResponse = self.get_json(&url, &query, &lookup).await?;
        let record = parsed.into_record(&lookup)?;

        // stored under both keys so either lookup mode finds it later
        self.remember(&record, Some(city), Some(record.coordinates));
        Ok(record)
    }

    async fn forecast(&self, lat: f64, lon: f64) -> Result<Vec<ForecastPoint>, WeatherError> {
        let coordinates = Coordinates::new(lat, lon);
        let lookup = Lookup::Coordinates(coordinates);
        let url = Self::url(&self.endpoints.data, FORECAST_PATH);
        let query = self.located_query(coordinates);

        let parsed: OwForecastResponse = self.get_json(&url, &query, &lookup).await?;

        let city = Arc::new(parsed.city.into_city_info());

        parsed
            .list
            .into_iter()
            .map(|entry| -> Result<ForecastPoint, WeatherError> {
                let time = unix_to_utc(entry.dt)
                    .ok_or_else(|| malformed(&lookup, "bad forecast timestamp"))?;

                Ok(ForecastPoint {
                    time,
                    temperature_c: entry.main.temp,
                    feels_like_c: entry.main.feels_like,
                    humidity_pct: entry.main.humidity,
                    condition: first_condition(entry.weather, &lookup)?,
                    city: Arc::clone(&city),
                })
            })
            .collect()
    }

    async fn fetch_air_quality(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<AirQualityComponents, WeatherError> {
        let lookup = Lookup::coordinates(lat, lon);
        let url = Self::url(&self.endpoints.data, AIR_POLLUTION_PATH);
        let query = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("appid", self.api_key.clone()),
        ];

        let parsed: OwAirResponse = self.get_json(&url, &query, &lookup).await?;

        let first = parsed
            .list
            .into_iter()
            .next()
            .ok_or_else(|| WeatherError::NotFound {
                lookup: lookup.clone(),
                message: "No air-quality data is available for this location".to_string(),
            })?;

        Ok(first.components.into_components())
    }

    fn cache(&self) -> &WeatherCache {
        &self.cache
    }
}

fn non_empty_city(city: &str) -> Result<&str, WeatherError> {
    let city = city.trim();
    if city.is_empty() {
        return Err(WeatherError::Validation("City name must not be empty".to_string()));
    }
    Ok(city)
}

fn malformed(lookup: &Lookup, what: &str) -> WeatherError {
    WeatherError::Api {
        lookup: lookup.clone(),
        status: StatusCode::OK,
        message: format!("malformed response: {what}"),
    }
}

/// Maps a non-200 reply to `NotFound` or `Api`, keeping the upstream message.
fn reply_error(reply: &HttpReply, lookup: &Lookup) -> WeatherError {
    let upstream = serde_json::from_str::<OwErrorBody>(&reply.body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty());

    match upstream {
        Some(message) if message.to_lowercase().contains("city not found") => {
            WeatherError::NotFound {
                lookup: lookup.clone(),
                message: CITY_NOT_FOUND.to_string(),
            }
        }
        Some(message) => WeatherError::Api {
            lookup: lookup.clone(),
            status: reply.status,
            message,
        },
        None => WeatherError::Api {
            lookup: lookup.clone(),
            status: reply.status,
            message: format!("HTTP {}: {}", reply.status, truncate_body(&reply.body)),
        },
    }
}

fn first_condition(weather: Vec<OwWeather>, lookup: &Lookup) -> Result<Condition, WeatherError> {
    let w = weather
        .into_iter()
        .next()
        .ok_or_else(|| malformed(lookup, "no weather conditions"))?;

    Ok(Condition {
        code: w.id,
        group: w.main,
        description: w.description,
    })
}

/// Normalizes a raw current-weather payload, as older cache files stored it.
pub(crate) fn record_from_payload(payload: Value) -> Result<WeatherRecord, String> {
    let parsed: OwCurrentResponse = serde_json::from_value(payload).map_err(|e| e.to_string())?;
    let lookup = Lookup::coordinates(parsed.coord.lat, parsed.coord.lon);

    parsed.into_record(&lookup).map_err(|e| e.to_string())
}

#[derive(Debug, Deserialize)]
struct OwErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwGeoMatch {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    id: u32,
    main: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwClouds {
    all: u8,
}

#[derive(Debug, Default, Deserialize)]
struct OwSys {
    country: Option<String>,
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    coord: OwCoord,
    weather: Vec<OwWeather>,
    main: OwMain,
    visibility: Option<f64>,
    wind: OwWind,
    clouds: Option<OwClouds>,
    dt: i64,
    #[serde(default)]
    sys: OwSys,
    name: String,
}

impl OwCurrentResponse {
    fn into_record(self, lookup: &Lookup) -> Result<WeatherRecord, WeatherError> {
        let observation_time =
            unix_to_utc(self.dt).ok_or_else(|| malformed(lookup, "bad observation time"))?;

        Ok(WeatherRecord {
            location_name: self.name,
            country: self.sys.country,
            coordinates: Coordinates::new(self.coord.lat, self.coord.lon),
            temperature_c: self.main.temp,
            feels_like_c: self.main.feels_like,
            humidity_pct: self.main.humidity,
            pressure_hpa: self.main.pressure,
            wind_speed_mps: self.wind.speed,
            wind_direction_deg: self.wind.deg,
            visibility_m: self.visibility,
            cloud_cover_pct: self.clouds.map(|c| c.all),
            sunrise: self.sys.sunrise.and_then(unix_to_utc),
            sunset: self.sys.sunset.and_then(unix_to_utc),
            condition: first_condition(self.weather, lookup)?,
            observation_time,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OwCity {
    name: String,
    country: Option<String>,
    coord: OwCoord,
    #[serde(default)]
    timezone: i32,
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

impl OwCity {
    fn into_city_info(self) -> CityInfo {
        CityInfo {
            name: self.name,
            country: self.country,
            coordinates: Coordinates::new(self.coord.lat, self.coord.lon),
            timezone_offset_secs: self.timezone,
            sunrise: self.sunrise.and_then(unix_to_utc),
            sunset: self.sunset.and_then(unix_to_utc),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    city: OwCity,
    list: Vec<OwForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct OwAirComponents {
    co: Option<f64>,
    no: Option<f64>,
    no2: Option<f64>,
    o3: Option<f64>,
    so2: Option<f64>,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
    nh3: Option<f64>,
}

impl OwAirComponents {
    /// Keeps the upstream key order.
    fn into_components(self) -> AirQualityComponents {
        [
            ("co", self.co),
            ("no", self.no),
            ("no2", self.no2),
            ("o3", self.o3),
            ("so2", self.so2),
            ("pm2_5", self.pm2_5),
            ("pm10", self.pm10),
            ("nh3", self.nh3),
        ]
        .into_iter()
        .collect()
    }
}

#[derive(Debug, Deserialize)]
struct OwAirEntry {
    components: OwAirComponents,
}

#[derive(Debug, Deserialize)]
struct OwAirResponse {
    #[serde(default)]
    list: Vec<OwAirEntry>,
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
