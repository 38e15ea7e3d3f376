use crate::{
    Config,
    air_quality::AirQualityComponents,
    cache::{DEFAULT_TOLERANCE, WeatherCache},
    error::WeatherError,
    model::{Coordinates, ForecastPoint, Lookup, WeatherRecord},
    provider::openweather::OpenWeatherProvider,
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

/// Everything the chat and CLI front ends need from the weather backend.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Top geocoding match for a free-text city name.
    async fn resolve_coordinates(&self, city: &str) -> Result<Coordinates, WeatherError>;

    /// Current weather; the result is also written to the cache.
    async fn current_weather_by_coordinates(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<WeatherRecord, WeatherError>;

    /// Current weather; cached under the city name and the returned coordinates.
    async fn current_weather_by_city(&self, city: &str) -> Result<WeatherRecord, WeatherError>;

    /// 5-day forecast in 3-hour steps, chronological. Not cached.
    async fn forecast(&self, lat: f64, lon: f64) -> Result<Vec<ForecastPoint>, WeatherError>;

    /// Pollutant concentrations of the first available timestep.
    async fn fetch_air_quality(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<AirQualityComponents, WeatherError>;

    fn cache(&self) -> &WeatherCache;

    async fn current_weather(&self, lookup: &Lookup) -> Result<WeatherRecord, WeatherError> {
        match lookup {
            Lookup::City(city) => self.current_weather_by_city(city).await,
            Lookup::Coordinates(c) => self.current_weather_by_coordinates(c.lat, c.lon).await,
        }
    }

    fn cached_weather_by_city(&self, city: &str) -> Option<WeatherRecord> {
        self.cache().find_by_city(city)
    }

    fn cached_weather_by_coordinates(&self, lat: f64, lon: f64) -> Option<WeatherRecord> {
        self.cache().find_by_coordinates(lat, lon, DEFAULT_TOLERANCE)
    }
}

/// Construct the provider from config. Fails before any network call when the
/// API key is missing.
pub fn provider_from_config(config: &Config) -> Result<Box<dyn WeatherProvider>, WeatherError> {
    Ok(Box::new(OpenWeatherProvider::from_config(config)?))
}
