//! Core library behind the weather chat bot and the `weatherbot` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - A retrying HTTP fetcher with exponential backoff
//! - Geocoding, current weather, forecast and air-pollution retrieval
//! - A small file-backed cache of recent results for offline fallback
//! - Air-quality classification
//!
//! Front ends consume plain data structures and format them themselves.

pub mod air_quality;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod provider;

pub use air_quality::{
    AirQualityAnalysis, AirQualityComponents, Pollutant, Tier, classify as classify_air_quality,
};
pub use cache::WeatherCache;
pub use config::Config;
pub use error::{NetworkCause, WeatherError};
pub use model::{CityInfo, Condition, Coordinates, ForecastPoint, Lookup, WeatherRecord};
pub use provider::{WeatherProvider, provider_from_config};
