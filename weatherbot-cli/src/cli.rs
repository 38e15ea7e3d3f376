use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use inquire::{Confirm, Password, PasswordDisplayMode};
use weatherbot_core::{
    Config, Coordinates, Lookup, WeatherProvider, classify_air_quality, provider_from_config,
};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "weatherbot",
    version,
    about = "Weather, forecast and air quality from the terminal"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// A city name or a coordinate pair.
#[derive(Debug, Args)]
pub struct Place {
    /// City name, e.g. "Moscow".
    #[arg(conflicts_with_all = ["lat", "lon"])]
    pub city: Option<String>,

    /// Latitude in decimal degrees.
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude in decimal degrees.
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,
}

impl Place {
    pub fn lookup(&self) -> anyhow::Result<Lookup> {
        match (&self.city, self.lat, self.lon) {
            (Some(city), _, _) => Ok(Lookup::city(city.trim())),
            (None, Some(lat), Some(lon)) => Ok(Lookup::coordinates(lat, lon)),
            _ => bail!("Give a city name or both --lat and --lon."),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key (and optionally the response language).
    Configure {
        /// Prompted for when absent.
        #[arg(long)]
        api_key: Option<String>,

        /// Language for condition descriptions, e.g. "ru" or "en".
        #[arg(long)]
        lang: Option<String>,
    },

    /// Show current weather.
    Show {
        #[command(flatten)]
        place: Place,

        /// Only look in the local cache.
        #[arg(long)]
        cached: bool,
    },

    /// Show the 5-day forecast.
    Forecast {
        #[command(flatten)]
        place: Place,

        /// Day to show in detail, YYYY-MM-DD; lists available days if absent.
        #[arg(long)]
        date: Option<String>,
    },

    /// Show extended weather with an air-quality assessment.
    Air {
        #[command(flatten)]
        place: Place,

        /// Overall status only, no per-pollutant breakdown.
        #[arg(long)]
        brief: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { api_key, lang } => configure(api_key, lang),
            Command::Show { place, cached } => {
                let provider = load_provider()?;
                show(provider.as_ref(), place.lookup()?, cached).await
            }
            Command::Forecast { place, date } => {
                let provider = load_provider()?;
                let date = date.as_deref().map(parse_date).transpose()?;
                forecast(provider.as_ref(), place.lookup()?, date).await
            }
            Command::Air { place, brief } => {
                let provider = load_provider()?;
                air(provider.as_ref(), place.lookup()?, !brief).await
            }
        }
    }
}

fn load_provider() -> anyhow::Result<Box<dyn WeatherProvider>> {
    let config = Config::load()?;
    Ok(provider_from_config(&config)?)
}

fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{raw}', expected YYYY-MM-DD"))
}

fn configure(api_key: Option<String>, lang: Option<String>) -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = match api_key {
        Some(key) => key,
        None => Password::new("OpenWeather API key:")
            .without_confirmation()
            .with_display_mode(PasswordDisplayMode::Masked)
            .prompt()?,
    };

    let api_key = api_key.trim();
    if api_key.is_empty() {
        bail!("API key must not be empty");
    }
    config.set_api_key(api_key.to_string());

    if let Some(lang) = lang {
        config.lang = lang;
    }

    config.save()?;
    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn show(
    provider: &dyn WeatherProvider,
    lookup: Lookup,
    cached_only: bool,
) -> anyhow::Result<()> {
    if cached_only {
        return print_cached(provider, &lookup);
    }

    match provider.current_weather(&lookup).await {
        Ok(record) => {
            println!("{}", render::weather(&record));
            Ok(())
        }
        Err(err) if err.is_network() => {
            eprintln!("{}", err.user_message());

            let use_cache = Confirm::new("Show cached data instead?")
                .with_default(true)
                .with_help_message("cached data may be out of date")
                .prompt()?;

            if use_cache {
                print_cached(provider, &lookup)
            } else {
                Err(err.into())
            }
        }
        Err(err) => Err(err.into()),
    }
}

fn print_cached(provider: &dyn WeatherProvider, lookup: &Lookup) -> anyhow::Result<()> {
    let cached = match lookup {
        Lookup::City(city) => provider.cached_weather_by_city(city),
        Lookup::Coordinates(c) => provider.cached_weather_by_coordinates(c.lat, c.lon),
    };

    let Some(record) = cached else {
        bail!("No cached data for {lookup}");
    };

    println!("{}", render::stale_notice(&record));
    println!("{}", render::weather(&record));
    Ok(())
}

async fn coordinates_for(
    provider: &dyn WeatherProvider,
    lookup: &Lookup,
) -> anyhow::Result<Coordinates> {
    Ok(match lookup {
        Lookup::City(city) => provider.resolve_coordinates(city).await?,
        Lookup::Coordinates(c) => *c,
    })
}

async fn forecast(
    provider: &dyn WeatherProvider,
    lookup: Lookup,
    date: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let coords = coordinates_for(provider, &lookup).await?;
    let points = provider.forecast(coords.lat, coords.lon).await?;

    let text = match date {
        Some(date) => render::forecast_day(&points, date),
        None => render::forecast_overview(&points),
    };
    println!("{text}");
    Ok(())
}

async fn air(
    provider: &dyn WeatherProvider,
    lookup: Lookup,
    extended: bool,
) -> anyhow::Result<()> {
    let record = provider.current_weather(&lookup).await?;
    let coords = record.coordinates;

    let components = provider.fetch_air_quality(coords.lat, coords.lon).await?;
    let analysis = classify_air_quality(&components, extended);

    println!("{}", render::extended(&record, &analysis));
    Ok(())
}
