//! Error taxonomy for the retrieval path.

use reqwest::StatusCode;
use thiserror::Error;

use crate::model::Lookup;

/// Why the network path gave up.
#[derive(Debug, Error)]
pub enum NetworkCause {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream kept answering {0}")]
    Status(StatusCode),
}

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{message}")]
    NotFound { lookup: Lookup, message: String },

    #[error("API error for {lookup} (status {status}): {message}")]
    Api {
        lookup: Lookup,
        status: StatusCode,
        message: String,
    },

    #[error("network error for {lookup} after {attempts} attempt(s): {source}")]
    Network {
        lookup: Lookup,
        attempts: u32,
        #[source]
        source: NetworkCause,
    },
}

impl WeatherError {
    /// The city or coordinates the failed call was about, when known.
    pub fn lookup(&self) -> Option<&Lookup> {
        match self {
            Self::NotFound { lookup, .. }
            | Self::Api { lookup, .. }
            | Self::Network { lookup, .. } => Some(lookup),
            Self::Configuration(_) | Self::Validation(_) => None,
        }
    }

    /// Only a network failure makes falling back to cached data meaningful.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// One-line message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(msg) => format!("The service is not configured: {msg}"),
            Self::Validation(msg) => msg.clone(),
            Self::NotFound { message, .. } => message.clone(),
            Self::Api { message, .. } => {
                format!("The weather service rejected the request: {message}")
            }
            Self::Network { lookup, .. } => {
                format!("Could not reach the weather service for {lookup}. Check your connection.")
            }
        }
    }
}
