//! File-backed cache of recently fetched weather records.
//!
//! Entries are kept newest first and capped; lookups return the most recently
//! inserted match. The file is opened, read or written, and closed on every
//! call. There is no cross-process locking: concurrent writers race and the
//! last one wins.

use std::{
    collections::VecDeque,
    fs, io,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{CacheEntry, Coordinates, Lookup, WeatherRecord};

/// Upper bound on stored entries; a configured capacity above it is clamped.
pub const DEFAULT_CAPACITY: usize = 10;
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// A sequence with insert-front / evict-tail semantics and a fixed capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedRecent<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedRecent<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Builds from items already ordered newest first, dropping any overflow.
    pub fn from_newest_first(items: impl IntoIterator<Item = T>, capacity: usize) -> Self {
        let mut items: VecDeque<T> = items.into_iter().collect();
        items.truncate(capacity);
        Self { items, capacity }
    }

    /// Prepends `item`, returning whatever fell off the tail.
    pub fn push_front(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        self.items.push_front(item);
        if self.items.len() > self.capacity {
            self.items.pop_back()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, Error)]
pub enum CacheWriteError {
    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Serialize)]
struct CacheDocument<'a> {
    cache: Vec<&'a CacheEntry>,
}

#[derive(Debug, Clone)]
pub struct WeatherCache {
    path: PathBuf,
    capacity: usize,
}

impl WeatherCache {
    /// `capacity` is clamped to [`DEFAULT_CAPACITY`].
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.min(DEFAULT_CAPACITY),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cache file. A missing or unreadable file is an empty cache.
    pub fn load(&self) -> BoundedRecent<CacheEntry> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::debug!(path = %self.path.display(), "cannot read cache: {}", e);
                }
                return BoundedRecent::new(self.capacity);
            }
        };

        BoundedRecent::from_newest_first(parse_entries(&contents), self.capacity)
    }

    /// Prepends a new entry stamped with the current time and rewrites the file.
    ///
    /// Fire-and-forget: callers are expected to log and drop the error, never
    /// to fail their own operation because of it.
    pub fn record_entry(
        &self,
        record: &WeatherRecord,
        city: Option<&str>,
        coordinates: Option<Coordinates>,
    ) -> Result<(), CacheWriteError> {
        let entry = CacheEntry {
            city: city.map(str::to_string),
            lat: coordinates.map(|c| c.lat),
            lon: coordinates.map(|c| c.lon),
            fetched_at: Utc::now(),
            weather_data: record.clone(),
        };

        let mut entries = self.load();
        entries.push_front(entry);
        self.persist(&entries)
    }

    /// Case-insensitive exact match on the stored city name.
    pub fn find_by_city(&self, city: &str) -> Option<WeatherRecord> {
        self.load()
            .iter()
            .find(|entry| entry.matches_city(city))
            .map(|entry| entry.weather_data.clone())
    }

    /// Any entry whose stored coordinates lie within `tolerance` on both axes.
    pub fn find_by_coordinates(
        &self,
        lat: f64,
        lon: f64,
        tolerance: f64,
    ) -> Option<WeatherRecord> {
        let wanted = Coordinates::new(lat, lon);

        self.load()
            .iter()
            .find(|entry| {
                entry
                    .coordinates()
                    .is_some_and(|c| c.within(&wanted, tolerance))
            })
            .map(|entry| entry.weather_data.clone())
    }

    pub fn find(&self, lookup: &Lookup) -> Option<WeatherRecord> {
        match lookup {
            Lookup::City(city) => self.find_by_city(city),
            Lookup::Coordinates(c) => self.find_by_coordinates(c.lat, c.lon, DEFAULT_TOLERANCE),
        }
    }

    fn persist(&self, entries: &BoundedRecent<CacheEntry>) -> Result<(), CacheWriteError> {
        let doc = CacheDocument {
            cache: entries.iter().collect(),
        };
        let json = serde_json::to_string_pretty(&doc)?;

        let io_err = |source: io::Error| CacheWriteError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        // readers see either the old or the new document, never half of one
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        Ok(())
    }
}

/// Normalizes the accepted file shapes to a newest-first list:
/// `{"cache": [...]}`, a bare list, or a single bare entry.
fn parse_entries(contents: &str) -> Vec<CacheEntry> {
    let value: Value = match serde_json::from_str(contents) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("cache file is not valid JSON, ignoring it: {}", e);
            return Vec::new();
        }
    };

    let raw = match value {
        Value::Object(map) if map.contains_key("weather_data") => vec![Value::Object(map)],
        Value::Object(mut map) => match map.remove("cache") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Value::Array(items) => items,
        _ => Vec::new(),
    };

    raw.into_iter()
        .filter_map(|item| match serde_json::from_value::<CacheEntry>(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("skipping malformed cache entry: {}", e);
                None
            }
        })
        .collect()
}
