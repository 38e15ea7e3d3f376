//! Air-quality classification from raw pollutant concentrations (µg/m³).

use std::fmt;

use serde::Serialize;

/// Severity on the 1–5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Tier {
    Good = 1,
    Fair = 2,
    Moderate = 3,
    Poor = 4,
    VeryPoor = 5,
}

impl Tier {
    const ALL: [Tier; 5] = [Tier::Good, Tier::Fair, Tier::Moderate, Tier::Poor, Tier::VeryPoor];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Good => "Good",
            Tier::Fair => "Fair",
            Tier::Moderate => "Moderate",
            Tier::Poor => "Poor",
            Tier::VeryPoor => "Very Poor",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Pollutant {
    So2,
    No2,
    Pm10,
    Pm2_5,
    O3,
    Co,
}

impl Pollutant {
    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "so2" => Some(Self::So2),
            "no2" => Some(Self::No2),
            "pm10" => Some(Self::Pm10),
            "pm2_5" | "pm2.5" => Some(Self::Pm2_5),
            "o3" => Some(Self::O3),
            "co" => Some(Self::Co),
            _ => None,
        }
    }

    /// Key used by the upstream API.
    pub fn key(self) -> &'static str {
        match self {
            Self::So2 => "so2",
            Self::No2 => "no2",
            Self::Pm10 => "pm10",
            Self::Pm2_5 => "pm2_5",
            Self::O3 => "o3",
            Self::Co => "co",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::So2 => "SO2",
            Self::No2 => "NO2",
            Self::Pm10 => "PM10",
            Self::Pm2_5 => "PM2.5",
            Self::O3 => "O3",
            Self::Co => "CO",
        }
    }

    /// Lower bounds of tiers 1..=5; each tier runs up to the next bound, the last is open.
    fn thresholds(self) -> [f64; 5] {
        match self {
            Self::So2 => [0.0, 20.0, 80.0, 250.0, 350.0],
            Self::No2 => [0.0, 40.0, 70.0, 150.0, 200.0],
            Self::Pm10 => [0.0, 20.0, 50.0, 100.0, 200.0],
            Self::Pm2_5 => [0.0, 10.0, 25.0, 50.0, 75.0],
            Self::O3 => [0.0, 60.0, 100.0, 140.0, 180.0],
            Self::Co => [0.0, 4400.0, 9400.0, 12400.0, 15400.0],
        }
    }

    /// The tier whose `[min, max)` bracket holds `value`, if any.
    pub fn tier_for(self, value: f64) -> Option<Tier> {
        let bounds = self.thresholds();

        (0..bounds.len()).find_map(|i| {
            let upper = bounds.get(i + 1).copied().unwrap_or(f64::INFINITY);
            (bounds[i] <= value && value < upper).then_some(Tier::ALL[i])
        })
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pollutant concentrations keyed as the source API names them, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AirQualityComponents {
    values: Vec<(String, Option<f64>)>,
}

impl AirQualityComponents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Option<f64>) {
        self.values.push((key.into(), value));
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for AirQualityComponents
where
    K: Into<String>,
    V: Into<Option<f64>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PollutantReading {
    pub pollutant: Pollutant,
    pub value: f64,
    pub tier: Tier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirQualityBreakdown {
    /// Readings at `Fair` or worse, worst first.
    pub exceeded_norms: Vec<PollutantReading>,
    /// Every classified reading, in source order.
    pub details: Vec<PollutantReading>,
}

impl AirQualityBreakdown {
    pub fn reading(&self, pollutant: Pollutant) -> Option<&PollutantReading> {
        self.details.iter().find(|r| r.pollutant == pollutant)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirQualityAnalysis {
    pub overall: Tier,
    /// Present only for extended analysis.
    pub breakdown: Option<AirQualityBreakdown>,
}

impl AirQualityAnalysis {
    pub fn overall_index(&self) -> u8 {
        self.overall.index()
    }

    pub fn overall_status(&self) -> &'static str {
        self.overall.label()
    }

    pub fn worst_exceeded(&self) -> Option<&PollutantReading> {
        self.breakdown.as_ref().and_then(|b| b.exceeded_norms.first())
    }
}

/// Classifies every known pollutant and reports the worst one as the overall status.
pub fn classify(components: &AirQualityComponents, extended: bool) -> AirQualityAnalysis {
    let details: Vec<PollutantReading> = components
        .iter()
        .filter_map(|(key, value)| {
            let pollutant = Pollutant::from_key(key)?;
            let value = value?;
            let tier = pollutant.tier_for(value)?;
            Some(PollutantReading {
                pollutant,
                value,
                tier,
            })
        })
        .collect();

    let mut overall = Tier::Good;
    for reading in &details {
        if reading.tier > overall {
            overall = reading.tier;
        }
    }

    let breakdown = extended.then(|| {
        let mut exceeded_norms: Vec<PollutantReading> = details
            .iter()
            .filter(|r| r.tier >= Tier::Fair)
            .copied()
            .collect();
        // stable: equal tiers keep source order
        exceeded_norms.sort_by(|a, b| b.tier.cmp(&a.tier));

        AirQualityBreakdown {
            exceeded_norms,
            details,
        }
    });

    AirQualityAnalysis { overall, breakdown }
}
