//! Source-weight configuration: an explicit TOML table mapping each
//! prediction source to its ensemble weight. The map is ordered by source
//! name so that combination always accumulates sources in the same order.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// The deserialized `[sources]` table of a weights file.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceWeights {
    sources: BTreeMap<String, f64>,
}

/// `Display`, `Error`, and `From` are implemented by hand because the
/// `source` field of `InvalidWeight` is a prediction-source name, not an
/// error cause, and `thiserror`'s derive would otherwise treat it as the
/// `Error::source()`.
#[derive(Debug)]
pub enum WeightsError {
    IoError(std::io::Error),
    TomlParseError(toml::de::Error),
    NoSources,
    InvalidWeight { source: String, value: f64 },
}

impl fmt::Display for WeightsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightsError::IoError(err) => write!(f, "Failed to read weights file: {err}"),
            WeightsError::TomlParseError(err) => {
                write!(f, "Failed to parse TOML weights file: {err}")
            }
            WeightsError::NoSources => write!(
                f,
                "The weights file declares no sources; at least one is required."
            ),
            WeightsError::InvalidWeight { source, value } => write!(
                f,
                "Weight for source '{source}' must be a finite, nonnegative number (found {value})."
            ),
        }
    }
}

impl std::error::Error for WeightsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WeightsError::IoError(err) => Some(err),
            WeightsError::TomlParseError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WeightsError {
    fn from(err: std::io::Error) -> Self {
        WeightsError::IoError(err)
    }
}

impl From<toml::de::Error> for WeightsError {
    fn from(err: toml::de::Error) -> Self {
        WeightsError::TomlParseError(err)
    }
}

impl SourceWeights {
    /// Loads and validates a weights file.
    pub fn load(path: &Path) -> Result<Self, WeightsError> {
        let contents = fs::read_to_string(path)?;
        let weights: SourceWeights = toml::from_str(&contents)?;
        weights.validate()?;
        log::info!(
            "Loaded {} source weights from {}",
            weights.sources.len(),
            path.display()
        );
        Ok(weights)
    }

    /// Builds a weight table directly, applying the same validation as `load`.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, WeightsError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let weights = SourceWeights {
            sources: pairs
                .into_iter()
                .map(|(name, weight)| (name.into(), weight))
                .collect(),
        };
        weights.validate()?;
        Ok(weights)
    }

    fn validate(&self) -> Result<(), WeightsError> {
        if self.sources.is_empty() {
            return Err(WeightsError::NoSources);
        }
        for (source, &value) in &self.sources {
            if !value.is_finite() || value < 0.0 {
                return Err(WeightsError::InvalidWeight {
                    source: source.clone(),
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Iterates sources in name order, the order combination must follow.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.sources.iter().map(|(name, &weight)| (name.as_str(), weight))
    }
}
