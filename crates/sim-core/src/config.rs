//! Tuning parameters for a new game, loadable from YAML.

use crate::clock::epoch;
use crate::market::Company;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A company to list when a new game starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub name: String,
    pub value: Decimal,
}

/// Game configuration. Every key is optional in the YAML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Milliseconds between market movements.
    pub ticker_interval_ms: u64,
    /// Size of the recently-changed companies preview.
    pub max_previewed_companies: usize,
    /// Milliseconds between refreshes of time-dependent values.
    pub time_watch_interval_ms: u64,
    /// Seed for the market's random movements.
    pub rng_seed: u64,
    /// Largest fractional move of a share value per tick (0.05 = 5%).
    pub max_swing: f64,
    pub starting_balance: Decimal,
    pub listings: Vec<Listing>,
}

impl Default for GameConfig {
    fn default() -> Self {
        let listing = |name: &str, cents: i64| Listing {
            name: name.to_string(),
            value: Decimal::new(cents, 2),
        };
        Self {
            ticker_interval_ms: 5000,
            max_previewed_companies: 5,
            time_watch_interval_ms: 1000,
            rng_seed: 42,
            max_swing: 0.05,
            starting_balance: Decimal::ZERO,
            listings: vec![
                listing("Acme Robotics", 12_000),
                listing("Blue Harbor Shipping", 4_550),
                listing("Cinder Foods", 1_825),
                listing("Dynamo Energy", 7_680),
                listing("Evergreen Timber", 3_210),
                listing("Flux Semiconductors", 21_000),
                listing("Granite Mutual", 6_440),
            ],
        }
    }
}

impl GameConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticker_interval_ms == 0 || self.time_watch_interval_ms == 0 {
            return Err(ConfigError::Invalid("intervals must be at least 1 ms".into()));
        }
        if !self.max_swing.is_finite() || !(0.0..1.0).contains(&self.max_swing) {
            return Err(ConfigError::Invalid(format!(
                "max_swing must be within [0, 1), got {}",
                self.max_swing
            )));
        }
        if self.starting_balance < Decimal::ZERO {
            return Err(ConfigError::Invalid("starting_balance must be >= 0".into()));
        }
        let mut names = BTreeSet::new();
        for listing in &self.listings {
            if !names.insert(listing.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate listing: {}",
                    listing.name
                )));
            }
        }
        self.companies(epoch()).map(|_| ())
    }

    /// Builds the configured companies, all listed at `listed_at`.
    pub fn companies(&self, listed_at: DateTime<Utc>) -> Result<Vec<Company>, ConfigError> {
        self.listings
            .iter()
            .map(|l| {
                Company::new(l.name.clone(), l.value, listed_at)
                    .map_err(|err| ConfigError::Invalid(format!("listing {:?}: {err}", l.name)))
            })
            .collect()
    }
}
