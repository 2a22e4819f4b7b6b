#![deny(warnings)]

//! Session runtime: the market ticker and the game that ties the player,
//! the money generator and the ticker to one scheduler.

mod game;
mod ticker;

pub use game::{Game, DEFAULT_PANEL};
pub use ticker::{Ticker, DEFAULT_MAX_PREVIEWED_COMPANIES, DEFAULT_TICKER_INTERVAL_MS};

use sim_core::GameConfig;
use sim_econ::TIME_WATCH_INTERVAL_MS;

/// Runtime knobs that are not part of a save.
#[derive(Clone, Debug, PartialEq)]
pub struct GameSettings {
    /// Seed for market movements; the same seed replays the same market.
    pub rng_seed: u64,
    /// Largest fractional move of a share value per tick.
    pub max_swing: f64,
    pub time_watch_interval_ms: u64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            max_swing: 0.05,
            time_watch_interval_ms: TIME_WATCH_INTERVAL_MS,
        }
    }
}

impl From<&GameConfig> for GameSettings {
    fn from(config: &GameConfig) -> Self {
        Self {
            rng_seed: config.rng_seed,
            max_swing: config.max_swing,
            time_watch_interval_ms: config.time_watch_interval_ms,
        }
    }
}
