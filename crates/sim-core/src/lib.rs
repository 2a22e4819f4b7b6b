#![deny(warnings)]

//! Core domain models and reactive primitives for Stock Clicker.
//!
//! This crate holds the pieces every other crate builds on:
//! - observable cells and cached derived values ([`reactive`])
//! - the session clock and cooperative interval timers ([`clock`], [`scheduler`])
//! - the bank, listed companies, the stock exchange and the player
//! - serializable snapshots with lenient, field-by-field restore ([`snapshot`])
//! - YAML game configuration ([`config`])
//!
//! Everything here is single-threaded: cells and timers are `Rc`-based and
//! mutation happens only from direct calls or scheduler callbacks.

pub mod bank;
pub mod clock;
pub mod config;
pub mod market;
pub mod player;
pub mod reactive;
pub mod scheduler;
pub mod snapshot;

pub use bank::Bank;
pub use clock::{add_calendar_seconds, epoch, GameClock};
pub use config::{ConfigError, GameConfig, Listing};
pub use market::{Company, MarketError, StockExchange, MIN_SHARE_VALUE};
pub use player::{Player, Portfolio};
pub use reactive::{tracked, Computed, Observable, Subscription, Tracked};
pub use scheduler::{Scheduler, TimerHandle};
pub use snapshot::{
    BankSnapshot, CompanySnapshot, GameSnapshot, MoneyGeneratorSnapshot, PlayerSnapshot,
    StockExchangeSnapshot, TickerSnapshot,
};
