//! Plain serializable snapshots of every restorable component.
//!
//! Every field is optional. Reading a save never fails as a whole: an
//! absent, `null` or malformed field comes back as `None` and the owning
//! component substitutes its documented default for that field alone.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Whole-game save.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    #[serde(default, deserialize_with = "lenient")]
    pub player: Option<PlayerSnapshot>,
    #[serde(default, deserialize_with = "lenient")]
    pub money_generator: Option<MoneyGeneratorSnapshot>,
    #[serde(default, deserialize_with = "lenient")]
    pub ticker: Option<TickerSnapshot>,
    #[serde(default, deserialize_with = "lenient")]
    pub current_panel: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    #[serde(default, deserialize_with = "lenient")]
    pub bank: Option<BankSnapshot>,
    /// Shares held per company name.
    #[serde(default, deserialize_with = "lenient")]
    pub portfolio: Option<BTreeMap<String, u64>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankSnapshot {
    #[serde(default, deserialize_with = "lenient")]
    pub balance: Option<Decimal>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyGeneratorSnapshot {
    #[serde(default, deserialize_with = "lenient")]
    pub base_cash_per_click: Option<u64>,
    /// ISO-8601 timestamp.
    #[serde(default, deserialize_with = "lenient")]
    pub boost_expires: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerSnapshot {
    #[serde(default, deserialize_with = "lenient")]
    pub stock_exchange: Option<StockExchangeSnapshot>,
    #[serde(default, deserialize_with = "lenient")]
    pub max_previewed_companies: Option<usize>,
    /// Milliseconds.
    #[serde(default, deserialize_with = "lenient")]
    pub ticker_interval: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockExchangeSnapshot {
    #[serde(default, deserialize_with = "lenient_items")]
    pub companies: Option<Vec<CompanySnapshot>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySnapshot {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub value: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient")]
    pub stock_value_change: Option<Decimal>,
    /// ISO-8601 timestamp.
    #[serde(default, deserialize_with = "lenient")]
    pub last_updated: Option<String>,
}

/// Deserializes a field, turning `null` and values of the wrong shape into `None`.
pub fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(err) => {
            warn!(%err, "discarding malformed snapshot field");
            Ok(None)
        }
    }
}

/// Like [`lenient`] for a list, additionally dropping individual malformed entries.
pub fn lenient_items<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(entries) = value else {
        if !value.is_null() {
            warn!("discarding snapshot list that is not an array");
        }
        return Ok(None);
    };
    let total = entries.len();
    let items: Vec<T> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();
    if items.len() < total {
        warn!(dropped = total - items.len(), "discarding malformed snapshot entries");
    }
    Ok(Some(items))
}

/// Formats a timestamp as RFC 3339 with just enough sub-second digits to be exact.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(text) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(err) => {
            warn!(%err, text, "discarding malformed snapshot timestamp");
            None
        }
    }
}
