//! Listed companies and the exchange they trade on.

use crate::bank::Bank;
use crate::clock::epoch;
use crate::player::Portfolio;
use crate::reactive::{Observable, Tracked};
use crate::snapshot::{format_timestamp, parse_timestamp, CompanySnapshot, StockExchangeSnapshot};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::{info, warn};

/// Lowest price a random change can push a company to.
pub const MIN_SHARE_VALUE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Errors raised by listings and price movements.
#[derive(Debug, Error, PartialEq)]
pub enum MarketError {
    /// Listing names must be non-empty.
    #[error("company name must not be empty")]
    EmptyName,
    /// Share values must be strictly positive.
    #[error("share value must be > 0, got {0}")]
    InvalidValue(Decimal),
    /// Names are unique within an exchange.
    #[error("company already listed: {0}")]
    DuplicateListing(String),
    #[error("company not listed: {0}")]
    UnknownCompany(String),
    /// Swing must be a fraction in `[0, 1)`.
    #[error("invalid price swing: {0}")]
    InvalidSwing(f64),
    #[error("non-finite numeric conversion")]
    NonFinite,
    #[error("share value overflow")]
    Overflow,
}

struct CompanyState {
    name: String,
    value: Observable<Decimal>,
    stock_value_change: Observable<Decimal>,
    last_updated: Observable<DateTime<Utc>>,
}

/// A listed company. Cloning yields another handle to the same company;
/// handles compare by identity.
#[derive(Clone)]
pub struct Company {
    state: Rc<CompanyState>,
}

impl Company {
    pub fn new(
        name: impl Into<String>,
        value: Decimal,
        listed_at: DateTime<Utc>,
    ) -> Result<Self, MarketError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(MarketError::EmptyName);
        }
        if value <= Decimal::ZERO {
            return Err(MarketError::InvalidValue(value));
        }
        Ok(Self::from_parts(name, value, Decimal::ZERO, listed_at))
    }

    fn from_parts(
        name: String,
        value: Decimal,
        change: Decimal,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            state: Rc::new(CompanyState {
                name,
                value: Observable::new(value),
                stock_value_change: Observable::new(change),
                last_updated: Observable::new(last_updated),
            }),
        }
    }

    /// Rebuilds a company from a save. Entries without a name or a positive
    /// value cannot be traded and are rejected.
    pub fn restore(snapshot: CompanySnapshot) -> Option<Self> {
        let name = snapshot.name.filter(|n| !n.trim().is_empty())?;
        let value = snapshot.value.filter(|v| *v > Decimal::ZERO)?;
        let change = snapshot.stock_value_change.unwrap_or(Decimal::ZERO);
        let last_updated = snapshot
            .last_updated
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(epoch);
        Some(Self::from_parts(name, value, change, last_updated))
    }

    pub fn to_snapshot(&self) -> CompanySnapshot {
        CompanySnapshot {
            name: Some(self.name().to_string()),
            value: Some(self.value()),
            stock_value_change: Some(self.stock_value_change()),
            last_updated: Some(format_timestamp(self.last_updated())),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn value(&self) -> Decimal {
        self.state.value.get()
    }

    /// Difference between the current value and the value before the last change.
    pub fn stock_value_change(&self) -> Decimal {
        self.state.stock_value_change.get()
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.state.last_updated.get()
    }

    /// Latest change to the fields that decide whether and where the company
    /// appears in a recency preview.
    pub fn preview_stamp(&self) -> u64 {
        self.state
            .stock_value_change
            .stamp()
            .max(self.state.last_updated.stamp())
    }

    /// Moves the share value by a uniform fraction in `[-max_swing, max_swing]`,
    /// rounded to cents and floored at [`MIN_SHARE_VALUE`].
    pub fn make_random_change<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        max_swing: f64,
        now: DateTime<Utc>,
    ) -> Result<(), MarketError> {
        if !(0.0..1.0).contains(&max_swing) {
            return Err(MarketError::InvalidSwing(max_swing));
        }
        let swing: f64 = rng.gen_range(-max_swing..=max_swing);
        let factor = Decimal::from_f64(1.0 + swing).ok_or(MarketError::NonFinite)?;
        let old = self.value();
        let new = old
            .checked_mul(factor)
            .ok_or(MarketError::Overflow)?
            .round_dp(2)
            .max(MIN_SHARE_VALUE);
        self.state.value.set(new);
        self.state.stock_value_change.set(new - old);
        self.state.last_updated.set(now);
        Ok(())
    }
}

impl PartialEq for Company {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for Company {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Company")
            .field("name", &self.state.name)
            .field("value", &self.value())
            .field("stock_value_change", &self.stock_value_change())
            .field("last_updated", &self.last_updated())
            .finish()
    }
}

/// Ordered collection of listed companies plus the player's current selection.
#[derive(Debug)]
pub struct StockExchange {
    companies: Observable<Vec<Company>>,
    selected_company: Observable<Option<Company>>,
}

impl Default for StockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl StockExchange {
    pub fn new() -> Self {
        Self {
            companies: Observable::new(Vec::new()),
            selected_company: Observable::new(None),
        }
    }

    pub fn restore(snapshot: Option<StockExchangeSnapshot>) -> Self {
        let exchange = Self::new();
        let saved = snapshot.and_then(|s| s.companies).unwrap_or_default();
        for entry in saved {
            let Some(company) = Company::restore(entry) else {
                warn!("skipping saved company without name or positive value");
                continue;
            };
            if let Err(err) = exchange.list(company) {
                warn!(%err, "skipping saved company");
            }
        }
        exchange
    }

    pub fn to_snapshot(&self) -> StockExchangeSnapshot {
        StockExchangeSnapshot {
            companies: Some(
                self.companies
                    .with(|cs| cs.iter().map(Company::to_snapshot).collect()),
            ),
        }
    }

    pub fn companies(&self) -> Vec<Company> {
        self.companies.get()
    }

    pub fn companies_cell(&self) -> &Observable<Vec<Company>> {
        &self.companies
    }

    pub fn len(&self) -> usize {
        self.companies.with(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, name: &str) -> Option<Company> {
        self.companies
            .with(|cs| cs.iter().find(|c| c.name() == name).cloned())
    }

    /// Appends a company; names are unique.
    pub fn list(&self, company: Company) -> Result<(), MarketError> {
        if self.find(company.name()).is_some() {
            return Err(MarketError::DuplicateListing(company.name().to_string()));
        }
        self.companies.update(|cs| cs.push(company));
        Ok(())
    }

    pub fn delist(&self, name: &str) -> Result<Company, MarketError> {
        let company = self
            .find(name)
            .ok_or_else(|| MarketError::UnknownCompany(name.to_string()))?;
        self.companies.update(|cs| cs.retain(|c| c != &company));
        if self.selected_company.with(|s| s.as_ref() == Some(&company)) {
            self.selected_company.set(None);
        }
        Ok(company)
    }

    pub fn selected_company(&self) -> Option<Company> {
        self.selected_company.get()
    }

    pub fn select(&self, company: Option<Company>) {
        self.selected_company.set(company);
    }

    pub fn clear_selection(&self) {
        self.selected_company.set(None);
    }

    /// Buys `shares` at the current value. All or nothing: fails without side
    /// effects when the company is unknown or the bank cannot cover the cost.
    pub fn buy(&self, name: &str, shares: u64, bank: &Bank, portfolio: &Portfolio) -> bool {
        let Some(company) = self.find(name) else {
            return false;
        };
        let Some(cost) = company.value().checked_mul(Decimal::from(shares)) else {
            return false;
        };
        if shares == 0 || !bank.try_withdraw(cost) {
            return false;
        }
        portfolio.add(name, shares);
        info!(company = name, shares, %cost, "bought shares");
        true
    }

    /// Sells `shares` at the current value if the portfolio holds that many.
    pub fn sell(&self, name: &str, shares: u64, bank: &Bank, portfolio: &Portfolio) -> bool {
        let Some(company) = self.find(name) else {
            return false;
        };
        let Some(proceeds) = company.value().checked_mul(Decimal::from(shares)) else {
            return false;
        };
        if shares == 0 || !portfolio.remove(name, shares) {
            return false;
        }
        bank.deposit(proceeds);
        info!(company = name, shares, %proceeds, "sold shares");
        true
    }
}
