//! The player: a bank account and the shares they hold.

use crate::bank::Bank;
use crate::reactive::Observable;
use crate::snapshot::PlayerSnapshot;
use std::collections::BTreeMap;

/// Shares held per company name.
#[derive(Clone, Debug)]
pub struct Portfolio {
    holdings: Observable<BTreeMap<String, u64>>,
}

impl Default for Portfolio {
    fn default() -> Self {
        Self::from_holdings(BTreeMap::new())
    }
}

impl Portfolio {
    fn from_holdings(holdings: BTreeMap<String, u64>) -> Self {
        let holdings = holdings.into_iter().filter(|(_, n)| *n > 0).collect();
        Self {
            holdings: Observable::new(holdings),
        }
    }

    pub fn shares(&self, company: &str) -> u64 {
        self.holdings
            .with(|h| h.get(company).copied().unwrap_or(0))
    }

    pub fn holdings(&self) -> BTreeMap<String, u64> {
        self.holdings.get()
    }

    pub(crate) fn add(&self, company: &str, shares: u64) {
        self.holdings.update(|h| {
            let held = h.entry(company.to_string()).or_insert(0);
            *held = held.saturating_add(shares);
        });
    }

    /// Removes `shares` if that many are held; otherwise changes nothing.
    pub(crate) fn remove(&self, company: &str, shares: u64) -> bool {
        let held = self.shares(company);
        if held < shares {
            return false;
        }
        self.holdings.update(|h| {
            if held == shares {
                h.remove(company);
            } else {
                h.insert(company.to_string(), held - shares);
            }
        });
        true
    }
}

#[derive(Debug, Default)]
pub struct Player {
    bank: Bank,
    portfolio: Portfolio,
}

impl Player {
    pub fn new(bank: Bank) -> Self {
        Self {
            bank,
            portfolio: Portfolio::default(),
        }
    }

    pub fn restore(snapshot: Option<PlayerSnapshot>) -> Self {
        let snapshot = snapshot.unwrap_or_default();
        Self {
            bank: Bank::restore(snapshot.bank),
            portfolio: Portfolio::from_holdings(snapshot.portfolio.unwrap_or_default()),
        }
    }

    pub fn to_snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            bank: Some(self.bank.to_snapshot()),
            portfolio: Some(self.portfolio.holdings()),
        }
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }
}
