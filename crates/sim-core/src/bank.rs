//! The player's cash account.

use crate::reactive::Observable;
use crate::snapshot::BankSnapshot;
use rust_decimal::Decimal;
use tracing::warn;

/// Holds a non-negative balance. Every debit is a single check-then-withdraw.
#[derive(Clone, Debug)]
pub struct Bank {
    balance: Observable<Decimal>,
}

impl Default for Bank {
    fn default() -> Self {
        Self::new(Decimal::ZERO)
    }
}

impl Bank {
    /// Opens an account; a negative opening balance is treated as zero.
    pub fn new(opening: Decimal) -> Self {
        Self {
            balance: Observable::new(opening.max(Decimal::ZERO)),
        }
    }

    pub fn restore(snapshot: Option<BankSnapshot>) -> Self {
        let balance = snapshot.and_then(|s| s.balance).unwrap_or(Decimal::ZERO);
        if balance < Decimal::ZERO {
            warn!(%balance, "negative saved balance reset to zero");
        }
        Self::new(balance)
    }

    pub fn to_snapshot(&self) -> BankSnapshot {
        BankSnapshot {
            balance: Some(self.balance()),
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance.get()
    }

    pub fn deposit(&self, amount: Decimal) {
        if amount < Decimal::ZERO {
            warn!(%amount, "ignoring negative deposit");
            return;
        }
        self.balance.update(|balance| *balance += amount);
    }

    /// Debits `amount` if the balance covers it; otherwise leaves the account untouched.
    pub fn try_withdraw(&self, amount: Decimal) -> bool {
        if amount < Decimal::ZERO {
            warn!(%amount, "refusing negative withdrawal");
            return false;
        }
        let balance = self.balance();
        if balance < amount {
            return false;
        }
        self.balance.set(balance - amount);
        true
    }
}
