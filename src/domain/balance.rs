use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Amount, CurrencyCode, UserId};

/// Snapshot of a user's balances, one amount per currency code.
///
/// `version` starts at 0 and is bumped by every committed update; storage
/// uses it to refuse writes computed from a stale snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalanceRecord {
    pub user_id: UserId,
    pub balances: BTreeMap<CurrencyCode, Amount>,
    pub version: i64,
}

impl UserBalanceRecord {
    /// A fresh record with every given currency at zero.
    pub fn new<'a>(user_id: UserId, codes: impl IntoIterator<Item = &'a CurrencyCode>) -> Self {
        Self {
            user_id,
            balances: codes
                .into_iter()
                .map(|code| (code.clone(), Decimal::ZERO))
                .collect(),
            version: 0,
        }
    }

    pub fn with_balance(mut self, code: CurrencyCode, amount: Amount) -> Self {
        self.balances.insert(code, amount);
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Balance held in `code`. Currencies never touched read as zero.
    pub fn balance(&self, code: &CurrencyCode) -> Amount {
        self.balances.get(code).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn is_non_negative(&self) -> bool {
        self.balances.values().all(|amount| *amount >= Decimal::ZERO)
    }
}

/// One currency's balance before and after an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub currency: CurrencyCode,
    pub previous: Amount,
    pub updated: Amount,
}

impl BalanceChange {
    pub fn delta(&self) -> Amount {
        self.updated - self.previous
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::domain::Catalog;

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::new(s).unwrap()
    }

    #[test]
    fn test_new_record_is_all_zero() {
        let catalog = Catalog::default();
        let record = UserBalanceRecord::new(Uuid::new_v4(), catalog.codes());

        assert_eq!(record.balances.len(), catalog.len());
        assert!(record.balances.values().all(|amount| amount.is_zero()));
        assert_eq!(record.version, 0);
    }

    #[test]
    fn test_missing_code_reads_as_zero() {
        let record = UserBalanceRecord::new(Uuid::new_v4(), []);
        assert_eq!(record.balance(&code("ORA")), dec!(0));
    }

    #[test]
    fn test_non_negative_check() {
        let record = UserBalanceRecord::new(Uuid::new_v4(), [])
            .with_balance(code("ORA"), dec!(10))
            .with_balance(code("INR"), dec!(0));
        assert!(record.is_non_negative());

        let overdrawn = record.with_balance(code("INR"), dec!(-0.01));
        assert!(!overdrawn.is_non_negative());
    }

    #[test]
    fn test_balance_change_delta() {
        let change = BalanceChange {
            currency: code("INR"),
            previous: dec!(1.25),
            updated: dec!(1.30),
        };
        assert_eq!(change.delta(), dec!(0.05));
    }
}
