use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Amount, CurrencyCode};

/// A fixed exchange rate between two currencies.
///
/// `factor` is how many units of `from` buy one unit of `to`:
/// ORA -> INR at 1000 means 1000 ORA convert to 1 INR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub factor: Decimal,
}

impl ExchangeRate {
    pub fn new(from: CurrencyCode, to: CurrencyCode, factor: Decimal) -> Self {
        Self { from, to, factor }
    }
}

/// How a stored rate applies to a requested direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDirection {
    /// The table stores `source -> destination`: divide by the factor.
    Direct(Decimal),
    /// The table stores `destination -> source`: multiply by the factor.
    Inverse(Decimal),
}

impl RateDirection {
    /// Convert a source amount, unrounded. Returns None on overflow.
    pub fn apply(&self, amount: Amount) -> Option<Amount> {
        match *self {
            RateDirection::Direct(factor) => amount.checked_div(factor),
            RateDirection::Inverse(factor) => amount.checked_mul(factor),
        }
    }

    /// Units of destination per one unit of source.
    pub fn unit_price(&self) -> Option<Decimal> {
        self.apply(Decimal::ONE)
    }
}

/// A static table of exchange rates, fixed at construction time.
/// A pair may be stored in one direction only; the other is derived.
#[derive(Debug, Clone)]
pub struct RateTable {
    rates: BTreeMap<(CurrencyCode, CurrencyCode), Decimal>,
}

impl RateTable {
    pub fn new(entries: impl IntoIterator<Item = ExchangeRate>) -> Result<Self, RateTableError> {
        let mut rates = BTreeMap::new();
        for rate in entries {
            if rate.from == rate.to {
                return Err(RateTableError::SameCurrency(rate.from));
            }
            if rate.factor <= Decimal::ZERO {
                return Err(RateTableError::NonPositiveFactor {
                    from: rate.from,
                    to: rate.to,
                    factor: rate.factor,
                });
            }
            let reverse = (rate.to.clone(), rate.from.clone());
            let key = (rate.from, rate.to);
            if rates.contains_key(&key) || rates.contains_key(&reverse) {
                return Err(RateTableError::Duplicate {
                    from: key.0,
                    to: key.1,
                });
            }
            rates.insert(key, rate.factor);
        }
        Ok(Self { rates })
    }

    /// Find the rate for converting `from` into `to`, in either stored direction.
    pub fn lookup(&self, from: &CurrencyCode, to: &CurrencyCode) -> Option<RateDirection> {
        if let Some(factor) = self.rates.get(&(from.clone(), to.clone())) {
            return Some(RateDirection::Direct(*factor));
        }
        self.rates
            .get(&(to.clone(), from.clone()))
            .map(|factor| RateDirection::Inverse(*factor))
    }

    /// Returns true if the code takes part in any stored pair.
    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.rates.keys().any(|(from, to)| from == code || to == code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &CurrencyCode> {
        self.rates.keys().flat_map(|(from, to)| [from, to])
    }

    pub fn entries(&self) -> impl Iterator<Item = ExchangeRate> + '_ {
        self.rates
            .iter()
            .map(|((from, to), factor)| ExchangeRate::new(from.clone(), to.clone(), *factor))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl Default for RateTable {
    /// ORA -> INR at 1000:1.
    fn default() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(
            (CurrencyCode::known("ORA"), CurrencyCode::known("INR")),
            Decimal::from(1000),
        );
        Self { rates }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateTableError {
    #[error("rate {from} -> {to} must be positive, got {factor}")]
    NonPositiveFactor {
        from: CurrencyCode,
        to: CurrencyCode,
        factor: Decimal,
    },

    #[error("rate from {0} to itself is not allowed")]
    SameCurrency(CurrencyCode),

    #[error("rate {from} -> {to} is defined more than once")]
    Duplicate { from: CurrencyCode, to: CurrencyCode },

    #[error("rate table references {0}, which is not in the currency catalog")]
    NotInCatalog(CurrencyCode),
}
