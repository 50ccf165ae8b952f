use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An upper-case currency code such as "ORA" or "INR".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub const MIN_LEN: usize = 2;
    pub const MAX_LEN: usize = 10;

    /// Parse a code, normalizing it to upper case.
    pub fn new(code: &str) -> Result<Self, CurrencyCodeError> {
        let code = code.trim();
        let valid_len = (Self::MIN_LEN..=Self::MAX_LEN).contains(&code.len());
        if !valid_len || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CurrencyCodeError::Invalid(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    // Only for codes known at compile time to be valid.
    pub(crate) fn known(code: &'static str) -> Self {
        Self(code.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = CurrencyCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CurrencyCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyCodeError {
    #[error("invalid currency code '{0}': expected 2-10 ASCII letters or digits")]
    Invalid(String),
}

/// A currency the wallet knows how to hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub code: CurrencyCode,
    pub name: String,
    pub symbol: String,
    /// Number of fractional digits balances keep in this currency.
    pub scale: u32,
}

impl Currency {
    pub fn new(code: CurrencyCode, name: impl Into<String>, symbol: impl Into<String>, scale: u32) -> Self {
        Self {
            code,
            name: name.into(),
            symbol: symbol.into(),
            scale,
        }
    }
}

/// The fixed set of currencies balances can be held in.
#[derive(Debug, Clone)]
pub struct Catalog {
    currencies: BTreeMap<CurrencyCode, Currency>,
}

impl Catalog {
    /// Fiat-like currencies keep cents; coins keep satoshi-sized units.
    pub const FIAT_SCALE: u32 = 2;
    pub const COIN_SCALE: u32 = 8;

    /// Build a catalog. Later entries with a code already seen are rejected.
    pub fn new(currencies: impl IntoIterator<Item = Currency>) -> Result<Self, DuplicateCurrency> {
        let mut map = BTreeMap::new();
        for currency in currencies {
            let code = currency.code.clone();
            if map.insert(code.clone(), currency).is_some() {
                return Err(DuplicateCurrency(code));
            }
        }
        Ok(Self { currencies: map })
    }

    pub fn get(&self, code: &CurrencyCode) -> Option<&Currency> {
        self.currencies.get(code)
    }

    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.currencies.contains_key(code)
    }

    pub fn scale_of(&self, code: &CurrencyCode) -> Option<u32> {
        self.get(code).map(|c| c.scale)
    }

    pub fn codes(&self) -> impl Iterator<Item = &CurrencyCode> {
        self.currencies.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Currency> {
        self.currencies.values()
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let currencies = [
            Currency::new(CurrencyCode::known("USD"), "US Dollar", "$", Self::FIAT_SCALE),
            Currency::new(CurrencyCode::known("BTC"), "Bitcoin", "₿", Self::COIN_SCALE),
            Currency::new(CurrencyCode::known("EUR"), "Euro", "€", Self::FIAT_SCALE),
            Currency::new(CurrencyCode::known("ETH"), "Ethereum", "Ξ", Self::COIN_SCALE),
            Currency::new(CurrencyCode::known("INR"), "Indian Rupee", "₹", Self::FIAT_SCALE),
            Currency::new(CurrencyCode::known("ORA"), "ORA Coin", "ORA", Self::COIN_SCALE),
        ];
        Self {
            currencies: currencies
                .into_iter()
                .map(|c| (c.code.clone(), c))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("currency {0} is listed more than once")]
pub struct DuplicateCurrency(pub CurrencyCode);

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::new(s).unwrap()
    }

    #[test]
    fn test_code_is_normalized_to_upper_case() {
        assert_eq!(code("ora").as_str(), "ORA");
        assert_eq!(code(" inr ").as_str(), "INR");
        assert_eq!(code("ora"), code("ORA"));
    }

    #[test]
    fn test_invalid_codes_are_rejected() {
        assert!(CurrencyCode::new("").is_err());
        assert!(CurrencyCode::new("X").is_err());
        assert!(CurrencyCode::new("TOOLONGCODE1").is_err());
        assert!(CurrencyCode::new("OR-A").is_err());
        assert!(CurrencyCode::new("₹").is_err());
    }

    #[test]
    fn test_code_serializes_as_plain_string() {
        let json = serde_json::to_string(&code("eth")).unwrap();
        assert_eq!(json, "\"ETH\"");

        let parsed: CurrencyCode = serde_json::from_str("\"btc\"").unwrap();
        assert_eq!(parsed, code("BTC"));

        assert!(serde_json::from_str::<CurrencyCode>("\"b\"").is_err());
    }

    #[test]
    fn test_default_catalog_scales() {
        let catalog = Catalog::default();
        assert_eq!(catalog.len(), 6);
        assert_eq!(catalog.scale_of(&code("INR")), Some(2));
        assert_eq!(catalog.scale_of(&code("USD")), Some(2));
        assert_eq!(catalog.scale_of(&code("ORA")), Some(8));
        assert_eq!(catalog.scale_of(&code("BTC")), Some(8));
        assert_eq!(catalog.scale_of(&code("XYZ")), None);
    }

    #[test]
    fn test_catalog_rejects_duplicates() {
        let result = Catalog::new([
            Currency::new(code("ORA"), "ORA Coin", "ORA", 8),
            Currency::new(code("ora"), "Other", "O", 2),
        ]);
        assert_eq!(result.unwrap_err(), DuplicateCurrency(code("ORA")));
    }
}
