use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    Catalog, Currency, CurrencyCode, CurrencyCodeError, DuplicateCurrency, ExchangeRate, RateTable,
    RateTableError,
};

/// Default database file when neither the CLI nor the config file names one.
pub const DEFAULT_DATABASE: &str = "ora-wallet.db";

/// Static configuration, usually read from a TOML file.
///
/// ```toml
/// database = "wallet.db"
///
/// [[currencies]]
/// code = "ORA"
/// name = "ORA Coin"
/// symbol = "ORA"
/// scale = 8
///
/// [[rates]]
/// from = "ORA"
/// to = "INR"
/// rate = "1000"
/// ```
///
/// Empty `currencies` or `rates` fall back to the built-in catalog and the
/// ORA -> INR table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: Option<String>,
    pub currencies: Vec<CurrencyConfig>,
    pub rates: Vec<RateConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyConfig {
    pub code: String,
    pub name: String,
    pub symbol: Option<String>,
    pub scale: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    pub from: String,
    pub to: String,
    /// Units of `from` per one unit of `to`. Prefer strings to keep exact decimals.
    pub rate: Decimal,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    InvalidCode(#[from] CurrencyCodeError),

    #[error(transparent)]
    DuplicateCurrency(#[from] DuplicateCurrency),

    #[error(transparent)]
    InvalidRates(#[from] RateTableError),

    #[error("scale {scale} for {code} exceeds the maximum of {max}")]
    ScaleTooLarge { code: String, scale: u32, max: u32 },
}

impl Config {
    /// Largest scale a currency may declare.
    pub const MAX_SCALE: u32 = 18;

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Database path: explicit override, then config file, then the default.
    pub fn database_path(&self, cli_override: Option<&str>) -> String {
        cli_override
            .map(str::to_string)
            .or_else(|| self.database.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string())
    }

    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        if self.currencies.is_empty() {
            return Ok(Catalog::default());
        }

        let mut currencies = Vec::with_capacity(self.currencies.len());
        for c in &self.currencies {
            if c.scale > Self::MAX_SCALE {
                return Err(ConfigError::ScaleTooLarge {
                    code: c.code.clone(),
                    scale: c.scale,
                    max: Self::MAX_SCALE,
                });
            }
            let code = CurrencyCode::new(&c.code)?;
            let symbol = c.symbol.clone().unwrap_or_else(|| code.to_string());
            currencies.push(Currency::new(code, c.name.clone(), symbol, c.scale));
        }
        Ok(Catalog::new(currencies)?)
    }

    pub fn rate_table(&self) -> Result<RateTable, ConfigError> {
        if self.rates.is_empty() {
            return Ok(RateTable::default());
        }

        let mut entries = Vec::with_capacity(self.rates.len());
        for r in &self.rates {
            entries.push(ExchangeRate::new(
                CurrencyCode::new(&r.from)?,
                CurrencyCode::new(&r.to)?,
                r.rate,
            ));
        }
        Ok(RateTable::new(entries)?)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.catalog().unwrap().len(), 6);

        let rates = config.rate_table().unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(config.database_path(None), DEFAULT_DATABASE);
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(
            r#"
            database = "wallet.db"

            [[currencies]]
            code = "ora"
            name = "ORA Coin"
            scale = 8

            [[currencies]]
            code = "INR"
            name = "Indian Rupee"
            symbol = "₹"
            scale = 2

            [[rates]]
            from = "ORA"
            to = "INR"
            rate = "1000"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path(None), "wallet.db");
        assert_eq!(config.database_path(Some("other.db")), "other.db");

        let catalog = config.catalog().unwrap();
        let ora = CurrencyCode::new("ORA").unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(&ora).unwrap().symbol, "ORA");

        let rates = config.rate_table().unwrap();
        let entry = rates.entries().next().unwrap();
        assert_eq!(entry.factor, dec!(1000));
    }

    #[test]
    fn test_invalid_rate_is_reported() {
        let config = Config::from_toml_str(
            r#"
            [[rates]]
            from = "ORA"
            to = "INR"
            rate = "0"
            "#,
        )
        .unwrap();

        assert!(matches!(
            config.rate_table(),
            Err(ConfigError::InvalidRates(RateTableError::NonPositiveFactor { .. }))
        ));
    }

    #[test]
    fn test_oversized_scale_is_rejected() {
        let config = Config::from_toml_str(
            r#"
            [[currencies]]
            code = "ORA"
            name = "ORA Coin"
            scale = 30
            "#,
        )
        .unwrap();

        assert!(matches!(config.catalog(), Err(ConfigError::ScaleTooLarge { .. })));
    }
}
