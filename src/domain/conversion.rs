use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    Amount, BalanceChange, Catalog, CurrencyCode, RateTable, RateTableError, UserBalanceRecord,
    UserId,
};

/// A request to move `amount` of `source` into `destination` at the fixed rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub source: CurrencyCode,
    pub destination: CurrencyCode,
    pub amount: Amount,
}

impl ConversionRequest {
    pub fn new(source: CurrencyCode, destination: CurrencyCode, amount: Amount) -> Self {
        Self {
            source,
            destination,
            amount,
        }
    }
}

/// The outcome of a successful conversion: the debit and its matching credit.
///
/// Both changes must be written together. `based_on_version` is the version of
/// the snapshot they were computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedBalances {
    pub user_id: UserId,
    pub based_on_version: i64,
    pub source: BalanceChange,
    pub destination: BalanceChange,
    pub source_amount: Amount,
    pub destination_amount: Amount,
}

impl UpdatedBalances {
    /// New balances to store, one per currency.
    pub fn entries(&self) -> Vec<(CurrencyCode, Amount)> {
        vec![
            (self.source.currency.clone(), self.source.updated),
            (self.destination.currency.clone(), self.destination.updated),
        ]
    }

    /// A copy of `record` with both balances replaced and the version bumped.
    pub fn apply_to(&self, record: &UserBalanceRecord) -> UserBalanceRecord {
        let mut next = record.clone();
        for (code, amount) in self.entries() {
            next.balances.insert(code, amount);
        }
        next.version = self.based_on_version + 1;
        debug_assert!(next.is_non_negative());
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("No exchange rate for {from} -> {to}")]
    UnknownCurrency { from: CurrencyCode, to: CurrencyCode },

    #[error("Cannot convert {0} into itself")]
    SameCurrency(CurrencyCode),

    #[error("Insufficient {currency}: balance {available}, required {required}")]
    InsufficientFunds {
        currency: CurrencyCode,
        available: Amount,
        required: Amount,
    },
}

/// Converts balances between currencies using a rate table fixed at construction.
///
/// Conversion is a pure function of the snapshot and the request, so one
/// converter can serve any number of callers at once.
#[derive(Debug, Clone)]
pub struct Converter {
    rates: RateTable,
    catalog: Catalog,
}

impl Converter {
    /// Every code in the rate table must be in the catalog, which supplies its scale.
    pub fn new(rates: RateTable, catalog: Catalog) -> Result<Self, RateTableError> {
        if let Some(missing) = rates.codes().find(|code| !catalog.contains(code)) {
            return Err(RateTableError::NotInCatalog(missing.clone()));
        }
        Ok(Self { rates, catalog })
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn convert(
        &self,
        record: &UserBalanceRecord,
        request: &ConversionRequest,
    ) -> Result<UpdatedBalances, ConversionError> {
        let source = &request.source;
        let destination = &request.destination;
        let amount = request.amount;

        if source == destination {
            return Err(ConversionError::SameCurrency(source.clone()));
        }

        if amount <= Decimal::ZERO {
            return Err(ConversionError::InvalidAmount(format!(
                "{} must be positive",
                amount
            )));
        }

        let unknown = || ConversionError::UnknownCurrency {
            from: source.clone(),
            to: destination.clone(),
        };
        if !self.rates.contains(source) || !self.rates.contains(destination) {
            return Err(unknown());
        }
        let rate = self.rates.lookup(source, destination).ok_or_else(unknown)?;
        let destination_scale = self.catalog.scale_of(destination).ok_or_else(unknown)?;

        let available = record.balance(source);
        if amount > available {
            return Err(ConversionError::InsufficientFunds {
                currency: source.clone(),
                available,
                required: amount,
            });
        }

        // Nearest at the destination scale, ties to even. A credit may round to zero.
        let destination_amount = rate
            .apply(amount)
            .ok_or_else(|| ConversionError::InvalidAmount(format!("{} is too large to convert", amount)))?
            .round_dp_with_strategy(destination_scale, RoundingStrategy::MidpointNearestEven)
            .normalize();

        let previous_destination = record.balance(destination);
        let updated_destination = previous_destination
            .checked_add(destination_amount)
            .ok_or_else(|| ConversionError::InvalidAmount(format!("{} balance would overflow", destination)))?;

        Ok(UpdatedBalances {
            user_id: record.user_id,
            based_on_version: record.version,
            source: BalanceChange {
                currency: source.clone(),
                previous: available,
                updated: available - amount,
            },
            destination: BalanceChange {
                currency: destination.clone(),
                previous: previous_destination,
                updated: updated_destination,
            },
            source_amount: amount,
            destination_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::domain::ExchangeRate;

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::new(s).unwrap()
    }

    fn converter() -> Converter {
        Converter::new(RateTable::default(), Catalog::default()).unwrap()
    }

    fn record(ora: Amount, inr: Amount) -> UserBalanceRecord {
        UserBalanceRecord::new(Uuid::new_v4(), [])
            .with_balance(code("ORA"), ora)
            .with_balance(code("INR"), inr)
    }

    fn ora_to_inr(amount: Amount) -> ConversionRequest {
        ConversionRequest::new(code("ORA"), code("INR"), amount)
    }

    #[test]
    fn test_converts_ora_to_inr() {
        let record = record(dec!(100), dec!(0));
        let updated = converter().convert(&record, &ora_to_inr(dec!(50))).unwrap();

        assert_eq!(updated.source.updated, dec!(50));
        assert_eq!(updated.destination.updated, dec!(0.05));
        assert_eq!(updated.destination_amount, dec!(0.05));
        assert_eq!(updated.based_on_version, 0);

        let next = updated.apply_to(&record);
        assert_eq!(next.balance(&code("ORA")), dec!(50));
        assert_eq!(next.balance(&code("INR")), dec!(0.05));
        assert_eq!(next.version, 1);
    }

    #[test]
    fn test_insufficient_funds() {
        let record = record(dec!(100), dec!(0));
        let result = converter().convert(&record, &ora_to_inr(dec!(150)));

        assert_eq!(
            result,
            Err(ConversionError::InsufficientFunds {
                currency: code("ORA"),
                available: dec!(100),
                required: dec!(150),
            })
        );
        assert_eq!(record.balance(&code("ORA")), dec!(100));
        assert_eq!(record.balance(&code("INR")), dec!(0));
    }

    #[test]
    fn test_whole_balance_can_be_converted() {
        let record = record(dec!(100), dec!(0));
        let updated = converter().convert(&record, &ora_to_inr(dec!(100))).unwrap();
        assert_eq!(updated.source.updated, dec!(0));
        assert_eq!(updated.destination.updated, dec!(0.1));
    }

    #[test]
    fn test_same_currency_regardless_of_amount() {
        let record = record(dec!(100), dec!(0));
        for amount in [dec!(1), dec!(0), dec!(-5), dec!(1000000)] {
            let request = ConversionRequest::new(code("ORA"), code("ORA"), amount);
            assert_eq!(
                converter().convert(&record, &request),
                Err(ConversionError::SameCurrency(code("ORA")))
            );
        }
    }

    #[test]
    fn test_non_positive_amount() {
        let record = record(dec!(100), dec!(0));
        for amount in [dec!(0), dec!(-1)] {
            assert!(matches!(
                converter().convert(&record, &ora_to_inr(amount)),
                Err(ConversionError::InvalidAmount(_))
            ));
        }
    }

    #[test]
    fn test_unknown_pair_never_converts_to_zero() {
        let record = record(dec!(100), dec!(0)).with_balance(code("BTC"), dec!(1));

        // Both known to the catalog, but no rate between them
        let request = ConversionRequest::new(code("ORA"), code("BTC"), dec!(1));
        assert!(matches!(
            converter().convert(&record, &request),
            Err(ConversionError::UnknownCurrency { .. })
        ));

        // Not in the catalog at all
        let request = ConversionRequest::new(code("XYZ"), code("INR"), dec!(1));
        assert!(matches!(
            converter().convert(&record, &request),
            Err(ConversionError::UnknownCurrency { .. })
        ));
    }

    #[test]
    fn test_reverse_direction_multiplies() {
        let record = record(dec!(0), dec!(2));
        let request = ConversionRequest::new(code("INR"), code("ORA"), dec!(0.5));
        let updated = converter().convert(&record, &request).unwrap();

        assert_eq!(updated.source.updated, dec!(1.5));
        assert_eq!(updated.destination.updated, dec!(500));
    }

    #[test]
    fn test_small_amounts_convert() {
        let converter = converter();
        let cases = [
            // 0.001 INR rounds down to nothing but the debit still happens
            (dec!(1), dec!(0)),
            // 0.00999 INR rounds to one paisa
            (dec!(9.99), dec!(0.01)),
            (dec!(5), dec!(0)),
            (dec!(5.000001), dec!(0.01)),
            (dec!(0.000000001), dec!(0)),
        ];
        for (amount, credit) in cases {
            let record = record(dec!(100), dec!(0));
            let updated = converter.convert(&record, &ora_to_inr(amount)).unwrap();
            assert_eq!(updated.destination_amount, credit, "converting {}", amount);
            assert_eq!(updated.source.updated, dec!(100) - amount);
            assert!(updated.apply_to(&record).is_non_negative());
        }
    }

    #[test]
    fn test_ties_round_to_even() {
        let converter = converter();
        // 15 ORA is 0.015 INR, 25 ORA is 0.025 INR
        let record = record(dec!(100), dec!(0));
        let updated = converter.convert(&record, &ora_to_inr(dec!(15))).unwrap();
        assert_eq!(updated.destination_amount, dec!(0.02));
        let updated = converter.convert(&record, &ora_to_inr(dec!(25))).unwrap();
        assert_eq!(updated.destination_amount, dec!(0.02));
    }

    #[test]
    fn test_source_amount_is_not_limited_to_source_scale() {
        let record = record(dec!(0), dec!(2));
        let request = ConversionRequest::new(code("INR"), code("ORA"), dec!(0.001));
        let updated = converter().convert(&record, &request).unwrap();
        assert_eq!(updated.source.updated, dec!(1.999));
        assert_eq!(updated.destination_amount, dec!(1));
    }

    #[test]
    fn test_destination_is_rounded_to_scale() {
        let record = record(dec!(100), dec!(0));
        let converter = converter();

        // 12.345 / 1000 = 0.012345 INR, kept to 2 digits
        let updated = converter.convert(&record, &ora_to_inr(dec!(12.345))).unwrap();
        assert_eq!(updated.destination_amount, dec!(0.01));
        assert_eq!(updated.source.updated, dec!(87.655));

        // 17.5 / 1000 = 0.0175 INR rounds up
        let updated = converter.convert(&record, &ora_to_inr(dec!(17.5))).unwrap();
        assert_eq!(updated.destination_amount, dec!(0.02));
    }

    #[test]
    fn test_source_debit_is_exact() {
        let converter = converter();
        let amounts = [dec!(10), dec!(10.00000001), dec!(33.33333333), dec!(99.99999999)];
        for amount in amounts {
            let record = record(dec!(100), dec!(0));
            let updated = converter.convert(&record, &ora_to_inr(amount)).unwrap();
            assert_eq!(updated.source.updated + amount, dec!(100));
            assert_eq!(updated.destination.delta(), updated.destination_amount);
        }
    }

    #[test]
    fn test_repeated_conversions_do_not_drift() {
        let converter = converter();
        let mut current = record(dec!(100), dec!(0));
        for _ in 0..10 {
            let updated = converter.convert(&current, &ora_to_inr(dec!(10))).unwrap();
            current = updated.apply_to(&current);
        }
        assert_eq!(current.balance(&code("ORA")), dec!(0));
        assert_eq!(current.balance(&code("INR")), dec!(0.10));
        assert_eq!(current.version, 10);
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let converter = converter();
        let record = record(dec!(100), dec!(3));
        let first = converter.convert(&record, &ora_to_inr(dec!(42.5))).unwrap();
        let second = converter.convert(&record, &ora_to_inr(dec!(42.5))).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_converter_requires_catalog_codes() {
        let rates = RateTable::new([ExchangeRate::new(code("ORA"), code("GBP"), dec!(10))]).unwrap();
        let result = Converter::new(rates, Catalog::default());
        assert_eq!(result.unwrap_err(), RateTableError::NotInCatalog(code("GBP")));
    }
}
