use rust_decimal::Decimal;
use thiserror::Error;

use super::{fits_scale, Amount, BalanceChange, Catalog, CurrencyCode, UserBalanceRecord, UserId};

/// A single-currency change to one user's record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub user_id: UserId,
    pub based_on_version: i64,
    pub change: BalanceChange,
}

impl BalanceUpdate {
    fn new(record: &UserBalanceRecord, currency: &CurrencyCode, updated: Amount) -> Self {
        Self {
            user_id: record.user_id,
            based_on_version: record.version,
            change: BalanceChange {
                currency: currency.clone(),
                previous: record.balance(currency),
                updated,
            },
        }
    }

    pub fn apply_to(&self, record: &UserBalanceRecord) -> UserBalanceRecord {
        let mut next = record.clone();
        next.balances
            .insert(self.change.currency.clone(), self.change.updated);
        next.version = self.based_on_version + 1;
        debug_assert!(next.is_non_negative());
        next
    }
}

/// A debit on the sender paired with a credit on the recipient.
/// Both sides must be committed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPlan {
    pub sender: BalanceUpdate,
    pub recipient: BalanceUpdate,
    pub amount: Amount,
}

/// Credit `amount` of `currency` to a record.
pub fn deposit(
    catalog: &Catalog,
    record: &UserBalanceRecord,
    currency: &CurrencyCode,
    amount: Amount,
) -> Result<BalanceUpdate, MovementError> {
    validate_amount(catalog, currency, amount)?;

    let updated = record
        .balance(currency)
        .checked_add(amount)
        .ok_or_else(|| MovementError::InvalidAmount(format!("{} balance would overflow", currency)))?;

    Ok(BalanceUpdate::new(record, currency, updated))
}

/// Move `amount` of `currency` from one record to another.
pub fn send(
    catalog: &Catalog,
    sender: &UserBalanceRecord,
    recipient: &UserBalanceRecord,
    currency: &CurrencyCode,
    amount: Amount,
) -> Result<SendPlan, MovementError> {
    if sender.user_id == recipient.user_id {
        return Err(MovementError::SelfTransfer);
    }
    validate_amount(catalog, currency, amount)?;

    let available = sender.balance(currency);
    if amount > available {
        return Err(MovementError::InsufficientFunds {
            currency: currency.clone(),
            available,
            required: amount,
        });
    }

    let credited = recipient
        .balance(currency)
        .checked_add(amount)
        .ok_or_else(|| MovementError::InvalidAmount(format!("{} balance would overflow", currency)))?;

    Ok(SendPlan {
        sender: BalanceUpdate::new(sender, currency, available - amount),
        recipient: BalanceUpdate::new(recipient, currency, credited),
        amount,
    })
}

fn validate_amount(catalog: &Catalog, currency: &CurrencyCode, amount: Amount) -> Result<(), MovementError> {
    let scale = catalog
        .scale_of(currency)
        .ok_or_else(|| MovementError::UnknownCurrency(currency.clone()))?;

    if amount <= Decimal::ZERO {
        return Err(MovementError::InvalidAmount(format!("{} must be positive", amount)));
    }
    if !fits_scale(amount, scale) {
        return Err(MovementError::InvalidAmount(format!(
            "{} allows at most {} fractional digits, got {}",
            currency, scale, amount
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MovementError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(CurrencyCode),

    #[error("Cannot send funds to your own wallet")]
    SelfTransfer,

    #[error("Insufficient {currency}: balance {available}, required {required}")]
    InsufficientFunds {
        currency: CurrencyCode,
        available: Amount,
        required: Amount,
    },
}
