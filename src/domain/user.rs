use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::token::{is_prefixed_token, prefixed_token};

pub type UserId = Uuid;

/// Number of random characters after the `ora_` prefix in a wallet address.
pub const WALLET_ADDRESS_LEN: usize = 34;

/// A registered wallet holder. Balances live in a separate `UserBalanceRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    /// Public address other users send funds to.
    pub wallet_address: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into().trim().to_lowercase(),
            display_name: None,
            wallet_address: generate_wallet_address(),
            created_at: Utc::now(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Display name if set, otherwise the email.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}

pub fn generate_wallet_address() -> String {
    prefixed_token(WALLET_ADDRESS_LEN)
}

pub fn is_wallet_address(address: &str) -> bool {
    is_prefixed_token(address, WALLET_ADDRESS_LEN)
}
