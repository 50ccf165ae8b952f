// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use ora_wallet::application::WalletService;
use ora_wallet::config::Config;
use ora_wallet::domain::{Amount, CurrencyCode, User};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database and the default catalog
pub async fn test_service() -> Result<(WalletService, TempDir)> {
    test_service_with(&Config::default()).await
}

/// Helper to create a test service with a custom configuration
pub async fn test_service_with(config: &Config) -> Result<(WalletService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = WalletService::init(db_path.to_str().unwrap(), config).await?;
    Ok((service, temp_dir))
}

pub fn code(s: &str) -> CurrencyCode {
    CurrencyCode::new(s).unwrap()
}

/// Test fixture: users with starting balances
pub struct Fixtures;

impl Fixtures {
    /// Register a user and deposit the given balances.
    pub async fn funded_user(
        service: &WalletService,
        email: &str,
        balances: &[(&str, Amount)],
    ) -> Result<User> {
        let user = service.register_user(email, None).await?;
        for (currency, amount) in balances {
            service.deposit(email, &code(currency), *amount).await?;
        }
        Ok(user)
    }

    /// The holder from the documented example: 100 ORA, 0 INR.
    pub async fn alex(service: &WalletService) -> Result<User> {
        Self::funded_user(service, "alex@example.com", &[("ORA", Amount::from(100))]).await
    }
}
