use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::domain::{
    deposit, send, Amount, ApiKey, Catalog, ConversionRequest, Converter, Currency, CurrencyCode,
    ExchangeRate, UpdatedBalances, User, UserBalanceRecord, UserId,
};
use crate::storage::{is_unique_violation, BalanceCommit, CommitOutcome, Repository};

use super::AppError;

/// Application service providing high-level operations for the wallet.
/// This is the primary interface for any client (CLI, API, etc.).
pub struct WalletService {
    repo: Repository,
    converter: Converter,
}

/// A user together with a snapshot of their balances.
pub struct BalanceSheet {
    pub user: User,
    pub record: UserBalanceRecord,
}

/// Result of a committed conversion
pub struct ConversionResult {
    pub user: User,
    pub updates: UpdatedBalances,
    pub record: UserBalanceRecord,
}

/// Result of a committed send
pub struct SendResult {
    pub sender: User,
    pub recipient: User,
    pub currency: CurrencyCode,
    pub amount: Amount,
    pub sender_record: UserBalanceRecord,
}

impl WalletService {
    /// Create a service over `repo` using the catalog and rates from `config`.
    pub fn new(repo: Repository, config: &Config) -> Result<Self, AppError> {
        let catalog = config.catalog()?;
        let rates = config.rate_table()?;
        let converter = Converter::new(rates, catalog).map_err(ConfigError::from)?;
        Ok(Self { repo, converter })
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str, config: &Config) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Self::new(repo, config)
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, config: &Config) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Self::new(repo, config)
    }

    pub fn catalog(&self) -> &Catalog {
        self.converter.catalog()
    }

    /// All configured currencies, ordered by code.
    pub fn currencies(&self) -> Vec<Currency> {
        self.catalog().iter().cloned().collect()
    }

    /// The configured rate table, as entered.
    pub fn rates(&self) -> Vec<ExchangeRate> {
        self.converter.rates().entries().collect()
    }

    /// Units of `to` that one unit of `from` converts into, before rounding.
    pub fn unit_price(&self, from: &CurrencyCode, to: &CurrencyCode) -> Option<Decimal> {
        self.converter
            .rates()
            .lookup(from, to)
            .and_then(|direction| direction.unit_price())
    }

    // ========================
    // User operations
    // ========================

    /// Register a user with a fresh wallet address and a zero balance in every currency.
    pub async fn register_user(
        &self,
        email: &str,
        display_name: Option<String>,
    ) -> Result<User, AppError> {
        let email = normalize_email(email);
        if !is_plausible_email(&email) {
            return Err(AppError::InvalidEmail(email));
        }
        if self.repo.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::UserAlreadyExists(email));
        }

        let mut user = User::new(email);
        if let Some(name) = display_name {
            user = user.with_display_name(name);
        }
        let record = UserBalanceRecord::new(user.id, self.catalog().codes());

        // A concurrent registration may have claimed the email since the check above
        if let Err(err) = self.repo.save_user(&user, &record).await {
            if is_unique_violation(&err, "users.email") {
                warn!(user = %user.email, "email registered concurrently");
                return Err(AppError::UserAlreadyExists(user.email));
            }
            return Err(err.into());
        }
        info!(user = %user.email, address = %user.wallet_address, "registered user");
        Ok(user)
    }

    /// Get a user by email.
    pub async fn get_user(&self, email: &str) -> Result<User, AppError> {
        let email = normalize_email(email);
        let user = self.repo.get_user_by_email(&email).await?;
        user.ok_or(AppError::UserNotFound(email))
    }

    /// Get a user by wallet address.
    pub async fn get_user_by_address(&self, address: &str) -> Result<User, AppError> {
        self.repo
            .get_user_by_address(address.trim())
            .await?
            .ok_or_else(|| AppError::UserNotFound(address.to_string()))
    }

    /// List all users.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.repo.list_users().await?)
    }

    // ========================
    // Balance operations
    // ========================

    /// Get a user's current balances.
    pub async fn get_balances(&self, email: &str) -> Result<BalanceSheet, AppError> {
        let user = self.get_user(email).await?;
        let record = self.load_record(user.id).await?;
        Ok(BalanceSheet { user, record })
    }

    async fn load_record(&self, user_id: UserId) -> Result<UserBalanceRecord, AppError> {
        let record = self
            .repo
            .load_balances(user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))?;
        debug!(%user_id, version = record.version, "loaded balance record");
        Ok(record)
    }

    /// Credit funds to a user's balance.
    pub async fn deposit(
        &self,
        email: &str,
        currency: &CurrencyCode,
        amount: Amount,
    ) -> Result<UserBalanceRecord, AppError> {
        let user = self.get_user(email).await?;
        let record = self.load_record(user.id).await?;

        let update = deposit(self.catalog(), &record, currency, amount).inspect_err(|e| {
            warn!(user = %user.email, error = %e, "deposit rejected");
        })?;

        self.commit(&[BalanceCommit {
            user_id: update.user_id,
            expected_version: update.based_on_version,
            entries: vec![(update.change.currency.clone(), update.change.updated)],
        }])
        .await?;

        info!(user = %user.email, %currency, %amount, "deposited funds");
        Ok(update.apply_to(&record))
    }

    /// Send funds from a user to a wallet address.
    pub async fn send(
        &self,
        sender_email: &str,
        recipient_address: &str,
        currency: &CurrencyCode,
        amount: Amount,
    ) -> Result<SendResult, AppError> {
        let sender = self.get_user(sender_email).await?;
        let recipient = self.get_user_by_address(recipient_address).await?;

        let sender_record = self.load_record(sender.id).await?;
        let recipient_record = self.load_record(recipient.id).await?;

        let plan = send(self.catalog(), &sender_record, &recipient_record, currency, amount)
            .inspect_err(|e| {
                warn!(user = %sender.email, error = %e, "send rejected");
            })?;

        let commits: Vec<BalanceCommit> = [&plan.sender, &plan.recipient]
            .into_iter()
            .map(|update| BalanceCommit {
                user_id: update.user_id,
                expected_version: update.based_on_version,
                entries: vec![(update.change.currency.clone(), update.change.updated)],
            })
            .collect();
        self.commit(&commits).await?;

        info!(
            from = %sender.email,
            to = %recipient.wallet_address,
            %currency,
            %amount,
            "sent funds"
        );
        Ok(SendResult {
            sender_record: plan.sender.apply_to(&sender_record),
            sender,
            recipient,
            currency: currency.clone(),
            amount,
        })
    }

    // ========================
    // Conversion operations
    // ========================

    /// Compute a conversion against the user's current balances without committing it.
    pub async fn quote_conversion(
        &self,
        email: &str,
        request: &ConversionRequest,
    ) -> Result<UpdatedBalances, AppError> {
        let user = self.get_user(email).await?;
        let record = self.load_record(user.id).await?;
        Ok(self.converter.convert(&record, request)?)
    }

    /// Convert between two of a user's currencies and commit the result.
    pub async fn convert(
        &self,
        email: &str,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, AppError> {
        let user = self.get_user(email).await?;
        let record = self.load_record(user.id).await?;

        let updates = self.converter.convert(&record, request).inspect_err(|e| {
            warn!(user = %user.email, error = %e, "conversion rejected");
        })?;
        self.commit_conversion(&updates).await?;

        Ok(ConversionResult {
            record: updates.apply_to(&record),
            user,
            updates,
        })
    }

    /// Write both sides of a computed conversion in one transaction.
    ///
    /// Fails with `VersionConflict` if the record changed since the snapshot
    /// the conversion was computed from.
    pub async fn commit_conversion(&self, updates: &UpdatedBalances) -> Result<(), AppError> {
        self.commit(&[BalanceCommit {
            user_id: updates.user_id,
            expected_version: updates.based_on_version,
            entries: updates.entries(),
        }])
        .await?;

        info!(
            user_id = %updates.user_id,
            from = %updates.source.currency,
            to = %updates.destination.currency,
            debit = %updates.source_amount,
            credit = %updates.destination_amount,
            "committed conversion"
        );
        Ok(())
    }

    async fn commit(&self, commits: &[BalanceCommit]) -> Result<(), AppError> {
        match self.repo.commit_balances(commits).await? {
            CommitOutcome::Committed => Ok(()),
            CommitOutcome::Conflict { user_id } => {
                warn!(%user_id, "stale balance record, update discarded");
                Err(AppError::VersionConflict { user_id })
            }
        }
    }

    // ========================
    // API key operations
    // ========================

    /// Create an API key; unlabeled keys are named after their position.
    pub async fn create_api_key(
        &self,
        email: &str,
        label: Option<String>,
    ) -> Result<ApiKey, AppError> {
        let user = self.get_user(email).await?;
        let label = match label {
            Some(label) => label,
            None => {
                let count = self.repo.count_api_keys(user.id).await?;
                ApiKey::default_label(count as usize + 1)
            }
        };

        let key = ApiKey::new(user.id, label);
        self.repo.save_api_key(&key).await?;
        info!(user = %user.email, label = %key.label, "created API key");
        Ok(key)
    }

    /// List a user's API keys.
    pub async fn list_api_keys(&self, email: &str) -> Result<Vec<ApiKey>, AppError> {
        let user = self.get_user(email).await?;
        Ok(self.repo.list_api_keys(user.id).await?)
    }

    /// Enable or disable one of a user's keys.
    pub async fn set_api_key_active(
        &self,
        email: &str,
        key: &str,
        active: bool,
    ) -> Result<ApiKey, AppError> {
        let mut api_key = self.get_owned_api_key(email, key).await?;
        if api_key.active != active {
            self.repo.set_api_key_active(api_key.id, active).await?;
            api_key.active = active;
            info!(label = %api_key.label, active, "updated API key");
        }
        Ok(api_key)
    }

    /// Flip a key between enabled and disabled.
    pub async fn toggle_api_key(&self, email: &str, key: &str) -> Result<ApiKey, AppError> {
        let api_key = self.get_owned_api_key(email, key).await?;
        self.set_api_key_active(email, key, !api_key.active).await
    }

    /// Delete one of a user's keys.
    pub async fn delete_api_key(&self, email: &str, key: &str) -> Result<ApiKey, AppError> {
        let api_key = self.get_owned_api_key(email, key).await?;
        self.repo.delete_api_key(api_key.id).await?;
        info!(label = %api_key.label, "deleted API key");
        Ok(api_key)
    }

    /// Resolve the user behind an active key and record its use.
    pub async fn authenticate_api_key(&self, key: &str) -> Result<User, AppError> {
        let api_key = self
            .repo
            .get_api_key(key)
            .await?
            .ok_or_else(|| AppError::ApiKeyNotFound(mask(key)))?;

        if !api_key.active {
            warn!(label = %api_key.label, "disabled API key used");
            return Err(AppError::ApiKeyInactive(api_key.masked()));
        }

        self.repo.touch_api_key(api_key.id, Utc::now()).await?;
        self.repo
            .get_user(api_key.user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(api_key.user_id.to_string()))
    }

    async fn get_owned_api_key(&self, email: &str, key: &str) -> Result<ApiKey, AppError> {
        let user = self.get_user(email).await?;
        self.repo
            .get_api_key(key)
            .await?
            .filter(|api_key| api_key.user_id == user.id)
            .ok_or_else(|| AppError::ApiKeyNotFound(mask(key)))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

// Keys are secrets; only the last four characters go into errors.
fn mask(key: &str) -> String {
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("...{}", tail)
}
