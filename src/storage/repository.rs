use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{Amount, ApiKey, ApiKeyId, CurrencyCode, User, UserBalanceRecord, UserId};

use super::MIGRATION_001_INITIAL;

/// New balances for one user, valid only if the stored record is still at `expected_version`.
#[derive(Debug, Clone)]
pub struct BalanceCommit {
    pub user_id: UserId,
    pub expected_version: i64,
    pub entries: Vec<(CurrencyCode, Amount)>,
}

/// Result of an optimistic balance commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Another update reached this user's record first; nothing was written.
    Conflict { user_id: UserId },
}

/// Repository for persisting users, their balance records and API keys.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // User operations
    // ========================

    /// Save a new user together with its initial balance record.
    pub async fn save_user(&self, user: &User, record: &UserBalanceRecord) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, wallet_address, created_at, version)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.wallet_address)
        .bind(user.created_at.to_rfc3339())
        .bind(record.version)
        .execute(&mut *tx)
        .await
        .context("Failed to save user")?;

        for (currency, amount) in &record.balances {
            sqlx::query("INSERT INTO balances (user_id, currency, amount) VALUES (?, ?, ?)")
                .bind(user.id.to_string())
                .bind(currency.as_str())
                .bind(amount_to_text(*amount))
                .execute(&mut *tx)
                .await
                .context("Failed to save initial balance")?;
        }

        tx.commit().await.context("Failed to commit new user")?;
        Ok(())
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, display_name, wallet_address, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Get a user by email.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, display_name, wallet_address, created_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by email")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Get a user by wallet address.
    pub async fn get_user_by_address(&self, address: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, display_name, wallet_address, created_at
            FROM users
            WHERE wallet_address = ?
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by wallet address")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// List all users, ordered by email.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, email, display_name, wallet_address, created_at FROM users ORDER BY email",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;

        rows.iter().map(Self::row_to_user).collect()
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(User {
            id: Uuid::parse_str(&id_str).context("Invalid user ID")?,
            email: row.get("email"),
            display_name: row.get("display_name"),
            wallet_address: row.get("wallet_address"),
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }

    // ========================
    // Balance operations
    // ========================

    /// Load a consistent snapshot of a user's balances and record version.
    pub async fn load_balances(&self, user_id: UserId) -> Result<Option<UserBalanceRecord>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let version: Option<i64> = sqlx::query("SELECT version FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to fetch record version")?
            .map(|row| row.get("version"));

        let Some(version) = version else {
            return Ok(None);
        };

        let rows = sqlx::query("SELECT currency, amount FROM balances WHERE user_id = ? ORDER BY currency")
            .bind(user_id.to_string())
            .fetch_all(&mut *tx)
            .await
            .context("Failed to fetch balances")?;

        tx.commit().await.context("Failed to close read transaction")?;

        let mut record = UserBalanceRecord::new(user_id, []).with_version(version);
        for row in rows {
            let currency_str: String = row.get("currency");
            let amount_str: String = row.get("amount");
            let currency = CurrencyCode::new(&currency_str)
                .with_context(|| format!("Invalid currency code in balances: {}", currency_str))?;
            let amount = Decimal::from_str(&amount_str)
                .with_context(|| format!("Invalid stored amount: {}", amount_str))?;
            record.balances.insert(currency, amount);
        }

        Ok(Some(record))
    }

    /// Apply balance updates to one or more users in a single transaction.
    ///
    /// Each user's version must still equal `expected_version`; if any of them
    /// moved on, the whole transaction is rolled back and nothing is written.
    pub async fn commit_balances(&self, commits: &[BalanceCommit]) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        for commit in commits {
            let bumped = sqlx::query("UPDATE users SET version = version + 1 WHERE id = ? AND version = ?")
                .bind(commit.user_id.to_string())
                .bind(commit.expected_version)
                .execute(&mut *tx)
                .await
                .context("Failed to bump record version")?;

            if bumped.rows_affected() == 0 {
                tx.rollback().await.context("Failed to roll back balance update")?;
                return Ok(CommitOutcome::Conflict {
                    user_id: commit.user_id,
                });
            }

            for (currency, amount) in &commit.entries {
                sqlx::query(
                    r#"
                    INSERT INTO balances (user_id, currency, amount)
                    VALUES (?, ?, ?)
                    ON CONFLICT(user_id, currency) DO UPDATE SET amount = excluded.amount
                    "#,
                )
                .bind(commit.user_id.to_string())
                .bind(currency.as_str())
                .bind(amount_to_text(*amount))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to write {} balance", currency))?;
            }
        }

        tx.commit().await.context("Failed to commit balance update")?;
        Ok(CommitOutcome::Committed)
    }

    // ========================
    // API key operations
    // ========================

    /// Save a new API key.
    pub async fn save_api_key(&self, key: &ApiKey) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (id, user_id, key, label, active, created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.id.to_string())
        .bind(key.user_id.to_string())
        .bind(&key.key)
        .bind(&key.label)
        .bind(key.active)
        .bind(key.created_at.to_rfc3339())
        .bind(key.last_used_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .context("Failed to save API key")?;
        Ok(())
    }

    /// Get an API key by its key string.
    pub async fn get_api_key(&self, key: &str) -> Result<Option<ApiKey>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, key, label, active, created_at, last_used_at
            FROM api_keys
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch API key")?;

        row.as_ref().map(Self::row_to_api_key).transpose()
    }

    /// List a user's API keys, oldest first.
    pub async fn list_api_keys(&self, user_id: UserId) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, key, label, active, created_at, last_used_at
            FROM api_keys
            WHERE user_id = ?
            ORDER BY created_at, rowid
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list API keys")?;

        rows.iter().map(Self::row_to_api_key).collect()
    }

    /// Count a user's API keys.
    pub async fn count_api_keys(&self, user_id: UserId) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM api_keys WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count API keys")?;
        Ok(row.get("count"))
    }

    /// Activate or deactivate an API key.
    pub async fn set_api_key_active(&self, id: ApiKeyId, active: bool) -> Result<()> {
        sqlx::query("UPDATE api_keys SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update API key")?;
        Ok(())
    }

    /// Record that an API key was just used.
    pub async fn touch_api_key(&self, id: ApiKeyId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to record API key use")?;
        Ok(())
    }

    /// Delete an API key permanently.
    pub async fn delete_api_key(&self, id: ApiKeyId) -> Result<()> {
        sqlx::query("DELETE FROM api_keys WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete API key")?;
        Ok(())
    }

    fn row_to_api_key(row: &sqlx::sqlite::SqliteRow) -> Result<ApiKey> {
        let id_str: String = row.get("id");
        let user_id_str: String = row.get("user_id");
        let created_at_str: String = row.get("created_at");
        let last_used_str: Option<String> = row.get("last_used_at");

        Ok(ApiKey {
            id: Uuid::parse_str(&id_str).context("Invalid API key ID")?,
            user_id: Uuid::parse_str(&user_id_str).context("Invalid API key owner")?,
            key: row.get("key"),
            label: row.get("label"),
            active: row.get::<i32, _>("active") != 0,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
            last_used_at: last_used_str
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .context("Invalid last_used_at timestamp")?,
        })
    }
}

/// Returns true if `err` was raised by a UNIQUE constraint on `column`, e.g. `users.email`.
pub fn is_unique_violation(err: &anyhow::Error, column: &str) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) => db.is_unique_violation() && db.message().contains(column),
        _ => false,
    }
}

fn amount_to_text(amount: Amount) -> String {
    amount.normalize().to_string()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
