use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserId;
use super::token::{is_prefixed_token, prefixed_token};

pub type ApiKeyId = Uuid;

/// Number of random characters after the `ora_` prefix in an API key.
pub const API_KEY_LEN: usize = 28;

/// A key granting programmatic access on behalf of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub user_id: UserId,
    pub key: String,
    pub label: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Generate a fresh, active key.
    pub fn new(user_id: UserId, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            key: prefixed_token(API_KEY_LEN),
            label: label.into(),
            active: true,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    /// Label given to the n-th key of a user when none is supplied (1-based).
    pub fn default_label(position: usize) -> String {
        format!("New Key {}", position)
    }

    /// The key with everything but the prefix and last four characters hidden.
    pub fn masked(&self) -> String {
        let visible = self.key.len().saturating_sub(4);
        let tail = &self.key[visible..];
        format!("ora_{}{}", "*".repeat(API_KEY_LEN.saturating_sub(4)), tail)
    }
}

pub fn is_api_key(key: &str) -> bool {
    is_prefixed_token(key, API_KEY_LEN)
}
