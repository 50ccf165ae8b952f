use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::{ConversionError, MovementError, UserId};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    #[error("API key is disabled: {0}")]
    ApiKeyInactive(String),

    #[error("Balances of user {user_id} changed concurrently, reload and try again")]
    VersionConflict { user_id: UserId },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Movement(#[from] MovementError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}
