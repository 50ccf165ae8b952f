use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use crate::application::{AppError, WalletService};
use crate::config::Config;
use crate::domain::{
    format_amount, parse_amount, Amount, ApiKey, Catalog, ConversionRequest, CurrencyCode,
    UpdatedBalances, UserBalanceRecord,
};

/// ORA Wallet - multi-currency wallet ledger with fixed-rate conversion
#[derive(Parser)]
#[command(name = "ora-wallet")]
#[command(about = "A local wallet ledger with fixed-rate currency conversion")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides the config file)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// TOML configuration file with currencies and rates
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Show a user's balances
    Balance {
        /// User email
        #[arg(short, long)]
        user: String,

        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Add funds to a user's balance
    Deposit {
        /// Amount to add (e.g., "90" or "0.5")
        amount: String,

        /// Currency code
        currency: String,

        /// User email
        #[arg(short, long)]
        user: String,
    },

    /// Send funds to another wallet address
    Send {
        /// Amount to send
        amount: String,

        /// Currency code
        currency: String,

        /// Sender email
        #[arg(short, long)]
        user: String,

        /// Recipient wallet address (ora_...)
        #[arg(long)]
        to: String,
    },

    /// Preview a conversion without changing any balance
    Quote {
        /// Amount of the source currency
        amount: String,

        /// Source currency code
        #[arg(long)]
        from: String,

        /// Destination currency code
        #[arg(long)]
        to: String,

        /// User email
        #[arg(short, long)]
        user: String,

        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Convert funds between two currencies
    Convert {
        /// Amount of the source currency
        amount: String,

        /// Source currency code
        #[arg(long)]
        from: String,

        /// Destination currency code
        #[arg(long)]
        to: String,

        /// User email
        #[arg(short, long)]
        user: String,
    },

    /// Show the configured exchange rates
    Rates,

    /// Show the configured currencies
    Currencies,

    /// API key management commands
    #[command(subcommand)]
    Key(KeyCommands),
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new user
    Register {
        /// Email address (must be unique)
        email: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show a user by email or wallet address
    Show {
        /// Email or wallet address
        user: String,
    },

    /// List all users
    List,
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Create a new API key
    Create {
        /// Owner email
        #[arg(short, long)]
        user: String,

        /// Key label (defaults to "New Key N")
        #[arg(short, long)]
        label: Option<String>,
    },

    /// List a user's API keys
    List {
        /// Owner email
        #[arg(short, long)]
        user: String,

        /// Print full keys instead of masked ones
        #[arg(long)]
        reveal: bool,
    },

    /// Enable an API key
    Enable {
        key: String,

        #[arg(short, long)]
        user: String,
    },

    /// Disable an API key
    Disable {
        key: String,

        #[arg(short, long)]
        user: String,
    },

    /// Flip an API key between enabled and disabled
    Toggle {
        key: String,

        #[arg(short, long)]
        user: String,
    },

    /// Delete an API key
    Delete {
        key: String,

        #[arg(short, long)]
        user: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        let database = config.database_path(self.database.as_deref());

        match self.command {
            Commands::Init => {
                WalletService::init(&database, &config).await?;
                println!("Database initialized: {}", database);
            }

            Commands::User(user_cmd) => {
                let service = WalletService::connect(&database, &config).await?;
                run_user_command(&service, user_cmd).await?;
            }

            Commands::Balance { user, format } => {
                let service = WalletService::connect(&database, &config).await?;
                let sheet = service.get_balances(&user).await?;
                match format {
                    OutputFormat::Text => {
                        println!("Balances for {} ({})", sheet.user.label(), sheet.user.wallet_address);
                        print_balances(service.catalog(), &sheet.record);
                    }
                    OutputFormat::Json => {
                        let output = json!({
                            "user": sheet.user,
                            "balances": sheet.record.balances,
                            "version": sheet.record.version,
                        });
                        println!("{}", serde_json::to_string_pretty(&output)?);
                    }
                }
            }

            Commands::Deposit {
                amount,
                currency,
                user,
            } => {
                let service = WalletService::connect(&database, &config).await?;
                let currency = parse_code(&currency)?;
                let amount = parse_cli_amount(&amount)?;

                let record = service.deposit(&user, &currency, amount).await?;
                println!(
                    "Deposited {} {} (balance: {} {})",
                    display_amount(service.catalog(), &currency, amount),
                    currency,
                    display_amount(service.catalog(), &currency, record.balance(&currency)),
                    currency
                );
            }

            Commands::Send {
                amount,
                currency,
                user,
                to,
            } => {
                let service = WalletService::connect(&database, &config).await?;
                let currency = parse_code(&currency)?;
                let amount = parse_cli_amount(&amount)?;

                let result = service.send(&user, &to, &currency, amount).await?;
                println!(
                    "Sent {} {} -> {} ({})",
                    display_amount(service.catalog(), &currency, result.amount),
                    currency,
                    result.recipient.label(),
                    result.recipient.wallet_address
                );
                println!(
                    "Remaining balance: {} {}",
                    display_amount(
                        service.catalog(),
                        &currency,
                        result.sender_record.balance(&currency)
                    ),
                    currency
                );
            }

            Commands::Quote {
                amount,
                from,
                to,
                user,
                format,
            } => {
                let service = WalletService::connect(&database, &config).await?;
                let request = parse_request(&amount, &from, &to)?;
                let updates = service.quote_conversion(&user, &request).await?;
                match format {
                    OutputFormat::Text => {
                        println!("Quote (not committed):");
                        print_conversion(service.catalog(), &updates);
                    }
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&updates)?);
                    }
                }
            }

            Commands::Convert {
                amount,
                from,
                to,
                user,
            } => {
                let service = WalletService::connect(&database, &config).await?;
                let request = parse_request(&amount, &from, &to)?;
                let result = service.convert(&user, &request).await?;
                println!("Converted for {}:", result.user.label());
                print_conversion(service.catalog(), &result.updates);
            }

            Commands::Rates => {
                let service = WalletService::connect(&database, &config).await?;
                let rates = service.rates();
                if rates.is_empty() {
                    println!("No rates configured.");
                } else {
                    println!("{:<8} {:<8} {:>20} {:>20}", "FROM", "TO", "FROM PER TO", "TO PER FROM");
                    println!("{}", "-".repeat(59));
                    for rate in rates {
                        let price = service
                            .unit_price(&rate.from, &rate.to)
                            .map(|p| p.normalize().to_string())
                            .unwrap_or_else(|| "-".to_string());
                        println!(
                            "{:<8} {:<8} {:>20} {:>20}",
                            rate.from,
                            rate.to,
                            rate.factor.normalize().to_string(),
                            price
                        );
                    }
                }
            }

            Commands::Currencies => {
                let service = WalletService::connect(&database, &config).await?;
                println!("{:<8} {:<24} {:<8} {:>5}", "CODE", "NAME", "SYMBOL", "SCALE");
                println!("{}", "-".repeat(48));
                for currency in service.currencies() {
                    println!(
                        "{:<8} {:<24} {:<8} {:>5}",
                        currency.code, currency.name, currency.symbol, currency.scale
                    );
                }
            }

            Commands::Key(key_cmd) => {
                let service = WalletService::connect(&database, &config).await?;
                run_key_command(&service, key_cmd).await?;
            }
        }

        Ok(())
    }
}

async fn run_user_command(service: &WalletService, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Register { email, name } => {
            let user = service.register_user(&email, name).await?;
            println!("Registered user: {}", user.email);
            println!("  Wallet address: {}", user.wallet_address);
        }

        UserCommands::Show { user } => {
            let found = if user.starts_with(crate::domain::TOKEN_PREFIX) {
                service.get_user_by_address(&user).await?
            } else {
                service.get_user(&user).await?
            };

            println!("User: {}", found.label());
            println!("  ID:             {}", found.id);
            println!("  Email:          {}", found.email);
            println!("  Wallet address: {}", found.wallet_address);
            println!(
                "  Created:        {}",
                found.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }

        UserCommands::List => {
            let users = service.list_users().await?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<32} {:<20} {:<38}", "EMAIL", "NAME", "WALLET ADDRESS");
                println!("{}", "-".repeat(90));
                for user in users {
                    println!(
                        "{:<32} {:<20} {:<38}",
                        user.email,
                        user.display_name.as_deref().unwrap_or("-"),
                        user.wallet_address
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_key_command(service: &WalletService, cmd: KeyCommands) -> Result<()> {
    match cmd {
        KeyCommands::Create { user, label } => {
            let key = service.create_api_key(&user, label).await?;
            println!("Created API key '{}': {}", key.label, key.key);
            println!("Store it now; `key list` only shows masked keys.");
        }

        KeyCommands::List { user, reveal } => {
            let keys = service.list_api_keys(&user).await?;
            if keys.is_empty() {
                println!("No API keys found.");
            } else {
                println!("{:<20} {:<34} {:<8} {:<20}", "LABEL", "KEY", "STATUS", "LAST USED");
                println!("{}", "-".repeat(84));
                for key in keys {
                    print_key_row(&key, reveal);
                }
            }
        }

        KeyCommands::Enable { key, user } => {
            let key = service.set_api_key_active(&user, &key, true).await?;
            println!("Enabled API key '{}'", key.label);
        }

        KeyCommands::Disable { key, user } => {
            let key = service.set_api_key_active(&user, &key, false).await?;
            println!("Disabled API key '{}'", key.label);
        }

        KeyCommands::Toggle { key, user } => {
            let key = service.toggle_api_key(&user, &key).await?;
            println!(
                "API key '{}' is now {}",
                key.label,
                if key.active { "enabled" } else { "disabled" }
            );
        }

        KeyCommands::Delete { key, user } => {
            let key = service.delete_api_key(&user, &key).await?;
            println!("Deleted API key '{}'", key.label);
        }
    }
    Ok(())
}

fn print_key_row(key: &ApiKey, reveal: bool) {
    let shown = if reveal { key.key.clone() } else { key.masked() };
    let last_used = key
        .last_used_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "{:<20} {:<34} {:<8} {:<20}",
        key.label,
        shown,
        if key.active { "active" } else { "disabled" },
        last_used
    );
}

fn print_balances(catalog: &Catalog, record: &UserBalanceRecord) {
    println!("{:<8} {:>24}", "CURRENCY", "BALANCE");
    println!("{}", "-".repeat(33));
    for (code, amount) in &record.balances {
        println!("{:<8} {:>24}", code, display_amount(catalog, code, *amount));
    }
}

fn print_conversion(catalog: &Catalog, updates: &UpdatedBalances) {
    let source = &updates.source;
    let destination = &updates.destination;
    println!(
        "  {} {} -> {} {}",
        display_amount(catalog, &source.currency, updates.source_amount),
        source.currency,
        display_amount(catalog, &destination.currency, updates.destination_amount),
        destination.currency
    );
    println!(
        "  {:<8} {:>24} -> {:>24}",
        source.currency,
        display_amount(catalog, &source.currency, source.previous),
        display_amount(catalog, &source.currency, source.updated)
    );
    println!(
        "  {:<8} {:>24} -> {:>24}",
        destination.currency,
        display_amount(catalog, &destination.currency, destination.previous),
        display_amount(catalog, &destination.currency, destination.updated)
    );
}

fn display_amount(catalog: &Catalog, code: &CurrencyCode, amount: Amount) -> String {
    match catalog.scale_of(code) {
        Some(scale) => format_amount(amount, scale),
        None => amount.normalize().to_string(),
    }
}

fn parse_code(code: &str) -> Result<CurrencyCode> {
    CurrencyCode::new(code).with_context(|| format!("Invalid currency code '{}'", code))
}

fn parse_cli_amount(amount: &str) -> Result<Amount> {
    parse_amount(amount).with_context(|| format!("Invalid amount '{}'. Use '50' or '0.05'", amount))
}

fn parse_request(amount: &str, from: &str, to: &str) -> Result<ConversionRequest> {
    Ok(ConversionRequest::new(
        parse_code(from)?,
        parse_code(to)?,
        parse_cli_amount(amount)?,
    ))
}

/// Process exit code for an error returned by `Cli::run`.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<AppError>() {
        Some(AppError::Conversion(_) | AppError::Movement(_)) => 3,
        Some(AppError::VersionConflict { .. }) => 4,
        Some(AppError::Persistence(_)) => 5,
        Some(_) => 2,
        None => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_convert_command() {
        let cli = Cli::try_parse_from([
            "ora-wallet", "convert", "50", "--from", "ORA", "--to", "INR", "-u", "a@b.io",
        ])
        .unwrap();
        match cli.command {
            Commands::Convert { amount, from, to, user } => {
                assert_eq!(amount, "50");
                assert_eq!(from, "ORA");
                assert_eq!(to, "INR");
                assert_eq!(user, "a@b.io");
            }
            _ => panic!("expected convert"),
        }
    }

    #[test]
    fn test_parse_request_rejects_bad_input() {
        assert!(parse_request("abc", "ORA", "INR").is_err());
        assert!(parse_request("1", "O", "INR").is_err());
        assert!(parse_request("1", "ora", "inr").is_ok());
    }

    #[test]
    fn test_exit_codes() {
        let conflict = anyhow::Error::from(AppError::VersionConflict {
            user_id: uuid::Uuid::nil(),
        });
        assert_eq!(exit_code(&conflict), 4);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);

        let storage = anyhow::Error::from(AppError::Persistence(anyhow::anyhow!("disk I/O error")));
        assert_eq!(exit_code(&storage), 5);

        let rejected = anyhow::Error::from(AppError::Conversion(
            crate::domain::ConversionError::SameCurrency(CurrencyCode::new("ORA").unwrap()),
        ));
        assert_eq!(exit_code(&rejected), 3);

        let missing = anyhow::Error::from(AppError::UserNotFound("a@b.io".into()));
        assert_eq!(exit_code(&missing), 2);
    }
}
