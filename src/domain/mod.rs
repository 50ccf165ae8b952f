mod api_key;
mod balance;
mod conversion;
mod currency;
mod ledger;
mod money;
mod rate;
mod token;
mod user;

pub use api_key::*;
pub use balance::*;
pub use conversion::*;
pub use currency::*;
pub use ledger::*;
pub use money::*;
pub use rate::*;
pub use token::TOKEN_PREFIX;
pub use user::*;
