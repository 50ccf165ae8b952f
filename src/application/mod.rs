// Application layer: use cases over the domain and the repository.
// Clients (the CLI today) go through `WalletService` only.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
