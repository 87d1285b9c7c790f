//! CLI subcommands.

pub mod cart;
pub mod catalog;
pub mod migrate;
pub mod wishlist;

mod session;

use thiserror::Error;

use cartsync_core::ProductIdError;
use cartsync_storefront::local::StorageError;
use cartsync_storefront::{CartError, ConfigError, Outcome, StorageTarget};

pub use session::Session;

/// Errors that can end a CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The local store directory could not be opened.
    #[error("Local store error: {0}")]
    Storage(#[from] StorageError),

    /// The cart or wishlist operation was rejected.
    #[error("{0}")]
    Cart(#[from] CartError),

    /// The product id is malformed.
    #[error("Invalid product id: {0}")]
    ProductId(#[from] ProductIdError),

    /// No catalog product has this id.
    #[error("Unknown product: {0}")]
    UnknownProduct(String),
}

/// Print how a mutation was applied.
#[allow(clippy::print_stdout)]
fn report(outcome: &Outcome) {
    match outcome {
        Outcome::Stored(StorageTarget::Remote(_)) => println!("Saved to account."),
        Outcome::Stored(StorageTarget::Local) => println!("Saved locally."),
        Outcome::Degraded(reason) => println!("Saved locally ({reason})."),
        Outcome::Unchanged => println!("Nothing to change."),
        Outcome::Discarded => println!("Session changed, nothing applied."),
    }
}
