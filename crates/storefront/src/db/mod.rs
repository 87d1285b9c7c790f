//! Account store access.
//!
//! # Database
//!
//! Per-account rows in the `cartsync` schema:
//!
//! ## Tables
//!
//! - `products` - Catalog rows joined onto cart and wishlist rows, listed by
//!   [`load_catalog`]
//! - `cart_items` - One row per (account, product, color, size)
//! - `wishlist_items` - One row per (account, product)
//!
//! The wishlist table may be absent on older deployments. That is reported as
//! [`WishlistFetch::Unprovisioned`], not as an error.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p cartsync-cli -- migrate
//! ```

mod cart;
mod offline;
mod products;
mod wishlist;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use cartsync_core::{AccountId, CartLine, LineKey, ProductId, RowId, WishlistLine};

use crate::catalog::Catalog;

pub use cart::CartRepository;
pub use offline::OfflineRemoteStore;
pub use products::{ProductRepository, load_catalog};
pub use wishlist::WishlistRepository;

/// SQLSTATE for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

/// Errors from the account store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The store could not be reached or the query failed.
    #[error("account store unavailable: {0}")]
    Unavailable(String),

    /// A relation the query needs has not been provisioned.
    #[error("relation not provisioned: {0}")]
    RelationMissing(String),

    /// Constraint violation (duplicate key).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The product id cannot be stored remotely.
    #[error("product id {0} is not a UUID")]
    IncompatibleId(ProductId),
}

impl From<sqlx::Error> for RemoteError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return Self::Conflict(db_err.message().to_owned());
            }
            if db_err.code().as_deref() == Some(UNDEFINED_TABLE) {
                return Self::RelationMissing(db_err.message().to_owned());
            }
        }
        Self::Unavailable(err.to_string())
    }
}

/// A cart row located by its uniqueness key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartRow {
    /// Row handle.
    pub id: RowId,
    /// Stored quantity.
    pub quantity: u32,
}

/// Result of reading an account's wishlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WishlistFetch {
    /// The wishlist relation exists; these are its lines.
    Available(Vec<WishlistLine>),
    /// The wishlist relation does not exist in this deployment.
    Unprovisioned,
}

/// Result of adding a product to an account's wishlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WishlistInsert {
    /// A new row was written.
    Inserted,
    /// The product was already on the wishlist.
    AlreadyPresent,
}

/// Row-level CRUD over per-account cart and wishlist rows.
///
/// Cart rows match on `(account, product, color, size)` where an unset color
/// or size only matches rows where it is also unset.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Load an account's cart, joined to product data.
    async fn fetch_cart(&self, account: AccountId) -> Result<Vec<CartLine>, RemoteError>;

    /// Load an account's wishlist, joined to product data.
    async fn fetch_wishlist(&self, account: AccountId) -> Result<WishlistFetch, RemoteError>;

    /// Find the row matching `key`.
    async fn find_cart_row(
        &self,
        account: AccountId,
        key: &LineKey,
    ) -> Result<Option<CartRow>, RemoteError>;

    /// Insert a row and return its handle.
    async fn insert_cart_row(
        &self,
        account: AccountId,
        key: &LineKey,
        quantity: u32,
    ) -> Result<RowId, RemoteError>;

    /// Set a row's quantity. Returns `false` if the row no longer exists.
    async fn update_cart_row_quantity(
        &self,
        account: AccountId,
        row: RowId,
        quantity: u32,
    ) -> Result<bool, RemoteError>;

    /// Delete a row. Deleting an absent row succeeds.
    async fn delete_cart_row(&self, account: AccountId, row: RowId) -> Result<(), RemoteError>;

    /// Delete every cart row for the account.
    async fn delete_all_cart_rows(&self, account: AccountId) -> Result<(), RemoteError>;

    /// Add a product to the wishlist. A duplicate is not an error.
    async fn insert_wishlist_row(
        &self,
        account: AccountId,
        product_id: &ProductId,
    ) -> Result<WishlistInsert, RemoteError>;

    /// Remove a product from the wishlist. Removing an absent product succeeds.
    async fn delete_wishlist_row(
        &self,
        account: AccountId,
        product_id: &ProductId,
    ) -> Result<(), RemoteError>;

    /// Delete every wishlist row for the account.
    async fn delete_all_wishlist_rows(&self, account: AccountId) -> Result<(), RemoteError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// [`RemoteStore`] backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgRemoteStore {
    pool: PgPool,
    catalog: Catalog,
}

impl PgRemoteStore {
    /// Create a store. `catalog` resolves rows whose product join fails.
    #[must_use]
    pub const fn new(pool: PgPool, catalog: Catalog) -> Self {
        Self { pool, catalog }
    }

    fn carts(&self) -> CartRepository<'_> {
        CartRepository::new(&self.pool, &self.catalog)
    }

    fn wishlists(&self) -> WishlistRepository<'_> {
        WishlistRepository::new(&self.pool, &self.catalog)
    }
}

#[async_trait]
impl RemoteStore for PgRemoteStore {
    async fn fetch_cart(&self, account: AccountId) -> Result<Vec<CartLine>, RemoteError> {
        self.carts().fetch(account).await
    }

    async fn fetch_wishlist(&self, account: AccountId) -> Result<WishlistFetch, RemoteError> {
        self.wishlists().fetch(account).await
    }

    async fn find_cart_row(
        &self,
        account: AccountId,
        key: &LineKey,
    ) -> Result<Option<CartRow>, RemoteError> {
        self.carts().find(account, key).await
    }

    async fn insert_cart_row(
        &self,
        account: AccountId,
        key: &LineKey,
        quantity: u32,
    ) -> Result<RowId, RemoteError> {
        self.carts().insert(account, key, quantity).await
    }

    async fn update_cart_row_quantity(
        &self,
        account: AccountId,
        row: RowId,
        quantity: u32,
    ) -> Result<bool, RemoteError> {
        self.carts().update_quantity(account, row, quantity).await
    }

    async fn delete_cart_row(&self, account: AccountId, row: RowId) -> Result<(), RemoteError> {
        self.carts().delete(account, row).await
    }

    async fn delete_all_cart_rows(&self, account: AccountId) -> Result<(), RemoteError> {
        self.carts().delete_all(account).await
    }

    async fn insert_wishlist_row(
        &self,
        account: AccountId,
        product_id: &ProductId,
    ) -> Result<WishlistInsert, RemoteError> {
        self.wishlists().insert(account, product_id).await
    }

    async fn delete_wishlist_row(
        &self,
        account: AccountId,
        product_id: &ProductId,
    ) -> Result<(), RemoteError> {
        self.wishlists().delete(account, product_id).await
    }

    async fn delete_all_wishlist_rows(&self, account: AccountId) -> Result<(), RemoteError> {
        self.wishlists().delete_all(account).await
    }
}

/// Clamp a quantity into the `INTEGER` column range.
fn quantity_to_db(quantity: u32) -> i32 {
    i32::try_from(quantity).unwrap_or(i32::MAX)
}

/// Parse a stored quantity, rejecting values below one.
fn quantity_from_db(quantity: i32) -> Result<u32, RemoteError> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| RemoteError::DataCorruption(format!("invalid quantity {quantity}")))
}

/// The UUID form of a product id, or `IncompatibleId`.
fn remote_product_id(product_id: &ProductId) -> Result<uuid::Uuid, RemoteError> {
    product_id
        .as_uuid()
        .ok_or_else(|| RemoteError::IncompatibleId(product_id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_conversions() {
        assert_eq!(quantity_to_db(3), 3);
        assert_eq!(quantity_to_db(u32::MAX), i32::MAX);
        assert_eq!(quantity_from_db(2), Ok(2));
        assert!(matches!(
            quantity_from_db(0),
            Err(RemoteError::DataCorruption(_))
        ));
        assert!(matches!(
            quantity_from_db(-4),
            Err(RemoteError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_remote_product_id_rejects_demo_ids() {
        let demo = ProductId::parse("3").expect("valid id");
        assert_eq!(
            remote_product_id(&demo),
            Err(RemoteError::IncompatibleId(demo))
        );

        let uuid = uuid::Uuid::new_v4();
        assert_eq!(remote_product_id(&ProductId::from(uuid)), Ok(uuid));
    }

    #[test]
    fn test_non_database_errors_are_unavailable() {
        let err = RemoteError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, RemoteError::Unavailable(_)));
    }
}
