//! Wishlist row repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use cartsync_core::{AccountId, Price, Product, ProductId, WishlistLine};

use super::{RemoteError, WishlistFetch, WishlistInsert, remote_product_id};
use crate::catalog::Catalog;

#[derive(Debug, sqlx::FromRow)]
struct JoinedWishlistRecord {
    product_id: Uuid,
    created_at: DateTime<Utc>,
    product_name: Option<String>,
    product_price: Option<Decimal>,
    product_image_url: Option<String>,
    seller_id: Option<String>,
    seller_name: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct WishlistRecord {
    product_id: Uuid,
    created_at: DateTime<Utc>,
}

/// Repository for wishlist row operations.
pub struct WishlistRepository<'a> {
    pool: &'a PgPool,
    catalog: &'a Catalog,
}

impl<'a> WishlistRepository<'a> {
    /// Create a new wishlist repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool, catalog: &'a Catalog) -> Self {
        Self { pool, catalog }
    }

    /// Load an account's wishlist.
    ///
    /// A missing `wishlist_items` relation is reported as
    /// [`WishlistFetch::Unprovisioned`]. A failed product join falls back to
    /// catalog lookup, as for carts.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` for failures other than a missing relation.
    #[instrument(skip(self), fields(account = %account))]
    pub async fn fetch(&self, account: AccountId) -> Result<WishlistFetch, RemoteError> {
        match self.fetch_joined(account).await {
            Ok(lines) => return Ok(WishlistFetch::Available(lines)),
            Err(e) => {
                warn!(error = %e, "Wishlist product join failed, resolving through catalog");
            }
        }

        match self.fetch_with_catalog(account).await {
            Ok(lines) => Ok(WishlistFetch::Available(lines)),
            Err(RemoteError::RelationMissing(message)) => {
                warn!(%message, "Wishlist relation is not provisioned");
                Ok(WishlistFetch::Unprovisioned)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_joined(&self, account: AccountId) -> Result<Vec<WishlistLine>, RemoteError> {
        let records = sqlx::query_as::<_, JoinedWishlistRecord>(
            r"
            SELECT w.product_id, w.created_at,
                   p.name AS product_name,
                   p.price AS product_price,
                   p.image_url AS product_image_url,
                   p.seller_id,
                   p.seller_name
            FROM cartsync.wishlist_items w
            LEFT JOIN cartsync.products p ON p.id = w.product_id
            WHERE w.account_id = $1
            ORDER BY w.created_at, w.product_id
            ",
        )
        .bind(account.as_uuid())
        .fetch_all(self.pool)
        .await?;

        Ok(records
            .into_iter()
            .filter_map(|r| {
                let product_id = ProductId::from(r.product_id);
                let product = match (r.product_name, r.product_price) {
                    (Some(name), Some(price)) => {
                        let mut product = Product::new(product_id, name, Price::new(price));
                        product.image_url = r.product_image_url;
                        if let (Some(id), Some(name)) = (r.seller_id, r.seller_name) {
                            product = product.with_seller(id, name);
                        }
                        Some(product)
                    }
                    _ => self.catalog.product_by_id(product_id.as_str()),
                };
                to_line(r.product_id, r.created_at, product)
            })
            .collect())
    }

    async fn fetch_with_catalog(
        &self,
        account: AccountId,
    ) -> Result<Vec<WishlistLine>, RemoteError> {
        let records = sqlx::query_as::<_, WishlistRecord>(
            r"
            SELECT product_id, created_at
            FROM cartsync.wishlist_items
            WHERE account_id = $1
            ORDER BY created_at, product_id
            ",
        )
        .bind(account.as_uuid())
        .fetch_all(self.pool)
        .await?;

        Ok(records
            .into_iter()
            .filter_map(|r| {
                let product = self
                    .catalog
                    .product_by_id(&r.product_id.hyphenated().to_string());
                to_line(r.product_id, r.created_at, product)
            })
            .collect())
    }

    /// Add a product. An existing row is reported as `AlreadyPresent`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` for failures other than a duplicate key.
    #[instrument(skip(self), fields(account = %account, product_id = %product_id))]
    pub async fn insert(
        &self,
        account: AccountId,
        product_id: &ProductId,
    ) -> Result<WishlistInsert, RemoteError> {
        let uuid = remote_product_id(product_id)?;
        let result = sqlx::query(
            r"
            INSERT INTO cartsync.wishlist_items (account_id, product_id)
            VALUES ($1, $2)
            ",
        )
        .bind(account.as_uuid())
        .bind(uuid)
        .execute(self.pool)
        .await;

        match result.map_err(RemoteError::from) {
            Ok(_) => Ok(WishlistInsert::Inserted),
            Err(RemoteError::Conflict(_)) => {
                debug!("Wishlist row already present");
                Ok(WishlistInsert::AlreadyPresent)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove a product.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the delete fails.
    #[instrument(skip(self), fields(account = %account, product_id = %product_id))]
    pub async fn delete(
        &self,
        account: AccountId,
        product_id: &ProductId,
    ) -> Result<(), RemoteError> {
        let uuid = remote_product_id(product_id)?;
        sqlx::query(
            r"
            DELETE FROM cartsync.wishlist_items
            WHERE account_id = $1 AND product_id = $2
            ",
        )
        .bind(account.as_uuid())
        .bind(uuid)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Delete every row for the account.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the delete fails.
    #[instrument(skip(self), fields(account = %account))]
    pub async fn delete_all(&self, account: AccountId) -> Result<(), RemoteError> {
        sqlx::query(
            r"
            DELETE FROM cartsync.wishlist_items
            WHERE account_id = $1
            ",
        )
        .bind(account.as_uuid())
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

fn to_line(
    product_id: Uuid,
    created_at: DateTime<Utc>,
    product: Option<Product>,
) -> Option<WishlistLine> {
    let Some(product) = product else {
        debug!(product_id = %product_id, "Dropping wishlist row with unknown product");
        return None;
    };
    Some(WishlistLine {
        product_id: ProductId::from(product_id),
        added_at: created_at,
        product,
    })
}
