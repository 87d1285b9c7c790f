//! Cart row repository.
//!
//! Rows are filtered by account on every statement. Variant attributes are
//! compared with `IS NOT DISTINCT FROM`, so `NULL` only ever matches `NULL`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use cartsync_core::{AccountId, CartLine, LineKey, Price, Product, ProductId, RowId};

use super::{CartRow, RemoteError, quantity_from_db, quantity_to_db, remote_product_id};
use crate::catalog::Catalog;

/// Cart row joined to its product, if the product row exists.
#[derive(Debug, sqlx::FromRow)]
struct JoinedCartRecord {
    #[sqlx(flatten)]
    row: CartRecord,
    product_name: Option<String>,
    product_price: Option<Decimal>,
    product_image_url: Option<String>,
    seller_id: Option<String>,
    seller_name: Option<String>,
}

/// Cart row without product data.
#[derive(Debug, sqlx::FromRow)]
struct CartRecord {
    id: Uuid,
    product_id: Uuid,
    quantity: i32,
    color: Option<String>,
    size: Option<String>,
    created_at: DateTime<Utc>,
}

/// Repository for cart row operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
    catalog: &'a Catalog,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool, catalog: &'a Catalog) -> Self {
        Self { pool, catalog }
    }

    /// Load an account's cart.
    ///
    /// Rows are joined to `products`. If the join itself fails, rows are read
    /// alone and resolved through the catalog. Rows that resolve to neither
    /// are dropped.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the cart rows cannot be read at all.
    #[instrument(skip(self), fields(account = %account))]
    pub async fn fetch(&self, account: AccountId) -> Result<Vec<CartLine>, RemoteError> {
        match self.fetch_joined(account).await {
            Ok(lines) => Ok(lines),
            Err(e) => {
                warn!(error = %e, "Cart product join failed, resolving through catalog");
                self.fetch_with_catalog(account).await
            }
        }
    }

    async fn fetch_joined(&self, account: AccountId) -> Result<Vec<CartLine>, RemoteError> {
        let records = sqlx::query_as::<_, JoinedCartRecord>(
            r"
            SELECT c.id, c.product_id, c.quantity, c.color, c.size, c.created_at,
                   p.name AS product_name,
                   p.price AS product_price,
                   p.image_url AS product_image_url,
                   p.seller_id,
                   p.seller_name
            FROM cartsync.cart_items c
            LEFT JOIN cartsync.products p ON p.id = c.product_id
            WHERE c.account_id = $1
            ORDER BY c.created_at, c.id
            ",
        )
        .bind(account.as_uuid())
        .fetch_all(self.pool)
        .await?;

        Ok(records
            .into_iter()
            .filter_map(|r| {
                let product_id = ProductId::from(r.row.product_id);
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
                to_line(r.row, product)
            })
            .collect())
    }

    async fn fetch_with_catalog(&self, account: AccountId) -> Result<Vec<CartLine>, RemoteError> {
        let records = sqlx::query_as::<_, CartRecord>(
            r"
            SELECT id, product_id, quantity, color, size, created_at
            FROM cartsync.cart_items
            WHERE account_id = $1
            ORDER BY created_at, id
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
                to_line(r, product)
            })
            .collect())
    }

    /// Find the row matching `key`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the query fails or the key is not remote
    /// compatible.
    #[instrument(skip(self), fields(account = %account, product_id = %key.product_id))]
    pub async fn find(
        &self,
        account: AccountId,
        key: &LineKey,
    ) -> Result<Option<CartRow>, RemoteError> {
        let product_id = remote_product_id(&key.product_id)?;
        let row: Option<(Uuid, i32)> = sqlx::query_as(
            r"
            SELECT id, quantity
            FROM cartsync.cart_items
            WHERE account_id = $1
              AND product_id = $2
              AND color IS NOT DISTINCT FROM $3
              AND size IS NOT DISTINCT FROM $4
            LIMIT 1
            ",
        )
        .bind(account.as_uuid())
        .bind(product_id)
        .bind(key.color.as_deref())
        .bind(key.size.as_deref())
        .fetch_optional(self.pool)
        .await?;

        row.map(|(id, quantity)| {
            Ok(CartRow {
                id: RowId::new(id),
                quantity: quantity_from_db(quantity)?,
            })
        })
        .transpose()
    }

    /// Insert a row.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Conflict` if a row with the same key exists.
    /// Returns `RemoteError` for other failures.
    #[instrument(skip(self), fields(account = %account, product_id = %key.product_id))]
    pub async fn insert(
        &self,
        account: AccountId,
        key: &LineKey,
        quantity: u32,
    ) -> Result<RowId, RemoteError> {
        let product_id = remote_product_id(&key.product_id)?;
        let (id,): (Uuid,) = sqlx::query_as(
            r"
            INSERT INTO cartsync.cart_items (account_id, product_id, quantity, color, size)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(account.as_uuid())
        .bind(product_id)
        .bind(quantity_to_db(quantity))
        .bind(key.color.as_deref())
        .bind(key.size.as_deref())
        .fetch_one(self.pool)
        .await?;

        debug!(row = %id, quantity, "Inserted cart row");
        Ok(RowId::new(id))
    }

    /// Set a row's quantity. Returns `false` if the row is gone.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the update fails.
    #[instrument(skip(self), fields(account = %account, row = %row))]
    pub async fn update_quantity(
        &self,
        account: AccountId,
        row: RowId,
        quantity: u32,
    ) -> Result<bool, RemoteError> {
        let result = sqlx::query(
            r"
            UPDATE cartsync.cart_items
            SET quantity = $3, updated_at = NOW()
            WHERE account_id = $1 AND id = $2
            ",
        )
        .bind(account.as_uuid())
        .bind(row.as_uuid())
        .bind(quantity_to_db(quantity))
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a row.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the delete fails.
    #[instrument(skip(self), fields(account = %account, row = %row))]
    pub async fn delete(&self, account: AccountId, row: RowId) -> Result<(), RemoteError> {
        sqlx::query(
            r"
            DELETE FROM cartsync.cart_items
            WHERE account_id = $1 AND id = $2
            ",
        )
        .bind(account.as_uuid())
        .bind(row.as_uuid())
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
        let result = sqlx::query(
            r"
            DELETE FROM cartsync.cart_items
            WHERE account_id = $1
            ",
        )
        .bind(account.as_uuid())
        .execute(self.pool)
        .await?;

        debug!(rows = result.rows_affected(), "Cleared cart rows");
        Ok(())
    }
}

fn to_line(record: CartRecord, product: Option<Product>) -> Option<CartLine> {
    let Some(product) = product else {
        debug!(row = %record.id, product_id = %record.product_id, "Dropping cart row with unknown product");
        return None;
    };
    let quantity = match quantity_from_db(record.quantity) {
        Ok(quantity) => quantity,
        Err(e) => {
            warn!(row = %record.id, error = %e, "Dropping corrupt cart row");
            return None;
        }
    };

    Some(CartLine {
        product_id: ProductId::from(record.product_id),
        quantity,
        color: record.color,
        size: record.size,
        added_at: record.created_at,
        product,
        remote_row: Some(RowId::new(record.id)),
    })
}
