//! Product rows.

use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use cartsync_core::{Price, Product, ProductId};

use super::RemoteError;
use crate::catalog::Catalog;

#[derive(Debug, sqlx::FromRow)]
struct ProductRecord {
    id: Uuid,
    name: String,
    price: Decimal,
    image_url: Option<String>,
    seller_id: Option<String>,
    seller_name: Option<String>,
}

impl From<ProductRecord> for Product {
    fn from(r: ProductRecord) -> Self {
        let mut product = Self::new(ProductId::from(r.id), r.name, Price::new(r.price));
        product.image_url = r.image_url;
        if let (Some(id), Some(name)) = (r.seller_id, r.seller_name) {
            product = product.with_seller(id, name);
        }
        product
    }
}

/// Repository for product rows.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List every product, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Product>, RemoteError> {
        let records = sqlx::query_as::<_, ProductRecord>(
            r"
            SELECT id, name, price, image_url, seller_id, seller_name
            FROM cartsync.products
            ORDER BY name, id
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(records.into_iter().map(Product::from).collect())
    }
}

/// The demo catalog plus every product in the account store.
///
/// # Errors
///
/// Returns `RemoteError` if the product rows cannot be read.
pub async fn load_catalog(pool: &PgPool) -> Result<Catalog, RemoteError> {
    let products = ProductRepository::new(pool).list().await?;
    Ok(Catalog::demo().extended(products))
}
