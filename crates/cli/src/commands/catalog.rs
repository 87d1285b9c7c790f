//! Catalog listing.

use cartsync_storefront::db::{create_pool, load_catalog};
use cartsync_storefront::{Catalog, SyncConfig};

use super::CliError;

/// Print every product, with account store products when a database is
/// configured.
///
/// # Errors
///
/// Returns `CliError` if the database is configured but unreachable.
pub async fn run(config: &SyncConfig, offline: bool) -> Result<(), CliError> {
    let catalog = match config.database_url.as_ref().filter(|_| !offline) {
        Some(url) => {
            let pool = create_pool(url).await?;
            load_catalog(&pool).await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Could not load account products");
                Catalog::demo()
            })
        }
        None => Catalog::demo(),
    };

    #[allow(clippy::print_stdout)]
    for product in catalog.products() {
        let seller = product.seller.as_ref().map_or("", |s| s.name.as_str());
        println!(
            "{:<36}  {:<24}  {:>9}  {seller}",
            product.id, product.name, product.price
        );
    }
    Ok(())
}
