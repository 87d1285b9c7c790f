//! Wiring a coordinator for one command.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use cartsync_core::{AccountId, Product};
use cartsync_storefront::db::{OfflineRemoteStore, PgRemoteStore, RemoteStore, create_pool, load_catalog};
use cartsync_storefront::{
    Catalog, Coordinator, FileKeyValueStore, Identity, IdentityObserver, LocalStore, SyncConfig,
};

use super::CliError;

/// A coordinator with its identity settled.
pub struct Session {
    pub coordinator: Coordinator,
    pub catalog: Catalog,
    identity: watch::Sender<Identity>,
    observer: JoinHandle<()>,
}

impl Session {
    /// Open the local store, connect the account store (unless `offline` or
    /// unconfigured), and wait for the identity to settle.
    ///
    /// # Errors
    ///
    /// Returns `CliError` if the local store directory or the database pool
    /// cannot be opened.
    pub async fn open(
        config: &SyncConfig,
        account: Option<AccountId>,
        offline: bool,
    ) -> Result<Self, CliError> {
        let local = LocalStore::new(Arc::new(FileKeyValueStore::open(&config.store_dir)?));

        let (remote, catalog): (Arc<dyn RemoteStore>, Catalog) =
            match config.database_url.as_ref().filter(|_| !offline) {
                Some(url) => {
                    let pool = create_pool(url).await?;
                    let catalog = load_catalog(&pool).await.unwrap_or_else(|e| {
                        warn!(error = %e, "Could not load account products, using demo catalog");
                        Catalog::demo()
                    });
                    (Arc::new(PgRemoteStore::new(pool, catalog.clone())), catalog)
                }
                None => {
                    info!("No account store, running offline");
                    (Arc::new(OfflineRemoteStore), Catalog::demo())
                }
            };

        let coordinator = Coordinator::from_config(local, remote, config);
        let (identity, rx) = IdentityObserver::channel();
        let observer = tokio::spawn(
            IdentityObserver::new(rx, config.identity_timeout).run(coordinator.clone()),
        );
        identity.send_replace(account.map_or_else(Identity::anonymous, Identity::signed_in));

        let mut phase = coordinator.subscribe_phase();
        // The coordinator holds the sender, so this only ends once settled.
        let _ = phase.wait_for(|phase| !phase.is_loading()).await.map(|_| ());

        Ok(Self {
            coordinator,
            catalog,
            identity,
            observer,
        })
    }

    /// Look up a catalog product.
    ///
    /// # Errors
    ///
    /// Returns `CliError::UnknownProduct` if the id is not in the catalog.
    pub fn product(&self, id: &str) -> Result<Product, CliError> {
        self.catalog
            .product_by_id(id)
            .ok_or_else(|| CliError::UnknownProduct(id.to_owned()))
    }

    /// Stop the identity observer.
    pub async fn close(self) {
        drop(self.identity);
        if let Err(e) = self.observer.await {
            warn!(error = %e, "Identity observer ended abnormally");
        }
    }
}
