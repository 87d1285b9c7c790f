//! An account store that is never reachable.

use async_trait::async_trait;

use cartsync_core::{AccountId, CartLine, LineKey, ProductId, RowId};

use super::{CartRow, RemoteError, RemoteStore, WishlistFetch, WishlistInsert};

/// [`RemoteStore`] that fails every call with [`RemoteError::Unavailable`].
///
/// Used when no database is configured. Signed-in operations then degrade to
/// the local store.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRemoteStore;

impl OfflineRemoteStore {
    fn unavailable() -> RemoteError {
        RemoteError::Unavailable("no account store configured".to_string())
    }
}

#[async_trait]
impl RemoteStore for OfflineRemoteStore {
    async fn fetch_cart(&self, _account: AccountId) -> Result<Vec<CartLine>, RemoteError> {
        Err(Self::unavailable())
    }

    async fn fetch_wishlist(&self, _account: AccountId) -> Result<WishlistFetch, RemoteError> {
        Err(Self::unavailable())
    }

    async fn find_cart_row(
        &self,
        _account: AccountId,
        _key: &LineKey,
    ) -> Result<Option<CartRow>, RemoteError> {
        Err(Self::unavailable())
    }

    async fn insert_cart_row(
        &self,
        _account: AccountId,
        _key: &LineKey,
        _quantity: u32,
    ) -> Result<RowId, RemoteError> {
        Err(Self::unavailable())
    }

    async fn update_cart_row_quantity(
        &self,
        _account: AccountId,
        _row: RowId,
        _quantity: u32,
    ) -> Result<bool, RemoteError> {
        Err(Self::unavailable())
    }

    async fn delete_cart_row(&self, _account: AccountId, _row: RowId) -> Result<(), RemoteError> {
        Err(Self::unavailable())
    }

    async fn delete_all_cart_rows(&self, _account: AccountId) -> Result<(), RemoteError> {
        Err(Self::unavailable())
    }

    async fn insert_wishlist_row(
        &self,
        _account: AccountId,
        _product_id: &ProductId,
    ) -> Result<WishlistInsert, RemoteError> {
        Err(Self::unavailable())
    }

    async fn delete_wishlist_row(
        &self,
        _account: AccountId,
        _product_id: &ProductId,
    ) -> Result<(), RemoteError> {
        Err(Self::unavailable())
    }

    async fn delete_all_wishlist_rows(&self, _account: AccountId) -> Result<(), RemoteError> {
        Err(Self::unavailable())
    }
}
