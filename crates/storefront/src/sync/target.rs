//! Per-mutation store routing.

use cartsync_core::{AccountId, ProductId};

use super::phase::WishlistCapability;

/// Where a single mutation is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageTarget {
    /// The local key-value store.
    Local,
    /// The account store, scoped to this account.
    Remote(AccountId),
}

impl StorageTarget {
    /// Route a cart mutation. Demo-catalog ids stay local even when signed in.
    #[must_use]
    pub fn for_cart(account: Option<AccountId>, product_id: &ProductId) -> Self {
        match account {
            Some(account) if product_id.is_remote_compatible() => Self::Remote(account),
            _ => Self::Local,
        }
    }

    /// Route a wishlist mutation, honoring a capability downgrade.
    #[must_use]
    pub fn for_wishlist(
        account: Option<AccountId>,
        product_id: &ProductId,
        capability: WishlistCapability,
    ) -> Self {
        match capability {
            WishlistCapability::Remote => Self::for_cart(account, product_id),
            WishlistCapability::LocalOnly => Self::Local,
        }
    }

    /// Whether this is the account store.
    #[must_use]
    pub const fn is_remote(self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_anonymous_routes_local() {
        let id = ProductId::from(Uuid::new_v4());
        assert_eq!(StorageTarget::for_cart(None, &id), StorageTarget::Local);
    }

    #[test]
    fn test_signed_in_routes_by_id_shape() {
        let account = AccountId::new(Uuid::new_v4());
        let uuid_id = ProductId::from(Uuid::new_v4());
        let demo_id = ProductId::parse("2").expect("valid id");

        assert_eq!(
            StorageTarget::for_cart(Some(account), &uuid_id),
            StorageTarget::Remote(account)
        );
        assert_eq!(
            StorageTarget::for_cart(Some(account), &demo_id),
            StorageTarget::Local
        );
    }

    #[test]
    fn test_wishlist_downgrade_routes_local() {
        let account = AccountId::new(Uuid::new_v4());
        let uuid_id = ProductId::from(Uuid::new_v4());

        assert!(
            StorageTarget::for_wishlist(Some(account), &uuid_id, WishlistCapability::Remote)
                .is_remote()
        );
        assert_eq!(
            StorageTarget::for_wishlist(Some(account), &uuid_id, WishlistCapability::LocalOnly),
            StorageTarget::Local
        );
    }
}
