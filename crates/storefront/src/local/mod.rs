//! Local store adapter.
//!
//! The only persistence for anonymous visitors, and the fallback for signed-in
//! visitors when the account store is unreachable. Two entries are kept,
//! [`CART_KEY`] and [`WISHLIST_KEY`], each a JSON array of lines.
//!
//! Reads never fail: absent or malformed entries load as empty collections.
//! Writes are best-effort: backend failures are logged and swallowed.

mod kv;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use cartsync_core::line::{
    insert_wishlist_line, remove_cart_line, remove_wishlist_line, set_cart_quantity,
    upsert_cart_line,
};
use cartsync_core::{CartLine, LineKey, ProductId, WishlistLine};

pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, StorageError};

/// Entry holding the serialized cart.
pub const CART_KEY: &str = "cart";

/// Entry holding the serialized wishlist.
pub const WISHLIST_KEY: &str = "wishlist";

/// Cart and wishlist persistence over a [`KeyValueStore`].
#[derive(Clone)]
pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
}

impl LocalStore {
    /// Create a local store over the given backend.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Create a local store backed by process memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()))
    }

    // =========================================================================
    // Whole-collection access
    // =========================================================================

    /// Load the cart, merging any duplicate keys and dropping empty lines.
    #[must_use]
    pub fn load_cart(&self) -> Vec<CartLine> {
        let raw: Vec<CartLine> = self.load(CART_KEY);
        let mut lines = Vec::with_capacity(raw.len());
        for line in raw.into_iter().filter(|l| l.quantity > 0) {
            upsert_cart_line(&mut lines, line);
        }
        lines
    }

    /// Persist the cart.
    pub fn save_cart(&self, lines: &[CartLine]) {
        self.save(CART_KEY, lines);
    }

    /// Load the wishlist, dropping duplicate products.
    #[must_use]
    pub fn load_wishlist(&self) -> Vec<WishlistLine> {
        let raw: Vec<WishlistLine> = self.load(WISHLIST_KEY);
        let mut lines = Vec::with_capacity(raw.len());
        for line in raw {
            insert_wishlist_line(&mut lines, line);
        }
        lines
    }

    /// Persist the wishlist.
    pub fn save_wishlist(&self, lines: &[WishlistLine]) {
        self.save(WISHLIST_KEY, lines);
    }

    /// Remove the cart entry.
    pub fn clear_cart(&self) {
        self.remove(CART_KEY);
    }

    /// Remove the wishlist entry.
    pub fn clear_wishlist(&self) {
        self.remove(WISHLIST_KEY);
    }

    // =========================================================================
    // Line-level mutations
    // =========================================================================

    /// Increment the matching cart line or append `line`. Returns the new
    /// quantity.
    pub fn upsert_cart_line(&self, line: CartLine) -> u32 {
        let mut lines = self.load_cart();
        let quantity = upsert_cart_line(&mut lines, line);
        self.save_cart(&lines);
        quantity
    }

    /// Set the quantity of the matching cart line, inserting `line` with that
    /// quantity if no line matches.
    pub fn put_cart_line(&self, line: CartLine) {
        let mut lines = self.load_cart();
        let key = line.key();
        match lines.iter_mut().find(|l| l.matches(&key)) {
            Some(existing) => existing.quantity = line.quantity,
            None => lines.push(line),
        }
        self.save_cart(&lines);
    }

    /// Set the quantity of the matching cart line. Returns `false` if absent.
    pub fn set_cart_quantity(&self, key: &LineKey, quantity: u32) -> bool {
        let mut lines = self.load_cart();
        let updated = set_cart_quantity(&mut lines, key, quantity);
        if updated {
            self.save_cart(&lines);
        }
        updated
    }

    /// Remove the matching cart line. Returns `false` if it was absent.
    pub fn remove_cart_line(&self, key: &LineKey) -> bool {
        let mut lines = self.load_cart();
        let removed = remove_cart_line(&mut lines, key).is_some();
        if removed {
            self.save_cart(&lines);
        }
        removed
    }

    /// Remove every listed cart line, leaving the rest untouched.
    pub fn remove_cart_lines(&self, keys: &[LineKey]) {
        if keys.is_empty() {
            return;
        }
        let mut lines = self.load_cart();
        lines.retain(|line| !keys.iter().any(|key| line.matches(key)));
        self.persist_cart(&lines);
    }

    /// Add a wishlist line. Returns `false` if the product was already there.
    pub fn add_wishlist_line(&self, line: WishlistLine) -> bool {
        let mut lines = self.load_wishlist();
        let added = insert_wishlist_line(&mut lines, line);
        if added {
            self.save_wishlist(&lines);
        }
        added
    }

    /// Remove a wishlist line. Returns `false` if it was absent.
    pub fn remove_wishlist_line(&self, product_id: &ProductId) -> bool {
        let mut lines = self.load_wishlist();
        let removed = remove_wishlist_line(&mut lines, product_id).is_some();
        if removed {
            self.save_wishlist(&lines);
        }
        removed
    }

    /// Remove every listed wishlist product, leaving the rest untouched.
    pub fn remove_wishlist_lines(&self, product_ids: &[ProductId]) {
        if product_ids.is_empty() {
            return;
        }
        let mut lines = self.load_wishlist();
        lines.retain(|line| !product_ids.contains(&line.product_id));
        self.persist_wishlist(&lines);
    }

    /// Drop every line the account store could hold, keeping demo-catalog
    /// lines. Used on sign-out so one account's lines never leak into the
    /// next visitor's merge.
    pub fn purge_remote_compatible(&self) {
        let mut cart = self.load_cart();
        let cart_before = cart.len();
        cart.retain(|line| !line.product_id.is_remote_compatible());

        let mut wishlist = self.load_wishlist();
        let wishlist_before = wishlist.len();
        wishlist.retain(|line| !line.product_id.is_remote_compatible());

        debug!(
            cart_purged = cart_before - cart.len(),
            wishlist_purged = wishlist_before - wishlist.len(),
            "Purged account lines from local store"
        );

        self.persist_cart(&cart);
        self.persist_wishlist(&wishlist);
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    fn persist_cart(&self, lines: &[CartLine]) {
        if lines.is_empty() {
            self.clear_cart();
        } else {
            self.save_cart(lines);
        }
    }

    fn persist_wishlist(&self, lines: &[WishlistLine]) {
        if lines.is_empty() {
            self.clear_wishlist();
        } else {
            self.save_wishlist(lines);
        }
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.kv.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key, error = %e, "Failed to read local store, treating as empty");
                return Vec::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(key, error = %e, "Malformed local data, treating as empty");
            Vec::new()
        })
    }

    fn save<T: Serialize>(&self, key: &str, lines: &[T]) {
        let raw = match serde_json::to_string(lines) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize local data");
                return;
            }
        };
        if let Err(e) = self.kv.set(key, &raw) {
            warn!(key, error = %e, "Failed to write local store");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.kv.remove(key) {
            warn!(key, error = %e, "Failed to clear local store entry");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cartsync_core::{Price, Product};
    use uuid::Uuid;

    use super::*;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Poisoned)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }
    }

    fn product(id: &str) -> Product {
        Product::new(ProductId::parse(id).unwrap(), "Thing", Price::from_cents(500))
    }

    fn uuid_product() -> Product {
        Product::new(ProductId::from(Uuid::new_v4()), "Remote thing", Price::from_cents(700))
    }

    #[test]
    fn test_absent_entries_load_empty() {
        let store = LocalStore::in_memory();
        assert!(store.load_cart().is_empty());
        assert!(store.load_wishlist().is_empty());
    }

    #[test]
    fn test_malformed_entries_load_empty() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set(CART_KEY, "{not json").unwrap();
        kv.set(WISHLIST_KEY, "{\"an\":\"object\"}").unwrap();

        let store = LocalStore::new(kv);
        assert!(store.load_cart().is_empty());
        assert!(store.load_wishlist().is_empty());
    }

    #[test]
    fn test_backend_failures_are_swallowed() {
        let store = LocalStore::new(Arc::new(BrokenStore));
        assert!(store.load_cart().is_empty());
        store.upsert_cart_line(CartLine::new(product("1"), 1, None, None));
        store.clear_wishlist();
    }

    #[test]
    fn test_upsert_and_remove() {
        let store = LocalStore::in_memory();
        store.upsert_cart_line(CartLine::new(product("1"), 1, None, None));
        assert_eq!(store.upsert_cart_line(CartLine::new(product("1"), 2, None, None)), 3);
        store.upsert_cart_line(CartLine::new(product("1"), 1, Some("red"), None));
        assert_eq!(store.load_cart().len(), 2);

        let key = LineKey::new(ProductId::parse("1").unwrap(), Some("red"), None);
        assert!(store.remove_cart_line(&key));
        assert!(!store.remove_cart_line(&key));
        assert_eq!(store.load_cart().len(), 1);
    }

    #[test]
    fn test_put_cart_line_sets_quantity() {
        let store = LocalStore::in_memory();
        store.put_cart_line(CartLine::new(product("2"), 4, None, None));
        store.put_cart_line(CartLine::new(product("2"), 1, None, None));
        let cart = store.load_cart();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.first().unwrap().quantity, 1);
    }

    #[test]
    fn test_load_merges_duplicate_keys() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let lines = vec![
            CartLine::new(product("1"), 1, None, None),
            CartLine::new(product("1"), 2, None, None),
        ];
        kv.set(CART_KEY, &serde_json::to_string(&lines).unwrap()).unwrap();

        let cart = LocalStore::new(kv).load_cart();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.first().unwrap().quantity, 3);
    }

    #[test]
    fn test_purge_keeps_demo_lines() {
        let store = LocalStore::in_memory();
        store.upsert_cart_line(CartLine::new(product("1"), 1, None, None));
        store.upsert_cart_line(CartLine::new(uuid_product(), 1, None, None));
        store.add_wishlist_line(WishlistLine::new(uuid_product()));
        store.add_wishlist_line(WishlistLine::new(product("4")));

        store.purge_remote_compatible();

        let cart = store.load_cart();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.first().unwrap().product_id.as_str(), "1");
        let wishlist = store.load_wishlist();
        assert_eq!(wishlist.len(), 1);
        assert_eq!(wishlist.first().unwrap().product_id.as_str(), "4");
    }

    #[test]
    fn test_remove_cart_lines_partial() {
        let store = LocalStore::in_memory();
        let a = uuid_product();
        let b = uuid_product();
        store.upsert_cart_line(CartLine::new(a.clone(), 1, None, None));
        store.upsert_cart_line(CartLine::new(b.clone(), 1, None, None));

        store.remove_cart_lines(&[LineKey::new(a.id, None, None)]);

        let cart = store.load_cart();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.first().unwrap().product_id, b.id);
    }

    #[test]
    fn test_wishlist_add_is_unique() {
        let store = LocalStore::in_memory();
        assert!(store.add_wishlist_line(WishlistLine::new(product("5"))));
        assert!(!store.add_wishlist_line(WishlistLine::new(product("5"))));
        assert!(store.remove_wishlist_line(&ProductId::parse("5").unwrap()));
        assert!(store.load_wishlist().is_empty());
    }
}
