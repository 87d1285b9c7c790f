//! Integration test support for cartsync.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartsync-integration-tests
//! ```
//!
//! No database is needed. [`FakeRemoteStore`] keeps account rows in memory,
//! enforces the same uniqueness keys as the real schema, counts calls per
//! operation, and can be switched offline, stripped of its wishlist relation,
//! or paused mid-insert.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use uuid::Uuid;

use cartsync_core::{
    AccountId, CartLine, LineKey, Price, Product, ProductId, RowId, WishlistLine,
};
use cartsync_storefront::db::{CartRow, RemoteError, RemoteStore, WishlistFetch, WishlistInsert};
use cartsync_storefront::{Catalog, Coordinator, Identity, LocalStore, SessionPhase};

#[derive(Debug, Clone)]
struct FakeCartRow {
    id: RowId,
    account: AccountId,
    key: LineKey,
    quantity: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    cart: Vec<FakeCartRow>,
    wishlist: Vec<(AccountId, ProductId)>,
    products: HashMap<ProductId, Product>,
    calls: HashMap<&'static str, usize>,
    offline: bool,
    wishlist_missing: bool,
    raw_wishlist_conflicts: bool,
    failing_products: HashSet<ProductId>,
}

/// In-memory account store.
#[derive(Debug, Default)]
pub struct FakeRemoteStore {
    state: Mutex<FakeState>,
    insert_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose wishlist relation was never provisioned.
    #[must_use]
    pub fn without_wishlist() -> Self {
        let store = Self::default();
        store.lock().wishlist_missing = true;
        store
    }

    /// Create and register a UUID product.
    #[must_use]
    pub fn product(&self, name: &str, cents: i64) -> Product {
        let product = Product::new(
            ProductId::from(Uuid::new_v4()),
            name,
            Price::from_cents(cents),
        );
        self.lock()
            .products
            .insert(product.id.clone(), product.clone());
        product
    }

    /// Report duplicate wishlist inserts as a bare `Conflict` error instead of
    /// `AlreadyPresent`, the way an adapter without the unique-violation
    /// mapping would.
    pub fn report_raw_wishlist_conflicts(&self) {
        self.lock().raw_wishlist_conflicts = true;
    }

    /// Make every call fail with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Make inserts for one product fail with `Unavailable`.
    pub fn fail_inserts_for(&self, product_id: &ProductId) {
        self.lock().failing_products.insert(product_id.clone());
    }

    /// Undo [`Self::fail_inserts_for`].
    pub fn clear_failures(&self) {
        self.lock().failing_products.clear();
    }

    /// Hold every cart insert until [`Self::release_inserts`].
    pub fn pause_inserts(&self) {
        *self
            .insert_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let paused inserts proceed.
    pub fn release_inserts(&self) {
        if let Some(gate) = self
            .insert_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            gate.add_permits(Semaphore::MAX_PERMITS);
        }
    }

    /// Write a cart row directly, as another device would.
    pub fn seed_cart_row(&self, account: AccountId, key: LineKey, quantity: u32) {
        self.lock().cart.push(FakeCartRow {
            id: RowId::new(Uuid::new_v4()),
            account,
            key,
            quantity,
        });
    }

    /// Number of calls made to `operation`.
    #[must_use]
    pub fn calls(&self, operation: &str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Number of calls made to any operation.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// An account's cart rows as `(key, quantity)`.
    #[must_use]
    pub fn cart_rows(&self, account: AccountId) -> Vec<(LineKey, u32)> {
        self.lock()
            .cart
            .iter()
            .filter(|row| row.account == account)
            .map(|row| (row.key.clone(), row.quantity))
            .collect()
    }

    /// An account's wishlist products.
    #[must_use]
    pub fn wishlist_rows(&self, account: AccountId) -> Vec<ProductId> {
        self.lock()
            .wishlist
            .iter()
            .filter(|(owner, _)| *owner == account)
            .map(|(_, product_id)| product_id.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and fail it if offline.
    fn enter(&self, operation: &'static str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;
        if state.offline {
            return Err(RemoteError::Unavailable("fake store offline".to_string()));
        }
        Ok(())
    }

    fn wishlist_relation(&self) -> Result<(), RemoteError> {
        if self.lock().wishlist_missing {
            return Err(RemoteError::RelationMissing(
                "relation \"cartsync.wishlist_items\" does not exist".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve(&self, product_id: &ProductId) -> Option<Product> {
        self.lock()
            .products
            .get(product_id)
            .cloned()
            .or_else(|| Catalog::demo().product_by_id(product_id.as_str()))
    }
}

#[async_trait]
impl RemoteStore for FakeRemoteStore {
    async fn fetch_cart(&self, account: AccountId) -> Result<Vec<CartLine>, RemoteError> {
        self.enter("fetch_cart")?;
        let rows: Vec<FakeCartRow> = self
            .lock()
            .cart
            .iter()
            .filter(|row| row.account == account)
            .cloned()
            .collect();
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let product = self.resolve(&row.key.product_id)?;
                let mut line = CartLine::new(
                    product,
                    row.quantity,
                    row.key.color.as_deref(),
                    row.key.size.as_deref(),
                );
                line.remote_row = Some(row.id);
                Some(line)
            })
            .collect())
    }

    async fn fetch_wishlist(&self, account: AccountId) -> Result<WishlistFetch, RemoteError> {
        self.enter("fetch_wishlist")?;
        if self.lock().wishlist_missing {
            return Ok(WishlistFetch::Unprovisioned);
        }
        let ids = self.wishlist_rows(account);
        Ok(WishlistFetch::Available(
            ids.iter()
                .filter_map(|id| self.resolve(id).map(WishlistLine::new))
                .collect(),
        ))
    }

    async fn find_cart_row(
        &self,
        account: AccountId,
        key: &LineKey,
    ) -> Result<Option<CartRow>, RemoteError> {
        self.enter("find_cart_row")?;
        Ok(self
            .lock()
            .cart
            .iter()
            .find(|row| row.account == account && &row.key == key)
            .map(|row| CartRow {
                id: row.id,
                quantity: row.quantity,
            }))
    }

    async fn insert_cart_row(
        &self,
        account: AccountId,
        key: &LineKey,
        quantity: u32,
    ) -> Result<RowId, RemoteError> {
        self.enter("insert_cart_row")?;
        let gate = self
            .insert_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        }

        let mut state = self.lock();
        if state.failing_products.contains(&key.product_id) {
            return Err(RemoteError::Unavailable("insert rejected".to_string()));
        }
        if !key.is_remote_compatible() {
            return Err(RemoteError::IncompatibleId(key.product_id.clone()));
        }
        if state
            .cart
            .iter()
            .any(|row| row.account == account && &row.key == key)
        {
            return Err(RemoteError::Conflict("cart_items_line_key".to_string()));
        }
        let id = RowId::new(Uuid::new_v4());
        state.cart.push(FakeCartRow {
            id,
            account,
            key: key.clone(),
            quantity,
        });
        Ok(id)
    }

    async fn update_cart_row_quantity(
        &self,
        account: AccountId,
        row: RowId,
        quantity: u32,
    ) -> Result<bool, RemoteError> {
        self.enter("update_cart_row_quantity")?;
        let mut state = self.lock();
        match state
            .cart
            .iter_mut()
            .find(|r| r.account == account && r.id == row)
        {
            Some(r) => {
                r.quantity = quantity;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_cart_row(&self, account: AccountId, row: RowId) -> Result<(), RemoteError> {
        self.enter("delete_cart_row")?;
        self.lock()
            .cart
            .retain(|r| !(r.account == account && r.id == row));
        Ok(())
    }

    async fn delete_all_cart_rows(&self, account: AccountId) -> Result<(), RemoteError> {
        self.enter("delete_all_cart_rows")?;
        self.lock().cart.retain(|r| r.account != account);
        Ok(())
    }

    async fn insert_wishlist_row(
        &self,
        account: AccountId,
        product_id: &ProductId,
    ) -> Result<WishlistInsert, RemoteError> {
        self.enter("insert_wishlist_row")?;
        self.wishlist_relation()?;
        let mut state = self.lock();
        if state.failing_products.contains(product_id) {
            return Err(RemoteError::Unavailable("insert rejected".to_string()));
        }
        if state
            .wishlist
            .iter()
            .any(|(owner, id)| *owner == account && id == product_id)
        {
            if state.raw_wishlist_conflicts {
                return Err(RemoteError::Conflict("wishlist_items_pkey".to_string()));
            }
            return Ok(WishlistInsert::AlreadyPresent);
        }
        state.wishlist.push((account, product_id.clone()));
        Ok(WishlistInsert::Inserted)
    }

    async fn delete_wishlist_row(
        &self,
        account: AccountId,
        product_id: &ProductId,
    ) -> Result<(), RemoteError> {
        self.enter("delete_wishlist_row")?;
        self.wishlist_relation()?;
        self.lock()
            .wishlist
            .retain(|(owner, id)| !(*owner == account && id == product_id));
        Ok(())
    }

    async fn delete_all_wishlist_rows(&self, account: AccountId) -> Result<(), RemoteError> {
        self.enter("delete_all_wishlist_rows")?;
        self.wishlist_relation()?;
        self.lock().wishlist.retain(|(owner, _)| *owner != account);
        Ok(())
    }
}

/// A coordinator wired to an in-memory local store and a fake account store.
pub struct Harness {
    pub coordinator: Coordinator,
    pub local: LocalStore,
    pub remote: Arc<FakeRemoteStore>,
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        Self::with_remote(FakeRemoteStore::new())
    }

    #[must_use]
    pub fn with_remote(remote: FakeRemoteStore) -> Self {
        Self::with_parts(LocalStore::in_memory(), Arc::new(remote))
    }

    /// Reuse an existing local store, as a new process on the same device.
    #[must_use]
    pub fn with_parts(local: LocalStore, remote: Arc<FakeRemoteStore>) -> Self {
        let coordinator = Coordinator::new(local.clone(), remote.clone(), Duration::from_secs(5));
        Self {
            coordinator,
            local,
            remote,
        }
    }

    pub async fn anonymous(&self) {
        self.coordinator.handle_identity(Identity::anonymous()).await;
        assert_eq!(self.coordinator.phase(), SessionPhase::Anonymous);
    }

    pub async fn sign_in(&self, account: AccountId) {
        self.coordinator
            .handle_identity(Identity::signed_in(account))
            .await;
    }

    pub async fn sign_out(&self) {
        self.anonymous().await;
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// A fresh account id.
#[must_use]
pub fn account() -> AccountId {
    AccountId::new(Uuid::new_v4())
}

/// A product from the bundled demo catalog.
///
/// # Panics
///
/// Panics if `id` is not a demo catalog id.
#[must_use]
pub fn demo_product(id: &str) -> Product {
    Catalog::demo()
        .product_by_id(id)
        .unwrap_or_else(|| panic!("demo product {id} exists"))
}

/// A product id.
///
/// # Panics
///
/// Panics if `id` is blank.
#[must_use]
pub fn pid(id: &str) -> ProductId {
    ProductId::parse(id).unwrap_or_else(|_| panic!("valid product id {id:?}"))
}
