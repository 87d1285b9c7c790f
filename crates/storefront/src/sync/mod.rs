//! Cart and wishlist reconciliation.
//!
//! A [`Coordinator`] owns the session: which store is authoritative, the
//! projection shown to the visitor, and the one-shot merge of anonymous lines
//! into the account store on sign-in.
//!
//! Every identity transition bumps a session epoch. Anything that awaits the
//! account store captures the epoch first and re-checks it before touching
//! the projection or the local store, so a continuation from a previous
//! session is dropped instead of corrupting the current one.
//!
//! The session lock is never held across an `.await`.

mod attempt;
mod merge;
mod phase;
mod projection;
mod target;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use cartsync_core::{AccountId, CartLine, LineKey, Price, Product, ProductId, RowId, WishlistLine};

use crate::config::SyncConfig;
use crate::db::{CartRow, RemoteError, RemoteStore, WishlistFetch, WishlistInsert};
use crate::error::{CartError, Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::identity::Identity;
use crate::local::LocalStore;

pub use attempt::{Attempt, DegradeReason, attempt_remote};
pub use merge::{MergeReport, Partition, merge_into_account};
pub use phase::{SessionPhase, WishlistCapability};
pub use projection::{Projection, SellerGroup};
pub use target::StorageTarget;

/// How a mutation was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Written to the given store and reflected in the projection.
    Stored(StorageTarget),
    /// The account store failed; the change was written locally instead.
    Degraded(DegradeReason),
    /// Nothing matched, so nothing changed.
    Unchanged,
    /// The session ended while the call was in flight. Its result was not
    /// applied to the current session.
    Discarded,
}

impl Outcome {
    /// Whether the mutation fell back to the local store.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Identifies the session a mutation started in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Session {
    epoch: u64,
    account: Option<AccountId>,
}

#[derive(Debug, Default)]
struct SessionState {
    epoch: u64,
    account: Option<AccountId>,
    /// Account whose sign-in merge already ran. Cleared on sign-out.
    synced_account: Option<AccountId>,
    wishlist_capability: WishlistCapability,
    projection: Projection,
}

struct CoordinatorInner {
    local: LocalStore,
    remote: Arc<dyn RemoteStore>,
    identity_timeout: Duration,
    phase: watch::Sender<SessionPhase>,
    state: Mutex<SessionState>,
}

/// Reconciles the local and account stores for one visitor.
///
/// Cloning is cheap and every clone shares the same session.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    /// Create a coordinator in [`SessionPhase::Resolving`].
    ///
    /// The projection starts from the local store so anything already saved
    /// is visible before the identity source answers.
    #[must_use]
    pub fn new(local: LocalStore, remote: Arc<dyn RemoteStore>, identity_timeout: Duration) -> Self {
        let projection = Projection {
            cart: local.load_cart(),
            wishlist: local.load_wishlist(),
        };
        let (phase, _) = watch::channel(SessionPhase::Resolving);
        Self {
            inner: Arc::new(CoordinatorInner {
                local,
                remote,
                identity_timeout,
                phase,
                state: Mutex::new(SessionState {
                    projection,
                    ..SessionState::default()
                }),
            }),
        }
    }

    /// Create a coordinator using the configured identity timeout.
    #[must_use]
    pub fn from_config(local: LocalStore, remote: Arc<dyn RemoteStore>, config: &SyncConfig) -> Self {
        Self::new(local, remote, config.identity_timeout)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current session phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.borrow()
    }

    /// Watch phase changes.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.inner.phase.subscribe()
    }

    /// Whether the projection is still being decided.
    #[must_use]
    pub fn loading(&self) -> bool {
        self.phase().is_loading()
    }

    /// The signed-in account, if any.
    #[must_use]
    pub fn account(&self) -> Option<AccountId> {
        self.lock().account
    }

    #[must_use]
    pub fn wishlist_capability(&self) -> WishlistCapability {
        self.lock().wishlist_capability
    }

    /// How long the first identity resolution may take.
    #[must_use]
    pub fn identity_timeout(&self) -> Duration {
        self.inner.identity_timeout
    }

    /// Snapshot of the projection.
    #[must_use]
    pub fn projection(&self) -> Projection {
        self.lock().projection.clone()
    }

    #[must_use]
    pub fn cart_items(&self) -> Vec<CartLine> {
        self.lock().projection.cart.clone()
    }

    #[must_use]
    pub fn wishlist(&self) -> Vec<WishlistLine> {
        self.lock().projection.wishlist.clone()
    }

    #[must_use]
    pub fn cart_total(&self) -> Price {
        self.lock().projection.cart_total()
    }

    #[must_use]
    pub fn cart_item_count(&self) -> u64 {
        self.lock().projection.cart_item_count()
    }

    #[must_use]
    pub fn group_by_seller(&self) -> Vec<SellerGroup> {
        self.lock().projection.group_by_seller()
    }

    #[must_use]
    pub fn is_in_wishlist(&self, product_id: &ProductId) -> bool {
        self.lock().projection.is_in_wishlist(product_id)
    }

    // =========================================================================
    // Identity transitions
    // =========================================================================

    /// Apply one emission from the identity source.
    #[instrument(skip(self), fields(account = ?identity.account_id, resolving = identity.is_resolving))]
    pub async fn handle_identity(&self, identity: Identity) {
        if identity.is_resolving {
            self.enter_resolving();
            return;
        }
        match identity.account_id {
            Some(account) => self.sign_in(account).await,
            None => self.sign_out(),
        }
    }

    /// Settle a stalled identity check as anonymous. Does nothing once the
    /// identity has been decided.
    pub fn resolve_as_anonymous(&self) {
        if self.phase() == SessionPhase::Resolving {
            self.sign_out();
        }
    }

    fn enter_resolving(&self) {
        let _state = self.lock();
        if self.phase() != SessionPhase::Resolving {
            debug!("Identity resolving, holding mutations");
            self.set_phase(SessionPhase::Resolving);
        }
    }

    async fn sign_in(&self, account: AccountId) {
        enum Next {
            Ignore,
            Reload(Session),
            Sync(Session),
        }

        let next = {
            let mut state = self.lock();
            let phase = self.phase();
            if state.account == Some(account)
                && matches!(phase, SessionPhase::Syncing | SessionPhase::Authenticated)
            {
                Next::Ignore
            } else {
                state.epoch += 1;
                let previous = state.account.replace(account);
                if previous.is_some_and(|prev| prev != account) {
                    // Switched accounts without a sign-out in between.
                    self.inner.local.purge_remote_compatible();
                    state.synced_account = None;
                    state.wishlist_capability = WishlistCapability::Remote;
                }
                let session = Session {
                    epoch: state.epoch,
                    account: Some(account),
                };
                if state.synced_account == Some(account) {
                    self.set_phase(SessionPhase::Authenticated);
                    Next::Reload(session)
                } else {
                    state.synced_account = Some(account);
                    state.wishlist_capability = WishlistCapability::Remote;
                    self.set_phase(SessionPhase::Syncing);
                    Next::Sync(session)
                }
            }
        };

        match next {
            Next::Ignore => debug!(%account, "Duplicate sign-in emission ignored"),
            Next::Reload(session) => self.reload(session).await,
            Next::Sync(session) => {
                set_sentry_user(&account);
                info!(%account, "Signed in, syncing local lines");
                self.run_sync(session).await;
            }
        }
    }

    fn sign_out(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.synced_account = None;
        state.wishlist_capability = WishlistCapability::Remote;
        if let Some(account) = state.account.take() {
            self.inner.local.purge_remote_compatible();
            clear_sentry_user();
            info!(%account, "Signed out");
        }
        state.projection = Projection {
            cart: self.inner.local.load_cart(),
            wishlist: self.inner.local.load_wishlist(),
        };
        self.set_phase(SessionPhase::Anonymous);
    }

    async fn run_sync(&self, session: Session) {
        let Some(account) = session.account else {
            return;
        };
        let cart = self.inner.local.load_cart();
        let wishlist = self.inner.local.load_wishlist();
        let partition = Partition::split(cart.clone(), wishlist.clone());

        if partition.has_local_only() {
            info!(
                local_cart = partition.local_cart.len(),
                local_wishlist = partition.local_wishlist.len(),
                "Local lines include demo products, keeping the local projection"
            );
            let mut state = self.lock();
            if state.epoch == session.epoch {
                state.projection = Projection { cart, wishlist };
                self.finish_syncing();
            }
            return;
        }

        let report = merge_into_account(
            self.inner.remote.as_ref(),
            account,
            &partition.remote_cart,
            &partition.remote_wishlist,
            || self.is_current(session),
        )
        .await;

        if report.interrupted || !self.is_current(session) {
            info!(%account, "Sign-in merge interrupted, local store left as is");
            return;
        }

        self.inner.local.remove_cart_lines(&report.synced_cart);
        self.inner.local.remove_wishlist_lines(&report.synced_wishlist);
        if report.wishlist_unprovisioned {
            self.downgrade_wishlist(session);
        }
        if !report.is_complete() {
            add_breadcrumb(
                "sync",
                "Sign-in merge left lines stranded",
                Some(&[("stranded", report.stranded.to_string().as_str())]),
            );
        }

        self.reload(session).await;
    }

    /// Rebuild the projection from the account store plus any local lines.
    async fn reload(&self, session: Session) {
        let Some(account) = session.account else {
            return;
        };
        let remote = &self.inner.remote;

        let cart = attempt_remote("fetch_cart", remote.fetch_cart(account)).await;
        let wishlist = match self.wishlist_capability() {
            WishlistCapability::Remote => {
                Some(attempt_remote("fetch_wishlist", remote.fetch_wishlist(account)).await)
            }
            WishlistCapability::LocalOnly => None,
        };

        let mut state = self.lock();
        if state.epoch != session.epoch {
            debug!(%account, "Discarding reload from an earlier session");
            return;
        }

        let remote_cart = match cart {
            Attempt::Ok(lines) => lines,
            Attempt::Degraded(_) => Vec::new(),
        };
        let remote_wishlist = match wishlist {
            Some(Attempt::Ok(WishlistFetch::Available(lines))) => lines,
            Some(
                Attempt::Ok(WishlistFetch::Unprovisioned)
                | Attempt::Degraded(DegradeReason::CapabilityMissing(_)),
            ) => {
                info!(%account, "Wishlist relation missing, keeping the wishlist local");
                state.wishlist_capability = WishlistCapability::LocalOnly;
                Vec::new()
            }
            Some(Attempt::Degraded(DegradeReason::RemoteUnavailable(_))) | None => Vec::new(),
        };

        state.projection = Projection::combine(
            remote_cart,
            self.inner.local.load_cart(),
            remote_wishlist,
            self.inner.local.load_wishlist(),
        );
        self.finish_syncing();
        debug!(
            %account,
            cart_lines = state.projection.cart.len(),
            wishlist_lines = state.projection.wishlist.len(),
            "Projection reloaded"
        );
    }

    fn downgrade_wishlist(&self, session: Session) {
        let mut state = self.lock();
        if state.epoch == session.epoch
            && state.wishlist_capability == WishlistCapability::Remote
        {
            state.wishlist_capability = WishlistCapability::LocalOnly;
            warn!("Wishlist relation missing, wishlist stays local for this session");
            add_breadcrumb("sync", "Wishlist downgraded to local storage", None);
        }
    }

    // =========================================================================
    // Cart mutations
    // =========================================================================

    /// Add `quantity` of a product to the cart, incrementing an existing line
    /// with the same product, color and size.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::AuthRequired`] when no one is signed in and
    /// [`CartError::InvalidInput`] for an empty product or a zero quantity.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add_to_cart(
        &self,
        product: Product,
        quantity: u32,
        color: Option<&str>,
        size: Option<&str>,
    ) -> Result<Outcome> {
        validate_product(&product)?;
        if quantity == 0 {
            return Err(CartError::InvalidInput(
                "quantity must be at least 1".to_string(),
            ));
        }
        let session = self.ready().await;
        let Some(account) = session.account else {
            return Err(CartError::AuthRequired);
        };

        let mut line = CartLine::new(product, quantity, color, size);
        let target = StorageTarget::for_cart(Some(account), &line.product_id);
        let StorageTarget::Remote(account) = target else {
            return Ok(self.settle(session, |local, projection| {
                local.upsert_cart_line(line.clone());
                projection.upsert_cart(line);
                Outcome::Stored(target)
            }));
        };

        let key = line.key();
        match attempt_remote("add_to_cart", self.increment_remote(account, &key, quantity)).await {
            Attempt::Ok(row) => {
                line.quantity = row.quantity;
                line.remote_row = Some(row.id);
                Ok(self.settle(session, |_, projection| {
                    projection.put_cart(line);
                    Outcome::Stored(target)
                }))
            }
            Attempt::Degraded(reason) => Ok(self.settle(session, |local, projection| {
                local.upsert_cart_line(line.clone());
                projection.upsert_cart(line);
                Outcome::Degraded(reason)
            })),
        }
    }

    /// Set a line's quantity. A quantity of zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidInput`] for an empty product id or a
    /// quantity that does not fit the store.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        product_id: &ProductId,
        color: Option<&str>,
        size: Option<&str>,
        quantity: i64,
    ) -> Result<Outcome> {
        if quantity <= 0 {
            return self.remove_from_cart(product_id, color, size).await;
        }
        validate_id(product_id)?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| CartError::InvalidInput(format!("quantity {quantity} is too large")))?;
        let key = LineKey::new(product_id.clone(), color, size);
        let session = self.ready().await;

        let set_locally = |local: &LocalStore, projection: &mut Projection| {
            let stored = local.set_cart_quantity(&key, quantity);
            let shown = projection.set_cart_quantity(&key, quantity);
            if stored || shown {
                Outcome::Stored(StorageTarget::Local)
            } else {
                Outcome::Unchanged
            }
        };

        let target = StorageTarget::for_cart(session.account, product_id);
        let StorageTarget::Remote(account) = target else {
            return Ok(self.settle(session, set_locally));
        };

        let handle = self.projection_row(&key);
        match attempt_remote(
            "update_quantity",
            self.set_remote_quantity(account, &key, handle, quantity),
        )
        .await
        {
            Attempt::Ok(Some(row)) => Ok(self.settle(session, |_, projection| {
                if let Some(line) = projection.cart.iter_mut().find(|l| l.matches(&key)) {
                    line.quantity = quantity;
                    line.remote_row = Some(row);
                }
                Outcome::Stored(target)
            })),
            // Not in the account store: a line stranded by an earlier merge.
            Attempt::Ok(None) => Ok(self.settle(session, set_locally)),
            Attempt::Degraded(reason) => {
                let snapshot = self.projection_line(&key);
                Ok(self.settle(session, |local, projection| {
                    if !local.set_cart_quantity(&key, quantity)
                        && let Some(mut line) = snapshot
                    {
                        line.quantity = quantity;
                        local.put_cart_line(line);
                    }
                    projection.set_cart_quantity(&key, quantity);
                    Outcome::Degraded(reason)
                }))
            }
        }
    }

    /// Remove a cart line. Removing an absent line is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidInput`] for an empty product id.
    #[instrument(skip(self))]
    pub async fn remove_from_cart(
        &self,
        product_id: &ProductId,
        color: Option<&str>,
        size: Option<&str>,
    ) -> Result<Outcome> {
        validate_id(product_id)?;
        let key = LineKey::new(product_id.clone(), color, size);
        let session = self.ready().await;

        let target = StorageTarget::for_cart(session.account, product_id);
        let StorageTarget::Remote(account) = target else {
            return Ok(self.settle(session, |local, projection| {
                let stored = local.remove_cart_line(&key);
                let shown = projection.remove_cart(&key).is_some();
                if stored || shown {
                    Outcome::Stored(target)
                } else {
                    Outcome::Unchanged
                }
            }));
        };

        let handle = self.projection_row(&key);
        match attempt_remote(
            "remove_from_cart",
            self.delete_remote_line(account, &key, handle),
        )
        .await
        {
            Attempt::Ok(removed_remote) => Ok(self.settle(session, |local, projection| {
                let stored = local.remove_cart_line(&key);
                let shown = projection.remove_cart(&key).is_some();
                if removed_remote || stored || shown {
                    Outcome::Stored(target)
                } else {
                    Outcome::Unchanged
                }
            })),
            Attempt::Degraded(reason) => Ok(self.settle(session, |local, projection| {
                local.remove_cart_line(&key);
                projection.remove_cart(&key);
                Outcome::Degraded(reason)
            })),
        }
    }

    /// Empty the cart.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Outcome {
        let session = self.ready().await;
        let clear = |local: &LocalStore, projection: &mut Projection| {
            local.clear_cart();
            projection.cart.clear();
        };

        let Some(account) = session.account else {
            return self.settle(session, |local, projection| {
                clear(local, projection);
                Outcome::Stored(StorageTarget::Local)
            });
        };

        match attempt_remote("clear_cart", self.inner.remote.delete_all_cart_rows(account)).await
        {
            Attempt::Ok(()) => self.settle(session, |local, projection| {
                clear(local, projection);
                Outcome::Stored(StorageTarget::Remote(account))
            }),
            Attempt::Degraded(reason) => self.settle(session, |local, projection| {
                clear(local, projection);
                Outcome::Degraded(reason)
            }),
        }
    }

    // =========================================================================
    // Wishlist mutations
    // =========================================================================

    /// Add a product to the wishlist. Adding it twice keeps one entry.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::AuthRequired`] when no one is signed in and
    /// [`CartError::InvalidInput`] for an empty product.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add_to_wishlist(&self, product: Product) -> Result<Outcome> {
        validate_product(&product)?;
        let session = self.ready().await;
        let Some(account) = session.account else {
            return Err(CartError::AuthRequired);
        };

        let line = WishlistLine::new(product);
        let target =
            StorageTarget::for_wishlist(Some(account), &line.product_id, self.wishlist_capability());
        let StorageTarget::Remote(account) = target else {
            return Ok(self.settle(session, |local, projection| {
                let stored = local.add_wishlist_line(line.clone());
                let shown = projection.add_wishlist(line);
                if stored || shown {
                    Outcome::Stored(target)
                } else {
                    Outcome::Unchanged
                }
            }));
        };

        let insert = async {
            match self
                .inner
                .remote
                .insert_wishlist_row(account, &line.product_id)
                .await
            {
                // Already on the wishlist: converged, not a failure.
                Err(RemoteError::Conflict(_)) => Ok(WishlistInsert::AlreadyPresent),
                other => other,
            }
        };
        match attempt_remote("add_to_wishlist", insert).await {
            Attempt::Ok(_) => Ok(self.settle(session, |_, projection| {
                projection.add_wishlist(line);
                Outcome::Stored(target)
            })),
            Attempt::Degraded(reason) => {
                if matches!(reason, DegradeReason::CapabilityMissing(_)) {
                    self.downgrade_wishlist(session);
                }
                Ok(self.settle(session, |local, projection| {
                    local.add_wishlist_line(line.clone());
                    projection.add_wishlist(line);
                    Outcome::Degraded(reason)
                }))
            }
        }
    }

    /// Remove a product from the wishlist. Removing an absent product is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidInput`] for an empty product id.
    #[instrument(skip(self))]
    pub async fn remove_from_wishlist(&self, product_id: &ProductId) -> Result<Outcome> {
        validate_id(product_id)?;
        let session = self.ready().await;

        let target =
            StorageTarget::for_wishlist(session.account, product_id, self.wishlist_capability());
        let StorageTarget::Remote(account) = target else {
            return Ok(self.settle(session, |local, projection| {
                let stored = local.remove_wishlist_line(product_id);
                let shown = projection.remove_wishlist(product_id).is_some();
                if stored || shown {
                    Outcome::Stored(target)
                } else {
                    Outcome::Unchanged
                }
            }));
        };

        match attempt_remote(
            "remove_from_wishlist",
            self.inner.remote.delete_wishlist_row(account, product_id),
        )
        .await
        {
            Attempt::Ok(()) => Ok(self.settle(session, |local, projection| {
                local.remove_wishlist_line(product_id);
                if projection.remove_wishlist(product_id).is_some() {
                    Outcome::Stored(target)
                } else {
                    Outcome::Unchanged
                }
            })),
            Attempt::Degraded(reason) => {
                if matches!(reason, DegradeReason::CapabilityMissing(_)) {
                    self.downgrade_wishlist(session);
                }
                Ok(self.settle(session, |local, projection| {
                    local.remove_wishlist_line(product_id);
                    projection.remove_wishlist(product_id);
                    Outcome::Degraded(reason)
                }))
            }
        }
    }

    /// Empty the wishlist.
    #[instrument(skip(self))]
    pub async fn clear_wishlist(&self) -> Outcome {
        let session = self.ready().await;
        let clear = |local: &LocalStore, projection: &mut Projection| {
            local.clear_wishlist();
            projection.wishlist.clear();
        };

        let account = match (session.account, self.wishlist_capability()) {
            (Some(account), WishlistCapability::Remote) => account,
            _ => {
                return self.settle(session, |local, projection| {
                    clear(local, projection);
                    Outcome::Stored(StorageTarget::Local)
                });
            }
        };

        match attempt_remote(
            "clear_wishlist",
            self.inner.remote.delete_all_wishlist_rows(account),
        )
        .await
        {
            Attempt::Ok(()) => self.settle(session, |local, projection| {
                clear(local, projection);
                Outcome::Stored(StorageTarget::Remote(account))
            }),
            Attempt::Degraded(reason) => {
                if matches!(reason, DegradeReason::CapabilityMissing(_)) {
                    self.downgrade_wishlist(session);
                }
                self.settle(session, |local, projection| {
                    clear(local, projection);
                    Outcome::Degraded(reason)
                })
            }
        }
    }

    /// Move a wishlist product into the cart with quantity one.
    ///
    /// Returns [`Outcome::Unchanged`] if the product is not on the wishlist.
    ///
    /// # Errors
    ///
    /// Same as [`Self::add_to_cart`].
    #[instrument(skip(self))]
    pub async fn move_to_cart(&self, product_id: &ProductId) -> Result<Outcome> {
        validate_id(product_id)?;
        let product = self
            .lock()
            .projection
            .wishlist
            .iter()
            .find(|line| &line.product_id == product_id)
            .map(|line| line.product.clone());
        let Some(product) = product else {
            return Ok(Outcome::Unchanged);
        };

        let outcome = self.add_to_cart(product, 1, None, None).await?;
        if outcome != Outcome::Discarded {
            self.remove_from_wishlist(product_id).await?;
        }
        Ok(outcome)
    }

    // =========================================================================
    // Account store helpers
    // =========================================================================

    /// Add `quantity` to the account's row for `key`, creating it if needed.
    async fn increment_remote(
        &self,
        account: AccountId,
        key: &LineKey,
        quantity: u32,
    ) -> std::result::Result<CartRow, RemoteError> {
        let remote = &self.inner.remote;
        if let Some(row) = remote.find_cart_row(account, key).await? {
            let total = row.quantity.saturating_add(quantity);
            if remote.update_cart_row_quantity(account, row.id, total).await? {
                return Ok(CartRow {
                    id: row.id,
                    quantity: total,
                });
            }
        }

        match remote.insert_cart_row(account, key, quantity).await {
            Ok(id) => Ok(CartRow { id, quantity }),
            Err(RemoteError::Conflict(_)) => {
                // Another writer inserted the same key between find and insert.
                let row = remote.find_cart_row(account, key).await?.ok_or_else(|| {
                    RemoteError::Conflict(format!("cart row for {} vanished", key.product_id))
                })?;
                let total = row.quantity.saturating_add(quantity);
                remote.update_cart_row_quantity(account, row.id, total).await?;
                Ok(CartRow {
                    id: row.id,
                    quantity: total,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Set the quantity of the account's row for `key`. Returns `None` if
    /// the account store has no such row.
    async fn set_remote_quantity(
        &self,
        account: AccountId,
        key: &LineKey,
        handle: Option<RowId>,
        quantity: u32,
    ) -> std::result::Result<Option<RowId>, RemoteError> {
        let remote = &self.inner.remote;
        if let Some(row) = handle
            && remote.update_cart_row_quantity(account, row, quantity).await?
        {
            return Ok(Some(row));
        }
        match remote.find_cart_row(account, key).await? {
            Some(row) => {
                remote.update_cart_row_quantity(account, row.id, quantity).await?;
                Ok(Some(row.id))
            }
            None => Ok(None),
        }
    }

    /// Delete the account's row for `key`. Returns whether a row was found.
    async fn delete_remote_line(
        &self,
        account: AccountId,
        key: &LineKey,
        handle: Option<RowId>,
    ) -> std::result::Result<bool, RemoteError> {
        let remote = &self.inner.remote;
        let row = match handle {
            Some(row) => Some(row),
            None => remote.find_cart_row(account, key).await?.map(|row| row.id),
        };
        match row {
            Some(row) => {
                remote.delete_cart_row(account, row).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // =========================================================================
    // Session plumbing
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: SessionPhase) {
        let previous = self.inner.phase.send_replace(phase);
        if previous != phase {
            debug!(from = %previous, to = %phase, "Session phase changed");
        }
    }

    /// Move from `Syncing` to `Authenticated`. Any other phase is left
    /// alone, so a `Resolving` emission that arrived mid-sync keeps holding
    /// mutations until the identity settles again.
    fn finish_syncing(&self) {
        let advanced = self.inner.phase.send_if_modified(|phase| {
            if *phase == SessionPhase::Syncing {
                *phase = SessionPhase::Authenticated;
                true
            } else {
                false
            }
        });
        if advanced {
            debug!(from = %SessionPhase::Syncing, to = %SessionPhase::Authenticated, "Session phase changed");
        }
    }

    fn is_current(&self, session: Session) -> bool {
        self.lock().epoch == session.epoch
    }

    /// Wait until the identity is decided, then capture the session.
    async fn ready(&self) -> Session {
        let mut rx = self.inner.phase.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx
            .wait_for(|phase| *phase != SessionPhase::Resolving)
            .await
            .map(|_| ());
        let state = self.lock();
        Session {
            epoch: state.epoch,
            account: state.account,
        }
    }

    /// Apply `f` to the local store and projection if `session` is current.
    fn settle(
        &self,
        session: Session,
        f: impl FnOnce(&LocalStore, &mut Projection) -> Outcome,
    ) -> Outcome {
        let mut state = self.lock();
        if state.epoch != session.epoch {
            debug!("Session changed mid-operation, result discarded");
            return Outcome::Discarded;
        }
        f(&self.inner.local, &mut state.projection)
    }

    fn projection_row(&self, key: &LineKey) -> Option<RowId> {
        self.lock()
            .projection
            .cart_line(key)
            .and_then(|line| line.remote_row)
    }

    fn projection_line(&self, key: &LineKey) -> Option<CartLine> {
        self.lock().projection.cart_line(key).cloned()
    }
}

fn validate_id(product_id: &ProductId) -> Result<()> {
    if product_id.as_str().trim().is_empty() {
        return Err(CartError::InvalidInput("product id is empty".to_string()));
    }
    Ok(())
}

fn validate_product(product: &Product) -> Result<()> {
    validate_id(&product.id)?;
    if product.name.trim().is_empty() {
        return Err(CartError::InvalidInput(format!(
            "product {} has no name",
            product.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::db::OfflineRemoteStore;

    fn coordinator() -> Coordinator {
        Coordinator::new(
            LocalStore::in_memory(),
            Arc::new(OfflineRemoteStore),
            Duration::from_secs(5),
        )
    }

    fn product(id: &str) -> Product {
        Product::new(
            ProductId::parse(id).expect("valid id"),
            format!("Product {id}"),
            Price::from_cents(1000),
        )
    }

    #[test]
    fn test_starts_resolving() {
        let coordinator = coordinator();
        assert_eq!(coordinator.phase(), SessionPhase::Resolving);
        assert!(coordinator.loading());
        assert!(coordinator.cart_items().is_empty());
    }

    #[test]
    fn test_timeout_resolves_anonymous() {
        let coordinator = coordinator();
        coordinator.resolve_as_anonymous();
        assert_eq!(coordinator.phase(), SessionPhase::Anonymous);
        assert!(!coordinator.loading());
    }

    #[tokio::test]
    async fn test_anonymous_add_requires_auth() {
        let coordinator = coordinator();
        coordinator.handle_identity(Identity::anonymous()).await;

        let err = coordinator
            .add_to_cart(product("1"), 1, None, None)
            .await
            .expect_err("anonymous add");
        assert_eq!(err, CartError::AuthRequired);

        let err = coordinator
            .add_to_wishlist(product("1"))
            .await
            .expect_err("anonymous wishlist add");
        assert_eq!(err, CartError::AuthRequired);
    }

    #[tokio::test]
    async fn test_zero_quantity_add_is_invalid() {
        let coordinator = coordinator();
        coordinator
            .handle_identity(Identity::signed_in(AccountId::new(Uuid::new_v4())))
            .await;
        let err = coordinator
            .add_to_cart(product("1"), 0, None, None)
            .await
            .expect_err("zero quantity");
        assert!(matches!(err, CartError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_remote_outage_degrades_to_local() {
        let coordinator = coordinator();
        coordinator
            .handle_identity(Identity::signed_in(AccountId::new(Uuid::new_v4())))
            .await;
        assert_eq!(coordinator.phase(), SessionPhase::Authenticated);

        let uuid_product = Product::new(
            ProductId::from(Uuid::new_v4()),
            "Account product",
            Price::from_cents(500),
        );
        let outcome = coordinator
            .add_to_cart(uuid_product, 2, None, None)
            .await
            .expect("degraded add succeeds");
        assert!(outcome.is_degraded());
        assert_eq!(coordinator.cart_item_count(), 2);
        assert_eq!(coordinator.cart_total(), Price::from_cents(1000));
    }

    #[tokio::test]
    async fn test_demo_products_stay_local_when_signed_in() {
        let coordinator = coordinator();
        coordinator
            .handle_identity(Identity::signed_in(AccountId::new(Uuid::new_v4())))
            .await;

        let outcome = coordinator
            .add_to_cart(product("3"), 1, Some("red"), None)
            .await
            .expect("local add");
        assert_eq!(outcome, Outcome::Stored(StorageTarget::Local));
    }

    #[tokio::test]
    async fn test_remove_absent_line_is_unchanged() {
        let coordinator = coordinator();
        coordinator.handle_identity(Identity::anonymous()).await;
        let id = ProductId::parse("5").expect("valid id");
        let outcome = coordinator
            .remove_from_cart(&id, None, None)
            .await
            .expect("remove succeeds");
        assert_eq!(outcome, Outcome::Unchanged);
    }

    #[tokio::test]
    async fn test_move_to_cart_of_absent_product() {
        let coordinator = coordinator();
        coordinator.handle_identity(Identity::anonymous()).await;
        let id = ProductId::parse("5").expect("valid id");
        let outcome = coordinator.move_to_cart(&id).await.expect("no-op");
        assert_eq!(outcome, Outcome::Unchanged);
    }
}
