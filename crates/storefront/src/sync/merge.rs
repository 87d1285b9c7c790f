//! One-shot transfer of anonymous lines into the account store on sign-in.
//!
//! Every submission is a plain insert. A duplicate key means the line is
//! already there, so a merge interrupted half-way can be rerun without
//! doubling quantities.

use tracing::{debug, info, warn};

use cartsync_core::{AccountId, CartLine, LineKey, ProductId, WishlistLine};

use crate::db::{RemoteError, RemoteStore, WishlistInsert};

/// Local lines split by whether the account store can hold them.
#[derive(Debug, Default)]
pub struct Partition {
    pub remote_cart: Vec<CartLine>,
    pub local_cart: Vec<CartLine>,
    pub remote_wishlist: Vec<WishlistLine>,
    pub local_wishlist: Vec<WishlistLine>,
}

impl Partition {
    /// Split both collections by id shape.
    #[must_use]
    pub fn split(cart: Vec<CartLine>, wishlist: Vec<WishlistLine>) -> Self {
        let (remote_cart, local_cart): (Vec<_>, Vec<_>) = cart
            .into_iter()
            .partition(|line| line.product_id.is_remote_compatible());
        let (remote_wishlist, local_wishlist): (Vec<_>, Vec<_>) = wishlist
            .into_iter()
            .partition(|line| line.product_id.is_remote_compatible());
        Self {
            remote_cart,
            local_cart,
            remote_wishlist,
            local_wishlist,
        }
    }

    /// Whether any line must stay local.
    #[must_use]
    pub fn has_local_only(&self) -> bool {
        !self.local_cart.is_empty() || !self.local_wishlist.is_empty()
    }
}

/// What a merge achieved.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Cart lines now held by the account store.
    pub synced_cart: Vec<LineKey>,
    /// Wishlist products now held by the account store.
    pub synced_wishlist: Vec<ProductId>,
    /// Lines that failed and remain local only.
    pub stranded: usize,
    /// The wishlist relation is missing.
    pub wishlist_unprovisioned: bool,
    /// The session changed mid-merge; nothing should be applied.
    pub interrupted: bool,
}

impl MergeReport {
    /// Whether every submitted line is confirmed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.stranded == 0 && !self.interrupted
    }
}

/// Submit every line to the account store.
///
/// `still_current` is checked before each submission; once it returns
/// `false` the merge stops and reports itself interrupted.
pub async fn merge_into_account(
    remote: &dyn RemoteStore,
    account: AccountId,
    cart: &[CartLine],
    wishlist: &[WishlistLine],
    still_current: impl Fn() -> bool,
) -> MergeReport {
    let mut report = MergeReport::default();

    for line in cart {
        if !still_current() {
            report.interrupted = true;
            return report;
        }
        let key = line.key();
        match remote.insert_cart_row(account, &key, line.quantity).await {
            Ok(_) => report.synced_cart.push(key),
            Err(RemoteError::Conflict(_)) => {
                debug!(product_id = %key.product_id, "Cart line already in account store");
                report.synced_cart.push(key);
            }
            Err(e) => {
                warn!(product_id = %key.product_id, error = %e, "Cart line stranded locally");
                report.stranded += 1;
            }
        }
    }

    for line in wishlist {
        if !still_current() {
            report.interrupted = true;
            return report;
        }
        if report.wishlist_unprovisioned {
            report.stranded += 1;
            continue;
        }
        match remote.insert_wishlist_row(account, &line.product_id).await {
            Ok(WishlistInsert::Inserted | WishlistInsert::AlreadyPresent)
            | Err(RemoteError::Conflict(_)) => {
                report.synced_wishlist.push(line.product_id.clone());
            }
            Err(RemoteError::RelationMissing(message)) => {
                warn!(%message, "Wishlist relation missing during merge");
                report.wishlist_unprovisioned = true;
                report.stranded += 1;
            }
            Err(e) => {
                warn!(product_id = %line.product_id, error = %e, "Wishlist line stranded locally");
                report.stranded += 1;
            }
        }
    }

    info!(
        account = %account,
        cart_synced = report.synced_cart.len(),
        wishlist_synced = report.synced_wishlist.len(),
        stranded = report.stranded,
        "Merged local lines into account store"
    );
    report
}
