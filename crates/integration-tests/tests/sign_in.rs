//! The one-shot merge of anonymous lines into the account store.

use std::sync::Arc;
use std::time::Duration;

use cartsync_core::{CartLine, LineKey, WishlistLine};
use cartsync_integration_tests::{FakeRemoteStore, Harness, account, demo_product, pid};
use cartsync_storefront::{Identity, SessionPhase};

// =============================================================================
// Successful merge
// =============================================================================

#[tokio::test]
async fn test_sign_in_moves_uuid_lines_to_account() {
    let h = Harness::new();
    let product = h.remote.product("Trail Lantern", 4200);
    h.local
        .save_cart(&[CartLine::new(product.clone(), 2, None, None)]);

    let owner = account();
    h.sign_in(owner).await;

    assert_eq!(h.coordinator.phase(), SessionPhase::Authenticated);
    assert_eq!(
        h.remote.cart_rows(owner),
        vec![(LineKey::new(product.id.clone(), None, None), 2)]
    );
    assert!(h.local.load_cart().is_empty());

    let cart = h.coordinator.cart_items();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart.first().map(|l| l.quantity), Some(2));
    assert!(cart.first().and_then(|l| l.remote_row).is_some());
}

#[tokio::test]
async fn test_sign_in_moves_wishlist_lines() {
    let h = Harness::new();
    let product = h.remote.product("Canvas Duffel", 8900);
    h.local.save_wishlist(&[WishlistLine::new(product.clone())]);

    let owner = account();
    h.sign_in(owner).await;

    assert_eq!(h.remote.wishlist_rows(owner), vec![product.id.clone()]);
    assert!(h.local.load_wishlist().is_empty());
    assert!(h.coordinator.is_in_wishlist(&product.id));
}

#[tokio::test]
async fn test_merge_keeps_existing_row_quantity() {
    let h = Harness::new();
    let product = h.remote.product("Trail Lantern", 4200);
    let owner = account();
    h.remote
        .seed_cart_row(owner, LineKey::new(product.id.clone(), None, None), 5);
    h.local
        .save_cart(&[CartLine::new(product.clone(), 2, None, None)]);

    h.sign_in(owner).await;

    // The duplicate key counts as converged; merges never add quantities.
    assert_eq!(
        h.remote.cart_rows(owner),
        vec![(LineKey::new(product.id.clone(), None, None), 5)]
    );
    assert!(h.local.load_cart().is_empty());
}

#[tokio::test]
async fn test_merge_keeps_variants_apart() {
    let h = Harness::new();
    let product = h.remote.product("Rain Shell", 12000);
    let owner = account();
    h.remote
        .seed_cart_row(owner, LineKey::new(product.id.clone(), None, None), 1);
    h.local
        .save_cart(&[CartLine::new(product.clone(), 2, Some("olive"), None)]);

    h.sign_in(owner).await;

    let mut rows = h.remote.cart_rows(owner);
    rows.sort();
    assert_eq!(
        rows,
        vec![
            (LineKey::new(product.id.clone(), None, None), 1),
            (LineKey::new(product.id.clone(), Some("olive"), None), 2),
        ]
    );
    assert_eq!(h.coordinator.cart_items().len(), 2);
}

// =============================================================================
// Aborted merge
// =============================================================================

#[tokio::test]
async fn test_mixed_lines_abort_merge() {
    let h = Harness::new();
    let product = h.remote.product("Trail Lantern", 4200);
    let before = vec![
        CartLine::new(product, 1, None, None),
        CartLine::new(demo_product("2"), 3, None, None),
    ];
    h.local.save_cart(&before);

    h.sign_in(account()).await;

    assert_eq!(h.coordinator.phase(), SessionPhase::Authenticated);
    assert_eq!(h.remote.calls("insert_cart_row"), 0);
    assert_eq!(h.coordinator.cart_items(), before);
    assert_eq!(h.local.load_cart(), before);
}

#[tokio::test]
async fn test_demo_wishlist_line_aborts_merge() {
    let h = Harness::new();
    let product = h.remote.product("Trail Lantern", 4200);
    h.local
        .save_cart(&[CartLine::new(product, 1, None, None)]);
    h.local.save_wishlist(&[WishlistLine::new(demo_product("8"))]);

    h.sign_in(account()).await;

    assert_eq!(h.remote.total_calls(), 0);
    assert_eq!(h.local.load_cart().len(), 1);
    assert_eq!(h.coordinator.wishlist().len(), 1);
}

// =============================================================================
// Partial merge
// =============================================================================

#[tokio::test]
async fn test_stranded_lines_stay_local_and_visible() {
    let h = Harness::new();
    let synced = h.remote.product("Trail Lantern", 4200);
    let stranded = h.remote.product("Camp Stool", 3100);
    h.remote.fail_inserts_for(&stranded.id);
    h.local.save_cart(&[
        CartLine::new(synced.clone(), 1, None, None),
        CartLine::new(stranded.clone(), 2, None, None),
    ]);

    let owner = account();
    h.sign_in(owner).await;

    assert_eq!(
        h.remote.cart_rows(owner),
        vec![(LineKey::new(synced.id.clone(), None, None), 1)]
    );
    let local = h.local.load_cart();
    assert_eq!(local.len(), 1);
    assert_eq!(local.first().map(|l| l.product_id.clone()), Some(stranded.id.clone()));

    // Both lines are shown.
    let ids: Vec<_> = h
        .coordinator
        .cart_items()
        .into_iter()
        .map(|l| l.product_id)
        .collect();
    assert_eq!(ids, vec![synced.id, stranded.id]);
}

#[tokio::test]
async fn test_stranded_lines_retry_on_next_sign_in() {
    let remote = Arc::new(FakeRemoteStore::new());
    let stranded = remote.product("Camp Stool", 3100);
    remote.fail_inserts_for(&stranded.id);

    let owner = account();
    let first = Harness::with_parts(cartsync_storefront::LocalStore::in_memory(), remote.clone());
    first
        .local
        .save_cart(&[CartLine::new(stranded.clone(), 2, None, None)]);
    first.sign_in(owner).await;
    assert!(remote.cart_rows(owner).is_empty());

    // A later process on the same device signs in again.
    remote.clear_failures();
    let second = Harness::with_parts(first.local.clone(), remote.clone());
    second.sign_in(owner).await;

    assert_eq!(
        remote.cart_rows(owner),
        vec![(LineKey::new(stranded.id.clone(), None, None), 2)]
    );
    assert!(second.local.load_cart().is_empty());
}

// =============================================================================
// Identity churn
// =============================================================================

#[tokio::test]
async fn test_duplicate_emissions_sync_once() {
    let h = Harness::new();
    let product = h.remote.product("Trail Lantern", 4200);
    h.local
        .save_cart(&[CartLine::new(product.clone(), 2, None, None)]);

    let owner = account();
    h.sign_in(owner).await;
    h.sign_in(owner).await;
    h.sign_in(owner).await;

    assert_eq!(h.remote.calls("insert_cart_row"), 1);
    assert_eq!(
        h.remote.cart_rows(owner),
        vec![(LineKey::new(product.id.clone(), None, None), 2)]
    );
}

#[tokio::test]
async fn test_resolving_flicker_reloads_without_resync() {
    let h = Harness::new();
    let product = h.remote.product("Trail Lantern", 4200);
    h.local
        .save_cart(&[CartLine::new(product, 2, None, None)]);

    let owner = account();
    h.sign_in(owner).await;
    h.coordinator.handle_identity(Identity::resolving()).await;
    assert_eq!(h.coordinator.phase(), SessionPhase::Resolving);
    h.sign_in(owner).await;

    assert_eq!(h.coordinator.phase(), SessionPhase::Authenticated);
    assert_eq!(h.remote.calls("insert_cart_row"), 1);
    assert_eq!(h.remote.calls("fetch_cart"), 2);
    assert_eq!(h.coordinator.cart_item_count(), 2);
}

#[tokio::test]
async fn test_resolving_during_sync_keeps_mutations_held() {
    let h = Harness::new();
    let product = h.remote.product("Trail Lantern", 4200);
    h.local
        .save_cart(&[CartLine::new(product.clone(), 2, None, None)]);
    h.remote.pause_inserts();

    let owner = account();
    let coordinator = h.coordinator.clone();
    let sync = tokio::spawn(async move {
        coordinator.handle_identity(Identity::signed_in(owner)).await;
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.remote.calls("insert_cart_row") == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("merge reached the account store");

    h.coordinator.handle_identity(Identity::resolving()).await;
    h.remote.release_inserts();
    sync.await.expect("sync task finished");

    // The merge itself completed, but the identity is undecided again.
    assert_eq!(h.coordinator.phase(), SessionPhase::Resolving);
    assert!(h.coordinator.loading());
    assert_eq!(
        h.remote.cart_rows(owner),
        vec![(LineKey::new(product.id.clone(), None, None), 2)]
    );

    let coordinator = h.coordinator.clone();
    let held = product.clone();
    let add = tokio::spawn(async move { coordinator.add_to_cart(held, 1, None, None).await });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!add.is_finished());
    assert_eq!(h.remote.calls("find_cart_row"), 0);

    h.sign_in(owner).await;
    add.await
        .expect("add task finished")
        .expect("add succeeds once signed in");

    assert_eq!(h.remote.calls("insert_cart_row"), 1);
    assert_eq!(
        h.remote.cart_rows(owner),
        vec![(LineKey::new(product.id.clone(), None, None), 3)]
    );
}

#[tokio::test]
async fn test_stale_sync_is_dropped_after_sign_out() {
    let h = Harness::new();
    let product = h.remote.product("Trail Lantern", 4200);
    h.local.save_cart(&[
        CartLine::new(product, 2, None, None),
        CartLine::new(h.remote.product("Camp Stool", 3100), 1, None, None),
    ]);
    h.remote.pause_inserts();

    let owner = account();
    let coordinator = h.coordinator.clone();
    let sync = tokio::spawn(async move {
        coordinator.handle_identity(Identity::signed_in(owner)).await;
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.remote.calls("insert_cart_row") == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("merge reached the account store");
    assert_eq!(h.coordinator.phase(), SessionPhase::Syncing);

    h.sign_out().await;
    h.remote.release_inserts();
    sync.await.expect("sync task finished");

    // The in-flight insert landed, but the merge stopped there and nothing
    // was applied to the anonymous session.
    assert_eq!(h.remote.calls("insert_cart_row"), 1);
    assert_eq!(h.remote.calls("fetch_cart"), 0);
    assert_eq!(h.coordinator.phase(), SessionPhase::Anonymous);
    assert!(h.coordinator.cart_items().is_empty());
    assert!(h.local.load_cart().is_empty());
}

#[tokio::test]
async fn test_sign_out_purges_account_lines() {
    let h = Harness::new();
    let product = h.remote.product("Trail Lantern", 4200);
    h.sign_in(account()).await;

    h.coordinator
        .add_to_cart(demo_product("1"), 1, None, None)
        .await
        .expect("demo add");
    h.remote.set_offline(true);
    let outcome = h
        .coordinator
        .add_to_cart(product, 1, None, None)
        .await
        .expect("degraded add");
    assert!(outcome.is_degraded());
    assert_eq!(h.local.load_cart().len(), 2);

    h.sign_out().await;

    let local = h.local.load_cart();
    assert_eq!(local.len(), 1);
    assert_eq!(local.first().map(|l| l.product_id.clone()), Some(pid("1")));
    assert_eq!(h.coordinator.cart_items(), local);
}

#[tokio::test]
async fn test_switching_accounts_hides_previous_rows() {
    let h = Harness::new();
    let product = h.remote.product("Trail Lantern", 4200);
    let first = account();
    let second = account();

    h.sign_in(first).await;
    h.coordinator
        .add_to_cart(product, 1, None, None)
        .await
        .expect("add succeeds");
    assert_eq!(h.coordinator.cart_item_count(), 1);

    h.sign_in(second).await;
    assert_eq!(h.coordinator.account(), Some(second));
    assert!(h.coordinator.cart_items().is_empty());
    assert!(h.remote.cart_rows(second).is_empty());
}
