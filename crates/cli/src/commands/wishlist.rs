//! Wishlist commands.

use clap::Subcommand;

use cartsync_core::ProductId;
use cartsync_storefront::WishlistCapability;

use super::{CliError, Session, report};

#[derive(Subcommand)]
pub enum WishlistAction {
    /// Show the wishlist
    Show,
    /// Add a product
    Add { product_id: String },
    /// Remove a product
    Remove { product_id: String },
    /// Move a product into the cart
    Move { product_id: String },
}

/// Apply `action`, then print the wishlist.
///
/// # Errors
///
/// Returns `CliError` if the operation is rejected.
pub async fn run(session: &Session, action: WishlistAction) -> Result<(), CliError> {
    let coordinator = &session.coordinator;
    match action {
        WishlistAction::Show => {}
        WishlistAction::Add { product_id } => {
            let product = session.product(&product_id)?;
            report(&coordinator.add_to_wishlist(product).await?);
        }
        WishlistAction::Remove { product_id } => {
            let product_id = ProductId::parse(&product_id)?;
            report(&coordinator.remove_from_wishlist(&product_id).await?);
        }
        WishlistAction::Move { product_id } => {
            let product_id = ProductId::parse(&product_id)?;
            report(&coordinator.move_to_cart(&product_id).await?);
        }
    }

    print_wishlist(session);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_wishlist(session: &Session) {
    let coordinator = &session.coordinator;
    if coordinator.wishlist_capability() == WishlistCapability::LocalOnly {
        println!("(wishlist kept on this device)");
    }

    let lines = coordinator.wishlist();
    if lines.is_empty() {
        println!("Wishlist is empty.");
        return;
    }
    for line in lines {
        println!("  {}  {}", line.product.name, line.product.price);
    }
}
