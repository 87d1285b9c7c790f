//! Cart commands.

use clap::Subcommand;

use cartsync_core::{CartLine, ProductId};

use super::{CliError, Session, report};

#[derive(Subcommand)]
pub enum CartAction {
    /// Show the cart grouped by seller
    Show,
    /// Add a product
    Add {
        /// Catalog product id
        product_id: String,

        /// Quantity to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        #[arg(long)]
        color: Option<String>,

        #[arg(long)]
        size: Option<String>,
    },
    /// Set a line's quantity (zero or less removes it)
    Update {
        product_id: String,

        #[arg(allow_negative_numbers = true)]
        quantity: i64,

        #[arg(long)]
        color: Option<String>,

        #[arg(long)]
        size: Option<String>,
    },
    /// Remove a line
    Remove {
        product_id: String,

        #[arg(long)]
        color: Option<String>,

        #[arg(long)]
        size: Option<String>,
    },
    /// Remove every line
    Clear,
}

/// Apply `action`, then print the cart.
///
/// # Errors
///
/// Returns `CliError` if the operation is rejected.
pub async fn run(session: &Session, action: CartAction) -> Result<(), CliError> {
    let coordinator = &session.coordinator;
    match action {
        CartAction::Show => {}
        CartAction::Add {
            product_id,
            quantity,
            color,
            size,
        } => {
            let product = session.product(&product_id)?;
            let outcome = coordinator
                .add_to_cart(product, quantity, color.as_deref(), size.as_deref())
                .await?;
            report(&outcome);
        }
        CartAction::Update {
            product_id,
            quantity,
            color,
            size,
        } => {
            let product_id = ProductId::parse(&product_id)?;
            let outcome = coordinator
                .update_quantity(&product_id, color.as_deref(), size.as_deref(), quantity)
                .await?;
            report(&outcome);
        }
        CartAction::Remove {
            product_id,
            color,
            size,
        } => {
            let product_id = ProductId::parse(&product_id)?;
            let outcome = coordinator
                .remove_from_cart(&product_id, color.as_deref(), size.as_deref())
                .await?;
            report(&outcome);
        }
        CartAction::Clear => report(&coordinator.clear_cart().await),
    }

    print_cart(session);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_cart(session: &Session) {
    let coordinator = &session.coordinator;
    let groups = coordinator.group_by_seller();
    if groups.is_empty() {
        println!("Cart is empty.");
        return;
    }

    for group in groups {
        let seller = group
            .seller
            .as_ref()
            .map_or("Other", |seller| seller.name.as_str());
        println!("{seller} ({})", group.subtotal);
        for line in &group.lines {
            println!(
                "  {:>3} x {}{}  {}",
                line.quantity,
                line.product.name,
                variant(line),
                line.line_total()
            );
        }
    }
    println!(
        "{} items, total {}",
        coordinator.cart_item_count(),
        coordinator.cart_total()
    );
}

fn variant(line: &CartLine) -> String {
    match (line.color.as_deref(), line.size.as_deref()) {
        (Some(color), Some(size)) => format!(" [{color}, {size}]"),
        (Some(attr), None) | (None, Some(attr)) => format!(" [{attr}]"),
        (None, None) => String::new(),
    }
}
