//! The in-memory view of the cart and wishlist handed to the presentation
//! layer, plus the derived reads computed from it.

use cartsync_core::line::{
    insert_wishlist_line, remove_cart_line, remove_wishlist_line, set_cart_quantity,
    upsert_cart_line,
};
use cartsync_core::{CartLine, LineKey, Price, ProductId, Seller, WishlistLine};

/// Cart lines sold by one seller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellerGroup {
    /// The seller, or `None` for lines without one.
    pub seller: Option<Seller>,
    /// Lines in the order they appear in the cart.
    pub lines: Vec<CartLine>,
    /// Sum of price times quantity over `lines`.
    pub subtotal: Price,
}

/// Current cart and wishlist contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    pub cart: Vec<CartLine>,
    pub wishlist: Vec<WishlistLine>,
}

impl Projection {
    /// Account-store lines first, then local lines the account store does not
    /// already hold.
    #[must_use]
    pub fn combine(
        remote_cart: Vec<CartLine>,
        local_cart: Vec<CartLine>,
        remote_wishlist: Vec<WishlistLine>,
        local_wishlist: Vec<WishlistLine>,
    ) -> Self {
        let mut cart = remote_cart;
        for line in local_cart {
            let key = line.key();
            if !cart.iter().any(|l| l.matches(&key)) {
                cart.push(line);
            }
        }

        let mut wishlist = remote_wishlist;
        for line in local_wishlist {
            insert_wishlist_line(&mut wishlist, line);
        }

        Self { cart, wishlist }
    }

    pub(crate) fn upsert_cart(&mut self, line: CartLine) {
        upsert_cart_line(&mut self.cart, line);
    }

    /// Set the matching line's quantity and row handle, or append `line`.
    pub(crate) fn put_cart(&mut self, line: CartLine) {
        let key = line.key();
        match self.cart.iter_mut().find(|l| l.matches(&key)) {
            Some(existing) => {
                existing.quantity = line.quantity;
                existing.remote_row = line.remote_row.or(existing.remote_row);
            }
            None => self.cart.push(line),
        }
    }

    pub(crate) fn set_cart_quantity(&mut self, key: &LineKey, quantity: u32) -> bool {
        set_cart_quantity(&mut self.cart, key, quantity)
    }

    pub(crate) fn remove_cart(&mut self, key: &LineKey) -> Option<CartLine> {
        remove_cart_line(&mut self.cart, key)
    }

    pub(crate) fn add_wishlist(&mut self, line: WishlistLine) -> bool {
        insert_wishlist_line(&mut self.wishlist, line)
    }

    pub(crate) fn remove_wishlist(&mut self, product_id: &ProductId) -> Option<WishlistLine> {
        remove_wishlist_line(&mut self.wishlist, product_id)
    }

    /// The cart line matching `key`.
    #[must_use]
    pub fn cart_line(&self, key: &LineKey) -> Option<&CartLine> {
        self.cart.iter().find(|l| l.matches(key))
    }

    /// Σ price × quantity.
    #[must_use]
    pub fn cart_total(&self) -> Price {
        self.cart.iter().map(CartLine::line_total).sum()
    }

    /// Σ quantity.
    #[must_use]
    pub fn cart_item_count(&self) -> u64 {
        self.cart.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Cart lines grouped by seller, groups in first-seen order.
    #[must_use]
    pub fn group_by_seller(&self) -> Vec<SellerGroup> {
        let mut groups: Vec<SellerGroup> = Vec::new();
        for line in &self.cart {
            let seller = line.product.seller.clone();
            match groups.iter_mut().find(|g| g.seller == seller) {
                Some(group) => {
                    group.subtotal = group.subtotal + line.line_total();
                    group.lines.push(line.clone());
                }
                None => groups.push(SellerGroup {
                    seller,
                    subtotal: line.line_total(),
                    lines: vec![line.clone()],
                }),
            }
        }
        groups
    }

    /// Whether the product is on the wishlist.
    #[must_use]
    pub fn is_in_wishlist(&self, product_id: &ProductId) -> bool {
        self.wishlist.iter().any(|l| &l.product_id == product_id)
    }
}

#[cfg(test)]
mod tests {
    use cartsync_core::Product;

    use super::*;

    fn line(id: &str, cents: i64, quantity: u32, seller: Option<&str>) -> CartLine {
        let mut product = Product::new(
            ProductId::parse(id).expect("valid id"),
            format!("Product {id}"),
            Price::from_cents(cents),
        );
        if let Some(seller) = seller {
            product = product.with_seller(seller, seller.to_uppercase());
        }
        CartLine::new(product, quantity, None, None)
    }

    #[test]
    fn test_totals() {
        let projection = Projection {
            cart: vec![line("1", 1000, 2, None), line("2", 250, 4, None)],
            wishlist: Vec::new(),
        };
        assert_eq!(projection.cart_total(), Price::from_cents(3000));
        assert_eq!(projection.cart_item_count(), 6);
    }

    #[test]
    fn test_empty_totals() {
        let projection = Projection::default();
        assert_eq!(projection.cart_total(), Price::ZERO);
        assert_eq!(projection.cart_item_count(), 0);
        assert!(projection.group_by_seller().is_empty());
    }

    #[test]
    fn test_group_by_seller_keeps_first_seen_order() {
        let projection = Projection {
            cart: vec![
                line("1", 1000, 1, Some("b")),
                line("2", 500, 2, Some("a")),
                line("3", 100, 1, None),
                line("4", 300, 1, Some("b")),
            ],
            wishlist: Vec::new(),
        };

        let groups = projection.group_by_seller();
        assert_eq!(groups.len(), 3);

        let sellers: Vec<Option<&str>> = groups
            .iter()
            .map(|g| g.seller.as_ref().map(|s| s.id.as_str()))
            .collect();
        assert_eq!(sellers, vec![Some("b"), Some("a"), None]);

        let first = groups.first().expect("first group");
        assert_eq!(first.lines.len(), 2);
        assert_eq!(first.subtotal, Price::from_cents(1300));
    }

    #[test]
    fn test_combine_prefers_remote_lines() {
        let mut remote = line("1", 1000, 5, None);
        remote.remote_row = Some(cartsync_core::RowId::new(uuid::Uuid::new_v4()));
        let local_dup = line("1", 1000, 1, None);
        let local_only = line("2", 1000, 1, None);

        let projection = Projection::combine(
            vec![remote],
            vec![local_dup, local_only],
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(projection.cart.len(), 2);
        assert_eq!(projection.cart.first().map(|l| l.quantity), Some(5));
    }
}
