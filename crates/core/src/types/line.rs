//! Cart and wishlist line items.
//!
//! A cart holds at most one line per [`LineKey`]; a wishlist holds at most one
//! line per product id. The helpers here keep that invariant when lines are
//! added or updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ProductId, RowId};
use super::price::Price;
use super::product::Product;

/// Uniqueness key of a cart line.
///
/// An unset color or size is its own match category: `(p, None, None)` never
/// matches `(p, Some("red"), None)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    pub product_id: ProductId,
    pub color: Option<String>,
    pub size: Option<String>,
}

impl LineKey {
    /// Create a key, normalizing blank variant attributes to unset.
    #[must_use]
    pub fn new(product_id: ProductId, color: Option<&str>, size: Option<&str>) -> Self {
        Self {
            product_id,
            color: normalize_attribute(color),
            size: normalize_attribute(size),
        }
    }

    /// Whether this key addresses a line that may be stored remotely.
    #[must_use]
    pub fn is_remote_compatible(&self) -> bool {
        self.product_id.is_remote_compatible()
    }
}

fn normalize_attribute(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// A line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub added_at: DateTime<Utc>,
    pub product: Product,
    /// Row handle in the account store, when known. Never persisted locally.
    #[serde(skip)]
    pub remote_row: Option<RowId>,
}

impl CartLine {
    /// Create a line for `product` with the given variant attributes.
    #[must_use]
    pub fn new(product: Product, quantity: u32, color: Option<&str>, size: Option<&str>) -> Self {
        let key = LineKey::new(product.id.clone(), color, size);
        Self {
            product_id: key.product_id,
            quantity,
            color: key.color,
            size: key.size,
            added_at: Utc::now(),
            product,
            remote_row: None,
        }
    }

    /// The uniqueness key of this line.
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey {
            product_id: self.product_id.clone(),
            color: self.color.clone(),
            size: self.size.clone(),
        }
    }

    /// Whether this line has the given key.
    #[must_use]
    pub fn matches(&self, key: &LineKey) -> bool {
        self.product_id == key.product_id && self.color == key.color && self.size == key.size
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

/// A line in a wishlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistLine {
    pub product_id: ProductId,
    pub added_at: DateTime<Utc>,
    pub product: Product,
}

impl WishlistLine {
    /// Create a wishlist line for `product`.
    #[must_use]
    pub fn new(product: Product) -> Self {
        Self {
            product_id: product.id.clone(),
            added_at: Utc::now(),
            product,
        }
    }
}

/// Add `quantity` to the line matching `line`'s key, or append `line`.
///
/// Returns the resulting quantity of the matched or appended line.
pub fn upsert_cart_line(lines: &mut Vec<CartLine>, line: CartLine) -> u32 {
    let key = line.key();
    if let Some(existing) = lines.iter_mut().find(|l| l.matches(&key)) {
        existing.quantity = existing.quantity.saturating_add(line.quantity);
        if existing.remote_row.is_none() {
            existing.remote_row = line.remote_row;
        }
        existing.quantity
    } else {
        let quantity = line.quantity;
        lines.push(line);
        quantity
    }
}

/// Set the quantity of the line matching `key`. Returns `false` if absent.
pub fn set_cart_quantity(lines: &mut [CartLine], key: &LineKey, quantity: u32) -> bool {
    lines.iter_mut().find(|l| l.matches(key)).is_some_and(|line| {
        line.quantity = quantity;
        true
    })
}

/// Remove the line matching `key`, returning it if present.
pub fn remove_cart_line(lines: &mut Vec<CartLine>, key: &LineKey) -> Option<CartLine> {
    let index = lines.iter().position(|l| l.matches(key))?;
    Some(lines.remove(index))
}

/// Append `line` unless the product is already present. Returns `true` if
/// the line was added.
pub fn insert_wishlist_line(lines: &mut Vec<WishlistLine>, line: WishlistLine) -> bool {
    if lines.iter().any(|l| l.product_id == line.product_id) {
        false
    } else {
        lines.push(line);
        true
    }
}

/// Remove the wishlist line for `product_id`, returning it if present.
pub fn remove_wishlist_line(
    lines: &mut Vec<WishlistLine>,
    product_id: &ProductId,
) -> Option<WishlistLine> {
    let index = lines.iter().position(|l| &l.product_id == product_id)?;
    Some(lines.remove(index))
}
