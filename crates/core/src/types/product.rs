//! Product snapshots carried on cart and wishlist lines.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// The seller offering a product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seller {
    /// Seller identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A product as it looked when it was added to a cart or wishlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: Price,
    /// Primary image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Seller, if the product is sold by a marketplace seller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller: Option<Seller>,
}

impl Product {
    /// Create a product snapshot with no image or seller.
    #[must_use]
    pub fn new(id: ProductId, name: impl Into<String>, price: Price) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            image_url: None,
            seller: None,
        }
    }

    /// Set the seller.
    #[must_use]
    pub fn with_seller(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.seller = Some(Seller {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    /// Set the image URL.
    #[must_use]
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}
