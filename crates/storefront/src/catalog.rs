//! Bundled demonstration catalog.
//!
//! These products ship with the engine so a storefront can be browsed before
//! the account store has any products. Their ids are small integers, which
//! the account store cannot hold, so lines for them always stay local.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use cartsync_core::{Price, Product, ProductId};

static DEMO_CATALOG: LazyLock<Catalog> = LazyLock::new(|| {
    let entries: [(&str, &str, i64, &str, &str); 8] = [
        ("1", "Canvas Tote Bag", 2400, "harbor-goods", "Harbor Goods"),
        ("2", "Enamel Camp Mug", 1800, "harbor-goods", "Harbor Goods"),
        ("3", "Merino Beanie", 3200, "north-loom", "North Loom"),
        ("4", "Wool Scarf", 4500, "north-loom", "North Loom"),
        ("5", "Linen Apron", 3800, "fieldhouse", "Fieldhouse"),
        ("6", "Cedar Soap Bar", 900, "fieldhouse", "Fieldhouse"),
        ("7", "Field Notebook", 1400, "paper-row", "Paper Row"),
        ("8", "Brass Pen", 5600, "paper-row", "Paper Row"),
    ];

    let products = entries
        .into_iter()
        .filter_map(|(id, name, cents, seller_id, seller_name)| {
            let id = ProductId::parse(id).ok()?;
            Some(
                Product::new(id.clone(), name, Price::from_cents(cents))
                    .with_seller(seller_id, seller_name)
                    .with_image(format!("/static/demo/{id}.jpg")),
            )
        })
        .collect();

    Catalog::new(products)
});

/// Synchronous product lookup by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: Arc<HashMap<ProductId, Product>>,
}

impl Catalog {
    /// Build a catalog from a list of products. Later duplicates win.
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        let products = products.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            products: Arc::new(products),
        }
    }

    /// The bundled demo catalog.
    #[must_use]
    pub fn demo() -> Self {
        DEMO_CATALOG.clone()
    }

    /// This catalog plus `products`, which replace entries with the same id.
    #[must_use]
    pub fn extended(&self, products: Vec<Product>) -> Self {
        let mut merged = (*self.products).clone();
        merged.extend(products.into_iter().map(|p| (p.id.clone(), p)));
        Self {
            products: Arc::new(merged),
        }
    }

    /// Look up a product by id.
    #[must_use]
    pub fn product_by_id(&self, id: &str) -> Option<Product> {
        let id = ProductId::parse(id).ok()?;
        self.products.get(&id).cloned()
    }

    /// All products, ordered by id.
    #[must_use]
    pub fn products(&self) -> Vec<Product> {
        let mut products: Vec<Product> = self.products.values().cloned().collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));
        products
    }

    /// Number of products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
