//! Core types for cartsync.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod line;
pub mod price;
pub mod product;

pub use id::*;
pub use line::{CartLine, LineKey, WishlistLine};
pub use price::Price;
pub use product::{Product, Seller};
