//! cartsync Core - Shared types library.
//!
//! This crate provides the types shared by every cartsync component:
//! - `storefront` - The cart/wishlist reconciliation engine
//! - `cli` - Command-line tools for migrations and driving the engine
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, prices, products and line items
//! - [`classify`] - Decides whether a product id can be stored remotely

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod classify;
pub mod types;

pub use classify::is_remote_compatible;
pub use types::*;
