//! Cart and wishlist reconciliation engine.
//!
//! Anonymous visitors keep their cart and wishlist in a local key-value
//! store. Signed-in visitors use the account store (`PostgreSQL`), with the
//! local store as a fallback whenever the account store fails. On sign-in
//! the anonymous lines are merged into the account exactly once.
//!
//! The entry point is [`sync::Coordinator`], driven by identity emissions
//! through [`identity::IdentityObserver`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod local;
pub mod sync;

pub use catalog::Catalog;
pub use config::{ConfigError, SyncConfig};
pub use error::{CartError, Result};
pub use identity::{Identity, IdentityObserver};
pub use local::{FileKeyValueStore, KeyValueStore, LocalStore, MemoryKeyValueStore};
pub use sync::{Coordinator, Outcome, SessionPhase, StorageTarget, WishlistCapability};
