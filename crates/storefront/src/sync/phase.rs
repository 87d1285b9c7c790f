//! Session phases of the coordinator.

use core::fmt;

/// Which store is authoritative right now.
///
/// ```text
/// Resolving ──(no account)──▶ Anonymous
///     │                           ▲
/// (account)                   (sign-out)
///     ▼                           │
///  Syncing ──────────────▶ Authenticated
/// ```
///
/// Any phase moves to `Resolving` while the identity source is resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionPhase {
    /// No identity. Everything lives in the local store.
    Anonymous,
    /// Waiting on the identity source. Mutations wait for a decision.
    #[default]
    Resolving,
    /// Merging local lines into the account store after sign-in.
    Syncing,
    /// The account store is authoritative.
    Authenticated,
}

impl SessionPhase {
    /// Whether the projection is still being decided.
    #[must_use]
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Resolving | Self::Syncing)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::Resolving => write!(f, "resolving"),
            Self::Syncing => write!(f, "syncing"),
            Self::Authenticated => write!(f, "authenticated"),
        }
    }
}

/// Whether the wishlist may use the account store this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WishlistCapability {
    /// Wishlist rows go to the account store.
    #[default]
    Remote,
    /// The wishlist relation is missing; stay local until sign-out.
    LocalOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_phases() {
        assert!(SessionPhase::Resolving.is_loading());
        assert!(SessionPhase::Syncing.is_loading());
        assert!(!SessionPhase::Anonymous.is_loading());
        assert!(!SessionPhase::Authenticated.is_loading());
    }

    #[test]
    fn test_default_phase_is_resolving() {
        assert_eq!(SessionPhase::default(), SessionPhase::Resolving);
        assert_eq!(SessionPhase::Authenticated.to_string(), "authenticated");
    }
}
