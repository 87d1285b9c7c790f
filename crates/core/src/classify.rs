//! Identifier classification.
//!
//! The account store keys products by UUID. The bundled demo catalog uses
//! small integer ids (`"1"`, `"2"`, ...) that the account store would reject,
//! so every id is classified before it is routed anywhere.

use std::sync::LazyLock;

use regex::Regex;

/// Canonical 8-4-4-4-12 hyphenated hex form. Braced, URN and simple forms are
/// not accepted even though `uuid::Uuid::parse_str` would take them.
static CANONICAL_UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("Invalid regex")
});

/// Returns `true` if `id` can be written to the account store.
///
/// ```
/// use cartsync_core::is_remote_compatible;
///
/// assert!(is_remote_compatible("6f1c2a9e-3b7d-4c1e-9a2f-0d5e8b7c6a41"));
/// assert!(!is_remote_compatible("7"));
/// ```
#[must_use]
pub fn is_remote_compatible(id: &str) -> bool {
    CANONICAL_UUID_RE.is_match(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_uuids_are_compatible() {
        assert!(is_remote_compatible("6f1c2a9e-3b7d-4c1e-9a2f-0d5e8b7c6a41"));
        assert!(is_remote_compatible("6F1C2A9E-3B7D-4C1E-9A2F-0D5E8B7C6A41"));
        assert!(is_remote_compatible("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_demo_catalog_ids_are_not_compatible() {
        for id in ["1", "8", "42", "", "product-1"] {
            assert!(!is_remote_compatible(id), "{id} should be local-only");
        }
    }

    #[test]
    fn test_non_canonical_uuid_forms_are_rejected() {
        assert!(!is_remote_compatible("6f1c2a9e3b7d4c1e9a2f0d5e8b7c6a41"));
        assert!(!is_remote_compatible("{6f1c2a9e-3b7d-4c1e-9a2f-0d5e8b7c6a41}"));
        assert!(!is_remote_compatible(
            "urn:uuid:6f1c2a9e-3b7d-4c1e-9a2f-0d5e8b7c6a41"
        ));
        assert!(!is_remote_compatible(" 6f1c2a9e-3b7d-4c1e-9a2f-0d5e8b7c6a41"));
        assert!(!is_remote_compatible("6f1c2a9e-3b7d-4c1e-9a2f-0d5e8b7c6a4g"));
    }
}
