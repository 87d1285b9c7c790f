//! Errors surfaced to callers, plus Sentry helpers.
//!
//! Only two kinds of failure ever reach the presentation layer: the visitor
//! must sign in first, or the request itself was malformed. Everything else
//! (remote outages, missing relations, duplicate keys, corrupt local data) is
//! recovered inside the engine, logged, and recorded as a Sentry breadcrumb.

use thiserror::Error;

use cartsync_core::ProductIdError;

/// Errors returned by cart and wishlist operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartError {
    /// The operation needs a signed-in account. Callers should send the
    /// visitor to authentication; retrying will not help.
    #[error("authentication required")]
    AuthRequired,

    /// The request was structurally invalid (missing product, empty id, zero
    /// quantity on add).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<ProductIdError> for CartError {
    fn from(err: ProductIdError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

/// Set the Sentry user context from an account ID.
///
/// Called when a sign-in is observed so later reports carry the account.
pub fn set_sentry_user(account_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(account_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Called on sign-out to stop associating events with the account.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for an engine event.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// activity leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Degraded to local store", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_error_display() {
        assert_eq!(CartError::AuthRequired.to_string(), "authentication required");

        let err = CartError::InvalidInput("quantity must be at least 1".to_string());
        assert_eq!(err.to_string(), "invalid input: quantity must be at least 1");
    }

    #[test]
    fn test_product_id_error_maps_to_invalid_input() {
        let err = CartError::from(ProductIdError::Empty);
        assert!(matches!(err, CartError::InvalidInput(_)));
    }

    #[test]
    fn test_breadcrumb_without_client_is_noop() {
        add_breadcrumb("cart", "test breadcrumb", Some(&[("product_id", "1")]));
    }
}
