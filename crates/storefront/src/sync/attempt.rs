//! Remote attempts that degrade instead of failing.

use core::fmt;
use std::future::Future;

use tracing::warn;

use crate::db::RemoteError;
use crate::error::add_breadcrumb;

/// Why an operation fell back to the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradeReason {
    /// The account store failed or could not be reached.
    RemoteUnavailable(String),
    /// The relation backing the feature is not provisioned.
    CapabilityMissing(String),
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteUnavailable(msg) => write!(f, "remote unavailable: {msg}"),
            Self::CapabilityMissing(msg) => write!(f, "capability missing: {msg}"),
        }
    }
}

impl From<RemoteError> for DegradeReason {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::RelationMissing(msg) => Self::CapabilityMissing(msg),
            other => Self::RemoteUnavailable(other.to_string()),
        }
    }
}

/// Outcome of [`attempt_remote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// The remote operation succeeded.
    Ok(T),
    /// The remote operation failed; the caller should apply the local
    /// equivalent and still report success.
    Degraded(DegradeReason),
}

impl<T> Attempt<T> {
    /// Whether the attempt degraded.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Run a remote operation, converting any failure into a logged
/// [`Attempt::Degraded`].
pub async fn attempt_remote<T, F>(operation: &'static str, fut: F) -> Attempt<T>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match fut.await {
        Ok(value) => Attempt::Ok(value),
        Err(err) => {
            let reason = DegradeReason::from(err);
            warn!(operation, %reason, "Remote operation degraded to local store");
            let detail = reason.to_string();
            add_breadcrumb(
                "sync",
                "Remote operation degraded to local store",
                Some(&[("operation", operation), ("reason", detail.as_str())]),
            );
            Attempt::Degraded(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_passes_through() {
        let attempt = attempt_remote("test", async { Ok::<_, RemoteError>(7) }).await;
        assert_eq!(attempt, Attempt::Ok(7));
    }

    #[tokio::test]
    async fn test_failure_degrades() {
        let attempt: Attempt<()> = attempt_remote("test", async {
            Err(RemoteError::Unavailable("connection refused".to_string()))
        })
        .await;
        assert!(attempt.is_degraded());
        assert!(matches!(
            attempt,
            Attempt::Degraded(DegradeReason::RemoteUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_relation_is_capability() {
        let attempt: Attempt<()> = attempt_remote("test", async {
            Err(RemoteError::RelationMissing("wishlist_items".to_string()))
        })
        .await;
        assert_eq!(
            attempt,
            Attempt::Degraded(DegradeReason::CapabilityMissing(
                "wishlist_items".to_string()
            ))
        );
    }
}
