//! Identity source adapter.
//!
//! The host application publishes [`Identity`] values on a watch channel
//! whenever its authentication state changes. [`IdentityObserver`] forwards
//! those emissions to a [`Coordinator`], bounding the very first resolution by
//! a timeout so a stalled identity check cannot keep the cart loading forever.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use cartsync_core::AccountId;

use crate::sync::Coordinator;

/// One emission from the identity source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Identity {
    /// The signed-in account, if any.
    pub account_id: Option<AccountId>,
    /// The source has not decided yet.
    pub is_resolving: bool,
}

impl Identity {
    /// Identity check in progress.
    #[must_use]
    pub const fn resolving() -> Self {
        Self {
            account_id: None,
            is_resolving: true,
        }
    }

    /// No one is signed in.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            account_id: None,
            is_resolving: false,
        }
    }

    /// `account` is signed in.
    #[must_use]
    pub const fn signed_in(account: AccountId) -> Self {
        Self {
            account_id: Some(account),
            is_resolving: false,
        }
    }
}

/// Forwards identity emissions to a coordinator.
pub struct IdentityObserver {
    rx: watch::Receiver<Identity>,
    initial_timeout: Duration,
}

impl IdentityObserver {
    /// Observe `rx`, giving the first resolution `initial_timeout` to settle.
    #[must_use]
    pub const fn new(rx: watch::Receiver<Identity>, initial_timeout: Duration) -> Self {
        Self {
            rx,
            initial_timeout,
        }
    }

    /// Create an identity channel seeded with [`Identity::resolving`].
    #[must_use]
    pub fn channel() -> (watch::Sender<Identity>, watch::Receiver<Identity>) {
        watch::channel(Identity::resolving())
    }

    /// Feed every emission to `coordinator` until the sender is dropped.
    ///
    /// If the source is still resolving after the initial timeout, the
    /// coordinator is told to proceed anonymously. A later emission can still
    /// sign the visitor in.
    pub async fn run(mut self, coordinator: Coordinator) {
        let initial = *self.rx.borrow_and_update();
        coordinator.handle_identity(initial).await;

        if initial.is_resolving {
            let settled = tokio::time::timeout(
                self.initial_timeout,
                self.rx.wait_for(|identity| !identity.is_resolving),
            )
            .await
            .map(|resolved| resolved.map(|identity| *identity));
            match settled {
                Ok(Ok(identity)) => coordinator.handle_identity(identity).await,
                Ok(Err(_)) => {
                    debug!("Identity source closed before resolving");
                    coordinator.resolve_as_anonymous();
                    return;
                }
                Err(_) => {
                    warn!(
                        timeout_secs = self.initial_timeout.as_secs(),
                        "Identity check timed out, continuing anonymously"
                    );
                    coordinator.resolve_as_anonymous();
                }
            }
        }

        while self.rx.changed().await.is_ok() {
            let identity = *self.rx.borrow_and_update();
            coordinator.handle_identity(identity).await;
        }
        info!("Identity source closed");
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_constructors() {
        assert!(Identity::resolving().is_resolving);
        assert_eq!(Identity::anonymous().account_id, None);

        let account = AccountId::new(Uuid::new_v4());
        let identity = Identity::signed_in(account);
        assert_eq!(identity.account_id, Some(account));
        assert!(!identity.is_resolving);
    }

    #[test]
    fn test_channel_starts_resolving() {
        let (_tx, rx) = IdentityObserver::channel();
        assert_eq!(*rx.borrow(), Identity::resolving());
    }
}
