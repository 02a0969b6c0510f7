//! Readiness signal for the hosting platform
//!
//! A pure projection over the bootstrap state: no state of its own, nothing
//! to poison. `Failed` reads as not-ready forever; recovery only happens
//! through an explicit new bootstrap attempt, never behind the probe's back.

use crate::bootstrap::BootstrapState;
use tokio::sync::watch;

/// Clonable handle answering "may this process receive traffic?".
///
/// Obtained from [`Bootstrapper::health_signal`](crate::bootstrap::Bootstrapper::health_signal);
/// cheap enough to query on every probe request.
#[derive(Debug, Clone)]
pub struct HealthSignal {
    rx: watch::Receiver<BootstrapState>,
}

impl HealthSignal {
    pub(crate) fn new(rx: watch::Receiver<BootstrapState>) -> Self {
        Self { rx }
    }

    /// `true` iff the bootstrap state is `Ready`
    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_ready()
    }

    /// The current bootstrap state, for diagnostics
    pub fn state(&self) -> BootstrapState {
        *self.rx.borrow()
    }

    /// Suspend until the state becomes `Ready`.
    ///
    /// Returns `false` if the bootstrapper was dropped before reaching
    /// `Ready`.
    pub async fn wait_ready(&mut self) -> bool {
        self.rx.wait_for(BootstrapState::is_ready).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_only_in_ready_state() {
        let (tx, rx) = watch::channel(BootstrapState::Uninitialized);
        let signal = HealthSignal::new(rx);

        assert!(!signal.is_ready());
        tx.send_replace(BootstrapState::Connecting);
        assert!(!signal.is_ready());
        tx.send_replace(BootstrapState::Ready);
        assert!(signal.is_ready());
        tx.send_replace(BootstrapState::Connecting);
        assert!(!signal.is_ready());
        tx.send_replace(BootstrapState::Failed);
        assert!(!signal.is_ready());
    }

    #[test]
    fn test_failed_stays_not_ready() {
        let (tx, rx) = watch::channel(BootstrapState::Failed);
        let signal = HealthSignal::new(rx);

        assert!(!signal.is_ready());
        assert_eq!(signal.state(), BootstrapState::Failed);
        drop(tx);
        // Still answerable after the bootstrapper is gone
        assert!(!signal.is_ready());
    }

    #[tokio::test]
    async fn test_wait_ready_wakes_on_transition() {
        let (tx, rx) = watch::channel(BootstrapState::Connecting);
        let mut signal = HealthSignal::new(rx);

        let waiter = tokio::spawn(async move { signal.wait_ready().await });
        tx.send_replace(BootstrapState::Ready);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_ready_false_when_bootstrapper_dropped() {
        let (tx, rx) = watch::channel(BootstrapState::Connecting);
        let mut signal = HealthSignal::new(rx);
        drop(tx);

        assert!(!signal.wait_ready().await);
    }

    #[test]
    fn test_signal_is_clonable() {
        let (tx, rx) = watch::channel(BootstrapState::Ready);
        let a = HealthSignal::new(rx);
        let b = a.clone();

        assert!(a.is_ready());
        assert!(b.is_ready());
        drop(tx);
    }
}
