//! Connection lifecycle tracking for a coordination-service session.
//!
//! The client driving a connection reports transitions into a
//! [`SessionMonitor`]; lock engines subscribe to it and decide whether an
//! in-flight wait stays valid:
//!
//! ```text
//! Connected ──► Suspended ──► Reconnected ──► Suspended ...
//!     │             │               │
//!     └─────────────┴───────────────┴──────► Expired (terminal)
//! ```
//!
//! `Suspended` is not a failure. Ephemeral nodes survive until the server
//! declares the session `Expired`, so waiters keep their candidate node and
//! re-evaluate once `Reconnected` arrives.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

/// Health of the connection to the coordination service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Initial connection established
    Connected,
    /// Network interruption; the session may still be alive server-side
    Suspended,
    /// Same session resumed; every ephemeral node it owned still exists
    Reconnected,
    /// Session torn down server-side; every ephemeral node it owned is gone
    Expired,
}

impl SessionState {
    /// Whether requests can currently reach the service
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Reconnected)
    }

    /// Check whether `next` is a legal successor of this state.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connected | Self::Reconnected, Self::Suspended)
                | (Self::Suspended, Self::Reconnected)
                | (
                    Self::Connected | Self::Suspended | Self::Reconnected,
                    Self::Expired
                )
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "connected",
            Self::Suspended => "suspended",
            Self::Reconnected => "reconnected",
            Self::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// A session state together with the number of transitions seen so far.
///
/// The epoch increases by one per transition, so two snapshots in the same
/// state can still be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub epoch: u64,
}

/// Rejected state change
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid session transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Observable session state with a subscription list.
///
/// One monitor exists per coordination-service connection. It is shared as
/// `Arc<SessionMonitor>` between the client that drives it and every lock
/// engine built on that client.
#[derive(Debug)]
pub struct SessionMonitor {
    tx: watch::Sender<SessionSnapshot>,
}

impl SessionMonitor {
    /// Create a monitor in the `Connected` state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot {
            state: SessionState::Connected,
            epoch: 0,
        });
        Self { tx }
    }

    /// Apply a transition reported by the coordination client.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if `next` is not reachable from the
    /// current state. `Expired` is terminal.
    pub fn transition(&self, next: SessionState) -> Result<SessionSnapshot, InvalidTransition> {
        let mut outcome = None;
        self.tx.send_if_modified(|snapshot| {
            if snapshot.state.can_transition_to(next) {
                snapshot.state = next;
                snapshot.epoch = snapshot.epoch.saturating_add(1);
                outcome = Some(Ok(*snapshot));
                true
            } else {
                outcome = Some(Err(InvalidTransition {
                    from: snapshot.state,
                    to: next,
                }));
                false
            }
        });

        let outcome = outcome.unwrap_or(Err(InvalidTransition {
            from: next,
            to: next,
        }));
        match &outcome {
            Ok(snapshot) => {
                tracing::info!(state = %snapshot.state, epoch = snapshot.epoch, "session state changed");
            }
            Err(err) => tracing::debug!(%err, "ignoring session transition"),
        }
        outcome
    }

    /// Current snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        *self.tx.borrow()
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.snapshot().state
    }

    /// Whether the session has been torn down server-side
    pub fn is_expired(&self) -> bool {
        self.state() == SessionState::Expired
    }

    /// Subscribe to future transitions.
    pub fn subscribe(&self) -> SessionWatch {
        SessionWatch {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for SessionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side of a [`SessionMonitor`] subscription
#[derive(Debug, Clone)]
pub struct SessionWatch {
    rx: watch::Receiver<SessionSnapshot>,
}

impl SessionWatch {
    /// Latest snapshot without waiting
    pub fn current(&self) -> SessionSnapshot {
        *self.rx.borrow()
    }

    /// Wait for the next transition.
    ///
    /// A monitor that has been dropped can never report recovery, so it is
    /// reported as `Expired`.
    pub async fn changed(&mut self) -> SessionSnapshot {
        match self.rx.changed().await {
            Ok(()) => *self.rx.borrow_and_update(),
            Err(_) => SessionSnapshot {
                state: SessionState::Expired,
                epoch: self.current().epoch.saturating_add(1),
            },
        }
    }

    /// Wait until the session is usable again or has expired, returning the
    /// state that ended the wait.
    pub async fn settled(&mut self) -> SessionState {
        loop {
            let state = self.current().state;
            if state.is_connected() || state == SessionState::Expired {
                return state;
            }
            self.changed().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_new_monitor_is_connected() {
        let monitor = SessionMonitor::new();
        assert_eq!(monitor.state(), SessionState::Connected);
        assert_eq!(monitor.snapshot().epoch, 0);
        assert!(!monitor.is_expired());
    }

    #[test]
    fn test_suspend_then_reconnect() {
        let monitor = SessionMonitor::new();
        assert!(monitor.transition(SessionState::Suspended).is_ok());
        let snapshot = monitor.transition(SessionState::Reconnected);
        assert_eq!(
            snapshot,
            Ok(SessionSnapshot {
                state: SessionState::Reconnected,
                epoch: 2
            })
        );
    }

    #[test]
    fn test_expired_is_terminal() {
        let monitor = SessionMonitor::new();
        assert!(monitor.transition(SessionState::Expired).is_ok());
        let result = monitor.transition(SessionState::Reconnected);
        assert_eq!(
            result,
            Err(InvalidTransition {
                from: SessionState::Expired,
                to: SessionState::Reconnected
            })
        );
        assert!(monitor.is_expired());
    }

    #[test]
    fn test_reconnect_without_suspension_is_rejected() {
        let monitor = SessionMonitor::new();
        assert!(monitor.transition(SessionState::Reconnected).is_err());
        assert_eq!(monitor.snapshot().epoch, 0);
    }

    #[tokio::test]
    async fn test_subscriber_sees_transition() {
        let monitor = SessionMonitor::new();
        let mut watch = monitor.subscribe();

        let _ = monitor.transition(SessionState::Suspended);
        let snapshot = tokio::time::timeout(Duration::from_millis(100), watch.changed()).await;
        assert_eq!(snapshot.map(|s| s.state), Ok(SessionState::Suspended));
    }

    #[tokio::test]
    async fn test_settled_waits_for_reconnect() {
        let monitor = std::sync::Arc::new(SessionMonitor::new());
        let _ = monitor.transition(SessionState::Suspended);
        let mut watch = monitor.subscribe();

        let driver = std::sync::Arc::clone(&monitor);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = driver.transition(SessionState::Reconnected);
        });

        let state = tokio::time::timeout(Duration::from_secs(1), watch.settled()).await;
        assert_eq!(state, Ok(SessionState::Reconnected));
    }
}
