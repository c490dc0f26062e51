//! Public lock facade.
//!
//! A [`LockHandle`] names one lock path on one coordination session. It is
//! cheap to clone; clones share the same hold table, so an [`OwnerId`] that
//! holds the lock through one clone holds it through all of them.

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::{
    config::LockConfig,
    coordination::CoordinationService,
    engine::LockEngine,
    error::{Error, Result},
    guard::LockGuard,
    node::{Candidate, HolderInfo, LockPath},
    reentrancy::{OwnerId, ReentrancyTracker, Released},
    session::SessionState,
};

struct Shared {
    engine: LockEngine,
    tracker: ReentrancyTracker,
}

/// A distributed, reentrant, FIFO-fair mutex
#[derive(Clone)]
pub struct LockHandle {
    inner: Arc<Shared>,
}

impl LockHandle {
    /// Lock `path` on `service` with the default configuration.
    pub fn new(service: Arc<dyn CoordinationService>, path: LockPath) -> Self {
        Self::build(service, path, LockConfig::default())
    }

    /// Lock `path` on `service` with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `config` fails validation.
    pub fn with_config(
        service: Arc<dyn CoordinationService>,
        path: LockPath,
        config: LockConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(service, path, config))
    }

    fn build(service: Arc<dyn CoordinationService>, path: LockPath, config: LockConfig) -> Self {
        Self {
            inner: Arc::new(Shared {
                engine: LockEngine::new(service, path, config),
                tracker: ReentrancyTracker::new(),
            }),
        }
    }

    pub fn path(&self) -> &LockPath {
        self.inner.engine.path()
    }

    pub fn config(&self) -> &LockConfig {
        self.inner.engine.config()
    }

    /// Acquire the lock for `owner`, waiting up to `timeout`.
    ///
    /// `None` falls back to the configured default timeout, and waits forever
    /// if none is configured. An owner that already holds the lock only bumps
    /// its hold count. Concurrent calls by one owner queue behind each other,
    /// so the later ones re-enter instead of creating a second node.
    ///
    /// # Errors
    ///
    /// - `Timeout` if the deadline passes first
    /// - `SessionExpired` if the session dies while waiting or while held
    /// - `ConnectionLoss` if connectivity does not recover in time
    pub async fn acquire(&self, owner: &OwnerId, timeout: Option<Duration>) -> Result<()> {
        if let Some(outcome) = self.reenter(owner) {
            return outcome;
        }
        let timeout = timeout.or_else(|| self.config().default_timeout());
        let started = Instant::now();
        let turn = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.tracker.turn(owner))
                .await
                .map_err(|_| Error::Timeout {
                    path: self.path().to_string(),
                    timeout: limit,
                })?,
            None => self.inner.tracker.turn(owner).await,
        };
        if let Some(outcome) = self.reenter(owner) {
            return outcome;
        }
        let node = self.inner.engine.acquire(owner, timeout, started).await?;
        tracing::info!(lock = %self.path(), %owner, node = %node, "lock acquired");
        self.inner.tracker.record(owner.clone(), node);
        drop(turn);
        Ok(())
    }

    /// Acquire the lock only if it is free right now.
    ///
    /// # Errors
    ///
    /// Returns `NotAvailable` naming the current holder if it is not, or the
    /// owner itself while another acquisition by that owner is in flight.
    /// Returns `ConnectionLoss` at once if the session is suspended.
    pub async fn try_acquire(&self, owner: &OwnerId) -> Result<()> {
        if let Some(outcome) = self.reenter(owner) {
            return outcome;
        }
        let Some(turn) = self.inner.tracker.try_turn(owner) else {
            return Err(Error::NotAvailable {
                path: self.path().to_string(),
                holder: owner.to_string(),
            });
        };
        if let Some(outcome) = self.reenter(owner) {
            return outcome;
        }
        let node = self.inner.engine.try_acquire(owner).await?;
        tracing::info!(lock = %self.path(), %owner, node = %node, "lock acquired without waiting");
        self.inner.tracker.record(owner.clone(), node);
        drop(turn);
        Ok(())
    }

    fn reenter(&self, owner: &OwnerId) -> Option<Result<()>> {
        if !self.inner.tracker.is_held_by(owner) {
            return None;
        }
        if self.inner.engine.session().is_expired() {
            return Some(Err(Error::SessionExpired {
                path: self.path().to_string(),
            }));
        }
        let count = self.inner.tracker.reenter(owner)?;
        tracing::debug!(lock = %self.path(), %owner, count, "reentrant acquisition");
        Some(Ok(()))
    }

    /// Drop one hold. The candidate node is deleted when the last hold goes.
    ///
    /// If that delete fails the hold is kept, so the release can be retried.
    ///
    /// # Errors
    ///
    /// Returns `NotHeld` without contacting the service if `owner` does not
    /// hold the lock.
    pub async fn release(&self, owner: &OwnerId) -> Result<()> {
        if !self.inner.tracker.is_held_by(owner) {
            return Err(self.not_held(owner));
        }
        let turn = self.inner.tracker.turn(owner).await;
        match self.inner.tracker.release(owner) {
            None => Err(self.not_held(owner)),
            Some(Released::Partially { remaining }) => {
                tracing::debug!(lock = %self.path(), %owner, remaining, "nested hold released");
                Ok(())
            }
            Some(Released::Fully(node)) => {
                if let Err(err) = self.inner.engine.release(&node).await {
                    tracing::warn!(
                        lock = %self.path(), %owner, node = %node, error = %err,
                        "release failed; hold kept"
                    );
                    self.inner.tracker.record(owner.clone(), node);
                    return Err(err);
                }
                tracing::info!(lock = %self.path(), %owner, node = %node, "lock released");
                drop(turn);
                Ok(())
            }
        }
    }

    fn not_held(&self, owner: &OwnerId) -> Error {
        Error::NotHeld {
            path: self.path().to_string(),
            owner: owner.to_string(),
        }
    }

    /// Acquire and wrap the hold in a guard that releases it on drop.
    ///
    /// # Errors
    ///
    /// Same as [`acquire`](Self::acquire).
    pub async fn lock(&self, owner: OwnerId, timeout: Option<Duration>) -> Result<LockGuard> {
        self.acquire(&owner, timeout).await?;
        Ok(LockGuard::new(self.clone(), owner))
    }

    /// Whether `owner` holds the lock. Always false once the session has
    /// expired, since the candidate node no longer exists.
    pub fn is_held_by(&self, owner: &OwnerId) -> bool {
        self.inner.tracker.is_held_by(owner) && !self.inner.engine.session().is_expired()
    }

    /// Nested hold count for `owner`
    pub fn hold_count(&self, owner: &OwnerId) -> u32 {
        self.inner.tracker.hold_count(owner)
    }

    /// Whether `owner`'s hold was recorded and its session has since expired.
    pub fn is_lost_by(&self, owner: &OwnerId) -> bool {
        self.inner.tracker.is_held_by(owner) && self.inner.engine.session().is_expired()
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.engine.session().state()
    }

    /// Current holder as recorded in the coordination tree.
    pub async fn holder(&self) -> Result<Option<HolderInfo>> {
        self.inner.engine.holder().await
    }

    /// Every live candidate, holder first.
    pub async fn participants(&self) -> Result<Vec<Candidate>> {
        Ok(self.inner.engine.candidates().await?.into_vec())
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("path", self.path())
            .field("session", &self.session_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RetryPolicy,
        coordination::{MemoryClient, MemoryEnsemble},
    };

    fn handle_for(client: &MemoryClient) -> Result<LockHandle> {
        LockHandle::with_config(
            Arc::new(client.clone()),
            LockPath::new("/locks/job-42")?,
            LockConfig {
                retry: RetryPolicy::Fixed {
                    delay_ms: 5,
                    max_attempts: 3,
                },
                ..LockConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_reentrant_acquire_skips_the_service() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let lock = handle_for(&client)?;
        let owner = OwnerId::new("worker-1")?;

        lock.acquire(&owner, None).await?;
        let ops = client.op_count();
        lock.acquire(&owner, None).await?;
        lock.try_acquire(&owner).await?;

        assert_eq!(client.op_count(), ops);
        assert_eq!(lock.hold_count(&owner), 3);
        assert_eq!(ensemble.children("/locks/job-42").len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_release_by_stranger_is_not_held() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let lock = handle_for(&client)?;
        lock.acquire(&OwnerId::new("a")?, None).await?;

        let ops = client.op_count();
        let result = lock.release(&OwnerId::new("b")?).await;
        assert!(matches!(result, Err(Error::NotHeld { ref owner, .. }) if owner == "b"));
        assert_eq!(client.op_count(), ops);
        Ok(())
    }

    #[tokio::test]
    async fn test_clones_share_holds() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let lock = handle_for(&ensemble.connect())?;
        let other = lock.clone();
        let owner = OwnerId::new("a")?;

        lock.acquire(&owner, None).await?;
        assert!(other.is_held_by(&owner));
        other.release(&owner).await?;
        assert!(!lock.is_held_by(&owner));
        assert!(ensemble.children("/locks/job-42").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_session_voids_the_hold() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let lock = handle_for(&client)?;
        let owner = OwnerId::new("a")?;
        lock.acquire(&owner, None).await?;

        client.expire();
        assert!(!lock.is_held_by(&owner));
        assert!(lock.is_lost_by(&owner));
        assert!(matches!(
            lock.acquire(&owner, None).await,
            Err(Error::SessionExpired { .. })
        ));

        // releasing a lost hold clears the record
        lock.release(&owner).await?;
        assert!(!lock.is_lost_by(&owner));
        Ok(())
    }

    #[tokio::test]
    async fn test_holder_and_participants() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let a = handle_for(&ensemble.connect())?;
        let b = handle_for(&ensemble.connect())?;

        assert!(a.participants().await?.is_empty());
        a.acquire(&OwnerId::new("a")?, None).await?;
        assert!(matches!(
            b.try_acquire(&OwnerId::new("b")?).await,
            Err(Error::NotAvailable { .. })
        ));

        let holder = b.holder().await?;
        assert_eq!(
            holder.and_then(|h| h.payload).map(|p| p.owner),
            Some("a".to_string())
        );
        assert_eq!(b.participants().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_default_timeout_applies_when_none_given() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let holder = handle_for(&ensemble.connect())?;
        let waiter = LockHandle::with_config(
            Arc::new(ensemble.connect()),
            LockPath::new("/locks/job-42")?,
            LockConfig {
                default_timeout_ms: Some(30),
                ..LockConfig::default()
            },
        )?;

        holder.acquire(&OwnerId::new("a")?, None).await?;
        let result = waiter.acquire(&OwnerId::new("b")?, None).await;
        assert!(matches!(
            result,
            Err(Error::Timeout { timeout, .. }) if timeout == Duration::from_millis(30)
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_config_is_rejected() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let result = LockHandle::with_config(
            Arc::new(ensemble.connect()),
            LockPath::new("/locks/a")?,
            LockConfig {
                cleanup_attempts: 0,
                ..LockConfig::default()
            },
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        Ok(())
    }
}
