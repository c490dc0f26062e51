//! Scoped lock ownership.

use crate::{error::Result, handle::LockHandle, reentrancy::OwnerId};

/// One hold on a [`LockHandle`], released when dropped.
///
/// Dropping spawns the release onto the current tokio runtime. Call
/// [`release`](Self::release) to observe the outcome instead.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    handle: LockHandle,
    owner: OwnerId,
    released: bool,
}

impl LockGuard {
    pub(crate) fn new(handle: LockHandle, owner: OwnerId) -> Self {
        Self {
            handle,
            owner,
            released: false,
        }
    }

    pub const fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub const fn handle(&self) -> &LockHandle {
        &self.handle
    }

    /// Whether this guard still holds the lock
    pub fn is_acquired(&self) -> bool {
        !self.released && self.handle.is_held_by(&self.owner)
    }

    /// Whether the session expired while this guard held the lock.
    ///
    /// A lost lock may already be held by someone else.
    pub fn is_lost(&self) -> bool {
        !self.released && self.handle.is_lost_by(&self.owner)
    }

    /// Release this hold now.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionLoss` if the candidate node could not be deleted.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.handle.release(&self.owner).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let handle = self.handle.clone();
        let owner = self.owner.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = handle.release(&owner).await {
                        tracing::warn!(lock = %handle.path(), %owner, error = %err, "release on drop failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    lock = %handle.path(),
                    %owner,
                    "guard dropped outside a runtime; lock held until the session expires"
                );
            }
        }
    }
}
