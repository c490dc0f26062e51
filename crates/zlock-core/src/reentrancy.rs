//! Per-identity hold counts for one lock instance.
//!
//! Callers identify themselves with an explicit [`OwnerId`] token passed to
//! every acquire and release. Nested acquisitions by the identity that already
//! holds the lock only bump a counter; the candidate node is deleted when the
//! count returns to zero.
//!
//! Fresh acquisitions by one identity run one at a time through an
//! [`AcquireTurn`]; a caller that queued behind another attempt by the same
//! identity re-checks for a hold before creating a node of its own.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    error::{Error, Result},
    node::NodeHandle,
};

const MAX_OWNER_LEN: usize = 256;

/// Caller identity used for reentrancy and release checks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    /// Validate an identity token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the token is empty or too long.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidConfig("owner id cannot be empty".into()));
        }
        if trimmed.len() > MAX_OWNER_LEN {
            return Err(Error::InvalidConfig(format!(
                "owner id cannot exceed {MAX_OWNER_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of [`ReentrancyTracker::release`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Released {
    /// Still held; `remaining` nested holds left
    Partially { remaining: u32 },
    /// Last hold dropped; the caller must delete this node
    Fully(NodeHandle),
}

#[derive(Debug)]
struct Hold {
    node: NodeHandle,
    count: u32,
}

/// Exclusive right to run a fresh acquisition (or final release) for one
/// owner. Dropping it lets the next queued attempt by that owner proceed.
#[derive(Debug)]
pub struct AcquireTurn<'a> {
    tracker: &'a ReentrancyTracker,
    owner: OwnerId,
    permit: Option<OwnedMutexGuard<()>>,
}

impl Drop for AcquireTurn<'_> {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.tracker.prune_gate(&self.owner);
    }
}

/// Hold counts keyed by owner
#[derive(Debug, Default)]
pub struct ReentrancyTracker {
    holds: Mutex<HashMap<OwnerId, Hold>>,
    gates: Mutex<HashMap<OwnerId, Arc<AsyncMutex<()>>>>,
}

impl ReentrancyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn holds(&self) -> MutexGuard<'_, HashMap<OwnerId, Hold>> {
        self.holds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gates(&self) -> MutexGuard<'_, HashMap<OwnerId, Arc<AsyncMutex<()>>>> {
        self.gates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self, owner: &OwnerId) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.gates().entry(owner.clone()).or_default())
    }

    /// Wait until no other fresh acquisition by `owner` is in flight.
    pub async fn turn(&self, owner: &OwnerId) -> AcquireTurn<'_> {
        let permit = self.gate(owner).lock_owned().await;
        AcquireTurn {
            tracker: self,
            owner: owner.clone(),
            permit: Some(permit),
        }
    }

    /// Like [`turn`](Self::turn), but `None` if another attempt by `owner`
    /// is in flight.
    pub fn try_turn(&self, owner: &OwnerId) -> Option<AcquireTurn<'_>> {
        let permit = self.gate(owner).try_lock_owned().ok()?;
        Some(AcquireTurn {
            tracker: self,
            owner: owner.clone(),
            permit: Some(permit),
        })
    }

    fn prune_gate(&self, owner: &OwnerId) {
        let mut gates = self.gates();
        if gates.get(owner).is_some_and(|gate| Arc::strong_count(gate) == 1) {
            gates.remove(owner);
        }
    }

    /// Bump the count if `owner` already holds the lock, returning the new
    /// count.
    pub fn reenter(&self, owner: &OwnerId) -> Option<u32> {
        self.holds().get_mut(owner).map(|hold| {
            hold.count = hold.count.saturating_add(1);
            hold.count
        })
    }

    /// Record a fresh acquisition with a count of one.
    pub fn record(&self, owner: OwnerId, node: NodeHandle) {
        if let Some(stale) = self.holds().insert(owner, Hold { node, count: 1 }) {
            tracing::warn!(node = %stale.node, "replaced a stale hold record");
        }
    }

    /// Drop one hold. `None` means `owner` does not hold the lock.
    pub fn release(&self, owner: &OwnerId) -> Option<Released> {
        let mut holds = self.holds();
        let hold = holds.get_mut(owner)?;
        if hold.count > 1 {
            hold.count -= 1;
            return Some(Released::Partially {
                remaining: hold.count,
            });
        }
        holds
            .remove(owner)
            .map(|hold| Released::Fully(hold.node))
    }

    pub fn is_held_by(&self, owner: &OwnerId) -> bool {
        self.holds().contains_key(owner)
    }

    /// Nested hold count for `owner` (0 when not held)
    pub fn hold_count(&self, owner: &OwnerId) -> u32 {
        self.holds().get(owner).map_or(0, |hold| hold.count)
    }
}
