//! Shared fixtures for lock integration tests

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use zlock_core::{
    LockConfig, LockHandle, LockPath, MemoryClient, MemoryEnsemble, OwnerId, Result, RetryPolicy,
};

/// Short retry schedule so fault-injection tests stay fast
pub fn fast_config() -> LockConfig {
    LockConfig {
        retry: RetryPolicy::Fixed {
            delay_ms: 5,
            max_attempts: 5,
        },
        ..LockConfig::default()
    }
}

/// One participant: its own session plus a handle on `path`
pub struct Participant {
    pub client: MemoryClient,
    pub lock: LockHandle,
    pub owner: OwnerId,
}

/// Open a new session on `ensemble` and a lock handle on `path` for `owner`.
pub fn participant(ensemble: &MemoryEnsemble, path: &str, owner: &str) -> Result<Participant> {
    let client = ensemble.connect();
    let lock = LockHandle::with_config(
        Arc::new(client.clone()),
        LockPath::new(path)?,
        fast_config(),
    )?;
    Ok(Participant {
        client,
        lock,
        owner: OwnerId::new(owner)?,
    })
}

/// Poll until `path` has exactly `count` children, giving up after a second.
pub async fn wait_for_children(ensemble: &MemoryEnsemble, path: &str, count: usize) -> bool {
    for _ in 0..200 {
        if ensemble.children(path).len() == count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
