//! # Zlock Core
//!
//! Fair, reentrant mutual exclusion across processes, coordinated through a
//! ZooKeeper-style tree of sequential ephemeral nodes.
//!
//! ## Guarantees
//!
//! - At most one owner holds a lock path at any instant
//! - Waiters are served in node-creation order; each watches only its
//!   predecessor
//! - A suspended connection keeps its place in line; an expired session
//!   fails every wait and voids every hold
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only
//!
//! ## Usage
//!
//! ```no_run
//! # async fn demo() -> zlock_core::Result<()> {
//! use std::{sync::Arc, time::Duration};
//! use zlock_core::{LockHandle, LockPath, MemoryEnsemble, OwnerId};
//!
//! let ensemble = MemoryEnsemble::new();
//! let lock = LockHandle::new(Arc::new(ensemble.connect()), LockPath::new("/locks/job-42")?);
//! let owner = OwnerId::new("worker-1")?;
//!
//! let guard = lock.lock(owner, Some(Duration::from_secs(5))).await?;
//! // critical section
//! guard.release().await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

pub mod config;
pub mod coordination;
pub mod engine;
mod error;
pub mod guard;
pub mod handle;
pub mod node;
pub mod reentrancy;
pub mod session;
pub mod watch;

pub use config::{LockConfig, RetryPolicy};
pub use coordination::{
    CoordinationService, MemoryClient, MemoryEnsemble, ServiceError, SessionId,
};
pub use error::{Error, Result};
pub use guard::LockGuard;
pub use handle::LockHandle;
pub use node::{Candidate, HolderInfo, LockPath, NodeHandle, NodePayload};
pub use reentrancy::OwnerId;
pub use session::{SessionMonitor, SessionState};
