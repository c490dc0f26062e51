//! The coordination-service capabilities the lock protocol relies on.
//!
//! The service itself (consensus, storage, replication) lives elsewhere; this
//! module only fixes the seam. Any ZooKeeper-style store that offers
//! sequential ephemeral nodes, ordered children and one-shot watches can sit
//! behind [`CoordinationService`].

pub mod memory;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::session::SessionMonitor;

pub use memory::{MemoryClient, MemoryEnsemble};

/// Opaque identifier of the connection that owns ephemeral nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// Notification delivered by a one-shot watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchedEvent {
    /// The watched node was deleted after the watch was set
    Deleted,
    /// The watched node was already gone when the watch was requested
    Absent,
}

/// Receiver for a single [`WatchedEvent`].
///
/// Resolves to `Err` if the service drops the watch, which happens when the
/// session that registered it ends.
pub type WatchReceiver = oneshot::Receiver<WatchedEvent>;

/// Failures reported by the coordination service
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Request outcome unknown; safe to retry
    #[error("connection to coordination service lost")]
    ConnectionLoss,

    /// Path (or its parent) does not exist
    #[error("no node at '{0}'")]
    NoNode(String),

    /// Path already exists
    #[error("node already exists at '{0}'")]
    NodeExists(String),

    /// The session is gone; nothing it owned survives
    #[error("session expired")]
    SessionExpired,
}

/// Result type alias for raw service calls
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// A connection to a hierarchical, ephemeral-node coordination service.
#[async_trait]
pub trait CoordinationService: Send + Sync {
    /// Identity of the session this connection holds.
    fn session_id(&self) -> SessionId;

    /// Monitor this connection reports its state transitions into.
    fn session(&self) -> Arc<SessionMonitor>;

    /// Create every missing component of `path` as a persistent node.
    async fn ensure_path(&self, path: &str) -> ServiceResult<()>;

    /// Create a sequential ephemeral node whose name starts with `prefix`,
    /// returning the full path including the service-assigned suffix.
    async fn create_sequential_ephemeral(&self, prefix: &str, payload: &[u8])
        -> ServiceResult<String>;

    /// Names (not paths) of the children of `parent`, in no particular order.
    async fn get_children(&self, parent: &str) -> ServiceResult<Vec<String>>;

    /// Data stored at `path`, or `None` if the node does not exist.
    async fn get_data(&self, path: &str) -> ServiceResult<Option<Vec<u8>>>;

    /// Delete `path`. Reports `NoNode` if it is already absent.
    async fn delete(&self, path: &str) -> ServiceResult<()>;

    /// Register a one-shot watch for the deletion of `path`.
    async fn watch_once(&self, path: &str) -> ServiceResult<WatchReceiver>;
}

/// Delete `path`, treating an already-absent node as success.
pub async fn delete_idempotent(service: &dyn CoordinationService, path: &str) -> ServiceResult<()> {
    match service.delete(path).await {
        Err(ServiceError::NoNode(_)) => Ok(()),
        other => other,
    }
}
