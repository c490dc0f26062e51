//! In-process coordination tree.
//!
//! `MemoryEnsemble` behaves like a single-node ZooKeeper ensemble: persistent
//! and sequential ephemeral nodes, per-parent sequence counters, one-shot
//! deletion watches and sessions that can be suspended, resumed or expired on
//! demand. Every [`MemoryClient`] is one session.
//!
//! Fault injection hooks (`suspend`, `reconnect`, `expire`, `fail_next`,
//! `drop_next_replies`) let tests and demos walk the lock protocol through
//! every failure path without a real network.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{
    CoordinationService, ServiceError, ServiceResult, SessionId, WatchReceiver, WatchedEvent,
};
use crate::session::{SessionMonitor, SessionState};

#[derive(Debug)]
struct Znode {
    data: Vec<u8>,
    ephemeral_owner: Option<SessionId>,
}

#[derive(Debug)]
struct Watch {
    session: SessionId,
    tx: oneshot::Sender<WatchedEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Up,
    Down,
    Expired,
}

#[derive(Debug)]
struct SessionEntry {
    monitor: Arc<SessionMonitor>,
    link: Link,
    /// Requests to reject before they are applied
    reject_next: u32,
    /// Requests to apply whose replies are lost
    drop_replies: u32,
    ops: u64,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: BTreeMap<String, Znode>,
    sequences: HashMap<String, u64>,
    watches: HashMap<String, Vec<Watch>>,
    sessions: HashMap<SessionId, SessionEntry>,
    next_session: u64,
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

impl Tree {
    fn exists(&self, path: &str) -> bool {
        path == "/" || self.nodes.contains_key(path)
    }

    fn children(&self, parent: &str) -> Vec<String> {
        let prefix = if parent == "/" {
            "/".to_string()
        } else {
            format!("{parent}/")
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    fn admit(&mut self, id: SessionId) -> ServiceResult<()> {
        let entry = self
            .sessions
            .get_mut(&id)
            .ok_or(ServiceError::SessionExpired)?;
        entry.ops = entry.ops.saturating_add(1);
        match entry.link {
            Link::Expired => Err(ServiceError::SessionExpired),
            Link::Down => Err(ServiceError::ConnectionLoss),
            Link::Up if entry.reject_next > 0 => {
                entry.reject_next -= 1;
                Err(ServiceError::ConnectionLoss)
            }
            Link::Up => Ok(()),
        }
    }

    fn reply(&mut self, id: SessionId) -> ServiceResult<()> {
        match self.sessions.get_mut(&id) {
            Some(entry) if entry.drop_replies > 0 => {
                entry.drop_replies -= 1;
                Err(ServiceError::ConnectionLoss)
            }
            _ => Ok(()),
        }
    }

    fn remove_node(&mut self, path: &str) -> bool {
        if self.nodes.remove(path).is_none() {
            return false;
        }
        if let Some(watches) = self.watches.remove(path) {
            for watch in watches {
                let _ = watch.tx.send(WatchedEvent::Deleted);
            }
        }
        true
    }
}

/// Shared in-memory coordination tree
#[derive(Debug, Clone, Default)]
pub struct MemoryEnsemble {
    tree: Arc<Mutex<Tree>>,
}

impl MemoryEnsemble {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new session.
    pub fn connect(&self) -> MemoryClient {
        let monitor = Arc::new(SessionMonitor::new());
        let id = {
            let mut tree = self.lock();
            tree.next_session = tree.next_session.saturating_add(1);
            let id = SessionId(tree.next_session);
            tree.sessions.insert(
                id,
                SessionEntry {
                    monitor: Arc::clone(&monitor),
                    link: Link::Up,
                    reject_next: 0,
                    drop_replies: 0,
                    ops: 0,
                },
            );
            id
        };
        tracing::debug!(session = %id, "session opened");
        MemoryClient {
            ensemble: self.clone(),
            id,
            monitor,
        }
    }

    /// Sorted child names of `parent` (empty if it does not exist).
    pub fn children(&self, parent: &str) -> Vec<String> {
        self.lock().children(parent)
    }

    /// Whether `path` exists.
    pub fn exists(&self, path: &str) -> bool {
        self.lock().exists(path)
    }

    /// Remove `path` and everything below it, as an operator would.
    pub fn remove(&self, path: &str) {
        let mut tree = self.lock();
        let prefix = format!("{path}/");
        let mut doomed: Vec<String> = tree
            .nodes
            .keys()
            .filter(|key| key.as_str() == path || key.starts_with(&prefix))
            .cloned()
            .collect();
        // deepest first
        doomed.sort_by(|a, b| b.len().cmp(&a.len()));
        for node in doomed {
            tree.remove_node(&node);
        }
    }

    /// Cut the network for a session. Requests fail with `ConnectionLoss`
    /// until [`reconnect`](Self::reconnect) or [`expire`](Self::expire).
    pub fn suspend(&self, id: SessionId) {
        let monitor = {
            let mut tree = self.lock();
            match tree.sessions.get_mut(&id) {
                Some(entry) if entry.link == Link::Up => {
                    entry.link = Link::Down;
                    Arc::clone(&entry.monitor)
                }
                _ => return,
            }
        };
        let _ = monitor.transition(SessionState::Suspended);
    }

    /// Restore the network for a suspended session.
    pub fn reconnect(&self, id: SessionId) {
        let monitor = {
            let mut tree = self.lock();
            match tree.sessions.get_mut(&id) {
                Some(entry) if entry.link == Link::Down => {
                    entry.link = Link::Up;
                    Arc::clone(&entry.monitor)
                }
                _ => return,
            }
        };
        let _ = monitor.transition(SessionState::Reconnected);
    }

    /// Expire a session server-side: its ephemeral nodes are deleted (firing
    /// other sessions' watches) and its own watches are discarded.
    pub fn expire(&self, id: SessionId) {
        let monitor = {
            let mut tree = self.lock();
            let monitor = match tree.sessions.get_mut(&id) {
                Some(entry) if entry.link != Link::Expired => {
                    entry.link = Link::Expired;
                    Arc::clone(&entry.monitor)
                }
                _ => return,
            };
            for watches in tree.watches.values_mut() {
                watches.retain(|watch| watch.session != id);
            }
            let owned: Vec<String> = tree
                .nodes
                .iter()
                .filter(|(_, node)| node.ephemeral_owner == Some(id))
                .map(|(path, _)| path.clone())
                .collect();
            for path in owned {
                tree.remove_node(&path);
            }
            monitor
        };
        tracing::debug!(session = %id, "session expired");
        let _ = monitor.transition(SessionState::Expired);
    }

    /// Reject the next `count` requests of a session with `ConnectionLoss`
    /// without applying them.
    pub fn fail_next(&self, id: SessionId, count: u32) {
        if let Some(entry) = self.lock().sessions.get_mut(&id) {
            entry.reject_next = entry.reject_next.saturating_add(count);
        }
    }

    /// Apply the next `count` mutating requests of a session but report
    /// `ConnectionLoss` to the caller, as if the reply was lost in transit.
    pub fn drop_next_replies(&self, id: SessionId, count: u32) {
        if let Some(entry) = self.lock().sessions.get_mut(&id) {
            entry.drop_replies = entry.drop_replies.saturating_add(count);
        }
    }

    /// Number of requests a session has issued.
    pub fn op_count(&self, id: SessionId) -> u64 {
        self.lock().sessions.get(&id).map_or(0, |entry| entry.ops)
    }
}

/// One session on a [`MemoryEnsemble`]
#[derive(Debug, Clone)]
pub struct MemoryClient {
    ensemble: MemoryEnsemble,
    id: SessionId,
    monitor: Arc<SessionMonitor>,
}

impl MemoryClient {
    /// The ensemble this client is connected to
    pub const fn ensemble(&self) -> &MemoryEnsemble {
        &self.ensemble
    }

    /// Number of requests this session has issued.
    pub fn op_count(&self) -> u64 {
        self.ensemble.op_count(self.id)
    }

    pub fn suspend(&self) {
        self.ensemble.suspend(self.id);
    }

    pub fn reconnect(&self) {
        self.ensemble.reconnect(self.id);
    }

    pub fn expire(&self) {
        self.ensemble.expire(self.id);
    }
}

#[async_trait]
impl CoordinationService for MemoryClient {
    fn session_id(&self) -> SessionId {
        self.id
    }

    fn session(&self) -> Arc<SessionMonitor> {
        Arc::clone(&self.monitor)
    }

    async fn ensure_path(&self, path: &str) -> ServiceResult<()> {
        let mut tree = self.ensemble.lock();
        tree.admit(self.id)?;
        if !path.starts_with('/') {
            return Err(ServiceError::NoNode(path.to_string()));
        }
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            tree.nodes.entry(current.clone()).or_insert(Znode {
                data: Vec::new(),
                ephemeral_owner: None,
            });
        }
        Ok(())
    }

    async fn create_sequential_ephemeral(
        &self,
        prefix: &str,
        payload: &[u8],
    ) -> ServiceResult<String> {
        let mut tree = self.ensemble.lock();
        tree.admit(self.id)?;
        let parent = parent_of(prefix);
        if !tree.exists(&parent) {
            return Err(ServiceError::NoNode(parent));
        }
        let sequence = {
            let counter = tree.sequences.entry(parent).or_insert(0);
            *counter = counter.saturating_add(1);
            *counter
        };
        let path = format!("{prefix}{sequence:010}");
        if tree.nodes.contains_key(&path) {
            return Err(ServiceError::NodeExists(path));
        }
        tree.nodes.insert(
            path.clone(),
            Znode {
                data: payload.to_vec(),
                ephemeral_owner: Some(self.id),
            },
        );
        tree.reply(self.id)?;
        Ok(path)
    }

    async fn get_children(&self, parent: &str) -> ServiceResult<Vec<String>> {
        let mut tree = self.ensemble.lock();
        tree.admit(self.id)?;
        if !tree.exists(parent) {
            return Err(ServiceError::NoNode(parent.to_string()));
        }
        Ok(tree.children(parent))
    }

    async fn get_data(&self, path: &str) -> ServiceResult<Option<Vec<u8>>> {
        let mut tree = self.ensemble.lock();
        tree.admit(self.id)?;
        Ok(tree.nodes.get(path).map(|node| node.data.clone()))
    }

    async fn delete(&self, path: &str) -> ServiceResult<()> {
        let mut tree = self.ensemble.lock();
        tree.admit(self.id)?;
        if !tree.remove_node(path) {
            return Err(ServiceError::NoNode(path.to_string()));
        }
        tree.reply(self.id)
    }

    async fn watch_once(&self, path: &str) -> ServiceResult<WatchReceiver> {
        let mut tree = self.ensemble.lock();
        tree.admit(self.id)?;
        let (tx, rx) = oneshot::channel();
        if tree.exists(path) {
            tree.watches
                .entry(path.to_string())
                .or_default()
                .push(Watch {
                    session: self.id,
                    tx,
                });
        } else {
            let _ = tx.send(WatchedEvent::Absent);
        }
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequence_numbers_are_per_parent_and_padded() -> ServiceResult<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        client.ensure_path("/locks/a").await?;
        client.ensure_path("/locks/b").await?;

        let first = client.create_sequential_ephemeral("/locks/a/lock-", b"").await?;
        let second = client.create_sequential_ephemeral("/locks/a/lock-", b"").await?;
        let other = client.create_sequential_ephemeral("/locks/b/lock-", b"").await?;

        assert_eq!(first, "/locks/a/lock-0000000001");
        assert_eq!(second, "/locks/a/lock-0000000002");
        assert_eq!(other, "/locks/b/lock-0000000001");
        Ok(())
    }

    #[tokio::test]
    async fn test_create_without_parent_fails() {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let result = client
            .create_sequential_ephemeral("/missing/lock-", b"")
            .await;
        assert_eq!(result, Err(ServiceError::NoNode("/missing".into())));
    }

    #[tokio::test]
    async fn test_children_lists_direct_children_only() -> ServiceResult<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        client.ensure_path("/locks/a/nested").await?;
        client.create_sequential_ephemeral("/locks/a/lock-", b"").await?;

        let children = client.get_children("/locks/a").await?;
        assert_eq!(children, vec!["lock-0000000001".to_string(), "nested".into()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_expire_removes_ephemeral_nodes_and_fires_watches() -> ServiceResult<()> {
        let ensemble = MemoryEnsemble::new();
        let owner = ensemble.connect();
        let watcher = ensemble.connect();
        owner.ensure_path("/locks/a").await?;
        let node = owner.create_sequential_ephemeral("/locks/a/lock-", b"").await?;

        let rx = watcher.watch_once(&node).await?;
        owner.expire();

        assert_eq!(rx.await, Ok(WatchedEvent::Deleted));
        assert!(!ensemble.exists(&node));
        assert!(ensemble.exists("/locks/a"));
        assert_eq!(owner.session().state(), SessionState::Expired);
        assert_eq!(
            owner.get_children("/locks/a").await,
            Err(ServiceError::SessionExpired)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_watch_on_absent_node_resolves_immediately() -> ServiceResult<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let rx = client.watch_once("/nothing/here").await?;
        assert_eq!(rx.await, Ok(WatchedEvent::Absent));
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_session_drops_its_watches() -> ServiceResult<()> {
        let ensemble = MemoryEnsemble::new();
        let owner = ensemble.connect();
        let watcher = ensemble.connect();
        owner.ensure_path("/locks/a").await?;
        let node = owner.create_sequential_ephemeral("/locks/a/lock-", b"").await?;

        let rx = watcher.watch_once(&node).await?;
        watcher.expire();

        assert!(rx.await.is_err());
        assert!(ensemble.exists(&node));
        Ok(())
    }

    #[tokio::test]
    async fn test_suspended_session_reports_connection_loss() -> ServiceResult<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        client.ensure_path("/locks/a").await?;

        client.suspend();
        assert_eq!(
            client.get_children("/locks/a").await,
            Err(ServiceError::ConnectionLoss)
        );

        client.reconnect();
        assert_eq!(client.session().state(), SessionState::Reconnected);
        assert!(client.get_children("/locks/a").await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_fail_next_rejects_without_applying() -> ServiceResult<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        client.ensure_path("/locks/a").await?;

        ensemble.fail_next(client.session_id(), 1);
        let result = client.create_sequential_ephemeral("/locks/a/lock-", b"").await;
        assert_eq!(result, Err(ServiceError::ConnectionLoss));
        assert!(ensemble.children("/locks/a").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_reply_still_applies() -> ServiceResult<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        client.ensure_path("/locks/a").await?;

        ensemble.drop_next_replies(client.session_id(), 1);
        let result = client.create_sequential_ephemeral("/locks/a/lock-", b"").await;
        assert_eq!(result, Err(ServiceError::ConnectionLoss));
        assert_eq!(ensemble.children("/locks/a"), vec!["lock-0000000001".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_missing_node_reports_no_node() {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        assert_eq!(
            client.delete("/locks/a/lock-0000000001").await,
            Err(ServiceError::NoNode("/locks/a/lock-0000000001".into()))
        );
        assert_eq!(
            super::super::delete_idempotent(&client, "/locks/a/lock-0000000001").await,
            Ok(())
        );
    }

    #[tokio::test]
    async fn test_op_count_tracks_requests() -> ServiceResult<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        assert_eq!(client.op_count(), 0);
        client.ensure_path("/locks").await?;
        let _ = client.get_children("/locks").await?;
        assert_eq!(client.op_count(), 2);
        Ok(())
    }
}
