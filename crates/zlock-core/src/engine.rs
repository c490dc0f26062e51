//! Acquisition and release protocol.
//!
//! 1. Create a sequential ephemeral candidate under the lock path.
//! 2. Fetch the candidate set. Rank 0 holds the lock.
//! 3. Otherwise watch the immediate predecessor and suspend until exactly one
//!    of: the watch fires, the session changes state, or the deadline passes.
//! 4. Watch fired or session `Reconnected`: go back to 2 with the same node.
//!    Session `Expired`: fail, the node is already gone. Deadline: delete the
//!    node and fail.
//!
//! `ConnectionLoss` on any request is retried per the configured
//! [`RetryPolicy`](crate::config::RetryPolicy), bounded by the caller's
//! deadline. Node creation is protected by a per-attempt token so a create
//! whose reply was lost is adopted rather than duplicated.
//!
//! A waiter that times out, gives up, or is dropped mid-wait deletes its own
//! candidate. If that delete cannot reach the service the node lingers until
//! the session expires, and until then it blocks everyone queued behind it.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::time::Instant;

use crate::{
    config::{LockConfig, RetryPolicy},
    coordination::{delete_idempotent, CoordinationService, ServiceError, ServiceResult},
    error::{Error, Result},
    node::{new_token, CandidateSet, HolderInfo, LockPath, NodeHandle, NodePayload},
    reentrancy::OwnerId,
    session::{SessionMonitor, SessionState, SessionWatch},
    watch::WatchBroker,
};

/// What to do when the lock is held by someone else
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnContention {
    Wait,
    GiveUp,
}

/// The caller's time allowance for one acquisition
#[derive(Debug, Clone, Copy)]
struct Budget {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    /// Whether a retry may park until a suspended session settles
    outlasts_suspension: bool,
}

impl Budget {
    fn since(started: Instant, timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            deadline: timeout.map(|t| started + t),
            outlasts_suspension: true,
        }
    }

    const fn unbounded() -> Self {
        Self {
            timeout: None,
            deadline: None,
            outlasts_suspension: true,
        }
    }

    /// No deadline, but retries never park on a suspended session.
    const fn immediate() -> Self {
        Self {
            timeout: None,
            deadline: None,
            outlasts_suspension: false,
        }
    }

    /// Whether sleeping for `delay` would overrun the deadline
    fn overrun_by(&self, delay: Duration) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() + delay > deadline)
    }

    async fn elapsed(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

/// Arms cleanup of a candidate node that has not yet become a hold.
///
/// If the acquisition future is dropped while armed, deletion is spawned on
/// the current runtime.
struct PendingNode {
    service: Arc<dyn CoordinationService>,
    retry: RetryPolicy,
    attempts: u32,
    path: Option<String>,
}

impl PendingNode {
    fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for PendingNode {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!(node = %path, "acquisition cancelled, deleting candidate");
                runtime.spawn(remove_candidate(
                    Arc::clone(&self.service),
                    self.retry,
                    self.attempts,
                    path,
                ));
            }
            Err(_) => {
                tracing::warn!(
                    node = %path,
                    "acquisition cancelled outside a runtime; candidate remains until session expiry"
                );
            }
        }
    }
}

/// Best-effort delete of an abandoned candidate.
async fn remove_candidate(
    service: Arc<dyn CoordinationService>,
    retry: RetryPolicy,
    attempts: u32,
    path: String,
) {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match delete_idempotent(service.as_ref(), &path).await {
            Ok(()) => {
                tracing::debug!(node = %path, "candidate removed");
                return;
            }
            Err(ServiceError::SessionExpired) => return,
            Err(err) if attempt == attempts => {
                tracing::warn!(
                    node = %path,
                    error = %err,
                    "could not remove candidate; it remains until the session expires"
                );
            }
            Err(err) => {
                tracing::debug!(node = %path, error = %err, attempt, "candidate removal failed");
                tokio::time::sleep(retry.delay_for(attempt).unwrap_or_default()).await;
            }
        }
    }
}

/// The acquisition/release state machine for one lock path
pub struct LockEngine {
    service: Arc<dyn CoordinationService>,
    session: Arc<SessionMonitor>,
    broker: WatchBroker,
    path: LockPath,
    config: LockConfig,
    parents_ready: AtomicBool,
}

impl LockEngine {
    pub fn new(service: Arc<dyn CoordinationService>, path: LockPath, config: LockConfig) -> Self {
        let session = service.session();
        let broker = WatchBroker::new(Arc::clone(&service));
        Self {
            service,
            session,
            broker,
            path,
            config,
            parents_ready: AtomicBool::new(false),
        }
    }

    pub const fn path(&self) -> &LockPath {
        &self.path
    }

    pub const fn config(&self) -> &LockConfig {
        &self.config
    }

    pub const fn session(&self) -> &Arc<SessionMonitor> {
        &self.session
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PUBLIC PROTOCOL
    // ═══════════════════════════════════════════════════════════════════════

    /// Create a candidate and wait until it is first in line.
    ///
    /// `timeout` counts from `started`; `None` waits indefinitely.
    pub async fn acquire(
        &self,
        owner: &OwnerId,
        timeout: Option<Duration>,
        started: Instant,
    ) -> Result<NodeHandle> {
        self.acquire_with(owner, Budget::since(started, timeout), OnContention::Wait)
            .await
    }

    /// Create a candidate and succeed only if it is immediately first in line;
    /// otherwise delete it and fail with `NotAvailable`. A suspended session
    /// fails the attempt with `ConnectionLoss` instead of waiting it out.
    pub async fn try_acquire(&self, owner: &OwnerId) -> Result<NodeHandle> {
        self.acquire_with(owner, Budget::immediate(), OnContention::GiveUp)
            .await
    }

    /// Delete a held candidate. Already-absent nodes count as released.
    pub async fn release(&self, node: &NodeHandle) -> Result<()> {
        let result = self
            .with_retry("delete", Budget::unbounded(), || {
                delete_idempotent(self.service.as_ref(), node.path())
            })
            .await;
        match result {
            Ok(()) => {
                tracing::debug!(lock = %self.path, node = %node, "candidate deleted");
                Ok(())
            }
            Err(Error::SessionExpired { .. }) => {
                tracing::warn!(
                    lock = %self.path,
                    node = %node,
                    "session expired before release; node already removed"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Fresh, ordered snapshot of every candidate. A lock path that does not
    /// exist yet has no candidates.
    pub async fn candidates(&self) -> Result<CandidateSet> {
        match self.fetch_candidates(Budget::unbounded()).await {
            Err(Error::LockPathMissing { .. }) => Ok(CandidateSet::default()),
            other => other,
        }
    }

    /// Current holder and its diagnostic payload, if the lock is held.
    pub async fn holder(&self) -> Result<Option<HolderInfo>> {
        let Some(candidate) = self.candidates().await?.holder().cloned() else {
            return Ok(None);
        };
        let node_path = self.path.child(&candidate.name);
        let data = self
            .with_retry("get_data", Budget::unbounded(), || {
                self.service.get_data(&node_path)
            })
            .await?;
        let payload = data.and_then(|bytes| match NodePayload::decode(&bytes) {
            Ok(payload) => Some(payload),
            Err(err) => {
                tracing::debug!(node = %node_path, error = %err, "unreadable candidate payload");
                None
            }
        });
        Ok(Some(HolderInfo { candidate, payload }))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACQUISITION
    // ═══════════════════════════════════════════════════════════════════════

    async fn acquire_with(
        &self,
        owner: &OwnerId,
        budget: Budget,
        on_contention: OnContention,
    ) -> Result<NodeHandle> {
        let mut session = self.session.subscribe();
        if session.current().state == SessionState::Expired {
            return Err(self.expired());
        }

        self.prepare_parents(budget).await?;
        let node = self.create_candidate(owner, budget).await?;
        let mut pending = PendingNode {
            service: Arc::clone(&self.service),
            retry: self.config.retry,
            attempts: self.config.cleanup_attempts,
            path: Some(node.path().to_string()),
        };

        match self
            .wait_for_turn(&node, budget, on_contention, &mut session)
            .await
        {
            Ok(()) => {
                pending.disarm();
                tracing::debug!(lock = %self.path, node = %node, "candidate is first in line");
                Ok(node)
            }
            Err(err @ Error::SessionExpired { .. }) => {
                pending.disarm();
                tracing::warn!(lock = %self.path, node = %node, "session expired while waiting");
                Err(err)
            }
            Err(err) => {
                remove_candidate(
                    Arc::clone(&self.service),
                    self.config.retry,
                    self.config.cleanup_attempts,
                    node.path().to_string(),
                )
                .await;
                pending.disarm();
                Err(err)
            }
        }
    }

    async fn prepare_parents(&self, budget: Budget) -> Result<()> {
        if !self.config.create_parents || self.parents_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        self.with_retry("ensure_path", budget, || {
            self.service.ensure_path(self.path.as_str())
        })
        .await?;
        self.parents_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Create this attempt's candidate exactly once.
    ///
    /// After a `ConnectionLoss` the create may or may not have been applied,
    /// so the children are searched for this attempt's token before trying
    /// again.
    async fn create_candidate(&self, owner: &OwnerId, budget: Budget) -> Result<NodeHandle> {
        let token = new_token();
        let prefix = self.path.candidate_prefix(&token);
        let payload = NodePayload::for_owner(owner).encode()?;
        let session_id = self.service.session_id();

        let mut failures = 0u32;
        let mut in_doubt = false;
        loop {
            if in_doubt {
                match self.service.get_children(self.path.as_str()).await {
                    Ok(children) => {
                        if let Some(found) = CandidateSet::from_children(children).find_token(&token)
                        {
                            tracing::info!(
                                lock = %self.path,
                                node = %found.name,
                                "adopting candidate created before connection loss"
                            );
                            return NodeHandle::from_path(self.path.child(&found.name), session_id);
                        }
                    }
                    Err(ServiceError::ConnectionLoss) => {
                        failures = failures.saturating_add(1);
                        self.backoff("create", failures, budget).await?;
                        continue;
                    }
                    Err(err) => return Err(self.translate("create", err)),
                }
            }

            match self
                .service
                .create_sequential_ephemeral(&prefix, &payload)
                .await
            {
                Ok(full_path) => {
                    let node = NodeHandle::from_path(full_path, session_id)?;
                    tracing::debug!(lock = %self.path, node = %node, %owner, "candidate created");
                    return Ok(node);
                }
                Err(ServiceError::ConnectionLoss) => {
                    in_doubt = true;
                    failures = failures.saturating_add(1);
                    self.backoff("create", failures, budget).await?;
                }
                Err(err) => return Err(self.translate("create", err)),
            }
        }
    }

    async fn wait_for_turn(
        &self,
        node: &NodeHandle,
        budget: Budget,
        on_contention: OnContention,
        session: &mut SessionWatch,
    ) -> Result<()> {
        loop {
            if session.current().state == SessionState::Expired {
                return Err(self.expired());
            }

            let candidates = self.fetch_candidates(budget).await?;
            let Some(rank) = candidates.rank_of(node.name()) else {
                tracing::warn!(lock = %self.path, node = %node, "candidate vanished from the tree");
                return Err(self.expired());
            };
            if rank == 0 {
                return Ok(());
            }

            let Some(predecessor) = candidates.predecessor_of(node.name()) else {
                continue;
            };
            if on_contention == OnContention::GiveUp {
                let holder = candidates
                    .holder()
                    .map_or_else(|| predecessor.name.clone(), |c| c.name.clone());
                return Err(Error::NotAvailable {
                    path: self.path.to_string(),
                    holder,
                });
            }

            let watched = self.path.child(&predecessor.name);
            let mut subscription = self
                .with_retry("watch", budget, || self.broker.subscribe(&watched))
                .await?;
            tracing::debug!(lock = %self.path, node = %node, rank, watched = %watched, "waiting");

            loop {
                tokio::select! {
                    _ = subscription.fired() => break,
                    snapshot = session.changed() => match snapshot.state {
                        SessionState::Expired => return Err(self.expired()),
                        SessionState::Reconnected => {
                            tracing::debug!(
                                lock = %self.path, node = %node, epoch = snapshot.epoch,
                                "reconnected, re-evaluating"
                            );
                            break;
                        }
                        SessionState::Suspended | SessionState::Connected => {
                            tracing::debug!(
                                lock = %self.path, state = %snapshot.state, epoch = snapshot.epoch,
                                "holding position"
                            );
                        }
                    },
                    () = budget.elapsed() => return Err(self.timed_out(budget)),
                }
            }
        }
    }

    async fn fetch_candidates(&self, budget: Budget) -> Result<CandidateSet> {
        let children = self
            .with_retry("get_children", budget, || {
                self.service.get_children(self.path.as_str())
            })
            .await?;
        Ok(CandidateSet::from_children(children))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // RETRY
    // ═══════════════════════════════════════════════════════════════════════

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        budget: Budget,
        mut request: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let mut failures = 0u32;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(ServiceError::ConnectionLoss) => {
                    failures = failures.saturating_add(1);
                    self.backoff(operation, failures, budget).await?;
                }
                Err(err) => return Err(self.translate(operation, err)),
            }
        }
    }

    /// Pause before retrying `operation`. Returns early on a session change
    /// and fails once the policy or the budget is exhausted.
    async fn backoff(&self, operation: &'static str, failures: u32, budget: Budget) -> Result<()> {
        let exhausted = Error::ConnectionLoss {
            operation,
            attempts: failures,
        };
        let Some(delay) = self.config.retry.delay_for(failures) else {
            return Err(exhausted);
        };
        if budget.overrun_by(delay) {
            return Err(exhausted);
        }

        let mut session = self.session.subscribe();
        match session.current().state {
            SessionState::Expired => return Err(self.expired()),
            SessionState::Suspended if !budget.outlasts_suspension => {
                tracing::debug!(lock = %self.path, operation, "session suspended, giving up");
                return Err(exhausted);
            }
            SessionState::Suspended => {
                tracing::debug!(lock = %self.path, operation, "session suspended, waiting for it to settle");
                return tokio::select! {
                    state = session.settled() => match state {
                        SessionState::Expired => Err(self.expired()),
                        _ => Ok(()),
                    },
                    () = budget.elapsed() => Err(exhausted),
                };
            }
            SessionState::Connected | SessionState::Reconnected => {}
        }
        tracing::debug!(lock = %self.path, operation, failures, ?delay, "connection loss, retrying");
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            snapshot = session.changed() => {
                if snapshot.state == SessionState::Expired {
                    Err(self.expired())
                } else {
                    Ok(())
                }
            }
        }
    }

    fn translate(&self, operation: &'static str, err: ServiceError) -> Error {
        match err {
            ServiceError::ConnectionLoss => Error::ConnectionLoss {
                operation,
                attempts: 1,
            },
            ServiceError::SessionExpired => self.expired(),
            ServiceError::NoNode(_) => Error::LockPathMissing {
                path: self.path.to_string(),
            },
            ServiceError::NodeExists(path) => Error::InvalidPath {
                path,
                reason: format!("{operation} found an existing node"),
            },
        }
    }

    fn expired(&self) -> Error {
        Error::SessionExpired {
            path: self.path.to_string(),
        }
    }

    fn timed_out(&self, budget: Budget) -> Error {
        Error::Timeout {
            path: self.path.to_string(),
            timeout: budget.timeout.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{MemoryClient, MemoryEnsemble};

    fn fast_config() -> LockConfig {
        LockConfig {
            retry: RetryPolicy::Fixed {
                delay_ms: 5,
                max_attempts: 5,
            },
            ..LockConfig::default()
        }
    }

    fn engine_for(client: &MemoryClient, path: &str) -> Result<LockEngine> {
        Ok(LockEngine::new(
            Arc::new(client.clone()),
            LockPath::new(path)?,
            fast_config(),
        ))
    }

    #[tokio::test]
    async fn test_first_candidate_acquires_immediately() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let engine = engine_for(&client, "/locks/a")?;

        let node = engine.acquire(&OwnerId::new("a")?, None, Instant::now()).await?;
        assert_eq!(node.sequence(), 1);
        assert_eq!(ensemble.children("/locks/a"), vec![node.name().to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_try_acquire_cleans_up_when_contended() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let first = ensemble.connect();
        let second = ensemble.connect();
        let holder = engine_for(&first, "/locks/a")?;
        let prober = engine_for(&second, "/locks/a")?;

        let held = holder.acquire(&OwnerId::new("a")?, None, Instant::now()).await?;
        let result = prober.try_acquire(&OwnerId::new("b")?).await;

        assert!(matches!(
            result,
            Err(Error::NotAvailable { ref holder, .. }) if holder == held.name()
        ));
        assert_eq!(ensemble.children("/locks/a"), vec![held.name().to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_lost_create_reply_is_adopted_not_duplicated() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let engine = engine_for(&client, "/locks/a")?;
        engine.prepare_parents(Budget::unbounded()).await?;

        ensemble.drop_next_replies(client.session_id(), 1);
        let node = engine.acquire(&OwnerId::new("a")?, None, Instant::now()).await?;

        assert_eq!(ensemble.children("/locks/a"), vec![node.name().to_string()]);
        assert_eq!(node.sequence(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_create_is_retried() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let engine = engine_for(&client, "/locks/a")?;
        engine.prepare_parents(Budget::unbounded()).await?;

        ensemble.fail_next(client.session_id(), 2);
        let node = engine.acquire(&OwnerId::new("a")?, None, Instant::now()).await?;
        assert_eq!(ensemble.children("/locks/a"), vec![node.name().to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_exhaustion_surfaces_connection_loss() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let engine = engine_for(&client, "/locks/a")?;

        ensemble.fail_next(client.session_id(), 50);
        let result = engine.acquire(&OwnerId::new("a")?, None, Instant::now()).await;
        assert!(matches!(
            result,
            Err(Error::ConnectionLoss { operation: "ensure_path", attempts: 5 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_lock_path_is_fatal() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let engine = LockEngine::new(
            Arc::new(client.clone()),
            LockPath::new("/locks/a")?,
            LockConfig {
                create_parents: false,
                ..fast_config()
            },
        );

        let result = engine.acquire(&OwnerId::new("a")?, None, Instant::now()).await;
        assert!(matches!(result, Err(Error::LockPathMissing { ref path }) if path == "/locks/a"));
        Ok(())
    }

    #[tokio::test]
    async fn test_release_of_vanished_node_succeeds() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let engine = engine_for(&client, "/locks/a")?;

        let node = engine.acquire(&OwnerId::new("a")?, None, Instant::now()).await?;
        ensemble.remove(node.path());
        engine.release(&node).await?;
        engine.release(&node).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_release_after_expiry_succeeds() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let engine = engine_for(&client, "/locks/a")?;

        let node = engine.acquire(&OwnerId::new("a")?, None, Instant::now()).await?;
        client.expire();
        engine.release(&node).await?;
        assert!(ensemble.children("/locks/a").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_acquire_on_expired_session_fails_fast() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let engine = engine_for(&client, "/locks/a")?;
        client.expire();

        let before = client.op_count();
        let result = engine.acquire(&OwnerId::new("a")?, None, Instant::now()).await;
        assert!(matches!(result, Err(Error::SessionExpired { .. })));
        assert_eq!(client.op_count(), before);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_waiter_removes_its_candidate() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let first = ensemble.connect();
        let second = ensemble.connect();
        let holder = engine_for(&first, "/locks/a")?;
        let waiter = engine_for(&second, "/locks/a")?;

        let held = holder.acquire(&OwnerId::new("a")?, None, Instant::now()).await?;
        let owner = OwnerId::new("b")?;
        let attempt = tokio::time::timeout(
            Duration::from_millis(50),
            waiter.acquire(&owner, None, Instant::now()),
        )
        .await;
        assert!(attempt.is_err(), "waiter should still be blocked");

        // cleanup is spawned from Drop
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ensemble.children("/locks/a"), vec![held.name().to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_holder_reports_payload() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let engine = engine_for(&client, "/locks/a")?;
        assert_eq!(engine.holder().await?, None);

        let node = engine.acquire(&OwnerId::new("worker-7")?, None, Instant::now()).await?;
        let holder = engine.holder().await?;
        assert_eq!(
            holder.as_ref().map(|h| h.candidate.name.as_str()),
            Some(node.name())
        );
        assert_eq!(
            holder.and_then(|h| h.payload).map(|p| p.owner),
            Some("worker-7".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_waits_out_a_suspension() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let engine = engine_for(&client, "/locks/a")?;
        engine.prepare_parents(Budget::unbounded()).await?;

        client.suspend();
        let driver = client.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            driver.reconnect();
        });

        // 100ms of suspension outlasts five 5ms retries
        let node = engine.acquire(&OwnerId::new("a")?, None, Instant::now()).await?;
        assert_eq!(ensemble.children("/locks/a"), vec![node.name().to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_try_acquire_does_not_wait_out_a_suspension() -> Result<()> {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let engine = engine_for(&client, "/locks/a")?;
        engine.prepare_parents(Budget::unbounded()).await?;

        client.suspend();
        let result = tokio::time::timeout(
            Duration::from_millis(500),
            engine.try_acquire(&OwnerId::new("a")?),
        )
        .await;
        assert!(matches!(
            result,
            Ok(Err(Error::ConnectionLoss { operation: "create", attempts: 1 }))
        ));
        assert!(ensemble.children("/locks/a").is_empty());

        client.reconnect();
        let node = engine.try_acquire(&OwnerId::new("a")?).await?;
        assert_eq!(node.sequence(), 1);
        Ok(())
    }
}
