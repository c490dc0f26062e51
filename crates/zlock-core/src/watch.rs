//! Wakeup delivery for waiting candidates.
//!
//! A waiter watches only its immediate predecessor, so each departure wakes
//! at most one process. Watches are one-shot: once a subscription fires the
//! engine either re-subscribes (still waiting) or drops it (acquired or
//! aborted).

use std::sync::Arc;

use crate::coordination::{CoordinationService, ServiceResult, WatchReceiver, WatchedEvent};

/// Issues predecessor watches on behalf of a lock engine
#[derive(Clone)]
pub struct WatchBroker {
    service: Arc<dyn CoordinationService>,
}

impl WatchBroker {
    pub fn new(service: Arc<dyn CoordinationService>) -> Self {
        Self { service }
    }

    /// Watch `predecessor` for deletion.
    pub async fn subscribe(&self, predecessor: &str) -> ServiceResult<WaitSubscription> {
        let rx = self.service.watch_once(predecessor).await?;
        tracing::debug!(watched = predecessor, "watch registered");
        Ok(WaitSubscription {
            watched_path: predecessor.to_string(),
            rx,
        })
    }
}

/// An outstanding one-shot watch. Dropping it abandons the watch.
#[derive(Debug)]
pub struct WaitSubscription {
    watched_path: String,
    rx: WatchReceiver,
}

impl WaitSubscription {
    pub fn watched_path(&self) -> &str {
        &self.watched_path
    }

    /// Wait for the watch to fire.
    ///
    /// Returns `None` if the service discarded the watch (its session ended).
    /// Must not be polled again after it has completed.
    pub async fn fired(&mut self) -> Option<WatchedEvent> {
        let event = (&mut self.rx).await.ok();
        tracing::debug!(watched = %self.watched_path, ?event, "watch fired");
        event
    }
}
