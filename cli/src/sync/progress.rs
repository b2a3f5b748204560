//! Progress reporting for remote operations.
//!
//! Engine callbacks report through a [`ProgressReporter`] bound to one
//! attempt. The [`OperationTable`] decides whether an update is current, so
//! updates from superseded attempts never reach subscribers.
//!
//! A reporter may also carry the repository lease. Engines move their
//! reporter into the worker that talks to the remote, so the repository
//! stays leased until that worker has actually stopped, even when the
//! caller gave up on it earlier.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use super::state::{AttemptId, OperationKey, OperationKind, OperationTable, RepoLease};

const CHANNEL_CAPACITY: usize = 256;

/// One progress event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub repository: std::path::PathBuf,
    pub operation: OperationKind,
    pub attempt: AttemptId,
    pub phase: String,
    /// Percentage, 0-100, non-decreasing within an attempt.
    pub value: u8,
}

/// Fan-out point for progress events.
#[derive(Debug, Clone)]
pub struct ProgressHub {
    sender: broadcast::Sender<ProgressUpdate>,
    table: Arc<OperationTable>,
}

impl ProgressHub {
    #[must_use]
    pub fn new(table: Arc<OperationTable>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender, table }
    }

    /// Reporter bound to `attempt` of `key`.
    #[must_use]
    pub fn reporter(&self, key: OperationKey, attempt: AttemptId) -> ProgressReporter {
        self.build_reporter(key, attempt, None)
    }

    /// Reporter that also keeps `lease` alive for as long as any clone exists.
    #[must_use]
    pub fn leased_reporter(
        &self,
        key: OperationKey,
        attempt: AttemptId,
        lease: Arc<RepoLease>,
    ) -> ProgressReporter {
        self.build_reporter(key, attempt, Some(lease))
    }

    fn build_reporter(
        &self,
        key: OperationKey,
        attempt: AttemptId,
        lease: Option<Arc<RepoLease>>,
    ) -> ProgressReporter {
        ProgressReporter {
            sink: Some(Arc::new(ReporterSink {
                key,
                attempt,
                table: Arc::clone(&self.table),
                sender: self.sender.clone(),
                _lease: lease,
            })),
        }
    }

    /// Subscribes to progress of `kind` operations on `repository`.
    ///
    /// Only updates of the latest attempt are yielded.
    #[must_use]
    pub fn subscribe(&self, repository: &Path, kind: OperationKind) -> ProgressSubscription {
        ProgressSubscription {
            receiver: self.sender.subscribe(),
            key: OperationKey::new(repository, kind),
            table: Arc::clone(&self.table),
        }
    }
}

#[derive(Debug)]
struct ReporterSink {
    key: OperationKey,
    attempt: AttemptId,
    table: Arc<OperationTable>,
    sender: broadcast::Sender<ProgressUpdate>,
    _lease: Option<Arc<RepoLease>>,
}

/// Handle the engine uses to report progress. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sink: Option<Arc<ReporterSink>>,
}

impl ProgressReporter {
    /// A reporter that drops everything.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Attempt this reporter is bound to.
    #[must_use]
    pub fn attempt(&self) -> Option<AttemptId> {
        self.sink.as_ref().map(|sink| sink.attempt)
    }

    /// Publishes an update.
    ///
    /// Returns `false` once the attempt is no longer running; transfer
    /// callbacks pass that on so the engine stops the transfer.
    pub fn report(&self, phase: &str, value: u8) -> bool {
        let Some(sink) = &self.sink else {
            return true;
        };
        let Some(value) = sink
            .table
            .record_progress(&sink.key, sink.attempt, phase, value)
        else {
            return false;
        };
        // No receivers is fine; progress is best effort.
        let _ = sink.sender.send(ProgressUpdate {
            repository: sink.key.repository.clone(),
            operation: sink.key.kind,
            attempt: sink.attempt,
            phase: phase.to_string(),
            value,
        });
        true
    }
}

/// Stream of progress updates for one `(repository, kind)` pair.
#[derive(Debug)]
pub struct ProgressSubscription {
    receiver: broadcast::Receiver<ProgressUpdate>,
    key: OperationKey,
    table: Arc<OperationTable>,
}

impl ProgressSubscription {
    fn accepts(&self, update: &ProgressUpdate) -> bool {
        update.repository == self.key.repository
            && update.operation == self.key.kind
            && self.table.is_latest(&self.key, update.attempt)
    }

    /// Waits for the next current update. Returns `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<ProgressUpdate> {
        loop {
            match self.receiver.recv().await {
                Ok(update) if self.accepts(&update) => return Some(update),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {},
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Drains already-delivered updates without waiting.
    pub fn drain(&mut self) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(update) if self.accepts(&update) => updates.push(update),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {},
                Err(_) => return updates,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::state::{Mutation, RepoLeases};

    fn setup() -> (Arc<OperationTable>, ProgressHub, OperationKey) {
        let table = Arc::new(OperationTable::new());
        let hub = ProgressHub::new(Arc::clone(&table));
        let key = OperationKey::new(Path::new("/repo/a"), OperationKind::Fetch);
        (table, hub, key)
    }

    #[test]
    fn detached_reporter_is_silent() {
        let reporter = ProgressReporter::detached();
        assert!(reporter.report("Receiving objects", 50));
        assert_eq!(reporter.attempt(), None);
    }

    #[test]
    fn report_refuses_finished_attempt() {
        let (table, hub, key) = setup();
        let attempt = table.begin(&key).unwrap();
        let reporter = hub.reporter(key.clone(), attempt);
        assert!(reporter.report("Receiving objects", 20));

        table.complete(&key, attempt, Some("timed out".to_string()));
        assert!(!reporter.report("Receiving objects", 40));
    }

    #[test]
    fn leased_reporter_holds_lease_until_last_clone_drops() {
        let (table, hub, key) = setup();
        let leases = RepoLeases::new();
        let lease = Arc::new(leases.acquire(&key.repository, Mutation::Fetch).unwrap());
        let attempt = table.begin(&key).unwrap();

        let reporter = hub.leased_reporter(key.clone(), attempt, lease);
        let worker_copy = reporter.clone();
        drop(reporter);
        assert_eq!(leases.holder(&key.repository), Some(Mutation::Fetch));

        drop(worker_copy);
        assert_eq!(leases.holder(&key.repository), None);
    }

    #[test]
    fn subscribers_see_monotonic_values() {
        let (table, hub, key) = setup();
        let mut subscription = hub.subscribe(&key.repository, key.kind);
        let attempt = table.begin(&key).unwrap();
        let reporter = hub.reporter(key, attempt);

        reporter.report("Receiving objects", 30);
        reporter.report("Receiving objects", 10);
        reporter.report("Receiving objects", 80);

        let values: Vec<u8> = subscription.drain().iter().map(|u| u.value).collect();
        assert_eq!(values, vec![30, 30, 80]);
    }

    #[test]
    fn late_updates_from_superseded_attempt_are_dropped() {
        let (table, hub, key) = setup();
        let mut subscription = hub.subscribe(&key.repository, key.kind);

        let first = table.begin(&key).unwrap();
        let stale = hub.reporter(key.clone(), first);
        table.complete(&key, first, Some("timed out".to_string()));
        table.reset(&key, first);

        let second = table.begin(&key).unwrap();
        let current = hub.reporter(key, second);

        stale.report("Receiving objects", 95);
        current.report("Receiving objects", 5);

        let updates = subscription.drain();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].attempt, second);
        assert_eq!(updates[0].value, 5);
    }

    #[test]
    fn subscription_filters_other_pairs() {
        let (table, hub, key) = setup();
        let mut subscription = hub.subscribe(&key.repository, OperationKind::Push);
        let attempt = table.begin(&key).unwrap();

        hub.reporter(key, attempt).report("Receiving objects", 50);
        assert!(subscription.drain().is_empty());
    }

    #[tokio::test]
    async fn next_waits_for_update() {
        let (table, hub, key) = setup();
        let mut subscription = hub.subscribe(&key.repository, key.kind);
        let attempt = table.begin(&key).unwrap();
        let reporter = hub.reporter(key, attempt);

        tokio::spawn(async move { reporter.report("Receiving objects", 42) });
        let update = subscription.next().await.unwrap();
        assert_eq!(update.value, 42);
    }
}
