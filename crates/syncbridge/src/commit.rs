//! The commit queue: reporting local changes to the sync server.
//!
//! A commit is either delivered at once or, in deferred mode, parked in the
//! [`WaitingStore`] and delivered by [`CommitQueue::flush`] once the host
//! has answered its request.
//!
//! ```text
//! commit ─▶ unknown type? ─▶ Ignored
//!        ─▶ locked?       ─▶ Locked
//!        ─▶ CI bypass?    ─▶ Bypassed
//!        ─▶ deferred?     ─▶ WaitingStore::upsert ─▶ Queued
//!        ─▶ Codec::call   ─▶ Delivered | Failed
//! ```

use std::sync::{Arc, Mutex, OnceLock};

use syncbridge_core::{CommitAction, CommitEvent};
use syncbridge_router::{HandlerGroup, ObjectLocks, Registry};
use syncbridge_store::{WaitingEvents, WaitingStore};
use syncbridge_wire::{Codec, Logger};

use crate::clock::Clock;
use crate::config::QueueConfig;
use crate::error::{ConnectorError, Result};

/// Retry time given to every event by [`CommitQueue::restart_all`], relative to now.
const RESTART_OFFSET_MS: i64 = 1_000;

/// What happened to one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The object type is not registered or not currently valid.
    Ignored,
    /// The object is being written by the server; reporting it back would echo.
    Locked,
    /// Running under automated CI; nothing is sent.
    Bypassed,
    /// Parked for delivery at the next flush.
    Queued,
    /// Accepted by the server.
    Delivered,
    Failed(String),
}

impl CommitOutcome {
    /// The value returned to the host by [`CommitQueue::commit`].
    pub fn is_success(&self) -> bool {
        !matches!(self, CommitOutcome::Failed(_))
    }
}

/// Audit entry of one `commit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub object_type: String,
    pub local_ids: Vec<String>,
    pub action: CommitAction,
    pub user: String,
    pub comment: String,
    pub outcome: CommitOutcome,
    /// Time of the call, milliseconds since the Unix epoch.
    pub at: i64,
}

/// Summary of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Due events a delivery was attempted for.
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Events dropped as obsolete.
    pub abandoned: usize,
    /// Events left alone because their retry time is in the future.
    pub not_due: usize,
    /// True if the flush stopped at the failure limit.
    pub halted: bool,
}

/// Commit delivery for one connector session.
pub struct CommitQueue {
    codec: Arc<Codec>,
    registry: Arc<Registry>,
    locks: Arc<ObjectLocks>,
    store: WaitingStore,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
    deferred: OnceLock<bool>,
    log: Mutex<Vec<CommitRecord>>,
    /// Serializes flush and restart within the session.
    flushing: tokio::sync::Mutex<()>,
}

impl CommitQueue {
    pub fn new(
        codec: Arc<Codec>,
        registry: Arc<Registry>,
        locks: Arc<ObjectLocks>,
        store: WaitingStore,
        clock: Arc<dyn Clock>,
        config: QueueConfig,
    ) -> Self {
        Self {
            codec,
            registry,
            locks,
            store,
            clock,
            config,
            deferred: OnceLock::new(),
            log: Mutex::new(Vec::new()),
            flushing: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &WaitingStore {
        &self.store
    }

    fn logger(&self) -> &Logger {
        self.codec.logger()
    }

    /// Whether commits are parked for a later flush.
    ///
    /// Requires the post-commit setting and a host that calls `flush` at the
    /// end of its requests. Decided once per session.
    pub fn is_deferred_mode(&self) -> bool {
        *self.deferred.get_or_init(|| {
            let deferred = self.codec.config().post_commit && self.config.flush_hook;
            tracing::debug!(deferred, "commit mode decided");
            deferred
        })
    }

    /// Report a local change. Returns false only if an immediate delivery failed.
    pub async fn commit<I, S>(
        &self,
        object_type: &str,
        local_ids: I,
        action: CommitAction,
        user: &str,
        comment: &str,
    ) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commit_with_outcome(object_type, local_ids, action, user, comment)
            .await
            .is_success()
    }

    /// Like [`commit`](Self::commit), returning what happened.
    pub async fn commit_with_outcome<I, S>(
        &self,
        object_type: &str,
        local_ids: I,
        action: CommitAction,
        user: &str,
        comment: &str,
    ) -> CommitOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = self.clock.now_millis();
        let event = CommitEvent::new(
            object_type,
            local_ids.into_iter().map(Into::into).collect(),
            action,
            user,
            comment,
            now,
        );

        let outcome = self.route(&event).await;
        self.log.lock().unwrap().push(CommitRecord {
            object_type: event.object_type,
            local_ids: event.local_ids,
            action: event.action,
            user: event.user,
            comment: event.comment,
            outcome: outcome.clone(),
            at: now,
        });
        outcome
    }

    async fn route(&self, event: &CommitEvent) -> CommitOutcome {
        if !self.registry.is_valid_type(&event.object_type) {
            self.logger()
                .debug(format!("Commit of unknown type {} ignored", event.object_type));
            return CommitOutcome::Ignored;
        }
        if event.local_ids.is_empty() {
            self.logger()
                .warning(format!("Commit of {} without object id", event.object_type));
            return CommitOutcome::Failed("no object id".into());
        }
        if self.locks.suppresses(&event.object_type, &event.local_ids, event.action) {
            self.logger().debug(format!(
                "Commit of {} {} skipped, object is locked",
                event.object_type,
                event.local_ids.join(",")
            ));
            return CommitOutcome::Locked;
        }
        if self.codec.config().ci_bypass {
            return CommitOutcome::Bypassed;
        }

        if self.is_deferred_mode() {
            match self.store.upsert(event.clone()).await {
                Ok(replaced) => {
                    tracing::debug!(fingerprint = %event.fingerprint, replaced, "commit queued");
                    return CommitOutcome::Queued;
                }
                Err(e) => {
                    self.logger()
                        .warning(format!("Commit could not be queued, sending now: {}", e));
                }
            }
        }

        match self.deliver(event).await {
            Ok(()) => CommitOutcome::Delivered,
            Err(e) => CommitOutcome::Failed(e.to_string()),
        }
    }

    /// Send one event to the server.
    async fn deliver(&self, event: &CommitEvent) -> Result<()> {
        let response = self
            .codec
            .call(HandlerGroup::Objects.service(), vec![event.to_task()], false, true)
            .await?;
        if response.result && response.tasks.iter().all(|t| t.result) {
            Ok(())
        } else {
            Err(ConnectorError::CommitDelivery(format!(
                "server refused {} {} {}",
                event.action,
                event.object_type,
                event.local_ids.join(",")
            )))
        }
    }

    /// Deliver every due queued event.
    ///
    /// Obsolete events are dropped without a delivery attempt. Delivered
    /// events are removed. Failed ones are rescheduled, or dropped once
    /// obsolete. Each outcome is written against the current queue, so a
    /// commit queued while a delivery is in flight is kept. Stops once
    /// `max_flush_failures` deliveries have failed.
    pub async fn flush(&self) -> Result<FlushReport> {
        let _flushing = self.flushing.lock().await;
        let now = self.clock.now_millis();
        let mut report = FlushReport::default();

        report.abandoned = self.store.prune().await?;
        if report.abandoned > 0 {
            self.logger().error(format!(
                "{} obsolete commit(s) dropped from the waiting queue",
                report.abandoned
            ));
        }

        let events = self.store.load_all().await?;
        for (fingerprint, event) in events {
            if report.failed >= self.config.max_flush_failures {
                report.halted = true;
                self.logger().warning(format!(
                    "Flush stopped after {} failed deliveries",
                    report.failed
                ));
                break;
            }
            if !event.is_due(now) {
                report.not_due += 1;
                continue;
            }

            report.attempted += 1;
            match self.deliver(&event).await {
                Ok(()) => {
                    report.delivered += 1;
                    if !self.store.replace(&event, None).await? {
                        tracing::debug!(%fingerprint, "commit superseded during delivery, kept");
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    let mut next = event.clone();
                    let next_retry = self
                        .config
                        .retry
                        .next_retry_at(now, event.fail_count.saturating_add(1));
                    let obsolete = next.record_failure(next_retry);
                    let fail_count = next.fail_count;
                    let replacement = if obsolete { None } else { Some(next) };

                    if !self.store.replace(&event, replacement).await? {
                        tracing::debug!(%fingerprint, "commit superseded during delivery, kept");
                    } else if obsolete {
                        report.abandoned += 1;
                        self.logger().error(format!(
                            "{} after {} failures, last: {}",
                            ConnectorError::CommitObsolete(fingerprint),
                            fail_count,
                            e
                        ));
                    } else {
                        tracing::debug!(%fingerprint, fail_count, "commit rescheduled");
                    }
                }
            }
        }

        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed,
                abandoned = report.abandoned,
                "waiting queue flushed"
            );
        }
        Ok(report)
    }

    /// Make every queued event due on the next flush. Returns the queue size.
    ///
    /// Obsolete events are pruned, not rescheduled.
    pub async fn restart_all(&self) -> Result<usize> {
        let _flushing = self.flushing.lock().await;
        let restart_at = self.clock.now_millis() - RESTART_OFFSET_MS;
        Ok(self
            .store
            .modify(|events| {
                for event in events.values_mut() {
                    event.retry_at = restart_at;
                }
                events.len()
            })
            .await?)
    }

    /// Queued events, in insertion order.
    pub async fn waiting_events(&self) -> Result<WaitingEvents> {
        Ok(self.store.load_all().await?)
    }

    /// Every commit of this session, in call order.
    pub fn commit_log(&self) -> Vec<CommitRecord> {
        self.log.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_failures_report_false() {
        assert!(CommitOutcome::Ignored.is_success());
        assert!(CommitOutcome::Locked.is_success());
        assert!(CommitOutcome::Bypassed.is_success());
        assert!(CommitOutcome::Queued.is_success());
        assert!(CommitOutcome::Delivered.is_success());
        assert!(!CommitOutcome::Failed("offline".into()).is_success());
    }
}
