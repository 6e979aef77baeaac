//! Drains the durable deferred recompute queue.
//!
//! Work arrives two ways: a wake-up from the [`Dispatcher`](crate::Dispatcher)
//! right after an unhide, and a periodic sweep that picks up anything left
//! behind by a crash, a restart or a failed attempt.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use veil_engine::Engine;
use veil_store::{DeferredRecompute, DeferredRepository};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Failed attempts after which a queued recompute is dropped.
    pub max_attempts: u32,
    pub sweep_interval: Duration,
}
impl Default for WorkerSettings {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, sweep_interval: DEFAULT_SWEEP_INTERVAL }
    }
}

/// Tally of one pass over the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Drained {
    pub completed: usize,
    /// Recomputed, but re-requested meanwhile; still queued.
    pub superseded: usize,
    pub failed: usize,
    /// Dropped after exhausting their attempts, or for a user that no
    /// longer exists.
    pub abandoned: usize,
}
impl Drained {
    fn seen(&self) -> usize {
        self.completed + self.superseded + self.failed + self.abandoned
    }

    /// A full batch with no failures may have more work queued behind it.
    /// Failed tasks wait for the next sweep instead of retrying at once.
    fn drain_again(&self) -> bool {
        self.seen() == BATCH_SIZE && self.failed == 0
    }
}

#[derive(Debug)]
pub struct Worker {
    engine: Engine,
    queue: DeferredRepository,
    wake: Arc<Notify>,
    settings: WorkerSettings,
}

impl Worker {
    pub(crate) fn new(engine: Engine, queue: DeferredRepository, wake: Arc<Notify>, settings: WorkerSettings) -> Self {
        Self { engine, queue, wake, settings }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Drain on every wake-up and sweep tick until cancelled. A recompute
    /// already running when cancellation arrives is allowed to finish.
    pub async fn run(self, cancel: CancellationToken) {
        let mut sweep = interval(self.settings.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            max_attempts = self.settings.max_attempts,
            sweep_interval_secs = self.settings.sweep_interval.as_secs(),
            "deferred worker started"
        );
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.wake.notified() => debug!("woken"),
                _ = sweep.tick() => debug!("sweeping"),
            }
            match self.drain().await {
                Ok(drained) if drained.drain_again() => self.wake.notify_one(),
                Ok(_) => {},
                Err(err) => error!(error = ?err, "could not drain deferred recomputes"),
            }
        }
        info!("deferred worker stopped");
    }

    /// Run every queued recompute once, oldest first.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<Drained> {
        let tasks = self.queue.pending(BATCH_SIZE).await.or_raise(|| ErrorKind::Queue)?;
        let mut drained = Drained::default();
        for task in tasks {
            self.process(&task, &mut drained).await?;
        }
        if drained.seen() > 0 {
            info!(
                completed = drained.completed,
                superseded = drained.superseded,
                failed = drained.failed,
                abandoned = drained.abandoned,
                "drained deferred recomputes"
            );
        }
        Ok(drained)
    }

    async fn process(&self, task: &DeferredRecompute, drained: &mut Drained) -> Result<()> {
        let user_id = task.user_id;
        if task.attempts >= self.settings.max_attempts {
            error!(user_id, attempts = task.attempts, last_error = ?task.last_error, "giving up on deferred recompute");
            self.queue.discard(user_id).await.or_raise(|| ErrorKind::Queue)?;
            drained.abandoned += 1;
            return Ok(());
        }
        match self.engine.recompute_for_user(user_id).await {
            Ok(_) => {
                if self.queue.complete(task).await.or_raise(|| ErrorKind::Queue)? {
                    drained.completed += 1;
                } else {
                    debug!(user_id, "re-requested during recompute, keeping it queued");
                    drained.superseded += 1;
                }
            },
            Err(err) if err.is_invalid_input() => {
                warn!(user_id, error = %err, "dropping deferred recompute for unknown user");
                self.queue.discard(user_id).await.or_raise(|| ErrorKind::Queue)?;
                drained.abandoned += 1;
            },
            Err(err) => {
                warn!(user_id, attempt = task.attempts + 1, error = ?err, "deferred recompute failed");
                self.queue.record_failure(task, err.to_string()).await.or_raise(|| ErrorKind::Queue)?;
                drained.failed += 1;
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dispatcher, Trigger};
    use rstest::rstest;
    use veil_store::fixtures::Library;
    use veil_store::{Database, EntityType, ExclusionRepository};

    async fn setup(settings: WorkerSettings) -> (Database, Dispatcher, Worker) {
        let db = Database::connect_in_memory().await.unwrap();
        let lib = Library::new(&db);
        lib.user(1, "alice").await.user(2, "bob").await;
        lib.performer(1, "Ada").await;
        lib.scenes(1..=3).await;
        lib.scene_performer(1, 1).await.scene_performer(2, 1).await;
        let dispatcher = Dispatcher::new(Engine::from(&db));
        let worker = dispatcher.worker(DeferredRepository::from(&db), settings);
        (db, dispatcher, worker)
    }

    async fn excluded_scenes(db: &Database, user_id: i64) -> Vec<i64> {
        ExclusionRepository::from(db).excluded_ids(user_id, EntityType::Scene).await.unwrap()
    }

    #[rstest]
    #[case::full_batch(Drained { completed: BATCH_SIZE, ..Default::default() }, true)]
    #[case::full_batch_mixed(Drained { completed: BATCH_SIZE - 2, superseded: 1, abandoned: 1, ..Default::default() }, true)]
    #[case::partial_batch(Drained { completed: BATCH_SIZE - 1, ..Default::default() }, false)]
    #[case::one_failure(Drained { completed: BATCH_SIZE - 1, failed: 1, ..Default::default() }, false)]
    #[case::all_failed(Drained { failed: BATCH_SIZE, ..Default::default() }, false)]
    fn test_drain_again_only_after_clean_full_batch(#[case] drained: Drained, #[case] expected: bool) {
        assert_eq!(drained.drain_again(), expected);
    }

    async fn hide_then_unhide_performer(dispatcher: &Dispatcher) {
        let (user_id, entity_type, entity_id) = (1, EntityType::Performer, 1);
        dispatcher.dispatch(Trigger::Hidden { user_id, entity_type, entity_id }).await.unwrap();
        dispatcher.dispatch(Trigger::Unhidden { user_id, entity_type, entity_id }).await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_runs_queued_recomputes() {
        let (db, dispatcher, worker) = setup(WorkerSettings::default()).await;
        hide_then_unhide_performer(&dispatcher).await;
        assert_eq!(excluded_scenes(&db, 1).await, vec![1, 2]);

        let drained = worker.drain().await.unwrap();
        assert_eq!(drained, Drained { completed: 1, ..Default::default() });
        assert!(excluded_scenes(&db, 1).await.is_empty());
        assert!(DeferredRepository::from(&db).pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_retried_then_abandoned() {
        let settings = WorkerSettings { max_attempts: 2, ..Default::default() };
        let (db, _dispatcher, worker) = setup(settings).await;
        sqlx::query(
            "INSERT INTO content_restrictions (user_id, entity_type, mode, entity_ids) VALUES (2, 'scene', 'exclude', 'oops')",
        )
        .execute(db.pool())
        .await
        .unwrap();
        let queue = DeferredRepository::from(&db);
        queue.enqueue(2).await.unwrap();

        for attempt in 1..=2 {
            assert_eq!(worker.drain().await.unwrap().failed, 1);
            let pending = queue.pending(10).await.unwrap();
            assert_eq!(pending[0].attempts, attempt);
            assert!(pending[0].last_error.as_deref().is_some_and(|e| e.contains("direct")));
        }
        assert_eq!(worker.drain().await.unwrap().abandoned, 1);
        assert!(queue.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tasks_for_deleted_users_are_dropped() {
        let (db, _dispatcher, worker) = setup(WorkerSettings::default()).await;
        let queue = DeferredRepository::from(&db);
        queue.enqueue(2).await.unwrap();
        sqlx::query("DELETE FROM users WHERE id = 2").execute(db.pool()).await.unwrap();
        assert_eq!(worker.drain().await.unwrap().abandoned, 1);
        assert!(queue.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_running_worker_drains_on_wake_and_stops_on_cancel() {
        // Sweeps far apart, so only the wake-up can explain the drain.
        let settings = WorkerSettings { sweep_interval: Duration::from_secs(3600), ..Default::default() };
        let (db, dispatcher, worker) = setup(settings).await;
        let cancel = CancellationToken::new();
        let handle = worker.spawn(cancel.clone());

        hide_then_unhide_performer(&dispatcher).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while !DeferredRepository::from(&db).pending(1).await.unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(excluded_scenes(&db, 1).await.is_empty());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_sweep_picks_up_work_without_a_wake_up() {
        let settings = WorkerSettings { sweep_interval: Duration::from_millis(20), ..Default::default() };
        let (db, _dispatcher, worker) = setup(settings).await;
        // Queued behind the dispatcher's back, as after a restart.
        Library::new(&db).hidden(1, EntityType::Scene, 3).await;
        DeferredRepository::from(&db).enqueue(1).await.unwrap();
        let cancel = CancellationToken::new();
        let handle = worker.spawn(cancel.clone());

        tokio::time::timeout(Duration::from_secs(5), async {
            while excluded_scenes(&db, 1).await.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(excluded_scenes(&db, 1).await, vec![3]);
        cancel.cancel();
        handle.await.unwrap();
    }
}
