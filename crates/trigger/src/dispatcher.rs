use crate::error::{ErrorKind, Result};
use crate::trigger::{Outcome, Trigger};
use crate::worker::{Worker, WorkerSettings};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, instrument, warn};
use veil_engine::Engine;
use veil_engine::error::Result as EngineResult;
use veil_store::DeferredRepository;

/// Routes each [`Trigger`] to the engine operation that handles it.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    engine: Engine,
    wake: Arc<Notify>,
}

impl Dispatcher {
    pub fn new(engine: Engine) -> Self {
        Self { engine, wake: Arc::new(Notify::new()) }
    }

    /// A worker for the deferred recompute queue, woken by this dispatcher
    /// whenever it queues work.
    pub fn worker(&self, queue: DeferredRepository, settings: WorkerSettings) -> Worker {
        Worker::new(self.engine.clone(), queue, Arc::clone(&self.wake), settings)
    }

    #[instrument(skip_all, fields(%trigger))]
    pub async fn dispatch(&self, trigger: Trigger) -> Result<Outcome> {
        let outcome = match trigger {
            Trigger::SyncCompleted => {
                let report = reraise(trigger, self.engine.recompute_all_users().await)?;
                if !report.is_success() {
                    warn!(failed = report.failed.len(), "sync recompute left some users stale");
                }
                Outcome::RecomputedAll(report)
            },
            Trigger::RestrictionChanged { user_id } => {
                Outcome::Recomputed(reraise(trigger, self.engine.recompute_for_user(user_id).await)?)
            },
            Trigger::Hidden { user_id, entity_type, entity_id } => Outcome::Hidden(reraise(
                trigger,
                self.engine.add_hidden_entity(user_id, entity_type, entity_id).await,
            )?),
            Trigger::Unhidden { user_id, entity_type, entity_id } => {
                let queued =
                    reraise(trigger, self.engine.remove_hidden_entity(user_id, entity_type, entity_id).await)?;
                if queued {
                    self.wake.notify_one();
                }
                Outcome::Unhidden { queued }
            },
        };
        info!("dispatched");
        Ok(outcome)
    }
}

fn reraise<T>(trigger: Trigger, result: EngineResult<T>) -> Result<T> {
    result.map_err(|err| {
        let kind = if err.is_invalid_input() {
            ErrorKind::Rejected(trigger.to_string())
        } else {
            ErrorKind::Failed(trigger.to_string())
        };
        err.raise(kind)
    })
}
