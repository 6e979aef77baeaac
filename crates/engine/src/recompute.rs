use crate::error::{Error, ErrorKind, Result};
use crate::hierarchies::Hierarchies;
use crate::{Engine, Phase, cascade, direct, empty, stats};
use exn::ResultExt;
use futures::{StreamExt, stream};
use std::collections::BTreeMap;
use std::time::Instant;
use time::UtcDateTime;
use tracing::{debug, error, info, instrument, warn};
use veil_store::error::DatabaseResultExt;
use veil_store::{EntityType, Reason, UserId, graph};

/// Summary of one committed full recompute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recomputed {
    pub user_id: UserId,
    /// Rows in the new exclusion set, by the reason they were recorded with.
    pub rows: BTreeMap<Reason, u64>,
}
impl Recomputed {
    pub fn total(&self) -> u64 {
        self.rows.values().sum()
    }
}

/// Outcome of recomputing every user. One user's failure never stops the others.
#[derive(Debug, Default)]
pub struct RecomputeReport {
    pub succeeded: Vec<Recomputed>,
    pub failed: Vec<(UserId, Error)>,
}
impl RecomputeReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Engine {
    /// Rebuild a user's exclusion set and visible counts from scratch.
    ///
    /// Runs [`Phase::ORDER`] in one transaction. On any error the
    /// transaction rolls back and the previous exclusion set stays in place;
    /// the returned error names the failing phase.
    #[instrument(skip(self))]
    pub async fn recompute_for_user(&self, user_id: UserId) -> Result<Recomputed> {
        self.ensure_user(user_id).await?;
        let started = Instant::now();
        match self.recompute_inner(user_id).await {
            Ok(recomputed) => {
                info!(rows = recomputed.total(), elapsed_ms = started.elapsed().as_millis(), "recomputed exclusions");
                Ok(recomputed)
            },
            Err(err) => {
                if let ErrorKind::Computation { phase, .. } = &*err {
                    error!(%phase, error = ?err, "recompute rolled back");
                }
                Err(err)
            },
        }
    }

    async fn recompute_inner(&self, user_id: UserId) -> Result<Recomputed> {
        let fail = |phase: Phase| move || ErrorKind::Computation { user_id, phase };
        let now = UtcDateTime::now().unix_timestamp();
        let mut hierarchies = Hierarchies::default();
        let mut recomputed = Recomputed { user_id, ..Default::default() };

        let mut tx = self.pool.begin().await.or_database().or_raise(fail(Phase::Clear))?;

        let cleared = sqlx::query("DELETE FROM exclusions WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .or_database()
            .or_raise(fail(Phase::Clear))?
            .rows_affected();
        debug!(rows = cleared, "cleared previous exclusions");

        let direct = direct::apply(&mut tx, &mut hierarchies, user_id, now).await.or_raise(fail(Phase::Direct))?;
        debug!(restricted = direct.restricted, hidden = direct.hidden, "applied direct exclusions");
        recomputed.rows.insert(Reason::Restricted, direct.restricted);
        recomputed.rows.insert(Reason::Hidden, direct.hidden);

        let cascaded = cascade::apply_all(&mut tx, &mut hierarchies, user_id, now).await.or_raise(fail(Phase::Cascade))?;
        debug!(rows = ?cascaded, "applied cascade exclusions");
        recomputed.rows.insert(Reason::Cascade, cascaded.values().sum());

        let emptied = empty::apply(&mut tx, &mut hierarchies, user_id, now).await.or_raise(fail(Phase::Empty))?;
        debug!(rows = ?emptied, "applied empty exclusions");
        recomputed.rows.insert(Reason::Empty, emptied.values().sum());

        stats::refresh(&mut tx, user_id, now, EntityType::ALL).await.or_raise(fail(Phase::Stats))?;
        tx.commit().await.or_database().or_raise(fail(Phase::Stats))?;
        Ok(recomputed)
    }

    /// Recompute every known user, a few at a time.
    ///
    /// Only listing the users can fail the call as a whole; per-user
    /// failures are collected in the report.
    #[instrument(skip(self))]
    pub async fn recompute_all_users(&self) -> Result<RecomputeReport> {
        let users = graph::list_user_ids(&self.pool).await.or_raise(|| ErrorKind::Store)?;
        let results: Vec<(UserId, Result<Recomputed>)> = stream::iter(users)
            .map(|user_id| async move { (user_id, self.recompute_for_user(user_id).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = RecomputeReport::default();
        for (user_id, result) in results {
            match result {
                Ok(recomputed) => report.succeeded.push(recomputed),
                Err(err) => report.failed.push((user_id, err)),
            }
        }
        report.succeeded.sort_by_key(|r| r.user_id);
        report.failed.sort_by_key(|(user_id, _)| *user_id);
        if report.is_success() {
            info!(users = report.succeeded.len(), "recomputed all users");
        } else {
            warn!(
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                users = ?report.failed.iter().map(|(u, _)| *u).collect::<Vec<_>>(),
                "recompute failed for some users"
            );
        }
        Ok(report)
    }

    /// Re-derive a user's visible counts without touching the exclusion set.
    #[instrument(skip(self))]
    pub async fn refresh_stats(&self, user_id: UserId) -> Result<()> {
        self.ensure_user(user_id).await?;
        let fail = || ErrorKind::Computation { user_id, phase: Phase::Stats };
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.pool.begin().await.or_database().or_raise(fail)?;
        stats::refresh(&mut tx, user_id, now, EntityType::ALL).await.or_raise(fail)?;
        tx.commit().await.or_database().or_raise(fail)
    }
}
