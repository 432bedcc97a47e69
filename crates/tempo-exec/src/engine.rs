use std::sync::Arc;

use chrono::DateTime;
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use tempo_core::config::EngineConfig;
use tempo_core::{AccountId, Clock};
use tempo_schedule::{next_run, ScheduleConfig};

use crate::db::init_db;
use crate::error::Result;
use crate::executions::{enqueue_in, reap_expired_in};

/// Engine notifications delivered over the optional mpsc channel.
///
/// The send is non-blocking (`try_send`): a full or closed channel drops
/// the event with a warning rather than stalling the tick loop.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A due job produced a pending execution.
    ExecutionEnqueued {
        account_id: String,
        job_id: String,
        execution_id: String,
        scheduled_at: String,
    },
    /// The reaper force-failed an expired lease.
    LeaseReaped {
        execution_id: String,
        job_id: String,
        /// The synthetic failure pushed the job into the dead-letter queue.
        entered_dead_letter: bool,
    },
}

/// Polling scheduler: sweeps due jobs into pending executions and reaps
/// stale leases.
///
/// Owns its own connection; workers and the request layer operate through
/// their own stores against the same database. Ticks across all tenants —
/// the rows it creates inherit each job's `account_id`.
pub struct Engine {
    conn: Connection,
    cfg: EngineConfig,
    clock: Arc<dyn Clock>,
    /// If set, tick outcomes are forwarded here for the host's runner.
    events_tx: Option<mpsc::Sender<EngineEvent>>,
}

impl Engine {
    /// Create a new engine, initialising the DB schema if needed.
    pub fn new(
        conn: Connection,
        cfg: EngineConfig,
        clock: Arc<dyn Clock>,
        events_tx: Option<mpsc::Sender<EngineEvent>>,
    ) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn,
            cfg,
            clock,
            events_tx,
        })
    }

    /// Main event loop. Polls until `shutdown` broadcasts `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_secs = self.cfg.tick_interval_secs,
            "execution engine started"
        );
        self.log_overdue_on_startup();

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.cfg.tick_interval_secs.max(1),
        ));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        error!("engine tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("execution engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// On startup, report jobs whose next run is already in the past. They
    /// fire once on the first tick (no backlog replay).
    fn log_overdue_on_startup(&mut self) {
        let now_str = self.clock.now().to_rfc3339();
        match self.conn.query_row(
            "SELECT COUNT(*) FROM jobs
             WHERE enabled = 1 AND deleted_at IS NULL AND in_dead_letter_queue = 0
               AND next_run_at IS NOT NULL AND next_run_at < ?1",
            [&now_str],
            |row| row.get::<_, i64>(0),
        ) {
            Ok(n) if n > 0 => warn!(count = n, "jobs overdue at startup"),
            Err(e) => error!("overdue-on-startup query failed: {e}"),
            _ => {}
        }
    }

    /// One sweep: enqueue executions for every due job, advance each job's
    /// next run, then reap expired leases.
    fn tick(&mut self) -> Result<()> {
        let now = self.clock.now();
        let now_str = now.to_rfc3339();

        // Collect eagerly so the statement is dropped before the writes.
        // Columns: account_id, id, schedule, next_run_at
        let due: Vec<(String, String, String, String)> = {
            let mut stmt = self.conn.prepare_cached(
                "SELECT account_id, id, schedule, next_run_at FROM jobs
                 WHERE enabled = 1 AND deleted_at IS NULL AND in_dead_letter_queue = 0
                   AND next_run_at IS NOT NULL AND next_run_at <= ?1
                 ORDER BY next_run_at
                 LIMIT ?2",
            )?;
            let rows: Vec<_> = stmt
                .query_map(
                    rusqlite::params![now_str, self.cfg.max_jobs_per_tick as i64],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        for (account_str, job_id, schedule_json, due_at) in due {
            let account = AccountId::new(account_str.clone());
            let scheduled_at = DateTime::parse_from_rfc3339(&due_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or(now);

            match enqueue_in(&self.conn, now, &account, &job_id, scheduled_at) {
                Ok(Some(execution)) => {
                    info!(job_id = %job_id, execution_id = %execution.id, "due job enqueued");
                    self.emit(EngineEvent::ExecutionEnqueued {
                        account_id: account_str,
                        job_id: job_id.clone(),
                        execution_id: execution.id,
                        scheduled_at: execution.scheduled_at,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    error!(job_id = %job_id, "enqueue failed: {e}");
                    continue;
                }
            }

            // Advance the job's schedule. A job whose config no longer
            // computes is parked (next_run_at NULL) instead of hot-looping.
            let next = serde_json::from_str::<ScheduleConfig>(&schedule_json)
                .map_err(|e| e.to_string())
                .and_then(|schedule| next_run(&schedule, now).map_err(|e| e.to_string()));
            match next {
                Ok(next) => {
                    self.conn.execute(
                        "UPDATE jobs SET next_run_at = ?1, updated_at = ?2 WHERE id = ?3",
                        rusqlite::params![next.to_rfc3339(), now_str, job_id],
                    )?;
                }
                Err(reason) => {
                    error!(job_id = %job_id, %reason, "schedule no longer computes; parking job");
                    self.conn.execute(
                        "UPDATE jobs SET next_run_at = NULL, updated_at = ?1 WHERE id = ?2",
                        rusqlite::params![now_str, job_id],
                    )?;
                }
            }
        }

        for reaped in reap_expired_in(&self.conn, now, None)? {
            self.emit(EngineEvent::LeaseReaped {
                execution_id: reaped.execution_id,
                job_id: reaped.job_id,
                entered_dead_letter: reaped.entered_dead_letter,
            });
        }

        Ok(())
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.events_tx {
            // try_send never blocks the tick loop.
            if tx.try_send(event).is_err() {
                warn!("engine event channel full or closed — event dropped");
            }
        }
    }
}
