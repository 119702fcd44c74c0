//! Polling loop: wakes on a timer tick or a `work_ready` NOTIFY and
//! processes one eligible work item per wake.
//!
//! Allocation itself never blocks; multiple pollers (or external workers)
//! coordinate purely through the storage layer's conditional updates, so
//! running several instances is safe.

use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::db::Db;
use crate::engine::WorkerDirector;
use crate::error::Result;

/// Configuration for the polling loop.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Tick interval when no NOTIFY arrives. Bounds worst-case latency
    /// between an item becoming eligible and its execution.
    pub poll_interval: std::time::Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: std::time::Duration::from_secs(5),
        }
    }
}

/// The polling loop: listen for work, process it, repeat until shutdown.
#[derive(Clone)]
pub struct Poller {
    db: Arc<Db>,
    director: Arc<WorkerDirector>,
    config: PollerConfig,
    shutdown: Arc<Notify>,
}

impl Poller {
    pub fn new(db: Arc<Db>, director: Arc<WorkerDirector>, config: PollerConfig) -> Self {
        Self {
            db,
            director,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the poller to shut down.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run the loop until shutdown.
    pub async fn run(&self) -> Result<()> {
        // Connect PgListener for NOTIFY
        let mut listener = sqlx::postgres::PgListener::connect_with(self.db.pool()).await?;
        listener.listen("work_ready").await?;

        info!("poller started, listening for work");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("poller shutting down");
                    return Ok(());
                }
                notif = listener.recv() => {
                    match notif {
                        Ok(n) => {
                            info!(work_type = n.payload(), "notified of new work");
                        }
                        Err(e) => {
                            warn!("PgListener error: {e}, falling back to poll");
                        }
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            // One allocation per wake — each enqueue notifies, so bursts
            // still drain promptly.
            if let Err(e) = self.tick().await {
                error!("work processing error: {e}");
            }
        }
    }

    /// One poll step: allocate, execute, finish.
    async fn tick(&self) -> Result<()> {
        if let Some(item) = self.director.process_next_work(None).await? {
            info!(
                id = %item.id,
                work_type = %item.work_type,
                status = %item.status,
                "processed work item"
            );
        }
        Ok(())
    }
}
