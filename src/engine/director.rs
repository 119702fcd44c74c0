//! Director: the module API the mutation layer calls.
//!
//! Thin facade over the storage layer and the handler registry. String ids
//! from callers are validated here; state preconditions are enforced by the
//! storage layer's conditional updates. Authorization is the caller's
//! concern — every operation assumes an already-authenticated context.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::config::WorkDefaults;
use crate::db::Db;
use crate::error::Result;
use crate::handler::HandlerRegistry;
use crate::model::{FinishWork, NewWork, WorkId, WorkItem, WorkOutcome, WorkQueueFilter};
use crate::telemetry::work::{record_status_transition, start_work_span};

pub struct WorkerDirector {
    db: Arc<Db>,
    registry: Arc<HandlerRegistry>,
    defaults: WorkDefaults,
    /// Identity used when no explicit worker is supplied.
    worker_id: String,
}

impl WorkerDirector {
    pub fn new(
        db: Arc<Db>,
        registry: Arc<HandlerRegistry>,
        defaults: WorkDefaults,
        worker_id: String,
    ) -> Self {
        Self {
            db,
            registry,
            defaults,
            worker_id,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Enqueue new work.
    ///
    /// Types without a registered handler are allowed — an external worker
    /// process may own them — but logged, since a typo here would otherwise
    /// sit in the queue forever.
    pub async fn add_work(&self, new: NewWork) -> Result<WorkItem> {
        if !new.work_type.trim().is_empty() && !self.registry.contains(&new.work_type) {
            tracing::warn!(
                work_type = %new.work_type,
                "no registered handler for work type; an external worker may own it"
            );
        }
        let item = self.db.add_work(new, self.defaults).await?;
        tracing::debug!(id = %item.id, work_type = %item.work_type, "work enqueued");
        Ok(item)
    }

    /// Claim the next eligible item for a worker identity.
    pub async fn allocate_work(
        &self,
        types: Option<&[String]>,
        worker: Option<&str>,
    ) -> Result<Option<WorkItem>> {
        self.db
            .allocate_work(types, worker.unwrap_or(&self.worker_id))
            .await
    }

    /// Record the outcome of an allocated item.
    pub async fn finish_work(&self, work_id: &str, finish: FinishWork) -> Result<WorkItem> {
        self.db.finish_work(WorkId::parse(work_id)?, finish).await
    }

    /// Soft-delete an item that is not currently allocated.
    pub async fn remove_work(&self, work_id: &str) -> Result<WorkItem> {
        self.db.remove_work(WorkId::parse(work_id)?).await
    }

    /// Look up a single item.
    pub async fn find_work(&self, work_id: &str) -> Result<Option<WorkItem>> {
        self.db.find_work(WorkId::parse(work_id)?).await
    }

    /// List the queue with filters.
    pub async fn work_queue(&self, filter: &WorkQueueFilter) -> Result<Vec<WorkItem>> {
        self.db.list_work(filter).await
    }

    /// Distinct work types currently present in the store.
    pub async fn active_work_types(&self) -> Result<Vec<String>> {
        self.db.active_work_types().await
    }

    /// Execute a handler inline, bypassing the queue entirely.
    ///
    /// For request-scoped synchronous jobs. Unknown types are a protocol
    /// error; the handler's own failure comes back as a failed outcome.
    pub async fn do_work(
        &self,
        work_type: &str,
        input: &serde_json::Value,
    ) -> Result<WorkOutcome> {
        self.registry.dispatch(work_type, input).await
    }

    /// One full polling step: allocate the next eligible internally-handled
    /// item, execute it, record the outcome. Returns the finished item, or
    /// None when the queue had nothing eligible.
    pub async fn process_next_work(&self, worker: Option<&str>) -> Result<Option<WorkItem>> {
        let worker = worker.unwrap_or(&self.worker_id).to_string();

        let types = self.registry.internal_types();
        if types.is_empty() {
            return Ok(None);
        }

        let Some(item) = self.db.allocate_work(Some(&types), &worker).await? else {
            return Ok(None);
        };

        let work_span = start_work_span(&item.work_type, &item.id.0);
        record_status_transition(&work_span, "new", "allocated");

        async {
            let outcome = self.execute(&item).await;
            record_status_transition(
                &work_span,
                "allocated",
                if outcome.success { "success" } else { "failed" },
            );

            let finished = self
                .db
                .finish_work(
                    item.id,
                    FinishWork {
                        success: outcome.success,
                        result: outcome.result,
                        error: outcome.error,
                        worker: Some(worker),
                        started: None,
                        finished: None,
                    },
                )
                .await?;

            Ok(Some(finished))
        }
        .instrument(work_span.clone())
        .await
    }

    /// Run the item's handler, bounded by its timeout when one is set.
    async fn execute(&self, item: &WorkItem) -> WorkOutcome {
        let run = self.registry.dispatch(&item.work_type, &item.input);

        let dispatched = match item.timeout_ms {
            Some(ms) if ms > 0 => {
                match tokio::time::timeout(Duration::from_millis(ms as u64), run).await {
                    Ok(result) => result,
                    Err(_) => {
                        return WorkOutcome::failure(json!({
                            "message": format!("timed out after {ms}ms")
                        }));
                    }
                }
            }
            _ => run.await,
        };

        match dispatched {
            Ok(outcome) => outcome,
            // A protocol error during background processing (e.g. no handler
            // for the type after all) still folds into a failed outcome so
            // the item doesn't stay allocated forever.
            Err(e) => WorkOutcome::failure(json!({
                "message": e.to_string(),
                "code": e.code(),
            })),
        }
    }
}
