//! Work item storage: enqueue, atomic allocation, outcome recording with
//! retry clones, soft deletion, and queue queries.
//!
//! The NEW -> ALLOCATED transition is a conditional update keyed on the
//! current status. That single atomic write is what keeps concurrent
//! allocators from double-claiming an item; every other transition is
//! performed by whichever worker already holds it.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::config::WorkDefaults;
use crate::error::{Error, Result};
use crate::model::{FinishWork, NewWork, WorkId, WorkItem, WorkQueueFilter, WorkStatus};
use crate::telemetry::metrics;

/// Column list shared by every query that materializes a full item.
const WORK_COLUMNS: &str = "id, work_type, input, priority, status, scheduled, started, finished, \
     worker, result, error, retries, timeout_ms, original, created, updated, deleted";

impl super::Db {
    /// Insert a new work item with status `new`.
    ///
    /// Unset knobs fall back to `defaults`. Fires a `work_ready` NOTIFY in
    /// the same transaction so an idle poller wakes without waiting for its
    /// next tick.
    pub async fn add_work(&self, new: NewWork, defaults: WorkDefaults) -> Result<WorkItem> {
        if new.work_type.trim().is_empty() {
            return Err(Error::WorkTypeRequired);
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        let scheduled = new.scheduled.unwrap_or(now);

        let mut tx = self.pool().begin().await?;

        let row: WorkItemRow = sqlx::query_as(&format!(
            "INSERT INTO work_items \
                 (id, work_type, input, priority, status, scheduled, retries, timeout_ms, created, updated) \
             VALUES ($1, $2, $3, $4, 'new', $5, $6, $7, $8, $8) \
             RETURNING {WORK_COLUMNS}"
        ))
        .bind(id)
        .bind(&new.work_type)
        .bind(&new.input)
        .bind(new.priority.unwrap_or(defaults.priority))
        .bind(scheduled)
        .bind(new.retries.unwrap_or(defaults.retries))
        .bind(new.timeout_ms.or(Some(defaults.timeout_ms)))
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        // NOTIFY is transactional — only fires on commit
        notify_work_ready(&mut tx, &new.work_type).await?;
        tx.commit().await?;

        metrics::work_added().add(1, &[KeyValue::new("work_type", new.work_type)]);

        row.try_into_work_item()
    }

    /// Get a work item by ID, or None if no such row exists.
    pub async fn find_work(&self, id: WorkId) -> Result<Option<WorkItem>> {
        let row: Option<WorkItemRow> =
            sqlx::query_as(&format!("SELECT {WORK_COLUMNS} FROM work_items WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;

        row.map(WorkItemRow::try_into_work_item).transpose()
    }

    /// Claim the next eligible work item for `worker`.
    ///
    /// Eligible means status `new`, not deleted, `scheduled` in the past,
    /// and (when `types` is given) a matching work type. Highest priority
    /// wins; ties break on earliest creation. Returns None without blocking
    /// when nothing is eligible.
    ///
    /// Selection and claim are separate statements, so a concurrent caller
    /// may win the conditional update; losing the race just means moving on
    /// to the next-best candidate.
    pub async fn allocate_work(
        &self,
        types: Option<&[String]>,
        worker: &str,
    ) -> Result<Option<WorkItem>> {
        debug_assert!(WorkStatus::New.can_transition_to(WorkStatus::Allocated));

        loop {
            let now = Utc::now();
            let candidate: Option<(Uuid,)> = sqlx::query_as(
                "SELECT id FROM work_items \
                 WHERE status = 'new' AND deleted IS NULL AND scheduled <= $1 \
                   AND ($2::text[] IS NULL OR work_type = ANY($2)) \
                 ORDER BY priority DESC, created ASC \
                 LIMIT 1",
            )
            .bind(now)
            .bind(types)
            .fetch_optional(self.pool())
            .await?;

            let Some((id,)) = candidate else {
                metrics::work_allocated().add(
                    1,
                    &[
                        KeyValue::new("worker", worker.to_string()),
                        KeyValue::new("result", "empty"),
                    ],
                );
                return Ok(None);
            };

            let claimed: Option<WorkItemRow> = sqlx::query_as(&format!(
                "UPDATE work_items \
                 SET status = 'allocated', worker = $2, started = $3, updated = $3 \
                 WHERE id = $1 AND status = 'new' AND deleted IS NULL \
                 RETURNING {WORK_COLUMNS}"
            ))
            .bind(id)
            .bind(worker)
            .bind(now)
            .fetch_optional(self.pool())
            .await?;

            match claimed {
                Some(row) => {
                    let item = row.try_into_work_item()?;
                    metrics::work_allocated().add(
                        1,
                        &[
                            KeyValue::new("worker", worker.to_string()),
                            KeyValue::new("result", "ok"),
                        ],
                    );
                    return Ok(Some(item));
                }
                None => {
                    // Lost the race to a concurrent allocator; pick the
                    // next-best candidate.
                    tracing::debug!(candidate = %id, worker, "allocation race lost, reselecting");
                }
            }
        }
    }

    /// Record the outcome of an allocated work item.
    ///
    /// On failure with remaining retry budget, a clone is inserted in the
    /// same transaction: status `new`, decremented retries, `original`
    /// pointing at the failed item, eligible immediately.
    pub async fn finish_work(&self, id: WorkId, finish: FinishWork) -> Result<WorkItem> {
        let target = if finish.success {
            WorkStatus::Success
        } else {
            WorkStatus::Failed
        };
        debug_assert!(WorkStatus::Allocated.can_transition_to(target));

        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let row: Option<WorkItemRow> = sqlx::query_as(&format!(
            "UPDATE work_items \
             SET status = $2, result = $3, error = $4, \
                 started = COALESCE($5, started), finished = COALESCE($6, $7), updated = $7 \
             WHERE id = $1 AND status = 'allocated' AND deleted IS NULL \
             RETURNING {WORK_COLUMNS}"
        ))
        .bind(id.0)
        .bind(target.as_str())
        .bind(&finish.result)
        .bind(&finish.error)
        .bind(finish.started)
        .bind(finish.finished)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(Error::WorkNotFoundOrWrongStatus {
                id: id.0.to_string(),
                expected: "allocated",
            });
        };

        if let (Some(reported), Some(assigned)) = (&finish.worker, &row.worker) {
            if reported != assigned {
                tracing::warn!(
                    id = %id,
                    %reported,
                    %assigned,
                    "finish reported by a different worker than the allocation"
                );
            }
        }

        if !finish.success && row.retries > 0 {
            let clone_id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO work_items \
                     (id, work_type, input, priority, status, scheduled, retries, timeout_ms, original, created, updated) \
                 VALUES ($1, $2, $3, $4, 'new', $5, $6, $7, $8, $5, $5)",
            )
            .bind(clone_id)
            .bind(&row.work_type)
            .bind(&row.input)
            .bind(row.priority)
            .bind(now)
            .bind(row.retries - 1)
            .bind(row.timeout_ms)
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

            notify_work_ready(&mut tx, &row.work_type).await?;

            tracing::info!(
                failed = %id,
                clone = %WorkId(clone_id),
                retries_left = row.retries - 1,
                "work failed, retry clone scheduled"
            );
            metrics::work_retried().add(1, &[KeyValue::new("work_type", row.work_type.clone())]);
        }

        tx.commit().await?;

        let item = row.try_into_work_item()?;
        metrics::work_finished().add(
            1,
            &[
                KeyValue::new("work_type", item.work_type.clone()),
                KeyValue::new("result", if finish.success { "success" } else { "failure" }),
            ],
        );
        if let (Some(started), Some(finished)) = (item.started, item.finished) {
            metrics::work_duration_ms().record(
                (finished - started).num_milliseconds().max(0) as f64,
                &[KeyValue::new("work_type", item.work_type.clone())],
            );
        }

        Ok(item)
    }

    /// Soft-delete a work item.
    ///
    /// Allowed from `new`, `success`, and `failed`; an allocated item must
    /// be finished first, and a deleted item cannot be deleted again.
    pub async fn remove_work(&self, id: WorkId) -> Result<WorkItem> {
        let now = Utc::now();
        let row: Option<WorkItemRow> = sqlx::query_as(&format!(
            "UPDATE work_items \
             SET deleted = $2, updated = $2 \
             WHERE id = $1 AND deleted IS NULL AND status <> 'allocated' \
             RETURNING {WORK_COLUMNS}"
        ))
        .bind(id.0)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Err(Error::WorkNotFoundOrWrongStatus {
                id: id.0.to_string(),
                expected: "new, success, or failed",
            });
        };

        let item = row.try_into_work_item()?;
        metrics::work_removed().add(1, &[KeyValue::new("work_type", item.work_type.clone())]);
        Ok(item)
    }

    /// List work items matching the given filters, newest first.
    pub async fn list_work(&self, filter: &WorkQueueFilter) -> Result<Vec<WorkItem>> {
        let mut query = list_query(filter);
        let rows: Vec<WorkItemRow> = query.build_query_as().fetch_all(self.pool()).await?;
        rows.into_iter()
            .map(WorkItemRow::try_into_work_item)
            .collect()
    }

    /// Distinct work types present in the store (excluding deleted items).
    pub async fn active_work_types(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT work_type FROM work_items WHERE deleted IS NULL ORDER BY work_type",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }
}

async fn notify_work_ready(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    work_type: &str,
) -> Result<()> {
    sqlx::query("SELECT pg_notify('work_ready', $1)")
        .bind(work_type)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Build the filtered listing query.
///
/// Status filtering has to account for `deleted` being a timestamp rather
/// than a stored status: `Deleted` matches `deleted IS NOT NULL`, every
/// other status matches the status column on live rows only. No status
/// filter means live rows of any status.
fn list_query(filter: &WorkQueueFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {WORK_COLUMNS} FROM work_items WHERE 1=1"
    ));

    match &filter.status {
        None => {
            qb.push(" AND deleted IS NULL");
        }
        Some(statuses) => {
            let stored: Vec<String> = statuses
                .iter()
                .filter(|s| **s != WorkStatus::Deleted)
                .map(|s| s.as_str().to_string())
                .collect();
            let want_deleted = statuses.contains(&WorkStatus::Deleted);

            qb.push(" AND (");
            if !stored.is_empty() {
                qb.push("(deleted IS NULL AND status = ANY(");
                qb.push_bind(stored.clone());
                qb.push("))");
            }
            if want_deleted {
                if !stored.is_empty() {
                    qb.push(" OR ");
                }
                qb.push("deleted IS NOT NULL");
            }
            if stored.is_empty() && !want_deleted {
                qb.push("FALSE");
            }
            qb.push(")");
        }
    }

    if let Some(types) = &filter.types {
        qb.push(" AND work_type = ANY(");
        qb.push_bind(types.clone());
        qb.push(")");
    }
    if let Some(after) = filter.created_after {
        qb.push(" AND created >= ");
        qb.push_bind(after);
    }
    if let Some(before) = filter.created_before {
        qb.push(" AND created <= ");
        qb.push_bind(before);
    }
    if let Some(q) = &filter.query_string {
        let pattern = format!("%{q}%");
        qb.push(" AND (work_type ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR worker ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR input::text ILIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }

    qb.push(" ORDER BY created DESC");
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit);
    }

    qb
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkItemRow {
    id: Uuid,
    work_type: String,
    input: serde_json::Value,
    priority: i32,
    status: String,
    scheduled: DateTime<Utc>,
    started: Option<DateTime<Utc>>,
    finished: Option<DateTime<Utc>>,
    worker: Option<String>,
    result: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
    retries: i32,
    timeout_ms: Option<i64>,
    original: Option<Uuid>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
    deleted: Option<DateTime<Utc>>,
}

impl WorkItemRow {
    fn try_into_work_item(self) -> Result<WorkItem> {
        // Soft deletion wins over whatever status the row last held.
        let status = if self.deleted.is_some() {
            WorkStatus::Deleted
        } else {
            self.status.parse()?
        };

        Ok(WorkItem {
            id: WorkId(self.id),
            work_type: self.work_type,
            input: self.input,
            priority: self.priority,
            status,
            scheduled: self.scheduled,
            started: self.started,
            finished: self.finished,
            worker: self.worker,
            result: self.result,
            error: self.error,
            retries: self.retries,
            timeout_ms: self.timeout_ms,
            original: self.original.map(WorkId),
            created: self.created,
            updated: self.updated,
            deleted: self.deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listing_excludes_deleted() {
        let query = list_query(&WorkQueueFilter::default());
        assert!(query.sql().contains("deleted IS NULL"));
        assert!(!query.sql().contains("LIMIT"));
    }

    #[test]
    fn deleted_status_filter_matches_deletion_timestamp() {
        let query = list_query(&WorkQueueFilter {
            status: Some(vec![WorkStatus::Deleted]),
            ..Default::default()
        });
        assert!(query.sql().contains("deleted IS NOT NULL"));
        assert!(!query.sql().contains("status = ANY"));
    }

    #[test]
    fn mixed_status_filter_covers_both_forms() {
        let query = list_query(&WorkQueueFilter {
            status: Some(vec![WorkStatus::New, WorkStatus::Deleted]),
            ..Default::default()
        });
        assert!(query.sql().contains("status = ANY"));
        assert!(query.sql().contains(" OR deleted IS NOT NULL"));
    }

    #[test]
    fn query_string_searches_type_worker_and_input() {
        let query = list_query(&WorkQueueFilter {
            query_string: Some("import".to_string()),
            ..Default::default()
        });
        let sql = query.sql();
        assert!(sql.contains("work_type ILIKE"));
        assert!(sql.contains("worker ILIKE"));
        assert!(sql.contains("input::text ILIKE"));
    }

    #[test]
    fn limit_and_date_range_are_applied() {
        let query = list_query(&WorkQueueFilter {
            created_after: Some(Utc::now()),
            created_before: Some(Utc::now()),
            limit: Some(10),
            ..Default::default()
        });
        let sql = query.sql();
        assert!(sql.contains("created >= "));
        assert!(sql.contains("created <= "));
        assert!(sql.contains("LIMIT"));
    }
}
