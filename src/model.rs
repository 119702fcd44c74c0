//! Core data model.
//!
//! A work item is one schedulable unit of background work. It has identity,
//! an opaque JSON payload, a priority, a scheduling gate, and a lifecycle
//! status driven by the allocation protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of work tracked by the queue engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier.
    pub id: WorkId,

    /// What kind of work this is (e.g. "HEARTBEAT", "EXTERNAL").
    /// Determines which handler processes it.
    pub work_type: String,

    /// Arbitrary payload for the handler. The engine doesn't interpret it.
    pub input: serde_json::Value,

    /// Priority. Higher values are allocated first.
    pub priority: i32,

    /// Current lifecycle status. Reported as [`WorkStatus::Deleted`]
    /// whenever `deleted` is set, regardless of the stored status.
    pub status: WorkStatus,

    /// The item is not eligible for allocation before this time.
    pub scheduled: DateTime<Utc>,

    /// When the item was allocated to a worker.
    pub started: Option<DateTime<Utc>>,

    /// When the outcome was recorded.
    pub finished: Option<DateTime<Utc>>,

    /// Identity of the worker that allocated the item.
    pub worker: Option<String>,

    /// Outcome payload on success. Opaque to the engine.
    pub result: Option<serde_json::Value>,

    /// Outcome payload on failure. Opaque to the engine.
    pub error: Option<serde_json::Value>,

    /// Remaining retry budget. A failure with `retries > 0` spawns a
    /// clone with `retries - 1`.
    pub retries: i32,

    /// Maximum allowed processing duration, in milliseconds.
    pub timeout_ms: Option<i64>,

    /// The failed item this one was cloned from, for retry clones.
    pub original: Option<WorkId>,

    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,

    /// Soft-deletion marker. Deleted items are excluded from allocation
    /// and from default listings; rows are never hard-deleted.
    pub deleted: Option<DateTime<Utc>>,
}

/// Newtype for work item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a caller-supplied id string. Empty or malformed ids are a
    /// validation error, surfaced before any storage access.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidId(s.to_string()));
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::InvalidId(s.to_string()))
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    /// Created, eligible for allocation once `scheduled` has passed.
    New,
    /// Claimed by exactly one worker, execution in flight.
    Allocated,
    /// Finished successfully. Terminal.
    Success,
    /// Finished with an error. Terminal for this row; a retry clone may
    /// continue the work as a new item.
    Failed,
    /// Soft-deleted. Terminal.
    Deleted,
}

impl WorkStatus {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: WorkStatus) -> bool {
        use WorkStatus::*;
        matches!(
            (self, to),
            (New, Allocated)
                | (Allocated, Success)
                | (Allocated, Failed)
                | (New, Deleted)      // removal of never-started work
                | (Success, Deleted)
                | (Failed, Deleted)
        )
    }

    /// Has execution concluded for this row?
    pub fn is_finished(self) -> bool {
        matches!(self, WorkStatus::Success | WorkStatus::Failed)
    }

    /// Storage representation. `Deleted` is never stored in the status
    /// column — it is derived from the `deleted` timestamp.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkStatus::New => "new",
            WorkStatus::Allocated => "allocated",
            WorkStatus::Success => "success",
            WorkStatus::Failed => "failed",
            WorkStatus::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "new" => Ok(WorkStatus::New),
            "allocated" => Ok(WorkStatus::Allocated),
            "success" => Ok(WorkStatus::Success),
            "failed" => Ok(WorkStatus::Failed),
            "deleted" => Ok(WorkStatus::Deleted),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of executing a work item's handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOutcome {
    pub success: bool,
    /// Arbitrary result data. Opaque to the engine.
    pub result: Option<serde_json::Value>,
    /// Error payload if failed.
    pub error: Option<serde_json::Value>,
}

impl WorkOutcome {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: serde_json::Value) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
        }
    }
}

/// Arguments for recording a work item's outcome.
#[derive(Debug, Clone, Default)]
pub struct FinishWork {
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<serde_json::Value>,
    /// Identity of the worker reporting the outcome. Should match the
    /// allocating worker; a mismatch is logged but not rejected.
    pub worker: Option<String>,
    /// Override for the allocation timestamp, for externally executed work.
    pub started: Option<DateTime<Utc>>,
    /// Override for the completion timestamp. Defaults to now.
    pub finished: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for enqueuing new work. Unset knobs fall back to configured
/// defaults at add time.
#[derive(Debug, Clone)]
pub struct NewWork {
    pub(crate) work_type: String,
    pub(crate) input: serde_json::Value,
    pub(crate) priority: Option<i32>,
    pub(crate) scheduled: Option<DateTime<Utc>>,
    pub(crate) retries: Option<i32>,
    pub(crate) timeout_ms: Option<i64>,
}

impl NewWork {
    pub fn new(work_type: impl Into<String>) -> Self {
        Self {
            work_type: work_type.into(),
            input: serde_json::Value::Null,
            priority: None,
            scheduled: None,
            retries: None,
            timeout_ms: None,
        }
    }

    pub fn input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Delay eligibility until the given time.
    pub fn scheduled(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled = Some(at);
        self
    }

    pub fn retries(mut self, retries: i32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

// ---------------------------------------------------------------------------
// Queue filters
// ---------------------------------------------------------------------------

/// Filters for listing the work queue.
///
/// With no status filter, soft-deleted items are excluded; ask for
/// [`WorkStatus::Deleted`] explicitly to see them.
#[derive(Debug, Clone, Default)]
pub struct WorkQueueFilter {
    pub status: Option<Vec<WorkStatus>>,
    pub types: Option<Vec<String>>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Free-text match over type, worker, and input.
    pub query_string: Option<String>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_only_from_new() {
        assert!(WorkStatus::New.can_transition_to(WorkStatus::Allocated));
        assert!(!WorkStatus::Failed.can_transition_to(WorkStatus::Allocated));
        assert!(!WorkStatus::Success.can_transition_to(WorkStatus::Allocated));
        assert!(!WorkStatus::Deleted.can_transition_to(WorkStatus::Allocated));
    }

    #[test]
    fn finish_only_from_allocated() {
        assert!(WorkStatus::Allocated.can_transition_to(WorkStatus::Success));
        assert!(WorkStatus::Allocated.can_transition_to(WorkStatus::Failed));
        assert!(!WorkStatus::New.can_transition_to(WorkStatus::Success));
        assert!(!WorkStatus::New.can_transition_to(WorkStatus::Failed));
    }

    #[test]
    fn removal_not_allowed_while_allocated() {
        assert!(WorkStatus::New.can_transition_to(WorkStatus::Deleted));
        assert!(WorkStatus::Success.can_transition_to(WorkStatus::Deleted));
        assert!(WorkStatus::Failed.can_transition_to(WorkStatus::Deleted));
        assert!(!WorkStatus::Allocated.can_transition_to(WorkStatus::Deleted));
        assert!(!WorkStatus::Deleted.can_transition_to(WorkStatus::Deleted));
    }

    #[test]
    fn status_roundtrips_through_storage_repr() {
        for status in [
            WorkStatus::New,
            WorkStatus::Allocated,
            WorkStatus::Success,
            WorkStatus::Failed,
            WorkStatus::Deleted,
        ] {
            let parsed: WorkStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("pending".parse::<WorkStatus>().is_err());
    }

    #[test]
    fn work_id_parse_rejects_empty_and_garbage() {
        assert!(matches!(WorkId::parse(""), Err(Error::InvalidId(_))));
        assert!(matches!(WorkId::parse("   "), Err(Error::InvalidId(_))));
        assert!(matches!(
            WorkId::parse("not-a-uuid"),
            Err(Error::InvalidId(_))
        ));

        let id = WorkId::new();
        let parsed = WorkId::parse(&id.0.to_string()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn finished_statuses() {
        assert!(WorkStatus::Success.is_finished());
        assert!(WorkStatus::Failed.is_finished());
        assert!(!WorkStatus::New.is_finished());
        assert!(!WorkStatus::Allocated.is_finished());
    }
}
