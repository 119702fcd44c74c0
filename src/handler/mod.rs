//! Job handlers and the work-type registry.
//!
//! A work item's `work_type` dispatches to whichever handler registered
//! that type. Handlers are plain trait objects resolved at execution time;
//! the engine never interprets the input or output payloads.

pub mod external;
pub mod heartbeat;

pub use external::External;
pub use heartbeat::Heartbeat;

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::WorkOutcome;

/// A job implementation for one work type.
#[async_trait]
pub trait WorkHandler: Send + Sync {
    /// The work type this handler owns.
    fn work_type(&self) -> &'static str;

    /// External types are claimed and completed by out-of-process workers
    /// through the allocate/finish API. The internal poller never allocates
    /// them.
    fn external(&self) -> bool {
        false
    }

    /// Execute the job. A returned error is recorded on the work item as
    /// data and feeds the retry policy; it is never a protocol error.
    async fn run(
        &self,
        input: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, String>;
}

/// Registry of handlers, indexed by work type.
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn WorkHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry with no handlers.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Heartbeat));
        registry.register(Arc::new(External));
        registry
    }

    /// Register a handler. A later registration for the same work type
    /// replaces the earlier one.
    pub fn register(&mut self, handler: Arc<dyn WorkHandler>) {
        self.handlers.insert(handler.work_type(), handler);
    }

    pub fn get(&self, work_type: &str) -> Option<&Arc<dyn WorkHandler>> {
        self.handlers.get(work_type)
    }

    pub fn contains(&self, work_type: &str) -> bool {
        self.handlers.contains_key(work_type)
    }

    /// Work types the internal poller may allocate — everything registered
    /// except external types.
    pub fn internal_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .handlers
            .values()
            .filter(|h| !h.external())
            .map(|h| h.work_type().to_string())
            .collect();
        types.sort();
        types
    }

    /// Run the handler registered for `work_type` directly.
    ///
    /// An unknown work type is a protocol error; the handler's own failure
    /// is folded into the returned outcome.
    pub async fn dispatch(
        &self,
        work_type: &str,
        input: &serde_json::Value,
    ) -> Result<WorkOutcome> {
        let handler = self
            .get(work_type)
            .ok_or_else(|| Error::UnknownWorkType(work_type.to_string()))?;

        match handler.run(input).await {
            Ok(result) => Ok(WorkOutcome::success(result)),
            Err(message) => Ok(WorkOutcome::failure(json!({ "message": message }))),
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Shouty;

    #[async_trait]
    impl WorkHandler for Shouty {
        fn work_type(&self) -> &'static str {
            "SHOUT"
        }

        async fn run(
            &self,
            input: &serde_json::Value,
        ) -> std::result::Result<serde_json::Value, String> {
            let text = input
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or("missing text")?;
            Ok(json!({ "text": text.to_uppercase() }))
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = HandlerRegistry::with_builtins();
        assert!(registry.contains("HEARTBEAT"));
        assert!(registry.contains("EXTERNAL"));
        assert!(!registry.contains("BULK_IMPORT"));
    }

    #[test]
    fn internal_types_exclude_external() {
        let registry = HandlerRegistry::with_builtins();
        let types = registry.internal_types();
        assert!(types.contains(&"HEARTBEAT".to_string()));
        assert!(!types.contains(&"EXTERNAL".to_string()));
    }

    #[tokio::test]
    async fn dispatch_runs_registered_handler() {
        let mut registry = HandlerRegistry::empty();
        registry.register(Arc::new(Shouty));

        let outcome = registry
            .dispatch("SHOUT", &json!({"text": "hello"}))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.result.unwrap()["text"], "HELLO");
    }

    #[tokio::test]
    async fn dispatch_folds_handler_failure_into_outcome() {
        let mut registry = HandlerRegistry::empty();
        registry.register(Arc::new(Shouty));

        let outcome = registry.dispatch("SHOUT", &json!({})).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.unwrap()["message"], "missing text");
    }

    #[tokio::test]
    async fn dispatch_unknown_type_is_a_protocol_error() {
        let registry = HandlerRegistry::with_builtins();
        let err = registry.dispatch("NO_SUCH_TYPE", &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::UnknownWorkType(_)));
    }

    #[tokio::test]
    async fn heartbeat_echoes_input() {
        let registry = HandlerRegistry::with_builtins();
        let outcome = registry
            .dispatch("HEARTBEAT", &json!({"probe": 1}))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.result.unwrap(), json!({"probe": 1}));
    }

    #[tokio::test]
    async fn external_refuses_in_process_execution() {
        let registry = HandlerRegistry::with_builtins();
        let outcome = registry.dispatch("EXTERNAL", &json!({})).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }
}
