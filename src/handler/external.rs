//! Marker handler for work owned by out-of-process workers.
//!
//! EXTERNAL items are enqueued here but claimed and completed by external
//! worker processes through allocate/finish. Registering the type keeps it
//! enqueueable and listable while the internal poller skips it.

use async_trait::async_trait;

use super::WorkHandler;

pub struct External;

#[async_trait]
impl WorkHandler for External {
    fn work_type(&self) -> &'static str {
        "EXTERNAL"
    }

    fn external(&self) -> bool {
        true
    }

    async fn run(
        &self,
        _input: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, String> {
        Err("EXTERNAL work is processed by external workers".to_string())
    }
}
