//! Liveness-probe job: optionally waits, then echoes its input.
//!
//! Useful for verifying the queue end to end — enqueue a HEARTBEAT, watch
//! it come back as the result. `wait_ms` in the input delays completion,
//! which also exercises per-item timeouts.

use async_trait::async_trait;

use super::WorkHandler;

pub struct Heartbeat;

#[async_trait]
impl WorkHandler for Heartbeat {
    fn work_type(&self) -> &'static str {
        "HEARTBEAT"
    }

    async fn run(
        &self,
        input: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, String> {
        if let Some(wait_ms) = input.get("wait_ms").and_then(|v| v.as_u64()) {
            tokio::time::sleep(std::time::Duration::from_millis(wait_ms)).await;
        }
        Ok(input.clone())
    }
}
