use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-call context handed to the invokers.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub call_id: String,
    pub tool: String,
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(tool: impl Into<String>, timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            call_id: uuid::Uuid::new_v4().to_string(),
            tool: tool.into(),
            timeout,
            cancel,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}
