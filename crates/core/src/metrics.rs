use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::BridgeError;

/// Process-wide call counters. Updated once per finished call.
#[derive(Default)]
pub struct Metrics {
    calls: AtomicU64,
    successes: AtomicU64,
    subprocess_invocations: AtomicU64,
    remote_steps: AtomicU64,
    unknown_tool: AtomicU64,
    validation: AtomicU64,
    timeouts: AtomicU64,
    capture_overflows: AtomicU64,
    subprocess_errors: AtomicU64,
    decode_errors: AtomicU64,
    remote_errors: AtomicU64,
    cancelled: AtomicU64,
    other_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_calls(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_successes(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_subprocess_invocations(&self) {
        self.subprocess_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_remote_steps(&self, steps: u64) {
        self.remote_steps.fetch_add(steps, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: &BridgeError) {
        let counter = match error {
            BridgeError::UnknownTool(_) => &self.unknown_tool,
            BridgeError::Validation { .. } => &self.validation,
            BridgeError::InvocationTimeout { .. } => &self.timeouts,
            BridgeError::CaptureOverflow { .. } => &self.capture_overflows,
            BridgeError::Subprocess { .. } => &self.subprocess_errors,
            BridgeError::OutputDecode(_) => &self.decode_errors,
            BridgeError::RemoteCall(_) => &self.remote_errors,
            BridgeError::Cancelled { .. } => &self.cancelled,
            BridgeError::Plan(_) | BridgeError::NotFound(_) => &self.other_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            subprocess_invocations: self.subprocess_invocations.load(Ordering::Relaxed),
            remote_steps: self.remote_steps.load(Ordering::Relaxed),
            unknown_tool: self.unknown_tool.load(Ordering::Relaxed),
            validation: self.validation.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            capture_overflows: self.capture_overflows.load(Ordering::Relaxed),
            subprocess_errors: self.subprocess_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            other_failures: self.other_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub calls: u64,
    pub successes: u64,
    pub subprocess_invocations: u64,
    pub remote_steps: u64,
    pub unknown_tool: u64,
    pub validation: u64,
    pub timeouts: u64,
    pub capture_overflows: u64,
    pub subprocess_errors: u64,
    pub decode_errors: u64,
    pub remote_errors: u64,
    pub cancelled: u64,
    pub other_failures: u64,
}

impl MetricsSnapshot {
    pub fn failures(&self) -> u64 {
        self.calls.saturating_sub(self.successes)
    }

    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            return 1.0;
        }
        self.successes as f64 / self.calls as f64
    }
}
