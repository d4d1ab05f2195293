use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::BridgeError;
use crate::execution_context::ExecutionContext;
use crate::metrics::Metrics;
use crate::normalize::{normalize_text, normalize_value};
use crate::registry::ToolRegistry;
use crate::remote::RemoteInvoker;
use crate::schema::validate;
use crate::traits::{RemoteClient, SubprocessInvoker};
use crate::types::{CallRequest, InvocationPlan, ResultEnvelope};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Where a call is in its single pass through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStage {
    Received,
    Validating,
    Invoking,
    Normalizing,
    Completed,
}

impl fmt::Display for CallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Validating => "validating",
            Self::Invoking => "invoking",
            Self::Normalizing => "normalizing",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Routes call requests through validation, invocation and normalization.
///
/// Every call ends in exactly one [`ResultEnvelope`]. Errors from any stage
/// become a `Failure` envelope, and a panic inside a translator or invoker
/// is caught at the task boundary. Nothing is retried.
#[derive(Clone)]
pub struct DispatchEngine {
    registry: Arc<ToolRegistry>,
    subprocess: Arc<dyn SubprocessInvoker>,
    remote: RemoteInvoker,
    metrics: Arc<Metrics>,
    timeout: Duration,
}

impl DispatchEngine {
    pub fn new(
        registry: Arc<ToolRegistry>,
        subprocess: Arc<dyn SubprocessInvoker>,
        remote: Arc<dyn RemoteClient>,
    ) -> Self {
        Self {
            registry,
            subprocess,
            remote: RemoteInvoker::new(remote),
            metrics: Metrics::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub async fn dispatch(&self, request: CallRequest) -> ResultEnvelope {
        self.dispatch_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Dispatch a call that the caller may abandon by cancelling `cancel`.
    /// A running program is killed; a pending remote call is abandoned,
    /// though the remote side may still complete it.
    pub async fn dispatch_with_cancel(
        &self,
        request: CallRequest,
        cancel: CancellationToken,
    ) -> ResultEnvelope {
        self.metrics.inc_calls();
        let tool = request.tool.clone();
        let ctx = ExecutionContext::new(tool.clone(), self.timeout, cancel);
        let call_id = ctx.call_id.clone();
        info!(call_id = %call_id, tool = %tool, "Dispatching tool call");

        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.run(request, ctx).await });

        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                error!(call_id = %call_id, tool = %tool, "Tool call task failed: {}", join_err);
                Err(BridgeError::Plan(format!(
                    "internal failure while running '{}'",
                    tool
                )))
            }
        };

        match &result {
            Ok(_) => {
                self.metrics.inc_successes();
                info!(call_id = %call_id, tool = %tool, stage = %CallStage::Completed, "Tool call succeeded");
            }
            Err(e) => {
                self.metrics.record_failure(e);
                warn!(
                    call_id = %call_id,
                    tool = %tool,
                    stage = %CallStage::Completed,
                    kind = e.kind(),
                    "Tool call failed: {}",
                    e
                );
            }
        }

        ResultEnvelope::from(result)
    }

    async fn run(&self, request: CallRequest, ctx: ExecutionContext) -> Result<Value, BridgeError> {
        enter(&ctx, CallStage::Received);
        let tool = self
            .registry
            .get(&request.tool)
            .ok_or_else(|| BridgeError::UnknownTool(request.tool.clone()))?;

        enter(&ctx, CallStage::Validating);
        let args = validate(&tool.descriptor, &request.arguments)?;
        let plan = tool.translate(&args)?;

        if ctx.cancel.is_cancelled() {
            return Err(BridgeError::Cancelled { remote: false });
        }

        enter(&ctx, CallStage::Invoking);
        match &plan.invocation {
            InvocationPlan::Program(invocation) => {
                self.metrics.inc_subprocess_invocations();
                let output = self.subprocess.invoke(invocation, &ctx).await?;
                let stdout = output.into_stdout()?;

                enter(&ctx, CallStage::Normalizing);
                normalize_text(&stdout, &plan.output)
            }
            InvocationPlan::Remote(remote_plan) => {
                self.metrics.add_remote_steps(remote_plan.steps.len() as u64);
                let value = self.remote.execute(remote_plan, &ctx).await?;

                enter(&ctx, CallStage::Normalizing);
                normalize_value(value, &plan.output)
            }
        }
    }
}

fn enter(ctx: &ExecutionContext, stage: CallStage) {
    debug!(call_id = %ctx.call_id, tool = %ctx.tool, stage = %stage, "Call stage");
}
