use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::error::{BridgeError, CompletedStep, FaultKind, RemoteFault};
use crate::execution_context::ExecutionContext;
use crate::traits::RemoteClient;
use crate::types::{Binding, RemoteCallPlan, RemoteStep};

/// Runs remote call plans against a [`RemoteClient`], one step at a time.
///
/// The whole plan shares the context's deadline. A failing step ends the
/// call. Steps that already completed are not compensated; the fault lists
/// them so the caller can clean up.
#[derive(Clone)]
pub struct RemoteInvoker {
    client: Arc<dyn RemoteClient>,
}

impl RemoteInvoker {
    pub fn new(client: Arc<dyn RemoteClient>) -> Self {
        Self { client }
    }

    pub async fn execute(
        &self,
        plan: &RemoteCallPlan,
        ctx: &ExecutionContext,
    ) -> Result<Value, BridgeError> {
        if plan.steps.is_empty() {
            return Err(BridgeError::Plan("remote plan has no steps".into()));
        }

        let deadline = Instant::now() + ctx.timeout;
        let mut outputs: HashMap<&str, Value> = HashMap::new();
        let mut completed: Vec<CompletedStep> = Vec::new();

        for step in &plan.steps {
            let params = resolve_params(step, &outputs)
                .map_err(|e| after_completed(e, FaultKind::Other, step, &completed))?;
            debug!(
                call_id = %ctx.call_id,
                step = %step.label,
                operation = %step.operation,
                "Calling remote operation"
            );

            let result = tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    warn!(call_id = %ctx.call_id, step = %step.label, "Remote call abandoned");
                    let err = BridgeError::Cancelled { remote: true };
                    return Err(after_completed(err, FaultKind::Other, step, &completed));
                }
                _ = sleep_until(deadline) => {
                    warn!(call_id = %ctx.call_id, step = %step.label, "Remote call timed out");
                    let err = BridgeError::InvocationTimeout {
                        program: step.operation.clone(),
                        timeout_ms: ctx.timeout_ms(),
                    };
                    return Err(after_completed(err, FaultKind::Network, step, &completed));
                }
                result = self.client.call(&step.operation, &params) => result,
            };

            match result {
                Ok(output) => {
                    completed.push(CompletedStep {
                        label: step.label.clone(),
                        id: output.get("id").and_then(Value::as_str).map(str::to_string),
                    });
                    outputs.insert(step.label.as_str(), output);
                }
                Err(mut fault) => {
                    if plan.is_composite() {
                        fault.step = Some(step.label.clone());
                        fault.completed = completed;
                    }
                    warn!(
                        call_id = %ctx.call_id,
                        step = %step.label,
                        kind = fault.kind.as_str(),
                        "Remote operation failed"
                    );
                    return Err(BridgeError::RemoteCall(fault));
                }
            }
        }

        let result_label = plan
            .result_step
            .as_deref()
            .or_else(|| plan.steps.last().map(|s| s.label.as_str()))
            .unwrap_or_default();
        outputs
            .remove(result_label)
            .ok_or_else(|| BridgeError::Plan(format!("no step labelled '{}'", result_label)))
    }
}

/// Once a step has persisted, any later failure must say so. The original
/// error becomes the message of a fault that names the failing step.
fn after_completed(
    err: BridgeError,
    kind: FaultKind,
    step: &RemoteStep,
    completed: &[CompletedStep],
) -> BridgeError {
    if completed.is_empty() {
        return err;
    }
    let mut fault = RemoteFault::new(kind, err.to_string());
    fault.step = Some(step.label.clone());
    fault.completed = completed.to_vec();
    BridgeError::RemoteCall(fault)
}

fn resolve_params(step: &RemoteStep, outputs: &HashMap<&str, Value>) -> Result<Value, BridgeError> {
    let mut params = Map::new();
    for (name, binding) in &step.params {
        let value = match binding {
            Binding::Literal(value) => value.clone(),
            Binding::FromStep { step: from, pointer } => outputs
                .get(from.as_str())
                .and_then(|output| output.pointer(pointer))
                .cloned()
                .ok_or_else(|| {
                    BridgeError::Plan(format!(
                        "step '{}' needs {}{} which is not available",
                        step.label, from, pointer
                    ))
                })?,
        };
        params.insert(name.clone(), value);
    }
    Ok(Value::Object(params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct ScriptedClient {
        calls: Mutex<Vec<(String, Value)>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl RemoteClient for ScriptedClient {
        async fn call(&self, operation: &str, params: &Value) -> Result<Value, RemoteFault> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((operation.to_string(), params.clone()));
                calls.len()
            };
            if self.fail_on == Some(operation) {
                return Err(RemoteFault::new(FaultKind::InvalidRequest, "rejected"));
            }
            Ok(json!({"id": format!("obj_{}", n), "operation": operation}))
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("test", Duration::from_secs(5), CancellationToken::new())
    }

    fn two_step_plan() -> RemoteCallPlan {
        RemoteCallPlan::new()
            .step(RemoteStep::new("parent", "parents.create").literal("name", json!("p")))
            .step(
                RemoteStep::new("child", "children.create")
                    .bind("parent", "parent", "/id")
                    .literal("qty", json!(1)),
            )
    }

    #[tokio::test]
    async fn test_later_step_binds_earlier_output() {
        let client = Arc::new(ScriptedClient {
            calls: Mutex::new(Vec::new()),
            fail_on: None,
        });
        let invoker = RemoteInvoker::new(client.clone());

        let out = invoker.execute(&two_step_plan(), &ctx()).await.unwrap();
        assert_eq!(out["operation"], "children.create");

        let calls = client.calls.lock().unwrap();
        assert_eq!(calls[1].1, json!({"parent": "obj_1", "qty": 1}));
    }

    #[tokio::test]
    async fn test_result_step_selects_output() {
        let client = Arc::new(ScriptedClient {
            calls: Mutex::new(Vec::new()),
            fail_on: None,
        });
        let invoker = RemoteInvoker::new(client);
        let plan = two_step_plan().result_of("parent");
        let out = invoker.execute(&plan, &ctx()).await.unwrap();
        assert_eq!(out["id"], "obj_1");
    }

    #[tokio::test]
    async fn test_failure_reports_completed_steps() {
        let client = Arc::new(ScriptedClient {
            calls: Mutex::new(Vec::new()),
            fail_on: Some("children.create"),
        });
        let invoker = RemoteInvoker::new(client);

        let err = invoker.execute(&two_step_plan(), &ctx()).await.unwrap_err();
        match err {
            BridgeError::RemoteCall(fault) => {
                assert_eq!(fault.step.as_deref(), Some("child"));
                assert_eq!(fault.completed.len(), 1);
                assert_eq!(fault.completed[0].id.as_deref(), Some("obj_1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let client = Arc::new(ScriptedClient {
            calls: Mutex::new(Vec::new()),
            fail_on: None,
        });
        let invoker = RemoteInvoker::new(client);
        let ctx = ctx();
        ctx.cancel.cancel();

        let err = invoker.execute(&two_step_plan(), &ctx).await.unwrap_err();
        assert_eq!(err, BridgeError::Cancelled { remote: true });
    }

    #[tokio::test]
    async fn test_empty_plan_rejected() {
        let client = Arc::new(ScriptedClient {
            calls: Mutex::new(Vec::new()),
            fail_on: None,
        });
        let invoker = RemoteInvoker::new(client);
        let err = invoker.execute(&RemoteCallPlan::new(), &ctx()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Plan(_)));
    }

    struct StalledClient;

    #[async_trait]
    impl RemoteClient for StalledClient {
        async fn call(&self, _operation: &str, _params: &Value) -> Result<Value, RemoteFault> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_stalled_call_times_out() {
        let invoker = RemoteInvoker::new(Arc::new(StalledClient));
        let ctx = ExecutionContext::new("test", Duration::from_millis(50), CancellationToken::new());
        let plan = RemoteCallPlan::single("balance.retrieve", serde_json::Map::new());

        let err = invoker.execute(&plan, &ctx).await.unwrap_err();
        assert_eq!(
            err,
            BridgeError::InvocationTimeout {
                program: "balance.retrieve".into(),
                timeout_ms: 50
            }
        );
    }

    /// Completes `parents.create` at once and stalls on every other operation.
    struct StallAfterFirst;

    #[async_trait]
    impl RemoteClient for StallAfterFirst {
        async fn call(&self, operation: &str, _params: &Value) -> Result<Value, RemoteFault> {
            if operation == "parents.create" {
                return Ok(json!({"id": "par_1"}));
            }
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Value::Null)
        }
    }

    fn expect_persisted_parent(err: BridgeError, kind: FaultKind) -> String {
        match &err {
            BridgeError::RemoteCall(fault) => {
                assert_eq!(fault.kind, kind);
                assert_eq!(fault.step.as_deref(), Some("child"));
                assert_eq!(
                    fault.completed,
                    vec![CompletedStep {
                        label: "parent".into(),
                        id: Some("par_1".into())
                    }]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let msg = err.to_string();
        assert!(msg.contains("parent (par_1)"), "{}", msg);
        assert!(msg.contains("NOT rolled back"), "{}", msg);
        msg
    }

    #[tokio::test]
    async fn test_timeout_on_later_step_reports_completed_steps() {
        let invoker = RemoteInvoker::new(Arc::new(StallAfterFirst));
        let ctx = ExecutionContext::new("test", Duration::from_millis(100), CancellationToken::new());

        let err = invoker.execute(&two_step_plan(), &ctx).await.unwrap_err();
        let msg = expect_persisted_parent(err, FaultKind::Network);
        assert!(msg.contains("timed out after 100ms"), "{}", msg);
    }

    #[tokio::test]
    async fn test_cancel_on_later_step_reports_completed_steps() {
        let invoker = RemoteInvoker::new(Arc::new(StallAfterFirst));
        let ctx = ctx();
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let err = invoker.execute(&two_step_plan(), &ctx).await.unwrap_err();
        let msg = expect_persisted_parent(err, FaultKind::Other);
        assert!(msg.contains("Call cancelled by caller"), "{}", msg);
    }

    #[tokio::test]
    async fn test_unresolved_binding_on_later_step_reports_completed_steps() {
        let invoker = RemoteInvoker::new(Arc::new(StallAfterFirst));
        let plan = RemoteCallPlan::new()
            .step(RemoteStep::new("parent", "parents.create"))
            .step(RemoteStep::new("child", "children.create").bind("parent", "parent", "/missing"));

        let err = invoker.execute(&plan, &ctx()).await.unwrap_err();
        let msg = expect_persisted_parent(err, FaultKind::Other);
        assert!(msg.contains("parent/missing"), "{}", msg);
    }
}
