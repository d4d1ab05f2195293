use async_trait::async_trait;
use serde_json::Value;

use crate::error::{BridgeError, RemoteFault};
use crate::execution_context::ExecutionContext;
use crate::types::ProgramInvocation;

/// What a finished program left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    pub program: String,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout of a zero exit, otherwise a `Subprocess` error carrying stderr verbatim.
    pub fn into_stdout(self) -> Result<String, BridgeError> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(BridgeError::Subprocess {
                program: self.program,
                code: self.code,
                stderr: self.stderr,
            })
        }
    }
}

/// Runs an allow-listed program with an explicit argument vector.
///
/// Implementations report timeouts, capture overflow, cancellation and
/// launch failures as errors, and hand back the exit status otherwise.
#[async_trait]
pub trait SubprocessInvoker: Send + Sync {
    async fn invoke(
        &self,
        invocation: &ProgramInvocation,
        ctx: &ExecutionContext,
    ) -> Result<ProcessOutput, BridgeError>;
}

/// A single operation against the remote system.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn call(&self, operation: &str, params: &Value) -> Result<Value, RemoteFault>;
}
