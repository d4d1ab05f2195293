use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use toolbridge_core::{
    ArgToken, BridgeError, ExecutionContext, ProcessOutput, ProgramInvocation, SubprocessInvoker,
};

use crate::guard::ProgramGuard;
use crate::limits::ResourceLimits;
use crate::scratch::ScratchFile;

pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;
const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

fn default_env_passthrough() -> Vec<String> {
    ["HOME", "PATH"].iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub allowed_programs: Vec<String>,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Variables copied from the bridge's environment; everything else is cleared.
    #[serde(default = "default_env_passthrough")]
    pub env_passthrough: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub limits: ResourceLimits,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            allowed_programs: Vec::new(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            env_passthrough: default_env_passthrough(),
            working_dir: None,
            limits: ResourceLimits::default(),
        }
    }
}

/// Spawns allow-listed programs directly, with no shell in between.
///
/// The child gets a cleared environment, a null stdin and its own process
/// group. On timeout, capture overflow or cancellation the whole group is
/// killed before the call returns.
pub struct ProcessInvoker {
    config: ExecutorConfig,
    guard: ProgramGuard,
}

impl ProcessInvoker {
    pub fn new(config: ExecutorConfig) -> Self {
        let guard = ProgramGuard::new(config.allowed_programs.clone());
        Self { config, guard }
    }

    fn command(&self, invocation: &ProgramInvocation, args: Vec<String>) -> Command {
        let mut cmd = Command::new(invocation.program);
        cmd.args(args).env_clear();

        for name in &self.config.env_passthrough {
            if let Ok(value) = std::env::var(name) {
                cmd.env(name, value);
            }
        }
        if std::env::var_os("PATH").is_none()
            || !self.config.env_passthrough.iter().any(|n| n == "PATH")
        {
            cmd.env("PATH", FALLBACK_PATH);
        }

        if let Some(dir) = invocation
            .working_dir
            .as_ref()
            .or(self.config.working_dir.as_ref())
        {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            let limits = self.config.limits;
            unsafe {
                cmd.pre_exec(move || {
                    libc::setsid();
                    limits.apply()
                });
            }
        }

        cmd
    }
}

#[async_trait]
impl SubprocessInvoker for ProcessInvoker {
    async fn invoke(
        &self,
        invocation: &ProgramInvocation,
        ctx: &ExecutionContext,
    ) -> Result<ProcessOutput, BridgeError> {
        self.guard.check(invocation)?;
        let program = invocation.program;

        // Held until the function returns, so the file outlives the child.
        let scratch = match &invocation.scratch {
            Some(input) => Some(ScratchFile::create(input).await.map_err(|e| {
                BridgeError::Plan(format!("could not create scratch file: {}", e))
            })?),
            None => None,
        };

        let args = invocation
            .args
            .iter()
            .map(|token| match token {
                ArgToken::Value(value) => value.clone(),
                ArgToken::ScratchPath => scratch
                    .as_ref()
                    .map(|s| s.path().to_string_lossy().into_owned())
                    .unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        debug!(
            call_id = %ctx.call_id,
            program,
            argc = args.len(),
            "Spawning program"
        );

        let mut child = self
            .command(invocation, args)
            .spawn()
            .map_err(|e| BridgeError::Subprocess {
                program: program.to_string(),
                code: None,
                stderr: format!("failed to start '{}': {}", program, e),
            })?;
        let pid = child.id();
        let limit = invocation
            .max_output_bytes
            .unwrap_or(self.config.max_output_bytes);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let outcome = {
            let run = async {
                let (out, err) = tokio::try_join!(
                    read_capped(stdout, limit, "stdout", program),
                    read_capped(stderr, limit, "stderr", program),
                )?;
                let status = child.wait().await.map_err(|e| BridgeError::Subprocess {
                    program: program.to_string(),
                    code: None,
                    stderr: format!("failed to wait for '{}': {}", program, e),
                })?;
                Ok::<_, BridgeError>((out, err, status))
            };

            tokio::select! {
                result = timeout(ctx.timeout, run) => match result {
                    Ok(inner) => inner,
                    Err(_) => Err(BridgeError::InvocationTimeout {
                        program: program.to_string(),
                        timeout_ms: ctx.timeout_ms(),
                    }),
                },
                _ = ctx.cancel.cancelled() => Err(BridgeError::Cancelled { remote: false }),
            }
        };

        match outcome {
            Ok((out, err, status)) => {
                debug!(call_id = %ctx.call_id, program, code = ?status.code(), "Program exited");
                Ok(ProcessOutput {
                    program: program.to_string(),
                    code: status.code(),
                    stdout: decode_lossy(out, "stdout", program, ctx),
                    stderr: decode_lossy(err, "stderr", program, ctx),
                })
            }
            Err(e) => {
                warn!(call_id = %ctx.call_id, program, "Terminating program: {}", e);
                terminate_group(pid);
                let _ = child.start_kill();
                let _ = child.wait().await;
                drop(scratch);
                Err(e)
            }
        }
    }
}

/// Invalid UTF-8 is replaced with U+FFFD; the replacement is logged.
fn decode_lossy(bytes: Vec<u8>, stream: &'static str, program: &str, ctx: &ExecutionContext) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!(
                call_id = %ctx.call_id,
                program,
                stream,
                valid_up_to = e.utf8_error().valid_up_to(),
                "Replaced invalid UTF-8 in captured output"
            );
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}

/// Read at most `limit` bytes; one byte more is an overflow.
async fn read_capped<R>(
    reader: Option<R>,
    limit: usize,
    stream: &'static str,
    program: &str,
) -> Result<Vec<u8>, BridgeError>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };

    let mut buf = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    reader
        .take(cap)
        .read_to_end(&mut buf)
        .await
        .map_err(|e| BridgeError::Subprocess {
            program: program.to_string(),
            code: None,
            stderr: format!("failed to read {} of '{}': {}", stream, program, e),
        })?;

    if buf.len() > limit {
        return Err(BridgeError::CaptureOverflow {
            program: program.to_string(),
            stream,
            limit,
        });
    }
    Ok(buf)
}

#[cfg(unix)]
fn terminate_group(pid: Option<u32>) {
    if let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) {
        unsafe {
            libc::killpg(pid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn terminate_group(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_empty_yaml_shape() {
        let config: ExecutorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_output_bytes, DEFAULT_MAX_OUTPUT_BYTES);
        assert_eq!(config.env_passthrough, vec!["HOME", "PATH"]);
        assert!(config.allowed_programs.is_empty());
        assert!(config.limits.is_empty());
    }

    #[tokio::test]
    async fn test_read_capped_boundary() {
        let exact: &[u8] = b"abcd";
        assert_eq!(read_capped(Some(exact), 4, "stdout", "p").await.unwrap(), b"abcd");

        let over: &[u8] = b"abcde";
        let err = read_capped(Some(over), 4, "stdout", "p").await.unwrap_err();
        assert_eq!(
            err,
            BridgeError::CaptureOverflow {
                program: "p".into(),
                stream: "stdout",
                limit: 4
            }
        );
    }
}
