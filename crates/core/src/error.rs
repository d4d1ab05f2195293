use std::fmt;
use thiserror::Error;

use crate::types::ParamType;

/// Every failure a call can end in. Each variant becomes the message of a
/// `Failure` envelope via its `Display` impl.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Validation error: parameter '{param}' {rule}")]
    Validation { param: String, rule: ValidationRule },

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("Invocation of '{program}' timed out after {timeout_ms}ms")]
    InvocationTimeout { program: String, timeout_ms: u64 },

    #[error("Captured {stream} of '{program}' exceeded {limit} bytes")]
    CaptureOverflow {
        program: String,
        stream: &'static str,
        limit: usize,
    },

    /// Rendered as the captured stderr, unmodified.
    #[error("{}", subprocess_message(.program, .code, .stderr))]
    Subprocess {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Output decode error: {0}")]
    OutputDecode(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    RemoteCall(RemoteFault),

    #[error("Call cancelled by caller{}", cancel_note(.remote))]
    Cancelled { remote: bool },
}

impl BridgeError {
    pub fn validation(param: impl Into<String>, rule: ValidationRule) -> Self {
        Self::Validation {
            param: param.into(),
            rule,
        }
    }

    /// Stable, lowercase name of the variant, used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::Validation { .. } => "validation",
            Self::Plan(_) => "plan",
            Self::InvocationTimeout { .. } => "invocation_timeout",
            Self::CaptureOverflow { .. } => "capture_overflow",
            Self::Subprocess { .. } => "subprocess",
            Self::OutputDecode(_) => "output_decode",
            Self::NotFound(_) => "not_found",
            Self::RemoteCall(_) => "remote_call",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

fn subprocess_message(program: &str, code: &Option<i32>, stderr: &str) -> String {
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match code {
        Some(code) => format!("'{}' exited with status {}", program, code),
        None => format!("'{}' was terminated by a signal", program),
    }
}

fn cancel_note(remote: &bool) -> &'static str {
    if *remote {
        "; the remote system may still complete the operation"
    } else {
        ""
    }
}

/// The rule a parameter broke during validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationRule {
    Missing,
    WrongType {
        expected: ParamType,
        found: &'static str,
    },
    NotInteger,
    WrongItemType {
        index: usize,
        expected: ParamType,
        found: &'static str,
    },
    NotAllowed {
        allowed: Vec<String>,
        found: String,
    },
    /// Well-typed but not in the expected textual form.
    BadFormat {
        expected: &'static str,
        found: String,
    },
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "is required but was not provided"),
            Self::WrongType { expected, found } => {
                write!(f, "must be of type {} (got {})", expected, found)
            }
            Self::NotInteger => write!(f, "must be a whole number"),
            Self::WrongItemType {
                index,
                expected,
                found,
            } => write!(
                f,
                "item {} must be of type {} (got {})",
                index, expected, found
            ),
            Self::NotAllowed { allowed, found } => {
                write!(f, "must be one of [{}] (got {})", allowed.join(", "), found)
            }
            Self::BadFormat { expected, found } => {
                write!(f, "must be {} (got {:?})", expected, found)
            }
        }
    }
}

/// Coarse classification of a remote-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Authentication,
    RateLimited,
    InvalidRequest,
    NotFound,
    Network,
    Server,
    Other,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::RateLimited => "rate_limited",
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::Network => "network",
            Self::Server => "server",
            Self::Other => "other",
        }
    }
}

/// A step of a composite remote operation that finished before a later one failed.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedStep {
    pub label: String,
    pub id: Option<String>,
}

/// Fault raised by a remote client, enriched by the remote invoker with
/// the failing step and whatever already happened server-side.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFault {
    pub kind: FaultKind,
    pub message: String,
    pub step: Option<String>,
    pub completed: Vec<CompletedStep>,
}

impl RemoteFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            step: None,
            completed: Vec::new(),
        }
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(
                f,
                "Remote call failed at step '{}' ({}): {}",
                step,
                self.kind.as_str(),
                self.message
            )?,
            None => write!(
                f,
                "Remote call failed ({}): {}",
                self.kind.as_str(),
                self.message
            )?,
        }

        if !self.completed.is_empty() {
            let done: Vec<String> = self
                .completed
                .iter()
                .map(|s| match &s.id {
                    Some(id) => format!("{} ({})", s.label, id),
                    None => s.label.clone(),
                })
                .collect();
            write!(
                f,
                ". Earlier steps completed and were NOT rolled back: {}",
                done.join(", ")
            )?;
        }
        Ok(())
    }
}

impl From<RemoteFault> for BridgeError {
    fn from(fault: RemoteFault) -> Self {
        Self::RemoteCall(fault)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subprocess_message_is_stderr_verbatim() {
        let err = BridgeError::Subprocess {
            program: "gh".into(),
            code: Some(1),
            stderr: "  could not resolve to a Repository\n".into(),
        };
        assert_eq!(err.to_string(), "  could not resolve to a Repository\n");
    }

    #[test]
    fn test_subprocess_message_without_stderr() {
        let err = BridgeError::Subprocess {
            program: "gh".into(),
            code: Some(4),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "'gh' exited with status 4");
    }

    #[test]
    fn test_validation_message_names_parameter() {
        let err = BridgeError::validation("repo", ValidationRule::Missing);
        assert_eq!(
            err.to_string(),
            "Validation error: parameter 'repo' is required but was not provided"
        );
    }

    #[test]
    fn test_remote_fault_lists_persisted_steps() {
        let mut fault = RemoteFault::new(FaultKind::InvalidRequest, "amount must be positive");
        fault.step = Some("line_item_2".into());
        fault.completed = vec![
            CompletedStep {
                label: "create_invoice".into(),
                id: Some("in_1".into()),
            },
            CompletedStep {
                label: "line_item_1".into(),
                id: Some("ii_1".into()),
            },
        ];
        let msg = BridgeError::RemoteCall(fault).to_string();
        assert!(msg.contains("step 'line_item_2'"));
        assert!(msg.contains("create_invoice (in_1)"));
        assert!(msg.contains("NOT rolled back"));
    }
}
