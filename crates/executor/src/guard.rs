use thiserror::Error;
use toolbridge_core::{ArgToken, BridgeError, ProgramInvocation};

#[derive(Debug, Error, PartialEq)]
pub enum ExecutorError {
    #[error("Program not allowed: {0}")]
    NotAllowed(String),
    #[error("Argument {0} contains a NUL byte")]
    NulByte(usize),
    #[error("Argument {0} refers to a scratch file but the call has none")]
    MissingScratch(usize),
}

impl From<ExecutorError> for BridgeError {
    fn from(e: ExecutorError) -> Self {
        BridgeError::Plan(e.to_string())
    }
}

/// Allow-list check run before anything is spawned.
#[derive(Debug, Clone)]
pub struct ProgramGuard {
    allowed: Vec<String>,
}

impl ProgramGuard {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    pub fn check(&self, invocation: &ProgramInvocation) -> Result<(), ExecutorError> {
        if !self.allowed.iter().any(|p| p == invocation.program) {
            return Err(ExecutorError::NotAllowed(invocation.program.to_string()));
        }

        for (idx, token) in invocation.args.iter().enumerate() {
            match token {
                ArgToken::Value(value) if value.contains('\0') => {
                    return Err(ExecutorError::NulByte(idx));
                }
                ArgToken::ScratchPath if invocation.scratch.is_none() => {
                    return Err(ExecutorError::MissingScratch(idx));
                }
                _ => {}
            }
        }

        Ok(())
    }
}
