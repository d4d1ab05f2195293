use rlimit::{setrlimit, Resource};
use serde::Deserialize;

/// Per-process resource ceilings applied in the child before exec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub cpu_seconds: Option<u64>,
    pub file_size_bytes: Option<u64>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self.cpu_seconds.is_none() && self.file_size_bytes.is_none()
    }

    /// Runs in the forked child; only issues `setrlimit` calls.
    pub fn apply(&self) -> std::io::Result<()> {
        if let Some(cpu) = self.cpu_seconds {
            setrlimit(Resource::CPU, cpu, cpu)?;
        }
        if let Some(size) = self.file_size_bytes {
            setrlimit(Resource::FSIZE, size, size)?;
        }
        Ok(())
    }
}
