use std::path::{Path, PathBuf};
use tempfile::TempDir;
use toolbridge_core::ScratchInput;

const FALLBACK_NAME: &str = "input";

/// A file holding inline content for programs that only read from a path.
///
/// Lives in its own temporary directory so the requested file name can be
/// used as is. The directory is removed when the value is dropped.
#[derive(Debug)]
pub struct ScratchFile {
    _dir: TempDir,
    path: PathBuf,
}

impl ScratchFile {
    pub async fn create(input: &ScratchInput) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("toolbridge-").tempdir()?;
        let path = dir.path().join(safe_file_name(&input.file_name));
        tokio::fs::write(&path, input.contents.as_bytes()).await?;
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Last path component only, never empty, never `.` or `..`.
fn safe_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    match cleaned.as_str() {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        _ => cleaned,
    }
}
