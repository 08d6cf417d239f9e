use std::path::{Path, PathBuf};

use crate::error::GuardrailError;

/// Keeps file-writing tools inside the workspace.
/// Reads resolve relative to the workspace but are not restricted.
pub struct WorkspaceGuard {
    /// Absolute, symlink-resolved workspace root.
    canonical_root: PathBuf,
}

impl WorkspaceGuard {
    /// Create the workspace directory if needed and resolve its canonical path.
    pub fn new(workspace_path: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(workspace_path)?;
        let canonical_root = std::fs::canonicalize(workspace_path)?;
        Ok(Self { canonical_root })
    }

    pub fn canonical_root(&self) -> &Path {
        &self.canonical_root
    }

    /// Resolve a tool-supplied path: relative paths are joined onto the root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.canonical_root.join(p)
        }
    }

    /// Check whether a write to `target` stays inside the workspace.
    ///
    /// Symlinks are resolved through the deepest existing ancestor, so a link
    /// pointing outside the root is rejected even when the final file is new.
    /// A path whose missing part ends in `..` is rejected outright.
    pub fn is_write_allowed(&self, target: &Path) -> std::io::Result<bool> {
        let mut existing = target.to_path_buf();
        let mut tail: Vec<std::ffi::OsString> = Vec::new();
        while !existing.exists() {
            match (existing.file_name(), existing.parent()) {
                (Some(name), Some(parent)) => {
                    tail.push(name.to_os_string());
                    existing = parent.to_path_buf();
                }
                _ => return Ok(false),
            }
        }

        let mut canonical = std::fs::canonicalize(&existing)?;
        for name in tail.iter().rev() {
            canonical.push(name);
        }

        Ok(canonical.starts_with(&self.canonical_root))
    }

    /// Resolve `path` for writing, rejecting targets outside the workspace.
    pub fn resolve_write(&self, path: &str) -> Result<PathBuf, GuardrailError> {
        let target = self.resolve(path);
        match self.is_write_allowed(&target) {
            Ok(true) => Ok(target),
            _ => Err(GuardrailError::WriteOutsideWorkspace {
                path: target,
                workspace: self.canonical_root.clone(),
            }),
        }
    }
}
