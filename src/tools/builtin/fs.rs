use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{optional_str, required_str};
use crate::safety::SafetyLayer;
use crate::tools::{Tool, ToolContext, ToolDefinition, ToolResult};

/// Reads resolve against the workspace but are not confined to it.
pub struct ReadFile {
    safety: Arc<SafetyLayer>,
}

impl ReadFile {
    pub fn new(safety: Arc<SafetyLayer>) -> Self {
        Self { safety }
    }
}

#[async_trait]
impl Tool for ReadFile {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "read_file",
            "read_file",
            "Read a text file. The path may be relative to the workspace or absolute.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path, relative to workspace or absolute" }
            },
            "required": ["path"]
        }))
    }

    async fn execute(&self, args: &Map<String, Value>, _ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let path = self.safety.workspace().resolve(required_str(args, "path")?);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(ToolResult::ok(json!({ "path": path, "content": content })))
    }
}

pub struct ListDirectory {
    safety: Arc<SafetyLayer>,
}

impl ListDirectory {
    pub fn new(safety: Arc<SafetyLayer>) -> Self {
        Self { safety }
    }
}

#[async_trait]
impl Tool for ListDirectory {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "list_directory",
            "list_directory",
            "List the entries of a directory (defaults to the workspace root).",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory path, relative to workspace or absolute" }
            }
        }))
    }

    async fn execute(&self, args: &Map<String, Value>, _ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let path = self.safety.workspace().resolve(optional_str(args, "path").unwrap_or("."));
        let mut reader = tokio::fs::read_dir(&path)
            .await
            .with_context(|| format!("failed to list {}", path.display()))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let kind = match entry.file_type().await {
                Ok(t) if t.is_dir() => "dir",
                Ok(t) if t.is_symlink() => "symlink",
                Ok(_) => "file",
                Err(_) => "unknown",
            };
            entries.push((entry.file_name().to_string_lossy().into_owned(), kind));
        }
        entries.sort();

        let entries: Vec<Value> = entries
            .into_iter()
            .map(|(name, kind)| json!({ "name": name, "kind": kind }))
            .collect();
        Ok(ToolResult::ok(json!({ "path": path, "entries": entries })))
    }
}

pub struct WriteFile {
    safety: Arc<SafetyLayer>,
}

impl WriteFile {
    pub fn new(safety: Arc<SafetyLayer>) -> Self {
        Self { safety }
    }
}

#[async_trait]
impl Tool for WriteFile {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "write_file",
            "write_file",
            "Write content to a file inside the workspace, creating parent directories. \
             Writes outside the workspace are rejected.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path relative to the workspace root" },
                "content": { "type": "string", "description": "Content to write" }
            },
            "required": ["path", "content"]
        }))
    }

    async fn execute(&self, args: &Map<String, Value>, _ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let content = required_str(args, "content")?;
        let target = match self.safety.workspace().resolve_write(required_str(args, "path")?) {
            Ok(target) => target,
            Err(e) => return Ok(ToolResult::failure(e.to_string())),
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&target, content)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;

        Ok(ToolResult::ok(json!({ "path": target, "written_bytes": content.len() })))
    }
}

/// Replace exactly one occurrence of `old_string`.
pub struct EditFile {
    safety: Arc<SafetyLayer>,
}

impl EditFile {
    pub fn new(safety: Arc<SafetyLayer>) -> Self {
        Self { safety }
    }
}

#[async_trait]
impl Tool for EditFile {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "edit_file",
            "edit_file",
            "Replace one unique occurrence of `old_string` with `new_string` in a workspace file.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "old_string": { "type": "string", "description": "Exact text to replace; must occur once" },
                "new_string": { "type": "string" }
            },
            "required": ["path", "old_string", "new_string"]
        }))
    }

    async fn execute(&self, args: &Map<String, Value>, _ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let old = required_str(args, "old_string")?;
        let new = required_str(args, "new_string")?;
        if old.is_empty() {
            return Ok(ToolResult::failure("edit_file: 'old_string' must not be empty"));
        }
        let target = match self.safety.workspace().resolve_write(required_str(args, "path")?) {
            Ok(target) => target,
            Err(e) => return Ok(ToolResult::failure(e.to_string())),
        };

        let original = tokio::fs::read_to_string(&target)
            .await
            .with_context(|| format!("failed to read {}", target.display()))?;
        match original.matches(old).count() {
            0 => return Ok(ToolResult::failure("edit_file: 'old_string' not found")),
            1 => {}
            n => {
                return Ok(ToolResult::failure(format!(
                    "edit_file: 'old_string' occurs {n} times; include more context"
                )));
            }
        }

        let updated = original.replacen(old, new, 1);
        tokio::fs::write(&target, &updated)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;
        Ok(ToolResult::ok(json!({ "path": target, "replacements": 1 })))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{ctx, safety};
    use super::*;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn write_then_read_inside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let s = safety(dir.path());

        let written = WriteFile::new(s.clone())
            .execute(&args(json!({"path": "notes/a.txt", "content": "hello"})), &ctx())
            .await
            .unwrap();
        assert!(written.success);
        assert_eq!(written.data["written_bytes"], 5);

        let read = ReadFile::new(s)
            .execute(&args(json!({"path": "notes/a.txt"})), &ctx())
            .await
            .unwrap();
        assert_eq!(read.data["content"], "hello");
    }

    #[tokio::test]
    async fn write_outside_workspace_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("x.txt");

        let result = WriteFile::new(safety(dir.path()))
            .execute(
                &args(json!({"path": target.to_string_lossy(), "content": "nope"})),
                &ctx(),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn missing_argument_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReadFile::new(safety(dir.path()))
            .execute(&Map::new(), &ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'path'"));
    }

    #[tokio::test]
    async fn edit_requires_a_unique_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "one two two").unwrap();
        let tool = EditFile::new(safety(dir.path()));

        let dup = tool
            .execute(&args(json!({"path": "f.txt", "old_string": "two", "new_string": "2"})), &ctx())
            .await
            .unwrap();
        assert!(!dup.success);

        let ok = tool
            .execute(&args(json!({"path": "f.txt", "old_string": "one", "new_string": "1"})), &ctx())
            .await
            .unwrap();
        assert!(ok.success);
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "1 two two");
    }

    #[tokio::test]
    async fn lists_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();

        let result = ListDirectory::new(safety(dir.path()))
            .execute(&Map::new(), &ctx())
            .await
            .unwrap();
        let entries = result.data["entries"].as_array().unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e["name"].as_str().unwrap()).collect();
        assert!(names.starts_with(&["a", "b.txt"]));
        assert_eq!(entries[0]["kind"], "dir");
    }
}
