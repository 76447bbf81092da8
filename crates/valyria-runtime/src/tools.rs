use async_trait::async_trait;
use globset::GlobBuilder;
use serde_json::{Value, json};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use valyria_config::schema::ToolsConfig;
use valyria_core::{Result, Tool, ToolCall, ToolExecutor, ToolResult, ValyriaError};
use walkdir::WalkDir;

/// File and command tools confined to the workspace root.
///
/// Reads may touch anything under the root, writes only the configured
/// write directories. Every outcome, including a refusal, is a JSON object
/// with `success` and `error` that is handed back to the model verbatim.
#[derive(Debug, Clone)]
pub struct WorkspaceTools {
    root: PathBuf,
    config: ToolsConfig,
}

impl WorkspaceTools {
    pub fn new(config: ToolsConfig) -> Result<Self> {
        let root = std::fs::canonicalize(&config.root).map_err(|e| {
            ValyriaError::Config(format!("tools.root '{}': {e}", config.root.display()))
        })?;
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a user-supplied path against the root. `None` when the path
    /// escapes the root.
    fn resolve(&self, raw: &str) -> Option<PathBuf> {
        let candidate = Path::new(raw);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return None;
                    }
                }
                Component::CurDir => {}
                other => normalized.push(other.as_os_str()),
            }
        }

        let resolved = canonicalize_existing(&normalized)?;
        resolved.starts_with(&self.root).then_some(resolved)
    }

    fn write_denial(&self, path: &Path) -> Option<String> {
        let in_write_dir = self
            .config
            .write_dirs
            .iter()
            .any(|dir| path.starts_with(self.root.join(dir)));
        if !in_write_dir {
            return Some(format!(
                "writes are limited to: {}",
                self.config.write_dirs.join(", ")
            ));
        }
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))?;
        self.config
            .forbidden_extensions
            .iter()
            .any(|f| f.eq_ignore_ascii_case(&ext))
            .then(|| format!("Forbidden extension: {ext}"))
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    fn truncate(&self, text: &str) -> String {
        text.chars().take(self.config.max_output_chars).collect()
    }

    async fn read_file(&self, args: &Value) -> Result<Value> {
        let raw = required_str(args, "read_file", "path")?;
        let base = json!({ "path": raw, "content": null });

        let Some(path) = self.resolve(raw) else {
            warn!(path = raw, "read outside workspace root denied");
            return Ok(failure(base, format!("Access denied: {raw}")));
        };
        if !path.exists() {
            return Ok(failure(base, format!("File not found: {raw}")));
        }
        if !path.is_file() {
            return Ok(failure(base, format!("Not a file: {raw}")));
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let size = content.chars().count();
                info!(path = %path.display(), size, "read file");
                Ok(json!({
                    "success": true,
                    "path": self.relative(&path),
                    "content": self.truncate(&content),
                    "size": size,
                    "truncated": size > self.config.max_output_chars,
                    "error": null,
                }))
            }
            Err(e) => Ok(failure(base, format!("Error reading {raw}: {e}"))),
        }
    }

    async fn write_file(&self, args: &Value) -> Result<Value> {
        let raw = required_str(args, "write_file", "path")?;
        let content = required_str(args, "write_file", "content")?;
        let mode = args["mode"].as_str().unwrap_or("w");
        let base = json!({ "path": raw });

        if mode != "w" && mode != "a" {
            return Ok(failure(base, format!("Invalid mode '{mode}': use 'w' or 'a'")));
        }
        let Some(path) = self.resolve(raw) else {
            warn!(path = raw, "write outside workspace root denied");
            return Ok(failure(base, format!("Write access denied: {raw}")));
        };
        if let Some(reason) = self.write_denial(&path) {
            warn!(path = raw, %reason, "write denied");
            return Ok(failure(base, format!("Write access denied: {raw} ({reason})")));
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(failure(base, format!("Error creating {}: {e}", parent.display())));
            }
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.create(true);
        if mode == "a" {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }

        let written = async {
            let mut file = options.open(&path).await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                let size = content.chars().count();
                info!(path = %path.display(), size, mode, "wrote file");
                Ok(json!({
                    "success": true,
                    "path": self.relative(&path),
                    "size": size,
                    "mode": mode,
                    "error": null,
                }))
            }
            Err(e) => Ok(failure(base, format!("Error writing {raw}: {e}"))),
        }
    }

    async fn list_files(&self, args: &Value) -> Result<Value> {
        let directory = args["directory"].as_str().unwrap_or(".");
        let pattern = args["pattern"].as_str().unwrap_or("*");
        let base = json!({ "directory": directory, "pattern": pattern, "files": [] });

        let Some(dir) = self.resolve(directory) else {
            warn!(directory, "listing outside workspace root denied");
            return Ok(failure(base, format!("Access denied: {directory}")));
        };
        if !dir.exists() {
            return Ok(failure(base, format!("Directory not found: {directory}")));
        }
        if !dir.is_dir() {
            return Ok(failure(base, format!("Not a directory: {directory}")));
        }

        let matcher = match GlobBuilder::new(pattern).literal_separator(true).build() {
            Ok(glob) => glob.compile_matcher(),
            Err(e) => return Ok(failure(base, format!("Invalid pattern '{pattern}': {e}"))),
        };
        // Without `**` a pattern can only match as deep as it has segments
        let max_depth = if pattern.contains("**") {
            usize::MAX
        } else {
            pattern.split('/').filter(|s| !s.is_empty()).count().max(1)
        };

        let root = self.root.clone();
        let walk_dir = dir.clone();
        let files = tokio::task::spawn_blocking(move || {
            WalkDir::new(&walk_dir)
                .min_depth(1)
                .max_depth(max_depth)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .filter(|entry| {
                    entry
                        .path()
                        .strip_prefix(&walk_dir)
                        .is_ok_and(|rel| matcher.is_match(rel))
                })
                .map(|entry| {
                    let path = entry.path();
                    json!({
                        "name": entry.file_name().to_string_lossy(),
                        "path": path.strip_prefix(&root).unwrap_or(path).to_string_lossy(),
                        "size": entry.metadata().map(|m| m.len()).unwrap_or(0),
                        "extension": path
                            .extension()
                            .map(|e| format!(".{}", e.to_string_lossy()))
                            .unwrap_or_default(),
                    })
                })
                .collect::<Vec<Value>>()
        })
        .await
        .map_err(|e| ValyriaError::ToolExecution {
            tool: "list_files".into(),
            reason: e.to_string(),
        })?;

        info!(directory = %dir.display(), pattern, count = files.len(), "listed files");
        Ok(json!({
            "success": true,
            "directory": self.relative(&dir),
            "pattern": pattern,
            "count": files.len(),
            "files": files,
            "error": null,
        }))
    }

    async fn run_command(&self, args: &Value) -> Result<Value> {
        let command = required_str(args, "run_command", "command")?;
        let timeout_secs = args["timeout"]
            .as_u64()
            .unwrap_or(self.config.default_timeout_secs);
        let base = json!({ "command": command, "output": null, "return_code": -1 });

        let lower = command.to_lowercase();
        if let Some(fragment) = self
            .config
            .forbidden_commands
            .iter()
            .find(|f| lower.contains(f.as_str()))
        {
            warn!(command, fragment = %fragment, "forbidden command denied");
            return Ok(failure(base, format!("Forbidden command: {fragment}")));
        }
        if !self
            .config
            .command_prefixes
            .iter()
            .any(|p| command.starts_with(p.as_str()))
        {
            warn!(command, "command outside whitelist denied");
            return Ok(failure(
                base,
                format!(
                    "Command not in whitelist. Allowed: {}",
                    self.config.command_prefixes.join(", ")
                ),
            ));
        }

        info!(command, timeout_secs, "executing command");
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Ok(failure(base, e.to_string())),
            Err(_) => {
                warn!(command, timeout_secs, "command timed out");
                return Ok(failure(base, format!("Command timed out after {timeout_secs}s")));
            }
        };

        let success = output.status.success();
        let return_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let error = if success {
            Value::Null
        } else {
            json!(self.truncate(&stderr))
        };
        info!(command, return_code, "command finished");

        Ok(json!({
            "success": success,
            "command": command,
            "output": self.truncate(&stdout),
            "error": error,
            "return_code": return_code,
        }))
    }
}

/// Follow symlinks in the longest existing prefix of `path` and re-append
/// the components that do not exist yet. `None` for a dangling symlink,
/// whose target cannot be checked.
fn canonicalize_existing(path: &Path) -> Option<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        match std::fs::canonicalize(existing) {
            Ok(mut base) => {
                base.extend(missing.iter().rev());
                return Some(base);
            }
            Err(_) if existing.symlink_metadata().is_ok() => return None,
            Err(_) => {
                missing.push(existing.file_name()?.to_os_string());
                existing = existing.parent()?;
            }
        }
    }
}

fn required_str<'a>(args: &'a Value, tool: &str, field: &str) -> Result<&'a str> {
    args[field].as_str().ok_or_else(|| ValyriaError::ToolExecution {
        tool: tool.into(),
        reason: format!("missing '{field}' argument"),
    })
}

fn failure(mut base: Value, error: String) -> Value {
    base["success"] = json!(false);
    base["error"] = json!(error);
    base
}

#[async_trait]
impl ToolExecutor for WorkspaceTools {
    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: "read_file".into(),
                description: "Read the contents of a file in the Valyria project".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path to the file (relative to the Valyria root, e.g. 'valyria_core/main.py')"
                        }
                    },
                    "required": ["path"]
                }),
                is_mutating: false,
                risk_level: 1,
            },
            Tool {
                name: "write_file".into(),
                description: "Write or modify a file in the Valyria project. Use this to create new files or update existing ones.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path to the file" },
                        "content": { "type": "string", "description": "Content to write to the file" },
                        "mode": {
                            "type": "string",
                            "enum": ["w", "a"],
                            "description": "Write mode: 'w' to overwrite, 'a' to append (default: 'w')"
                        }
                    },
                    "required": ["path", "content"]
                }),
                is_mutating: true,
                risk_level: 5,
            },
            Tool {
                name: "list_files".into(),
                description: "List files in a directory within the Valyria project".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "directory": { "type": "string", "description": "Directory to list (default: '.')" },
                        "pattern": {
                            "type": "string",
                            "description": "File pattern to match (default: '*', e.g. '*.py', 'data/*.json')"
                        }
                    },
                    "required": []
                }),
                is_mutating: false,
                risk_level: 1,
            },
            Tool {
                name: "run_command".into(),
                description: "Execute a safe shell command (python, pip, pytest, ls, etc.)".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "command": {
                            "type": "string",
                            "description": format!(
                                "Command to execute (must start with: {})",
                                self.config.command_prefixes.iter().map(|p| p.trim()).collect::<Vec<_>>().join(", ")
                            )
                        },
                        "timeout": {
                            "type": "integer",
                            "description": format!("Timeout in seconds (default: {})", self.config.default_timeout_secs)
                        }
                    },
                    "required": ["command"]
                }),
                is_mutating: true,
                risk_level: 6,
            },
        ]
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let outcome = match call.tool_name.as_str() {
            "read_file" => self.read_file(&call.arguments).await?,
            "write_file" => self.write_file(&call.arguments).await?,
            "list_files" => self.list_files(&call.arguments).await?,
            "run_command" => self.run_command(&call.arguments).await?,
            _ => return Err(ValyriaError::ToolNotFound(call.tool_name.clone())),
        };
        Ok(ToolResult {
            tool_call_id: call.id.clone(),
            content: outcome.to_string(),
            is_error: outcome["success"] != json!(true),
            data: Some(outcome),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools_in(dir: &Path) -> WorkspaceTools {
        WorkspaceTools::new(ToolsConfig {
            root: dir.to_path_buf(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn resolve_rejects_escapes() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = tools_in(tmp.path());
        assert!(tools.resolve("data/notes.txt").is_some());
        assert!(tools.resolve("data/../data/notes.txt").is_some());
        assert!(tools.resolve("../outside.txt").is_none());
        assert!(tools.resolve("/etc/passwd").is_none());
    }

    #[test]
    fn write_denial_rules() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = tools_in(tmp.path());
        let root = tools.root().to_path_buf();
        assert!(tools.write_denial(&root.join("data/a.txt")).is_none());
        assert!(tools.write_denial(&root.join("valyria_core/x.py")).is_none());
        assert!(tools.write_denial(&root.join("README.md")).is_some());
        assert!(tools.write_denial(&root.join("data/run.SH")).is_some());
        assert!(tools.write_denial(&root.join("data/Makefile")).is_none());
    }

    #[test]
    fn missing_root_is_a_config_error() {
        let err = WorkspaceTools::new(ToolsConfig {
            root: PathBuf::from("/definitely/not/here"),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ValyriaError::Config(_)));
    }
}
