//! AI-assisted scaffolding glue.
//!
//! Everything intelligent happens in an external query tool (`cgpt` by
//! default): this module gathers context, builds prompts, extracts the
//! fenced JSON out of responses, and writes the results to disk.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::recording::require_tool;

/// File describing a project's commands for scaffolding prompts.
pub const INFO_FILE: &str = ".scriptbox_info";

/// Upper bound on codebase content fed into a prompt.
const MAX_CONTEXT_BYTES: usize = 128 * 1024;

/// Source extensions considered when gathering codebase content.
const CONTEXT_EXTENSIONS: &[&str] = &["rs", "toml", "md", "txt"];

/// One entry in a `.scriptbox_info` file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandInfo {
    /// Command name.
    pub name: String,
    /// Usage summary.
    pub summary: String,
    /// Argument pattern.
    pub args: String,
}

/// External text-generation tool invocation.
#[derive(Clone, Debug)]
pub struct QueryTool {
    /// Program name resolved on PATH.
    pub program: String,
}

impl Default for QueryTool {
    fn default() -> Self {
        Self {
            program: "cgpt".to_string(),
        }
    }
}

impl QueryTool {
    /// Feed `prompt` on stdin, return captured stdout. `prefill` steers
    /// the tool toward a JSON answer.
    pub fn query(&self, prompt: &str, prefill: &str) -> Result<String> {
        require_tool(&self.program)?;
        let mut child = Command::new(&self.program)
            .arg("--prefill")
            .arg(if prefill.is_empty() { "```json\n{" } else { prefill })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Error::tool(&self.program, err.to_string()))?;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|err| Error::tool(&self.program, err.to_string()))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|err| Error::tool(&self.program, err.to_string()))?;
        if !output.status.success() {
            return Err(Error::tool(
                &self.program,
                format!(
                    "query exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Load `.scriptbox_info` from `dir`, inferring and using the tool when
/// the file does not exist.
pub fn load_or_infer(dir: &Path, tool: &QueryTool) -> Result<String> {
    let path = dir.join(INFO_FILE);
    match fs::read_to_string(&path) {
        Ok(info) => Ok(info),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => infer_command_info(dir, tool),
        Err(err) => Err(Error::io(format!("failed to read {}", path.display()), err)),
    }
}

/// Infer command info for `dir` and write it to `.scriptbox_info`.
pub fn write_info(dir: &Path, tool: &QueryTool) -> Result<PathBuf> {
    let info = infer_command_info(dir, tool)?;
    let path = dir.join(INFO_FILE);
    fs::write(&path, info)
        .map_err(|err| Error::io(format!("failed to write {}", path.display()), err))?;
    Ok(path)
}

/// Ask the tool to identify the project's binary entry points.
pub fn infer_command_info(dir: &Path, tool: &QueryTool) -> Result<String> {
    let content = gather_codebase(dir)?;
    let mut prompt = format!(
        "Analyze this codebase and identify key binary entrypoints and commands:\n\n{content}\n\n"
    );
    prompt.push_str(
        "output a json representation matching this datatype:\n\
         type Commands = CommandInfo[];\n\
         type CommandInfo = {\n\
           name: string;    // command name\n\
           summary: string; // usage summary\n\
           args: string;    // argument pattern\n\
         }",
    );
    let response = tool.query(&prompt, "```json\n[")?;
    extract_json(&response).ok_or_else(|| {
        Error::tool(&tool.program, "response contained no valid JSON".to_string())
    })
}

/// Generate scaffold files for `dir` and write them out. Returns the
/// created paths.
pub fn scaffold(dir: &Path, tool: &QueryTool) -> Result<Vec<PathBuf>> {
    let info = load_or_infer(dir, tool)?;
    let prompt = scaffold_prompt(&info);
    let response = tool.query(&prompt, "")?;
    let json = extract_json(&response).ok_or_else(|| {
        Error::tool(&tool.program, "response contained no valid JSON".to_string())
    })?;
    let files: BTreeMap<String, String> = serde_json::from_str(&json)
        .map_err(|err| Error::tool(&tool.program, format!("unexpected response shape: {err}")))?;
    apply_files(dir, &files)
}

fn scaffold_prompt(info: &str) -> String {
    format!(
        "Given these commands:\n\n{info}\n\n\
         Produce starter script tests for them. Output a json object mapping \
         relative file paths (under testdata/) to file contents. Each test file \
         runs a command and asserts on its stdout/stderr."
    )
}

/// Write a path-to-contents map under `dir`.
pub fn apply_files(dir: &Path, files: &BTreeMap<String, String>) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    for (relative, contents) in files {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| Error::io("failed to create scaffold directory", err))?;
        }
        fs::write(&path, contents)
            .map_err(|err| Error::io(format!("failed to write {}", path.display()), err))?;
        tracing::info!(path = %path.display(), "created");
        created.push(path);
    }
    Ok(created)
}

/// Pull the first valid fenced JSON block out of a response, falling back
/// to the whole response when it is itself valid JSON.
pub fn extract_json(output: &str) -> Option<String> {
    for fence in ["```json", "~~~json"] {
        if let Some(start) = output.find(fence) {
            let body = output.get(start + fence.len()..)?;
            if let Some(end) = body.find("```").or_else(|| body.find("~~~")) {
                let candidate = body.get(..end)?.trim();
                if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                    return Some(candidate.to_string());
                }
            }
        }
    }
    let trimmed = output.trim();
    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .map(|_| trimmed.to_string())
}

/// Concatenate the directory's source files, bounded, for prompt context.
pub fn gather_codebase(dir: &Path) -> Result<String> {
    let mut content = String::new();
    let mut budget = MAX_CONTEXT_BYTES;
    gather_into(dir, dir, &mut content, &mut budget)?;
    Ok(content)
}

fn gather_into(root: &Path, dir: &Path, content: &mut String, budget: &mut usize) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|err| Error::io(format!("failed to read {}", dir.display()), err))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .collect();
    paths.sort();
    for path in paths {
        if *budget == 0 {
            return Ok(());
        }
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        if name.starts_with('.') || name == "target" {
            continue;
        }
        if path.is_dir() {
            gather_into(root, &path, content, budget)?;
            continue;
        }
        let wanted = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| CONTEXT_EXTENSIONS.contains(&ext));
        if !wanted {
            continue;
        }
        if let Ok(text) = fs::read_to_string(&path) {
            if text.len() > *budget {
                *budget = 0;
                return Ok(());
            }
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let _ = writeln!(content, "=== {} ===", relative.display());
            content.push_str(&text);
            content.push('\n');
            *budget = budget.saturating_sub(text.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::extract_json;

    #[test]
    fn extracts_fenced_json() {
        let response = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json(response).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn accepts_bare_json() {
        assert_eq!(extract_json("  [1, 2]  ").unwrap(), "[1, 2]");
    }

    #[test]
    fn rejects_non_json() {
        assert!(extract_json("no structured data here").is_none());
        assert!(extract_json("```json\nnot valid\n```").is_none());
    }
}
