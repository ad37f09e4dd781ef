// FileCommandManager: the file-based half of the workflow command protocol
// (GITHUB_ENV, GITHUB_PATH, GITHUB_OUTPUT, GITHUB_STEP_SUMMARY).
// Steps write to these files, and the manager processes them after each stage.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ghexec_common::constants::{file_commands, variables};
use ghexec_sdk::IOUtil;

use crate::execution_context::ExecutionContext;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileCommandError {
    #[error("unexpected '<<' in line {line}: {text}")]
    NestedHeredoc { line: usize, text: String },

    #[error("multi-line value for '{key}' is missing its end marker '{marker}'")]
    UnterminatedHeredoc { key: String, marker: String },
}

/// The marker files of one step stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCommandPaths {
    pub env: PathBuf,
    pub path: PathBuf,
    pub step_summary: PathBuf,
    pub output: PathBuf,
}

impl FileCommandPaths {
    pub fn new(directory: &Path) -> Self {
        Self {
            env: directory.join(file_commands::ENV),
            path: directory.join(file_commands::PATH),
            step_summary: directory.join(file_commands::STEP_SUMMARY),
            output: directory.join(file_commands::OUTPUT),
        }
    }

    /// The variable each file is advertised through, with its path.
    pub fn variables(&self) -> [(&'static str, &Path); 4] {
        [
            (variables::GITHUB_ENV, self.env.as_path()),
            (variables::GITHUB_PATH, self.path.as_path()),
            (variables::GITHUB_STEP_SUMMARY, self.step_summary.as_path()),
            (variables::GITHUB_OUTPUT, self.output.as_path()),
        ]
    }
}

/// Creates the marker files before a stage and applies what steps wrote
/// to them afterwards.
pub struct FileCommandManager;

impl FileCommandManager {
    /// Create (or truncate) the four marker files in `directory`.
    pub fn initialize_file_commands(directory: &Path) -> Result<FileCommandPaths> {
        let paths = FileCommandPaths::new(directory);
        for (_, path) in paths.variables() {
            IOUtil::write_file(path, b"")?;
        }
        Ok(paths)
    }

    /// Parse marker file content into `(key, value)` entries in file order.
    ///
    /// - `key=value` splits at the first `=`; both sides are trimmed.
    /// - `key<<MARKER` starts a multi-line value ended by a line equal to
    ///   `MARKER`. The body keeps its line breaks and is trimmed.
    /// - a bare token is an entry with an empty value (PATH files).
    pub fn parse_file_commands(content: &str) -> Result<Vec<(String, String)>, FileCommandError> {
        let mut entries = Vec::new();
        let mut heredoc: Option<(String, String, Vec<&str>)> = None;

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();

            if let Some((key, marker, body)) = heredoc.as_mut() {
                if line == marker.as_str() {
                    let value = body.join("\n").trim().to_string();
                    entries.push((std::mem::take(key), value));
                    heredoc = None;
                } else if is_heredoc_start(line) {
                    return Err(FileCommandError::NestedHeredoc {
                        line: index + 1,
                        text: line.to_string(),
                    });
                } else {
                    body.push(raw);
                }
                continue;
            }

            if line.is_empty() {
                continue;
            }

            if is_heredoc_start(line) {
                if let Some((key, marker)) = line.split_once("<<") {
                    heredoc = Some((key.trim().to_string(), marker.trim().to_string(), Vec::new()));
                }
                continue;
            }

            match line.split_once('=') {
                Some((key, value)) => entries.push((key.trim().to_string(), value.trim().to_string())),
                None => entries.push((line.to_string(), String::new())),
            }
        }

        match heredoc {
            Some((key, marker, _)) => Err(FileCommandError::UnterminatedHeredoc { key, marker }),
            None => Ok(entries),
        }
    }

    /// Apply the current stage's marker files to the run.
    pub fn process_file_commands(context: &mut ExecutionContext<'_>) -> Result<()> {
        let paths = FileCommandPaths::new(&context.file_commands_directory());

        for (key, value) in Self::read_entries(&paths.env)? {
            context.debug(&format!("GITHUB_ENV: {key}={value}"));
            context.environment.set(key, value);
        }

        for (segment, _) in Self::read_entries(&paths.path)? {
            context.debug(&format!("GITHUB_PATH: {segment}"));
            context.environment.append_path(&segment);
        }

        for (key, value) in Self::read_entries(&paths.output)? {
            context.debug(&format!("GITHUB_OUTPUT: {key}={value}"));
            context.set_output(&key, &value);
        }

        let summary = IOUtil::read_to_string_or_empty(&paths.step_summary)?;
        if !summary.trim().is_empty() {
            context.debug(&format!("Step summary:\n{}", summary.trim_end()));
        }

        Ok(())
    }

    fn read_entries(path: &Path) -> Result<Vec<(String, String)>> {
        let content = IOUtil::read_to_string_or_empty(path)?;
        Self::parse_file_commands(&content)
            .with_context(|| format!("Failed to process file command '{}'", path.display()))
    }
}

/// `<<` opens a multi-line value only when it comes before any `=`.
fn is_heredoc_start(line: &str) -> bool {
    match (line.find("<<"), line.find('=')) {
        (Some(heredoc), Some(eq)) => heredoc < eq,
        (Some(_), None) => true,
        (None, _) => false,
    }
}
