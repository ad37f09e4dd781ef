// Logging setup and the job logger that step output and workflow
// commands are reported through.

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Target used for everything the job logger emits.
pub const JOB_LOG_TARGET: &str = "job";

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` directives are honored; the default level is INFO, or DEBUG
/// when `debug` is set (`RUNNER_DEBUG=1`).
pub fn init_tracing(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Source location attached to an error, warning, notice or debug message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub file: Option<String>,
    pub line: Option<String>,
    pub col: Option<String>,
    pub end_line: Option<String>,
    pub end_col: Option<String>,
    pub title: Option<String>,
}

impl Annotation {
    pub fn is_empty(&self) -> bool {
        *self == Annotation::default()
    }
}

/// Job-level logger with collapsible groups.
///
/// Grouped messages are indented by two spaces per open group.
#[derive(Debug, Default)]
pub struct JobLogger {
    depth: AtomicUsize,
}

impl JobLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently open groups.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn start_group(&self, title: &str) {
        self.info(&format!("▼ {title}"));
        self.depth.fetch_add(1, Ordering::SeqCst);
    }

    /// Close the innermost group. Unbalanced calls are ignored.
    pub fn end_group(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1));
    }

    pub fn info(&self, message: &str) {
        tracing::info!(target: JOB_LOG_TARGET, "{}{}", self.indent(), message);
    }

    pub fn debug(&self, message: &str) {
        self.debug_at(message, &Annotation::default());
    }

    pub fn debug_at(&self, message: &str, annotation: &Annotation) {
        let indent = self.indent();
        tracing::debug!(
            target: JOB_LOG_TARGET,
            file = annotation.file.as_deref(),
            line = annotation.line.as_deref(),
            col = annotation.col.as_deref(),
            end_line = annotation.end_line.as_deref(),
            end_col = annotation.end_col.as_deref(),
            title = annotation.title.as_deref(),
            "{indent}{message}"
        );
    }

    pub fn notice(&self, message: &str, annotation: &Annotation) {
        let indent = self.indent();
        tracing::info!(
            target: JOB_LOG_TARGET,
            kind = "notice",
            file = annotation.file.as_deref(),
            line = annotation.line.as_deref(),
            col = annotation.col.as_deref(),
            end_line = annotation.end_line.as_deref(),
            end_col = annotation.end_col.as_deref(),
            title = annotation.title.as_deref(),
            "{indent}{message}"
        );
    }

    pub fn warning(&self, message: &str, annotation: &Annotation) {
        let indent = self.indent();
        tracing::warn!(
            target: JOB_LOG_TARGET,
            file = annotation.file.as_deref(),
            line = annotation.line.as_deref(),
            col = annotation.col.as_deref(),
            end_line = annotation.end_line.as_deref(),
            end_col = annotation.end_col.as_deref(),
            title = annotation.title.as_deref(),
            "{indent}{message}"
        );
    }

    pub fn error(&self, message: &str, annotation: &Annotation) {
        let indent = self.indent();
        tracing::error!(
            target: JOB_LOG_TARGET,
            file = annotation.file.as_deref(),
            line = annotation.line.as_deref(),
            col = annotation.col.as_deref(),
            end_line = annotation.end_line.as_deref(),
            end_col = annotation.end_col.as_deref(),
            title = annotation.title.as_deref(),
            "{indent}{message}"
        );
    }

    fn indent(&self) -> String {
        "  ".repeat(self.depth())
    }
}
