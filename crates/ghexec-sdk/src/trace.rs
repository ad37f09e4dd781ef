/// Lightweight diagnostic sink used by the process layer.
///
/// Step output goes through the job logger; this trait carries the
/// invoker's own bookkeeping (spawn, signals, exit) so tests can silence
/// or capture it.
pub trait TraceWriter: Send + Sync {
    fn info(&self, message: &str);

    fn verbose(&self, message: &str);

    fn warning(&self, message: &str) {
        self.info(&format!("warning: {message}"));
    }

    fn error(&self, message: &str) {
        self.info(&format!("error: {message}"));
    }
}

/// Forwards trace output to `tracing`, tagged with a component name.
#[derive(Debug, Clone)]
pub struct TracingTraceWriter {
    component: &'static str,
}

impl TracingTraceWriter {
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }
}

impl TraceWriter for TracingTraceWriter {
    fn info(&self, message: &str) {
        tracing::debug!(component = self.component, "{}", message);
    }

    fn verbose(&self, message: &str) {
        tracing::trace!(component = self.component, "{}", message);
    }

    fn warning(&self, message: &str) {
        tracing::warn!(component = self.component, "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(component = self.component, "{}", message);
    }
}

/// Discards everything.
#[derive(Debug, Clone)]
pub struct NullTraceWriter;

impl TraceWriter for NullTraceWriter {
    fn info(&self, _message: &str) {}
    fn verbose(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Keeps every message in memory so tests can assert on them.
#[derive(Debug, Default)]
pub struct CollectingTraceWriter {
    messages: parking_lot::Mutex<Vec<(TraceLevel, String)>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceLevel {
    Info,
    Verbose,
    Warning,
    Error,
}

impl CollectingTraceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(TraceLevel, String)> {
        self.messages.lock().clone()
    }

    fn push(&self, level: TraceLevel, message: &str) {
        self.messages.lock().push((level, message.to_string()));
    }
}

impl TraceWriter for CollectingTraceWriter {
    fn info(&self, message: &str) {
        self.push(TraceLevel::Info, message);
    }

    fn verbose(&self, message: &str) {
        self.push(TraceLevel::Verbose, message);
    }

    fn warning(&self, message: &str) {
        self.push(TraceLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.push(TraceLevel::Error, message);
    }
}
