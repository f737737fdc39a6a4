use std::fmt;
use std::sync::Arc;

/// Destination for the client's human-readable progress messages.
///
/// Only called when the client was built with `print_logs` enabled. Internal
/// diagnostics go through `tracing` regardless.
#[derive(Clone)]
pub struct LogSink(Arc<dyn Fn(&str) + Send + Sync>);

impl LogSink {
    pub fn new(f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn stdout() -> Self {
        Self::new(|line| println!("{}", line))
    }

    /// Forward messages to `tracing` at info level.
    pub fn tracing() -> Self {
        Self::new(|line| tracing::info!(target: "qdrant_wrapper", "{}", line))
    }

    pub fn log(&self, line: &str) {
        (self.0)(line)
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogSink(..)")
    }
}
