// Log sinks
// Human-readable progress lines are pushed through a caller-supplied sink so
// that library code never decides where its output ends up.

use parking_lot::Mutex;

/// Destination for progress, skip and error lines
pub trait LogSink: Send + Sync {
    fn info(&self, message: &str);

    /// Lines describing a skipped or failed unit of work
    fn warn(&self, message: &str) {
        self.info(message);
    }
}

/// Forwards every line to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

/// Collects lines in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line received so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Number of lines containing `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines.lock().iter().filter(|l| l.contains(needle)).count()
    }
}

impl LogSink for MemorySink {
    fn info(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }
}
