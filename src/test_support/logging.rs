//! In-memory `tracing` sink for asserting on emitted diagnostics.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Shared byte buffer handed to the formatter as its writer.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `action` with a thread-local subscriber recording events at `level`
/// and above, returning the plain-text lines alongside the closure result.
///
/// # Examples
/// ```
/// use tracing::Level;
/// use yq_provision::test_support::capture_logs;
///
/// let (logs, value) = capture_logs(Level::INFO, || {
///     tracing::info!(path = "/usr/bin/yq", "using system-installed yq");
///     7
/// });
/// assert!(logs.iter().any(|line| line.contains("/usr/bin/yq")));
/// assert_eq!(value, 7);
/// ```
#[must_use]
pub fn capture_logs<R>(level: Level, action: impl FnOnce() -> R) -> (Vec<String>, R) {
    let buffer = SharedBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .without_time()
        .with_ansi(false)
        .with_writer(buffer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, action);
    (buffer.lines(), result)
}
