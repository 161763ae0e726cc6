//! Serialized line sink for backend build output.
//!
//! Multiple builds stream their output concurrently; the sink takes a lock
//! per line so interleaved lines are never corrupted. Line order across
//! images is not guaranteed. The sink is injected rather than global, so
//! tests can capture output.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use tracing::warn;

/// Cloneable handle to a mutex-serialized line writer.
#[derive(Clone)]
pub struct LogSink {
  inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl LogSink {
  pub fn new(writer: impl Write + Send + 'static) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Box::new(writer))),
    }
  }

  /// Sink writing to the process's standard output.
  pub fn stdout() -> Self {
    Self::new(io::stdout())
  }

  /// Write one line atomically.
  pub fn line(&self, text: &str) {
    let Ok(mut writer) = self.inner.lock() else {
      return;
    };
    if let Err(error) = writeln!(writer, "{text}") {
      warn!(%error, "failed to write build output line");
    }
  }
}

impl std::fmt::Debug for LogSink {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("LogSink")
  }
}
