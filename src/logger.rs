use std::sync::Arc;

use tracing::{debug, error, warn};

/// Sink for the instrumentation lines a strand emits around each operation.
///
/// Injected at construction so that tests and embedding applications can
/// capture or redirect the output.
pub trait StrandLogger: Send + Sync {
  fn debug(&self, message: &str);
  fn warning(&self, message: &str);
  fn error(&self, message: &str);
}

/// Default logger: forwards every line to `tracing`, tagged with the strand name.
#[derive(Debug, Clone)]
pub struct TracingLogger {
  strand_name: Arc<String>,
}

impl TracingLogger {
  pub fn new(strand_name: &str) -> Self {
    Self {
      strand_name: Arc::new(strand_name.to_string()),
    }
  }
}

impl StrandLogger for TracingLogger {
  fn debug(&self, message: &str) {
    debug!(strand = %*self.strand_name, "{}", message);
  }

  fn warning(&self, message: &str) {
    warn!(strand = %*self.strand_name, "{}", message);
  }

  fn error(&self, message: &str) {
    error!(strand = %*self.strand_name, "{}", message);
  }
}
