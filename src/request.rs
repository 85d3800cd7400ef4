use crate::error::StrandError;
use crate::logger::StrandLogger;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::trace;

lazy_static::lazy_static! {
  static ref NEXT_REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Operations running at least this long are reported at warning level.
/// Purely diagnostic: nothing is aborted when it is exceeded.
pub const SLOW_OPERATION_THRESHOLD: Duration = Duration::from_secs(1);

/// A label for a request, used only in diagnostics.
pub type RequestLabel = String;

pub(crate) type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// Receives the outcome of one request once the consumer has run it.
pub(crate) type Completion<T, E> = oneshot::Receiver<Result<T, E>>;

/// A labeled unit of work travelling through the handoff queue.
///
/// The job is consumed by [`Request::run`], so a request can execute at most
/// once. It is run against the resource owned by the consumer.
pub struct Request<S> {
  pub(crate) id: u64,
  pub(crate) label: RequestLabel,
  pub(crate) job: Job<S>,
}

impl<S> fmt::Debug for Request<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Request")
      .field("id", &self.id)
      .field("label", &self.label)
      .finish_non_exhaustive()
  }
}

impl<S> Request<S> {
  /// Returns the process-unique id of this request.
  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  /// Runs the wrapped operation against `resource` and signals its completion.
  pub fn run(self, resource: &mut S) {
    trace!(request_id = self.id, label = %self.label, "Request running.");
    (self.job)(resource);
  }
}

/// Wraps `operation` into a request carrying the begin/elapsed/error
/// instrumentation and a fault boundary, and returns it together with the
/// receiver its outcome will be delivered on.
pub(crate) fn instrumented<S, T, E, F>(
  label: RequestLabel,
  logger: Arc<dyn StrandLogger>,
  operation: F,
) -> (Request<S>, Completion<T, E>)
where
  S: 'static,
  T: Send + 'static,
  E: fmt::Display + From<StrandError> + Send + 'static,
  F: FnOnce(&mut S) -> Result<T, E> + Send + 'static,
{
  let id = NEXT_REQUEST_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
  let (done_tx, done_rx) = oneshot::channel::<Result<T, E>>();
  let job_label = label.clone();

  let job: Job<S> = Box::new(move |resource: &mut S| {
    let started = Instant::now();
    logger.debug(&format!("{} begin", job_label));

    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| operation(resource))) {
      Ok(outcome) => outcome,
      Err(payload) => Err(E::from(StrandError::OperationPanicked {
        label: job_label.clone(),
        message: panic_message(payload.as_ref()),
      })),
    };

    if let Err(err) = &outcome {
      logger.error(&format!("{} error: {}", job_label, err));
    }

    log_elapsed(logger.as_ref(), &job_label, started.elapsed());

    if done_tx.send(outcome).is_err() {
      trace!(request_id = id, label = %job_label, "Submitter stopped waiting; outcome discarded.");
    }
  });

  (Request { id, label, job }, done_rx)
}

fn log_elapsed(logger: &dyn StrandLogger, label: &str, elapsed: Duration) {
  if elapsed >= SLOW_OPERATION_THRESHOLD {
    logger.warning(&format!("{} took {:?}", label, elapsed));
  } else {
    logger.debug(&format!("{} took {:?}", label, elapsed));
  }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
