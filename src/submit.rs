//! The two ways of putting an operation through a handoff queue.
//!
//! Per request the lifecycle is Pending, Offered, then either Cancelled (only
//! in [`submit_or_cancel`], only before acceptance) or Accepted, Running and
//! Completed. Once accepted, a request always runs to completion.

use crate::error::StrandError;
use crate::logger::StrandLogger;
use crate::queue::RequestSender;
use crate::request::{instrumented, Completion, RequestLabel};

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Hands `operation` to the consumer behind `queue` and waits until it has run.
///
/// Returns exactly the outcome `operation` produced. If the queue is already
/// closed the operation never runs and `StrandError::ConsumerStopped` is
/// returned through `E`.
pub async fn submit<S, T, E, F>(
  logger: &Arc<dyn StrandLogger>,
  queue: &RequestSender<S>,
  label: impl Into<RequestLabel>,
  operation: F,
) -> Result<T, E>
where
  S: 'static,
  T: Send + 'static,
  E: fmt::Display + From<StrandError> + Send + 'static,
  F: FnOnce(&mut S) -> Result<T, E> + Send + 'static,
{
  let (request, done) = instrumented(label.into(), logger.clone(), operation);
  let (id, label) = (request.id, request.label.clone());

  trace!(request_id = id, %label, "Offering request.");
  queue.send(request).await?;
  trace!(request_id = id, %label, "Request accepted.");

  await_completion(done, label).await
}

/// Like [`submit`], except that the handoff races against `cancel`.
///
/// If `cancel` is already cancelled when the call begins, `operation` is
/// dropped without being run or logged and `Err(cancel_outcome)` is returned.
/// Otherwise whichever of handoff and cancellation becomes ready first wins;
/// when both are ready at the same moment either may win. After the request
/// has been accepted, cancelling has no effect and the real outcome is returned.
pub async fn submit_or_cancel<S, T, E, F>(
  logger: &Arc<dyn StrandLogger>,
  queue: &RequestSender<S>,
  label: impl Into<RequestLabel>,
  operation: F,
  cancel: &CancellationToken,
  cancel_outcome: E,
) -> Result<T, E>
where
  S: 'static,
  T: Send + 'static,
  E: fmt::Display + From<StrandError> + Send + 'static,
  F: FnOnce(&mut S) -> Result<T, E> + Send + 'static,
{
  if cancel.is_cancelled() {
    return Err(cancel_outcome);
  }

  let (request, done) = instrumented(label.into(), logger.clone(), operation);
  let (id, label) = (request.id, request.label.clone());

  trace!(request_id = id, %label, "Offering request (cancellable).");
  tokio::select! {
    _ = cancel.cancelled() => return Err(cancel_outcome),
    sent = queue.send(request) => sent?,
  }
  trace!(request_id = id, %label, "Request accepted; cancellation no longer applies.");

  await_completion(done, label).await
}

async fn await_completion<T, E>(done: Completion<T, E>, label: RequestLabel) -> Result<T, E>
where
  E: From<StrandError>,
{
  match done.await {
    Ok(outcome) => outcome,
    Err(_) => Err(E::from(StrandError::CompletionLost(label))),
  }
}
