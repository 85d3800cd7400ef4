use crate::error::StrandError;
use crate::request::{panic_message, Request};

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

/// Creates a bounded handoff queue. A capacity of zero is raised to one.
///
/// A request counts as accepted once it has entered the queue; accepted
/// requests are run in the order they entered it.
pub fn handoff_queue<S>(capacity: usize) -> (RequestSender<S>, RequestConsumer<S>) {
  let (tx, rx) = mpsc::channel(capacity.max(1));
  (RequestSender { tx }, RequestConsumer { rx })
}

/// The producer half of the handoff queue. Cheap to clone; it can only write.
pub struct RequestSender<S> {
  tx: mpsc::Sender<Request<S>>,
}

impl<S> Clone for RequestSender<S> {
  fn clone(&self) -> Self {
    Self { tx: self.tx.clone() }
  }
}

impl<S> fmt::Debug for RequestSender<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RequestSender")
      .field("is_closed", &self.tx.is_closed())
      .field("free_slots", &self.tx.capacity())
      .finish()
  }
}

impl<S> RequestSender<S> {
  /// Hands `request` to the consumer, waiting for a free slot if the queue is full.
  ///
  /// Cancel safe: if the returned future is dropped before it completes, the
  /// request was not accepted and is dropped without running.
  pub async fn send(&self, request: Request<S>) -> Result<(), StrandError> {
    match self.tx.send(request).await {
      Ok(()) => Ok(()),
      Err(mpsc::error::SendError(rejected)) => {
        debug!(request_id = rejected.id, label = %rejected.label, "Handoff queue closed; request rejected.");
        Err(StrandError::ConsumerStopped)
      }
    }
  }

  /// Returns `true` once the consumer half has been dropped.
  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }
}

/// The consumer half of the handoff queue. Not cloneable: there is exactly one
/// consumer per queue.
pub struct RequestConsumer<S> {
  rx: mpsc::Receiver<Request<S>>,
}

impl<S> fmt::Debug for RequestConsumer<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RequestConsumer")
      .field("queued", &self.rx.len())
      .finish()
  }
}

impl<S> RequestConsumer<S> {
  /// Receives the next request, or `None` once every sender is gone and the
  /// queue is drained.
  pub async fn recv(&mut self) -> Option<Request<S>> {
    self.rx.recv().await
  }

  /// Runs requests one after another against `resource` on the calling thread
  /// until every sender is gone and the queue is drained, then hands the
  /// resource back.
  ///
  /// Blocks the thread; must not be called from within an async context.
  pub fn run(mut self, mut resource: S) -> S {
    info!("Consumer loop started.");
    let mut dispatched: u64 = 0;

    while let Some(request) = self.rx.blocking_recv() {
      dispatch(request, &mut resource);
      dispatched += 1;
    }

    info!(dispatched, "Handoff queue closed and drained. Consumer loop stopped.");
    resource
  }
}

/// Runs a single request behind a fault boundary so that nothing it does can
/// take the consumer loop down with it.
fn dispatch<S>(request: Request<S>, resource: &mut S) {
  let id = request.id;
  let label = request.label.clone();
  trace!(request_id = id, %label, "Dispatching request.");

  if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| request.run(resource))) {
    error!(
      request_id = id,
      %label,
      "Request panicked outside its operation: {}",
      panic_message(payload.as_ref())
    );
  }
}
