use crate::error::StrandError;
use crate::logger::{StrandLogger, TracingLogger};
use crate::queue::{handoff_queue, RequestSender};
use crate::request::RequestLabel;
use crate::submit;

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle as TokioHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn};

/// Serializes operations on a resource of type `S` through a single consumer.
///
/// The resource lives on a dedicated consumer thread and is reachable only
/// through operations submitted here, which run one at a time in the order
/// they were accepted. Share the handle behind the returned `Arc`.
pub struct Strand<S: Send + 'static = ()> {
  name: Arc<String>,
  queue: RwLock<Option<RequestSender<S>>>,
  logger: Arc<dyn StrandLogger>,
  consumer_join_handle: Mutex<Option<JoinHandle<S>>>,
}

impl<S: Send + 'static> fmt::Debug for Strand<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Strand")
      .field("name", &self.name)
      .field("is_shut_down", &self.is_shut_down())
      .finish_non_exhaustive()
  }
}

impl<S: Send + 'static> Strand<S> {
  /// Starts a strand that logs through `tracing`.
  pub fn new(name: &str, queue_capacity: usize, tokio_handle: TokioHandle, resource: S) -> Arc<Self> {
    Self::with_logger(
      name,
      queue_capacity,
      tokio_handle,
      resource,
      Arc::new(TracingLogger::new(name)),
    )
  }

  /// Starts a strand whose instrumentation lines go to `logger`.
  pub fn with_logger(
    name: &str,
    queue_capacity: usize,
    tokio_handle: TokioHandle,
    resource: S,
    logger: Arc<dyn StrandLogger>,
  ) -> Arc<Self> {
    let (sender, consumer) = handoff_queue::<S>(queue_capacity);

    let span = info_span!("strand_consumer", name = %name);
    let consumer_join_handle = tokio_handle.spawn_blocking(move || span.in_scope(|| consumer.run(resource)));

    info!(strand = %name, queue_capacity = queue_capacity.max(1), "Strand started.");
    Arc::new(Self {
      name: Arc::new(name.to_string()),
      queue: RwLock::new(Some(sender)),
      logger,
      consumer_join_handle: Mutex::new(Some(consumer_join_handle)),
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Returns `true` once [`Strand::shutdown`] has been called.
  pub fn is_shut_down(&self) -> bool {
    self.queue.read().is_none()
  }

  /// Runs `operation` on the consumer and returns its outcome.
  pub async fn submit<T, E, F>(&self, label: impl Into<RequestLabel>, operation: F) -> Result<T, E>
  where
    T: Send + 'static,
    E: fmt::Display + From<StrandError> + Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
  {
    self.with_resource(label, move |_: &mut S| operation()).await
  }

  /// Runs `operation` on the consumer unless `cancel` fires before it is
  /// accepted, in which case `Err(cancel_outcome)` is returned and the
  /// operation never runs.
  pub async fn submit_or_cancel<T, E, F>(
    &self,
    label: impl Into<RequestLabel>,
    operation: F,
    cancel: &CancellationToken,
    cancel_outcome: E,
  ) -> Result<T, E>
  where
    T: Send + 'static,
    E: fmt::Display + From<StrandError> + Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
  {
    self
      .with_resource_or_cancel(label, move |_: &mut S| operation(), cancel, cancel_outcome)
      .await
  }

  /// Runs `operation` on the consumer with exclusive access to the resource.
  pub async fn with_resource<T, E, F>(&self, label: impl Into<RequestLabel>, operation: F) -> Result<T, E>
  where
    T: Send + 'static,
    E: fmt::Display + From<StrandError> + Send + 'static,
    F: FnOnce(&mut S) -> Result<T, E> + Send + 'static,
  {
    let queue = self.sender()?;
    submit::submit(&self.logger, &queue, label, operation).await
  }

  /// Cancellable form of [`Strand::with_resource`].
  pub async fn with_resource_or_cancel<T, E, F>(
    &self,
    label: impl Into<RequestLabel>,
    operation: F,
    cancel: &CancellationToken,
    cancel_outcome: E,
  ) -> Result<T, E>
  where
    T: Send + 'static,
    E: fmt::Display + From<StrandError> + Send + 'static,
    F: FnOnce(&mut S) -> Result<T, E> + Send + 'static,
  {
    if cancel.is_cancelled() {
      return Err(cancel_outcome);
    }
    let queue = self.sender()?;
    submit::submit_or_cancel(&self.logger, &queue, label, operation, cancel, cancel_outcome).await
  }

  /// Blocks the calling thread until `operation` has run on the consumer.
  ///
  /// For callers outside any async context; calling it from within a Tokio
  /// worker stalls that worker.
  pub fn blocking_submit<T, E, F>(&self, label: impl Into<RequestLabel>, operation: F) -> Result<T, E>
  where
    T: Send + 'static,
    E: fmt::Display + From<StrandError> + Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
  {
    futures::executor::block_on(self.submit(label, operation))
  }

  /// Blocking form of [`Strand::submit_or_cancel`].
  pub fn blocking_submit_or_cancel<T, E, F>(
    &self,
    label: impl Into<RequestLabel>,
    operation: F,
    cancel: &CancellationToken,
    cancel_outcome: E,
  ) -> Result<T, E>
  where
    T: Send + 'static,
    E: fmt::Display + From<StrandError> + Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
  {
    futures::executor::block_on(self.submit_or_cancel(label, operation, cancel, cancel_outcome))
  }

  /// Stops accepting requests, waits for the consumer to run everything it
  /// already accepted, and returns the resource.
  ///
  /// Requests still being offered by concurrent callers may be accepted
  /// before the consumer stops. Only the first call receives the resource;
  /// later calls return `StrandError::ShuttingDown`.
  pub async fn shutdown(&self) -> Result<S, StrandError> {
    let sender = self.queue.write().take();
    if sender.is_none() {
      info!(strand = %*self.name, "Shutdown already in progress or completed.");
      return Err(StrandError::ShuttingDown);
    }
    info!(strand = %*self.name, "Initiating strand shutdown. Closing handoff queue.");
    drop(sender);

    let handle_to_await = self.consumer_join_handle.lock().take();
    match handle_to_await {
      Some(handle) => {
        info!(strand = %*self.name, "Waiting for consumer loop to drain and join.");
        match handle.await {
          Ok(resource) => {
            info!(strand = %*self.name, "Strand shutdown completed.");
            Ok(resource)
          }
          Err(join_error) => {
            error!(strand = %*self.name, "Error joining consumer loop during shutdown: {:?}", join_error);
            Err(StrandError::ConsumerJoin(join_error.to_string()))
          }
        }
      }
      None => {
        warn!(strand = %*self.name, "Consumer join handle already taken.");
        Err(StrandError::ShuttingDown)
      }
    }
  }

  fn sender(&self) -> Result<RequestSender<S>, StrandError> {
    match self.queue.read().as_ref() {
      Some(sender) => Ok(sender.clone()),
      None => {
        debug!(strand = %*self.name, "Rejecting request: strand is shut down.");
        Err(StrandError::ShuttingDown)
      }
    }
  }
}

impl<S: Send + 'static> Drop for Strand<S> {
  fn drop(&mut self) {
    // The consumer finishes on its own once the last sender is gone; it is
    // never joined here.
    if self.queue.get_mut().take().is_some() {
      debug!(strand = %*self.name, "Strand dropped without shutdown. Handoff queue closed; consumer will drain and stop.");
    } else {
      trace!(strand = %*self.name, "Strand dropped after shutdown.");
    }
  }
}
