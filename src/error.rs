use thiserror::Error;

/// Faults raised by the strand itself, as opposed to failures reported by a
/// submitted operation.
///
/// Operation outcomes use the caller's own error type; these faults reach the
/// caller through that type's `From<StrandError>` conversion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrandError {
  #[error("Operation '{label}' panicked: {message}")]
  OperationPanicked { label: String, message: String },

  #[error("Strand consumer has stopped; the request was not accepted")]
  ConsumerStopped,

  #[error("Completion signal for '{0}' was dropped before an outcome was delivered")]
  CompletionLost(String),

  #[error("Strand is shutting down or already shut down, cannot accept new requests")]
  ShuttingDown,

  #[error("Strand consumer thread could not be joined: {0}")]
  ConsumerJoin(String),
}
