//! Serialized execution of side-effecting calls: many concurrent callers hand
//! labeled operations to a single consumer that runs them one at a time, in
//! the order they were accepted, with optional cancellation of the handoff.

mod error;
mod logger;
mod queue;
mod request;
mod strand;
mod submit;

pub use error::StrandError;
pub use logger::{StrandLogger, TracingLogger};
pub use queue::{handoff_queue, RequestConsumer, RequestSender};
pub use request::{Request, RequestLabel, SLOW_OPERATION_THRESHOLD};
pub use strand::Strand;
pub use submit::{submit, submit_or_cancel};
