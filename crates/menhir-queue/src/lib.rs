//! Menhir Queue
//!
//! Durable FIFO of one-shot workflow execution jobs. Admission is
//! throttled per caller and globally; a single background worker drains
//! the queue in strict enqueue order and runs each job through an engine
//! obtained from the injected factory. State is persisted to one JSON
//! document (written write-then-rename) and recovered on startup, with
//! RUNNING jobs demoted back to QUEUED.

mod error;
mod job;
mod queue;

pub use error::QueueError;
pub use job::{
  ExecutionJob, ExecutionOptions, JobStatus, JobStatusView, QueueDocument, QueueInfo,
};
pub use queue::{EngineFactory, ExecutionQueue, QueueConfig};
