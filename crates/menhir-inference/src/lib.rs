//! Menhir Inference
//!
//! A single-worker async queue in front of the shared generation model.
//! The model processes one request at a time; every caller goes through
//! [`InferenceQueue::submit`], which fails fast when the queue is at
//! capacity and honors a per-call timeout. [`QueuedModel`] adapts the queue
//! back into the model contract so graph nodes get serialized access
//! transparently.

mod error;
mod queue;

pub use error::InferenceError;
pub use queue::{InferenceConfig, InferenceQueue, QueuedModel, clamp_request};
