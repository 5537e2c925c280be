//! Menhir Host
//!
//! Contracts for the external collaborators that graph nodes reach out to:
//! the shared generation model, key-addressable storage, the quantum RNG
//! backend, and best-effort outbound HTTP. The core executes against these
//! traits; concrete backends live outside the platform. An in-memory
//! [`MemoryStore`] ships here for tests and the CLI.

mod http;
mod model;
mod quantum;
mod storage;

pub use http::{HttpError, get_json, post_json};
pub use model::{ChatMessage, GenerationModel, GenerationRequest, GenerationResponse, ModelError};
pub use quantum::{QuantumRng, QuantumSample, RngError};
pub use storage::{MemoryStore, Storage, StorageError};
