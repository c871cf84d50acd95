//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and external systems (the inference runtime and
//! the storage backend).

mod model_runner;
mod storage;

pub use model_runner::{ModelInput, ModelRunner};
pub use storage::Storage;
