//! Adapters: Concrete implementations of the ports.
//!
//! - `runner`: invokes Python model scripts as bounded subprocesses
//! - `sqlite`: persistence behind the `Storage` port
//! - `sanitize`: log output scrubbing for patient-identifying content

pub mod runner;
pub mod sanitize;
pub mod sqlite;

pub use runner::{RunnerConfig, RunnerError, SubprocessRunner};
pub use sanitize::SanitizingMakeWriter;
pub use sqlite::{SqliteStorage, StorageError};
