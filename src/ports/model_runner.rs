//! Model runner port: Trait for running disease-model inference.
//!
//! Hides the subprocess-and-parse mechanics behind a narrow interface so it
//! can later be swapped for an in-process model runtime or an RPC call
//! without touching the decision and persistence stages.

use std::path::PathBuf;

use crate::domain::{Disease, FeatureVector, ModelOutput};

/// Input handed to one disease model.
#[derive(Debug, Clone)]
pub enum ModelInput {
    /// Tabular feature vector (diabetes, renal, cardiovascular).
    Features(FeatureVector),
    /// Path to a stored chest radiograph (tuberculosis).
    Image(PathBuf),
}

/// Trait for running one inference against a disease model.
///
/// Implementations must be safe to call concurrently: each run is an
/// independent invocation with no shared mutable state.
pub trait ModelRunner: Send + Sync {
    /// Error type for inference runs.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run the model for `disease` on `input` and return its parsed output.
    ///
    /// # Errors
    /// Returns error if the run times out, fails, or produces output that
    /// cannot be interpreted.
    fn predict(&self, disease: Disease, input: &ModelInput) -> Result<ModelOutput, Self::Error>;
}
