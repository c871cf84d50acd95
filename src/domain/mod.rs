//! Domain layer: Core business types and logic.
//!
//! This module contains pure types with no I/O: disease profiles, clinical
//! snapshots, feature assembly, and the decision rules applied to model
//! outputs. All types are serializable.

mod disease;
mod features;
mod prediction;
mod snapshot;

pub use disease::Disease;
pub use features::{FeatureValue, FeatureVector};
pub use prediction::{
    synthesize_contributions, Contribution, Decision, ModelOutput, PredictionDraft,
    PredictionRecord, Validation, ValidationDraft, ValidationStatus, CONTRIBUTION_WEIGHTS,
};
pub use snapshot::{ClinicalSnapshot, Radiograph, Sex};
