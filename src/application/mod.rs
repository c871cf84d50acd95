//! Application services: Use-case orchestration over the ports.

pub mod prediction;

pub use prediction::{PredictionRequest, PredictionService};
