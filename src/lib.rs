//! # Prévoir
//!
//! Prediction orchestration service for a clinical workflow application.
//!
//! This crate provides:
//! - Assembly of disease-model inputs from stored clinical visit data
//! - Invocation of external inference programs under time and environment
//!   constraints, with tolerant parsing of their output
//! - Threshold-based clinical decisions with per-disease override rules
//! - Atomic persistence of predictions and their explainability rows
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core business types (snapshots, feature vectors, decisions)
//! - `ports`: Trait definitions for external operations
//! - `adapters`: Concrete implementations (subprocess runner, SQLite)
//! - `application`: Use cases orchestrating domain and ports
//! - `api`: HTTP surface (one POST endpoint per disease model)

pub mod adapters;
pub mod api;
pub mod application;
pub mod domain;
pub mod ports;

pub use domain::{ClinicalSnapshot, Disease, PredictionRecord};

/// Result type for prediction pipeline operations.
pub type Result<T> = std::result::Result<T, PredictError>;

/// Main error type for the prediction pipeline.
///
/// `Validation` and `NotFound` carry user-facing messages (French, like the
/// rest of the product surface); the remaining variants wrap layer errors and
/// are translated into structured responses at the API boundary.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Runner(#[from] adapters::RunnerError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] adapters::StorageError),
}
