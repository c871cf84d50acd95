//! Storage port: Trait for persistent clinical data operations.
//!
//! Abstracts the storage backend from the pipeline. The prediction write is
//! the one operation with an atomicity requirement: a prediction and its
//! contribution rows are stored together or not at all.

use crate::domain::{
    ClinicalSnapshot, Contribution, PredictionDraft, PredictionRecord, Radiograph,
    ValidationDraft,
};

/// Trait for clinical storage operations.
pub trait Storage: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create or replace the clinical snapshot for a visit.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn save_snapshot(&self, snapshot: &ClinicalSnapshot) -> Result<(), Self::Error>;

    /// Fetch the clinical snapshot for a visit, if one has been recorded.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn fetch_snapshot(&self, visit_id: i64) -> Result<Option<ClinicalSnapshot>, Self::Error>;

    /// Record a radiograph for a visit, returning its generated id.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn save_radiograph(&self, visit_id: i64, file_path: &str) -> Result<i64, Self::Error>;

    /// Fetch a radiograph by id.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn fetch_radiograph(&self, image_id: i64) -> Result<Option<Radiograph>, Self::Error>;

    /// Persist a prediction and its contribution rows in one atomic unit,
    /// returning the generated prediction id. A failure leaves no partial
    /// rows behind.
    ///
    /// # Errors
    /// Returns error if storage operation fails; nothing is written then.
    fn save_prediction(
        &self,
        draft: &PredictionDraft,
        contributions: &[Contribution],
    ) -> Result<i64, Self::Error>;

    /// Fetch a stored prediction with contributions ordered by weight
    /// descending and validations most recent first.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn fetch_prediction(&self, id: i64) -> Result<Option<PredictionRecord>, Self::Error>;

    /// All predictions recorded for a visit, most recent first.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn predictions_for_visit(&self, visit_id: i64) -> Result<Vec<PredictionRecord>, Self::Error>;

    /// Record a clinician's review of a prediction, returning its id.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn save_validation(&self, draft: &ValidationDraft) -> Result<i64, Self::Error>;
}
