//! Prediction service: Orchestrates the request-to-record pipeline.
//!
//! This service coordinates:
//! - Input resolution (clinical snapshot or radiograph lookup)
//! - Feature assembly
//! - Model invocation through the runner port
//! - Decision derivation and explainability synthesis
//! - Storage persistence

use std::sync::Arc;

use crate::adapters::{RunnerError, StorageError};
use crate::domain::{
    ClinicalSnapshot, Disease, FeatureVector, PredictionDraft, PredictionRecord, ValidationDraft,
};
use crate::ports::{ModelInput, ModelRunner, Storage};
use crate::{PredictError, Result};

/// A request to run one disease model against one visit.
#[derive(Debug, Clone, Copy)]
pub struct PredictionRequest {
    pub disease: Disease,
    pub visit_id: i64,
    /// Radiograph reference, required for image-based models only.
    pub image_id: Option<i64>,
}

/// Service for running disease predictions end to end.
pub struct PredictionService<R, S>
where
    R: ModelRunner,
    S: Storage,
{
    runner: Arc<R>,
    storage: Arc<S>,
}

impl<R, S> PredictionService<R, S>
where
    R: ModelRunner,
    S: Storage,
    R::Error: Into<RunnerError>,
    S::Error: Into<StorageError>,
{
    /// Create a new prediction service.
    pub fn new(runner: Arc<R>, storage: Arc<S>) -> Self {
        Self { runner, storage }
    }

    /// Run one prediction against stored clinical data.
    ///
    /// Performs the full pipeline:
    /// 1. Resolve the model input (snapshot features or radiograph path)
    /// 2. Invoke the model subprocess
    /// 3. Derive the decision and build the record
    /// 4. Persist the record with its contribution rows
    ///
    /// # Errors
    /// Returns error if any step fails; nothing is persisted on failure.
    pub fn run(&self, request: PredictionRequest) -> Result<PredictionRecord> {
        tracing::info!(
            "Starting prediction pipeline: disease={}, visit={}",
            request.disease,
            request.visit_id
        );

        // Step 1: Resolve input
        tracing::debug!("Step 1: Resolving model input...");
        let input = self.resolve_input(&request)?;

        // Step 2: Invoke model
        tracing::debug!("Step 2: Invoking model subprocess...");
        let output = self
            .runner
            .predict(request.disease, &input)
            .map_err(|e| PredictError::Runner(e.into()))?;
        tracing::debug!(
            "Model returned probability={:.4}, threshold={:?}",
            output.probability,
            output.threshold
        );

        // Step 3: Derive decision and record
        tracing::debug!("Step 3: Deriving decision...");
        let (draft, contributions) = PredictionDraft::from_output(
            request.disease,
            request.visit_id,
            request.image_id,
            &output,
        );

        // Step 4: Persist atomically
        tracing::debug!("Step 4: Saving prediction...");
        let id = self
            .storage
            .save_prediction(&draft, &contributions)
            .map_err(|e| PredictError::Storage(e.into()))?;

        let record = self
            .storage
            .fetch_prediction(id)
            .map_err(|e| PredictError::Storage(e.into()))?
            .ok_or_else(|| {
                PredictError::Storage(StorageError::NotFound(format!("prediction {id}")))
            })?;

        tracing::info!(
            "Prediction complete: id={}, detected={}, probability={:.2}%",
            record.id,
            record.detected,
            record.probability * 100.0
        );

        Ok(record)
    }

    /// Resolve what gets handed to the model for this request.
    fn resolve_input(&self, request: &PredictionRequest) -> Result<ModelInput> {
        if request.disease.image_based() {
            let image_id = request.image_id.ok_or_else(|| {
                PredictError::Validation("ID visite et ID image sont requis".to_string())
            })?;
            let radiograph = self
                .storage
                .fetch_radiograph(image_id)
                .map_err(|e| PredictError::Storage(e.into()))?
                .ok_or_else(|| {
                    PredictError::NotFound("Image de radiographie non trouvée".to_string())
                })?;
            if radiograph.visit_id != request.visit_id {
                return Err(PredictError::Validation(
                    "L'image ne correspond pas à cette visite".to_string(),
                ));
            }
            return Ok(ModelInput::Image(radiograph.file_path.into()));
        }

        let snapshot = self
            .storage
            .fetch_snapshot(request.visit_id)
            .map_err(|e| PredictError::Storage(e.into()))?
            .ok_or_else(|| {
                PredictError::NotFound(
                    "Données cliniques non trouvées pour cette visite".to_string(),
                )
            })?;

        if request.disease == Disease::Diabetes {
            let missing = snapshot.missing_diabetes_fields();
            if !missing.is_empty() {
                return Err(PredictError::Validation(format!(
                    "Champs manquants: {}",
                    missing.join(", ")
                )));
            }
        }

        Ok(ModelInput::Features(FeatureVector::assemble(
            request.disease,
            &snapshot,
        )))
    }

    /// Record or replace the clinical snapshot for a visit.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    pub fn record_snapshot(&self, snapshot: &ClinicalSnapshot) -> Result<()> {
        self.storage
            .save_snapshot(snapshot)
            .map_err(|e| PredictError::Storage(e.into()))
    }

    /// Register an uploaded radiograph for a visit, returning its id.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    pub fn record_radiograph(&self, visit_id: i64, file_path: &str) -> Result<i64> {
        self.storage
            .save_radiograph(visit_id, file_path)
            .map_err(|e| PredictError::Storage(e.into()))
    }

    /// Record a clinician review against an existing prediction.
    ///
    /// # Errors
    /// Returns error if the prediction does not exist or the write fails.
    pub fn record_validation(&self, draft: &ValidationDraft) -> Result<i64> {
        self.storage.save_validation(draft).map_err(|e| {
            let se: StorageError = e.into();
            match se {
                StorageError::NotFound(_) => {
                    PredictError::NotFound("Prédiction non trouvée".to_string())
                }
                other => PredictError::Storage(other),
            }
        })
    }

    /// Fetch one stored prediction with its contributions and validations.
    ///
    /// # Errors
    /// Returns error if the read fails or the prediction does not exist.
    pub fn prediction(&self, id: i64) -> Result<PredictionRecord> {
        self.storage
            .fetch_prediction(id)
            .map_err(|e| PredictError::Storage(e.into()))?
            .ok_or_else(|| PredictError::NotFound("Prédiction non trouvée".to_string()))
    }

    /// Fetch all stored predictions for a visit, most recent first.
    ///
    /// # Errors
    /// Returns error if the read fails.
    pub fn predictions_for_visit(&self, visit_id: i64) -> Result<Vec<PredictionRecord>> {
        self.storage
            .predictions_for_visit(visit_id)
            .map_err(|e| PredictError::Storage(e.into()))
    }
}
