//! Prediction decisions and persisted record shapes.
//!
//! The decision stage turns a parsed model output into the clinical verdict:
//! it resolves the applied threshold (including the chronic-disease override),
//! derives the detected flag and confidence, and synthesizes ranked feature
//! contributions when the model supplied none.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Disease;

/// Ranked contribution weights: non-negative, strictly decreasing, summing
/// to 1.0. At most this many contribution rows are created per prediction.
pub const CONTRIBUTION_WEIGHTS: [f64; 5] = [0.35, 0.25, 0.20, 0.12, 0.08];

/// Parsed output of one successful model run.
///
/// Produced by the runner adapter from the program's JSON payload; every
/// field except `probability` is optional on the wire.
#[derive(Debug, Clone, Default)]
pub struct ModelOutput {
    /// Disease probability in [0, 1].
    pub probability: f64,
    /// The model's own thresholded call (0 or 1), recorded but not trusted
    /// for the clinical flag.
    pub prediction: Option<i64>,
    /// Decision threshold the model was calibrated with.
    pub threshold: Option<f64>,
    pub confidence_level: Option<String>,
    pub features: Vec<String>,
    pub interpretation: Option<String>,
    pub recommendation: Option<String>,
}

/// The clinical verdict derived from a model output.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub probability: f64,
    /// Threshold actually applied, after the chronic-disease override.
    pub threshold: f64,
    pub detected: bool,
    /// `probability` if detected, its complement otherwise; always in [0, 1].
    pub confidence: f64,
}

impl Decision {
    /// Derive the verdict for one disease from a model output.
    #[must_use]
    pub fn derive(disease: Disease, output: &ModelOutput) -> Self {
        let resolved = output.threshold.unwrap_or_else(|| disease.default_threshold());
        let threshold = disease.applied_threshold(resolved);
        let probability = output.probability;
        let detected = probability >= threshold;
        let confidence = if detected {
            probability
        } else {
            1.0 - probability
        }
        .clamp(0.0, 1.0);

        Self {
            probability,
            threshold,
            detected,
            confidence,
        }
    }
}

/// One (variable, weight) explainability pair. Weight is a non-negative
/// magnitude; sign is not preserved for this disease family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub variable: String,
    #[serde(rename = "contribution")]
    pub weight: f64,
}

/// Synthesize ranked contributions for a prediction.
///
/// Labels come from the model output when it supplied any, otherwise from
/// the disease's static fallback table for the decided outcome. Weights
/// follow [`CONTRIBUTION_WEIGHTS`], capping the list at five entries.
#[must_use]
pub fn synthesize_contributions(
    disease: Disease,
    detected: bool,
    model_features: &[String],
) -> Vec<Contribution> {
    let labels: Vec<&str> = if model_features.is_empty() {
        disease.fallback_features(detected).to_vec()
    } else {
        model_features.iter().map(String::as_str).collect()
    };

    labels
        .into_iter()
        .zip(CONTRIBUTION_WEIGHTS)
        .map(|(variable, weight)| Contribution {
            variable: variable.to_string(),
            weight,
        })
        .collect()
}

/// A prediction ready to be persisted (no id or timestamp yet).
#[derive(Debug, Clone)]
pub struct PredictionDraft {
    pub visit_id: i64,
    pub image_id: Option<i64>,
    pub disease: Disease,
    pub probability: f64,
    pub threshold: f64,
    pub detected: bool,
    pub confidence: f64,
    pub confidence_level: String,
    pub interpretation: String,
    pub recommendation: Option<String>,
    pub features: Vec<String>,
    pub model_version: String,
}

impl PredictionDraft {
    /// Build the record to persist, plus its contribution rows, from one
    /// model output.
    #[must_use]
    pub fn from_output(
        disease: Disease,
        visit_id: i64,
        image_id: Option<i64>,
        output: &ModelOutput,
    ) -> (Self, Vec<Contribution>) {
        let decision = Decision::derive(disease, output);

        let confidence_level = output.confidence_level.clone().unwrap_or_else(|| {
            if decision.probability > 0.7 {
                "Élevée".to_string()
            } else {
                "Modérée".to_string()
            }
        });

        let features = if output.features.is_empty() {
            disease
                .fallback_features(decision.detected)
                .iter()
                .map(|s| (*s).to_string())
                .collect()
        } else {
            output.features.clone()
        };

        let interpretation = output
            .interpretation
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                disease
                    .fallback_interpretation(decision.detected, decision.probability)
                    .to_string()
            });

        let recommendation = output.recommendation.clone().or_else(|| {
            disease
                .fallback_recommendation(decision.detected, decision.probability)
                .map(str::to_string)
        });

        let contributions =
            synthesize_contributions(disease, decision.detected, &output.features);

        let draft = Self {
            visit_id,
            image_id,
            disease,
            probability: decision.probability,
            threshold: decision.threshold,
            detected: decision.detected,
            confidence: decision.confidence,
            confidence_level,
            interpretation,
            recommendation,
            features,
            model_version: disease.model_version().to_string(),
        };
        (draft, contributions)
    }
}

/// Clinician review status of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    #[serde(rename = "VALIDE")]
    Validated,
    #[serde(rename = "REJETE")]
    Rejected,
    #[serde(rename = "MODIFIE")]
    Modified,
    #[serde(rename = "EN_ATTENTE")]
    Pending,
}

impl ValidationStatus {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Validated => "VALIDE",
            Self::Rejected => "REJETE",
            Self::Modified => "MODIFIE",
            Self::Pending => "EN_ATTENTE",
        }
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "VALIDE" => Some(Self::Validated),
            "REJETE" => Some(Self::Rejected),
            "MODIFIE" => Some(Self::Modified),
            "EN_ATTENTE" => Some(Self::Pending),
            _ => None,
        }
    }
}

/// A clinician's review decision, to be recorded against a prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationDraft {
    #[serde(rename = "id_prediction")]
    pub prediction_id: i64,
    #[serde(rename = "validation_status")]
    pub status: ValidationStatus,
    #[serde(rename = "medecin")]
    pub doctor_name: Option<String>,
    #[serde(rename = "commentaire")]
    pub comment: Option<String>,
    #[serde(rename = "diagnostic_final")]
    pub final_diagnosis: Option<String>,
}

/// A stored clinician review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    pub id: i64,
    #[serde(rename = "id_prediction")]
    pub prediction_id: i64,
    #[serde(rename = "validation_status")]
    pub status: ValidationStatus,
    #[serde(rename = "medecin")]
    pub doctor_name: Option<String>,
    #[serde(rename = "commentaire")]
    pub comment: Option<String>,
    #[serde(rename = "diagnostic_final")]
    pub final_diagnosis: Option<String>,
    #[serde(rename = "date_validation")]
    pub validated_at: DateTime<Utc>,
}

/// A persisted prediction, as read back for the API response: the record
/// itself plus contributions ordered by weight descending and validations
/// most recent first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(rename = "id_prediction")]
    pub id: i64,
    #[serde(rename = "id_visite")]
    pub visit_id: i64,
    #[serde(rename = "id_image")]
    pub image_id: Option<i64>,
    #[serde(rename = "maladie_predite")]
    pub disease: Disease,
    #[serde(rename = "probabilite")]
    pub probability: f64,
    #[serde(rename = "seuil_utilise")]
    pub threshold: f64,
    #[serde(rename = "detectee")]
    pub detected: bool,
    #[serde(rename = "confiance")]
    pub confidence: f64,
    #[serde(rename = "niveau_confiance")]
    pub confidence_level: String,
    pub interpretation: String,
    pub recommendation: Option<String>,
    #[serde(rename = "features_detected")]
    pub features: Vec<String>,
    pub model_version: String,
    #[serde(rename = "date_prediction")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "explicabilites")]
    pub contributions: Vec<Contribution>,
    pub validations: Vec<Validation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(probability: f64, threshold: Option<f64>) -> ModelOutput {
        ModelOutput {
            probability,
            threshold,
            ..ModelOutput::default()
        }
    }

    #[test]
    fn test_decision_monotonicity() {
        for (p, t) in [(0.0, 0.5), (0.49, 0.5), (0.5, 0.5), (0.82, 0.5), (1.0, 0.5)] {
            let d = Decision::derive(Disease::Cardiovascular, &output(p, Some(t)));
            assert_eq!(d.detected, p >= d.threshold);
        }
    }

    #[test]
    fn test_confidence_bounds_and_complement() {
        let d = Decision::derive(Disease::Diabetes, &output(0.82, Some(0.5)));
        assert!(d.detected);
        assert!((d.confidence - 0.82).abs() < f64::EPSILON);

        let d = Decision::derive(Disease::Diabetes, &output(0.3, Some(0.5)));
        assert!(!d.detected);
        assert!((d.confidence - 0.7).abs() < f64::EPSILON);

        for p in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let d = Decision::derive(Disease::Diabetes, &output(p, None));
            assert!((0.0..=1.0).contains(&d.confidence));
        }
    }

    #[test]
    fn test_missing_threshold_falls_back_to_disease_default() {
        let d = Decision::derive(Disease::Cardiovascular, &output(0.82, None));
        assert!((d.threshold - 0.5).abs() < f64::EPSILON);
        assert!(d.detected);

        let d = Decision::derive(Disease::Tuberculosis, &output(0.2, None));
        assert!((d.threshold - 0.12).abs() < f64::EPSILON);
        assert!(d.detected);
    }

    #[test]
    fn test_overconservative_training_threshold_is_overridden() {
        // 91.7% probability against a 0.93 training threshold would read as
        // a false negative; the override replaces the threshold with 0.5.
        let d = Decision::derive(Disease::Diabetes, &output(0.917, Some(0.93)));
        assert!((d.threshold - 0.5).abs() < f64::EPSILON);
        assert!(d.detected);
        assert!((d.confidence - 0.917).abs() < f64::EPSILON);

        // The image model keeps its stored threshold.
        let d = Decision::derive(Disease::Tuberculosis, &output(0.917, Some(0.93)));
        assert!((d.threshold - 0.93).abs() < f64::EPSILON);
        assert!(!d.detected);
    }

    #[test]
    fn test_contribution_weights_rank_and_sum() {
        let mut previous = f64::INFINITY;
        let mut sum = 0.0;
        for w in CONTRIBUTION_WEIGHTS {
            assert!(w > 0.0);
            assert!(w < previous);
            previous = w;
            sum += w;
        }
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_contributions_from_model_features() {
        let features = vec!["Opacités pulmonaires".to_string(), "Cavités".to_string()];
        let contributions = synthesize_contributions(Disease::Tuberculosis, true, &features);
        assert_eq!(contributions.len(), 2);
        assert_eq!(contributions[0].variable, "Opacités pulmonaires");
        assert!(contributions[0].weight > contributions[1].weight);
    }

    #[test]
    fn test_contributions_fall_back_to_disease_table() {
        let contributions = synthesize_contributions(Disease::Diabetes, false, &[]);
        assert!(!contributions.is_empty());
        assert!(contributions.len() <= 5);
        assert_eq!(contributions[0].variable, "Glucose normal");
    }

    #[test]
    fn test_contributions_capped_at_five() {
        let many: Vec<String> = (0..9).map(|i| format!("f{i}")).collect();
        let contributions = synthesize_contributions(Disease::Diabetes, true, &many);
        assert_eq!(contributions.len(), 5);
    }

    #[test]
    fn test_draft_uses_fallback_texts_when_output_is_bare() {
        let (draft, contributions) =
            PredictionDraft::from_output(Disease::Cardiovascular, 7, None, &output(0.82, None));
        assert!(draft.detected);
        assert_eq!(draft.confidence_level, "Élevée");
        assert_eq!(draft.features, Disease::Cardiovascular.fallback_features(true));
        assert!(draft.interpretation.contains("cardiovasculaire"));
        assert!(draft.recommendation.is_some());
        assert_eq!(draft.model_version, "cardio_v1.0");
        assert_eq!(contributions.len(), 4);
    }

    #[test]
    fn test_draft_passes_model_texts_through() {
        let out = ModelOutput {
            probability: 0.4,
            threshold: Some(0.5),
            confidence_level: Some("Modérée".to_string()),
            features: vec!["Glucose normal".to_string()],
            interpretation: Some("Résultat incertain.".to_string()),
            recommendation: Some("Surveillance.".to_string()),
            ..ModelOutput::default()
        };
        let (draft, _) = PredictionDraft::from_output(Disease::Diabetes, 7, None, &out);
        assert!(!draft.detected);
        assert_eq!(draft.interpretation, "Résultat incertain.");
        assert_eq!(draft.recommendation.as_deref(), Some("Surveillance."));
        assert_eq!(draft.features, vec!["Glucose normal".to_string()]);
    }

    #[test]
    fn test_validation_status_roundtrip() {
        for status in [
            ValidationStatus::Validated,
            ValidationStatus::Rejected,
            ValidationStatus::Modified,
            ValidationStatus::Pending,
        ] {
            assert_eq!(ValidationStatus::from_tag(status.tag()), Some(status));
        }
        assert_eq!(ValidationStatus::from_tag("AUTRE"), None);
    }
}
