//! Disease model profiles.
//!
//! Each supported disease is one variant of [`Disease`], carrying a static
//! profile: which external script and model artifact to run, the wall-clock
//! budget for the run, the default decision threshold, and the fallback
//! feature/interpretation/recommendation tables used when the model does not
//! supply its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Decision thresholds above this value are considered training-time
/// optimization artifacts for the chronic (tabular) models: a threshold
/// tuned for F-measure can sit so high that a 91% probability still reads
/// as "not detected". Above the ceiling, the display threshold is used.
const CHRONIC_THRESHOLD_CEILING: f64 = 0.85;

/// Standard display threshold substituted when the override fires.
const DISPLAY_THRESHOLD: f64 = 0.5;

/// Wall-clock budget for tabular model runs.
const TABULAR_TIMEOUT: Duration = Duration::from_secs(60);

/// Wall-clock budget for the image model (loading it takes most of this).
const IMAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// The diseases the platform can screen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Disease {
    #[serde(rename = "DIABETE")]
    Diabetes,
    #[serde(rename = "MALADIE_RENALE")]
    RenalDisease,
    #[serde(rename = "CARDIOVASCULAIRE")]
    Cardiovascular,
    #[serde(rename = "TUBERCULOSE")]
    Tuberculosis,
}

impl Disease {
    pub const ALL: [Disease; 4] = [
        Disease::Diabetes,
        Disease::RenalDisease,
        Disease::Cardiovascular,
        Disease::Tuberculosis,
    ];

    /// Stable storage/API tag for this disease.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Diabetes => "DIABETE",
            Self::RenalDisease => "MALADIE_RENALE",
            Self::Cardiovascular => "CARDIOVASCULAIRE",
            Self::Tuberculosis => "TUBERCULOSE",
        }
    }

    /// Parse a storage tag back into a variant.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.tag() == tag)
    }

    /// Version tag recorded on every prediction produced by this model.
    #[must_use]
    pub fn model_version(self) -> &'static str {
        match self {
            Self::Diabetes => "diabete_v1.0",
            Self::RenalDisease => "renale_v1.0",
            Self::Cardiovascular => "cardio_v1.0",
            Self::Tuberculosis => "tuberculose_v1.0",
        }
    }

    /// Prediction script filename, relative to the scripts directory.
    #[must_use]
    pub fn script(self) -> &'static str {
        match self {
            Self::Diabetes => "predict_diabete.py",
            Self::RenalDisease => "predict_renale.py",
            Self::Cardiovascular => "predict_cardio.py",
            Self::Tuberculosis => "predict.py",
        }
    }

    /// Model artifact directory, relative to the models directory.
    #[must_use]
    pub fn model_dir(self) -> &'static str {
        match self {
            Self::Diabetes => "diabete_model",
            Self::RenalDisease => "maladie_renale_model",
            Self::Cardiovascular => "cardiovasculaire_model",
            Self::Tuberculosis => "app_model",
        }
    }

    /// Threshold used when the model output does not carry one.
    ///
    /// The tuberculosis model was calibrated for high recall on chest
    /// radiographs, hence the low cutoff.
    #[must_use]
    pub fn default_threshold(self) -> f64 {
        match self {
            Self::Tuberculosis => 0.12,
            _ => DISPLAY_THRESHOLD,
        }
    }

    /// Wall-clock budget for one inference run.
    #[must_use]
    pub fn timeout(self) -> Duration {
        if self.image_based() {
            IMAGE_TIMEOUT
        } else {
            TABULAR_TIMEOUT
        }
    }

    /// Whether the model consumes a radiograph instead of a feature vector.
    #[must_use]
    pub fn image_based(self) -> bool {
        matches!(self, Self::Tuberculosis)
    }

    /// Whether this is one of the chronic-disease tabular models, which are
    /// subject to the threshold override rule.
    #[must_use]
    pub fn chronic(self) -> bool {
        !self.image_based()
    }

    /// Resolve the threshold actually applied to the clinical decision.
    ///
    /// For chronic-disease models, a stored threshold above
    /// [`CHRONIC_THRESHOLD_CEILING`] is replaced by the standard display
    /// threshold. The image model keeps its threshold as-is.
    #[must_use]
    pub fn applied_threshold(self, resolved: f64) -> f64 {
        if self.chronic() && resolved > CHRONIC_THRESHOLD_CEILING {
            DISPLAY_THRESHOLD
        } else {
            resolved
        }
    }

    /// Fallback detected-feature labels for the decided outcome, used when
    /// the model output carries no feature list.
    #[must_use]
    pub fn fallback_features(self, detected: bool) -> &'static [&'static str] {
        match (self, detected) {
            (Self::Diabetes, true) => &[
                "Taux de glucose élevé",
                "IMC élevé",
                "Antécédents familiaux",
                "Âge",
            ],
            (Self::Diabetes, false) => &[
                "Glucose normal",
                "IMC normal",
                "Pas d'antécédents",
                "Paramètres stables",
            ],
            (Self::RenalDisease, true) => &[
                "Créatinine sérique élevée",
                "Urée sanguine élevée",
                "Hémoglobine basse",
                "Albuminurie",
            ],
            (Self::RenalDisease, false) => &[
                "Créatinine normale",
                "Urée normale",
                "Hémoglobine normale",
                "Paramètres stables",
            ],
            (Self::Cardiovascular, true) => &[
                "Pression artérielle élevée",
                "Cholestérol élevé",
                "Facteurs de risque",
                "Âge",
            ],
            (Self::Cardiovascular, false) => &[
                "Pression artérielle normale",
                "Cholestérol normal",
                "Pas de facteurs de risque",
                "Paramètres stables",
            ],
            (Self::Tuberculosis, true) => &[
                "Opacités pulmonaires",
                "Cavités",
                "Adénopathies médiastinales",
            ],
            (Self::Tuberculosis, false) => &[
                "Poumons clairs",
                "Pas d'anomalie",
                "Structures normales",
            ],
        }
    }

    /// Fallback interpretation text for the decided outcome and probability.
    #[must_use]
    pub fn fallback_interpretation(self, detected: bool, probability: f64) -> &'static str {
        if let Self::Tuberculosis = self {
            return if detected {
                if probability >= 0.8 {
                    "Forte probabilité de tuberculose détectée. Présence de signes radiologiques caractéristiques."
                } else {
                    "Signes possibles de tuberculose détectés. Consultation médicale recommandée pour confirmation."
                }
            } else if probability <= 0.2 {
                "Aucun signe de tuberculose détecté. Image normale."
            } else {
                "Résultat incertain. Consultation recommandée."
            };
        }

        match (self, detected) {
            (Self::Diabetes, true) => {
                if probability >= 0.8 {
                    "Forte probabilité de diabète détectée. Signes cliniques significatifs présents."
                } else {
                    "Signes possibles de diabète détectés. Surveillance recommandée."
                }
            }
            (Self::Diabetes, false) => {
                if probability <= 0.2 {
                    "Aucun signe de diabète détecté. Paramètres normaux."
                } else {
                    "Résultat incertain. Surveillance recommandée."
                }
            }
            (Self::RenalDisease, true) => {
                if probability >= 0.8 {
                    "Forte probabilité de maladie rénale détectée. Signes cliniques significatifs présents."
                } else {
                    "Signes possibles de maladie rénale détectés. Surveillance recommandée."
                }
            }
            (Self::RenalDisease, false) => {
                if probability <= 0.2 {
                    "Aucun signe de maladie rénale détecté. Paramètres normaux."
                } else {
                    "Résultat incertain. Surveillance recommandée."
                }
            }
            (Self::Cardiovascular, true) => {
                if probability >= 0.8 {
                    "Forte probabilité de maladie cardiovasculaire détectée. Signes cliniques significatifs présents."
                } else {
                    "Signes possibles de maladie cardiovasculaire détectés. Surveillance recommandée."
                }
            }
            (Self::Cardiovascular, false) => {
                if probability <= 0.2 {
                    "Aucun signe de maladie cardiovasculaire détecté. Paramètres normaux."
                } else {
                    "Résultat incertain. Surveillance recommandée."
                }
            }
            (Self::Tuberculosis, _) => unreachable!(),
        }
    }

    /// Fallback recommendation text. `None` means no follow-up needed.
    #[must_use]
    pub fn fallback_recommendation(self, detected: bool, probability: f64) -> Option<&'static str> {
        if detected {
            if probability >= 0.8 {
                Some(match self {
                    Self::Diabetes => "Consultation médicale urgente recommandée. Examens complémentaires nécessaires (HbA1c, test de tolérance au glucose).",
                    Self::RenalDisease => "Consultation médicale urgente recommandée. Examens complémentaires nécessaires (créatinine sérique, échographie rénale).",
                    Self::Cardiovascular => "Consultation médicale urgente recommandée. Examens complémentaires nécessaires (ECG, échographie cardiaque).",
                    Self::Tuberculosis => "Consultation médicale urgente recommandée. Examens complémentaires nécessaires (test de Mantoux, culture).",
                })
            } else {
                Some("Consultation médicale recommandée pour confirmation.")
            }
        } else if probability <= 0.2 {
            None
        } else {
            Some("Consultation médicale recommandée.")
        }
    }
}

impl std::fmt::Display for Disease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for disease in Disease::ALL {
            assert_eq!(Disease::from_tag(disease.tag()), Some(disease));
        }
        assert_eq!(Disease::from_tag("GRIPPE"), None);
    }

    #[test]
    fn test_default_thresholds() {
        assert!((Disease::Tuberculosis.default_threshold() - 0.12).abs() < f64::EPSILON);
        assert!((Disease::Diabetes.default_threshold() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_threshold_override_fires_for_chronic_models() {
        for disease in [
            Disease::Diabetes,
            Disease::RenalDisease,
            Disease::Cardiovascular,
        ] {
            assert!((disease.applied_threshold(0.93) - 0.5).abs() < f64::EPSILON);
            assert!((disease.applied_threshold(0.851) - 0.5).abs() < f64::EPSILON);
            // At or below the ceiling, the stored threshold stands.
            assert!((disease.applied_threshold(0.85) - 0.85).abs() < f64::EPSILON);
            assert!((disease.applied_threshold(0.3) - 0.3).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_threshold_override_never_fires_for_image_model() {
        assert!((Disease::Tuberculosis.applied_threshold(0.93) - 0.93).abs() < f64::EPSILON);
        assert!((Disease::Tuberculosis.applied_threshold(0.12) - 0.12).abs() < f64::EPSILON);
    }

    #[test]
    fn test_timeouts() {
        assert_eq!(Disease::Diabetes.timeout(), Duration::from_secs(60));
        assert_eq!(Disease::Tuberculosis.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_fallback_tables_nonempty() {
        for disease in Disease::ALL {
            for detected in [true, false] {
                assert!(!disease.fallback_features(detected).is_empty());
                assert!(!disease.fallback_interpretation(detected, 0.5).is_empty());
            }
        }
    }

    #[test]
    fn test_no_recommendation_for_clearly_negative_results() {
        for disease in Disease::ALL {
            assert!(disease.fallback_recommendation(false, 0.1).is_none());
            assert!(disease.fallback_recommendation(false, 0.4).is_some());
            assert!(disease.fallback_recommendation(true, 0.9).is_some());
        }
    }
}
