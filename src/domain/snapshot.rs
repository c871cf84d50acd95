//! Clinical snapshot types.
//!
//! A [`ClinicalSnapshot`] is the set of clinical measurements a nurse or
//! doctor has recorded for one patient visit. Data entry is incremental, so
//! every measurement is optional; the feature assembler supplies
//! type-appropriate defaults at prediction time.

use serde::{Deserialize, Serialize};

/// Patient sex as recorded at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "HOMME")]
    Male,
    #[serde(rename = "FEMME")]
    Female,
}

impl Sex {
    /// Numeric encoding used by the cardiovascular model's training data
    /// (1 = female, 2 = male).
    #[must_use]
    pub fn model_code(self) -> f64 {
        match self {
            Self::Female => 1.0,
            Self::Male => 2.0,
        }
    }

    /// Storage tag, matching the intake vocabulary.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Male => "HOMME",
            Self::Female => "FEMME",
        }
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "HOMME" => Some(Self::Male),
            "FEMME" => Some(Self::Female),
            _ => None,
        }
    }
}

/// Clinical measurements attached to one patient visit.
///
/// Immutable once a prediction has consumed it for a run; the pipeline only
/// reads it. Fields are grouped by the model family that consumes them;
/// `age` and `blood_pressure` are shared across models.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicalSnapshot {
    #[serde(rename = "id_visite")]
    pub visit_id: i64,

    pub sex: Option<Sex>,
    pub age: Option<f64>,

    // Cardiovascular model inputs
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub systolic_bp: Option<f64>,
    pub diastolic_bp: Option<f64>,
    /// Cholesterol category (1 = normal, 2 = above normal, 3 = well above).
    pub cholesterol: Option<f64>,
    /// Glucose category on the same 1-3 scale as cholesterol.
    pub cardio_glucose: Option<f64>,
    pub smoker: Option<bool>,
    pub alcohol: Option<bool>,
    pub physical_activity: Option<bool>,

    // Diabetes model inputs
    pub pregnancies: Option<f64>,
    pub glucose_level: Option<f64>,
    pub blood_pressure: Option<f64>,
    pub skin_thickness: Option<f64>,
    pub insulin_level: Option<f64>,
    pub bmi: Option<f64>,
    pub diabetes_pedigree: Option<f64>,

    // Renal model inputs
    pub specific_gravity: Option<f64>,
    pub albumin: Option<f64>,
    pub sugar: Option<f64>,
    /// "normal" / "abnormal"
    pub urine_red_cells: Option<String>,
    /// "normal" / "abnormal"
    pub pus_cells: Option<String>,
    /// "present" / "notpresent"
    pub pus_cell_clumps: Option<String>,
    /// "present" / "notpresent"
    pub bacteria: Option<String>,
    pub blood_glucose: Option<f64>,
    pub blood_urea: Option<f64>,
    pub serum_creatinine: Option<f64>,
    pub sodium: Option<f64>,
    pub potassium: Option<f64>,
    pub hemoglobin: Option<f64>,
    pub packed_cell_volume: Option<f64>,
    pub white_cell_count: Option<f64>,
    pub red_cell_count: Option<f64>,
    pub hypertension: Option<bool>,
    pub diabetes_mellitus: Option<bool>,
    pub coronary_artery_disease: Option<bool>,
    /// "good" / "poor"
    pub appetite: Option<String>,
    pub pedal_edema: Option<bool>,
    pub anemia: Option<bool>,
}

impl ClinicalSnapshot {
    /// Create an empty snapshot for a visit.
    #[must_use]
    pub fn new(visit_id: i64) -> Self {
        Self {
            visit_id,
            ..Self::default()
        }
    }

    /// Labels of the diabetes-model fields that are still null.
    ///
    /// The diabetes model refuses to run on partial data; the other tabular
    /// models default missing fields silently. Returned labels use the
    /// intake vocabulary so the data-entry UI can highlight them.
    #[must_use]
    pub fn missing_diabetes_fields(&self) -> Vec<&'static str> {
        let required: [(&'static str, bool); 8] = [
            ("nombre_grossesses", self.pregnancies.is_none()),
            ("taux_glucose", self.glucose_level.is_none()),
            ("pression_arterielle", self.blood_pressure.is_none()),
            ("epaisseur_pli_cutane", self.skin_thickness.is_none()),
            ("taux_insuline", self.insulin_level.is_none()),
            ("imc", self.bmi.is_none()),
            ("fonction_pedigree_diabete", self.diabetes_pedigree.is_none()),
            ("age", self.age.is_none()),
        ];
        required
            .into_iter()
            .filter_map(|(label, missing)| missing.then_some(label))
            .collect()
    }
}

/// A stored chest radiograph, input to the tuberculosis model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Radiograph {
    #[serde(rename = "id_image")]
    pub image_id: i64,
    #[serde(rename = "id_visite")]
    pub visit_id: i64,
    #[serde(rename = "chemin_fichier")]
    pub file_path: String,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_model_code() {
        assert!((Sex::Female.model_code() - 1.0).abs() < f64::EPSILON);
        assert!((Sex::Male.model_code() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sex_tag_roundtrip() {
        assert_eq!(Sex::from_tag("HOMME"), Some(Sex::Male));
        assert_eq!(Sex::from_tag("FEMME"), Some(Sex::Female));
        assert_eq!(Sex::from_tag("AUTRE"), None);
    }

    #[test]
    fn test_missing_diabetes_fields_on_empty_snapshot() {
        let snapshot = ClinicalSnapshot::new(1);
        let missing = snapshot.missing_diabetes_fields();
        assert_eq!(missing.len(), 8);
        assert!(missing.contains(&"taux_glucose"));
    }

    #[test]
    fn test_missing_diabetes_fields_on_complete_snapshot() {
        let snapshot = ClinicalSnapshot {
            pregnancies: Some(2.0),
            glucose_level: Some(148.0),
            blood_pressure: Some(72.0),
            skin_thickness: Some(35.0),
            insulin_level: Some(0.0),
            bmi: Some(33.6),
            diabetes_pedigree: Some(0.627),
            age: Some(50.0),
            ..ClinicalSnapshot::new(1)
        };
        assert!(snapshot.missing_diabetes_fields().is_empty());
    }
}
