//! Feature vector assembly.
//!
//! Maps a [`ClinicalSnapshot`] into the exact input schema one disease model
//! was trained on: storage vocabulary is renamed to model vocabulary, nulls
//! are coerced to type-appropriate defaults, and the stored sex enum becomes
//! the 1/2 numeric code the cardiovascular dataset used. The mapping is
//! total: the model never receives a missing field.

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::{ClinicalSnapshot, Disease, Sex};

/// One model input value: numeric, or a categorical string for the renal
/// model's yes/no and normal/abnormal fields.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Num(f64),
    Text(String),
}

impl Serialize for FeatureValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Num(n) => serializer.serialize_f64(*n),
            Self::Text(t) => serializer.serialize_str(t),
        }
    }
}

/// An ordered mapping of model input name to value.
///
/// Field order matches the model's declared schema and is preserved through
/// JSON serialization. Never persisted; built on demand per invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector(Vec<(&'static str, FeatureValue)>);

impl FeatureVector {
    /// Assemble the feature vector one disease model expects.
    ///
    /// The tuberculosis model consumes a radiograph rather than tabular
    /// features, so its vector is empty.
    #[must_use]
    pub fn assemble(disease: Disease, snapshot: &ClinicalSnapshot) -> Self {
        match disease {
            Disease::Diabetes => Self::diabetes(snapshot),
            Disease::RenalDisease => Self::renal(snapshot),
            Disease::Cardiovascular => Self::cardiovascular(snapshot),
            Disease::Tuberculosis => Self(Vec::new()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Field names in schema order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|(name, _)| *name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.0
            .iter()
            .find_map(|(n, v)| (*n == name).then_some(v))
    }

    fn diabetes(s: &ClinicalSnapshot) -> Self {
        Self(vec![
            num("Pregnancies", s.pregnancies),
            num("Glucose", s.glucose_level),
            num("BloodPressure", s.blood_pressure),
            num("SkinThickness", s.skin_thickness),
            num("Insulin", s.insulin_level),
            num("BMI", s.bmi),
            num("DiabetesPedigreeFunction", s.diabetes_pedigree),
            num("Age", s.age),
        ])
    }

    fn cardiovascular(s: &ClinicalSnapshot) -> Self {
        // Unrecognized/missing sex falls back to the male encoding, matching
        // the intake default.
        let gender = s.sex.map_or(Sex::Male.model_code(), Sex::model_code);
        Self(vec![
            ("gender", FeatureValue::Num(gender)),
            num("height", s.height_cm),
            num("weight", s.weight_kg),
            num("ap_hi", s.systolic_bp),
            num("ap_lo", s.diastolic_bp),
            num("cholesterol", s.cholesterol),
            num("gluc", s.cardio_glucose),
            flag("smoke", s.smoker),
            flag("alco", s.alcohol),
            flag("active", s.physical_activity),
            num("age_years", s.age),
        ])
    }

    fn renal(s: &ClinicalSnapshot) -> Self {
        Self(vec![
            num("age", s.age),
            num("bp", s.blood_pressure),
            num("sg", s.specific_gravity),
            num("al", s.albumin),
            num("su", s.sugar),
            text("rbc", s.urine_red_cells.as_deref(), "normal"),
            text("pc", s.pus_cells.as_deref(), "normal"),
            text("pcc", s.pus_cell_clumps.as_deref(), "notpresent"),
            text("ba", s.bacteria.as_deref(), "notpresent"),
            num("bgr", s.blood_glucose),
            num("bu", s.blood_urea),
            num("sc", s.serum_creatinine),
            num("sod", s.sodium),
            num("pot", s.potassium),
            num("hemo", s.hemoglobin),
            num("pcv", s.packed_cell_volume),
            num("wc", s.white_cell_count),
            num("rc", s.red_cell_count),
            yes_no("htn", s.hypertension),
            yes_no("dm", s.diabetes_mellitus),
            yes_no("cad", s.coronary_artery_disease),
            text("appet", s.appetite.as_deref(), "good"),
            yes_no("pe", s.pedal_edema),
            yes_no("ane", s.anemia),
        ])
    }
}

fn num(name: &'static str, value: Option<f64>) -> (&'static str, FeatureValue) {
    (name, FeatureValue::Num(value.unwrap_or(0.0)))
}

fn flag(name: &'static str, value: Option<bool>) -> (&'static str, FeatureValue) {
    (name, FeatureValue::Num(if value.unwrap_or(false) { 1.0 } else { 0.0 }))
}

fn yes_no(name: &'static str, value: Option<bool>) -> (&'static str, FeatureValue) {
    let text = if value.unwrap_or(false) { "yes" } else { "no" };
    (name, FeatureValue::Text(text.to_string()))
}

fn text(
    name: &'static str,
    value: Option<&str>,
    default: &'static str,
) -> (&'static str, FeatureValue) {
    (name, FeatureValue::Text(value.unwrap_or(default).to_string()))
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
