//! SQLite adapter: Implementation of `Storage`.
//!
//! Provides persistence for clinical snapshots, radiographs, predictions,
//! explainability rows, and clinician validations.
//!
//! # Atomicity
//!
//! A prediction and its contribution rows are inserted inside one
//! transaction: a crash between the two writes cannot leave an orphaned
//! prediction without explanations. Contribution and validation rows also
//! cascade-delete with their prediction.
//!
//! # Mutex Behavior
//!
//! Database connection is protected by `Mutex`. A poisoned mutex (from panic
//! in another thread) will cause panic. This fail-fast behavior is
//! intentional for data integrity in healthcare applications.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{
    ClinicalSnapshot, Contribution, Disease, PredictionDraft, PredictionRecord, Radiograph,
    Sex, Validation, ValidationDraft, ValidationStatus,
};
use crate::ports::Storage;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// SQLite storage adapter.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Create a new SQLite storage with the given database path.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().expect("Lock failed");

        conn.execute_batch(
            r"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS clinical_snapshots (
                visit_id INTEGER PRIMARY KEY,
                sex TEXT,
                age REAL,
                height_cm REAL,
                weight_kg REAL,
                systolic_bp REAL,
                diastolic_bp REAL,
                cholesterol REAL,
                cardio_glucose REAL,
                smoker INTEGER,
                alcohol INTEGER,
                physical_activity INTEGER,
                pregnancies REAL,
                glucose_level REAL,
                blood_pressure REAL,
                skin_thickness REAL,
                insulin_level REAL,
                bmi REAL,
                diabetes_pedigree REAL,
                specific_gravity REAL,
                albumin REAL,
                sugar REAL,
                urine_red_cells TEXT,
                pus_cells TEXT,
                pus_cell_clumps TEXT,
                bacteria TEXT,
                blood_glucose REAL,
                blood_urea REAL,
                serum_creatinine REAL,
                sodium REAL,
                potassium REAL,
                hemoglobin REAL,
                packed_cell_volume REAL,
                white_cell_count REAL,
                red_cell_count REAL,
                hypertension INTEGER,
                diabetes_mellitus INTEGER,
                coronary_artery_disease INTEGER,
                appetite TEXT,
                pedal_edema INTEGER,
                anemia INTEGER,
                recorded_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS radiographs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                visit_id INTEGER NOT NULL,
                file_path TEXT NOT NULL,
                uploaded_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                visit_id INTEGER NOT NULL,
                image_id INTEGER,
                disease TEXT NOT NULL,
                probability REAL NOT NULL,
                threshold REAL NOT NULL,
                detected INTEGER NOT NULL,
                confidence REAL NOT NULL,
                confidence_level TEXT NOT NULL,
                interpretation TEXT NOT NULL,
                recommendation TEXT,
                features_json TEXT NOT NULL,
                model_version TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS explanations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prediction_id INTEGER NOT NULL
                    REFERENCES predictions(id) ON DELETE CASCADE,
                variable TEXT NOT NULL,
                contribution REAL NOT NULL CHECK (contribution >= 0)
            );

            CREATE TABLE IF NOT EXISTS validations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prediction_id INTEGER NOT NULL
                    REFERENCES predictions(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                doctor_name TEXT,
                comment TEXT,
                final_diagnosis TEXT,
                validated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_predictions_visit
                ON predictions(visit_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_explanations_prediction
                ON explanations(prediction_id);
            CREATE INDEX IF NOT EXISTS idx_validations_prediction
                ON validations(prediction_id, validated_at DESC);
            ",
        )?;

        Ok(())
    }

    fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<ClinicalSnapshot> {
        let sex: Option<String> = row.get("sex")?;
        Ok(ClinicalSnapshot {
            visit_id: row.get("visit_id")?,
            sex: sex.as_deref().and_then(Sex::from_tag),
            age: row.get("age")?,
            height_cm: row.get("height_cm")?,
            weight_kg: row.get("weight_kg")?,
            systolic_bp: row.get("systolic_bp")?,
            diastolic_bp: row.get("diastolic_bp")?,
            cholesterol: row.get("cholesterol")?,
            cardio_glucose: row.get("cardio_glucose")?,
            smoker: row.get("smoker")?,
            alcohol: row.get("alcohol")?,
            physical_activity: row.get("physical_activity")?,
            pregnancies: row.get("pregnancies")?,
            glucose_level: row.get("glucose_level")?,
            blood_pressure: row.get("blood_pressure")?,
            skin_thickness: row.get("skin_thickness")?,
            insulin_level: row.get("insulin_level")?,
            bmi: row.get("bmi")?,
            diabetes_pedigree: row.get("diabetes_pedigree")?,
            specific_gravity: row.get("specific_gravity")?,
            albumin: row.get("albumin")?,
            sugar: row.get("sugar")?,
            urine_red_cells: row.get("urine_red_cells")?,
            pus_cells: row.get("pus_cells")?,
            pus_cell_clumps: row.get("pus_cell_clumps")?,
            bacteria: row.get("bacteria")?,
            blood_glucose: row.get("blood_glucose")?,
            blood_urea: row.get("blood_urea")?,
            serum_creatinine: row.get("serum_creatinine")?,
            sodium: row.get("sodium")?,
            potassium: row.get("potassium")?,
            hemoglobin: row.get("hemoglobin")?,
            packed_cell_volume: row.get("packed_cell_volume")?,
            white_cell_count: row.get("white_cell_count")?,
            red_cell_count: row.get("red_cell_count")?,
            hypertension: row.get("hypertension")?,
            diabetes_mellitus: row.get("diabetes_mellitus")?,
            coronary_artery_disease: row.get("coronary_artery_disease")?,
            appetite: row.get("appetite")?,
            pedal_edema: row.get("pedal_edema")?,
            anemia: row.get("anemia")?,
        })
    }

    fn parse_timestamp(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, StorageError> {
        chrono::DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| StorageError::Serialization(format!("bad timestamp {raw:?}: {e}")))
    }

    /// Read one prediction row plus its ordered children.
    fn load_prediction(
        conn: &Connection,
        id: i64,
    ) -> Result<Option<PredictionRecord>, StorageError> {
        struct PredictionRow {
            id: i64,
            visit_id: i64,
            image_id: Option<i64>,
            disease: String,
            probability: f64,
            threshold: f64,
            detected: bool,
            confidence: f64,
            confidence_level: String,
            interpretation: String,
            recommendation: Option<String>,
            features_json: String,
            model_version: String,
            created_at: String,
        }

        let row = conn
            .query_row(
                r"
                SELECT id, visit_id, image_id, disease, probability, threshold,
                       detected, confidence, confidence_level, interpretation,
                       recommendation, features_json, model_version, created_at
                FROM predictions WHERE id = ?1
                ",
                [id],
                |row| {
                    Ok(PredictionRow {
                        id: row.get(0)?,
                        visit_id: row.get(1)?,
                        image_id: row.get(2)?,
                        disease: row.get(3)?,
                        probability: row.get(4)?,
                        threshold: row.get(5)?,
                        detected: row.get(6)?,
                        confidence: row.get(7)?,
                        confidence_level: row.get(8)?,
                        interpretation: row.get(9)?,
                        recommendation: row.get(10)?,
                        features_json: row.get(11)?,
                        model_version: row.get(12)?,
                        created_at: row.get(13)?,
                    })
                },
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };

        let disease = Disease::from_tag(&row.disease).ok_or_else(|| {
            StorageError::Serialization(format!("unknown disease tag {:?}", row.disease))
        })?;
        let features: Vec<String> = serde_json::from_str(&row.features_json)
            .map_err(|e| StorageError::Serialization(format!("bad features payload: {e}")))?;

        let mut stmt = conn.prepare(
            r"
            SELECT variable, contribution FROM explanations
            WHERE prediction_id = ?1
            ORDER BY contribution DESC, id ASC
            ",
        )?;
        let contributions = stmt
            .query_map([id], |row| {
                Ok(Contribution {
                    variable: row.get(0)?,
                    weight: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            r"
            SELECT id, status, doctor_name, comment, final_diagnosis, validated_at
            FROM validations
            WHERE prediction_id = ?1
            ORDER BY validated_at DESC, id DESC
            ",
        )?;
        let validation_rows = stmt
            .query_map([id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut validations = Vec::with_capacity(validation_rows.len());
        for (vid, status, doctor_name, comment, final_diagnosis, validated_at) in validation_rows
        {
            let status = ValidationStatus::from_tag(&status).ok_or_else(|| {
                StorageError::Serialization(format!("unknown validation status {status:?}"))
            })?;
            validations.push(Validation {
                id: vid,
                prediction_id: id,
                status,
                doctor_name,
                comment,
                final_diagnosis,
                validated_at: Self::parse_timestamp(&validated_at)?,
            });
        }

        Ok(Some(PredictionRecord {
            id: row.id,
            visit_id: row.visit_id,
            image_id: row.image_id,
            disease,
            probability: row.probability,
            threshold: row.threshold,
            detected: row.detected,
            confidence: row.confidence,
            confidence_level: row.confidence_level,
            interpretation: row.interpretation,
            recommendation: row.recommendation,
            features,
            model_version: row.model_version,
            created_at: Self::parse_timestamp(&row.created_at)?,
            contributions,
            validations,
        }))
    }
}

impl Storage for SqliteStorage {
    type Error = StorageError;

    fn save_snapshot(&self, snapshot: &ClinicalSnapshot) -> Result<(), StorageError> {
        let conn = self.conn.lock().expect("Lock failed");
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            r"
            INSERT OR REPLACE INTO clinical_snapshots (
                visit_id, sex, age, height_cm, weight_kg,
                systolic_bp, diastolic_bp, cholesterol, cardio_glucose,
                smoker, alcohol, physical_activity,
                pregnancies, glucose_level, blood_pressure, skin_thickness,
                insulin_level, bmi, diabetes_pedigree,
                specific_gravity, albumin, sugar,
                urine_red_cells, pus_cells, pus_cell_clumps, bacteria,
                blood_glucose, blood_urea, serum_creatinine, sodium, potassium,
                hemoglobin, packed_cell_volume, white_cell_count, red_cell_count,
                hypertension, diabetes_mellitus, coronary_artery_disease,
                appetite, pedal_edema, anemia, recorded_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20,
                ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
                ?31, ?32, ?33, ?34, ?35, ?36, ?37, ?38, ?39, ?40,
                ?41, ?42
            )
            ",
            params![
                snapshot.visit_id,
                snapshot.sex.map(Sex::tag),
                snapshot.age,
                snapshot.height_cm,
                snapshot.weight_kg,
                snapshot.systolic_bp,
                snapshot.diastolic_bp,
                snapshot.cholesterol,
                snapshot.cardio_glucose,
                snapshot.smoker,
                snapshot.alcohol,
                snapshot.physical_activity,
                snapshot.pregnancies,
                snapshot.glucose_level,
                snapshot.blood_pressure,
                snapshot.skin_thickness,
                snapshot.insulin_level,
                snapshot.bmi,
                snapshot.diabetes_pedigree,
                snapshot.specific_gravity,
                snapshot.albumin,
                snapshot.sugar,
                snapshot.urine_red_cells,
                snapshot.pus_cells,
                snapshot.pus_cell_clumps,
                snapshot.bacteria,
                snapshot.blood_glucose,
                snapshot.blood_urea,
                snapshot.serum_creatinine,
                snapshot.sodium,
                snapshot.potassium,
                snapshot.hemoglobin,
                snapshot.packed_cell_volume,
                snapshot.white_cell_count,
                snapshot.red_cell_count,
                snapshot.hypertension,
                snapshot.diabetes_mellitus,
                snapshot.coronary_artery_disease,
                snapshot.appetite,
                snapshot.pedal_edema,
                snapshot.anemia,
                now,
            ],
        )?;

        Ok(())
    }

    fn fetch_snapshot(&self, visit_id: i64) -> Result<Option<ClinicalSnapshot>, StorageError> {
        let conn = self.conn.lock().expect("Lock failed");
        let snapshot = conn
            .query_row(
                "SELECT * FROM clinical_snapshots WHERE visit_id = ?1",
                [visit_id],
                Self::snapshot_from_row,
            )
            .optional()?;
        Ok(snapshot)
    }

    fn save_radiograph(&self, visit_id: i64, file_path: &str) -> Result<i64, StorageError> {
        let conn = self.conn.lock().expect("Lock failed");
        conn.execute(
            "INSERT INTO radiographs (visit_id, file_path, uploaded_at) VALUES (?1, ?2, ?3)",
            params![visit_id, file_path, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn fetch_radiograph(&self, image_id: i64) -> Result<Option<Radiograph>, StorageError> {
        let conn = self.conn.lock().expect("Lock failed");
        let row = conn
            .query_row(
                "SELECT id, visit_id, file_path, uploaded_at FROM radiographs WHERE id = ?1",
                [image_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, visit_id, file_path, uploaded_at)) => Ok(Some(Radiograph {
                image_id: id,
                visit_id,
                file_path,
                uploaded_at: Self::parse_timestamp(&uploaded_at)?,
            })),
            None => Ok(None),
        }
    }

    fn save_prediction(
        &self,
        draft: &PredictionDraft,
        contributions: &[Contribution],
    ) -> Result<i64, StorageError> {
        let mut conn = self.conn.lock().expect("Lock failed");
        let features_json = serde_json::to_string(&draft.features)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = chrono::Utc::now().to_rfc3339();

        // One transaction for the record and its children; a failure on any
        // insert rolls everything back.
        let tx = conn.transaction()?;
        tx.execute(
            r"
            INSERT INTO predictions (
                visit_id, image_id, disease, probability, threshold,
                detected, confidence, confidence_level, interpretation,
                recommendation, features_json, model_version, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
            params![
                draft.visit_id,
                draft.image_id,
                draft.disease.tag(),
                draft.probability,
                draft.threshold,
                draft.detected,
                draft.confidence,
                draft.confidence_level,
                draft.interpretation,
                draft.recommendation,
                features_json,
                draft.model_version,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO explanations (prediction_id, variable, contribution)
                 VALUES (?1, ?2, ?3)",
            )?;
            for contribution in contributions {
                stmt.execute(params![id, contribution.variable, contribution.weight])?;
            }
        }

        tx.commit()?;
        tracing::debug!(
            "stored prediction {} for visit {} ({})",
            id,
            draft.visit_id,
            draft.disease
        );
        Ok(id)
    }

    fn fetch_prediction(&self, id: i64) -> Result<Option<PredictionRecord>, StorageError> {
        let conn = self.conn.lock().expect("Lock failed");
        Self::load_prediction(&conn, id)
    }

    fn predictions_for_visit(
        &self,
        visit_id: i64,
    ) -> Result<Vec<PredictionRecord>, StorageError> {
        let conn = self.conn.lock().expect("Lock failed");
        let ids: Vec<i64> = conn
            .prepare(
                "SELECT id FROM predictions WHERE visit_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?
            .query_map([visit_id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = Self::load_prediction(&conn, id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn save_validation(&self, draft: &ValidationDraft) -> Result<i64, StorageError> {
        let conn = self.conn.lock().expect("Lock failed");

        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM predictions WHERE id = ?1",
                [draft.prediction_id],
                |row| row.get::<_, i64>(0).map(|n| n > 0),
            )?;
        if !exists {
            return Err(StorageError::NotFound(format!(
                "prediction {}",
                draft.prediction_id
            )));
        }

        conn.execute(
            r"
            INSERT INTO validations (
                prediction_id, status, doctor_name, comment, final_diagnosis,
                validated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                draft.prediction_id,
                draft.status.tag(),
                draft.doctor_name,
                draft.comment,
                draft.final_diagnosis,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelOutput;

    fn storage() -> SqliteStorage {
        SqliteStorage::in_memory().expect("Should create db")
    }

    fn draft(visit_id: i64) -> (PredictionDraft, Vec<Contribution>) {
        let output = ModelOutput {
            probability: 0.82,
            threshold: Some(0.5),
            ..ModelOutput::default()
        };
        PredictionDraft::from_output(Disease::Cardiovascular, visit_id, None, &output)
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let storage = storage();
        let snapshot = ClinicalSnapshot {
            sex: Some(Sex::Male),
            age: Some(55.0),
            systolic_bp: Some(150.0),
            diastolic_bp: Some(95.0),
            cholesterol: Some(3.0),
            cardio_glucose: Some(2.0),
            smoker: Some(true),
            urine_red_cells: Some("abnormal".to_string()),
            ..ClinicalSnapshot::new(7)
        };
        storage.save_snapshot(&snapshot).expect("save");

        let loaded = storage
            .fetch_snapshot(7)
            .expect("fetch")
            .expect("snapshot exists");
        assert_eq!(loaded.visit_id, 7);
        assert_eq!(loaded.sex, Some(Sex::Male));
        assert_eq!(loaded.systolic_bp, Some(150.0));
        assert_eq!(loaded.smoker, Some(true));
        assert_eq!(loaded.urine_red_cells.as_deref(), Some("abnormal"));
        assert_eq!(loaded.bmi, None);

        assert!(storage.fetch_snapshot(99).expect("fetch").is_none());
    }

    #[test]
    fn test_snapshot_replace_on_reentry() {
        let storage = storage();
        let mut snapshot = ClinicalSnapshot::new(7);
        snapshot.age = Some(50.0);
        storage.save_snapshot(&snapshot).expect("save");
        snapshot.age = Some(51.0);
        storage.save_snapshot(&snapshot).expect("save again");

        let loaded = storage.fetch_snapshot(7).expect("fetch").expect("exists");
        assert_eq!(loaded.age, Some(51.0));
    }

    #[test]
    fn test_radiograph_roundtrip() {
        let storage = storage();
        let id = storage
            .save_radiograph(7, "/uploads/radios/7.png")
            .expect("save");
        let loaded = storage
            .fetch_radiograph(id)
            .expect("fetch")
            .expect("exists");
        assert_eq!(loaded.visit_id, 7);
        assert_eq!(loaded.file_path, "/uploads/radios/7.png");
        assert!(storage.fetch_radiograph(id + 1).expect("fetch").is_none());
    }

    #[test]
    fn test_prediction_roundtrip_with_ordered_contributions() {
        let storage = storage();
        let (draft, contributions) = draft(7);
        let id = storage
            .save_prediction(&draft, &contributions)
            .expect("save");

        let record = storage
            .fetch_prediction(id)
            .expect("fetch")
            .expect("exists");
        assert_eq!(record.visit_id, 7);
        assert_eq!(record.disease, Disease::Cardiovascular);
        assert!((record.probability - 0.82).abs() < f64::EPSILON);
        assert!(record.detected);
        assert_eq!(record.contributions.len(), contributions.len());
        for pair in record.contributions.windows(2) {
            assert!(pair[0].weight >= pair[1].weight);
        }
        assert!(record.validations.is_empty());
    }

    #[test]
    fn test_validations_come_back_most_recent_first() {
        let storage = storage();
        let (draft, contributions) = draft(7);
        let id = storage
            .save_prediction(&draft, &contributions)
            .expect("save");

        for status in [ValidationStatus::Pending, ValidationStatus::Validated] {
            storage
                .save_validation(&ValidationDraft {
                    prediction_id: id,
                    status,
                    doctor_name: Some("Dr Diallo".to_string()),
                    comment: None,
                    final_diagnosis: None,
                })
                .expect("save validation");
        }

        let record = storage
            .fetch_prediction(id)
            .expect("fetch")
            .expect("exists");
        assert_eq!(record.validations.len(), 2);
        // Same-second inserts fall back to id ordering.
        assert_eq!(record.validations[0].status, ValidationStatus::Validated);
    }

    #[test]
    fn test_validation_against_unknown_prediction_is_rejected() {
        let storage = storage();
        let err = storage
            .save_validation(&ValidationDraft {
                prediction_id: 42,
                status: ValidationStatus::Validated,
                doctor_name: None,
                comment: None,
                final_diagnosis: None,
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_predictions_for_visit_filters_and_orders() {
        let storage = storage();
        let (d1, c1) = draft(7);
        let (d2, c2) = draft(7);
        let (other, c3) = draft(8);
        let first = storage.save_prediction(&d1, &c1).expect("save");
        let second = storage.save_prediction(&d2, &c2).expect("save");
        storage.save_prediction(&other, &c3).expect("save");

        let records = storage.predictions_for_visit(7).expect("list");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, second);
        assert_eq!(records[1].id, first);
    }

    #[test]
    fn test_failed_explanation_insert_rolls_back_the_prediction() {
        let storage = storage();
        let (draft, mut contributions) = draft(7);
        // Weights are magnitudes; a negative one violates the explanations
        // CHECK constraint partway through the batch.
        contributions.push(Contribution {
            variable: "poids invalide".to_string(),
            weight: -0.5,
        });

        let err = storage.save_prediction(&draft, &contributions).unwrap_err();
        assert!(matches!(err, StorageError::Database(_)));

        // The prediction row from the same transaction is gone too.
        assert!(storage.predictions_for_visit(7).expect("list").is_empty());
        let conn = storage.conn.lock().expect("Lock failed");
        let orphans: i64 = conn
            .query_row("SELECT COUNT(*) FROM explanations", [], |row| row.get(0))
            .expect("count");
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_explanations_cascade_with_prediction() {
        let storage = storage();
        let (draft, contributions) = draft(7);
        let id = storage
            .save_prediction(&draft, &contributions)
            .expect("save");

        {
            let conn = storage.conn.lock().expect("Lock failed");
            conn.execute("DELETE FROM predictions WHERE id = ?1", [id])
                .expect("delete");
            let orphans: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM explanations WHERE prediction_id = ?1",
                    [id],
                    |row| row.get(0),
                )
                .expect("count");
            assert_eq!(orphans, 0);
        }
    }
}
