//! Model output parsing and failure classification.
//!
//! The inference programs print diagnostic lines (model load banners,
//! warnings the interpreter could not suppress) before the one JSON result
//! object. The parser keeps only lines that look like JSON, parses the
//! concatenation, and validates the `success` envelope. A program that hits
//! an internal error prints a `{"success": false, "error": ...}` payload and
//! exits non-zero, so failed runs are inspected for a structured error
//! before falling back to a generic one.

use serde::Deserialize;

use super::{Captured, RunnerError};
use crate::domain::ModelOutput;

/// Wire shape of the inference program's result object.
#[derive(Debug, Deserialize)]
struct RawResult {
    success: bool,
    #[serde(default)]
    probability: Option<f64>,
    #[serde(default)]
    prediction: Option<i64>,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default, rename = "confidenceLevel")]
    confidence_level: Option<String>,
    #[serde(default)]
    details: Option<RawDetails>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDetails {
    #[serde(default)]
    features: Option<Vec<String>>,
    #[serde(default)]
    interpretation: Option<String>,
    #[serde(default)]
    recommendation: Option<String>,
}

/// Extract the JSON-looking portion of process output: lines whose trimmed
/// content starts with `{` or `[`, joined in order. `None` when no line
/// qualifies.
pub(crate) fn extract_json(stdout: &str) -> Option<String> {
    let candidate: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{') || line.starts_with('['))
        .collect();
    if candidate.is_empty() {
        None
    } else {
        Some(candidate.join("\n"))
    }
}

fn parse_payload(stdout: &str) -> Result<RawResult, RunnerError> {
    let payload = extract_json(stdout).ok_or_else(|| RunnerError::Parse {
        detail: "no JSON payload in model output".to_string(),
    })?;
    serde_json::from_str(&payload).map_err(|e| RunnerError::Parse {
        detail: format!("invalid JSON payload in model output: {e}"),
    })
}

/// Interpret one captured run: classify failures and validate the success
/// payload into a [`ModelOutput`].
pub(crate) fn interpret(captured: &Captured, budget_secs: u64) -> Result<ModelOutput, RunnerError> {
    // A timeout kill wins over whatever the program managed to print.
    if captured.timed_out {
        return Err(RunnerError::Timeout { budget_secs });
    }

    match parse_payload(&captured.stdout) {
        Ok(raw) => {
            if !raw.success {
                return Err(RunnerError::Model {
                    message: raw
                        .error
                        .unwrap_or_else(|| "Erreur lors de la prédiction".to_string()),
                    stderr: captured.stderr.clone(),
                });
            }

            let probability = raw.probability.ok_or_else(|| RunnerError::Parse {
                detail: "successful result without a probability".to_string(),
            })?;
            if !(0.0..=1.0).contains(&probability) {
                return Err(RunnerError::Parse {
                    detail: format!("probability {probability} outside [0, 1]"),
                });
            }
            if let Some(threshold) = raw.threshold {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(RunnerError::Parse {
                        detail: format!("threshold {threshold} outside [0, 1]"),
                    });
                }
            }

            let details = raw.details.unwrap_or_default();
            Ok(ModelOutput {
                probability,
                prediction: raw.prediction,
                threshold: raw.threshold,
                confidence_level: raw.confidence_level,
                features: details.features.unwrap_or_default(),
                interpretation: details.interpretation,
                recommendation: details.recommendation,
            })
        }
        Err(parse_err) => {
            // Nothing structured to report. A clean exit with garbage output
            // is a parse problem; a failed exit is an invocation problem.
            if captured.exit_success() {
                Err(parse_err)
            } else {
                Err(RunnerError::Invocation {
                    message: format!(
                        "model process exited with {}",
                        captured.status_display()
                    ),
                    stderr: captured.stderr.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured(stdout: &str, stderr: &str, timed_out: bool, exit_code: Option<i32>) -> Captured {
        Captured {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            timed_out,
            exit_code,
        }
    }

    const SUCCESS_PAYLOAD: &str = r#"{"success": true, "prediction": 1, "probability": 0.82, "threshold": 0.5, "confidenceLevel": "Élevée", "details": {"features": ["Pression artérielle élevée"], "interpretation": "Signes présents.", "recommendation": null}}"#;

    #[test]
    fn test_extract_json_skips_noise_lines() {
        let stdout = format!(
            "Loading model...\n   Threshold : 0.5\nWARNING: deprecated\n{SUCCESS_PAYLOAD}\n"
        );
        assert_eq!(extract_json(&stdout), Some(SUCCESS_PAYLOAD.to_string()));
    }

    #[test]
    fn test_extract_json_tolerates_indented_payload() {
        let stdout = format!("banner\n   {SUCCESS_PAYLOAD}");
        assert_eq!(extract_json(&stdout), Some(SUCCESS_PAYLOAD.to_string()));
    }

    #[test]
    fn test_extract_json_none_without_candidates() {
        assert_eq!(extract_json("Loading model...\nall done\n"), None);
        assert_eq!(extract_json(""), None);
    }

    #[test]
    fn test_interpret_success() {
        let out = interpret(&captured(SUCCESS_PAYLOAD, "", false, Some(0)), 60)
            .expect("valid payload");
        assert!((out.probability - 0.82).abs() < f64::EPSILON);
        assert_eq!(out.threshold, Some(0.5));
        assert_eq!(out.prediction, Some(1));
        assert_eq!(out.confidence_level.as_deref(), Some("Élevée"));
        assert_eq!(out.features, vec!["Pression artérielle élevée".to_string()]);
        assert_eq!(out.recommendation, None);
    }

    #[test]
    fn test_interpret_success_with_noise_prefix() {
        let stdout = format!("line one\nline two\n{SUCCESS_PAYLOAD}");
        let out = interpret(&captured(&stdout, "", false, Some(0)), 60).expect("valid payload");
        assert!((out.probability - 0.82).abs() < f64::EPSILON);
    }

    #[test]
    fn test_interpret_model_failure_carries_program_message() {
        let stdout = r#"{"success": false, "error": "feature X out of range"}"#;
        let err = interpret(&captured(stdout, "traceback...", false, Some(1)), 60).unwrap_err();
        match err {
            RunnerError::Model { message, stderr } => {
                assert_eq!(message, "feature X out of range");
                assert_eq!(stderr, "traceback...");
            }
            other => panic!("expected Model error, got {other:?}"),
        }
    }

    #[test]
    fn test_interpret_model_failure_without_message() {
        let err = interpret(&captured(r#"{"success": false}"#, "", false, Some(1)), 60)
            .unwrap_err();
        match err {
            RunnerError::Model { message, .. } => {
                assert_eq!(message, "Erreur lors de la prédiction");
            }
            other => panic!("expected Model error, got {other:?}"),
        }
    }

    #[test]
    fn test_interpret_garbage_with_clean_exit_is_parse_error() {
        let err = interpret(&captured("no json here", "", false, Some(0)), 60).unwrap_err();
        assert!(matches!(err, RunnerError::Parse { .. }));
    }

    #[test]
    fn test_interpret_garbage_with_failed_exit_is_invocation_error() {
        let err = interpret(&captured("segfault notice", "boom", false, Some(139)), 60)
            .unwrap_err();
        match err {
            RunnerError::Invocation { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("expected Invocation error, got {other:?}"),
        }
    }

    #[test]
    fn test_timeout_wins_over_partial_output() {
        // Even a complete JSON payload is ignored once the child was killed
        // on the deadline.
        let err = interpret(&captured(SUCCESS_PAYLOAD, "", true, None), 60).unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { budget_secs: 60 }));
    }

    #[test]
    fn test_success_without_probability_is_parse_error() {
        let err = interpret(&captured(r#"{"success": true}"#, "", false, Some(0)), 60)
            .unwrap_err();
        assert!(matches!(err, RunnerError::Parse { .. }));
    }

    #[test]
    fn test_out_of_range_probability_is_rejected() {
        let stdout = r#"{"success": true, "probability": 1.7}"#;
        let err = interpret(&captured(stdout, "", false, Some(0)), 60).unwrap_err();
        assert!(matches!(err, RunnerError::Parse { .. }));
    }

    #[test]
    fn test_out_of_range_threshold_is_rejected() {
        // A broken calibration must not reach the decision stage: a
        // threshold above 1 makes the detected flag permanently false, one
        // below 0 makes it permanently true, and the image model has no
        // override to catch either.
        for threshold in ["1.5", "-0.2"] {
            let stdout =
                format!(r#"{{"success": true, "probability": 0.9, "threshold": {threshold}}}"#);
            let err = interpret(&captured(&stdout, "", false, Some(0)), 60).unwrap_err();
            assert!(matches!(err, RunnerError::Parse { .. }));
        }
    }

    #[test]
    fn test_boundary_thresholds_are_accepted() {
        for threshold in ["0.0", "1.0"] {
            let stdout =
                format!(r#"{{"success": true, "probability": 0.9, "threshold": {threshold}}}"#);
            let out = interpret(&captured(&stdout, "", false, Some(0)), 60).expect("valid");
            assert!(out.threshold.is_some());
        }
    }
}
