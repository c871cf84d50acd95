//! HTTP API: Axum routes over the prediction service.
//!
//! The prediction pipeline is synchronous (subprocess invocation, SQLite);
//! handlers hop to the blocking pool with `spawn_blocking` so a two-minute
//! model run never stalls the async runtime.
//!
//! Error payloads are the user-facing surface: French messages, with raw
//! stderr carried only in the `details` field.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Json, Path, Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::adapters::{RunnerError, SqliteStorage, SubprocessRunner};
use crate::application::{PredictionRequest, PredictionService};
use crate::domain::{ClinicalSnapshot, Disease, PredictionRecord, ValidationDraft};
use crate::PredictError;

/// The service wired to the production adapters.
pub type AppService = PredictionService<SubprocessRunner, SqliteStorage>;

/// Build the application router.
pub fn router(service: Arc<AppService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/predictions/diabete", post(predict_diabetes))
        .route("/api/predictions/renale", post(predict_renal))
        .route("/api/predictions/cardio", post(predict_cardiovascular))
        .route("/api/predictions/tuberculose", post(predict_tuberculosis))
        .route("/api/predictions/:id", get(get_prediction))
        .route("/api/visites/:id/predictions", get(visit_predictions))
        .route("/api/donnees-cliniques", post(post_snapshot))
        .route("/api/images-radiographie", post(post_radiograph))
        .route("/api/validations", post(post_validation))
        .layer(cors)
        .with_state(service)
}

#[derive(Debug, Deserialize)]
struct PredictBody {
    id_visite: Option<i64>,
    id_image: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RadiographBody {
    id_visite: i64,
    chemin_fichier: String,
}

#[derive(Debug, Serialize)]
struct PredictionResponse {
    message: &'static str,
    prediction: PredictionRecord,
}

#[derive(Debug, Serialize)]
struct CreatedResponse {
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
}

/// Error payload returned to clients.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    timeout: bool,
}

/// `Json` extractor whose rejection is the structured error payload, so a
/// malformed or mistyped request body never surfaces axum's plain-text
/// response.
struct ApiJson<T>(T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError {
                status: rejection.status(),
                error: "Corps de requête invalide".to_string(),
                details: Some(rejection.body_text()),
                timeout: false,
            }),
        }
    }
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: message.into(),
            details: None,
            timeout: false,
        }
    }
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::Validation(message) => Self {
                status: StatusCode::BAD_REQUEST,
                error: message,
                details: None,
                timeout: false,
            },
            PredictError::NotFound(message) => Self {
                status: StatusCode::NOT_FOUND,
                error: message,
                details: None,
                timeout: false,
            },
            PredictError::Runner(RunnerError::Timeout { budget_secs }) => {
                let mut error =
                    "Le modèle prend trop de temps à charger. Veuillez réessayer.".to_string();
                if budget_secs >= 120 {
                    error.push_str(" (Timeout après 2 minutes)");
                }
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    error,
                    details: None,
                    timeout: true,
                }
            }
            PredictError::Runner(RunnerError::Model { message, stderr }) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error: message,
                details: Some(if stderr.is_empty() {
                    "Erreur inconnue".to_string()
                } else {
                    stderr
                }),
                timeout: false,
            },
            PredictError::Runner(RunnerError::Invocation { message, stderr }) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error: "Erreur lors de l'exécution du modèle".to_string(),
                details: Some(if stderr.is_empty() { message } else { stderr }),
                timeout: false,
            },
            PredictError::Runner(RunnerError::Parse { detail }) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error: "Erreur lors de la prédiction".to_string(),
                details: Some(detail),
                timeout: false,
            },
            PredictError::Runner(err) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error: "Erreur lors de l'exécution du modèle".to_string(),
                details: Some(err.to_string()),
                timeout: false,
            },
            PredictError::Storage(err) => {
                tracing::error!("storage failure surfaced to API: {err}");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    error: "Erreur lors de la génération de la prédiction".to_string(),
                    details: None,
                    timeout: false,
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Shared body of the four prediction routes.
async fn run_prediction(
    service: Arc<AppService>,
    disease: Disease,
    body: PredictBody,
) -> Result<Response, ApiError> {
    let visit_id = body
        .id_visite
        .ok_or_else(|| ApiError::bad_request("ID visite est requis"))?;

    let request = PredictionRequest {
        disease,
        visit_id,
        image_id: body.id_image,
    };
    let record = tokio::task::spawn_blocking(move || service.run(request))
        .await
        .map_err(|e| {
            tracing::error!("prediction task panicked: {e}");
            ApiError::from(PredictError::Runner(RunnerError::Invocation {
                message: "Erreur lors de l'exécution du modèle".to_string(),
                stderr: String::new(),
            }))
        })??;

    Ok((
        StatusCode::CREATED,
        Json(PredictionResponse {
            message: "Prédiction générée avec succès",
            prediction: record,
        }),
    )
        .into_response())
}

async fn predict_diabetes(
    State(service): State<Arc<AppService>>,
    ApiJson(body): ApiJson<PredictBody>,
) -> Result<Response, ApiError> {
    run_prediction(service, Disease::Diabetes, body).await
}

async fn predict_renal(
    State(service): State<Arc<AppService>>,
    ApiJson(body): ApiJson<PredictBody>,
) -> Result<Response, ApiError> {
    run_prediction(service, Disease::RenalDisease, body).await
}

async fn predict_cardiovascular(
    State(service): State<Arc<AppService>>,
    ApiJson(body): ApiJson<PredictBody>,
) -> Result<Response, ApiError> {
    run_prediction(service, Disease::Cardiovascular, body).await
}

async fn predict_tuberculosis(
    State(service): State<Arc<AppService>>,
    ApiJson(body): ApiJson<PredictBody>,
) -> Result<Response, ApiError> {
    run_prediction(service, Disease::Tuberculosis, body).await
}

async fn get_prediction(
    State(service): State<Arc<AppService>>,
    Path(id): Path<i64>,
) -> Result<Json<PredictionRecord>, ApiError> {
    let record = tokio::task::spawn_blocking(move || service.prediction(id))
        .await
        .map_err(|e| {
            tracing::error!("read task panicked: {e}");
            ApiError::from(PredictError::NotFound("Prédiction non trouvée".to_string()))
        })??;
    Ok(Json(record))
}

async fn visit_predictions(
    State(service): State<Arc<AppService>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PredictionRecord>>, ApiError> {
    let records = tokio::task::spawn_blocking(move || service.predictions_for_visit(id))
        .await
        .map_err(|e| {
            tracing::error!("read task panicked: {e}");
            ApiError::from(PredictError::NotFound("Prédiction non trouvée".to_string()))
        })??;
    Ok(Json(records))
}

async fn post_snapshot(
    State(service): State<Arc<AppService>>,
    ApiJson(snapshot): ApiJson<ClinicalSnapshot>,
) -> Result<Response, ApiError> {
    if snapshot.visit_id <= 0 {
        return Err(ApiError::bad_request("ID visite est requis"));
    }
    tokio::task::spawn_blocking(move || service.record_snapshot(&snapshot))
        .await
        .map_err(|e| {
            tracing::error!("write task panicked: {e}");
            ApiError::bad_request("Erreur lors de l'enregistrement")
        })??;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: "Données cliniques enregistrées",
            id: None,
        }),
    )
        .into_response())
}

async fn post_radiograph(
    State(service): State<Arc<AppService>>,
    ApiJson(body): ApiJson<RadiographBody>,
) -> Result<Response, ApiError> {
    if body.chemin_fichier.is_empty() {
        return Err(ApiError::bad_request("Chemin du fichier est requis"));
    }
    let id = tokio::task::spawn_blocking(move || {
        service.record_radiograph(body.id_visite, &body.chemin_fichier)
    })
    .await
    .map_err(|e| {
        tracing::error!("write task panicked: {e}");
        ApiError::bad_request("Erreur lors de l'enregistrement")
    })??;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: "Image radiographie enregistrée",
            id: Some(id),
        }),
    )
        .into_response())
}

async fn post_validation(
    State(service): State<Arc<AppService>>,
    ApiJson(draft): ApiJson<ValidationDraft>,
) -> Result<Response, ApiError> {
    let id = tokio::task::spawn_blocking(move || service.record_validation(&draft))
        .await
        .map_err(|e| {
            tracing::error!("write task panicked: {e}");
            ApiError::bad_request("Erreur lors de l'enregistrement")
        })??;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: "Validation enregistrée",
            id: Some(id),
        }),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_map_to_400() {
        let api: ApiError = PredictError::Validation("Champs manquants: imc".to_string()).into();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.error, "Champs manquants: imc");
        assert!(!api.timeout);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let api: ApiError =
            PredictError::NotFound("Prédiction non trouvée".to_string()).into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_timeout_carries_flag_and_long_budget_suffix() {
        let short: ApiError =
            PredictError::Runner(RunnerError::Timeout { budget_secs: 60 }).into();
        assert_eq!(short.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(short.timeout);
        assert!(!short.error.contains("2 minutes"));

        let long: ApiError =
            PredictError::Runner(RunnerError::Timeout { budget_secs: 120 }).into();
        assert!(long.timeout);
        assert!(long.error.contains("Timeout après 2 minutes"));
    }

    #[test]
    fn test_model_error_message_passes_through() {
        let api: ApiError = PredictError::Runner(RunnerError::Model {
            message: "Valeur de glucose invalide".to_string(),
            stderr: String::new(),
        })
        .into();
        assert_eq!(api.error, "Valeur de glucose invalide");
        assert_eq!(api.details.as_deref(), Some("Erreur inconnue"));
    }

    #[test]
    fn test_parse_error_is_generic_with_details() {
        let api: ApiError = PredictError::Runner(RunnerError::Parse {
            detail: "no JSON object in output".to_string(),
        })
        .into();
        assert_eq!(api.error, "Erreur lors de la prédiction");
        assert_eq!(api.details.as_deref(), Some("no JSON object in output"));
    }

    #[test]
    fn test_timeout_flag_absent_from_non_timeout_payloads() {
        let api: ApiError = PredictError::Validation("x".to_string()).into();
        let json = serde_json::to_value(&api).expect("serialize");
        assert!(json.get("timeout").is_none());
        assert!(json.get("details").is_none());
    }

    fn test_router() -> Router {
        let storage = Arc::new(SqliteStorage::in_memory().expect("Should create db"));
        let runner = Arc::new(SubprocessRunner::new(crate::adapters::RunnerConfig::default()));
        router(Arc::new(PredictionService::new(runner, storage)))
    }

    async fn error_payload(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("structured JSON error body")
    }

    #[tokio::test]
    async fn test_malformed_body_gets_a_structured_error_payload() {
        use tower::ServiceExt;

        let app = test_router();

        // Bad JSON syntax.
        let response = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/validations")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from("{not json"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert!(response.status().is_client_error());
        let payload = error_payload(response).await;
        assert_eq!(payload["error"], "Corps de requête invalide");
        assert!(payload.get("details").is_some());

        // Wrong field type.
        let response = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/predictions/cardio")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(r#"{"id_visite": "sept"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert!(response.status().is_client_error());
        let payload = error_payload(response).await;
        assert_eq!(payload["error"], "Corps de requête invalide");

        // Missing content type.
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/validations")
                    .body(axum::body::Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert!(response.status().is_client_error());
        let payload = error_payload(response).await;
        assert_eq!(payload["error"], "Corps de requête invalide");
    }
}
