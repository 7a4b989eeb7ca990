//! HTTP gateway server built on axum.

use super::artifact::{CleanupStream, TempArtifact};
use super::error::ApiError;
use super::SharedState;
use axum::{
    Json, Router,
    body::Body,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::MultipartRejection,
    },
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use exoplanet_ml::{PredictError, PredictionSummary};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub const STATUS_PATH: &str = "/api/status";
pub const PREDICT_PATH: &str = "/api/predict/from_csv";
pub const STATUS_MESSAGE: &str = "Backend activo y listo para predicciones";

/// Multipart field carrying the CSV upload.
const UPLOAD_FIELD: &str = "file";

const X_TOTAL_ROWS: &str = "x-total-rows";
const X_POSITIVES: &str = "x-predictions-positives";
const X_NEGATIVES: &str = "x-predictions-negatives";
const X_REQUEST_ID: &str = "x-request-id";

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
    message: &'static str,
}

/// Build an axum Router with the status and prediction routes.
pub fn router(state: SharedState) -> Router {
    let body_limit = state.max_upload_bytes();
    Router::new()
        .route(STATUS_PATH, get(status_handler))
        .route(PREDICT_PATH, post(predict_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe.
async fn status_handler() -> Json<StatusBody> {
    Json(StatusBody {
        status: "ok",
        message: STATUS_MESSAGE,
    })
}

struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

/// Find the `file` field; other fields are skipped.
async fn read_upload(multipart: &mut Multipart) -> Result<Option<Upload>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        return Ok(Some(Upload {
            filename,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

/// Score an uploaded CSV and stream back the augmented table.
async fn predict_handler(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart?;
    let request_id = Uuid::new_v4();
    let upload = read_upload(&mut multipart)
        .await?
        .ok_or_else(|| ApiError::missing_field(UPLOAD_FIELD))?;
    tracing::info!(
        %request_id,
        filename = %upload.filename,
        bytes = upload.bytes.len(),
        "Received prediction upload"
    );

    // Parsing, scoring and the file write are CPU/disk bound.
    let worker = state.clone();
    let (summary, artifact) = tokio::task::spawn_blocking(move || {
        let scored = worker
            .service()
            .score_upload(&upload.filename, &upload.bytes)?;
        let artifact = TempArtifact::write(worker.temp_dir(), &scored.dataset)?;
        Ok::<_, PredictError>((scored.summary, artifact))
    })
    .await
    .map_err(|e| ApiError::internal(format!("Error en la predicción: {e}")))??;

    let headers = download_headers(state.download_name(), &summary, artifact.len(), request_id)?;
    let path = artifact
        .path()
        .ok_or_else(|| ApiError::internal("Error en la predicción: result file missing"))?
        .to_path_buf();
    let file = tokio::fs::File::open(&path).await?;
    let body = Body::from_stream(CleanupStream::new(ReaderStream::new(file), artifact));

    tracing::info!(
        %request_id,
        rows = summary.total_rows,
        positives = summary.predictions_positives,
        negatives = summary.predictions_negatives,
        "Prediction ready"
    );
    Ok((headers, body).into_response())
}

fn download_headers(
    download_name: &str,
    summary: &PredictionSummary,
    len: u64,
    request_id: Uuid,
) -> Result<HeaderMap, ApiError> {
    let disposition = HeaderValue::try_from(format!("attachment; filename=\"{download_name}\""))
        .map_err(|e| ApiError::internal(format!("invalid download filename: {e}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(X_TOTAL_ROWS, HeaderValue::from(summary.total_rows));
    headers.insert(X_POSITIVES, HeaderValue::from(summary.predictions_positives));
    headers.insert(X_NEGATIVES, HeaderValue::from(summary.predictions_negatives));
    if let Ok(value) = HeaderValue::try_from(request_id.to_string()) {
        headers.insert(X_REQUEST_ID, value);
    }
    Ok(headers)
}

/// Start the gateway and serve until Ctrl+C.
pub async fn run(state: SharedState, host: &str, port: u16) -> Result<(), std::io::Error> {
    let app = router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Prediction gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Prediction gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl+C; serving until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::gateway::GatewayState;
    use axum::http::{Request, StatusCode};
    use exoplanet_ml::{
        Classifier, FeatureMapping, FeatureMatrix, MlError, ModelInfo, PredictionService,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "exoplanet-test-boundary";

    struct NoFeatureModel;

    impl Classifier for NoFeatureModel {
        fn feature_names_in(&self) -> Option<&[String]> {
            None
        }

        fn predict_proba(&self, _x: &FeatureMatrix) -> Result<Vec<[f64; 2]>, MlError> {
            Ok(vec![])
        }

        fn predict(&self, _x: &FeatureMatrix) -> Result<Vec<i64>, MlError> {
            Ok(vec![])
        }

        fn describe(&self) -> ModelInfo {
            ModelInfo {
                name: "no-features".into(),
                version: "test".into(),
                estimator: "fake".into(),
                steps: vec![],
                n_features: None,
            }
        }
    }

    fn app() -> Router {
        let service = PredictionService::new(
            Arc::new(NoFeatureModel),
            Arc::new(FeatureMapping::exoplanet_default()),
            Default::default(),
        );
        router(GatewayState::new(service, &AppConfig::default()).into_shared())
    }

    fn multipart_request(field: &str, filename: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n{content}\r\n--{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri(PREDICT_PATH)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let response = app()
            .oneshot(Request::get(STATUS_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({
                "status": "ok",
                "message": "Backend activo y listo para predicciones"
            })
        );
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let response = app()
            .oneshot(multipart_request("upload", "koi.csv", "a\n1\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"detail": "Field required: file"})
        );
    }

    #[tokio::test]
    async fn test_non_multipart_body_is_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri(PREDICT_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
        let json = json_body(response).await;
        assert!(json["detail"].is_string());
    }

    #[tokio::test]
    async fn test_model_configuration_error_is_500() {
        let response = app()
            .oneshot(multipart_request("file", "koi.csv", "disposition_score\n0.5\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({
                "detail": "El modelo cargado no contiene el paso 'imputer' en su pipeline."
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = app()
            .oneshot(Request::get("/api/unknown").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_download_headers() {
        let summary = PredictionSummary {
            total_rows: 3,
            predictions_positives: 2,
            predictions_negatives: 1,
        };
        let headers =
            download_headers("predicciones_exoplanetas.csv", &summary, 120, Uuid::nil()).unwrap();
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"predicciones_exoplanetas.csv\""
        );
        assert_eq!(headers[header::CONTENT_LENGTH], "120");
        assert_eq!(headers["x-total-rows"], "3");
        assert_eq!(headers["x-predictions-positives"], "2");
        assert_eq!(headers["x-predictions-negatives"], "1");
    }
}
