//! Error responses for the gateway.
//!
//! Every failure is returned as `{"detail": "..."}` with the status code that
//! matches the kind of failure.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use exoplanet_ml::PredictError;
use exoplanet_ml::predict::describe_collisions;
use serde::Serialize;

/// An HTTP error with a human-readable detail message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }

    /// A required multipart form field was absent.
    pub fn missing_field(name: &str) -> Self {
        Self::unprocessable(format!("Field required: {name}"))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.detail)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), detail = %self.detail, "Request failed");
        } else {
            tracing::warn!(status = self.status.as_u16(), detail = %self.detail, "Request rejected");
        }
        let body = axum::Json(ErrorBody {
            detail: &self.detail,
        });
        (self.status, body).into_response()
    }
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::InvalidFormat { .. } => {
                Self::bad_request("El archivo debe ser un CSV válido.")
            }
            PredictError::MissingColumns(columns) => {
                Self::bad_request(format!("Faltan columnas requeridas: {}", columns.join(", ")))
            }
            PredictError::RenameConflict(collisions) => Self::bad_request(format!(
                "Columnas en conflicto tras el mapeo: {}",
                describe_collisions(&collisions)
            )),
            PredictError::ModelConfiguration { step } => Self::internal(format!(
                "El modelo cargado no contiene el paso '{step}' en su pipeline."
            )),
            PredictError::Internal(e) => Self::internal(format!("Error en la predicción: {e}")),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(format!("Error en la predicción: {err}"))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), err.body_text())
    }
}
