//! # Prediction Gateway
//!
//! HTTP surface of the predictor: a liveness probe and a CSV upload endpoint
//! that answers with the scored table as a file download. Each download is
//! staged in a temporary file that is removed once the response body has
//! been sent or dropped.

mod artifact;
mod error;
mod server;

pub use artifact::{CleanupStream, TempArtifact};
pub use error::ApiError;
pub use server::{
    PREDICT_PATH, STATUS_MESSAGE, STATUS_PATH, router as gateway_router, run as run_gateway,
};

use crate::config::AppConfig;
use exoplanet_ml::PredictionService;
use std::path::PathBuf;
use std::sync::Arc;

/// Read-only state shared by every request.
#[derive(Debug)]
pub struct GatewayState {
    service: PredictionService,
    download_name: String,
    temp_dir: Option<PathBuf>,
    max_upload_bytes: usize,
}

/// Thread-safe shared gateway reference for axum handlers.
pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(service: PredictionService, config: &AppConfig) -> Self {
        Self {
            service,
            download_name: config.output.filename.clone(),
            temp_dir: config.output.temp_dir.clone(),
            max_upload_bytes: config.max_upload_bytes(),
        }
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(self)
    }

    pub fn service(&self) -> &PredictionService {
        &self.service
    }

    /// Filename suggested in `Content-Disposition`.
    pub fn download_name(&self) -> &str {
        &self.download_name
    }

    /// Directory for staged results; `None` means the OS temp dir.
    pub fn temp_dir(&self) -> Option<&std::path::Path> {
        self.temp_dir.as_deref()
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }
}
