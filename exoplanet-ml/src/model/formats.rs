//! Model artifact format detection.

use serde::{Deserialize, Serialize};

/// Known artifact formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    /// Pipeline JSON (the only format this service can execute).
    Json,
    /// Python pickle / joblib dumps; must be exported to JSON first.
    Pickle,
    Onnx,
    Unknown,
}

/// Detect the format from a path or URL extension.
pub fn detect_format(location: &str) -> ModelFormat {
    let trimmed = location.split(['?', '#']).next().unwrap_or(location);
    let ext = trimmed
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "json" => ModelFormat::Json,
        "pkl" | "pickle" | "joblib" => ModelFormat::Pickle,
        "onnx" => ModelFormat::Onnx,
        _ => ModelFormat::Unknown,
    }
}
