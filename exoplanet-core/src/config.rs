//! Configuration system for the exoplanet predictor.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace `exoplanet.toml` -> explicit `--config` file -> environment.
//! The built-in defaults reproduce the reference deployment, so no file is
//! required.

use exoplanet_ml::model::DEFAULT_FEATURE_STEP;
use exoplanet_ml::predict::{DEFAULT_LABEL_COLUMN, DEFAULT_PROBABILITY_COLUMN};
use exoplanet_ml::{PredictionOptions, RenamePolicy};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace-level config file.
pub const WORKSPACE_CONFIG_FILE: &str = "exoplanet.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Largest accepted request body, in megabytes.
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8089,
            max_upload_mb: 50,
        }
    }
}

/// Model artifact settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Filesystem path or `http(s)://` URL of the pipeline artifact.
    pub path: String,
    /// Pipeline step that declares the required input features.
    pub feature_step: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/gradientboost_exoplanets.json".to_string(),
            feature_step: DEFAULT_FEATURE_STEP.to_string(),
        }
    }
}

/// Feature name mapping settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingConfig {
    /// TOML mapping table; the built-in exoplanet table is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Reject uploads where two columns end up with the same name.
    #[serde(default)]
    pub strict_renames: bool,
}

/// Prediction output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Suggested download filename.
    pub filename: String,
    pub probability_column: String,
    pub label_column: String,
    /// Directory for per-request result files (OS temp dir when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            filename: "predicciones_exoplanetas.csv".to_string(),
            probability_column: DEFAULT_PROBABILITY_COLUMN.to_string(),
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
            temp_dir: None,
        }
    }
}

impl AppConfig {
    /// Return human-readable problems; empty means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.server.port == 0 {
            problems.push("server.port must be non-zero".to_string());
        }
        if self.server.max_upload_mb == 0 {
            problems.push("server.max_upload_mb must be at least 1".to_string());
        }
        if self.model.path.trim().is_empty() {
            problems.push("model.path is empty".to_string());
        }
        if self.model.feature_step.trim().is_empty() {
            problems.push("model.feature_step is empty".to_string());
        }
        if self.output.filename.trim().is_empty() {
            problems.push("output.filename is empty".to_string());
        }
        if self.output.probability_column.trim().is_empty() {
            problems.push("output.probability_column is empty".to_string());
        }
        if self.output.label_column.trim().is_empty() {
            problems.push("output.label_column is empty".to_string());
        }
        if self.output.probability_column == self.output.label_column {
            problems.push(format!(
                "output.probability_column and output.label_column are both '{}'",
                self.output.label_column
            ));
        }
        if let Some(dir) = &self.output.temp_dir {
            if !dir.is_dir() {
                problems.push(format!(
                    "output.temp_dir {} is not a directory",
                    dir.display()
                ));
            }
        }
        problems
    }

    /// Anchor relative filesystem paths to `workspace`. The model location
    /// may be a URL and is resolved when it is loaded.
    pub fn resolve_paths(&mut self, workspace: &Path) {
        for path in [&mut self.output.temp_dir, &mut self.mapping.path]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = workspace.join(&*path);
            }
        }
    }

    /// Options handed to the prediction service.
    pub fn prediction_options(&self) -> PredictionOptions {
        PredictionOptions {
            probability_column: self.output.probability_column.clone(),
            label_column: self.output.label_column.clone(),
            rename_policy: if self.mapping.strict_renames {
                RenamePolicy::Strict
            } else {
                RenamePolicy::LastWins
            },
            feature_step: self.model.feature_step.clone(),
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `EXOPLANET_`, `__` for nesting)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`exoplanet.toml`)
/// 4. User config (`~/.config/exoplanet/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<AppConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("org", "exoplanet", "exoplanet") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_CONFIG_FILE);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // An explicit file must exist; a typo should not silently fall back to defaults.
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Box::new(figment::Error::from(format!(
                "config file {} does not exist",
                path.display()
            ))));
        }
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (EXOPLANET_SERVER__PORT, EXOPLANET_MODEL__PATH, etc.)
    figment = figment.merge(Env::prefixed("EXOPLANET_").split("__"));

    figment.extract().map_err(Box::new)
}
