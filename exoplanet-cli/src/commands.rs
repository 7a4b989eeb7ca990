//! Subcommand handlers.

use crate::Commands;
use anyhow::Context;
use exoplanet_core::AppConfig;
use exoplanet_core::gateway::{ApiError, GatewayState, run_gateway};
use exoplanet_ml::model::{load_pipeline, source_for};
use exoplanet_ml::{Classifier, FeatureMapping, PredictionService, RenamePolicy};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub async fn handle_command(
    command: Commands,
    mut config: AppConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            handle_serve(config, workspace).await
        }
        Commands::Predict { input, output } => handle_predict(config, workspace, input, output).await,
        Commands::Model => handle_model(config, workspace).await,
    }
}

async fn handle_serve(config: AppConfig, workspace: &Path) -> anyhow::Result<()> {
    let service = build_service(&config, workspace).await?;
    let state = GatewayState::new(service, &config).into_shared();
    run_gateway(state, &config.server.host, config.server.port)
        .await
        .with_context(|| {
            format!(
                "gateway failed on {}:{}",
                config.server.host, config.server.port
            )
        })
}

async fn handle_predict(
    config: AppConfig,
    workspace: &Path,
    input: PathBuf,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let service = build_service(&config, workspace).await?;
    let bytes = tokio::fs::read(&input)
        .await
        .with_context(|| format!("cannot read {}", input.display()))?;
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let scored = tokio::task::spawn_blocking(move || service.score_upload(&filename, &bytes))
        .await?
        .map_err(|e| anyhow::anyhow!(ApiError::from(e).detail))?;

    let output = output.unwrap_or_else(|| PathBuf::from(&config.output.filename));
    let csv = scored.dataset.to_csv_bytes()?;
    tokio::fs::write(&output, csv)
        .await
        .with_context(|| format!("cannot write {}", output.display()))?;

    for collision in &scored.renames.collisions {
        eprintln!(
            "  note: '{}' came from {}; the last column was kept",
            collision.column,
            collision.sources.join(", ")
        );
    }
    println!("{}", serde_json::to_string_pretty(&scored.summary)?);
    eprintln!("  Wrote {}", output.display());
    Ok(())
}

async fn handle_model(config: AppConfig, workspace: &Path) -> anyhow::Result<()> {
    let service = build_service(&config, workspace).await?;
    print!("{}", model_report(&service));
    Ok(())
}

fn model_report(service: &PredictionService) -> String {
    let info = service.model().describe();
    let options = service.options();
    let mapping = service.mapping();
    let renames = match options.rename_policy {
        RenamePolicy::LastWins => "last duplicate column wins",
        RenamePolicy::Strict => "reject duplicate columns",
    };

    let mut out = String::new();
    let _ = writeln!(out, "Model:     {} {}", info.name, info.version);
    let _ = writeln!(out, "Estimator: {}", info.estimator);
    let _ = writeln!(out, "Steps:     {}", info.steps.join(" -> "));
    let _ = writeln!(out, "Mapping:   {} ({} rules)", mapping.version(), mapping.len());
    let _ = writeln!(
        out,
        "Output:    {}, {}",
        options.probability_column, options.label_column
    );
    let _ = writeln!(out, "Renames:   {renames}");

    let Some(features) = service.model().feature_names_in() else {
        let _ = writeln!(
            out,
            "\nNo '{}' step declares input features; predictions will fail.",
            options.feature_step
        );
        return out;
    };
    let _ = writeln!(out, "\nRequired features ({}):", features.len());
    for feature in features {
        let externals = mapping.externals_for(feature);
        if externals.is_empty() {
            let _ = writeln!(out, "  {feature}");
        } else {
            let _ = writeln!(out, "  {feature:<16} <- {}", externals.join(", "));
        }
    }
    out
}

/// Load the mapping table and the model once; a model that cannot be
/// loaded stops the process before anything is served.
async fn build_service(config: &AppConfig, workspace: &Path) -> anyhow::Result<PredictionService> {
    let mapping = match &config.mapping.path {
        Some(path) => {
            let path = resolve(workspace, path);
            FeatureMapping::from_toml_file(&path)
                .with_context(|| format!("cannot load feature mapping {}", path.display()))?
        }
        None => FeatureMapping::exoplanet_default(),
    };

    let location = model_location(workspace, &config.model.path);
    let source = source_for(&location);
    let pipeline = match load_pipeline(source.as_ref()).await {
        Ok(pipeline) => pipeline.with_feature_step(config.model.feature_step.clone()),
        Err(e) => {
            tracing::error!(location = %location, "No se pudo cargar el modelo: {e}");
            anyhow::bail!("No se pudo cargar el modelo: {e}");
        }
    };
    if pipeline.feature_names_in().is_none() {
        tracing::warn!(
            step = %config.model.feature_step,
            "Model declares no input features; every prediction will fail"
        );
    }

    let model: Arc<dyn Classifier> = Arc::new(pipeline);
    Ok(PredictionService::new(
        model,
        Arc::new(mapping),
        config.prediction_options(),
    ))
}

fn resolve(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// URLs pass through; relative paths resolve against the workspace.
fn model_location(workspace: &Path, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        location.to_string()
    } else {
        resolve(workspace, Path::new(location)).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_model_location() {
        let ws = Path::new("/srv/exoplanet");
        assert_eq!(
            model_location(ws, "models/gb.json"),
            "/srv/exoplanet/models/gb.json"
        );
        assert_eq!(model_location(ws, "/opt/gb.json"), "/opt/gb.json");
        assert_eq!(
            model_location(ws, "https://registry.example/gb.json"),
            "https://registry.example/gb.json"
        );
    }

    #[tokio::test]
    async fn test_missing_model_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_service(&AppConfig::default(), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("No se pudo cargar el modelo: "));
    }

    #[tokio::test]
    async fn test_bundled_model_loads() {
        let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
        let service = build_service(&AppConfig::default(), &workspace)
            .await
            .unwrap();
        let features = service.model().feature_names_in().unwrap();
        assert_eq!(features.len(), 16);
        assert_eq!(features[0], "koi_score");
    }

    #[tokio::test]
    async fn test_predict_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
        let output = dir.path().join("out.csv");
        handle_predict(
            AppConfig::default(),
            &workspace,
            workspace.join("demos/koi_sample.csv"),
            Some(output.clone()),
        )
        .await
        .unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(text.lines().count(), 8);
        assert!(
            text.lines()
                .next()
                .unwrap()
                .ends_with("prob_confirme_planeta,prediccion")
        );
    }

    #[tokio::test]
    async fn test_predict_rejects_non_csv() {
        let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
        let err = handle_predict(
            AppConfig::default(),
            &workspace,
            workspace.join("config/feature_mapping.toml"),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "El archivo debe ser un CSV válido.");
    }

    #[tokio::test]
    async fn test_model_report() {
        let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
        let mut config = AppConfig::default();
        config.output.label_column = "label".into();
        config.mapping.strict_renames = true;
        let service = build_service(&config, &workspace).await.unwrap();

        let report = model_report(&service);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[1], "Estimator: gradient_boosting");
        assert_eq!(lines[2], "Steps:     imputer -> classifier");
        assert_eq!(lines[3], "Mapping:   koi-2025.1 (17 rules)");
        assert_eq!(lines[4], "Output:    prob_confirme_planeta, label");
        assert_eq!(lines[5], "Renames:   reject duplicate columns");
        assert_eq!(lines[7], "Required features (16):");
        assert_eq!(
            lines[8],
            "  koi_score        <- object_of_interest_name, disposition_score"
        );
    }

    #[tokio::test]
    async fn test_mapping_file_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
        let mapping = dir.path().join("mapping.toml");
        std::fs::write(
            &mapping,
            "version = \"test\"\n\n[[columns]]\nexternal = \"period\"\ninternal = \"koi_period\"\n",
        )
        .unwrap();
        let mut config = AppConfig::default();
        config.mapping.path = Some(mapping);
        let service = build_service(&config, &workspace).await.unwrap();
        assert_eq!(service.mapping().version(), "test");
        assert_eq!(service.mapping().len(), 1);
    }
}
