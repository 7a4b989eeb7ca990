//! The model and mapping shipped in the repository score the demo upload.

use exoplanet_ml::model::{FileArtifactSource, load_pipeline};
use exoplanet_ml::{Classifier, FeatureMapping, PredictionOptions, PredictionService};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;

fn repo_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join(relative)
}

async fn bundled_service() -> PredictionService {
    let source = FileArtifactSource::new(repo_path("models/gradientboost_exoplanets.json"));
    let pipeline = load_pipeline(&source).await.unwrap();
    let mapping = FeatureMapping::from_toml_file(&repo_path("config/feature_mapping.toml")).unwrap();
    let model: Arc<dyn Classifier> = Arc::new(pipeline);
    PredictionService::new(model, Arc::new(mapping), PredictionOptions::default())
}

#[tokio::test]
async fn test_mapping_file_matches_builtin_table() {
    let file = FeatureMapping::from_toml_file(&repo_path("config/feature_mapping.toml")).unwrap();
    assert_eq!(file, FeatureMapping::exoplanet_default());
}

#[tokio::test]
async fn test_bundled_model_declares_koi_features() {
    let service = bundled_service().await;
    let features = service.model().feature_names_in().unwrap();
    assert_eq!(features.len(), 16);
    for feature in features {
        assert!(
            !service.mapping().externals_for(feature).is_empty(),
            "{feature} has no external header"
        );
    }
    let info = service.model().describe();
    assert_eq!(info.estimator, "gradient_boosting");
    assert_eq!(info.steps, ["imputer", "classifier"]);
}

#[tokio::test]
async fn test_demo_upload_scores() {
    let service = bundled_service().await;
    let bytes = std::fs::read(repo_path("demos/koi_sample.csv")).unwrap();
    let scored = service.score_upload("koi_sample.csv", &bytes).unwrap();

    assert_eq!(scored.summary.total_rows, 7);
    assert_eq!(scored.summary.predictions_positives, 5);
    assert_eq!(scored.summary.predictions_negatives, 2);
    assert_eq!(
        scored.dataset.column("prediccion").unwrap(),
        ["1", "1", "0", "0", "1", "1", "1"]
    );

    let probabilities: Vec<f64> = scored
        .dataset
        .column("prob_confirme_planeta")
        .unwrap()
        .iter()
        .map(|p| p.parse().unwrap())
        .collect();
    assert!((probabilities[0] - 0.832_018_385_133_924_5).abs() < 1e-12);
    assert!((probabilities[2] - 0.249_739_894_404_882_3).abs() < 1e-12);

    // Both KOI name columns collapse into koi_score; the numeric one wins.
    assert_eq!(scored.renames.collisions.len(), 1);
    assert_eq!(scored.dataset.column("koi_score").unwrap()[0], "1.0");
    assert_eq!(scored.dataset.columns().last().unwrap(), "prediccion");
}
