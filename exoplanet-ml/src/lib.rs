//! # exoplanet-ml - scoring exoplanet candidates from tabular uploads
//!
//! The crate is the transport-agnostic half of the predictor:
//!
//! - [`dataset`]: the uploaded table, column renaming, feature slicing, CSV output
//! - [`mapping`]: the external → internal column name table
//! - [`model`]: the pre-trained classifier artifact and where it is loaded from
//! - [`predict`]: the request workflow tying the three together

pub mod dataset;
pub mod error;
pub mod mapping;
pub mod model;
pub mod predict;

// Re-exports
pub use dataset::{Dataset, FeatureMatrix, RenameCollision, RenameReport};
pub use error::MlError;
pub use mapping::{ColumnRule, FeatureMapping};
pub use model::{Classifier, ModelInfo, Pipeline};
pub use predict::{
    PredictError, PredictionOptions, PredictionService, PredictionSummary, RenamePolicy,
    ScoredDataset,
};
