/// Machine learning pipeline for startup outcome classification
///
/// This module provides:
/// - CSV ingestion and stratified splitting
/// - Feature engineering, imputation and scaling
/// - SMOTE + Tomek-link class rebalancing
/// - Gradient boosting, random forest and stacking learners
/// - Decision threshold calibration
/// - A persisted, self-contained model package and the service that serves it

pub mod boosting;
pub mod classifier;
pub mod dataset;
pub mod encoding;
pub mod ensemble;
pub mod evaluation;
pub mod features;
pub mod forest;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod resampling;
pub mod search;
pub mod service;
pub mod threshold;
pub mod trainer;
pub mod tree;

pub use boosting::GradientBoostedTrees;
pub use classifier::{Classifier, TrainedModel};
pub use dataset::Dataset;
pub use encoding::{CategoryEncoder, CategoryEncoding};
pub use ensemble::StackingEnsemble;
pub use features::{FeatureEngineer, FeatureSet};
pub use forest::RandomForest;
pub use models::{
    BoostingParams, ConfusionMatrix, ForestParams, GridSearchConfig, ModelMetadata, ModelMetrics,
    ModelType, TrainingConfig,
};
pub use pipeline::{ModelPackage, ScoredPrediction};
pub use service::{ModelInfo, PredictionService};
pub use threshold::{ThresholdAnalysis, ThresholdConfig, ThresholdObjective};
pub use trainer::{rescan_thresholds, Trainer, TrainingReport};
