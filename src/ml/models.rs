use crate::ml::encoding::CategoryEncoding;
use crate::ml::features::FeatureSet;
use crate::ml::threshold::ThresholdConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use strum::{Display, EnumString};

/// Training workflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Source CSV
    pub data_path: PathBuf,

    /// Where the fitted package is written
    pub output_path: PathBuf,

    /// Fraction of labeled rows held out for evaluation and threshold tuning
    pub test_size: f64,

    /// Seed for splitting, resampling and model randomness
    pub seed: u64,

    /// Which classifier to fit
    pub model_type: ModelType,

    /// Which engineered feature table to build
    pub feature_set: FeatureSet,

    /// How the sector code column is encoded
    pub category_encoding: CategoryEncoding,

    /// Standardize features after imputation
    pub scale_features: bool,

    /// Rebalance the training split with SMOTE + Tomek links
    pub resample: bool,

    /// Neighbours considered when synthesising minority rows
    pub smote_k_neighbors: usize,

    /// Folds used to build out-of-fold predictions for stacking
    pub cv_folds: usize,

    /// Gradient-boosted trees hyperparameters
    pub boosting: BoostingParams,

    /// Random forest hyperparameters
    pub forest: ForestParams,

    /// Optional grid search over boosting parameters
    pub grid_search: GridSearchConfig,

    /// Decision threshold scan
    pub threshold: ThresholdConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/startup data.csv"),
            output_path: PathBuf::from("models/startup_success_model.bin"),
            test_size: 0.2,
            seed: 42,
            model_type: ModelType::Stacking,
            feature_set: FeatureSet::Advanced,
            category_encoding: CategoryEncoding::Label,
            scale_features: true,
            resample: true,
            smote_k_neighbors: 5,
            cv_folds: 5,
            boosting: BoostingParams::default(),
            forest: ForestParams::default(),
            grid_search: GridSearchConfig::default(),
            threshold: ThresholdConfig::default(),
        }
    }
}

/// Gradient-boosted trees hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Row sampling ratio per tree
    pub subsample: f64,
    /// Column sampling ratio per tree
    pub colsample_bytree: f64,
    /// Minimum hessian sum in a child
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub lambda: f64,
    /// Minimum loss reduction required to split
    pub gamma: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 7,
            learning_rate: 0.1,
            subsample: 0.8,
            colsample_bytree: 0.8,
            min_child_weight: 1.0,
            lambda: 1.0,
            gamma: 0.0,
        }
    }
}

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; square root of the width when unset
    pub max_features: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 12,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

/// Grid of boosting parameters to search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSearchConfig {
    pub enabled: bool,
    pub cv_folds: usize,
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub subsample: Vec<f64>,
    pub colsample_bytree: Vec<f64>,
}

impl Default for GridSearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cv_folds: 3,
            n_estimators: vec![300],
            max_depth: vec![7],
            learning_rate: vec![0.1],
            subsample: vec![0.8],
            colsample_bytree: vec![0.8],
        }
    }
}

/// Confusion counts for the positive (acquired) class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn errors(&self) -> usize {
        self.fp + self.fn_
    }
}

/// Model evaluation metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: f64,
    pub confusion: ConfusionMatrix,
}

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Package format version
    pub version: String,

    /// Model type
    pub model_type: ModelType,

    /// Feature table the model was fitted on
    pub feature_set: FeatureSet,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Rows in the training split before resampling
    pub n_training_samples: usize,

    /// Rows after SMOTE + Tomek cleaning
    pub n_resampled_samples: usize,

    /// Rows in the held-out split
    pub n_test_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Seed used for the split
    pub seed: u64,

    /// Held-out fraction used for the split
    pub test_size: f64,

    /// Held-out metrics at the selected threshold
    pub validation_metrics: Option<ModelMetrics>,

    /// Hyperparameters
    pub hyperparameters: BTreeMap<String, String>,
}

/// Model type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ModelType {
    /// Single gradient-boosted tree model
    GradientBoosting,

    /// Random forest (stacking base learner)
    RandomForest,

    /// Logistic regression (stacking meta-learner)
    LogisticRegression,

    /// Gradient boosting + random forest with a logistic meta-learner
    Stacking,
}

impl ModelType {
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelType::GradientBoosting => "Gradient Boosting",
            ModelType::RandomForest => "Random Forest",
            ModelType::LogisticRegression => "Logistic Regression",
            ModelType::Stacking => "Stacking Ensemble",
        }
    }
}
