use crate::error::{AppError, Result};
use crate::ml::boosting::GradientBoostedTrees;
use crate::ml::classifier::{Classifier, TrainedModel};
use crate::ml::dataset::{labeled_records, load_records, stratified_split, Dataset};
use crate::ml::ensemble::StackingEnsemble;
use crate::ml::evaluation;
use crate::ml::features::FeatureEngineer;
use crate::ml::models::{BoostingParams, ModelMetadata, ModelMetrics, ModelType, TrainingConfig};
use crate::ml::pipeline::{ModelPackage, PACKAGE_VERSION};
use crate::ml::preprocessing::{MedianImputer, StandardScaler};
use crate::ml::resampling::SmoteTomek;
use crate::ml::search::{grid_search, GridSearchResult};
use crate::ml::threshold::{self, ThresholdAnalysis, ThresholdConfig};
use crate::models::StartupRecord;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

/// Smallest labeled dataset the workflow accepts
const MIN_LABELED_ROWS: usize = 10;

/// Fitted package plus what was learned while building it
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub package: ModelPackage,
    pub metrics: ModelMetrics,
    pub grid_search: Option<GridSearchResult>,
}

/// Summary of a training run persisted to disk
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub package_path: PathBuf,
    pub checksum: String,
    pub outcome: TrainingOutcome,
}

struct HeldOut {
    train: Vec<StartupRecord>,
    train_labels: Vec<usize>,
    test: Vec<StartupRecord>,
    test_labels: Vec<usize>,
}

fn split_records(records: Vec<StartupRecord>, test_size: f64, seed: u64) -> Result<HeldOut> {
    let (records, labels) = labeled_records(records);
    if records.len() < MIN_LABELED_ROWS {
        return Err(AppError::Data(format!(
            "Need at least {} acquired/closed rows, found {}",
            MIN_LABELED_ROWS,
            records.len()
        )));
    }

    let (train_idx, test_idx) = stratified_split(&labels, test_size, seed)?;
    let pick = |rows: &[usize]| -> (Vec<StartupRecord>, Vec<usize>) {
        rows.iter().map(|&i| (records[i].clone(), labels[i])).unzip()
    };
    let (train, train_labels) = pick(&train_idx);
    let (test, test_labels) = pick(&test_idx);

    Ok(HeldOut {
        train,
        train_labels,
        test,
        test_labels,
    })
}

/// End-to-end training workflow
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Load the configured CSV, train, and write the package
    pub fn run(&self) -> Result<TrainingReport> {
        let records = load_records(&self.config.data_path)?;
        let outcome = self.train(records)?;
        let checksum = outcome.package.save(&self.config.output_path)?;

        Ok(TrainingReport {
            package_path: self.config.output_path.clone(),
            checksum,
            outcome,
        })
    }

    /// Train on in-memory records
    pub fn train(&self, records: Vec<StartupRecord>) -> Result<TrainingOutcome> {
        let config = &self.config;
        let started = Instant::now();

        let split = split_records(records, config.test_size, config.seed)?;
        tracing::info!(
            train = split.train.len(),
            test = split.test.len(),
            seed = config.seed,
            "Stratified split complete"
        );

        let mut features = FeatureEngineer::new(config.feature_set, config.category_encoding);
        let raw_train = features.fit_transform(&split.train)?;

        let mut imputer = MedianImputer::new();
        let mut x_train = imputer.fit_transform(&raw_train)?;

        let scaler = if config.scale_features {
            let mut scaler = StandardScaler::new();
            x_train = scaler.fit_transform(&x_train)?;
            Some(scaler)
        } else {
            None
        };

        let train_set = Dataset::new(x_train, split.train_labels.clone(), features.feature_names())?;
        let train_set = if config.resample {
            SmoteTomek::new(config.smote_k_neighbors, config.seed).resample(&train_set)?
        } else {
            train_set
        };

        let grid = if config.grid_search.enabled {
            Some(grid_search(&train_set, &config.boosting, &config.grid_search, config.seed)?)
        } else {
            None
        };
        let boosting = grid
            .as_ref()
            .map_or_else(|| config.boosting.clone(), |g| g.best_params.clone());

        let mut model = build_model(config, boosting.clone())?;
        model.fit(&train_set)?;

        let mut package = ModelPackage {
            metadata: ModelMetadata {
                name: config.model_type.display_name().to_string(),
                version: PACKAGE_VERSION.to_string(),
                model_type: config.model_type,
                feature_set: config.feature_set,
                trained_at: chrono::Utc::now(),
                n_training_samples: split.train.len(),
                n_resampled_samples: train_set.n_samples(),
                n_test_samples: split.test.len(),
                n_features: features.n_features(),
                seed: config.seed,
                test_size: config.test_size,
                validation_metrics: None,
                hyperparameters: hyperparameters(config, &boosting),
            },
            features,
            imputer,
            scaler,
            model,
            threshold: 0.5,
            threshold_analysis: None,
        };

        let metrics = calibrate(&mut package, &split.test, &split.test_labels, &config.threshold)?;

        tracing::info!(
            model_type = %config.model_type,
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1_score,
            roc_auc = metrics.roc_auc,
            threshold = package.threshold,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Training complete"
        );

        Ok(TrainingOutcome {
            package,
            metrics,
            grid_search: grid,
        })
    }
}

fn build_model(config: &TrainingConfig, boosting: BoostingParams) -> Result<TrainedModel> {
    match config.model_type {
        ModelType::GradientBoosting => Ok(TrainedModel::GradientBoosting(GradientBoostedTrees::new(
            boosting,
            config.seed,
        ))),
        ModelType::Stacking => Ok(TrainedModel::Stacking(StackingEnsemble::new(
            boosting,
            config.forest.clone(),
            config.cv_folds,
            config.seed,
        ))),
        other => Err(AppError::Validation(format!(
            "{} is only available as part of the stacking ensemble",
            other.display_name()
        ))),
    }
}

fn hyperparameters(config: &TrainingConfig, boosting: &BoostingParams) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let mut put = |key: &str, value: String| {
        params.insert(key.to_string(), value);
    };

    put("feature_set", config.feature_set.to_string());
    put("category_encoding", config.category_encoding.to_string());
    put("scale_features", config.scale_features.to_string());
    put("resample", config.resample.to_string());
    put("smote_k_neighbors", config.smote_k_neighbors.to_string());
    put("boosting.n_estimators", boosting.n_estimators.to_string());
    put("boosting.max_depth", boosting.max_depth.to_string());
    put("boosting.learning_rate", boosting.learning_rate.to_string());
    put("boosting.subsample", boosting.subsample.to_string());
    put("boosting.colsample_bytree", boosting.colsample_bytree.to_string());
    put("boosting.min_child_weight", boosting.min_child_weight.to_string());
    put("boosting.lambda", boosting.lambda.to_string());
    put("boosting.gamma", boosting.gamma.to_string());

    if config.model_type == ModelType::Stacking {
        put("cv_folds", config.cv_folds.to_string());
        put("forest.n_estimators", config.forest.n_estimators.to_string());
        put("forest.max_depth", config.forest.max_depth.to_string());
        put("forest.min_samples_split", config.forest.min_samples_split.to_string());
        put("forest.min_samples_leaf", config.forest.min_samples_leaf.to_string());
    }

    params
}

/// Score held-out records, scan thresholds and store the selection in the package
fn calibrate(
    package: &mut ModelPackage,
    records: &[StartupRecord],
    labels: &[usize],
    config: &ThresholdConfig,
) -> Result<ModelMetrics> {
    let probabilities = package.predict_proba(records)?;
    let analysis = threshold::analyze(labels, &probabilities, config)?;
    let metrics = evaluation::evaluate(labels, &probabilities, analysis.selected);

    package.set_threshold(analysis.selected)?;
    package.metadata.validation_metrics = Some(metrics.clone());
    package.threshold_analysis = Some(analysis);
    Ok(metrics)
}

/// Re-run the threshold scan for an existing package on the held-out split
/// it was evaluated on
pub fn rescan_thresholds(
    package: &mut ModelPackage,
    records: Vec<StartupRecord>,
    config: &ThresholdConfig,
) -> Result<ThresholdAnalysis> {
    let split = split_records(records, package.metadata.test_size, package.metadata.seed)?;
    if split.test.len() != package.metadata.n_test_samples {
        tracing::warn!(
            expected = package.metadata.n_test_samples,
            found = split.test.len(),
            "Held-out split differs from the one used at training time"
        );
    }

    calibrate(package, &split.test, &split.test_labels, config)?;
    package
        .threshold_analysis
        .clone()
        .ok_or_else(|| AppError::Internal("Threshold analysis missing after scan".to_string()))
}
