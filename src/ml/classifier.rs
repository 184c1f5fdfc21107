use crate::error::{AppError, Result};
use crate::ml::boosting::GradientBoostedTrees;
use crate::ml::dataset::Dataset;
use crate::ml::ensemble::StackingEnsemble;
use crate::ml::evaluation::predict_labels;
use crate::ml::models::ModelType;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Trait for binary classifiers producing positive-class probabilities
pub trait Classifier: Send + Sync {
    /// Train the classifier
    fn fit(&mut self, dataset: &Dataset) -> Result<()>;

    /// Probability of the positive (acquired) class per row
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>>;

    /// Hard labels at a decision threshold
    fn predict(&self, features: &Array2<f64>, threshold: f64) -> Result<Vec<usize>> {
        let probabilities = self.predict_proba(features)?;
        Ok(predict_labels(&probabilities.to_vec(), threshold))
    }

    /// Get model type
    fn model_type(&self) -> ModelType;

    /// Check if model is trained
    fn is_trained(&self) -> bool;
}

pub(crate) fn check_fit_inputs(dataset: &Dataset) -> Result<()> {
    if dataset.n_samples() == 0 || dataset.n_features() == 0 {
        return Err(AppError::Training(format!(
            "Cannot train on a {}x{} feature table",
            dataset.n_samples(),
            dataset.n_features()
        )));
    }
    if dataset.labels.iter().any(|&l| l > 1) {
        return Err(AppError::Training("Labels must be binary (0 or 1)".to_string()));
    }
    Ok(())
}

pub(crate) fn check_predict_inputs(n_features: usize, features: &Array2<f64>) -> Result<()> {
    if features.ncols() != n_features {
        return Err(AppError::SchemaMismatch(format!(
            "Model expects {} features, got {}",
            n_features,
            features.ncols()
        )));
    }
    Ok(())
}

/// Persisted form of a fitted classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    GradientBoosting(GradientBoostedTrees),
    Stacking(StackingEnsemble),
}

impl TrainedModel {
    fn inner(&self) -> &dyn Classifier {
        match self {
            TrainedModel::GradientBoosting(model) => model,
            TrainedModel::Stacking(model) => model,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            TrainedModel::GradientBoosting(model) => model,
            TrainedModel::Stacking(model) => model,
        }
    }
}

impl Classifier for TrainedModel {
    fn fit(&mut self, dataset: &Dataset) -> Result<()> {
        self.inner_mut().fit(dataset)
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict_proba(features)
    }

    fn model_type(&self) -> ModelType {
        self.inner().model_type()
    }

    fn is_trained(&self) -> bool {
        self.inner().is_trained()
    }
}
