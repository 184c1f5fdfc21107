use crate::error::{AppError, Result};
use crate::ml::boosting::{sigmoid, GradientBoostedTrees};
use crate::ml::classifier::{check_fit_inputs, check_predict_inputs, Classifier};
use crate::ml::dataset::{stratified_kfold, Dataset};
use crate::ml::forest::RandomForest;
use crate::ml::models::{BoostingParams, ForestParams, ModelType};
use linfa::traits::Fit;
use linfa_logistic::LogisticRegression;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Iteration cap for the meta-learner's optimizer
const META_MAX_ITERATIONS: u64 = 200;

/// Logistic regression over base-model probabilities.
///
/// Fitted with linfa-logistic; only the coefficients are kept so the model
/// serializes with the rest of the package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticMetaLearner {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LogisticMetaLearner {
    pub fn fit(meta_features: &Array2<f64>, labels: &[usize]) -> Result<Self> {
        let targets: Array1<usize> = labels.iter().copied().collect();
        let dataset = linfa::Dataset::new(meta_features.clone(), targets);

        let fitted = LogisticRegression::default()
            .alpha(1.0)
            .max_iterations(META_MAX_ITERATIONS)
            .fit(&dataset)
            .map_err(|e| AppError::Training(format!("Meta-learner fit failed: {}", e)))?;

        // linfa picks the positive class by frequency, falling back to the
        // first label seen on ties; flip the model when that is not label 1
        let sign = if fitted.labels().pos.class == 1 { 1.0 } else { -1.0 };
        Ok(Self {
            coefficients: fitted.params().iter().map(|w| sign * w).collect(),
            intercept: sign * fitted.intercept(),
        })
    }

    pub fn predict_proba(&self, meta_features: &Array2<f64>) -> Array1<f64> {
        let weights = Array1::from(self.coefficients.clone());
        (meta_features.dot(&weights) + self.intercept).mapv(sigmoid)
    }
}

/// Gradient boosting + random forest, blended by a logistic meta-learner
/// trained on out-of-fold base probabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackingEnsemble {
    boosting: GradientBoostedTrees,
    forest: RandomForest,
    meta: Option<LogisticMetaLearner>,
    cv_folds: usize,
    seed: u64,
    n_features: usize,
}

impl StackingEnsemble {
    pub fn new(boosting: BoostingParams, forest: ForestParams, cv_folds: usize, seed: u64) -> Self {
        Self {
            boosting: GradientBoostedTrees::new(boosting, seed),
            forest: RandomForest::new(forest, seed),
            meta: None,
            cv_folds,
            seed,
            n_features: 0,
        }
    }

    pub fn meta_learner(&self) -> Option<&LogisticMetaLearner> {
        self.meta.as_ref()
    }

    /// Positive-class probabilities of each base model, one column per model
    fn base_probabilities(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        let boosting = self.boosting.predict_proba(features)?;
        let forest = self.forest.predict_proba(features)?;
        Ok(ndarray::stack![Axis(1), boosting, forest])
    }

    fn out_of_fold_probabilities(&self, dataset: &Dataset) -> Result<Array2<f64>> {
        let folds = stratified_kfold(&dataset.labels, self.cv_folds, self.seed)?;

        let fold_results: Vec<(Vec<usize>, Array2<f64>)> = folds
            .par_iter()
            .map(|(train, validation)| {
                let mut fold_model = Self {
                    meta: None,
                    ..self.clone()
                };
                fold_model.boosting.fit(&dataset.select(train))?;
                fold_model.forest.fit(&dataset.select(train))?;
                let probabilities =
                    fold_model.base_probabilities(&dataset.select(validation).features)?;
                Ok((validation.clone(), probabilities))
            })
            .collect::<Result<_>>()?;

        let mut oof = Array2::zeros((dataset.n_samples(), 2));
        for (validation, probabilities) in fold_results {
            for (row, &idx) in validation.iter().enumerate() {
                oof.row_mut(idx).assign(&probabilities.row(row));
            }
        }
        Ok(oof)
    }
}

impl Classifier for StackingEnsemble {
    fn fit(&mut self, dataset: &Dataset) -> Result<()> {
        check_fit_inputs(dataset)?;

        let oof = self.out_of_fold_probabilities(dataset)?;
        let meta = LogisticMetaLearner::fit(&oof, &dataset.labels)?;

        self.boosting.fit(dataset)?;
        self.forest.fit(dataset)?;
        self.meta = Some(meta);
        self.n_features = dataset.n_features();

        tracing::info!(
            cv_folds = self.cv_folds,
            n_samples = dataset.n_samples(),
            "Stacking ensemble fitted"
        );
        Ok(())
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        let meta = self
            .meta
            .as_ref()
            .ok_or_else(|| AppError::NotFitted("Stacking ensemble is not trained".to_string()))?;
        check_predict_inputs(self.n_features, features)?;

        Ok(meta.predict_proba(&self.base_probabilities(features)?))
    }

    fn model_type(&self) -> ModelType {
        ModelType::Stacking
    }

    fn is_trained(&self) -> bool {
        self.meta.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::evaluation;
    use ndarray::array;

    fn overlapping_dataset() -> Dataset {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..60 {
            let label = usize::from(i % 3 != 0);
            let shift = if label == 1 { 1.5 } else { -1.5 };
            rows.extend_from_slice(&[shift + ((i * 7) % 11) as f64 * 0.3 - 1.5, (i % 4) as f64]);
            labels.push(label);
        }
        Dataset::new(
            Array2::from_shape_vec((60, 2), rows).unwrap(),
            labels,
            vec!["signal".into(), "noise".into()],
        )
        .unwrap()
    }

    fn ensemble() -> StackingEnsemble {
        StackingEnsemble::new(
            BoostingParams {
                n_estimators: 15,
                max_depth: 3,
                ..Default::default()
            },
            ForestParams {
                n_estimators: 15,
                max_depth: 4,
                ..Default::default()
            },
            3,
            42,
        )
    }

    #[test]
    fn test_meta_learner_orientation() {
        let meta = array![[0.1, 0.2], [0.2, 0.1], [0.3, 0.2], [0.7, 0.8], [0.8, 0.9], [0.9, 0.7]];
        let labels = [0, 0, 0, 1, 1, 1];
        let learner = LogisticMetaLearner::fit(&meta, &labels).unwrap();
        let probabilities = learner.predict_proba(&meta);

        assert!(probabilities[0] < probabilities[4]);
        assert!(probabilities.slice(ndarray::s![3..]).iter().all(|&p| p > 0.5));
    }

    #[test]
    fn test_meta_learner_balanced_labels_closed_first() {
        let meta = array![[0.2, 0.3], [0.7, 0.6], [0.25, 0.2], [0.8, 0.75], [0.3, 0.35], [0.65, 0.7]];
        let labels = [0, 1, 0, 1, 0, 1];
        let probabilities = LogisticMetaLearner::fit(&meta, &labels)
            .unwrap()
            .predict_proba(&meta);

        for pair in 0..3 {
            assert!(probabilities[2 * pair + 1] > probabilities[2 * pair]);
        }
    }

    #[test]
    fn test_meta_learner_acquired_minority() {
        let meta = array![
            [0.1, 0.2],
            [0.2, 0.1],
            [0.15, 0.25],
            [0.3, 0.2],
            [0.25, 0.3],
            [0.2, 0.2],
            [0.8, 0.9],
            [0.9, 0.7]
        ];
        let labels = [0, 0, 0, 0, 0, 0, 1, 1];
        let probabilities = LogisticMetaLearner::fit(&meta, &labels)
            .unwrap()
            .predict_proba(&meta);

        let max_closed = probabilities
            .slice(ndarray::s![..6])
            .iter()
            .fold(f64::MIN, |a, &b| a.max(b));
        assert!(probabilities[6] > max_closed);
        assert!(probabilities[7] > max_closed);
    }

    #[test]
    fn test_stacking_fit_and_predict() {
        let dataset = overlapping_dataset();
        let mut model = ensemble();
        assert!(!model.is_trained());

        model.fit(&dataset).unwrap();
        assert!(model.is_trained());
        assert_eq!(model.meta_learner().unwrap().coefficients.len(), 2);

        let probabilities = model.predict_proba(&dataset.features).unwrap();
        assert_eq!(probabilities.len(), 60);
        let metrics = evaluation::evaluate(&dataset.labels, probabilities.as_slice().unwrap(), 0.5);
        assert!(metrics.roc_auc > 0.9);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = ensemble();
        assert!(model.predict_proba(&Array2::zeros((1, 2))).is_err());
    }
}
