use crate::error::{AppError, Result};
use crate::ml::classifier::{check_fit_inputs, check_predict_inputs, Classifier};
use crate::ml::dataset::Dataset;
use crate::ml::models::{BoostingParams, ModelType};
use crate::ml::tree::{DecisionTree, NewtonCriterion, TreeGrowth};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Floor applied to per-row hessians so confident rows still count
const MIN_HESSIAN: f64 = 1e-16;

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Second-order gradient boosted trees on binary log-loss
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
    seed: u64,

    /// Initial margin (logit of 0.5)
    base_score: f64,

    trees: Vec<DecisionTree>,
    n_features: usize,
    trained: bool,
}

impl GradientBoostedTrees {
    pub fn new(params: BoostingParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            base_score: 0.0,
            trees: Vec::new(),
            n_features: 0,
            trained: false,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn validate_params(&self) -> Result<()> {
        let p = &self.params;
        if p.n_estimators == 0 {
            return Err(AppError::Validation("n_estimators must be positive".to_string()));
        }
        if !(p.learning_rate > 0.0) {
            return Err(AppError::Validation("learning_rate must be positive".to_string()));
        }
        for (name, ratio) in [("subsample", p.subsample), ("colsample_bytree", p.colsample_bytree)] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(AppError::Validation(format!("{} must be in (0, 1], got {}", name, ratio)));
            }
        }
        Ok(())
    }

    /// Raw additive margins (log-odds)
    pub fn decision_function(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.trained {
            return Err(AppError::NotFitted("Gradient boosting model is not trained".to_string()));
        }
        check_predict_inputs(self.n_features, features)?;

        let mut margins = Array1::from_elem(features.nrows(), self.base_score);
        for tree in &self.trees {
            margins += &tree.predict(features.view());
        }
        Ok(margins)
    }
}

impl Classifier for GradientBoostedTrees {
    fn fit(&mut self, dataset: &Dataset) -> Result<()> {
        check_fit_inputs(dataset)?;
        self.validate_params()?;

        let x = &dataset.features;
        let y = &dataset.labels;
        let (n_rows, n_cols) = x.dim();
        let n_sampled_rows = ((n_rows as f64 * self.params.subsample).round() as usize).clamp(1, n_rows);
        let n_sampled_cols = ((n_cols as f64 * self.params.colsample_bytree).round() as usize).clamp(1, n_cols);

        let growth = TreeGrowth {
            max_depth: self.params.max_depth,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut margins = Array1::from_elem(n_rows, self.base_score);
        let mut gradients = vec![0.0; n_rows];
        let mut hessians = vec![0.0; n_rows];
        let mut trees = Vec::with_capacity(self.params.n_estimators);

        for _ in 0..self.params.n_estimators {
            for i in 0..n_rows {
                let p = sigmoid(margins[i]);
                gradients[i] = p - y[i] as f64;
                hessians[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let mut rows = sample(&mut rng, n_rows, n_sampled_rows).into_vec();
            rows.sort_unstable();
            let mut columns = sample(&mut rng, n_cols, n_sampled_cols).into_vec();
            columns.sort_unstable();

            let criterion = NewtonCriterion {
                gradients: &gradients,
                hessians: &hessians,
                lambda: self.params.lambda,
                gamma: self.params.gamma,
                min_child_weight: self.params.min_child_weight,
            };
            let mut tree = DecisionTree::fit(x.view(), &rows, &columns, &criterion, &growth, rng.gen());
            tree.scale(self.params.learning_rate);

            margins += &tree.predict(x.view());
            trees.push(tree);
        }

        self.trees = trees;
        self.n_features = n_cols;
        self.trained = true;

        tracing::debug!(
            n_trees = self.trees.len(),
            n_rows,
            n_cols,
            "Gradient boosting fitted"
        );

        Ok(())
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(features)?.mapv(sigmoid))
    }

    fn model_type(&self) -> ModelType {
        ModelType::GradientBoosting
    }

    fn is_trained(&self) -> bool {
        self.trained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::evaluation;

    fn separable_dataset() -> Dataset {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let label = usize::from(i % 2 == 0);
            let signal = if label == 1 { 2.0 } else { -2.0 };
            rows.extend_from_slice(&[signal + (i as f64 % 5.0) * 0.1, (i % 7) as f64, (i % 3) as f64]);
            labels.push(label);
        }
        Dataset::new(
            Array2::from_shape_vec((40, 3), rows).unwrap(),
            labels,
            vec!["signal".into(), "noise_a".into(), "noise_b".into()],
        )
        .unwrap()
    }

    fn small_params() -> BoostingParams {
        BoostingParams {
            n_estimators: 20,
            max_depth: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_fits_separable_data() {
        let dataset = separable_dataset();
        let mut model = GradientBoostedTrees::new(small_params(), 42);
        model.fit(&dataset).unwrap();

        assert!(model.is_trained());
        assert_eq!(model.n_trees(), 20);

        let probabilities = model.predict_proba(&dataset.features).unwrap();
        let metrics = evaluation::evaluate(&dataset.labels, probabilities.as_slice().unwrap(), 0.5);
        assert_eq!(metrics.accuracy, 1.0);
        assert!(probabilities.iter().all(|&p| p > 0.0 && p < 1.0));
    }

    #[test]
    fn test_deterministic_per_seed() {
        let dataset = separable_dataset();
        let mut a = GradientBoostedTrees::new(small_params(), 7);
        let mut b = GradientBoostedTrees::new(small_params(), 7);
        a.fit(&dataset).unwrap();
        b.fit(&dataset).unwrap();
        assert_eq!(
            a.predict_proba(&dataset.features).unwrap(),
            b.predict_proba(&dataset.features).unwrap()
        );
    }

    #[test]
    fn test_untrained_and_width_errors() {
        let dataset = separable_dataset();
        let mut model = GradientBoostedTrees::new(small_params(), 42);
        assert!(model.predict_proba(&dataset.features).is_err());

        model.fit(&dataset).unwrap();
        assert!(model.predict_proba(&Array2::zeros((1, 5))).is_err());
    }

    #[test]
    fn test_invalid_params() {
        let params = BoostingParams {
            subsample: 0.0,
            ..small_params()
        };
        let mut model = GradientBoostedTrees::new(params, 42);
        assert!(model.fit(&separable_dataset()).is_err());
    }
}
