use crate::error::{AppError, Result};
use crate::ml::classifier::{check_fit_inputs, check_predict_inputs, Classifier};
use crate::ml::dataset::Dataset;
use crate::ml::models::{ForestParams, ModelType};
use crate::ml::tree::{DecisionTree, GiniCriterion, TreeGrowth};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Bootstrap-aggregated Gini trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    seed: u64,
    trees: Vec<DecisionTree>,
    n_features: usize,
    trained: bool,
}

impl RandomForest {
    pub fn new(params: ForestParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            trees: Vec::new(),
            n_features: 0,
            trained: false,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Features drawn per split, defaulting to the square root of the width
    fn max_features(&self, n_features: usize) -> usize {
        self.params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().floor() as usize)
            .clamp(1, n_features)
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, dataset: &Dataset) -> Result<()> {
        check_fit_inputs(dataset)?;
        if self.params.n_estimators == 0 {
            return Err(AppError::Validation("n_estimators must be positive".to_string()));
        }

        let x = dataset.features.view();
        let n_rows = dataset.n_samples();
        let n_cols = dataset.n_features();
        let features: Vec<usize> = (0..n_cols).collect();
        let growth = TreeGrowth {
            max_depth: self.params.max_depth,
            min_samples_split: self.params.min_samples_split,
            min_samples_leaf: self.params.min_samples_leaf,
            max_features: Some(self.max_features(n_cols)),
        };
        let criterion = GiniCriterion {
            labels: &dataset.labels,
        };
        let seed = self.seed;

        // Tree t is seeded with seed + t
        let trees: Vec<DecisionTree> = (0..self.params.n_estimators as u64)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t));
                let bootstrap: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
                DecisionTree::fit(x, &bootstrap, &features, &criterion, &growth, rng.gen())
            })
            .collect();

        self.trees = trees;
        self.n_features = n_cols;
        self.trained = true;

        tracing::debug!(n_trees = self.trees.len(), n_rows, n_cols, "Random forest fitted");
        Ok(())
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.trained {
            return Err(AppError::NotFitted("Random forest is not trained".to_string()));
        }
        check_predict_inputs(self.n_features, features)?;

        let mut total = Array1::zeros(features.nrows());
        for tree in &self.trees {
            total += &tree.predict(features.view());
        }
        Ok(total / self.trees.len() as f64)
    }

    fn model_type(&self) -> ModelType {
        ModelType::RandomForest
    }

    fn is_trained(&self) -> bool {
        self.trained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_dataset() -> Dataset {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            let label = usize::from(i >= 15);
            let center = if label == 1 { 5.0 } else { 0.0 };
            rows.extend_from_slice(&[center + (i % 4) as f64 * 0.2, center - (i % 3) as f64 * 0.1, (i % 5) as f64]);
            labels.push(label);
        }
        Dataset::new(
            Array2::from_shape_vec((30, 3), rows).unwrap(),
            labels,
            vec!["a".into(), "b".into(), "noise".into()],
        )
        .unwrap()
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_estimators: 25,
            max_depth: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_forest_probabilities() {
        let dataset = clustered_dataset();
        let mut forest = RandomForest::new(small_params(), 42);
        forest.fit(&dataset).unwrap();
        assert_eq!(forest.n_trees(), 25);

        let probabilities = forest.predict_proba(&dataset.features).unwrap();
        assert!(probabilities.iter().all(|&p| (0.0..=1.0).contains(&p)));
        for (p, &label) in probabilities.iter().zip(&dataset.labels) {
            if label == 1 {
                assert!(*p > 0.5);
            } else {
                assert!(*p < 0.5);
            }
        }
    }

    #[test]
    fn test_parallel_fit_is_reproducible() {
        let dataset = clustered_dataset();
        let mut a = RandomForest::new(small_params(), 3);
        let mut b = RandomForest::new(small_params(), 3);
        a.fit(&dataset).unwrap();
        b.fit(&dataset).unwrap();
        assert_eq!(
            a.predict_proba(&dataset.features).unwrap(),
            b.predict_proba(&dataset.features).unwrap()
        );
    }

    #[test]
    fn test_default_max_features_is_sqrt() {
        let forest = RandomForest::new(ForestParams::default(), 0);
        assert_eq!(forest.max_features(60), 7);
        assert_eq!(forest.max_features(1), 1);
    }
}
