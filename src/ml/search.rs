use crate::error::{AppError, Result};
use crate::ml::boosting::GradientBoostedTrees;
use crate::ml::classifier::Classifier;
use crate::ml::dataset::{stratified_kfold, Dataset};
use crate::ml::evaluation;
use crate::ml::models::{BoostingParams, GridSearchConfig};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Cross-validated score of one grid point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: BoostingParams,
    pub mean_accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchResult {
    pub best_params: BoostingParams,
    pub best_score: f64,
    pub candidates: Vec<CandidateScore>,
}

/// Values to try for one parameter; the base value when the list is empty
fn or_base<T: Copy>(values: &[T], base: T) -> Vec<T> {
    if values.is_empty() {
        vec![base]
    } else {
        values.to_vec()
    }
}

/// Cartesian product of the grid, in declaration order
pub fn expand_grid(base: &BoostingParams, grid: &GridSearchConfig) -> Vec<BoostingParams> {
    let mut candidates = Vec::new();
    for &n_estimators in &or_base(&grid.n_estimators, base.n_estimators) {
        for &max_depth in &or_base(&grid.max_depth, base.max_depth) {
            for &learning_rate in &or_base(&grid.learning_rate, base.learning_rate) {
                for &subsample in &or_base(&grid.subsample, base.subsample) {
                    for &colsample_bytree in &or_base(&grid.colsample_bytree, base.colsample_bytree) {
                        candidates.push(BoostingParams {
                            n_estimators,
                            max_depth,
                            learning_rate,
                            subsample,
                            colsample_bytree,
                            ..base.clone()
                        });
                    }
                }
            }
        }
    }
    candidates
}

fn cross_val_accuracy(dataset: &Dataset, params: &BoostingParams, folds: &[(Vec<usize>, Vec<usize>)], seed: u64) -> Result<f64> {
    let mut total = 0.0;
    for (train, validation) in folds {
        let mut model = GradientBoostedTrees::new(params.clone(), seed);
        model.fit(&dataset.select(train))?;

        let held_out = dataset.select(validation);
        let probabilities = model.predict_proba(&held_out.features)?;
        let predictions = evaluation::predict_labels(&probabilities.to_vec(), 0.5);
        total += evaluation::accuracy(&evaluation::confusion_matrix(&held_out.labels, &predictions));
    }
    Ok(total / folds.len() as f64)
}

/// Exhaustive search over boosting parameters scored by k-fold accuracy.
///
/// Ties keep the earlier candidate.
pub fn grid_search(
    dataset: &Dataset,
    base: &BoostingParams,
    grid: &GridSearchConfig,
    seed: u64,
) -> Result<GridSearchResult> {
    let folds = stratified_kfold(&dataset.labels, grid.cv_folds, seed)?;
    let candidates = expand_grid(base, grid);

    tracing::info!(
        n_candidates = candidates.len(),
        cv_folds = grid.cv_folds,
        "Starting grid search"
    );

    let scored: Vec<CandidateScore> = candidates
        .into_par_iter()
        .map(|params| {
            let mean_accuracy = cross_val_accuracy(dataset, &params, &folds, seed)?;
            Ok(CandidateScore {
                params,
                mean_accuracy,
            })
        })
        .collect::<Result<_>>()?;

    let best = scored
        .iter()
        .fold(None::<&CandidateScore>, |best, c| match best {
            Some(b) if b.mean_accuracy >= c.mean_accuracy => Some(b),
            _ => Some(c),
        })
        .ok_or_else(|| AppError::Training("Grid search produced no candidates".to_string()))?;

    tracing::info!(
        best_score = best.mean_accuracy,
        n_estimators = best.params.n_estimators,
        max_depth = best.params.max_depth,
        learning_rate = best.params.learning_rate,
        "Grid search complete"
    );

    Ok(GridSearchResult {
        best_params: best.params.clone(),
        best_score: best.mean_accuracy,
        candidates: scored,
    })
}
