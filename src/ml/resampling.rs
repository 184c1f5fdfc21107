use crate::error::{AppError, Result};
use crate::ml::dataset::Dataset;
use linfa_nn::distance::L2Dist;
use linfa_nn::{CommonNearestNeighbour, NearestNeighbour, NearestNeighbourIndex};
use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn index_error(e: impl std::fmt::Display) -> AppError {
    AppError::Training(format!("Failed to build neighbour index: {}", e))
}

/// Indices of the `k` nearest rows to row `idx`, excluding the row itself
fn neighbours_of(
    index: &dyn NearestNeighbourIndex<f64>,
    points: &ArrayView2<f64>,
    idx: usize,
    k: usize,
) -> Result<Vec<usize>> {
    let found = index
        .k_nearest(points.row(idx), k + 1)
        .map_err(|e| AppError::Training(format!("Neighbour query failed: {}", e)))?;
    Ok(found
        .into_iter()
        .map(|(_, neighbour)| neighbour)
        .filter(|&neighbour| neighbour != idx)
        .take(k)
        .collect())
}

fn minority_class(labels: &[usize]) -> Result<(usize, usize, usize)> {
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(AppError::Training(
            "Resampling requires both classes in the training split".to_string(),
        ));
    }
    Ok(if positives < negatives {
        (1, positives, negatives)
    } else {
        (0, negatives, positives)
    })
}

/// Synthetic minority over-sampling
#[derive(Debug, Clone)]
pub struct Smote {
    pub k_neighbors: usize,
    pub seed: u64,
}

impl Smote {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self { k_neighbors, seed }
    }

    /// Append synthetic minority rows until both classes have equal counts
    pub fn resample(&self, dataset: &Dataset) -> Result<Dataset> {
        let (minority, n_minority, n_majority) = minority_class(&dataset.labels)?;
        let n_synthetic = n_majority - n_minority;
        if n_synthetic == 0 {
            return Ok(dataset.clone());
        }
        if n_minority < 2 {
            return Err(AppError::Training(
                "SMOTE needs at least two minority rows".to_string(),
            ));
        }

        let minority_rows: Vec<usize> = (0..dataset.n_samples())
            .filter(|&i| dataset.labels[i] == minority)
            .collect();
        let points = dataset.features.select(Axis(0), &minority_rows);
        let view = points.view();
        let index = CommonNearestNeighbour::KdTree
            .from_batch(&view, L2Dist)
            .map_err(index_error)?;
        let k = self.k_neighbors.clamp(1, n_minority - 1);

        let neighbours: Vec<Vec<usize>> = (0..n_minority)
            .map(|i| neighbours_of(&*index, &view, i, k))
            .collect::<Result<_>>()?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut synthetic = Array2::zeros((n_synthetic, dataset.n_features()));
        for mut row in synthetic.rows_mut() {
            let sample = rng.gen_range(0..n_minority);
            let candidates = &neighbours[sample];
            let neighbour = candidates[rng.gen_range(0..candidates.len())];
            let gap: f64 = rng.gen();

            let base = points.row(sample);
            let toward = points.row(neighbour);
            row.assign(&(&base + &((&toward - &base) * gap)));
        }

        let features = ndarray::concatenate![Axis(0), dataset.features, synthetic];
        let mut labels = dataset.labels.clone();
        labels.extend(std::iter::repeat(minority).take(n_synthetic));

        tracing::debug!(n_synthetic, minority, k, "SMOTE oversampling complete");
        Dataset::new(features, labels, dataset.feature_names.clone())
    }
}

/// Tomek-link cleaning: drops both rows of every mutual nearest-neighbour
/// pair with opposite labels
#[derive(Debug, Clone, Default)]
pub struct TomekLinks;

impl TomekLinks {
    /// Row pairs `(i, j)` with `i < j` forming Tomek links
    pub fn links(&self, dataset: &Dataset) -> Result<Vec<(usize, usize)>> {
        if dataset.n_samples() < 2 {
            return Ok(Vec::new());
        }

        let view = dataset.features.view();
        let index = CommonNearestNeighbour::KdTree
            .from_batch(&view, L2Dist)
            .map_err(index_error)?;
        let nearest: Vec<Option<usize>> = (0..dataset.n_samples())
            .map(|i| Ok(neighbours_of(&*index, &view, i, 1)?.first().copied()))
            .collect::<Result<_>>()?;

        Ok(nearest
            .iter()
            .enumerate()
            .filter_map(|(i, &j)| {
                let j = j?;
                let mutual = nearest[j] == Some(i);
                (i < j && mutual && dataset.labels[i] != dataset.labels[j]).then_some((i, j))
            })
            .collect())
    }

    pub fn resample(&self, dataset: &Dataset) -> Result<Dataset> {
        let links = self.links(dataset)?;
        let mut keep = vec![true; dataset.n_samples()];
        for &(i, j) in &links {
            keep[i] = false;
            keep[j] = false;
        }

        let rows: Vec<usize> = (0..dataset.n_samples()).filter(|&i| keep[i]).collect();
        tracing::debug!(n_links = links.len(), removed = dataset.n_samples() - rows.len(), "Tomek links removed");
        Ok(dataset.select(&rows))
    }
}

/// SMOTE oversampling followed by Tomek-link cleaning
#[derive(Debug, Clone)]
pub struct SmoteTomek {
    pub smote: Smote,
    pub tomek: TomekLinks,
}

impl SmoteTomek {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self {
            smote: Smote::new(k_neighbors, seed),
            tomek: TomekLinks,
        }
    }

    pub fn resample(&self, dataset: &Dataset) -> Result<Dataset> {
        let oversampled = self.smote.resample(dataset)?;
        let cleaned = self.tomek.resample(&oversampled)?;

        let (negatives, positives) = cleaned.class_counts();
        tracing::info!(
            before = dataset.n_samples(),
            after = cleaned.n_samples(),
            negatives,
            positives,
            "SMOTE-Tomek resampling complete"
        );
        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn imbalanced() -> Dataset {
        Dataset::new(
            array![
                [0.0, 0.0],
                [0.5, 0.2],
                [0.2, 0.6],
                [0.9, 0.9],
                [5.0, 5.0],
                [5.5, 5.2],
                [5.1, 5.8],
                [6.0, 6.0],
                [5.8, 5.3],
                [6.2, 5.6]
            ],
            vec![1, 1, 1, 1, 0, 0, 0, 0, 0, 0],
            vec!["a".into(), "b".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_smote_balances_classes() {
        let dataset = imbalanced();
        let resampled = Smote::new(5, 42).resample(&dataset).unwrap();

        assert_eq!(resampled.class_counts(), (6, 6));
        // Synthetic rows interpolate between minority rows
        for row in resampled.features.rows().into_iter().skip(10) {
            assert!(row.iter().all(|&v| (0.0..=0.9).contains(&v)));
        }
        // Original rows are kept in place
        assert_eq!(resampled.features.row(4), dataset.features.row(4));
    }

    #[test]
    fn test_smote_is_deterministic() {
        let dataset = imbalanced();
        let a = Smote::new(3, 7).resample(&dataset).unwrap();
        let b = Smote::new(3, 7).resample(&dataset).unwrap();
        assert_eq!(a.features, b.features);
    }

    #[test]
    fn test_smote_requires_both_classes() {
        let dataset = Dataset::new(array![[0.0], [1.0]], vec![1, 1], vec!["a".into()]).unwrap();
        assert!(Smote::new(5, 0).resample(&dataset).is_err());
    }

    #[test]
    fn test_tomek_links_remove_both_members() {
        let dataset = Dataset::new(
            array![[0.0], [0.1], [5.0], [5.05], [10.0], [10.2]],
            vec![0, 0, 0, 1, 1, 1],
            vec!["a".into()],
        )
        .unwrap();

        assert_eq!(TomekLinks.links(&dataset).unwrap(), vec![(2, 3)]);
        let cleaned = TomekLinks.resample(&dataset).unwrap();
        assert_eq!(cleaned.labels, vec![0, 0, 1, 1]);
        assert_eq!(cleaned.features, array![[0.0], [0.1], [10.0], [10.2]]);
    }

    #[test]
    fn test_smote_tomek_pipeline() {
        let resampled = SmoteTomek::new(5, 42).resample(&imbalanced()).unwrap();
        let (negatives, positives) = resampled.class_counts();
        assert_eq!(negatives, positives);
    }
}
