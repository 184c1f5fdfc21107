use crate::error::{AppError, Result};
use crate::models::StartupRecord;
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::Path;

/// Read every row of a startup CSV export
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<StartupRecord>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| AppError::Data(format!("Failed to open {}: {}", path.display(), e)))?;

    let headers = reader.headers()?.clone();
    let mut records = Vec::new();
    for row in reader.records() {
        records.push(StartupRecord::from_csv_row(&headers, &row?));
    }

    tracing::info!(path = %path.display(), rows = records.len(), "Loaded startup records");
    Ok(records)
}

/// Keep rows with a terminal outcome, returning them with their class labels
pub fn labeled_records(records: Vec<StartupRecord>) -> (Vec<StartupRecord>, Vec<usize>) {
    records
        .into_iter()
        .filter_map(|record| {
            let label = record.status?.label();
            Some((record, label))
        })
        .unzip()
}

fn indices_by_class(labels: &[usize]) -> Vec<Vec<usize>> {
    let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut by_class = vec![Vec::new(); n_classes];
    for (idx, &label) in labels.iter().enumerate() {
        by_class[label].push(idx);
    }
    by_class
}

/// Split row indices into (train, test) preserving class proportions
pub fn stratified_split(
    labels: &[usize],
    test_size: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(AppError::Validation(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for mut class_indices in indices_by_class(labels) {
        if class_indices.is_empty() {
            continue;
        }
        class_indices.shuffle(&mut rng);
        let n_test = (class_indices.len() as f64 * test_size).round() as usize;
        let n_test = n_test.min(class_indices.len().saturating_sub(1));
        test.extend_from_slice(&class_indices[..n_test]);
        train.extend_from_slice(&class_indices[n_test..]);
    }

    if train.is_empty() || test.is_empty() {
        return Err(AppError::Data(format!(
            "Split of {} rows at test_size {} leaves an empty side",
            labels.len(),
            test_size
        )));
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

/// Class-balanced k-fold assignment, returning (train, validation) index pairs
pub fn stratified_kfold(labels: &[usize], k: usize, seed: u64) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
    if k < 2 {
        return Err(AppError::Validation(format!("k-fold requires k >= 2, got {}", k)));
    }

    let by_class = indices_by_class(labels);
    if let Some(smallest) = by_class.iter().map(Vec::len).filter(|&n| n > 0).min() {
        if smallest < k {
            return Err(AppError::Data(format!(
                "Smallest class has {} rows, fewer than {} folds",
                smallest, k
            )));
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut fold_of = vec![0usize; labels.len()];
    for mut class_indices in by_class {
        class_indices.shuffle(&mut rng);
        for (position, idx) in class_indices.into_iter().enumerate() {
            fold_of[idx] = position % k;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (validation, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&idx| fold_of[idx] == fold);
            (train, validation)
        })
        .collect())
}

/// Feature table with aligned class labels
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Array2<f64>,
    pub labels: Vec<usize>,
    pub feature_names: Vec<String>,
}

impl Dataset {
    pub fn new(features: Array2<f64>, labels: Vec<usize>, feature_names: Vec<String>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(AppError::Data(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        Ok(Self {
            features,
            labels,
            feature_names,
        })
    }

    /// Sub-dataset of the given rows, in the given order
    pub fn select(&self, rows: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), rows),
            labels: rows.iter().map(|&i| self.labels[i]).collect(),
            feature_names: self.feature_names.clone(),
        }
    }

    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Rows of the negative and positive class
    pub fn class_counts(&self) -> (usize, usize) {
        let positives = self.labels.iter().filter(|&&l| l == 1).count();
        (self.labels.len() - positives, positives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Outcome;
    use ndarray::array;
    use std::io::Write;

    fn labels(n_neg: usize, n_pos: usize) -> Vec<usize> {
        let mut labels = vec![0; n_neg];
        labels.extend(vec![1; n_pos]);
        labels
    }

    #[test]
    fn test_load_and_filter_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,funding_total_usd,category_code,status").unwrap();
        writeln!(file, "A,1000,web,acquired").unwrap();
        writeln!(file, "B,oops,mobile,closed").unwrap();
        writeln!(file, "C,500,web,operating").unwrap();
        file.flush().unwrap();

        let records = load_records(file.path()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].funding_total_usd, None);

        let (records, labels) = labeled_records(records);
        assert_eq!(records.len(), 2);
        assert_eq!(labels, vec![1, 0]);
        assert_eq!(records[0].status, Some(Outcome::Acquired));
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(load_records("/nonexistent/startups.csv").is_err());
    }

    #[test]
    fn test_stratified_split_is_proportional_and_deterministic() {
        let labels = labels(60, 40);
        let (train, test) = stratified_split(&labels, 0.2, 42).unwrap();

        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 1).count(), 8);

        let (train_again, test_again) = stratified_split(&labels, 0.2, 42).unwrap();
        assert_eq!(train, train_again);
        assert_eq!(test, test_again);

        let (_, other_test) = stratified_split(&labels, 0.2, 7).unwrap();
        assert_ne!(test, other_test);
    }

    #[test]
    fn test_stratified_split_rejects_bad_size() {
        assert!(stratified_split(&labels(5, 5), 0.0, 42).is_err());
        assert!(stratified_split(&labels(5, 5), 1.0, 42).is_err());
    }

    #[test]
    fn test_kfold_covers_every_row_once() {
        let labels = labels(12, 8);
        let folds = stratified_kfold(&labels, 4, 1).unwrap();
        assert_eq!(folds.len(), 4);

        let mut seen = vec![0; labels.len()];
        for (train, validation) in &folds {
            assert_eq!(train.len() + validation.len(), labels.len());
            assert_eq!(validation.iter().filter(|&&i| labels[i] == 1).count(), 2);
            for &idx in validation {
                seen[idx] += 1;
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn test_kfold_rejects_tiny_class() {
        assert!(stratified_kfold(&labels(10, 2), 5, 0).is_err());
    }

    #[test]
    fn test_dataset_select() {
        let dataset = Dataset::new(
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            vec![0, 1, 1],
            vec!["a".into(), "b".into()],
        )
        .unwrap();

        let subset = dataset.select(&[2, 0]);
        assert_eq!(subset.features, array![[5.0, 6.0], [1.0, 2.0]]);
        assert_eq!(subset.labels, vec![1, 0]);
        assert_eq!(dataset.class_counts(), (1, 2));
    }
}
