use crate::ml::models::{ConfusionMatrix, ModelMetrics};

/// Hard labels from positive-class probabilities; the threshold is inclusive
pub fn predict_labels(probabilities: &[f64], threshold: f64) -> Vec<usize> {
    probabilities
        .iter()
        .map(|&p| usize::from(p >= threshold))
        .collect()
}

pub fn confusion_matrix(labels: &[usize], predictions: &[usize]) -> ConfusionMatrix {
    let mut cm = ConfusionMatrix::default();
    for (&actual, &predicted) in labels.iter().zip(predictions) {
        match (actual == 1, predicted == 1) {
            (true, true) => cm.tp += 1,
            (false, true) => cm.fp += 1,
            (false, false) => cm.tn += 1,
            (true, false) => cm.fn_ += 1,
        }
    }
    cm
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

pub fn accuracy(cm: &ConfusionMatrix) -> f64 {
    ratio(cm.tp + cm.tn, cm.total())
}

pub fn precision(cm: &ConfusionMatrix) -> f64 {
    ratio(cm.tp, cm.tp + cm.fp)
}

pub fn recall(cm: &ConfusionMatrix) -> f64 {
    ratio(cm.tp, cm.tp + cm.fn_)
}

pub fn f1_score(cm: &ConfusionMatrix) -> f64 {
    ratio(2 * cm.tp, 2 * cm.tp + cm.fp + cm.fn_)
}

/// Area under the ROC curve via the rank-sum statistic, averaging tied ranks.
///
/// NaN when only one class is present.
pub fn roc_auc(labels: &[usize], scores: &[f64]) -> f64 {
    let n_pos = labels.iter().filter(|&&l| l == 1).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return f64::NAN;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; a tie group shares the mean of its positions
        let average = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = average;
        }
        start = end;
    }

    let positive_rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(&l, _)| l == 1)
        .map(|(_, &r)| r)
        .sum();

    let n_pos = n_pos as f64;
    (positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

/// All metrics at one decision threshold
pub fn evaluate(labels: &[usize], probabilities: &[f64], threshold: f64) -> ModelMetrics {
    let predictions = predict_labels(probabilities, threshold);
    let confusion = confusion_matrix(labels, &predictions);

    ModelMetrics {
        accuracy: accuracy(&confusion),
        precision: precision(&confusion),
        recall: recall(&confusion),
        f1_score: f1_score(&confusion),
        roc_auc: roc_auc(labels, probabilities),
        confusion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_and_rates() {
        let labels = [1, 1, 1, 0, 0, 0, 0, 1];
        let probabilities = [0.9, 0.6, 0.2, 0.7, 0.1, 0.3, 0.5, 0.5];
        let metrics = evaluate(&labels, &probabilities, 0.5);

        assert_eq!(metrics.confusion, ConfusionMatrix { tp: 3, fp: 2, tn: 2, fn_: 1 });
        assert_eq!(metrics.accuracy, 5.0 / 8.0);
        assert_eq!(metrics.precision, 3.0 / 5.0);
        assert_eq!(metrics.recall, 3.0 / 4.0);
        assert!((metrics.f1_score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let cm = confusion_matrix(&[0, 0], &[0, 0]);
        assert_eq!(precision(&cm), 0.0);
        assert_eq!(recall(&cm), 0.0);
        assert_eq!(f1_score(&cm), 0.0);
        assert_eq!(accuracy(&cm), 1.0);
    }

    #[test]
    fn test_roc_auc() {
        assert_eq!(roc_auc(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]), 0.75);
        assert_eq!(roc_auc(&[0, 1], &[0.2, 0.9]), 1.0);
        // Ties between classes count as half
        assert_eq!(roc_auc(&[0, 1], &[0.5, 0.5]), 0.5);
        assert!(roc_auc(&[1, 1], &[0.5, 0.6]).is_nan());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(predict_labels(&[0.3, 0.5, 0.7], 0.5), vec![0, 1, 1]);
    }
}
