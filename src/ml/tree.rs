use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Node of an arena-allocated binary tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Impurity measure and leaf model used while growing a tree
pub trait SplitCriterion {
    type Stats: Copy + Default;

    /// Sufficient statistics contributed by one training row
    fn row_stats(&self, row: usize) -> Self::Stats;

    fn merge(a: Self::Stats, b: Self::Stats) -> Self::Stats;

    fn subtract(a: Self::Stats, b: Self::Stats) -> Self::Stats;

    /// Improvement from splitting `parent` into `left` and `right`; `None`
    /// when the split violates a constraint
    fn gain(&self, parent: Self::Stats, left: Self::Stats, right: Self::Stats) -> Option<f64>;

    fn leaf_value(&self, stats: Self::Stats) -> f64;

    fn is_pure(&self, _stats: Self::Stats) -> bool {
        false
    }
}

/// Gradient and hessian sums for second-order boosting
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientStats {
    pub gradient: f64,
    pub hessian: f64,
}

/// Regularized Newton split gain on precomputed gradients and hessians
pub struct NewtonCriterion<'a> {
    pub gradients: &'a [f64],
    pub hessians: &'a [f64],
    pub lambda: f64,
    pub gamma: f64,
    pub min_child_weight: f64,
}

impl NewtonCriterion<'_> {
    fn score(&self, stats: GradientStats) -> f64 {
        stats.gradient * stats.gradient / (stats.hessian + self.lambda)
    }
}

impl SplitCriterion for NewtonCriterion<'_> {
    type Stats = GradientStats;

    fn row_stats(&self, row: usize) -> GradientStats {
        GradientStats {
            gradient: self.gradients[row],
            hessian: self.hessians[row],
        }
    }

    fn merge(a: GradientStats, b: GradientStats) -> GradientStats {
        GradientStats {
            gradient: a.gradient + b.gradient,
            hessian: a.hessian + b.hessian,
        }
    }

    fn subtract(a: GradientStats, b: GradientStats) -> GradientStats {
        GradientStats {
            gradient: a.gradient - b.gradient,
            hessian: a.hessian - b.hessian,
        }
    }

    fn gain(&self, parent: GradientStats, left: GradientStats, right: GradientStats) -> Option<f64> {
        if left.hessian < self.min_child_weight || right.hessian < self.min_child_weight {
            return None;
        }
        Some(0.5 * (self.score(left) + self.score(right) - self.score(parent)) - self.gamma)
    }

    fn leaf_value(&self, stats: GradientStats) -> f64 {
        -stats.gradient / (stats.hessian + self.lambda)
    }
}

/// Sample and positive-class counts for Gini trees
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassStats {
    pub count: f64,
    pub positives: f64,
}

impl ClassStats {
    fn weighted_gini(&self) -> f64 {
        if self.count == 0.0 {
            return 0.0;
        }
        let p = self.positives / self.count;
        self.count * 2.0 * p * (1.0 - p)
    }
}

/// Gini impurity decrease on binary labels; leaves hold the positive fraction
pub struct GiniCriterion<'a> {
    pub labels: &'a [usize],
}

impl SplitCriterion for GiniCriterion<'_> {
    type Stats = ClassStats;

    fn row_stats(&self, row: usize) -> ClassStats {
        ClassStats {
            count: 1.0,
            positives: if self.labels[row] == 1 { 1.0 } else { 0.0 },
        }
    }

    fn merge(a: ClassStats, b: ClassStats) -> ClassStats {
        ClassStats {
            count: a.count + b.count,
            positives: a.positives + b.positives,
        }
    }

    fn subtract(a: ClassStats, b: ClassStats) -> ClassStats {
        ClassStats {
            count: a.count - b.count,
            positives: a.positives - b.positives,
        }
    }

    fn gain(&self, parent: ClassStats, left: ClassStats, right: ClassStats) -> Option<f64> {
        Some(parent.weighted_gini() - left.weighted_gini() - right.weighted_gini())
    }

    fn leaf_value(&self, stats: ClassStats) -> f64 {
        if stats.count == 0.0 {
            0.0
        } else {
            stats.positives / stats.count
        }
    }

    fn is_pure(&self, stats: ClassStats) -> bool {
        stats.positives == 0.0 || stats.positives == stats.count
    }
}

/// Structural limits applied while growing
#[derive(Debug, Clone)]
pub struct TreeGrowth {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split; all candidate features when unset
    pub max_features: Option<usize>,
}

impl Default for TreeGrowth {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct Builder<'a, C: SplitCriterion> {
    x: ArrayView2<'a, f64>,
    criterion: &'a C,
    growth: &'a TreeGrowth,
    features: &'a [usize],
    rng: StdRng,
    nodes: Vec<Node>,
}

impl<C: SplitCriterion> Builder<'_, C> {
    fn grow(&mut self, rows: &[usize], depth: usize) -> usize {
        let stats = rows
            .iter()
            .fold(C::Stats::default(), |acc, &r| C::merge(acc, self.criterion.row_stats(r)));

        let split = if depth >= self.growth.max_depth
            || rows.len() < self.growth.min_samples_split.max(2)
            || self.criterion.is_pure(stats)
        {
            None
        } else {
            let features = self.features_for_split();
            self.best_split(rows, stats, &features)
        };

        let Some(split) = split else {
            self.nodes.push(Node::Leaf {
                value: self.criterion.leaf_value(stats),
            });
            return self.nodes.len() - 1;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .copied()
            .partition(|&r| self.x[[r, split.feature]] <= split.threshold);

        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });
        let left = self.grow(&left_rows, depth + 1);
        let right = self.grow(&right_rows, depth + 1);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn features_for_split(&mut self) -> Vec<usize> {
        match self.growth.max_features {
            Some(m) if m > 0 && m < self.features.len() => {
                rand::seq::index::sample(&mut self.rng, self.features.len(), m)
                    .into_iter()
                    .map(|i| self.features[i])
                    .collect()
            }
            _ => self.features.to_vec(),
        }
    }

    fn best_split(&self, rows: &[usize], parent: C::Stats, features: &[usize]) -> Option<SplitCandidate> {
        let min_leaf = self.growth.min_samples_leaf.max(1);
        let mut best: Option<SplitCandidate> = None;
        let mut sorted = rows.to_vec();

        for &feature in features {
            let column = self.x.column(feature);
            sorted.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

            let mut left = C::Stats::default();
            for i in 0..sorted.len() - 1 {
                left = C::merge(left, self.criterion.row_stats(sorted[i]));

                let (lo, hi) = (column[sorted[i]], column[sorted[i + 1]]);
                if lo == hi || i + 1 < min_leaf || sorted.len() - (i + 1) < min_leaf {
                    continue;
                }

                let right = C::subtract(parent, left);
                let Some(gain) = self.criterion.gain(parent, left, right) else {
                    continue;
                };
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mid = lo + (hi - lo) / 2.0;
                    best = Some(SplitCandidate {
                        feature,
                        threshold: if mid < hi { mid } else { lo },
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Binary decision tree with numeric leaf values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Grow a tree on `rows` of `x` using the candidate `features`
    pub fn fit<'a, C: SplitCriterion>(
        x: ArrayView2<'a, f64>,
        rows: &[usize],
        features: &'a [usize],
        criterion: &'a C,
        growth: &'a TreeGrowth,
        seed: u64,
    ) -> Self {
        let mut builder = Builder {
            x,
            criterion,
            growth,
            features,
            rng: StdRng::seed_from_u64(seed),
            nodes: Vec::new(),
        };
        builder.grow(rows, 0);
        Self {
            nodes: builder.nodes,
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.axis_iter(Axis(0)).map(|row| self.predict_row(row)).collect()
    }

    /// Multiply every leaf value, used for shrinkage
    pub fn scale(&mut self, factor: f64) {
        for node in &mut self.nodes {
            if let Node::Leaf { value } = node {
                *value *= factor;
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + depth_of(nodes, *left).max(depth_of(nodes, *right)),
            }
        }
        depth_of(&self.nodes, 0)
    }
}
