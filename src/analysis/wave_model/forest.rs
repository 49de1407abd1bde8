//! Random-forest regressor.
//!
//! Each tree is a CART regression tree grown on a bootstrap resample of the
//! training rows, trying a random subset of predictors at every split and
//! stopping when a child would fall below the minimum node size. Rows left
//! out of a tree's resample give the out-of-bag error estimate; the summed
//! squared-error reduction per predictor gives feature importance.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand::seq::index::sample;

use crate::model::AnalysisError;

#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// Minimum rows in a terminal node.
    pub min_node_size: usize,
    /// Predictors tried per split; `None` uses max(1, p / 3).
    pub features_per_split: Option<usize>,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 500,
            min_node_size: 5,
            features_per_split: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf(v) => return *v,
                Node::Split { feature, threshold, left, right } => {
                    i = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Tree>,
    n_features: usize,
    /// Out-of-bag R² and RMSE; `None` when no row was ever out of bag.
    pub oob_r_squared: Option<f64>,
    pub oob_rmse: Option<f64>,
    /// Share of the total squared-error reduction per predictor, summing to 1.
    pub importance: Vec<f64>,
}

struct Grower<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    min_node_size: usize,
    mtry: usize,
    importance: Vec<f64>,
}

impl Grower<'_> {
    fn grow(&mut self, rows: Vec<usize>, nodes: &mut Vec<Node>, rng: &mut StdRng) -> usize {
        let id = nodes.len();
        let mean = rows.iter().map(|&r| self.y[r]).sum::<f64>() / rows.len() as f64;
        nodes.push(Node::Leaf(mean));

        if rows.len() < 2 * self.min_node_size {
            return id;
        }

        let n_features = self.x[0].len();
        let candidates = sample(rng, n_features, self.mtry.min(n_features)).into_vec();
        let Some((feature, threshold, gain)) = self.best_split(&rows, &candidates) else {
            return id;
        };

        self.importance[feature] += gain;
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| self.x[r][feature] <= threshold);
        let left = self.grow(left_rows, nodes, rng);
        let right = self.grow(right_rows, nodes, rng);
        nodes[id] = Node::Split { feature, threshold, left, right };
        id
    }

    /// Best (feature, threshold, SSE reduction) over the candidate features.
    fn best_split(&self, rows: &[usize], candidates: &[usize]) -> Option<(usize, f64, f64)> {
        let n = rows.len();
        let total: f64 = rows.iter().map(|&r| self.y[r]).sum();
        let total_sq: f64 = rows.iter().map(|&r| self.y[r] * self.y[r]).sum();
        let parent_sse = total_sq - total * total / n as f64;
        if parent_sse <= 1e-12 {
            return None;
        }

        let mut best: Option<(usize, f64, f64)> = None;
        let mut order = rows.to_vec();
        for &feature in candidates {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let (mut left_sum, mut left_sq) = (0.0, 0.0);
            for i in 0..n - 1 {
                let yi = self.y[order[i]];
                left_sum += yi;
                left_sq += yi * yi;

                let left_n = i + 1;
                let right_n = n - left_n;
                if left_n < self.min_node_size || right_n < self.min_node_size {
                    continue;
                }
                let here = self.x[order[i]][feature];
                let next = self.x[order[i + 1]][feature];
                if here == next {
                    continue;
                }

                let right_sum = total - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / left_n as f64)
                    + (right_sq - right_sum * right_sum / right_n as f64);
                let gain = parent_sse - sse;
                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, 0.5 * (here + next), gain));
                }
            }
        }
        best
    }
}

impl RandomForest {
    /// Fits the forest to rows `x` (one `Vec` per row) and targets `y`.
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &ForestConfig) -> Result<Self, AnalysisError> {
        let n = x.len();
        if n == 0 || n != y.len() {
            return Err(AnalysisError::insufficient("random forest training rows", 1, n.min(y.len())));
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|row| row.len() != n_features) {
            return Err(AnalysisError::InvalidConfiguration(
                "training rows must share a non-zero predictor count".to_string(),
            ));
        }
        if config.n_trees == 0 || config.min_node_size == 0 {
            return Err(AnalysisError::InvalidConfiguration(
                "n_trees and min_node_size must be at least 1".to_string(),
            ));
        }

        let mtry = config
            .features_per_split
            .unwrap_or((n_features / 3).max(1))
            .clamp(1, n_features);
        let mut grower = Grower {
            x,
            y,
            min_node_size: config.min_node_size,
            mtry,
            importance: vec![0.0; n_features],
        };

        let mut trees = Vec::with_capacity(config.n_trees);
        let mut oob_sum = vec![0.0; n];
        let mut oob_count = vec![0usize; n];

        for t in 0..config.n_trees {
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
            let mut in_bag = vec![false; n];
            let rows: Vec<usize> = (0..n)
                .map(|_| {
                    let r = rng.gen_range(0..n);
                    in_bag[r] = true;
                    r
                })
                .collect();

            let mut nodes = Vec::new();
            grower.grow(rows, &mut nodes, &mut rng);
            let tree = Tree { nodes };

            for (i, row) in x.iter().enumerate() {
                if !in_bag[i] {
                    oob_sum[i] += tree.predict(row);
                    oob_count[i] += 1;
                }
            }
            trees.push(tree);
        }

        let (oob_r_squared, oob_rmse) = oob_scores(y, &oob_sum, &oob_count);

        let total_gain: f64 = grower.importance.iter().sum();
        let importance = if total_gain > 0.0 {
            grower.importance.iter().map(|g| g / total_gain).collect()
        } else {
            vec![0.0; n_features]
        };

        Ok(Self {
            trees,
            n_features,
            oob_r_squared,
            oob_rmse,
            importance,
        })
    }

    /// Mean of the tree predictions for one row.
    pub fn predict(&self, row: &[f64]) -> f64 {
        debug_assert_eq!(row.len(), self.n_features);
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

fn oob_scores(y: &[f64], sums: &[f64], counts: &[usize]) -> (Option<f64>, Option<f64>) {
    let pairs: Vec<(f64, f64)> = y
        .iter()
        .zip(sums.iter().zip(counts))
        .filter(|(_, (_, c))| **c > 0)
        .map(|(actual, (s, c))| (*actual, s / *c as f64))
        .collect();
    if pairs.is_empty() {
        return (None, None);
    }
    let n = pairs.len() as f64;
    let mean = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let sse: f64 = pairs.iter().map(|(a, p)| (a - p).powi(2)).sum();
    let sst: f64 = pairs.iter().map(|(a, _)| (a - mean).powi(2)).sum();
    let r2 = (sst > 0.0).then(|| 1.0 - sse / sst);
    (r2, Some((sse / n).sqrt()))
}
