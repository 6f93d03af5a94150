use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub trees: usize,
    pub min_samples_split: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            trees: 100,
            min_samples_split: 2,
            max_depth: None,
            seed: 42,
        }
    }
}

#[derive(Debug)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(v) => return *v,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

/// Bagged regression trees (CART, squared-error splits over all features).
#[derive(Debug)]
pub struct RandomForest {
    trees: Vec<Node>,
}

impl RandomForest {
    /// Trees are grown in parallel; tree `i` draws its bootstrap sample from
    /// `seed + i`, so a fit is reproducible regardless of thread scheduling.
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &ForestParams) -> Self {
        assert_eq!(x.len(), y.len(), "feature rows and targets differ in length");
        assert!(!y.is_empty(), "cannot fit on an empty training set");

        let trees = (0..params.trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(i as u64));
                let sample: Vec<usize> = (0..y.len()).map(|_| rng.gen_range(0..y.len())).collect();
                grow(x, y, sample, 0, params)
            })
            .collect();
        RandomForest { trees }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn predict_all(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.par_iter().map(|r| self.predict(r)).collect()
    }
}

fn mean(y: &[f64], idx: &[usize]) -> f64 {
    idx.iter().map(|&i| y[i]).sum::<f64>() / idx.len() as f64
}

fn grow(x: &[Vec<f64>], y: &[f64], idx: Vec<usize>, depth: usize, params: &ForestParams) -> Node {
    let value = mean(y, &idx);
    let depth_reached = params.max_depth.is_some_and(|d| depth >= d);
    let pure = idx.iter().all(|&i| y[i] == y[idx[0]]);
    if idx.len() < params.min_samples_split || depth_reached || pure {
        return Node::Leaf(value);
    }

    let Some((feature, threshold)) = best_split(x, y, &idx) else {
        return Node::Leaf(value);
    };
    let (left, right): (Vec<usize>, Vec<usize>) =
        idx.into_iter().partition(|&i| x[i][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(x, y, left, depth + 1, params)),
        right: Box::new(grow(x, y, right, depth + 1, params)),
    }
}

/// Split minimising the summed squared error of both sides, or `None` when
/// every feature is constant over `idx`.
fn best_split(x: &[Vec<f64>], y: &[f64], idx: &[usize]) -> Option<(usize, f64)> {
    let n = idx.len() as f64;
    let total: f64 = idx.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = idx.iter().map(|&i| y[i] * y[i]).sum();
    let features = x[idx[0]].len();

    let mut best: Option<(f64, usize, f64)> = None;
    let mut order = idx.to_vec();
    for f in 0..features {
        order.sort_by(|&a, &b| x[a][f].total_cmp(&x[b][f]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 0..order.len() - 1 {
            let yi = y[order[k]];
            left_sum += yi;
            left_sq += yi * yi;

            let here = x[order[k]][f];
            let next = x[order[k + 1]][f];
            if here == next {
                continue;
            }
            let nl = (k + 1) as f64;
            let nr = n - nl;
            let right_sum = total - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / nl) + (right_sq - right_sum * right_sum / nr);
            if best.map_or(true, |(b, _, _)| sse < b) {
                best = Some((sse, f, (here + next) / 2.0));
            }
        }
    }
    best.map(|(_, f, t)| (f, t))
}
