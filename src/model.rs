// Encode the engineered table, split it, and train the classifiers.
use linfa::prelude::{Dataset, Fit, Predict};
use linfa_nn::distance::L2Dist;
use linfa_nn::{CommonNearestNeighbour, NearestNeighbour};
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::encoder::LabelEncoder;
use crate::error::{Error, Result};
use crate::preprocess::EngineeredRow;

/// Column order of every feature matrix, at training and at prediction time.
pub const FEATURE_NAMES: [&str; 5] = ["team", "opponent", "avg_points", "home", "prev_outcome"];

const STD_EPSILON: f64 = 1e-12;

/// An engineered row with team and opponent mapped through the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRow {
    pub team: usize,
    pub opponent: usize,
    pub avg_points: f64,
    pub is_home: bool,
    pub prev_outcome: bool,
    pub win: bool,
}

impl EncodedRow {
    pub fn features(&self) -> [f64; 5] {
        [
            self.team as f64,
            self.opponent as f64,
            self.avg_points,
            if self.is_home { 1.0 } else { 0.0 },
            if self.prev_outcome { 1.0 } else { 0.0 },
        ]
    }
}

/// Fit one encoder over both id columns; they share a value domain.
pub fn fit_encoder(rows: &[EngineeredRow]) -> LabelEncoder {
    LabelEncoder::fit(rows.iter().flat_map(|r| [r.team_id(), r.opponent_id]))
}

pub fn encode_rows(rows: &[EngineeredRow], encoder: &LabelEncoder) -> Result<Vec<EncodedRow>> {
    rows.iter()
        .map(|r| {
            Ok(EncodedRow {
                team: encoder.transform(r.team_id())?,
                opponent: encoder.transform(r.opponent_id)?,
                avg_points: r.avg_points,
                is_home: r.is_home,
                prev_outcome: r.prev_outcome,
                win: r.game.win,
            })
        })
        .collect()
}

pub fn to_matrix(rows: &[EncodedRow]) -> (Array2<f64>, Array1<usize>) {
    let mut x = Array2::<f64>::zeros((rows.len(), FEATURE_NAMES.len()));
    let mut y = Array1::<usize>::zeros(rows.len());
    for (i, r) in rows.iter().enumerate() {
        for (j, v) in r.features().iter().enumerate() {
            x[(i, j)] = *v;
        }
        y[i] = r.win as usize;
    }
    (x, y)
}

/// Seeded row-level shuffle split. The test side gets `ceil(n * test_fraction)` rows,
/// capped so the training side is never empty.
pub fn train_test_split<T: Clone>(rows: &[T], test_fraction: f64, seed: u64) -> Result<(Vec<T>, Vec<T>)> {
    if rows.is_empty() {
        return Err(Error::EmptyDataset);
    }
    let n = rows.len();
    let n_test = ((n as f64 * test_fraction).ceil() as usize).min(n - 1);

    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    idx.shuffle(&mut rng);

    let test = idx[..n_test].iter().map(|&i| rows[i].clone()).collect();
    let train = idx[n_test..].iter().map(|&i| rows[i].clone()).collect();
    Ok((train, test))
}

/// Per-column standardization, frozen after `fit`.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        let mean = x.mean_axis(Axis(0)).ok_or(Error::EmptyDataset)?;
        // constant columns are only centred
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s < STD_EPSILON { 1.0 } else { s });
        Ok(StandardScaler { mean, scale })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.scale
    }

    #[cfg(test)]
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    #[cfg(test)]
    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }
}

/// Label 1 exactly when the win probability is above one half.
pub fn win_label(p_win: f64) -> usize {
    (p_win > 0.5) as usize
}

/// A fitted binary win/loss classifier over the raw feature columns.
pub trait Classifier {
    fn name(&self) -> &str;

    /// Probability of class 1 (win) for each row. Labels follow from it through `win_label`.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn feature_importances(&self) -> Option<&[f64]> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
}

/// Bagged ensemble of Gini decision trees. The win probability is the share of
/// trees voting for a win.
pub struct ForestClassifier {
    trees: Vec<DecisionTree<f64, usize>>,
    importances: Vec<f64>,
}

impl ForestClassifier {
    pub fn fit(x: &Array2<f64>, y: &Array1<usize>, params: &ForestParams) -> Result<Self> {
        let n = x.nrows();
        if n == 0 || params.n_trees == 0 {
            return Err(Error::EmptyDataset);
        }
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut importances = vec![0.0; x.ncols()];

        for _ in 0..params.n_trees {
            let sample: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
            let ds = Dataset::new(x.select(Axis(0), &sample), y.select(Axis(0), &sample));
            let tree = DecisionTree::<f64, usize>::params()
                .split_quality(SplitQuality::Gini)
                .max_depth(params.max_depth)
                .fit(&ds)
                .map_err(|e| Error::Fit(e.to_string()))?;

            // a single-leaf tree has no impurity decrease to share out
            let imp = tree.feature_importance();
            if imp.iter().all(|v| v.is_finite()) {
                for (acc, v) in importances.iter_mut().zip(imp) {
                    *acc += v;
                }
            }
            trees.push(tree);
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        } else {
            warn!("Forest found no informative splits");
        }
        debug!("Fitted {} trees on {} rows", trees.len(), n);
        Ok(ForestClassifier { trees, importances })
    }
}

impl Classifier for ForestClassifier {
    fn name(&self) -> &str {
        "random_forest"
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mut votes = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            let pred: Array1<usize> = tree.predict(x);
            votes += &pred.mapv(|l| l as f64);
        }
        Ok(votes / self.trees.len() as f64)
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        Some(self.importances.as_slice())
    }
}

/// k-nearest-neighbour vote on standardized features. The scaler is fitted on the
/// training rows and reused unchanged for every later prediction.
pub struct KnnClassifier {
    k: usize,
    scaler: StandardScaler,
    records: Array2<f64>,
    labels: Array1<usize>,
}

impl KnnClassifier {
    pub fn fit(x: &Array2<f64>, y: &Array1<usize>, k: usize) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(Error::EmptyDataset);
        }
        let scaler = StandardScaler::fit(x)?;
        let records = scaler.transform(x);
        Ok(KnnClassifier {
            k: k.clamp(1, x.nrows()),
            scaler,
            records,
            labels: y.clone(),
        })
    }

    #[cfg(test)]
    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }
}

impl Classifier for KnnClassifier {
    fn name(&self) -> &str {
        "knn"
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let z = self.scaler.transform(x);
        let index = CommonNearestNeighbour::KdTree
            .from_batch(&self.records, L2Dist)
            .map_err(|e| Error::Fit(e.to_string()))?;

        let mut proba = Array1::<f64>::zeros(z.nrows());
        for (i, row) in z.rows().into_iter().enumerate() {
            let neighbours = index
                .k_nearest(row, self.k)
                .map_err(|e| Error::Fit(e.to_string()))?;
            let wins = neighbours.iter().filter(|(_, j)| self.labels[*j] == 1).count();
            proba[i] = wins as f64 / neighbours.len().max(1) as f64;
        }
        Ok(proba)
    }
}

#[derive(Debug, Clone)]
pub struct TrainParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub k: usize,
    pub seed: u64,
}

/// Fit every configured classifier family on the same training matrix.
pub fn train_models(x: &Array2<f64>, y: &Array1<usize>, params: &TrainParams) -> Result<Vec<Box<dyn Classifier>>> {
    let forest = ForestClassifier::fit(
        x,
        y,
        &ForestParams {
            n_trees: params.n_trees,
            max_depth: params.max_depth,
            seed: params.seed,
        },
    )?;
    info!("Trained random forest ({} trees)", params.n_trees);
    let knn = KnnClassifier::fit(x, y, params.k)?;
    info!("Trained knn (k = {})", knn.k);
    Ok(vec![Box::new(forest), Box::new(knn)])
}

/// Feature names paired with their importances, largest first. Ties keep column order.
pub fn ranked_importances(importances: &[f64]) -> Vec<(String, f64)> {
    let mut v: Vec<(String, f64)> = FEATURE_NAMES
        .iter()
        .zip(importances)
        .map(|(&n, &c)| (n.to_string(), c))
        .collect();
    v.sort_by(|a, b| b.1.total_cmp(&a.1));
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn split_is_deterministic_and_partitions() {
        let rows: Vec<u32> = (0..50).collect();
        let (tr1, te1) = train_test_split(&rows, 0.2, 42).unwrap();
        let (tr2, te2) = train_test_split(&rows, 0.2, 42).unwrap();
        assert_eq!(tr1, tr2);
        assert_eq!(te1, te2);
        assert_eq!(te1.len(), 10);
        assert_eq!(tr1.len(), 40);

        let mut all: Vec<u32> = tr1.iter().chain(te1.iter()).copied().collect();
        all.sort();
        assert_eq!(all, rows);
    }

    #[test]
    fn split_keeps_a_training_row() {
        let (train, test) = train_test_split(&[1, 2], 0.9, 0).unwrap();
        assert_eq!(train.len(), 1);
        assert_eq!(test.len(), 1);
        assert!(matches!(train_test_split::<u8>(&[], 0.2, 0), Err(Error::EmptyDataset)));
    }

    #[test]
    fn scaler_is_frozen_after_fit() {
        let train = array![[1.0, 5.0], [3.0, 5.0]];
        let scaler = StandardScaler::fit(&train).unwrap();
        assert_relative_eq!(scaler.mean()[0], 2.0);
        assert_relative_eq!(scaler.scale()[0], 1.0);
        // constant column keeps unit scale
        assert_relative_eq!(scaler.scale()[1], 1.0);

        let before = scaler.clone();
        let out = scaler.transform(&array![[100.0, 7.0]]);
        assert_relative_eq!(out[(0, 0)], 98.0);
        assert_relative_eq!(out[(0, 1)], 2.0);
        assert_eq!(scaler, before);
    }

    fn separable() -> (Array2<f64>, Array1<usize>) {
        // wins only when the home flag is set
        let x = array![
            [0.0, 1.0, 100.0, 1.0, 0.0],
            [1.0, 0.0, 104.0, 0.0, 1.0],
            [0.0, 2.0, 100.0, 0.0, 1.0],
            [2.0, 0.0, 98.0, 1.0, 0.0],
            [1.0, 2.0, 104.0, 1.0, 1.0],
            [2.0, 1.0, 98.0, 0.0, 0.0],
            [0.0, 1.0, 100.0, 1.0, 1.0],
            [1.0, 0.0, 104.0, 0.0, 0.0],
        ];
        let y = array![1, 0, 0, 1, 1, 0, 1, 0];
        (x, y)
    }

    #[test]
    fn forest_learns_home_flag() {
        let (x, y) = separable();
        let params = ForestParams { n_trees: 25, max_depth: None, seed: 7 };
        let forest = ForestClassifier::fit(&x, &y, &params).unwrap();

        let proba = forest.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(proba.mapv(win_label), y);

        let imp = forest.feature_importances().unwrap();
        assert_relative_eq!(imp.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert_eq!(ranked_importances(imp)[0].0, "home");
    }

    #[test]
    fn knn_probability_is_neighbour_share() {
        let x = array![[0.0], [0.1], [0.2], [10.0], [10.1]];
        let y = array![0, 0, 1, 1, 1];
        let knn = KnnClassifier::fit(&x, &y, 3).unwrap();
        let p = knn.predict_proba(&array![[0.05], [10.05]]).unwrap();
        assert_relative_eq!(p[0], 1.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-9);
        assert_eq!(win_label(p[0]), 0);
        assert_eq!(win_label(0.5), 0);
    }

    #[test]
    fn knn_reuses_training_scaler_for_out_of_range_rows() {
        let x = array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]];
        let y = array![0, 1, 1];
        let knn = KnnClassifier::fit(&x, &y, 1).unwrap();
        let frozen = knn.scaler().clone();
        assert_relative_eq!(frozen.mean()[0], 2.0);

        let p = knn.predict_proba(&array![[1000.0, -1000.0]]).unwrap();
        assert!((0.0..=1.0).contains(&p[0]));
        assert_eq!(knn.scaler(), &frozen);
    }

    #[test]
    fn knn_k_is_clamped_to_training_size() {
        let x = array![[0.0], [1.0]];
        let y = array![0, 1];
        let knn = KnnClassifier::fit(&x, &y, 15).unwrap();
        let p = knn.predict_proba(&array![[0.4]]).unwrap();
        assert_relative_eq!(p[0], 0.5);
    }

    #[test]
    fn ranking_is_stable_on_ties() {
        let ranked = ranked_importances(&[0.0, 0.0, 0.2, 0.8, 0.0]);
        let names: Vec<&str> = ranked.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["home", "avg_points", "team", "opponent", "prev_outcome"]);
    }
}
