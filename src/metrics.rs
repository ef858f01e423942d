//! Held-out evaluation of a fitted classifier

use std::fmt;

use ndarray::{Array1, Array2};

use crate::error::Result;
use crate::model::{win_label, Classifier};

pub const CLASS_NAMES: [&str; 2] = ["loss", "win"];

/// Precision, recall and F1 for one class
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Everything measured on the test split for one model
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub model: String,
    pub accuracy: f64,
    /// Indexed by class label (0 = loss, 1 = win)
    pub per_class: [ClassMetrics; 2],
    /// `confusion[actual][predicted]`
    pub confusion: [[usize; 2]; 2],
    /// (false positive rate, true positive rate), from (0, 0) to (1, 1)
    pub roc: Vec<(f64, f64)>,
    /// NaN when the test split holds a single class
    pub auc: f64,
    /// Win probability for every test row
    pub probabilities: Vec<f64>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl Evaluation {
    pub fn total(&self) -> usize {
        self.confusion.iter().flatten().sum()
    }

    pub fn macro_avg(&self) -> ClassMetrics {
        let n = self.per_class.len() as f64;
        ClassMetrics {
            precision: self.per_class.iter().map(|c| c.precision).sum::<f64>() / n,
            recall: self.per_class.iter().map(|c| c.recall).sum::<f64>() / n,
            f1: self.per_class.iter().map(|c| c.f1).sum::<f64>() / n,
            support: self.total(),
        }
    }

    pub fn weighted_avg(&self) -> ClassMetrics {
        let total = self.total().max(1) as f64;
        let w = |f: fn(&ClassMetrics) -> f64| {
            self.per_class.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / total
        };
        ClassMetrics {
            precision: w(|c: &ClassMetrics| c.precision),
            recall: w(|c: &ClassMetrics| c.recall),
            f1: w(|c: &ClassMetrics| c.f1),
            support: self.total(),
        }
    }
}

/// Score `model` on a held-out matrix.
pub fn evaluate(model: &dyn Classifier, x: &Array2<f64>, y: &Array1<usize>) -> Result<Evaluation> {
    let proba = model.predict_proba(x)?;
    let truth = y.to_vec();
    Ok(evaluate_scores(model.name(), &truth, &proba.to_vec()))
}

/// Metrics from true labels and win probabilities; a row is predicted a win above 0.5.
pub fn evaluate_scores(model: &str, y_true: &[usize], proba: &[f64]) -> Evaluation {
    let mut confusion = [[0usize; 2]; 2];
    for (&t, &p) in y_true.iter().zip(proba) {
        confusion[t.min(1)][win_label(p)] += 1;
    }

    let mut per_class = [ClassMetrics::default(); 2];
    for (c, m) in per_class.iter_mut().enumerate() {
        let tp = confusion[c][c];
        let predicted = confusion[0][c] + confusion[1][c];
        let actual = confusion[c][0] + confusion[c][1];
        m.precision = ratio(tp, predicted);
        m.recall = ratio(tp, actual);
        m.f1 = if m.precision + m.recall > 0.0 {
            2.0 * m.precision * m.recall / (m.precision + m.recall)
        } else {
            0.0
        };
        m.support = actual;
    }

    let correct = confusion[0][0] + confusion[1][1];
    let roc = roc_curve(y_true, proba);
    let single_class = per_class.iter().any(|c| c.support == 0);
    Evaluation {
        model: model.to_string(),
        accuracy: ratio(correct, y_true.len()),
        per_class,
        confusion,
        auc: if single_class { f64::NAN } else { auc(&roc) },
        roc,
        probabilities: proba.to_vec(),
    }
}

/// ROC points for every distinct score used as a threshold, highest first.
pub fn roc_curve(y_true: &[usize], scores: &[f64]) -> Vec<(f64, f64)> {
    let positives = y_true.iter().filter(|&&y| y == 1).count();
    let negatives = y_true.len() - positives;

    let mut order: Vec<usize> = (0..scores.len().min(y_true.len())).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut points = vec![(0.0, 0.0)];
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        // all rows sharing a score cross the threshold together
        while i < order.len() && scores[order[i]] == threshold {
            if y_true[order[i]] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        points.push((ratio(fp, negatives), ratio(tp, positives)));
    }
    points
}

/// Trapezoidal area under a curve whose x values never decrease.
pub fn auc(points: &[(f64, f64)]) -> f64 {
    points
        .windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[1].1 + w[0].1) / 2.0)
        .sum()
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ==", self.model)?;
        writeln!(f, "Accuracy: {:.4}", self.accuracy)?;
        writeln!(f, "AUC:      {:.4}", self.auc)?;
        writeln!(f)?;
        writeln!(f, "{:>14} {:>10} {:>10} {:>10} {:>10}", "", "precision", "recall", "f1-score", "support")?;
        for (name, c) in CLASS_NAMES.iter().zip(&self.per_class) {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(f, "{:>14} {:>10} {:>10} {:>10.2} {:>10}", "accuracy", "", "", self.accuracy, self.total())?;
        for (name, c) in [("macro avg", self.macro_avg()), ("weighted avg", self.weighted_avg())] {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Confusion matrix (rows = actual, cols = predicted):")?;
        writeln!(f, "{:>14} {:>8} {:>8}", "", CLASS_NAMES[0], CLASS_NAMES[1])?;
        for (name, row) in CLASS_NAMES.iter().zip(&self.confusion) {
            writeln!(f, "{:>14} {:>8} {:>8}", name, row[0], row[1])?;
        }
        Ok(())
    }
}
