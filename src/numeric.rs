//! # Log-Space Numerics
//!
//! Stable softmax / log-softmax / log-sum-exp helpers shared by the loss
//! functions and the ensemble evaluator. Everything combines logits in
//! log-space so large snapshot counts or class counts cannot overflow.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// `log(sum(exp(x)))` with the usual max-shift for stability.
/// Returns negative infinity for an empty slice.
pub fn log_sum_exp(xs: &[f64]) -> f64 {
    let max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = xs.iter().map(|x| (x - max).exp()).sum();
    max + sum.ln()
}

/// Row-wise log-softmax of a `(examples, classes)` logit matrix.
pub fn log_softmax(logits: ArrayView2<'_, f32>) -> Array2<f64> {
    let mut out = logits.mapv(f64::from);
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let lse = max + row.iter().map(|x| (x - max).exp()).sum::<f64>().ln();
        row.mapv_inplace(|x| x - lse);
    }
    out
}

/// Row-wise softmax of a `(examples, classes)` logit matrix.
pub fn softmax(logits: ArrayView2<'_, f32>) -> Array2<f64> {
    let mut out = log_softmax(logits);
    out.mapv_inplace(f64::exp);
    out
}

/// Index of the row maximum (first one wins on ties).
pub fn argmax(row: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &v) in row.iter().enumerate() {
        if v > best_val {
            best = i;
            best_val = v;
        }
    }
    best
}

/// Fraction of rows whose argmax matches the label.
pub fn accuracy(logits: ArrayView2<'_, f32>, labels: &Array1<usize>) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let probs = logits.mapv(f64::from);
    let correct = probs
        .axis_iter(Axis(0))
        .zip(labels.iter())
        .filter(|(row, &y)| argmax(row.view()) == y)
        .count();
    correct as f64 / labels.len() as f64
}
