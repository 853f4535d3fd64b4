//! # Bayesian Model Averaging Evaluator
//!
//! Combines predictions from every stored posterior sample into one
//! calibrated prediction. Per-snapshot forward passes are read-only and
//! order-independent, so they run on the rayon pool when the execution
//! context allows it. All combination happens in log-space.

use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;

use crate::context::ExecContext;
use crate::data::{collect_all, DataSource};
use crate::error::SamplerError;
use crate::loss::Objective;
use crate::model::Model;
use crate::numeric::{argmax, log_softmax, log_sum_exp};
use crate::snapshot::{Snapshot, SnapshotStore};

/// Ensemble metrics over a held-out set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BmaReport {
    /// Accuracy of the averaged predictive distribution.
    pub accuracy: f64,
    /// Mixture-form ensemble NLL: the negative log of the snapshot-averaged
    /// probability of the true class, averaged over examples. This is the
    /// statistically correct Bayesian-model-averaging NLL.
    pub nll: f64,
    /// Mean of per-snapshot self-NLLs. A weaker diagnostic, not an ensemble
    /// NLL; reported separately and never interchangeable with `nll`.
    pub ce_nll: f64,
    pub snapshots: usize,
}

/// Single-model evaluation: mean loss and accuracy at the current weights.
/// Used at epoch boundaries, before any ensembling.
pub fn evaluate_model<M, O, D>(
    model: &M,
    objective: &O,
    data: &D,
) -> Result<(f64, f64), SamplerError>
where
    M: Model,
    O: Objective<M>,
    D: DataSource + ?Sized,
{
    let n = data.num_examples();
    let mut total_loss = 0.0_f64;
    let mut correct = 0.0_f64;
    let mut seen = 0_usize;
    for (x, y) in data.batches() {
        let logits = model.forward(&x)?;
        let loss = objective.loss(&logits, &y, n)?;
        total_loss += f64::from(loss) * y.len() as f64;
        correct += crate::numeric::accuracy(logits.view(), &y) * y.len() as f64;
        seen += y.len();
    }
    if seen == 0 {
        return Err(SamplerError::InvalidArgument(
            "evaluation data source produced no examples".to_string(),
        ));
    }
    Ok((total_loss / seen as f64, correct / seen as f64))
}

/// Per-snapshot log-probabilities over the whole held-out set plus the
/// snapshot's own summed NLL.
fn eval_snapshot<M, D>(
    proto: &M,
    snapshot: &Snapshot,
    data: &D,
) -> Result<(Array2<f64>, f64), SamplerError>
where
    M: Model + Clone,
    D: DataSource + ?Sized,
{
    let mut model = proto.clone();
    model.load(&snapshot.params)?;

    let mut parts: Vec<Array2<f64>> = Vec::new();
    let mut self_nll = 0.0_f64;
    for (x, y) in data.batches() {
        let logits = model.forward(&x)?;
        let log_p = log_softmax(logits.view());
        for (i, &yi) in y.iter().enumerate() {
            if yi >= log_p.ncols() {
                return Err(SamplerError::InvalidArgument(format!(
                    "label {yi} out of range for {} classes",
                    log_p.ncols()
                )));
            }
            self_nll -= log_p[[i, yi]];
        }
        parts.push(log_p);
    }
    let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
    let log_probs = ndarray::concatenate(Axis(0), &views).map_err(|e| {
        SamplerError::InvalidArgument(format!("snapshot produced inconsistent logits: {e}"))
    })?;
    Ok((log_probs, self_nll))
}

/// Evaluates the full ensemble stored in `store` against `data`.
///
/// # Errors
/// `EmptyEnsemble` when the store holds no snapshots; shape errors when a
/// snapshot does not fit the prototype model.
pub fn evaluate_ensemble<M, D>(
    model: &M,
    store: &SnapshotStore,
    data: &D,
    exec: &ExecContext,
) -> Result<BmaReport, SamplerError>
where
    M: Model + Clone + Send + Sync,
    D: DataSource + Sync,
{
    if store.is_empty() {
        return Err(SamplerError::EmptyEnsemble);
    }
    let (_, labels) = collect_all(data)?;

    let snapshots: Vec<&Snapshot> = store.iter().collect();
    let per_snapshot: Result<Vec<_>, SamplerError> = if exec.parallel_eval && snapshots.len() > 1 {
        snapshots
            .par_iter()
            .map(|s| eval_snapshot(model, *s, data))
            .collect()
    } else {
        snapshots
            .iter()
            .map(|s| eval_snapshot(model, *s, data))
            .collect()
    };
    let per_snapshot = per_snapshot?;

    combine(&per_snapshot, &labels)
}

fn combine(
    per_snapshot: &[(Array2<f64>, f64)],
    labels: &Array1<usize>,
) -> Result<BmaReport, SamplerError> {
    let s = per_snapshot.len();
    let n = labels.len();
    let classes = per_snapshot[0].0.ncols();
    for (log_p, _) in per_snapshot {
        if log_p.nrows() != n || log_p.ncols() != classes {
            return Err(SamplerError::ShapeMismatch {
                name: "ensemble log-probabilities".to_string(),
                expected: vec![n, classes],
                got: vec![log_p.nrows(), log_p.ncols()],
            });
        }
    }

    let ln_s = (s as f64).ln();
    let mut mixture_nll = 0.0_f64;
    let mut correct = 0_usize;
    let mut true_logps = vec![0.0_f64; s];
    let mut mean_probs = Array1::<f64>::zeros(classes);

    for (i, &yi) in labels.iter().enumerate() {
        // log of the snapshot-averaged probability of the true class,
        // via log-sum-exp across snapshots.
        for (k, (log_p, _)) in per_snapshot.iter().enumerate() {
            true_logps[k] = log_p[[i, yi]];
        }
        mixture_nll -= log_sum_exp(&true_logps) - ln_s;

        mean_probs.fill(0.0);
        for (log_p, _) in per_snapshot {
            for c in 0..classes {
                mean_probs[c] += log_p[[i, c]].exp();
            }
        }
        if argmax(mean_probs.view()) == yi {
            correct += 1;
        }
    }

    let ce_nll =
        per_snapshot.iter().map(|(_, nll)| nll / n as f64).sum::<f64>() / s as f64;

    Ok(BmaReport {
        accuracy: correct as f64 / n as f64,
        nll: mixture_nll / n as f64,
        ce_nll,
        snapshots: s,
    })
}
