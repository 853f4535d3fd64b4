//! # Loss Collaborator
//!
//! Differentiable objectives live behind the `Objective` trait: the runner
//! treats gradients as an opaque output of the loss computation. Objectives
//! receive the total training-set size so a sum-reduced minibatch loss can be
//! scaled up to the full-dataset potential that stochastic-gradient MCMC
//! expects.

use ndarray::{Array1, Array2, Axis};

use crate::error::SamplerError;
use crate::model::{LinearSoftmax, Model};
use crate::numeric::log_softmax;
use crate::params::{Elem, ParameterVector};

/// Reduction applied over the minibatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    /// Mean over batch examples. Scale-free; the usual choice for metrics.
    #[default]
    Mean,
    /// Sum over batch examples, rescaled by `effective_n / batch` so the
    /// minibatch value is an unbiased estimate of the full-dataset loss.
    /// This is the reduction under which the Langevin noise scale is exact.
    ScaledSum,
}

/// One loss-and-gradient evaluation.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub loss: Elem,
    pub logits: Array2<Elem>,
    pub grads: ParameterVector,
}

/// A differentiable objective over a concrete model type.
///
/// Backpropagation is the collaborator's responsibility; the sampler core
/// never differentiates anything itself.
pub trait Objective<M: Model> {
    /// Loss of the given logits against the labels.
    fn loss(
        &self,
        logits: &Array2<Elem>,
        labels: &Array1<usize>,
        effective_n: usize,
    ) -> Result<Elem, SamplerError>;

    /// Loss, logits, and parameter gradients at the model's current weights.
    fn loss_and_grad(
        &self,
        model: &M,
        input: &Array2<Elem>,
        labels: &Array1<usize>,
        effective_n: usize,
    ) -> Result<StepOutput, SamplerError>;
}

/// Softmax cross-entropy with analytic gradients for `LinearSoftmax`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropy {
    pub reduction: Reduction,
}

impl CrossEntropy {
    pub fn new(reduction: Reduction) -> Self {
        Self { reduction }
    }

    fn scale(&self, batch: usize, effective_n: usize) -> Result<f64, SamplerError> {
        if batch == 0 {
            return Err(SamplerError::InvalidArgument(
                "empty batch passed to CrossEntropy".to_string(),
            ));
        }
        Ok(match self.reduction {
            Reduction::Mean => 1.0 / batch as f64,
            Reduction::ScaledSum => effective_n as f64 / batch as f64,
        })
    }

    fn check_labels(logits: &Array2<Elem>, labels: &Array1<usize>) -> Result<(), SamplerError> {
        if logits.nrows() != labels.len() {
            return Err(SamplerError::ShapeMismatch {
                name: "labels".to_string(),
                expected: vec![logits.nrows()],
                got: vec![labels.len()],
            });
        }
        let classes = logits.ncols();
        if let Some(&bad) = labels.iter().find(|&&y| y >= classes) {
            return Err(SamplerError::InvalidArgument(format!(
                "label {bad} out of range for {classes} classes"
            )));
        }
        Ok(())
    }
}

impl Objective<LinearSoftmax> for CrossEntropy {
    fn loss(
        &self,
        logits: &Array2<Elem>,
        labels: &Array1<usize>,
        effective_n: usize,
    ) -> Result<Elem, SamplerError> {
        Self::check_labels(logits, labels)?;
        let scale = self.scale(logits.nrows(), effective_n)?;
        let log_p = log_softmax(logits.view());
        let total: f64 = labels
            .iter()
            .enumerate()
            .map(|(i, &y)| -log_p[[i, y]])
            .sum();
        Ok((total * scale) as Elem)
    }

    fn loss_and_grad(
        &self,
        model: &LinearSoftmax,
        input: &Array2<Elem>,
        labels: &Array1<usize>,
        effective_n: usize,
    ) -> Result<StepOutput, SamplerError> {
        let logits = model.forward(input)?;
        Self::check_labels(&logits, labels)?;
        let scale = self.scale(logits.nrows(), effective_n)?;
        let log_p = log_softmax(logits.view());

        let mut loss = 0.0_f64;
        // d(loss)/d(logits) = scale * (softmax - onehot)
        let mut dlogits = log_p.mapv(|lp| lp.exp() * scale);
        for (i, &y) in labels.iter().enumerate() {
            loss -= log_p[[i, y]];
            dlogits[[i, y]] -= scale;
        }
        let dlogits = dlogits.mapv(|g| g as Elem);

        // logits = x · Wᵀ + b  =>  dW = dlogitsᵀ · x,  db = Σ_batch dlogits
        let grad_w = dlogits.t().dot(input);
        let grad_b = dlogits.sum_axis(Axis(0));

        let mut grads = ParameterVector::new();
        grads.insert("weight", grad_w.into_dyn());
        grads.insert("bias", grad_b.into_dyn());
        model.parameters().check_compatible(&grads)?;

        Ok(StepOutput {
            loss: (loss * scale) as Elem,
            logits,
            grads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn uniform_logits_give_log_classes() {
        let ce = CrossEntropy::default();
        let logits = array![[0.0_f32, 0.0], [0.0, 0.0]];
        let labels = array![0_usize, 1];
        let loss = Objective::<LinearSoftmax>::loss(&ce, &logits, &labels, 2).unwrap();
        assert!((loss - 2.0_f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn scaled_sum_rescales_to_effective_n() {
        let ce = CrossEntropy::new(Reduction::ScaledSum);
        let logits = array![[0.0_f32, 0.0]];
        let labels = array![0_usize];
        let loss = Objective::<LinearSoftmax>::loss(&ce, &logits, &labels, 100).unwrap();
        assert!((loss - 100.0 * 2.0_f32.ln()).abs() < 1e-3);
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        let ce = CrossEntropy::default();
        let logits = array![[0.0_f32, 0.0]];
        let labels = array![2_usize];
        assert!(Objective::<LinearSoftmax>::loss(&ce, &logits, &labels, 1).is_err());
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(11);
        let model = LinearSoftmax::randn(3, 2, 0.8, &mut rng).unwrap();
        let ce = CrossEntropy::default();
        let x = array![[0.4_f32, -1.2, 0.7], [1.1, 0.3, -0.5]];
        let y = array![1_usize, 0];

        let out = ce.loss_and_grad(&model, &x, &y, 2).unwrap();

        let eps = 1e-3_f32;
        for (name, grad) in out.grads.iter() {
            for (idx, &g) in grad.indexed_iter() {
                let mut plus = model.clone();
                plus.parameters_mut().get_mut(name).unwrap()[idx.clone()] += eps;
                let lp = ce.loss_and_grad(&plus, &x, &y, 2).unwrap().loss;

                let mut minus = model.clone();
                minus.parameters_mut().get_mut(name).unwrap()[idx.clone()] -= eps;
                let lm = ce.loss_and_grad(&minus, &x, &y, 2).unwrap().loss;

                let numeric = (lp - lm) / (2.0 * eps);
                assert!(
                    (numeric - g).abs() < 1e-2,
                    "grad mismatch at {name}{idx:?}: analytic {g}, numeric {numeric}"
                );
            }
        }
    }

    #[test]
    fn loss_and_grad_agrees_with_loss() {
        let mut rng = StdRng::seed_from_u64(5);
        let model = LinearSoftmax::randn(2, 3, 0.5, &mut rng).unwrap();
        let ce = CrossEntropy::default();
        let x = array![[1.0_f32, -1.0], [0.5, 2.0]];
        let y = array![2_usize, 0];
        let out = ce.loss_and_grad(&model, &x, &y, 2).unwrap();
        let direct = Objective::<LinearSoftmax>::loss(&ce, &out.logits, &y, 2).unwrap();
        assert!((out.loss - direct).abs() < 1e-6);
    }
}
