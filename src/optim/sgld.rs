//! # Stochastic Gradient Langevin Dynamics (SGLD)
//!
//! One optimizer update combining gradient, momentum, weight decay, and
//! temperature-scaled Gaussian noise:
//!
//! ```text
//! m' = mu * m - eta * (g + wd * theta) + N(0, 2 * eta * beta * (1 - mu))
//! theta' = theta + m'
//! ```
//!
//! With `beta = 0` the noise term vanishes and the step degenerates to plain
//! momentum SGD, which is exactly the burn-in behavior of the cyclical
//! schedule.

use ndarray::{ArrayD, Zip};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;

use crate::context::ExecContext;
use crate::error::SamplerError;
use crate::params::{Elem, ParameterVector};

/// Momentum-based Langevin stepper.
///
/// Holds the per-parameter momentum buffers (`OptimizerState`); their shapes
/// are fixed on the first step and must match the parameters for the life of
/// the run.
#[derive(Debug)]
pub struct Sgld {
    momentum: Elem,
    weight_decay: Elem,
    buffers: Option<ParameterVector>,
}

impl Sgld {
    /// # Errors
    /// `InvalidArgument` when `momentum` is outside `[0, 1)` or
    /// `weight_decay` is negative or non-finite.
    pub fn new(momentum: Elem, weight_decay: Elem) -> Result<Self, SamplerError> {
        if !(0.0..1.0).contains(&momentum) {
            return Err(SamplerError::InvalidArgument(format!(
                "momentum must be in [0, 1), got {momentum}"
            )));
        }
        if !weight_decay.is_finite() || weight_decay < 0.0 {
            return Err(SamplerError::InvalidArgument(format!(
                "weight_decay must be finite and non-negative, got {weight_decay}"
            )));
        }
        Ok(Self {
            momentum,
            weight_decay,
            buffers: None,
        })
    }

    /// The momentum buffers, once the first step has initialized them.
    pub fn buffers(&self) -> Option<&ParameterVector> {
        self.buffers.as_ref()
    }

    /// Applies one update in place.
    ///
    /// Noise is drawn independently per parameter element from
    /// `N(0, 2 * lr * noise_scale * (1 - momentum))`; a `noise_scale` of zero
    /// disables injection entirely. Gradients are validated (shape and
    /// finiteness) before any buffer is touched, so a failed step never
    /// corrupts the momentum state.
    ///
    /// # Errors
    /// * `InvalidArgument` for a negative `lr` or `noise_scale`.
    /// * `ShapeMismatch` when gradients do not pair with the parameters.
    /// * `NumericalDivergence` when a gradient element is non-finite.
    pub fn step(
        &mut self,
        params: &mut ParameterVector,
        grads: &ParameterVector,
        lr: Elem,
        noise_scale: Elem,
        exec: &mut ExecContext,
    ) -> Result<(), SamplerError> {
        if !lr.is_finite() || lr < 0.0 {
            return Err(SamplerError::InvalidArgument(format!(
                "learning rate must be finite and non-negative, got {lr}"
            )));
        }
        if !noise_scale.is_finite() || noise_scale < 0.0 {
            return Err(SamplerError::InvalidArgument(format!(
                "noise scale must be finite and non-negative, got {noise_scale}"
            )));
        }
        params.check_compatible(grads)?;
        if !grads.all_finite() {
            return Err(SamplerError::NumericalDivergence(
                "non-finite gradient".to_string(),
            ));
        }

        // Buffer shapes are fixed on the first step.
        let buffers = self.buffers.get_or_insert_with(|| params.zeros_like());
        params.check_compatible(buffers)?;

        let mu = self.momentum;
        let wd = self.weight_decay;
        let noise_std = (2.0 * lr * noise_scale * (1.0 - mu)).sqrt();
        let noise_on = noise_std > 0.0;
        let dist = if noise_on {
            Some(Normal::new(0.0, noise_std).map_err(|e| {
                SamplerError::InvalidArgument(format!("bad noise std {noise_std}: {e}"))
            })?)
        } else {
            None
        };

        // Name order is deterministic, so seeded runs consume the RNG
        // identically across repetitions.
        for ((name, param), (_, buf)) in params.iter_mut().zip(buffers.iter_mut()) {
            let grad = grads.get(name).ok_or_else(|| SamplerError::ShapeMismatch {
                name: name.to_string(),
                expected: param.shape().to_vec(),
                got: vec![],
            })?;
            match dist {
                Some(dist) => {
                    let noise: ArrayD<Elem> =
                        ArrayD::random_using(param.raw_dim(), dist, &mut exec.rng);
                    Zip::from(&mut *param)
                        .and(grad)
                        .and(&mut *buf)
                        .and(&noise)
                        .for_each(|p, &g, m, &n| {
                            *m = mu * *m - lr * (g + wd * *p) + n;
                            *p += *m;
                        });
                }
                None => {
                    Zip::from(&mut *param).and(grad).and(&mut *buf).for_each(
                        |p, &g, m| {
                            *m = mu * *m - lr * (g + wd * *p);
                            *p += *m;
                        },
                    );
                }
            }
        }
        Ok(())
    }
}
