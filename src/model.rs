//! # Model Collaborator
//!
//! Network architectures are external to the sampler core. The `Model` trait
//! is the seam: forward pass plus parameter get/load/save. `LinearSoftmax` is
//! a small reference implementation used by the tests and benchmarks.

use ndarray::{Array2, ArrayD, Ix1, Ix2};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;

use crate::error::SamplerError;
use crate::params::{Elem, ParameterVector};

/// A classifier with trainable parameters.
///
/// `save()` must deep-copy: the sampler keeps mutating the live parameters
/// after a snapshot is taken, so the copy may never alias them.
pub trait Model {
    /// Maps `(batch, features)` inputs to `(batch, classes)` logits.
    fn forward(&self, input: &Array2<Elem>) -> Result<Array2<Elem>, SamplerError>;

    fn parameters(&self) -> &ParameterVector;

    fn parameters_mut(&mut self) -> &mut ParameterVector;

    /// Replaces the live parameters with a shape-checked copy of `params`.
    fn load(&mut self, params: &ParameterVector) -> Result<(), SamplerError> {
        self.parameters().check_compatible(params)?;
        *self.parameters_mut() = params.clone();
        Ok(())
    }

    /// Deep copy of the current parameters.
    fn save(&self) -> ParameterVector {
        self.parameters().clone()
    }
}

/// Multinomial logistic regression: `logits = x · Wᵀ + b`.
///
/// Parameters are `"weight"` of shape `(classes, features)` and `"bias"` of
/// shape `(classes,)`.
#[derive(Debug, Clone)]
pub struct LinearSoftmax {
    params: ParameterVector,
    in_features: usize,
    classes: usize,
}

impl LinearSoftmax {
    /// Zero-initialized model.
    pub fn new(in_features: usize, classes: usize) -> Result<Self, SamplerError> {
        if in_features == 0 || classes < 2 {
            return Err(SamplerError::InvalidArgument(format!(
                "LinearSoftmax needs in_features > 0 and classes >= 2, got ({in_features}, {classes})"
            )));
        }
        let mut params = ParameterVector::new();
        params.insert("weight", ArrayD::zeros(ndarray::IxDyn(&[classes, in_features])));
        params.insert("bias", ArrayD::zeros(ndarray::IxDyn(&[classes])));
        Ok(Self {
            params,
            in_features,
            classes,
        })
    }

    /// Gaussian-initialized model (`N(0, scale²)` weights, zero bias).
    pub fn randn(
        in_features: usize,
        classes: usize,
        scale: Elem,
        rng: &mut StdRng,
    ) -> Result<Self, SamplerError> {
        let mut model = Self::new(in_features, classes)?;
        let dist = Normal::new(0.0, scale).map_err(|e| {
            SamplerError::InvalidArgument(format!("invalid init scale {scale}: {e}"))
        })?;
        let weight = Array2::<Elem>::random_using((classes, in_features), dist, rng);
        model.params.insert("weight", weight.into_dyn());
        Ok(model)
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn classes(&self) -> usize {
        self.classes
    }
}

impl Model for LinearSoftmax {
    fn forward(&self, input: &Array2<Elem>) -> Result<Array2<Elem>, SamplerError> {
        if input.ncols() != self.in_features {
            return Err(SamplerError::ShapeMismatch {
                name: "input".to_string(),
                expected: vec![input.nrows(), self.in_features],
                got: vec![input.nrows(), input.ncols()],
            });
        }
        // Names are fixed at construction; view conversion cannot fail.
        let weight = self
            .params
            .get("weight")
            .and_then(|w| w.view().into_dimensionality::<Ix2>().ok())
            .ok_or_else(|| SamplerError::InvalidArgument("missing 'weight' tensor".to_string()))?;
        let bias = self
            .params
            .get("bias")
            .and_then(|b| b.view().into_dimensionality::<Ix1>().ok())
            .ok_or_else(|| SamplerError::InvalidArgument("missing 'bias' tensor".to_string()))?;
        Ok(input.dot(&weight.t()) + &bias)
    }

    fn parameters(&self) -> &ParameterVector {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParameterVector {
        &mut self.params
    }
}
