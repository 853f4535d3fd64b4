//! # Parameter Vectors
//!
//! The full set of trainable weights, stored as named `ndarray` tensors in a
//! `BTreeMap` so iteration order is deterministic (relevant both for
//! reproducible noise injection and for stable snapshot files).

use std::collections::BTreeMap;

use ndarray::ArrayD;

use crate::error::SamplerError;

/// Element type for all weights, gradients, and momentum buffers.
pub type Elem = f32;

/// A named collection of weight tensors.
///
/// The optimizer owns the live vector exclusively during a step; snapshots
/// hold deep copies. Dimensionality is fixed for the life of a run: every
/// vector derived from a model (gradients, momentum buffers, snapshots) must
/// pair 1:1 with the model's parameters by name and shape.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterVector {
    tensors: BTreeMap<String, ArrayD<Elem>>,
}

impl ParameterVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) a named tensor.
    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<Elem>) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<Elem>> {
        self.tensors.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ArrayD<Elem>> {
        self.tensors.get_mut(name)
    }

    /// Number of named tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total number of scalar elements across all tensors.
    pub fn num_elements(&self) -> usize {
        self.tensors.values().map(|t| t.len()).sum()
    }

    /// Iterates tensors in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<Elem>)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut ArrayD<Elem>)> {
        self.tensors.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// A vector of zero tensors with the same names and shapes.
    /// Used to initialize momentum buffers and gradient accumulators.
    pub fn zeros_like(&self) -> Self {
        let tensors = self
            .tensors
            .iter()
            .map(|(k, v)| (k.clone(), ArrayD::zeros(v.raw_dim())))
            .collect();
        Self { tensors }
    }

    /// Checks that `other` pairs 1:1 with `self` by name and shape.
    ///
    /// # Errors
    /// `ShapeMismatch` naming the first offending tensor. A missing or extra
    /// name is reported as a mismatch against an empty shape.
    pub fn check_compatible(&self, other: &Self) -> Result<(), SamplerError> {
        for (name, tensor) in &self.tensors {
            match other.tensors.get(name) {
                Some(o) if o.shape() == tensor.shape() => {}
                Some(o) => {
                    return Err(SamplerError::ShapeMismatch {
                        name: name.clone(),
                        expected: tensor.shape().to_vec(),
                        got: o.shape().to_vec(),
                    })
                }
                None => {
                    return Err(SamplerError::ShapeMismatch {
                        name: name.clone(),
                        expected: tensor.shape().to_vec(),
                        got: vec![],
                    })
                }
            }
        }
        if let Some((name, tensor)) = other
            .tensors
            .iter()
            .find(|(name, _)| !self.tensors.contains_key(*name))
        {
            return Err(SamplerError::ShapeMismatch {
                name: name.clone(),
                expected: vec![],
                got: tensor.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// True when every element of every tensor is finite.
    pub fn all_finite(&self) -> bool {
        self.tensors
            .values()
            .all(|t| t.iter().all(|x| x.is_finite()))
    }
}

impl FromIterator<(String, ArrayD<Elem>)> for ParameterVector {
    fn from_iter<I: IntoIterator<Item = (String, ArrayD<Elem>)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn vec2(shape_a: &[usize], shape_b: &[usize]) -> ParameterVector {
        let mut pv = ParameterVector::new();
        pv.insert("a", ArrayD::zeros(IxDyn(shape_a)));
        pv.insert("b", ArrayD::zeros(IxDyn(shape_b)));
        pv
    }

    #[test]
    fn zeros_like_preserves_names_and_shapes() {
        let pv = vec2(&[2, 3], &[4]);
        let z = pv.zeros_like();
        assert_eq!(z.len(), 2);
        assert_eq!(z.get("a").unwrap().shape(), &[2, 3]);
        assert_eq!(z.get("b").unwrap().shape(), &[4]);
        assert_eq!(z.num_elements(), 10);
    }

    #[test]
    fn compatible_vectors_pass() {
        let a = vec2(&[2, 3], &[4]);
        let b = a.zeros_like();
        assert!(a.check_compatible(&b).is_ok());
    }

    #[test]
    fn shape_mismatch_names_the_tensor() {
        let a = vec2(&[2, 3], &[4]);
        let b = vec2(&[2, 3], &[5]);
        match a.check_compatible(&b) {
            Err(SamplerError::ShapeMismatch { name, expected, got }) => {
                assert_eq!(name, "b");
                assert_eq!(expected, vec![4]);
                assert_eq!(got, vec![5]);
            }
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn extra_tensor_is_a_mismatch() {
        let a = vec2(&[2, 3], &[4]);
        let mut b = a.clone();
        b.insert("c", ArrayD::zeros(IxDyn(&[1])));
        assert!(a.check_compatible(&b).is_err());
    }

    #[test]
    fn finiteness_check() {
        let mut pv = vec2(&[2], &[2]);
        assert!(pv.all_finite());
        pv.get_mut("a").unwrap()[[0]] = f32::NAN;
        assert!(!pv.all_finite());
    }
}
