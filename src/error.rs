//! # Error Taxonomy
//!
//! One central error enum for the sampler core, plus a persistence-local error
//! type defined next to the snapshot file format (see `snapshot::persist`).
//!
//! Propagation policy: configuration and shape errors abort the run;
//! numerical anomalies are fatal by default but may be downgraded to
//! skip-and-log via `DivergencePolicy`; an empty ensemble only fails the
//! evaluation call that observed it.

use crate::snapshot::persist::PersistError;

/// Errors surfaced by the sampler core.
#[derive(thiserror::Error, Debug)]
pub enum SamplerError {
    /// Invalid schedule or run configuration, detected at construction.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A programming-level contract violation (negative learning rate,
    /// momentum outside [0, 1), empty batch, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Two tensors that must be paired 1:1 disagree on shape.
    #[error("shape mismatch for '{name}': expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// A non-finite loss or gradient value was observed during a step.
    #[error("numerical divergence: {0}")]
    NumericalDivergence(String),

    /// Ensemble evaluation was requested before any snapshot exists.
    #[error("ensemble evaluation requested but the snapshot store is empty")]
    EmptyEnsemble,

    /// Snapshot persistence failed (I/O or encoding).
    #[error("snapshot persistence error: {0}")]
    Persistence(#[from] PersistError),
}
