//! # Run and Execution Contexts
//!
//! Explicit context values replace the process-wide singletons of typical
//! experiment-tracking setups: `ExecContext` carries the RNG and evaluation
//! parallelism, `RunContext` bundles it with the metrics sink. Both are
//! threaded through the optimizer step, the runner, and the evaluator as
//! plain arguments.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::metrics::{LogSink, MetricsSink};

/// Where and how numerical work runs: the noise RNG and whether the
/// per-snapshot ensemble passes may use the rayon pool.
#[derive(Debug)]
pub struct ExecContext {
    pub rng: StdRng,
    pub parallel_eval: bool,
}

impl ExecContext {
    /// Deterministic context. Two runs with the same seed, config, and data
    /// produce identical trajectories.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            parallel_eval: true,
        }
    }

    /// OS-entropy context for non-reproducible runs.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            parallel_eval: true,
        }
    }

    pub fn serial_eval(mut self) -> Self {
        self.parallel_eval = false;
        self
    }
}

/// Everything a sampler run needs from the outside world besides data and
/// model: the metrics sink and the execution context.
pub struct RunContext {
    pub metrics: Box<dyn MetricsSink>,
    pub exec: ExecContext,
}

impl RunContext {
    pub fn new(metrics: Box<dyn MetricsSink>, exec: ExecContext) -> Self {
        Self { metrics, exec }
    }

    /// Log-backed sink with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self::new(Box::new(LogSink), ExecContext::seeded(seed))
    }
}
