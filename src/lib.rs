//! # csgmcmc
//!
//! Trains Bayesian neural networks with cyclical stochastic-gradient MCMC:
//! temperature-scaled Gaussian noise injected into momentum SGD steps, a
//! cyclical learning-rate / temperature schedule with burn-in, warmup, and
//! sampling phases, an append-only store of posterior weight snapshots, and
//! a Bayesian-model-averaging evaluator that combines the snapshots into one
//! calibrated prediction.
//!
//! Networks, datasets, and metric backends are external collaborators behind
//! the `Model`, `Objective`, `DataSource`, and `MetricsSink` traits; small
//! reference implementations are included for tests and experiments.

pub mod bma;
pub mod context;
pub mod data;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod numeric;
pub mod optim;
pub mod params;
pub mod sampler;
pub mod snapshot;

pub use bma::{evaluate_ensemble, evaluate_model, BmaReport};
pub use context::{ExecContext, RunContext};
pub use data::{DataSource, InMemoryDataset};
pub use error::SamplerError;
pub use loss::{CrossEntropy, Objective, Reduction, StepOutput};
pub use metrics::{LogSink, MemorySink, MetricsSink};
pub use model::{LinearSoftmax, Model};
pub use optim::{CyclicScheduler, Phase, ScheduleConfig, ScheduleShape, Sgld, StepDirective};
pub use params::ParameterVector;
pub use sampler::{
    DivergencePolicy, InferenceMethod, RunSummary, SamplerConfig, SamplerRunner,
};
pub use snapshot::persist::{DirPersistence, PersistError, SnapshotPersistence};
pub use snapshot::{Snapshot, SnapshotStore};
