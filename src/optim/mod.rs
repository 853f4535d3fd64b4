//! # Sampling Optimizers (`optim`)
//!
//! The stochastic-gradient Langevin update (`sgld`) and the cyclical
//! learning-rate / temperature schedule (`schedule`) that drives it.

pub mod schedule;
pub mod sgld;

pub use schedule::{CyclicScheduler, Phase, ScheduleConfig, ScheduleShape, StepDirective};
pub use sgld::Sgld;
