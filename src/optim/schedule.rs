//! # Cyclical Learning-Rate / Temperature Schedule
//!
//! Maps a global step index to `(learning_rate, noise_scale, sample_point)`.
//! Each cycle walks through three phases:
//!
//! 1. **burn-in** - noise off, aggressive descent along the decay curve;
//! 2. **warmup** - noise on, still no sampling;
//! 3. **sampling** - noise on, a snapshot accepted every `sample_interval`
//!    steps.
//!
//! Cycle boundaries reset the decay curve to its maximum. The number of
//! sample points over a full run is exactly
//! `n_cycles * samples_per_cycle`, enforced at construction by deriving the
//! interval from the sampling sub-phase length.

use crate::error::SamplerError;
use crate::params::Elem;

/// Within-cycle decay curve for the learning rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleShape {
    /// `base_lr * (1 + cos(pi * t / T)) / 2` - the standard cyclical SG-MCMC
    /// annealing curve.
    #[default]
    Cosine,
    /// Four equal stairs per cycle, halving the rate at each boundary.
    Stairs,
    /// Constant `base_lr`.
    Flat,
}

impl ScheduleShape {
    /// Decay factor in `(0, 1]` at step `t` of a cycle of length `len`.
    fn factor(self, t: usize, len: usize) -> f64 {
        match self {
            ScheduleShape::Cosine => {
                0.5 * (1.0 + (std::f64::consts::PI * t as f64 / len as f64).cos())
            }
            ScheduleShape::Stairs => 0.5_f64.powi((4 * t / len) as i32),
            ScheduleShape::Flat => 1.0,
        }
    }
}

/// Phase of a step within its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    BurnIn,
    Warmup,
    Sampling,
}

/// What the optimizer should do at one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDirective {
    pub lr: Elem,
    /// Inverse-temperature noise scale; zero means noise off.
    pub noise_scale: Elem,
    pub phase: Phase,
    /// Whether the weights after this step are an accepted posterior sample.
    pub sample_point: bool,
    pub cycle: usize,
    pub step_in_cycle: usize,
}

/// Validated schedule parameters.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub n_cycles: usize,
    pub cycle_length: usize,
    pub burn_in_steps: usize,
    pub warmup_steps: usize,
    pub samples_per_cycle: usize,
    pub base_lr: Elem,
    /// Noise scale while noise is enabled. Zero turns the whole schedule
    /// into deterministic optimization.
    pub temperature: Elem,
    pub shape: ScheduleShape,
}

impl ScheduleConfig {
    /// Derives `cycle_length` from a total step budget.
    ///
    /// # Errors
    /// `Config` when `total_steps` is not evenly divisible by `n_cycles`.
    pub fn for_total_steps(
        total_steps: usize,
        n_cycles: usize,
        burn_in_steps: usize,
        warmup_steps: usize,
        samples_per_cycle: usize,
        base_lr: Elem,
        temperature: Elem,
        shape: ScheduleShape,
    ) -> Result<Self, SamplerError> {
        if n_cycles == 0 || total_steps % n_cycles != 0 {
            return Err(SamplerError::Config(format!(
                "total_steps {total_steps} is not divisible into {n_cycles} cycles"
            )));
        }
        Ok(Self {
            n_cycles,
            cycle_length: total_steps / n_cycles,
            burn_in_steps,
            warmup_steps,
            samples_per_cycle,
            base_lr,
            temperature,
            shape,
        })
    }
}

/// The cyclical scheduler. Advances one directive per training step.
#[derive(Debug, Clone)]
pub struct CyclicScheduler {
    cfg: ScheduleConfig,
    sample_interval: usize,
    next_step: usize,
}

impl CyclicScheduler {
    /// # Errors
    /// `Config` when any duration is inconsistent: zero cycles or cycle
    /// length, `burn_in + warmup >= cycle_length`, a non-positive base
    /// learning rate, a negative temperature, or a sampling sub-phase that
    /// does not divide evenly into `samples_per_cycle` samples.
    pub fn new(cfg: ScheduleConfig) -> Result<Self, SamplerError> {
        if cfg.n_cycles == 0 {
            return Err(SamplerError::Config("n_cycles must be positive".to_string()));
        }
        if cfg.cycle_length == 0 {
            return Err(SamplerError::Config("cycle_length must be positive".to_string()));
        }
        if cfg.burn_in_steps + cfg.warmup_steps >= cfg.cycle_length {
            return Err(SamplerError::Config(format!(
                "burn_in ({}) + warmup ({}) must leave room for sampling in a cycle of {}",
                cfg.burn_in_steps, cfg.warmup_steps, cfg.cycle_length
            )));
        }
        if !cfg.base_lr.is_finite() || cfg.base_lr <= 0.0 {
            return Err(SamplerError::Config(format!(
                "base_lr must be positive, got {}",
                cfg.base_lr
            )));
        }
        if !cfg.temperature.is_finite() || cfg.temperature < 0.0 {
            return Err(SamplerError::Config(format!(
                "temperature must be non-negative, got {}",
                cfg.temperature
            )));
        }
        let sampling_steps = cfg.cycle_length - cfg.burn_in_steps - cfg.warmup_steps;
        if cfg.samples_per_cycle == 0 || sampling_steps % cfg.samples_per_cycle != 0 {
            return Err(SamplerError::Config(format!(
                "{sampling_steps} sampling steps cannot yield exactly {} samples per cycle",
                cfg.samples_per_cycle
            )));
        }
        let sample_interval = sampling_steps / cfg.samples_per_cycle;
        Ok(Self {
            cfg,
            sample_interval,
            next_step: 0,
        })
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.cfg
    }

    /// Steps between accepted samples inside the sampling sub-phase.
    pub fn sample_interval(&self) -> usize {
        self.sample_interval
    }

    /// Total steps the schedule covers.
    pub fn total_steps(&self) -> usize {
        self.cfg.n_cycles * self.cfg.cycle_length
    }

    /// Total sample points the schedule will emit.
    pub fn total_samples(&self) -> usize {
        self.cfg.n_cycles * self.cfg.samples_per_cycle
    }

    /// Directive for an arbitrary global step. Pure; does not advance.
    ///
    /// Returns `None` past the schedule horizon.
    pub fn directive(&self, global_step: usize) -> Option<StepDirective> {
        if global_step >= self.total_steps() {
            return None;
        }
        let cycle = global_step / self.cfg.cycle_length;
        let t = global_step % self.cfg.cycle_length;

        let phase = if t < self.cfg.burn_in_steps {
            Phase::BurnIn
        } else if t < self.cfg.burn_in_steps + self.cfg.warmup_steps {
            Phase::Warmup
        } else {
            Phase::Sampling
        };

        let lr = self.cfg.base_lr * self.cfg.shape.factor(t, self.cfg.cycle_length) as Elem;
        let noise_scale = match phase {
            Phase::BurnIn => 0.0,
            Phase::Warmup | Phase::Sampling => self.cfg.temperature,
        };
        let sample_point = match phase {
            Phase::Sampling => {
                let pos = t - self.cfg.burn_in_steps - self.cfg.warmup_steps;
                (pos + 1) % self.sample_interval == 0
            }
            _ => false,
        };

        Some(StepDirective {
            lr,
            noise_scale,
            phase,
            sample_point,
            cycle,
            step_in_cycle: t,
        })
    }

    /// Directive for the current step, advancing the internal counter.
    pub fn next(&mut self) -> Option<StepDirective> {
        let d = self.directive(self.next_step)?;
        self.next_step += 1;
        Some(d)
    }

    /// Steps consumed so far.
    pub fn steps_taken(&self) -> usize {
        self.next_step
    }
}
