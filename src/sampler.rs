//! # Sampler Runner
//!
//! Drives the training loop: pulls minibatches, obtains loss and gradients
//! from the objective, queries the cyclical scheduler, applies the Langevin
//! step, and pushes snapshots into the store at sample points. Single
//! threaded and synchronous; a run may be aborted between steps and any
//! snapshots written so far remain a usable partial ensemble.

use crate::bma::{evaluate_ensemble, evaluate_model, BmaReport};
use crate::context::RunContext;
use crate::data::DataSource;
use crate::error::SamplerError;
use crate::loss::Objective;
use crate::model::Model;
use crate::numeric::accuracy;
use crate::optim::{CyclicScheduler, ScheduleConfig, Sgld};
use crate::params::Elem;
use crate::snapshot::{Snapshot, SnapshotStore};

/// Which sampler variant a run uses. Resolved once at construction into a
/// concrete noise/sampling strategy; there is no string dispatch at step
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceMethod {
    /// Deterministic momentum SGD: noise permanently off, no snapshots.
    /// Useful for pretraining a chain's starting point.
    Sgd,
    /// Cyclical SGLD: noise and snapshot selection follow the schedule.
    CyclicalSgld,
}

/// What to do when a step produces a non-finite loss or gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DivergencePolicy {
    /// Abort the run. SG-MCMC is order-sensitive, so replaying a perturbed
    /// step would break reproducibility.
    #[default]
    Fatal,
    /// Skip the optimizer update (and any sample point on that step), log
    /// the anomaly, and keep going. The scheduler still advances so phase
    /// alignment is preserved.
    SkipStep,
}

/// Configuration of one sampler run.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub method: InferenceMethod,
    pub epochs: usize,
    pub momentum: Elem,
    pub weight_decay: Elem,
    pub schedule: ScheduleConfig,
    /// Emit train metrics every this many steps.
    pub log_every: usize,
    pub divergence: DivergencePolicy,
    /// Re-evaluate the ensemble right after every accepted sample.
    pub interim_bma: bool,
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub steps: u64,
    pub samples: usize,
    pub skipped_steps: usize,
    /// Held-out single-model metrics after the final epoch.
    pub final_loss: f64,
    pub final_accuracy: f64,
    /// Ensemble metrics over everything in the store, when sampling was
    /// enabled and at least one snapshot exists.
    pub bma: Option<BmaReport>,
}

/// The training-loop orchestrator.
pub struct SamplerRunner<M, O> {
    model: M,
    objective: O,
    config: SamplerConfig,
    scheduler: CyclicScheduler,
    sgld: Sgld,
    // Strategy resolved from the inference method.
    inject_noise: bool,
    collect_samples: bool,
}

impl<M, O> SamplerRunner<M, O>
where
    M: Model + Clone + Send + Sync,
    O: Objective<M>,
{
    /// Validates the whole configuration up front.
    pub fn new(model: M, objective: O, config: SamplerConfig) -> Result<Self, SamplerError> {
        if config.epochs == 0 {
            return Err(SamplerError::Config("epochs must be positive".to_string()));
        }
        if config.log_every == 0 {
            return Err(SamplerError::Config("log_every must be positive".to_string()));
        }
        let scheduler = CyclicScheduler::new(config.schedule.clone())?;
        let sgld = Sgld::new(config.momentum, config.weight_decay)?;
        let (inject_noise, collect_samples) = match config.method {
            InferenceMethod::Sgd => (false, false),
            InferenceMethod::CyclicalSgld => (true, true),
        };
        Ok(Self {
            model,
            objective,
            config,
            scheduler,
            sgld,
            inject_noise,
            collect_samples,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Runs every epoch over `train`, evaluating on `heldout` at each epoch
    /// boundary, and appends accepted samples to `store`.
    ///
    /// # Errors
    /// `Config` when the schedule does not cover exactly
    /// `epochs * batches_per_epoch` steps; `NumericalDivergence` on a
    /// non-finite loss or gradient under the `Fatal` policy; anything the
    /// collaborators raise.
    pub fn run<D>(
        &mut self,
        train: &D,
        heldout: &D,
        store: &mut SnapshotStore,
        ctx: &mut RunContext,
    ) -> Result<RunSummary, SamplerError>
    where
        D: DataSource + Sync,
    {
        let batches_per_epoch = train.batches().count();
        let total_steps = self.config.epochs * batches_per_epoch;
        if total_steps != self.scheduler.total_steps() {
            return Err(SamplerError::Config(format!(
                "schedule covers {} steps but the run has {} ({} epochs x {} batches)",
                self.scheduler.total_steps(),
                total_steps,
                self.config.epochs,
                batches_per_epoch
            )));
        }

        let n = train.num_examples();
        let mut global_step: u64 = 0;
        let mut samples = store.count();
        let mut skipped = 0_usize;

        for epoch in 0..self.config.epochs {
            for (step_in_epoch, (x, y)) in train.batches().enumerate() {
                let directive = self.scheduler.next().ok_or_else(|| {
                    SamplerError::Config("schedule exhausted before the run finished".to_string())
                })?;

                let out = self.objective.loss_and_grad(&self.model, &x, &y, n)?;
                if !out.loss.is_finite() || !out.grads.all_finite() {
                    match self.config.divergence {
                        DivergencePolicy::Fatal => {
                            return Err(SamplerError::NumericalDivergence(format!(
                                "non-finite loss or gradient at step {global_step}"
                            )));
                        }
                        DivergencePolicy::SkipStep => {
                            log::warn!(
                                "skipping step {global_step}: non-finite loss or gradient"
                            );
                            ctx.metrics.record("train/diverged", 1.0, global_step);
                            skipped += 1;
                            global_step += 1;
                            continue;
                        }
                    }
                }

                let noise_scale = if self.inject_noise {
                    directive.noise_scale
                } else {
                    0.0
                };
                self.sgld.step(
                    self.model.parameters_mut(),
                    &out.grads,
                    directive.lr,
                    noise_scale,
                    &mut ctx.exec,
                )?;

                if self.collect_samples && directive.sample_point {
                    let snapshot = Snapshot::new(
                        samples,
                        epoch,
                        step_in_epoch,
                        directive.cycle,
                        self.model.save(),
                    );
                    log::info!(
                        "sample {} accepted at epoch {epoch}, step {step_in_epoch} (cycle {})",
                        snapshot.key,
                        directive.cycle
                    );
                    store.append(snapshot)?;
                    samples += 1;

                    if self.config.interim_bma {
                        let report = evaluate_ensemble(&self.model, store, heldout, &ctx.exec)?;
                        ctx.metrics.record("bma/acc", report.accuracy, global_step);
                        ctx.metrics.record("bma/nll", report.nll, global_step);
                        ctx.metrics.record("bma/ce_nll", report.ce_nll, global_step);
                    }
                }

                if global_step % self.config.log_every as u64 == 0 {
                    ctx.metrics
                        .record("train/loss", f64::from(out.loss), global_step);
                    ctx.metrics
                        .record("train/acc", accuracy(out.logits.view(), &y), global_step);
                }
                global_step += 1;
            }

            let (loss, acc) = evaluate_model(&self.model, &self.objective, heldout)?;
            ctx.metrics.record("test/loss", loss, global_step);
            ctx.metrics.record("test/acc", acc, global_step);
            log::info!("epoch {epoch}: held-out loss {loss:.4}, accuracy {acc:.4}");
        }

        let (final_loss, final_accuracy) =
            evaluate_model(&self.model, &self.objective, heldout)?;
        let bma = if self.collect_samples && !store.is_empty() {
            Some(evaluate_ensemble(&self.model, store, heldout, &ctx.exec)?)
        } else {
            None
        };

        Ok(RunSummary {
            steps: global_step,
            samples: store.count(),
            skipped_steps: skipped,
            final_loss,
            final_accuracy,
            bma,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecContext;
    use crate::data::InMemoryDataset;
    use crate::loss::{CrossEntropy, Objective, StepOutput};
    use crate::metrics::MemorySink;
    use crate::model::LinearSoftmax;
    use crate::optim::ScheduleShape;
    use ndarray::{Array1, Array2};
    use std::cell::Cell;

    fn blob_dataset(per_class: usize, offset: f32) -> InMemoryDataset {
        // Two linearly separable clusters on the x-axis.
        let n = per_class * 2;
        let mut inputs = Array2::<f32>::zeros((n, 2));
        let mut labels = Array1::<usize>::zeros(n);
        for i in 0..per_class {
            inputs[[i, 0]] = offset + 0.1 * i as f32;
            inputs[[i, 1]] = 1.0;
            labels[i] = 0;
            inputs[[per_class + i, 0]] = -offset - 0.1 * i as f32;
            inputs[[per_class + i, 1]] = 1.0;
            labels[per_class + i] = 1;
        }
        InMemoryDataset::new(inputs, labels, 2).unwrap()
    }

    fn schedule() -> ScheduleConfig {
        ScheduleConfig {
            n_cycles: 2,
            cycle_length: 10,
            burn_in_steps: 4,
            warmup_steps: 2,
            samples_per_cycle: 2,
            base_lr: 0.05,
            temperature: 1e-5,
            shape: ScheduleShape::Cosine,
        }
    }

    fn config(method: InferenceMethod) -> SamplerConfig {
        SamplerConfig {
            method,
            epochs: 5,
            momentum: 0.9,
            weight_decay: 0.0,
            schedule: schedule(),
            log_every: 2,
            divergence: DivergencePolicy::Fatal,
            interim_bma: false,
        }
    }

    fn context() -> RunContext {
        RunContext::new(Box::new(MemorySink::new()), ExecContext::seeded(7))
    }

    #[test]
    fn csgld_run_collects_the_scheduled_samples() {
        // 4 examples per class, batch 2 => 4 batches/epoch, 5 epochs = 20
        // steps = 2 cycles of 10; 2 samples per cycle.
        let data = blob_dataset(4, 2.0);
        let model = LinearSoftmax::new(2, 2).unwrap();
        let mut runner =
            SamplerRunner::new(model, CrossEntropy::default(), config(InferenceMethod::CyclicalSgld))
                .unwrap();
        let mut store = SnapshotStore::in_memory();
        let mut ctx = context();

        let summary = runner.run(&data, &data, &mut store, &mut ctx).unwrap();
        assert_eq!(summary.steps, 20);
        assert_eq!(summary.samples, 4);
        assert_eq!(store.count(), 4);
        assert_eq!(summary.skipped_steps, 0);
        let report = summary.bma.expect("sampling run reports ensemble metrics");
        assert_eq!(report.snapshots, 4);
        // Separable data: both the chain and the ensemble should classify it.
        assert!(summary.final_accuracy > 0.9);
        assert!(report.accuracy > 0.9);
    }

    #[test]
    fn sgd_mode_never_samples() {
        let data = blob_dataset(4, 2.0);
        let model = LinearSoftmax::new(2, 2).unwrap();
        let mut runner =
            SamplerRunner::new(model, CrossEntropy::default(), config(InferenceMethod::Sgd))
                .unwrap();
        let mut store = SnapshotStore::in_memory();
        let mut ctx = context();

        let summary = runner.run(&data, &data, &mut store, &mut ctx).unwrap();
        assert_eq!(summary.samples, 0);
        assert!(store.is_empty());
        assert!(summary.bma.is_none());
    }

    #[test]
    fn run_rejects_a_schedule_that_does_not_cover_the_data() {
        let data = blob_dataset(4, 2.0);
        let model = LinearSoftmax::new(2, 2).unwrap();
        let mut cfg = config(InferenceMethod::CyclicalSgld);
        cfg.epochs = 4; // 16 steps, schedule covers 20
        let mut runner = SamplerRunner::new(model, CrossEntropy::default(), cfg).unwrap();
        let mut store = SnapshotStore::in_memory();
        let mut ctx = context();
        assert!(matches!(
            runner.run(&data, &data, &mut store, &mut ctx),
            Err(SamplerError::Config(_))
        ));
    }

    /// Wraps `CrossEntropy` but reports a NaN loss on one chosen call.
    struct FaultyObjective {
        inner: CrossEntropy,
        fail_at: usize,
        calls: Cell<usize>,
    }

    impl Objective<LinearSoftmax> for FaultyObjective {
        fn loss(
            &self,
            logits: &Array2<f32>,
            labels: &Array1<usize>,
            effective_n: usize,
        ) -> Result<f32, SamplerError> {
            Objective::<LinearSoftmax>::loss(&self.inner, logits, labels, effective_n)
        }

        fn loss_and_grad(
            &self,
            model: &LinearSoftmax,
            input: &Array2<f32>,
            labels: &Array1<usize>,
            effective_n: usize,
        ) -> Result<StepOutput, SamplerError> {
            let mut out = self.inner.loss_and_grad(model, input, labels, effective_n)?;
            let call = self.calls.get();
            self.calls.set(call + 1);
            if call == self.fail_at {
                out.loss = f32::NAN;
            }
            Ok(out)
        }
    }

    #[test]
    fn divergence_is_fatal_by_default() {
        let data = blob_dataset(4, 2.0);
        let model = LinearSoftmax::new(2, 2).unwrap();
        let objective = FaultyObjective {
            inner: CrossEntropy::default(),
            fail_at: 3,
            calls: Cell::new(0),
        };
        let mut runner =
            SamplerRunner::new(model, objective, config(InferenceMethod::CyclicalSgld)).unwrap();
        let mut store = SnapshotStore::in_memory();
        let mut ctx = context();
        assert!(matches!(
            runner.run(&data, &data, &mut store, &mut ctx),
            Err(SamplerError::NumericalDivergence(_))
        ));
    }

    #[test]
    fn skip_policy_logs_and_continues() {
        let data = blob_dataset(4, 2.0);
        let model = LinearSoftmax::new(2, 2).unwrap();
        let objective = FaultyObjective {
            inner: CrossEntropy::default(),
            fail_at: 3,
            calls: Cell::new(0),
        };
        let mut cfg = config(InferenceMethod::CyclicalSgld);
        cfg.divergence = DivergencePolicy::SkipStep;
        let mut runner = SamplerRunner::new(model, objective, cfg).unwrap();
        let mut store = SnapshotStore::in_memory();
        let mut ctx = RunContext::new(Box::new(MemorySink::new()), ExecContext::seeded(7));

        let summary = runner.run(&data, &data, &mut store, &mut ctx).unwrap();
        assert_eq!(summary.skipped_steps, 1);
        assert_eq!(summary.steps, 20);
        assert_eq!(summary.samples, 4);
    }

    #[test]
    fn invalid_runner_configs_are_rejected() {
        let model = LinearSoftmax::new(2, 2).unwrap();
        let mut cfg = config(InferenceMethod::CyclicalSgld);
        cfg.epochs = 0;
        assert!(SamplerRunner::new(model.clone(), CrossEntropy::default(), cfg).is_err());

        let mut cfg = config(InferenceMethod::CyclicalSgld);
        cfg.log_every = 0;
        assert!(SamplerRunner::new(model.clone(), CrossEntropy::default(), cfg).is_err());

        let mut cfg = config(InferenceMethod::CyclicalSgld);
        cfg.momentum = 1.5;
        assert!(SamplerRunner::new(model, CrossEntropy::default(), cfg).is_err());
    }
}
