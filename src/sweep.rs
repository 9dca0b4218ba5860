//! Single runs and multi-epsilon sweeps: resolve a request, drive the
//! evaluator, stamp the result and optionally persist it.
use crate::attack::{Attack, AttackConfig, AttackKind, AttackOverrides};
use crate::config::{Limits, Settings};
use crate::context::{Device, ExecutionContext};
use crate::error::{ConfigError, RunError, StoreError};
use crate::evaluate::{evaluate, EvaluationResult};
use crate::models::{ModelId, ModelProvider};
use crate::store::{NewRunRecord, RecordId, ResultStore};
use crate::NNVFloat;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

/// One (model, attack, epsilon) evaluation as requested by a caller.
#[derive(Clone, Debug, PartialEq)]
pub struct RunRequest {
    pub model: ModelId,
    pub attack: AttackKind,
    pub epsilon: NNVFloat,
    /// Falls back to the configured default when unset.
    pub num_samples: Option<usize>,
    pub batch_size: Option<usize>,
    pub overrides: AttackOverrides,
    pub save_result: bool,
    pub notes: Option<String>,
}

impl RunRequest {
    pub fn new(model: ModelId, attack: AttackKind, epsilon: NNVFloat) -> Self {
        Self {
            model,
            attack,
            epsilon,
            num_samples: None,
            batch_size: None,
            overrides: AttackOverrides::default(),
            save_result: true,
            notes: None,
        }
    }

    /// Resolves model and attack names once, up front.
    ///
    /// # Errors
    /// Unknown model or attack name.
    pub fn parse(model: &str, attack: &str, epsilon: NNVFloat) -> Result<Self, ConfigError> {
        Ok(Self::new(model.parse()?, attack.parse()?, epsilon))
    }

    pub fn with_epsilon(&self, epsilon: NNVFloat) -> Self {
        Self {
            epsilon,
            ..self.clone()
        }
    }
}

/// A completed evaluation with its run metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunReport {
    pub model: ModelId,
    pub attack: AttackConfig,
    pub evaluation: EvaluationResult,
    pub device: Device,
    pub timestamp: DateTime<Utc>,
}

impl RunReport {
    pub fn epsilon(&self) -> NNVFloat {
        self.attack.epsilon()
    }

    pub fn clean_accuracy(&self) -> NNVFloat {
        self.evaluation.clean_accuracy()
    }

    pub fn robust_accuracy(&self) -> NNVFloat {
        self.evaluation.robust_accuracy()
    }

    pub fn attack_success_rate(&self) -> NNVFloat {
        self.evaluation.attack_success_rate()
    }

    pub fn to_new_record(&self, notes: Option<String>) -> NewRunRecord {
        NewRunRecord {
            model_name: self.model.as_str().to_string(),
            attack: self.attack.kind().as_str().to_string(),
            epsilon: self.epsilon(),
            clean_accuracy: self.clean_accuracy(),
            robust_accuracy: self.robust_accuracy(),
            attack_success_rate: self.attack_success_rate(),
            total_samples: self.evaluation.total_samples,
            device: Some(self.device.to_string()),
            alpha: self.attack.alpha(),
            iters: self.attack.iters(),
            notes,
        }
    }
}

/// Outcome of handing a report to the store, independent of the evaluation.
#[derive(Debug)]
pub enum Persistence {
    /// Saving was not requested or no store is attached.
    Skipped,
    Saved(RecordId),
    Failed(StoreError),
}

impl Persistence {
    pub const fn record_id(&self) -> Option<RecordId> {
        match self {
            Self::Saved(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub persistence: Persistence,
}

/// Runs are serialized: one oracle is loaded and driven at a time, and the
/// attached store has a single writer.
pub struct SweepOrchestrator<'a, P: ModelProvider> {
    ctx: ExecutionContext,
    provider: P,
    settings: Settings,
    store: Option<&'a mut dyn ResultStore>,
}

impl<'a, P: ModelProvider> SweepOrchestrator<'a, P> {
    pub fn new(ctx: ExecutionContext, provider: P, settings: Settings) -> Self {
        Self {
            ctx,
            provider,
            settings,
            store: None,
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: &'a mut dyn ResultStore) -> Self {
        self.store = Some(store);
        self
    }

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Checks `request` against the configured limits and resolves the
    /// attack, filling PGD defaults.
    ///
    /// # Errors
    /// The first parameter that is out of range.
    pub fn resolve(&self, request: &RunRequest) -> Result<AttackConfig, ConfigError> {
        let limits: &Limits = &self.settings.limits;
        if !(request.epsilon.is_finite()
            && request.epsilon > 0.
            && request.epsilon <= limits.max_epsilon)
        {
            return Err(ConfigError::Epsilon {
                value: request.epsilon,
                max: limits.max_epsilon,
            });
        }
        let batch_size = self.batch_size(request);
        if batch_size == 0 || batch_size > limits.max_batch_size {
            return Err(ConfigError::BatchSize {
                value: batch_size,
                max: limits.max_batch_size,
            });
        }
        if let Some(n) = self.num_samples(request) {
            if n == 0 || n > limits.max_num_samples {
                return Err(ConfigError::NumSamples {
                    value: n,
                    max: limits.max_num_samples,
                });
            }
        }
        let attack = AttackConfig::resolve(request.attack, request.epsilon, request.overrides)?;
        if let Some(iters) = attack.iters() {
            if iters > limits.max_iters {
                return Err(ConfigError::Iters {
                    value: iters,
                    max: limits.max_iters,
                });
            }
        }
        Ok(attack)
    }

    fn batch_size(&self, request: &RunRequest) -> usize {
        request.batch_size.unwrap_or(self.settings.default_batch_size)
    }

    fn num_samples(&self, request: &RunRequest) -> Option<usize> {
        request.num_samples.or(self.settings.default_num_samples)
    }

    fn evaluate_request(&self, request: &RunRequest) -> Result<RunReport, RunError> {
        let attack = self.resolve(request)?;
        let ctx = self.ctx.with_target(request.model.as_str());
        info!(target: ctx.target(), "running {} on {}", attack, request.model);
        let oracle = self.provider.load_model(&ctx, request.model)?;
        let dataset = self.provider.load_dataset(&ctx, request.model)?;
        let batches = dataset.batches(
            self.batch_size(request),
            self.num_samples(request),
            self.settings.subsample_seed,
        );
        let evaluation = evaluate(&ctx, oracle.as_ref(), batches, &attack)?;
        Ok(RunReport {
            model: request.model,
            attack,
            evaluation,
            device: ctx.device().clone(),
            timestamp: Utc::now(),
        })
    }

    fn persist(&mut self, report: &RunReport, request: &RunRequest) -> Persistence {
        if !request.save_result {
            return Persistence::Skipped;
        }
        let store = match self.store.as_deref_mut() {
            Some(store) => store,
            None => return Persistence::Skipped,
        };
        match store.save(report.to_new_record(request.notes.clone())) {
            Ok(id) => {
                info!(target: self.ctx.target(), "result saved with id {}", id);
                Persistence::Saved(id)
            }
            Err(e) => {
                warn!(target: self.ctx.target(), "failed to save result: {}", e);
                Persistence::Failed(e)
            }
        }
    }

    /// One full evaluation pass. A store failure is reported in
    /// [`RunOutcome::persistence`] and never discards the report.
    ///
    /// # Errors
    /// Invalid request, unavailable model or dataset, or an oracle failure.
    pub fn run_once(&mut self, request: &RunRequest) -> Result<RunOutcome, RunError> {
        let report = self.evaluate_request(request)?;
        let persistence = self.persist(&report, request);
        Ok(RunOutcome {
            report,
            persistence,
        })
    }

    /// `run_once` per epsilon, in the given order. A failing epsilon does not
    /// stop the remaining ones; its error takes its slot in the output.
    pub fn run_sweep(
        &mut self,
        request: &RunRequest,
        epsilons: &[NNVFloat],
    ) -> Vec<Result<RunOutcome, RunError>> {
        epsilons
            .iter()
            .map(|&epsilon| {
                let outcome = self.run_once(&request.with_epsilon(epsilon));
                if let Err(e) = &outcome {
                    warn!(target: self.ctx.target(), "epsilon {} failed: {}", epsilon, e);
                }
                outcome
            })
            .collect()
    }

    /// Sweep over the model's default epsilons.
    pub fn run_default_sweep(&mut self, request: &RunRequest) -> Vec<Result<RunOutcome, RunError>> {
        let epsilons = request.model.spec().default_epsilons;
        self.run_sweep(request, &epsilons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{InMemoryDataset, Sample};
    use crate::error::{OracleError, ResourceError};
    use crate::oracle::ModelOracle;
    use crate::store::{InMemoryStore, RunRecord};
    use crate::tensorshape::TensorShape;
    use crate::test_util::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Axis;
    use std::path::PathBuf;

    struct StubProvider {
        failing: bool,
    }

    impl ModelProvider for StubProvider {
        fn load_model(
            &self,
            _ctx: &ExecutionContext,
            model: ModelId,
        ) -> Result<Box<dyn ModelOracle>, ResourceError> {
            match model {
                ModelId::Cifar10Resnet20 => Err(ResourceError::ModelNotFound {
                    path: PathBuf::from("cifar10_resnet20.json"),
                }),
                ModelId::MnistSimpleCnn if self.failing => {
                    Ok(Box::new(FailingOracle::new("cuda error")))
                }
                ModelId::MnistSimpleCnn => Ok(Box::new(two_class_linear_oracle(4))),
            }
        }

        fn load_dataset(
            &self,
            _ctx: &ExecutionContext,
            _model: ModelId,
        ) -> Result<InMemoryDataset, ResourceError> {
            let batch = synthetic_batch(12, 4, 9);
            let samples = batch
                .inputs
                .axis_iter(Axis(0))
                .zip(batch.labels.iter())
                .map(|(input, &label)| Sample {
                    input: input.to_owned(),
                    label,
                })
                .collect();
            Ok(InMemoryDataset::new(TensorShape::from(vec![4]), samples))
        }
    }

    struct BrokenStore;

    impl ResultStore for BrokenStore {
        fn save(&mut self, _record: NewRunRecord) -> Result<RecordId, StoreError> {
            Err(StoreError::InvalidRecord("disk full".to_string()))
        }

        fn recent(&self, _limit: usize) -> Result<Vec<RunRecord>, StoreError> {
            Ok(vec![])
        }

        fn by_model(&self, _model_name: &str) -> Result<Vec<RunRecord>, StoreError> {
            Ok(vec![])
        }

        fn by_attack(
            &self,
            _model_name: &str,
            _attack: &str,
            _epsilon: Option<NNVFloat>,
        ) -> Result<Vec<RunRecord>, StoreError> {
            Ok(vec![])
        }
    }

    fn orchestrator<'a>(failing: bool) -> SweepOrchestrator<'a, StubProvider> {
        let settings = Settings {
            default_batch_size: 5,
            ..Settings::default()
        };
        SweepOrchestrator::new(
            ExecutionContext::default(),
            StubProvider { failing },
            settings,
        )
    }

    #[test]
    fn sweep_keeps_epsilon_order() {
        let mut store = InMemoryStore::new();
        let mut sweep = orchestrator(false).with_store(&mut store);
        let request = RunRequest::parse("mnist_simplecnn", "pgd", 0.01).unwrap();
        let outcomes = sweep.run_sweep(&request, &[0.01, 0.05, 0.1]);
        assert_eq!(outcomes.len(), 3);
        for (outcome, epsilon) in outcomes.iter().zip([0.01, 0.05, 0.1]) {
            let outcome = outcome.as_ref().unwrap();
            assert_abs_diff_eq!(outcome.report.epsilon(), epsilon);
            assert_eq!(outcome.report.attack.iters(), Some(40));
            assert_abs_diff_eq!(outcome.report.attack.alpha().unwrap(), epsilon / 10.);
            assert_eq!(outcome.report.evaluation.total_samples, 12);
            assert!(outcome.persistence.record_id().is_some());
        }
        drop(sweep);
        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].record.attack, "pgd");
        assert_eq!(recent[0].record.iters, Some(40));
    }

    #[test]
    fn report_records_the_context_device() {
        let mut store = InMemoryStore::new();
        let ctx = ExecutionContext::new(Device::Named("cuda:0".to_string()), "sweep");
        let mut sweep =
            SweepOrchestrator::new(ctx, StubProvider { failing: false }, Settings::default())
                .with_store(&mut store);
        let request = RunRequest::parse("mnist_simplecnn", "fgsm", 0.1).unwrap();
        let outcome = sweep.run_once(&request).unwrap();
        assert_eq!(outcome.report.device, Device::Named("cuda:0".to_string()));
        drop(sweep);
        let saved = store.recent(1).unwrap();
        assert_eq!(saved[0].record.device.as_deref(), Some("cuda:0"));
    }

    #[test]
    fn store_failure_keeps_the_report() {
        let mut store = BrokenStore;
        let mut sweep = orchestrator(false).with_store(&mut store);
        let request = RunRequest::parse("mnist_simplecnn", "fgsm", 0.1).unwrap();
        let outcome = sweep.run_once(&request).unwrap();
        assert!(matches!(outcome.persistence, Persistence::Failed(_)));
        assert_eq!(outcome.report.evaluation.total_samples, 12);
        assert_abs_diff_eq!(outcome.report.clean_accuracy(), 100.);
    }

    #[test]
    fn saving_can_be_skipped() {
        let mut store = InMemoryStore::new();
        let mut sweep = orchestrator(false).with_store(&mut store);
        let mut request = RunRequest::parse("mnist_simplecnn", "fgsm", 0.1).unwrap();
        request.save_result = false;
        let outcome = sweep.run_once(&request).unwrap();
        assert!(matches!(outcome.persistence, Persistence::Skipped));
        drop(sweep);
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_names_are_rejected_before_running() {
        assert!(matches!(
            RunRequest::parse("vgg16", "fgsm", 0.1),
            Err(ConfigError::UnknownModel { .. })
        ));
        assert!(matches!(
            RunRequest::parse("mnist_simplecnn", "cw", 0.1),
            Err(ConfigError::UnknownAttack { .. })
        ));
    }

    #[test]
    fn limits_are_enforced() {
        let sweep = orchestrator(false);
        let base = RunRequest::new(ModelId::MnistSimpleCnn, AttackKind::Pgd, 0.1);
        assert!(sweep.resolve(&base).is_ok());
        assert!(matches!(
            sweep.resolve(&base.with_epsilon(1.5)),
            Err(ConfigError::Epsilon { .. })
        ));
        assert!(matches!(
            sweep.resolve(&base.with_epsilon(0.)),
            Err(ConfigError::Epsilon { .. })
        ));
        let mut big_batch = base.clone();
        big_batch.batch_size = Some(513);
        assert!(matches!(
            sweep.resolve(&big_batch),
            Err(ConfigError::BatchSize { value: 513, max: 512 })
        ));
        let mut many = base.clone();
        many.num_samples = Some(10_001);
        assert!(matches!(sweep.resolve(&many), Err(ConfigError::NumSamples { .. })));
        let mut long = base.clone();
        long.overrides.iters = Some(101);
        assert!(matches!(
            sweep.resolve(&long),
            Err(ConfigError::Iters { value: 101, max: 100 })
        ));
        let mut no_step = base;
        no_step.overrides.alpha = Some(0.);
        assert!(matches!(sweep.resolve(&no_step), Err(ConfigError::Alpha { .. })));
    }

    #[test]
    fn failures_take_their_slot_without_stopping_the_sweep() {
        let mut sweep = orchestrator(false);
        let request = RunRequest::new(ModelId::MnistSimpleCnn, AttackKind::Fgsm, 0.1);
        let outcomes = sweep.run_sweep(&request, &[0.1, 2.0, 0.2]);
        assert!(outcomes[0].is_ok());
        assert!(matches!(outcomes[1], Err(RunError::Config(ConfigError::Epsilon { .. }))));
        assert!(outcomes[2].is_ok());
    }

    #[test]
    fn resource_and_compute_errors_are_distinguished() {
        let mut sweep = orchestrator(false);
        let request = RunRequest::new(ModelId::Cifar10Resnet20, AttackKind::Fgsm, 0.03);
        assert!(matches!(
            sweep.run_once(&request),
            Err(RunError::Resource(ResourceError::ModelNotFound { .. }))
        ));
        let mut failing = orchestrator(true);
        let request = RunRequest::new(ModelId::MnistSimpleCnn, AttackKind::Pgd, 0.1);
        match failing.run_once(&request) {
            Err(RunError::Compute(OracleError::NoGradient(msg))) => assert_eq!(msg, "cuda error"),
            other => panic!("unexpected {:?}", other.map(|o| o.report)),
        }
    }

    #[test]
    fn default_sweep_uses_model_epsilons() {
        let mut sweep = orchestrator(false);
        let request = RunRequest::new(ModelId::MnistSimpleCnn, AttackKind::Fgsm, 0.05);
        let epsilons: Vec<f64> = sweep
            .run_default_sweep(&request)
            .into_iter()
            .map(|o| o.unwrap().report.epsilon())
            .collect();
        assert_eq!(epsilons, vec![0.05, 0.1, 0.2, 0.3]);
    }
}
