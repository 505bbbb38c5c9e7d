use std::fs;

use anyhow::{anyhow, bail};
use drivenet::{
    augment::perturbation_fn,
    checkpoint::{
        param_dict_from_arrays, EarlyStoppingConfigBuilder, MetricGoal, NpzSnapshotStore,
        ParamDict, SnapshotStore,
    },
    dataset::Dataset,
    train::{
        squared_error, Evaluation, LinearDecay, Model, Trainer, TrainingConfig,
        TrainingConfigBuilder,
    },
    TrainError,
};
use ndarray::{array, Array1, ArrayD, Axis, IxDyn};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Reports a fixed validation metric per epoch. Its only weight counts the validation passes seen so far.
struct ScriptedModel {
    metrics: Vec<f32>,
    validations: usize,
    learning_rates: Vec<f64>,
}

impl ScriptedModel {
    fn new(metrics: Vec<f32>) -> Self {
        Self {
            metrics,
            validations: 0,
            learning_rates: Vec::new(),
        }
    }
}

impl Model for ScriptedModel {
    fn train_batch(&mut self, _inputs: &ArrayD<f32>, _targets: &Array1<f32>) -> anyhow::Result<f32> {
        Ok(1.0)
    }

    fn validate_batch(
        &mut self,
        _inputs: &ArrayD<f32>,
        _targets: &Array1<f32>,
    ) -> anyhow::Result<Evaluation> {
        let metric = *self
            .metrics
            .get(self.validations)
            .ok_or_else(|| anyhow!("script exhausted"))?;
        self.validations += 1;
        Ok(Evaluation { loss: 0.0, metric })
    }

    fn parameters(&self) -> ParamDict {
        param_dict_from_arrays(vec![array![self.validations as f32].into_dyn()])
    }

    fn load_parameters(&mut self, parameters: ParamDict) -> anyhow::Result<()> {
        let weight = parameters
            .get("arr_0")
            .and_then(|array| array.iter().next().copied())
            .ok_or_else(|| anyhow!("missing weight"))?;
        self.validations = weight as usize;
        Ok(())
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rates.push(learning_rate);
    }
}

/// Fits `y = w * mean(x) + b` with plain gradient descent.
struct MeanRegression {
    weight: f32,
    bias: f32,
    learning_rate: f32,
}

impl MeanRegression {
    fn predict(&self, inputs: &ArrayD<f32>) -> Array1<f32> {
        inputs
            .outer_iter()
            .map(|sample| self.weight * sample.mean().unwrap_or(0.0) + self.bias)
            .collect()
    }
}

impl Model for MeanRegression {
    fn train_batch(&mut self, inputs: &ArrayD<f32>, targets: &Array1<f32>) -> anyhow::Result<f32> {
        let means = inputs
            .outer_iter()
            .map(|sample| sample.mean().unwrap_or(0.0))
            .collect::<Array1<f32>>();
        let predictions = self.predict(inputs);
        let residuals = &predictions - targets;
        let grad_weight = 2.0 * (&residuals * &means).mean().unwrap_or(0.0);
        let grad_bias = 2.0 * residuals.mean().unwrap_or(0.0);
        self.weight -= self.learning_rate * grad_weight;
        self.bias -= self.learning_rate * grad_bias;
        Ok(squared_error(predictions.view(), targets.view()))
    }

    fn validate_batch(
        &mut self,
        inputs: &ArrayD<f32>,
        targets: &Array1<f32>,
    ) -> anyhow::Result<Evaluation> {
        let loss = squared_error(self.predict(inputs).view(), targets.view());
        Ok(Evaluation { loss, metric: loss })
    }

    fn parameters(&self) -> ParamDict {
        param_dict_from_arrays(vec![
            array![self.weight].into_dyn(),
            array![self.bias].into_dyn(),
        ])
    }

    fn load_parameters(&mut self, parameters: ParamDict) -> anyhow::Result<()> {
        let mut values = parameters.values().map(|array| array.iter().next().copied());
        match (values.next().flatten(), values.next().flatten()) {
            (Some(weight), Some(bias)) => {
                self.weight = weight;
                self.bias = bias;
                Ok(())
            }
            _ => bail!("expected a weight and a bias"),
        }
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate as f32;
    }
}

struct FailingModel;

impl Model for FailingModel {
    fn train_batch(&mut self, _inputs: &ArrayD<f32>, _targets: &Array1<f32>) -> anyhow::Result<f32> {
        bail!("diverged")
    }

    fn validate_batch(
        &mut self,
        _inputs: &ArrayD<f32>,
        _targets: &Array1<f32>,
    ) -> anyhow::Result<Evaluation> {
        Ok(Evaluation {
            loss: 0.0,
            metric: 0.0,
        })
    }

    fn parameters(&self) -> ParamDict {
        ParamDict::new()
    }

    fn load_parameters(&mut self, _parameters: ParamDict) -> anyhow::Result<()> {
        Ok(())
    }
}

fn frames(num_samples: usize) -> Dataset {
    Dataset::new(
        ArrayD::zeros(IxDyn(&[num_samples, 1, 4, 4])),
        Array1::zeros(num_samples),
    )
    .unwrap()
}

/// Constant frames of random brightness `v`, labeled `2v + 1`.
fn brightness(num_samples: usize, rng: &mut StdRng) -> Dataset {
    let values = (0..num_samples).map(|_| rng.gen::<f32>()).collect::<Vec<_>>();
    let mut samples = ArrayD::zeros(IxDyn(&[num_samples, 1, 4, 4]));
    for (mut sample, &value) in samples.axis_iter_mut(Axis(0)).zip(&values) {
        sample.fill(value);
    }
    let labels = values.iter().map(|v| 2.0 * v + 1.0).collect();
    Dataset::new(samples, labels).unwrap()
}

fn config(patience: usize, max_epochs: usize) -> TrainingConfigBuilder {
    TrainingConfigBuilder::default()
        .max_epochs(max_epochs)
        .batch_size(16)
        .early_stopping(
            EarlyStoppingConfigBuilder::default()
                .patience(patience)
                .build()
                .unwrap(),
        )
}

#[test]
fn early_stop_promotes_best_test() {
    let dir = tempfile::tempdir().unwrap();
    let selected = dir.path().join("selected").join("model.npz");
    let mut trainer = Trainer::new(
        config(2, 100)
            .selected_model(selected.clone())
            .build()
            .unwrap(),
    );
    let mut model = ScriptedModel::new(vec![0.5, 0.7, 0.6, 0.65, 0.9]);
    let mut store = NpzSnapshotStore::new(dir.path().join("snapshots"), "epoch_");
    let mut rng = StdRng::seed_from_u64(0);

    let mut seen = Vec::new();
    let report = trainer
        .fit(
            &mut model,
            &frames(32),
            &frames(8),
            &mut store,
            &mut rng,
            |summary| seen.push(summary.epoch),
        )
        .unwrap();

    assert_eq!(seen, vec![0, 1, 2, 3]);
    assert_eq!(report.epochs_run, 4);
    assert!(report.stopped_early);
    assert_eq!(report.best_epoch, Some(1));
    assert_eq!(report.best_value, Some(0.7));
    assert_eq!(report.selected_model.as_deref(), Some(selected.as_path()));
    assert!(selected.is_file());
    assert!(!store.contains(1));
    assert!(store.contains(0));
    assert!(report.history[0].snapshot.is_some());
    assert!(report.history[2].snapshot.is_none());
    // weights of epoch 1 were taken after its second validation pass
    assert_eq!(model.validations, 2);
    assert!(model.learning_rates.is_empty());
}

#[test]
fn exhausted_epochs_keep_best_snapshot_test() {
    let dir = tempfile::tempdir().unwrap();
    let mut trainer = Trainer::new(config(10, 3).restore_best(false).build().unwrap());
    let mut model = ScriptedModel::new(vec![0.1, 0.2, 0.15]);
    let mut store = NpzSnapshotStore::new(dir.path(), "epoch_");
    let mut rng = StdRng::seed_from_u64(1);

    let report = trainer
        .fit(&mut model, &frames(20), &frames(4), &mut store, &mut rng, |_| {})
        .unwrap();

    assert_eq!(report.epochs_run, 3);
    assert!(!report.stopped_early);
    assert_eq!(report.best_epoch, Some(1));
    assert!(report.selected_model.is_none());
    assert!(store.contains(0) && store.contains(1) && !store.contains(2));
    assert_eq!(model.validations, 3);
    let best = store.load(&store.snapshot_path(1)).unwrap();
    assert_eq!(best["arr_0"][[0]], 2.0);
}

#[test]
fn learning_rate_schedule_test() {
    let dir = tempfile::tempdir().unwrap();
    let mut trainer =
        Trainer::new(config(100, 5).build().unwrap()).with_scheduler(LinearDecay::new(0.1, 0.02));
    let mut model = ScriptedModel::new(vec![0.0; 5]);
    let mut store = NpzSnapshotStore::new(dir.path(), "epoch_");
    let mut rng = StdRng::seed_from_u64(2);

    let report = trainer
        .fit(&mut model, &frames(16), &frames(16), &mut store, &mut rng, |_| {})
        .unwrap();

    let expected = [0.1, 0.08, 0.06, 0.04, 0.02];
    assert_eq!(model.learning_rates.len(), 5);
    for (got, want) in model.learning_rates.iter().zip(expected) {
        assert!((got - want).abs() < 1e-9);
    }
    assert_eq!(report.history[4].learning_rate, model.learning_rates.last().copied());
}

#[test]
fn regression_improves_test() {
    let mut rng = StdRng::seed_from_u64(3);
    let dataset = brightness(120, &mut rng);
    let (train, validation) = dataset.split(0.85, &mut rng).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let config = config(20, 60)
        .early_stopping(
            EarlyStoppingConfigBuilder::default()
                .patience(20)
                .goal(MetricGoal::Minimize)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let mut trainer = Trainer::new(config)
        .with_perturbation(perturbation_fn(|sample, _rng| sample.to_owned()));
    let mut model = MeanRegression {
        weight: 0.0,
        bias: 0.0,
        learning_rate: 0.1,
    };
    let mut store = NpzSnapshotStore::new(dir.path(), "epoch_");

    let report = trainer
        .fit(&mut model, &train, &validation, &mut store, &mut rng, |_| {})
        .unwrap();

    let first = report.history[0].validation_loss;
    let best = report.best_value.unwrap();
    assert!(best < first);
    // the restored weights reproduce the best validation loss on the single validation batch
    let batch = validation.select(&(0..16).collect::<Vec<_>>());
    let restored = model.validate_batch(batch.samples(), batch.labels()).unwrap();
    assert!((restored.loss - best).abs() < 1e-4);
}

#[test]
fn empty_validation_test() {
    let dir = tempfile::tempdir().unwrap();
    let mut trainer = Trainer::new(TrainingConfig::default());
    let mut model = ScriptedModel::new(vec![0.0]);
    let mut store = NpzSnapshotStore::new(dir.path(), "epoch_");
    let mut rng = StdRng::seed_from_u64(0);
    let result = trainer.fit(&mut model, &frames(32), &frames(0), &mut store, &mut rng, |_| {});
    assert!(matches!(result, Err(TrainError::InvalidConfiguration(_))));
}

#[test]
fn model_error_test() {
    let dir = tempfile::tempdir().unwrap();
    let mut trainer = Trainer::new(config(5, 10).build().unwrap());
    let mut store = NpzSnapshotStore::new(dir.path(), "epoch_");
    let mut rng = StdRng::seed_from_u64(0);
    let result = trainer.fit(&mut FailingModel, &frames(16), &frames(4), &mut store, &mut rng, |_| {});
    assert!(matches!(result, Err(TrainError::Model(_))));
}

#[test]
fn config_from_json_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("train.json");
    fs::write(
        &path,
        r#"{
            "batch_size": 32,
            "early_stopping": { "patience": 50, "goal": "minimize" },
            "selected_model": "models/selected.npz"
        }"#,
    )
    .unwrap();

    let config = TrainingConfig::from_json(&path).unwrap();
    assert_eq!(config.batch_size, 32);
    assert_eq!(config.max_epochs, 8000);
    assert_eq!(config.early_stopping.patience, 50);
    assert_eq!(config.early_stopping.checkpoint_interval, 100);
    assert_eq!(config.early_stopping.goal, MetricGoal::Minimize);
    assert_eq!(
        config.selected_model.as_deref(),
        Some(std::path::Path::new("models/selected.npz"))
    );
    assert!(config.restore_best);

    let validation = config.validation_loader_config(10);
    assert_eq!(validation.batch_size, 10);
    assert!(!validation.shuffle && !validation.augment);

    assert!(matches!(
        TrainingConfig::from_json(dir.path().join("missing.json")),
        Err(TrainError::Io(_))
    ));
}
