use std::path::PathBuf;

use rand::Rng;
use serde::Serialize;

use crate::{
    augment::{Perturbation, RandomAffine},
    checkpoint::{Decision, EarlyStopping, SnapshotStore},
    dataset::{BatchLoader, Dataset},
    error::{Result, TrainError},
};

use super::{Model, SchedulerAlgorithm, TrainingConfig};

/// What happened during one epoch. Handed to the `on_epoch` hook of [`Trainer::fit`].
#[derive(Debug, Clone, Serialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: f32,
    pub validation_loss: f32,
    pub validation_metric: f32,
    pub learning_rate: Option<f64>,
    pub decision: Decision,
    /// Set when a snapshot was written for this epoch.
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub best_epoch: Option<usize>,
    pub best_value: Option<f32>,
    /// Final location of the best snapshot, when one was promoted.
    pub selected_model: Option<PathBuf>,
    pub history: Vec<EpochSummary>,
}

/// Runs epochs of augmented minibatch training with early stopping and checkpointing.
pub struct Trainer<P = RandomAffine> {
    config: TrainingConfig,
    perturbation: P,
    scheduler: Option<Box<dyn SchedulerAlgorithm>>,
}

impl Trainer<RandomAffine> {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            perturbation: RandomAffine::default(),
            scheduler: None,
        }
    }
}

impl<P: Perturbation> Trainer<P> {
    /// Replaces the perturbation applied to the rotated share of every training batch.
    pub fn with_perturbation<Q: Perturbation>(self, perturbation: Q) -> Trainer<Q> {
        Trainer {
            config: self.config,
            perturbation,
            scheduler: self.scheduler,
        }
    }

    pub fn with_scheduler<S: SchedulerAlgorithm + 'static>(mut self, scheduler: S) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Trains `model` until early stopping fires or the epoch budget runs out.
    ///
    /// Snapshots are written to `store` whenever the controller asks for one. When training halts, the best snapshot is promoted to `selected_model` (if configured) and, with `restore_best`, loaded back into the model.
    pub fn fit<M, S, R, F>(
        &mut self,
        model: &mut M,
        train: &Dataset,
        validation: &Dataset,
        store: &mut S,
        rng: &mut R,
        mut on_epoch: F,
    ) -> Result<TrainingReport>
    where
        M: Model,
        S: SnapshotStore,
        R: Rng,
        F: FnMut(&EpochSummary),
    {
        let Trainer {
            config,
            perturbation,
            scheduler,
        } = self;
        if validation.is_empty() {
            return Err(TrainError::invalid_configuration(
                "validation set is empty",
            ));
        }
        let mut controller = EarlyStopping::new(config.early_stopping.clone())?;
        let train_loader = BatchLoader::new(
            train.samples().view(),
            train.labels().view(),
            config.train_loader_config(),
            &*perturbation,
        )?;
        let validation_loader = BatchLoader::new(
            validation.samples().view(),
            validation.labels().view(),
            config.validation_loader_config(validation.len()),
            &*perturbation,
        )?;
        if let Some(scheduler) = scheduler.as_mut() {
            scheduler.init(config.max_epochs);
        }

        tracing::info!(
            train_samples = train.len(),
            validation_samples = validation.len(),
            batch_size = config.batch_size,
            max_epochs = config.max_epochs,
            "starting training"
        );

        let mut history = Vec::new();
        let mut stopped_early = false;
        for epoch in 0..config.max_epochs {
            let learning_rate = scheduler.as_mut().map(|s| s.update(epoch));
            if let Some(learning_rate) = learning_rate {
                model.set_learning_rate(learning_rate);
            }

            let mut train_loss = 0.0;
            let mut train_batches = 0usize;
            for batch in train_loader.iter(&mut *rng) {
                train_loss += model
                    .train_batch(&batch.inputs, &batch.targets)
                    .map_err(TrainError::Model)?;
                train_batches += 1;
            }

            let mut validation_loss = 0.0;
            let mut validation_metric = 0.0;
            let mut validation_batches = 0usize;
            for batch in validation_loader.iter(&mut *rng) {
                let evaluation = model
                    .validate_batch(&batch.inputs, &batch.targets)
                    .map_err(TrainError::Model)?;
                validation_loss += evaluation.loss;
                validation_metric += evaluation.metric;
                validation_batches += 1;
            }

            let train_loss = train_loss / train_batches.max(1) as f32;
            let validation_loss = validation_loss / validation_batches.max(1) as f32;
            let validation_metric = validation_metric / validation_batches.max(1) as f32;

            let decision = controller.record(epoch, validation_metric);
            let snapshot = if decision.should_checkpoint {
                Some(store.save(epoch, &model.parameters())?)
            } else {
                None
            };

            tracing::info!(
                epoch,
                train_loss,
                validation_loss,
                validation_metric,
                is_best = decision.is_best,
                "epoch finished"
            );
            let summary = EpochSummary {
                epoch,
                train_loss,
                validation_loss,
                validation_metric,
                learning_rate,
                decision,
                snapshot,
            };
            on_epoch(&summary);
            history.push(summary);

            if decision.should_stop {
                stopped_early = true;
                break;
            }
        }

        let selected_model = match controller.best_epoch() {
            Some(best_epoch) => finish(config, model, store, best_epoch)?,
            None => None,
        };

        Ok(TrainingReport {
            epochs_run: history.len(),
            stopped_early,
            best_epoch: controller.best_epoch(),
            best_value: controller.best_value(),
            selected_model,
            history,
        })
    }
}

fn finish<M, S>(
    config: &TrainingConfig,
    model: &mut M,
    store: &mut S,
    best_epoch: usize,
) -> Result<Option<PathBuf>>
where
    M: Model,
    S: SnapshotStore,
{
    if !store.contains(best_epoch) {
        return Err(TrainError::consistency(format!(
            "best epoch {best_epoch} has no snapshot"
        )));
    }
    let selected_model = match &config.selected_model {
        Some(destination) => Some(store.promote(best_epoch, destination)?),
        None => None,
    };
    if config.restore_best {
        let path = selected_model
            .clone()
            .unwrap_or_else(|| store.snapshot_path(best_epoch));
        let parameters = store.load(&path)?;
        model
            .load_parameters(parameters)
            .map_err(TrainError::Model)?;
        tracing::info!(best_epoch, path = %path.display(), "restored best weights");
    }
    Ok(selected_model)
}
