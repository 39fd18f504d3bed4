// Training Configuration — paths, hyperparameters, distributed scaling
//
// Mirrors the lifecycle of an experiment run:
//
//   1. `DataPaths::from_env()` resolves dataset and output locations.
//   2. `TrainingConfig::new()` fixes the single-worker hyperparameters.
//   3. Optionally `prepare_distributed()` rescales them for N workers and
//      swaps in the multi-worker callback list.
//   4. `prepare_training_generators()` builds the train/validation batch
//      sources (after step 3, so they see the per-worker batch size).
//   5. `add_csv_logger()` / `add_model_checkpoint()` attach the output
//      callbacks; on multi-worker runs only rank 0 writes files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dctflow_data::{
    default_augmentations, ChromaLayout, CoefficientGenerator, Error, GeneratorConfig, Result,
};

use crate::callbacks::{
    BroadcastGlobalVariables, Callback, CallbackList, CsvLogger, EarlyStopping,
    LearningRateWarmup, MetricAverage, ModelCheckpoint, ReduceLrOnPlateau, TerminateOnNaN,
};
use crate::distributed::{Coordinator, DistributedOptimizer};
use crate::metrics::{default_metrics, Metric};
use crate::optim::{Loss, Sgd};

// Paths

const ENV_TRAIN: &str = "DATASET_PATH_TRAIN";
const ENV_VAL: &str = "DATASET_PATH_VAL";
const ENV_PROJECT: &str = "PROJECT_PATH";
const ENV_OUTPUT: &str = "EXPERIMENTS_OUTPUT_DIRECTORY";

/// Where the datasets, the class index and the run outputs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub train_directory: PathBuf,
    pub validation_directory: PathBuf,
    pub index_file: PathBuf,
    pub output_directory: PathBuf,
}

impl DataPaths {
    pub fn new(
        train_directory: impl Into<PathBuf>,
        validation_directory: impl Into<PathBuf>,
        index_file: impl Into<PathBuf>,
        output_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            train_directory: train_directory.into(),
            validation_directory: validation_directory.into(),
            index_file: index_file.into(),
            output_directory: output_directory.into(),
        }
    }

    /// Resolve the standard ImageNet layout from the environment:
    ///
    ///   DATASET_PATH_TRAIN/imagenet/train
    ///   DATASET_PATH_VAL/imagenet/validation
    ///   PROJECT_PATH/data/imagenet_class_index.json
    ///   EXPERIMENTS_OUTPUT_DIRECTORY
    pub fn from_env() -> Result<Self> {
        let var = |name: &'static str| {
            std::env::var(name).map_err(|_| Error::MissingEnv(name))
        };
        Ok(Self {
            train_directory: PathBuf::from(var(ENV_TRAIN)?).join("imagenet/train"),
            validation_directory: PathBuf::from(var(ENV_VAL)?).join("imagenet/validation"),
            index_file: PathBuf::from(var(ENV_PROJECT)?).join("data/imagenet_class_index.json"),
            output_directory: PathBuf::from(var(ENV_OUTPUT)?),
        })
    }
}

// Network descriptor

/// What model the run trains. The layers themselves belong to the training
/// framework; the configuration only records the choice and the input
/// tensor shapes the generators will feed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    /// Architecture tag, e.g. "resnet50_dct".
    pub architecture: String,
    /// Start from pretrained weights when the framework has them.
    pub pretrained: bool,
    pub num_classes: usize,
    /// One `[H, W, C]` shape per generator input tensor.
    pub input_shapes: Vec<[usize; 3]>,
}

impl NetworkSpec {
    /// Input shapes implied by the chroma layout at `target_length`.
    fn input_shapes(layout: ChromaLayout, target_length: u32) -> Vec<[usize; 3]> {
        let lb = target_length as usize / 8;
        let cb = target_length as usize / 16;
        match layout {
            ChromaLayout::Concatenated => vec![[lb, lb, 64], [cb, cb, 128]],
            ChromaLayout::Separate => vec![[lb, lb, 64], [cb, cb, 64], [cb, cb, 64]],
        }
    }
}

// Optimizer slot

/// The optimizer in its current form: local, or wrapped for multi-worker
/// gradient averaging.
pub enum OptimizerSpec {
    Local(Sgd),
    Distributed(DistributedOptimizer),
}

impl OptimizerSpec {
    pub fn lr(&self) -> f64 {
        match self {
            OptimizerSpec::Local(sgd) => sgd.lr(),
            OptimizerSpec::Distributed(opt) => opt.lr(),
        }
    }

    pub fn set_lr(&mut self, lr: f64) {
        match self {
            OptimizerSpec::Local(sgd) => sgd.set_lr(lr),
            OptimizerSpec::Distributed(opt) => opt.set_lr(lr),
        }
    }

    pub fn step(&mut self, params: &mut [Vec<f32>], grads: &[Vec<f32>]) -> Result<()> {
        match self {
            OptimizerSpec::Local(sgd) => sgd.step(params, grads),
            OptimizerSpec::Distributed(opt) => opt.step(params, grads),
        }
    }
}

// TrainingConfig

/// Everything one classification run needs, with the reference ImageNet
/// hyperparameters as defaults.
pub struct TrainingConfig {
    paths: DataPaths,
    layout: ChromaLayout,

    num_classes: usize,
    target_length: u32,

    epochs: usize,
    batch_size: usize,
    batch_size_divider: usize,
    steps_per_epoch: usize,
    validation_steps: usize,
    workers: usize,
    multiprocessing: bool,

    network: NetworkSpec,
    optimizer: OptimizerSpec,
    loss: Loss,
    metrics: Vec<Metric>,
    callbacks: CallbackList,

    coordinator: Option<Arc<dyn Coordinator>>,
    train_generator: Option<CoefficientGenerator>,
    validation_generator: Option<CoefficientGenerator>,
}

impl TrainingConfig {
    pub fn new(paths: DataPaths, layout: ChromaLayout) -> Self {
        let batch_size = 256;
        let num_classes = 1000;
        let target_length = 224;
        Self {
            paths,
            layout,
            num_classes,
            target_length,
            epochs: 120,
            batch_size,
            batch_size_divider: 4,
            steps_per_epoch: 5000,
            validation_steps: 50_000 / batch_size,
            workers: 4,
            multiprocessing: true,
            network: NetworkSpec {
                architecture: "resnet50_dct".to_string(),
                pretrained: true,
                num_classes,
                input_shapes: NetworkSpec::input_shapes(layout, target_length),
            },
            optimizer: OptimizerSpec::Local(Sgd::for_classification()),
            loss: Loss::CategoricalCrossentropy,
            metrics: default_metrics(),
            callbacks: CallbackList::new(vec![
                Box::new(TerminateOnNaN),
                Box::new(EarlyStopping::default()),
            ]),
            coordinator: None,
            train_generator: None,
            validation_generator: None,
        }
    }

    /// Override the global batch size. The validation step count follows
    /// the 50k-image validation set as it does for the default batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self.validation_steps = 50_000 / batch_size;
        self
    }

    /// Override the input crop side length. The network input shapes follow.
    pub fn with_target_length(mut self, target_length: u32) -> Self {
        self.target_length = target_length;
        self.network.input_shapes = NetworkSpec::input_shapes(self.layout, target_length);
        self
    }

    /// Override the architecture tag and pretrained flag.
    pub fn with_network(mut self, architecture: impl Into<String>, pretrained: bool) -> Self {
        self.network.architecture = architecture.into();
        self.network.pretrained = pretrained;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    // Accessors

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn layout(&self) -> ChromaLayout {
        self.layout
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn steps_per_epoch(&self) -> usize {
        self.steps_per_epoch
    }

    pub fn validation_steps(&self) -> usize {
        self.validation_steps
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn multiprocessing(&self) -> bool {
        self.multiprocessing
    }

    pub fn network(&self) -> &NetworkSpec {
        &self.network
    }

    pub fn loss(&self) -> Loss {
        self.loss
    }

    pub fn optimizer(&self) -> &OptimizerSpec {
        &self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut OptimizerSpec {
        &mut self.optimizer
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn callbacks(&self) -> &CallbackList {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut CallbackList {
        &mut self.callbacks
    }

    pub fn coordinator(&self) -> Option<&Arc<dyn Coordinator>> {
        self.coordinator.as_ref()
    }

    pub fn train_generator(&self) -> Option<&CoefficientGenerator> {
        self.train_generator.as_ref()
    }

    pub fn train_generator_mut(&mut self) -> Option<&mut CoefficientGenerator> {
        self.train_generator.as_mut()
    }

    pub fn validation_generator(&self) -> Option<&CoefficientGenerator> {
        self.validation_generator.as_ref()
    }

    fn rank_zero(&self) -> bool {
        self.coordinator.as_ref().map_or(true, |c| c.rank() == 0)
    }

    // Distributed scaling

    /// Rescale the run for `coordinator.size()` workers.
    ///
    /// Each worker takes a `1/divider` slice of the global batch, the
    /// learning rate grows with the worker count, and the callback list is
    /// replaced by the multi-worker set. Metric averaging runs before the
    /// LR schedule so the schedule sees global numbers; warmup eases the
    /// scaled LR in over the first five epochs.
    pub fn prepare_distributed(&mut self, coordinator: Arc<dyn Coordinator>) -> Result<()> {
        let size = coordinator.size();
        let divider = self.batch_size_divider;
        if size % divider != 0 {
            return Err(Error::msg(format!(
                "worker count {size} is not a multiple of the batch size divider {divider}"
            )));
        }

        let base_lr = self.optimizer.lr();
        let scaled_lr = base_lr * size as f64 / divider as f64;

        self.callbacks = CallbackList::new(vec![
            Box::new(BroadcastGlobalVariables::new(0, coordinator.clone())),
            Box::new(MetricAverage::new(coordinator.clone())),
            Box::new(LearningRateWarmup::new(5, base_lr, scaled_lr)),
            Box::new(ReduceLrOnPlateau::default()),
            Box::new(TerminateOnNaN),
            Box::new(EarlyStopping::default()),
        ]);

        let mut sgd = match std::mem::replace(
            &mut self.optimizer,
            OptimizerSpec::Local(Sgd::for_classification()),
        ) {
            OptimizerSpec::Local(sgd) => sgd,
            OptimizerSpec::Distributed(opt) => opt.inner().clone(),
        };
        sgd.set_lr(scaled_lr);
        self.optimizer =
            OptimizerSpec::Distributed(DistributedOptimizer::new(sgd, coordinator.clone()));

        self.batch_size /= divider;
        self.steps_per_epoch /= size / divider;
        self.validation_steps = 3 * self.validation_steps / size;
        self.coordinator = Some(coordinator);
        Ok(())
    }

    // Generators

    /// Build the train and validation batch sources.
    ///
    /// Both sides shuffle and flip; the validation side only skips the
    /// rescale/random-crop and the photometric augmentations.
    pub fn prepare_training_generators(&mut self) -> Result<()> {
        let train_config = GeneratorConfig::default()
            .batch_size(self.batch_size)
            .target_length(self.target_length)
            .scale(true)
            .workers(self.workers);
        self.train_generator = Some(CoefficientGenerator::new(
            &self.paths.train_directory,
            &self.paths.index_file,
            self.layout,
            train_config,
            default_augmentations(),
        )?);

        let validation_config = GeneratorConfig::default()
            .batch_size(self.batch_size)
            .target_length(self.target_length)
            .scale(false)
            .workers(self.workers);
        self.validation_generator = Some(CoefficientGenerator::new(
            &self.paths.validation_directory,
            &self.paths.index_file,
            self.layout,
            validation_config,
            Vec::new(),
        )?);
        Ok(())
    }

    // Output callbacks

    /// Attach a CSV results logger. On multi-worker runs only rank 0 logs.
    pub fn add_csv_logger(&mut self, filename: &str, separator: char, append: bool) {
        if !self.rank_zero() {
            return;
        }
        let path = self.paths.output_directory.join(filename);
        self.callbacks
            .push(Box::new(CsvLogger::new(path, separator, append)));
    }

    /// Attach a checkpoint writer. On multi-worker runs only rank 0 saves.
    pub fn add_model_checkpoint(
        &mut self,
        save_best_only: bool,
        writer: Box<dyn FnMut(&Path) -> std::io::Result<()> + Send>,
    ) {
        if !self.rank_zero() {
            return;
        }
        self.callbacks.push(Box::new(ModelCheckpoint::new(
            self.paths.output_directory.clone(),
            save_best_only,
            writer,
        )));
    }
}
