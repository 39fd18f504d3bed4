// Training Callbacks — epoch-boundary hooks driven by the training loop
//
// The loop owns a `TrainState` (mutable knobs: learning rate, stop flag) and
// hands each finished epoch's numbers to the callbacks as an `EpochRecord`.
// Records are mutable so multi-worker metric averaging can rewrite them
// before the loggers see them; for that reason `MetricAverage` must sit
// before any metric-reading callback in the list.
//
// COMPONENTS:
//
//   TerminateOnNaN            — stop on non-finite training loss
//   EarlyStopping             — stop after `patience` epochs without val_loss
//                               improving by more than `min_delta`
//   ReduceLrOnPlateau         — multiply the LR by `factor` when val_loss
//                               plateaus
//   LearningRateWarmup        — ramp the LR linearly over the first epochs
//   BroadcastGlobalVariables  — sync the LR from the root worker at start
//   MetricAverage             — all-reduce the epoch record across workers
//   CsvLogger                 — append one row per epoch to a results file
//   ModelCheckpoint           — write a checkpoint file per (improving) epoch

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dctflow_data::Result;

use crate::distributed::Coordinator;

// State shared with the training loop

/// Knobs a callback may turn between epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainState {
    /// Current learning rate.
    pub lr: f64,
    /// When set, the loop finishes the current epoch and returns.
    pub stop_training: bool,
}

impl TrainState {
    pub fn new(lr: f64) -> Self {
        Self {
            lr,
            stop_training: false,
        }
    }
}

/// One finished epoch's numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochRecord {
    /// Zero-based epoch counter.
    pub epoch: usize,
    /// Mean training loss over the epoch.
    pub loss: f64,
    /// Mean validation loss.
    pub val_loss: f64,
    /// Named metric values, in declaration order.
    pub metrics: Vec<(String, f64)>,
}

/// Epoch-boundary hooks. All hooks default to no-ops.
pub trait Callback: Send {
    fn name(&self) -> &'static str;

    fn on_train_begin(&mut self, _state: &mut TrainState) -> Result<()> {
        Ok(())
    }

    fn on_epoch_begin(&mut self, _epoch: usize, _state: &mut TrainState) -> Result<()> {
        Ok(())
    }

    fn on_epoch_end(&mut self, _record: &mut EpochRecord, _state: &mut TrainState) -> Result<()> {
        Ok(())
    }
}

/// Ordered callback collection; hooks run in insertion order.
#[derive(Default)]
pub struct CallbackList {
    callbacks: Vec<Box<dyn Callback>>,
}

impl CallbackList {
    pub fn new(callbacks: Vec<Box<dyn Callback>>) -> Self {
        Self { callbacks }
    }

    pub fn push(&mut self, callback: Box<dyn Callback>) {
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.callbacks.iter().map(|c| c.name()).collect()
    }

    pub fn on_train_begin(&mut self, state: &mut TrainState) -> Result<()> {
        for c in &mut self.callbacks {
            c.on_train_begin(state)?;
        }
        Ok(())
    }

    pub fn on_epoch_begin(&mut self, epoch: usize, state: &mut TrainState) -> Result<()> {
        for c in &mut self.callbacks {
            c.on_epoch_begin(epoch, state)?;
        }
        Ok(())
    }

    pub fn on_epoch_end(&mut self, record: &mut EpochRecord, state: &mut TrainState) -> Result<()> {
        for c in &mut self.callbacks {
            c.on_epoch_end(record, state)?;
        }
        Ok(())
    }
}

// TerminateOnNaN

/// Stops training as soon as the training loss goes non-finite.
#[derive(Debug, Default)]
pub struct TerminateOnNaN;

impl Callback for TerminateOnNaN {
    fn name(&self) -> &'static str {
        "terminate_on_nan"
    }

    fn on_epoch_end(&mut self, record: &mut EpochRecord, state: &mut TrainState) -> Result<()> {
        if !record.loss.is_finite() {
            eprintln!(
                "epoch {}: loss is {}, terminating training",
                record.epoch, record.loss
            );
            state.stop_training = true;
        }
        Ok(())
    }
}

// EarlyStopping

/// Stops training when `val_loss` has not improved for `patience` epochs.
#[derive(Debug)]
pub struct EarlyStopping {
    min_delta: f64,
    patience: usize,
    best: f64,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(min_delta: f64, patience: usize) -> Self {
        Self {
            min_delta,
            patience,
            best: f64::INFINITY,
            wait: 0,
        }
    }
}

impl Default for EarlyStopping {
    /// min_delta 0, patience 10.
    fn default() -> Self {
        Self::new(0.0, 10)
    }
}

impl Callback for EarlyStopping {
    fn name(&self) -> &'static str {
        "early_stopping"
    }

    fn on_epoch_end(&mut self, record: &mut EpochRecord, state: &mut TrainState) -> Result<()> {
        if record.val_loss < self.best - self.min_delta {
            self.best = record.val_loss;
            self.wait = 0;
        } else {
            self.wait += 1;
            if self.wait >= self.patience {
                eprintln!(
                    "epoch {}: val_loss stalled for {} epochs, stopping",
                    record.epoch, self.wait
                );
                state.stop_training = true;
            }
        }
        Ok(())
    }
}

// ReduceLrOnPlateau

/// Multiplies the learning rate by `factor` when `val_loss` plateaus.
#[derive(Debug)]
pub struct ReduceLrOnPlateau {
    factor: f64,
    patience: usize,
    min_delta: f64,
    min_lr: f64,
    best: f64,
    wait: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(factor: f64, patience: usize) -> Self {
        Self {
            factor,
            patience,
            min_delta: 1e-4,
            min_lr: 0.0,
            best: f64::INFINITY,
            wait: 0,
        }
    }

    pub fn min_lr(mut self, min_lr: f64) -> Self {
        self.min_lr = min_lr;
        self
    }
}

impl Default for ReduceLrOnPlateau {
    /// Divide the LR by 10 after 5 stalled epochs.
    fn default() -> Self {
        Self::new(0.1, 5)
    }
}

impl Callback for ReduceLrOnPlateau {
    fn name(&self) -> &'static str {
        "reduce_lr_on_plateau"
    }

    fn on_epoch_end(&mut self, record: &mut EpochRecord, state: &mut TrainState) -> Result<()> {
        if record.val_loss < self.best - self.min_delta {
            self.best = record.val_loss;
            self.wait = 0;
        } else {
            self.wait += 1;
            if self.wait >= self.patience {
                let new_lr = (state.lr * self.factor).max(self.min_lr);
                eprintln!(
                    "epoch {}: reducing learning rate {} -> {}",
                    record.epoch, state.lr, new_lr
                );
                state.lr = new_lr;
                self.wait = 0;
            }
        }
        Ok(())
    }
}

// LearningRateWarmup

/// Ramps the learning rate linearly from `start_lr` to `target_lr` over the
/// first `warmup_epochs` epochs. Needed when the LR was scaled up for
/// multi-worker runs; starting at the scaled rate from epoch zero hurts
/// final accuracy.
#[derive(Debug)]
pub struct LearningRateWarmup {
    warmup_epochs: usize,
    start_lr: f64,
    target_lr: f64,
}

impl LearningRateWarmup {
    pub fn new(warmup_epochs: usize, start_lr: f64, target_lr: f64) -> Self {
        Self {
            warmup_epochs,
            start_lr,
            target_lr,
        }
    }
}

impl Callback for LearningRateWarmup {
    fn name(&self) -> &'static str {
        "lr_warmup"
    }

    fn on_epoch_begin(&mut self, epoch: usize, state: &mut TrainState) -> Result<()> {
        if self.warmup_epochs == 0 || epoch >= self.warmup_epochs {
            return Ok(());
        }
        let progress = (epoch + 1) as f64 / self.warmup_epochs as f64;
        state.lr = self.start_lr + (self.target_lr - self.start_lr) * progress;
        Ok(())
    }
}

// BroadcastGlobalVariables

/// Syncs the starting learning rate from the root worker, so all replicas
/// begin the run identically.
pub struct BroadcastGlobalVariables {
    root_rank: usize,
    coordinator: Arc<dyn Coordinator>,
}

impl BroadcastGlobalVariables {
    pub fn new(root_rank: usize, coordinator: Arc<dyn Coordinator>) -> Self {
        Self {
            root_rank,
            coordinator,
        }
    }
}

impl Callback for BroadcastGlobalVariables {
    fn name(&self) -> &'static str {
        "broadcast_global_variables"
    }

    fn on_train_begin(&mut self, state: &mut TrainState) -> Result<()> {
        let mut buffer = [state.lr as f32];
        self.coordinator.broadcast_from(self.root_rank, &mut buffer)?;
        state.lr = buffer[0] as f64;
        Ok(())
    }
}

// MetricAverage

/// All-reduces the epoch record across workers, so loggers and LR schedules
/// act on global rather than per-worker numbers.
pub struct MetricAverage {
    coordinator: Arc<dyn Coordinator>,
}

impl MetricAverage {
    pub fn new(coordinator: Arc<dyn Coordinator>) -> Self {
        Self { coordinator }
    }
}

impl Callback for MetricAverage {
    fn name(&self) -> &'static str {
        "metric_average"
    }

    fn on_epoch_end(&mut self, record: &mut EpochRecord, _state: &mut TrainState) -> Result<()> {
        let mut buffer: Vec<f32> = Vec::with_capacity(2 + record.metrics.len());
        buffer.push(record.loss as f32);
        buffer.push(record.val_loss as f32);
        buffer.extend(record.metrics.iter().map(|&(_, v)| v as f32));

        self.coordinator.average(&mut buffer)?;

        record.loss = buffer[0] as f64;
        record.val_loss = buffer[1] as f64;
        for (slot, &avg) in record.metrics.iter_mut().zip(&buffer[2..]) {
            slot.1 = avg as f64;
        }
        Ok(())
    }
}

// CsvLogger

/// Appends one row per epoch to a results file.
///
/// The header is written once: on a fresh file, or on an existing file when
/// `append` is off (the file is truncated at train begin).
pub struct CsvLogger {
    path: PathBuf,
    separator: char,
    append: bool,
    header_written: bool,
}

impl CsvLogger {
    pub fn new(path: impl Into<PathBuf>, separator: char, append: bool) -> Self {
        Self {
            path: path.into(),
            separator,
            append,
            header_written: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Debug formatting keeps the trailing `.0` on integral values, so every
    // numeric cell reads as a float.
    fn field(value: f64) -> String {
        format!("{value:?}")
    }
}

impl Callback for CsvLogger {
    fn name(&self) -> &'static str {
        "csv_logger"
    }

    fn on_train_begin(&mut self, _state: &mut TrainState) -> Result<()> {
        if !self.append {
            std::fs::write(&self.path, "")?;
            self.header_written = false;
        } else {
            let has_rows = std::fs::metadata(&self.path)
                .map(|m| m.len() > 0)
                .unwrap_or(false);
            self.header_written = has_rows;
        }
        Ok(())
    }

    fn on_epoch_end(&mut self, record: &mut EpochRecord, _state: &mut TrainState) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let sep = self.separator;
        if !self.header_written {
            let mut header = format!("epoch{sep}loss{sep}val_loss");
            for (name, _) in &record.metrics {
                header.push(sep);
                header.push_str(name);
            }
            writeln!(file, "{header}")?;
            self.header_written = true;
        }

        let mut row = format!(
            "{}{sep}{}{sep}{}",
            record.epoch,
            Self::field(record.loss),
            Self::field(record.val_loss)
        );
        for &(_, value) in &record.metrics {
            row.push(sep);
            row.push_str(&Self::field(value));
        }
        writeln!(file, "{row}")?;
        Ok(())
    }
}

// ModelCheckpoint

/// Writes a checkpoint file at the end of each epoch, named after the
/// epoch's numbers. With `save_best_only`, epochs that do not improve
/// `val_loss` are skipped.
///
/// Serialization is delegated to the injected writer so this callback does
/// not care about the model format.
pub struct ModelCheckpoint {
    directory: PathBuf,
    save_best_only: bool,
    verbose: bool,
    best: f64,
    writer: Box<dyn FnMut(&Path) -> std::io::Result<()> + Send>,
}

impl ModelCheckpoint {
    pub fn new(
        directory: impl Into<PathBuf>,
        save_best_only: bool,
        writer: Box<dyn FnMut(&Path) -> std::io::Result<()> + Send>,
    ) -> Self {
        Self {
            directory: directory.into(),
            save_best_only,
            verbose: true,
            best: f64::INFINITY,
            writer,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// File name for a finished epoch, 1-based in the name.
    pub fn checkpoint_name(epoch: usize, loss: f64, val_loss: f64) -> String {
        format!("epoch-{:02}_loss-{loss:.4}_val_loss-{val_loss:.4}.h5", epoch + 1)
    }
}

impl Callback for ModelCheckpoint {
    fn name(&self) -> &'static str {
        "model_checkpoint"
    }

    fn on_epoch_end(&mut self, record: &mut EpochRecord, _state: &mut TrainState) -> Result<()> {
        if self.save_best_only && record.val_loss >= self.best {
            if self.verbose {
                eprintln!(
                    "epoch {}: val_loss {:.4} did not improve on {:.4}, skipping checkpoint",
                    record.epoch, record.val_loss, self.best
                );
            }
            return Ok(());
        }
        self.best = self.best.min(record.val_loss);

        let path = self
            .directory
            .join(Self::checkpoint_name(record.epoch, record.loss, record.val_loss));
        (self.writer)(&path)?;
        if self.verbose {
            eprintln!("epoch {}: saved checkpoint {}", record.epoch, path.display());
        }
        Ok(())
    }
}
