//! # dctflow
//!
//! Training configuration for DCT-domain image classification.
//!
//! This is the top-level facade crate. The data plumbing (class index,
//! sample pipeline, batch generators) lives in `dctflow-data` and is
//! re-exported here; this crate adds the pieces the training loop needs:
//!
//! - [`config`] — `DataPaths`, `TrainingConfig`, distributed rescaling
//! - [`optim`] — SGD with momentum/decay/Nesterov, categorical cross-entropy
//! - [`callbacks`] — early stopping, LR schedules, CSV logging, checkpoints
//! - [`distributed`] — `Coordinator` abstraction and gradient all-reduce
//! - [`metrics`] — top-k accuracy
//!
//! ## Usage
//!
//! ```ignore
//! use dctflow::prelude::*;
//!
//! let paths = DataPaths::from_env()?;
//! let mut config = TrainingConfig::new(paths, ChromaLayout::Concatenated);
//! config.prepare_training_generators()?;
//! config.add_csv_logger("results.csv", ',', true);
//! ```

pub mod callbacks;
pub mod config;
pub mod distributed;
pub mod metrics;
pub mod optim;

/// Re-export the data pipeline.
pub use dctflow_data as data;

pub use dctflow_data::{Error, Result};

/// Everything a training script needs.
pub mod prelude {
    pub use crate::callbacks::{
        Callback, CallbackList, CsvLogger, EarlyStopping, EpochRecord, ModelCheckpoint,
        ReduceLrOnPlateau, TerminateOnNaN, TrainState,
    };
    pub use crate::config::{DataPaths, NetworkSpec, OptimizerSpec, TrainingConfig};
    pub use crate::distributed::{AllReduceOp, Coordinator, ProcessGroup};
    pub use crate::metrics::{default_metrics, top_k_accuracy, Metric};
    pub use crate::optim::{categorical_crossentropy, Loss, Sgd};
    pub use dctflow_data::{
        Batch, BatchGenerator, ChromaLayout, CoefficientGenerator, DummyGenerator, Error,
        GeneratorConfig, PixelGenerator, Result,
    };
}
