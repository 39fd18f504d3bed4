// Integration tests for the run configuration: single-worker defaults,
// multi-worker rescaling, rank gating of output callbacks, and generator
// wiring against a small on-disk fixture.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use image::{DynamicImage, Rgb, RgbImage};

use dctflow::callbacks::TrainState;
use dctflow::config::{DataPaths, OptimizerSpec, TrainingConfig};
use dctflow::distributed::ProcessGroup;
use dctflow::prelude::{BatchGenerator, ChromaLayout};
use dctflow::Error;

fn dummy_paths() -> DataPaths {
    DataPaths::new("/data/train", "/data/val", "/data/index.json", "/out")
}

// Defaults

#[test]
fn single_worker_defaults() {
    let config = TrainingConfig::new(dummy_paths(), ChromaLayout::Concatenated);

    assert_eq!(config.epochs(), 120);
    assert_eq!(config.batch_size(), 256);
    assert_eq!(config.steps_per_epoch(), 5000);
    assert_eq!(config.validation_steps(), 195); // 50000 / 256
    assert_eq!(config.workers(), 4);
    assert_eq!(config.num_classes(), 1000);
    assert_eq!(config.optimizer().lr(), 0.1);
    assert!(matches!(config.optimizer(), OptimizerSpec::Local(_)));
    assert_eq!(
        config.callbacks().names(),
        vec!["terminate_on_nan", "early_stopping"]
    );

    let metric_names: Vec<String> = config.metrics().iter().map(|m| m.name()).collect();
    assert_eq!(metric_names, vec!["acc", "top_5_acc"]);

    assert!(config.multiprocessing());
    assert_eq!(config.loss(), dctflow::optim::Loss::CategoricalCrossentropy);
}

#[test]
fn network_input_shapes_follow_the_layout() {
    let concat = TrainingConfig::new(dummy_paths(), ChromaLayout::Concatenated);
    assert_eq!(
        concat.network().input_shapes,
        vec![[28, 28, 64], [14, 14, 128]]
    );

    let separate = TrainingConfig::new(dummy_paths(), ChromaLayout::Separate)
        .with_target_length(32);
    assert_eq!(
        separate.network().input_shapes,
        vec![[4, 4, 64], [2, 2, 64], [2, 2, 64]]
    );
    assert_eq!(separate.network().num_classes, 1000);
    assert!(separate.network().pretrained);
}

// Distributed rescaling

#[test]
fn eight_workers_divider_four() {
    let mut config = TrainingConfig::new(dummy_paths(), ChromaLayout::Concatenated);
    let group = Arc::new(ProcessGroup::new(0, 8).unwrap());
    config.prepare_distributed(group).unwrap();

    // batch 256 / 4, lr 0.1 * 8 / 4, steps 5000 / (8 / 4), val 3 * 195 / 8
    assert_eq!(config.batch_size(), 64);
    assert!((config.optimizer().lr() - 0.2).abs() < 1e-12);
    assert_eq!(config.steps_per_epoch(), 2500);
    assert_eq!(config.validation_steps(), 73);
    assert!(matches!(config.optimizer(), OptimizerSpec::Distributed(_)));

    assert_eq!(
        config.callbacks().names(),
        vec![
            "broadcast_global_variables",
            "metric_average",
            "lr_warmup",
            "reduce_lr_on_plateau",
            "terminate_on_nan",
            "early_stopping",
        ]
    );
}

#[test]
fn worker_count_must_divide_by_the_batch_divider() {
    let mut config = TrainingConfig::new(dummy_paths(), ChromaLayout::Concatenated);
    let group = Arc::new(ProcessGroup::new(0, 6).unwrap());
    assert!(config.prepare_distributed(group).is_err());
}

#[test]
fn warmup_ramps_from_base_to_scaled_lr() {
    let mut config = TrainingConfig::new(dummy_paths(), ChromaLayout::Concatenated);
    config
        .prepare_distributed(Arc::new(ProcessGroup::new(0, 8).unwrap()))
        .unwrap();

    let mut state = TrainState::new(config.optimizer().lr());
    let callbacks = config.callbacks_mut();
    callbacks.on_train_begin(&mut state).unwrap();

    callbacks.on_epoch_begin(0, &mut state).unwrap();
    assert!((state.lr - 0.12).abs() < 1e-12, "lr = {}", state.lr);
    callbacks.on_epoch_begin(4, &mut state).unwrap();
    assert!((state.lr - 0.2).abs() < 1e-12);
    callbacks.on_epoch_begin(5, &mut state).unwrap();
    assert!((state.lr - 0.2).abs() < 1e-12);
}

// Rank gating

#[test]
fn only_rank_zero_attaches_output_callbacks() {
    let mut config = TrainingConfig::new(dummy_paths(), ChromaLayout::Concatenated);
    config
        .prepare_distributed(Arc::new(ProcessGroup::new(3, 8).unwrap()))
        .unwrap();
    assert_eq!(config.callbacks().len(), 6);

    config.add_csv_logger("results.csv", ',', true);
    config.add_model_checkpoint(true, Box::new(|_| Ok(())));
    assert_eq!(config.callbacks().len(), 6);
}

#[test]
fn rank_zero_attaches_output_callbacks() {
    let mut config = TrainingConfig::new(dummy_paths(), ChromaLayout::Concatenated);
    config
        .prepare_distributed(Arc::new(ProcessGroup::new(0, 8).unwrap()))
        .unwrap();

    config.add_csv_logger("results.csv", ',', true);
    config.add_model_checkpoint(true, Box::new(|_| Ok(())));
    assert_eq!(config.callbacks().len(), 8);
    assert_eq!(config.callbacks().names()[6], "csv_logger");
    assert_eq!(config.callbacks().names()[7], "model_checkpoint");
}

#[test]
fn single_worker_always_attaches_output_callbacks() {
    let mut config = TrainingConfig::new(dummy_paths(), ChromaLayout::Concatenated);
    config.add_csv_logger("results.csv", ',', true);
    assert_eq!(config.callbacks().len(), 3);
}

// Environment resolution

// Both from_env cases live in one test: the harness runs tests in parallel
// and the environment is process-global.
#[test]
fn from_env_joins_the_imagenet_layout() {
    std::env::remove_var("DATASET_PATH_TRAIN");
    std::env::set_var("DATASET_PATH_VAL", "/datasets/b");
    std::env::set_var("PROJECT_PATH", "/project");
    std::env::set_var("EXPERIMENTS_OUTPUT_DIRECTORY", "/experiments");
    assert!(matches!(
        DataPaths::from_env().unwrap_err(),
        Error::MissingEnv("DATASET_PATH_TRAIN")
    ));

    std::env::set_var("DATASET_PATH_TRAIN", "/datasets/a");

    let paths = DataPaths::from_env().unwrap();
    assert_eq!(
        paths.train_directory,
        PathBuf::from("/datasets/a/imagenet/train")
    );
    assert_eq!(
        paths.validation_directory,
        PathBuf::from("/datasets/b/imagenet/validation")
    );
    assert_eq!(
        paths.index_file,
        PathBuf::from("/project/data/imagenet_class_index.json")
    );
    assert_eq!(paths.output_directory, PathBuf::from("/experiments"));
}

// Generator wiring

#[test]
fn prepare_training_generators_builds_both_sides() {
    let root = std::env::temp_dir().join(format!("dctflow-config-{}", std::process::id()));
    fs::remove_dir_all(&root).ok();
    let train = root.join("train");
    let val = root.join("val");
    for (dir, count) in [(&train, 4usize), (&val, 2)] {
        let class_dir = dir.join("n01");
        fs::create_dir_all(&class_dir).unwrap();
        for i in 0..count {
            let img = RgbImage::from_fn(48, 48, |x, y| {
                Rgb([(x % 256) as u8, (y % 256) as u8, (i % 256) as u8])
            });
            DynamicImage::ImageRgb8(img)
                .save_with_format(class_dir.join(format!("img{i}.jpg")), image::ImageFormat::Jpeg)
                .unwrap();
        }
    }
    let index_file = root.join("index.json");
    fs::write(&index_file, "{\"0\": [\"n01\", \"catfish\"]}").unwrap();

    let paths = DataPaths::new(&train, &val, &index_file, root.join("out"));
    let mut config = TrainingConfig::new(paths, ChromaLayout::Separate)
        .with_batch_size(2)
        .with_target_length(32)
        .with_workers(0);
    config.prepare_training_generators().unwrap();

    let train_gen = config.train_generator().unwrap();
    assert_eq!(train_gen.num_batches(), 2);
    assert_eq!(train_gen.batch_size(), 2);

    let val_gen = config.validation_generator().unwrap();
    assert_eq!(val_gen.num_batches(), 1);
    // Validation only drops the rescale/crop and augmentations; shuffling
    // and flipping stay on, as on the training side.
    assert!(val_gen.shuffle_enabled());
    assert!(val_gen.flip_enabled());
    assert!(train_gen.shuffle_enabled());
    assert!(train_gen.flip_enabled());
    let batch = val_gen.get_batch(0).unwrap();
    assert_eq!(batch.inputs.len(), 3);
    assert_eq!(batch.inputs[0].shape(), &[2, 4, 4, 64]);
    assert_eq!(batch.inputs[1].shape(), &[2, 2, 2, 64]);

    fs::remove_dir_all(&root).ok();
}
