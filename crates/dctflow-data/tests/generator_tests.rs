// Integration tests for index scanning and batch generation.
//
// Fixture trees are built under the system temp directory:
//
//   <tmp>/dctflow-gen-<pid>-<name>/
//     index.json
//     data/
//       n01/ img0.jpg ...
//       n02/ ...

use std::fs;
use std::path::PathBuf;

use image::{DynamicImage, Rgb, RgbImage};

use dctflow_data::{
    BatchGenerator, ChromaLayout, ClassIndex, CoefficientGenerator, DummyGenerator, Error,
    GeneratorConfig, ImageIndex, PixelGenerator,
};

struct Fixture {
    root: PathBuf,
    data: PathBuf,
    index_file: PathBuf,
}

impl Fixture {
    /// Build a tree with the given `(synset, image_count)` folders and a class
    /// index assigning ids in the order the synsets are listed.
    fn new(name: &str, classes: &[(&str, usize)], img_w: u32, img_h: u32) -> Self {
        let root = std::env::temp_dir().join(format!("dctflow-gen-{}-{name}", std::process::id()));
        fs::remove_dir_all(&root).ok();
        let data = root.join("data");

        let mut entries = Vec::new();
        for (id, (synset, count)) in classes.iter().enumerate() {
            let dir = data.join(synset);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                let img = RgbImage::from_fn(img_w, img_h, |x, y| {
                    Rgb([
                        ((x + i as u32 * 31) % 256) as u8,
                        ((y + id as u32 * 57) % 256) as u8,
                        ((x * y) % 256) as u8,
                    ])
                });
                DynamicImage::ImageRgb8(img)
                    .save_with_format(dir.join(format!("img{i}.jpg")), image::ImageFormat::Jpeg)
                    .unwrap();
            }
            entries.push(format!("\"{id}\": [\"{synset}\", \"class {id}\"]"));
        }

        let index_file = root.join("index.json");
        fs::write(&index_file, format!("{{{}}}", entries.join(", "))).unwrap();

        Fixture {
            root,
            data,
            index_file,
        }
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.root).ok();
    }
}

fn deterministic(batch_size: usize) -> GeneratorConfig {
    GeneratorConfig::default()
        .batch_size(batch_size)
        .shuffle(false)
        .scale(false)
        .flip(false)
        .target_length(32)
}

// Index builder

#[test]
fn index_scan_collects_classes_and_images() {
    let fx = Fixture::new("scan", &[("n01", 2), ("n02", 3)], 40, 40);
    // A stray file at the root must be skipped.
    fs::write(fx.data.join("README.txt"), "not a class").unwrap();

    let index = ImageIndex::scan(&fx.data).unwrap();
    assert_eq!(index.classes(), &["n01".to_string(), "n02".to_string()]);
    assert_eq!(index.len(), 5);
    assert_eq!(index.synset_of(0).unwrap(), "n01");
    assert_eq!(index.synset_of(4).unwrap(), "n02");
    assert!(index.synset_of(5).is_err());
}

#[test]
fn class_index_inverts_the_json_mapping() {
    let fx = Fixture::new("classidx", &[("n01", 1), ("n02", 1)], 40, 40);
    let classes = ClassIndex::load(&fx.index_file).unwrap();
    assert_eq!(classes.num_classes(), 2);
    assert_eq!(classes.class_of("n01").unwrap(), 0);
    assert_eq!(classes.class_of("n02").unwrap(), 1);
    assert!(matches!(
        classes.class_of("n99").unwrap_err(),
        Error::UnknownClass(_)
    ));
}

#[test]
fn class_index_rejects_malformed_json() {
    let path = std::env::temp_dir().join(format!("dctflow-bad-index-{}.json", std::process::id()));
    fs::write(&path, "{\"zero\": [\"n01\"]").unwrap();
    assert!(matches!(
        ClassIndex::load(&path).unwrap_err(),
        Error::MalformedIndex { .. }
    ));
    fs::remove_file(&path).ok();
}

// Batch bookkeeping

#[test]
fn batch_count_drops_the_remainder() {
    let fx = Fixture::new("remainder", &[("n01", 5)], 40, 40);
    let gen = CoefficientGenerator::new(
        &fx.data,
        &fx.index_file,
        ChromaLayout::Concatenated,
        deterministic(2),
        Vec::new(),
    )
    .unwrap();
    assert_eq!(gen.num_samples(), 5);
    assert_eq!(gen.num_batches(), 2); // floor(5 / 2)
}

#[test]
fn batch_index_wraps_modulo_batches_per_epoch() {
    let fx = Fixture::new("wrap", &[("n01", 2), ("n02", 2)], 40, 40);
    let gen = CoefficientGenerator::new(
        &fx.data,
        &fx.index_file,
        ChromaLayout::Concatenated,
        deterministic(2),
        Vec::new(),
    )
    .unwrap();
    assert_eq!(gen.num_batches(), 2);

    // No shuffle, no flip, no augmentation: fetches are deterministic.
    let direct = gen.get_batch(1).unwrap();
    let wrapped = gen.get_batch(2 * 3 + 1).unwrap();
    assert_eq!(direct.labels, wrapped.labels);
    assert_eq!(direct.inputs, wrapped.inputs);
}

#[test]
fn too_few_samples_for_one_batch_is_an_error() {
    let fx = Fixture::new("short", &[("n01", 3)], 40, 40);
    let err = CoefficientGenerator::new(
        &fx.data,
        &fx.index_file,
        ChromaLayout::Concatenated,
        deterministic(4),
        Vec::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::EmptyEpoch { samples: 3, .. }));
}

// Coefficient shapes and labels

#[test]
fn concatenated_layout_shapes() {
    let fx = Fixture::new("concat", &[("n01", 2)], 48, 64);
    let gen = CoefficientGenerator::new(
        &fx.data,
        &fx.index_file,
        ChromaLayout::Concatenated,
        deterministic(2),
        Vec::new(),
    )
    .unwrap();

    let batch = gen.get_batch(0).unwrap();
    assert_eq!(batch.inputs.len(), 2);
    assert_eq!(batch.inputs[0].shape(), &[2, 4, 4, 64]); // 32/8 luma blocks
    assert_eq!(batch.inputs[1].shape(), &[2, 2, 2, 128]); // 32/16 chroma, Cb then Cr
    assert_eq!(batch.labels.shape(), &[2, 1]);
}

#[test]
fn separate_layout_shapes() {
    let fx = Fixture::new("separate", &[("n01", 2)], 64, 48);
    let gen = CoefficientGenerator::new(
        &fx.data,
        &fx.index_file,
        ChromaLayout::Separate,
        deterministic(2),
        Vec::new(),
    )
    .unwrap();

    let batch = gen.get_batch(0).unwrap();
    assert_eq!(batch.inputs.len(), 3);
    assert_eq!(batch.inputs[0].shape(), &[2, 4, 4, 64]);
    assert_eq!(batch.inputs[1].shape(), &[2, 2, 2, 64]);
    assert_eq!(batch.inputs[2].shape(), &[2, 2, 2, 64]);
}

#[test]
fn labels_are_one_hot_per_parent_folder() {
    let fx = Fixture::new("onehot", &[("n01", 2), ("n02", 2)], 40, 40);
    let gen = CoefficientGenerator::new(
        &fx.data,
        &fx.index_file,
        ChromaLayout::Concatenated,
        deterministic(2),
        Vec::new(),
    )
    .unwrap();

    // Unshuffled order is n01, n01, n02, n02.
    for (batch_idx, expected_class) in [(0usize, 0usize), (1, 1)] {
        let batch = gen.get_batch(batch_idx).unwrap();
        for row in 0..2 {
            let labels = batch.labels.slice0(row);
            assert_eq!(labels.iter().sum::<i32>(), 1, "not one-hot: {labels:?}");
            assert_eq!(labels[expected_class], 1);
        }
    }
}

#[test]
fn end_to_end_single_sample_batch() {
    // index {"0": ["n01", "catfish"]}, one image, batch size 1.
    let fx = Fixture::new("single", &[("n01", 1)], 40, 40);
    let gen = CoefficientGenerator::new(
        &fx.data,
        &fx.index_file,
        ChromaLayout::Concatenated,
        deterministic(1),
        Vec::new(),
    )
    .unwrap();

    assert_eq!(gen.num_batches(), 1);
    let batch = gen.get_batch(0).unwrap();
    assert_eq!(batch.labels.data(), &[1]);
    assert_eq!(batch.inputs[0].shape(), &[1, 4, 4, 64]);
    assert_eq!(batch.inputs[1].shape(), &[1, 2, 2, 128]);
}

#[test]
fn unknown_class_folder_fails_at_fetch_time() {
    let fx = Fixture::new("unknown", &[("n01", 1)], 40, 40);
    // A folder whose synset has no index entry: construction succeeds (labels
    // resolve lazily), fetching raises.
    let stray = fx.data.join("n99");
    fs::create_dir_all(&stray).unwrap();
    let img = RgbImage::from_pixel(40, 40, Rgb([1, 2, 3]));
    DynamicImage::ImageRgb8(img)
        .save_with_format(stray.join("img0.jpg"), image::ImageFormat::Jpeg)
        .unwrap();

    let gen = CoefficientGenerator::new(
        &fx.data,
        &fx.index_file,
        ChromaLayout::Concatenated,
        deterministic(2),
        Vec::new(),
    )
    .unwrap();
    assert!(matches!(
        gen.get_batch(0).unwrap_err(),
        Error::UnknownClass(_)
    ));
}

#[test]
fn decode_failure_carries_the_file_path() {
    let fx = Fixture::new("badfile", &[("n01", 1)], 40, 40);
    let bad = fx.data.join("n01").join("corrupt.jpg");
    fs::write(&bad, b"not image data").unwrap();

    let gen = CoefficientGenerator::new(
        &fx.data,
        &fx.index_file,
        ChromaLayout::Concatenated,
        deterministic(2),
        Vec::new(),
    )
    .unwrap();
    let err = gen.get_batch(0).unwrap_err();
    assert!(err.to_string().contains("corrupt.jpg"), "{err}");
}

// Shuffling

#[test]
fn reshuffle_keeps_the_index_multiset() {
    let fx = Fixture::new("shuffle", &[("n01", 12), ("n02", 12)], 24, 24);
    let mut gen = CoefficientGenerator::new(
        &fx.data,
        &fx.index_file,
        ChromaLayout::Concatenated,
        GeneratorConfig::default()
            .batch_size(4)
            .shuffle(true)
            .scale(false)
            .flip(false)
            .target_length(16),
        Vec::new(),
    )
    .unwrap();

    let before: Vec<usize> = gen.sample_order().to_vec();
    let mut changed = false;
    for _ in 0..5 {
        gen.on_epoch_end();
        let mut sorted: Vec<usize> = gen.sample_order().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..24).collect::<Vec<_>>());
        if gen.sample_order() != before.as_slice() {
            changed = true;
            break;
        }
    }
    assert!(changed, "24-element permutation never changed in 5 shuffles");
}

#[test]
fn shuffle_disabled_keeps_order_stable() {
    let fx = Fixture::new("noshuffle", &[("n01", 4)], 24, 24);
    let mut gen = CoefficientGenerator::new(
        &fx.data,
        &fx.index_file,
        ChromaLayout::Concatenated,
        deterministic(2).target_length(16),
        Vec::new(),
    )
    .unwrap();
    let before: Vec<usize> = gen.sample_order().to_vec();
    gen.on_epoch_end();
    assert_eq!(gen.sample_order(), before.as_slice());
}

// Parallel fetch

#[test]
fn worker_fetch_matches_sequential_order() {
    let fx = Fixture::new("workers", &[("n01", 2), ("n02", 2)], 40, 40);
    let build = |workers: usize| {
        CoefficientGenerator::new(
            &fx.data,
            &fx.index_file,
            ChromaLayout::Concatenated,
            deterministic(4).workers(workers),
            Vec::new(),
        )
        .unwrap()
    };
    let sequential = build(0).get_batch(0).unwrap();
    let parallel = build(4).get_batch(0).unwrap();
    assert_eq!(sequential.labels, parallel.labels);
    assert_eq!(sequential.inputs, parallel.inputs);
}

// Pixel-domain generator

#[test]
fn pixel_generator_truncates_and_labels() {
    let fx = Fixture::new("pixel", &[("n01", 2), ("n02", 2)], 48, 48);
    let gen = PixelGenerator::new(&fx.data, &fx.index_file, (32, 32), 2, false).unwrap();

    assert_eq!(gen.num_batches(), 2);
    let batch = gen.get_batch(0).unwrap();
    assert_eq!(batch.inputs[0].shape(), &[2, 32, 32, 3]);
    for row in 0..2 {
        assert_eq!(batch.labels.slice0(row), &[1, 0]);
    }
}

#[test]
fn pixel_generator_replicates_grayscale_channels() {
    let fx = Fixture::new("gray", &[("n01", 1)], 48, 48);
    // Overwrite the sample with a grayscale JPEG.
    let path = fx.data.join("n01").join("img0.jpg");
    let gray = image::GrayImage::from_fn(48, 48, |x, y| image::Luma([((x + y) % 256) as u8]));
    DynamicImage::ImageLuma8(gray)
        .save_with_format(&path, image::ImageFormat::Jpeg)
        .unwrap();

    let gen = PixelGenerator::new(&fx.data, &fx.index_file, (16, 16), 1, false).unwrap();
    let batch = gen.get_batch(0).unwrap();
    let pixels = batch.inputs[0].data();
    for px in pixels.chunks_exact(3) {
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }
}

// Dummy generator

#[test]
fn dummy_generator_produces_zero_batches() {
    let gen = DummyGenerator::new(7, 4, 10, vec![224, 224, 3]);
    assert_eq!(gen.num_batches(), 7);
    let batch = gen.get_batch(3).unwrap();
    assert_eq!(batch.inputs[0].shape(), &[4, 224, 224, 3]);
    assert_eq!(batch.labels.shape(), &[4, 10]);
    assert!(batch.inputs[0].data().iter().all(|&v| v == 0));
}
