// Batch generators — epoch-aware, random-access batch assembly
//
// A generator owns the shuffled sample order and produces one batch per call:
// the training loop asks for `num_batches()` per epoch, fetches batches by
// index (modulo-wrapped), and calls `on_epoch_end()` to reshuffle.
//
// Bookkeeping invariants:
//   - num_batches = floor(samples / batch_size); the trailing remainder is
//     silently dropped every epoch
//   - get_batch(num_batches * k + j) returns the same window as get_batch(j)
//   - on_epoch_end() permutes the sample order in place, same multiset

use std::fmt;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::thread_rng;
use rayon::prelude::*;

use crate::dct::{decode_to_coefficients, DctCoefficients};
use crate::error::{Error, Result};
use crate::index::{ClassIndex, ImageIndex};
use crate::pipeline::SamplePipeline;
use crate::tensor::CoeffTensor;

/// One batch: model input tensors plus a one-hot `[B, num_classes]` label
/// matrix.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: Vec<CoeffTensor>,
    pub labels: CoeffTensor,
}

/// The boundary contract consumed by the training loop: length query, indexed
/// batch fetch, and an epoch-end reshuffle hook.
pub trait BatchGenerator: Send {
    /// Usable batches per epoch.
    fn num_batches(&self) -> usize;

    /// Samples per batch.
    fn batch_size(&self) -> usize;

    /// Width of the one-hot label rows.
    fn num_classes(&self) -> usize;

    /// Assemble the batch at `index` (wrapped modulo `num_batches()`).
    fn get_batch(&self, index: usize) -> Result<Batch>;

    /// Epoch boundary: reshuffle the sample order when shuffling is enabled.
    fn on_epoch_end(&mut self);
}

/// How chroma planes are packed into model inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaLayout {
    /// One tensor with Cb and Cr concatenated on the channel axis:
    /// `[B, L/16, L/16, 128]`.
    Concatenated,
    /// Two independent `[B, L/16, L/16, 64]` tensors.
    Separate,
}

/// Settings shared by the coefficient generators.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub batch_size: usize,
    pub shuffle: bool,
    pub scale: bool,
    pub target_length: u32,
    pub flip: bool,
    /// Per-sample fetch parallelism inside one batch (0 = sequential).
    pub workers: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: true,
            scale: true,
            target_length: 224,
            flip: true,
            workers: 0,
        }
    }
}

impl GeneratorConfig {
    pub fn batch_size(mut self, b: usize) -> Self {
        self.batch_size = b;
        self
    }

    pub fn shuffle(mut self, s: bool) -> Self {
        self.shuffle = s;
        self
    }

    pub fn scale(mut self, s: bool) -> Self {
        self.scale = s;
        self
    }

    pub fn target_length(mut self, l: u32) -> Self {
        self.target_length = l;
        self
    }

    pub fn flip(mut self, f: bool) -> Self {
        self.flip = f;
        self
    }

    pub fn workers(mut self, w: usize) -> Self {
        self.workers = w;
        self
    }
}

/// DCT-domain batch generator over an ImageNet-style directory tree.
///
/// Per sample: pipeline (load, augment, JPEG re-encode) → coefficient adapter
/// → pack into the batch tensors according to the chroma layout.  The label is
/// resolved from the sample's parent-folder synset at fetch time.
pub struct CoefficientGenerator {
    class_index: ClassIndex,
    image_index: ImageIndex,
    pipeline: SamplePipeline,
    layout: ChromaLayout,
    batch_size: usize,
    shuffle: bool,
    workers: usize,
    batches_per_epoch: usize,
    /// Shuffled sample order, permuted in place at epoch boundaries.
    order: Vec<usize>,
}

impl fmt::Debug for CoefficientGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoefficientGenerator")
            .field("layout", &self.layout)
            .field("batch_size", &self.batch_size)
            .field("shuffle", &self.shuffle)
            .field("workers", &self.workers)
            .field("batches_per_epoch", &self.batches_per_epoch)
            .finish_non_exhaustive()
    }
}

impl CoefficientGenerator {
    /// Build a generator over `data_directory` with labels from `index_file`.
    pub fn new(
        data_directory: impl AsRef<Path>,
        index_file: impl AsRef<Path>,
        layout: ChromaLayout,
        config: GeneratorConfig,
        augmentations: Vec<Box<dyn crate::augment::PixelAugment>>,
    ) -> Result<Self> {
        let class_index = ClassIndex::load(index_file)?;
        let image_index = ImageIndex::scan(data_directory)?;

        let samples = image_index.len();
        if samples < config.batch_size {
            return Err(Error::EmptyEpoch {
                samples,
                batch_size: config.batch_size,
            });
        }

        let pipeline = SamplePipeline::new(config.target_length, config.scale, config.flip)
            .with_augmentations(augmentations);

        let mut generator = Self {
            class_index,
            image_index,
            pipeline,
            layout,
            batch_size: config.batch_size,
            shuffle: config.shuffle,
            workers: config.workers,
            batches_per_epoch: samples / config.batch_size,
            order: (0..samples).collect(),
        };
        // Match the construction-time shuffle of the epoch hook.
        generator.on_epoch_end();
        Ok(generator)
    }

    /// Total samples in the index (including the dropped remainder).
    pub fn num_samples(&self) -> usize {
        self.image_index.len()
    }

    /// The current sample visitation order.
    pub fn sample_order(&self) -> &[usize] {
        &self.order
    }

    pub fn layout(&self) -> ChromaLayout {
        self.layout
    }

    /// Whether `on_epoch_end()` reshuffles the sample order.
    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle
    }

    /// Whether the pipeline applies the 50% horizontal flip.
    pub fn flip_enabled(&self) -> bool {
        self.pipeline.flip()
    }

    /// Luma blocks per side at the configured target length.
    fn luma_blocks(&self) -> usize {
        self.pipeline.target_length() as usize / 8
    }

    /// Chroma blocks per side at the configured target length.
    fn chroma_blocks(&self) -> usize {
        self.pipeline.target_length() as usize / 16
    }

    /// Pipeline + decode for one sample, with the file path attached to any
    /// failure. Returns the coefficient planes and the resolved class id.
    fn fetch_sample(&self, sample: usize) -> Result<(DctCoefficients, usize)> {
        let path: &PathBuf = &self.image_index.images()[sample];
        let jpeg = self.pipeline.process(path)?;
        let planes = decode_to_coefficients(&jpeg).map_err(|e| Error::ImageDecode {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let class = self.class_index.class_of(self.image_index.synset_of(sample)?)?;
        Ok((planes, class))
    }

    fn fetch_window(&self, window: &[usize]) -> Result<Vec<(DctCoefficients, usize)>> {
        if self.workers > 0 && window.len() > 1 {
            window.par_iter().map(|&s| self.fetch_sample(s)).collect()
        } else {
            window.iter().map(|&s| self.fetch_sample(s)).collect()
        }
    }
}

impl BatchGenerator for CoefficientGenerator {
    fn num_batches(&self) -> usize {
        self.batches_per_epoch
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn num_classes(&self) -> usize {
        self.class_index.num_classes()
    }

    fn get_batch(&self, index: usize) -> Result<Batch> {
        let index = index % self.batches_per_epoch;
        let window = &self.order[index * self.batch_size..(index + 1) * self.batch_size];
        let samples = self.fetch_window(window)?;

        let b = self.batch_size;
        let (lb, cb) = (self.luma_blocks(), self.chroma_blocks());
        let mut y = CoeffTensor::zeros(vec![b, lb, lb, 64]);
        let mut labels = CoeffTensor::zeros(vec![b, self.num_classes()]);

        let mut chroma = match self.layout {
            ChromaLayout::Concatenated => vec![CoeffTensor::zeros(vec![b, cb, cb, 128])],
            ChromaLayout::Separate => vec![
                CoeffTensor::zeros(vec![b, cb, cb, 64]),
                CoeffTensor::zeros(vec![b, cb, cb, 64]),
            ],
        };

        for (i, (planes, class)) in samples.iter().enumerate() {
            let path = &self.image_index.images()[window[i]];
            if planes.y.shape() != [lb, lb, 64] {
                return Err(Error::ImageDecode {
                    path: path.clone(),
                    reason: format!(
                        "luma blocks {:?} do not fit [{lb}, {lb}, 64]",
                        planes.y.shape()
                    ),
                });
            }
            y.write_slice0(i, planes.y.data());

            match self.layout {
                ChromaLayout::Concatenated => {
                    // Interleave per block position: 64 Cb channels then 64 Cr.
                    let stride = chroma[0].stride0();
                    let row = &mut chroma[0].data_mut()[i * stride..(i + 1) * stride];
                    for block in 0..cb * cb {
                        row[block * 128..block * 128 + 64]
                            .copy_from_slice(&planes.cb.data()[block * 64..(block + 1) * 64]);
                        row[block * 128 + 64..(block + 1) * 128]
                            .copy_from_slice(&planes.cr.data()[block * 64..(block + 1) * 64]);
                    }
                }
                ChromaLayout::Separate => {
                    chroma[0].write_slice0(i, planes.cb.data());
                    chroma[1].write_slice0(i, planes.cr.data());
                }
            }

            labels.data_mut()[i * self.num_classes() + class] = 1;
        }

        let mut inputs = Vec::with_capacity(1 + chroma.len());
        inputs.push(y);
        inputs.append(&mut chroma);
        Ok(Batch { inputs, labels })
    }

    fn on_epoch_end(&mut self) {
        if self.shuffle {
            self.order.shuffle(&mut thread_rng());
        }
    }
}

/// Zero-filled batches of arbitrary shape, for pipeline smoke tests.
///
/// No dataset on disk, no decoding, no shuffling state.
pub struct DummyGenerator {
    pub num_batches: usize,
    pub batch_size: usize,
    pub num_classes: usize,
    pub image_shape: Vec<usize>,
}

impl DummyGenerator {
    pub fn new(num_batches: usize, batch_size: usize, num_classes: usize, image_shape: Vec<usize>) -> Self {
        Self {
            num_batches,
            batch_size,
            num_classes,
            image_shape,
        }
    }
}

impl BatchGenerator for DummyGenerator {
    fn num_batches(&self) -> usize {
        self.num_batches
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn get_batch(&self, _index: usize) -> Result<Batch> {
        let mut shape = vec![self.batch_size];
        shape.extend_from_slice(&self.image_shape);
        Ok(Batch {
            inputs: vec![CoeffTensor::zeros(shape)],
            labels: CoeffTensor::zeros(vec![self.batch_size, self.num_classes]),
        })
    }

    fn on_epoch_end(&mut self) {}
}
