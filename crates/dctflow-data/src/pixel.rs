// Pixel-domain generator — legacy path that skips the DCT adapter
//
// Decodes the stored file straight to pixel planes with the image codec (no
// augmentation pipeline, no re-encode) and truncates to the target window.
// Grayscale sources have their single plane replicated into all three
// channels.

use std::path::Path;

use image::DynamicImage;
use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::error::{Error, Result};
use crate::generator::{Batch, BatchGenerator};
use crate::index::{ClassIndex, ImageIndex};
use crate::tensor::CoeffTensor;

/// Batch generator producing `[B, H, W, 3]` pixel tensors.
pub struct PixelGenerator {
    class_index: ClassIndex,
    image_index: ImageIndex,
    /// Output window `(height, width)`; sources are truncated, not resized.
    image_shape: (usize, usize),
    batch_size: usize,
    shuffle: bool,
    batches_per_epoch: usize,
    order: Vec<usize>,
}

impl PixelGenerator {
    pub fn new(
        data_directory: impl AsRef<Path>,
        index_file: impl AsRef<Path>,
        image_shape: (usize, usize),
        batch_size: usize,
        shuffle: bool,
    ) -> Result<Self> {
        let class_index = ClassIndex::load(index_file)?;
        let image_index = ImageIndex::scan(data_directory)?;

        let samples = image_index.len();
        if samples < batch_size {
            return Err(Error::EmptyEpoch {
                samples,
                batch_size,
            });
        }

        let mut generator = Self {
            class_index,
            image_index,
            image_shape,
            batch_size,
            shuffle,
            batches_per_epoch: samples / batch_size,
            order: (0..samples).collect(),
        };
        generator.on_epoch_end();
        Ok(generator)
    }

    /// Decode one file into `[H, W, 3]`, replicating a grayscale plane.
    fn load_pixels(&self, sample: usize) -> Result<CoeffTensor> {
        let path = &self.image_index.images()[sample];
        let img = image::open(path).map_err(|e| Error::ImageDecode {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let (h, w) = self.image_shape;
        let grayscale = matches!(
            img,
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_)
        );
        let rgb = img.to_rgb8();
        let (src_w, src_h) = rgb.dimensions();
        if (src_w as usize) < w || (src_h as usize) < h {
            return Err(Error::ImageDecode {
                path: path.clone(),
                reason: format!("source {src_w}x{src_h} smaller than target window {w}x{h}"),
            });
        }

        let mut tensor = CoeffTensor::zeros(vec![h, w, 3]);
        let data = tensor.data_mut();
        for row in 0..h {
            for col in 0..w {
                let p = rgb.get_pixel(col as u32, row as u32).0;
                let base = (row * w + col) * 3;
                if grayscale {
                    // to_rgb8 already replicated the plane, but keep the
                    // single-component semantics explicit.
                    data[base] = p[0] as i32;
                    data[base + 1] = p[0] as i32;
                    data[base + 2] = p[0] as i32;
                } else {
                    data[base] = p[0] as i32;
                    data[base + 1] = p[1] as i32;
                    data[base + 2] = p[2] as i32;
                }
            }
        }
        Ok(tensor)
    }
}

impl BatchGenerator for PixelGenerator {
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

        let (h, w) = self.image_shape;
        let mut pixels = CoeffTensor::zeros(vec![self.batch_size, h, w, 3]);
        let mut labels = CoeffTensor::zeros(vec![self.batch_size, self.num_classes()]);

        for (i, &sample) in window.iter().enumerate() {
            let tensor = self.load_pixels(sample)?;
            pixels.write_slice0(i, tensor.data());
            let class = self
                .class_index
                .class_of(self.image_index.synset_of(sample)?)?;
            labels.data_mut()[i * self.num_classes() + class] = 1;
        }

        Ok(Batch {
            inputs: vec![pixels],
            labels,
        })
    }

    fn on_epoch_end(&mut self) {
        if self.shuffle {
            self.order.shuffle(&mut thread_rng());
        }
    }
}
