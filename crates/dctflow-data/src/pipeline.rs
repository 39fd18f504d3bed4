// Sample pipeline — load, augment, re-encode
//
// One file path in, one in-memory JPEG byte buffer out:
//
//   1. open and force 3-channel RGB
//   2. scale-and-random-crop to target_length², or plain resize
//   3. 50% horizontal flip
//   4. pixel augmentations, shuffled order, each with probability 0.5
//   5. JPEG re-encode into RAM (no disk writes)
//
// Randomness comes from the process-global thread_rng, unseeded per sample;
// run-to-run reproducibility is deliberately not promised.

use std::io::Cursor;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};

use crate::augment::PixelAugment;
use crate::error::{Error, Result};

/// Loader/augmenter for one sample at a time.
pub struct SamplePipeline {
    /// Side length of the square output image.
    target_length: u32,
    /// Aspect-preserving resize + random crop instead of plain resize.
    scale: bool,
    /// Enable the 50% horizontal flip.
    flip: bool,
    /// Photometric augmentations; empty list disables step 4.
    augmentations: Vec<Box<dyn PixelAugment>>,
}

impl SamplePipeline {
    pub fn new(target_length: u32, scale: bool, flip: bool) -> Self {
        Self {
            target_length,
            scale,
            flip,
            augmentations: Vec::new(),
        }
    }

    /// Attach photometric augmentations.
    pub fn with_augmentations(mut self, augmentations: Vec<Box<dyn PixelAugment>>) -> Self {
        self.augmentations = augmentations;
        self
    }

    pub fn target_length(&self) -> u32 {
        self.target_length
    }

    /// Whether the 50% horizontal flip is active.
    pub fn flip(&self) -> bool {
        self.flip
    }

    /// Run the full pipeline for one file, returning JPEG bytes.
    pub fn process(&self, path: &Path) -> Result<Vec<u8>> {
        let img = image::open(path).map_err(|e| Error::ImageDecode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut img = DynamicImage::ImageRgb8(img.to_rgb8());
        img = if self.scale {
            self.scale_and_crop(img)
        } else {
            img.resize_exact(self.target_length, self.target_length, FilterType::Triangle)
        };

        if self.flip && thread_rng().gen::<f64>() > 0.5 {
            img = img.fliph();
        }

        if !self.augmentations.is_empty() {
            let mut rgb = img.to_rgb8();
            let mut order: Vec<usize> = (0..self.augmentations.len()).collect();
            let mut rng = thread_rng();
            order.shuffle(&mut rng);
            for i in order {
                if rng.gen::<f64>() > 0.5 {
                    self.augmentations[i].apply(&mut rgb);
                }
            }
            img = DynamicImage::ImageRgb8(rgb);
        }

        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Jpeg)
            .map_err(|e| Error::ImageDecode {
                path: path.to_path_buf(),
                reason: format!("jpeg re-encode failed: {e}"),
            })?;
        Ok(buf.into_inner())
    }

    /// Resize so the short side equals `target_length`, then take a random
    /// `target_length²` crop along the long axis.
    fn scale_and_crop(&self, img: DynamicImage) -> DynamicImage {
        let target = self.target_length;
        let (width, height) = img.dimensions();
        let min_side = width.min(height).max(1);
        let ratio = target as f64 / min_side as f64;

        let new_w = (width as f64 * ratio).round().max(target as f64) as u32;
        let new_h = (height as f64 * ratio).round().max(target as f64) as u32;
        let img = img.resize_exact(new_w, new_h, FilterType::Triangle);

        let long_side = new_w.max(new_h);
        let offset = thread_rng().gen_range(0..=long_side - target);
        if new_w > new_h {
            img.crop_imm(offset, 0, target, target)
        } else {
            img.crop_imm(0, offset, target, target)
        }
    }
}

// Tests
