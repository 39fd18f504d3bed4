// Pixel augmentations — random photometric transforms
//
// All augmentations operate in place on interleaved 8-bit RGB buffers, before
// the image is re-encoded to JPEG.  The pipeline shuffles the augmentation
// order and applies each with independent probability 0.5 per sample.

use image::RgbImage;
use rand::{thread_rng, Rng};
use rand_distr::{Distribution, Normal};

/// A photometric transform applied in place to an RGB pixel buffer.
pub trait PixelAugment: Send + Sync {
    /// Short identifier, used in diagnostics.
    fn name(&self) -> &'static str;

    /// Apply the transform, mutating the image in place.
    fn apply(&self, image: &mut RgbImage);
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

// Brightness

/// Add a uniform random delta in `[-max_delta, +max_delta]` to every channel.
#[derive(Debug, Clone)]
pub struct Brightness {
    pub max_delta: f32,
}

impl Brightness {
    pub fn new(max_delta: f32) -> Self {
        Self { max_delta }
    }
}

impl PixelAugment for Brightness {
    fn name(&self) -> &'static str {
        "brightness"
    }

    fn apply(&self, image: &mut RgbImage) {
        let delta = thread_rng().gen_range(-self.max_delta..=self.max_delta);
        for p in image.pixels_mut() {
            for c in &mut p.0 {
                *c = clamp_u8(*c as f32 + delta);
            }
        }
    }
}

// Contrast

/// Scale every channel around the image mean: `x' = mean + (x - mean) * f`
/// with `f` drawn uniformly from `[1 - max_factor, 1 + max_factor]`.
#[derive(Debug, Clone)]
pub struct Contrast {
    pub max_factor: f32,
}

impl Contrast {
    pub fn new(max_factor: f32) -> Self {
        Self { max_factor }
    }
}

impl PixelAugment for Contrast {
    fn name(&self) -> &'static str {
        "contrast"
    }

    fn apply(&self, image: &mut RgbImage) {
        let factor = thread_rng().gen_range(1.0 - self.max_factor..=1.0 + self.max_factor);
        let raw = image.as_raw();
        let mean = raw.iter().map(|&v| v as f64).sum::<f64>() / raw.len().max(1) as f64;
        let mean = mean as f32;
        for p in image.pixels_mut() {
            for c in &mut p.0 {
                *c = clamp_u8(mean + (*c as f32 - mean) * factor);
            }
        }
    }
}

// Saturation

/// Blend each pixel with its luma: `x' = gray + (x - gray) * f`.
///
/// `f = 0` is fully desaturated, `f = 1` is the identity.
#[derive(Debug, Clone)]
pub struct Saturation {
    pub max_factor: f32,
}

impl Saturation {
    pub fn new(max_factor: f32) -> Self {
        Self { max_factor }
    }
}

impl PixelAugment for Saturation {
    fn name(&self) -> &'static str {
        "saturation"
    }

    fn apply(&self, image: &mut RgbImage) {
        let factor = thread_rng().gen_range(1.0 - self.max_factor..=1.0 + self.max_factor);
        for p in image.pixels_mut() {
            let [r, g, b] = p.0;
            let gray = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            p.0 = [
                clamp_u8(gray + (r as f32 - gray) * factor),
                clamp_u8(gray + (g as f32 - gray) * factor),
                clamp_u8(gray + (b as f32 - gray) * factor),
            ];
        }
    }
}

// Lighting

/// Per-channel Gaussian color cast: each of R, G, B is shifted by an
/// independent draw from `N(0, std_dev)` applied to the whole plane.
#[derive(Debug, Clone)]
pub struct Lighting {
    pub std_dev: f32,
}

impl Lighting {
    pub fn new(std_dev: f32) -> Self {
        Self { std_dev }
    }
}

impl PixelAugment for Lighting {
    fn name(&self) -> &'static str {
        "lighting"
    }

    fn apply(&self, image: &mut RgbImage) {
        let normal = match Normal::new(0.0f32, self.std_dev) {
            Ok(n) => n,
            Err(_) => return, // zero/negative std: identity
        };
        let mut rng = thread_rng();
        let shift = [
            normal.sample(&mut rng),
            normal.sample(&mut rng),
            normal.sample(&mut rng),
        ];
        for p in image.pixels_mut() {
            for (c, s) in p.0.iter_mut().zip(shift.iter()) {
                *c = clamp_u8(*c as f32 + s);
            }
        }
    }
}

/// The default augmentation set used for training generators.
pub fn default_augmentations() -> Vec<Box<dyn PixelAugment>> {
    vec![
        Box::new(Lighting::new(10.0)),
        Box::new(Contrast::new(0.3)),
        Box::new(Brightness::new(32.0)),
        Box::new(Saturation::new(0.5)),
    ]
}

// Tests
