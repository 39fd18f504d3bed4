//! # dctflow-data
//!
//! Data loading for DCT-domain image classification.
//!
//! This crate provides:
//! - [`ClassIndex`] / [`ImageIndex`] — one-time scan of an ImageNet-style
//!   class-labeled directory tree plus the synset → class-id JSON mapping
//! - [`SamplePipeline`] — load, scale/crop or resize, flip, photometric
//!   augmentation, and in-memory JPEG re-encode of a single sample
//! - [`decode_to_coefficients`] — JPEG bytes → luma/chroma DCT block planes
//! - [`CoefficientGenerator`] — epoch-aware, random-access batch generator
//!   feeding coefficient tensors and one-hot labels to the training loop
//! - [`PixelGenerator`] — legacy pixel-domain variant
//! - [`DummyGenerator`] — zero-filled batches for smoke tests

pub mod augment;
pub mod dct;
pub mod error;
pub mod generator;
pub mod index;
pub mod pipeline;
pub mod pixel;
pub mod tensor;

pub use augment::{default_augmentations, Brightness, Contrast, Lighting, PixelAugment, Saturation};
pub use dct::{decode_to_coefficients, DctCoefficients};
pub use error::{Error, Result};
pub use generator::{
    Batch, BatchGenerator, ChromaLayout, CoefficientGenerator, DummyGenerator, GeneratorConfig,
};
pub use index::{ClassIndex, ImageIndex};
pub use pipeline::SamplePipeline;
pub use pixel::PixelGenerator;
pub use tensor::CoeffTensor;
