// DCT coefficient adapter — JPEG bytes → block-DCT planes
//
// Turns an in-memory JPEG into the three coefficient planes a DCT-domain
// classifier consumes:
//
//   y:  [H/8,  W/8,  64]   luma blocks
//   cb: [H/16, W/16, 64]   chroma blocks (4:2:0 geometry)
//   cr: [H/16, W/16, 64]
//
// Entropy decoding is the image codec's job; this adapter converts the decoded
// RGB planes to JFIF YCbCr, box-averages the chroma planes 2x2, and applies the
// level-shifted orthonormal 8x8 forward DCT per block.  For a baseline JPEG the
// result matches the stream's dequantized coefficients up to IDCT rounding.
//
// Coefficients are stored row-major within each block, DC at index 0, and
// rounded to i32.

use crate::error::{Error, Result};
use crate::tensor::CoeffTensor;

/// Input dimensions must be multiples of this for the 4:2:0 block geometry.
const BLOCK_MULTIPLE: u32 = 16;

/// The three coefficient planes of one image.
#[derive(Debug, Clone)]
pub struct DctCoefficients {
    /// Luma blocks, shape `[H/8, W/8, 64]`.
    pub y: CoeffTensor,
    /// Blue-difference chroma blocks, shape `[H/16, W/16, 64]`.
    pub cb: CoeffTensor,
    /// Red-difference chroma blocks, shape `[H/16, W/16, 64]`.
    pub cr: CoeffTensor,
}

/// Decode a JPEG byte buffer into DCT coefficient planes.
///
/// Fails if the buffer is not a decodable JPEG or if the decoded dimensions
/// are not multiples of 16.
pub fn decode_to_coefficients(jpeg: &[u8]) -> Result<DctCoefficients> {
    let img = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
        .map_err(|e| Error::msg(format!("jpeg decode failed: {e}")))?;
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    if w % BLOCK_MULTIPLE != 0 || h % BLOCK_MULTIPLE != 0 {
        return Err(Error::UnsupportedGeometry {
            width: w,
            height: h,
            multiple: BLOCK_MULTIPLE,
        });
    }

    let (w, h) = (w as usize, h as usize);
    let raw = rgb.as_raw();

    // RGB → JFIF YCbCr, full-resolution planes.
    let npix = w * h;
    let mut y_plane = vec![0.0f32; npix];
    let mut cb_plane = vec![0.0f32; npix];
    let mut cr_plane = vec![0.0f32; npix];
    for i in 0..npix {
        let r = raw[i * 3] as f32;
        let g = raw[i * 3 + 1] as f32;
        let b = raw[i * 3 + 2] as f32;
        y_plane[i] = 0.299 * r + 0.587 * g + 0.114 * b;
        cb_plane[i] = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
        cr_plane[i] = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    }

    // 4:2:0 chroma subsampling by 2x2 box average.
    let (cw, ch) = (w / 2, h / 2);
    let cb_sub = subsample_2x2(&cb_plane, w, h);
    let cr_sub = subsample_2x2(&cr_plane, w, h);

    Ok(DctCoefficients {
        y: block_dct_plane(&y_plane, w, h),
        cb: block_dct_plane(&cb_sub, cw, ch),
        cr: block_dct_plane(&cr_sub, cw, ch),
    })
}

fn subsample_2x2(plane: &[f32], w: usize, h: usize) -> Vec<f32> {
    let (cw, ch) = (w / 2, h / 2);
    let mut out = vec![0.0f32; cw * ch];
    for by in 0..ch {
        for bx in 0..cw {
            let (x, y) = (bx * 2, by * 2);
            out[by * cw + bx] = 0.25
                * (plane[y * w + x]
                    + plane[y * w + x + 1]
                    + plane[(y + 1) * w + x]
                    + plane[(y + 1) * w + x + 1]);
        }
    }
    out
}

/// Transform a full plane into `[h/8, w/8, 64]` block coefficients.
fn block_dct_plane(plane: &[f32], w: usize, h: usize) -> CoeffTensor {
    let (bw, bh) = (w / 8, h / 8);
    let mut data = vec![0i32; bh * bw * 64];
    let mut block = [0.0f32; 64];
    for by in 0..bh {
        for bx in 0..bw {
            for row in 0..8 {
                for col in 0..8 {
                    block[row * 8 + col] = plane[(by * 8 + row) * w + bx * 8 + col] - 128.0;
                }
            }
            let coeffs = forward_block_dct(&block);
            let base = (by * bw + bx) * 64;
            for (k, &c) in coeffs.iter().enumerate() {
                data[base + k] = c.round() as i32;
            }
        }
    }
    CoeffTensor::new(data, vec![bh, bw, 64])
}

/// Orthonormal 8x8 forward DCT-II (the JPEG transform).
///
/// `F(u,v) = 1/4 C(u) C(v) Σ f(x,y) cos((2x+1)uπ/16) cos((2y+1)vπ/16)`
pub fn forward_block_dct(block: &[f32; 64]) -> [f32; 64] {
    // cos((2x+1) u π / 16), precomputed once.
    static COS: std::sync::OnceLock<[[f32; 8]; 8]> = std::sync::OnceLock::new();
    let cos = COS.get_or_init(|| {
        let mut t = [[0.0f32; 8]; 8];
        for (u, row) in t.iter_mut().enumerate() {
            for (x, v) in row.iter_mut().enumerate() {
                *v = (((2 * x + 1) as f32) * (u as f32) * std::f32::consts::PI / 16.0).cos();
            }
        }
        t
    });

    let c = |u: usize| if u == 0 { std::f32::consts::FRAC_1_SQRT_2 } else { 1.0 };

    let mut out = [0.0f32; 64];
    for u in 0..8 {
        for v in 0..8 {
            let mut acc = 0.0f32;
            for x in 0..8 {
                for y in 0..8 {
                    acc += block[x * 8 + y] * cos[u][x] * cos[v][y];
                }
            }
            out[u * 8 + v] = 0.25 * c(u) * c(v) * acc;
        }
    }
    out
}

// Tests
