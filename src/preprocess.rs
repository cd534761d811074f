//! Frame preprocessing.
//!
//! Turns a captured `Frame` into the `[1, H, W, 3]` float tensor an
//! inference engine consumes:
//! 1. Resize to the engine's input size with area averaging
//! 2. Scale channel values into `[0, 1]`
//! 3. Add the leading batch axis
//!
//! `transform` is pure: identical inputs always produce identical tensors.

use ndarray::Array4;

use crate::error::{PipelineError, PipelineResult};
use crate::frame::{Frame, InputSize, RGB_CHANNELS};

/// NHWC model input, batch size 1.
pub type InputTensor = Array4<f32>;

/// Resize, normalize and batch a frame for inference.
pub fn transform(frame: &Frame, target: InputSize) -> PipelineResult<InputTensor> {
    if frame.is_empty() {
        return Err(PipelineError::InvalidFrame(format!(
            "frame has zero size ({}x{})",
            frame.width(),
            frame.height()
        )));
    }
    if target.is_empty() {
        return Err(PipelineError::InvalidFrame(format!(
            "target size {} has a zero dimension",
            target
        )));
    }

    let resized = resize_area(
        frame.pixels(),
        frame.width() as usize,
        frame.height() as usize,
        target.width as usize,
        target.height as usize,
    );
    log::debug!(
        "resized frame {}x{} -> {}",
        frame.width(),
        frame.height(),
        target
    );

    let data: Vec<f32> = resized
        .into_iter()
        .map(|v| (v / 255.0).clamp(0.0, 1.0) as f32)
        .collect();

    Array4::from_shape_vec(
        (
            1,
            target.height as usize,
            target.width as usize,
            RGB_CHANNELS,
        ),
        data,
    )
    .map_err(|e| PipelineError::InvalidFrame(format!("tensor shape mismatch: {}", e)))
}

/// Source pixels contributing to one destination pixel along an axis,
/// with their coverage weights.
type Footprint = Vec<(usize, f64)>;

/// Coverage weights for every destination index along one axis.
///
/// Destination pixel `d` covers the source interval `[d * s, (d + 1) * s)`
/// with `s = src / dst`. Each overlapping source pixel is weighted by the
/// length of its overlap; weights are normalized to sum to 1.
fn axis_footprints(src: usize, dst: usize) -> Vec<Footprint> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|d| {
            let start = d as f64 * scale;
            let end = ((d + 1) as f64 * scale).min(src as f64);
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).clamp(first + 1, src);

            let mut footprint: Footprint = (first..last)
                .map(|s| {
                    let lo = start.max(s as f64);
                    let hi = end.min((s + 1) as f64);
                    (s, (hi - lo).max(0.0))
                })
                .filter(|(_, w)| *w > 0.0)
                .collect();

            let total: f64 = footprint.iter().map(|(_, w)| w).sum();
            if total > 0.0 {
                for (_, w) in footprint.iter_mut() {
                    *w /= total;
                }
            } else {
                footprint = vec![(first.min(src - 1), 1.0)];
            }
            footprint
        })
        .collect()
}

/// Area-averaging resize of packed RGB24 pixels. Returns `f64` channel
/// values in the original `[0, 255]` range, row-major.
fn resize_area(
    pixels: &[u8],
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<f64> {
    let xs = axis_footprints(src_w, dst_w);
    let ys = axis_footprints(src_h, dst_h);

    // Horizontal pass: src_h rows of dst_w pixels.
    let mut rows = vec![0.0f64; src_h * dst_w * RGB_CHANNELS];
    for y in 0..src_h {
        let src_row = &pixels[y * src_w * RGB_CHANNELS..(y + 1) * src_w * RGB_CHANNELS];
        for (dx, footprint) in xs.iter().enumerate() {
            let out = (y * dst_w + dx) * RGB_CHANNELS;
            for &(sx, w) in footprint {
                for c in 0..RGB_CHANNELS {
                    rows[out + c] += w * src_row[sx * RGB_CHANNELS + c] as f64;
                }
            }
        }
    }

    // Vertical pass.
    let mut out = vec![0.0f64; dst_h * dst_w * RGB_CHANNELS];
    for (dy, footprint) in ys.iter().enumerate() {
        for &(sy, w) in footprint {
            let src_row = &rows[sy * dst_w * RGB_CHANNELS..(sy + 1) * dst_w * RGB_CHANNELS];
            let dst_row = &mut out[dy * dst_w * RGB_CHANNELS..(dy + 1) * dst_w * RGB_CHANNELS];
            for (o, s) in dst_row.iter_mut().zip(src_row) {
                *o += w * s;
            }
        }
    }

    out
}
