//! Center-weighted variance-of-Laplacian sharpness.
//!
//! A sharp static background should not outrank a frame whose (assumed centered)
//! subject is in focus, so the central crop carries most of the weight.

use image::{GrayImage, ImageBuffer, Luma, imageops};

use crate::candidate::Score;
use crate::config::DEFAULT_CENTER_WEIGHT;

/// 3×3 Gaussian, `[1 2 1]ᵀ[1 2 1] / 16`, row-major.
const GAUSSIAN_3X3: [f32; 9] = [1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0];
const GAUSSIAN_NORM: f32 = 16.0;

type LumaF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Debug, Clone, Copy)]
pub struct FrameScorer {
    center_weight: f64,
}

impl Default for FrameScorer {
    fn default() -> Self {
        Self::new(DEFAULT_CENTER_WEIGHT)
    }
}

impl FrameScorer {
    pub fn new(center_weight: f64) -> Self {
        Self {
            center_weight: center_weight.clamp(0.0, 1.0),
        }
    }

    /// Scores a decoded luma frame.
    pub fn score(&self, frame: &GrayImage) -> Score {
        let (w, h) = frame.dimensions();
        if w < 3 || h < 3 {
            return 0.0;
        }
        let smoothed = gaussian_3x3(frame);
        let global_score = laplacian_variance(&smoothed);

        let (cx, cy, cw, ch) = center_region(w, h);
        let center = imageops::crop_imm(&smoothed, cx, cy, cw, ch).to_image();
        let center_score = laplacian_variance(&center);

        self.center_weight * center_score + (1.0 - self.center_weight) * global_score
    }
}

/// Central 50% × 50% window as `(x, y, width, height)`.
fn center_region(w: u32, h: u32) -> (u32, u32, u32, u32) {
    let cw = (w / 2).max(1);
    let ch = (h / 2).max(1);
    ((w - cw) / 2, (h - ch) / 2, cw, ch)
}

/// Smooths with edge pixels replicated; kept in f32 so the Laplacian sees no
/// quantization steps.
fn gaussian_3x3(frame: &GrayImage) -> LumaF32 {
    let (w, h) = frame.dimensions();
    ImageBuffer::from_fn(w, h, |x, y| {
        let mut acc = 0.0f32;
        for (k, weight) in GAUSSIAN_3X3.iter().enumerate() {
            let dx = (k % 3) as i64 - 1;
            let dy = (k / 3) as i64 - 1;
            let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
            let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
            acc += weight * frame.get_pixel(sx, sy)[0] as f32;
        }
        Luma([acc / GAUSSIAN_NORM])
    })
}

/// Variance of the 4-neighbour Laplacian over interior pixels.
fn laplacian_variance(img: &LumaF32) -> f64 {
    let (width, height) = img.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut count = 0u64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = img.get_pixel(x, y)[0] as f64;
            let top = img.get_pixel(x, y - 1)[0] as f64;
            let bottom = img.get_pixel(x, y + 1)[0] as f64;
            let left = img.get_pixel(x - 1, y)[0] as f64;
            let right = img.get_pixel(x + 1, y)[0] as f64;
            let lap = top + bottom + left + right - 4.0 * center;
            sum += lap;
            sum_sq += lap * lap;
            count += 1;
        }
    }

    let n = count as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}
