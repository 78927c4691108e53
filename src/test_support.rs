//! In-memory fixtures shared by unit tests and integration test targets.

use std::collections::HashSet;

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::candidate::FrameIndex;
use crate::error::AppError;
use crate::video::{LumaFrames, VideoSource};

pub fn uniform(width: u32, height: u32, value: u8) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([value]))
}

/// Alternating black/white squares of `block` pixels.
pub fn checkerboard(width: u32, height: u32, block: u32) -> GrayImage {
    let block = block.max(1);
    GrayImage::from_fn(width, height, |x, y| {
        if ((x / block) + (y / block)) % 2 == 0 {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

pub fn uniform_rgb(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
}

pub fn checkerboard_rgb(width: u32, height: u32, block: u32) -> RgbImage {
    let gray = checkerboard(width, height, block);
    RgbImage::from_fn(width, height, |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Rgb([v, v, v])
    })
}

/// A video held in memory. Individual frames can be marked as failing on
/// indexed decode, and the whole source can be made unopenable.
#[derive(Debug, Clone, Default)]
pub struct SyntheticVideo {
    frames: Vec<RgbImage>,
    unseekable: HashSet<FrameIndex>,
    unopenable: bool,
}

impl SyntheticVideo {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }

    /// `frame_count` uniform gray frames, except where `sharp` returns true,
    /// which get a checkerboard.
    pub fn with_sharp_frames(
        frame_count: u64,
        width: u32,
        height: u32,
        sharp: impl Fn(FrameIndex) -> bool,
    ) -> Self {
        let frames = (0..frame_count)
            .map(|i| {
                if sharp(i) {
                    checkerboard_rgb(width, height, 4)
                } else {
                    uniform_rgb(width, height, 96)
                }
            })
            .collect();
        Self::new(frames)
    }

    pub fn unopenable() -> Self {
        Self {
            unopenable: true,
            ..Self::default()
        }
    }

    pub fn with_unseekable(mut self, indices: impl IntoIterator<Item = FrameIndex>) -> Self {
        self.unseekable.extend(indices);
        self
    }
}

impl VideoSource for SyntheticVideo {
    fn luma_frames(&self) -> Result<LumaFrames<'_>, AppError> {
        if self.unopenable {
            return Err(AppError::source_unavailable("synthetic source is unopenable"));
        }
        Ok(Box::new(
            self.frames
                .iter()
                .map(|frame| image::DynamicImage::ImageRgb8(frame.clone()).to_luma8()),
        ))
    }

    fn frame_at(&self, index: FrameIndex) -> Result<Option<RgbImage>, AppError> {
        if self.unopenable {
            return Err(AppError::source_unavailable("synthetic source is unopenable"));
        }
        if self.unseekable.contains(&index) {
            return Ok(None);
        }
        Ok(usize::try_from(index)
            .ok()
            .and_then(|i| self.frames.get(i))
            .cloned())
    }

    fn label(&self) -> String {
        format!("synthetic({} frames)", self.frames.len())
    }
}
