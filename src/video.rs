//! Video sources: sequential luma decode for scoring, indexed color decode for saving.

use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};

use crate::candidate::FrameIndex;
use crate::error::AppError;
use crate::ffmpeg::ffprobe::{VideoMetadata, get_video_metadata_impl};
use crate::ffmpeg::{
    RawFrameDecoder, RawPixelFormat, build_decode_args, build_select_filter, log_decoder_exit,
    path_to_string,
};

pub type LumaFrames<'a> = Box<dyn Iterator<Item = GrayImage> + 'a>;

/// A decodable video. Frame indexes are decode positions and stay stable for
/// the lifetime of the source.
pub trait VideoSource: Send {
    /// Decodes every frame from the start, in order. The iterator ends at end of
    /// stream or at the first read failure. `Err` only when decoding cannot start.
    fn luma_frames(&self) -> Result<LumaFrames<'_>, AppError>;

    /// Decodes exactly the frame at `index`. `Ok(None)` when it does not decode.
    fn frame_at(&self, index: FrameIndex) -> Result<Option<RgbImage>, AppError>;

    /// Decodes several frames; the result pairs each requested index with its frame.
    fn frames_at(
        &self,
        indices: &[FrameIndex],
    ) -> Result<Vec<(FrameIndex, Option<RgbImage>)>, AppError> {
        indices
            .iter()
            .map(|&index| Ok((index, self.frame_at(index)?)))
            .collect()
    }

    /// Short label for logs.
    fn label(&self) -> String;
}

/// A video file decoded through an FFmpeg child process.
#[derive(Debug, Clone)]
pub struct FfmpegVideo {
    path: PathBuf,
    meta: VideoMetadata,
}

impl FfmpegVideo {
    /// Probes the file. Anything short of a missing FFmpeg install is reported
    /// as `SourceUnavailable`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(AppError::source_unavailable(format!(
                "{} does not exist",
                path.display()
            )));
        }
        let meta = match get_video_metadata_impl(&path) {
            Ok(meta) => meta,
            Err(e @ AppError::FfmpegNotFound(_)) => return Err(e),
            Err(e) => return Err(AppError::source_unavailable(e.to_string())),
        };
        if !meta.has_video() {
            return Err(AppError::source_unavailable(format!(
                "{} has no video stream",
                path.display()
            )));
        }
        log::debug!(
            target: "sharp_frames::video",
            "Opened {}: {}x{} rotation={} fps={:.2} frames={:?}",
            path.display(),
            meta.width,
            meta.height,
            meta.rotation,
            meta.fps,
            meta.frame_count
        );
        Ok(Self { path, meta })
    }

    fn frame_len(&self, format: RawPixelFormat) -> usize {
        let (w, h) = self.meta.display_dimensions();
        w as usize * h as usize * format.bytes_per_pixel()
    }
}

struct FfmpegLumaFrames {
    decoder: Option<RawFrameDecoder>,
    width: u32,
    height: u32,
    buf: Vec<u8>,
    read: u64,
}

impl FfmpegLumaFrames {
    fn stop(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            log_decoder_exit(decoder, self.read);
        }
    }
}

impl Iterator for FfmpegLumaFrames {
    type Item = GrayImage;

    fn next(&mut self) -> Option<GrayImage> {
        let decoder = self.decoder.as_mut()?;
        match decoder.read_frame(&mut self.buf) {
            Ok(true) => {
                self.read += 1;
                let frame = GrayImage::from_raw(self.width, self.height, self.buf.clone());
                if frame.is_none() {
                    self.stop();
                }
                frame
            }
            Ok(false) => {
                self.stop();
                None
            }
            Err(e) => {
                log::warn!(
                    target: "sharp_frames::video",
                    "Decode stopped after {} frames: {}",
                    self.read,
                    e
                );
                self.stop();
                None
            }
        }
    }
}

impl VideoSource for FfmpegVideo {
    fn luma_frames(&self) -> Result<LumaFrames<'_>, AppError> {
        let format = RawPixelFormat::Gray;
        let args = build_decode_args(&path_to_string(&self.path), None, format);
        let decoder = RawFrameDecoder::spawn(args, self.frame_len(format))?;
        let (width, height) = self.meta.display_dimensions();
        Ok(Box::new(FfmpegLumaFrames {
            decoder: Some(decoder),
            width,
            height,
            buf: Vec::with_capacity(self.frame_len(format)),
            read: 0,
        }))
    }

    fn frame_at(&self, index: FrameIndex) -> Result<Option<RgbImage>, AppError> {
        Ok(self
            .frames_at(&[index])?
            .into_iter()
            .next()
            .and_then(|(_, frame)| frame))
    }

    /// One decoder pass with a `select` filter. Selected frames come out in
    /// ascending order, and every index below the stream length exists, so
    /// frames that never arrive are exactly the trailing ones.
    fn frames_at(
        &self,
        indices: &[FrameIndex],
    ) -> Result<Vec<(FrameIndex, Option<RgbImage>)>, AppError> {
        let mut wanted = indices.to_vec();
        wanted.sort_unstable();
        wanted.dedup();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let format = RawPixelFormat::Rgb24;
        let filter = build_select_filter(&wanted);
        let args = build_decode_args(&path_to_string(&self.path), Some(&filter), format);
        let mut decoder = RawFrameDecoder::spawn(args, self.frame_len(format))?;
        let (width, height) = self.meta.display_dimensions();

        let mut out = Vec::with_capacity(wanted.len());
        let mut buf = Vec::with_capacity(decoder.frame_len());
        let mut read = 0u64;
        let mut exhausted = false;
        for index in wanted {
            let frame = if exhausted {
                None
            } else {
                match decoder.read_frame(&mut buf) {
                    Ok(true) => {
                        read += 1;
                        RgbImage::from_raw(width, height, std::mem::take(&mut buf))
                    }
                    Ok(false) => {
                        exhausted = true;
                        None
                    }
                    Err(e) => {
                        log::warn!(
                            target: "sharp_frames::video",
                            "Seek decode failed at frame {}: {}",
                            index,
                            e
                        );
                        exhausted = true;
                        None
                    }
                }
            };
            out.push((index, frame));
        }
        if read == 0 {
            let (status, stderr) = decoder.finish()?;
            if !status.success() {
                return Err(AppError::ffmpeg_failed(status.code().unwrap_or(-1), stderr));
            }
        } else {
            log_decoder_exit(decoder, read);
        }
        Ok(out)
    }

    fn label(&self) -> String {
        path_to_string(&self.path)
    }
}
