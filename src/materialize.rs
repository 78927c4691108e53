//! Writes chosen frames to disk as JPEG files, in time order.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

use crate::candidate::{CandidateList, FrameIndex, Score, ScoreOrder};
use crate::config::DEFAULT_JPEG_QUALITY;
use crate::error::AppError;
use crate::video::VideoSource;

/// One saved frame as shown to the user.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayedFrame {
    pub path: PathBuf,
    pub score: Score,
    pub frame_index: FrameIndex,
}

/// Frames that were saved (ascending frame index) and those that were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Materialized {
    pub frames: Vec<DisplayedFrame>,
    pub skipped: Vec<FrameIndex>,
}

impl Materialized {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// File name for a frame; unique per frame index within one video.
pub fn frame_file_name(index: FrameIndex) -> String {
    format!("frame_{}.jpg", index)
}

#[derive(Debug, Clone, Copy)]
pub struct FrameMaterializer {
    jpeg_quality: u8,
}

impl Default for FrameMaterializer {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameMaterializer {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Decodes each candidate and saves it under `out_dir`. Frames that fail
    /// to decode or write are skipped; only resource exhaustion is an error.
    pub fn materialize(
        &self,
        video: &dyn VideoSource,
        candidates: &CandidateList<ScoreOrder>,
        out_dir: &Path,
    ) -> Result<Materialized, AppError> {
        let timeline = candidates.to_time_order();
        let mut result = Materialized::default();
        if timeline.is_empty() {
            return Ok(result);
        }

        if let Err(e) = fs::create_dir_all(out_dir) {
            let err = AppError::classify_io(e);
            if err.is_fatal() {
                return Err(err);
            }
            log::warn!(
                target: "sharp_frames::materialize",
                "Could not create {}: {}",
                out_dir.display(),
                err
            );
        }

        let mut decoded: HashMap<FrameIndex, RgbImage> =
            match video.frames_at(&timeline.frame_indices()) {
                Ok(frames) => frames
                    .into_iter()
                    .filter_map(|(index, frame)| frame.map(|f| (index, f)))
                    .collect(),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!(
                        target: "sharp_frames::materialize",
                        "Indexed decode of {} failed: {}",
                        video.label(),
                        e
                    );
                    HashMap::new()
                }
            };

        for candidate in &timeline {
            let Some(frame) = decoded.remove(&candidate.frame_index) else {
                log::debug!(
                    target: "sharp_frames::materialize",
                    "Frame {} did not decode, skipping",
                    candidate.frame_index
                );
                result.skipped.push(candidate.frame_index);
                continue;
            };
            let path = out_dir.join(frame_file_name(candidate.frame_index));
            match self.write_jpeg(&frame, &path) {
                Ok(()) => result.frames.push(DisplayedFrame {
                    path,
                    score: candidate.score,
                    frame_index: candidate.frame_index,
                }),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!(
                        target: "sharp_frames::materialize",
                        "Could not write {}: {}",
                        path.display(),
                        e
                    );
                    result.skipped.push(candidate.frame_index);
                }
            }
        }

        log::debug!(
            target: "sharp_frames::materialize",
            "Saved {} frames to {}, skipped {:?}",
            result.frames.len(),
            out_dir.display(),
            result.skipped
        );
        Ok(result)
    }

    fn write_jpeg(&self, frame: &RgbImage, path: &Path) -> Result<(), AppError> {
        let file = File::create(path).map_err(AppError::classify_io)?;
        let mut writer = BufWriter::new(file);
        let encoder = JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality);
        frame.write_with_encoder(encoder)?;
        writer.flush().map_err(AppError::classify_io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Candidate;
    use crate::test_support::{SyntheticVideo, checkerboard_rgb};

    fn video(frames: u64) -> SyntheticVideo {
        SyntheticVideo::new((0..frames).map(|_| checkerboard_rgb(24, 16, 4)).collect())
    }

    fn ranked(pairs: &[(u64, f64)]) -> CandidateList<ScoreOrder> {
        CandidateList::from_unsorted(pairs.iter().map(|&(i, s)| Candidate::new(i, s)).collect())
    }

    #[test]
    fn saves_frames_in_time_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("page");
        let result = FrameMaterializer::default()
            .materialize(&video(50), &ranked(&[(30, 90.0), (4, 80.0), (17, 70.0)]), &out)
            .expect("materialize");

        let indices: Vec<u64> = result.frames.iter().map(|f| f.frame_index).collect();
        assert_eq!(indices, vec![4, 17, 30]);
        assert!(result.skipped.is_empty());
        assert_eq!(result.frames[0].score, 80.0);
        for frame in &result.frames {
            assert!(frame.path.is_file());
            assert_eq!(
                frame.path.file_name().and_then(|n| n.to_str()),
                Some(frame_file_name(frame.frame_index).as_str())
            );
            let reloaded = image::open(&frame.path).expect("decode jpeg");
            assert_eq!((reloaded.width(), reloaded.height()), (24, 16));
        }
    }

    #[test]
    fn undecodable_frames_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = video(20).with_unseekable([5]);
        let result = FrameMaterializer::default()
            .materialize(&source, &ranked(&[(5, 90.0), (12, 80.0), (99, 70.0)]), dir.path())
            .expect("materialize");
        let indices: Vec<u64> = result.frames.iter().map(|f| f.frame_index).collect();
        assert_eq!(indices, vec![12]);
        assert_eq!(result.skipped, vec![5, 99]);
    }

    #[test]
    fn unwritable_directory_skips_instead_of_failing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").expect("write blocker");
        let result = FrameMaterializer::default()
            .materialize(&video(10), &ranked(&[(1, 90.0), (8, 80.0)]), &blocker.join("page"))
            .expect("materialize");
        assert!(result.is_empty());
        assert_eq!(result.skipped, vec![1, 8]);
    }

    #[test]
    fn empty_candidate_list_touches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("never");
        let result = FrameMaterializer::default()
            .materialize(&video(3), &CandidateList::empty(), &out)
            .expect("materialize");
        assert!(result.is_empty());
        assert!(!out.exists());
    }
}
