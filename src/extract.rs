//! Candidate extraction: decode every frame, score it, keep the sharp ones.

use std::time::{Duration, Instant};

use image::GrayImage;
use rayon::prelude::*;

use crate::candidate::{Candidate, CandidateList, FrameIndex, ScoreOrder};
use crate::config::EngineConfig;
use crate::scorer::FrameScorer;
use crate::video::VideoSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    /// False when the source could not be opened for decoding at all.
    pub source_opened: bool,
    pub frames_decoded: u64,
    pub frames_retained: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub candidates: CandidateList<ScoreOrder>,
    pub report: ExtractionReport,
}

#[derive(Debug, Clone, Copy)]
pub struct CandidateExtractor {
    scorer: FrameScorer,
    score_floor: f64,
    batch_size: usize,
}

impl Default for CandidateExtractor {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl CandidateExtractor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            scorer: FrameScorer::new(config.effective_center_weight()),
            score_floor: config.effective_score_floor(),
            batch_size: config.effective_scoring_batch(),
        }
    }

    /// Scores every decodable frame and returns those above the floor in score
    /// order. A source that cannot be opened yields an empty list.
    pub fn extract(&self, video: &dyn VideoSource) -> Extraction {
        let started = Instant::now();
        let frames = match video.luma_frames() {
            Ok(frames) => frames,
            Err(e) => {
                log::warn!(
                    target: "sharp_frames::extract",
                    "Could not open {} for decoding: {}",
                    video.label(),
                    e
                );
                return Extraction {
                    candidates: CandidateList::empty(),
                    report: ExtractionReport {
                        source_opened: false,
                        frames_decoded: 0,
                        frames_retained: 0,
                        elapsed: started.elapsed(),
                    },
                };
            }
        };

        let mut retained = Vec::new();
        let mut batch: Vec<(FrameIndex, GrayImage)> = Vec::with_capacity(self.batch_size);
        let mut decoded: FrameIndex = 0;
        for frame in frames {
            batch.push((decoded, frame));
            decoded += 1;
            if batch.len() == self.batch_size {
                retained.extend(self.score_batch(&batch));
                batch.clear();
            }
        }
        retained.extend(self.score_batch(&batch));

        let candidates = CandidateList::from_unsorted(retained);
        let report = ExtractionReport {
            source_opened: true,
            frames_decoded: decoded,
            frames_retained: candidates.len(),
            elapsed: started.elapsed(),
        };
        log::info!(
            target: "sharp_frames::extract",
            "Scored {} frames of {}, kept {} above {:.1} in {:?}",
            report.frames_decoded,
            video.label(),
            report.frames_retained,
            self.score_floor,
            report.elapsed
        );
        Extraction { candidates, report }
    }

    fn score_batch(&self, batch: &[(FrameIndex, GrayImage)]) -> Vec<Candidate> {
        batch
            .par_iter()
            .filter_map(|(index, frame)| {
                let score = self.scorer.score(frame);
                (score > self.score_floor).then(|| Candidate::new(*index, score))
            })
            .collect()
    }
}
