//! Per-conversation pagination and selection state.
//!
//! A session is created once a video has been analyzed and holds the full
//! score-ordered candidate list. Pages are materialized on demand into the
//! session's working directory and numbered `1..k` in time order; a selection
//! resolves only against the page currently displayed.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::candidate::{CandidateList, FrameIndex, ScoreOrder};
use crate::config::EngineConfig;
use crate::diversity;
use crate::error::AppError;
use crate::extract::{CandidateExtractor, ExtractionReport};
use crate::ffmpeg::remove_work_dir;
use crate::materialize::{DisplayedFrame, FrameMaterializer};
use crate::selection::{InvalidSelection, parse_selection};
use crate::video::VideoSource;

static PAGE_ACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^page_(\d+)$").expect("invalid page action regex"));

/// Action token offered for the page after `page`.
pub fn page_action(page: usize) -> String {
    format!("page_{}", page)
}

/// Parses a `page_<n>` action token.
pub fn parse_page_action(action: &str) -> Option<usize> {
    PAGE_ACTION_RE
        .captures(action.trim())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    AwaitingPage,
    PageDisplayed,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberedFrame {
    /// 1-based number the user replies with.
    pub number: usize,
    #[serde(flatten)]
    pub frame: DisplayedFrame,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub page: usize,
    pub frames: Vec<NumberedFrame>,
    pub has_more: bool,
    /// Frames of this page that failed to decode or write.
    pub skipped: Vec<FrameIndex>,
    pub caption: String,
    pub next_action: Option<String>,
}

impl PageView {
    fn new(
        page: usize,
        page_size: usize,
        frames: Vec<DisplayedFrame>,
        skipped: Vec<FrameIndex>,
        has_more: bool,
    ) -> Self {
        let first_rank = page * page_size + 1;
        let caption = format!(
            "Showing frames {}-{} (ranked by quality).\nReply with numbers 1 to {} to download high-res.",
            first_rank,
            first_rank + frames.len() - 1,
            frames.len()
        );
        let frames = frames
            .into_iter()
            .enumerate()
            .map(|(i, frame)| NumberedFrame {
                number: i + 1,
                frame,
            })
            .collect();
        Self {
            page,
            frames,
            has_more,
            skipped,
            caption,
            next_action: has_more.then(|| page_action(page + 1)),
        }
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn next_page_action(&self) -> Option<&str> {
        self.next_action.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(
    tag = "kind",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum EmptyReason {
    /// The page lies past the end of the candidate list.
    BeyondEnd,
    /// The page had candidates but none of them could be saved. Later pages
    /// may still hold readable frames.
    NothingDecoded {
        has_more: bool,
        next_action: Option<String>,
    },
}

impl EmptyReason {
    fn nothing_decoded(page: usize, has_more: bool) -> Self {
        EmptyReason::NothingDecoded {
            has_more,
            next_action: has_more.then(|| page_action(page + 1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PageOutcome {
    Shown(PageView),
    Empty { reason: EmptyReason },
}

impl PageOutcome {
    pub fn message(&self) -> &str {
        match self {
            PageOutcome::Shown(view) => view.caption(),
            PageOutcome::Empty {
                reason: EmptyReason::BeyondEnd,
            } => "⚠️ No more frames available.",
            PageOutcome::Empty {
                reason: EmptyReason::NothingDecoded { has_more: true, .. },
            } => "⚠️ Frames on this page could not be read. More frames are on the next page.",
            PageOutcome::Empty {
                reason: EmptyReason::NothingDecoded { has_more: false, .. },
            } => "⚠️ Frames on this page could not be read.",
        }
    }

    /// Action token for the page after this one, if there is one.
    pub fn next_page_action(&self) -> Option<&str> {
        match self {
            PageOutcome::Shown(view) => view.next_page_action(),
            PageOutcome::Empty {
                reason: EmptyReason::NothingDecoded { next_action, .. },
            } => next_action.as_deref(),
            PageOutcome::Empty { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum StartOutcome {
    #[serde(rename_all = "camelCase")]
    Ready {
        candidate_count: usize,
        report: ExtractionReport,
        first_page: PageOutcome,
    },
    SourceUnavailable { report: ExtractionReport },
    NoCandidates { report: ExtractionReport },
}

impl StartOutcome {
    pub fn message(&self) -> &str {
        match self {
            StartOutcome::Ready { first_page, .. } => first_page.message(),
            StartOutcome::SourceUnavailable { .. } => "❌ Could not analyze video.",
            StartOutcome::NoCandidates { .. } => "❌ No sharp frames found.",
        }
    }
}

#[derive(Debug)]
pub enum SelectionOutcome {
    Delivered(Delivery),
    Invalid { reason: InvalidSelection },
    /// Candidates exist but no page could be displayed yet.
    PageNotShown,
    NotAwaiting,
}

impl SelectionOutcome {
    pub fn message(&self) -> &str {
        match self {
            SelectionOutcome::Delivered(_) => "✅ Done! Send another video to start again.",
            SelectionOutcome::Invalid { reason } => reason.message(),
            SelectionOutcome::PageNotShown => {
                "⚠️ No frames are on display yet. Open the next page to choose."
            }
            SelectionOutcome::NotAwaiting => {
                "Please send a video first, or the frame numbers you want (e.g., '1, 3')."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub sent: Vec<PathBuf>,
    pub failed: Vec<DeliveryFailure>,
}

/// Files picked by the user, in the order they were named. The session is
/// already cleared when a `Delivery` exists; it owns the working directory.
#[derive(Debug)]
pub struct Delivery {
    files: Vec<DisplayedFrame>,
    work_dir: PathBuf,
}

impl Delivery {
    pub fn files(&self) -> &[DisplayedFrame] {
        &self.files
    }

    /// Reads each file and hands its bytes to `send`. A file that cannot be
    /// read or sent is recorded and the rest still go out. The working
    /// directory is removed afterwards.
    pub fn send_each<F>(self, mut send: F) -> DeliveryReport
    where
        F: FnMut(&DisplayedFrame, Vec<u8>) -> Result<(), AppError>,
    {
        let mut report = DeliveryReport::default();
        for frame in &self.files {
            let outcome = std::fs::read(&frame.path)
                .map_err(AppError::from)
                .and_then(|bytes| send(frame, bytes));
            match outcome {
                Ok(()) => report.sent.push(frame.path.clone()),
                Err(e) => {
                    log::warn!(
                        target: "sharp_frames::session",
                        "Delivery of {} failed: {}",
                        frame.path.display(),
                        e
                    );
                    report.failed.push(DeliveryFailure {
                        path: frame.path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        remove_work_dir(&self.work_dir);
        report
    }

    /// Hands the files over without cleanup; the caller or the reaper owns them now.
    pub fn into_paths(self) -> Vec<PathBuf> {
        self.files.into_iter().map(|f| f.path).collect()
    }
}

pub struct Session {
    id: String,
    video: Box<dyn VideoSource>,
    work_dir: PathBuf,
    page_size: usize,
    materializer: FrameMaterializer,
    candidates: CandidateList<ScoreOrder>,
    current_page: Option<usize>,
    displayed: Vec<DisplayedFrame>,
    awaiting_selection: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("video", &self.video.label())
            .field("work_dir", &self.work_dir)
            .field("candidates", &self.candidates.len())
            .field("current_page", &self.current_page)
            .field("displayed", &self.displayed.len())
            .field("awaiting_selection", &self.awaiting_selection)
            .finish()
    }
}

impl Session {
    /// Analyzes `video` and, when it yields candidates, shows the first page.
    /// The returned session is `Some` only for `StartOutcome::Ready`; otherwise
    /// `work_dir` has already been removed.
    pub fn start(
        id: impl Into<String>,
        video: Box<dyn VideoSource>,
        work_dir: PathBuf,
        config: &EngineConfig,
    ) -> Result<(StartOutcome, Option<Session>), AppError> {
        let id = id.into();
        let extraction = CandidateExtractor::new(config).extract(video.as_ref());
        let report = extraction.report;
        if !report.source_opened {
            remove_work_dir(&work_dir);
            return Ok((StartOutcome::SourceUnavailable { report }, None));
        }
        let candidates = diversity::filter(&extraction.candidates, config.effective_min_distance());
        if candidates.is_empty() {
            log::info!(
                target: "sharp_frames::session",
                "Session {}: no sharp frames in {}",
                id,
                video.label()
            );
            remove_work_dir(&work_dir);
            return Ok((StartOutcome::NoCandidates { report }, None));
        }

        log::info!(
            target: "sharp_frames::session",
            "Session {}: {} candidates after diversity filter",
            id,
            candidates.len()
        );
        let mut session = Session {
            id,
            video,
            work_dir,
            page_size: config.effective_page_size(),
            materializer: FrameMaterializer::new(config.effective_jpeg_quality()),
            candidates,
            current_page: None,
            displayed: Vec::new(),
            awaiting_selection: false,
        };
        let first_page = match session.show_page(0) {
            Ok(page) => page,
            Err(e) => {
                session.teardown();
                return Err(e);
            }
        };
        let outcome = StartOutcome::Ready {
            candidate_count: session.candidates.len(),
            report,
            first_page,
        };
        Ok((outcome, Some(session)))
    }

    pub fn candidates(&self) -> &CandidateList<ScoreOrder> {
        &self.candidates
    }

    pub fn current_page(&self) -> Option<usize> {
        self.current_page
    }

    pub fn displayed(&self) -> &[DisplayedFrame] {
        &self.displayed
    }

    pub fn is_awaiting_selection(&self) -> bool {
        self.awaiting_selection
    }

    pub fn state(&self) -> SessionState {
        if self.awaiting_selection {
            SessionState::PageDisplayed
        } else if !self.candidates.is_empty() {
            SessionState::AwaitingPage
        } else {
            SessionState::Idle
        }
    }

    /// Materializes page `page`. An empty page leaves the session untouched.
    pub fn show_page(&mut self, page: usize) -> Result<PageOutcome, AppError> {
        let slice = self.candidates.page(page, self.page_size);
        if slice.is_empty() {
            return Ok(PageOutcome::Empty {
                reason: EmptyReason::BeyondEnd,
            });
        }

        let materialized =
            self.materializer
                .materialize(self.video.as_ref(), &slice, &self.work_dir)?;
        let has_more = self.candidates.has_page_after(page, self.page_size);
        if materialized.is_empty() {
            log::warn!(
                target: "sharp_frames::session",
                "Session {}: none of the {} frames on page {} could be saved",
                self.id,
                slice.len(),
                page
            );
            return Ok(PageOutcome::Empty {
                reason: EmptyReason::nothing_decoded(page, has_more),
            });
        }

        self.displayed = materialized.frames.clone();
        self.current_page = Some(page);
        self.awaiting_selection = true;
        log::debug!(
            target: "sharp_frames::session",
            "Session {}: showing page {} ({} frames, more={})",
            self.id,
            page,
            self.displayed.len(),
            has_more
        );
        Ok(PageOutcome::Shown(PageView::new(
            page,
            self.page_size,
            materialized.frames,
            materialized.skipped,
            has_more,
        )))
    }

    /// Resolves free text against the displayed page. A valid pick clears the
    /// session and hands its files (and working directory) to the `Delivery`.
    pub fn resolve_selection(&mut self, text: &str) -> SelectionOutcome {
        if !self.awaiting_selection {
            if !self.candidates.is_empty() {
                return SelectionOutcome::PageNotShown;
            }
            return SelectionOutcome::NotAwaiting;
        }
        let picks = match parse_selection(text, self.displayed.len()) {
            Ok(picks) => picks,
            Err(reason) => return SelectionOutcome::Invalid { reason },
        };
        let files = picks.iter().map(|&i| self.displayed[i].clone()).collect();
        log::info!(
            target: "sharp_frames::session",
            "Session {}: delivering positions {:?}",
            self.id,
            picks
        );
        self.reset();
        SelectionOutcome::Delivered(Delivery {
            files,
            work_dir: self.work_dir.clone(),
        })
    }

    fn reset(&mut self) {
        self.candidates = CandidateList::empty();
        self.displayed.clear();
        self.current_page = None;
        self.awaiting_selection = false;
    }

    /// Drops all state and removes the working directory.
    pub fn teardown(&mut self) {
        self.reset();
        remove_work_dir(&self.work_dir);
    }
}
