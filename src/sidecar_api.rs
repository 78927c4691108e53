use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::AppError;
use crate::extract::ExtractionReport;
use crate::ffmpeg::discovery::{get_ffmpeg_path, get_ffprobe_path};
use crate::ffmpeg::{
    DEFAULT_MAX_AGE, create_work_dir, default_work_root, path_to_string, reap_stale_work_dirs,
    remove_work_dir,
};
use crate::registry::SessionRegistry;
use crate::selection::InvalidSelection;
use crate::session::{EmptyReason, PageOutcome, PageView, SelectionOutcome, StartOutcome};
use crate::video::FfmpegVideo;

pub type SidecarProgressEmitter = Arc<dyn Fn(SessionProgressPayload) + Send + Sync>;

const PROTOCOL_VERSION: u8 = 1;
const NO_SESSION_MESSAGE: &str = "❌ Session expired. Please send the video again.";

static SESSIONS: LazyLock<SessionRegistry> = LazyLock::new(SessionRegistry::new);

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgressPayload {
    pub session_id: String,
    pub step: &'static str,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppCapabilitiesResult {
    pub protocol_version: u8,
    pub ffmpeg_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffprobe_path: Option<String>,
    pub methods: &'static [&'static str],
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResult {
    pub session_id: String,
    pub message: String,
    pub outcome: StartOutcome,
}

#[derive(Debug, serde::Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PageResult {
    Shown { view: PageView, message: String },
    Empty { reason: EmptyReason, message: String },
    NoSession { message: String },
}

impl From<PageOutcome> for PageResult {
    fn from(outcome: PageOutcome) -> Self {
        let message = outcome.message().to_string();
        match outcome {
            PageOutcome::Shown(view) => PageResult::Shown { view, message },
            PageOutcome::Empty { reason } => PageResult::Empty { reason, message },
        }
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SelectResult {
    Delivered {
        files: Vec<String>,
        missing: Vec<String>,
        message: String,
    },
    InvalidSelection {
        reason: InvalidSelection,
        message: String,
    },
    PageNotShown { message: String },
    NotAwaiting { message: String },
    NoSession { message: String },
}

fn emit(emitter: Option<&SidecarProgressEmitter>, session_id: &str, step: &'static str) {
    if let Some(emit) = emitter {
        emit(SessionProgressPayload {
            session_id: session_id.to_string(),
            step,
        });
    }
}

/// Reaper age from `SHARP_FRAMES_MAX_AGE_SECS`, falling back to the default.
pub fn configured_max_age() -> Duration {
    std::env::var("SHARP_FRAMES_MAX_AGE_SECS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_MAX_AGE)
}

pub fn app_capabilities() -> Result<AppCapabilitiesResult, AppError> {
    let ffmpeg_path = path_to_string(get_ffmpeg_path()?);
    let ffprobe_path = get_ffprobe_path().ok().map(|p| path_to_string(&p));
    Ok(AppCapabilitiesResult {
        protocol_version: PROTOCOL_VERSION,
        ffmpeg_path,
        ffprobe_path,
        methods: &[
            "app.capabilities",
            "session.start",
            "session.page",
            "session.select",
            "session.clear",
            "workdir.create",
            "workdir.reap",
        ],
    })
}

/// Analyzes a video for `session_id` and shows its first page. Without
/// `work_dir` a fresh directory under the work root is used.
pub fn session_start(
    session_id: String,
    video_path: PathBuf,
    work_dir: Option<PathBuf>,
    config: EngineConfig,
    event_emitter: Option<SidecarProgressEmitter>,
) -> Result<StartResult, AppError> {
    let work_dir = match work_dir {
        Some(dir) => dir,
        None => create_work_dir(&default_work_root()).map_err(AppError::classify_io)?,
    };
    emit(event_emitter.as_ref(), &session_id, "analyzing");

    let outcome = match FfmpegVideo::open(&video_path) {
        Ok(video) => SESSIONS.start(&session_id, Box::new(video), work_dir, &config)?,
        Err(AppError::SourceUnavailable(detail)) => {
            log::warn!(
                target: "sharp_frames::sidecar",
                "Session {}: {}",
                session_id,
                detail
            );
            SESSIONS.clear(&session_id);
            remove_work_dir(&work_dir);
            StartOutcome::SourceUnavailable {
                report: ExtractionReport {
                    source_opened: false,
                    frames_decoded: 0,
                    frames_retained: 0,
                    elapsed: Duration::ZERO,
                },
            }
        }
        Err(e) => {
            remove_work_dir(&work_dir);
            return Err(e);
        }
    };

    emit(event_emitter.as_ref(), &session_id, "complete");
    Ok(StartResult {
        session_id,
        message: outcome.message().to_string(),
        outcome,
    })
}

pub fn session_page(session_id: &str, page: usize) -> Result<PageResult, AppError> {
    Ok(match SESSIONS.show_page(session_id, page)? {
        Some(outcome) => outcome.into(),
        None => PageResult::NoSession {
            message: NO_SESSION_MESSAGE.to_string(),
        },
    })
}

/// Resolves a reply. Delivered files are handed to the caller, who sends
/// them; the directory is left for the reaper.
pub fn session_select(session_id: &str, text: &str) -> SelectResult {
    let Some(outcome) = SESSIONS.resolve_selection(session_id, text) else {
        return SelectResult::NoSession {
            message: NO_SESSION_MESSAGE.to_string(),
        };
    };
    let message = outcome.message().to_string();
    match outcome {
        SelectionOutcome::Delivered(delivery) => {
            let (files, missing): (Vec<PathBuf>, Vec<PathBuf>) =
                delivery.into_paths().into_iter().partition(|p| p.is_file());
            if !missing.is_empty() {
                log::warn!(
                    target: "sharp_frames::sidecar",
                    "Session {}: {} selected files already gone",
                    session_id,
                    missing.len()
                );
            }
            SelectResult::Delivered {
                files: files.iter().map(path_to_string).collect(),
                missing: missing.iter().map(path_to_string).collect(),
                message,
            }
        }
        SelectionOutcome::Invalid { reason } => SelectResult::InvalidSelection { reason, message },
        SelectionOutcome::PageNotShown => SelectResult::PageNotShown { message },
        SelectionOutcome::NotAwaiting => SelectResult::NotAwaiting { message },
    }
}

pub fn session_clear(session_id: &str) -> bool {
    SESSIONS.clear(session_id)
}

pub fn workdir_create() -> Result<String, AppError> {
    let dir = create_work_dir(&default_work_root()).map_err(AppError::classify_io)?;
    Ok(path_to_string(&dir))
}

pub fn workdir_reap(max_age: Option<Duration>) -> Vec<String> {
    reap_in(&default_work_root(), max_age.unwrap_or_else(configured_max_age))
}

fn reap_in(root: &Path, max_age: Duration) -> Vec<String> {
    reap_stale_work_dirs(root, max_age)
        .iter()
        .map(path_to_string)
        .collect()
}

pub fn cleanup_startup(max_age: Duration) {
    let removed = reap_in(&default_work_root(), max_age);
    if !removed.is_empty() {
        log::info!(
            target: "sharp_frames::sidecar",
            "Removed {} stale working directories at startup",
            removed.len()
        );
    }
}

pub fn cleanup_on_exit() {
    SESSIONS.clear_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn missing_video_is_source_unavailable_and_removes_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).expect("mkdir");

        let result = session_start(
            "sidecar-missing".to_string(),
            dir.path().join("nope.mp4"),
            Some(work_dir.clone()),
            EngineConfig::default(),
            None,
        )
        .expect("start");
        assert!(matches!(
            result.outcome,
            StartOutcome::SourceUnavailable { .. }
        ));
        assert_eq!(result.message, "❌ Could not analyze video.");
        assert!(!work_dir.exists());

        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["outcome"]["status"], "sourceUnavailable");
        assert_eq!(json["sessionId"], "sidecar-missing");
    }

    #[test]
    #[serial]
    fn unknown_session_reports_no_session() {
        let page = session_page("sidecar-nobody", 0).expect("page");
        let json = serde_json::to_value(&page).expect("serialize");
        assert_eq!(json["status"], "noSession");

        let select = serde_json::to_value(session_select("sidecar-nobody", "1")).expect("serialize");
        assert_eq!(select["status"], "noSession");
        assert!(!session_clear("sidecar-nobody"));
    }

    #[test]
    fn page_outcome_serializes_with_message() {
        let result = PageResult::from(PageOutcome::Empty {
            reason: EmptyReason::BeyondEnd,
        });
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["status"], "empty");
        assert_eq!(json["reason"]["kind"], "beyondEnd");
        assert_eq!(json["message"], "⚠️ No more frames available.");
    }

    #[test]
    fn unreadable_page_serializes_next_action() {
        let result = PageResult::from(PageOutcome::Empty {
            reason: EmptyReason::NothingDecoded {
                has_more: true,
                next_action: Some("page_1".to_string()),
            },
        });
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["status"], "empty");
        assert_eq!(json["reason"]["kind"], "nothingDecoded");
        assert_eq!(json["reason"]["hasMore"], true);
        assert_eq!(json["reason"]["nextAction"], "page_1");
    }

    #[test]
    fn invalid_selection_serializes_reason() {
        let result = SelectResult::InvalidSelection {
            reason: InvalidSelection::NoNumbers,
            message: InvalidSelection::NoNumbers.message().to_string(),
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["status"], "invalidSelection");
        assert_eq!(json["reason"], "noNumbers");
    }

    #[test]
    fn reap_in_reports_removed_dirs() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = create_work_dir(root.path()).expect("create");
        std::thread::sleep(Duration::from_millis(20));
        let removed = reap_in(root.path(), Duration::from_millis(1));
        assert_eq!(removed, vec![path_to_string(&dir)]);
        assert!(!dir.exists());
    }
}
