pub mod candidate;
pub mod config;
pub mod diversity;
pub mod error;
pub mod extract;
pub mod ffmpeg;
pub mod materialize;
pub mod registry;
pub mod scorer;
pub mod selection;
pub mod session;
pub mod sidecar_api;
#[cfg(any(test, feature = "integration-test-api"))]
pub mod test_support;
pub mod video;

pub use candidate::{Candidate, CandidateList, FrameIndex, Score, ScoreOrder, TimeOrder};
pub use config::EngineConfig;
pub use registry::SessionRegistry;
pub use session::{
    Delivery, PageOutcome, PageView, SelectionOutcome, Session, SessionState, StartOutcome,
};
pub use video::{FfmpegVideo, VideoSource};
