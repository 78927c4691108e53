#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use sharp_frames_core::ffmpeg::ffprobe::{VideoMetadata, get_video_metadata_impl};

pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 240;
pub const RATE: u32 = 30;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VideoKind {
    /// `testsrc` pattern on every frame.
    Busy,
    /// Flat gray on every frame.
    Blank,
    /// Flat gray except frames `first..=last`, which show `testsrc`.
    Burst { first: u32, last: u32 },
}

pub struct IntegrationEnv {
    pub ffmpeg: PathBuf,
    dir: tempfile::TempDir,
}

impl IntegrationEnv {
    pub fn new() -> Self {
        let ffmpeg = sharp_frames_core::ffmpeg::discovery::get_ffmpeg_path()
            .expect("FFmpeg not found")
            .to_path_buf();
        let dir = tempfile::tempdir().expect("tempdir");
        Self { ffmpeg, dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn with_test_video(&self, name: &str, duration_secs: f32, kind: VideoKind) -> PathBuf {
        let output_path = self.path(name);
        let status = create_test_video(&self.ffmpeg, &output_path, duration_secs, kind)
            .expect("failed to create test video");
        assert!(status.success(), "ffmpeg failed to create test video");
        output_path
    }
}

/// A lavfi source spec such as `testsrc` or `color=c=gray`, sized for the tests.
fn source(spec: &str, duration_secs: f32) -> String {
    let sep = if spec.contains('=') { ':' } else { '=' };
    format!(
        "{}{}duration={}:size={}x{}:rate={}",
        spec, sep, duration_secs, WIDTH, HEIGHT, RATE
    )
}

/// Intra-only H.264 so no frame borrows detail from its neighbours.
pub fn create_test_video(
    ffmpeg: &Path,
    output_path: &Path,
    duration_secs: f32,
    kind: VideoKind,
) -> std::io::Result<ExitStatus> {
    let mut args: Vec<String> = vec!["-loglevel".into(), "error".into(), "-y".into()];
    match kind {
        VideoKind::Busy => {
            args.extend(["-f".into(), "lavfi".into(), "-i".into()]);
            args.push(source("testsrc", duration_secs));
        }
        VideoKind::Blank => {
            args.extend(["-f".into(), "lavfi".into(), "-i".into()]);
            args.push(source("color=c=gray", duration_secs));
        }
        VideoKind::Burst { first, last } => {
            args.extend(["-f".into(), "lavfi".into(), "-i".into()]);
            args.push(source("color=c=gray", duration_secs));
            args.extend(["-f".into(), "lavfi".into(), "-i".into()]);
            args.push(source("testsrc", duration_secs));
            args.push("-filter_complex".into());
            args.push(format!(
                "[0:v][1:v]overlay=enable='between(n,{},{})'",
                first, last
            ));
        }
    }
    args.extend(
        [
            "-c:v", "libx264", "-g", "1", "-crf", "12", "-pix_fmt", "yuv420p",
        ]
        .map(String::from),
    );
    args.push(output_path.to_string_lossy().to_string());

    Command::new(ffmpeg)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
}

pub fn metadata(path: &Path) -> VideoMetadata {
    get_video_metadata_impl(path).expect("ffprobe metadata")
}
