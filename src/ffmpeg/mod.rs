pub mod discovery;
mod error;
pub mod ffprobe;
mod runner;
mod temp;

pub use error::{FfmpegErrorPayload, parse_ffmpeg_error};
pub use runner::{
    RawFrameDecoder, RawPixelFormat, build_decode_args, build_select_filter, log_decoder_exit,
};
pub use temp::{
    DEFAULT_MAX_AGE, create_work_dir, default_work_root, reap_stale_work_dirs, remove_work_dir,
};

/// Path to string for FFmpeg args or logging.
pub fn path_to_string(path: &(impl AsRef<std::path::Path> + ?Sized)) -> String {
    path.as_ref().to_string_lossy().to_string()
}
