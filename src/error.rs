//! App error type for the frame engine and sidecar commands.
//!
//! Only faults live here. Recoverable outcomes (no candidates, empty page, invalid selection)
//! are modelled as outcome enums in `session` and never surface as `AppError`.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    FfmpegNotFound(String),

    #[error("FFmpeg failed (code {code}): {stderr}")]
    FfmpegFailed { code: i32, stderr: String },

    #[error("Could not open video: {0}")]
    SourceUnavailable(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl AppError {
    pub fn ffmpeg_failed(code: i32, stderr: impl Into<String>) -> Self {
        Self::FfmpegFailed {
            code,
            stderr: stderr.into(),
        }
    }

    pub fn source_unavailable(detail: impl Into<String>) -> Self {
        Self::SourceUnavailable(detail.into())
    }

    /// Whether the error must abort the current request. Everything else is
    /// recovered at the component boundary.
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::ResourceExhausted(_) => true,
            AppError::Io(e) => is_exhaustion(e),
            AppError::Image(image::ImageError::IoError(e)) => is_exhaustion(e),
            _ => false,
        }
    }

    /// Promotes disk-full / out-of-memory I/O errors to `ResourceExhausted`.
    pub fn classify_io(e: io::Error) -> Self {
        if is_exhaustion(&e) {
            AppError::ResourceExhausted(e.to_string())
        } else {
            AppError::Io(e)
        }
    }
}

pub(crate) fn is_exhaustion(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::StorageFull | io::ErrorKind::OutOfMemory | io::ErrorKind::QuotaExceeded
    )
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::FfmpegFailed {
            code: -1,
            stderr: s,
        }
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_string_is_spawn_failure() {
        let e = AppError::from("some error message");
        match &e {
            AppError::FfmpegFailed { code, stderr } => {
                assert_eq!(*code, -1);
                assert_eq!(stderr, "some error message");
            }
            _ => panic!("expected FfmpegFailed"),
        }
    }

    #[test]
    fn disk_full_is_fatal() {
        let e = AppError::classify_io(io::Error::from(io::ErrorKind::StorageFull));
        assert!(matches!(e, AppError::ResourceExhausted(_)));
        assert!(e.is_fatal());
    }

    #[test]
    fn missing_file_is_not_fatal() {
        let e = AppError::classify_io(io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(e, AppError::Io(_)));
        assert!(!e.is_fatal());
        assert!(!AppError::source_unavailable("nope").is_fatal());
    }
}
