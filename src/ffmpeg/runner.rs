//! FFmpeg decoder processes.
//!
//! Spawns FFmpeg as a child process writing `rawvideo` to stdout and reads it one
//! fixed-size frame at a time. A background thread drains stderr into a bounded
//! buffer so the child never blocks on a full pipe.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use parking_lot::Mutex;

use super::discovery::get_ffmpeg_path;
use crate::error::AppError;

/// Keep only the last N bytes of stderr to avoid unbounded memory growth.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Pixel layout requested from FFmpeg's rawvideo muxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawPixelFormat {
    Gray,
    Rgb24,
}

impl RawPixelFormat {
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            RawPixelFormat::Gray => "gray",
            RawPixelFormat::Rgb24 => "rgb24",
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            RawPixelFormat::Gray => 1,
            RawPixelFormat::Rgb24 => 3,
        }
    }
}

/// Decoder arguments shared by sequential decode and indexed extraction.
/// `-fps_mode passthrough` keeps output frames 1:1 with decoded frames so
/// the n-th frame read is decode position n.
pub fn build_decode_args(
    input: &str,
    select_filter: Option<&str>,
    format: RawPixelFormat,
) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-v", "error", "-i", input]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(["-map".into(), "0:v:0".into(), "-an".into(), "-sn".into()]);
    if let Some(filter) = select_filter {
        args.extend(["-vf".into(), filter.to_string()]);
    }
    args.extend([
        "-fps_mode".into(),
        "passthrough".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        format.ffmpeg_name().into(),
        "pipe:1".into(),
    ]);
    args
}

/// `select` filter expression matching exactly the given decode positions.
pub fn build_select_filter(indices: &[u64]) -> String {
    let terms: Vec<String> = indices.iter().map(|i| format!("eq(n\\,{})", i)).collect();
    format!("select={}", terms.join("+"))
}

fn drain_stderr<R: Read + Send + 'static>(
    reader: R,
    buffer: Arc<Mutex<Vec<u8>>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut stream_reader = BufReader::new(reader);
        let mut line_buf = Vec::with_capacity(256);
        while stream_reader.read_until(b'\n', &mut line_buf).unwrap_or(0) > 0 {
            let mut guard = buffer.lock();
            guard.extend_from_slice(&line_buf);
            if guard.len() > MAX_STDERR_BYTES {
                let excess = guard.len() - MAX_STDERR_BYTES;
                guard.drain(..excess);
            }
            drop(guard);
            line_buf.clear();
        }
    })
}

/// A running FFmpeg decoder producing fixed-size raw frames on stdout.
/// Dropping it kills the child.
pub struct RawFrameDecoder {
    child: Option<Child>,
    stdout: ChildStdout,
    stderr_buffer: Arc<Mutex<Vec<u8>>>,
    stderr_handle: Option<thread::JoinHandle<()>>,
    frame_len: usize,
}

impl RawFrameDecoder {
    pub fn spawn(args: Vec<String>, frame_len: usize) -> Result<Self, AppError> {
        let ffmpeg_path = get_ffmpeg_path()?;
        log::debug!(
            target: "sharp_frames::ffmpeg::runner",
            "Spawning FFmpeg decoder: path={}, args={:?}",
            ffmpeg_path.display(),
            args
        );

        let mut cmd = Command::new(ffmpeg_path);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        let mut child = cmd
            .spawn()
            .map_err(|e| format!("Failed to spawn FFmpeg: {}", e))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AppError::from("Failed to capture FFmpeg output"));
        };

        let stderr_buffer = Arc::new(Mutex::new(Vec::new()));
        let stderr_handle = drain_stderr(stderr, Arc::clone(&stderr_buffer));

        Ok(Self {
            child: Some(child),
            stdout,
            stderr_buffer,
            stderr_handle: Some(stderr_handle),
            frame_len,
        })
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Reads the next frame into `buf`. `Ok(false)` on clean end of stream;
    /// a truncated trailing frame is treated as end of stream too.
    pub fn read_frame(&mut self, buf: &mut Vec<u8>) -> io::Result<bool> {
        buf.resize(self.frame_len, 0);
        match self.stdout.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Waits for the child and returns its status plus captured stderr.
    pub fn finish(mut self) -> Result<(ExitStatus, String), AppError> {
        let status = match self.child.take() {
            Some(mut child) => {
                // Unblock a child still writing frames nobody will read.
                if child.try_wait()?.is_none() {
                    let _ = child.kill();
                }
                child.wait()?
            }
            None => return Err(AppError::from("FFmpeg decoder already finished")),
        };
        if let Some(handle) = self.stderr_handle.take() {
            let _ = handle.join();
        }
        let stderr = String::from_utf8_lossy(&self.stderr_buffer.lock()).to_string();
        Ok((status, stderr))
    }
}

impl Drop for RawFrameDecoder {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Logs a decoder's exit. Non-zero exits after frames were produced are
/// expected when the stream was cut short, so they are warnings, not errors.
pub fn log_decoder_exit(decoder: RawFrameDecoder, frames_read: u64) {
    match decoder.finish() {
        Ok((status, stderr)) if status.success() || frames_read > 0 => {
            log::debug!(
                target: "sharp_frames::ffmpeg::runner",
                "FFmpeg decoder finished: status={}, frames={}",
                status,
                frames_read
            );
            if !stderr.trim().is_empty() {
                log::warn!(
                    target: "sharp_frames::ffmpeg::runner",
                    "FFmpeg decoder stderr: {}",
                    last_lines(&stderr, 3)
                );
            }
        }
        Ok((status, stderr)) => {
            log::error!(
                target: "sharp_frames::ffmpeg::runner",
                "FFmpeg decoder failed (code={:?}): {}",
                status.code(),
                last_lines(&stderr, 3)
            );
        }
        Err(e) => {
            log::error!(
                target: "sharp_frames::ffmpeg::runner",
                "FFmpeg decoder wait failed: {}",
                e
            );
        }
    }
}

fn last_lines(text: &str, n: usize) -> String {
    let mut lines: Vec<&str> = text.lines().rev().take(n).collect();
    lines.reverse();
    lines.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_args_request_passthrough_rawvideo() {
        let args = build_decode_args("/tmp/in.mp4", None, RawPixelFormat::Gray);
        let joined = args.join(" ");
        assert!(joined.contains("-i /tmp/in.mp4"));
        assert!(joined.contains("-fps_mode passthrough"));
        assert!(joined.ends_with("-f rawvideo -pix_fmt gray pipe:1"));
        assert!(!args.iter().any(|a| a == "-vf"));
    }

    #[test]
    fn select_filter_escapes_commas() {
        let filter = build_select_filter(&[3, 40]);
        assert_eq!(filter, "select=eq(n\\,3)+eq(n\\,40)");
        let args = build_decode_args("in.mp4", Some(&filter), RawPixelFormat::Rgb24);
        let vf = args.iter().position(|a| a == "-vf").expect("-vf present");
        assert_eq!(args[vf + 1], filter);
        assert!(args.iter().any(|a| a == "rgb24"));
    }

    #[test]
    fn last_lines_keeps_order() {
        assert_eq!(last_lines("a\nb\nc\nd", 2), "c; d");
    }
}
