//! Per-request working directories and the age-based reaper that removes them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Directories older than this are reaped by default.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(600);

const WORK_DIR_PREFIX: &str = "req-";

/// Default root for working directories. `SHARP_FRAMES_WORK_ROOT` overrides it.
pub fn default_work_root() -> PathBuf {
    std::env::var_os("SHARP_FRAMES_WORK_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("sharp-frames"))
}

/// Generates a short suffix for directory names. Not cryptographically secure; for uniqueness only.
fn random_alphanumeric_suffix(len: usize) -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    static STATE: AtomicU64 = AtomicU64::new(0);
    let seed = STATE.fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::Relaxed) ^ std::process::id() as u64;
    let mut x = seed.wrapping_add(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64,
    );
    let mut s = String::with_capacity(len);
    for _ in 0..len {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        s.push(CHARS[(x % CHARS.len() as u64) as usize] as char);
    }
    s
}

/// Creates a fresh, uniquely named working directory under `root`.
pub fn create_work_dir(root: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(root)?;
    loop {
        let name = format!(
            "{}{}-{}",
            WORK_DIR_PREFIX,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
            random_alphanumeric_suffix(9)
        );
        let path = root.join(name);
        match fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Best-effort removal. A directory that is already gone counts as removed.
pub fn remove_work_dir(dir: &Path) -> bool {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            log::debug!(
                target: "sharp_frames::ffmpeg::temp",
                "Removed work dir {}",
                dir.display()
            );
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            log::warn!(
                target: "sharp_frames::ffmpeg::temp",
                "Failed to remove work dir {}: {}",
                dir.display(),
                e
            );
            false
        }
    }
}

fn is_stale(path: &Path, now: SystemTime, max_age: Duration) -> bool {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    now.duration_since(modified).unwrap_or_default() > max_age
}

/// Deletes subdirectories of `root` not modified within `max_age`.
/// Returns the removed paths. A missing root is not an error.
pub fn reap_stale_work_dirs(root: &Path, max_age: Duration) -> Vec<PathBuf> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!(
                    target: "sharp_frames::ffmpeg::temp",
                    "Cannot scan work root {}: {}",
                    root.display(),
                    e
                );
            }
            return Vec::new();
        }
    };

    let now = SystemTime::now();
    let mut removed = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() || !is_stale(&path, now, max_age) {
            continue;
        }
        if remove_work_dir(&path) {
            log::info!(
                target: "sharp_frames::ffmpeg::temp",
                "Cleaned up old temp dir: {}",
                path.display()
            );
            removed.push(path);
        }
    }
    removed
}
