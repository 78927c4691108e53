//! FFprobe-based video metadata. The decoder needs the display geometry up front to
//! split the rawvideo byte stream into frames.

use crate::error::AppError;
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use super::discovery::get_ffprobe_path;

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    #[serde(default)]
    rotation: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    #[serde(default)]
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    nb_frames: Option<String>,
    #[serde(default)]
    tags: Option<FfprobeTags>,
    #[serde(default)]
    side_data_list: Option<Vec<FfprobeSideData>>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    streams: Option<Vec<FfprobeStream>>,
}

fn parse_frame_rate(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

fn stream_rotation(stream: &FfprobeStream) -> i32 {
    let from_side_data = stream
        .side_data_list
        .iter()
        .flatten()
        .find_map(|sd| sd.rotation)
        .map(|r| r.round() as i32);
    let from_tags = stream
        .tags
        .as_ref()
        .and_then(|t| t.rotate.as_deref())
        .and_then(|r| r.trim().parse::<i32>().ok());
    from_side_data.or(from_tags).unwrap_or(0).rem_euclid(360)
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    /// Coded width, before display rotation.
    pub width: u32,
    /// Coded height, before display rotation.
    pub height: u32,
    pub fps: f64,
    /// Container frame count when the muxer records it.
    pub frame_count: Option<u64>,
    /// Display rotation in degrees, normalized to 0..360.
    pub rotation: i32,
}

impl VideoMetadata {
    /// Dimensions of frames as FFmpeg emits them (autorotation applied).
    pub fn display_dimensions(&self) -> (u32, u32) {
        if self.rotation == 90 || self.rotation == 270 {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    pub fn has_video(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Parse ffprobe JSON output into VideoMetadata.
pub fn parse_ffprobe_json(json: &str) -> Result<VideoMetadata, AppError> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| AppError::from(format!("Failed to parse ffprobe JSON: {}", e)))?;

    let video_stream = output.streams.as_ref().and_then(|streams| {
        streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
    });

    Ok(VideoMetadata {
        width: video_stream.and_then(|s| s.width).unwrap_or(0),
        height: video_stream.and_then(|s| s.height).unwrap_or(0),
        fps: video_stream
            .and_then(|s| s.r_frame_rate.as_deref())
            .and_then(parse_frame_rate)
            .unwrap_or(0.0),
        frame_count: video_stream
            .and_then(|s| s.nb_frames.as_deref())
            .and_then(|n| n.trim().parse::<u64>().ok()),
        rotation: video_stream.map(stream_rotation).unwrap_or(0),
    })
}

/// Run ffprobe on a video file and return metadata.
pub fn get_video_metadata_impl(path: &Path) -> Result<VideoMetadata, AppError> {
    let ffprobe = get_ffprobe_path()?;
    let path_str = path.to_string_lossy();

    log::debug!(
        target: "sharp_frames::ffmpeg::ffprobe",
        "get_video_metadata: path={}",
        path_str
    );

    let mut cmd = Command::new(&ffprobe);
    cmd.args([
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_streams",
        &path_str,
    ]);
    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    let output = cmd
        .output()
        .map_err(|e| AppError::from(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::source_unavailable(format!(
            "ffprobe failed: {}",
            stderr.trim()
        )));
    }

    let json = String::from_utf8(output.stdout)
        .map_err(|_| AppError::from("ffprobe output was not valid UTF-8"))?;

    parse_ffprobe_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ffprobe_json_extracts_metadata() {
        let json = r#"{
            "format": { "duration": "5.0", "format_name": "mov,mp4,m4a,3gp,3g2,mj2" },
            "streams": [
                { "codec_type": "audio", "codec_name": "aac" },
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1080,
                    "height": 1920,
                    "r_frame_rate": "30/1",
                    "nb_frames": "150"
                }
            ]
        }"#;
        let meta = parse_ffprobe_json(json).unwrap();
        assert_eq!((meta.width, meta.height), (1080, 1920));
        assert!((meta.fps - 30.0).abs() < 0.01);
        assert_eq!(meta.frame_count, Some(150));
        assert_eq!(meta.rotation, 0);
        assert_eq!(meta.display_dimensions(), (1080, 1920));
    }

    #[test]
    fn side_data_rotation_swaps_display_dimensions() {
        let json = r#"{
            "format": {},
            "streams": [{
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "side_data_list": [{ "side_data_type": "Display Matrix", "rotation": -90 }]
            }]
        }"#;
        let meta = parse_ffprobe_json(json).unwrap();
        assert_eq!(meta.rotation, 270);
        assert_eq!(meta.display_dimensions(), (1080, 1920));
    }

    #[test]
    fn legacy_rotate_tag_is_read() {
        let json = r#"{
            "streams": [{
                "codec_type": "video", "width": 640, "height": 480,
                "tags": { "rotate": "90" }
            }]
        }"#;
        let meta = parse_ffprobe_json(json).unwrap();
        assert_eq!(meta.rotation, 90);
        assert_eq!(meta.display_dimensions(), (480, 640));
    }

    #[test]
    fn parse_frame_rate_ntsc() {
        let fps = parse_frame_rate("30000/1001").unwrap();
        assert!((fps - 29.97).abs() < 0.001);
        assert!(parse_frame_rate("30/0").is_none());
    }

    #[test]
    fn missing_video_stream_has_no_video() {
        let json = r#"{ "format": { "duration": "10.0" }, "streams": [{"codec_type": "audio"}] }"#;
        let meta = parse_ffprobe_json(json).unwrap();
        assert!(!meta.has_video());
        assert_eq!(meta.frame_count, None);
    }
}
