use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use rayon::prelude::*;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{AssetError, Result};
use crate::media::types::Frame;
use crate::render::compositor::Placement;

/// Frame rate assumed when ffprobe reports none
const FALLBACK_FPS: f64 = 30.0;

/// Video stream metadata as reported by ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    /// Display width (after rotation)
    pub width: u32,
    /// Display height (after rotation)
    pub height: u32,
    pub fps: f64,
    pub duration: Option<f64>,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Run ffprobe on `path` and read the first video stream's metadata
pub async fn probe_video(ffprobe: &str, id: &str, path: &Path) -> Result<VideoMetadata> {
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| AssetError::ProbeFailed {
            id: id.to_string(),
            reason: format!("failed to run {}: {}", ffprobe, e),
        })?;

    if !output.status.success() {
        return Err(AssetError::ProbeFailed {
            id: id.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }.into());
    }

    let metadata = parse_probe_output(&output.stdout).map_err(|reason| AssetError::ProbeFailed {
        id: id.to_string(),
        reason,
    })?;

    info!(
        "Video metadata for {}: {}x{} @ {:.2}fps, {}",
        id,
        metadata.width,
        metadata.height,
        metadata.fps,
        metadata.duration.map(|d| format!("{:.2}s", d)).unwrap_or_else(|| "unknown length".to_string())
    );

    Ok(metadata)
}

/// Parse ffprobe's JSON output
pub fn parse_probe_output(json: &[u8]) -> std::result::Result<VideoMetadata, String> {
    let parsed: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| format!("invalid ffprobe output: {}", e))?;

    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| "no video stream found".to_string())?;

    let (mut width, mut height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err("video stream has no dimensions".to_string()),
    };

    let rotation = stream
        .side_data_list
        .iter()
        .find_map(|side| side.rotation)
        .or_else(|| stream.tags.get("rotate").and_then(|r| r.parse().ok()))
        .unwrap_or(0.0);
    if (rotation.abs().round() as i64) % 180 == 90 {
        std::mem::swap(&mut width, &mut height);
    }

    let fps = [stream.avg_frame_rate.as_deref(), stream.r_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .find_map(parse_ratio)
        .unwrap_or(FALLBACK_FPS);

    let duration = stream
        .duration
        .as_deref()
        .or_else(|| parsed.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    Ok(VideoMetadata { width, height, fps, duration })
}

/// Parse an ffmpeg rational like "30000/1001"
fn parse_ratio(ratio: &str) -> Option<f64> {
    let (num, den) = ratio.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    let value = num / den;
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Size decoded frames are kept at: the canvas placement size, never larger
/// than the source, with the longest side capped at `max_edge`
pub fn decode_size(natural: (u32, u32), canvas: (u32, u32), max_edge: u32) -> (u32, u32) {
    let fit = Placement::aspect_fit(natural.0, natural.1, canvas.0, canvas.1);
    let (mut width, mut height) = if fit.width > natural.0 {
        natural
    } else {
        (fit.width, fit.height)
    };

    let longest = width.max(height);
    if longest > max_edge {
        let scale = max_edge as f64 / longest as f64;
        width = ((width as f64 * scale).round() as u32).max(1);
        height = ((height as f64 * scale).round() as u32).max(1);
    }

    (width, height)
}

/// Decode every frame of `path` at `fps`, scaled to `size`
///
/// One ffmpeg process streams raw RGB frames over stdout; the child is killed
/// if this future is dropped.
pub async fn decode_frames(
    ffmpeg: &str,
    id: &str,
    path: &Path,
    fps: f64,
    size: (u32, u32),
) -> Result<Vec<Frame>> {
    let (width, height) = size;
    let filter = format!("fps={:.6},scale={}:{}:flags=bilinear", fps, width, height);

    debug!("Decoding {} with filter {}", id, filter);

    let output = Command::new(ffmpeg)
        .args(["-v", "error", "-nostdin", "-i"])
        .arg(path)
        .args(["-an", "-vf", &filter, "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| AssetError::LoadFailed {
            id: id.to_string(),
            reason: format!("failed to run {}: {}", ffmpeg, e),
        })?;

    if !output.status.success() {
        return Err(AssetError::LoadFailed {
            id: id.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }.into());
    }

    frames_from_raw(&output.stdout, width, height).ok_or_else(|| AssetError::LoadFailed {
        id: id.to_string(),
        reason: format!("decoder returned {} bytes, not whole {}x{} frames", output.stdout.len(), width, height),
    }.into())
}

/// Split packed rgb24 output into frames
pub fn frames_from_raw(raw: &[u8], width: u32, height: u32) -> Option<Vec<Frame>> {
    let frame_len = width as usize * height as usize * 3;
    if frame_len == 0 || raw.is_empty() || raw.len() % frame_len != 0 {
        return None;
    }

    raw.par_chunks_exact(frame_len)
        .map(|chunk| Frame::from_rgb_bytes(width, height, chunk.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "duration": "9.9"},
                {"codec_type": "video", "width": 1280, "height": 720,
                 "avg_frame_rate": "30000/1001", "r_frame_rate": "30/1", "duration": "6.006"}
            ],
            "format": {"duration": "6.1"}
        }"#;

        let meta = parse_probe_output(json).unwrap();
        assert_eq!((meta.width, meta.height), (1280, 720));
        assert!((meta.fps - 29.97).abs() < 0.01);
        assert_eq!(meta.duration, Some(6.006));
    }

    #[test]
    fn test_rotated_stream_swaps_dimensions() {
        let json = br#"{
            "streams": [{"codec_type": "video", "width": 1920, "height": 1080,
                         "avg_frame_rate": "0/0", "r_frame_rate": "24/1",
                         "side_data_list": [{"rotation": -90}]}],
            "format": {"duration": "4.0"}
        }"#;

        let meta = parse_probe_output(json).unwrap();
        assert_eq!((meta.width, meta.height), (1080, 1920));
        assert_eq!(meta.fps, 24.0);
        assert_eq!(meta.duration, Some(4.0));
    }

    #[test]
    fn test_missing_video_stream_is_an_error() {
        let json = br#"{"streams": [{"codec_type": "audio"}]}"#;
        assert!(parse_probe_output(json).is_err());
        assert!(parse_probe_output(b"not json").is_err());
    }

    #[test]
    fn test_decode_size_caps_and_never_upscales() {
        // small clip keeps its size
        assert_eq!(decode_size((640, 360), (1920, 1080), 1280), (640, 360));
        // large clip is fitted then capped
        assert_eq!(decode_size((3840, 2160), (1920, 1080), 1280), (1280, 720));
        // landscape into portrait canvas
        assert_eq!(decode_size((1920, 1080), (1080, 1920), 1280), (1080, 608));
    }

    #[test]
    fn test_frames_from_raw() {
        let raw: Vec<u8> = (0..2 * 2 * 3 * 3).map(|i| i as u8).collect();
        let frames = frames_from_raw(&raw, 2, 2).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1].get_pixel(0, 0), [12, 13, 14]);

        assert!(frames_from_raw(&raw[..10], 2, 2).is_none());
        assert!(frames_from_raw(&[], 2, 2).is_none());
    }
}
