use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::EncoderConfig;
use crate::error::{EncoderError, Result};
use crate::media::Frame;
use crate::render::encoder::{EncodeSpec, EncodedChunk, Encoder, EncoderFactory};

const MP4_MIME: &str = "video/mp4";
const CHUNK_SIZE: usize = 1 << 20;
const LOG_TAIL: usize = 2048;

/// Check whether the configured ffmpeg binary runs
pub fn check_ffmpeg_available(ffmpeg: &str) -> bool {
    Command::new(ffmpeg)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Map 0-100 quality onto the x264 CRF scale (0-51, lower is better)
fn quality_to_crf(quality: u8) -> u8 {
    (51 - ((quality.min(100) as f32 / 100.0) * 51.0) as u8).clamp(0, 51)
}

/// Opens [`FfmpegEncoder`]s with the configured binary and codec settings
#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    config: EncoderConfig,
}

impl FfmpegEncoderFactory {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn open(&self, spec: &EncodeSpec) -> Result<Box<dyn Encoder>> {
        Ok(Box::new(FfmpegEncoder::start(self.config.clone(), *spec)?))
    }
}

/// H.264 + AAC in MP4, produced by the ffmpeg CLI
///
/// Frames stream as raw RGB into an ffmpeg child writing a video-only file.
/// Audio is buffered to a float WAV alongside it. `finish` muxes the two
/// with a second ffmpeg run and reads the result back. ffmpeg's diagnostics
/// go to a log file in the work directory, which is removed with the encoder.
pub struct FfmpegEncoder {
    config: EncoderConfig,
    spec: EncodeSpec,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    audio: Option<hound::WavWriter<BufWriter<File>>>,
    frames_written: u64,
    // dropped last, after the child and the audio writer are closed
    work_dir: TempDir,
}

impl FfmpegEncoder {
    pub fn start(config: EncoderConfig, spec: EncodeSpec) -> Result<Self> {
        if spec.width == 0 || spec.height == 0 || spec.width % 2 != 0 || spec.height % 2 != 0 {
            return Err(EncoderError::StartFailed {
                reason: format!("frame size {}x{} must be even and non-zero", spec.width, spec.height),
            }.into());
        }

        if !check_ffmpeg_available(&config.ffmpeg_path) {
            return Err(EncoderError::StartFailed {
                reason: format!("{} not found. Please install FFmpeg.", config.ffmpeg_path),
            }.into());
        }

        let work_dir = tempfile::Builder::new()
            .prefix("headline_compositor_")
            .tempdir()?;

        let wav_spec = hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let audio = hound::WavWriter::create(Self::audio_path(work_dir.path()), wav_spec)
            .map_err(|e| EncoderError::StartFailed { reason: format!("audio buffer: {}", e) })?;

        let log = File::create(Self::log_path(work_dir.path()))?;

        let mut cmd = Command::new(&config.ffmpeg_path);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .args([
                "-y",
                "-loglevel", "error",
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-s", &format!("{}x{}", spec.width, spec.height),
                "-r", &spec.fps.to_string(),
                "-i", "pipe:0",
                "-an",
                "-c:v", &config.video_codec,
                "-preset", &config.preset,
                "-crf", &quality_to_crf(spec.quality).to_string(),
                "-pix_fmt", "yuv420p",
            ])
            .arg(Self::video_path(work_dir.path()));

        let mut child = cmd.spawn().map_err(|e| EncoderError::StartFailed {
            reason: format!("failed to spawn {}: {}", config.ffmpeg_path, e),
        })?;

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EncoderError::StartFailed {
                    reason: "ffmpeg stdin unavailable".to_string(),
                }.into());
            }
        };

        info!(
            "🎞️  Encoder started: {}x{} @ {}fps, {} (crf {})",
            spec.width, spec.height, spec.fps, config.video_codec, quality_to_crf(spec.quality)
        );

        Ok(Self {
            config,
            spec,
            child: Some(child),
            stdin: Some(stdin),
            audio: Some(audio),
            frames_written: 0,
            work_dir,
        })
    }

    /// Scratch directory holding the intermediate files of this pass
    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    fn video_path(dir: &Path) -> PathBuf {
        dir.join("video_only.mp4")
    }

    fn audio_path(dir: &Path) -> PathBuf {
        dir.join("narration.wav")
    }

    fn output_path(dir: &Path) -> PathBuf {
        dir.join("output.mp4")
    }

    fn log_path(dir: &Path) -> PathBuf {
        dir.join("ffmpeg.log")
    }

    /// Last part of the streaming ffmpeg's log, for error messages
    fn log_tail(path: &Path) -> String {
        let log = std::fs::read(path).unwrap_or_default();
        let start = log.len().saturating_sub(LOG_TAIL);
        String::from_utf8_lossy(&log[start..]).trim().to_string()
    }

    fn wait_for_video(&mut self) -> Result<()> {
        drop(self.stdin.take());

        let mut child = self.child.take().ok_or(EncoderError::Finished)?;
        let status = child.wait().map_err(|e| EncoderError::EncodingFailed {
            reason: format!("failed to wait for ffmpeg: {}", e),
        })?;

        if !status.success() {
            return Err(EncoderError::EncodingFailed {
                reason: format!(
                    "ffmpeg failed ({}): {}",
                    status,
                    Self::log_tail(&Self::log_path(self.work_dir.path()))
                ),
            }.into());
        }
        Ok(())
    }

    fn mux(&self) -> Result<()> {
        let dir = self.work_dir.path();
        let output = Command::new(&self.config.ffmpeg_path)
            .stdin(Stdio::null())
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(Self::video_path(dir))
            .arg("-i")
            .arg(Self::audio_path(dir))
            .args([
                "-map", "0:v:0",
                "-map", "1:a:0",
                "-c:v", "copy",
                "-c:a", "aac",
                "-b:a", &format!("{}k", self.config.audio_bitrate_kbps),
                "-movflags", "+faststart",
            ])
            .arg(Self::output_path(dir))
            .output()
            .map_err(|e| EncoderError::EncodingFailed {
                reason: format!("failed to run {}: {}", self.config.ffmpeg_path, e),
            })?;

        if !output.status.success() {
            return Err(EncoderError::EncodingFailed {
                reason: format!("mux failed: {}", String::from_utf8_lossy(&output.stderr).trim()),
            }.into());
        }
        Ok(())
    }

    fn read_chunks(path: &Path) -> Result<Vec<EncodedChunk>> {
        let mut file = File::open(path)?;
        let mut chunks = Vec::new();
        loop {
            let mut chunk = Vec::with_capacity(CHUNK_SIZE);
            let read = (&mut file).take(CHUNK_SIZE as u64).read_to_end(&mut chunk)?;
            if read == 0 {
                break;
            }
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    fn kill(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("ffmpeg already exited: {}", e);
            }
            let _ = child.wait();
        }
    }
}

impl Encoder for FfmpegEncoder {
    fn mime_type(&self) -> &str {
        MP4_MIME
    }

    fn submit_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width() != self.spec.width || frame.height() != self.spec.height {
            return Err(EncoderError::SubmitFailed {
                stream: "video".to_string(),
                reason: format!(
                    "frame size mismatch: got {}x{}, expected {}x{}",
                    frame.width(), frame.height(), self.spec.width, self.spec.height
                ),
            }.into());
        }

        let stdin = self.stdin.as_mut().ok_or(EncoderError::Finished)?;
        if let Err(e) = stdin.write_all(frame.as_rgb_bytes()) {
            return Err(EncoderError::SubmitFailed {
                stream: "video".to_string(),
                reason: format!("{}: {}", e, Self::log_tail(&Self::log_path(self.work_dir.path()))),
            }.into());
        }
        self.frames_written += 1;
        Ok(())
    }

    fn submit_audio_samples(&mut self, samples: &[f32]) -> Result<()> {
        let writer = self.audio.as_mut().ok_or(EncoderError::Finished)?;
        for &sample in samples {
            writer.write_sample(sample).map_err(|e| EncoderError::SubmitFailed {
                stream: "audio".to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<EncodedChunk>> {
        debug!("Flushing encoder after {} frames", self.frames_written);

        self.wait_for_video()?;

        let audio = self.audio.take().ok_or(EncoderError::Finished)?;
        audio.finalize().map_err(|e| EncoderError::EncodingFailed {
            reason: format!("failed to finalize audio: {}", e),
        })?;

        self.mux()?;
        let chunks = Self::read_chunks(&Self::output_path(self.work_dir.path()))?;

        info!(
            "✅ Encoded {} frames into {} bytes",
            self.frames_written,
            chunks.iter().map(Vec::len).sum::<usize>()
        );
        Ok(chunks)
    }

    fn abort(mut self: Box<Self>) {
        warn!("Aborting encoder after {} frames", self.frames_written);
        self.kill();
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_to_crf() {
        assert_eq!(quality_to_crf(100), 0);
        assert_eq!(quality_to_crf(0), 51);
        assert_eq!(quality_to_crf(75), 13);
        assert_eq!(quality_to_crf(200), 0);
    }

    #[test]
    fn test_missing_binary_is_reported() {
        assert!(!check_ffmpeg_available("definitely-not-ffmpeg-binary"));

        let config = EncoderConfig {
            ffmpeg_path: "definitely-not-ffmpeg-binary".to_string(),
            ..EncoderConfig::default()
        };
        let spec = EncodeSpec { width: 64, height: 36, fps: 30, quality: 75, sample_rate: 8_000, channels: 1 };
        assert!(FfmpegEncoder::start(config, spec).is_err());
    }

    #[test]
    fn test_odd_frame_size_is_rejected() {
        let spec = EncodeSpec { width: 63, height: 36, fps: 30, quality: 75, sample_rate: 8_000, channels: 1 };
        let result = FfmpegEncoder::start(EncoderConfig::default(), spec);
        assert!(matches!(
            result,
            Err(crate::error::CompositorError::Encoder(EncoderError::StartFailed { .. }))
        ));
    }

    fn small_spec() -> EncodeSpec {
        EncodeSpec { width: 64, height: 36, fps: 30, quality: 75, sample_rate: 8_000, channels: 1 }
    }

    fn started_with_frames(frames: usize) -> Option<Box<FfmpegEncoder>> {
        if !check_ffmpeg_available("ffmpeg") {
            eprintln!("ffmpeg not available, skipping");
            return None;
        }

        let spec = small_spec();
        let mut encoder = Box::new(FfmpegEncoder::start(EncoderConfig::default(), spec).unwrap());
        let frame = Frame::new_black(spec.width, spec.height);
        for _ in 0..frames {
            // a build without the configured codec rejects the frames; cleanup must still happen
            let _ = encoder.submit_frame(&frame);
            encoder.submit_audio_samples(&[0.0; 266]).unwrap();
        }
        Some(encoder)
    }

    #[test]
    fn test_abort_removes_work_dir() {
        let Some(encoder) = started_with_frames(3) else { return };
        let work_dir = encoder.work_dir().to_path_buf();
        assert!(work_dir.join("narration.wav").exists());

        encoder.abort();
        assert!(!work_dir.exists());
    }

    #[test]
    fn test_drop_removes_work_dir() {
        let Some(encoder) = started_with_frames(3) else { return };
        let work_dir = encoder.work_dir().to_path_buf();

        drop(encoder);
        assert!(!work_dir.exists());
    }

    #[test]
    fn test_ffmpeg_failure_reports_its_log() {
        if !check_ffmpeg_available("ffmpeg") {
            return;
        }

        let config = EncoderConfig {
            video_codec: "definitely-not-a-codec".to_string(),
            ..EncoderConfig::default()
        };
        let spec = small_spec();
        let mut encoder = Box::new(FfmpegEncoder::start(config, spec).unwrap());

        let message = match encoder.submit_frame(&Frame::new_black(spec.width, spec.height)) {
            Err(error) => error.to_string(),
            Ok(()) => encoder.finish().unwrap_err().to_string(),
        };
        assert!(message.contains("definitely-not-a-codec"), "{}", message);
    }

    #[test]
    fn test_log_tail_keeps_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffmpeg.log");
        let mut log = "x".repeat(LOG_TAIL * 2);
        log.push_str("Unknown encoder 'h265_nope'\n");
        std::fs::write(&path, &log).unwrap();

        let tail = FfmpegEncoder::log_tail(&path);
        assert!(tail.len() <= LOG_TAIL);
        assert!(tail.ends_with("Unknown encoder 'h265_nope'"));
        assert_eq!(FfmpegEncoder::log_tail(&dir.path().join("absent.log")), "");
    }

    #[test]
    fn test_read_chunks_splits_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, vec![7u8; CHUNK_SIZE + 10]).unwrap();

        let chunks = FfmpegEncoder::read_chunks(&path).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), CHUNK_SIZE);
        assert_eq!(chunks[1].len(), 10);
    }
}
