use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::audio::types::{AudioBuffer, AudioFormat};
use crate::error::{AudioError, Result};
use crate::media::MediaRef;

/// Narration decoder supporting multiple formats
pub struct AudioLoader;

impl AudioLoader {
    /// Decode an audio source into interleaved f32 samples
    pub fn decode(source: &MediaRef) -> Result<AudioBuffer> {
        let source_name = source.describe();
        let extension = source.extension().unwrap_or_default();

        let buffer = match source {
            MediaRef::Path(path) => Self::decode_path(path, &extension, &source_name)?,
            MediaRef::Bytes { data, .. } => Self::decode_bytes(Arc::clone(data), &extension, &source_name)?,
        };

        if buffer.frame_count() == 0 {
            return Err(AudioError::DecodeFailed { source_name }.into());
        }

        debug!(
            "Decoded {}: {:.2}s, {} Hz, {} channels",
            buffer.source_name, buffer.duration(), buffer.sample_rate, buffer.channels
        );
        Ok(buffer)
    }

    /// Decode on the blocking pool
    pub async fn decode_async(source: MediaRef) -> Result<AudioBuffer> {
        let source_name = source.describe();
        tokio::task::spawn_blocking(move || Self::decode(&source))
            .await
            .map_err(|_| AudioError::DecodeFailed { source_name })?
    }

    fn decode_path(path: &Path, extension: &str, source_name: &str) -> Result<AudioBuffer> {
        match extension {
            "wav" => {
                let reader = hound::WavReader::open(path)
                    .map_err(|_| AudioError::DecodeFailed { source_name: source_name.to_string() })?;
                Self::decode_wav(reader, source_name)
            }
            "mp3" | "flac" | "ogg" | "m4a" | "aac" => {
                let file = File::open(path)
                    .map_err(|_| AudioError::DecodeFailed { source_name: source_name.to_string() })?;
                Self::decode_with_symphonia(Box::new(file), Some(extension), source_name)
            }
            _ => Err(AudioError::UnsupportedFormat {
                format: extension.to_string()
            }.into()),
        }
    }

    fn decode_bytes(data: Arc<[u8]>, extension: &str, source_name: &str) -> Result<AudioBuffer> {
        if extension == "wav" || data.starts_with(b"RIFF") {
            let reader = hound::WavReader::new(Cursor::new(data))
                .map_err(|_| AudioError::DecodeFailed { source_name: source_name.to_string() })?;
            return Self::decode_wav(reader, source_name);
        }

        let hint = (!extension.is_empty()).then_some(extension);
        Self::decode_with_symphonia(Box::new(Cursor::new(data)), hint, source_name)
    }

    /// Decode WAV with the hound crate (most reliable for WAV)
    fn decode_wav<R: Read + Seek>(reader: hound::WavReader<R>, source_name: &str) -> Result<AudioBuffer> {
        let spec = reader.spec();
        let failed = || AudioError::DecodeFailed { source_name: source_name.to_string() };

        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(AudioError::InvalidParameters {
                details: format!("{} channels at {} Hz", spec.channels, spec.sample_rate)
            }.into());
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| failed())?,
            hound::SampleFormat::Int => {
                let bit_depth = spec.bits_per_sample;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|s| Self::int_to_float(s, bit_depth)))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| failed())?
            }
        };

        Ok(AudioBuffer {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            source_name: source_name.to_string(),
            format: AudioFormat {
                extension: "wav".to_string(),
                bit_depth: Some(spec.bits_per_sample),
                codec: None,
            },
        })
    }

    /// Decode compressed formats using Symphonia
    fn decode_with_symphonia(
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
        source_name: &str,
    ) -> Result<AudioBuffer> {
        let failed = || AudioError::DecodeFailed { source_name: source_name.to_string() };
        let mss = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|_| failed())?;

        let mut format = probed.format;

        // Find the first audio track with a known (decodable) codec
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(failed)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params.sample_rate
            .ok_or_else(|| AudioError::InvalidParameters {
                details: "No sample rate found".to_string()
            })?;

        let channels = codec_params.channels
            .ok_or_else(|| AudioError::InvalidParameters {
                details: "No channel information found".to_string()
            })?
            .count() as u16;

        let dec_opts: DecoderOptions = Default::default();
        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &dec_opts)
            .map_err(|_| failed())?;

        let mut samples = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                // End of stream
                Err(SymphoniaError::IoError(_)) => break,
                Err(e) => {
                    warn!("Stopping audio demux early: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let needed = decoded.capacity() as u64;
                    let too_small = sample_buf
                        .as_ref()
                        .map_or(true, |buf| (buf.capacity() as u64) < needed * spec.channels.count() as u64);
                    if too_small {
                        sample_buf = Some(SampleBuffer::new(needed, spec));
                    }
                    if let Some(buf) = sample_buf.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        samples.extend_from_slice(buf.samples());
                    }
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    debug!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(SymphoniaError::IoError(_)) => break,
                Err(_) => return Err(failed().into()),
            }
        }

        Ok(AudioBuffer {
            samples,
            sample_rate,
            channels,
            source_name: source_name.to_string(),
            format: AudioFormat {
                extension: extension.unwrap_or("unknown").to_string(),
                bit_depth: codec_params.bits_per_sample.map(|b| b as u16),
                codec: Some(format!("{:?}", codec_params.codec)),
            },
        })
    }

    /// Convert integer sample to float (-1.0 to 1.0)
    fn int_to_float(sample: i32, bit_depth: u16) -> f32 {
        match bit_depth {
            8 => sample as f32 / 128.0,
            16 => sample as f32 / 32768.0,
            24 => sample as f32 / 8388608.0,
            32 => sample as f32 / 2147483648.0,
            _ => sample as f32 / 32768.0, // Default to 16-bit
        }
    }

    /// Check if a file format is supported
    pub fn is_format_supported(extension: &str) -> bool {
        matches!(
            extension.to_lowercase().as_str(),
            "wav" | "mp3" | "flac" | "ogg" | "m4a" | "aac"
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::CompositorError;
    use tempfile::tempdir;

    /// Mono 16-bit WAV of `seconds` length, as bytes
    pub(crate) fn wav_bytes(seconds: f64, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let frames = (seconds * sample_rate as f64).round() as usize;
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let sample = (t * 440.0 * std::f32::consts::TAU).sin() * 0.25;
                writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_format_support() {
        assert!(AudioLoader::is_format_supported("wav"));
        assert!(AudioLoader::is_format_supported("mp3"));
        assert!(AudioLoader::is_format_supported("FLAC"));
        assert!(!AudioLoader::is_format_supported("xyz"));
    }

    #[test]
    fn test_int_to_float_conversion() {
        assert_eq!(AudioLoader::int_to_float(0, 16), 0.0);
        assert_eq!(AudioLoader::int_to_float(32767, 16), 32767.0 / 32768.0);
        assert_eq!(AudioLoader::int_to_float(-32768, 16), -1.0);
        assert_eq!(AudioLoader::int_to_float(-8388608, 24), -1.0);
    }

    #[test]
    fn test_decode_wav_bytes() {
        let source = MediaRef::bytes(wav_bytes(1.5, 8_000), None);
        let audio = AudioLoader::decode(&source).unwrap();
        assert_eq!(audio.sample_rate, 8_000);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.frame_count(), 12_000);
        assert!((audio.duration() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_decode_wav_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("narration.wav");
        std::fs::write(&path, wav_bytes(0.5, 16_000)).unwrap();

        let audio = AudioLoader::decode(&MediaRef::path(&path)).unwrap();
        assert_eq!(audio.frame_count(), 8_000);
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("narration.xyz");
        std::fs::write(&path, b"dummy content").unwrap();

        let result = AudioLoader::decode(&MediaRef::path(&path));
        if let Err(CompositorError::AudioDecode(AudioError::UnsupportedFormat { format })) = result {
            assert_eq!(format, "xyz");
        } else {
            panic!("Expected UnsupportedFormat error");
        }
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let source = MediaRef::bytes(vec![0u8; 64], Some("mp3"));
        let result = AudioLoader::decode(&source);
        assert!(matches!(result, Err(CompositorError::AudioDecode(_))));
    }

    #[test]
    fn test_empty_wav_is_rejected() {
        let source = MediaRef::bytes(wav_bytes(0.0, 8_000), Some("wav"));
        assert!(AudioLoader::decode(&source).is_err());
    }

    #[tokio::test]
    async fn test_decode_async() {
        let audio = AudioLoader::decode_async(MediaRef::bytes(wav_bytes(0.25, 8_000), None))
            .await
            .unwrap();
        assert_eq!(audio.frame_count(), 2_000);
    }
}
