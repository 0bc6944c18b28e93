/// Decoded narration audio
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Audio samples (interleaved for stereo, mono for single channel)
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Where the audio came from, for logs and errors
    pub source_name: String,

    /// Audio format information
    pub format: AudioFormat,
}

impl AudioBuffer {
    /// Number of sample frames (one sample per channel)
    pub fn frame_count(&self) -> u64 {
        if self.channels == 0 {
            return 0;
        }
        (self.samples.len() / self.channels as usize) as u64
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Sample frame index for a time in seconds, clamped to the buffer
    pub fn frame_for_time(&self, time: f64) -> u64 {
        let frame = (time.max(0.0) * self.sample_rate as f64).round() as u64;
        frame.min(self.frame_count())
    }

    /// Interleaved samples for the sample frames `[start, end)`
    pub fn interleaved(&self, start: u64, end: u64) -> &[f32] {
        let channels = self.channels as usize;
        let start = (start.min(end) as usize) * channels;
        let end = (end.min(self.frame_count()) as usize) * channels;
        &self.samples[start.min(end)..end]
    }
}

/// Audio format information
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFormat {
    /// File extension (wav, mp3, flac, etc.)
    pub extension: String,

    /// Bit depth (16, 24, 32, etc.)
    pub bit_depth: Option<u16>,

    /// Codec name for compressed formats
    pub codec: Option<String>,
}
