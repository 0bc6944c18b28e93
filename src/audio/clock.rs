use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::types::AudioBuffer;

/// Media clock driven by the number of narration sample frames consumed
///
/// Clones share the same counter, so a render loop and a progress reporter
/// read the same time.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    frames_played: Arc<AtomicU64>,
    sample_rate: u32,
    total_frames: u64,
}

impl PlaybackClock {
    pub fn new(sample_rate: u32, total_frames: u64) -> Self {
        Self {
            frames_played: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate.max(1),
            total_frames,
        }
    }

    /// Seconds of audio played so far
    pub fn elapsed(&self) -> f64 {
        self.frames_played() as f64 / self.sample_rate as f64
    }

    /// Total length of the track in seconds
    pub fn total_duration(&self) -> f64 {
        self.total_frames as f64 / self.sample_rate as f64
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.frames_played() >= self.total_frames
    }

    fn advance_to(&self, frame: u64) {
        self.frames_played.fetch_max(frame.min(self.total_frames), Ordering::AcqRel);
    }

    fn reset(&self) {
        self.frames_played.store(0, Ordering::Release);
    }
}

/// Narration being fed to the encoder
///
/// Samples are handed out in order and the clock advances by exactly the
/// amount handed out, so the frame clock never runs ahead of the audio.
#[derive(Debug)]
pub struct AudioTrack {
    buffer: Arc<AudioBuffer>,
    clock: PlaybackClock,
    playing: bool,
}

impl AudioTrack {
    pub fn new(buffer: Arc<AudioBuffer>) -> Self {
        let clock = PlaybackClock::new(buffer.sample_rate, buffer.frame_count());
        Self { buffer, clock, playing: false }
    }

    /// Start from the beginning of the track
    pub fn start(&mut self) {
        self.clock.reset();
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    /// Consume samples up to `time` seconds and return them interleaved
    ///
    /// Returns an empty slice when stopped or when `time` is not past the
    /// current position. The position never moves backwards or past the end.
    pub fn pump_until(&mut self, time: f64) -> &[f32] {
        if !self.playing {
            return &[];
        }

        let from = self.clock.frames_played();
        let to = self.buffer.frame_for_time(time);
        if to <= from {
            return &[];
        }

        self.clock.advance_to(to);
        self.buffer.interleaved(from, to)
    }
}
