//! # Audio Module
//!
//! Decodes the narration track and exposes it as the master clock for a
//! render pass.
//!
//! WAV files are read with `hound`; MP3, FLAC, OGG and AAC go through
//! `symphonia`. Decoded samples stay interleaved as `f32`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use headline_compositor::audio::{AudioLoader, AudioTrack};
//! use headline_compositor::media::MediaRef;
//!
//! # fn main() -> anyhow::Result<()> {
//! let narration = AudioLoader::decode(&MediaRef::path("narration.mp3"))?;
//! println!("Narration runs {:.1}s", narration.duration());
//!
//! let mut track = AudioTrack::new(Arc::new(narration));
//! track.start();
//! let first_frame_audio = track.pump_until(1.0 / 30.0);
//! println!("{} samples for the first video frame", first_frame_audio.len());
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod loader;
pub mod types;

pub use clock::{AudioTrack, PlaybackClock};
pub use loader::AudioLoader;
pub use types::{AudioBuffer, AudioFormat};
