//! # Render Module
//!
//! The per-frame side of a render pass: compositing the active asset onto the
//! output canvas, stepping the audio-clocked render loop, and handing the
//! muxed stream to an encoder backend.
//!
//! ## Encoder backends
//!
//! [`Encoder`] is the capability the loop needs (`submit_frame`,
//! `submit_audio_samples`, `finish`). The shipped backend is
//! [`FfmpegEncoder`], which produces H.264 + AAC in MP4 through the ffmpeg CLI.

pub mod compositor;
pub mod encoder;
pub mod ffmpeg;
pub mod session;
pub mod sink;

pub use compositor::{FrameCompositor, Placement};
pub use encoder::{EncodeSpec, EncodedChunk, Encoder, EncoderFactory};
pub use ffmpeg::{check_ffmpeg_available, FfmpegEncoder, FfmpegEncoderFactory};
pub use session::{CancelHandle, PrimedInputs, RenderSession, RenderState, TickOutcome, TickReport};
pub use sink::{MediaBlob, OutputSink};
