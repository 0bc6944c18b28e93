use crate::error::Result;
use crate::media::Frame;

/// One piece of the encoded container, in output order
pub type EncodedChunk = Vec<u8>;

/// Stream parameters an encoder is opened with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// 0-100, higher is better
    pub quality: u8,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Muxing encoder for one render pass
///
/// Frames and audio are submitted in presentation order. `finish` flushes
/// everything and returns the container bytes; `abort` throws the pass away.
pub trait Encoder: Send {
    /// Container MIME type, e.g. "video/mp4"
    fn mime_type(&self) -> &str;

    fn submit_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Interleaved f32 samples at the opened sample rate and channel count
    fn submit_audio_samples(&mut self, samples: &[f32]) -> Result<()>;

    fn finish(self: Box<Self>) -> Result<Vec<EncodedChunk>>;

    fn abort(self: Box<Self>);
}

/// Opens a fresh encoder per render pass
pub trait EncoderFactory: Send + Sync {
    fn open(&self, spec: &EncodeSpec) -> Result<Box<dyn Encoder>>;
}
