//! # Media Module
//!
//! Asset descriptions and the loader that turns them into decoded,
//! seekable handles before rendering starts.
//!
//! Still images are decoded with the `image` crate. Video clips are probed
//! with `ffprobe` and decoded in full by a single `ffmpeg` process, sampled
//! at the output frame rate and sized for the output canvas.

pub mod loader;
pub mod probe;
pub mod types;

pub use loader::{scan_directory, AssetLoader, DecodedHandle, ImageHandle, LoadedAsset, VideoHandle};
pub use probe::VideoMetadata;
pub use types::{Asset, AssetKind, Frame, MediaRef};
