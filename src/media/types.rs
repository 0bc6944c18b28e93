use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageBuffer, Rgb, RgbImage};

/// Represents a single video frame
///
/// This is a simple wrapper around an RGB image buffer. It is used both for
/// decoded source frames and for the fixed-resolution output canvas.
#[derive(Clone, Debug)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        let buffer = ImageBuffer::new(width, height);
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    /// Get the width of the frame
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    /// Get the height of the frame
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Fill the whole frame with one opaque color
    pub fn clear(&mut self, color: [u8; 3]) {
        if color == [0, 0, 0] {
            self.buffer.fill(0);
        } else {
            for pixel in self.buffer.pixels_mut() {
                *pixel = Rgb(color);
            }
        }
    }

    /// Get the underlying image buffer
    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    /// Get a mutable reference to the underlying image buffer
    pub fn as_image_mut(&mut self) -> &mut RgbImage {
        &mut self.buffer
    }

    /// Raw packed RGB bytes, row-major
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data)
            .map(|buffer| Self { buffer })
    }
}

/// Kind of a timeline asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Video,
}

impl AssetKind {
    /// Guess the kind from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "bmp" | "webp" => Some(AssetKind::Image),
            "mp4" | "mov" | "m4v" | "mkv" | "webm" | "avi" => Some(AssetKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Image => f.write_str("image"),
            AssetKind::Video => f.write_str("video"),
        }
    }
}

/// Where the bytes of a piece of media come from
#[derive(Debug, Clone)]
pub enum MediaRef {
    /// A file on the local filesystem
    Path(PathBuf),

    /// An in-memory byte source (for example, a generator response body)
    Bytes {
        data: Arc<[u8]>,
        /// Optional file extension used as a format hint ("png", "mp4", ...)
        extension: Option<String>,
    },
}

impl MediaRef {
    /// Reference a file on disk
    pub fn path<P: Into<PathBuf>>(path: P) -> Self {
        MediaRef::Path(path.into())
    }

    /// Reference an in-memory buffer
    pub fn bytes<B: Into<Arc<[u8]>>>(data: B, extension: Option<&str>) -> Self {
        MediaRef::Bytes {
            data: data.into(),
            extension: extension.map(|e| e.trim_start_matches('.').to_lowercase()),
        }
    }

    /// File extension hint, lowercased
    pub fn extension(&self) -> Option<String> {
        match self {
            MediaRef::Path(path) => path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_lowercase()),
            MediaRef::Bytes { extension, .. } => extension.clone(),
        }
    }

    /// Short human-readable description for logs and errors
    pub fn describe(&self) -> String {
        match self {
            MediaRef::Path(path) => path.display().to_string(),
            MediaRef::Bytes { data, extension } => format!(
                "<{} bytes{}>",
                data.len(),
                extension.as_deref().map(|e| format!(" .{}", e)).unwrap_or_default()
            ),
        }
    }
}

/// One entry of the ordered timeline input
///
/// The natural fields start empty and are filled in by the asset loader once
/// the media has been decoded.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Caller-chosen identifier
    pub id: String,

    pub kind: AssetKind,

    pub media_ref: MediaRef,

    /// Natural pixel width (if known)
    pub natural_width: Option<u32>,

    /// Natural pixel height (if known)
    pub natural_height: Option<u32>,

    /// Intrinsic duration in seconds (videos only)
    pub natural_duration: Option<f64>,
}

impl Asset {
    /// Create a new asset
    pub fn new<S: Into<String>>(id: S, kind: AssetKind, media_ref: MediaRef) -> Self {
        Self {
            id: id.into(),
            kind,
            media_ref,
            natural_width: None,
            natural_height: None,
            natural_duration: None,
        }
    }

    /// Create a still-image asset
    pub fn image<S: Into<String>>(id: S, media_ref: MediaRef) -> Self {
        Self::new(id, AssetKind::Image, media_ref)
    }

    /// Create a video-clip asset
    pub fn video<S: Into<String>>(id: S, media_ref: MediaRef) -> Self {
        Self::new(id, AssetKind::Video, media_ref)
    }

    /// Create an asset from a file path, inferring the kind from its extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        let kind = AssetKind::from_extension(path.extension()?.to_str()?)?;
        let id = path.file_stem()?.to_str()?.to_string();
        Some(Self::new(id, kind, MediaRef::path(path)))
    }

    /// Set natural dimensions
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.natural_width = Some(width);
        self.natural_height = Some(height);
        self
    }

    /// Set intrinsic duration
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.natural_duration = Some(seconds);
        self
    }

    /// Natural dimensions, if both are known
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.natural_width?, self.natural_height?))
    }
}

/// Parse the sequence number from a filename like "01_intro.png"
pub fn sequence_number(path: &Path) -> Option<u32> {
    let filename = path.file_stem()?.to_str()?;
    let (number, _name) = filename.split_once('_')?;
    number.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_from_path_infers_kind() {
        let image = Asset::from_path("assets/01_headline.PNG").unwrap();
        assert_eq!(image.kind, AssetKind::Image);
        assert_eq!(image.id, "01_headline");

        let video = Asset::from_path("assets/02_broll.mp4").unwrap();
        assert_eq!(video.kind, AssetKind::Video);

        assert!(Asset::from_path("notes.txt").is_none());
    }

    #[test]
    fn test_sequence_number_parsing() {
        assert_eq!(sequence_number(Path::new("01_intro.png")), Some(1));
        assert_eq!(sequence_number(Path::new("12_outro_shot.mp4")), Some(12));
        assert_eq!(sequence_number(Path::new("intro.png")), None);
    }

    #[test]
    fn test_frame_clear() {
        let mut frame = Frame::new_filled(4, 2, [200, 10, 10]);
        frame.clear([0, 0, 0]);
        assert!(frame.as_rgb_bytes().iter().all(|&b| b == 0));
        frame.clear([1, 2, 3]);
        assert_eq!(frame.get_pixel(3, 1), [1, 2, 3]);
    }

    #[test]
    fn test_media_ref_describe() {
        let bytes = MediaRef::bytes(vec![0u8; 16], Some(".PNG"));
        assert_eq!(bytes.extension().as_deref(), Some("png"));
        assert_eq!(bytes.describe(), "<16 bytes .png>");
    }
}
