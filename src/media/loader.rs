use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AssetError, CompositorError, Result};
use crate::media::probe::{self, VideoMetadata};
use crate::media::types::{sequence_number, Asset, AssetKind, Frame, MediaRef};

/// A decoded still image
#[derive(Debug, Clone)]
pub struct ImageHandle {
    pub frame: Frame,
}

/// A fully decoded, seekable video clip
#[derive(Debug, Clone)]
pub struct VideoHandle {
    /// Frames in presentation order
    pub frames: Vec<Frame>,

    /// Rate the frames were sampled at
    pub fps: f64,

    /// Intrinsic duration in seconds
    pub duration: f64,
}

impl VideoHandle {
    /// Index of the frame shown `offset` seconds into the clip, wrapping
    /// around the end of the clip
    pub fn frame_index_at(&self, offset: f64) -> usize {
        if self.frames.is_empty() {
            return 0;
        }
        let index = (offset.max(0.0) * self.fps).floor() as usize;
        index % self.frames.len()
    }

}

/// Decoded media ready for compositing
#[derive(Debug, Clone)]
pub enum DecodedHandle {
    Image(ImageHandle),
    Video(VideoHandle),
}

/// An asset with its natural fields resolved, paired with its decoded media
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    pub asset: Asset,
    pub handle: DecodedHandle,
}

/// Resolves timeline assets into decoded handles
///
/// Videos are decoded completely up front at no more than the output frame
/// rate and no larger than their on-canvas size, so rendering never waits
/// on a decoder.
#[derive(Debug, Clone)]
pub struct AssetLoader {
    canvas: (u32, u32),
    fps: u32,
    max_video_edge: u32,
    max_concurrent_loads: usize,
    load_timeout: Duration,
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl AssetLoader {
    pub fn new(config: &Config) -> Self {
        Self {
            canvas: config.output.aspect.dimensions(),
            fps: config.output.fps,
            max_video_edge: config.loader.max_video_edge,
            max_concurrent_loads: config.loader.max_concurrent_loads.max(1),
            load_timeout: config.loader.load_timeout(),
            ffmpeg_path: config.encoder.ffmpeg_path.clone(),
            ffprobe_path: config.encoder.ffprobe_path.clone(),
        }
    }

    /// Override the canvas the video frames are sized for
    pub fn with_canvas(mut self, width: u32, height: u32) -> Self {
        self.canvas = (width, height);
        self
    }

    /// Load every asset concurrently, preserving input order
    ///
    /// The first failure cancels the remaining loads.
    pub async fn load_all(&self, assets: &[Asset]) -> Result<Vec<LoadedAsset>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_loads));
        let mut tasks = JoinSet::new();

        for (index, asset) in assets.iter().cloned().enumerate() {
            let loader = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|_| {
                    CompositorError::from(AssetError::LoadFailed {
                        id: asset.id.clone(),
                        reason: "loader shut down".to_string(),
                    })
                })?;
                loader.load_with_timeout(&asset).await.map(|loaded| (index, loaded))
            });
        }

        let mut slots: Vec<Option<LoadedAsset>> = assets.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, loaded) = joined.map_err(|e| AssetError::LoadFailed {
                id: "<loader task>".to_string(),
                reason: e.to_string(),
            })??;
            slots[index] = Some(loaded);
        }

        let loaded: Vec<LoadedAsset> = slots.into_iter().flatten().collect();
        info!("Loaded {} assets", loaded.len());
        Ok(loaded)
    }

    /// Load one asset, failing with a timeout error if it stalls
    pub async fn load_with_timeout(&self, asset: &Asset) -> Result<LoadedAsset> {
        match tokio::time::timeout(self.load_timeout, self.load(asset)).await {
            Ok(result) => result,
            Err(_) => {
                let seconds = self.load_timeout.as_secs();
                warn!("Asset {} did not load within {}s", asset.id, seconds);
                Err(AssetError::Timeout {
                    id: asset.id.clone(),
                    seconds,
                }.into())
            }
        }
    }

    /// Decode one asset and fill in its natural dimensions and duration
    pub async fn load(&self, asset: &Asset) -> Result<LoadedAsset> {
        debug!("Loading {} {} from {}", asset.kind, asset.id, asset.media_ref.describe());
        match asset.kind {
            AssetKind::Image => self.load_image(asset).await,
            AssetKind::Video => self.load_video(asset).await,
        }
    }

    async fn load_image(&self, asset: &Asset) -> Result<LoadedAsset> {
        let media = asset.media_ref.clone();
        let id = asset.id.clone();
        let frame = tokio::task::spawn_blocking(move || decode_image(&id, &media))
            .await
            .map_err(|e| AssetError::LoadFailed {
                id: asset.id.clone(),
                reason: e.to_string(),
            })??;

        let mut resolved = asset.clone();
        resolved.natural_width = Some(frame.width());
        resolved.natural_height = Some(frame.height());
        resolved.natural_duration = None;

        info!("   Image {}: {}x{}", asset.id, frame.width(), frame.height());

        Ok(LoadedAsset {
            asset: resolved,
            handle: DecodedHandle::Image(ImageHandle { frame }),
        })
    }

    async fn load_video(&self, asset: &Asset) -> Result<LoadedAsset> {
        // Byte sources are spooled to disk for ffmpeg; the file lives until decoding is done
        let (path, _spool) = match &asset.media_ref {
            MediaRef::Path(path) => (path.clone(), None),
            MediaRef::Bytes { data, extension } => {
                let spool = spool_bytes(data, extension.as_deref().unwrap_or("mp4"))?;
                (spool.path().to_path_buf(), Some(spool))
            }
        };

        let metadata = probe::probe_video(&self.ffprobe_path, &asset.id, &path).await?;
        let (frames, fps) = self.decode_video(asset, &path, &metadata).await?;

        let duration = metadata
            .duration
            .unwrap_or(frames.len() as f64 / fps);

        let mut resolved = asset.clone();
        resolved.natural_width = Some(metadata.width);
        resolved.natural_height = Some(metadata.height);
        resolved.natural_duration = Some(duration);

        info!(
            "   Video {}: {}x{}, {:.2}s, {} frames decoded",
            asset.id, metadata.width, metadata.height, duration, frames.len()
        );

        Ok(LoadedAsset {
            asset: resolved,
            handle: DecodedHandle::Video(VideoHandle { frames, fps, duration }),
        })
    }

    async fn decode_video(
        &self,
        asset: &Asset,
        path: &Path,
        metadata: &VideoMetadata,
    ) -> Result<(Vec<Frame>, f64)> {
        let fps = metadata.fps.min(self.fps as f64);
        let size = probe::decode_size(
            (metadata.width, metadata.height),
            self.canvas,
            self.max_video_edge,
        );

        let frames = probe::decode_frames(&self.ffmpeg_path, &asset.id, path, fps, size).await?;
        Ok((frames, fps))
    }
}

fn decode_image(id: &str, media: &MediaRef) -> Result<Frame> {
    let image = match media {
        MediaRef::Path(path) => image::open(path),
        MediaRef::Bytes { data, .. } => image::load_from_memory(data),
    }
    .map_err(|e| AssetError::LoadFailed {
        id: id.to_string(),
        reason: e.to_string(),
    })?;

    Ok(Frame::new(image.to_rgb8()))
}

fn spool_bytes(data: &[u8], extension: &str) -> Result<tempfile::NamedTempFile> {
    use std::io::Write;

    let mut spool = tempfile::Builder::new()
        .prefix("headline-asset-")
        .suffix(&format!(".{}", extension))
        .tempfile()?;
    spool.write_all(data)?;
    spool.flush()?;
    Ok(spool)
}

/// Discover assets in a directory
///
/// Files named with a numeric prefix ("01_title.png", "02_clip.mp4") come
/// first in numeric order; the rest follow alphabetically. Hidden and
/// unsupported files are skipped.
pub fn scan_directory<P: AsRef<Path>>(directory: P) -> Result<Vec<Asset>> {
    let directory = directory.as_ref();

    if !directory.is_dir() {
        return Err(AssetError::LoadFailed {
            id: directory.display().to_string(),
            reason: "not a directory".to_string(),
        }.into());
    }

    let mut entries: Vec<(Option<u32>, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        if !path.is_file() || is_hidden_file(&path) {
            continue;
        }
        if Asset::from_path(&path).is_none() {
            debug!("Skipping unsupported file {:?}", path);
            continue;
        }
        entries.push((sequence_number(&path), path));
    }

    entries.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.1.cmp(&b.1)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    });

    let assets: Vec<Asset> = entries
        .into_iter()
        .filter_map(|(_, path)| Asset::from_path(path))
        .collect();

    if assets.is_empty() {
        warn!("No supported images or videos found in {}", directory.display());
    } else {
        info!("Found {} assets in {}", assets.len(), directory.display());
    }

    Ok(assets)
}

fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
