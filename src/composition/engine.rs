use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audio::{AudioBuffer, AudioLoader},
    config::{AspectRatio, Config},
    error::{CompositorError, Result},
    media::{Asset, AssetLoader, LoadedAsset, MediaRef},
    render::{
        CancelHandle, EncodeSpec, EncoderFactory, FfmpegEncoderFactory, MediaBlob, PrimedInputs,
        RenderSession, TickReport,
    },
    timeline::Timeline,
};

/// One request for a finished video
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Images and clips in playback order
    pub assets: Vec<Asset>,

    /// Narration track; its length is the length of the video
    pub audio: MediaRef,

    pub aspect: AspectRatio,

    /// Seconds per still image; the configured value when `None`
    pub default_image_duration: Option<f64>,
}

impl RenderRequest {
    pub fn new(assets: Vec<Asset>, audio: MediaRef) -> Self {
        Self {
            assets,
            audio,
            aspect: AspectRatio::default(),
            default_image_duration: None,
        }
    }

    pub fn with_aspect(mut self, aspect: AspectRatio) -> Self {
        self.aspect = aspect;
        self
    }

    pub fn with_image_duration(mut self, seconds: f64) -> Self {
        self.default_image_duration = Some(seconds);
        self
    }
}

/// Main composition engine that turns narration plus visuals into one video
///
/// The engine follows a clear pipeline:
/// 1. Priming - Load assets and decode narration concurrently
/// 2. Timeline - Lay the assets out across the narration
/// 3. Rendering - Composite one frame per tick against the audio clock
/// 4. Output - Flush the encoder into a single media blob
///
/// Only one pass runs per engine at a time; a concurrent `render` call is
/// rejected with [`CompositorError::Busy`].
pub struct CompositionEngine {
    config: Config,
    encoders: Arc<dyn EncoderFactory>,
    active: Mutex<()>,
}

impl CompositionEngine {
    /// Create an engine encoding through the configured ffmpeg binary
    pub fn new(config: Config) -> Self {
        let encoders = Arc::new(FfmpegEncoderFactory::new(config.encoder.clone()));
        Self::with_encoder_factory(config, encoders)
    }

    /// Create an engine with a custom encoder backend
    pub fn with_encoder_factory(config: Config, encoders: Arc<dyn EncoderFactory>) -> Self {
        Self {
            config,
            encoders,
            active: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Render a complete video
    pub async fn render(&self, request: RenderRequest, cancel: &CancelHandle) -> Result<MediaBlob> {
        self.render_with_progress(request, cancel, |_| {}).await
    }

    /// Render a complete video, reporting every rendered frame
    ///
    /// The configuration is validated before anything is loaded.
    pub async fn render_with_progress<F>(
        &self,
        request: RenderRequest,
        cancel: &CancelHandle,
        progress: F,
    ) -> Result<MediaBlob>
    where
        F: FnMut(&TickReport),
    {
        let _guard = self.active.try_lock().map_err(|_| {
            warn!("Rejecting render request: a pass is already active");
            CompositorError::Busy
        })?;

        self.config.validate()?;

        let (width, height) = request.aspect.dimensions();
        let fps = self.config.output.fps;

        info!("🎬 Starting Headline-Compositor render pass");
        info!("   Assets: {}", request.assets.len());
        info!("   Audio: {}", request.audio.describe());
        info!("   Canvas: {}x{} ({}) @ {}fps", width, height, request.aspect, fps);

        let mut session = RenderSession::new(width, height, fps, cancel.clone())?;
        session.begin_priming()?;

        // Pipeline Step 1 + 2: Priming and timeline
        let inputs = match self.prime(&request, (width, height), cancel).await {
            Ok(inputs) => inputs,
            Err(error) => return Err(session.fail(error)),
        };

        // Pipeline Step 3: Rendering
        let spec = EncodeSpec {
            width,
            height,
            fps,
            quality: self.config.output.quality,
            sample_rate: inputs.audio.sample_rate,
            channels: inputs.audio.channels,
        };
        let encoder = match self.encoders.open(&spec) {
            Ok(encoder) => encoder,
            Err(error) => return Err(session.fail(error)),
        };
        session.start_rendering(inputs, encoder)?;

        // Pipeline Step 4: Output
        let blob = session.run(progress).await?;

        info!("🎉 Render complete: {} frames, {:.1} MB ({})",
              session.frames_rendered(),
              blob.len() as f64 / 1024.0 / 1024.0,
              blob.mime_type);

        Ok(blob)
    }

    // ==========================================
    // PRIMING
    // ==========================================

    /// Load assets and decode audio concurrently, then build the timeline
    async fn prime(
        &self,
        request: &RenderRequest,
        canvas: (u32, u32),
        cancel: &CancelHandle,
    ) -> Result<PrimedInputs> {
        info!("📦 Priming: loading {} assets and narration...", request.assets.len());

        if request.assets.is_empty() {
            return Err(CompositorError::EmptyTimeline);
        }

        let image_duration = request
            .default_image_duration
            .unwrap_or(self.config.timeline.default_image_duration);
        if !image_duration.is_finite() || image_duration <= 0.0 {
            return Err(CompositorError::invalid_duration(format!(
                "default image duration must be positive, got {}", image_duration
            )));
        }

        let loader = AssetLoader::new(&self.config).with_canvas(canvas.0, canvas.1);
        let (sources, audio) = tokio::try_join!(
            loader.load_all(&request.assets),
            AudioLoader::decode_async(request.audio.clone()),
        )?;

        if cancel.is_cancelled() {
            return Err(CompositorError::Cancelled);
        }

        info!("   ✅ Narration: {:.1}s, {} Hz, {} channels",
              audio.duration(), audio.sample_rate, audio.channels);

        let timeline = self.build_timeline(&sources, &audio, image_duration)?;

        Ok(PrimedInputs {
            sources,
            audio: Arc::new(audio),
            timeline,
        })
    }

    fn build_timeline(
        &self,
        sources: &[LoadedAsset],
        audio: &AudioBuffer,
        image_duration: f64,
    ) -> Result<Timeline> {
        let assets: Vec<Asset> = sources.iter().map(|source| source.asset.clone()).collect();
        let timeline = Timeline::build(&assets, audio.duration(), image_duration)?;

        info!("   ✅ Timeline: {} segments over {:.1}s", timeline.len(), timeline.total_duration());
        for segment in timeline.segments() {
            debug!("      {:>7.2}s - {:>7.2}s  {}",
                   segment.start_time, segment.end_time, assets[segment.asset_index].id);
        }

        Ok(timeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::loader::tests::wav_bytes;
    use crate::error::ConfigError;
    use crate::render::encoder::recording::RecordingFactory;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let image = image::RgbImage::from_pixel(width, height, image::Rgb(color));
        let mut cursor = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut cursor, image::ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.output.fps = 24;
        config
    }

    fn engine(factory: &RecordingFactory) -> CompositionEngine {
        CompositionEngine::with_encoder_factory(test_config(), Arc::new(factory.clone()))
    }

    fn request(seconds: f64) -> RenderRequest {
        let assets = vec![
            Asset::image("wide", MediaRef::bytes(png_bytes(32, 18, [200, 0, 0]), Some("png"))),
            Asset::image("tall", MediaRef::bytes(png_bytes(18, 32, [0, 200, 0]), Some("png"))),
        ];
        RenderRequest::new(assets, MediaRef::bytes(wav_bytes(seconds, 8_000), Some("wav")))
            .with_image_duration(0.5)
    }

    #[tokio::test]
    async fn test_render_from_in_memory_media() {
        let factory = RecordingFactory::new();
        let engine = engine(&factory);

        let mut ticks = 0;
        let blob = engine
            .render_with_progress(request(1.0), &CancelHandle::new(), |_| ticks += 1)
            .await
            .unwrap();

        assert!(!blob.is_empty());
        assert_eq!(ticks, 24);

        let log = factory.log.lock().unwrap();
        assert_eq!(log.opened, 1);
        assert_eq!(log.frames.len(), 24);
        assert_eq!(log.audio_samples, 8_000);

        let spec = log.spec.unwrap();
        assert_eq!((spec.width, spec.height), (1920, 1080));
        assert_eq!((spec.sample_rate, spec.channels), (8_000, 1));

        // wide image fills the width, centered
        let first = &log.frames[0];
        assert_eq!(first.get_pixel(960, 540), [200, 0, 0]);
        // tall image is pillarboxed
        let later = &log.frames[12];
        assert_eq!(later.get_pixel(960, 540), [0, 200, 0]);
        assert_eq!(later.get_pixel(10, 540), [0, 0, 0]);
    }

    #[tokio::test]
    async fn test_portrait_canvas() {
        let factory = RecordingFactory::new();
        let engine = engine(&factory);

        engine
            .render(request(0.25).with_aspect(AspectRatio::Portrait), &CancelHandle::new())
            .await
            .unwrap();

        let spec = factory.log.lock().unwrap().spec.unwrap();
        assert_eq!((spec.width, spec.height), (1080, 1920));
    }

    #[tokio::test]
    async fn test_no_assets_fails_before_encoding() {
        let factory = RecordingFactory::new();
        let engine = engine(&factory);

        let empty = RenderRequest::new(Vec::new(), MediaRef::bytes(wav_bytes(1.0, 8_000), Some("wav")));
        let result = engine.render(empty, &CancelHandle::new()).await;

        assert!(matches!(result, Err(CompositorError::EmptyTimeline)));
        assert_eq!(factory.log.lock().unwrap().opened, 0);
    }

    #[tokio::test]
    async fn test_bad_audio_fails_before_encoding() {
        let factory = RecordingFactory::new();
        let engine = engine(&factory);

        let mut bad = request(1.0);
        bad.audio = MediaRef::bytes(vec![1u8; 32], Some("mp3"));
        let result = engine.render(bad, &CancelHandle::new()).await;

        assert!(matches!(result, Err(CompositorError::AudioDecode(_))));
        assert_eq!(factory.log.lock().unwrap().opened, 0);
    }

    #[tokio::test]
    async fn test_frame_rate_below_minimum_is_rejected() {
        for fps in [0, 12] {
            let factory = RecordingFactory::new();
            let mut config = test_config();
            config.output.fps = fps;
            let engine = CompositionEngine::with_encoder_factory(config, Arc::new(factory.clone()));

            let result = engine.render(request(1.0), &CancelHandle::new()).await;

            assert!(matches!(
                result,
                Err(CompositorError::Config(ConfigError::InvalidValue { ref key, .. })) if key == "output.fps"
            ));
            assert_eq!(factory.log.lock().unwrap().opened, 0);
        }
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_loading() {
        let factory = RecordingFactory::new();
        let mut config = test_config();
        config.output.quality = 101;
        let engine = CompositionEngine::with_encoder_factory(config, Arc::new(factory.clone()));

        let result = engine.render(request(1.0), &CancelHandle::new()).await;
        assert!(matches!(result, Err(CompositorError::Config(_))));
        assert_eq!(factory.log.lock().unwrap().opened, 0);
    }

    #[tokio::test]
    async fn test_missing_asset_fails_before_encoding() {
        let factory = RecordingFactory::new();
        let engine = engine(&factory);

        let mut missing = request(1.0);
        missing.assets.push(Asset::image("gone", MediaRef::path("/nonexistent/gone.png")));
        let result = engine.render(missing, &CancelHandle::new()).await;

        assert!(matches!(result, Err(CompositorError::AssetLoad(_))));
        assert_eq!(factory.log.lock().unwrap().opened, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_audio_failure_does_not_wait_for_slow_asset() {
        use std::os::unix::fs::PermissionsExt;

        // an ffprobe stand-in that never answers within the test budget
        let dir = tempfile::tempdir().unwrap();
        let stalled = dir.path().join("stalled-ffprobe");
        std::fs::write(&stalled, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&stalled, std::fs::Permissions::from_mode(0o755)).unwrap();

        let factory = RecordingFactory::new();
        let mut config = test_config();
        config.encoder.ffprobe_path = stalled.to_string_lossy().into_owned();
        config.loader.load_timeout_secs = 60;
        let engine = CompositionEngine::with_encoder_factory(config, Arc::new(factory.clone()));

        let slow = RenderRequest::new(
            vec![Asset::video("clip", MediaRef::path(dir.path().join("clip.mp4")))],
            MediaRef::bytes(vec![1u8; 32], Some("mp3")),
        );
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            engine.render(slow, &CancelHandle::new()),
        )
        .await
        .expect("priming should stop at the first failure");

        assert!(matches!(result, Err(CompositorError::AudioDecode(_))));
        assert_eq!(factory.log.lock().unwrap().opened, 0);
    }

    #[tokio::test]
    async fn test_invalid_image_duration() {
        let factory = RecordingFactory::new();
        let engine = engine(&factory);

        let result = engine
            .render(request(1.0).with_image_duration(0.0), &CancelHandle::new())
            .await;
        assert!(matches!(result, Err(CompositorError::InvalidDuration { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_render_is_rejected() {
        let factory = RecordingFactory::new();
        let engine = engine(&factory);

        let _held = engine.active.try_lock().unwrap();
        let result = engine.render(request(1.0), &CancelHandle::new()).await;
        assert!(matches!(result, Err(CompositorError::Busy)));
    }

    #[tokio::test]
    async fn test_cancelled_before_rendering() {
        let factory = RecordingFactory::new();
        let engine = engine(&factory);

        let cancel = CancelHandle::new();
        cancel.cancel();
        let result = engine.render(request(1.0), &cancel).await;

        assert!(matches!(result, Err(CompositorError::Cancelled)));
        assert_eq!(factory.log.lock().unwrap().opened, 0);
    }

    #[tokio::test]
    async fn test_cancel_during_rendering() {
        let factory = RecordingFactory::new();
        let engine = engine(&factory);

        let cancel = CancelHandle::new();
        let trigger = cancel.clone();
        let result = engine
            .render_with_progress(request(1.0), &cancel, |report| {
                if report.frame_index == 5 {
                    trigger.cancel();
                }
            })
            .await;

        assert!(matches!(result, Err(CompositorError::Cancelled)));
        let log = factory.log.lock().unwrap();
        assert!(log.aborted);
        assert!(!log.finished);
        assert_eq!(log.frames.len(), 6);
    }

    #[tokio::test]
    async fn test_empty_encoder_output() {
        let factory = RecordingFactory::producing_nothing();
        let engine = engine(&factory);

        let result = engine.render(request(0.25), &CancelHandle::new()).await;
        assert!(matches!(result, Err(CompositorError::EmptyOutput)));

        // the engine is free again afterwards
        let again = engine.render(request(0.25), &CancelHandle::new()).await;
        assert!(matches!(again, Err(CompositorError::EmptyOutput)));
    }
}
