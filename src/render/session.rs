use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::{AudioBuffer, AudioTrack};
use crate::config::MIN_FPS;
use crate::error::{CompositorError, ConfigError, EncoderError, Result};
use crate::media::{Frame, LoadedAsset};
use crate::render::compositor::{FrameCompositor, BACKGROUND};
use crate::render::encoder::Encoder;
use crate::render::sink::{MediaBlob, OutputSink};
use crate::timeline::Timeline;

/// Lifecycle of one render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Priming,
    Rendering,
    Finalizing,
    Done,
    Failed,
}

impl RenderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RenderState::Done | RenderState::Failed)
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderState::Idle => "idle",
            RenderState::Priming => "priming",
            RenderState::Rendering => "rendering",
            RenderState::Finalizing => "finalizing",
            RenderState::Done => "done",
            RenderState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Cloneable abort switch for a render pass
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What one rendered tick produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Zero-based output frame number
    pub frame_index: u64,
    /// Clock time the frame was drawn at
    pub elapsed: f64,
    pub segment_index: usize,
    pub asset_index: usize,
    /// Length of the whole pass in seconds
    pub total_duration: f64,
}

impl TickReport {
    /// Fraction of the pass rendered, 0.0 to 1.0
    pub fn progress(&self) -> f64 {
        if self.total_duration <= 0.0 {
            return 1.0;
        }
        (self.elapsed / self.total_duration).clamp(0.0, 1.0)
    }
}

/// Result of [`RenderSession::step`]
#[derive(Debug)]
pub enum TickOutcome {
    Rendered(TickReport),
    Finished(MediaBlob),
}

/// Everything Priming produces
pub struct PrimedInputs {
    pub sources: Vec<LoadedAsset>,
    pub audio: Arc<AudioBuffer>,
    pub timeline: Timeline,
}

struct ActivePass {
    sources: Vec<LoadedAsset>,
    timeline: Timeline,
    track: AudioTrack,
    encoder: Box<dyn Encoder>,
}

/// One render pass: owns the canvas, the audio clock and the encoder
///
/// Driven one tick at a time through [`step`](Self::step), or to completion
/// with [`run`](Self::run).
pub struct RenderSession {
    state: RenderState,
    fps: u32,
    cancel: CancelHandle,
    canvas: Frame,
    compositor: FrameCompositor,
    pass: Option<ActivePass>,
    frame_index: u64,
}

/// A tick whose canvas is drawn and waiting for the encoder
enum PreparedTick {
    Frame { report: TickReport, next_tick: f64 },
    Drained,
}

impl RenderSession {
    /// Create an idle session; rates below [`MIN_FPS`] are rejected
    pub fn new(width: u32, height: u32, fps: u32, cancel: CancelHandle) -> Result<Self> {
        if fps < MIN_FPS {
            return Err(ConfigError::InvalidValue {
                key: "output.fps".to_string(),
                value: fps.to_string(),
            }
            .into());
        }

        Ok(Self {
            state: RenderState::Idle,
            fps,
            cancel,
            canvas: Frame::new_filled(width, height, BACKGROUND),
            compositor: FrameCompositor::new(),
            pass: None,
            frame_index: 0,
        })
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame_index
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn invalid(&self, action: &str) -> CompositorError {
        CompositorError::InvalidState {
            state: self.state.to_string(),
            action: action.to_string(),
        }
    }

    /// Idle → Priming
    pub fn begin_priming(&mut self) -> Result<()> {
        if self.state != RenderState::Idle {
            return Err(self.invalid("begin priming"));
        }
        self.state = RenderState::Priming;
        Ok(())
    }

    /// Priming → Rendering: start audio playback and take the encoder
    pub fn start_rendering(&mut self, inputs: PrimedInputs, encoder: Box<dyn Encoder>) -> Result<()> {
        if self.state != RenderState::Priming {
            encoder.abort();
            return Err(self.invalid("start rendering"));
        }
        if self.cancel.is_cancelled() {
            encoder.abort();
            return Err(self.fail(CompositorError::Cancelled));
        }

        let mut track = AudioTrack::new(inputs.audio);
        track.start();

        info!(
            "▶️  Rendering {} segments over {:.2}s at {}fps",
            inputs.timeline.len(),
            inputs.timeline.total_duration(),
            self.fps
        );

        self.pass = Some(ActivePass {
            sources: inputs.sources,
            timeline: inputs.timeline,
            track,
            encoder,
        });
        self.frame_index = 0;
        self.state = RenderState::Rendering;
        Ok(())
    }

    /// Move to Failed, discarding encoder output and releasing decoded media
    pub fn fail(&mut self, error: CompositorError) -> CompositorError {
        if self.state.is_terminal() {
            return error;
        }

        warn!("Render pass failed in state {}: {}", self.state, error);
        self.state = RenderState::Failed;
        self.compositor.clear_cache();
        if let Some(mut pass) = self.pass.take() {
            pass.track.stop();
            pass.encoder.abort();
        }
        error
    }

    /// Render exactly one output frame, or finalize once the audio is done
    ///
    /// Encoder calls run on the calling thread; [`run`](Self::run) moves
    /// them off the async runtime.
    pub fn step(&mut self) -> Result<TickOutcome> {
        let (report, next_tick) = match self.prepare_tick()? {
            PreparedTick::Drained => return self.finalize().map(TickOutcome::Finished),
            PreparedTick::Frame { report, next_tick } => (report, next_tick),
        };

        let submitted = match self.pass.as_mut() {
            Some(pass) => Self::submit(pass, &self.canvas, next_tick),
            None => return Err(self.invalid("step")),
        };
        if let Err(error) = submitted {
            return Err(self.fail(error));
        }

        Ok(TickOutcome::Rendered(self.commit(report)))
    }

    /// Draw the canvas for the current clock time
    fn prepare_tick(&mut self) -> Result<PreparedTick> {
        if self.state != RenderState::Rendering {
            return Err(self.invalid("step"));
        }
        if self.cancel.is_cancelled() {
            return Err(self.fail(CompositorError::Cancelled));
        }

        let Some(pass) = self.pass.as_ref() else {
            return Err(self.invalid("step"));
        };

        let elapsed = pass.track.clock().elapsed();
        let total = pass.timeline.total_duration();
        if elapsed >= total {
            return Ok(PreparedTick::Drained);
        }

        let Some(segment_index) = pass.timeline.index_at(elapsed) else {
            let details = format!("no segment covers {:.3}s of {:.3}s", elapsed, total);
            return Err(self.fail(CompositorError::invalid_duration(details)));
        };
        let segment = pass.timeline.segments()[segment_index];

        self.compositor.draw(&mut self.canvas, &segment, elapsed, &pass.sources);

        Ok(PreparedTick::Frame {
            report: TickReport {
                frame_index: self.frame_index,
                elapsed,
                segment_index,
                asset_index: segment.asset_index,
                total_duration: total,
            },
            next_tick: (self.frame_index + 1) as f64 / self.fps as f64,
        })
    }

    /// Hand the canvas and the narration under it to the encoder
    fn submit(pass: &mut ActivePass, canvas: &Frame, next_tick: f64) -> Result<()> {
        pass.encoder.submit_frame(canvas)?;
        let samples = pass.track.pump_until(next_tick);
        pass.encoder.submit_audio_samples(samples)
    }

    fn commit(&mut self, report: TickReport) -> TickReport {
        if report.frame_index % self.fps as u64 == 0 {
            debug!(
                "Frame {} at {:.2}s: segment {} (asset {})",
                report.frame_index, report.elapsed, report.segment_index, report.asset_index
            );
        }
        self.frame_index += 1;
        report
    }

    /// Submit the prepared tick from the blocking pool
    async fn submit_blocking(&mut self, next_tick: f64) -> Result<()> {
        let Some(mut pass) = self.pass.take() else {
            return Err(self.invalid("step"));
        };
        let canvas = std::mem::replace(&mut self.canvas, Frame::new_black(0, 0));

        let joined = tokio::task::spawn_blocking(move || {
            let submitted = Self::submit(&mut pass, &canvas, next_tick);
            (pass, canvas, submitted)
        })
        .await;

        match joined {
            Ok((pass, canvas, submitted)) => {
                self.pass = Some(pass);
                self.canvas = canvas;
                submitted.map_err(|error| self.fail(error))
            }
            Err(error) => Err(self.fail(encoder_task_failed(error))),
        }
    }

    /// Rendering → Finalizing → Done
    fn finalize(&mut self) -> Result<MediaBlob> {
        let encoder = self.begin_finalizing()?;
        let flushed = Self::flush(encoder);
        self.complete(flushed)
    }

    async fn finalize_blocking(&mut self) -> Result<MediaBlob> {
        let encoder = self.begin_finalizing()?;
        let flushed = tokio::task::spawn_blocking(move || Self::flush(encoder))
            .await
            .unwrap_or_else(|error| Err(encoder_task_failed(error)));
        self.complete(flushed)
    }

    fn begin_finalizing(&mut self) -> Result<Box<dyn Encoder>> {
        self.state = RenderState::Finalizing;
        self.compositor.clear_cache();

        let Some(mut pass) = self.pass.take() else {
            return Err(self.fail(CompositorError::EmptyOutput));
        };
        pass.track.stop();
        Ok(pass.encoder)
    }

    fn flush(encoder: Box<dyn Encoder>) -> Result<MediaBlob> {
        let mime_type = encoder.mime_type().to_string();
        encoder
            .finish()
            .and_then(|chunks| OutputSink::finalize(chunks, &mime_type))
    }

    fn complete(&mut self, flushed: Result<MediaBlob>) -> Result<MediaBlob> {
        match flushed {
            Ok(blob) => {
                self.state = RenderState::Done;
                info!("🏁 Render pass done: {} frames, {} bytes", self.frame_index, blob.len());
                Ok(blob)
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Drive the pass to completion, yielding to the runtime once per tick
    ///
    /// Frames are drawn on the caller's task; encoder submission and the
    /// final flush run on tokio's blocking pool.
    pub async fn run<F>(&mut self, mut progress: F) -> Result<MediaBlob>
    where
        F: FnMut(&TickReport),
    {
        loop {
            let (report, next_tick) = match self.prepare_tick()? {
                PreparedTick::Drained => return self.finalize_blocking().await,
                PreparedTick::Frame { report, next_tick } => (report, next_tick),
            };

            self.submit_blocking(next_tick).await?;
            let report = self.commit(report);
            progress(&report);
            tokio::task::yield_now().await;
        }
    }
}

fn encoder_task_failed(error: tokio::task::JoinError) -> CompositorError {
    EncoderError::EncodingFailed {
        reason: format!("encoder task failed: {}", error),
    }
    .into()
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if let Some(pass) = self.pass.take() {
            debug!("Render session dropped in state {}, aborting encoder", self.state);
            pass.encoder.abort();
        }
    }
}
