//! # Headline-Compositor
//!
//! Turn a narration track and an ordered set of images and video clips into a
//! single synchronized video.
//!
//! The compositor lays the visuals out across the narration, renders one
//! frame per output tick against the audio clock, fits every asset into a
//! fixed 16:9 or 9:16 canvas, and muxes picture and sound into one MP4.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use headline_compositor::{
//!     composition::{CompositionEngine, RenderRequest},
//!     config::{AspectRatio, Config},
//!     media::{Asset, MediaRef},
//!     render::CancelHandle,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let assets = vec![
//!     Asset::image("title", MediaRef::path("01_title.png")),
//!     Asset::video("street", MediaRef::path("02_street.mp4")),
//! ];
//!
//! let request = RenderRequest::new(assets, MediaRef::path("narration.mp3"))
//!     .with_aspect(AspectRatio::Portrait);
//!
//! let engine = CompositionEngine::new(Config::default());
//! let video = engine.render(request, &CancelHandle::new()).await?;
//! video.write_atomic("headline.mp4")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`media`] - Asset descriptions and the concurrent asset loader
//! - [`audio`] - Narration decoding and the playback clock
//! - [`timeline`] - Segment layout across the narration
//! - [`render`] - Frame compositing, the render loop and encoder backends
//! - [`composition`] - The engine tying a render pass together
//! - [`config`] - Configuration management

pub mod audio;
pub mod composition;
pub mod config;
pub mod error;
pub mod media;
pub mod render;
pub mod timeline;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{CompositionEngine, RenderRequest},
    config::{AspectRatio, Config},
    error::{CompositorError, Result},
    media::{Asset, MediaRef},
    render::{CancelHandle, MediaBlob},
};
