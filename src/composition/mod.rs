//! # Composition Engine
//!
//! The composition engine runs one render pass end to end: priming the
//! assets and narration, building the timeline, and driving the render loop
//! into an encoder.

pub mod engine;

// Re-exports for convenience
pub use engine::{CompositionEngine, RenderRequest};
