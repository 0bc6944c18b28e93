//! # Timeline
//!
//! Turns the ordered asset list and the narration length into a gapless
//! sequence of segments. Images hold the screen for a fixed duration, video
//! clips for their intrinsic length, and the asset list wraps around when the
//! narration outlasts it.
//!
//! ```rust
//! use headline_compositor::media::{Asset, MediaRef};
//! use headline_compositor::timeline::Timeline;
//!
//! let assets = vec![Asset::image("cover", MediaRef::path("cover.png"))];
//! let timeline = Timeline::build(&assets, 12.0, 5.0).unwrap();
//! assert_eq!(timeline.len(), 3);
//! assert_eq!(timeline.segment_at(10.0).unwrap().start_time, 10.0);
//! ```

pub mod builder;

pub use builder::{Segment, Timeline, DEFAULT_IMAGE_DURATION};
