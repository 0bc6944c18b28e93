use tracing::debug;

use crate::error::{CompositorError, Result};
use crate::media::{Asset, AssetKind};

/// Seconds a still image stays on screen unless configured otherwise
pub const DEFAULT_IMAGE_DURATION: f64 = 5.0;

/// A time slice of the output bound to one asset occurrence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Index into the asset list
    pub asset_index: usize,

    /// Start of the slice in seconds (inclusive)
    pub start_time: f64,

    /// End of the slice in seconds (exclusive), clamped to the total duration
    pub end_time: f64,

    /// Length of the asset occurrence; only the final segment may have
    /// `end_time - start_time < duration`
    pub duration: f64,
}

impl Segment {
    /// Whether `t` falls inside `[start_time, end_time)`
    pub fn contains(&self, t: f64) -> bool {
        self.start_time <= t && t < self.end_time
    }

    /// Playable span of this segment
    pub fn span(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Ordered, contiguous segments covering `[0, total_duration)`
#[derive(Debug, Clone)]
pub struct Timeline {
    segments: Vec<Segment>,
    total_duration: f64,
}

impl Timeline {
    /// Build the segment table for `assets` across `total_duration` seconds
    ///
    /// Videos without a usable natural duration fall back to
    /// `default_image_duration`.
    pub fn build(assets: &[Asset], total_duration: f64, default_image_duration: f64) -> Result<Self> {
        if assets.is_empty() {
            return Err(CompositorError::EmptyTimeline);
        }

        if !total_duration.is_finite() || total_duration <= 0.0 {
            return Err(CompositorError::invalid_duration(format!(
                "total duration must be positive, got {}", total_duration
            )));
        }

        if !default_image_duration.is_finite() || default_image_duration <= 0.0 {
            return Err(CompositorError::invalid_duration(format!(
                "default image duration must be positive, got {}", default_image_duration
            )));
        }

        let mut segments = Vec::new();
        let mut cursor = 0.0;
        let mut asset_index = 0;

        while cursor < total_duration {
            let duration = occurrence_duration(&assets[asset_index], default_image_duration);
            let next = cursor + duration;

            segments.push(Segment {
                asset_index,
                start_time: cursor,
                end_time: next.min(total_duration),
                duration,
            });

            cursor = next;
            asset_index = (asset_index + 1) % assets.len();
        }

        debug!(
            "Built timeline: {} segments from {} assets over {:.2}s",
            segments.len(), assets.len(), total_duration
        );

        Ok(Self { segments, total_duration })
    }

    /// Find the segment that owns instant `t`
    ///
    /// An instant on a boundary belongs to the later segment. Returns `None`
    /// outside `[0, total_duration)`.
    pub fn segment_at(&self, t: f64) -> Option<&Segment> {
        self.index_at(t).map(|i| &self.segments[i])
    }

    /// Index of the segment that owns instant `t`
    pub fn index_at(&self, t: f64) -> Option<usize> {
        if !(t >= 0.0 && t < self.total_duration) {
            return None;
        }

        let after = self.segments.partition_point(|s| s.start_time <= t);
        let index = after.checked_sub(1)?;
        self.segments[index].contains(t).then_some(index)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }
}

fn occurrence_duration(asset: &Asset, default_image_duration: f64) -> f64 {
    match asset.kind {
        AssetKind::Image => default_image_duration,
        AssetKind::Video => match asset.natural_duration {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => default_image_duration,
        },
    }
}
