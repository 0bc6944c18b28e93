use image::imageops::{self, FilterType};
use tracing::debug;

use crate::media::{DecodedHandle, Frame, LoadedAsset};
use crate::timeline::Segment;

/// Letterbox / pillarbox color
pub const BACKGROUND: [u8; 3] = [0, 0, 0];

/// Where a source frame lands on the canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Source-to-canvas scale factor
    pub scale: f64,
}

impl Placement {
    /// Aspect-fit a `src_w`x`src_h` frame inside a `dst_w`x`dst_h` canvas
    ///
    /// Wider sources fill the canvas width and are centered vertically
    /// (letterbox); everything else fills the height and is centered
    /// horizontally (pillarbox). The frame is never cropped or distorted.
    pub fn aspect_fit(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Self {
        if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
            return Self { x: 0, y: 0, width: 0, height: 0, scale: 0.0 };
        }

        let asset_aspect = src_w as f64 / src_h as f64;
        let canvas_aspect = dst_w as f64 / dst_h as f64;

        if asset_aspect > canvas_aspect {
            let scale = dst_w as f64 / src_w as f64;
            let height = ((src_h as f64 * scale).round() as u32).clamp(1, dst_h);
            Self { x: 0, y: (dst_h - height) / 2, width: dst_w, height, scale }
        } else {
            let scale = dst_h as f64 / src_h as f64;
            let width = ((src_w as f64 * scale).round() as u32).clamp(1, dst_w);
            Self { x: (dst_w - width) / 2, y: 0, width, height: dst_h, scale }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScaleKey {
    asset_index: usize,
    frame_index: usize,
    width: u32,
    height: u32,
}

/// Draws the active segment's asset onto the output canvas
///
/// Keeps the last scaled frame around so a still image shown across many
/// ticks is resized only once.
#[derive(Default)]
pub struct FrameCompositor {
    cached: Option<(ScaleKey, Frame)>,
}

impl FrameCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset into the asset for `elapsed`, looping within the occurrence
    pub fn local_offset(segment: &Segment, elapsed: f64) -> f64 {
        if segment.duration <= 0.0 {
            return 0.0;
        }
        (elapsed - segment.start_time).rem_euclid(segment.duration)
    }

    /// Draw `segment` at time `elapsed` into `canvas`
    ///
    /// Returns the placement used, which is empty when the source has no
    /// usable dimensions (the canvas is then left black).
    pub fn draw(
        &mut self,
        canvas: &mut Frame,
        segment: &Segment,
        elapsed: f64,
        sources: &[LoadedAsset],
    ) -> Placement {
        canvas.clear(BACKGROUND);

        let Some(source) = sources.get(segment.asset_index) else {
            return Placement::aspect_fit(0, 0, 0, 0);
        };

        let offset = Self::local_offset(segment, elapsed);
        let (frame, frame_index) = match &source.handle {
            DecodedHandle::Image(image) => (&image.frame, 0),
            DecodedHandle::Video(video) => {
                let index = video.frame_index_at(offset);
                (&video.frames[index], index)
            }
        };

        let (src_w, src_h) = source
            .asset
            .dimensions()
            .unwrap_or((frame.width(), frame.height()));
        let placement = Placement::aspect_fit(src_w, src_h, canvas.width(), canvas.height());
        if placement.is_empty() {
            return placement;
        }

        let key = ScaleKey {
            asset_index: segment.asset_index,
            frame_index,
            width: placement.width,
            height: placement.height,
        };

        if self.cached.as_ref().map(|(cached_key, _)| *cached_key) != Some(key) {
            let scaled = scale_frame(frame, placement.width, placement.height);
            debug!(
                "Scaled asset {} frame {} to {}x{}",
                segment.asset_index, frame_index, placement.width, placement.height
            );
            self.cached = Some((key, scaled));
        }

        if let Some((_, scaled)) = &self.cached {
            imageops::replace(
                canvas.as_image_mut(),
                scaled.as_image(),
                placement.x as i64,
                placement.y as i64,
            );
        }

        placement
    }

    /// Drop the cached scaled frame
    pub fn clear_cache(&mut self) {
        self.cached = None;
    }
}

fn scale_frame(frame: &Frame, width: u32, height: u32) -> Frame {
    if frame.width() == width && frame.height() == height {
        return frame.clone();
    }
    Frame::new(imageops::resize(frame.as_image(), width, height, FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{Asset, ImageHandle, MediaRef, VideoHandle};

    fn image_source(color: [u8; 3], w: u32, h: u32) -> LoadedAsset {
        LoadedAsset {
            asset: Asset::image("img", MediaRef::path("img.png")).with_dimensions(w, h),
            handle: DecodedHandle::Image(ImageHandle { frame: Frame::new_filled(w, h, color) }),
        }
    }

    fn segment(asset_index: usize, start: f64, end: f64, duration: f64) -> Segment {
        Segment { asset_index, start_time: start, end_time: end, duration }
    }

    #[test]
    fn test_wide_source_is_letterboxed() {
        // 2.35:1 into 16:9
        let p = Placement::aspect_fit(2350, 1000, 1920, 1080);
        assert_eq!(p.x, 0);
        assert_eq!(p.width, 1920);
        assert_eq!(p.height, 817);
        assert_eq!(p.y, (1080 - 817) / 2);
    }

    #[test]
    fn test_tall_source_is_pillarboxed() {
        // portrait phone clip into landscape canvas
        let p = Placement::aspect_fit(1080, 1920, 1920, 1080);
        assert_eq!(p.y, 0);
        assert_eq!(p.height, 1080);
        assert_eq!(p.width, 608);
        assert_eq!(p.x, (1920 - 608) / 2);
    }

    #[test]
    fn test_landscape_into_portrait_canvas() {
        let p = Placement::aspect_fit(1920, 1080, 1080, 1920);
        assert_eq!((p.x, p.width), (0, 1080));
        assert_eq!(p.height, 608);
        assert_eq!(p.y, (1920 - 608) / 2);
    }

    #[test]
    fn test_matching_aspect_fills_canvas() {
        let p = Placement::aspect_fit(1280, 720, 1920, 1080);
        assert_eq!((p.x, p.y, p.width, p.height), (0, 0, 1920, 1080));
        assert!((p.scale - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_placement_is_idempotent() {
        let a = Placement::aspect_fit(640, 480, 1080, 1920);
        let b = Placement::aspect_fit(640, 480, 1080, 1920);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_sized_source_yields_empty_placement() {
        assert!(Placement::aspect_fit(0, 480, 1920, 1080).is_empty());
    }

    #[test]
    fn test_draw_pillarboxes_with_black_bars() {
        let sources = vec![image_source([255, 255, 255], 10, 20)];
        let mut canvas = Frame::new_filled(40, 20, [9, 9, 9]);
        let mut compositor = FrameCompositor::new();

        let placement = compositor.draw(&mut canvas, &segment(0, 0.0, 5.0, 5.0), 1.0, &sources);

        assert_eq!((placement.x, placement.width), (15, 10));
        assert_eq!(canvas.get_pixel(0, 10), [0, 0, 0]);
        assert_eq!(canvas.get_pixel(39, 10), [0, 0, 0]);
        assert_eq!(canvas.get_pixel(20, 10), [255, 255, 255]);
    }

    #[test]
    fn test_video_loops_by_segment_duration() {
        let frames = vec![
            Frame::new_filled(4, 4, [10, 0, 0]),
            Frame::new_filled(4, 4, [20, 0, 0]),
            Frame::new_filled(4, 4, [30, 0, 0]),
            Frame::new_filled(4, 4, [40, 0, 0]),
        ];
        let sources = vec![LoadedAsset {
            asset: Asset::video("clip", MediaRef::path("clip.mp4")).with_dimensions(4, 4).with_duration(2.0),
            handle: DecodedHandle::Video(VideoHandle { frames, fps: 2.0, duration: 2.0 }),
        }];
        let seg = segment(0, 10.0, 12.0, 2.0);
        let mut canvas = Frame::new_black(4, 4);
        let mut compositor = FrameCompositor::new();

        assert!((FrameCompositor::local_offset(&seg, 11.5) - 1.5).abs() < 1e-9);

        compositor.draw(&mut canvas, &seg, 10.0, &sources);
        assert_eq!(canvas.get_pixel(1, 1), [10, 0, 0]);
        compositor.draw(&mut canvas, &seg, 11.5, &sources);
        assert_eq!(canvas.get_pixel(1, 1), [40, 0, 0]);
    }

    #[test]
    fn test_redraw_of_same_frame_is_identical() {
        let sources = vec![image_source([0, 128, 255], 30, 10)];
        let seg = segment(0, 0.0, 5.0, 5.0);
        let mut compositor = FrameCompositor::new();

        let mut first = Frame::new_black(16, 9);
        let mut second = Frame::new_black(16, 9);
        let p1 = compositor.draw(&mut first, &seg, 0.5, &sources);
        let p2 = compositor.draw(&mut second, &seg, 4.5, &sources);

        assert_eq!(p1, p2);
        assert_eq!(first.as_rgb_bytes(), second.as_rgb_bytes());
    }
}
