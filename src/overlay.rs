//! Overlay coordinate mapper: normalized detections to viewport pixels.
//!
//! The capture resolution is reported landscape-relative, so portrait-family
//! orientations swap effective width and height first. The mapper then
//! applies the same aspect-fill rule the preprocessor uses (uniform scale,
//! center crop) so the drawn boxes line up with what the model actually saw.
//!
//! Pure and stateless: the viewport can change independently of frame
//! delivery (device rotation, window resize), so nothing is cached and the
//! result is re-derivable from the published frame result alone.

use crate::decode::Detection;
use crate::frame::{Orientation, Resolution};
use crate::pipeline::FrameResult;

/// Target drawing surface size in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// A detection box re-expressed in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub class_id: usize,
    pub confidence: f32,
}

/// Map a published frame result into viewport-space boxes.
pub fn map_frame(result: &FrameResult, source: Resolution, viewport: Viewport) -> Vec<ViewportBox> {
    map_detections(&result.detections, result.orientation, source, viewport)
}

/// Map a detection set normalized against `source` into `viewport` pixels.
pub fn map_detections(
    detections: &[Detection],
    orientation: Option<Orientation>,
    source: Resolution,
    viewport: Viewport,
) -> Vec<ViewportBox> {
    let (effective_w, effective_h) = match orientation {
        Some(o) if o.is_portrait() => (source.height as f32, source.width as f32),
        _ => (source.width as f32, source.height as f32),
    };

    let scale = (viewport.width / effective_w).max(viewport.height / effective_h);
    let scaled_w = effective_w * scale;
    let scaled_h = effective_h * scale;
    let crop_left = ((scaled_w - viewport.width) / 2.0).max(0.0);
    let crop_top = ((scaled_h - viewport.height) / 2.0).max(0.0);

    detections
        .iter()
        .map(|det| ViewportBox {
            x: det.bbox.x * scaled_w - crop_left,
            y: det.bbox.y * scaled_h - crop_top,
            width: det.bbox.width * scaled_w,
            height: det.bbox.height * scaled_h,
            class_id: det.class_id,
            confidence: det.confidence,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::NormalizedBox;

    fn det(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection {
            class_id: 3,
            confidence: 0.8,
            bbox: NormalizedBox {
                x,
                y,
                width: w,
                height: h,
            },
        }
    }

    #[test]
    fn uniform_downscale_without_crop() {
        let boxes = map_detections(
            &[det(0.5, 0.5, 0.2, 0.4)],
            Some(Orientation::LandscapeRight),
            Resolution::new(400, 300),
            Viewport::new(200.0, 150.0),
        );
        let b = boxes[0];
        assert!((b.x - 100.0).abs() < 1e-4);
        assert!((b.y - 75.0).abs() < 1e-4);
        assert!((b.width - 40.0).abs() < 1e-4);
        assert!((b.height - 60.0).abs() < 1e-4);
        assert_eq!(b.class_id, 3);
    }

    #[test]
    fn narrow_viewport_center_crops_horizontally() {
        // 400x300 into 200x300: scale 1.0, 100px cropped off each side.
        let boxes = map_detections(
            &[det(0.5, 0.0, 0.25, 1.0)],
            None,
            Resolution::new(400, 300),
            Viewport::new(200.0, 300.0),
        );
        let b = boxes[0];
        assert!((b.x - 100.0).abs() < 1e-4);
        assert!((b.y - 0.0).abs() < 1e-4);
        assert!((b.width - 100.0).abs() < 1e-4);
        assert!((b.height - 300.0).abs() < 1e-4);
    }

    #[test]
    fn portrait_orientation_swaps_source_axes() {
        // Capture is 400x300 landscape-relative; in portrait the effective
        // source is 300x400 and it fills a 300x400 viewport exactly.
        let boxes = map_detections(
            &[det(0.0, 0.0, 1.0, 1.0)],
            Some(Orientation::Portrait),
            Resolution::new(400, 300),
            Viewport::new(300.0, 400.0),
        );
        let b = boxes[0];
        assert!((b.width - 300.0).abs() < 1e-4);
        assert!((b.height - 400.0).abs() < 1e-4);
        assert!(b.x.abs() < 1e-4 && b.y.abs() < 1e-4);
    }

    #[test]
    fn mapping_is_idempotent_across_calls() {
        let dets = [det(0.1, 0.2, 0.3, 0.4), det(0.5, 0.6, 0.1, 0.1)];
        let source = Resolution::new(1920, 1080);
        let viewport = Viewport::new(390.0, 844.0);
        let first = map_detections(&dets, Some(Orientation::Portrait), source, viewport);
        let second = map_detections(&dets, Some(Orientation::Portrait), source, viewport);
        assert_eq!(first, second);
    }

    #[test]
    fn scale_then_inverse_recovers_normalized_box() {
        let original = det(0.3, 0.25, 0.4, 0.5);
        let source = Resolution::new(640, 480);
        // Viewport is an exact multiple of the source, so there is no crop
        // and the mapping is a pure uniform scale.
        let factor = 2.5f32;
        let viewport = Viewport::new(640.0 * factor, 480.0 * factor);
        let mapped = map_detections(&[original], None, source, viewport)[0];
        let back_x = mapped.x / (640.0 * factor);
        let back_y = mapped.y / (480.0 * factor);
        let back_w = mapped.width / (640.0 * factor);
        let back_h = mapped.height / (480.0 * factor);
        assert!((back_x - original.bbox.x).abs() < 1e-5);
        assert!((back_y - original.bbox.y).abs() < 1e-5);
        assert!((back_w - original.bbox.width).abs() < 1e-5);
        assert!((back_h - original.bbox.height).abs() < 1e-5);
    }
}
