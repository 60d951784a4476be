//! Data types flowing between preprocessing, inference, and tracking.

use std::time::Instant;

use frame_ingest::ImageBuf;

/// Axis-aligned rectangle in raw-image pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Geometry recorded while preprocessing a frame, used later to map detector
/// output back into raw-image pixels.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreprocessInfo {
    /// Whether a crop region narrower than the full image was applied.
    pub roi_applied: bool,
    /// The effective crop rectangle in raw-image pixels (the full image when
    /// cropping is disabled).
    pub roi: PixelRect,
    /// Width the crop was resized to before inference.
    pub resize_width: u32,
    /// Height the crop was resized to before inference.
    pub resize_height: u32,
}

/// A frame after crop + resize, destined for the detector.
#[derive(Clone, Debug)]
pub struct PreprocessedFrame {
    /// `sequence_id` of the originating raw frame.
    pub source_frame_id: u64,
    pub capture_time: Instant,
    pub preprocess_time: Instant,
    /// Resized pixels the detector consumes.
    pub image: ImageBuf,
    pub info: PreprocessInfo,
}

/// Axis-aligned bounding box, `(x, y)` top-left plus extent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    /// Intersection-over-union with `other`; 0 when the union is empty.
    pub fn iou(&self, other: &BBox) -> f32 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.w).min(other.x + other.w);
        let iy2 = (self.y + self.h).min(other.y + other.h);

        let iw = (ix2 - ix1).max(0.0);
        let ih = (iy2 - iy1).max(0.0);
        let inter = iw * ih;

        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }
}

/// One detected object, in the preprocessed frame's coordinate space.
#[derive(Clone, Copy, Debug)]
pub struct Detection {
    pub bbox: BBox,
    pub class_id: i32,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
}

/// The result of one detector invocation.
#[derive(Clone, Debug)]
pub struct Detections {
    /// When the result was produced; downstream uses this to reason about
    /// staleness.
    pub inference_time: Instant,
    /// `sequence_id` of the raw frame the input was derived from.
    pub source_frame_id: u64,
    /// Geometry of the input, carried through so tracking can map boxes back
    /// to raw pixels.
    pub preprocess_info: PreprocessInfo,
    pub items: Vec<Detection>,
}

impl Detections {
    /// An empty result that still carries correct provenance; used when the
    /// detector fails and the pipeline degrades instead of tearing down.
    pub fn empty_for(frame: &PreprocessedFrame) -> Self {
        Self {
            inference_time: Instant::now(),
            source_frame_id: frame.source_frame_id,
            preprocess_info: frame.info,
            items: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BBox::new(10.0, 20.0, 30.0, 40.0);
        assert!(close(b.iou(&b), 1.0));
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(100.0, 100.0, 10.0, 10.0);
        assert!(close(a.iou(&b), 0.0));
    }

    #[test]
    fn iou_of_half_overlap() {
        // Two 10x10 boxes offset by half a width: inter 50, union 150.
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 0.0, 10.0, 10.0);
        assert!(close(a.iou(&b), 50.0 / 150.0));
    }

    #[test]
    fn degenerate_boxes_do_not_divide_by_zero() {
        let a = BBox::new(0.0, 0.0, 0.0, 0.0);
        let b = BBox::new(0.0, 0.0, 0.0, 0.0);
        assert!(close(a.iou(&b), 0.0));
    }
}
