//! Threshold-based detector for synthetic scenes.

use crate::detector::{Detector, DetectorError};
use crate::labels;
use crate::types::{BBox, Detection, PreprocessedFrame};

/// Finds bright connected regions and reports their bounding boxes.
///
/// This is not a stand-in for a real model's accuracy; it exists so the
/// pipeline has a detector whose output is correct by construction against
/// the synthetic capture source. Boxes come back in the preprocessed frame's
/// coordinate space, like any other backend.
pub struct SyntheticDetector {
    /// Minimum luminance for a pixel to count as foreground.
    threshold: u8,
    /// Regions smaller than this many pixels are noise.
    min_area: u32,
}

impl Default for SyntheticDetector {
    fn default() -> Self {
        Self {
            threshold: 180,
            min_area: 9,
        }
    }
}

impl SyntheticDetector {
    pub fn new(threshold: u8, min_area: u32) -> Self {
        Self {
            threshold,
            min_area,
        }
    }
}

impl Detector for SyntheticDetector {
    fn detect(
        &mut self,
        frame: &PreprocessedFrame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, DetectorError> {
        let img = frame.image.as_rgb();
        let (w, h) = (img.width() as usize, img.height() as usize);
        if w == 0 || h == 0 {
            return Ok(Vec::new());
        }

        let luma_at = |x: usize, y: usize| img.get_pixel(x as u32, y as u32).0[0];

        let mut visited = vec![false; w * h];
        let mut stack: Vec<(usize, usize)> = Vec::new();
        let mut detections = Vec::new();

        for sy in 0..h {
            for sx in 0..w {
                if visited[sy * w + sx] || luma_at(sx, sy) < self.threshold {
                    continue;
                }

                // Flood-fill one bright component, tracking its extent.
                let (mut min_x, mut min_y, mut max_x, mut max_y) = (sx, sy, sx, sy);
                let mut luma_sum: u64 = 0;
                let mut area: u32 = 0;

                visited[sy * w + sx] = true;
                stack.push((sx, sy));
                while let Some((x, y)) = stack.pop() {
                    area += 1;
                    luma_sum += u64::from(luma_at(x, y));
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);

                    let mut push = |nx: usize, ny: usize, visited: &mut [bool]| {
                        let idx = ny * w + nx;
                        if !visited[idx] && luma_at(nx, ny) >= self.threshold {
                            visited[idx] = true;
                            stack.push((nx, ny));
                        }
                    };
                    if x > 0 {
                        push(x - 1, y, &mut visited);
                    }
                    if x + 1 < w {
                        push(x + 1, y, &mut visited);
                    }
                    if y > 0 {
                        push(x, y - 1, &mut visited);
                    }
                    if y + 1 < h {
                        push(x, y + 1, &mut visited);
                    }
                }

                if area < self.min_area {
                    continue;
                }

                let confidence = (luma_sum as f32 / (area as f32 * 255.0)).clamp(0.0, 1.0);
                if confidence < confidence_threshold {
                    continue;
                }

                detections.push(Detection {
                    bbox: BBox::new(
                        min_x as f32,
                        min_y as f32,
                        (max_x - min_x + 1) as f32,
                        (max_y - min_y + 1) as f32,
                    ),
                    class_id: labels::CLASS_CAR,
                    confidence,
                });
            }
        }

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use frame_ingest::ImageBuf;
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::types::PreprocessInfo;

    fn frame_with(image: RgbImage) -> PreprocessedFrame {
        let info = PreprocessInfo {
            roi_applied: false,
            roi: crate::types::PixelRect::new(0, 0, image.width(), image.height()),
            resize_width: image.width(),
            resize_height: image.height(),
        };
        PreprocessedFrame {
            source_frame_id: 1,
            capture_time: Instant::now(),
            preprocess_time: Instant::now(),
            image: ImageBuf::new(image),
            info,
        }
    }

    fn paint(img: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, shade: u8) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                img.put_pixel(x, y, Rgb([shade; 3]));
            }
        }
    }

    #[test]
    fn finds_a_bright_box_on_dark_background() {
        let mut img = RgbImage::from_pixel(64, 48, Rgb([40; 3]));
        paint(&mut img, 10, 12, 8, 6, 230);

        let mut det = SyntheticDetector::default();
        let found = det.detect(&frame_with(img), 0.5).unwrap();

        assert_eq!(found.len(), 1);
        let b = found[0].bbox;
        assert_eq!((b.x, b.y, b.w, b.h), (10.0, 12.0, 8.0, 6.0));
        assert!(found[0].confidence > 0.8);
    }

    #[test]
    fn separates_disjoint_regions() {
        let mut img = RgbImage::from_pixel(64, 48, Rgb([40; 3]));
        paint(&mut img, 4, 4, 6, 6, 230);
        paint(&mut img, 40, 30, 10, 8, 220);

        let mut det = SyntheticDetector::default();
        let found = det.detect(&frame_with(img), 0.5).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn ignores_regions_below_the_minimum_area() {
        let mut img = RgbImage::from_pixel(64, 48, Rgb([40; 3]));
        paint(&mut img, 4, 4, 2, 2, 230);

        let mut det = SyntheticDetector::default();
        let found = det.detect(&frame_with(img), 0.5).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn honours_the_confidence_threshold() {
        let mut img = RgbImage::from_pixel(64, 48, Rgb([40; 3]));
        // Shade 190 gives confidence ~0.75.
        paint(&mut img, 10, 10, 8, 8, 190);

        let mut det = SyntheticDetector::default();
        assert_eq!(det.detect(&frame_with(img.clone()), 0.9).unwrap().len(), 0);
        assert_eq!(det.detect(&frame_with(img), 0.5).unwrap().len(), 1);
    }
}
