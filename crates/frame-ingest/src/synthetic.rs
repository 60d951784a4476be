//! Procedural capture source used for development and testing.

use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::source::CaptureSource;
use crate::types::{CaptureError, ImageBuf};

/// Number of simulated vehicles in the scene.
const ACTOR_COUNT: usize = 3;
/// Luminance of the brightest background element; actors render well above
/// this so a threshold detector can separate them.
const BACKGROUND_CEILING: u8 = 110;

struct Actor {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    vx: f32,
    vy: f32,
    shade: u8,
}

/// Renders a dark road scene with bright rectangles drifting through it.
///
/// The scene is deliberately simple: background below [`BACKGROUND_CEILING`],
/// actors at 220+, so the synthetic detector can recover the actor boxes and
/// the full camera → tracking path can run without any hardware or model.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    fps: f64,
    tick: u64,
    actors: Vec<Actor>,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        let width = width.max(32);
        let height = height.max(32);
        let mut rng = StdRng::seed_from_u64(0x6463_7031);

        let actors = (0..ACTOR_COUNT)
            .map(|i| {
                let w = width as f32 * rng.gen_range(0.08..0.14);
                let h = height as f32 * rng.gen_range(0.08..0.14);
                Actor {
                    x: rng.gen_range(0.0..(width as f32 - w)),
                    y: height as f32 * (0.55 + 0.12 * i as f32),
                    w,
                    h,
                    vx: rng.gen_range(1.0..3.5) * if i % 2 == 0 { 1.0 } else { -1.0 },
                    vy: 0.0,
                    shade: 220 + (i as u8 % 3) * 10,
                }
            })
            .collect();

        Self {
            width,
            height,
            fps,
            tick: 0,
            actors,
            rng,
        }
    }

    fn advance(&mut self) {
        let (w, h) = (self.width as f32, self.height as f32);
        for actor in &mut self.actors {
            actor.x += actor.vx;
            actor.y += actor.vy;
            actor.vy += self.rng.gen_range(-0.05..0.05);
            actor.vy = actor.vy.clamp(-0.5, 0.5);

            // Wrap horizontally, keep inside the lower half vertically.
            if actor.x > w {
                actor.x = -actor.w;
            } else if actor.x + actor.w < 0.0 {
                actor.x = w;
            }
            actor.y = actor.y.clamp(h * 0.45, h - actor.h - 1.0);
        }
        self.tick = self.tick.wrapping_add(1);
    }

    fn render(&self) -> RgbImage {
        let mut img = RgbImage::new(self.width, self.height);

        // Road: vertical gradient, darker toward the top.
        for y in 0..self.height {
            let base = 30 + ((y * 40) / self.height.max(1)) as u8;
            for x in 0..self.width {
                img.put_pixel(x, y, Rgb([base, base, base]));
            }
        }

        // Scrolling dashed lane markers at one and two thirds of the width.
        let dash_phase = (self.tick.wrapping_mul(4)) as u32;
        for lane in [self.width / 3, (self.width * 2) / 3] {
            for y in 0..self.height {
                if (y.wrapping_add(dash_phase) / 12) % 2 == 0 {
                    for x in lane.saturating_sub(1)..(lane + 1).min(self.width) {
                        img.put_pixel(x, y, Rgb([BACKGROUND_CEILING; 3]));
                    }
                }
            }
        }

        for actor in &self.actors {
            let x0 = actor.x.max(0.0) as u32;
            let y0 = actor.y.max(0.0) as u32;
            let x1 = ((actor.x + actor.w) as u32).min(self.width);
            let y1 = ((actor.y + actor.h) as u32).min(self.height);
            for y in y0..y1 {
                for x in x0..x1 {
                    img.put_pixel(x, y, Rgb([actor.shade; 3]));
                }
            }
        }

        img
    }
}

impl CaptureSource for SyntheticSource {
    fn read(&mut self) -> Result<ImageBuf, CaptureError> {
        self.advance();
        Ok(ImageBuf::new(self.render()))
    }

    fn nominal_fps(&self) -> f64 {
        self.fps
    }
}
