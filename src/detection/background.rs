// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Adaptive per-pixel Gaussian background model with shadow labelling.
//!
//! Each pixel keeps a running mean colour and an isotropic variance. A pixel
//! is background while its squared distance to the mean stays within
//! `var_threshold` variances. Pixels that fail that test but look like a
//! darker copy of the background are labelled as shadow.

use image::{GrayImage, Luma, RgbImage};

/// Mask value for foreground pixels
pub const FOREGROUND: u8 = 255;
/// Mask value for shadow pixels
pub const SHADOW: u8 = 127;

const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 75.0;
/// Darkest ratio still considered a shadow
const SHADOW_TAU: f32 = 0.5;

pub struct BackgroundModel {
    width: u32,
    height: u32,
    mean: Vec<[f32; 3]>,
    variance: Vec<f32>,
    history: u32,
    var_threshold: f32,
    frames: u32,
}

impl BackgroundModel {
    pub fn new(history: u32, var_threshold: f32) -> Self {
        Self {
            width: 0,
            height: 0,
            mean: Vec::new(),
            variance: Vec::new(),
            history: history.max(1),
            var_threshold: var_threshold.max(1.0),
            frames: 0,
        }
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Update the model with `image` and return its foreground mask.
    ///
    /// The first frame (or a frame of a new size) seeds the model and yields
    /// an empty mask.
    pub fn apply(&mut self, image: &RgbImage) -> GrayImage {
        let (w, h) = image.dimensions();
        if self.frames == 0 || w != self.width || h != self.height {
            self.seed(image);
            return GrayImage::new(w, h);
        }

        self.frames = self.frames.saturating_add(1);
        let alpha = 1.0 / self.frames.min(self.history) as f32;
        let mut mask = GrayImage::new(w, h);

        for (i, (x, y, px)) in image.enumerate_pixels().enumerate() {
            let sample = [px[0] as f32, px[1] as f32, px[2] as f32];
            let mean = &mut self.mean[i];
            let var = self.variance[i];

            let d = [sample[0] - mean[0], sample[1] - mean[1], sample[2] - mean[2]];
            let dist2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];

            let label = if dist2 < self.var_threshold * var {
                0
            } else if is_shadow(&sample, mean, var, self.var_threshold) {
                SHADOW
            } else {
                FOREGROUND
            };

            for c in 0..3 {
                mean[c] += alpha * d[c];
            }
            if label != FOREGROUND {
                self.variance[i] = (var + alpha * (dist2 - var)).clamp(VAR_MIN, VAR_MAX);
            }
            if label != 0 {
                mask.put_pixel(x, y, Luma([label]));
            }
        }
        mask
    }

    fn seed(&mut self, image: &RgbImage) {
        self.width = image.width();
        self.height = image.height();
        self.mean = image
            .pixels()
            .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
            .collect();
        self.variance = vec![VAR_INIT; self.mean.len()];
        self.frames = 1;
    }
}

/// Darker, same-chromaticity copy of the background
fn is_shadow(sample: &[f32; 3], mean: &[f32; 3], var: f32, var_threshold: f32) -> bool {
    let norm2 = mean[0] * mean[0] + mean[1] * mean[1] + mean[2] * mean[2];
    if norm2 <= f32::EPSILON {
        return false;
    }
    let a = (sample[0] * mean[0] + sample[1] * mean[1] + sample[2] * mean[2]) / norm2;
    if !(SHADOW_TAU..=1.0).contains(&a) {
        return false;
    }
    let dist2a: f32 = (0..3).map(|c| (a * mean[c] - sample[c]).powi(2)).sum();
    dist2a < var_threshold * var * a * a
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(w: u32, h: u32, value: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(value))
    }

    fn count(mask: &GrayImage, value: u8) -> usize {
        mask.pixels().filter(|p| p[0] == value).count()
    }

    #[test]
    fn test_static_scene_is_background() {
        let mut model = BackgroundModel::new(500, 16.0);
        let frame = solid(32, 24, [90, 120, 150]);
        for _ in 0..10 {
            let mask = model.apply(&frame);
            assert_eq!(count(&mask, 0), 32 * 24);
        }
        assert_eq!(model.frames(), 10);
    }

    #[test]
    fn test_new_object_is_foreground() {
        let mut model = BackgroundModel::new(500, 16.0);
        let background = solid(32, 24, [40, 40, 40]);
        for _ in 0..5 {
            model.apply(&background);
        }

        let mut scene = background.clone();
        for y in 4..12 {
            for x in 4..12 {
                scene.put_pixel(x, y, Rgb([230, 220, 40]));
            }
        }
        let mask = model.apply(&scene);
        assert_eq!(count(&mask, FOREGROUND), 64);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_darker_copy_is_shadow() {
        let mut model = BackgroundModel::new(500, 16.0);
        let background = solid(8, 8, [200, 160, 120]);
        for _ in 0..5 {
            model.apply(&background);
        }

        // 70% brightness, same hue
        let shaded = solid(8, 8, [140, 112, 84]);
        let mask = model.apply(&shaded);
        assert_eq!(count(&mask, SHADOW), 64);
    }

    #[test]
    fn test_resize_reseeds() {
        let mut model = BackgroundModel::new(500, 16.0);
        model.apply(&solid(8, 8, [10, 10, 10]));
        model.apply(&solid(8, 8, [10, 10, 10]));
        let mask = model.apply(&solid(16, 16, [250, 250, 250]));
        assert_eq!(mask.dimensions(), (16, 16));
        assert_eq!(count(&mask, 0), 256);
        assert_eq!(model.frames(), 1);
    }
}
