// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Per-frame motion measurement

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::contour_area;
use imageproc::distance_transform::Norm;
use imageproc::morphology;

use super::BackgroundModel;
use crate::capture::Frame;
use crate::config::MotionConfig;

/// Mask values above this count as motion; drops the shadow label.
const MASK_THRESHOLD: u8 = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionMeasurement {
    /// Share of the analysed frame covered by significant regions, 0-100
    pub motion_percentage: f64,
    /// Number of significant regions
    pub contour_count: usize,
}

/// Downscale, subtract background, measure. One per detector connection.
pub struct MotionAnalyzer {
    resolution: (u32, u32),
    min_contour_area: f64,
    warmup_frames: u32,
    history: u32,
    var_threshold: f32,
    model: BackgroundModel,
    frames_seen: u32,
}

impl MotionAnalyzer {
    pub fn new(config: &MotionConfig) -> Self {
        let (w, h) = config.resolution;
        Self {
            resolution: (w.max(1), h.max(1)),
            min_contour_area: config.min_contour_area,
            warmup_frames: config.warmup_frames,
            history: config.history,
            var_threshold: config.var_threshold,
            model: BackgroundModel::new(config.history, config.var_threshold),
            frames_seen: 0,
        }
    }

    /// Feed a frame. Returns `None` until the warm-up count is reached.
    pub fn process(&mut self, frame: &Frame) -> Option<MotionMeasurement> {
        self.frames_seen = self.frames_seen.saturating_add(1);

        let rgb = frame.to_rgb_image();
        let (w, h) = self.resolution;
        let small = if rgb.dimensions() == (w, h) {
            rgb
        } else {
            imageops::resize(&rgb, w, h, FilterType::Triangle)
        };
        let mask = self.model.apply(&small);

        if !self.is_warm() {
            return None;
        }
        Some(measure_mask(&mask, self.min_contour_area))
    }

    pub fn is_warm(&self) -> bool {
        self.frames_seen >= self.warmup_frames
    }

    pub fn frames_seen(&self) -> u32 {
        self.frames_seen
    }

    /// Forget the learned background and restart warm-up.
    pub fn reset(&mut self) {
        self.model = BackgroundModel::new(self.history, self.var_threshold);
        self.frames_seen = 0;
    }
}

/// Measure significant changed regions in a background-subtraction mask.
pub fn measure_mask(mask: &GrayImage, min_contour_area: f64) -> MotionMeasurement {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return MotionMeasurement {
            motion_percentage: 0.0,
            contour_count: 0,
        };
    }

    let mut binary = mask.clone();
    for px in binary.pixels_mut() {
        *px = Luma([if px[0] > MASK_THRESHOLD { 255 } else { 0 }]);
    }
    let cleaned = morphology::open(&binary, Norm::L1, 1);

    let mut count = 0;
    let mut area = 0.0;
    for contour in find_contours::<i32>(&cleaned) {
        if contour.border_type != BorderType::Outer || contour.parent.is_some() {
            continue;
        }
        let a = contour_area(&contour.points);
        if a >= min_contour_area {
            count += 1;
            area += a;
        }
    }

    MotionMeasurement {
        motion_percentage: area / (w as f64 * h as f64) * 100.0,
        contour_count: count,
    }
}
