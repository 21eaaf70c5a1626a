// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Pull-based RTSP sessions through OpenCV's FFmpeg backend

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use tracing::warn;

use super::{Frame, FrameSession, FrameSource};

pub struct PullSource {
    camera: String,
    url: String,
    grace: Duration,
}

impl PullSource {
    pub fn new(camera: impl Into<String>, url: impl Into<String>, grace: Duration) -> Self {
        Self {
            camera: camera.into(),
            url: url.into(),
            grace,
        }
    }
}

#[async_trait]
impl FrameSource for PullSource {
    fn camera(&self) -> &str {
        &self.camera
    }

    async fn open(&self) -> Result<Box<dyn FrameSession>> {
        let url = self.url.clone();
        let capture = tokio::task::spawn_blocking(move || -> Result<VideoCapture> {
            let mut capture = VideoCapture::from_file(&url, videoio::CAP_FFMPEG)?;
            // Keep only the newest frame queued
            capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;
            if !capture.is_opened()? {
                bail!("stream could not be opened");
            }
            Ok(capture)
        })
        .await??;

        Ok(Box::new(PullSession {
            capture: Some(capture),
            grace: self.grace,
        }))
    }
}

struct PullSession {
    capture: Option<VideoCapture>,
    grace: Duration,
}

fn mat_to_frame(mat: &Mat) -> Option<Frame> {
    if mat.cols() <= 0 || mat.rows() <= 0 {
        return None;
    }
    let bytes = mat.data_bytes().ok()?;
    Frame::from_bgr(mat.cols() as u32, mat.rows() as u32, bytes.to_vec()).ok()
}

#[async_trait]
impl FrameSession for PullSession {
    async fn read(&mut self) -> Option<Frame> {
        let mut capture = self.capture.take()?;
        let result = tokio::task::spawn_blocking(move || {
            let mut mat = Mat::default();
            let frame = match capture.read(&mut mat) {
                Ok(true) => mat_to_frame(&mat),
                _ => None,
            };
            (capture, frame)
        })
        .await;

        match result {
            Ok((capture, frame)) => {
                self.capture = Some(capture);
                frame
            }
            Err(e) => {
                warn!("Capture read task failed: {}", e);
                None
            }
        }
    }

    fn is_paced(&self) -> bool {
        false
    }

    async fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            let release = tokio::task::spawn_blocking(move || {
                let _ = capture.release();
            });
            if tokio::time::timeout(self.grace, release).await.is_err() {
                warn!("Capture release did not finish within {:?}", self.grace);
            }
        }
    }
}
