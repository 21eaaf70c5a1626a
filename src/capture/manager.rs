// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Stream manager - owns the shared stream of every motion-enabled camera

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::pipe::{DecoderInput, PipeDecoder};
use super::{FrameSource, SharedStream, StreamOptions};
use crate::config::{CameraConfig, Config};

/// Build the frame source for a camera.
///
/// SDP sessions always go through the pipe decoder. RTSP URLs use the
/// pull-based session when built with `opencv`, the pipe decoder otherwise.
pub fn source_for(camera: &CameraConfig, config: &Config) -> Option<Arc<dyn FrameSource>> {
    let motion = config.effective_motion(camera);
    let capture = &config.capture;
    let grace = Duration::from_secs(capture.release_grace_secs);

    #[cfg(feature = "opencv")]
    if let (None, Some(url)) = (&camera.sdp_file, &camera.rtsp_url) {
        return Some(Arc::new(super::pull::PullSource::new(&camera.name, url, grace)));
    }

    let input = match (&camera.sdp_file, &camera.rtsp_url) {
        (Some(sdp), _) => DecoderInput::Sdp(sdp.clone()),
        (None, Some(url)) => DecoderInput::Rtsp(url.clone()),
        (None, None) => return None,
    };

    Some(Arc::new(
        PipeDecoder::new(&camera.name, input, &capture.decoder)
            .with_frame_size(capture.frame_width, capture.frame_height)
            .with_fps(motion.fps)
            .with_grace(grace),
    ))
}

/// Per-camera stream status
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StreamStatus {
    pub connected: bool,
    pub has_frame: bool,
    pub reconnects: u64,
    pub frames: u64,
}

/// Holds one shared stream per motion-enabled camera.
pub struct StreamManager {
    streams: BTreeMap<String, Arc<SharedStream>>,
}

impl StreamManager {
    pub fn new() -> Self {
        Self {
            streams: BTreeMap::new(),
        }
    }

    /// Create streams for every enabled camera with motion detection on.
    pub fn from_config(config: &Config) -> Self {
        let mut manager = Self::new();
        for camera in config.cameras.iter().filter(|c| c.enabled && c.motion_detection) {
            match source_for(camera, config) {
                Some(source) => {
                    let motion = config.effective_motion(camera);
                    let options = StreamOptions::from_config(&motion, &config.capture);
                    manager.add(SharedStream::new(source, options));
                }
                None => warn!("Camera {} has no stream address, skipping", camera.name),
            }
        }
        manager
    }

    pub fn add(&mut self, stream: Arc<SharedStream>) {
        info!("Added shared stream: {}", stream.camera());
        self.streams.insert(stream.camera().to_string(), stream);
    }

    pub fn get(&self, camera: &str) -> Option<Arc<SharedStream>> {
        self.streams.get(camera).cloned()
    }

    pub fn cameras(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn start_all(&self) {
        for stream in self.streams.values() {
            stream.start();
        }
        info!("Started {} shared stream(s)", self.streams.len());
    }

    /// Stop every stream and wait (bounded) for their sessions to be released.
    pub async fn stop_all(&self, timeout: Duration) {
        for stream in self.streams.values() {
            stream.stop();
        }
        let joins = self.streams.values().map(|s| s.join(timeout));
        futures::future::join_all(joins).await;
        info!("Stopped shared streams");
    }

    pub fn status(&self) -> BTreeMap<String, StreamStatus> {
        self.streams
            .iter()
            .map(|(name, s)| {
                (
                    name.clone(),
                    StreamStatus {
                        connected: s.is_connected(),
                        has_frame: s.has_frame(),
                        reconnects: s.generation().saturating_sub(1),
                        frames: s.frames_received(),
                    },
                )
            })
            .collect()
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_toml(
            r#"
            [[cameras]]
            name = "porch"
            sdp_file = "/tmp/porch.sdp"
            motion_detection = true

            [[cameras]]
            name = "yard"
            rtsp_url = "rtsp://cam/yard"
            motion_detection = false

            [[cameras]]
            name = "garage"
            rtsp_url = "rtsp://cam/garage"
            motion_detection = true
            enabled = false
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_only_enabled_motion_cameras_get_streams() {
        let manager = StreamManager::from_config(&config());
        let cameras: Vec<_> = manager.cameras().collect();
        assert_eq!(cameras, vec!["porch"]);
        assert!(manager.get("yard").is_none());
    }

    #[test]
    fn test_source_for_names_camera() {
        let config = config();
        let source = source_for(&config.cameras[1], &config).unwrap();
        assert_eq!(source.camera(), "yard");
    }

    #[tokio::test]
    async fn test_status_before_start() {
        let manager = StreamManager::from_config(&config());
        let status = manager.status();
        assert_eq!(
            status["porch"],
            StreamStatus {
                connected: false,
                has_frame: false,
                reconnects: 0,
                frames: 0
            }
        );
        manager.stop_all(Duration::from_millis(10)).await;
    }
}
