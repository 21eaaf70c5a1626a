// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Camera registry and on-demand snapshots

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::capture::StreamManager;
use crate::config::{CameraConfig, CaptureConfig, Config};
use crate::error::{MonitorError, MonitorResult};

/// Where a camera's video comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Rtsp(String),
    Sdp(PathBuf),
}

/// One configured camera
#[derive(Debug, Clone)]
pub struct Camera {
    pub name: String,
    pub display_name: String,
    pub home: String,
    pub location: String,
    pub connection: Connection,
    pub enabled: bool,
    pub motion_detection: bool,
    pub description: Option<String>,
    pub typical_activity: Option<String>,
    pub alert_conditions: Option<String>,
}

impl Camera {
    fn from_config(config: &CameraConfig) -> Option<Self> {
        let connection = match (&config.sdp_file, &config.rtsp_url) {
            (Some(sdp), _) => Connection::Sdp(sdp.clone()),
            (None, Some(url)) => Connection::Rtsp(url.clone()),
            (None, None) => return None,
        };
        Some(Self {
            name: config.name.clone(),
            display_name: config.display_name.clone().unwrap_or_else(|| config.name.clone()),
            home: config.home.clone(),
            location: config.location.clone(),
            connection,
            enabled: config.enabled,
            motion_detection: config.motion_detection,
            description: config.description.clone(),
            typical_activity: config.typical_activity.clone(),
            alert_conditions: config.alert_conditions.clone(),
        })
    }
}

/// Listing row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraSummary {
    pub name: String,
    pub display_name: String,
    pub home: String,
    pub location: String,
    pub enabled: bool,
}

pub struct CameraRegistry {
    cameras: Vec<Camera>,
    capture: CaptureConfig,
    streams: Option<Arc<StreamManager>>,
}

impl CameraRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            cameras: config.cameras.iter().filter_map(Camera::from_config).collect(),
            capture: config.capture.clone(),
            streams: None,
        }
    }

    /// Serve snapshots from running shared streams where they exist.
    pub fn with_streams(mut self, streams: Arc<StreamManager>) -> Self {
        self.streams = Some(streams);
        self
    }

    pub fn list(&self) -> Vec<CameraSummary> {
        self.cameras
            .iter()
            .map(|c| CameraSummary {
                name: c.name.clone(),
                display_name: c.display_name.clone(),
                home: c.home.clone(),
                location: c.location.clone(),
                enabled: c.enabled,
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Camera> {
        self.cameras.iter().find(|c| c.name == name)
    }

    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    /// Sorted, unique
    pub fn homes(&self) -> Vec<String> {
        let mut homes: Vec<String> = self.cameras.iter().map(|c| c.home.clone()).collect();
        homes.sort();
        homes.dedup();
        homes
    }

    pub fn by_home(&self, home: &str) -> Vec<&Camera> {
        self.cameras
            .iter()
            .filter(|c| c.enabled && c.home.eq_ignore_ascii_case(home))
            .collect()
    }

    pub fn by_location(&self, location: &str, home: Option<&str>) -> Vec<&Camera> {
        self.cameras
            .iter()
            .filter(|c| c.enabled && c.location.eq_ignore_ascii_case(location))
            .filter(|c| home.map_or(true, |h| c.home.eq_ignore_ascii_case(h)))
            .collect()
    }

    /// JPEG snapshot of one camera.
    ///
    /// Uses the camera's shared stream when one is running so the camera is
    /// never opened twice; otherwise runs the decoder once.
    pub async fn capture_snapshot(&self, name: &str) -> MonitorResult<Vec<u8>> {
        let camera = self
            .get(name)
            .ok_or_else(|| MonitorError::UnknownCamera(name.to_string()))?;
        if !camera.enabled {
            return Err(MonitorError::CameraDisabled(name.to_string()));
        }

        let timeout = Duration::from_secs(self.capture.snapshot_timeout);
        if let Some(stream) = self.streams.as_ref().and_then(|s| s.get(name)) {
            debug!("Snapshot for {} from shared stream", name);
            let frame = stream
                .get_frame(timeout)
                .await
                .ok_or_else(|| MonitorError::CaptureTimeout {
                    camera: camera.display_name.clone(),
                    secs: self.capture.snapshot_timeout,
                })?;
            return frame
                .encode_jpeg(self.capture.snapshot_quality)
                .map_err(|e| MonitorError::Encode {
                    camera: camera.display_name.clone(),
                    reason: e.to_string(),
                });
        }

        self.one_shot(camera, timeout).await
    }

    /// Capture several cameras concurrently. Each entry is the JPEG or an
    /// `Error: ...` message.
    pub async fn capture_multiple(&self, names: &[String]) -> Vec<(String, Result<Vec<u8>, String>)> {
        let captures = names.iter().map(|name| async move {
            let result = self
                .capture_snapshot(name)
                .await
                .map_err(|e| format!("Error: {}", e));
            (name.clone(), result)
        });
        futures::future::join_all(captures).await
    }

    fn snapshot_args(camera: &Camera) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into()];
        match &camera.connection {
            Connection::Sdp(path) => {
                args.extend(["-protocol_whitelist", "file,udp,srtp,rtp", "-i"].map(String::from));
                args.push(path.display().to_string());
            }
            Connection::Rtsp(url) => {
                args.extend(["-rtsp_transport", "tcp", "-i"].map(String::from));
                args.push(url.clone());
            }
        }
        args.extend(["-frames:v", "1", "-q:v", "2", "-f", "image2", "pipe:1"].map(String::from));
        args
    }

    async fn one_shot(&self, camera: &Camera, timeout: Duration) -> MonitorResult<Vec<u8>> {
        let child = Command::new(&self.capture.decoder)
            .args(Self::snapshot_args(camera))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MonitorError::Capture {
                camera: camera.display_name.clone(),
                reason: format!("could not start {}: {}", self.capture.decoder, e),
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| MonitorError::Capture {
                camera: camera.display_name.clone(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                warn!("Snapshot of {} timed out", camera.name);
                return Err(MonitorError::CaptureTimeout {
                    camera: camera.display_name.clone(),
                    secs: timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.chars().take(300).collect();
            return Err(MonitorError::Capture {
                camera: camera.display_name.clone(),
                reason: format!("exit {}: {}", output.status.code().unwrap_or(-1), stderr.trim()),
            });
        }
        if output.stdout.is_empty() {
            return Err(MonitorError::Capture {
                camera: camera.display_name.clone(),
                reason: "empty output".into(),
            });
        }
        Ok(output.stdout)
    }
}
