// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Tool surface - status text and snapshot replies for the reasoning engine

use chrono::{DateTime, Utc};

use crate::camera::{Camera, CameraRegistry};
use crate::core::Watcher;
use crate::detection::DetectorManager;
use crate::reasoning::LabeledImage;

const NO_MOTION: &str = "Motion detection is not available (not configured).";
const NO_MOTION_CAMERAS: &str = "No cameras configured for motion detection.";

/// Reply content for a tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolReply {
    Text(String),
    /// Captioned images interleaved with per-camera error lines
    Content(Vec<ToolContent>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    Text(String),
    Image(LabeledImage),
}

fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

pub fn watcher_status(watcher: Option<&Watcher>) -> String {
    let Some(watcher) = watcher else {
        return "Autonomous monitoring is not running.".to_string();
    };
    let status = watcher.status();

    let mut lines = vec![format!("Running: {}", status.running)];
    match status.last_check_at {
        Some(at) => lines.push(format!("Last check: {}", timestamp(Some(at)))),
        None => lines.push("Last check: not yet (first check pending)".to_string()),
    }
    if let Some(at) = status.next_check_at {
        lines.push(format!("Next check at: {}", timestamp(Some(at))));
    }
    lines.push(format!("Current interval: {} minutes", status.interval_seconds / 60));
    if let Some(reason) = status.last_schedule_reason.filter(|r| !r.is_empty()) {
        lines.push(format!("Interval reason: {}", reason));
    }
    if let Some(focus) = status.focus_cameras.filter(|f| !f.is_empty()) {
        lines.push(format!("Next check focused on: {}", focus.join(", ")));
    }
    if let Some(report) = status.last_report.filter(|r| !r.is_empty()) {
        lines.push(format!("Last report: {}", report));
    }
    lines.join("\n")
}

/// Echo of an accepted schedule request
pub fn schedule_ack(minutes: i64, reason: &str) -> String {
    format!("Next check scheduled in {} minutes. ({})", minutes, reason)
}

pub fn toggle_motion(detectors: Option<&DetectorManager>, camera: &str, enabled: bool) -> String {
    let Some(detectors) = detectors else {
        return NO_MOTION.to_string();
    };
    let known = if enabled {
        detectors.enable_camera(camera)
    } else {
        detectors.disable_camera(camera)
    };
    if known {
        let state = if enabled { "enabled" } else { "disabled" };
        format!("Motion detection {} for camera '{}'.", state, camera)
    } else {
        format!("Camera '{}' not found or motion detection not configured for it.", camera)
    }
}

pub fn motion_status(detectors: Option<&DetectorManager>) -> String {
    let Some(detectors) = detectors else {
        return NO_MOTION.to_string();
    };
    let status = detectors.status();
    if status.is_empty() {
        return NO_MOTION_CAMERAS.to_string();
    }
    let mut lines = vec!["Motion detection status:".to_string()];
    for (name, info) in status {
        lines.push(format!(
            "  - {}: {}, {} people, last motion: {}",
            name,
            if info.enabled { "ACTIVE" } else { "disabled" },
            info.scene.person_count,
            timestamp(info.scene.last_motion_at)
        ));
    }
    lines.join("\n")
}

pub fn scene_state(detectors: Option<&DetectorManager>, camera: Option<&str>) -> String {
    let Some(detectors) = detectors else {
        return NO_MOTION.to_string();
    };
    let state = detectors.get_scene_state(camera);
    if state.is_empty() {
        return match camera {
            Some(name) => format!("No motion detection configured for camera '{}'.", name),
            None => NO_MOTION_CAMERAS.to_string(),
        };
    }
    let mut lines = vec!["Scene state:".to_string()];
    for (name, info) in state {
        lines.push(format!(
            "  - {}: {} people, last change: {}, last motion: {}, detection: {}",
            name,
            info.scene.person_count,
            timestamp(info.scene.last_person_change_at),
            timestamp(info.scene.last_motion_at),
            if info.enabled { "active" } else { "disabled" }
        ));
    }
    lines.join("\n")
}

pub fn snapshot_label(camera: &Camera) -> String {
    format!(
        "Snapshot from '{}' ({} / {}):",
        camera.display_name, camera.home, camera.location
    )
}

pub async fn capture_snapshot(registry: &CameraRegistry, name: &str) -> ToolReply {
    match registry.capture_snapshot(name).await {
        Ok(jpeg) => {
            let label = registry.get(name).map(snapshot_label).unwrap_or_default();
            ToolReply::Content(vec![ToolContent::Image(LabeledImage {
                camera: name.to_string(),
                label,
                jpeg,
            })])
        }
        Err(e) => ToolReply::Text(format!("Failed to capture snapshot: {}", e)),
    }
}

pub async fn capture_home_snapshots(registry: &CameraRegistry, home: &str) -> ToolReply {
    let names: Vec<String> = registry.by_home(home).iter().map(|c| c.name.clone()).collect();
    if names.is_empty() {
        return ToolReply::Text(format!(
            "No cameras found for home '{}'. Available homes: {}",
            home,
            registry.homes().join(", ")
        ));
    }
    capture_many(registry, &names).await
}

pub async fn capture_location_snapshots(
    registry: &CameraRegistry,
    location: &str,
    home: Option<&str>,
) -> ToolReply {
    let names: Vec<String> = registry
        .by_location(location, home)
        .iter()
        .map(|c| c.name.clone())
        .collect();
    if names.is_empty() {
        let mut locations: Vec<String> = registry.cameras().iter().map(|c| c.location.clone()).collect();
        locations.sort();
        locations.dedup();
        return ToolReply::Text(format!(
            "No cameras found at location '{}'. Available locations: {}",
            location,
            locations.join(", ")
        ));
    }
    capture_many(registry, &names).await
}

pub async fn capture_all_snapshots(registry: &CameraRegistry) -> ToolReply {
    let names: Vec<String> = registry
        .cameras()
        .iter()
        .filter(|c| c.enabled)
        .map(|c| c.name.clone())
        .collect();
    if names.is_empty() {
        return ToolReply::Text("No enabled cameras found.".to_string());
    }
    capture_many(registry, &names).await
}

async fn capture_many(registry: &CameraRegistry, names: &[String]) -> ToolReply {
    let mut content = Vec::new();
    for (name, result) in registry.capture_multiple(names).await {
        let Some(camera) = registry.get(&name) else {
            continue;
        };
        match result {
            Ok(jpeg) => content.push(ToolContent::Image(LabeledImage {
                camera: name.clone(),
                label: snapshot_label(camera),
                jpeg,
            })),
            Err(message) => content.push(ToolContent::Text(format!("{}: {}", camera.display_name, message))),
        }
    }
    if content.is_empty() {
        ToolReply::Text("No snapshots captured.".to_string())
    } else {
        ToolReply::Content(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::FakeSource;
    use crate::capture::{SharedStream, StreamOptions};
    use crate::config::{Config, MotionConfig, WatchConfig};
    use crate::detection::{unavailable_loader, CameraDetector};
    use crate::reasoning::{CheckOutcome, CheckRequest, ReasoningEngine};
    use async_trait::async_trait;
    use std::sync::Arc;

    fn detectors() -> DetectorManager {
        let manager = DetectorManager::new(unavailable_loader("none"));
        let stream = SharedStream::new(Arc::new(FakeSource::new("porch")), StreamOptions::default());
        let detector = CameraDetector::new(
            stream,
            MotionConfig {
                enabled: true,
                ..MotionConfig::default()
            },
            manager.event_queue(),
            Arc::new(crate::detection::SharedClassifier::new(unavailable_loader("none"))),
        );
        manager.add(detector);
        manager
    }

    #[test]
    fn test_without_motion() {
        assert_eq!(motion_status(None), NO_MOTION);
        assert_eq!(scene_state(None, Some("porch")), NO_MOTION);
        assert_eq!(toggle_motion(None, "porch", true), NO_MOTION);
        assert_eq!(watcher_status(None), "Autonomous monitoring is not running.");
    }

    #[test]
    fn test_motion_status_lines() {
        let detectors = detectors();
        assert_eq!(
            motion_status(Some(&detectors)),
            "Motion detection status:\n  - porch: ACTIVE, 0 people, last motion: never"
        );
        assert_eq!(
            toggle_motion(Some(&detectors), "porch", false),
            "Motion detection disabled for camera 'porch'."
        );
        assert_eq!(
            scene_state(Some(&detectors), None),
            "Scene state:\n  - porch: 0 people, last change: never, last motion: never, detection: disabled"
        );
        assert_eq!(
            toggle_motion(Some(&detectors), "attic", true),
            "Camera 'attic' not found or motion detection not configured for it."
        );
        assert_eq!(
            scene_state(Some(&detectors), Some("attic")),
            "No motion detection configured for camera 'attic'."
        );
    }

    #[test]
    fn test_watcher_status_before_first_check() {
        struct Idle;
        #[async_trait]
        impl ReasoningEngine for Idle {
            async fn check(&self, _request: CheckRequest) -> anyhow::Result<CheckOutcome> {
                Ok(CheckOutcome::default())
            }
        }
        let watcher = Watcher::new(
            Arc::new(Idle),
            WatchConfig {
                default_interval_secs: 600,
                ..WatchConfig::default()
            },
        );
        assert_eq!(
            watcher_status(Some(&watcher)),
            "Running: false\nLast check: not yet (first check pending)\nCurrent interval: 10 minutes"
        );
    }

    #[test]
    fn test_schedule_ack() {
        assert_eq!(
            schedule_ack(2, "car by the gate"),
            "Next check scheduled in 2 minutes. (car by the gate)"
        );
    }

    #[tokio::test]
    async fn test_snapshot_tool_messages() {
        let config = Config::from_toml(
            r#"
            [capture]
            decoder = "definitely-not-a-decoder-binary"

            [[cameras]]
            name = "porch"
            home = "main"
            location = "front"
            rtsp_url = "rtsp://cam/porch"
            enabled = false
            "#,
        )
        .unwrap();
        let registry = CameraRegistry::new(&config);

        assert_eq!(
            capture_snapshot(&registry, "attic").await,
            ToolReply::Text("Failed to capture snapshot: Unknown camera: attic".into())
        );
        assert_eq!(
            capture_home_snapshots(&registry, "cabin").await,
            ToolReply::Text("No cameras found for home 'cabin'. Available homes: main".into())
        );
        assert_eq!(
            capture_location_snapshots(&registry, "back", None).await,
            ToolReply::Text("No cameras found at location 'back'. Available locations: front".into())
        );
        assert_eq!(
            capture_all_snapshots(&registry).await,
            ToolReply::Text("No enabled cameras found.".into())
        );
    }
}
