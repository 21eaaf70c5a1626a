// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Detector manager - one detector per motion-enabled camera, one event queue

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::{CameraDetector, ClassifierLoader, DetectorStatus, MotionEvent, SharedClassifier};
use crate::capture::StreamManager;
use crate::config::Config;
use crate::core::EventQueue;

pub struct DetectorManager {
    detectors: RwLock<BTreeMap<String, Arc<CameraDetector>>>,
    queue: Arc<EventQueue>,
    classifier: Arc<SharedClassifier>,
}

impl DetectorManager {
    /// Manager with no detectors. The classifier is built by `loader` the
    /// first time any detector needs it.
    pub fn new(loader: ClassifierLoader) -> Self {
        Self {
            detectors: RwLock::new(BTreeMap::new()),
            queue: Arc::new(EventQueue::new()),
            classifier: Arc::new(SharedClassifier::new(loader)),
        }
    }

    /// One detector per shared stream, with the camera's motion settings.
    pub fn from_config(config: &Config, streams: &StreamManager, loader: ClassifierLoader) -> Self {
        let manager = Self::new(loader);
        for camera in &config.cameras {
            let Some(stream) = streams.get(&camera.name) else {
                continue;
            };
            let mut motion = config.effective_motion(camera);
            // Cameras listed for motion start enabled
            motion.enabled = true;
            manager.add(CameraDetector::new(
                stream,
                motion,
                manager.queue.clone(),
                manager.classifier.clone(),
            ));
        }
        manager
    }

    pub fn add(&self, detector: Arc<CameraDetector>) {
        info!("Added motion detector: {}", detector.camera());
        if let Some(old) = self
            .detectors
            .write()
            .insert(detector.camera().to_string(), detector)
        {
            warn!("Replaced existing detector for {}", old.camera());
            old.stop();
        }
    }

    pub fn start(&self) {
        let detectors = self.detectors.read();
        for detector in detectors.values() {
            detector.start();
        }
        info!("Started {} motion detector(s)", detectors.len());
    }

    pub async fn stop(&self, timeout: Duration) {
        let detectors: Vec<_> = self.detectors.read().values().cloned().collect();
        for detector in &detectors {
            detector.stop();
        }
        futures::future::join_all(detectors.iter().map(|d| d.join(timeout))).await;
        info!("Stopped motion detectors");
    }

    /// Returns false if the camera has no detector.
    pub fn enable_camera(&self, camera: &str) -> bool {
        match self.detectors.read().get(camera) {
            Some(detector) => {
                detector.enable();
                true
            }
            None => false,
        }
    }

    /// Returns false if the camera has no detector.
    pub fn disable_camera(&self, camera: &str) -> bool {
        match self.detectors.read().get(camera) {
            Some(detector) => {
                detector.disable();
                true
            }
            None => false,
        }
    }

    pub fn has_camera(&self, camera: &str) -> bool {
        self.detectors.read().contains_key(camera)
    }

    /// Take every queued event, oldest first.
    pub fn get_pending_events(&self) -> Vec<MotionEvent> {
        self.queue.drain()
    }

    pub fn has_pending_events(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn event_queue(&self) -> Arc<EventQueue> {
        self.queue.clone()
    }

    /// Scene state of one camera, or of all cameras when `camera` is None.
    /// An unknown camera yields an empty map.
    pub fn get_scene_state(&self, camera: Option<&str>) -> BTreeMap<String, DetectorStatus> {
        self.detectors
            .read()
            .iter()
            .filter(|(name, _)| camera.map_or(true, |c| c == name.as_str()))
            .map(|(name, d)| (name.clone(), d.status()))
            .collect()
    }

    pub fn status(&self) -> BTreeMap<String, DetectorStatus> {
        self.get_scene_state(None)
    }

    pub fn len(&self) -> usize {
        self.detectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.read().is_empty()
    }

    /// Detectors currently enabled
    pub fn active_count(&self) -> usize {
        self.detectors.read().values().filter(|d| d.is_enabled()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::FakeSource;
    use crate::capture::{SharedStream, StreamOptions};
    use crate::config::MotionConfig;
    use crate::detection::{unavailable_loader, SceneState, Trigger};
    use chrono::Utc;

    fn manager_with(cameras: &[&str]) -> DetectorManager {
        let manager = DetectorManager::new(unavailable_loader("none"));
        for name in cameras {
            let stream = SharedStream::new(Arc::new(FakeSource::new(name)), StreamOptions::default());
            manager.add(CameraDetector::new(
                stream,
                MotionConfig::default(),
                manager.event_queue(),
                manager.classifier.clone(),
            ));
        }
        manager
    }

    #[test]
    fn test_toggle_known_and_unknown() {
        let manager = manager_with(&["porch", "yard"]);
        assert_eq!(manager.active_count(), 0);
        assert!(manager.enable_camera("porch"));
        assert_eq!(manager.active_count(), 1);
        assert!(manager.disable_camera("porch"));
        assert!(!manager.enable_camera("attic"));
        assert!(!manager.disable_camera("attic"));
    }

    #[test]
    fn test_drain_twice() {
        let manager = manager_with(&["porch"]);
        let queue = manager.event_queue();
        queue.push(MotionEvent::new("porch", Utc::now(), 2.0, 1, 0, 0, None, Trigger::Motion));
        queue.push(MotionEvent::new("porch", Utc::now(), 4.0, 1, 0, 0, None, Trigger::Motion));

        assert!(manager.has_pending_events());
        let first = manager.get_pending_events();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].motion_percentage, 2.0);
        assert!(manager.get_pending_events().is_empty());
    }

    #[test]
    fn test_scene_state_filters() {
        let manager = manager_with(&["porch", "yard"]);
        assert_eq!(manager.get_scene_state(None).len(), 2);
        let one = manager.get_scene_state(Some("yard"));
        assert_eq!(one.keys().collect::<Vec<_>>(), vec!["yard"]);
        assert_eq!(one["yard"].scene, SceneState::default());
        assert!(!one["yard"].enabled);
        assert!(manager.get_scene_state(Some("attic")).is_empty());
    }

    #[test]
    fn test_from_config_enables_listed_cameras() {
        let config = Config::from_toml(
            r#"
            [[cameras]]
            name = "porch"
            sdp_file = "/tmp/porch.sdp"
            motion_detection = true

            [[cameras]]
            name = "yard"
            rtsp_url = "rtsp://cam/yard"
            "#,
        )
        .unwrap();
        let streams = StreamManager::from_config(&config);
        let manager = DetectorManager::from_config(&config, &streams, unavailable_loader("none"));
        assert_eq!(manager.len(), 1);
        assert!(manager.has_camera("porch"));
        assert_eq!(manager.active_count(), 1);
    }
}
