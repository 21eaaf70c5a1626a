// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Monitoring engine - wires streams, detectors and the watcher together

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::info;

use super::{ActivityHook, Watcher};
use crate::camera::CameraRegistry;
use crate::capture::StreamManager;
use crate::config::Config;
use crate::detection::{ClassifierLoader, DetectorManager};
use crate::reasoning::{AlertSink, ReasoningEngine};

/// Runtime switches layered over the config file
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Run motion detection when the config enables it
    pub motion: bool,
    /// Override for the default watch interval
    pub interval_minutes: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            motion: true,
            interval_minutes: None,
        }
    }
}

pub struct Engine {
    pub config: Arc<Config>,
    options: EngineOptions,
    registry: Arc<CameraRegistry>,
    streams: Arc<StreamManager>,
    detectors: Option<Arc<DetectorManager>>,
    watcher: Option<Arc<Watcher>>,
    start_time: Option<Instant>,
}

impl Engine {
    pub fn new(config: Config, options: EngineOptions, loader: ClassifierLoader) -> Result<Self> {
        config.validate()?;

        let motion = options.motion && config.motion.enabled;
        let streams = Arc::new(if motion {
            StreamManager::from_config(&config)
        } else {
            StreamManager::new()
        });
        let detectors = if streams.is_empty() {
            None
        } else {
            Some(Arc::new(DetectorManager::from_config(&config, &streams, loader)))
        };
        let registry = Arc::new(CameraRegistry::new(&config).with_streams(Arc::clone(&streams)));

        info!(
            "Engine ready: {} camera(s), {} motion stream(s)",
            registry.cameras().len(),
            streams.len()
        );
        Ok(Self {
            config: Arc::new(config),
            options,
            registry,
            streams,
            detectors,
            watcher: None,
            start_time: None,
        })
    }

    /// Create the watcher. Replaces any previous one that was never started.
    pub fn attach_watcher(
        &mut self,
        engine: Arc<dyn ReasoningEngine>,
        alerts: Option<Arc<dyn AlertSink>>,
        hook: Option<ActivityHook>,
    ) -> Arc<Watcher> {
        let mut watch = self.config.watch.clone();
        if let Some(minutes) = self.options.interval_minutes.filter(|m| *m > 0) {
            watch.default_interval_secs = minutes * 60;
        }

        let mut watcher = Watcher::new(engine, watch);
        if let Some(detectors) = &self.detectors {
            watcher = watcher.with_detectors(Arc::clone(detectors));
        }
        if let Some(alerts) = alerts {
            watcher = watcher.with_alerts(alerts);
        }
        if let Some(hook) = hook {
            watcher = watcher.with_activity_hook(hook);
        }
        let watcher = Arc::new(watcher);
        self.watcher = Some(Arc::clone(&watcher));
        watcher
    }

    pub fn start(&mut self) {
        info!("Starting camera monitor...");
        self.start_time = Some(Instant::now());
        self.streams.start_all();
        if let Some(detectors) = &self.detectors {
            detectors.start();
        }
        if let Some(watcher) = &self.watcher {
            watcher.start();
        }
        info!("Camera monitor started");
    }

    /// Watcher first, then detectors, then the streams they read from.
    pub async fn stop(&mut self, timeout: Duration) {
        info!("Stopping camera monitor...");
        if let Some(watcher) = &self.watcher {
            watcher.stop();
            watcher.join(timeout).await;
        }
        if let Some(detectors) = &self.detectors {
            detectors.stop(timeout).await;
        }
        self.streams.stop_all(timeout).await;
        self.start_time = None;
        info!("Camera monitor stopped");
    }

    pub fn registry(&self) -> Arc<CameraRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn streams(&self) -> Arc<StreamManager> {
        Arc::clone(&self.streams)
    }

    /// None when motion detection is off or no camera has it enabled
    pub fn detectors(&self) -> Option<Arc<DetectorManager>> {
        self.detectors.clone()
    }

    pub fn watcher(&self) -> Option<Arc<Watcher>> {
        self.watcher.clone()
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::unavailable_loader;
    use crate::reasoning::{CheckOutcome, CheckRequest};
    use async_trait::async_trait;

    const CONFIG: &str = r#"
        [capture]
        decoder = "definitely-not-a-decoder-binary"

        [watch]
        default_interval_secs = 600

        [[cameras]]
        name = "porch"
        home = "main"
        location = "front"
        rtsp_url = "rtsp://cam/porch"
        motion_detection = true

        [[cameras]]
        name = "garage"
        home = "main"
        location = "side"
        sdp_file = "/tmp/garage.sdp"
    "#;

    struct Quiet;

    #[async_trait]
    impl ReasoningEngine for Quiet {
        async fn check(&self, _request: CheckRequest) -> anyhow::Result<CheckOutcome> {
            Ok(CheckOutcome::report("WATCH_OK"))
        }
    }

    #[test]
    fn test_motion_off_builds_no_detectors() {
        let config = Config::from_toml(CONFIG).unwrap();
        let options = EngineOptions {
            motion: false,
            interval_minutes: None,
        };
        assert!(config.cameras[0].motion_detection);
        let engine = Engine::new(config, options, unavailable_loader("none")).unwrap();
        assert!(engine.detectors().is_none());
        assert!(engine.streams().is_empty());
        assert_eq!(engine.registry().cameras().len(), 2);
    }

    #[test]
    fn test_motion_cameras_get_detectors() {
        let mut config = Config::from_toml(CONFIG).unwrap();
        config.motion.enabled = true;
        let engine = Engine::new(config, EngineOptions::default(), unavailable_loader("none")).unwrap();
        let detectors = engine.detectors().unwrap();
        assert!(detectors.has_camera("porch"));
        assert!(!detectors.has_camera("garage"));
        assert_eq!(engine.streams().len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(Engine::new(Config::default(), EngineOptions::default(), unavailable_loader("none")).is_err());
    }

    #[tokio::test]
    async fn test_interval_override_and_lifecycle() {
        let config = Config::from_toml(CONFIG).unwrap();
        let options = EngineOptions {
            motion: false,
            interval_minutes: Some(2),
        };
        let mut engine = Engine::new(config, options, unavailable_loader("none")).unwrap();
        let watcher = engine.attach_watcher(Arc::new(Quiet), None, None);
        assert_eq!(watcher.status().interval_seconds, 120);

        engine.start();
        assert!(watcher.is_running());
        engine.stop(Duration::from_secs(2)).await;
        assert!(!watcher.is_running());
        assert_eq!(engine.uptime(), 0);
    }
}
