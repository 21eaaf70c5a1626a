// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};

use crate::error::{MonitorError, MonitorResult};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error); CLI flags raise it
    pub log_level: String,

    /// Capture and snapshot settings
    pub capture: CaptureConfig,

    /// Global motion detection settings
    pub motion: MotionConfig,

    /// Autonomous watch settings
    pub watch: WatchConfig,

    /// External person classifier
    pub classifier: ClassifierConfig,

    /// External reasoning engine
    pub reasoning: ReasoningConfig,

    /// Alert delivery
    pub alerts: AlertConfig,

    /// Optional per-home descriptions, keyed by home id
    pub homes: BTreeMap<String, HomeConfig>,

    /// Camera list
    pub cameras: Vec<CameraConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            capture: CaptureConfig::default(),
            motion: MotionConfig::default(),
            watch: WatchConfig::default(),
            classifier: ClassifierConfig::default(),
            reasoning: ReasoningConfig::default(),
            alerts: AlertConfig::default(),
            homes: BTreeMap::new(),
            cameras: Vec::new(),
        }
    }
}

impl Config {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MonitorError::Config(format!(
                "camera config not found at {}; copy config.example.toml there and fill in your camera details",
                path.display()
            ))
            .into());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Reject camera lists that cannot be opened unambiguously.
    pub fn validate(&self) -> MonitorResult<()> {
        if self.cameras.is_empty() {
            return Err(MonitorError::Config("config must contain a 'cameras' list".into()));
        }

        let mut seen = HashSet::new();
        for (i, cam) in self.cameras.iter().enumerate() {
            if cam.name.trim().is_empty() {
                return Err(MonitorError::Config(format!(
                    "camera #{} missing required field: name",
                    i
                )));
            }
            if !seen.insert(cam.name.as_str()) {
                return Err(MonitorError::Config(format!(
                    "camera #{} ({}): duplicate camera name",
                    i, cam.name
                )));
            }
            match (&cam.rtsp_url, &cam.sdp_file) {
                (None, None) => {
                    return Err(MonitorError::Config(format!(
                        "camera #{} ({}): must specify either 'rtsp_url' or 'sdp_file'",
                        i, cam.name
                    )))
                }
                (Some(_), Some(_)) => {
                    return Err(MonitorError::Config(format!(
                        "camera #{} ({}): specify either 'rtsp_url' or 'sdp_file', not both",
                        i, cam.name
                    )))
                }
                _ => {}
            }
        }

        if self.log_level.parse::<Level>().is_err() {
            return Err(MonitorError::Config(format!("unknown log_level '{}'", self.log_level)));
        }
        if self.watch.default_interval_secs == 0 {
            return Err(MonitorError::Config("watch.default_interval_secs must be positive".into()));
        }
        Ok(())
    }

    /// Motion settings for one camera with its overrides applied.
    pub fn effective_motion(&self, camera: &CameraConfig) -> MotionConfig {
        let mut motion = self.motion.clone();
        if let Some(overrides) = &camera.motion {
            if let Some(threshold) = overrides.threshold {
                motion.threshold = threshold;
            }
            if let Some(cooldown) = overrides.cooldown {
                motion.cooldown = cooldown;
            }
            if let Some(fps) = overrides.fps {
                motion.fps = fps;
            }
        }
        motion
    }

    /// Configured log level, INFO if unparseable
    pub fn tracing_level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("camwatch"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// One-shot snapshot timeout in seconds
    pub snapshot_timeout: u64,

    /// JPEG quality for snapshots (1-100)
    pub snapshot_quality: u8,

    /// Decoder executable
    pub decoder: String,

    /// Frame size emitted by the pipe decoder
    pub frame_width: u32,
    pub frame_height: u32,

    /// Consecutive read failures before a forced reconnect
    pub max_read_failures: u32,

    /// Grace period before a decoder process is killed, in seconds
    pub release_grace_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snapshot_timeout: 10,
            snapshot_quality: 90,
            decoder: "ffmpeg".to_string(),
            frame_width: 640,
            frame_height: 480,
            max_read_failures: 30,
            release_grace_secs: 5,
        }
    }
}

/// Motion detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Enable motion detection
    pub enabled: bool,

    /// Percentage of the analysed area that must change
    pub threshold: f64,

    /// Seconds between pure-motion events per camera
    pub cooldown: u64,

    /// Frames sampled per second
    pub fps: u32,

    /// Analysis resolution (width, height)
    pub resolution: (u32, u32),

    /// Minimum contour area in analysis pixels
    pub min_contour_area: f64,

    /// Frames fed to the background model before detection starts
    pub warmup_frames: u32,

    /// Background model history length
    pub history: u32,

    /// Squared Mahalanobis distance threshold of the background model
    pub var_threshold: f32,

    /// Initial reconnect wait in seconds
    pub reconnect_delay: u64,

    /// Reconnect backoff ceiling in seconds
    pub max_reconnect_delay: u64,

    /// Count people when motion is detected
    pub person_detection: bool,

    /// Minimum classifier confidence
    pub person_confidence: f32,

    /// Classifier model identifier
    pub model: String,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 1.0,
            cooldown: 60,
            fps: 2,
            resolution: (320, 240),
            min_contour_area: 500.0,
            warmup_frames: 30,
            history: 500,
            var_threshold: 16.0,
            reconnect_delay: 5,
            max_reconnect_delay: 60,
            person_detection: true,
            person_confidence: 0.4,
            model: "yolov8n".to_string(),
        }
    }
}

impl MotionConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown)
    }

    /// Interval between sampled frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// Autonomous watch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Default seconds between routine checks
    pub default_interval_secs: u64,

    /// Report text meaning "nothing worth alerting on"
    pub all_clear: String,

    /// Longest single wait slice in milliseconds
    pub wait_slice_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: 300,
            all_clear: crate::core::WATCH_OK.to_string(),
            wait_slice_ms: 1000,
        }
    }
}

/// External person classifier endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// External reasoning engine endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Alert delivery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub webhook_url: Option<String>,
}

/// Home/property description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeConfig {
    pub description: Option<String>,
}

/// A camera entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_home")]
    pub home: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default)]
    pub rtsp_url: Option<String>,
    #[serde(default)]
    pub sdp_file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub motion_detection: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub typical_activity: Option<String>,
    #[serde(default)]
    pub alert_conditions: Option<String>,
    /// Per-camera motion overrides
    #[serde(default)]
    pub motion: Option<MotionOverrides>,
}

/// Per-camera overrides of the global motion settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionOverrides {
    pub threshold: Option<f64>,
    pub cooldown: Option<u64>,
    pub fps: Option<u32>,
}

fn default_home() -> String {
    "default".to_string()
}

fn default_location() -> String {
    "unknown".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [motion]
        enabled = true
        threshold = 1.5
        cooldown = 30

        [homes.main_house]
        description = "Two-storey house"

        [[cameras]]
        name = "front_door"
        display_name = "Front Door"
        home = "main_house"
        location = "entrance"
        rtsp_url = "rtsp://10.0.0.2/stream1"
        motion_detection = true

        [cameras.motion]
        threshold = 4.0
        fps = 5

        [[cameras]]
        name = "garage"
        sdp_file = "/etc/camwatch/garage.sdp"
        enabled = false
    "#;

    #[test]
    fn test_parse_with_defaults() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.cameras.len(), 2);
        assert_eq!(config.capture.max_read_failures, 30);
        assert_eq!(config.watch.default_interval_secs, 300);

        let garage = &config.cameras[1];
        assert_eq!(garage.home, "default");
        assert_eq!(garage.location, "unknown");
        assert!(!garage.enabled);
        assert!(!garage.motion_detection);
        assert_eq!(
            config.homes["main_house"].description.as_deref(),
            Some("Two-storey house")
        );
    }

    #[test]
    fn test_effective_motion_applies_overrides() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let front = config.effective_motion(&config.cameras[0]);
        assert_eq!(front.threshold, 4.0);
        assert_eq!(front.fps, 5);
        assert_eq!(front.cooldown, 30);
        assert_eq!(front.resolution, (320, 240));

        let garage = config.effective_motion(&config.cameras[1]);
        assert_eq!(garage.threshold, 1.5);
        assert_eq!(garage.fps, 2);
    }

    #[test]
    fn test_rejects_missing_connection() {
        let err = Config::from_toml("[[cameras]]\nname = \"a\"\n").unwrap_err();
        assert!(err.to_string().contains("must specify either"));
    }

    #[test]
    fn test_rejects_both_connections() {
        let text = "[[cameras]]\nname = \"a\"\nrtsp_url = \"rtsp://x\"\nsdp_file = \"a.sdp\"\n";
        let err = Config::from_toml(text).unwrap_err();
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let text = "[[cameras]]\nname = \"a\"\nrtsp_url = \"rtsp://x\"\n\n[[cameras]]\nname = \"a\"\nrtsp_url = \"rtsp://y\"\n";
        let err = Config::from_toml(text).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_empty_camera_list() {
        assert!(Config::from_toml("log_level = \"info\"\n").is_err());
    }

    #[test]
    fn test_log_level_is_read_and_checked() {
        assert_eq!(Config::from_toml(SAMPLE).unwrap().tracing_level(), Level::INFO);

        let quiet = format!("log_level = \"warn\"\n{}", SAMPLE);
        assert_eq!(Config::from_toml(&quiet).unwrap().tracing_level(), Level::WARN);

        let bogus = format!("log_level = \"chatty\"\n{}", SAMPLE);
        let err = Config::from_toml(&bogus).unwrap_err();
        assert!(err.to_string().contains("unknown log_level"));
    }
}
