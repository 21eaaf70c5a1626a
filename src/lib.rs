// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! camwatch - Multi-Camera Change Detection and Adaptive Watch Scheduling
//!
//! Keeps one long-lived video session per camera, runs background-subtraction
//! change detection on the shared frames, and lets an external reasoning
//! engine decide when to look again:
//! - One decoder per camera, shared by detection and snapshots
//! - Reconnect with exponential backoff
//! - Per-camera warm-up, threshold and cooldown
//! - Person-count changes bypass the motion cooldown
//! - Motion events wake the watch scheduler early
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Engine                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌────────────────┐   ┌────────────────┐  │
//! │  │ FrameSource  │ → │  SharedStream  │ → │ CameraDetector │  │
//! │  │ pipe / pull  │   │  latest frame  │   │ model + gate   │  │
//! │  └──────────────┘   └────────────────┘   └────────────────┘  │
//! │                            ↓                     ↓           │
//! │                   ┌────────────────┐   ┌────────────────┐    │
//! │                   │ CameraRegistry │   │   EventQueue   │    │
//! │                   │   snapshots    │   └────────────────┘    │
//! │                   └────────────────┘           ↓             │
//! │                                       ┌────────────────┐     │
//! │                                       │    Watcher     │ →   │ ReasoningEngine
//! │                                       │ adaptive timer │ →   │ AlertSink
//! │                                       └────────────────┘     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod camera;
pub mod capture;
pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod reasoning;
pub mod tools;

// Re-exports for convenience
pub use camera::{Camera, CameraRegistry};
pub use capture::{Frame, SharedStream, StreamManager};
pub use config::Config;
pub use core::{Engine, EngineOptions, EventQueue, Watcher, WATCH_OK};
pub use detection::{CameraDetector, DetectorManager, MotionEvent, Trigger};
pub use error::{MonitorError, MonitorResult};
pub use reasoning::{AlertSink, CheckOutcome, CheckRequest, ReasoningEngine};

/// camwatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// camwatch name
pub const NAME: &str = "camwatch";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
        features: enabled_features(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Version string
    pub version: String,
    /// Target architecture
    pub target: String,
    /// Operating system
    pub os: String,
    /// Enabled features
    pub features: Vec<String>,
}

fn enabled_features() -> Vec<String> {
    #[allow(unused_mut)]
    let mut features = vec![];

    #[cfg(feature = "opencv")]
    features.push("opencv".to_string());

    features
}
