//! Reasoning module - the scene-judging engine seam and alert delivery

mod alerts;
mod http;

pub use alerts::{ConsoleAlertSink, WebhookAlertSink};
pub use http::HttpReasoningEngine;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a check runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Routine,
    MotionTriggered,
}

/// A JPEG with a caption
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledImage {
    pub camera: String,
    pub label: String,
    pub jpeg: Vec<u8>,
}

/// Input to one reasoning pass
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub kind: CheckKind,
    pub requested_at: DateTime<Utc>,
    /// Cameras to look at first; all cameras when None
    pub focus_cameras: Option<Vec<String>>,
    /// Human-readable digest of the motion events behind this check
    pub motion_summary: Option<String>,
    pub images: Vec<LabeledImage>,
}

/// What the engine concluded
#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    /// Report text; the all-clear sentinel means nothing to alert on
    pub report: String,
    /// Requested minutes until the next check
    pub next_minutes: Option<i64>,
    pub reason: Option<String>,
    pub focus_cameras: Option<Vec<String>>,
    /// Images the engine wants attached to an alert
    pub photos: Vec<LabeledImage>,
}

impl CheckOutcome {
    pub fn report(report: impl Into<String>) -> Self {
        Self {
            report: report.into(),
            ..Self::default()
        }
    }
}

/// Judges camera imagery and decides when to look again.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn check(&self, request: CheckRequest) -> Result<CheckOutcome>;
}

/// Delivers alerts to a human. Must not block the caller for long.
pub trait AlertSink: Send + Sync {
    fn send_alert(&self, text: &str, images: &[LabeledImage]);
}
