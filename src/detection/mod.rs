//! Detection module - background subtraction, event policy and detectors

mod analyzer;
mod background;
mod classifier;
mod detector;
mod manager;
mod policy;

pub use analyzer::{measure_mask, MotionAnalyzer, MotionMeasurement};
pub use background::BackgroundModel;
pub use classifier::{
    unavailable_loader, ClassifierLoader, HttpClassifier, PersonClassifier, SharedClassifier,
    PERSON_CATEGORY,
};
pub use detector::CameraDetector;
pub use manager::DetectorManager;
pub use policy::{Decision, EventGate};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why an event was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Motion,
    PersonChange,
    Both,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Motion => "motion",
            Trigger::PersonChange => "person_change",
            Trigger::Both => "both",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A significant scene change on one camera
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionEvent {
    pub id: Uuid,
    pub camera: String,
    pub timestamp: DateTime<Utc>,
    /// Share of the analysed area that changed, one decimal
    pub motion_percentage: f64,
    pub contour_count: usize,
    pub person_count: u32,
    pub previous_person_count: u32,
    /// JPEG of the full-resolution frame
    #[serde(skip)]
    pub snapshot: Option<Vec<u8>>,
    pub trigger: Trigger,
}

impl MotionEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera: impl Into<String>,
        timestamp: DateTime<Utc>,
        motion_percentage: f64,
        contour_count: usize,
        person_count: u32,
        previous_person_count: u32,
        snapshot: Option<Vec<u8>>,
        trigger: Trigger,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            camera: camera.into(),
            timestamp,
            motion_percentage: (motion_percentage * 10.0).round() / 10.0,
            contour_count,
            person_count,
            previous_person_count,
            snapshot,
            trigger,
        }
    }

    pub fn person_changed(&self) -> bool {
        self.person_count != self.previous_person_count
    }
}

/// Last known state of a camera's scene
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneState {
    pub person_count: u32,
    pub last_person_change_at: Option<DateTime<Utc>>,
    pub last_motion_at: Option<DateTime<Utc>>,
}

/// Detector lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorPhase {
    /// Not started yet
    Disabled,
    WaitingForEnable,
    WaitingForFirstFrame,
    WarmingUp,
    Detecting,
    Stopped,
}

/// Status row for one detector
#[derive(Debug, Clone, Serialize)]
pub struct DetectorStatus {
    pub enabled: bool,
    pub phase: DetectorPhase,
    pub stream_connected: bool,
    pub scene: SceneState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_rounds_percentage() {
        let event = MotionEvent::new("porch", Utc::now(), 3.14159, 2, 1, 0, None, Trigger::Both);
        assert_eq!(event.motion_percentage, 3.1);
        assert!(event.person_changed());
        assert_eq!(event.trigger.to_string(), "both");
    }

    #[test]
    fn test_trigger_serializes_snake_case() {
        let json = serde_json::to_string(&Trigger::PersonChange).unwrap();
        assert_eq!(json, "\"person_change\"");
    }
}
