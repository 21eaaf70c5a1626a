// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Event emission policy: trigger classification and per-camera cooldown

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time::Instant;

use super::{SceneState, Trigger};

/// Outcome of a gate evaluation that passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub trigger: Trigger,
    pub person_count: u32,
    pub previous_person_count: u32,
}

/// Decides whether a significant-motion frame becomes an event.
///
/// A change in person count always passes. Pure motion is held back until
/// the cooldown since the last emitted event has elapsed. Suppressed frames
/// leave the scene state untouched.
pub struct EventGate {
    threshold: f64,
    cooldown: Duration,
    last_event: Option<Instant>,
    state: Arc<RwLock<SceneState>>,
}

impl EventGate {
    pub fn new(threshold: f64, cooldown: Duration, state: Arc<RwLock<SceneState>>) -> Self {
        Self {
            threshold,
            cooldown,
            last_event: None,
            state,
        }
    }

    pub fn evaluate(
        &mut self,
        motion_percentage: f64,
        person_count: u32,
        now: Instant,
        at: DateTime<Utc>,
    ) -> Option<Decision> {
        let previous = self.state.read().person_count;
        let person_changed = person_count != previous;
        let motion = motion_percentage >= self.threshold;

        let trigger = match (motion, person_changed) {
            (true, true) => Trigger::Both,
            (false, true) => Trigger::PersonChange,
            _ => Trigger::Motion,
        };

        if !person_changed {
            if let Some(last) = self.last_event {
                if now.saturating_duration_since(last) < self.cooldown {
                    return None;
                }
            }
        }

        self.last_event = Some(now);
        {
            let mut state = self.state.write();
            state.last_motion_at = Some(at);
            if person_changed {
                state.person_count = person_count;
                state.last_person_change_at = Some(at);
            }
        }

        Some(Decision {
            trigger,
            person_count,
            previous_person_count: previous,
        })
    }

    pub fn state(&self) -> SceneState {
        self.state.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> EventGate {
        EventGate::new(1.0, Duration::from_secs(60), Arc::new(RwLock::new(SceneState::default())))
    }

    #[test]
    fn test_cooldown_suppresses_pure_motion() {
        let mut gate = gate();
        let t0 = Instant::now();

        let first = gate.evaluate(5.0, 0, t0, Utc::now()).unwrap();
        assert_eq!(first.trigger, Trigger::Motion);
        let stamp = gate.state().last_motion_at;

        assert!(gate.evaluate(5.0, 0, t0 + Duration::from_secs(10), Utc::now()).is_none());
        assert_eq!(gate.state().last_motion_at, stamp);

        assert!(gate.evaluate(5.0, 0, t0 + Duration::from_secs(61), Utc::now()).is_some());
    }

    #[test]
    fn test_person_change_bypasses_cooldown() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.evaluate(5.0, 0, t0, Utc::now()).unwrap();

        let decision = gate
            .evaluate(5.0, 1, t0 + Duration::from_secs(10), Utc::now())
            .unwrap();
        assert_eq!(decision.trigger, Trigger::Both);
        assert_eq!(decision.previous_person_count, 0);
        assert_eq!(decision.person_count, 1);

        let state = gate.state();
        assert_eq!(state.person_count, 1);
        assert!(state.last_person_change_at.is_some());
    }

    #[test]
    fn test_person_change_below_threshold() {
        let mut gate = gate();
        let decision = gate.evaluate(0.5, 2, Instant::now(), Utc::now()).unwrap();
        assert_eq!(decision.trigger, Trigger::PersonChange);
    }

    #[test]
    fn test_unchanged_count_keeps_change_time() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.evaluate(5.0, 1, t0, Utc::now()).unwrap();
        let changed_at = gate.state().last_person_change_at;

        gate.evaluate(5.0, 1, t0 + Duration::from_secs(120), Utc::now()).unwrap();
        assert_eq!(gate.state().last_person_change_at, changed_at);
    }
}
