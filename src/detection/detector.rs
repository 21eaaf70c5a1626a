// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Per-camera change detector

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{
    DetectorPhase, DetectorStatus, EventGate, MotionAnalyzer, MotionEvent, MotionMeasurement,
    SceneState, SharedClassifier, PERSON_CATEGORY,
};
use crate::capture::{Frame, SharedStream};
use crate::config::MotionConfig;
use crate::core::{wait_stopped, EventQueue, StopSignal};

/// How long a newly enabled detector waits for the stream's first frame
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
/// JPEG quality of event snapshots
const SNAPSHOT_QUALITY: u8 = 85;

/// Samples one camera's shared stream and pushes motion events.
///
/// Lifecycle: waiting for enable, waiting for the first frame, warming up,
/// detecting. Disabling returns to waiting for enable; the learned
/// background is discarded and rebuilt on the next enable.
pub struct CameraDetector {
    camera: String,
    stream: Arc<SharedStream>,
    config: MotionConfig,
    enabled: watch::Sender<bool>,
    phase: Mutex<DetectorPhase>,
    state: Arc<RwLock<SceneState>>,
    queue: Arc<EventQueue>,
    classifier: Arc<SharedClassifier>,
    stop: StopSignal,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CameraDetector {
    pub fn new(
        stream: Arc<SharedStream>,
        config: MotionConfig,
        queue: Arc<EventQueue>,
        classifier: Arc<SharedClassifier>,
    ) -> Arc<Self> {
        let (enabled, _) = watch::channel(config.enabled);
        Arc::new(Self {
            camera: stream.camera().to_string(),
            stream,
            config,
            enabled,
            phase: Mutex::new(DetectorPhase::Disabled),
            state: Arc::new(RwLock::new(SceneState::default())),
            queue,
            classifier,
            stop: StopSignal::new(),
            task: Mutex::new(None),
        })
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() || self.stop.is_stopped() {
            return;
        }
        let detector = Arc::clone(self);
        *task = Some(tokio::spawn(async move { detector.run().await }));
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub async fn join(&self, timeout: Duration) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!("motion/{}: detector did not stop within {:?}", self.camera, timeout);
            }
        }
    }

    pub fn enable(&self) {
        if !self.enabled.send_replace(true) {
            info!("motion/{}: enabled", self.camera);
        }
    }

    pub fn disable(&self) {
        if self.enabled.send_replace(false) {
            info!("motion/{}: disabled", self.camera);
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    pub fn phase(&self) -> DetectorPhase {
        *self.phase.lock()
    }

    pub fn scene(&self) -> SceneState {
        self.state.read().clone()
    }

    pub fn status(&self) -> DetectorStatus {
        DetectorStatus {
            enabled: self.is_enabled(),
            phase: self.phase(),
            stream_connected: self.stream.is_connected(),
            scene: self.scene(),
        }
    }

    fn set_phase(&self, phase: DetectorPhase) {
        let mut current = self.phase.lock();
        if *current != phase {
            debug!("motion/{}: {:?} -> {:?}", self.camera, *current, phase);
            *current = phase;
        }
    }

    async fn run(self: Arc<Self>) {
        let mut enabled_rx = self.enabled.subscribe();
        let mut stop_rx = self.stop.subscribe();
        // Cooldown survives disable/enable cycles
        let mut gate = EventGate::new(self.config.threshold, self.config.cooldown(), self.state.clone());

        loop {
            self.set_phase(DetectorPhase::WaitingForEnable);
            tokio::select! {
                result = enabled_rx.wait_for(|enabled| *enabled) => {
                    if result.is_err() {
                        break;
                    }
                }
                _ = wait_stopped(&mut stop_rx) => break,
            }

            self.set_phase(DetectorPhase::WaitingForFirstFrame);
            let ready = tokio::select! {
                ready = self.stream.wait_for_frame(FIRST_FRAME_TIMEOUT) => ready,
                _ = wait_stopped(&mut stop_rx) => break,
            };
            if !ready {
                debug!("motion/{}: no frame yet, waiting again", self.camera);
                continue;
            }

            info!("motion/{}: stream ready, starting detection", self.camera);
            if self.detect(&mut gate, &mut enabled_rx, &mut stop_rx).await {
                break;
            }
        }

        self.set_phase(DetectorPhase::Stopped);
        info!("motion/{}: detector stopped", self.camera);
    }

    /// Sample until disabled or stopped. Returns true when stopped.
    async fn detect(
        &self,
        gate: &mut EventGate,
        enabled_rx: &mut watch::Receiver<bool>,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        let frame_interval = self.config.frame_interval();
        let mut analyzer = MotionAnalyzer::new(&self.config);
        let mut generation = self.stream.generation();
        let mut ticker = interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.set_phase(DetectorPhase::WarmingUp);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = enabled_rx.wait_for(|enabled| !*enabled) => return false,
                _ = wait_stopped(stop_rx) => return true,
            }

            let Some(frame) = self.stream.get_frame(frame_interval).await else {
                continue;
            };

            // A new session means a new background
            let current = self.stream.generation();
            if current != generation {
                debug!("motion/{}: stream reconnected, restarting warm-up", self.camera);
                analyzer.reset();
                generation = current;
                self.set_phase(DetectorPhase::WarmingUp);
            }

            let Some(measurement) = analyzer.process(&frame) else {
                continue;
            };
            self.set_phase(DetectorPhase::Detecting);

            if measurement.motion_percentage >= self.config.threshold {
                self.handle_motion(gate, frame, measurement).await;
            }
        }
    }

    async fn handle_motion(&self, gate: &mut EventGate, frame: Frame, measurement: MotionMeasurement) {
        let person_count = if self.config.person_detection {
            self.count_people(&frame, gate).await
        } else {
            0
        };

        let at = Utc::now();
        let Some(decision) = gate.evaluate(measurement.motion_percentage, person_count, Instant::now(), at)
        else {
            debug!("motion/{}: in cooldown, skipping", self.camera);
            return;
        };

        let snapshot = match frame.encode_jpeg(SNAPSHOT_QUALITY) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                warn!("motion/{}: snapshot encode failed: {}", self.camera, e);
                None
            }
        };

        let event = MotionEvent::new(
            &self.camera,
            at,
            measurement.motion_percentage,
            measurement.contour_count,
            decision.person_count,
            decision.previous_person_count,
            snapshot,
            decision.trigger,
        );
        info!(
            "motion/{}: {} ({:.1}% changed, {} region(s), people {} -> {})",
            self.camera,
            event.trigger,
            event.motion_percentage,
            event.contour_count,
            event.previous_person_count,
            event.person_count
        );
        self.queue.push(event);
    }

    /// People in the frame. 0 when no classifier is available; the last
    /// known count when a call fails.
    async fn count_people(&self, frame: &Frame, gate: &EventGate) -> u32 {
        let Some(classifier) = self.classifier.get() else {
            return 0;
        };
        match classifier
            .count(frame, self.config.person_confidence, PERSON_CATEGORY)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!("motion/{}: person count failed: {:#}", self.camera, e);
                gate.state().person_count
            }
        }
    }
}
