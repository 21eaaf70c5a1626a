// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Adaptive watch scheduler.
//!
//! Waits out the current interval in short slices, waking early when a
//! motion event is queued. Each wake runs one check through the reasoning
//! engine, which may ask for a different interval and a camera focus for
//! the next check. Reports other than the all-clear sentinel become alerts.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{wait_stopped, StopSignal};
use crate::config::WatchConfig;
use crate::detection::{DetectorManager, DetectorStatus, MotionEvent};
use crate::reasoning::{
    AlertSink, CheckKind, CheckOutcome, CheckRequest, LabeledImage, ReasoningEngine,
};

/// Longest single wait before re-checking the event queue
const MAX_WAIT_SLICE: Duration = Duration::from_secs(1);

/// Deadline used when an interval overflows the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Called when a check starts
pub type ActivityHook = Arc<dyn Fn() + Send + Sync>;

/// Snapshot of the scheduler for status queries
#[derive(Debug, Clone, Serialize)]
pub struct WatcherStatus {
    pub running: bool,
    pub last_check_at: Option<DateTime<Utc>>,
    pub next_check_at: Option<DateTime<Utc>>,
    pub last_report: Option<String>,
    pub last_schedule_reason: Option<String>,
    pub interval_seconds: u64,
    pub focus_cameras: Option<Vec<String>>,
    pub motion: Option<BTreeMap<String, DetectorStatus>>,
}

struct WatchState {
    running: bool,
    last_check_at: Option<DateTime<Utc>>,
    next_check_at: Option<DateTime<Utc>>,
    last_report: Option<String>,
    last_schedule_reason: Option<String>,
    interval: Duration,
    focus: Option<Vec<String>>,
}

enum Wake {
    Timer,
    Motion,
}

pub struct Watcher {
    engine: Arc<dyn ReasoningEngine>,
    config: WatchConfig,
    default_interval: Duration,
    state: RwLock<WatchState>,
    detectors: Option<Arc<DetectorManager>>,
    alerts: Option<Arc<dyn AlertSink>>,
    on_activity: Option<ActivityHook>,
    stop: StopSignal,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Watcher {
    pub fn new(engine: Arc<dyn ReasoningEngine>, config: WatchConfig) -> Self {
        let default_interval = Duration::from_secs(config.default_interval_secs.max(1));
        Self {
            engine,
            config,
            default_interval,
            state: RwLock::new(WatchState {
                running: false,
                last_check_at: None,
                next_check_at: None,
                last_report: None,
                last_schedule_reason: None,
                interval: default_interval,
                focus: None,
            }),
            detectors: None,
            alerts: None,
            on_activity: None,
            stop: StopSignal::new(),
            task: Mutex::new(None),
        }
    }

    pub fn with_detectors(mut self, detectors: Arc<DetectorManager>) -> Self {
        self.detectors = Some(detectors);
        self
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn with_activity_hook(mut self, hook: ActivityHook) -> Self {
        self.on_activity = Some(hook);
        self
    }

    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() || self.stop.is_stopped() {
            return;
        }
        self.state.write().running = true;
        info!(
            "Autonomous monitoring started (every {} min)",
            self.default_interval.as_secs() / 60
        );
        let watcher = Arc::clone(self);
        *task = Some(tokio::spawn(async move { watcher.run().await }));
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub async fn join(&self, timeout: Duration) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!("Watcher did not stop within {:?}", timeout);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.read().running
    }

    pub fn status(&self) -> WatcherStatus {
        let state = self.state.read();
        WatcherStatus {
            running: state.running,
            last_check_at: state.last_check_at,
            next_check_at: state.next_check_at,
            last_report: state.last_report.clone(),
            last_schedule_reason: state.last_schedule_reason.clone(),
            interval_seconds: state.interval.as_secs(),
            focus_cameras: state.focus.clone(),
            motion: self.detectors.as_ref().map(|d| d.status()),
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            let interval = self.state.read().interval;
            let now = Instant::now();
            let deadline = now.checked_add(interval).unwrap_or(now + FAR_FUTURE);
            self.state.write().next_check_at = chrono::Duration::from_std(interval)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d));

            let Some(wake) = self.wait_until(deadline).await else {
                break;
            };
            self.run_cycle(wake).await;
            if self.stop.is_stopped() {
                break;
            }
        }

        {
            let mut state = self.state.write();
            state.running = false;
            state.next_check_at = None;
        }
        info!("Autonomous monitoring stopped");
    }

    /// Sliced wait. None when stopped.
    async fn wait_until(&self, deadline: Instant) -> Option<Wake> {
        let slice = Duration::from_millis(self.config.wait_slice_ms.max(1)).min(MAX_WAIT_SLICE);
        let queue = self.detectors.as_ref().map(|d| d.event_queue());
        let mut stop_rx = self.stop.subscribe();

        loop {
            if self.stop.is_stopped() {
                return None;
            }
            if queue.as_ref().is_some_and(|q| !q.is_empty()) {
                return Some(Wake::Motion);
            }
            let now = Instant::now();
            if now >= deadline {
                return Some(Wake::Timer);
            }

            let wait = (deadline - now).min(slice);
            let pushed = async {
                match &queue {
                    Some(q) => q.notified().await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = pushed => {}
                _ = wait_stopped(&mut stop_rx) => return None,
            }
        }
    }

    async fn run_cycle(&self, wake: Wake) {
        if let Some(hook) = &self.on_activity {
            hook();
        }

        let events = match wake {
            Wake::Motion => self
                .detectors
                .as_ref()
                .map(|d| d.get_pending_events())
                .unwrap_or_default(),
            Wake::Timer => Vec::new(),
        };
        let (request, motion_images) = if events.is_empty() {
            (self.routine_request(), Vec::new())
        } else {
            motion_request(events)
        };

        debug!(
            "Running {:?} check (focus: {:?})",
            request.kind, request.focus_cameras
        );
        let result = AssertUnwindSafe(self.engine.check(request))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(outcome)) => self.apply_outcome(outcome, motion_images),
            Ok(Err(e)) => self.check_failed(&format!("{:#}", e)),
            Err(_) => self.check_failed("reasoning engine panicked"),
        }
    }

    fn routine_request(&self) -> CheckRequest {
        CheckRequest {
            kind: CheckKind::Routine,
            requested_at: Utc::now(),
            focus_cameras: self.state.read().focus.clone(),
            motion_summary: None,
            images: Vec::new(),
        }
    }

    fn check_failed(&self, reason: &str) {
        error!("Watch check failed: {}", reason);
        let mut state = self.state.write();
        state.interval = self.default_interval;
        state.last_schedule_reason = None;
        state.focus = None;
    }

    fn apply_outcome(&self, outcome: CheckOutcome, motion_images: Vec<LabeledImage>) {
        let now = Utc::now();
        let interval = {
            let mut state = self.state.write();
            state.last_check_at = Some(now);
            state.last_report = Some(outcome.report.clone());

            let requested = outcome.next_minutes.filter(|m| *m > 0);
            match requested.and_then(|m| requested_interval(m).map(|i| (m, i))) {
                Some((minutes, interval)) => {
                    state.interval = interval;
                    state.last_schedule_reason = outcome.reason.clone();
                    state.focus = outcome.focus_cameras.clone().filter(|f| !f.is_empty());
                    info!(
                        "Next check in {} min ({})",
                        minutes,
                        outcome.reason.as_deref().unwrap_or("no reason given")
                    );
                }
                None => {
                    if let Some(minutes) = requested {
                        warn!("Ignoring out-of-range next check request of {} min", minutes);
                    }
                    state.interval = self.default_interval;
                    state.last_schedule_reason = None;
                    state.focus = None;
                }
            }
            state.interval
        };

        if is_all_clear(&outcome.report, &self.config.all_clear) {
            debug!("Watch check: all clear");
            return;
        }

        let text = format_alert(now, &outcome.report, interval);
        let images = if outcome.photos.is_empty() {
            motion_images
        } else {
            outcome.photos
        };
        info!("Watch alert raised ({} image(s))", images.len());
        match &self.alerts {
            Some(sink) => sink.send_alert(&text, &images),
            None => println!("\n{}\n", text),
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

/// A requested delay the clocks can represent, or None.
fn requested_interval(minutes: i64) -> Option<Duration> {
    let secs = u64::try_from(minutes).ok()?.checked_mul(60)?;
    let interval = Duration::from_secs(secs);
    Instant::now().checked_add(interval)?;
    let wall = chrono::Duration::from_std(interval).ok()?;
    Utc::now().checked_add_signed(wall)?;
    Some(interval)
}

fn motion_request(events: Vec<MotionEvent>) -> (CheckRequest, Vec<LabeledImage>) {
    let events = dedupe_events(events);
    let summary = summarize_events(&events);
    let focus: Vec<String> = events.iter().map(|e| e.camera.clone()).collect();
    let images: Vec<LabeledImage> = events
        .into_iter()
        .filter_map(|e| {
            let label = format!("Motion on '{}' ({})", e.camera, e.trigger);
            e.snapshot.map(|jpeg| LabeledImage {
                camera: e.camera,
                label,
                jpeg,
            })
        })
        .collect();

    let request = CheckRequest {
        kind: CheckKind::MotionTriggered,
        requested_at: Utc::now(),
        focus_cameras: Some(focus),
        motion_summary: Some(summary),
        images: images.clone(),
    };
    (request, images)
}

/// Keep one event per camera, the one with the most motion, in order of
/// each camera's first appearance.
pub fn dedupe_events(events: Vec<MotionEvent>) -> Vec<MotionEvent> {
    let mut best: Vec<MotionEvent> = Vec::new();
    for event in events {
        match best.iter_mut().find(|e| e.camera == event.camera) {
            Some(kept) => {
                if event.motion_percentage > kept.motion_percentage {
                    *kept = event;
                }
            }
            None => best.push(event),
        }
    }
    best
}

/// One line per event
pub fn summarize_events(events: &[MotionEvent]) -> String {
    events
        .iter()
        .map(|e| {
            let mut line = format!(
                "- {} at {}: {}, {:.1}% of frame changed, {} region(s)",
                e.camera,
                e.timestamp.format("%H:%M:%S UTC"),
                e.trigger,
                e.motion_percentage,
                e.contour_count
            );
            if e.person_changed() {
                line.push_str(&format!(
                    ", people {} -> {}",
                    e.previous_person_count, e.person_count
                ));
            } else if e.person_count > 0 {
                line.push_str(&format!(", {} people", e.person_count));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trimmed, case-insensitive match against the sentinel, ignoring trailing
/// punctuation. An empty report counts as all clear.
pub fn is_all_clear(report: &str, sentinel: &str) -> bool {
    let normalize = |s: &str| {
        s.trim()
            .trim_end_matches(|c: char| c.is_ascii_punctuation())
            .trim()
            .to_uppercase()
    };
    let report = normalize(report);
    report.is_empty() || report == normalize(sentinel)
}

pub fn format_alert(at: DateTime<Utc>, report: &str, next: Duration) -> String {
    format!(
        "--- Watch alert at {} ---\n{}\n--- Next check in {} min ---",
        at.format("%H:%M UTC"),
        report.trim(),
        next.as_secs() / 60
    )
}
