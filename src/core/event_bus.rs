// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Motion event queue shared by all detectors

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::detection::MotionEvent;

/// Many-producer queue drained as a batch by a single logical consumer.
pub struct EventQueue {
    events: Mutex<VecDeque<MotionEvent>>,
    notify: Notify,
    published: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            published: AtomicU64::new(0),
        }
    }

    pub fn push(&self, event: MotionEvent) {
        self.events.lock().push_back(event);
        self.published.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Remove and return everything queued, oldest first.
    pub fn drain(&self) -> Vec<MotionEvent> {
        let drained = std::mem::take(&mut *self.events.lock());
        drained.into()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Total events ever pushed
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Resolves after the next push (or immediately if a push happened
    /// since the last wake-up).
    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
