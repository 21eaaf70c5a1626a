// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! One persistent decode session per camera, fanned out to any number of
//! readers through a latest-frame slot.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{Backoff, Frame, FrameSession, FrameSource};
use crate::config::{CaptureConfig, MotionConfig};
use crate::core::{wait_stopped, StopSignal};

/// Reader loop tuning
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Sampling rate for sessions that do not pace themselves
    pub fps: u32,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    /// Consecutive failed reads before the session is torn down
    pub max_read_failures: u32,
}

impl StreamOptions {
    pub fn from_config(motion: &MotionConfig, capture: &CaptureConfig) -> Self {
        Self {
            fps: motion.fps.max(1),
            reconnect_delay: Duration::from_secs(motion.reconnect_delay),
            max_reconnect_delay: Duration::from_secs(motion.max_reconnect_delay),
            max_read_failures: capture.max_read_failures.max(1),
        }
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::from_config(&MotionConfig::default(), &CaptureConfig::default())
    }
}

/// Shared stream for one camera.
///
/// The latest frame slot is never cleared, so after a reconnect readers keep
/// getting the last good frame until a new one arrives.
pub struct SharedStream {
    camera: String,
    source: Arc<dyn FrameSource>,
    options: StreamOptions,
    latest: watch::Sender<Option<Frame>>,
    connected: AtomicBool,
    /// Successful opens so far
    generation: AtomicU64,
    frames: AtomicU64,
    stop: StopSignal,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SharedStream {
    pub fn new(source: Arc<dyn FrameSource>, options: StreamOptions) -> Arc<Self> {
        let (latest, _) = watch::channel(None);
        Arc::new(Self {
            camera: source.camera().to_string(),
            source,
            options,
            latest,
            connected: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            stop: StopSignal::new(),
            task: Mutex::new(None),
        })
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    /// Spawn the reader loop. Calling again while running does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() || self.stop.is_stopped() {
            return;
        }
        let stream = Arc::clone(self);
        *task = Some(tokio::spawn(async move { stream.run().await }));
    }

    /// Signal the reader loop to release its session and exit.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Wait for the reader loop to finish, up to `timeout`.
    pub async fn join(&self, timeout: Duration) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!("capture/{}: reader did not stop within {:?}", self.camera, timeout);
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn has_frame(&self) -> bool {
        self.latest.borrow().is_some()
    }

    /// Number of sessions opened so far; changes on every reconnect.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Latest frame, waiting up to `timeout` if none has arrived yet.
    pub async fn get_frame(&self, timeout: Duration) -> Option<Frame> {
        let current = self.latest.borrow().clone();
        if current.is_some() {
            return current;
        }
        self.wait_for_frame(timeout).await;
        let latest = self.latest.borrow().clone();
        latest
    }

    /// Latest frame as JPEG.
    pub async fn get_jpeg(&self, quality: u8, timeout: Duration) -> Option<Vec<u8>> {
        let frame = self.get_frame(timeout).await?;
        match frame.encode_jpeg(quality) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                warn!("capture/{}: JPEG encode failed: {}", self.camera, e);
                None
            }
        }
    }

    /// True once any frame has ever been delivered. Returns early on stop.
    pub async fn wait_for_frame(&self, timeout: Duration) -> bool {
        let mut rx = self.latest.subscribe();
        let mut stop_rx = self.stop.subscribe();
        let arrived = async { rx.wait_for(|frame| frame.is_some()).await.is_ok() };
        tokio::select! {
            result = tokio::time::timeout(timeout, arrived) => result.unwrap_or(false),
            _ = wait_stopped(&mut stop_rx) => self.has_frame(),
        }
    }

    async fn run(self: Arc<Self>) {
        info!("capture/{}: starting shared stream", self.camera);
        let mut backoff = Backoff::new(self.options.reconnect_delay, self.options.max_reconnect_delay);
        let mut stop_rx = self.stop.subscribe();

        while !self.stop.is_stopped() {
            let opened = tokio::select! {
                result = self.source.open() => result,
                _ = wait_stopped(&mut stop_rx) => break,
            };

            let mut session = match opened {
                Ok(session) => session,
                Err(e) => {
                    self.connected.store(false, Ordering::Release);
                    let delay = backoff.next_delay();
                    warn!(
                        "capture/{}: failed to open stream ({:#}), retrying in {}s",
                        self.camera,
                        e,
                        delay.as_secs()
                    );
                    if self.sleep_or_stop(delay, &mut stop_rx).await {
                        break;
                    }
                    continue;
                }
            };

            backoff.reset();
            self.generation.fetch_add(1, Ordering::AcqRel);
            self.connected.store(true, Ordering::Release);
            info!("capture/{}: stream connected", self.camera);

            let delivered = self.pump(session.as_mut(), &mut stop_rx).await;
            session.release().await;
            self.connected.store(false, Ordering::Release);

            if self.stop.is_stopped() {
                break;
            }
            if delivered == 0 {
                // Opened but produced nothing; don't respawn in a tight loop
                let delay = backoff.next_delay();
                warn!(
                    "capture/{}: session produced no frames, reconnecting in {}s",
                    self.camera,
                    delay.as_secs()
                );
                if self.sleep_or_stop(delay, &mut stop_rx).await {
                    break;
                }
            } else {
                info!("capture/{}: reconnecting", self.camera);
            }
        }

        self.connected.store(false, Ordering::Release);
        info!("capture/{}: shared stream stopped", self.camera);
    }

    /// Read until stopped or too many consecutive failures. Returns frames delivered.
    async fn pump(&self, session: &mut dyn FrameSession, stop_rx: &mut watch::Receiver<bool>) -> u64 {
        let paced = session.is_paced();
        let mut ticker = interval(self.options.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0u32;
        let mut delivered = 0u64;

        loop {
            if !paced {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = wait_stopped(stop_rx) => break,
                }
            }

            let frame = tokio::select! {
                frame = session.read() => frame,
                _ = wait_stopped(stop_rx) => break,
            };

            match frame {
                Some(frame) => {
                    failures = 0;
                    delivered += 1;
                    self.frames.fetch_add(1, Ordering::Relaxed);
                    self.latest.send_replace(Some(frame));
                }
                None => {
                    failures += 1;
                    if failures >= self.options.max_read_failures {
                        warn!(
                            "capture/{}: {} consecutive read failures, reconnecting",
                            self.camera, failures
                        );
                        break;
                    }
                    debug!("capture/{}: read failed ({})", self.camera, failures);
                }
            }
        }
        delivered
    }

    /// Returns true if stopped during the wait.
    async fn sleep_or_stop(&self, delay: Duration, stop_rx: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => self.stop.is_stopped(),
            _ = wait_stopped(stop_rx) => true,
        }
    }
}

impl Drop for SharedStream {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;

    /// Scriptable in-memory source
    pub struct FakeSource {
        pub camera: String,
        /// Opens that fail before the first success
        pub fail_opens: AtomicUsize,
        /// Frames each session yields before every read fails
        pub frames_per_session: Option<u64>,
        pub opens: Mutex<Vec<Instant>>,
        pub live_sessions: Arc<AtomicUsize>,
        pub max_live_sessions: Arc<AtomicUsize>,
        pub make_frame: Arc<dyn Fn(u64) -> Frame + Send + Sync>,
    }

    impl FakeSource {
        pub fn new(camera: &str) -> Self {
            Self {
                camera: camera.to_string(),
                fail_opens: AtomicUsize::new(0),
                frames_per_session: None,
                opens: Mutex::new(Vec::new()),
                live_sessions: Arc::new(AtomicUsize::new(0)),
                max_live_sessions: Arc::new(AtomicUsize::new(0)),
                make_frame: Arc::new(|_| gray_frame(8, 8, 100)),
            }
        }

        pub fn open_count(&self) -> usize {
            self.opens.lock().len()
        }
    }

    pub fn gray_frame(w: u32, h: u32, level: u8) -> Frame {
        Frame::from_bgr(w, h, vec![level; Frame::byte_len(w, h)]).unwrap()
    }

    #[async_trait]
    impl FrameSource for FakeSource {
        fn camera(&self) -> &str {
            &self.camera
        }

        async fn open(&self) -> Result<Box<dyn FrameSession>> {
            self.opens.lock().push(Instant::now());
            let remaining = self.fail_opens.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_opens.store(remaining - 1, Ordering::SeqCst);
                bail!("connection refused");
            }
            let live = self.live_sessions.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live_sessions.fetch_max(live, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                read: 0,
                limit: self.frames_per_session,
                live: self.live_sessions.clone(),
                make_frame: self.make_frame.clone(),
            }))
        }
    }

    struct FakeSession {
        read: u64,
        limit: Option<u64>,
        live: Arc<AtomicUsize>,
        make_frame: Arc<dyn Fn(u64) -> Frame + Send + Sync>,
    }

    #[async_trait]
    impl FrameSession for FakeSession {
        async fn read(&mut self) -> Option<Frame> {
            if let Some(limit) = self.limit {
                if self.read >= limit {
                    return None;
                }
            }
            self.read += 1;
            Some((self.make_frame)(self.read))
        }

        fn is_paced(&self) -> bool {
            false
        }

        async fn release(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn options() -> StreamOptions {
        StreamOptions {
            fps: 10,
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_delay: Duration::from_secs(60),
            max_read_failures: 30,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_readers_share_one_session() {
        let source = Arc::new(FakeSource::new("porch"));
        let stream = SharedStream::new(source.clone(), options());
        stream.start();

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let stream = stream.clone();
                tokio::spawn(async move { stream.get_frame(Duration::from_secs(5)).await })
            })
            .collect();
        for reader in futures::future::join_all(readers).await {
            assert!(reader.unwrap().is_some());
        }

        assert_eq!(source.open_count(), 1);
        assert_eq!(source.max_live_sessions.load(Ordering::SeqCst), 1);
        assert!(stream.is_connected());

        stream.stop();
        stream.join(Duration::from_secs(1)).await;
        assert!(!stream.is_connected());
        assert_eq!(source.live_sessions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failures_back_off() {
        let source = Arc::new(FakeSource::new("porch"));
        source.fail_opens.store(3, Ordering::SeqCst);
        let stream = SharedStream::new(source.clone(), options());
        stream.start();

        assert!(stream.wait_for_frame(Duration::from_secs(120)).await);
        let opens = source.opens.lock().clone();
        assert_eq!(opens.len(), 4);
        let gaps: Vec<u64> = opens.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        assert_eq!(gaps, vec![5, 10, 20]);
        stream.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_open_resets_backoff() {
        let mut fake = FakeSource::new("porch");
        fake.frames_per_session = Some(3);
        fake.fail_opens.store(2, Ordering::SeqCst);
        let source = Arc::new(fake);
        let stream = SharedStream::new(source.clone(), options());
        stream.start();

        // Fails at 0s and 5s, connects at 15s
        assert!(stream.wait_for_frame(Duration::from_secs(60)).await);
        assert_eq!(source.open_count(), 3);

        // The session dies after 3 frames and 30 failed reads; the next open fails once
        source.fail_opens.store(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(15)).await;

        let opens = source.opens.lock().clone();
        assert!(opens.len() >= 5, "{} opens", opens.len());
        let gaps: Vec<u64> = opens.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        assert_eq!(&gaps[..2], &[5, 10]);
        assert_eq!(gaps[3], 5, "backoff starts over after a successful open");
        assert!(stream.generation() >= 2);
        stream.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failures_force_reconnect_and_keep_last_frame() {
        let mut fake = FakeSource::new("porch");
        fake.frames_per_session = Some(3);
        let source = Arc::new(fake);
        let stream = SharedStream::new(source.clone(), options());
        stream.start();

        assert!(stream.wait_for_frame(Duration::from_secs(1)).await);
        // 3 frames + 30 failures at 10 fps, then an immediate reopen
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(source.open_count() >= 2);
        assert!(stream.generation() >= 2);
        assert!(stream.get_frame(Duration::from_millis(1)).await.is_some());
        stream.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_frames() {
        let source = Arc::new(FakeSource::new("porch"));
        source.fail_opens.store(usize::MAX, Ordering::SeqCst);
        let stream = SharedStream::new(source, options());
        stream.start();

        assert!(!stream.wait_for_frame(Duration::from_secs(2)).await);
        assert!(stream.get_frame(Duration::from_secs(1)).await.is_none());
        assert!(stream.get_jpeg(85, Duration::from_millis(10)).await.is_none());
        stream.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_releases_waiters() {
        let source = Arc::new(FakeSource::new("porch"));
        source.fail_opens.store(usize::MAX, Ordering::SeqCst);
        let stream = SharedStream::new(source, options());
        stream.start();

        let waiter = {
            let stream = stream.clone();
            tokio::spawn(async move { stream.wait_for_frame(Duration::from_secs(3600)).await })
        };
        tokio::task::yield_now().await;
        stream.stop();
        assert!(!waiter.await.unwrap());
        stream.join(Duration::from_secs(1)).await;
    }
}
