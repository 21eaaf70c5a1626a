// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Frame source traits

use anyhow::Result;
use async_trait::async_trait;

use super::Frame;

/// Something that can open a decode session for one camera.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Camera this source belongs to
    fn camera(&self) -> &str;

    /// Open a new session. Failures are retried by the caller with backoff.
    async fn open(&self) -> Result<Box<dyn FrameSession>>;
}

/// A live decode session.
#[async_trait]
pub trait FrameSession: Send {
    /// Next frame, or `None` on a read failure.
    async fn read(&mut self) -> Option<Frame>;

    /// Whether `read` blocks until the producer emits a frame. Unpaced
    /// sessions are polled at the sampling rate instead.
    fn is_paced(&self) -> bool;

    /// Tear the session down. Must not fail.
    async fn release(&mut self);
}
