// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Frames read from an external decoder process over a pipe.
//!
//! The decoder writes raw `bgr24` frames of a fixed size to stdout; each
//! read consumes exactly one frame's worth of bytes. Used for SDP-described
//! sessions (which pull-based capture cannot open reliably) and as the RTSP
//! path when the `opencv` feature is off.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use super::{Frame, FrameSession, FrameSource};

/// What the decoder reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderInput {
    /// Session description file for an SRTP/RTP stream
    Sdp(PathBuf),
    /// Network stream URL
    Rtsp(String),
}

/// Spawns one decoder process per session.
#[derive(Debug, Clone)]
pub struct PipeDecoder {
    camera: String,
    input: DecoderInput,
    program: String,
    width: u32,
    height: u32,
    fps: u32,
    grace: Duration,
}

impl PipeDecoder {
    pub fn new(camera: impl Into<String>, input: DecoderInput, program: impl Into<String>) -> Self {
        Self {
            camera: camera.into(),
            input,
            program: program.into(),
            width: 640,
            height: 480,
            fps: 2,
            grace: Duration::from_secs(5),
        }
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Decoder command line, without the program name
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        match &self.input {
            DecoderInput::Sdp(path) => {
                args.extend(["-protocol_whitelist", "file,udp,srtp,rtp", "-i"].map(String::from));
                args.push(path.display().to_string());
            }
            DecoderInput::Rtsp(url) => {
                args.extend(["-rtsp_transport", "tcp", "-i"].map(String::from));
                args.push(url.clone());
            }
        }
        args.extend(["-f", "rawvideo", "-pix_fmt", "bgr24", "-s"].map(String::from));
        args.push(format!("{}x{}", self.width, self.height));
        args.push("-r".to_string());
        args.push(self.fps.to_string());
        args.extend(["-loglevel", "warning", "pipe:1"].map(String::from));
        args
    }
}

#[async_trait]
impl FrameSource for PipeDecoder {
    fn camera(&self) -> &str {
        &self.camera
    }

    async fn open(&self) -> Result<Box<dyn FrameSession>> {
        let child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start decoder '{}'", self.program))?;

        debug!("capture/{}: decoder started (pid {:?})", self.camera, child.id());
        let session = PipeSession::from_child(child, self.width, self.height, self.grace)?;
        Ok(Box::new(session))
    }
}

/// A running decoder process
pub struct PipeSession {
    child: Child,
    stdout: Option<ChildStdout>,
    width: u32,
    height: u32,
    grace: Duration,
}

impl PipeSession {
    pub(crate) fn from_child(mut child: Child, width: u32, height: u32, grace: Duration) -> Result<Self> {
        let stdout = child.stdout.take().context("decoder stdout was not piped")?;
        Ok(Self {
            child,
            stdout: Some(stdout),
            width,
            height,
            grace,
        })
    }

    #[cfg(unix)]
    fn terminate(&self) {
        if let Some(pid) = self.child.id() {
            // SAFETY: plain signal delivery to a child we own
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        let _ = self.child.start_kill();
    }
}

#[async_trait]
impl FrameSession for PipeSession {
    async fn read(&mut self) -> Option<Frame> {
        let stdout = self.stdout.as_mut()?;
        let mut buf = vec![0u8; Frame::byte_len(self.width, self.height)];
        match stdout.read_exact(&mut buf).await {
            Ok(_) => Frame::from_bgr(self.width, self.height, buf).ok(),
            Err(_) => None,
        }
    }

    fn is_paced(&self) -> bool {
        true
    }

    async fn release(&mut self) {
        self.stdout.take();
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }

        self.terminate();
        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("Decoder did not exit within {:?}, killing", self.grace);
                let _ = self.child.kill().await;
            }
        }
    }
}
