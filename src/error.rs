// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! User-visible error types

use thiserror::Error;

/// Failures surfaced to operators and to the tool layer.
///
/// Messages are terse and name the camera involved so they can be shown
/// to a user verbatim.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Unknown camera: {0}")]
    UnknownCamera(String),

    #[error("Camera '{0}' is disabled")]
    CameraDisabled(String),

    #[error("Capture timed out after {secs}s - camera '{camera}' may be offline")]
    CaptureTimeout { camera: String, secs: u64 },

    #[error("Decoder failed for '{camera}': {reason}")]
    Capture { camera: String, reason: String },

    #[error("Failed to encode snapshot for '{camera}': {reason}")]
    Encode { camera: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Person classifier unavailable: {0}")]
    ClassifierUnavailable(String),
}

/// Result alias for operations that fail with a [`MonitorError`].
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
