// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Reasoning engine reached over HTTP

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CheckKind, CheckOutcome, CheckRequest, LabeledImage, ReasoningEngine};
use crate::config::ReasoningConfig;

#[derive(Debug, Serialize, Deserialize)]
struct WireImage {
    camera: String,
    label: String,
    jpeg_base64: String,
}

impl From<&LabeledImage> for WireImage {
    fn from(image: &LabeledImage) -> Self {
        Self {
            camera: image.camera.clone(),
            label: image.label.clone(),
            jpeg_base64: BASE64.encode(&image.jpeg),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    kind: CheckKind,
    requested_at: String,
    focus_cameras: Option<Vec<String>>,
    motion_summary: Option<String>,
    images: Vec<WireImage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireOutcome {
    report: String,
    next_minutes: Option<i64>,
    reason: Option<String>,
    focus_cameras: Option<Vec<String>>,
    photos: Vec<WireImage>,
}

impl WireOutcome {
    fn into_outcome(self) -> CheckOutcome {
        let photos = self
            .photos
            .into_iter()
            .filter_map(|p| match BASE64.decode(&p.jpeg_base64) {
                Ok(jpeg) => Some(LabeledImage {
                    camera: p.camera,
                    label: p.label,
                    jpeg,
                }),
                Err(e) => {
                    warn!("Dropping undecodable photo for {}: {}", p.camera, e);
                    None
                }
            })
            .collect();
        CheckOutcome {
            report: self.report,
            next_minutes: self.next_minutes,
            reason: self.reason,
            focus_cameras: self.focus_cameras,
            photos,
        }
    }
}

/// POSTs each check as JSON and reads back the outcome.
pub struct HttpReasoningEngine {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReasoningEngine {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reasoning HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// None when no endpoint is configured
    pub fn from_config(config: &ReasoningConfig) -> Result<Option<Self>> {
        match &config.endpoint {
            Some(endpoint) => {
                let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(120));
                Ok(Some(Self::new(endpoint.clone(), timeout)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ReasoningEngine for HttpReasoningEngine {
    async fn check(&self, request: CheckRequest) -> Result<CheckOutcome> {
        let wire = WireRequest {
            kind: request.kind,
            requested_at: request.requested_at.to_rfc3339(),
            focus_cameras: request.focus_cameras,
            motion_summary: request.motion_summary,
            images: request.images.iter().map(WireImage::from).collect(),
        };
        debug!("Sending {:?} check with {} image(s)", wire.kind, wire.images.len());

        let outcome: WireOutcome = self
            .client
            .post(&self.endpoint)
            .json(&wire)
            .send()
            .await
            .context("reasoning request failed")?
            .error_for_status()?
            .json()
            .await
            .context("reasoning response was not valid JSON")?;
        Ok(outcome.into_outcome())
    }
}
