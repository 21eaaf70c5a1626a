// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Alert sinks

use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use tracing::{info, warn};

use super::{AlertSink, LabeledImage};

/// Prints alerts to stdout
pub struct ConsoleAlertSink;

impl AlertSink for ConsoleAlertSink {
    fn send_alert(&self, text: &str, images: &[LabeledImage]) {
        println!("\n{}\n", text);
        for image in images {
            println!("  [image] {} ({} bytes)", image.label, image.jpeg.len());
        }
    }
}

/// Posts alerts as JSON to a webhook without blocking the caller.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn payload(text: &str, images: &[LabeledImage]) -> serde_json::Value {
        json!({
            "text": text,
            "images": images
                .iter()
                .map(|i| json!({
                    "camera": i.camera,
                    "label": i.label,
                    "jpeg_base64": BASE64.encode(&i.jpeg),
                }))
                .collect::<Vec<_>>(),
        })
    }
}

impl AlertSink for WebhookAlertSink {
    fn send_alert(&self, text: &str, images: &[LabeledImage]) {
        let payload = Self::payload(text, images);
        let request = self.client.post(&self.url).json(&payload);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to deliver alert; printing instead");
            ConsoleAlertSink.send_alert(text, images);
            return;
        };
        runtime.spawn(async move {
            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => info!("Alert delivered"),
                Err(e) => warn!("Alert delivery failed: {}", e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_carries_text_and_images() {
        let images = vec![LabeledImage {
            camera: "porch".into(),
            label: "Porch".into(),
            jpeg: vec![1, 2, 3],
        }];
        let payload = WebhookAlertSink::payload("--- Watch alert ---", &images);
        assert_eq!(payload["text"], "--- Watch alert ---");
        assert_eq!(payload["images"][0]["camera"], "porch");
        assert_eq!(payload["images"][0]["jpeg_base64"], "AQID");
    }
}
