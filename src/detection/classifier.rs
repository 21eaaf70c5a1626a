// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Person classifier seam and its lazily-loaded shared handle

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::capture::Frame;
use crate::config::ClassifierConfig;
use crate::error::MonitorError;

/// Category label the detectors count
pub const PERSON_CATEGORY: &str = "person";

/// Counts instances of a category in a frame.
#[async_trait]
pub trait PersonClassifier: Send + Sync {
    async fn count(&self, frame: &Frame, min_confidence: f32, category: &str) -> Result<u32>;
}

/// Builds the classifier on first use
pub type ClassifierLoader = Arc<dyn Fn() -> Result<Arc<dyn PersonClassifier>> + Send + Sync>;

/// Loader that always fails, for setups without a classifier.
pub fn unavailable_loader(reason: impl Into<String>) -> ClassifierLoader {
    let reason = reason.into();
    Arc::new(move || -> Result<Arc<dyn PersonClassifier>> {
        Err(MonitorError::ClassifierUnavailable(reason.clone()).into())
    })
}

/// Process-wide classifier, loaded at most once.
///
/// A load failure is cached too: it is logged once and every later caller
/// sees `None` without retrying.
pub struct SharedClassifier {
    loader: ClassifierLoader,
    cell: OnceLock<Option<Arc<dyn PersonClassifier>>>,
}

impl SharedClassifier {
    pub fn new(loader: ClassifierLoader) -> Self {
        Self {
            loader,
            cell: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Option<Arc<dyn PersonClassifier>> {
        self.cell
            .get_or_init(|| match (self.loader)() {
                Ok(classifier) => {
                    info!("Person classifier loaded");
                    Some(classifier)
                }
                Err(e) => {
                    error!("Failed to load person classifier: {:#}", e);
                    None
                }
            })
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.cell.get(), Some(Some(_)))
    }
}

#[derive(Serialize)]
struct CountRequest<'a> {
    model: &'a str,
    category: &'a str,
    min_confidence: f32,
    /// Base64 JPEG
    image: String,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u32,
}

/// Classifier served over HTTP.
///
/// POSTs `{model, category, min_confidence, image}` and expects `{count}`.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build classifier HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }

    /// Loader for the configured endpoint; fails at load time if none is set.
    pub fn loader(config: &ClassifierConfig, model: &str) -> ClassifierLoader {
        let endpoint = config.endpoint.clone();
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(10));
        let model = model.to_string();
        Arc::new(move || -> Result<Arc<dyn PersonClassifier>> {
            let endpoint = endpoint
                .clone()
                .ok_or_else(|| MonitorError::ClassifierUnavailable("no classifier endpoint configured".into()))?;
            let classifier: Arc<dyn PersonClassifier> = Arc::new(HttpClassifier::new(endpoint, model.clone(), timeout)?);
            Ok(classifier)
        })
    }
}

#[async_trait]
impl PersonClassifier for HttpClassifier {
    async fn count(&self, frame: &Frame, min_confidence: f32, category: &str) -> Result<u32> {
        let jpeg = frame.encode_jpeg(90)?;
        let request = CountRequest {
            model: &self.model,
            category,
            min_confidence,
            image: BASE64.encode(jpeg),
        };
        let response: CountResponse = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.count)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FixedClassifier;
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    #[test]
    fn test_loads_once_across_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader: ClassifierLoader = {
            let calls = calls.clone();
            Arc::new(move || -> Result<Arc<dyn PersonClassifier>> {
                calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                let c: Arc<dyn PersonClassifier> = Arc::new(FixedClassifier(AtomicU32::new(1)));
                Ok(c)
            })
        };
        let shared = Arc::new(SharedClassifier::new(loader));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || shared.get().is_some())
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(shared.is_loaded());
    }

    #[test]
    fn test_failure_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader: ClassifierLoader = {
            let calls = calls.clone();
            Arc::new(move || -> Result<Arc<dyn PersonClassifier>> {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("model file missing")
            })
        };
        let shared = SharedClassifier::new(loader);
        assert!(shared.get().is_none());
        assert!(shared.get().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!shared.is_loaded());
    }

    #[test]
    fn test_missing_endpoint_is_unavailable() {
        let loader = HttpClassifier::loader(&ClassifierConfig::default(), "yolov8n");
        let shared = SharedClassifier::new(loader);
        assert!(shared.get().is_none());

        let shared = SharedClassifier::new(unavailable_loader("disabled"));
        assert!(shared.get().is_none());
    }
}
