// THEORY:
// The `DefectClassificationClient` wraps exactly one question to the hosted model:
// "is the slab in this picture defective?". It owns the credential for the batch
// it was built for, attaches the fixed instruction and the already-resized image,
// and hands back whatever text the model answered.
//
// Key architectural principles:
// 1.  **Explicit State**: The credential is an immutable field of the client, not
//     process-wide configuration. A client is built per batch and dropped with it.
// 2.  **Provider Seam**: The wire protocol lives behind `InferenceBackend`. The client
//     only knows "prompt + image in, text out", which keeps it testable without a
//     network and lets another provider slot in.
// 3.  **Passthrough**: The answer is wrapped in a `Verdict` untouched. Interpreting it
//     is the caller's business.
// 4.  **Bounded Retry**: Transient failures (transport, timeouts, 429, 5xx) are retried
//     a fixed number of times with doubling backoff. A rejected credential is final.

use crate::config::ClassifierConfig;
use crate::core_modules::credential::Credential;
use crate::core_modules::prompt::DEFECT_PROMPT;
use crate::core_modules::utils::image_helper::image_helper::{PNG_MIME_TYPE, encode_png_base64};
use crate::core_modules::verdict::Verdict;
use crate::error::{Error, InferenceError};
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Everything the inference endpoint needs for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub prompt: String,
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub image_base64: String,
}

/// A hosted multimodal model that can answer a text prompt about one image.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn generate(&self, credential: &Credential, request: &InferenceRequest) -> Result<String, InferenceError>;
}

/// Submits resized images with the defect prompt and returns the model's verdict.
pub struct DefectClassificationClient {
    credential: Credential,
    backend: Arc<dyn InferenceBackend>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl DefectClassificationClient {
    pub fn new(credential: Credential, backend: Arc<dyn InferenceBackend>, config: &ClassifierConfig) -> Self {
        Self {
            credential,
            backend,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        }
    }

    /// Builds the request body for `image`: the fixed prompt plus a base64 PNG.
    pub fn build_request(image: &DynamicImage) -> Result<InferenceRequest, Error> {
        Ok(InferenceRequest {
            prompt: DEFECT_PROMPT.to_string(),
            mime_type: PNG_MIME_TYPE.to_string(),
            image_base64: encode_png_base64(image)?,
        })
    }

    /// Classifies one already-resized image. PNG encoding runs on the blocking pool.
    pub async fn classify(&self, image: DynamicImage) -> Result<Verdict, Error> {
        if !self.credential.is_present() {
            return Err(Error::MissingCredential);
        }
        let request = tokio::task::spawn_blocking(move || Self::build_request(&image)).await??;
        self.submit(&request).await
    }

    /// Sends a prepared request, retrying transient failures.
    pub async fn submit(&self, request: &InferenceRequest) -> Result<Verdict, Error> {
        if !self.credential.is_present() {
            return Err(Error::MissingCredential);
        }

        let mut attempt = 0u32;
        let mut backoff = self.retry_backoff;
        loop {
            match self.backend.generate(&self.credential, request).await {
                Ok(text) => {
                    debug!(attempt, chars = text.len(), "inference call succeeded");
                    return Ok(Verdict::new(text));
                }
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, max_retries = self.max_retries, %err, "retrying inference call");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
