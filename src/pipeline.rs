// THEORY:
// The `pipeline` module is the top-level API of the defect checker. A caller hands
// it a credential and the uploaded files, in the order the operator picked them,
// and receives one result per file in that same order.
//
// Stages, per upload:
// 1.  **Gatekeeping**: extension allow-list and decoding. A bad upload becomes a
//     failed result for that file only.
// 2.  **Preprocessing**: bounded downscale and PNG encode. Stages 1 and 2 run on
//     tokio's blocking pool, never on the async workers.
// 3.  **Classification**: one inference call through the batch's client.
// 4.  **Accumulation**: the outcome is appended under the upload's filename.
//
// A missing credential is checked once, up front, and no upload is touched. Uploads
// are processed strictly one after another; `parallel_pipeline` offers the same
// contract on a worker pool.

use crate::config::{ClassifierConfig, MissingCredentialPolicy};
use crate::core_modules::classifier::{DefectClassificationClient, InferenceBackend, InferenceRequest};
use crate::core_modules::credential::Credential;
use crate::core_modules::gemini::GeminiBackend;
use crate::core_modules::image_preprocessor::{ImagePreprocessor, check_extension};
use crate::error::{Error, InferenceError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::verdict::{Interpretation, Verdict};

/// One uploaded file: its display name and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// What happened to a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The model answered; text is verbatim.
    Verdict(Verdict),
    /// No inference was attempted (missing credential).
    Skipped(Error),
    /// Decoding or inference failed for this file.
    Failed(Error),
}

/// The result for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub filename: String,
    pub outcome: Outcome,
}

impl ClassificationResult {
    pub fn new(filename: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            filename: filename.into(),
            outcome,
        }
    }

    /// The text shown beside the filename: the verdict, the notice, or the error.
    pub fn verdict_text(&self) -> String {
        match &self.outcome {
            Outcome::Verdict(verdict) => verdict.text().to_string(),
            Outcome::Skipped(err) | Outcome::Failed(err) => err.to_string(),
        }
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        match &self.outcome {
            Outcome::Verdict(verdict) => Some(verdict),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Verdict(_))
    }
}

/// The ordered results of one batch plus aggregate counts.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: Vec<ClassificationResult>,
    pub elapsed: Duration,
    /// Set when the batch was short-circuited for lack of a credential.
    pub credential_missing: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| matches!(r.outcome, Outcome::Failed(_))).count()
    }

    pub fn skipped(&self) -> usize {
        self.results.iter().filter(|r| matches!(r.outcome, Outcome::Skipped(_))).count()
    }

    /// True when every upload produced a verdict.
    pub fn is_complete_success(&self) -> bool {
        !self.credential_missing && self.results.iter().all(ClassificationResult::is_success)
    }

    /// The `(filename, verdictText)` view of the results.
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.results.iter().map(|r| (r.filename.clone(), r.verdict_text())).collect()
    }
}

/// Builds the sentinel results for a batch submitted without a credential.
pub fn missing_credential_results(policy: MissingCredentialPolicy, uploads: &[ImageUpload]) -> Vec<ClassificationResult> {
    if uploads.is_empty() {
        return Vec::new();
    }
    match policy {
        MissingCredentialPolicy::PerFile => uploads
            .iter()
            .map(|upload| ClassificationResult::new(upload.filename.clone(), Outcome::Skipped(Error::MissingCredential)))
            .collect(),
        MissingCredentialPolicy::Single => {
            vec![ClassificationResult::new(String::new(), Outcome::Skipped(Error::MissingCredential))]
        }
    }
}

/// Validates, decodes, downscales and encodes one upload into a ready request.
/// CPU-bound; async callers go through [`prepare_off_runtime`].
pub fn prepare_upload(preprocessor: &ImagePreprocessor, upload: &ImageUpload) -> Result<InferenceRequest, Error> {
    check_extension(&upload.filename)?;
    let raw = preprocessor.decode(&upload.bytes)?;
    let resized = preprocessor.resize(&raw);
    debug!(
        file = %upload.filename,
        original = ?(raw.width(), raw.height()),
        resized = ?(resized.width(), resized.height()),
        "prepared upload"
    );
    DefectClassificationClient::build_request(&resized)
}

/// Runs [`prepare_upload`] on the blocking pool so a large image does not stall the
/// runtime's other tasks. A panicked or cancelled task becomes `Error::Processing`.
pub(crate) async fn prepare_off_runtime(preprocessor: ImagePreprocessor, upload: ImageUpload) -> Result<InferenceRequest, Error> {
    tokio::task::spawn_blocking(move || prepare_upload(&preprocessor, &upload)).await?
}

/// Logs and wraps the result of one classification.
pub(crate) fn record(filename: &str, result: Result<Verdict, Error>) -> ClassificationResult {
    match result {
        Ok(verdict) => {
            info!(file = %filename, verdict = %verdict.text().trim(), "classified");
            ClassificationResult::new(filename, Outcome::Verdict(verdict))
        }
        Err(err) => {
            warn!(file = %filename, %err, "classification failed");
            ClassificationResult::new(filename, Outcome::Failed(err))
        }
    }
}

/// Runs batches sequentially, one inference call at a time.
pub struct BatchOrchestrator {
    config: ClassifierConfig,
    backend: Arc<dyn InferenceBackend>,
    preprocessor: ImagePreprocessor,
}

impl BatchOrchestrator {
    pub fn new(config: ClassifierConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        let preprocessor = ImagePreprocessor::new(config.max_edge, config.scale_anchor);
        Self {
            config,
            backend,
            preprocessor,
        }
    }

    /// An orchestrator talking to the Gemini endpoint described by `config`.
    pub fn with_gemini(config: ClassifierConfig) -> Result<Self, InferenceError> {
        let backend = Arc::new(GeminiBackend::new(&config)?);
        Ok(Self::new(config, backend))
    }

    /// Classifies every upload in order. Per-item failures are recorded and the batch
    /// continues; a missing credential yields sentinel results and no inference calls.
    pub async fn run_batch(&self, credential: Credential, uploads: Vec<ImageUpload>) -> BatchReport {
        let started = Instant::now();
        info!(images = uploads.len(), model = %self.config.model, "starting batch");

        if !credential.is_present() {
            warn!("no API key supplied; skipping inference for the whole batch");
            return BatchReport {
                results: missing_credential_results(self.config.missing_credential_policy, &uploads),
                elapsed: started.elapsed(),
                credential_missing: true,
            };
        }

        let client = DefectClassificationClient::new(credential, self.backend.clone(), &self.config);
        let mut results = Vec::with_capacity(uploads.len());
        let mut called_before = false;

        for upload in uploads {
            let filename = upload.filename.clone();
            let outcome = match prepare_off_runtime(self.preprocessor, upload).await {
                Ok(request) => {
                    if called_before && !self.config.request_interval.is_zero() {
                        tokio::time::sleep(self.config.request_interval).await;
                    }
                    called_before = true;
                    client.submit(&request).await
                }
                Err(err) => Err(err),
            };
            results.push(record(&filename, outcome));
        }

        let report = BatchReport {
            results,
            elapsed: started.elapsed(),
            credential_missing: false,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "batch complete"
        );
        report
    }
}
