// THEORY:
// This file is the main entry point for the `defect_checker` library crate.
// It exposes the batch orchestrators (`pipeline::BatchOrchestrator` and
// `parallel_pipeline::ParallelBatchOrchestrator`) and their data structures
// (`ImageUpload`, `ClassificationResult`, `BatchReport`) as the high-level
// interface. A presentation layer, such as the bundled command line front end,
// only needs those plus `ClassifierConfig` and `Credential`.
//
// The building blocks (`core_modules`) stay public so alternative inference
// providers can implement `InferenceBackend` and callers can reuse the
// preprocessing stage on its own.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{ClassifierConfig, MissingCredentialPolicy, ScaleAnchor};
pub use core_modules::classifier::{DefectClassificationClient, InferenceBackend, InferenceRequest};
pub use core_modules::credential::Credential;
pub use core_modules::gemini::GeminiBackend;
pub use core_modules::image_preprocessor::ImagePreprocessor;
pub use error::{DecodeError, Error, InferenceError, MISSING_CREDENTIAL_NOTICE};
pub use parallel_pipeline::ParallelBatchOrchestrator;
pub use pipeline::{BatchOrchestrator, BatchReport, ClassificationResult, ImageUpload, Interpretation, Outcome, Verdict};

/// Initializes the tracing subscriber for logging.
///
/// Uses `RUST_LOG` when set and falls back to `default_directive` otherwise.
pub fn init_tracing(default_directive: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
