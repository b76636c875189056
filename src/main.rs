// Command line front end for the defect checker: reads the images named on the
// command line, runs one batch, and prints each verdict beside its filename.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use defect_checker::{
    BatchOrchestrator, BatchReport, ClassifierConfig, Credential, GeminiBackend, ImageUpload, Interpretation,
    MissingCredentialPolicy, Outcome, ParallelBatchOrchestrator, ScaleAnchor,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "defect_checker",
    about = "Ask a hosted multimodal model whether formwork/slab photographs show defects"
)]
struct Args {
    /// Images to check (png, jpg or jpeg), in the order results should be reported.
    images: Vec<PathBuf>,
    /// Google API key for the Generative Language API.
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,
    /// Model name, e.g. gemini-1.5-flash.
    #[arg(long)]
    model: Option<String>,
    /// Endpoint scheme and host.
    #[arg(long)]
    base_url: Option<String>,
    /// Bound in pixels for the scaled image edge.
    #[arg(long)]
    max_edge: Option<u32>,
    /// Which edge `--max-edge` bounds: long-edge or short-edge.
    #[arg(long)]
    scale_anchor: Option<ScaleAnchor>,
    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Retries for transient inference failures.
    #[arg(long)]
    max_retries: Option<u32>,
    /// Pause between inference calls in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Number of concurrent workers; 1 is sequential, 0 picks one per CPU (max 4).
    #[arg(long)]
    concurrency: Option<usize>,
    /// Return a single sentinel instead of one per file when the API key is missing.
    #[arg(long)]
    legacy_missing_key: bool,
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

impl Args {
    fn config(&self) -> ClassifierConfig {
        let mut config = ClassifierConfig::from_env();
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(url) = &self.base_url {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(edge) = self.max_edge {
            config.max_edge = edge.max(1);
        }
        if let Some(anchor) = self.scale_anchor {
            config.scale_anchor = anchor;
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(ms) = self.interval_ms {
            config.request_interval = Duration::from_millis(ms);
        }
        match self.concurrency {
            Some(0) => config.concurrency = ClassifierConfig::default_parallelism(),
            Some(n) => config.concurrency = n,
            None => {}
        }
        if self.legacy_missing_key {
            config.missing_credential_policy = MissingCredentialPolicy::Single;
        }
        config
    }
}

#[derive(Serialize)]
struct JsonResult<'a> {
    filename: &'a str,
    status: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    interpretation: Option<Interpretation>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    results: Vec<JsonResult<'a>>,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    elapsed_ms: u64,
}

async fn load_uploads(paths: &[PathBuf]) -> Result<Vec<ImageUpload>> {
    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        uploads.push(ImageUpload::new(filename, bytes));
    }
    Ok(uploads)
}

fn print_text(report: &BatchReport) {
    for result in &report.results {
        println!("Response for {}:", result.filename);
        println!("{}", result.verdict_text());
        println!("---");
    }
    println!(
        "Processing complete! {} succeeded, {} failed, {} skipped in {:.1}s",
        report.succeeded(),
        report.failed(),
        report.skipped(),
        report.elapsed.as_secs_f64()
    );
}

fn print_json(report: &BatchReport) -> Result<()> {
    let results = report
        .results
        .iter()
        .map(|result| JsonResult {
            filename: &result.filename,
            status: match result.outcome {
                Outcome::Verdict(_) => "verdict",
                Outcome::Skipped(_) => "skipped",
                Outcome::Failed(_) => "failed",
            },
            text: result.verdict_text(),
            interpretation: result.verdict().map(|v| v.interpretation()),
        })
        .collect();
    let json = JsonReport {
        results,
        succeeded: report.succeeded(),
        failed: report.failed(),
        skipped: report.skipped(),
        elapsed_ms: report.elapsed.as_millis() as u64,
    };
    println!("{}", serde_json::to_string_pretty(&json).context("serialize report")?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    defect_checker::init_tracing("info");
    let args = Args::parse();
    let config = args.config();

    if args.images.is_empty() {
        eprintln!("No images uploaded. Please upload images to check for defects.");
        return Ok(ExitCode::FAILURE);
    }

    let credential = Credential::new(args.api_key.as_str());
    if !credential.is_present() {
        eprintln!("Please enter your Google API key.");
    }

    let uploads = load_uploads(&args.images).await?;
    let backend = Arc::new(GeminiBackend::new(&config).context("build inference client")?);

    let report = if config.concurrency > 1 {
        ParallelBatchOrchestrator::new(config, backend).run_batch(credential, uploads).await
    } else {
        BatchOrchestrator::new(config, backend).run_batch(credential, uploads).await
    };

    if args.json {
        print_json(&report)?;
    } else {
        print_text(&report);
    }

    Ok(if report.is_complete_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
