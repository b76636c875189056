// THEORY:
// `ClassifierConfig` gathers every tunable of a batch run in one plain struct.
// Defaults are the inspection desk's established settings (gemini-1.5-flash, 256px
// images, one second between requests). An environment overlay lets deployments
// change them without recompiling, and the command line overrides both.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MAX_EDGE: u32 = 256;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
const MAX_DEFAULT_CONCURRENCY: usize = 4;

const ENV_PREFIX: &str = "DEFECT_CHECKER_";

/// Which image edge is bounded by `max_edge` when downscaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleAnchor {
    /// The longer edge is brought down to `max_edge`.
    #[default]
    LongEdge,
    /// The shorter edge is brought down to `max_edge`; the longer edge may stay above it.
    ShortEdge,
}

impl FromStr for ScaleAnchor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "long-edge" | "long" => Ok(ScaleAnchor::LongEdge),
            "short-edge" | "short" => Ok(ScaleAnchor::ShortEdge),
            other => Err(format!("unknown scale anchor '{other}' (expected long-edge or short-edge)")),
        }
    }
}

/// What a batch returns when no credential was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingCredentialPolicy {
    /// One sentinel result per uploaded file, keeping N inputs -> N outputs.
    #[default]
    PerFile,
    /// A single sentinel with an empty filename, regardless of how many files were uploaded.
    Single,
}

/// Configuration for a classification batch.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Model identifier placed in the `models/{model}:generateContent` path.
    pub model: String,
    /// Scheme and host of the inference endpoint, without a trailing slash.
    pub base_url: String,
    /// Target size in pixels for the bounded edge.
    pub max_edge: u32,
    pub scale_anchor: ScaleAnchor,
    /// Upper bound on a single HTTP round trip.
    pub request_timeout: Duration,
    /// Additional attempts after a retryable failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub retry_backoff: Duration,
    /// Pause between consecutive inference calls. Zero disables pacing.
    pub request_interval: Duration,
    /// Worker count for the parallel pipeline. 1 means strictly sequential.
    pub concurrency: usize,
    pub missing_credential_policy: MissingCredentialPolicy,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_edge: DEFAULT_MAX_EDGE,
            scale_anchor: ScaleAnchor::default(),
            request_timeout: Duration::from_secs(60),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(500),
            request_interval: Duration::from_secs(1),
            concurrency: 1,
            missing_credential_policy: MissingCredentialPolicy::default(),
        }
    }
}

impl ClassifierConfig {
    /// Defaults overlaid with any `DEFECT_CHECKER_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup. The lookup is asked for full
    /// variable names such as `DEFECT_CHECKER_MODEL`. Malformed values are logged and ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(model) = get("MODEL") {
            self.model = model;
        }
        if let Some(url) = get("BASE_URL") {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(edge) = parse_var::<u32>("MAX_EDGE", get("MAX_EDGE")).filter(|e| *e > 0) {
            self.max_edge = edge;
        }
        if let Some(anchor) = parse_var::<ScaleAnchor>("SCALE_ANCHOR", get("SCALE_ANCHOR")) {
            self.scale_anchor = anchor;
        }
        if let Some(secs) = parse_var::<u64>("TIMEOUT_SECS", get("TIMEOUT_SECS")).filter(|s| *s > 0) {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var::<u32>("MAX_RETRIES", get("MAX_RETRIES")) {
            self.max_retries = retries;
        }
        if let Some(ms) = parse_var::<u64>("INTERVAL_MS", get("INTERVAL_MS")) {
            self.request_interval = Duration::from_millis(ms);
        }
        if let Some(workers) = parse_var::<usize>("CONCURRENCY", get("CONCURRENCY")).filter(|w| *w > 0) {
            self.concurrency = workers;
        }
        self
    }

    /// A worker count suited to the host when the caller asks for parallelism without a number.
    pub fn default_parallelism() -> usize {
        num_cpus::get().clamp(1, MAX_DEFAULT_CONCURRENCY)
    }
}

fn parse_var<T>(name: &str, raw: Option<String>) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = raw?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            let variable = format!("{ENV_PREFIX}{name}");
            warn!(%variable, value = %raw, %err, "ignoring malformed setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_inspection_settings() {
        let config = ClassifierConfig::default();
        assert_eq!(config.model, "gemini-1.5-flash");
        assert_eq!(config.max_edge, 256);
        assert_eq!(config.request_interval, Duration::from_secs(1));
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.missing_credential_policy, MissingCredentialPolicy::PerFile);
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = ClassifierConfig::default().with_overrides(lookup(&[
            ("DEFECT_CHECKER_MODEL", "gemini-2.0-flash"),
            ("DEFECT_CHECKER_BASE_URL", "http://127.0.0.1:9000/"),
            ("DEFECT_CHECKER_MAX_EDGE", "512"),
            ("DEFECT_CHECKER_SCALE_ANCHOR", "short_edge"),
            ("DEFECT_CHECKER_INTERVAL_MS", "0"),
            ("DEFECT_CHECKER_CONCURRENCY", "3"),
            ("DEFECT_CHECKER_TIMEOUT_SECS", "5"),
            ("DEFECT_CHECKER_MAX_RETRIES", "7"),
        ]));
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.max_edge, 512);
        assert_eq!(config.scale_anchor, ScaleAnchor::ShortEdge);
        assert_eq!(config.request_interval, Duration::ZERO);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 7);
    }

    #[test]
    fn malformed_or_zero_values_keep_defaults() {
        let config = ClassifierConfig::default().with_overrides(lookup(&[
            ("DEFECT_CHECKER_MAX_EDGE", "huge"),
            ("DEFECT_CHECKER_TIMEOUT_SECS", "0"),
            ("DEFECT_CHECKER_CONCURRENCY", "0"),
            ("DEFECT_CHECKER_MODEL", "   "),
        ]));
        assert_eq!(config.max_edge, DEFAULT_MAX_EDGE);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn default_parallelism_is_bounded() {
        let workers = ClassifierConfig::default_parallelism();
        assert!((1..=MAX_DEFAULT_CONCURRENCY).contains(&workers));
    }
}
