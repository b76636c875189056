// THEORY:
// The model is asked to answer YES or NO, but nothing forces it to. A `Verdict`
// keeps the response text exactly as received so the operator sees what the model
// said, and offers an opt-in interpretation for callers that want to act on it.
// The client never normalizes, so stricter validation can be layered on here
// without touching the network code.

use serde::Serialize;
use std::fmt;

/// A best-effort reading of the model's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpretation {
    /// The model answered YES.
    Defective,
    /// The model answered NO.
    NotDefective,
    /// Anything else: verbose, hedged or empty output.
    Unrecognized,
}

/// The model's raw response for one image, returned verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Verdict(String);

impl Verdict {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }

    /// Interprets the text as a YES/NO answer. Case and surrounding whitespace or
    /// trailing punctuation are ignored; any other content is `Unrecognized`.
    pub fn interpretation(&self) -> Interpretation {
        let answer = self
            .0
            .trim()
            .trim_end_matches(|c: char| c == '.' || c == '!')
            .to_ascii_uppercase();
        match answer.as_str() {
            "YES" => Interpretation::Defective,
            "NO" => Interpretation::NotDefective,
            _ => Interpretation::Unrecognized,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
