// THEORY:
// The credential is a secret handed in by the operator for one batch. It is held as
// an immutable field of the client built for that batch, never stored in global
// state, and never printed. Its `Debug` and `Display` impls redact the value so it
// cannot leak through logs or error messages by accident.

use std::fmt;

/// An opaque API key authorizing calls to the inference endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a raw key. Surrounding whitespace (a common paste artifact) is trimmed.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self(raw.trim().to_string())
    }

    /// A credential is present only if something other than whitespace was supplied.
    pub fn is_present(&self) -> bool {
        !self.0.is_empty()
    }

    /// The secret itself, for placing in a request header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Credential {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Credential {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<Option<String>> for Credential {
    fn from(raw: Option<String>) -> Self {
        Self::new(raw.unwrap_or_default())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_present() {
            f.write_str("Credential(<redacted>)")
        } else {
            f.write_str("Credential(<missing>)")
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
