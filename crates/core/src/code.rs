//! Human-readable business codes (`TRF-20261017-3F9A1C2B`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A prefixed, dated, collision-resistant code shown to users.
///
/// Codes are display identifiers only; records are keyed by UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessCode(String);

impl BusinessCode {
    /// Generate a code for `prefix` at `at`, suffixed with random hex.
    pub fn generate(prefix: &str, at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}-{}",
            prefix,
            at.format("%Y%m%d"),
            suffix[..8].to_uppercase()
        ))
    }

    pub fn from_string(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for BusinessCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
