use garde::Validate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Metadata key recording which path produced a completion.
pub const SOURCE_KEY: &str = "source";
/// Value of [`SOURCE_KEY`] for completions synthesized by the status poller.
pub const POLL_SOURCE: &str = "status-poll";

/// Completion notification pushed by the remote compute backend.
///
/// Authenticity is checked at the transport boundary before this is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CallbackPayload {
    #[garde(skip)]
    pub job_id: Uuid,

    #[garde(length(min = 1, max = 32))]
    pub status: String,

    #[garde(length(min = 1, max = 4096))]
    #[serde(default)]
    pub output_url: Option<String>,

    #[garde(skip)]
    #[serde(default)]
    pub output_base64: Option<String>,

    /// Storage location the backend wrote to directly (write-back targets).
    #[garde(length(min = 1, max = 1024))]
    #[serde(default)]
    pub output_ref: Option<String>,

    #[garde(length(max = 8192))]
    #[serde(default)]
    pub error: Option<String>,

    #[garde(skip)]
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Where the bytes of a successful completion come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource<'a> {
    Inline(&'a str),
    Remote(&'a str),
    WrittenBack(&'a str),
}

impl CallbackPayload {
    pub fn is_failure(&self) -> bool {
        matches!(self.status.to_ascii_lowercase().as_str(), "failed" | "error")
    }

    pub fn is_poll_derived(&self) -> bool {
        self.metadata.get(SOURCE_KEY).map(String::as_str) == Some(POLL_SOURCE)
    }

    /// Resolve the output carried by a success payload.
    ///
    /// A write-back reference wins; otherwise exactly one of `output_url` and
    /// `output_base64` must be present.
    pub fn output_source(&self) -> Result<OutputSource<'_>, String> {
        if let Some(output_ref) = non_empty(&self.output_ref) {
            return Ok(OutputSource::WrittenBack(output_ref));
        }

        match (non_empty(&self.output_url), non_empty(&self.output_base64)) {
            (Some(url), None) => Ok(OutputSource::Remote(url)),
            (None, Some(encoded)) => Ok(OutputSource::Inline(encoded)),
            (Some(_), Some(_)) => {
                Err("callback carries both output_url and output_base64".to_string())
            }
            (None, None) => Err("callback missing output_base64 or output_url".to_string()),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
