//! Remote compute backend contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::job::Job;
use crate::services::storage::WriteTarget;

pub mod mock;
pub mod runpod;

pub use mock::MockGateway;
pub use runpod::RunpodGateway;

/// Where and how the remote backend should report completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackTarget {
    pub url: String,
    pub secret: String,
}

/// One unit of work handed to the remote backend.
#[derive(Debug, Clone)]
pub struct SubmitRequest<'a> {
    pub job: &'a Job,
    /// Fetchable URL per input, keyed `{kind}_url`.
    pub assets: BTreeMap<String, String>,
    pub output_target: Option<WriteTarget>,
    pub callback: Option<CallbackTarget>,
}

/// Identifiers assigned by the backend on acceptance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub remote_handle: Option<String>,
    pub request_id: Option<String>,
}

/// Status document returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Local interpretation of the backend's status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Pending,
    Completed,
    Failed,
    Unknown,
}

impl RemoteStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn state(&self) -> RemoteState {
        match self.status.to_ascii_uppercase().as_str() {
            "IN_QUEUE" | "IN_PROGRESS" => RemoteState::Pending,
            "COMPLETED" => RemoteState::Completed,
            "FAILED" | "CANCELLED" | "TIMED_OUT" | "NOT_FOUND" => RemoteState::Failed,
            _ => RemoteState::Unknown,
        }
    }

    /// Error detail as text, whatever shape the backend sent.
    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Capability to run work on a remote backend.
#[async_trait]
pub trait ComputeGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn submit(&self, request: SubmitRequest<'_>) -> Result<SubmitReceipt, ComputeError>;

    async fn get_status(&self, remote_handle: &str) -> Result<RemoteStatus, ComputeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote backend rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("compute backend misconfigured: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}
