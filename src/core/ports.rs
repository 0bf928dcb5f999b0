//! Async ports to the systems the wizard talks to: the profile store, the
//! submission back office, and the document extraction service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::analysis::{AnalysisResult, DocumentSet};
use crate::core::flow::FlowKind;
use crate::core::identity::RecordId;

/// Field name -> value map of one step
pub type FieldValues = Map<String, Value>;

/// Failure of a remote (or local) port call
#[derive(Debug, Error)]
pub enum PortError {
    #[error("network error: {0}")]
    Network(String),

    #[error("the request timed out")]
    Timeout,

    #[error("rejected by the server ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("malformed data: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PortError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            PortError::Network(_) | PortError::Timeout | PortError::Unavailable(_) => true,
            PortError::Rejected { status, .. } => *status >= 500 || *status == 429,
            PortError::NotFound(_) | PortError::Serialization(_) | PortError::Io(_) => false,
        }
    }
}

/// Persisted profile record, updated one step at a time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowKind>,
    #[serde(default)]
    pub steps: BTreeMap<String, FieldValues>,
    #[serde(default)]
    pub revision: u32,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission: Option<String>,
}

impl ProfileRecord {
    pub fn new(id: RecordId, flow: Option<FlowKind>) -> Self {
        let now = Utc::now();
        Self {
            id,
            flow,
            steps: BTreeMap::new(),
            revision: 0,
            created: now,
            updated: now,
            submission: None,
        }
    }

    /// Merge values into a step; untouched fields keep their stored value
    pub fn merge_step(&mut self, step: &str, values: &FieldValues) {
        let stored = self.steps.entry(step.to_string()).or_default();
        for (name, value) in values {
            stored.insert(name.clone(), value.clone());
        }
        self.revision += 1;
        self.updated = Utc::now();
    }

    pub fn step(&self, step: &str) -> Option<&FieldValues> {
        self.steps.get(step)
    }
}

/// Result of a per-step update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedRecord {
    pub profile_id: RecordId,
    pub step: String,
    pub revision: u32,
    pub updated: DateTime<Utc>,
}

/// Terminal submission of a completed wizard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub profile_id: RecordId,
    /// Definition name (flow type for built-in flows)
    pub flow: String,
    /// Step key -> field values
    pub payload: Value,
    /// Stable across retries of the same payload
    pub idempotency_key: String,
}

/// Acknowledgement of a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionAck {
    pub submission_id: String,
    pub received: DateTime<Utc>,
    /// True when the back office had already recorded this idempotency key
    #[serde(default)]
    pub duplicate: bool,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Load the persisted profile, `None` when it does not exist yet
    async fn load_profile(&self, profile_id: &RecordId) -> Result<Option<ProfileRecord>, PortError>;

    /// Merge one step's values into the persisted profile
    async fn update_step_data(
        &self,
        profile_id: &RecordId,
        step: &str,
        values: &FieldValues,
    ) -> Result<UpdatedRecord, PortError>;
}

#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    /// Hand the completed profile over for consular validation
    async fn submit_for_validation(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionAck, PortError>;
}

#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Extract field values from uploaded documents
    async fn analyze_documents(&self, documents: &DocumentSet) -> Result<AnalysisResult, PortError>;
}
