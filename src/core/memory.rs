//! In-memory adapter for all three ports
//!
//! Thread-safe and non-persistent, for tests and demos. Failures can be
//! injected per port to exercise the error paths of a session.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::core::analysis::{AnalysisResult, DocumentSet};
use crate::core::identity::RecordId;
use crate::core::ports::{
    DocumentAnalyzer, FieldValues, PortError, ProfileRecord, ProfileStore, SubmissionAck,
    SubmissionGateway, SubmissionRequest, UpdatedRecord,
};
use crate::core::workflow::SessionPorts;

pub struct InMemoryStore {
    profiles: Arc<RwLock<HashMap<RecordId, ProfileRecord>>>,
    /// idempotency key -> acknowledgement
    submissions: Arc<RwLock<HashMap<String, SubmissionAck>>>,
    requests: Arc<RwLock<Vec<SubmissionRequest>>>,
    analysis: Arc<RwLock<AnalysisResult>>,
    fail_update: Mutex<Option<PortError>>,
    fail_submit: Mutex<Option<PortError>>,
    fail_analysis: Mutex<Option<PortError>>,
    update_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    analysis_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            profiles: Arc::new(RwLock::new(HashMap::new())),
            submissions: Arc::new(RwLock::new(HashMap::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
            analysis: Arc::new(RwLock::new(AnalysisResult::new())),
            fail_update: Mutex::new(None),
            fail_submit: Mutex::new(None),
            fail_analysis: Mutex::new(None),
            update_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            analysis_calls: AtomicUsize::new(0),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Use this store for every port of a session
    pub fn ports(self: &Arc<Self>) -> SessionPorts {
        SessionPorts {
            profiles: self.clone(),
            submissions: self.clone(),
            analyzer: self.clone(),
        }
    }

    pub async fn seed_profile(&self, record: ProfileRecord) {
        self.profiles.write().await.insert(record.id.clone(), record);
    }

    pub async fn profile(&self, id: &RecordId) -> Option<ProfileRecord> {
        self.profiles.read().await.get(id).cloned()
    }

    /// Result returned by every following analysis call
    pub async fn set_analysis_result(&self, result: AnalysisResult) {
        *self.analysis.write().await = result;
    }

    pub async fn fail_next_update(&self, error: PortError) {
        *self.fail_update.lock().await = Some(error);
    }

    pub async fn fail_next_submit(&self, error: PortError) {
        *self.fail_submit.lock().await = Some(error);
    }

    pub async fn fail_next_analysis(&self, error: PortError) {
        *self.fail_analysis.lock().await = Some(error);
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn analysis_calls(&self) -> usize {
        self.analysis_calls.load(Ordering::SeqCst)
    }

    /// Every submission request received, duplicates included
    pub async fn submission_requests(&self) -> Vec<SubmissionRequest> {
        self.requests.read().await.clone()
    }

    pub async fn clear(&self) {
        self.profiles.write().await.clear();
        self.submissions.write().await.clear();
        self.requests.write().await.clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn load_profile(&self, profile_id: &RecordId) -> Result<Option<ProfileRecord>, PortError> {
        Ok(self.profiles.read().await.get(profile_id).cloned())
    }

    async fn update_step_data(
        &self,
        profile_id: &RecordId,
        step: &str,
        values: &FieldValues,
    ) -> Result<UpdatedRecord, PortError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_update.lock().await.take() {
            return Err(error);
        }

        let mut profiles = self.profiles.write().await;
        let record = profiles
            .entry(profile_id.clone())
            .or_insert_with(|| ProfileRecord::new(profile_id.clone(), None));
        record.merge_step(step, values);

        Ok(UpdatedRecord {
            profile_id: profile_id.clone(),
            step: step.to_string(),
            revision: record.revision,
            updated: record.updated,
        })
    }
}

#[async_trait]
impl SubmissionGateway for InMemoryStore {
    async fn submit_for_validation(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionAck, PortError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.write().await.push(request.clone());
        if let Some(error) = self.fail_submit.lock().await.take() {
            return Err(error);
        }

        let mut submissions = self.submissions.write().await;
        if let Some(existing) = submissions.get(&request.idempotency_key) {
            return Ok(SubmissionAck {
                duplicate: true,
                ..existing.clone()
            });
        }

        let ack = SubmissionAck {
            submission_id: RecordId::submission().to_string(),
            received: Utc::now(),
            duplicate: false,
        };
        submissions.insert(request.idempotency_key.clone(), ack.clone());
        Ok(ack)
    }
}

#[async_trait]
impl DocumentAnalyzer for InMemoryStore {
    async fn analyze_documents(&self, _documents: &DocumentSet) -> Result<AnalysisResult, PortError> {
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_analysis.lock().await.take() {
            return Err(error);
        }
        Ok(self.analysis.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(key: &str) -> SubmissionRequest {
        SubmissionRequest {
            profile_id: RecordId::profile(),
            flow: "adult".into(),
            payload: json!({}),
            idempotency_key: key.into(),
        }
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let store = InMemoryStore::shared();
        store.fail_next_update(PortError::Timeout).await;
        let id = RecordId::profile();

        let err = store.update_step_data(&id, "a", &FieldValues::new()).await;
        assert!(matches!(err, Err(PortError::Timeout)));
        assert!(store.update_step_data(&id, "a", &FieldValues::new()).await.is_ok());
        assert_eq!(store.update_calls(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_submission_keeps_first_ack() {
        let store = InMemoryStore::shared();
        let first = store.submit_for_validation(&request("k1")).await.unwrap();
        let again = store.submit_for_validation(&request("k1")).await.unwrap();
        let other = store.submit_for_validation(&request("k2")).await.unwrap();

        assert!(again.duplicate);
        assert_eq!(first.submission_id, again.submission_id);
        assert_ne!(first.submission_id, other.submission_id);
        assert_eq!(store.submission_requests().await.len(), 3);
    }
}
