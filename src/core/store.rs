//! File-backed adapter: profiles, session snapshots and submissions stored
//! as YAML records under `.intake/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::core::flow::FlowKind;
use crate::core::identity::RecordId;
use crate::core::loader::{find_record_file, load_all, read_yaml, write_yaml};
use crate::core::ports::{
    FieldValues, PortError, ProfileRecord, ProfileStore, SubmissionAck, SubmissionGateway,
    SubmissionRequest, UpdatedRecord,
};
use crate::core::project::Project;
use crate::core::workflow::SessionSnapshot;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse {path:?}: {message}")]
    Yaml { path: PathBuf, message: String },

    #[error("profile {0} not found")]
    ProfileNotFound(String),

    #[error("storage task failed: {0}")]
    Task(String),
}

impl From<StoreError> for PortError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io(e) => PortError::Io(e),
            StoreError::Yaml { .. } => PortError::Serialization(err.to_string()),
            StoreError::ProfileNotFound(id) => PortError::NotFound(id),
            StoreError::Task(message) => PortError::Unavailable(message),
        }
    }
}

/// A submission as recorded by the file gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSubmission {
    pub id: RecordId,
    pub profile_id: RecordId,
    pub flow: String,
    pub idempotency_key: String,
    pub received: DateTime<Utc>,
    pub payload: Value,
}

impl StoredSubmission {
    fn ack(&self, duplicate: bool) -> SubmissionAck {
        SubmissionAck {
            submission_id: self.id.to_string(),
            received: self.received,
            duplicate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    profiles: PathBuf,
    sessions: PathBuf,
    submissions: PathBuf,
    // Serializes read-modify-write cycles on records
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new(project: &Project) -> Self {
        Self {
            profiles: project.profiles_dir(),
            sessions: project.sessions_dir(),
            submissions: project.submissions_dir(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn profile_path(&self, id: &RecordId) -> PathBuf {
        self.profiles.join(format!("{}.yaml", id))
    }

    fn session_path(&self, id: &RecordId) -> PathBuf {
        self.sessions.join(format!("{}.session.yaml", id))
    }

    fn locked<T>(&self, f: impl FnOnce() -> Result<T, StoreError>) -> Result<T, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }

    /// Create and store an empty profile
    pub fn create_profile(&self, flow: Option<FlowKind>) -> Result<ProfileRecord, StoreError> {
        let record = ProfileRecord::new(RecordId::profile(), flow);
        write_yaml(&self.profile_path(&record.id), &record)?;
        tracing::info!(profile = %record.id, "profile created");
        Ok(record)
    }

    pub fn read_profile(&self, id: &RecordId) -> Result<Option<ProfileRecord>, StoreError> {
        let path = self.profile_path(id);
        if !path.exists() {
            return Ok(None);
        }
        read_yaml(&path).map(Some)
    }

    /// Resolve a full or partial profile id to a stored profile
    pub fn find_profile(&self, partial: &str) -> Result<ProfileRecord, StoreError> {
        let path = find_record_file(&self.profiles, partial)
            .ok_or_else(|| StoreError::ProfileNotFound(partial.to_string()))?;
        read_yaml(&path)
    }

    pub fn list_profiles(&self) -> Result<Vec<ProfileRecord>, StoreError> {
        let mut profiles: Vec<ProfileRecord> = load_all(&self.profiles)?;
        profiles.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(profiles)
    }

    /// Merge step values into a profile, creating the record on first write
    pub fn write_step(
        &self,
        id: &RecordId,
        step: &str,
        values: &FieldValues,
    ) -> Result<UpdatedRecord, StoreError> {
        self.locked(|| {
            let mut record = self
                .read_profile(id)?
                .unwrap_or_else(|| ProfileRecord::new(id.clone(), None));
            record.merge_step(step, values);
            write_yaml(&self.profile_path(id), &record)?;

            Ok(UpdatedRecord {
                profile_id: id.clone(),
                step: step.to_string(),
                revision: record.revision,
                updated: record.updated,
            })
        })
    }

    pub fn save_session(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        write_yaml(&self.session_path(&snapshot.context.profile_id), snapshot)
    }

    pub fn load_session(&self, id: &RecordId) -> Result<Option<SessionSnapshot>, StoreError> {
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(None);
        }
        read_yaml(&path).map(Some)
    }

    pub fn clear_session(&self, id: &RecordId) -> Result<bool, StoreError> {
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        Ok(true)
    }

    /// Stored sessions, most recently saved last
    pub fn list_sessions(&self) -> Result<Vec<SessionSnapshot>, StoreError> {
        let mut sessions = Vec::new();
        for path in Project::iter_files(&self.sessions, ".session.yaml") {
            match read_yaml::<SessionSnapshot>(&path) {
                Ok(snapshot) => sessions.push(snapshot),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping session"),
            }
        }
        sessions.sort_by(|a, b| a.saved.cmp(&b.saved));
        Ok(sessions)
    }

    pub fn latest_session(&self) -> Result<Option<SessionSnapshot>, StoreError> {
        Ok(self.list_sessions()?.pop())
    }

    pub fn list_submissions(&self) -> Result<Vec<StoredSubmission>, StoreError> {
        let mut submissions: Vec<StoredSubmission> = load_all(&self.submissions)?;
        submissions.sort_by(|a, b| a.received.cmp(&b.received));
        Ok(submissions)
    }

    /// Record a submission once per idempotency key
    pub fn record_submission(&self, request: &SubmissionRequest) -> Result<SubmissionAck, StoreError> {
        self.locked(|| {
            if let Some(existing) = self
                .list_submissions()?
                .into_iter()
                .find(|s| s.idempotency_key == request.idempotency_key)
            {
                tracing::info!(submission = %existing.id, "duplicate submission");
                return Ok(existing.ack(true));
            }

            let stored = StoredSubmission {
                id: RecordId::submission(),
                profile_id: request.profile_id.clone(),
                flow: request.flow.clone(),
                idempotency_key: request.idempotency_key.clone(),
                received: Utc::now(),
                payload: request.payload.clone(),
            };
            write_yaml(&self.submission_path(&stored.id), &stored)?;

            let mut profile = self
                .read_profile(&request.profile_id)?
                .unwrap_or_else(|| ProfileRecord::new(request.profile_id.clone(), None));
            profile.submission = Some(stored.id.to_string());
            profile.updated = stored.received;
            write_yaml(&self.profile_path(&request.profile_id), &profile)?;

            Ok(stored.ack(false))
        })
    }

    fn submission_path(&self, id: &RecordId) -> PathBuf {
        self.submissions.join(format!("{}.yaml", id))
    }
}

async fn blocking<T, F>(f: F) -> Result<T, PortError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
        .map_err(PortError::from)
}

#[async_trait]
impl ProfileStore for FileStore {
    async fn load_profile(&self, profile_id: &RecordId) -> Result<Option<ProfileRecord>, PortError> {
        let store = self.clone();
        let id = profile_id.clone();
        blocking(move || store.read_profile(&id)).await
    }

    async fn update_step_data(
        &self,
        profile_id: &RecordId,
        step: &str,
        values: &FieldValues,
    ) -> Result<UpdatedRecord, PortError> {
        let store = self.clone();
        let id = profile_id.clone();
        let step = step.to_string();
        let values = values.clone();
        blocking(move || store.write_step(&id, &step, &values)).await
    }
}

#[async_trait]
impl SubmissionGateway for FileStore {
    async fn submit_for_validation(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionAck, PortError> {
        let store = self.clone();
        let request = request.clone();
        blocking(move || store.record_submission(&request)).await
    }
}
