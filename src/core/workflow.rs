//! Wizard navigation state machine
//!
//! A [`WizardSession`] owns one form controller per visited step and moves a
//! cursor through the steps of a [`WizardDefinition`]:
//!
//! ```text
//! Step(k) --next/skip--> Step(k') | Review
//! Step(k) --previous---> Step(k'') (earlier, reachable)
//! Review  --goto(k)----> Step(k)
//! Review  --submit-----> Submitted (terminal)
//! ```
//!
//! Forward moves validate and persist the current step; backward moves never
//! validate and never discard edits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::analysis::{
    documents_in, route, AnalysisBridge, AnalysisError, AnalysisResult, DocumentSet, MergePlan,
    MergeReport,
};
use crate::core::flow::{StepDescriptor, WizardDefinition};
use crate::core::form::{DraftState, FormController};
use crate::core::identity::RecordId;
use crate::core::ports::{
    DocumentAnalyzer, FieldValues, PortError, ProfileStore, SubmissionAck, SubmissionGateway,
    SubmissionRequest,
};
use crate::core::review::{aggregate_payload, ReviewSummary};
use crate::schema::fields::FieldDispatch;
use crate::schema::validator::FieldError;

/// Where the wizard currently is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum Cursor {
    Step(String),
    Review,
    Submitted,
}

impl Cursor {
    pub fn step(&self) -> Option<&str> {
        match self {
            Cursor::Step(key) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Step(key) => write!(f, "step {}", key),
            Cursor::Review => write!(f, "review"),
            Cursor::Submitted => write!(f, "submitted"),
        }
    }
}

/// Result of a `goto` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GotoOutcome {
    Moved,
    /// Dependencies of the target are not complete; the cursor did not move
    Blocked { missing: Vec<String> },
}

/// Who the session runs for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub profile_id: RecordId,
    pub locale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl SessionContext {
    pub fn new(profile_id: RecordId) -> Self {
        Self {
            profile_id,
            locale: "fr".to_string(),
            actor: None,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// The systems a session talks to
#[derive(Clone)]
pub struct SessionPorts {
    pub profiles: Arc<dyn ProfileStore>,
    pub submissions: Arc<dyn SubmissionGateway>,
    pub analyzer: Arc<dyn DocumentAnalyzer>,
}

impl fmt::Debug for SessionPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPorts").finish_non_exhaustive()
    }
}

/// Errors returned by session operations
#[derive(Debug, Error)]
pub enum WizardError {
    #[error("step '{step}' has {} invalid field(s)", errors.len())]
    StepInvalid { step: String, errors: Vec<FieldError> },

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("could not save step '{step}': {source}")]
    Persistence {
        step: String,
        #[source]
        source: PortError,
    },

    #[error("submission failed: {0}")]
    Submission(#[source] PortError),

    #[error("could not load profile: {0}")]
    ProfileLoad(#[source] PortError),

    #[error("another operation is already running on this session")]
    Busy,

    #[error("the wizard is not on the review screen")]
    NotInReview,

    #[error("no step is active (the wizard is on the review screen)")]
    NoActiveStep,

    #[error("the profile has already been submitted")]
    AlreadySubmitted,

    #[error("unknown step '{0}'")]
    UnknownStep(String),

    #[error("step '{0}' is not optional and cannot be skipped")]
    NotOptional(String),

    #[error("required steps are not complete: {}", missing.join(", "))]
    Incomplete { missing: Vec<String> },

    #[error("session belongs to flow '{found}', expected '{expected}'")]
    FlowMismatch { expected: String, found: String },

    #[error("invalid value for {0}")]
    Field(FieldError),

    #[error("operation interrupted before completion")]
    Interrupted,
}

impl WizardError {
    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            WizardError::Persistence { source, .. }
            | WizardError::Submission(source)
            | WizardError::ProfileLoad(source) => source.is_retryable(),
            WizardError::Analysis(e) => e.is_retryable(),
            WizardError::Busy | WizardError::Interrupted => true,
            _ => false,
        }
    }
}

/// Serializable form of a session, used to resume between invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub flow: String,
    pub context: SessionContext,
    pub cursor: Cursor,
    #[serde(default)]
    pub completed: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub skipped: BTreeSet<String>,
    #[serde(default)]
    pub drafts: BTreeMap<String, DraftState>,
    /// Step data loaded from the profile when the session started
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prior: BTreeMap<String, FieldValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionAck>,
    pub saved: DateTime<Utc>,
}

pub struct WizardSession {
    definition: Arc<WizardDefinition>,
    context: SessionContext,
    ports: SessionPorts,
    dispatch: Arc<FieldDispatch>,
    cursor: Cursor,
    forms: HashMap<String, FormController>,
    completed: BTreeSet<String>,
    skipped: BTreeSet<String>,
    prior: BTreeMap<String, FieldValues>,
    submission: Option<SubmissionAck>,
}

impl WizardSession {
    /// Session on the first step with no prior data
    pub fn new(definition: Arc<WizardDefinition>, context: SessionContext, ports: SessionPorts) -> Self {
        let first = definition.first().key.clone();
        let mut session = Self {
            definition,
            context,
            ports,
            dispatch: Arc::new(FieldDispatch::new()),
            cursor: Cursor::Step(first.clone()),
            forms: HashMap::new(),
            completed: BTreeSet::new(),
            skipped: BTreeSet::new(),
            prior: BTreeMap::new(),
            submission: None,
        };
        // Schemas of a built definition always resolve
        let _ = session.ensure_form(&first);
        session
    }

    /// Load the persisted profile and open a session seeded from it
    pub async fn start(
        definition: Arc<WizardDefinition>,
        context: SessionContext,
        ports: SessionPorts,
    ) -> Result<Self, WizardError> {
        let record = ports
            .profiles
            .load_profile(&context.profile_id)
            .await
            .map_err(WizardError::ProfileLoad)?;

        let mut session = Self::new(definition, context, ports);
        if let Some(record) = record {
            debug!(profile = %record.id, steps = record.steps.len(), "seeding session from profile");
            session.prior = record.steps;
            session.forms.clear();
            let first = session.definition.first().key.clone();
            session.ensure_form(&first)?;
        }
        info!(
            flow = session.definition.name(),
            profile = %session.context.profile_id,
            "wizard session started"
        );
        Ok(session)
    }

    /// Rebuild a session from a snapshot. A cursor naming a step that is not
    /// in the definition falls back to the first step.
    pub fn restore(
        definition: Arc<WizardDefinition>,
        ports: SessionPorts,
        snapshot: SessionSnapshot,
    ) -> Result<Self, WizardError> {
        if snapshot.flow != definition.name() {
            return Err(WizardError::FlowMismatch {
                expected: definition.name().to_string(),
                found: snapshot.flow,
            });
        }

        let mut session = Self::new(definition, snapshot.context, ports);
        session.prior = snapshot.prior;
        session.submission = snapshot.submission;

        for (key, draft) in snapshot.drafts {
            if let Some(schema) = session.definition.schema_for(&key) {
                let form = FormController::from_draft(key.clone(), schema, draft);
                session.forms.insert(key, form);
            }
        }

        let definition = Arc::clone(&session.definition);
        session.completed = snapshot
            .completed
            .into_iter()
            .filter(|k| definition.contains(k))
            .collect();
        session.skipped = snapshot
            .skipped
            .into_iter()
            .filter(|k| session.completed.contains(k))
            .collect();

        session.cursor = match snapshot.cursor {
            Cursor::Step(key) if !definition.contains(&key) => {
                warn!(step = %key, "snapshot cursor names an unknown step, restarting");
                Cursor::Step(definition.first().key.clone())
            }
            cursor => cursor,
        };
        session.settle_cursor();
        if let Cursor::Step(key) = session.cursor.clone() {
            session.ensure_form(&key)?;
        }

        Ok(session)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            flow: self.definition.name().to_string(),
            context: self.context.clone(),
            cursor: self.cursor.clone(),
            completed: self.completed.clone(),
            skipped: self.skipped.clone(),
            drafts: self
                .forms
                .iter()
                .map(|(k, f)| (k.clone(), f.draft().clone()))
                .collect(),
            prior: self.prior.clone(),
            submission: self.submission.clone(),
            saved: Utc::now(),
        }
    }

    /// Replace the field dispatch table used by `set_raw` and the review
    pub fn with_dispatch(mut self, dispatch: Arc<FieldDispatch>) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn definition(&self) -> &Arc<WizardDefinition> {
        &self.definition
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn ports(&self) -> &SessionPorts {
        &self.ports
    }

    pub fn dispatch(&self) -> &FieldDispatch {
        &self.dispatch
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Descriptor of the active step, if any
    pub fn current_step(&self) -> Option<&StepDescriptor> {
        self.cursor.step().and_then(|k| self.definition.step(k))
    }

    pub fn form(&self, key: &str) -> Option<&FormController> {
        self.forms.get(key)
    }

    pub fn current_form(&self) -> Option<&FormController> {
        self.cursor.step().and_then(|k| self.forms.get(k))
    }

    pub fn is_complete(&self, key: &str) -> bool {
        self.completed.contains(key)
    }

    pub fn is_skipped(&self, key: &str) -> bool {
        self.skipped.contains(key)
    }

    pub fn completed(&self) -> &BTreeSet<String> {
        &self.completed
    }

    pub fn submission(&self) -> Option<&SubmissionAck> {
        self.submission.as_ref()
    }

    /// Non-optional steps that are not complete, in definition order
    pub fn missing_steps(&self) -> Vec<String> {
        self.definition
            .steps()
            .iter()
            .filter(|s| !s.is_optional && !self.completed.contains(&s.key))
            .map(|s| s.key.clone())
            .collect()
    }

    /// Every non-optional step is complete
    pub fn is_ready(&self) -> bool {
        self.missing_steps().is_empty()
    }

    /// Dependencies of a step that are not complete yet
    pub fn unmet_dependencies(&self, key: &str) -> Vec<String> {
        self.definition
            .step(key)
            .map(|s| {
                s.depends_on
                    .iter()
                    .filter(|d| !self.completed.contains(*d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_reachable(&self, step: &StepDescriptor) -> bool {
        step.depends_on.iter().all(|d| self.completed.contains(d))
    }

    /// Controller of a step, created on first visit from prior data
    fn ensure_form(&mut self, key: &str) -> Result<&mut FormController, WizardError> {
        if !self.forms.contains_key(key) {
            let schema = self
                .definition
                .schema_for(key)
                .ok_or_else(|| WizardError::UnknownStep(key.to_string()))?;
            let form = FormController::initialize(key, schema, self.prior.get(key));
            self.forms.insert(key.to_string(), form);
        }
        self.forms
            .get_mut(key)
            .ok_or_else(|| WizardError::UnknownStep(key.to_string()))
    }

    /// Key of the step an edit applies to
    fn active_step(&self) -> Result<String, WizardError> {
        match &self.cursor {
            Cursor::Step(key) => Ok(key.clone()),
            Cursor::Review => Err(WizardError::NoActiveStep),
            Cursor::Submitted => Err(WizardError::AlreadySubmitted),
        }
    }

    fn invalidate(&mut self, key: &str) {
        if self.completed.remove(key) {
            debug!(step = key, "step edited after completion");
        }
        self.skipped.remove(key);
    }

    /// Move the cursor to the first incomplete step when the step it is on
    /// lost a dependency, or when review is no longer ready
    fn settle_cursor(&mut self) {
        let stranded = match &self.cursor {
            Cursor::Step(key) => !self.unmet_dependencies(key).is_empty(),
            Cursor::Review => !self.is_ready(),
            Cursor::Submitted => false,
        };
        if !stranded {
            return;
        }
        if let Some(key) = self.missing_steps().into_iter().next() {
            debug!(from = %self.cursor, to = %key, "cursor moved to the first incomplete step");
            self.cursor = Cursor::Step(key.clone());
            // Missing steps always come from the definition
            let _ = self.ensure_form(&key);
        }
    }

    /// Set a field of the active step to a JSON value
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), WizardError> {
        let key = self.active_step()?;
        let form = self.ensure_form(&key)?;
        if !form.schema().has_field(name) {
            return Err(WizardError::Field(FieldError::new(name, "is not a field of this step")));
        }
        form.set_field(name, value);
        self.invalidate(&key);
        Ok(())
    }

    /// Set a field of the active step from user text
    pub fn set_raw(&mut self, name: &str, raw: &str) -> Result<(), WizardError> {
        let key = self.active_step()?;
        let dispatch = Arc::clone(&self.dispatch);
        let form = self.ensure_form(&key)?;
        form.set_raw(&dispatch, name, raw).map_err(WizardError::Field)?;
        self.invalidate(&key);
        Ok(())
    }

    /// Validate and persist the active step, then move forward
    pub async fn next(&mut self) -> Result<Cursor, WizardError> {
        let key = match &self.cursor {
            Cursor::Step(key) => key.clone(),
            Cursor::Review => return Ok(Cursor::Review),
            Cursor::Submitted => return Err(WizardError::AlreadySubmitted),
        };

        let profiles = Arc::clone(&self.ports.profiles);
        let profile_id = self.context.profile_id.clone();

        let form = self.ensure_form(&key)?;
        let errors = form.validate_all();
        if !errors.is_empty() {
            debug!(step = %key, errors = errors.len(), "step failed validation");
            return Err(WizardError::StepInvalid { step: key, errors });
        }
        let payload = form.persist_values();

        if !payload.is_empty() {
            debug!(step = %key, fields = payload.len(), "persisting step");
            if let Err(source) = profiles.update_step_data(&profile_id, &key, &payload).await {
                warn!(step = %key, error = %source, "step persistence failed");
                return Err(WizardError::Persistence { step: key, source });
            }
            let stored = self.prior.entry(key.clone()).or_default();
            for (name, value) in &payload {
                stored.insert(name.clone(), value.clone());
            }
        }

        if let Some(form) = self.forms.get_mut(&key) {
            form.mark_persisted();
        }
        self.completed.insert(key.clone());
        self.skipped.remove(&key);
        self.advance_from(&key);
        info!(from = %key, to = %self.cursor, "wizard advanced");
        Ok(self.cursor.clone())
    }

    /// Mark the active optional step complete without validating it
    pub fn skip(&mut self) -> Result<Cursor, WizardError> {
        let key = self.active_step()?;
        let optional = self.definition.step(&key).is_some_and(|s| s.is_optional);
        if !optional {
            return Err(WizardError::NotOptional(key));
        }

        self.completed.insert(key.clone());
        self.skipped.insert(key.clone());
        self.advance_from(&key);
        info!(skipped = %key, to = %self.cursor, "wizard advanced");
        Ok(self.cursor.clone())
    }

    fn advance_from(&mut self, key: &str) {
        let start = self.definition.index_of(key).map_or(0, |i| i + 1);
        let next = self.definition.steps()[start..]
            .iter()
            .find(|s| self.is_reachable(s))
            .map(|s| s.key.clone());

        self.cursor = match next {
            Some(key) => Cursor::Step(key),
            None => match self.missing_steps().first() {
                None => Cursor::Review,
                Some(missing) => Cursor::Step(missing.clone()),
            },
        };

        if let Cursor::Step(key) = self.cursor.clone() {
            // Cursor keys always come from the definition
            let _ = self.ensure_form(&key);
        }
    }

    /// Move back to the closest earlier reachable step
    pub fn previous(&mut self) -> Result<Cursor, WizardError> {
        let end = match &self.cursor {
            Cursor::Step(key) => self.definition.index_of(key).unwrap_or(0),
            Cursor::Review => self.definition.len(),
            Cursor::Submitted => return Err(WizardError::AlreadySubmitted),
        };

        let target = self.definition.steps()[..end]
            .iter()
            .rev()
            .find(|s| self.is_reachable(s))
            .map(|s| s.key.clone());

        if let Some(key) = target {
            self.ensure_form(&key)?;
            debug!(to = %key, "wizard moved back");
            self.cursor = Cursor::Step(key);
        }
        Ok(self.cursor.clone())
    }

    /// Jump to a step whose dependencies are complete
    pub fn goto(&mut self, key: &str) -> Result<GotoOutcome, WizardError> {
        if self.cursor == Cursor::Submitted {
            return Err(WizardError::AlreadySubmitted);
        }
        if !self.definition.contains(key) {
            return Err(WizardError::UnknownStep(key.to_string()));
        }

        let missing = self.unmet_dependencies(key);
        if !missing.is_empty() {
            debug!(step = key, ?missing, "goto blocked by dependencies");
            return Ok(GotoOutcome::Blocked { missing });
        }

        self.ensure_form(key)?;
        self.cursor = Cursor::Step(key.to_string());
        Ok(GotoOutcome::Moved)
    }

    /// Documents referenced by the document fields of every draft
    pub fn collected_documents(&self) -> DocumentSet {
        let mut documents = DocumentSet::new();
        for step in self.definition.steps() {
            let (Some(schema), Some(form)) = (self.definition.schema_for(&step.key), self.forms.get(&step.key))
            else {
                continue;
            };
            documents.extend(documents_in(&schema, form.values()));
        }
        documents
    }

    /// Run document analysis and merge the result into the drafts.
    /// Without an explicit document set, the documents referenced by the
    /// drafts are analyzed.
    pub async fn analyze(&mut self, documents: Option<DocumentSet>) -> Result<MergeReport, WizardError> {
        if self.cursor == Cursor::Submitted {
            return Err(WizardError::AlreadySubmitted);
        }

        let documents = documents.unwrap_or_else(|| self.collected_documents());
        let bridge = AnalysisBridge::new(Arc::clone(&self.ports.analyzer));
        let result = bridge.analyze(&documents).await?;
        self.apply_analysis(&result)
    }

    /// Merge an analysis result: fill empty fields, never overwrite fields
    /// the user edited. The merge is planned against every draft before any
    /// value is written.
    pub fn apply_analysis(&mut self, result: &AnalysisResult) -> Result<MergeReport, WizardError> {
        if self.cursor == Cursor::Submitted {
            return Err(WizardError::AlreadySubmitted);
        }

        let (routed, unrouted) = route(&self.definition, result);
        for entry in &routed {
            self.ensure_form(&entry.step)?;
        }

        let plan = MergePlan::compute(routed, unrouted, &self.forms);
        debug!(
            applied = plan.report().applied.len(),
            skipped_dirty = plan.report().skipped_dirty.len(),
            "merging analysis result"
        );
        let report = plan.apply(&mut self.forms);

        for step in report.touched_steps() {
            // A completed step keeps its mark while the merged values still validate
            let still_valid = !self.skipped.contains(&step)
                && self
                    .forms
                    .get_mut(&step)
                    .is_some_and(|form| form.validate_all().is_empty());
            if still_valid && self.completed.contains(&step) {
                continue;
            }
            self.invalidate(&step);
        }
        self.settle_cursor();
        Ok(report)
    }

    /// Summary of every step for the review screen
    pub fn review(&self) -> ReviewSummary {
        ReviewSummary::build(self)
    }

    /// Payload sent on submission: step key -> field values
    pub fn payload(&self) -> Value {
        aggregate_payload(&self.definition, &self.forms, &self.completed, &self.skipped)
    }

    /// Hand the reviewed profile over for validation
    pub async fn submit(&mut self) -> Result<SubmissionAck, WizardError> {
        match self.cursor {
            Cursor::Review => {}
            Cursor::Submitted => return Err(WizardError::AlreadySubmitted),
            Cursor::Step(_) => return Err(WizardError::NotInReview),
        }

        let missing = self.missing_steps();
        if !missing.is_empty() {
            return Err(WizardError::Incomplete { missing });
        }

        let payload = self.payload();
        let request = SubmissionRequest {
            profile_id: self.context.profile_id.clone(),
            flow: self.definition.name().to_string(),
            idempotency_key: idempotency_key(&self.context.profile_id, &payload),
            payload,
        };

        let gateway = Arc::clone(&self.ports.submissions);
        let ack = gateway.submit_for_validation(&request).await.map_err(|source| {
            warn!(profile = %request.profile_id, error = %source, "submission failed");
            WizardError::Submission(source)
        })?;

        info!(
            profile = %request.profile_id,
            submission = %ack.submission_id,
            duplicate = ack.duplicate,
            "profile submitted"
        );
        self.cursor = Cursor::Submitted;
        self.forms.clear();
        self.completed.clear();
        self.skipped.clear();
        self.prior.clear();
        self.submission = Some(ack.clone());
        Ok(ack)
    }

    /// Discard every draft and return to the first step
    pub fn cancel(&mut self) -> Result<(), WizardError> {
        if self.cursor == Cursor::Submitted {
            return Err(WizardError::AlreadySubmitted);
        }
        self.forms.clear();
        self.completed.clear();
        self.skipped.clear();
        let first = self.definition.first().key.clone();
        self.cursor = Cursor::Step(first.clone());
        self.ensure_form(&first)?;
        info!(profile = %self.context.profile_id, "wizard session cancelled");
        Ok(())
    }
}

impl fmt::Debug for WizardSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WizardSession")
            .field("flow", &self.definition.name())
            .field("profile", &self.context.profile_id)
            .field("cursor", &self.cursor)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

/// Deterministic key for a submission: the same profile and payload always
/// produce the same key, whatever the key order of the payload objects.
pub fn idempotency_key(profile_id: &RecordId, payload: &Value) -> String {
    let canonical = canonicalize(payload);
    let mut hasher = Sha256::new();
    hasher.update(profile_id.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Copy of a JSON value with object keys sorted at every level
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flow::{FlowKind, StepRegistry};
    use crate::core::memory::InMemoryStore;
    use serde_json::json;

    fn session(flow: FlowKind) -> (WizardSession, Arc<InMemoryStore>) {
        let definition = StepRegistry::new().unwrap().definition(flow).unwrap();
        let store = Arc::new(InMemoryStore::new());
        let ports = store.ports();
        let session = WizardSession::new(
            Arc::new(definition),
            SessionContext::new(RecordId::profile()),
            ports,
        );
        (session, store)
    }

    #[test]
    fn test_new_session_starts_on_first_step() {
        let (session, _) = session(FlowKind::ServiceRequest);
        assert_eq!(session.cursor(), &Cursor::Step("basicInfo".into()));
        assert!(!session.is_ready());
    }

    #[test]
    fn test_previous_at_first_step_is_noop() {
        let (mut session, _) = session(FlowKind::Adult);
        assert_eq!(session.previous().unwrap(), Cursor::Step("documents".into()));
    }

    #[test]
    fn test_skip_requires_optional_step() {
        let (mut session, _) = session(FlowKind::Adult);
        assert!(matches!(session.skip(), Err(WizardError::NotOptional(k)) if k == "documents"));
    }

    #[test]
    fn test_goto_unknown_step() {
        let (mut session, _) = session(FlowKind::Adult);
        assert!(matches!(session.goto("payment"), Err(WizardError::UnknownStep(_))));
    }

    #[test]
    fn test_set_field_rejects_unknown_field() {
        let (mut session, _) = session(FlowKind::Adult);
        let err = session.set_field("firstName", json!("Jean")).unwrap_err();
        assert!(matches!(err, WizardError::Field(e) if e.field == "firstName"));
    }

    #[tokio::test]
    async fn test_submit_outside_review() {
        let (mut session, _) = session(FlowKind::Adult);
        let err = session.submit().await.unwrap_err();
        assert!(matches!(err, WizardError::NotInReview));
    }

    #[test]
    fn test_idempotency_key_ignores_key_order() {
        let id = RecordId::profile();
        let a = json!({"basicInfo": {"firstName": "Jean", "lastName": "Dupont"}});
        let b = json!({"basicInfo": {"lastName": "Dupont", "firstName": "Jean"}});
        assert_eq!(idempotency_key(&id, &a), idempotency_key(&id, &b));
        assert_eq!(idempotency_key(&id, &a).len(), 64);

        let c = json!({"basicInfo": {"firstName": "Jeanne", "lastName": "Dupont"}});
        assert_ne!(idempotency_key(&id, &a), idempotency_key(&id, &c));
        assert_ne!(idempotency_key(&id, &a), idempotency_key(&RecordId::profile(), &a));
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let (mut session, store) = session(FlowKind::Adult);
        session.set_field("passport", json!("p.pdf")).unwrap();

        let snapshot = session.snapshot();
        let yaml = serde_yml::to_string(&snapshot).unwrap();
        let snapshot: SessionSnapshot = serde_yml::from_str(&yaml).unwrap();

        let restored =
            WizardSession::restore(Arc::clone(session.definition()), store.ports(), snapshot).unwrap();
        assert_eq!(restored.cursor(), session.cursor());
        let form = restored.form("documents").unwrap();
        assert_eq!(form.value("passport"), Some(&json!("p.pdf")));
        assert!(form.is_dirty("passport"));
    }

    #[test]
    fn test_restore_unknown_cursor_resets() {
        let (session, store) = session(FlowKind::Adult);
        let mut snapshot = session.snapshot();
        snapshot.cursor = Cursor::Step("removedStep".into());
        snapshot.completed.insert("removedStep".into());

        let restored =
            WizardSession::restore(Arc::clone(session.definition()), store.ports(), snapshot).unwrap();
        assert_eq!(restored.cursor(), &Cursor::Step("documents".into()));
        assert!(restored.completed().is_empty());
    }

    #[test]
    fn test_restore_stale_cursor_lands_on_first_missing_step() {
        let (session, store) = session(FlowKind::ServiceRequest);
        let mut snapshot = session.snapshot();
        snapshot.cursor = Cursor::Review;
        snapshot.completed.insert("basicInfo".into());

        let restored =
            WizardSession::restore(Arc::clone(session.definition()), store.ports(), snapshot).unwrap();
        assert_eq!(restored.cursor(), &Cursor::Step("serviceSelection".into()));
        assert!(restored.form("serviceSelection").is_some());

        let mut snapshot = session.snapshot();
        snapshot.cursor = Cursor::Step("serviceDetails".into());
        let restored =
            WizardSession::restore(Arc::clone(session.definition()), store.ports(), snapshot).unwrap();
        assert_eq!(restored.cursor(), &Cursor::Step("basicInfo".into()));
    }

    #[test]
    fn test_first_missing_step_is_always_reachable() {
        for flow in FlowKind::all() {
            let (session, store) = session(*flow);
            let required: Vec<String> = session
                .definition()
                .steps()
                .iter()
                .filter(|s| !s.is_optional)
                .map(|s| s.key.clone())
                .collect();

            for done in 0..required.len() {
                let mut snapshot = session.snapshot();
                snapshot.completed = required[..done].iter().cloned().collect();
                let restored =
                    WizardSession::restore(Arc::clone(session.definition()), store.ports(), snapshot)
                        .unwrap();
                let first = restored.missing_steps()[0].clone();
                assert!(restored.unmet_dependencies(&first).is_empty(), "{flow:?}: {first}");
            }
        }
    }

    #[test]
    fn test_restore_rejects_other_flow() {
        let (session, store) = session(FlowKind::Adult);
        let mut snapshot = session.snapshot();
        snapshot.flow = "child".into();
        let err = WizardSession::restore(Arc::clone(session.definition()), store.ports(), snapshot)
            .unwrap_err();
        assert!(matches!(err, WizardError::FlowMismatch { .. }));
    }
}
