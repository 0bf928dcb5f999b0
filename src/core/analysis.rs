//! Document analysis bridge: sends uploaded documents to the extraction
//! service and merges the extracted fields into the step drafts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::core::flow::WizardDefinition;
use crate::core::form::{FillOutcome, FormController};
use crate::core::ports::{DocumentAnalyzer, FieldValues, PortError};
use crate::schema::fields::is_blank;
use crate::schema::validator::StepSchema;

/// Document categories understood by the extraction service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentTag {
    Passport,
    BirthCertificate,
    IdentityPhoto,
    ProofOfAddress,
    ResidencePermit,
    NationalIdCard,
    MarriageCertificate,
    Other,
}

impl DocumentTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentTag::Passport => "PASSPORT",
            DocumentTag::BirthCertificate => "BIRTH_CERTIFICATE",
            DocumentTag::IdentityPhoto => "IDENTITY_PHOTO",
            DocumentTag::ProofOfAddress => "PROOF_OF_ADDRESS",
            DocumentTag::ResidencePermit => "RESIDENCE_PERMIT",
            DocumentTag::NationalIdCard => "NATIONAL_ID_CARD",
            DocumentTag::MarriageCertificate => "MARRIAGE_CERTIFICATE",
            DocumentTag::Other => "OTHER",
        }
    }

    pub fn all() -> &'static [DocumentTag] {
        &[
            DocumentTag::Passport,
            DocumentTag::BirthCertificate,
            DocumentTag::IdentityPhoto,
            DocumentTag::ProofOfAddress,
            DocumentTag::ResidencePermit,
            DocumentTag::NationalIdCard,
            DocumentTag::MarriageCertificate,
            DocumentTag::Other,
        ]
    }
}

impl fmt::Display for DocumentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DocumentTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        DocumentTag::all()
            .iter()
            .find(|tag| tag.as_str() == normalized)
            .copied()
            .ok_or_else(|| format!("unknown document type '{}'", s))
    }
}

/// Uploaded documents keyed by type: tag -> file reference (URL or path)
pub type DocumentSet = BTreeMap<DocumentTag, String>;

/// Field values extracted by one analysis call.
///
/// Keys are either plain field names (`firstName`) or step-qualified
/// (`basicInfo.firstName`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult {
    pub fields: BTreeMap<String, Value>,
}

impl AnalysisResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No documents provided for analysis")]
    NoDocumentsProvided,

    #[error("document extraction failed: {source}")]
    Extraction {
        retryable: bool,
        #[source]
        source: PortError,
    },
}

impl AnalysisError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::NoDocumentsProvided => false,
            AnalysisError::Extraction { retryable, .. } => *retryable,
        }
    }
}

/// Front of the extraction port
#[derive(Clone)]
pub struct AnalysisBridge {
    analyzer: Arc<dyn DocumentAnalyzer>,
}

impl AnalysisBridge {
    pub fn new(analyzer: Arc<dyn DocumentAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Analyze uploaded documents. An empty set fails without calling the
    /// service.
    pub async fn analyze(&self, documents: &DocumentSet) -> Result<AnalysisResult, AnalysisError> {
        if documents.is_empty() {
            return Err(AnalysisError::NoDocumentsProvided);
        }

        tracing::debug!(documents = documents.len(), "requesting document analysis");
        self.analyzer
            .analyze_documents(documents)
            .await
            .map_err(|source| {
                tracing::warn!(error = %source, "document analysis failed");
                AnalysisError::Extraction {
                    retryable: source.is_retryable(),
                    source,
                }
            })
    }
}

impl fmt::Debug for AnalysisBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisBridge").finish_non_exhaustive()
    }
}

/// Analyzer used when no extraction service is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredAnalyzer;

#[async_trait::async_trait]
impl DocumentAnalyzer for UnconfiguredAnalyzer {
    async fn analyze_documents(&self, _documents: &DocumentSet) -> Result<AnalysisResult, PortError> {
        Err(PortError::Unavailable(
            "no document extraction service is configured (set api_url)".to_string(),
        ))
    }
}

/// Collect the documents referenced by `document` fields of a step
pub fn documents_in(schema: &StepSchema, values: &FieldValues) -> DocumentSet {
    let mut documents = DocumentSet::new();
    for field in schema.fields() {
        let Some(tag) = field.document.as_deref().and_then(|d| d.parse::<DocumentTag>().ok()) else {
            continue;
        };
        if let Some(reference) = values.get(&field.name).and_then(|v| v.as_str()) {
            if !reference.trim().is_empty() {
                documents.insert(tag, reference.to_string());
            }
        }
    }
    documents
}

/// A field value routed to one step
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedValue {
    pub step: String,
    pub field: String,
    pub value: Value,
}

/// Outcome of merging one analysis result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// `step.field` entries that received a value
    pub applied: Vec<String>,
    /// Entries left alone because the user edited them
    pub skipped_dirty: Vec<String>,
    /// Entries left alone because they already hold a value
    pub skipped_filled: Vec<String>,
    /// Result keys that match no step field
    pub unrouted: Vec<String>,
}

impl MergeReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }

    /// Steps that received at least one value
    pub fn touched_steps(&self) -> Vec<String> {
        let mut steps: Vec<String> = Vec::new();
        for entry in &self.applied {
            if let Some((step, _)) = entry.split_once('.') {
                if !steps.iter().any(|s| s == step) {
                    steps.push(step.to_string());
                }
            }
        }
        steps
    }
}

/// Route result keys to step fields. Plain keys go to every step whose
/// schema declares the field; blank values are dropped.
pub fn route(definition: &WizardDefinition, result: &AnalysisResult) -> (Vec<RoutedValue>, Vec<String>) {
    let mut routed = Vec::new();
    let mut unrouted = Vec::new();

    for (key, value) in &result.fields {
        if is_blank(value) {
            continue;
        }

        let targets: Vec<(String, String)> = match key.split_once('.') {
            Some((step, field)) => definition
                .schema_for(step)
                .filter(|schema| schema.has_field(field))
                .map(|_| vec![(step.to_string(), field.to_string())])
                .unwrap_or_default(),
            None => definition
                .steps_with_field(key)
                .into_iter()
                .map(|s| (s.key.clone(), key.clone()))
                .collect(),
        };

        if targets.is_empty() {
            unrouted.push(key.clone());
        }
        for (step, field) in targets {
            routed.push(RoutedValue {
                step,
                field,
                value: value.clone(),
            });
        }
    }

    (routed, unrouted)
}

/// A merge computed against the current drafts, applied in one go
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    fills: Vec<RoutedValue>,
    report: MergeReport,
}

impl MergePlan {
    /// Decide every fill before touching any draft. Steps missing from
    /// `forms` are skipped.
    pub fn compute(
        routed: Vec<RoutedValue>,
        unrouted: Vec<String>,
        forms: &HashMap<String, FormController>,
    ) -> Self {
        let mut plan = MergePlan::default();
        plan.report.unrouted = unrouted;
        let mut claimed: HashSet<(String, String)> = HashSet::new();

        for entry in routed {
            let Some(form) = forms.get(&entry.step) else {
                continue;
            };
            let label = format!("{}.{}", entry.step, entry.field);
            let target = (entry.step.clone(), entry.field.clone());

            // A qualified and a plain key may target the same field
            let outcome = if claimed.contains(&target) {
                FillOutcome::SkippedFilled
            } else {
                form.fill_outcome(&entry.field)
            };

            match outcome {
                FillOutcome::Applied => {
                    claimed.insert(target);
                    plan.report.applied.push(label);
                    plan.fills.push(entry);
                }
                FillOutcome::SkippedDirty => plan.report.skipped_dirty.push(label),
                FillOutcome::SkippedFilled => plan.report.skipped_filled.push(label),
            }
        }

        plan
    }

    pub fn report(&self) -> &MergeReport {
        &self.report
    }

    pub fn apply(self, forms: &mut HashMap<String, FormController>) -> MergeReport {
        for fill in self.fills {
            if let Some(form) = forms.get_mut(&fill.step) {
                form.fill_empty(&fill.field, fill.value);
            }
        }
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flow::{FlowKind, StepRegistry};
    use serde_json::json;

    struct FixedAnalyzer(AnalysisResult);

    #[async_trait::async_trait]
    impl DocumentAnalyzer for FixedAnalyzer {
        async fn analyze_documents(&self, _documents: &DocumentSet) -> Result<AnalysisResult, PortError> {
            Ok(self.0.clone())
        }
    }

    fn adult_forms() -> (WizardDefinition, HashMap<String, FormController>) {
        let definition = StepRegistry::new().unwrap().definition(FlowKind::Adult).unwrap();
        let forms = definition
            .steps()
            .iter()
            .map(|s| {
                let schema = definition.schema_for(&s.key).unwrap();
                (s.key.clone(), FormController::initialize(s.key.clone(), schema, None))
            })
            .collect();
        (definition, forms)
    }

    #[test]
    fn test_document_tag_parsing() {
        assert_eq!("passport".parse::<DocumentTag>().unwrap(), DocumentTag::Passport);
        assert_eq!(
            "birth-certificate".parse::<DocumentTag>().unwrap(),
            DocumentTag::BirthCertificate
        );
        assert!("selfie".parse::<DocumentTag>().is_err());
        assert_eq!(
            serde_json::to_string(&DocumentTag::NationalIdCard).unwrap(),
            "\"NATIONAL_ID_CARD\""
        );
    }

    #[tokio::test]
    async fn test_empty_document_set_is_rejected() {
        let bridge = AnalysisBridge::new(Arc::new(FixedAnalyzer(AnalysisResult::new())));
        let err = bridge.analyze(&DocumentSet::new()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::NoDocumentsProvided));
        assert_eq!(err.to_string(), "No documents provided for analysis");
    }

    #[tokio::test]
    async fn test_unconfigured_analyzer_is_retryable() {
        let bridge = AnalysisBridge::new(Arc::new(UnconfiguredAnalyzer));
        let mut documents = DocumentSet::new();
        documents.insert(DocumentTag::Passport, "file:///p.pdf".into());
        let err = bridge.analyze(&documents).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_route_plain_and_qualified_keys() {
        let (definition, _) = adult_forms();
        let result = AnalysisResult::new()
            .with("firstName", json!("Jean"))
            .with("contactInfo.city", json!("Lyon"))
            .with("shoeSize", json!(42))
            .with("familyInfo.firstName", json!("x"))
            .with("lastName", json!(""));

        let (routed, unrouted) = route(&definition, &result);
        let targets: Vec<(&str, &str)> = routed
            .iter()
            .map(|r| (r.step.as_str(), r.field.as_str()))
            .collect();
        assert_eq!(targets, [("contactInfo", "city"), ("basicInfo", "firstName")]);
        assert_eq!(unrouted, ["familyInfo.firstName", "shoeSize"]);
    }

    #[test]
    fn test_merge_plan_respects_dirty_fields() {
        let (definition, mut forms) = adult_forms();
        forms
            .get_mut("basicInfo")
            .unwrap()
            .set_field("lastName", json!("Martin"));

        let result = AnalysisResult::new()
            .with("firstName", json!("Jean"))
            .with("lastName", json!("Dupont"));
        let (routed, unrouted) = route(&definition, &result);
        let report = MergePlan::compute(routed, unrouted, &forms).apply(&mut forms);

        assert_eq!(report.applied, ["basicInfo.firstName"]);
        assert_eq!(report.skipped_dirty, ["basicInfo.lastName"]);
        let basic = &forms["basicInfo"];
        assert_eq!(basic.value("firstName"), Some(&json!("Jean")));
        assert_eq!(basic.value("lastName"), Some(&json!("Martin")));
    }

    #[test]
    fn test_duplicate_targets_apply_once() {
        let (definition, mut forms) = adult_forms();
        let result = AnalysisResult::new()
            .with("basicInfo.firstName", json!("Jean"))
            .with("firstName", json!("Jeanne"));
        let (routed, unrouted) = route(&definition, &result);
        let report = MergePlan::compute(routed, unrouted, &forms).apply(&mut forms);

        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.skipped_filled.len(), 1);
        assert_eq!(forms["basicInfo"].value("firstName"), Some(&json!("Jean")));
        assert_eq!(report.touched_steps(), ["basicInfo"]);
    }

    #[test]
    fn test_documents_in_reads_document_fields() {
        let (definition, _) = adult_forms();
        let schema = definition.schema_for("documents").unwrap();
        let mut values = FieldValues::new();
        values.insert("passport".into(), json!("https://files/p.pdf"));
        values.insert("identityPhoto".into(), json!(" "));

        let documents = documents_in(&schema, &values);
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[&DocumentTag::Passport], "https://files/p.pdf");
    }
}
