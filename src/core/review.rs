//! Review & submit aggregation: a read-only summary of every step and the
//! submission payload built from the drafts.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

use crate::core::flow::WizardDefinition;
use crate::core::form::FormController;
use crate::core::workflow::WizardSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Complete,
    Skipped,
    Incomplete,
}

impl SectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionStatus::Complete => "complete",
            SectionStatus::Skipped => "skipped",
            SectionStatus::Incomplete => "incomplete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewEntry {
    pub field: String,
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewSection {
    pub step: String,
    pub title: String,
    pub optional: bool,
    pub status: SectionStatus,
    pub entries: Vec<ReviewEntry>,
    /// Step to `goto` to edit this section
    pub edit_target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewSummary {
    pub flow: String,
    pub profile_id: String,
    pub ready: bool,
    pub sections: Vec<ReviewSection>,
    pub payload: Value,
}

impl ReviewSummary {
    pub fn build(session: &WizardSession) -> Self {
        let definition = session.definition();
        let dispatch = session.dispatch();

        let sections = definition
            .steps()
            .iter()
            .map(|step| {
                let status = if session.is_skipped(&step.key) {
                    SectionStatus::Skipped
                } else if session.is_complete(&step.key) {
                    SectionStatus::Complete
                } else {
                    SectionStatus::Incomplete
                };

                let entries = match (session.form(&step.key), definition.schema_for(&step.key)) {
                    (Some(form), Some(schema)) if status != SectionStatus::Skipped => schema
                        .fields()
                        .iter()
                        .filter_map(|spec| {
                            let value = form.value(&spec.name)?;
                            if dispatch.is_empty(spec, value) {
                                return None;
                            }
                            Some(ReviewEntry {
                                field: spec.name.clone(),
                                label: spec.label.clone(),
                                value: dispatch.display(spec, value),
                            })
                        })
                        .collect(),
                    _ => Vec::new(),
                };

                ReviewSection {
                    step: step.key.clone(),
                    title: step.title.clone(),
                    optional: step.is_optional,
                    status,
                    entries,
                    edit_target: step.key.clone(),
                }
            })
            .collect();

        Self {
            flow: definition.name().to_string(),
            profile_id: session.context().profile_id.to_string(),
            ready: session.is_ready(),
            sections,
            payload: session.payload(),
        }
    }

    pub fn section(&self, step: &str) -> Option<&ReviewSection> {
        self.sections.iter().find(|s| s.step == step)
    }
}

/// Submission payload: step key -> field values, for completed steps that
/// were not skipped. Null values are left out.
pub fn aggregate_payload(
    definition: &WizardDefinition,
    forms: &HashMap<String, FormController>,
    completed: &BTreeSet<String>,
    skipped: &BTreeSet<String>,
) -> Value {
    let mut payload = Map::new();
    for step in definition.steps() {
        if !completed.contains(&step.key) || skipped.contains(&step.key) {
            continue;
        }
        let Some(form) = forms.get(&step.key) else {
            continue;
        };
        let values: Map<String, Value> = form
            .values()
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        payload.insert(step.key.clone(), Value::Object(values));
    }
    Value::Object(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flow::{FlowKind, StepRegistry};
    use crate::core::identity::RecordId;
    use crate::core::memory::InMemoryStore;
    use crate::core::workflow::{SessionContext, WizardSession};
    use serde_json::json;
    use std::sync::Arc;

    fn service_session() -> WizardSession {
        let definition = StepRegistry::new()
            .unwrap()
            .definition(FlowKind::ServiceRequest)
            .unwrap();
        let store = Arc::new(InMemoryStore::new());
        WizardSession::new(
            Arc::new(definition),
            SessionContext::new(RecordId::profile()),
            store.ports(),
        )
    }

    #[test]
    fn test_sections_follow_definition_order() {
        let session = service_session();
        let summary = session.review();
        let steps: Vec<&str> = summary.sections.iter().map(|s| s.step.as_str()).collect();
        assert_eq!(
            steps,
            ["basicInfo", "serviceSelection", "serviceDetails", "supportingDocuments"]
        );
        assert!(summary
            .sections
            .iter()
            .all(|s| s.status == SectionStatus::Incomplete && s.edit_target == s.step));
        assert!(!summary.ready);
        assert_eq!(summary.payload, json!({}));
    }

    #[test]
    fn test_entries_use_labels_and_display_values() {
        let mut session = service_session();
        session.set_raw("firstName", "Awa").unwrap();
        session.set_raw("birthDate", "1990-04-12").unwrap();

        let summary = session.review();
        let section = summary.section("basicInfo").unwrap();
        assert_eq!(section.entries[0].field, "firstName");
        assert_eq!(section.entries[0].label, "First name");
        let birth = section.entries.iter().find(|e| e.field == "birthDate").unwrap();
        assert_eq!(birth.value, "12 April 1990");
        // Schema default
        assert!(section.entries.iter().any(|e| e.field == "nationalityAcquisition"));
        // Incomplete steps are not part of the payload
        assert_eq!(summary.payload, json!({}));
    }
}
