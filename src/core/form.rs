//! Per-step form controller: binds a step schema to an editable draft
//!
//! The controller has no UI dependency. It tracks which fields the user
//! edited (`dirty_fields`) separately from fields filled by document
//! analysis (`extracted_fields`), because only the former are protected from
//! later auto-fill.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::ports::FieldValues;
use crate::schema::fields::{is_blank, FieldDispatch};
use crate::schema::validator::{FieldError, StepSchema};

/// In-progress values of one step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftState {
    #[serde(default)]
    pub values: FieldValues,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dirty_fields: BTreeSet<String>,
    /// Filled by document analysis and not yet persisted
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub extracted_fields: BTreeSet<String>,
    #[serde(default)]
    pub is_valid: bool,
}

/// Outcome of offering an extracted value to a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Applied,
    /// The user edited the field
    SkippedDirty,
    /// The field already holds a value
    SkippedFilled,
}

#[derive(Debug, Clone)]
pub struct FormController {
    step: String,
    schema: Arc<StepSchema>,
    draft: DraftState,
}

impl FormController {
    /// Seed a draft from prior persisted values, then schema defaults.
    /// Missing or unusable prior data falls back to defaults silently.
    pub fn initialize(
        step: impl Into<String>,
        schema: Arc<StepSchema>,
        defaults: Option<&FieldValues>,
    ) -> Self {
        let mut values = FieldValues::new();

        for field in schema.fields() {
            let prior = defaults
                .and_then(|d| d.get(&field.name))
                .filter(|v| !v.is_null());
            if let Some(value) = prior.or(field.default.as_ref()) {
                values.insert(field.name.clone(), value.clone());
            }
        }

        let mut controller = Self {
            step: step.into(),
            schema,
            draft: DraftState {
                values,
                ..DraftState::default()
            },
        };
        controller.refresh_validity();
        controller
    }

    /// Rebuild a controller around a saved draft
    pub fn from_draft(step: impl Into<String>, schema: Arc<StepSchema>, draft: DraftState) -> Self {
        let mut controller = Self {
            step: step.into(),
            schema,
            draft,
        };
        controller.refresh_validity();
        controller
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn schema(&self) -> &Arc<StepSchema> {
        &self.schema
    }

    pub fn draft(&self) -> &DraftState {
        &self.draft
    }

    pub fn values(&self) -> &FieldValues {
        &self.draft.values
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.draft.values.get(name)
    }

    pub fn is_valid(&self) -> bool {
        self.draft.is_valid
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.draft.dirty_fields.contains(name)
    }

    /// Missing, null, blank or empty collection
    pub fn is_empty_field(&self, name: &str) -> bool {
        self.draft.values.get(name).map_or(true, is_blank)
    }

    /// User edit: update the value, mark it dirty, recompute validity
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.draft.extracted_fields.remove(&name);
        self.draft.dirty_fields.insert(name.clone());
        self.draft.values.insert(name, value);
        self.refresh_validity();
    }

    /// User edit that removes the value entirely
    pub fn clear_field(&mut self, name: &str) {
        self.draft.values.remove(name);
        self.draft.extracted_fields.remove(name);
        self.draft.dirty_fields.insert(name.to_string());
        self.refresh_validity();
    }

    /// Parse user text through the field strategy of `name`, then set it.
    /// Blank input clears the field.
    pub fn set_raw(&mut self, dispatch: &FieldDispatch, name: &str, raw: &str) -> Result<(), FieldError> {
        let Some(spec) = self.schema.field(name) else {
            return Err(FieldError::new(name, "is not a field of this step"));
        };

        if raw.trim().is_empty() {
            self.clear_field(name);
            return Ok(());
        }

        let value = dispatch
            .parse(spec, raw)
            .map_err(|reason| FieldError::new(name, reason))?;
        self.set_field(name, value);
        Ok(())
    }

    /// Validate every field against the step schema
    pub fn validate_all(&mut self) -> Vec<FieldError> {
        let errors = self.schema.validate(&Value::Object(self.draft.values.clone()));
        self.draft.is_valid = errors.is_empty();
        errors
    }

    /// Only the fields the user edited
    pub fn dirty_values(&self) -> FieldValues {
        self.pick(|name| self.draft.dirty_fields.contains(name))
    }

    /// Fields to send on the next persistence call: user edits plus values
    /// filled by analysis since the last save
    pub fn persist_values(&self) -> FieldValues {
        self.pick(|name| {
            self.draft.dirty_fields.contains(name) || self.draft.extracted_fields.contains(name)
        })
    }

    /// Dirty fields that were cleared have no value; persist them as null
    fn pick(&self, include: impl Fn(&str) -> bool) -> FieldValues {
        let mut picked = FieldValues::new();
        let names = self
            .draft
            .dirty_fields
            .iter()
            .chain(self.draft.extracted_fields.iter());
        for name in names {
            if include(name) && !picked.contains_key(name) {
                let value = self.draft.values.get(name).cloned().unwrap_or(Value::Null);
                picked.insert(name.clone(), value);
            }
        }
        picked
    }

    /// What `fill_empty` would do, without changing anything
    pub fn fill_outcome(&self, name: &str) -> FillOutcome {
        if self.is_dirty(name) {
            FillOutcome::SkippedDirty
        } else if !self.is_empty_field(name) {
            FillOutcome::SkippedFilled
        } else {
            FillOutcome::Applied
        }
    }

    /// Offer an extracted value: applied only to an empty field the user has
    /// not edited. The field does not become dirty.
    pub fn fill_empty(&mut self, name: &str, value: Value) -> FillOutcome {
        let outcome = self.fill_outcome(name);
        if outcome == FillOutcome::Applied && !is_blank(&value) {
            self.draft.values.insert(name.to_string(), value);
            self.draft.extracted_fields.insert(name.to_string());
            self.refresh_validity();
        }
        outcome
    }

    /// Called after the persistence call succeeded
    pub fn mark_persisted(&mut self) {
        self.draft.extracted_fields.clear();
    }

    fn refresh_validity(&mut self) {
        self.draft.is_valid = self
            .schema
            .is_valid(&Value::Object(self.draft.values.clone()));
    }
}
