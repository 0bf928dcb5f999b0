//! Step schema compilation and validation with field-level error reporting

use jsonschema::{validator_for, ValidationError as JsonSchemaError, Validator as JsonValidator};
use miette::{Diagnostic, NamedSource, SourceSpan};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::schema::fields::{extract_fields, FieldSpec};
use crate::schema::registry::SchemaRegistry;

/// A field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Errors raised while loading step schemas
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema '{0}' is not registered")]
    Unknown(String),

    #[error("schema '{name}' is not valid JSON: {message}")]
    Parse { name: String, message: String },

    #[error("schema '{name}' does not compile: {message}")]
    Compile { name: String, message: String },
}

/// A compiled step schema together with its extracted fields
pub struct StepSchema {
    name: String,
    document: JsonValue,
    compiled: JsonValidator,
    fields: Vec<FieldSpec>,
}

impl StepSchema {
    /// Parse and compile a schema document
    pub fn compile(name: &str, source: &str) -> Result<Self, SchemaError> {
        let document: JsonValue = serde_json::from_str(source).map_err(|e| SchemaError::Parse {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        Self::from_value(name, document)
    }

    pub fn from_value(name: &str, document: JsonValue) -> Result<Self, SchemaError> {
        let compiled = validator_for(&document).map_err(|e| SchemaError::Compile {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        let fields = extract_fields(&document);

        Ok(Self {
            name: name.to_string(),
            document,
            compiled,
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn document(&self) -> &JsonValue {
        &self.document
    }

    /// Title declared by the schema, if any
    pub fn title(&self) -> Option<&str> {
        self.document.get("title").and_then(|t| t.as_str())
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Validate a value map; errors come back ordered by field declaration
    pub fn validate(&self, values: &JsonValue) -> Vec<FieldError> {
        let mut errors: Vec<(usize, FieldError)> = self
            .compiled
            .iter_errors(values)
            .map(|e| {
                let error = error_to_field_error(&e);
                (self.position(&error.field), error)
            })
            .collect();

        errors.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.reason.cmp(&b.1.reason)));
        errors.dedup_by(|a, b| a.1 == b.1);
        errors.into_iter().map(|(_, e)| e).collect()
    }

    pub fn is_valid(&self, values: &JsonValue) -> bool {
        self.compiled.is_valid(values)
    }

    fn position(&self, field: &str) -> usize {
        self.fields
            .iter()
            .position(|f| f.name == field)
            .unwrap_or(usize::MAX)
    }
}

impl fmt::Debug for StepSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSchema")
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .finish()
    }
}

/// Schema validator with compiled schemas
pub struct Validator {
    /// Compiled step schemas by schema name
    compiled: HashMap<String, Arc<StepSchema>>,
}

impl Validator {
    /// Compile every schema of the registry
    pub fn new(registry: &SchemaRegistry) -> Result<Self, SchemaError> {
        let mut compiled = HashMap::new();

        for name in registry.names() {
            if let Some(source) = registry.get(name) {
                compiled.insert(name.to_string(), Arc::new(StepSchema::compile(name, source)?));
            }
        }

        Ok(Self { compiled })
    }

    /// Add or replace a schema after construction
    pub fn register(&mut self, name: &str, source: &str) -> Result<Arc<StepSchema>, SchemaError> {
        let schema = Arc::new(StepSchema::compile(name, source)?);
        self.compiled.insert(name.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Option<Arc<StepSchema>> {
        self.compiled.get(name).cloned()
    }

    pub fn schema(&self, name: &str) -> Result<Arc<StepSchema>, SchemaError> {
        self.get(name)
            .ok_or_else(|| SchemaError::Unknown(name.to_string()))
    }

    /// Validate an answers document and report every violation with its
    /// location in the source text
    pub fn validate_document(
        &self,
        schema_name: &str,
        value: &JsonValue,
        content: &str,
        filename: &str,
    ) -> Result<(), ValidationError> {
        let Some(schema) = self.compiled.get(schema_name) else {
            let violation = SchemaViolation::new(
                format!("No schema named '{}'", schema_name),
                "unknown schema".to_string(),
                first_line_span(content),
                None,
            );
            return Err(ValidationError::new(filename, content, vec![violation]));
        };

        let violations: Vec<SchemaViolation> = schema
            .compiled
            .iter_errors(value)
            .map(|e| error_to_violation(content, &e))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(filename, content, violations))
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.compiled.keys().collect();
        names.sort();
        f.debug_struct("Validator").field("schemas", &names).finish()
    }
}

/// Validation error with source location information
#[derive(Debug, Error, Diagnostic)]
#[error("Schema validation failed: {summary}")]
#[diagnostic(code(intake::schema::validation_error))]
pub struct ValidationError {
    summary: String,

    #[source_code]
    src: NamedSource<String>,

    #[related]
    violations: Vec<SchemaViolation>,
}

/// A single schema violation
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct SchemaViolation {
    #[label("{}", self.hint)]
    span: SourceSpan,

    message: String,
    hint: String,

    #[help]
    help: Option<String>,
}

impl SchemaViolation {
    pub fn new(message: String, hint: String, span: SourceSpan, help: Option<String>) -> Self {
        Self {
            span,
            message,
            hint,
            help,
        }
    }
}

impl ValidationError {
    pub fn new(filename: &str, source: &str, violations: Vec<SchemaViolation>) -> Self {
        let count = violations.len();
        let summary = if count == 1 {
            "1 error".to_string()
        } else {
            format!("{} errors", count)
        };
        Self {
            summary,
            src: NamedSource::new(filename, source.to_string()),
            violations,
        }
    }

    /// Get the number of violations
    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|v| v.message.as_str())
    }
}

/// Convert a JSON Schema error into a field-level error
fn error_to_field_error(error: &JsonSchemaError) -> FieldError {
    use jsonschema::error::ValidationErrorKind;

    if let ValidationErrorKind::Required { property } = &error.kind {
        let field = property
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| property.to_string());
        return FieldError::new(field, "is required");
    }

    let path = error.instance_path.to_string();
    let field = path
        .split('/')
        .find(|s| !s.is_empty())
        .unwrap_or("")
        .to_string();

    FieldError::new(field, format_reason(error))
}

/// Human-readable reason, without the location
fn format_reason(error: &JsonSchemaError) -> String {
    use jsonschema::error::ValidationErrorKind;

    match &error.kind {
        ValidationErrorKind::Required { .. } => "is required".to_string(),
        ValidationErrorKind::Type { kind } => {
            format!("has the wrong type (expected {:?})", kind)
        }
        ValidationErrorKind::Enum { options } => {
            format!("must be one of: {}", format_enum_options(options))
        }
        ValidationErrorKind::Pattern { .. } => "has an invalid format".to_string(),
        ValidationErrorKind::MinLength { limit } if *limit <= 1 => "must not be empty".to_string(),
        ValidationErrorKind::MinLength { limit } => {
            format!("is too short: minimum {} characters", limit)
        }
        ValidationErrorKind::MaxLength { limit } => {
            format!("is too long: maximum {} characters", limit)
        }
        ValidationErrorKind::Minimum { limit } => format!("is too small: minimum {}", limit),
        ValidationErrorKind::Maximum { limit } => format!("is too large: maximum {}", limit),
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            format!("unknown field(s): {}", unexpected.join(", "))
        }
        _ => error.to_string(),
    }
}

/// Convert a JSON Schema validation error to our violation format
fn error_to_violation(content: &str, error: &JsonSchemaError) -> SchemaViolation {
    let field_error = error_to_field_error(error);
    let message = if field_error.field.is_empty() {
        format!("Document {}", field_error.reason)
    } else {
        format!("'{}' {}", field_error.field, field_error.reason)
    };
    let hint = format_error_hint(error);
    let help = generate_help_message(error);

    let span = if field_error.field.is_empty() {
        first_line_span(content)
    } else {
        find_key_span(content, &field_error.field).unwrap_or_else(|| first_line_span(content))
    };

    SchemaViolation::new(message, hint, span, help)
}

/// Format enum options as a string
fn format_enum_options(options: &JsonValue) -> String {
    if let Some(arr) = options.as_array() {
        arr.iter()
            .map(|v| v.as_str().map(|s| s.to_string()).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        options.to_string()
    }
}

/// Generate a short hint for the error label
fn format_error_hint(error: &JsonSchemaError) -> String {
    use jsonschema::error::ValidationErrorKind;

    match &error.kind {
        ValidationErrorKind::Required { .. } => "required field missing".to_string(),
        ValidationErrorKind::Type { .. } => "wrong type".to_string(),
        ValidationErrorKind::Enum { .. } => "invalid value".to_string(),
        ValidationErrorKind::Pattern { .. } => "pattern mismatch".to_string(),
        ValidationErrorKind::MinLength { .. } => "too short".to_string(),
        ValidationErrorKind::MaxLength { .. } => "too long".to_string(),
        ValidationErrorKind::AdditionalProperties { .. } => "unknown field".to_string(),
        _ => "validation error".to_string(),
    }
}

/// Generate a help message with suggestions for fixing the error
fn generate_help_message(error: &JsonSchemaError) -> Option<String> {
    use jsonschema::error::ValidationErrorKind;

    match &error.kind {
        ValidationErrorKind::Required { property } => {
            let prop_str = property
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| property.to_string());
            Some(format!("Add the '{}' field to your file", prop_str))
        }
        ValidationErrorKind::Enum { options } => {
            Some(format!("Valid values: {}", format_enum_options(options)))
        }
        ValidationErrorKind::Pattern { pattern } => {
            if pattern.contains("[A-Z]{2}") {
                Some("Use a two-letter ISO country code, e.g. FR, SN, CI".to_string())
            } else if pattern.contains("[0-9]{4}-[0-9]{2}-[0-9]{2}") {
                Some("Dates use the YYYY-MM-DD format, e.g. 1990-04-12".to_string())
            } else {
                None
            }
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            if unexpected.len() == 1 {
                Some(format!("Remove the '{}' field or check spelling", unexpected[0]))
            } else {
                Some("Remove unknown fields or check spelling".to_string())
            }
        }
        _ => None,
    }
}

fn first_line_span(content: &str) -> SourceSpan {
    let len = content.find('\n').unwrap_or(content.len()).max(1);
    (0, len).into()
}

/// Find the span of a key in YAML content
fn find_key_span(content: &str, key: &str) -> Option<SourceSpan> {
    // Simple search for "key:" at the start of a line (with optional leading whitespace)
    let search_pattern = format!("{}:", key);

    let mut offset = 0;
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with(&search_pattern) {
            let key_start = offset + (line.len() - trimmed.len());
            return Some((key_start, trimmed.len()).into());
        }
        offset += line.len() + 1;
    }
    None
}
