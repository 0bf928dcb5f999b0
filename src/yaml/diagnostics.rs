//! Diagnostics for answer files
//!
//! An answer file maps the field names of one step to values. Problems are
//! reported against the file, with the span on the offending line and help
//! naming the fields the step expects.

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::schema::validator::StepSchema;

/// What is wrong with an answer file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerProblem {
    /// The file is not valid YAML
    Syntax(String),
    /// The document is a list or a scalar instead of field answers
    NotAMapping,
    /// A key the step does not declare
    UnknownField(String),
}

impl fmt::Display for AnswerProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerProblem::Syntax(message) => write!(f, "YAML syntax error: {}", message),
            AnswerProblem::NotAMapping => write!(f, "answers must map field names to values"),
            AnswerProblem::UnknownField(name) => write!(f, "'{}' is not a field of this step", name),
        }
    }
}

/// An answer file that cannot be read as answers to a step
#[derive(Debug, Error, Diagnostic)]
#[error("{file}: {problem}")]
#[diagnostic(code(intake::answers))]
pub struct AnswerFileError {
    #[source_code]
    src: NamedSource<String>,

    #[label("{}", self.hint)]
    span: SourceSpan,

    hint: String,

    #[help]
    help: Option<String>,

    file: String,
    problem: AnswerProblem,
}

impl AnswerFileError {
    fn new(
        source: &str,
        filename: &str,
        span: SourceSpan,
        hint: &str,
        help: Option<String>,
        problem: AnswerProblem,
    ) -> Self {
        Self {
            src: NamedSource::new(filename, source.to_string()),
            span,
            hint: hint.to_string(),
            help,
            file: filename.to_string(),
            problem,
        }
    }

    /// YAML that does not parse, located where the parser stopped
    pub fn syntax(err: &serde_yml::Error, source: &str, filename: &str) -> Self {
        let offset = err
            .location()
            .map(|loc| offset_of(source, loc.line(), loc.column()))
            .unwrap_or(0);
        let message = err.to_string();
        let help = syntax_help(&message);
        Self::new(
            source,
            filename,
            (offset, 1).into(),
            "parsing stopped here",
            help,
            AnswerProblem::Syntax(message),
        )
    }

    pub fn problem(&self) -> &AnswerProblem {
        &self.problem
    }

    pub fn span(&self) -> SourceSpan {
        self.span
    }
}

/// Check that a parsed answer file only answers fields of `step`
pub fn check_answers(
    value: &Value,
    source: &str,
    filename: &str,
    step: &StepSchema,
) -> Result<(), AnswerFileError> {
    let Some(answers) = value.as_object() else {
        return Err(AnswerFileError::new(
            source,
            filename,
            line_span(source, 0),
            "expected `field: value` lines",
            Some(expected_fields(step)),
            AnswerProblem::NotAMapping,
        ));
    };

    for key in answers.keys() {
        if step.has_field(key) {
            continue;
        }
        let help = match closest_field(step, key) {
            Some(name) => format!("did you mean `{}`?", name),
            None => expected_fields(step),
        };
        return Err(AnswerFileError::new(
            source,
            filename,
            key_span(source, key).unwrap_or_else(|| line_span(source, 0)),
            "unknown field",
            Some(help),
            AnswerProblem::UnknownField(key.clone()),
        ));
    }
    Ok(())
}

fn expected_fields(step: &StepSchema) -> String {
    let names: Vec<&str> = step.fields().iter().map(|f| f.name.as_str()).collect();
    format!(
        "{} answers: {}",
        step.title().unwrap_or(step.name()),
        names.join(", ")
    )
}

/// A declared field that differs from `key` only by case, or by at most two
/// edits
fn closest_field<'a>(step: &'a StepSchema, key: &str) -> Option<&'a str> {
    let lowered = key.to_lowercase();
    step.fields()
        .iter()
        .map(|f| (f.name.as_str(), edit_distance(&lowered, &f.name.to_lowercase())))
        .filter(|(_, distance)| *distance <= 2)
        .min_by_key(|(_, distance)| *distance)
        .map(|(name, _)| name)
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == *cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Byte offset of a 1-based line and column
fn offset_of(source: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    for (index, text) in source.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            let within = text
                .char_indices()
                .nth(column.saturating_sub(1))
                .map_or(text.len(), |(i, _)| i);
            return offset + within;
        }
        offset += text.len();
    }
    source.len().saturating_sub(1)
}

/// Span of the line containing `offset`, without its newline
fn line_span(source: &str, offset: usize) -> SourceSpan {
    let start = source[..offset.min(source.len())]
        .rfind('\n')
        .map_or(0, |i| i + 1);
    let end = source[start..].find('\n').map_or(source.len(), |i| start + i);
    (start, (end - start).max(1)).into()
}

/// Span of a top-level `key:` line
fn key_span(source: &str, key: &str) -> Option<SourceSpan> {
    let mut offset = 0;
    for text in source.split_inclusive('\n') {
        let line = text.trim_end_matches(['\n', '\r']);
        let bare = line.strip_prefix(key).is_some_and(|rest| rest.starts_with(':'));
        let quoted = [format!("\"{}\":", key), format!("'{}':", key)]
            .iter()
            .any(|q| line.starts_with(q.as_str()));
        if bare || quoted {
            return Some((offset, line.len().max(1)).into());
        }
        offset += text.len();
    }
    None
}

fn syntax_help(message: &str) -> Option<String> {
    let message = message.to_lowercase();
    let help = if message.contains("tab") {
        "indent with spaces; YAML rejects tabs"
    } else if message.contains("duplicate") {
        "each field can be answered once"
    } else if message.contains("mapping values are not allowed") || message.contains("unexpected ':'") {
        "quote values that contain a colon: `reason: \"Visa: tourism\"`"
    } else if message.contains("did not find expected") {
        "close every [ and \" that the answer opens"
    } else {
        return None;
    };
    Some(help.to_string())
}
