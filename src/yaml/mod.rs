//! Answer files: YAML parsing with source-located diagnostics

pub mod diagnostics;

pub use diagnostics::{check_answers, AnswerFileError, AnswerProblem};

use serde_json::Value;

use crate::schema::validator::StepSchema;

/// Parse an answer file for `step`. Syntax errors and keys the step does not
/// declare are reported against `filename`.
pub fn parse_answers(source: &str, filename: &str, step: &StepSchema) -> Result<Value, AnswerFileError> {
    let value: Value =
        serde_yml::from_str(source).map_err(|e| AnswerFileError::syntax(&e, source, filename))?;
    check_answers(&value, source, filename, step)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flow::StepRegistry;

    #[test]
    fn test_parse_answers() {
        let registry = StepRegistry::new().unwrap();
        let step = registry.validator().schema("contact-info").unwrap();

        let value = parse_answers("city: Lyon\n", "contact-info.yaml", &step).unwrap();
        assert_eq!(value["city"], "Lyon");

        let err = parse_answers("city: [Lyon\n", "contact-info.yaml", &step).unwrap_err();
        assert!(matches!(err.problem(), AnswerProblem::Syntax(_)));

        let err = parse_answers("town: Lyon\n", "contact-info.yaml", &step).unwrap_err();
        assert_eq!(err.problem(), &AnswerProblem::UnknownField("town".into()));
    }
}
