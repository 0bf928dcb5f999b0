//! Text rendering of the review screen

use rust_embed::Embed;
use tera::Tera;
use thiserror::Error;

use crate::core::review::ReviewSummary;

#[derive(Embed)]
#[folder = "templates/"]
struct EmbeddedTemplates;

const REVIEW_TEMPLATE: &str = "review.txt.tera";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template rendering error: {0}")]
    RenderError(String),
}

/// Renders review summaries through the embedded Tera templates
pub struct ReviewRenderer {
    tera: Tera,
}

impl ReviewRenderer {
    /// Create a renderer with the embedded templates
    pub fn new() -> Result<Self, TemplateError> {
        let mut tera = Tera::default();

        for file in EmbeddedTemplates::iter() {
            let filename = file.as_ref();
            if let Some(content) = EmbeddedTemplates::get(filename) {
                if let Ok(template_str) = std::str::from_utf8(&content.data) {
                    tera.add_raw_template(filename, template_str)
                        .map_err(|e| TemplateError::RenderError(e.to_string()))?;
                }
            }
        }

        Ok(Self { tera })
    }

    /// Renderer with a caller-provided review template
    pub fn with_template(source: &str) -> Result<Self, TemplateError> {
        let mut tera = Tera::default();
        tera.add_raw_template(REVIEW_TEMPLATE, source)
            .map_err(|e| TemplateError::RenderError(e.to_string()))?;
        Ok(Self { tera })
    }

    pub fn render(&self, summary: &ReviewSummary) -> Result<String, TemplateError> {
        if !self.tera.get_template_names().any(|n| n == REVIEW_TEMPLATE) {
            return Err(TemplateError::NotFound(REVIEW_TEMPLATE.to_string()));
        }

        let context = tera::Context::from_serialize(summary)
            .map_err(|e| TemplateError::RenderError(e.to_string()))?;
        self.tera
            .render(REVIEW_TEMPLATE, &context)
            .map_err(|e| TemplateError::RenderError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::review::{ReviewEntry, ReviewSection, SectionStatus};
    use serde_json::json;

    fn summary() -> ReviewSummary {
        ReviewSummary {
            flow: "adult".into(),
            profile_id: "PRF-01HQ3K4N5M6P7R8S9T0UVWXYZ1".into(),
            ready: true,
            sections: vec![
                ReviewSection {
                    step: "basicInfo".into(),
                    title: "Basic information".into(),
                    optional: false,
                    status: SectionStatus::Complete,
                    entries: vec![ReviewEntry {
                        field: "firstName".into(),
                        label: "First name".into(),
                        value: "Jean".into(),
                    }],
                    edit_target: "basicInfo".into(),
                },
                ReviewSection {
                    step: "professionalInfo".into(),
                    title: "Professional situation".into(),
                    optional: true,
                    status: SectionStatus::Skipped,
                    entries: vec![],
                    edit_target: "professionalInfo".into(),
                },
            ],
            payload: json!({"basicInfo": {"firstName": "Jean"}}),
        }
    }

    #[test]
    fn test_embedded_review_template_renders() {
        let renderer = ReviewRenderer::new().unwrap();
        let text = renderer.render(&summary()).unwrap();

        assert!(text.contains("[COMPLETE] Basic information"));
        assert!(text.contains("First name: Jean"));
        assert!(text.contains("[SKIPPED] Professional situation (optional)"));
        assert!(text.contains("intake goto professionalInfo"));
        assert!(text.contains("intake submit"));
    }

    #[test]
    fn test_custom_template() {
        let renderer = ReviewRenderer::with_template(
            "{% for s in sections %}{{ s.step }}={{ s.status }};{% endfor %}",
        )
        .unwrap();
        assert_eq!(
            renderer.render(&summary()).unwrap(),
            "basicInfo=complete;professionalInfo=skipped;"
        );
    }

    #[test]
    fn test_invalid_template_rejected() {
        assert!(matches!(
            ReviewRenderer::with_template("{% for %}"),
            Err(TemplateError::RenderError(_))
        ));
    }
}
