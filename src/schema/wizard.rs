//! Interactive prompting for wizard steps
//!
//! Each field tag maps to a [`PromptStrategy`] that asks the user for raw
//! text; the text then goes through the field dispatch table like any other
//! input, so terminal prompts and `intake set` share one parsing path.

use console::style;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use miette::{IntoDiagnostic, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::workflow::{WizardError, WizardSession};
use crate::schema::fields::FieldSpec;

/// Asks for one field value. `None` leaves the field unchanged.
pub trait PromptStrategy: Send + Sync {
    fn prompt(
        &self,
        theme: &ColorfulTheme,
        spec: &FieldSpec,
        label: &str,
        current: Option<&Value>,
    ) -> Result<Option<String>>;
}

/// Free text with the current value as default
pub struct TextPrompt;

impl PromptStrategy for TextPrompt {
    fn prompt(
        &self,
        theme: &ColorfulTheme,
        spec: &FieldSpec,
        label: &str,
        current: Option<&Value>,
    ) -> Result<Option<String>> {
        let current = current.map(raw_text).unwrap_or_default();
        let mut input = Input::<String>::with_theme(theme)
            .with_prompt(label)
            .allow_empty(!spec.required || !current.is_empty());
        if !current.is_empty() {
            input = input.default(current.clone());
        }
        let value = input.interact_text().into_diagnostic()?;

        if value == current {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }
}

/// Menu over the schema `enum`
pub struct ChoicePrompt;

impl PromptStrategy for ChoicePrompt {
    fn prompt(
        &self,
        theme: &ColorfulTheme,
        spec: &FieldSpec,
        label: &str,
        current: Option<&Value>,
    ) -> Result<Option<String>> {
        let current = current.and_then(|v| v.as_str());
        let default_idx = current
            .and_then(|c| spec.options.iter().position(|o| o == c))
            .unwrap_or(0);

        let selection = Select::with_theme(theme)
            .with_prompt(label)
            .items(&spec.options)
            .default(default_idx)
            .interact()
            .into_diagnostic()?;

        let chosen = spec.options.get(selection).cloned();
        if chosen.as_deref() == current {
            Ok(None)
        } else {
            Ok(chosen)
        }
    }
}

pub struct BooleanPrompt;

impl PromptStrategy for BooleanPrompt {
    fn prompt(
        &self,
        theme: &ColorfulTheme,
        _spec: &FieldSpec,
        label: &str,
        current: Option<&Value>,
    ) -> Result<Option<String>> {
        let current = current.and_then(|v| v.as_bool());
        let items = ["Yes", "No"];
        let selection = Select::with_theme(theme)
            .with_prompt(label)
            .items(&items)
            .default(if current == Some(true) { 0 } else { 1 })
            .interact()
            .into_diagnostic()?;

        let answer = selection == 0;
        if current == Some(answer) {
            Ok(None)
        } else {
            Ok(Some(if answer { "yes" } else { "no" }.to_string()))
        }
    }
}

/// Comma-separated list
pub struct ListPrompt;

impl PromptStrategy for ListPrompt {
    fn prompt(
        &self,
        theme: &ColorfulTheme,
        spec: &FieldSpec,
        label: &str,
        current: Option<&Value>,
    ) -> Result<Option<String>> {
        TextPrompt.prompt(theme, spec, &format!("{} (comma-separated)", label), current)
    }
}

/// Tag -> prompt table, keyed like the field dispatch table
pub struct StepPrompter {
    theme: ColorfulTheme,
    prompts: HashMap<String, Arc<dyn PromptStrategy>>,
    fallback: Arc<dyn PromptStrategy>,
}

impl StepPrompter {
    pub fn new() -> Self {
        let mut prompter = Self {
            theme: ColorfulTheme::default(),
            prompts: HashMap::new(),
            fallback: Arc::new(TextPrompt),
        };
        prompter.register("choice", ChoicePrompt);
        prompter.register("boolean", BooleanPrompt);
        prompter.register("list", ListPrompt);
        prompter
    }

    /// Add or replace the prompt of a field tag
    pub fn register(&mut self, tag: impl Into<String>, prompt: impl PromptStrategy + 'static) {
        self.prompts.insert(tag.into(), Arc::new(prompt));
    }

    pub fn has_prompt(&self, tag: &str) -> bool {
        self.prompts.contains_key(tag)
    }

    fn prompt_for(&self, tag: &str) -> &dyn PromptStrategy {
        self.prompts
            .get(tag)
            .map(|p| p.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }

    /// Ask for every field of the active step, re-asking a field until its
    /// answer parses
    pub fn prompt_step(&self, session: &mut WizardSession) -> Result<()> {
        let Some(step) = session.current_step().cloned() else {
            return Ok(());
        };
        let Some(schema) = session.definition().schema_for(&step.key) else {
            return Ok(());
        };

        println!();
        println!("{} {}", style("◆").cyan(), style(&step.title).bold());
        println!("{}", style("─".repeat(50)).dim());

        for spec in schema.fields() {
            let label = format_label(spec);
            loop {
                let current = session
                    .current_form()
                    .and_then(|f| f.value(&spec.name))
                    .cloned();
                let Some(raw) = self
                    .prompt_for(&spec.tag)
                    .prompt(&self.theme, spec, &label, current.as_ref())?
                else {
                    break;
                };

                match session.set_raw(&spec.name, &raw) {
                    Ok(()) => break,
                    Err(WizardError::Field(e)) => {
                        println!("  {} {}", style("✗").red(), e.reason);
                    }
                    Err(e) => return Err(miette::miette!("{}", e)),
                }
            }
        }

        Ok(())
    }
}

impl Default for StepPrompter {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain text form of a stored value, as a user would type it
pub fn raw_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(raw_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

fn format_label(spec: &FieldSpec) -> String {
    let mut label = spec.label.clone();
    if !spec.required {
        label.push_str(" (optional)");
    }
    if let Some(desc) = &spec.description {
        let short: String = if desc.chars().count() > 50 {
            format!("{}...", desc.chars().take(47).collect::<String>())
        } else {
            desc.clone()
        };
        label = format!("{} ({})", label, style(short).dim());
    }
    label
}
