//! Field descriptions extracted from step schemas, and the strategy table
//! used to parse, test and display field values by field tag.
//!
//! Every schema property gets a tag (`text`, `choice`, `date`, ...). The tag
//! selects a [`FieldStrategy`] from a [`FieldDispatch`] table. New field kinds
//! are added by registering a strategy under a new tag; schemas opt in with
//! the `x-field` keyword.

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Field information extracted from a step schema property
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub description: Option<String>,
    pub tag: String,
    pub required: bool,
    /// Allowed values for `choice` fields
    pub options: Vec<String>,
    pub default: Option<Value>,
    /// Document type for `document` fields (`x-document`)
    pub document: Option<String>,
}

/// Extract fields from a step schema, in property declaration order
pub fn extract_fields(schema: &Value) -> Vec<FieldSpec> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let Some(props) = schema.get("properties").and_then(|p| p.as_object()) else {
        return Vec::new();
    };

    props
        .iter()
        .map(|(name, prop)| parse_field(name, prop, required.contains(&name.as_str())))
        .collect()
}

fn parse_field(name: &str, schema: &Value, required: bool) -> FieldSpec {
    let label = schema
        .get("title")
        .and_then(|t| t.as_str())
        .map(String::from)
        .unwrap_or_else(|| humanize(name));

    let options = schema
        .get("enum")
        .and_then(|e| e.as_array())
        .map(|values| {
            values
                .iter()
                .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
                .collect()
        })
        .unwrap_or_default();

    FieldSpec {
        name: name.to_string(),
        label,
        description: schema.get("description").and_then(|d| d.as_str()).map(String::from),
        tag: field_tag(schema),
        required,
        options,
        default: schema.get("default").cloned(),
        document: schema.get("x-document").and_then(|d| d.as_str()).map(String::from),
    }
}

/// Derive the dispatch tag of a schema property
pub fn field_tag(schema: &Value) -> String {
    if let Some(tag) = schema.get("x-field").and_then(|t| t.as_str()) {
        return tag.to_string();
    }
    if schema.get("enum").is_some() {
        return "choice".to_string();
    }

    let tag = match schema.get("type").and_then(|t| t.as_str()) {
        Some("string") => match schema.get("format").and_then(|f| f.as_str()) {
            Some("date") => "date",
            Some("email") => "email",
            _ => "text",
        },
        Some("integer") => "integer",
        Some("number") => "number",
        Some("boolean") => "boolean",
        Some("array") => "list",
        _ => "text",
    };
    tag.to_string()
}

/// "firstName" / "first_name" -> "First Name"
pub fn humanize(name: &str) -> String {
    let mut spaced = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c == '_' || c == '-' {
            spaced.push(' ');
        } else if c.is_uppercase() && i > 0 {
            spaced.push(' ');
            spaced.push(c);
        } else {
            spaced.push(c);
        }
    }

    spaced
        .split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => c.to_uppercase().chain(chars).collect(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A value counts as empty when it is missing, null, blank text, or an
/// empty array/object.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Parse, emptiness and display behaviour for one field tag
pub trait FieldStrategy: Send + Sync {
    /// Turn user-entered text into a field value
    fn parse(&self, spec: &FieldSpec, raw: &str) -> Result<Value, String>;

    fn is_empty(&self, value: &Value) -> bool {
        is_blank(value)
    }

    fn display(&self, value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

pub struct TextField;

impl FieldStrategy for TextField {
    fn parse(&self, _spec: &FieldSpec, raw: &str) -> Result<Value, String> {
        Ok(Value::String(raw.trim().to_string()))
    }
}

pub struct EmailField;

impl FieldStrategy for EmailField {
    fn parse(&self, _spec: &FieldSpec, raw: &str) -> Result<Value, String> {
        let email = raw.trim().to_lowercase();
        match email.split_once('@') {
            Some((user, domain)) if !user.is_empty() && domain.contains('.') => {
                Ok(Value::String(email))
            }
            _ => Err(format!("'{}' is not an email address", raw.trim())),
        }
    }
}

pub struct DateField;

impl DateField {
    const ACCEPTED: [&'static str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"];
}

impl FieldStrategy for DateField {
    fn parse(&self, _spec: &FieldSpec, raw: &str) -> Result<Value, String> {
        let raw = raw.trim();
        Self::ACCEPTED
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
            .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
            .ok_or_else(|| format!("'{}' is not a date (expected YYYY-MM-DD)", raw))
    }

    fn display(&self, value: &Value) -> String {
        match value.as_str().and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()) {
            Some(date) => date.format("%d %B %Y").to_string(),
            None => TextField.display(value),
        }
    }
}

pub struct ChoiceField;

impl FieldStrategy for ChoiceField {
    fn parse(&self, spec: &FieldSpec, raw: &str) -> Result<Value, String> {
        let raw = raw.trim();

        if let Some(option) = spec.options.iter().find(|o| o.eq_ignore_ascii_case(raw)) {
            return Ok(Value::String(option.clone()));
        }
        // 1-based position, as shown in menus
        if let Ok(index) = raw.parse::<usize>() {
            if let Some(option) = index.checked_sub(1).and_then(|i| spec.options.get(i)) {
                return Ok(Value::String(option.clone()));
            }
        }

        Err(format!(
            "'{}' is not one of: {}",
            raw,
            spec.options.join(", ")
        ))
    }

    fn display(&self, value: &Value) -> String {
        TextField.display(value).replace('_', " ")
    }
}

pub struct IntegerField;

impl FieldStrategy for IntegerField {
    fn parse(&self, _spec: &FieldSpec, raw: &str) -> Result<Value, String> {
        raw.trim()
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| format!("'{}' is not a whole number", raw.trim()))
    }
}

pub struct NumberField;

impl FieldStrategy for NumberField {
    fn parse(&self, _spec: &FieldSpec, raw: &str) -> Result<Value, String> {
        raw.trim()
            .replace(',', ".")
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("'{}' is not a number", raw.trim()))
    }
}

pub struct BooleanField;

impl FieldStrategy for BooleanField {
    fn parse(&self, _spec: &FieldSpec, raw: &str) -> Result<Value, String> {
        match raw.trim().to_lowercase().as_str() {
            "y" | "yes" | "true" | "1" | "oui" | "o" => Ok(Value::Bool(true)),
            "n" | "no" | "false" | "0" | "non" => Ok(Value::Bool(false)),
            other => Err(format!("'{}' is not yes or no", other)),
        }
    }

    // false is a real answer, not an empty field
    fn is_empty(&self, value: &Value) -> bool {
        value.is_null()
    }

    fn display(&self, value: &Value) -> String {
        match value.as_bool() {
            Some(true) => "Yes".to_string(),
            Some(false) => "No".to_string(),
            None => TextField.display(value),
        }
    }
}

pub struct ListField;

impl FieldStrategy for ListField {
    fn parse(&self, _spec: &FieldSpec, raw: &str) -> Result<Value, String> {
        Ok(Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        ))
    }

    fn display(&self, value: &Value) -> String {
        match value.as_array() {
            Some(items) => items
                .iter()
                .map(|v| TextField.display(v))
                .collect::<Vec<_>>()
                .join(", "),
            None => TextField.display(value),
        }
    }
}

/// Uploaded document reference (URL or storage key)
pub struct DocumentField;

impl FieldStrategy for DocumentField {
    fn parse(&self, spec: &FieldSpec, raw: &str) -> Result<Value, String> {
        let reference = raw.trim();
        if reference.contains(char::is_whitespace) {
            return Err(format!(
                "{} must be a single file reference without spaces",
                spec.label
            ));
        }
        Ok(Value::String(reference.to_string()))
    }

    fn display(&self, value: &Value) -> String {
        match value.as_str() {
            Some(reference) => reference
                .rsplit('/')
                .next()
                .filter(|name| !name.is_empty())
                .unwrap_or(reference)
                .to_string(),
            None => TextField.display(value),
        }
    }
}

/// Tag -> strategy table; unknown tags use the `text` strategy
#[derive(Clone)]
pub struct FieldDispatch {
    strategies: HashMap<String, Arc<dyn FieldStrategy>>,
    fallback: Arc<dyn FieldStrategy>,
}

impl FieldDispatch {
    /// Table with every built-in strategy registered
    pub fn new() -> Self {
        let mut dispatch = Self {
            strategies: HashMap::new(),
            fallback: Arc::new(TextField),
        };
        dispatch.register("text", TextField);
        dispatch.register("email", EmailField);
        dispatch.register("date", DateField);
        dispatch.register("choice", ChoiceField);
        dispatch.register("integer", IntegerField);
        dispatch.register("number", NumberField);
        dispatch.register("boolean", BooleanField);
        dispatch.register("list", ListField);
        dispatch.register("document", DocumentField);
        dispatch
    }

    /// Add or replace the strategy for a tag
    pub fn register(&mut self, tag: impl Into<String>, strategy: impl FieldStrategy + 'static) {
        self.strategies.insert(tag.into(), Arc::new(strategy));
    }

    pub fn strategy_for(&self, tag: &str) -> &dyn FieldStrategy {
        self.strategies
            .get(tag)
            .unwrap_or(&self.fallback)
            .as_ref()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.strategies.contains_key(tag)
    }

    pub fn parse(&self, spec: &FieldSpec, raw: &str) -> Result<Value, String> {
        self.strategy_for(&spec.tag).parse(spec, raw)
    }

    pub fn is_empty(&self, spec: &FieldSpec, value: &Value) -> bool {
        self.strategy_for(&spec.tag).is_empty(value)
    }

    pub fn display(&self, spec: &FieldSpec, value: &Value) -> String {
        self.strategy_for(&spec.tag).display(value)
    }
}

impl Default for FieldDispatch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FieldDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<&String> = self.strategies.keys().collect();
        tags.sort();
        f.debug_struct("FieldDispatch").field("tags", &tags).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(tag: &str) -> FieldSpec {
        FieldSpec {
            name: "field".to_string(),
            label: "Field".to_string(),
            description: None,
            tag: tag.to_string(),
            required: false,
            options: vec!["male".to_string(), "female".to_string()],
            default: None,
            document: None,
        }
    }

    #[test]
    fn test_extract_fields_keeps_declaration_order() {
        let schema = json!({
            "type": "object",
            "required": ["lastName"],
            "properties": {
                "lastName": { "type": "string" },
                "gender": { "type": "string", "enum": ["male", "female"] },
                "birthDate": { "type": "string", "format": "date", "title": "Date of birth" },
                "passport": { "type": "string", "x-field": "document", "x-document": "PASSPORT" }
            }
        });

        let fields = extract_fields(&schema);
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["lastName", "gender", "birthDate", "passport"]);

        assert!(fields[0].required);
        assert_eq!(fields[0].label, "Last Name");
        assert_eq!(fields[1].tag, "choice");
        assert_eq!(fields[1].options, ["male", "female"]);
        assert_eq!(fields[2].tag, "date");
        assert_eq!(fields[2].label, "Date of birth");
        assert_eq!(fields[3].tag, "document");
        assert_eq!(fields[3].document.as_deref(), Some("PASSPORT"));
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("firstName"), "First Name");
        assert_eq!(humanize("postal_code"), "Postal Code");
        assert_eq!(humanize("email"), "Email");
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&Value::Null));
        assert!(is_blank(&json!("  ")));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!("Jean")));
        assert!(!is_blank(&json!(false)));
        assert!(!is_blank(&json!(0)));
    }

    #[test]
    fn test_choice_accepts_case_and_index() {
        let dispatch = FieldDispatch::new();
        let spec = spec("choice");
        assert_eq!(dispatch.parse(&spec, "Female").unwrap(), json!("female"));
        assert_eq!(dispatch.parse(&spec, "1").unwrap(), json!("male"));
        assert!(dispatch.parse(&spec, "3").is_err());
        assert!(dispatch.parse(&spec, "other").is_err());
    }

    #[test]
    fn test_date_normalizes_formats() {
        let dispatch = FieldDispatch::new();
        let spec = spec("date");
        assert_eq!(dispatch.parse(&spec, "1990-04-12").unwrap(), json!("1990-04-12"));
        assert_eq!(dispatch.parse(&spec, "12/04/1990").unwrap(), json!("1990-04-12"));
        assert!(dispatch.parse(&spec, "april").is_err());
        assert_eq!(dispatch.display(&spec, &json!("1990-04-12")), "12 April 1990");
    }

    #[test]
    fn test_boolean_false_is_not_empty() {
        let dispatch = FieldDispatch::new();
        let spec = spec("boolean");
        assert_eq!(dispatch.parse(&spec, "oui").unwrap(), json!(true));
        assert_eq!(dispatch.parse(&spec, "No").unwrap(), json!(false));
        assert!(!dispatch.is_empty(&spec, &json!(false)));
        assert_eq!(dispatch.display(&spec, &json!(false)), "No");
    }

    #[test]
    fn test_list_and_document_display() {
        let dispatch = FieldDispatch::new();
        assert_eq!(
            dispatch.parse(&spec("list"), "a, b,,c").unwrap(),
            json!(["a", "b", "c"])
        );
        assert_eq!(
            dispatch.display(&spec("document"), &json!("https://files.example/u/42/passport.pdf")),
            "passport.pdf"
        );
        assert!(dispatch.parse(&spec("document"), "two words").is_err());
    }

    #[test]
    fn test_unknown_tag_falls_back_to_text() {
        let dispatch = FieldDispatch::new();
        let spec = spec("signature");
        assert!(!dispatch.has_tag("signature"));
        assert_eq!(dispatch.parse(&spec, "  J. Dupont ").unwrap(), json!("J. Dupont"));
    }

    #[test]
    fn test_register_custom_strategy() {
        struct UpperField;
        impl FieldStrategy for UpperField {
            fn parse(&self, _spec: &FieldSpec, raw: &str) -> Result<Value, String> {
                Ok(Value::String(raw.trim().to_uppercase()))
            }
        }

        let mut dispatch = FieldDispatch::new();
        dispatch.register("country", UpperField);
        assert_eq!(dispatch.parse(&spec("country"), "fr").unwrap(), json!("FR"));
    }
}
