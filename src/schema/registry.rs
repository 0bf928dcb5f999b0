//! Registry of step schemas embedded in the binary

use rust_embed::Embed;
use std::collections::BTreeMap;

#[derive(Embed)]
#[folder = "schemas/"]
struct EmbeddedSchemas;

const SCHEMA_SUFFIX: &str = ".schema.json";

/// Raw JSON Schema documents keyed by schema name (file name without suffix)
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, String>,
}

impl SchemaRegistry {
    /// Registry holding every schema shipped with the crate
    pub fn new() -> Self {
        let mut schemas = BTreeMap::new();

        for file in EmbeddedSchemas::iter() {
            let filename = file.as_ref();
            let Some(name) = filename.strip_suffix(SCHEMA_SUFFIX) else {
                continue;
            };
            if let Some(content) = EmbeddedSchemas::get(filename) {
                if let Ok(text) = std::str::from_utf8(&content.data) {
                    schemas.insert(name.to_string(), text.to_string());
                }
            }
        }

        Self { schemas }
    }

    /// Registry with no schemas (custom definitions register their own)
    pub fn empty() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// Add or replace a schema
    pub fn insert(&mut self, name: impl Into<String>, json: impl Into<String>) {
        self.schemas.insert(name.into(), json.into());
    }

    /// Get the raw schema document for a name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.schemas.get(name).map(String::as_str)
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Schema names in lexical order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_schemas_loaded() {
        let registry = SchemaRegistry::new();
        assert!(registry.has_schema("basic-info"));
        assert!(registry.has_schema("adult-documents"));
        assert!(registry.has_schema("service-details"));
        assert!(!registry.has_schema("basic-info.schema.json"));
    }

    #[test]
    fn test_embedded_schemas_are_json() {
        let registry = SchemaRegistry::new();
        for name in registry.names() {
            let raw = registry.get(name).unwrap();
            let parsed: serde_json::Value = serde_json::from_str(raw)
                .unwrap_or_else(|e| panic!("{} is not valid JSON: {}", name, e));
            assert_eq!(parsed["type"], "object", "{} must describe an object", name);
        }
    }

    #[test]
    fn test_insert_custom_schema() {
        let mut registry = SchemaRegistry::empty();
        assert!(!registry.has_schema("custom"));
        registry.insert("custom", r#"{"type":"object"}"#);
        assert_eq!(registry.get("custom"), Some(r#"{"type":"object"}"#));
    }
}
