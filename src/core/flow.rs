//! Step registry: the ordered wizard definition of every flow type

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::schema::registry::SchemaRegistry;
use crate::schema::validator::{SchemaError, StepSchema, Validator};

/// Wizard flow types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowKind {
    /// Registration of an adult citizen
    Adult,
    /// Registration of a minor by a parent or guardian
    Child,
    /// Request for a consular service
    ServiceRequest,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Adult => "adult",
            FlowKind::Child => "child",
            FlowKind::ServiceRequest => "service-request",
        }
    }

    pub fn all() -> &'static [FlowKind] {
        &[FlowKind::Adult, FlowKind::Child, FlowKind::ServiceRequest]
    }

    pub fn description(&self) -> &'static str {
        match self {
            FlowKind::Adult => "Consular registration of an adult",
            FlowKind::Child => "Consular registration of a minor",
            FlowKind::ServiceRequest => "Request for a consular service",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FlowKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "adult" => Ok(FlowKind::Adult),
            "child" | "minor" => Ok(FlowKind::Child),
            "service-request" | "service" => Ok(FlowKind::ServiceRequest),
            _ => Err(RegistryError::UnknownFlow(s.to_string())),
        }
    }
}

/// Errors raised while building or looking up wizard definitions.
/// All of them are programming errors: the flow cannot be rendered.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown flow type '{0}' (valid: adult, child, service-request)")]
    UnknownFlow(String),

    #[error("wizard definition '{0}' has no steps")]
    Empty(String),

    #[error("step key '{0}' is declared more than once")]
    DuplicateKey(String),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("step '{step}' depends on '{dependency}', which does not come before it")]
    ForwardDependency { step: String, dependency: String },

    #[error("step '{step}' depends on optional step '{dependency}'")]
    OptionalDependency { step: String, dependency: String },

    #[error("step '{step}' uses schema '{schema}', which is not registered")]
    UnknownSchema { step: String, schema: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// One step of a wizard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescriptor {
    /// Stable key, unique within a definition
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub is_optional: bool,
    /// Schema name in the schema registry
    pub schema: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl StepDescriptor {
    pub fn new(key: impl Into<String>, title: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            is_optional: false,
            schema: schema.into(),
            depends_on: Vec::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    pub fn depends_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// Ordered, immutable list of steps with their compiled schemas
#[derive(Debug, Clone)]
pub struct WizardDefinition {
    name: String,
    flow: Option<FlowKind>,
    steps: Vec<StepDescriptor>,
    schemas: HashMap<String, Arc<StepSchema>>,
}

impl WizardDefinition {
    pub fn builder(name: impl Into<String>) -> WizardDefinitionBuilder {
        WizardDefinitionBuilder {
            name: name.into(),
            flow: None,
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flow type for built-in definitions
    pub fn flow(&self) -> Option<FlowKind> {
        self.flow
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn first(&self) -> &StepDescriptor {
        // build() rejects empty definitions
        &self.steps[0]
    }

    pub fn step(&self, key: &str) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.key == key)
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index_of(key).is_some()
    }

    /// Compiled schema of a step
    pub fn schema_for(&self, key: &str) -> Option<Arc<StepSchema>> {
        self.schemas.get(key).cloned()
    }

    /// Steps whose schema declares a field, in definition order
    pub fn steps_with_field(&self, field: &str) -> Vec<&StepDescriptor> {
        self.steps
            .iter()
            .filter(|s| self.schemas.get(&s.key).is_some_and(|schema| schema.has_field(field)))
            .collect()
    }
}

pub struct WizardDefinitionBuilder {
    name: String,
    flow: Option<FlowKind>,
    steps: Vec<StepDescriptor>,
}

impl WizardDefinitionBuilder {
    pub fn flow(mut self, flow: FlowKind) -> Self {
        self.flow = Some(flow);
        self
    }

    pub fn step(mut self, step: StepDescriptor) -> Self {
        self.steps.push(step);
        self
    }

    /// Check the definition invariants and resolve every schema
    pub fn build(self, validator: &Validator) -> Result<WizardDefinition, RegistryError> {
        if self.steps.is_empty() {
            return Err(RegistryError::Empty(self.name));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut schemas = HashMap::new();

        for step in &self.steps {
            if !seen.insert(step.key.as_str()) {
                return Err(RegistryError::DuplicateKey(step.key.clone()));
            }

            for dependency in &step.depends_on {
                let Some(target) = self.steps.iter().find(|s| &s.key == dependency) else {
                    return Err(RegistryError::UnknownDependency {
                        step: step.key.clone(),
                        dependency: dependency.clone(),
                    });
                };
                // Dependencies must already have been declared
                if !seen.contains(dependency.as_str()) || dependency == &step.key {
                    return Err(RegistryError::ForwardDependency {
                        step: step.key.clone(),
                        dependency: dependency.clone(),
                    });
                }
                // Keeps the first incomplete required step reachable
                if target.is_optional {
                    return Err(RegistryError::OptionalDependency {
                        step: step.key.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }

            let schema = validator
                .get(&step.schema)
                .ok_or_else(|| RegistryError::UnknownSchema {
                    step: step.key.clone(),
                    schema: step.schema.clone(),
                })?;
            schemas.insert(step.key.clone(), schema);
        }

        Ok(WizardDefinition {
            name: self.name,
            flow: self.flow,
            steps: self.steps,
            schemas,
        })
    }
}

/// Canonical definitions of the built-in flows
pub struct StepRegistry {
    validator: Arc<Validator>,
}

impl StepRegistry {
    /// Registry over the schemas embedded in the crate
    pub fn new() -> Result<Self, RegistryError> {
        let validator = Validator::new(&SchemaRegistry::default())?;
        Ok(Self::with_validator(Arc::new(validator)))
    }

    pub fn with_validator(validator: Arc<Validator>) -> Self {
        Self { validator }
    }

    pub fn validator(&self) -> &Arc<Validator> {
        &self.validator
    }

    /// Ordered definition of a flow type
    pub fn definition(&self, flow: FlowKind) -> Result<WizardDefinition, RegistryError> {
        let builder = WizardDefinition::builder(flow.as_str()).flow(flow);

        let builder = match flow {
            FlowKind::Adult => builder
                .step(StepDescriptor::new("documents", "Identity documents", "adult-documents"))
                .step(StepDescriptor::new("basicInfo", "Basic information", "basic-info"))
                .step(StepDescriptor::new("familyInfo", "Family situation", "family-info"))
                .step(StepDescriptor::new("contactInfo", "Contact details", "contact-info"))
                .step(
                    StepDescriptor::new("professionalInfo", "Professional situation", "professional-info")
                        .optional(),
                ),
            FlowKind::Child => builder
                .step(StepDescriptor::new("documents", "Identity documents", "child-documents"))
                .step(StepDescriptor::new("basicInfo", "Child's information", "basic-info"))
                .step(
                    StepDescriptor::new("parentalAuthority", "Parental authority", "parental-authority")
                        .depends_on(["basicInfo"]),
                )
                .step(StepDescriptor::new("contactInfo", "Contact details", "contact-info").optional()),
            FlowKind::ServiceRequest => builder
                .step(StepDescriptor::new("basicInfo", "Applicant", "basic-info"))
                .step(StepDescriptor::new("serviceSelection", "Service", "service-selection"))
                .step(
                    StepDescriptor::new("serviceDetails", "Request details", "service-details")
                        .depends_on(["basicInfo", "serviceSelection"]),
                )
                .step(
                    StepDescriptor::new("supportingDocuments", "Supporting documents", "supporting-documents")
                        .optional(),
                ),
        };

        builder.build(&self.validator)
    }

    /// Look up a definition by flow name
    pub fn definition_named(&self, name: &str) -> Result<WizardDefinition, RegistryError> {
        self.definition(name.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> Validator {
        Validator::new(&SchemaRegistry::default()).unwrap()
    }

    #[test]
    fn test_flow_kind_parsing() {
        assert_eq!("adult".parse::<FlowKind>().unwrap(), FlowKind::Adult);
        assert_eq!("Service_Request".parse::<FlowKind>().unwrap(), FlowKind::ServiceRequest);
        assert_eq!("service".parse::<FlowKind>().unwrap(), FlowKind::ServiceRequest);
        assert!(matches!(
            "pet".parse::<FlowKind>(),
            Err(RegistryError::UnknownFlow(_))
        ));
    }

    #[test]
    fn test_builtin_definitions_build() {
        let registry = StepRegistry::new().unwrap();
        for flow in FlowKind::all() {
            let definition = registry.definition(*flow).unwrap();
            assert_eq!(definition.flow(), Some(*flow));
            assert!(!definition.is_empty());
            for step in definition.steps() {
                assert!(definition.schema_for(&step.key).is_some());
            }
        }
    }

    #[test]
    fn test_adult_step_order() {
        let definition = StepRegistry::new().unwrap().definition(FlowKind::Adult).unwrap();
        let keys: Vec<&str> = definition.steps().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(
            keys,
            ["documents", "basicInfo", "familyInfo", "contactInfo", "professionalInfo"]
        );
        assert!(definition.step("professionalInfo").unwrap().is_optional);
        assert_eq!(definition.first().key, "documents");
    }

    #[test]
    fn test_definition_named_unknown_flow() {
        let registry = StepRegistry::new().unwrap();
        assert!(matches!(
            registry.definition_named("embassy-party"),
            Err(RegistryError::UnknownFlow(_))
        ));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let result = WizardDefinition::builder("dup")
            .step(StepDescriptor::new("basicInfo", "A", "basic-info"))
            .step(StepDescriptor::new("basicInfo", "B", "basic-info"))
            .build(&validator());
        assert!(matches!(result, Err(RegistryError::DuplicateKey(k)) if k == "basicInfo"));
    }

    #[test]
    fn test_forward_dependency_rejected() {
        let result = WizardDefinition::builder("fwd")
            .step(StepDescriptor::new("a", "A", "basic-info").depends_on(["b"]))
            .step(StepDescriptor::new("b", "B", "contact-info"))
            .build(&validator());
        assert!(matches!(result, Err(RegistryError::ForwardDependency { .. })));
    }

    #[test]
    fn test_self_and_unknown_dependency_rejected() {
        let result = WizardDefinition::builder("self")
            .step(StepDescriptor::new("a", "A", "basic-info").depends_on(["a"]))
            .build(&validator());
        assert!(matches!(result, Err(RegistryError::ForwardDependency { .. })));

        let result = WizardDefinition::builder("unknown")
            .step(StepDescriptor::new("a", "A", "basic-info").depends_on(["ghost"]))
            .build(&validator());
        assert!(matches!(result, Err(RegistryError::UnknownDependency { .. })));
    }

    #[test]
    fn test_optional_dependency_rejected() {
        let result = WizardDefinition::builder("opt")
            .step(StepDescriptor::new("a", "A", "basic-info").optional())
            .step(StepDescriptor::new("b", "B", "contact-info").depends_on(["a"]))
            .build(&validator());
        assert!(matches!(result, Err(RegistryError::OptionalDependency { .. })));
    }

    #[test]
    fn test_unknown_schema_and_empty_rejected() {
        let result = WizardDefinition::builder("schema")
            .step(StepDescriptor::new("a", "A", "no-such-schema"))
            .build(&validator());
        assert!(matches!(result, Err(RegistryError::UnknownSchema { .. })));

        let result = WizardDefinition::builder("empty").build(&validator());
        assert!(matches!(result, Err(RegistryError::Empty(_))));
    }

    #[test]
    fn test_steps_with_field() {
        let definition = StepRegistry::new().unwrap().definition(FlowKind::Adult).unwrap();
        let keys: Vec<&str> = definition
            .steps_with_field("firstName")
            .iter()
            .map(|s| s.key.as_str())
            .collect();
        assert_eq!(keys, ["basicInfo"]);

        let keys: Vec<&str> = definition
            .steps_with_field("passport")
            .iter()
            .map(|s| s.key.as_str())
            .collect();
        assert_eq!(keys, ["documents"]);
    }
}
