//! Schema system - step schemas, field dispatch, validation and rendering

pub mod fields;
pub mod registry;
pub mod template;
pub mod validator;
pub mod wizard;

pub use fields::{FieldDispatch, FieldSpec, FieldStrategy};
pub use registry::SchemaRegistry;
pub use template::{ReviewRenderer, TemplateError};
pub use validator::{FieldError, StepSchema, ValidationError, Validator};
pub use wizard::{PromptStrategy, StepPrompter};
