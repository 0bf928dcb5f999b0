//! Core module - wizard engine, ports and adapters

pub mod analysis;
pub mod config;
pub mod flow;
pub mod form;
pub mod http;
pub mod identity;
pub mod loader;
pub mod memory;
pub mod ports;
pub mod project;
pub mod review;
pub mod shared;
pub mod store;
pub mod workflow;

pub use analysis::{AnalysisBridge, AnalysisError, AnalysisResult, DocumentSet, DocumentTag, MergeReport};
pub use config::Config;
pub use flow::{FlowKind, RegistryError, StepDescriptor, StepRegistry, WizardDefinition};
pub use form::{DraftState, FormController};
pub use identity::{IdParseError, RecordId, RecordPrefix};
pub use ports::{PortError, ProfileRecord, SubmissionAck, SubmissionRequest};
pub use project::{Project, ProjectError};
pub use review::ReviewSummary;
pub use shared::SharedSession;
pub use store::{FileStore, StoreError};
pub use workflow::{
    Cursor, GotoOutcome, SessionContext, SessionPorts, SessionSnapshot, WizardError, WizardSession,
};
