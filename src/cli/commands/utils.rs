//! Shared utilities for CLI commands

use console::style;
use miette::Result;
use std::sync::Arc;

use crate::cli::GlobalOpts;
use crate::core::analysis::UnconfiguredAnalyzer;
use crate::core::config::Config;
use crate::core::flow::StepRegistry;
use crate::core::http::HttpGateway;
use crate::core::identity::{RecordId, RecordPrefix};
use crate::core::project::Project;
use crate::core::store::{FileStore, StoreError};
use crate::core::workflow::{Cursor, SessionPorts, WizardError, WizardSession};

/// Everything a session command needs: the project, its configuration, the
/// file store and the flow registry
pub struct Workspace {
    pub project: Project,
    pub config: Config,
    pub store: FileStore,
    pub registry: StepRegistry,
}

impl Workspace {
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let project = match &global.project {
            Some(path) => Project::discover_from(path),
            None => Project::discover(),
        }
        .map_err(|e| miette::miette!("{}", e))?;

        let config = Config::load_for(Some(&project));
        let store = FileStore::new(&project);
        let registry = StepRegistry::new().map_err(|e| miette::miette!("{}", e))?;

        Ok(Self {
            project,
            config,
            store,
            registry,
        })
    }

    /// Whether the ports talk to the back-office API
    pub fn is_remote(&self) -> bool {
        self.config.api_url().is_some()
    }

    /// HTTP adapter when `api_url` is configured, local files otherwise
    pub fn ports(&self) -> Result<SessionPorts> {
        match self.config.api_url() {
            Some(url) => {
                tracing::debug!(%url, "using back-office API");
                let gateway = Arc::new(
                    HttpGateway::new(url, self.config.api_token.clone(), self.config.timeout())
                        .map_err(|e| miette::miette!("{}", e))?,
                );
                Ok(SessionPorts {
                    profiles: gateway.clone(),
                    submissions: gateway.clone(),
                    analyzer: gateway,
                })
            }
            None => {
                let store = Arc::new(self.store.clone());
                Ok(SessionPorts {
                    profiles: store.clone(),
                    submissions: store,
                    analyzer: Arc::new(UnconfiguredAnalyzer),
                })
            }
        }
    }

    /// Resolve `--profile` (full id, or a fragment of a stored session or
    /// profile id). Without it, the most recently saved session is used.
    pub fn resolve_profile(&self, partial: Option<&str>) -> Result<RecordId> {
        let Some(partial) = partial else {
            return self
                .store
                .latest_session()
                .map_err(store_err)?
                .map(|s| s.context.profile_id)
                .ok_or_else(|| {
                    miette::miette!(
                        help = "run 'intake start <flow>' to open one",
                        "No wizard session in this project"
                    )
                });
        };

        if let Ok(id) = RecordId::parse_as(partial, RecordPrefix::Prf) {
            return Ok(id);
        }

        let sessions = self.store.list_sessions().map_err(store_err)?;
        if let Some(snapshot) = sessions
            .iter()
            .rev()
            .find(|s| s.context.profile_id.to_string().contains(partial))
        {
            return Ok(snapshot.context.profile_id.clone());
        }

        self.store
            .find_profile(partial)
            .map(|record| record.id)
            .map_err(store_err)
    }

    /// Restore the session selected by `--profile`
    pub fn open_session(&self, global: &GlobalOpts) -> Result<WizardSession> {
        let id = self.resolve_profile(global.profile.as_deref())?;
        let snapshot = self.store.load_session(&id).map_err(store_err)?.ok_or_else(|| {
            miette::miette!(
                help = "run 'intake start <flow> --profile <id>' to open one",
                "No wizard session for profile {}",
                id
            )
        })?;

        let definition = self
            .registry
            .definition_named(&snapshot.flow)
            .map_err(|e| miette::miette!("{}", e))?;
        WizardSession::restore(Arc::new(definition), self.ports()?, snapshot).map_err(wizard_error)
    }

    pub fn save(&self, session: &WizardSession) -> Result<()> {
        self.store.save_session(&session.snapshot()).map_err(store_err)
    }

    /// Save the session whatever the outcome of the operation, then report
    /// the outcome
    pub fn save_after<T>(
        &self,
        session: &WizardSession,
        outcome: std::result::Result<T, WizardError>,
    ) -> Result<T> {
        self.save(session)?;
        outcome.map_err(wizard_error)
    }
}

pub fn store_err(err: StoreError) -> miette::Report {
    miette::miette!("{}", err)
}

/// Turn a session error into a diagnostic with a hint for the user
pub fn wizard_error(err: WizardError) -> miette::Report {
    match &err {
        WizardError::StepInvalid { step, errors } => {
            let details: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
            miette::miette!(
                help = "set the fields with 'intake set name=value' and run 'intake next' again",
                "Step '{}' is not valid:\n{}",
                step,
                details.join("\n")
            )
        }
        WizardError::Incomplete { .. } | WizardError::NotInReview => miette::miette!(
            help = "run 'intake status' to see which steps are left",
            "{}",
            err
        ),
        e if e.is_retryable() => {
            miette::miette!(help = "nothing was lost; the operation can be retried", "{}", e)
        }
        _ => miette::miette!("{}", err),
    }
}

/// Print where the session stands and the fields of the current step
pub fn print_position(session: &WizardSession) {
    let definition = session.definition();
    match session.cursor() {
        Cursor::Step(key) => {
            let Some(step) = session.current_step() else {
                return;
            };
            let index = definition.index_of(key).map_or(0, |i| i + 1);
            let optional = if step.is_optional { " (optional)" } else { "" };
            println!(
                "{} Step {}/{}: {}{} {}",
                style("→").blue(),
                index,
                definition.len(),
                style(&step.title).bold(),
                optional,
                style(format!("[{}]", key)).dim()
            );

            let (Some(schema), Some(form)) = (definition.schema_for(key), session.current_form()) else {
                return;
            };
            for spec in schema.fields() {
                let marker = if spec.required { "*" } else { " " };
                let value = form
                    .value(&spec.name)
                    .filter(|v| !session.dispatch().is_empty(spec, v))
                    .map(|v| session.dispatch().display(spec, v));
                match value {
                    Some(value) => println!("  {} {:<24} {}", marker, spec.name, value),
                    None => println!("  {} {:<24} {}", marker, spec.name, style("-").dim()),
                }
            }
        }
        Cursor::Review => {
            println!(
                "{} Review: every required step is complete",
                style("→").blue()
            );
            println!(
                "  Run {} then {}",
                style("intake review").yellow(),
                style("intake submit").yellow()
            );
        }
        Cursor::Submitted => match session.submission() {
            Some(ack) => println!(
                "{} Submitted as {}",
                style("✓").green(),
                style(&ack.submission_id).cyan()
            ),
            None => println!("{} Submitted", style("✓").green()),
        },
    }
}
