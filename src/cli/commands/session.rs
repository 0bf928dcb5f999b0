//! Single-step session commands: `intake start`, `set`, `next`, `back`,
//! `goto`, `skip`, `analyze`, `review`, `submit` and `cancel`
//!
//! Each command restores the session of the selected profile, runs one
//! operation and saves the session again, so a wizard can be driven one
//! shell command at a time.

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::commands::utils::{print_position, store_err, wizard_error, Workspace};
use crate::cli::helpers::{split_assignment, to_json, to_yaml};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::analysis::{DocumentSet, DocumentTag, MergeReport};
use crate::core::flow::{FlowKind, RegistryError};
use crate::core::workflow::{Cursor, GotoOutcome, SessionContext, WizardSession};
use crate::schema::template::ReviewRenderer;

#[derive(clap::Args, Debug)]
pub struct StartArgs {
    /// Flow type (adult, child, service-request)
    pub flow: String,

    /// Discard an existing session of the profile and start over
    #[arg(long)]
    pub restart: bool,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Field assignments, e.g. firstName=Jean birthDate=1990-04-12
    #[arg(required = true, value_name = "NAME=VALUE")]
    pub assignments: Vec<String>,

    /// Read values as JSON instead of field text
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct GotoArgs {
    /// Step key (see 'intake flows <flow>')
    pub step: String,
}

#[derive(clap::Args, Debug)]
pub struct AnalyzeArgs {
    /// Document to analyze, e.g. --doc passport=https://files/p.pdf
    /// (default: the documents referenced by the drafts)
    #[arg(long = "doc", value_name = "TYPE=REF")]
    pub documents: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct ReviewArgs {
    /// Render with a custom Tera template instead of the built-in one
    #[arg(long)]
    pub template: Option<PathBuf>,
}

pub async fn start(args: StartArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let flow: FlowKind = args
        .flow
        .parse()
        .map_err(|e: RegistryError| miette::miette!("{}", e))?;
    let definition = Arc::new(
        ws.registry
            .definition(flow)
            .map_err(|e| miette::miette!("{}", e))?,
    );

    let profile_id = match global.profile.as_deref() {
        Some(partial) => ws.resolve_profile(Some(partial))?,
        None if ws.is_remote() => {
            return Err(miette::miette!(
                help = "pass the back-office profile id with --profile",
                "A profile is required when api_url is configured"
            ));
        }
        None => ws.store.create_profile(Some(flow)).map_err(store_err)?.id,
    };

    if !args.restart {
        if let Some(snapshot) = ws.store.load_session(&profile_id).map_err(store_err)? {
            if snapshot.flow == definition.name() && snapshot.cursor != Cursor::Submitted {
                let session = WizardSession::restore(Arc::clone(&definition), ws.ports()?, snapshot)
                    .map_err(wizard_error)?;
                ws.save(&session)?;
                if !global.quiet {
                    println!(
                        "{} Resumed {} session for {}",
                        style("✓").green(),
                        style(flow).cyan(),
                        style(&profile_id).cyan()
                    );
                    print_position(&session);
                }
                return Ok(());
            }
        }
    }

    let context = SessionContext::new(profile_id.clone())
        .with_locale(ws.config.locale())
        .with_actor(ws.config.actor());
    let session = WizardSession::start(definition, context, ws.ports()?)
        .await
        .map_err(wizard_error)?;
    ws.save(&session)?;

    if global.quiet {
        println!("{}", profile_id);
    } else {
        println!(
            "{} Started {} session for {}",
            style("✓").green(),
            style(flow).cyan(),
            style(&profile_id).cyan()
        );
        print_position(&session);
    }
    Ok(())
}

pub fn set(args: SetArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let mut session = ws.open_session(global)?;

    let mut outcome = Ok(());
    for assignment in &args.assignments {
        let Some((name, raw)) = split_assignment(assignment) else {
            return Err(miette::miette!(
                "Invalid assignment '{}': expected NAME=VALUE",
                assignment
            ));
        };

        let result = if args.json {
            let value = serde_json::from_str(raw)
                .map_err(|e| miette::miette!("Invalid JSON for {}: {}", name, e))?;
            session.set_field(name, value)
        } else {
            session.set_raw(name, raw)
        };

        if let Err(e) = result {
            outcome = Err(e);
            break;
        }
    }

    ws.save_after(&session, outcome)?;
    if !global.quiet {
        print_position(&session);
    }
    Ok(())
}

pub async fn next(global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let mut session = ws.open_session(global)?;

    let outcome = session.next().await;
    ws.save_after(&session, outcome)?;
    if !global.quiet {
        print_position(&session);
    }
    Ok(())
}

pub fn back(global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let mut session = ws.open_session(global)?;

    let outcome = session.previous();
    ws.save_after(&session, outcome)?;
    if !global.quiet {
        print_position(&session);
    }
    Ok(())
}

pub fn goto(args: GotoArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let mut session = ws.open_session(global)?;

    let outcome = session.goto(&args.step);
    match ws.save_after(&session, outcome)? {
        GotoOutcome::Moved => {
            if !global.quiet {
                print_position(&session);
            }
            Ok(())
        }
        GotoOutcome::Blocked { missing } => Err(miette::miette!(
            help = "complete those steps first",
            "Step '{}' depends on incomplete steps: {}",
            args.step,
            missing.join(", ")
        )),
    }
}

pub fn skip(global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let mut session = ws.open_session(global)?;

    let outcome = session.skip();
    ws.save_after(&session, outcome)?;
    if !global.quiet {
        print_position(&session);
    }
    Ok(())
}

pub async fn analyze(args: AnalyzeArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let mut session = ws.open_session(global)?;

    let documents = parse_documents(&args.documents)?;
    let outcome = session.analyze(documents).await;
    let report = ws.save_after(&session, outcome)?;

    match global.format {
        OutputFormat::Json => println!("{}", to_json(&report)?),
        OutputFormat::Yaml => print!("{}", to_yaml(&report)?),
        _ => print_merge_report(&report),
    }
    Ok(())
}

fn parse_documents(args: &[String]) -> Result<Option<DocumentSet>> {
    if args.is_empty() {
        return Ok(None);
    }

    let mut documents = DocumentSet::new();
    for arg in args {
        let Some((tag, reference)) = split_assignment(arg) else {
            return Err(miette::miette!("Invalid document '{}': expected TYPE=REF", arg));
        };
        let tag: DocumentTag = tag.parse().map_err(|e: String| {
            miette::miette!(
                help = format!(
                    "known types: {}",
                    DocumentTag::all().iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
                ),
                "{}",
                e
            )
        })?;
        documents.insert(tag, reference.to_string());
    }
    Ok(Some(documents))
}

fn print_merge_report(report: &MergeReport) {
    if report.is_noop() {
        println!("{} No empty field could be filled", style("!").yellow());
    } else {
        println!(
            "{} Filled {} field(s)",
            style("✓").green(),
            report.applied.len()
        );
        for entry in &report.applied {
            println!("  {} {}", style("+").green(), entry);
        }
    }
    for entry in &report.skipped_dirty {
        println!("  {} {} {}", style("=").dim(), entry, style("(kept your value)").dim());
    }
    for entry in &report.skipped_filled {
        println!("  {} {} {}", style("=").dim(), entry, style("(already filled)").dim());
    }
    if !report.unrouted.is_empty() {
        println!(
            "  {} not used: {}",
            style("?").yellow(),
            report.unrouted.join(", ")
        );
    }
}

pub fn review(args: ReviewArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let session = ws.open_session(global)?;
    let summary = session.review();

    match global.format {
        OutputFormat::Json => println!("{}", to_json(&summary)?),
        OutputFormat::Yaml => print!("{}", to_yaml(&summary)?),
        _ => {
            let renderer = match &args.template {
                Some(path) => {
                    let source = std::fs::read_to_string(path).into_diagnostic()?;
                    ReviewRenderer::with_template(&source)
                }
                None => ReviewRenderer::new(),
            }
            .map_err(|e| miette::miette!("{}", e))?;
            let text = renderer
                .render(&summary)
                .map_err(|e| miette::miette!("{}", e))?;
            print!("{}", text);
        }
    }
    Ok(())
}

pub async fn submit(global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let mut session = ws.open_session(global)?;

    let outcome = session.submit().await;
    let ack = ws.save_after(&session, outcome)?;

    match global.format {
        OutputFormat::Json => println!("{}", to_json(&ack)?),
        OutputFormat::Yaml => print!("{}", to_yaml(&ack)?),
        _ if global.quiet => println!("{}", ack.submission_id),
        _ => {
            if ack.duplicate {
                println!(
                    "{} Already submitted as {}",
                    style("!").yellow(),
                    style(&ack.submission_id).cyan()
                );
            } else {
                println!(
                    "{} Submitted as {}",
                    style("✓").green(),
                    style(&ack.submission_id).cyan()
                );
            }
        }
    }
    Ok(())
}

pub fn cancel(global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let mut session = ws.open_session(global)?;

    session.cancel().map_err(wizard_error)?;
    let profile_id = session.context().profile_id.clone();
    ws.store.clear_session(&profile_id).map_err(store_err)?;

    if !global.quiet {
        println!(
            "{} Discarded the session of {}",
            style("✓").green(),
            style(&profile_id).cyan()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_documents() {
        assert!(parse_documents(&[]).unwrap().is_none());

        let docs = parse_documents(&[
            "passport=https://files/p.pdf".to_string(),
            "birth-certificate=file:///b.pdf".to_string(),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[&DocumentTag::Passport], "https://files/p.pdf");

        assert!(parse_documents(&["selfie=x".to_string()]).is_err());
        assert!(parse_documents(&["passport".to_string()]).is_err());
    }
}
