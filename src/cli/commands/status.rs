//! `intake status` command - Sessions and submissions of the project

use console::style;
use miette::Result;
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};

use crate::cli::commands::utils::{store_err, Workspace};
use crate::cli::helpers::{format_short_id_str, to_json, to_yaml, truncate_str};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::workflow::SessionSnapshot;

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    /// Also list recorded submissions
    #[arg(long)]
    pub submissions: bool,
}

#[derive(Serialize)]
struct SessionRow {
    profile: String,
    flow: String,
    position: String,
    completed: usize,
    steps: usize,
    missing: Vec<String>,
    saved: String,
}

#[derive(Serialize)]
struct SubmissionRow {
    submission: String,
    profile: String,
    flow: String,
    received: String,
}

pub fn run(args: StatusArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;

    let sessions: Vec<SessionRow> = ws
        .store
        .list_sessions()
        .map_err(store_err)?
        .iter()
        .map(|snapshot| session_row(&ws, snapshot))
        .collect();

    let submissions: Vec<SubmissionRow> = ws
        .store
        .list_submissions()
        .map_err(store_err)?
        .into_iter()
        .map(|s| SubmissionRow {
            submission: s.id.to_string(),
            profile: s.profile_id.to_string(),
            flow: s.flow,
            received: s.received.format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();

    match global.format {
        OutputFormat::Json => {
            let status = serde_json::json!({"sessions": sessions, "submissions": submissions});
            println!("{}", to_json(&status)?);
        }
        OutputFormat::Yaml => {
            let status = serde_json::json!({"sessions": sessions, "submissions": submissions});
            print!("{}", to_yaml(&status)?);
        }
        _ => {
            if sessions.is_empty() {
                println!("{} No wizard session", style("!").yellow());
            } else {
                let mut builder = Builder::default();
                builder.push_record(["Profile", "Flow", "Position", "Done", "Missing", "Saved"]);
                for row in &sessions {
                    builder.push_record([
                        format_short_id_str(&row.profile),
                        row.flow.clone(),
                        row.position.clone(),
                        format!("{}/{}", row.completed, row.steps),
                        truncate_str(&row.missing.join(", "), 40),
                        row.saved.clone(),
                    ]);
                }
                println!("{}", builder.build().with(Style::markdown()).to_string());
            }

            if args.submissions && !submissions.is_empty() {
                println!();
                let mut builder = Builder::default();
                builder.push_record(["Submission", "Profile", "Flow", "Received"]);
                for row in &submissions {
                    builder.push_record([
                        row.submission.clone(),
                        row.profile.clone(),
                        row.flow.clone(),
                        row.received.clone(),
                    ]);
                }
                println!("{}", builder.build().with(Style::markdown()).to_string());
            }

            if !global.quiet {
                println!();
                println!(
                    "{} session(s), {} submission(s)",
                    style(sessions.len()).cyan(),
                    style(submissions.len()).cyan()
                );
            }
        }
    }
    Ok(())
}

fn session_row(ws: &Workspace, snapshot: &SessionSnapshot) -> SessionRow {
    let definition = ws.registry.definition_named(&snapshot.flow).ok();
    let steps = definition.as_ref().map_or(0, |d| d.len());
    let missing = definition
        .map(|d| {
            d.steps()
                .iter()
                .filter(|s| !s.is_optional && !snapshot.completed.contains(&s.key))
                .map(|s| s.key.clone())
                .collect()
        })
        .unwrap_or_default();

    SessionRow {
        profile: snapshot.context.profile_id.to_string(),
        flow: snapshot.flow.clone(),
        position: snapshot.cursor.to_string(),
        completed: snapshot.completed.len(),
        steps,
        missing,
        saved: snapshot.saved.format("%Y-%m-%d %H:%M").to_string(),
    }
}
