//! `intake wizard` command - Fill a flow interactively
//!
//! Prompts for every field of the current step, then offers the moves that
//! are possible from there. The session is saved after every move, so a
//! wizard left half way can be picked up with `intake wizard --resume`.

use console::style;
use dialoguer::{theme::ColorfulTheme, Select};
use miette::{IntoDiagnostic, Result};
use std::sync::Arc;

use crate::cli::commands::utils::{print_position, store_err, wizard_error, Workspace};
use crate::cli::GlobalOpts;
use crate::core::flow::{FlowKind, RegistryError};
use crate::core::workflow::{Cursor, GotoOutcome, SessionContext, WizardError, WizardSession};
use crate::schema::template::ReviewRenderer;
use crate::schema::wizard::StepPrompter;

#[derive(clap::Args, Debug)]
pub struct WizardArgs {
    /// Flow type (adult, child, service-request)
    #[arg(required_unless_present = "resume")]
    pub flow: Option<String>,

    /// Continue the session selected by --profile (default: most recent)
    #[arg(long)]
    pub resume: bool,
}

enum StepAction {
    Continue,
    Analyze,
    Skip,
    Back,
    Quit,
}

enum ReviewAction {
    Submit,
    Edit,
    Back,
    Quit,
}

pub async fn run(args: WizardArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let mut session = if args.resume {
        ws.open_session(global)?
    } else {
        new_session(&ws, args.flow.as_deref().unwrap_or_default(), global).await?
    };
    ws.save(&session)?;

    println!(
        "{} {} wizard for {}",
        style("◆").cyan(),
        style(session.definition().name()).bold(),
        style(&session.context().profile_id).cyan()
    );

    let prompter = StepPrompter::new();
    let theme = ColorfulTheme::default();
    let renderer = ReviewRenderer::new().map_err(|e| miette::miette!("{}", e))?;

    loop {
        match session.cursor().clone() {
            Cursor::Step(key) => {
                prompter.prompt_step(&mut session)?;
                ws.save(&session)?;

                match step_menu(&theme, &session, &key)? {
                    StepAction::Continue => match session.next().await {
                        Ok(_) => {}
                        Err(WizardError::StepInvalid { errors, .. }) => {
                            println!("{} Some answers need attention:", style("✗").red());
                            for error in errors {
                                println!("  {} {}", style("•").red(), error);
                            }
                        }
                        Err(e) => report(&e),
                    },
                    StepAction::Analyze => match session.analyze(None).await {
                        Ok(merge) if merge.is_noop() => {
                            println!("{} No empty field could be filled", style("!").yellow());
                        }
                        Ok(merge) => println!(
                            "{} Filled {} field(s) from your documents",
                            style("✓").green(),
                            merge.applied.len()
                        ),
                        Err(e) => report(&e),
                    },
                    StepAction::Skip => {
                        if let Err(e) = session.skip() {
                            report(&e);
                        }
                    }
                    StepAction::Back => {
                        session.previous().map_err(wizard_error)?;
                    }
                    StepAction::Quit => break,
                }
            }
            Cursor::Review => {
                let summary = session.review();
                let text = renderer
                    .render(&summary)
                    .map_err(|e| miette::miette!("{}", e))?;
                println!();
                print!("{}", text);

                match review_menu(&theme)? {
                    ReviewAction::Submit => match session.submit().await {
                        Ok(_) => {}
                        Err(e) => report(&e),
                    },
                    ReviewAction::Edit => {
                        let sections: Vec<(String, String)> = summary
                            .sections
                            .iter()
                            .map(|s| (s.edit_target.clone(), s.title.clone()))
                            .collect();
                        let titles: Vec<&str> = sections.iter().map(|(_, t)| t.as_str()).collect();
                        let choice = Select::with_theme(&theme)
                            .with_prompt("Section to edit")
                            .items(&titles)
                            .default(0)
                            .interact()
                            .into_diagnostic()?;
                        if let GotoOutcome::Blocked { missing } =
                            session.goto(&sections[choice].0).map_err(wizard_error)?
                        {
                            println!(
                                "{} Complete {} first",
                                style("!").yellow(),
                                missing.join(", ")
                            );
                        }
                    }
                    ReviewAction::Back => {
                        session.previous().map_err(wizard_error)?;
                    }
                    ReviewAction::Quit => break,
                }
            }
            Cursor::Submitted => {
                print_position(&session);
                break;
            }
        }
        ws.save(&session)?;
    }

    ws.save(&session)?;
    if session.cursor() != &Cursor::Submitted {
        println!(
            "{} Saved. Resume with {}",
            style("✓").green(),
            style(format!(
                "intake wizard --resume --profile {}",
                session.context().profile_id
            ))
            .yellow()
        );
    }
    Ok(())
}

async fn new_session(ws: &Workspace, flow: &str, global: &GlobalOpts) -> Result<WizardSession> {
    let flow: FlowKind = flow
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

    let context = SessionContext::new(profile_id)
        .with_locale(ws.config.locale())
        .with_actor(ws.config.actor());
    WizardSession::start(definition, context, ws.ports()?)
        .await
        .map_err(wizard_error)
}

fn step_menu(theme: &ColorfulTheme, session: &WizardSession, key: &str) -> Result<StepAction> {
    let mut actions = vec![(StepAction::Continue, "Continue")];
    if !session.collected_documents().is_empty() {
        actions.push((StepAction::Analyze, "Fill empty fields from my documents"));
    }
    if session.definition().step(key).is_some_and(|s| s.is_optional) {
        actions.push((StepAction::Skip, "Skip this step"));
    }
    if session.definition().index_of(key).is_some_and(|i| i > 0) {
        actions.push((StepAction::Back, "Back"));
    }
    actions.push((StepAction::Quit, "Save and quit"));

    let labels: Vec<&str> = actions.iter().map(|(_, label)| *label).collect();
    let choice = Select::with_theme(theme)
        .with_prompt("Next")
        .items(&labels)
        .default(0)
        .interact()
        .into_diagnostic()?;
    Ok(actions.swap_remove(choice).0)
}

fn review_menu(theme: &ColorfulTheme) -> Result<ReviewAction> {
    let choice = Select::with_theme(theme)
        .with_prompt("Review")
        .items(&["Submit", "Edit a section", "Back", "Save and quit"])
        .default(0)
        .interact()
        .into_diagnostic()?;
    Ok(match choice {
        0 => ReviewAction::Submit,
        1 => ReviewAction::Edit,
        2 => ReviewAction::Back,
        _ => ReviewAction::Quit,
    })
}

fn report(err: &WizardError) {
    let hint = if err.is_retryable() { " (you can try again)" } else { "" };
    println!("{} {}{}", style("✗").red(), err, style(hint).dim());
}
