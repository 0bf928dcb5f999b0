//! `intake flows` command - List flow types and their steps

use console::style;
use miette::Result;
use serde_json::json;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{to_json, to_yaml};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::flow::{FlowKind, RegistryError, StepRegistry, WizardDefinition};

#[derive(clap::Args, Debug)]
pub struct FlowsArgs {
    /// Show the steps of one flow (adult, child, service-request)
    pub flow: Option<String>,
}

pub fn run(args: FlowsArgs, global: &GlobalOpts) -> Result<()> {
    let registry = StepRegistry::new().map_err(|e| miette::miette!("{}", e))?;

    match args.flow {
        Some(name) => {
            let flow: FlowKind = name
                .parse()
                .map_err(|e: RegistryError| miette::miette!("{}", e))?;
            let definition = registry
                .definition(flow)
                .map_err(|e| miette::miette!("{}", e))?;
            show_flow(&definition, global)
        }
        None => list_flows(&registry, global),
    }
}

fn list_flows(registry: &StepRegistry, global: &GlobalOpts) -> Result<()> {
    let mut rows = Vec::new();
    for flow in FlowKind::all() {
        let definition = registry
            .definition(*flow)
            .map_err(|e| miette::miette!("{}", e))?;
        rows.push((*flow, definition.len()));
    }

    match global.format {
        OutputFormat::Json | OutputFormat::Yaml => {
            let value: Vec<_> = rows
                .iter()
                .map(|(flow, steps)| {
                    json!({"flow": flow.as_str(), "description": flow.description(), "steps": steps})
                })
                .collect();
            if global.format == OutputFormat::Json {
                println!("{}", to_json(&value)?);
            } else {
                print!("{}", to_yaml(&value)?);
            }
        }
        _ => {
            let mut builder = Builder::default();
            builder.push_record(["Flow", "Steps", "Description"]);
            for (flow, steps) in &rows {
                builder.push_record([flow.as_str().to_string(), steps.to_string(), flow.description().to_string()]);
            }
            println!("{}", builder.build().with(Style::markdown()).to_string());
        }
    }
    Ok(())
}

fn show_flow(definition: &WizardDefinition, global: &GlobalOpts) -> Result<()> {
    match global.format {
        OutputFormat::Json => println!("{}", to_json(&definition.steps())?),
        OutputFormat::Yaml => print!("{}", to_yaml(&definition.steps())?),
        _ => {
            if !global.quiet {
                println!("{}", style(definition.name()).bold());
                println!();
            }
            let mut builder = Builder::default();
            builder.push_record(["#", "Step", "Title", "Optional", "Depends on", "Fields"]);
            for (i, step) in definition.steps().iter().enumerate() {
                let fields = definition
                    .schema_for(&step.key)
                    .map(|schema| schema.fields().len())
                    .unwrap_or(0);
                builder.push_record([
                    (i + 1).to_string(),
                    step.key.clone(),
                    step.title.clone(),
                    if step.is_optional { "yes" } else { "" }.to_string(),
                    step.depends_on.join(", "),
                    fields.to_string(),
                ]);
            }
            println!("{}", builder.build().with(Style::markdown()).to_string());
        }
    }
    Ok(())
}
