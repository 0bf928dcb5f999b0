//! `intake validate` command - Validate answer files against step schemas

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

use crate::core::flow::StepRegistry;
use crate::schema::validator::Validator;
use crate::yaml::parse_answers;

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Answer files (YAML or JSON) mapping field names to values
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Schema to validate against (default: the file name, e.g. basic-info.yaml)
    #[arg(long, short = 's')]
    pub schema: Option<String>,

    /// Continue validation after first error
    #[arg(long)]
    pub keep_going: bool,
}

pub fn run(args: ValidateArgs) -> Result<()> {
    let registry = StepRegistry::new().map_err(|e| miette::miette!("{}", e))?;
    let validator = registry.validator();

    let mut passed = 0usize;
    let mut failed = 0usize;

    for path in &args.files {
        let schema = match &args.schema {
            Some(name) => name.clone(),
            None => schema_from_path(path).ok_or_else(|| {
                miette::miette!(
                    help = "pass --schema, e.g. --schema basic-info",
                    "Cannot tell which schema {} answers",
                    path.display()
                )
            })?,
        };

        let outcome = validate_file(validator, &schema, path);
        match outcome {
            Ok(()) => {
                passed += 1;
                println!(
                    "{} {} {}",
                    style("✓").green(),
                    path.display(),
                    style(format!("({})", schema)).dim()
                );
            }
            Err(report) => {
                failed += 1;
                println!("{} {}", style("✗").red(), path.display());
                if args.files.len() == 1 {
                    return Err(report);
                }
                eprintln!("{:?}", report);
                if !args.keep_going {
                    break;
                }
            }
        }
    }

    if failed > 0 {
        return Err(miette::miette!(
            "{} file(s) failed validation, {} passed",
            failed,
            passed
        ));
    }
    Ok(())
}

fn validate_file(validator: &Validator, schema: &str, path: &Path) -> Result<()> {
    let step = validator.schema(schema).map_err(|e| miette::miette!("{}", e))?;
    let content = std::fs::read_to_string(path).into_diagnostic()?;
    let filename = path.display().to_string();
    let value = parse_answers(&content, &filename, &step)?;
    validator.validate_document(schema, &value, &content, &filename)?;
    Ok(())
}

/// `basic-info.yaml` and `basic-info.answers.json` both answer `basic-info`
fn schema_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.split('.').next()?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_schema_from_path() {
        assert_eq!(schema_from_path(Path::new("a/basic-info.yaml")).as_deref(), Some("basic-info"));
        assert_eq!(
            schema_from_path(Path::new("contact-info.answers.json")).as_deref(),
            Some("contact-info")
        );
        assert_eq!(schema_from_path(Path::new(".yaml")), None);
    }

    #[test]
    fn test_validate_file_reports_violations() {
        let registry = StepRegistry::new().unwrap();
        let dir = tempdir().unwrap();

        let good = dir.path().join("service-selection.yaml");
        fs::write(&good, "serviceType: legalization\nurgent: true\n").unwrap();
        assert!(validate_file(registry.validator(), "service-selection", &good).is_ok());

        let bad = dir.path().join("bad.yaml");
        fs::write(&bad, "serviceType: teleportation\n").unwrap();
        assert!(validate_file(registry.validator(), "service-selection", &bad).is_err());

        let broken = dir.path().join("broken.yaml");
        fs::write(&broken, "serviceType: [legalization\n").unwrap();
        assert!(validate_file(registry.validator(), "service-selection", &broken).is_err());

        let stray = dir.path().join("stray.yaml");
        fs::write(&stray, "serviceType: legalization\nurgnet: true\n").unwrap();
        let report = validate_file(registry.validator(), "service-selection", &stray).unwrap_err();
        assert!(report.to_string().contains("'urgnet' is not a field of this step"));
        assert!(validate_file(registry.validator(), "no-such-step", &good).is_err());
    }
}
