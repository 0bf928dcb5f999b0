//! Integration tests for the intake CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd, with
//! the file-backed ports of a temporary project.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to get an intake command isolated from the user's configuration
fn intake(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("intake").unwrap();
    cmd.current_dir(tmp.path())
        .env("HOME", tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path().join(".config"))
        .env_remove("INTAKE_API_URL")
        .env_remove("INTAKE_API_TOKEN")
        .env_remove("INTAKE_PROFILE")
        .env_remove("RUST_LOG");
    cmd
}

/// Helper to create a test project in a temp directory
fn setup_test_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    intake(&tmp).arg("init").assert().success();
    tmp
}

/// Start a service request and return the new profile id
fn start_service_request(tmp: &TempDir) -> String {
    let output = intake(tmp)
        .args(["start", "service-request", "--quiet"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    assert!(id.starts_with("PRF-"), "unexpected start output: {id}");
    id
}

fn fill_basic_info(tmp: &TempDir) {
    intake(tmp)
        .args([
            "set",
            "firstName=Jean",
            "lastName=Dupont",
            "gender=male",
            "birthDate=12/04/1990",
            "birthPlace=Lyon",
            "birthCountry=FR",
            "nationality=FR",
        ])
        .assert()
        .success();
}

/// Drive a service request up to the review screen
fn reach_review(tmp: &TempDir) {
    fill_basic_info(tmp);
    intake(tmp).arg("next").assert().success();
    intake(tmp).args(["set", "serviceType=legalization"]).assert().success();
    intake(tmp).arg("next").assert().success();
    intake(tmp)
        .args(["set", "reason=Legalization of a diploma", "deliveryMode=pickup"])
        .assert()
        .success();
    intake(tmp).arg("next").assert().success();
    intake(tmp)
        .arg("skip")
        .assert()
        .success()
        .stdout(predicate::str::contains("Review"));
}

// ============================================================================
// Init and flows
// ============================================================================

#[test]
fn test_init_creates_project_structure() {
    let tmp = setup_test_project();
    assert!(tmp.path().join(".intake/config.yaml").exists());
    assert!(tmp.path().join(".intake/profiles").is_dir());
    assert!(tmp.path().join(".intake/sessions").is_dir());
    assert!(tmp.path().join(".intake/submissions").is_dir());
}

#[test]
fn test_init_twice_reports_existing_project() {
    let tmp = setup_test_project();
    intake(&tmp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_commands_outside_project_fail() {
    let tmp = TempDir::new().unwrap();
    intake(&tmp)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not an intake project"));
}

#[test]
fn test_flows_lists_every_flow() {
    let tmp = TempDir::new().unwrap();
    intake(&tmp)
        .arg("flows")
        .assert()
        .success()
        .stdout(predicate::str::contains("adult"))
        .stdout(predicate::str::contains("child"))
        .stdout(predicate::str::contains("service-request"));
}

#[test]
fn test_flows_shows_steps_and_dependencies() {
    let tmp = TempDir::new().unwrap();
    intake(&tmp)
        .args(["flows", "service-request"])
        .assert()
        .success()
        .stdout(predicate::str::contains("serviceDetails"))
        .stdout(predicate::str::contains("basicInfo, serviceSelection"));

    intake(&tmp)
        .args(["flows", "pet-registration"])
        .assert()
        .failure();
}

// ============================================================================
// Session commands
// ============================================================================

#[test]
fn test_start_creates_profile_and_session() {
    let tmp = setup_test_project();
    let id = start_service_request(&tmp);

    assert!(tmp.path().join(format!(".intake/profiles/{id}.yaml")).exists());
    assert!(tmp
        .path()
        .join(format!(".intake/sessions/{id}.session.yaml"))
        .exists());
}

#[test]
fn test_start_unknown_flow_fails() {
    let tmp = setup_test_project();
    intake(&tmp).args(["start", "pet"]).assert().failure();
}

#[test]
fn test_next_with_missing_fields_fails() {
    let tmp = setup_test_project();
    start_service_request(&tmp);
    intake(&tmp).args(["set", "firstName=Jean"]).assert().success();

    intake(&tmp)
        .arg("next")
        .assert()
        .failure()
        .stderr(predicate::str::contains("lastName"))
        .stderr(predicate::str::contains("is required"));
}

#[test]
fn test_set_rejects_unparsable_value() {
    let tmp = setup_test_project();
    start_service_request(&tmp);

    intake(&tmp)
        .args(["set", "birthDate=someday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("birthDate"));

    intake(&tmp)
        .args(["set", "favouriteColour=blue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a field"));
}

#[test]
fn test_next_then_back_keeps_answers() {
    let tmp = setup_test_project();
    start_service_request(&tmp);
    fill_basic_info(&tmp);

    intake(&tmp)
        .arg("next")
        .assert()
        .success()
        .stdout(predicate::str::contains("serviceSelection"));

    intake(&tmp)
        .arg("back")
        .assert()
        .success()
        .stdout(predicate::str::contains("basicInfo"))
        .stdout(predicate::str::contains("Dupont"))
        .stdout(predicate::str::contains("12 April 1990"));
}

#[test]
fn test_goto_blocked_by_dependencies() {
    let tmp = setup_test_project();
    start_service_request(&tmp);

    intake(&tmp)
        .args(["goto", "serviceDetails"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("basicInfo"));

    intake(&tmp)
        .args(["goto", "payment"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown step"));
}

#[test]
fn test_skip_requires_optional_step() {
    let tmp = setup_test_project();
    start_service_request(&tmp);

    intake(&tmp)
        .arg("skip")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not optional"));
}

#[test]
fn test_analyze_without_documents_fails() {
    let tmp = setup_test_project();
    start_service_request(&tmp);

    intake(&tmp)
        .arg("analyze")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No documents provided"));
}

#[test]
fn test_analyze_without_service_is_retryable() {
    let tmp = setup_test_project();
    start_service_request(&tmp);

    intake(&tmp)
        .args(["analyze", "--doc", "passport=https://files/p.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("document extraction failed"));

    intake(&tmp)
        .args(["analyze", "--doc", "selfie=https://files/s.jpg"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown document type"));
}

#[test]
fn test_review_and_submit() {
    let tmp = setup_test_project();
    let id = start_service_request(&tmp);
    reach_review(&tmp);

    intake(&tmp)
        .arg("review")
        .assert()
        .success()
        .stdout(predicate::str::contains("[COMPLETE] Applicant"))
        .stdout(predicate::str::contains("[SKIPPED] Supporting documents"))
        .stdout(predicate::str::contains("Last name: Dupont"))
        .stdout(predicate::str::contains("intake goto serviceDetails"))
        .stdout(predicate::str::contains("intake submit"));

    let output = intake(&tmp)
        .args(["review", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["ready"], serde_json::json!(true));
    assert_eq!(summary["profile_id"], serde_json::json!(id));
    assert_eq!(
        summary["payload"]["serviceSelection"]["serviceType"],
        serde_json::json!("legalization")
    );

    intake(&tmp)
        .arg("submit")
        .assert()
        .success()
        .stdout(predicate::str::contains("Submitted as SUB-"));

    let submissions: Vec<_> = fs::read_dir(tmp.path().join(".intake/submissions"))
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(submissions.len(), 1);

    let profile = fs::read_to_string(tmp.path().join(format!(".intake/profiles/{id}.yaml"))).unwrap();
    assert!(profile.contains("SUB-"));

    intake(&tmp)
        .arg("submit")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already been submitted"));
}

#[test]
fn test_submit_before_review_fails() {
    let tmp = setup_test_project();
    start_service_request(&tmp);

    intake(&tmp)
        .arg("submit")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not on the review screen"));
}

#[test]
fn test_status_lists_sessions() {
    let tmp = setup_test_project();
    start_service_request(&tmp);
    fill_basic_info(&tmp);
    intake(&tmp).arg("next").assert().success();

    intake(&tmp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("service-request"))
        .stdout(predicate::str::contains("1/4"))
        .stdout(predicate::str::contains("serviceSelection"));
}

#[test]
fn test_profile_selection_by_partial_id() {
    let tmp = setup_test_project();
    let first = start_service_request(&tmp);
    start_service_request(&tmp);

    // The random tail of the ULID is unique to this profile
    let fragment = &first[first.len() - 10..];
    intake(&tmp)
        .args(["--profile", fragment, "set", "firstName=Awa"])
        .assert()
        .success();

    let session = fs::read_to_string(
        tmp.path()
            .join(format!(".intake/sessions/{first}.session.yaml")),
    )
    .unwrap();
    assert!(session.contains("Awa"));
}

#[test]
fn test_cancel_removes_session() {
    let tmp = setup_test_project();
    let id = start_service_request(&tmp);

    intake(&tmp).arg("cancel").assert().success();
    assert!(!tmp
        .path()
        .join(format!(".intake/sessions/{id}.session.yaml"))
        .exists());

    intake(&tmp)
        .arg("next")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No wizard session"));
}

// ============================================================================
// Validate and completions
// ============================================================================

#[test]
fn test_validate_answer_files() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("service-selection.yaml"),
        "serviceType: consular_card\nurgent: false\n",
    )
    .unwrap();
    fs::write(
        tmp.path().join("details.yaml"),
        "reason: short\ndeliveryMode: drone\n",
    )
    .unwrap();

    intake(&tmp)
        .args(["validate", "service-selection.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("service-selection"));

    intake(&tmp)
        .args(["validate", "details.yaml", "--schema", "service-details"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Schema validation failed"));

    fs::write(
        tmp.path().join("typo.yaml"),
        "serviceType: legalization\nurgnet: true\n",
    )
    .unwrap();
    intake(&tmp)
        .args(["validate", "typo.yaml", "--schema", "service-selection"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("did you mean `urgent`?"));
}

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();
    intake(&tmp)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("intake"));
}
