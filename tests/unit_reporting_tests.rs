//! # Reporting Unit Tests / 报告单元测试
//!
//! Verdict tallies, the HTML report and `results.json`.
//!
//! 判定统计、HTML 报告以及 `results.json`。

mod common;

use std::time::Duration;
use tempfile::tempdir;

use common::ubuntu_x86;
use kernel_test_runner::core::config::CaseEntry;
use kernel_test_runner::core::models::{Phase, TestResult, Verdict};
use kernel_test_runner::reporting::console::{Tally, get_error_output_from_result};
use kernel_test_runner::reporting::html::{escape_html, render_html_report};
use kernel_test_runner::reporting::json::write_json_report;

fn finished(name: &str, verdict: Verdict, reason: Option<&str>) -> TestResult {
    TestResult {
        name: name.to_string(),
        kind: "script".to_string(),
        verdict,
        reason: reason.map(str::to_string),
        output: format!("$ run {}\n[exit status 0]\n", name),
        duration: Duration::from_millis(1500),
        teardown_error: None,
        phases: vec![
            Phase::NotStarted,
            Phase::Setup,
            Phase::Running,
            Phase::Evaluated,
            Phase::Finished,
            Phase::TornDown,
        ],
        failure_allowed: false,
    }
}

fn mixed_results() -> Vec<TestResult> {
    let mut allowed = finished("smt", Verdict::Fail, Some("degraded"));
    allowed.failure_allowed = true;
    vec![
        finished("netstat", Verdict::Pass, None),
        finished("hugepages", Verdict::Fail, Some("expected 10 pages, found 4")),
        allowed,
        finished("soft-dirty", Verdict::Cancel, Some("gcc is needed")),
        TestResult::not_run(
            &CaseEntry::new("imc", "imc_nonzero"),
            Verdict::Skip,
            "not supported on x86_64",
        ),
        finished("fuzz", Verdict::Error, Some("mirror unreachable")),
        finished("slow", Verdict::Interrupted, Some("timed out after 600s")),
    ]
}

#[test]
fn test_tally_counts_allowed_failures_separately() {
    let tally = Tally::of(&mixed_results());

    assert_eq!(
        tally,
        Tally {
            total: 7,
            passed: 1,
            failed: 1,
            cancelled: 1,
            skipped: 1,
            errors: 1,
            interrupted: 1,
            allowed_failures: 1,
        }
    );
}

#[test]
fn test_unexpected_and_allowed_failures() {
    let results = mixed_results();
    let unexpected: Vec<_> = results
        .iter()
        .filter(|r| r.is_unexpected_failure())
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(unexpected, vec!["hugepages", "fuzz", "slow"]);
    assert!(results[2].is_allowed_failure());
    assert_eq!(results[2].get_status_class(), "status-Allowed-Failure");
    assert_eq!(results[2].get_status_str("en"), "Allowed Failure");
}

#[test]
fn test_cases_that_never_ran_have_no_duration() {
    let results = mixed_results();
    assert_eq!(results[4].get_duration(), None);
    assert_eq!(results[0].get_duration(), Some(Duration::from_millis(1500)));
    assert_eq!(
        results[4].to_string(),
        "imc [SKIP]: not supported on x86_64"
    );
}

#[test]
fn test_error_output_falls_back_to_placeholder() {
    let results = mixed_results();
    assert!(get_error_output_from_result(&results[0], "en").contains("$ run netstat"));
    assert!(!get_error_output_from_result(&results[4], "en").is_empty());
}

#[test]
fn test_html_report_escapes_names_and_reasons() {
    let mut results = mixed_results();
    results[0].name = "<script>alert(1)</script>".to_string();
    results[1].reason = Some("a & b".to_string());
    results[1].teardown_error = Some("sysctl \"restore\" failed".to_string());

    let html = render_html_report(&results, &ubuntu_x86(), "en");

    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    assert!(!html.contains("<script>alert(1)</script>"));
    assert!(html.contains("a &amp; b"));
    assert!(html.contains("sysctl &quot;restore&quot; failed"));
    assert!(html.contains("status-Allowed-Failure"));
    assert!(html.contains("N/A"));
    assert!(html.contains("1.50s"));
}

#[test]
fn test_escape_html() {
    assert_eq!(escape_html("<a href='x'>"), "&lt;a href=&#39;x&#39;&gt;");
}

#[test]
fn test_json_report_is_machine_readable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("results.json");

    write_json_report(&mixed_results(), &ubuntu_x86(), &path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(json["summary"]["total"], 7);
    assert_eq!(json["summary"]["allowed_failures"], 1);
    assert_eq!(json["platform"]["distro"], "ubuntu");
    assert_eq!(json["results"][1]["name"], "hugepages");
    assert_eq!(json["results"][1]["verdict"], "FAIL");
    assert_eq!(json["results"][2]["failure_allowed"], true);
    assert!(json["generated_at"].is_string());
}
