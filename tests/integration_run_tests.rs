//! # Run Integration Tests / 运行集成测试
//!
//! Drives whole runs through `run_tests` against a scripted machine: result
//! ordering, parallel jobs, fail-fast, user aborts and the per-case log files.
//!
//! 通过 `run_tests` 针对脚本化机器驱动完整运行：结果顺序、并行任务、
//! 快速失败、用户中止以及每个用例的日志文件。

mod common;

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use common::{Harness, ScriptedRunner};
use kernel_test_runner::cli::commands::run::run_tests;
use kernel_test_runner::core::config::{CaseEntry, Params};
use kernel_test_runner::core::execution::{ExecutionEnv, run_test_case};
use kernel_test_runner::core::models::{Phase, Verdict};

fn script(name: &str, command: &str) -> CaseEntry {
    let mut entry = CaseEntry::new(name, "script");
    entry.with = Params::new().with("command", command);
    entry
}

fn env(harness: &Harness) -> ExecutionEnv {
    ExecutionEnv {
        caps: harness.capabilities(),
        platform: harness.platform.clone(),
        output_dir: harness.dir.path().join("out"),
        verbose: false,
    }
}

fn failing_machine() -> ScriptedRunner {
    ScriptedRunner::new().reply_stderr("check-bad", 1, "check-bad: assertion failed")
}

#[tokio::test]
async fn test_results_follow_plan_order() {
    let harness = Harness::new(failing_machine());
    let cases = vec![
        script("alpha", "check-ok alpha"),
        script("beta", "check-bad beta"),
        script("gamma", "check-ok gamma"),
    ];

    let results = run_tests(cases, 1, env(&harness), false, CancellationToken::new()).await;

    let summary: Vec<_> = results
        .iter()
        .map(|r| (r.name.as_str(), r.verdict))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("alpha", Verdict::Pass),
            ("beta", Verdict::Fail),
            ("gamma", Verdict::Pass),
        ]
    );
    assert!(results[1].output.contains("check-bad: assertion failed"));
}

#[tokio::test]
async fn test_parallel_jobs_overlap_and_keep_order() {
    let harness = Harness::new(ScriptedRunner::new().delayed(Duration::from_millis(300)));
    let cases: Vec<_> = (0..4)
        .map(|i| script(&format!("case-{}", i), &format!("work {}", i)))
        .collect();

    let start = Instant::now();
    let results = run_tests(cases, 4, env(&harness), false, CancellationToken::new()).await;
    let elapsed = start.elapsed();

    let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["case-0", "case-1", "case-2", "case-3"]);
    assert!(results.iter().all(|r| r.verdict == Verdict::Pass));
    assert!(
        elapsed < Duration::from_millis(1100),
        "four 300ms cases on four jobs took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_fail_fast_skips_cases_that_have_not_started() {
    let harness = Harness::new(failing_machine());
    let cases = vec![
        script("first", "check-bad first"),
        script("second", "check-ok second"),
        script("third", "check-ok third"),
    ];

    let results = run_tests(cases, 1, env(&harness), true, CancellationToken::new()).await;

    assert_eq!(results[0].verdict, Verdict::Fail);
    for skipped in &results[1..] {
        assert_eq!(skipped.verdict, Verdict::Skip);
        assert!(skipped.reason.as_deref().unwrap_or("").contains("--fail-fast"));
        assert_eq!(skipped.phases, vec![Phase::NotStarted]);
    }
    assert!(!harness.runner.ran("check-ok"));
}

#[tokio::test]
async fn test_allowed_failure_does_not_trigger_fail_fast() {
    let harness = Harness::new(failing_machine());
    let mut flaky = script("flaky", "check-bad flaky");
    flaky.allow_failure = vec!["ubuntu".to_string()];
    let cases = vec![flaky, script("after", "check-ok after")];

    let results = run_tests(cases, 1, env(&harness), true, CancellationToken::new()).await;

    assert!(results[0].is_allowed_failure());
    assert!(!results[0].is_unexpected_failure());
    assert_eq!(results[1].verdict, Verdict::Pass);
}

#[tokio::test]
async fn test_aborted_run_marks_unstarted_cases_interrupted() {
    let harness = Harness::new(ScriptedRunner::new());
    let stop = CancellationToken::new();
    stop.cancel();

    let results = run_tests(
        vec![script("a", "true"), script("b", "true")],
        1,
        env(&harness),
        false,
        stop,
    )
    .await;

    assert!(results.iter().all(|r| r.verdict == Verdict::Interrupted));
    assert_eq!(results[0].reason.as_deref(), Some("run aborted by user"));
    assert!(harness.runner.commands().is_empty());
}

#[tokio::test]
async fn test_case_timeout_becomes_interrupted() {
    let harness = Harness::new(ScriptedRunner::new().delayed(Duration::from_secs(30)));
    let mut slow = script("slow", "sleep-forever");
    slow.timeout_secs = Some(1);

    let result = run_test_case(slow, &env(&harness), &CancellationToken::new()).await;

    assert_eq!(result.verdict, Verdict::Interrupted);
    assert!(result.reason.unwrap().starts_with("timed out after"));
}

#[tokio::test]
async fn test_unknown_kind_is_a_harness_error() {
    let harness = Harness::new(ScriptedRunner::new());
    let entry = CaseEntry::new("typo", "scirpt");

    let result = run_test_case(entry, &env(&harness), &CancellationToken::new()).await;

    assert_eq!(result.verdict, Verdict::Error);
    assert!(result.reason.unwrap().contains("unknown case kind 'scirpt'"));
    assert!(harness.runner.commands().is_empty());
}

#[tokio::test]
async fn test_case_log_is_written_to_the_output_dir() {
    let harness = Harness::new(ScriptedRunner::new().reply("uname -r", 0, "6.8.0-31-generic\n"));
    let env = env(&harness);

    let result = run_test_case(
        script("kernel-version", "uname -r"),
        &env,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(result.verdict, Verdict::Pass);
    assert!(result.output.contains("6.8.0-31-generic"));
    let log = env.output_dir.join("kernel-version").join("debug.log");
    let content = std::fs::read_to_string(&log).unwrap();
    assert!(content.contains("uname -r"));
}

#[tokio::test]
async fn test_local_source_tree_is_copied_into_the_work_dir() {
    let harness = Harness::new(ScriptedRunner::new());
    let source = harness.dir.path().join("selftest");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("run.sh"), "echo ok\n").unwrap();

    let mut entry = script("selftest", "sh run.sh");
    entry.with.insert("source", source.to_string_lossy().to_string());

    let result = run_test_case(entry, &env(&harness), &CancellationToken::new()).await;

    assert_eq!(result.verdict, Verdict::Pass);
    let copied = harness
        .dir
        .path()
        .join("out")
        .join("selftest")
        .join("work")
        .join("selftest");
    assert!(copied.join("run.sh").exists());
    let request = harness
        .runner
        .requests()
        .into_iter()
        .find(|r| r.command == "sh run.sh")
        .unwrap();
    assert_eq!(request.cwd.as_deref(), Some(copied.as_path()));
}

#[tokio::test]
async fn test_relative_source_is_taken_from_the_suite_dir() {
    let harness = Harness::new(ScriptedRunner::new());
    std::fs::create_dir_all(harness.dir.path().join("selftest")).unwrap();
    std::fs::write(harness.dir.path().join("selftest/run.sh"), "echo ok\n").unwrap();

    let mut entry = script("relative", "sh run.sh");
    entry.with.insert("source", "selftest");
    entry.base_dir = Some(harness.dir.path().to_path_buf());

    let result = run_test_case(entry, &env(&harness), &CancellationToken::new()).await;

    assert_eq!(result.verdict, Verdict::Pass);
    let copied = harness
        .dir
        .path()
        .join("out")
        .join("relative")
        .join("work")
        .join("selftest");
    assert!(copied.join("run.sh").exists());
}

