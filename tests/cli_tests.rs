use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::tempdir;

mod common;

use common::write_suite;

fn runner() -> Command {
    let mut cmd = Command::cargo_bin("kernel-test-runner").unwrap();
    cmd.env("NO_COLOR", "1").arg("--lang").arg("en");
    cmd
}

/// `list` prints every built-in case kind with its summary.
///
/// `list` 打印每个内置用例类型及其简介。
#[test]
fn test_list_shows_the_catalogue() {
    runner()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Built-in case kinds:"))
        .stdout(predicate::str::contains("hugepage_sysctl"))
        .stdout(predicate::str::contains("perf_options"));
}

/// A suite whose only case passes completes successfully and leaves a
/// `results.json` in the output directory.
///
/// 仅包含一个通过用例的套件成功完成，并在输出目录中留下 `results.json`。
#[test]
fn test_successful_run_writes_results() {
    let dir = tempdir().unwrap();
    let suite = write_suite(
        dir.path(),
        r#"
        [[cases]]
        name = "hello"
        kind = "script"
        with = { command = "echo hello", fail_patterns = ["goodbye"] }
        "#,
    );
    let out = dir.path().join("out");

    runner()
        .arg("run")
        .arg("--config")
        .arg(&suite)
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "ALL CASES COMPLETED WITHOUT UNEXPECTED FAILURES",
        ));

    let results = std::fs::read_to_string(out.join("results.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&results).unwrap();
    assert_eq!(json["results"][0]["name"], "hello");
    assert_eq!(json["results"][0]["verdict"], "PASS");
    assert!(out.join("hello").join("debug.log").exists());
}

/// A failing case makes the run fail and prints its transcript.
///
/// 失败的用例使整个运行失败，并打印其记录。
#[test]
fn test_failing_case_fails_the_run() {
    let dir = tempdir().unwrap();
    let suite = write_suite(
        dir.path(),
        r#"
        output_dir = "out"

        [[cases]]
        name = "broken"
        kind = "script"
        with = { command = "echo about to fail; false" }
        "#,
    );

    runner()
        .arg("run")
        .arg("-c")
        .arg(&suite)
        .assert()
        .failure()
        .stdout(predicate::str::contains("UNEXPECTED FAILURE DETECTED"))
        .stdout(predicate::str::contains("about to fail"))
        .stderr(predicate::str::contains("1 case(s) failed unexpectedly."));

    assert!(dir.path().join("out").join("results.json").exists());
}

/// A case with an unknown kind is reported before anything runs.
///
/// 未知类型的用例会在任何用例运行之前被报告。
#[test]
fn test_unknown_kind_is_rejected_before_running() {
    let dir = tempdir().unwrap();
    let suite = write_suite(
        dir.path(),
        r#"
        [[cases]]
        name = "typo"
        kind = "scirpt"
        "#,
    );

    runner()
        .arg("run")
        .arg("-c")
        .arg(&suite)
        .arg("--output-dir")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown case kind 'scirpt'"));
}

/// `--runner-index` without `--total-runners` is a usage error.
///
/// 只提供 `--runner-index` 而没有 `--total-runners` 属于用法错误。
#[test]
fn test_split_arguments_require_each_other() {
    runner()
        .arg("run")
        .arg("--runner-index")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--total-runners"));
}

/// `init --non-interactive` writes a suite that `run` can load.
///
/// `init --non-interactive` 写出一个可被 `run` 加载的套件。
#[test]
fn test_non_interactive_init_writes_a_suite() {
    let dir = tempdir().unwrap();

    runner()
        .current_dir(dir.path())
        .arg("init")
        .arg("--non-interactive")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created TestSuite.toml"));

    let content = std::fs::read_to_string(dir.path().join("TestSuite.toml")).unwrap();
    assert!(content.contains("kind = \"hugepage_sysctl\""));
    assert!(content.contains("language = \"en\""));
}

/// Help text follows `--lang`.
///
/// 帮助文本跟随 `--lang`。
#[test]
fn test_help_is_translated() {
    let mut cmd = Command::cargo_bin("kernel-test-runner").unwrap();
    let english = cmd.arg("--lang").arg("en").arg("--help").output().unwrap();
    let mut cmd = Command::cargo_bin("kernel-test-runner").unwrap();
    let chinese = cmd.arg("--lang=zh-CN").arg("--help").output().unwrap();

    assert!(english.status.success());
    assert!(chinese.status.success());
    assert_ne!(english.stdout, chinese.stdout);
}
