//! # Test Execution Engine Module / 测试执行引擎模块
//!
//! This module runs a single suite entry: it prepares the case's directories,
//! builds the case from its parameters, drives it through the lifecycle and
//! turns the lifecycle report into a [`TestResult`]. Every problem on the way
//! becomes a verdict; nothing here aborts the run.
//!
//! 此模块运行单个套件条目：准备用例目录、根据参数构建用例、
//! 驱动其完成生命周期，并将生命周期报告转换为 [`TestResult`]。
//! 过程中的任何问题都会变成判定结果，这里不会中止整个运行。

use colored::*;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        cases,
        config::CaseEntry,
        lifecycle::{CaseContext, drive},
        models::{TestResult, Verdict},
    },
    infra::{Capabilities, fs, platform::Platform, t},
};

/// Everything shared by all cases of one run.
/// 一次运行中所有用例共享的内容。
#[derive(Clone)]
pub struct ExecutionEnv {
    pub caps: Capabilities,
    pub platform: Platform,
    /// Per-case directories are created below this one.
    pub output_dir: PathBuf,
    /// Echo every case transcript to the console while it runs.
    pub verbose: bool,
}

/// The main entry point for running a single test case.
///
/// # Arguments
/// * `entry` - The suite entry to execute
/// * `env` - Capabilities, platform and output location shared by the run
/// * `stop` - Cancelled when the user aborts the run
///
/// # Returns
/// A `TestResult` describing the outcome of the case
pub async fn run_test_case(
    entry: CaseEntry,
    env: &ExecutionEnv,
    stop: &CancellationToken,
) -> TestResult {
    println!("{}", t!("run.running_test", name = &entry.name).blue());

    let failure_allowed = entry.allows_failure_on(&env.platform.distro);
    let harness_error = |reason: String| {
        let mut result = TestResult::not_run(&entry, Verdict::Error, reason);
        result.failure_allowed = failure_allowed;
        result
    };

    let dirs = match fs::create_case_dirs(&env.output_dir, &entry.name) {
        Ok(dirs) => dirs,
        Err(e) => return report(harness_error(format!("{:#}", e))),
    };
    let mut case = match cases::prepare(&entry) {
        Ok(case) => case,
        Err(e) => return report(harness_error(format!("{:#}", e))),
    };

    let mut ctx = CaseContext::new(
        entry.name.clone(),
        env.caps.clone(),
        env.platform.clone(),
        dirs.workdir.clone(),
        env.verbose,
    )
    .with_data_dir(entry.base_dir.clone());
    let limit = entry.timeout_secs.map(Duration::from_secs);

    let start_time = Instant::now();
    let outcome = drive(case.as_mut(), &mut ctx, limit, stop).await;
    let duration = start_time.elapsed();

    if outcome.verdict == Verdict::Interrupted {
        if let Some(secs) = entry.timeout_secs {
            if !stop.is_cancelled() {
                println!(
                    "{}",
                    t!("run.test_timeout", name = &entry.name, timeout = secs).red()
                );
            }
        }
    }

    if let Err(e) = ctx.log.write_to(&dirs.log_path()) {
        eprintln!("{} {:#}", t!("run.log_write_failed").yellow(), e);
    }

    report(TestResult {
        name: entry.name.clone(),
        kind: entry.kind.clone(),
        verdict: outcome.verdict,
        reason: outcome.reason,
        output: ctx.log.transcript(),
        duration,
        teardown_error: outcome.teardown_error,
        phases: outcome.phases,
        failure_allowed,
    })
}

/// Prints the one-line status of a finished case and hands the result back.
fn report(result: TestResult) -> TestResult {
    let duration = format!("{:.2}", result.duration.as_secs_f64());
    let name = result.name.as_str();
    let line = match result.verdict {
        Verdict::Pass => t!("run.test_passed", name = name, duration = duration).green(),
        Verdict::Skip => t!("run.test_skipped", name = name).dimmed(),
        Verdict::Cancel => t!("run.test_cancelled", name = name).yellow(),
        Verdict::Interrupted => t!("run.test_interrupted", name = name).red(),
        Verdict::Error if result.failure_allowed => {
            t!("run.test_error", name = name).yellow()
        }
        Verdict::Error => t!("run.test_error", name = name).red(),
        Verdict::Fail if result.failure_allowed => {
            t!("run.test_failed", name = name, duration = duration).yellow()
        }
        Verdict::Fail => t!("run.test_failed", name = name, duration = duration).red(),
    };
    println!("{}", line);
    if let Some(reason) = &result.reason {
        if result.verdict != Verdict::Pass {
            println!("  {}", reason.dimmed());
        }
    }
    if let Some(error) = &result.teardown_error {
        println!("  {} {}", t!("run.teardown_failed").yellow(), error);
    }
    result
}
