//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command, which executes the cases of a
//! suite file on the current machine and writes the reports.
//!
//! 此模块实现了 `run` 命令，在当前机器上执行套件文件中的用例并写出报告。

use anyhow::{Context, Result, bail};
use colored::*;
use futures::{StreamExt, stream};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        cases,
        config::{CaseEntry, load_test_suite},
        execution::{ExecutionEnv, run_test_case},
        models::{TestResult, Verdict},
        planner,
    },
    infra::{Capabilities, platform::Platform, t},
    reporting::{
        console::{print_summary, print_unexpected_failure_details},
        html::generate_html_report,
        json::write_json_report,
    },
};

/// Name of the machine-readable report written into the output directory.
pub const RESULTS_FILE: &str = "results.json";

/// Parsed arguments of `run`.
/// `run` 命令解析后的参数。
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub config: PathBuf,
    pub jobs: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub tags: Vec<String>,
    pub fail_fast: bool,
    pub verbose: bool,
    pub html: Option<PathBuf>,
    pub total_runners: Option<usize>,
    pub runner_index: Option<usize>,
}

/// Executes the run command with the provided arguments.
///
/// # Arguments
/// * `args` - The parsed command line arguments
/// * `lang_override` - The `--lang` value, which wins over the suite's language
///
/// # Returns
/// An error when the suite is invalid or any case failed unexpectedly.
pub async fn execute(args: RunArgs, lang_override: Option<String>) -> Result<()> {
    let suite = load_test_suite(&args.config)?;
    let locale = crate::set_language(lang_override.as_deref().unwrap_or(&suite.language));

    println!(
        "{}",
        t!("loading_suite", locale = &locale, path = args.config.display())
    );
    cases::validate_suite(&suite)?;

    let platform = Platform::detect();
    println!(
        "{}",
        t!(
            "platform_detected",
            locale = &locale,
            distro = &platform.distro,
            version = &platform.distro_version,
            kernel = &platform.kernel_release,
            arch = &platform.arch
        )
        .cyan()
    );

    let output_dir = args.output_dir.clone().unwrap_or_else(|| suite.output_dir.clone());
    std::fs::create_dir_all(&output_dir).with_context(|| {
        t!("output_dir_create_failed", locale = &locale, path = output_dir.display()).to_string()
    })?;

    let stop = setup_signal_handler(&locale);

    let plan = planner::plan_execution(
        suite.cases,
        &platform,
        &args.tags,
        args.total_runners,
        args.runner_index,
    )?;

    if plan.tag_filtered_count > 0 {
        println!(
            "{}",
            t!("filtered_tag_cases", locale = &locale, count = plan.tag_filtered_count).cyan()
        );
    }
    if !plan.arch_filtered.is_empty() {
        println!(
            "{}",
            t!(
                "filtered_arch_cases",
                locale = &locale,
                count = plan.arch_filtered.len(),
                arch = &platform.arch
            )
            .cyan()
        );
    }
    if plan.flaky_cases_count > 0 {
        println!(
            "{}",
            t!("flaky_cases_found", locale = &locale, count = plan.flaky_cases_count).yellow()
        );
    }
    if let (Some(total), Some(index)) = (args.total_runners, args.runner_index) {
        println!(
            "{}",
            t!(
                "running_as_split_runner",
                locale = &locale,
                index = index + 1,
                total = total,
                count = plan.cases_to_run.len()
            )
            .bold()
        );
    } else {
        println!("{}", t!("running_as_single_runner", locale = &locale).bold());
    }

    let mut final_results: Vec<TestResult> = plan
        .arch_filtered
        .iter()
        .map(|case| {
            TestResult::not_run(
                case,
                Verdict::Skip,
                format!("not supported on {}", platform.arch),
            )
        })
        .collect();

    if plan.cases_to_run.is_empty() {
        println!("{}", t!("no_cases_to_run", locale = &locale).green());
    } else {
        let env = ExecutionEnv {
            caps: Capabilities::system(&platform, suite.cache_dir.clone()),
            platform: platform.clone(),
            output_dir: output_dir.clone(),
            verbose: args.verbose,
        };
        let jobs = args.jobs.unwrap_or(1).max(1);
        final_results.extend(run_tests(plan.cases_to_run, jobs, env, args.fail_fast, stop).await);
    }

    print_summary(&final_results, &locale);

    let json_path = output_dir.join(RESULTS_FILE);
    write_json_report(&final_results, &platform, &json_path)?;
    println!(
        "{}",
        t!("json_report_written", locale = &locale, path = json_path.display())
    );

    if let Some(report_path) = &args.html {
        println!(
            "\n{}",
            t!("html_report_generating", locale = &locale, path = report_path.display())
        );
        if let Err(e) = generate_html_report(&final_results, &platform, report_path, &locale) {
            eprintln!(
                "{} {:#}",
                t!("html_report_failed", locale = &locale).red(),
                e
            );
        }
    }

    let unexpected_failures: Vec<_> = final_results
        .iter()
        .filter(|r| r.is_unexpected_failure())
        .collect();
    if !unexpected_failures.is_empty() {
        print_unexpected_failure_details(&unexpected_failures, &locale);
        bail!(
            "{} case(s) failed unexpectedly.",
            unexpected_failures.len()
        );
    }

    println!("\n{}", t!("all_tests_passed", locale = &locale).green().bold());
    Ok(())
}

fn setup_signal_handler(locale: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            println!("\n{}", t!("shutdown_signal", locale = &locale).yellow());
            token_clone.cancel();
        }
    });

    token
}

/// Runs the planned cases with at most `jobs` of them in flight, and returns
/// their results in plan order.
///
/// Cases that have not started when the user aborts are reported as
/// interrupted. With `fail_fast`, cases that have not started after an
/// unexpected failure are reported as skipped.
///
/// 以最多 `jobs` 个并发运行计划中的用例，并按计划顺序返回结果。
pub async fn run_tests(
    cases_to_run: Vec<CaseEntry>,
    jobs: usize,
    env: ExecutionEnv,
    fail_fast: bool,
    stop: CancellationToken,
) -> Vec<TestResult> {
    let env = Arc::new(env);
    let fast_fail_token = CancellationToken::new();

    let stream = stream::iter(cases_to_run.into_iter().enumerate().map(|(index, case)| {
        let env = env.clone();
        let stop = stop.clone();
        let fast_fail_token = fast_fail_token.clone();
        let case_for_error = case.clone();

        async move {
            let handle = tokio::spawn(async move {
                if stop.is_cancelled() {
                    return TestResult::not_run(&case, Verdict::Interrupted, "run aborted by user");
                }
                if fast_fail_token.is_cancelled() {
                    return TestResult::not_run(
                        &case,
                        Verdict::Skip,
                        "skipped after an earlier failure (--fail-fast)",
                    );
                }

                let result = run_test_case(case, &env, &stop).await;
                if fail_fast && result.is_unexpected_failure() {
                    fast_fail_token.cancel();
                }
                result
            });

            let result = match handle.await {
                Ok(result) => result,
                Err(e) => TestResult::not_run(
                    &case_for_error,
                    Verdict::Error,
                    format!("case task failed: {}", e),
                ),
            };
            (index, result)
        }
    }));

    let mut results: Vec<(usize, TestResult)> = stream.buffer_unordered(jobs).collect().await;
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}
