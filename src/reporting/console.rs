//! # Console Reporting Module / 控制台报告模块
//!
//! This module handles the generation and display of test reports in the console.
//! It provides functionality for printing colorful, formatted summaries with
//! internationalization support.
//!
//! 此模块处理控制台中测试报告的生成和显示。
//! 它提供打印彩色格式化摘要的功能，支持国际化。

use colored::*;

use crate::core::models::{TestResult, Verdict};
use crate::infra::t;

/// Per-verdict counts of a run.
/// 一次运行中每种判定的数量。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub errors: usize,
    pub interrupted: usize,
    pub allowed_failures: usize,
}

impl Tally {
    pub fn of(results: &[TestResult]) -> Self {
        let mut tally = Tally {
            total: results.len(),
            ..Tally::default()
        };
        for result in results {
            if result.is_allowed_failure() {
                tally.allowed_failures += 1;
                continue;
            }
            match result.verdict {
                Verdict::Pass => tally.passed += 1,
                Verdict::Fail => tally.failed += 1,
                Verdict::Cancel => tally.cancelled += 1,
                Verdict::Skip => tally.skipped += 1,
                Verdict::Error => tally.errors += 1,
                Verdict::Interrupted => tally.interrupted += 1,
            }
        }
        tally
    }
}

/// Prints a formatted summary of test results to the console.
/// Displays a table with test status, name, kind and duration,
/// using color coding to highlight different statuses.
///
/// 在控制台打印格式化的测试结果摘要。
/// 显示一个包含测试状态、名称、类型和持续时间的表格，
/// 使用颜色编码突出显示不同的状态。
///
/// # Arguments / 参数
/// * `results` - A slice of test results to summarize
///               要总结的测试结果切片
/// * `locale` - The language locale to use for messages
///              用于消息的语言区域设置
///
/// # Output Format / 输出格式
/// ```text
/// --- Test Summary ---
///   - Passed           | lsslot-pci                     | distro_tools     |      1.23s
///   - Failed           | hugepages                      | hugepage_sysctl  |      0.45s
///   - Allowed Failure  | smt                            | smt_folding      |     12.10s
///   - Skipped          | imc                            | imc_nonzero      |        N/A
/// ```
pub fn print_summary(results: &[TestResult], locale: &str) {
    println!("\n{}", t!("test_summary_banner", locale = locale).bold());

    for result in results {
        let status_str = result.get_status_str(locale);
        let duration_str = result
            .get_duration()
            .map(|d| format!("{:.2}s", d.as_secs_f64()))
            .unwrap_or_else(|| "N/A".to_string());

        let status_colored = if result.is_allowed_failure() {
            status_str.yellow()
        } else {
            match result.verdict {
                Verdict::Pass => status_str.green(),
                Verdict::Fail | Verdict::Error | Verdict::Interrupted => status_str.red(),
                Verdict::Cancel => status_str.yellow(),
                Verdict::Skip => status_str.dimmed(),
            }
        };

        println!(
            "  - {:<18} | {:<30} | {:<16} | {:>10}",
            status_colored, result.name, result.kind, duration_str
        );
    }

    let tally = Tally::of(results);
    println!(
        "\n{}",
        t!(
            "summary_counts",
            locale = locale,
            total = tally.total,
            passed = tally.passed,
            failed = tally.failed + tally.errors + tally.interrupted,
            cancelled = tally.cancelled,
            skipped = tally.skipped,
            allowed = tally.allowed_failures
        )
    );
}

/// Prints detailed information about unexpected test failures.
/// Shows the reason and the full transcript for each case that failed
/// unexpectedly. Failures allowed on the current distribution are left out.
///
/// 打印意外测试失败的详细信息。
/// 显示每个意外失败用例的原因和完整记录。
/// 当前发行版上允许的失败不会显示。
pub fn print_unexpected_failure_details(unexpected_failures: &[&TestResult], locale: &str) {
    if unexpected_failures.is_empty() {
        return;
    }

    println!("\n{}", t!("unexpected_failure_banner", locale = locale).red().bold());
    println!("{}", "-".repeat(80));

    for (i, result) in unexpected_failures.iter().enumerate() {
        println!(
            "[{}/{}] {} '{}' ({})",
            i + 1,
            unexpected_failures.len(),
            t!("report_header_failure", locale = locale).red(),
            result.name.cyan(),
            result.verdict
        );
        if let Some(reason) = &result.reason {
            println!("  {}", reason);
        }
        println!("\n--- {} ---\n", t!("test_log", locale = locale).yellow());
        println!("{}", get_error_output_from_result(result, locale));
        println!("\n{}", "-".repeat(80));
    }
}

/// Gets the output of a test result for display.
///
/// 获取测试结果的输出以供显示。
pub fn get_error_output_from_result(result: &TestResult, locale: &str) -> String {
    if result.output.trim().is_empty() {
        t!("no_error_output", locale = locale).to_string()
    } else {
        result.output.clone()
    }
}
