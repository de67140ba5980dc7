//! # HTML Reporting Module / HTML 报告模块
//!
//! This module handles the generation of HTML test reports.
//! It creates styled HTML files with test statistics, detailed results tables,
//! and interactive features for viewing case transcripts.
//!
//! 此模块处理 HTML 测试报告的生成。
//! 它创建带有测试统计、详细结果表格和查看用例记录的交互功能的样式化 HTML 文件。

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::core::models::TestResult;
use crate::infra::platform::Platform;
use crate::infra::t;
use crate::reporting::console::{Tally, get_error_output_from_result};

/// Embedded CSS styles for HTML reports / HTML 报告的嵌入式 CSS 样式
const HTML_STYLE: &str = include_str!("assets/report.css");

/// Embedded JavaScript for HTML report interactivity / HTML 报告交互性的嵌入式 JavaScript
const HTML_SCRIPT: &str = include_str!("assets/report.js");

/// Generates a comprehensive HTML report from test results.
///
/// 从测试结果生成综合的 HTML 报告。
///
/// # Arguments / 参数
/// * `results` - A slice of test results to include in the report
///               要包含在报告中的测试结果切片
/// * `platform` - The machine the results were produced on
///                产生这些结果的机器
/// * `output_path` - The file path where the HTML report will be saved
///                   保存 HTML 报告的文件路径
/// * `locale` - The locale to use for internationalization
///              用于国际化使用的语言环境
pub fn generate_html_report(
    results: &[TestResult],
    platform: &Platform,
    output_path: &Path,
    locale: &str,
) -> Result<()> {
    let html = render_html_report(results, platform, locale);
    fs::write(output_path, html)
        .with_context(|| format!("Failed to write HTML report: {}", output_path.display()))
}

/// Renders the report without touching the file system.
pub fn render_html_report(results: &[TestResult], platform: &Platform, locale: &str) -> String {
    let mut html = String::new();
    html.push_str(&format!(
        "<!DOCTYPE html><html><head><meta charset='utf-8'><title>{}</title>",
        t!("html_report.title", locale = locale)
    ));
    html.push_str("<style>");
    html.push_str(HTML_STYLE);
    html.push_str("</style>");
    html.push_str("</head><body>");
    html.push_str(&format!(
        "<h1>{}</h1>",
        t!("html_report.main_header", locale = locale)
    ));
    html.push_str(&format!(
        "<p class='platform'>{} {} {} &middot; {} &middot; {}</p>",
        escape_html(&platform.distro),
        escape_html(&platform.distro_version),
        escape_html(&platform.kernel_release),
        escape_html(&platform.arch),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    // Add summary statistics
    let tally = Tally::of(results);
    let summary = [
        (tally.total, "", "html_report.summary.total"),
        (tally.passed, "passed-text", "html_report.summary.passed"),
        (
            tally.failed + tally.errors + tally.interrupted,
            "failed-text",
            "html_report.summary.failed",
        ),
        (tally.cancelled, "cancelled-text", "html_report.summary.cancelled"),
        (tally.skipped, "skipped-text", "html_report.summary.skipped"),
        (
            tally.allowed_failures,
            "allowed-text",
            "html_report.summary.allowed_failure",
        ),
    ];
    html.push_str("<div class='summary-container'>");
    for (count, class, key) in summary {
        html.push_str(&format!(
            "<div class='summary-item'><span class='count {}'>{}</span><span class='label'>{}</span></div>",
            class,
            count,
            t!(key, locale = locale)
        ));
    }
    html.push_str("</div>");

    // Add results table
    html.push_str("<table><thead><tr>");
    html.push_str(&format!(
        "<th>{}</th>",
        t!("html_report.table.header.name", locale = locale)
    ));
    html.push_str(&format!(
        "<th>{}</th>",
        t!("html_report.table.header.kind", locale = locale)
    ));
    html.push_str(&format!(
        "<th class='status-col'>{}</th>",
        t!("html_report.table.header.status", locale = locale)
    ));
    html.push_str(&format!(
        "<th class='duration-cell'>{}</th>",
        t!("html_report.table.header.duration", locale = locale)
    ));
    html.push_str(&format!(
        "<th>{}</th>",
        t!("html_report.table.header.reason", locale = locale)
    ));
    html.push_str("</tr></thead><tbody>");

    for (i, result) in results.iter().enumerate() {
        let status_str = result.get_status_str(locale);
        let status_class = result.get_status_class();
        let duration_str = result
            .get_duration()
            .map(|d| format!("{:.2}s", d.as_secs_f64()))
            .unwrap_or_else(|| "N/A".to_string());

        let output_id = format!("output-{}", i);
        let has_output = !result.output.trim().is_empty();
        let output_toggle = if has_output {
            format!(
                "<div class='output-toggle' onclick=\"toggleOutput('{}')\">{}</div>",
                output_id,
                t!("html_report.toggle_output", locale = locale)
            )
        } else {
            String::new()
        };
        let mut reason = result.reason.as_deref().map(escape_html).unwrap_or_default();
        if let Some(error) = &result.teardown_error {
            reason.push_str(&format!(
                "<div class='teardown'>{}: {}</div>",
                t!("html_report.teardown_error", locale = locale),
                escape_html(error)
            ));
        }

        html.push_str("<tr>");
        html.push_str(&format!("<td>{}</td>", escape_html(&result.name)));
        html.push_str(&format!("<td>{}</td>", escape_html(&result.kind)));
        html.push_str(&format!(
            "<td class='status-col'><div class='status-cell {}'>{}</div>{}</td>",
            status_class, status_str, output_toggle
        ));
        html.push_str(&format!("<td class='duration-cell'>{}</td>", duration_str));
        html.push_str(&format!("<td class='reason-cell'>{}</td>", reason));
        html.push_str("</tr>");
        if has_output {
            html.push_str(&format!(
                "<tr id='{}' style='display:none;'><td colspan='5'><pre class='output-content'>{}</pre></td></tr>",
                output_id,
                escape_html(&get_error_output_from_result(result, locale))
            ));
        }
    }

    html.push_str("</tbody></table>");
    html.push_str("<script>");
    html.push_str(HTML_SCRIPT);
    html.push_str("</script></body></html>");
    html
}

/// Simple HTML escape function to replace special characters with their HTML entities
/// 简单的 HTML 转义函数，用 HTML 实体替换特殊字符
pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
