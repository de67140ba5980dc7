//! # Reporting Module / 报告模块
//!
//! This module handles the generation and display of test reports in multiple formats.
//! It prints colorful, formatted summaries to the console, writes a machine-readable
//! `results.json` and can render a styled HTML report.
//!
//! 此模块处理多种格式的测试报告生成和显示。
//! 它在控制台打印彩色格式化摘要、写出机器可读的 `results.json`，
//! 并可生成样式化的 HTML 报告。

pub mod console;
pub mod html;
pub mod json;

// Re-export common reporting functions
pub use console::{print_summary, print_unexpected_failure_details};
pub use html::generate_html_report;
pub use json::write_json_report;
