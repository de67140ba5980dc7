//! # Case Log Module / 用例日志模块
//!
//! Every test case keeps a transcript of what it did: informational lines,
//! warnings, and each command with its status and output. The transcript ends
//! up in the case's `debug.log` and in the result, and is echoed live to the
//! console in verbose mode.
//!
//! 每个测试用例都会记录其操作：信息行、警告，以及每条命令的状态与输出。
//! 该记录会写入用例的 `debug.log` 和结果中，在详细模式下还会实时输出到控制台。

use anyhow::{Context, Result};
use chrono::Local;
use colored::*;
use std::fs;
use std::path::Path;

use crate::core::models::CommandResult;

#[derive(Debug, Clone)]
pub struct CaseLog {
    case_name: String,
    lines: Vec<String>,
    echo: bool,
}

impl CaseLog {
    pub fn new(case_name: impl Into<String>, echo: bool) -> Self {
        Self {
            case_name: case_name.into(),
            lines: Vec::new(),
            echo,
        }
    }

    fn record(&mut self, level: &str, message: &str) {
        let stamp = Local::now().format("%H:%M:%S");
        for line in message.lines() {
            self.lines.push(format!("{} {:<5} | {}", stamp, level, line));
        }
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        self.record("INFO", message);
        if self.echo {
            println!("  [{}] {}", self.case_name.cyan(), message.dimmed());
        }
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        self.record("WARN", message);
        if self.echo {
            println!("  [{}] {}", self.case_name.cyan(), message.yellow());
        }
    }

    /// Records a finished command: the command line, its status and its output.
    pub fn command(&mut self, result: &CommandResult) {
        self.record("CMD", &format!("$ {}", result.command));
        self.record(
            "CMD",
            &format!(
                "-> {} after {:.2}s",
                result.status_display(),
                result.duration.as_secs_f64()
            ),
        );
        if !result.stdout.trim().is_empty() {
            self.record("OUT", result.stdout.trim_end());
        }
        if !result.stderr.trim().is_empty() {
            self.record("ERR", result.stderr.trim_end());
        }
        if self.echo {
            let status = if result.success() {
                result.status_display().green()
            } else {
                result.status_display().red()
            };
            println!("  [{}] $ {} ({})", self.case_name.cyan(), result.command, status);
        }
    }

    pub fn transcript(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.transcript())
            .with_context(|| format!("Failed to write case log: {}", path.display()))
    }
}
