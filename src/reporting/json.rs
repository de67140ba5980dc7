//! # JSON Reporting Module / JSON 报告模块
//!
//! Writes `results.json`: when and where the run happened, the per-verdict
//! counts and every case result with its transcript.
//!
//! 写出 `results.json`：运行的时间和机器、各判定的数量，以及每个用例的结果及其记录。

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::core::models::TestResult;
use crate::infra::platform::Platform;
use crate::reporting::console::Tally;

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub errors: usize,
    pub interrupted: usize,
    pub allowed_failures: usize,
}

impl From<Tally> for RunSummary {
    fn from(t: Tally) -> Self {
        Self {
            total: t.total,
            passed: t.passed,
            failed: t.failed,
            cancelled: t.cancelled,
            skipped: t.skipped,
            errors: t.errors,
            interrupted: t.interrupted,
            allowed_failures: t.allowed_failures,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub generated_at: DateTime<Local>,
    pub runner_version: &'static str,
    pub platform: &'a Platform,
    pub summary: RunSummary,
    pub results: &'a [TestResult],
}

impl<'a> RunReport<'a> {
    pub fn new(results: &'a [TestResult], platform: &'a Platform) -> Self {
        Self {
            generated_at: Local::now(),
            runner_version: env!("CARGO_PKG_VERSION"),
            platform,
            summary: Tally::of(results).into(),
            results,
        }
    }
}

/// Serializes the run to pretty-printed JSON at `path`.
pub fn write_json_report(results: &[TestResult], platform: &Platform, path: &Path) -> Result<()> {
    let report = RunReport::new(results, platform);
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize results")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}
