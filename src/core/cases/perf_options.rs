//! Runs `perf stat` once per command-line option and reports every option that
//! breaks. Options the installed perf does not know are noted and skipped.
//!
//! 对每个命令行选项运行一次 `perf stat`，并报告所有出错的选项。
//! 已安装的 perf 不认识的选项会被记录并跳过。

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::core::cases::perf_packages;
use crate::core::config::{Params, string_list};
use crate::core::evaluator::{Evaluation, ExitJudgement, ExitPolicy};
use crate::core::lifecycle::{CaseContext, CaseResult, TestCase, cancel};
use crate::core::models::Outcome;
use crate::infra::command::quote;

/// Exit status perf uses for an unknown option.
pub const UNKNOWN_OPTION_EXIT: i32 = 129;

/// Options that need an event (`-e`) to make sense.
const NEEDS_EVENT: &[&str] = &["-b", "-u", "-s", "--metric-only", "--topdown", "--transaction", "-T"];

/// Options in `values` are keyed by the option itself, e.g. `"-I": "1000"`.
#[derive(Debug, Clone, Deserialize)]
pub struct PerfOptionsOptions {
    /// Options to exercise. Empty means every option listed by `perf stat --help`.
    #[serde(default, deserialize_with = "string_list")]
    pub options: Vec<String>,
    /// Options never exercised, e.g. the ones the kernel's own perf tests cover.
    #[serde(default, deserialize_with = "string_list")]
    pub exclude: Vec<String>,
    /// Options containing any of these substrings need infrastructure the
    /// harness does not provide and are skipped.
    #[serde(default = "default_unsupported", deserialize_with = "string_list")]
    pub unsupported: Vec<String>,
    #[serde(default = "default_workload")]
    pub workload: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, serde_json::Value>,
}

fn default_unsupported() -> Vec<String> {
    ["cgroup", "bpf", "smi-cost", "interval-clear"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_workload() -> String {
    "sleep 5".to_string()
}

impl PerfOptionsOptions {
    fn value(&self, option: &str) -> Option<String> {
        self.values.get(option).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Reduces a token seen in help text or a script to a bare option:
/// trailing punctuation goes, attached values go (`-G/cgroup`, `--foo=bar`,
/// `-j64`), and anything not starting with `-` is rejected.
pub fn sanitize_option(token: &str) -> Option<String> {
    if !token.starts_with('-') {
        return None;
    }
    let trimmed = token.trim_end_matches(|c: char| "),.:;/[]".contains(c));
    let base = trimmed.split(['=', '/']).next().unwrap_or("").trim();
    let bytes = base.as_bytes();
    let base = if bytes.len() > 2
        && bytes[1].is_ascii_alphabetic()
        && bytes[2..].iter().all(u8::is_ascii_digit)
    {
        &base[..2]
    } else {
        base
    };
    if base.trim_start_matches('-').is_empty() {
        return None;
    }
    Some(base.to_string())
}

/// Every option mentioned in `perf stat --help` output.
pub fn help_options(help: &str) -> BTreeSet<String> {
    help.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.chars().all(|c| c == '-'))
        .flat_map(str::split_whitespace)
        .filter(|token| {
            let rest = token.trim_start_matches('-');
            let dashes = token.len() - rest.len();
            (1..=2).contains(&dashes) && rest.starts_with(|c: char| c.is_ascii_alphabetic())
        })
        .filter_map(sanitize_option)
        .collect()
}

pub struct PerfOptions {
    options: PerfOptionsOptions,
    to_test: Vec<String>,
    /// Options skipped before running, with the reason.
    skipped: Vec<(String, String)>,
    created: Vec<String>,
}

pub fn build(params: &Params) -> Result<Box<dyn TestCase>> {
    Ok(Box::new(PerfOptions::new(params.decode()?)?))
}

impl PerfOptions {
    pub fn new(options: PerfOptionsOptions) -> Result<Self> {
        if let Some(key) = options.values.keys().find(|k| !k.starts_with('-')) {
            bail!("unknown field `{}`", key);
        }
        Ok(Self {
            options,
            to_test: Vec::new(),
            skipped: Vec::new(),
            created: Vec::new(),
        })
    }

    /// The full command for `option` given the value it takes (if any).
    pub fn command(&self, option: &str, value: Option<&str>) -> String {
        let mut parts = vec!["perf".to_string(), "stat".to_string()];
        if NEEDS_EVENT.contains(&option) {
            parts.push("-e".to_string());
            parts.push(self.options.value("-e").unwrap_or_else(|| "cycles".to_string()));
        }
        match value {
            Some(value) if option.contains('=') => {
                let base = option.split('=').next().unwrap_or(option);
                parts.push(format!("{}={}", base, value));
            }
            Some(value) if !value.is_empty() => {
                parts.push(option.to_string());
                parts.push(value.to_string());
            }
            _ => parts.push(option.to_string()),
        }
        parts.push(self.options.workload.clone());
        parts.join(" ")
    }

    /// Works out the value an option needs, creating helper files on the way.
    /// `Ok(None)` means the option does not apply to this machine.
    async fn resolve_value(
        &mut self,
        ctx: &mut CaseContext,
        option: &str,
    ) -> CaseResult<Option<Option<String>>> {
        let mut value = self.options.value(option);
        match option {
            "-M" | "--metrics" | "--metric-groups" => {
                let found = ctx
                    .shell("perf list metricgroup 2>/dev/null | grep -v '^$' | grep -v 'Metric Groups' | head -1")
                    .await?;
                let group = found.stdout.trim().to_string();
                if group.is_empty() {
                    return Ok(None);
                }
                value = Some(group);
            }
            "--topdown" | "-T" | "--transaction" | "-t" => {
                let pattern = if matches!(option, "--topdown" | "-T") {
                    "^TopdownL1"
                } else {
                    "^transaction"
                };
                let found = ctx
                    .shell(format!(
                        "perf list metricgroups 2>/dev/null | grep '{}' | head -1",
                        pattern
                    ))
                    .await?;
                let group = found.stdout.trim().to_string();
                if group.is_empty() {
                    return Ok(None);
                }
                value = Some(group);
            }
            _ => {}
        }
        if matches!(option, "-t" | "--tid" | "-p" | "--pid") {
            value = Some("$$".to_string());
        }
        if option == "--input" {
            let path = value.clone().unwrap_or_else(|| "events_dir/input".to_string());
            ctx.shell(format!(
                "mkdir -p events_dir && printf 'cycles,instructions\\n' > {}",
                quote(&path)
            ))
            .await?;
            self.created.push("events_dir".to_string());
            value = Some(path);
        }
        if matches!(option, "--post" | "--pre") {
            let path = value.clone().unwrap_or_else(|| format!("{}.sh", option.trim_start_matches('-')));
            ctx.shell(format!(
                "test -e {0} || {{ printf '#!/bin/sh\\nsleep 0.1\\n' > {0} && chmod 755 {0}; }}",
                quote(&path)
            ))
            .await?;
            self.created.push(path.clone());
            value = Some(path);
        }
        Ok(Some(value))
    }
}

#[async_trait]
impl TestCase for PerfOptions {
    fn kind(&self) -> &'static str {
        "perf_options"
    }

    async fn setup(&mut self, ctx: &mut CaseContext) -> CaseResult<()> {
        let packages = perf_packages(&ctx.platform)?;
        ctx.require_packages(&packages).await?;

        let mut candidates: BTreeSet<String> = if self.options.options.is_empty() {
            let help = ctx.shell("perf stat --help").await?;
            help_options(&help.combined_output())
        } else {
            self.options
                .options
                .iter()
                .filter_map(|o| sanitize_option(o))
                .collect()
        };
        for excluded in &self.options.exclude {
            candidates.remove(excluded);
        }
        if candidates.is_empty() {
            return Err(cancel("no perf stat options to test"));
        }
        ctx.log.info(format!(
            "options to test: {}",
            candidates.iter().cloned().collect::<Vec<_>>().join(" ")
        ));
        self.to_test = candidates.into_iter().collect();
        Ok(())
    }

    async fn run(&mut self, ctx: &mut CaseContext) -> CaseResult<Outcome> {
        let mut outcome = Outcome::new();
        self.skipped.clear();
        for option in self.to_test.clone() {
            if let Some(marker) = self.options.unsupported.iter().find(|m| option.contains(m.as_str())) {
                self.skipped.push((option.clone(), format!("needs {}", marker)));
                continue;
            }
            let Some(value) = self.resolve_value(ctx, &option).await? else {
                self.skipped
                    .push((option.clone(), "not available on this system".to_string()));
                continue;
            };
            let command = self.command(&option, value.as_deref());
            outcome.push(option, ctx.shell(command).await?);
        }
        Ok(outcome)
    }

    fn evaluate(&self, outcome: &Outcome) -> Evaluation {
        let mut evaluation = Evaluation::new();
        for (option, why) in &self.skipped {
            evaluation.note(format!("skipped option {}: {}", option, why));
        }

        let policy = ExitPolicy::zero_only().with_not_applicable(&[UNKNOWN_OPTION_EXIT]);
        let mut failed = Vec::new();
        for step in &outcome.steps {
            let result = &step.result;
            let unknown = result.stderr.to_lowercase().contains("unknown option");
            match policy.judge(result) {
                ExitJudgement::Accepted => {}
                ExitJudgement::NotApplicable => {
                    evaluation.note(format!("skipped option {}: unknown option", step.label));
                }
                ExitJudgement::Rejected if unknown => {
                    evaluation.note(format!("skipped option {}: unknown option", step.label));
                }
                ExitJudgement::Rejected => {
                    let first_line = result.stderr.lines().find(|l| !l.trim().is_empty());
                    let status = result.status_display();
                    failed.push(match first_line {
                        Some(line) => format!("`{}` -> {} ({})", result.command, status, line.trim()),
                        None => format!("`{}` -> {}", result.command, status),
                    });
                }
            }
        }
        if !failed.is_empty() {
            evaluation.fail(format!("{} options failed: {}", failed.len(), failed.join(", ")));
        }
        evaluation
    }

    async fn teardown(&mut self, ctx: &mut CaseContext) -> Result<()> {
        for path in std::mem::take(&mut self.created) {
            ctx.shell(format!("rm -rf {}", quote(&path))).await?;
        }
        Ok(())
    }
}
