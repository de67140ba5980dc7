//! Runs an ebizzy workload while `perf top` samples the whole system; the
//! workload has to show up in the monitor's report.
//!
//! 在 `perf top` 对整个系统采样的同时运行 ebizzy 负载；负载必须出现在监视器的报告中。

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::cases::{EBIZZY_URL, build_ebizzy, perf_packages};
use crate::core::config::Params;
use crate::core::evaluator::{Evaluation, ExitPolicy};
use crate::core::lifecycle::{CaseContext, CaseResult, TestCase};
use crate::core::models::{CommandResult, Outcome};
use crate::infra::command::{CommandRequest, ProcessRunner};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EbizzyPerfTopOptions {
    #[serde(default = "default_source_url")]
    pub source_url: String,
    #[serde(default = "default_workload_args")]
    pub workload_args: String,
    /// How long `perf top` samples before it is stopped.
    #[serde(default = "default_monitor_secs")]
    pub monitor_secs: u64,
}

fn default_source_url() -> String {
    EBIZZY_URL.to_string()
}

fn default_workload_args() -> String {
    "-S1 -s1024 -t10".to_string()
}

fn default_monitor_secs() -> u64 {
    10
}

pub struct EbizzyPerfTop {
    options: EbizzyPerfTopOptions,
    source_dir: Option<PathBuf>,
}

pub fn build(params: &Params) -> Result<Box<dyn TestCase>> {
    Ok(Box::new(EbizzyPerfTop::new(params.decode()?)))
}

impl EbizzyPerfTop {
    pub fn new(options: EbizzyPerfTopOptions) -> Self {
        Self {
            options,
            source_dir: None,
        }
    }
}

/// Starts the workload and the monitor as two tasks and waits for both.
/// Neither result is looked at before both have finished.
pub async fn run_alongside(
    runner: Arc<dyn ProcessRunner>,
    workload: CommandRequest,
    monitor: CommandRequest,
) -> Result<(CommandResult, CommandResult)> {
    let workload_runner = runner.clone();
    let workload_task = tokio::spawn(async move { workload_runner.run(&workload).await });
    let monitor_task = tokio::spawn(async move { runner.run(&monitor).await });

    let (workload, monitor) = tokio::join!(workload_task, monitor_task);
    let workload = workload.context("workload task panicked")??;
    let monitor = monitor.context("monitor task panicked")??;
    Ok((workload, monitor))
}

#[async_trait]
impl TestCase for EbizzyPerfTop {
    fn kind(&self) -> &'static str {
        "ebizzy_perf_top"
    }

    async fn setup(&mut self, ctx: &mut CaseContext) -> CaseResult<()> {
        let mut packages = vec!["gcc".to_string(), "make".to_string()];
        packages.extend(perf_packages(&ctx.platform)?);
        ctx.require_packages(&packages).await?;

        let source_url = self.options.source_url.clone();
        self.source_dir = Some(build_ebizzy(ctx, &source_url, None, "LDFLAGS=-static").await?);
        Ok(())
    }

    async fn run(&mut self, ctx: &mut CaseContext) -> CaseResult<Outcome> {
        let dir = self.source_dir.clone().unwrap_or_else(|| ctx.workdir.clone());
        let workload = CommandRequest::shell(format!("./ebizzy {}", self.options.workload_args))
            .in_dir(&dir);
        let monitor = CommandRequest::shell("perf top -a --stdio")
            .sudo()
            .in_dir(&ctx.workdir)
            .timeout(Duration::from_secs(self.options.monitor_secs));

        let (workload, monitor) = run_alongside(ctx.caps.runner.clone(), workload, monitor).await?;
        ctx.log.command(&workload);
        ctx.log.command(&monitor);

        let mut outcome = Outcome::new();
        outcome.push("workload", workload);
        outcome.push("monitor", monitor);
        Ok(outcome)
    }

    fn evaluate(&self, outcome: &Outcome) -> Evaluation {
        let mut evaluation = Evaluation::new();
        if let Some(workload) = outcome.result("workload") {
            evaluation.check_exit(workload, &ExitPolicy::zero_only(), "ebizzy workload failed");
        }
        // The monitor is stopped by its timeout, so only its report matters.
        match outcome.result("monitor") {
            Some(monitor) if monitor.combined_output().contains("ebizzy") => {
                evaluation.note("ebizzy workload captured in perf top");
            }
            _ => evaluation.fail("ebizzy workload not captured in perf top"),
        }
        evaluation
    }
}
