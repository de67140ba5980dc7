//! Core IMC (In-Memory Collection) counters on PowerNV must keep counting:
//! `perf stat -I 1000` samples of each event may contain at most one zero.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::core::cases::perf_packages;
use crate::core::config::{Params, string_list};
use crate::core::evaluator::{Evaluation, ExitPolicy, ExitJudgement, Threshold, column_values};
use crate::core::lifecycle::{CaseContext, CaseResult, TestCase, cancel, skip};
use crate::core::models::Outcome;
use crate::infra::command::CommandRequest;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImcNonzeroOptions {
    #[serde(default = "default_events", deserialize_with = "string_list")]
    pub events: Vec<String>,
    #[serde(default)]
    pub cpu: u32,
    #[serde(default = "default_duration")]
    pub duration_secs: u64,
    #[serde(default = "default_max_zero")]
    pub max_zero_samples: usize,
}

fn default_events() -> Vec<String> {
    vec!["CPM_CCYC".to_string(), "CPM_32MHZ_CYC".to_string()]
}

fn default_duration() -> u64 {
    5
}

fn default_max_zero() -> usize {
    1
}

pub struct ImcNonzero {
    options: ImcNonzeroOptions,
}

pub fn build(params: &Params) -> Result<Box<dyn TestCase>> {
    Ok(Box::new(ImcNonzero::new(params.decode()?)))
}

impl ImcNonzero {
    pub fn new(options: ImcNonzeroOptions) -> Self {
        Self { options }
    }

    pub fn command(&self, event: &str) -> String {
        format!(
            "perf stat -e core_imc/{}/ -C {} -I 1000 sleep {}",
            event, self.options.cpu, self.options.duration_secs
        )
    }
}

/// The counts of a `perf stat -I` interval report (second column),
/// skipping the header and comment lines.
pub fn interval_counts(output: &str) -> Vec<f64> {
    column_values(output, 1, &["time", "#"])
}

#[async_trait]
impl TestCase for ImcNonzero {
    fn kind(&self) -> &'static str {
        "imc_nonzero"
    }

    async fn setup(&mut self, ctx: &mut CaseContext) -> CaseResult<()> {
        if !ctx.platform.is_power_nv() {
            return Err(skip("This test is for PowerNV"));
        }
        let packages = perf_packages(&ctx.platform)?;
        ctx.require_packages(&packages).await?;

        // Keeps the cores busy so the counters have something to count.
        let load = CommandRequest::shell("ppc64_cpu --frequency -t 10 > /dev/null 2>&1 &")
            .in_dir(&ctx.workdir);
        ctx.run(load).await?;

        let list = ctx.shell("perf list").await?;
        if !list.combined_output().contains("core_imc") {
            return Err(cancel("core_imc not found"));
        }
        ctx.log.info("core_imc is present");
        Ok(())
    }

    async fn run(&mut self, ctx: &mut CaseContext) -> CaseResult<Outcome> {
        let mut outcome = Outcome::new();
        for event in &self.options.events {
            outcome.push(event.clone(), ctx.sudo(self.command(event)).await?);
        }
        Ok(outcome)
    }

    fn evaluate(&self, outcome: &Outcome) -> Evaluation {
        let mut evaluation = Evaluation::new();
        let threshold = Threshold::ZeroCountAtMost(self.options.max_zero_samples);
        for step in &outcome.steps {
            let result = &step.result;
            let judgement =
                evaluation.check_exit(result, &ExitPolicy::zero_only(), "perf stat failed");
            if judgement != ExitJudgement::Accepted {
                continue;
            }
            let counts = interval_counts(&result.combined_output());
            if counts.is_empty() {
                evaluation.fail(format!("{} : no samples were reported", result.command));
                continue;
            }
            if let Err(violation) = threshold.check(&counts) {
                evaluation.fail(format!(
                    "{} : command failed with zero count ({})",
                    result.command, violation
                ));
            }
        }
        evaluation
    }

    async fn teardown(&mut self, ctx: &mut CaseContext) -> Result<()> {
        ctx.shell("pkill ppc64_cpu").await?;
        Ok(())
    }
}
