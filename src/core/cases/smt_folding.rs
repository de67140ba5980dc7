//! SMT folding throughput: a single-threaded ebizzy pinned to one CPU must do
//! more work with SMT switched off than with SMT on.

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use crate::core::cases::{EBIZZY_URL, build_ebizzy};
use crate::core::config::Params;
use crate::core::evaluator::{Evaluation, ExitJudgement, ExitPolicy, exceeds, number_before, parse_number};
use crate::core::lifecycle::{CaseContext, CaseResult, TestCase, cancel};
use crate::core::models::Outcome;
use crate::infra::platform::DistroFamily;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmtFoldingOptions {
    #[serde(default)]
    pub cpu: u32,
    #[serde(default = "default_source_url")]
    pub source_url: String,
    /// Path or URL of a `-p0` patch applied before building.
    #[serde(default)]
    pub patch: Option<String>,
    #[serde(default = "default_args")]
    pub ebizzy_args: String,
}

fn default_source_url() -> String {
    EBIZZY_URL.to_string()
}

fn default_args() -> String {
    "-t1 -S 6 -s 4096".to_string()
}

/// Records per second reported by ebizzy: the number before `records/s`,
/// or the first token of the output.
pub fn ebizzy_throughput(output: &str) -> Option<f64> {
    number_before(output, "records/s")
        .or_else(|| output.split_whitespace().next().and_then(parse_number))
}

pub struct SmtFolding {
    options: SmtFoldingOptions,
    source_dir: Option<PathBuf>,
    idle_disabled: bool,
    smt_changed: bool,
}

pub fn build(params: &Params) -> Result<Box<dyn TestCase>> {
    Ok(Box::new(SmtFolding::new(params.decode()?)))
}

impl SmtFolding {
    pub fn new(options: SmtFoldingOptions) -> Self {
        Self {
            options,
            source_dir: None,
            idle_disabled: false,
            smt_changed: false,
        }
    }

    fn ebizzy_command(&self) -> String {
        format!("taskset -c {} ./ebizzy {}", self.options.cpu, self.options.ebizzy_args)
    }
}

#[async_trait]
impl TestCase for SmtFolding {
    fn kind(&self) -> &'static str {
        "smt_folding"
    }

    async fn setup(&mut self, ctx: &mut CaseContext) -> CaseResult<()> {
        if !ctx.platform.is_power() {
            return Err(cancel("Processor is not ppc64"));
        }
        let mut packages = vec!["gcc".to_string(), "make".to_string(), "patch".to_string()];
        match ctx.platform.family() {
            DistroFamily::Debian => packages.extend([
                "linux-tools-common".to_string(),
                format!("linux-tools-{}", ctx.platform.kernel_release),
            ]),
            DistroFamily::Suse => packages.push("cpupower".to_string()),
            _ => packages.push("kernel-tools".to_string()),
        }
        ctx.require_packages(&packages).await?;

        let source_url = self.options.source_url.clone();
        let patch = self.options.patch.clone();
        self.source_dir = Some(build_ebizzy(ctx, &source_url, patch.as_deref(), "").await?);
        Ok(())
    }

    async fn run(&mut self, ctx: &mut CaseContext) -> CaseResult<Outcome> {
        let dir = self.source_dir.clone().unwrap_or_else(|| ctx.workdir.clone());
        let mut outcome = Outcome::new();

        let cpu_online = format!("/sys/devices/system/cpu/cpu{}/online", self.options.cpu);
        ctx.sudo(format!("test ! -e {0} || echo 1 > {0}", cpu_online)).await?;

        let idle = ctx.sudo("cpupower idle-set -D 0").await?;
        self.idle_disabled = idle.success();
        outcome.push("idle-disable", idle);

        self.smt_changed = true;
        outcome.push("smt-off", ctx.sudo("ppc64_cpu --smt=off").await?);
        outcome.push("ebizzy:smt-off", ctx.shell_in(&dir, self.ebizzy_command()).await?);
        outcome.push("smt-on", ctx.sudo("ppc64_cpu --smt=on").await?);
        outcome.push("ebizzy:smt-on", ctx.shell_in(&dir, self.ebizzy_command()).await?);
        Ok(outcome)
    }

    fn evaluate(&self, outcome: &Outcome) -> Evaluation {
        let mut evaluation = Evaluation::new();
        let policy = ExitPolicy::zero_only();
        for label in ["smt-off", "smt-on"] {
            if let Some(result) = outcome.result(label) {
                evaluation.check_exit(result, &policy, "could not change the SMT mode");
            }
        }

        let mut throughput = |label: &str| -> Option<f64> {
            let result = outcome.result(label)?;
            if evaluation.check_exit(result, &policy, "ebizzy failed") != ExitJudgement::Accepted {
                return None;
            }
            let value = ebizzy_throughput(&result.stdout);
            if value.is_none() {
                evaluation.fail(format!("no throughput in the output of `{}`", result.command));
            }
            value
        };
        let off = throughput("ebizzy:smt-off");
        let on = throughput("ebizzy:smt-on");

        if let (Some(off), Some(on)) = (off, on) {
            if exceeds(off, on) {
                evaluation.note(format!(
                    "Single thread performance is better than multi-thread performance ({} > {} records/s)",
                    off, on
                ));
            } else {
                evaluation.fail(format!(
                    "Performance is degraded when SMT off ({} records/s with SMT off, {} with SMT on)",
                    off, on
                ));
            }
        }
        evaluation
    }

    async fn teardown(&mut self, ctx: &mut CaseContext) -> Result<()> {
        let mut problems = Vec::new();
        if self.smt_changed {
            let result = ctx.sudo("ppc64_cpu --smt=on").await?;
            if !result.success() {
                problems.push(format!("could not restore SMT: {}", result.status_display()));
            }
        }
        if self.idle_disabled {
            let result = ctx.sudo("cpupower idle-set -E 0").await?;
            if !result.success() {
                problems.push(format!(
                    "could not re-enable idle states: {}",
                    result.status_display()
                ));
            }
        }
        if !problems.is_empty() {
            bail!(problems.join("; "));
        }
        Ok(())
    }
}
