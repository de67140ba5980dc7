//! flail, a system call fuzzer. Its exit status means nothing; the verdict
//! comes from call traces in the kernel ring buffer.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use crate::core::cases::asset_name;
use crate::core::config::Params;
use crate::core::evaluator::{Evaluation, ExitPolicy, Rule, RuleSet};
use crate::core::lifecycle::{CaseContext, CaseResult, TestCase};
use crate::core::models::Outcome;
use crate::infra::assets::AssetRequest;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlailOptions {
    /// Arguments passed to `./flail`.
    #[serde(default)]
    pub args: String,
    /// Path or URL of the flail source tarball.
    #[serde(default = "default_tarball")]
    pub tarball: String,
}

fn default_tarball() -> String {
    "flail-0.2.0.tar.gz".to_string()
}

pub fn call_trace_rules() -> RuleSet {
    RuleSet::new(vec![
        Rule::fail("Call Trace:")
            .ignore_case()
            .with_message("some call traces seen please check"),
    ])
}

pub struct Flail {
    options: FlailOptions,
    build_dir: Option<PathBuf>,
}

pub fn build(params: &Params) -> Result<Box<dyn TestCase>> {
    Ok(Box::new(Flail::new(params.decode()?)))
}

impl Flail {
    pub fn new(options: FlailOptions) -> Self {
        Self {
            options,
            build_dir: None,
        }
    }
}

#[async_trait]
impl TestCase for Flail {
    fn kind(&self) -> &'static str {
        "flail"
    }

    async fn setup(&mut self, ctx: &mut CaseContext) -> CaseResult<()> {
        ctx.require_packages(&["gcc", "make"]).await?;
        let location = ctx.local_location(&self.options.tarball);
        let request = AssetRequest::download(asset_name(&location), location);
        let tarball = ctx.fetch_asset(&request).await?;
        let build_dir = ctx.extract(&tarball).await?;
        ctx.make(&build_dir, None, "").await?;
        self.build_dir = Some(build_dir);
        Ok(())
    }

    async fn run(&mut self, ctx: &mut CaseContext) -> CaseResult<Outcome> {
        let dir = self.build_dir.clone().unwrap_or_else(|| ctx.workdir.clone());
        let mut outcome = Outcome::new();
        ctx.clear_dmesg().await?;
        let command = format!("./flail {}", self.options.args).trim_end().to_string();
        outcome.push("flail", ctx.shell_in(&dir, command).await?);
        outcome.push("dmesg", ctx.read_dmesg().await?);
        Ok(outcome)
    }

    fn evaluate(&self, outcome: &Outcome) -> Evaluation {
        let mut evaluation = Evaluation::new();
        if let Some(result) = outcome.result("flail") {
            evaluation.check_exit(result, &ExitPolicy::ignore_status(), "flail failed");
        }
        if let Some(dmesg) = outcome.result("dmesg") {
            call_trace_rules().apply("dmesg", &dmesg.stdout, &mut evaluation);
        }
        evaluation
    }
}
