//! Soft-dirty bits stability probe: dirties memory pages, then counts the
//! soft-dirty bits in `/proc/<pid>/pagemap`. A zero count is a failure.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use crate::core::config::Params;
use crate::core::evaluator::{Evaluation, ExitPolicy};
use crate::core::lifecycle::{CaseContext, CaseResult, TestCase};
use crate::core::models::Outcome;
use crate::infra::assets::AssetRequest;
use crate::infra::command::quote;

pub const SOURCE_URL: &str = "https://gist.githubusercontent.com/Zayat/3fa1f18388543dc1b9025aabf8f15b64/raw/b5049e4fc7a985c821320d22ca3e39d49dc7ea1a/test_sd_stability.c";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoftDirtyOptions {
    #[serde(default = "default_source_url")]
    pub source_url: String,
}

fn default_source_url() -> String {
    SOURCE_URL.to_string()
}

pub struct SoftDirty {
    options: SoftDirtyOptions,
    source: Option<PathBuf>,
}

pub fn build(params: &Params) -> Result<Box<dyn TestCase>> {
    Ok(Box::new(SoftDirty::new(params.decode()?)))
}

impl SoftDirty {
    pub fn new(options: SoftDirtyOptions) -> Self {
        Self {
            options,
            source: None,
        }
    }
}

#[async_trait]
impl TestCase for SoftDirty {
    fn kind(&self) -> &'static str {
        "soft_dirty"
    }

    async fn setup(&mut self, ctx: &mut CaseContext) -> CaseResult<()> {
        ctx.require_packages(&["gcc"]).await?;
        let request =
            AssetRequest::download("test_sd_stability.c", &self.options.source_url).expire("7d");
        self.source = Some(ctx.fetch_asset(&request).await?);
        Ok(())
    }

    async fn run(&mut self, ctx: &mut CaseContext) -> CaseResult<Outcome> {
        let mut outcome = Outcome::new();
        let source = self
            .source
            .as_ref()
            .map(|p| quote(&p.to_string_lossy()))
            .unwrap_or_else(|| "test_sd_stability.c".to_string());
        let compile = ctx.shell(format!("gcc {} -o test_sd_stable", source)).await?;
        let compiled = compile.success();
        outcome.push("build", compile);
        if compiled {
            outcome.push("probe", ctx.shell("./test_sd_stable").await?);
        }
        Ok(outcome)
    }

    fn evaluate(&self, outcome: &Outcome) -> Evaluation {
        let mut evaluation = Evaluation::new();
        let policy = ExitPolicy::zero_only();
        if let Some(build) = outcome.result("build") {
            evaluation.check_exit(build, &policy, "Failed to build test case");
        }
        if let Some(probe) = outcome.result("probe") {
            evaluation.check_exit(
                probe,
                &policy,
                "Soft-dirty bits test failed, please check the logs!",
            );
        }
        evaluation
    }
}
