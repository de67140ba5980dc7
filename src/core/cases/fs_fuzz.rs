//! fs-fuzz: two small fuzzers for file system operations, one through raw file
//! descriptors and one through C streams. After each fuzzer the kernel ring
//! buffer is checked for signs of trouble.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use crate::core::config::Params;
use crate::core::evaluator::{Evaluation, ExitPolicy, Rule, RuleSet};
use crate::core::lifecycle::{CaseContext, CaseResult, TestCase};
use crate::core::models::Outcome;
use crate::infra::assets::AssetRequest;

pub const SOURCE_URL: &str = "https://github.com/regehr/fs-fuzz/archive/master.zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fuzzer {
    Fd,
    File,
}

impl Fuzzer {
    pub fn binary(self) -> &'static str {
        match self {
            Fuzzer::Fd => "fd_fuzz",
            Fuzzer::File => "file_fuzz",
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            Fuzzer::Fd => "stress test for  file I/O layer failed",
            Fuzzer::File => "stress test for the C streams layer failed",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FsFuzzOptions {
    #[serde(default = "default_fuzzers")]
    pub fuzzers: Vec<Fuzzer>,
    /// Argument handed to each fuzzer.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_source_url")]
    pub source_url: String,
}

fn default_fuzzers() -> Vec<Fuzzer> {
    vec![Fuzzer::Fd, Fuzzer::File]
}

fn default_iterations() -> u32 {
    1
}

fn default_source_url() -> String {
    SOURCE_URL.to_string()
}

/// Ring-buffer markers checked after every fuzzer.
pub fn dmesg_rules() -> RuleSet {
    let mut rules = RuleSet::new(
        ["WARNING: CPU:", "Oops", "Segfault", "soft lockup", "Unable to handle"]
            .into_iter()
            .map(|p| Rule::fail(p).with_message(format!("Test Failed : {} in dmesg", p)))
            .collect(),
    );
    rules.push(
        Rule::fail("Call Trace:")
            .ignore_case()
            .with_message("some call traces seen please check"),
    );
    rules
}

pub struct FsFuzz {
    options: FsFuzzOptions,
    build_dir: Option<PathBuf>,
}

pub fn build(params: &Params) -> Result<Box<dyn TestCase>> {
    Ok(Box::new(FsFuzz::new(params.decode()?)))
}

impl FsFuzz {
    pub fn new(options: FsFuzzOptions) -> Self {
        Self {
            options,
            build_dir: None,
        }
    }
}

#[async_trait]
impl TestCase for FsFuzz {
    fn kind(&self) -> &'static str {
        "fs_fuzz"
    }

    async fn setup(&mut self, ctx: &mut CaseContext) -> CaseResult<()> {
        ctx.require_packages(&["make", "gcc"]).await?;
        let request = AssetRequest::download("fs-fuzz.zip", &self.options.source_url).expire("7d");
        let archive = ctx.fetch_asset(&request).await?;
        let build_dir = ctx.extract(&archive).await?;
        ctx.make(&build_dir, None, "").await?;
        self.build_dir = Some(build_dir);
        Ok(())
    }

    async fn run(&mut self, ctx: &mut CaseContext) -> CaseResult<Outcome> {
        let dir = self.build_dir.clone().unwrap_or_else(|| ctx.workdir.clone());
        let mut outcome = Outcome::new();
        for fuzzer in &self.options.fuzzers {
            // Each fuzzer is judged on its own slice of the ring buffer.
            ctx.clear_dmesg().await?;
            let command = format!("./{} {}", fuzzer.binary(), self.options.iterations);
            outcome.push(fuzzer.binary(), ctx.shell_in(&dir, command).await?);
            outcome.push(format!("dmesg:{}", fuzzer.binary()), ctx.read_dmesg().await?);
        }
        Ok(outcome)
    }

    fn evaluate(&self, outcome: &Outcome) -> Evaluation {
        let mut evaluation = Evaluation::new();
        let policy = ExitPolicy::zero_only();
        let rules = dmesg_rules();
        for fuzzer in &self.options.fuzzers {
            if let Some(result) = outcome.result(fuzzer.binary()) {
                evaluation.check_exit(result, &policy, fuzzer.failure_message());
            }
            let label = format!("dmesg:{}", fuzzer.binary());
            if let Some(dmesg) = outcome.result(&label) {
                rules.apply("dmesg", &dmesg.stdout, &mut evaluation);
            }
        }
        evaluation
    }
}
