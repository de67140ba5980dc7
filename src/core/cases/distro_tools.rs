//! Exercises the POWER distribution tools `lsslot`, `netstat` and `lsprop`,
//! once per requested option.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::core::config::{Params, string_list};
use crate::core::evaluator::{Evaluation, ExitPolicy};
use crate::core::lifecycle::{CaseContext, CaseResult, TestCase, cancel, skip};
use crate::core::models::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Lsslot,
    Netstat,
    Lsprop,
}

impl Tool {
    pub fn binary(self) -> &'static str {
        match self {
            Tool::Lsslot => "lsslot",
            Tool::Netstat => "netstat",
            Tool::Lsprop => "lsprop",
        }
    }

    /// The package that ships the tool.
    pub fn package(self) -> &'static str {
        match self {
            Tool::Lsslot | Tool::Lsprop => "powerpc-utils",
            Tool::Netstat => "net-tools",
        }
    }

    pub fn command(self, option: &str) -> String {
        match self {
            Tool::Lsslot if option == "pci" => format!("lsslot -d {}", option),
            Tool::Lsslot => format!("lsslot -c {}", option),
            Tool::Netstat => format!("netstat -{}", option),
            Tool::Lsprop if option == "r" => format!("lsprop --{}", option),
            Tool::Lsprop => format!("lsprop -{}", option),
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            Tool::Lsslot => "Failed to display hot plug slots",
            Tool::Netstat => "Failed to monitoring network connections",
            Tool::Lsprop => "lsprop failed",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistroToolsOptions {
    pub tool: Tool,
    /// Options to exercise, as a list or a comma separated string.
    #[serde(default, alias = "option", deserialize_with = "string_list")]
    pub test_opt: Vec<String>,
}

pub struct DistroTools {
    options: DistroToolsOptions,
}

pub fn build(params: &Params) -> Result<Box<dyn TestCase>> {
    Ok(Box::new(DistroTools::new(params.decode()?)))
}

impl DistroTools {
    pub fn new(options: DistroToolsOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl TestCase for DistroTools {
    fn kind(&self) -> &'static str {
        "distro_tools"
    }

    async fn setup(&mut self, ctx: &mut CaseContext) -> CaseResult<()> {
        let tool = self.options.tool;
        if tool == Tool::Lsslot && !ctx.platform.is_power_vm() {
            return Err(skip("supported only on PowerVM platform"));
        }
        if self.options.test_opt.is_empty() {
            return Err(cancel(format!("no test_opt given for {}", tool.binary())));
        }
        let probe = ctx.shell(format!("command -v {}", tool.binary())).await?;
        if !probe.success() {
            ctx.require_packages(&[tool.package()]).await?;
        }
        Ok(())
    }

    async fn run(&mut self, ctx: &mut CaseContext) -> CaseResult<Outcome> {
        let mut outcome = Outcome::new();
        for option in &self.options.test_opt {
            let result = ctx.shell(self.options.tool.command(option)).await?;
            outcome.push(option.clone(), result);
        }
        Ok(outcome)
    }

    fn evaluate(&self, outcome: &Outcome) -> Evaluation {
        let mut evaluation = Evaluation::new();
        let policy = ExitPolicy::zero_only();
        for step in &outcome.steps {
            evaluation.check_exit(&step.result, &policy, self.options.tool.failure_message());
        }
        evaluation
    }
}
