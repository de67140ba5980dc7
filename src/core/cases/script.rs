//! # Script Case / 脚本用例
//!
//! A fully configuration-driven case covering the common wrapper shape:
//! install packages, fetch (and optionally build) a source, run a command once
//! per variant, then judge exit codes, output markers and the kernel ring buffer.
//!
//! 完全由配置驱动的用例，覆盖常见的封装形式：安装软件包、获取（并可选构建）源码、
//! 按每个变体运行一次命令，然后判定退出码、输出标记和内核环形缓冲区。
//!
//! ```toml
//! [[cases]]
//! name = "stress-ng-cpu"
//! kind = "script"
//! with = { packages = ["stress-ng"], command = "stress-ng --{variant} 2 -t 10", variants = "cpu,vm", check_dmesg = true }
//! ```

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::cases::asset_name;
use crate::core::config::{Params, string_list};
use crate::core::evaluator::{Evaluation, ExitJudgement, ExitPolicy, Rule, RuleSet};
use crate::core::lifecycle::{CaseContext, CaseResult, TestCase};
use crate::core::models::Outcome;
use crate::infra::assets::{AssetKind, AssetRequest};
use crate::infra::command::CommandRequest;
use crate::infra::fs::copy_dir_all;

/// Placeholder replaced by the current variant in `command`.
pub const VARIANT_PLACEHOLDER: &str = "{variant}";

const ARCHIVE_SUFFIXES: &[&str] = &[
    ".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tar.xz", ".txz", ".zip",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptOptions {
    #[serde(default, deserialize_with = "string_list")]
    pub packages: Vec<String>,

    /// URL, local path or git repository of the source under test.
    /// A local directory is copied into the work directory before building.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub git: bool,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default = "default_expire")]
    pub expire: String,

    /// Arguments for `./configure`; configure is skipped when unset.
    #[serde(default)]
    pub configure: Option<String>,
    #[serde(default)]
    pub make: bool,
    #[serde(default)]
    pub make_target: Option<String>,
    #[serde(default)]
    pub make_args: String,

    /// The subject command; `{variant}` is replaced by each variant in turn.
    pub command: String,
    #[serde(default, deserialize_with = "string_list")]
    pub variants: Vec<String>,
    #[serde(default)]
    pub sudo: bool,
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,

    #[serde(default = "default_accept_exit")]
    pub accept_exit: Vec<i32>,
    #[serde(default)]
    pub not_applicable_exit: Vec<i32>,
    #[serde(default)]
    pub ignore_exit: bool,
    #[serde(default)]
    pub failure_message: Option<String>,

    #[serde(default, deserialize_with = "string_list")]
    pub fail_patterns: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub warn_patterns: Vec<String>,
    #[serde(default)]
    pub ignore_case: bool,

    /// Clear the ring buffer before the run and scan it for oopses afterwards.
    #[serde(default)]
    pub check_dmesg: bool,

    /// Cleanup commands, run in order. Listed, not comma separated.
    #[serde(default)]
    pub teardown: Vec<String>,
}

fn default_expire() -> String {
    "7d".to_string()
}

fn default_accept_exit() -> Vec<i32> {
    vec![0]
}

impl ScriptOptions {
    pub fn exit_policy(&self) -> ExitPolicy {
        if self.ignore_exit {
            ExitPolicy::ignore_status()
        } else {
            ExitPolicy::accepting(&self.accept_exit).with_not_applicable(&self.not_applicable_exit)
        }
    }

    pub fn output_rules(&self) -> RuleSet {
        let mut rules = RuleSet::default();
        let patterns = self
            .fail_patterns
            .iter()
            .map(|p| Rule::fail(p.as_str()))
            .chain(self.warn_patterns.iter().map(|p| Rule::warn(p.as_str())));
        for rule in patterns {
            rules.push(if self.ignore_case { rule.ignore_case() } else { rule });
        }
        rules
    }

    /// `(label, command)` for every variant; a single unlabelled run when there are none.
    pub fn commands(&self) -> Vec<(String, String)> {
        if self.variants.is_empty() {
            return vec![("command".to_string(), self.command.clone())];
        }
        self.variants
            .iter()
            .map(|v| (v.clone(), self.command.replace(VARIANT_PLACEHOLDER, v)))
            .collect()
    }
}

pub struct Script {
    options: ScriptOptions,
    run_dir: Option<PathBuf>,
}

pub fn build(params: &Params) -> Result<Box<dyn TestCase>> {
    Ok(Box::new(Script::new(params.decode()?)?))
}

impl Script {
    pub fn new(options: ScriptOptions) -> Result<Self> {
        if options.command.trim().is_empty() {
            bail!("`command` must not be empty");
        }
        if options.variants.is_empty() && options.command.contains(VARIANT_PLACEHOLDER) {
            bail!("`command` uses {} but no `variants` are given", VARIANT_PLACEHOLDER);
        }
        if (options.configure.is_some() || options.make) && options.source.is_none() {
            bail!("`configure`/`make` need a `source`");
        }
        Ok(Self {
            options,
            run_dir: None,
        })
    }

    /// Downloads or clones `source`; archives are extracted into the work directory.
    async fn fetch_source(&self, ctx: &mut CaseContext, source: &str) -> CaseResult<PathBuf> {
        let name = asset_name(source);
        let mut request = AssetRequest::download(name.trim_end_matches(".git"), source)
            .expire(self.options.expire.as_str());
        if self.options.git {
            request.kind = AssetKind::Git;
            request.branch = self.options.branch.clone();
        }
        let fetched = ctx.fetch_asset(&request).await?;
        if self.options.git {
            Ok(fetched)
        } else if is_archive(&name) {
            ctx.extract(&fetched).await
        } else {
            Ok(ctx.workdir.clone())
        }
    }

    fn request(&self, command: String) -> CommandRequest {
        let mut request = CommandRequest::shell(command);
        if self.options.sudo {
            request = request.sudo();
        }
        if let Some(secs) = self.options.command_timeout_secs {
            request = request.timeout(Duration::from_secs(secs));
        }
        request
    }
}

fn is_archive(name: &str) -> bool {
    let name = name.to_lowercase();
    ARCHIVE_SUFFIXES.iter().any(|s| name.ends_with(s))
}

#[async_trait]
impl TestCase for Script {
    fn kind(&self) -> &'static str {
        "script"
    }

    async fn setup(&mut self, ctx: &mut CaseContext) -> CaseResult<()> {
        ctx.require_packages(&self.options.packages).await?;

        if let Some(source) = self.options.source.as_deref() {
            let source = ctx.local_location(source);
            let local = Path::new(&source);
            let dir = if !self.options.git && local.is_dir() {
                let copied = copy_dir_all(local, &ctx.workdir)?;
                ctx.log.info(format!("copied {} into {}", source, copied.display()));
                copied
            } else {
                self.fetch_source(ctx, &source).await?
            };
            if let Some(args) = self.options.configure.clone() {
                ctx.configure(&dir, &args).await?;
            }
            if self.options.make {
                let target = self.options.make_target.clone();
                let args = self.options.make_args.clone();
                ctx.make(&dir, target.as_deref(), &args).await?;
            }
            self.run_dir = Some(dir);
        }

        if self.options.check_dmesg {
            ctx.clear_dmesg().await?;
        }
        Ok(())
    }

    async fn run(&mut self, ctx: &mut CaseContext) -> CaseResult<Outcome> {
        let dir = self.run_dir.clone().unwrap_or_else(|| ctx.workdir.clone());
        let mut outcome = Outcome::new();
        for (label, command) in self.options.commands() {
            let request = self.request(command).in_dir(&dir);
            outcome.push(label, ctx.run(request).await?);
        }
        if self.options.check_dmesg {
            outcome.push("dmesg", ctx.read_dmesg().await?);
        }
        Ok(outcome)
    }

    fn evaluate(&self, outcome: &Outcome) -> Evaluation {
        let mut evaluation = Evaluation::new();
        let policy = self.options.exit_policy();
        let rules = self.options.output_rules();
        let message = self
            .options
            .failure_message
            .as_deref()
            .unwrap_or("command failed");

        for (label, _) in self.options.commands() {
            let Some(result) = outcome.result(&label) else {
                continue;
            };
            if evaluation.check_exit(result, &policy, message) == ExitJudgement::NotApplicable {
                evaluation.note(format!("variant {} does not apply here", label));
                continue;
            }
            let source = format!("output of `{}`", result.command);
            rules.apply(&source, &result.combined_output(), &mut evaluation);
        }
        if let Some(dmesg) = outcome.result("dmesg") {
            RuleSet::kernel_oops().apply("dmesg", &dmesg.stdout, &mut evaluation);
        }
        evaluation
    }

    async fn teardown(&mut self, ctx: &mut CaseContext) -> Result<()> {
        let mut problems = Vec::new();
        for command in self.options.teardown.clone() {
            let result = ctx.run(self.request(command).in_dir(&ctx.workdir)).await?;
            if !result.success() {
                problems.push(format!("`{}`: {}", result.command, result.status_display()));
            }
        }
        if !problems.is_empty() {
            bail!("teardown commands failed: {}", problems.join(", "));
        }
        Ok(())
    }
}
