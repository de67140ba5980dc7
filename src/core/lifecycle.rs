//! # Test Case Lifecycle Module / 测试用例生命周期模块
//!
//! Every test case is prepared, exercised and judged the same way:
//!
//! ```text
//! NotStarted -> Setup -> Running -> Evaluated -> Finished -> TornDown
//! ```
//!
//! `setup` resolves dependencies, fetches and builds; `run` executes the subject
//! and captures an [`Outcome`]; `evaluate` is a pure judgement of that outcome;
//! `teardown` is best-effort cleanup. A case that cannot be prepared is cancelled
//! (or skipped, when it does not apply) straight from `Setup` and never runs.
//!
//! 每个测试用例都以相同方式准备、执行和判定：
//! `setup` 解析依赖、获取资源并构建；`run` 执行被测对象并捕获 [`Outcome`]；
//! `evaluate` 是对该产出的纯判定；`teardown` 是尽力而为的清理。
//! 无法准备的用例会直接从 `Setup` 进入取消（或不适用时跳过）状态，永远不会运行。

use anyhow::{Context, bail};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::config::local_location;
use crate::core::evaluator::Evaluation;
use crate::core::models::{CommandResult, Outcome, Phase, Verdict};
use crate::infra::Capabilities;
use crate::infra::assets::AssetRequest;
use crate::infra::command::CommandRequest;
use crate::infra::dmesg;
use crate::infra::log::CaseLog;
use crate::infra::platform::Platform;

/// Stops a lifecycle phase early with a verdict.
///
/// Infrastructure code propagates `anyhow::Error` with `?`; it lands here as
/// [`Interrupt::Error`], a harness error distinct from a subject failure.
///
/// 以某个判定提前结束生命周期阶段。
/// 基础设施代码用 `?` 传播 `anyhow::Error`，它会转换为 [`Interrupt::Error`]，
/// 即与被测对象失败不同的框架错误。
#[derive(Debug, Error)]
pub enum Interrupt {
    /// The environment is unusable: a dependency is missing or a build failed.
    #[error("{0}")]
    Cancel(String),
    /// The case does not apply to this platform.
    #[error("{0}")]
    Skip(String),
    /// The subject failed in a way that makes further steps pointless.
    #[error("{0}")]
    Fail(String),
    #[error(transparent)]
    Error(#[from] anyhow::Error),
}

impl Interrupt {
    pub fn verdict(&self) -> Verdict {
        match self {
            Interrupt::Cancel(_) => Verdict::Cancel,
            Interrupt::Skip(_) => Verdict::Skip,
            Interrupt::Fail(_) => Verdict::Fail,
            Interrupt::Error(_) => Verdict::Error,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            Interrupt::Error(e) => format!("{:#}", e),
            other => other.to_string(),
        }
    }
}

pub type CaseResult<T> = std::result::Result<T, Interrupt>;

/// Shorthand constructors, mirroring how cases read: `return Err(cancel(...))`.
pub fn cancel(reason: impl Into<String>) -> Interrupt {
    Interrupt::Cancel(reason.into())
}

pub fn skip(reason: impl Into<String>) -> Interrupt {
    Interrupt::Skip(reason.into())
}

/// Everything a case may touch while it runs.
/// 用例运行期间可以访问的全部内容。
pub struct CaseContext {
    pub name: String,
    pub caps: Capabilities,
    pub platform: Platform,
    /// Scratch directory owned by this case.
    pub workdir: PathBuf,
    /// Directory of the suite file; relative local paths are taken from here.
    pub data_dir: Option<PathBuf>,
    pub log: CaseLog,
}

impl CaseContext {
    pub fn new(
        name: impl Into<String>,
        caps: Capabilities,
        platform: Platform,
        workdir: PathBuf,
        echo: bool,
    ) -> Self {
        let name = name.into();
        Self {
            log: CaseLog::new(name.clone(), echo),
            name,
            caps,
            platform,
            workdir,
            data_dir: None,
        }
    }

    pub fn with_data_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.data_dir = dir;
        self
    }

    /// Anchors a relative local path at the suite directory. URLs and absolute
    /// paths come back unchanged.
    pub fn local_location(&self, location: &str) -> String {
        local_location(self.data_dir.as_deref(), location)
    }

    /// Runs a command and records it in the case log. The exit status is
    /// returned untouched: deciding whether it matters is the case's job.
    pub async fn run(&mut self, request: CommandRequest) -> CaseResult<CommandResult> {
        let result = self
            .caps
            .runner
            .run(&request)
            .await
            .with_context(|| format!("could not execute `{}`", request.command))?;
        self.log.command(&result);
        Ok(result)
    }

    /// Runs `command` through the shell inside the work directory.
    pub async fn shell(&mut self, command: impl Into<String>) -> CaseResult<CommandResult> {
        let request = CommandRequest::shell(command).in_dir(&self.workdir);
        self.run(request).await
    }

    pub async fn shell_in(
        &mut self,
        dir: &Path,
        command: impl Into<String>,
    ) -> CaseResult<CommandResult> {
        self.run(CommandRequest::shell(command).in_dir(dir)).await
    }

    /// Runs `command` with elevated privileges inside the work directory.
    pub async fn sudo(&mut self, command: impl Into<String>) -> CaseResult<CommandResult> {
        let request = CommandRequest::shell(command).sudo().in_dir(&self.workdir);
        self.run(request).await
    }

    /// Makes sure every package is installed, installing the missing ones.
    /// The first package that cannot be installed cancels the case.
    pub async fn require_packages<S: AsRef<str>>(&mut self, packages: &[S]) -> CaseResult<()> {
        for package in packages {
            let package = package.as_ref();
            match self.caps.packages.ensure(package).await {
                Ok(true) => self.log.info(format!("package {} is available", package)),
                Ok(false) => {
                    return Err(cancel(format!("{} is needed for the test to be run", package)));
                }
                Err(e) => {
                    self.log.warn(format!("{:#}", e));
                    return Err(cancel(format!("{} is needed for the test to be run", package)));
                }
            }
        }
        Ok(())
    }

    /// Fetches an asset into the cache. A fetch failure is a harness error.
    pub async fn fetch_asset(&mut self, request: &AssetRequest) -> CaseResult<PathBuf> {
        let path = self
            .caps
            .fetcher
            .fetch(request)
            .await
            .with_context(|| format!("could not fetch asset '{}'", request.name))?;
        self.log.info(format!("asset {} at {}", request.name, path.display()));
        Ok(path)
    }

    /// Extracts an archive into the work directory; returns the source directory.
    pub async fn extract(&mut self, archive: &Path) -> CaseResult<PathBuf> {
        let workdir = self.workdir.clone();
        let dir = self
            .caps
            .fetcher
            .extract(archive, &workdir)
            .await
            .with_context(|| format!("could not extract {}", archive.display()))?;
        self.log.info(format!("extracted into {}", dir.display()));
        Ok(dir)
    }

    /// Runs `./configure`; a failure cancels the case.
    pub async fn configure(&mut self, dir: &Path, args: &str) -> CaseResult<()> {
        let result = self
            .caps
            .builder
            .configure(dir, args)
            .await
            .context("could not run ./configure")?;
        self.log.command(&result);
        if !result.success() {
            return Err(cancel(format!(
                "configure failed in {}: {}",
                dir.display(),
                result.status_display()
            )));
        }
        Ok(())
    }

    /// Runs `make`; a failure cancels the case.
    pub async fn make(&mut self, dir: &Path, target: Option<&str>, extra_args: &str) -> CaseResult<()> {
        let result = self
            .caps
            .builder
            .make(dir, target, extra_args)
            .await
            .context("could not run make")?;
        self.log.command(&result);
        if !result.success() {
            return Err(cancel(format!(
                "build failed in {}: {}",
                dir.display(),
                result.status_display()
            )));
        }
        Ok(())
    }

    pub async fn clear_dmesg(&mut self) -> CaseResult<()> {
        let result = self.run(dmesg::clear_request()).await?;
        if !result.success() {
            self.log.warn("could not clear the kernel ring buffer");
        }
        Ok(())
    }

    pub async fn read_dmesg(&mut self) -> CaseResult<CommandResult> {
        self.run(dmesg::read_request()).await
    }
}

/// One test case. Implementations hold their typed options and whatever state
/// setup produced (source directories, temp files) for run and teardown to use.
///
/// 单个测试用例。实现者保存其强类型选项以及 setup 产生的状态
/// （源码目录、临时文件），供 run 和 teardown 使用。
#[async_trait]
pub trait TestCase: Send {
    /// The catalogue name of this case kind.
    fn kind(&self) -> &'static str;

    async fn setup(&mut self, ctx: &mut CaseContext) -> CaseResult<()>;

    async fn run(&mut self, ctx: &mut CaseContext) -> CaseResult<Outcome>;

    /// Judges a captured outcome. Must not perform I/O.
    fn evaluate(&self, outcome: &Outcome) -> Evaluation;

    async fn teardown(&mut self, _ctx: &mut CaseContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// When `true`, a teardown error turns a passing case into an error.
    fn teardown_is_fatal(&self) -> bool {
        false
    }
}

/// Enforces strictly forward phase transitions.
/// 强制生命周期阶段只能向前转换。
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    trail: Vec<Phase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            trail: vec![Phase::NotStarted],
        }
    }

    pub fn current(&self) -> Phase {
        self.trail.last().copied().unwrap_or(Phase::NotStarted)
    }

    pub fn advance(&mut self, next: Phase) -> anyhow::Result<()> {
        let current = self.current();
        if next <= current {
            bail!("illegal lifecycle transition {:?} -> {:?}", current, next);
        }
        self.trail.push(next);
        Ok(())
    }

    pub fn entered(&self, phase: Phase) -> bool {
        self.trail.contains(&phase)
    }

    pub fn trail(&self) -> &[Phase] {
        &self.trail
    }
}

/// What the lifecycle driver reports for one case.
#[derive(Debug, Clone)]
pub struct CaseReport {
    pub verdict: Verdict,
    pub reason: Option<String>,
    pub evaluation: Option<Evaluation>,
    pub teardown_error: Option<String>,
    pub phases: Vec<Phase>,
}

/// Drives one case through its whole lifecycle.
///
/// `limit` bounds setup and run together; `stop` aborts them early. Either way
/// the case is reported as interrupted and its teardown still runs.
///
/// 驱动单个用例完成整个生命周期。
/// `limit` 同时限制 setup 和 run 的总时长；`stop` 可提前中止它们。
/// 两种情况下用例都会被报告为中断，且 teardown 仍会执行。
pub async fn drive(
    case: &mut dyn TestCase,
    ctx: &mut CaseContext,
    limit: Option<Duration>,
    stop: &CancellationToken,
) -> CaseReport {
    let mut tracker = PhaseTracker::new();

    let (verdict, reason, evaluation) = {
        let body = run_phases(&mut *case, &mut *ctx, &mut tracker);
        tokio::pin!(body);
        let limited = async {
            match limit {
                Some(limit) => match tokio::time::timeout(limit, &mut body).await {
                    Ok(reported) => reported,
                    Err(_) => (
                        Verdict::Interrupted,
                        Some(format!("timed out after {}s", limit.as_secs())),
                        None,
                    ),
                },
                None => (&mut body).await,
            }
        };
        tokio::select! {
            biased;
            _ = stop.cancelled() => (
                Verdict::Interrupted,
                Some("interrupted by user".to_string()),
                None,
            ),
            reported = limited => reported,
        }
    };

    let mut report = CaseReport {
        verdict,
        reason,
        evaluation,
        teardown_error: None,
        phases: Vec::new(),
    };

    if let Err(e) = tracker.advance(Phase::Finished) {
        report.verdict = Verdict::Error;
        report.reason = Some(e.to_string());
    }
    ctx.log.info(format!("verdict: {}", report.verdict));

    if tracker.entered(Phase::Setup) {
        if let Err(e) = case.teardown(ctx).await {
            let message = format!("{:#}", e);
            ctx.log.warn(format!("teardown failed: {}", message));
            if case.teardown_is_fatal() && report.verdict == Verdict::Pass {
                report.verdict = Verdict::Error;
                report.reason = Some(message.clone());
            }
            report.teardown_error = Some(message);
        }
        // Finished -> TornDown can't go backwards.
        let _ = tracker.advance(Phase::TornDown);
    }

    report.phases = tracker.trail().to_vec();
    report
}

async fn run_phases(
    case: &mut dyn TestCase,
    ctx: &mut CaseContext,
    tracker: &mut PhaseTracker,
) -> (Verdict, Option<String>, Option<Evaluation>) {
    if let Err(e) = tracker.advance(Phase::Setup) {
        return (Verdict::Error, Some(e.to_string()), None);
    }
    ctx.log.info(format!("setup ({})", case.kind()));
    if let Err(interrupt) = case.setup(ctx).await {
        ctx.log.warn(format!("setup stopped: {}", interrupt.reason()));
        return (interrupt.verdict(), Some(interrupt.reason()), None);
    }

    if let Err(e) = tracker.advance(Phase::Running) {
        return (Verdict::Error, Some(e.to_string()), None);
    }
    ctx.log.info("run");
    let outcome = match case.run(ctx).await {
        Ok(outcome) => outcome,
        Err(interrupt) => {
            ctx.log.warn(format!("run stopped: {}", interrupt.reason()));
            return (interrupt.verdict(), Some(interrupt.reason()), None);
        }
    };

    if let Err(e) = tracker.advance(Phase::Evaluated) {
        return (Verdict::Error, Some(e.to_string()), None);
    }
    let evaluation = case.evaluate(&outcome);
    for warning in evaluation.warnings() {
        ctx.log.warn(warning);
    }
    for note in evaluation.notes() {
        ctx.log.info(note);
    }
    (evaluation.verdict(), evaluation.reason(), Some(evaluation))
}
