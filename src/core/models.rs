//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures used throughout the runner:
//! verdicts, lifecycle phases, captured command results, the outcome of a run
//! phase and the final per-case test result.
//!
//! 此模块定义了整个运行器中使用的核心数据结构：
//! 判定结果、生命周期阶段、捕获的命令结果、运行阶段的产出以及每个用例的最终测试结果。

use crate::core::config::CaseEntry;
use crate::infra::t;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The final judgement for a test case.
/// 测试用例的最终判定。
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// The subject behaved correctly.
    /// 被测对象行为正确。
    Pass,
    /// The subject under test misbehaved.
    /// 被测对象行为异常。
    Fail,
    /// The environment could not be prepared (missing package, failed build).
    /// 无法准备测试环境（缺少软件包、构建失败）。
    Cancel,
    /// The case does not apply to this platform.
    /// 该用例不适用于当前平台。
    Skip,
    /// The harness itself failed while orchestrating the case.
    /// 框架自身在编排用例时出错。
    Error,
    /// The case timed out or the run was aborted by the user.
    /// 用例超时或运行被用户中止。
    Interrupted,
}

impl Verdict {
    /// `true` for the verdicts that make a run unsuccessful.
    pub fn is_failure(self) -> bool {
        matches!(self, Verdict::Fail | Verdict::Error | Verdict::Interrupted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Cancel => "CANCEL",
            Verdict::Skip => "SKIP",
            Verdict::Error => "ERROR",
            Verdict::Interrupted => "INTERRUPTED",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phases of a test case, in the only order they may be entered.
/// The derived ordering is what keeps transitions strictly forward.
///
/// 测试用例的生命周期阶段，按唯一允许的进入顺序排列。
/// 派生的排序保证状态转换只能向前。
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    NotStarted,
    Setup,
    Running,
    Evaluated,
    Finished,
    TornDown,
}

/// The exit status, standard output and standard error of one command.
///
/// 单条命令的退出状态、标准输出和标准错误。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// The command line as it was handed to the shell.
    /// 交给 shell 的命令行。
    pub command: String,
    /// The exit code, or `None` when the process was killed by a signal or timed out.
    /// 退出码；进程被信号杀死或超时时为 `None`。
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// Set when the runner had to kill the command after its timeout.
    /// 当运行器因超时杀死命令时设置。
    pub timed_out: bool,
}

impl CommandResult {
    pub fn new(
        command: impl Into<String>,
        exit_status: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            exit_status,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration: Duration::default(),
            timed_out: false,
        }
    }

    /// A zero exit status.
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Standard output followed by standard error.
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }

    /// Human readable status, e.g. `exit status 1` or `timed out`.
    pub fn status_display(&self) -> String {
        if self.timed_out {
            "timed out".to_string()
        } else {
            match self.exit_status {
                Some(code) => format!("exit status {}", code),
                None => "killed by signal".to_string(),
            }
        }
    }
}

/// One labelled command execution inside a run phase.
/// 运行阶段中一次带标签的命令执行。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub label: String,
    pub result: CommandResult,
}

/// Everything a run phase captured. `evaluate` is a pure function of this value,
/// so judging the same outcome twice always yields the same verdict.
///
/// 运行阶段捕获的全部内容。`evaluate` 是该值的纯函数，
/// 因此对同一产出重复判定总会得到相同的结果。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub steps: Vec<Step>,
}

impl Outcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: impl Into<String>, result: CommandResult) {
        self.steps.push(Step {
            label: label.into(),
            result,
        });
    }

    /// The first step recorded under `label`.
    pub fn step(&self, label: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.label == label)
    }

    pub fn result(&self, label: &str) -> Option<&CommandResult> {
        self.step(label).map(|s| &s.result)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Represents the final result of a single test case execution.
///
/// 表示单个测试用例执行的最终结果。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// The case name from the suite file / 套件文件中的用例名称
    pub name: String,
    /// The built-in kind that implemented the case / 实现该用例的内置类型
    pub kind: String,
    pub verdict: Verdict,
    /// Why the case did not pass, if it did not.
    /// 用例未通过时的原因。
    pub reason: Option<String>,
    /// The case transcript: every command, its status and its output.
    /// 用例记录：每条命令、其状态和输出。
    pub output: String,
    pub duration: Duration,
    /// A teardown error that was logged but not escalated.
    /// 已记录但未升级的清理错误。
    pub teardown_error: Option<String>,
    /// The lifecycle phases the case went through.
    /// 用例经历的生命周期阶段。
    pub phases: Vec<Phase>,
    /// `true` when the case's `allow_failure` list names the detected distribution.
    /// 当用例的 `allow_failure` 列表包含检测到的发行版时为 `true`。
    pub failure_allowed: bool,
}

impl TestResult {
    /// A result for a case that never entered setup, e.g. filtered by architecture
    /// or left unscheduled after a fast-fail.
    pub fn not_run(case: &CaseEntry, verdict: Verdict, reason: impl Into<String>) -> Self {
        Self {
            name: case.name.clone(),
            kind: case.kind.clone(),
            verdict,
            reason: Some(reason.into()),
            output: String::new(),
            duration: Duration::default(),
            teardown_error: None,
            phases: vec![Phase::NotStarted],
            failure_allowed: false,
        }
    }

    /// Checks if a test result is a failure that was not explicitly allowed.
    pub fn is_unexpected_failure(&self) -> bool {
        self.verdict.is_failure() && !self.failure_allowed
    }

    /// Checks if the test result is a failure that was explicitly allowed for this distribution.
    pub fn is_allowed_failure(&self) -> bool {
        self.verdict.is_failure() && self.failure_allowed
    }

    pub fn is_failure(&self) -> bool {
        self.verdict.is_failure()
    }

    /// Gets the appropriate CSS class for the test status.
    pub fn get_status_class(&self) -> &str {
        if self.is_allowed_failure() {
            return "status-Allowed-Failure";
        }
        match self.verdict {
            Verdict::Pass => "status-Passed",
            Verdict::Fail => "status-Failed",
            Verdict::Cancel => "status-Cancelled",
            Verdict::Skip => "status-Skipped",
            Verdict::Error => "status-Error",
            Verdict::Interrupted => "status-Interrupted",
        }
    }

    /// Gets the status of the test result as a string for display.
    /// 以字符串形式获取测试结果的状态以供显示。
    pub fn get_status_str(&self, locale: &str) -> String {
        if self.is_allowed_failure() {
            return t!("report.status_allowed_failure", locale = locale).to_string();
        }
        match self.verdict {
            Verdict::Pass => t!("report.status_passed", locale = locale).to_string(),
            Verdict::Fail => t!("report.status_failed", locale = locale).to_string(),
            Verdict::Cancel => t!("report.status_cancelled", locale = locale).to_string(),
            Verdict::Skip => t!("report.status_skipped", locale = locale).to_string(),
            Verdict::Error => t!("report.status_error", locale = locale).to_string(),
            Verdict::Interrupted => t!("report.status_interrupted", locale = locale).to_string(),
        }
    }

    /// Gets the duration of the test case. Returns None for cases that never ran.
    pub fn get_duration(&self) -> Option<Duration> {
        if self.phases.iter().any(|p| *p >= Phase::Setup) {
            Some(self.duration)
        } else {
            None
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} [{}]: {}", self.name, self.verdict, reason),
            None => write!(f, "{} [{}]", self.name, self.verdict),
        }
    }
}
