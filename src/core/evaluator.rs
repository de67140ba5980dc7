//! # Result Evaluator Module / 结果评估模块
//!
//! Turns captured command output into a verdict. Output checks are declarative:
//! a [`RuleSet`] is an ordered list of `(pattern, severity)` rules applied the same
//! way to any text (command output, log files, the kernel ring buffer). Numeric
//! checks are expressed as [`Threshold`]s. Exit codes are judged per case through
//! an [`ExitPolicy`], since several wrapped tools use non-standard exit codes.
//!
//! 将捕获的命令输出转换为判定结果。输出检查是声明式的：
//! [`RuleSet`] 是一组有序的 `(模式, 严重级别)` 规则，对任何文本
//! （命令输出、日志文件、内核环形缓冲区）都以相同方式应用。数值检查用 [`Threshold`] 表示。
//! 由于部分被封装的工具使用非标准退出码，退出码通过每个用例自己的 [`ExitPolicy`] 判定。

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::core::models::{CommandResult, Verdict};

/// How much a matched rule matters.
/// 规则匹配后的严重程度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A match fails the case.
    /// 匹配即判定用例失败。
    #[default]
    Fail,
    /// A match is reported but does not change the verdict.
    /// 匹配会被报告，但不改变判定。
    Warn,
    /// A match is only noted in the transcript.
    /// 匹配仅记录在日志中。
    Info,
}

/// A single failure marker.
/// 单个失败标记。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// The substring to look for.
    /// 要查找的子串。
    pub pattern: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub ignore_case: bool,
    /// Reported instead of the generic "`<pattern>` found" message.
    /// 用于替代通用的 "发现 `<pattern>`" 消息。
    #[serde(default)]
    pub message: Option<String>,
}

impl Rule {
    pub fn new(pattern: impl Into<String>, severity: Severity) -> Self {
        Self {
            pattern: pattern.into(),
            severity,
            ignore_case: false,
            message: None,
        }
    }

    pub fn fail(pattern: impl Into<String>) -> Self {
        Self::new(pattern, Severity::Fail)
    }

    pub fn warn(pattern: impl Into<String>) -> Self {
        Self::new(pattern, Severity::Warn)
    }

    pub fn info(pattern: impl Into<String>) -> Self {
        Self::new(pattern, Severity::Info)
    }

    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn matches(&self, line: &str) -> bool {
        if self.ignore_case {
            line.to_lowercase().contains(&self.pattern.to_lowercase())
        } else {
            line.contains(&self.pattern)
        }
    }
}

/// A rule that matched, with the first line it matched on.
/// 一条已匹配的规则及其首次匹配的行。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub rule: Rule,
    pub line: String,
}

impl Finding {
    /// The rule's own message, or a generic one naming the pattern and evidence.
    pub fn describe(&self, source: &str) -> String {
        match &self.rule.message {
            Some(message) => format!("{} ({}: {})", message, source, self.line.trim()),
            None => format!(
                "'{}' found in {}: {}",
                self.rule.pattern,
                source,
                self.line.trim()
            ),
        }
    }
}

/// An ordered set of failure markers.
/// 有序的失败标记集合。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

static KERNEL_OOPS: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::new(vec![
        Rule::fail("Oops"),
        Rule::fail("BUG:"),
        Rule::fail("WARNING: CPU:"),
        Rule::fail("Unable to handle"),
        Rule::fail("soft lockup"),
        Rule::fail("Kernel panic"),
        Rule::fail("Call Trace:").ignore_case(),
    ])
});

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Every pattern becomes a `Fail` rule.
    pub fn failing_on<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(patterns.into_iter().map(Rule::fail).collect())
    }

    /// The markers of a kernel that is in trouble: oopses, BUGs, warnings,
    /// lockups, panics and call traces.
    pub fn kernel_oops() -> Self {
        KERNEL_OOPS.clone()
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn extend(&mut self, other: &RuleSet) {
        self.rules.extend(other.rules.iter().cloned());
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns one finding per matching rule, in rule order.
    pub fn scan(&self, text: &str) -> Vec<Finding> {
        self.rules
            .iter()
            .filter_map(|rule| {
                text.lines().find(|line| rule.matches(line)).map(|line| Finding {
                    rule: rule.clone(),
                    line: line.to_string(),
                })
            })
            .collect()
    }

    /// Scans `text` and records every finding in `evaluation` according to its severity.
    pub fn apply(&self, source: &str, text: &str, evaluation: &mut Evaluation) {
        for finding in self.scan(text) {
            let message = finding.describe(source);
            match finding.rule.severity {
                Severity::Fail => evaluation.fail(message),
                Severity::Warn => evaluation.warn(message),
                Severity::Info => evaluation.note(message),
            }
        }
    }
}

/// How a case reads the exit status of its subject command.
///
/// 用例如何解读被测命令的退出状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExitPolicy {
    /// Exit codes that count as success.
    /// 视为成功的退出码。
    pub accepted: Vec<i32>,
    /// Exit codes meaning "this variant does not apply here" (e.g. an unknown option).
    /// 表示"该变体在此不适用"的退出码（例如未知选项）。
    pub not_applicable: Vec<i32>,
    /// Judge by output only; the exit status is never a failure by itself.
    /// 仅根据输出判定；退出状态本身不会导致失败。
    pub ignore: bool,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self::zero_only()
    }
}

/// The reading of one exit status under an [`ExitPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitJudgement {
    Accepted,
    NotApplicable,
    Rejected,
}

impl ExitPolicy {
    pub fn zero_only() -> Self {
        Self {
            accepted: vec![0],
            not_applicable: vec![],
            ignore: false,
        }
    }

    pub fn ignore_status() -> Self {
        Self {
            ignore: true,
            ..Self::zero_only()
        }
    }

    pub fn accepting(codes: &[i32]) -> Self {
        Self {
            accepted: codes.to_vec(),
            ..Self::zero_only()
        }
    }

    pub fn with_not_applicable(mut self, codes: &[i32]) -> Self {
        self.not_applicable = codes.to_vec();
        self
    }

    pub fn judge(&self, result: &CommandResult) -> ExitJudgement {
        if self.ignore {
            return ExitJudgement::Accepted;
        }
        if result.timed_out {
            return ExitJudgement::Rejected;
        }
        match result.exit_status {
            Some(code) if self.accepted.contains(&code) => ExitJudgement::Accepted,
            Some(code) if self.not_applicable.contains(&code) => ExitJudgement::NotApplicable,
            _ => ExitJudgement::Rejected,
        }
    }
}

/// A numeric check over a series of sampled values.
/// 针对一组采样值的数值检查。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    /// At most `n` samples may be zero.
    ZeroCountAtMost(usize),
    /// At most this percentage (0-100) of the samples may be zero.
    ZeroPercentAtMost(f64),
    /// Every sample must be at least this value.
    AtLeast(f64),
}

impl Threshold {
    /// `Ok(())` when the values satisfy the threshold, otherwise a description of the violation.
    pub fn check(&self, values: &[f64]) -> Result<(), String> {
        match *self {
            Threshold::ZeroCountAtMost(limit) => {
                let zeros = zero_count(values);
                if zeros > limit {
                    Err(format!(
                        "{} of {} samples are zero (at most {} allowed)",
                        zeros,
                        values.len(),
                        limit
                    ))
                } else {
                    Ok(())
                }
            }
            Threshold::ZeroPercentAtMost(limit) => {
                let percent = zero_percent(values);
                if percent > limit {
                    Err(format!(
                        "{:.1}% of samples are zero (at most {:.1}% allowed)",
                        percent, limit
                    ))
                } else {
                    Ok(())
                }
            }
            Threshold::AtLeast(minimum) => match values.iter().find(|v| **v < minimum) {
                Some(v) => Err(format!("sample {} is below the minimum {}", v, minimum)),
                None => Ok(()),
            },
        }
    }
}

pub fn zero_count(values: &[f64]) -> usize {
    values.iter().filter(|v| **v == 0.0).count()
}

/// Percentage of zero samples; an empty series has none.
pub fn zero_percent(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        zero_count(values) as f64 * 100.0 / values.len() as f64
    }
}

/// Throughput comparison: `a` must strictly exceed `b`.
pub fn exceeds(a: f64, b: f64) -> bool {
    a > b
}

/// Parses a number that may carry thousands separators (`1,234,567`).
pub fn parse_number(token: &str) -> Option<f64> {
    token.trim().replace(',', "").parse::<f64>().ok()
}

/// The number written right before `marker` on the first line containing it,
/// e.g. `number_before("12345 records/s", "records/s") == Some(12345.0)`.
pub fn number_before(text: &str, marker: &str) -> Option<f64> {
    text.lines().find_map(|line| {
        let idx = line.find(marker)?;
        line[..idx].split_whitespace().last().and_then(parse_number)
    })
}

/// Collects column `column` (whitespace separated, 0-based) of every line that
/// does not contain any of the `skip` substrings. Lines whose column is missing
/// or not numeric are ignored.
pub fn column_values(text: &str, column: usize, skip: &[&str]) -> Vec<f64> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !skip.iter().any(|s| line.contains(s)))
        .filter_map(|line| line.split_whitespace().nth(column).and_then(parse_number))
        .collect()
}

/// The judgement of one outcome.
///
/// Built fresh by every `evaluate` call, so nothing accumulates across runs.
/// The verdict is `Fail` exactly when at least one failure was recorded.
///
/// 对一次产出的判定。
///
/// 每次调用 `evaluate` 时都重新构建，因此不会在多次运行之间累积状态。
/// 当且仅当至少记录了一个失败时，判定为 `Fail`。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    failures: Vec<String>,
    warnings: Vec<String>,
    notes: Vec<String>,
}

impl Evaluation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.failures.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn verdict(&self) -> Verdict {
        if self.failures.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    /// A single message naming every failure, or `None` when the outcome passed.
    pub fn reason(&self) -> Option<String> {
        match self.failures.len() {
            0 => None,
            1 => Some(self.failures[0].clone()),
            n => Some(format!("{} failures: {}", n, self.failures.join("; "))),
        }
    }

    /// Records a failure with `message` unless `result`'s exit status is acceptable.
    /// Returns the judgement so callers can treat `NotApplicable` themselves.
    pub fn check_exit(
        &mut self,
        result: &CommandResult,
        policy: &ExitPolicy,
        message: &str,
    ) -> ExitJudgement {
        let judgement = policy.judge(result);
        if judgement == ExitJudgement::Rejected {
            self.fail(format!(
                "{} (`{}`: {})",
                message,
                result.command,
                result.status_display()
            ));
        }
        judgement
    }
}
