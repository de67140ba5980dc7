//! # Test Execution Planner Module / 测试执行计划模块
//!
//! This module decides which suite entries this machine runs: tag filtering,
//! filtering by architecture, ordering allowed-failure cases last, and
//! splitting the work between CI runners.
//!
//! 此模块决定本机运行哪些套件条目：按标签过滤、按架构过滤、
//! 将允许失败的用例排在最后，以及在多个 CI 运行器之间分配工作。

use crate::core::config::CaseEntry;
use crate::infra::platform::Platform;
use anyhow::{Result, bail};

/// Represents a complete execution plan for a suite.
/// 表示一个套件的完整执行计划。
#[derive(Debug)]
pub struct ExecutionPlan {
    /// The cases to execute, in order.
    /// 要执行的测试用例，按顺序排列。
    pub cases_to_run: Vec<CaseEntry>,
    /// Cases that do not apply to this architecture. They are reported as
    /// skipped without entering setup.
    /// 不适用于当前架构的用例，不进入 setup，直接报告为跳过。
    pub arch_filtered: Vec<CaseEntry>,
    /// The number of cases left out by `--tags`.
    /// 被 `--tags` 排除的用例数量。
    pub tag_filtered_count: usize,
    /// The number of cases that are allowed to fail on the current distribution.
    /// 在当前发行版上允许失败的用例数量。
    pub flaky_cases_count: usize,
    /// Whether the cases are distributed across multiple runners (CI environment).
    /// 用例是否分布在多个运行器上（CI 环境）。
    pub is_distributed: bool,
}

/// `true` when the entry carries at least one of `tags`, or when no tags were requested.
pub fn matches_tags(case: &CaseEntry, tags: &[String]) -> bool {
    tags.is_empty() || case.tags.iter().any(|t| tags.contains(t))
}

/// Creates an execution plan for the given suite entries.
///
/// 为给定的套件条目创建执行计划。
///
/// # Arguments
/// * `cases` - Every entry of the suite
/// * `platform` - The machine the plan is made for
/// * `tags` - Only entries carrying one of these tags run; empty means all
/// * `total_runners` - Optional total number of runners for distributed execution
/// * `runner_index` - Optional index of this runner (0-based)
///
/// Architecture-filtered cases are only reported by the first runner, so a
/// sharded run reports each of them once.
pub fn plan_execution(
    cases: Vec<CaseEntry>,
    platform: &Platform,
    tags: &[String],
    total_runners: Option<usize>,
    runner_index: Option<usize>,
) -> Result<ExecutionPlan> {
    let shard = match (total_runners, runner_index) {
        (Some(total), Some(index)) => {
            if total == 0 || index >= total {
                bail!("Runner index must be less than total runners.");
            }
            Some((total, index))
        }
        (None, None) => None,
        _ => bail!("Both --total-runners and --runner-index must be provided."),
    };

    let total = cases.len();
    let tagged: Vec<_> = cases
        .into_iter()
        .filter(|case| matches_tags(case, tags))
        .collect();
    let tag_filtered_count = total - tagged.len();

    // Filter by architecture
    let (arch_cases, mut arch_filtered): (Vec<_>, Vec<_>) = tagged.into_iter().partition(|case| {
        case.arch.is_empty() || case.arch.iter().any(|a| a == &platform.arch)
    });

    // Separate flaky cases
    let (mut safe_cases, mut flaky_cases): (Vec<_>, Vec<_>) = arch_cases
        .into_iter()
        .partition(|case| !case.allows_failure_on(&platform.distro));
    let flaky_cases_count = flaky_cases.len();

    // Sort cases by name for deterministic execution order
    safe_cases.sort_by(|a, b| a.name.cmp(&b.name));
    flaky_cases.sort_by(|a, b| a.name.cmp(&b.name));

    let mut combined_cases = safe_cases;
    combined_cases.extend(flaky_cases);

    let cases_to_run = match shard {
        Some((total, index)) => {
            if index != 0 {
                arch_filtered.clear();
            }
            combined_cases
                .into_iter()
                .enumerate()
                .filter(|(i, _)| i % total == index)
                .map(|(_, case)| case)
                .collect()
        }
        None => combined_cases,
    };

    Ok(ExecutionPlan {
        cases_to_run,
        arch_filtered,
        tag_filtered_count,
        flaky_cases_count,
        is_distributed: shard.is_some(),
    })
}
