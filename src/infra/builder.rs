//! # Build Module / 构建模块
//!
//! The Builder capability: `./configure` and `make` in a source directory.
//!
//! 构建能力：在源码目录中执行 `./configure` 和 `make`。

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::core::models::CommandResult;
use crate::infra::command::{CommandRequest, ProcessRunner};

#[async_trait]
pub trait Builder: Send + Sync {
    async fn configure(&self, dir: &Path, args: &str) -> Result<CommandResult>;

    /// Runs `make [target] [extra_args]` in `dir`.
    async fn make(&self, dir: &Path, target: Option<&str>, extra_args: &str)
    -> Result<CommandResult>;
}

/// Builds with GNU make, one job per CPU.
pub struct MakeBuilder {
    runner: Arc<dyn ProcessRunner>,
    jobs: usize,
}

impl MakeBuilder {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            jobs: num_cpus::get().max(1),
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn make_command(&self, target: Option<&str>, extra_args: &str) -> String {
        let mut command = format!("make -j{}", self.jobs);
        if let Some(target) = target {
            command.push(' ');
            command.push_str(target);
        }
        if !extra_args.trim().is_empty() {
            command.push(' ');
            command.push_str(extra_args.trim());
        }
        command
    }
}

#[async_trait]
impl Builder for MakeBuilder {
    async fn configure(&self, dir: &Path, args: &str) -> Result<CommandResult> {
        let command = format!("./configure {}", args).trim_end().to_string();
        self.runner
            .run(&CommandRequest::shell(command).in_dir(dir))
            .await
    }

    async fn make(
        &self,
        dir: &Path,
        target: Option<&str>,
        extra_args: &str,
    ) -> Result<CommandResult> {
        self.runner
            .run(&CommandRequest::shell(self.make_command(target, extra_args)).in_dir(dir))
            .await
    }
}
