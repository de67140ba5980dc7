//! # Infrastructure Module / 基础设施模块
//!
//! This module provides the capabilities a test case needs from the machine
//! under test. Every one of them shells out through the [`command::ProcessRunner`]
//! trait so the harness can be exercised without privileged commands.
//!
//! 此模块提供测试用例所需的、来自被测机器的能力。
//! 它们全部通过 [`command::ProcessRunner`] trait 执行外部命令，
//! 因此无需特权命令即可测试整个框架。

pub mod assets;
pub mod builder;
pub mod command;
pub mod dmesg;
pub mod fs;
pub mod log;
pub mod packages;
pub mod platform;

use std::path::PathBuf;
use std::sync::Arc;

use assets::{AssetFetcher, CachedFetcher};
use builder::{Builder, MakeBuilder};
use command::{ProcessRunner, ShellRunner};
use packages::{DependencyResolver, SoftwareManager};
use platform::Platform;

// Re-export i18n functions for easier access
pub use rust_i18n::t;

/// The bundle of external collaborators handed to every test case.
///
/// 传递给每个测试用例的外部协作者集合。
#[derive(Clone)]
pub struct Capabilities {
    pub runner: Arc<dyn ProcessRunner>,
    pub packages: Arc<dyn DependencyResolver>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub builder: Arc<dyn Builder>,
}

impl Capabilities {
    /// Wires the real, command-backed implementations for the current machine.
    pub fn system(platform: &Platform, cache_dir: PathBuf) -> Self {
        let runner: Arc<dyn ProcessRunner> = Arc::new(ShellRunner::new());
        Self::with_runner(runner, platform, cache_dir)
    }

    /// Builds every capability on top of a single process runner.
    /// Tests pass a scripted runner here to observe every command issued.
    pub fn with_runner(
        runner: Arc<dyn ProcessRunner>,
        platform: &Platform,
        cache_dir: PathBuf,
    ) -> Self {
        Self {
            packages: Arc::new(SoftwareManager::new(runner.clone(), platform)),
            fetcher: Arc::new(CachedFetcher::new(runner.clone(), cache_dir)),
            builder: Arc::new(MakeBuilder::new(runner.clone())),
            runner,
        }
    }
}
