// Shared test helpers for integration tests
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};

use kernel_test_runner::core::lifecycle::CaseContext;
use kernel_test_runner::core::models::CommandResult;
use kernel_test_runner::infra::Capabilities;
use kernel_test_runner::infra::assets::{AssetFetcher, AssetRequest};
use kernel_test_runner::infra::builder::Builder;
use kernel_test_runner::infra::command::{CommandRequest, ProcessRunner};
use kernel_test_runner::infra::packages::DependencyResolver;
use kernel_test_runner::infra::platform::Platform;

/// One canned answer: every command containing `pattern` gets it.
#[derive(Debug, Clone)]
pub struct Reply {
    pub pattern: String,
    pub exit: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// A process runner that never spawns anything. Commands are matched against
/// the replies in order; unmatched commands exit 0 with no output.
#[derive(Default)]
pub struct ScriptedRunner {
    replies: Vec<Reply>,
    delay: Option<Duration>,
    calls: Mutex<Vec<CommandRequest>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, pattern: &str, exit: i32, stdout: &str) -> Self {
        self.replies.push(Reply {
            pattern: pattern.to_string(),
            exit: Some(exit),
            stdout: stdout.to_string(),
            stderr: String::new(),
        });
        self
    }

    pub fn reply_stderr(mut self, pattern: &str, exit: i32, stderr: &str) -> Self {
        self.replies.push(Reply {
            pattern: pattern.to_string(),
            exit: Some(exit),
            stdout: String::new(),
            stderr: stderr.to_string(),
        });
        self
    }

    /// Every command sleeps this long before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ran(&self, fragment: &str) -> bool {
        self.commands().iter().any(|c| c.contains(fragment))
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, request: &CommandRequest) -> Result<CommandResult> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self
            .replies
            .iter()
            .find(|r| request.command.contains(&r.pattern));
        Ok(match reply {
            Some(r) => CommandResult::new(&request.command, r.exit, &r.stdout, &r.stderr),
            None => CommandResult::new(&request.command, Some(0), "", ""),
        })
    }
}

/// Packages listed in `missing` cannot be installed; everything else is present.
#[derive(Default)]
pub struct FakePackages {
    pub missing: Vec<String>,
    pub asked: Mutex<Vec<String>>,
}

impl FakePackages {
    pub fn missing(packages: &[&str]) -> Self {
        Self {
            missing: packages.iter().map(|p| p.to_string()).collect(),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl DependencyResolver for FakePackages {
    async fn is_installed(&self, package: &str) -> Result<bool> {
        self.asked.lock().unwrap().push(package.to_string());
        Ok(!self.missing.iter().any(|m| m == package))
    }

    async fn install(&self, package: &str) -> Result<bool> {
        Ok(!self.missing.iter().any(|m| m == package))
    }
}

/// Hands out `<dir>/<name>` for every asset; extraction returns the destination.
pub struct FakeFetcher {
    pub dir: PathBuf,
    pub fail: bool,
    pub requests: Arc<Mutex<Vec<AssetRequest>>>,
}

#[async_trait]
impl AssetFetcher for FakeFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<PathBuf> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            anyhow::bail!("all mirrors failed for {}", request.name);
        }
        Ok(self.dir.join(&request.name))
    }

    async fn extract(&self, _archive: &Path, dest: &Path) -> Result<PathBuf> {
        Ok(dest.to_path_buf())
    }
}

/// `make` exits with `make_exit`; `configure` always succeeds.
pub struct FakeBuilder {
    pub make_exit: i32,
}

#[async_trait]
impl Builder for FakeBuilder {
    async fn configure(&self, dir: &Path, args: &str) -> Result<CommandResult> {
        Ok(CommandResult::new(
            format!("cd {} && ./configure {}", dir.display(), args),
            Some(0),
            "",
            "",
        ))
    }

    async fn make(
        &self,
        dir: &Path,
        target: Option<&str>,
        extra_args: &str,
    ) -> Result<CommandResult> {
        Ok(CommandResult::new(
            format!(
                "cd {} && make {} {}",
                dir.display(),
                target.unwrap_or(""),
                extra_args
            ),
            Some(self.make_exit),
            "",
            if self.make_exit == 0 { "" } else { "make: *** [all] Error 1" },
        ))
    }
}

/// A fake machine and everything needed to drive a case against it.
pub struct Harness {
    pub runner: Arc<ScriptedRunner>,
    pub packages: Arc<FakePackages>,
    pub platform: Platform,
    pub make_exit: i32,
    pub fetch_fails: bool,
    pub fetched: Arc<Mutex<Vec<AssetRequest>>>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(runner: ScriptedRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            packages: Arc::new(FakePackages::default()),
            platform: ubuntu_x86(),
            make_exit: 0,
            fetch_fails: false,
            fetched: Arc::new(Mutex::new(Vec::new())),
            dir: tempdir().expect("Failed to create temporary directory"),
        }
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn missing_packages(mut self, packages: &[&str]) -> Self {
        self.packages = Arc::new(FakePackages::missing(packages));
        self
    }

    pub fn failing_make(mut self) -> Self {
        self.make_exit = 2;
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fetch_fails = true;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            runner: self.runner.clone(),
            packages: self.packages.clone(),
            fetcher: Arc::new(FakeFetcher {
                dir: self.dir.path().join("cache"),
                fail: self.fetch_fails,
                requests: self.fetched.clone(),
            }),
            builder: Arc::new(FakeBuilder {
                make_exit: self.make_exit,
            }),
        }
    }

    /// Every asset request the cases made, in order.
    pub fn fetched(&self) -> Vec<AssetRequest> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn context(&self, name: &str) -> CaseContext {
        let workdir = self.dir.path().join(name).join("work");
        std::fs::create_dir_all(&workdir).expect("Failed to create work directory");
        CaseContext::new(
            name,
            self.capabilities(),
            self.platform.clone(),
            workdir,
            false,
        )
    }
}

pub fn ubuntu_x86() -> Platform {
    Platform {
        arch: "x86_64".to_string(),
        distro: "ubuntu".to_string(),
        distro_version: "24.04".to_string(),
        kernel_release: "6.8.0-31-generic".to_string(),
        cpuinfo: "processor\t: 0\nmodel name\t: Test CPU\n".to_string(),
        meminfo: "MemTotal:       16000000 kB\nHugepagesize:       2048 kB\n".to_string(),
    }
}

pub fn rhel_power_vm() -> Platform {
    Platform {
        arch: "ppc64le".to_string(),
        distro: "rhel".to_string(),
        distro_version: "9.4".to_string(),
        kernel_release: "5.14.0-427.el9.ppc64le".to_string(),
        cpuinfo: "processor\t: 0\ncpu\t\t: POWER10\nplatform\t: pSeries\n".to_string(),
        meminfo: "MemTotal:       16000000 kB\nHugepagesize:      16384 kB\n".to_string(),
    }
}

pub fn rhel_power_nv() -> Platform {
    Platform {
        cpuinfo: "processor\t: 0\ncpu\t\t: POWER9\nplatform\t: PowerNV\n".to_string(),
        ..rhel_power_vm()
    }
}

/// Writes a suite file into `dir` and returns its path.
pub fn write_suite(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("TestSuite.toml");
    std::fs::write(&path, content).expect("Failed to write suite file");
    path
}
