//! # Command Execution Module / 命令执行模块
//!
//! The Process Runner capability. Test cases never spawn processes themselves:
//! they hand a [`CommandRequest`] to a [`ProcessRunner`] and receive a
//! [`CommandResult`]. [`ShellRunner`] is the real implementation; tests use a
//! scripted one.
//!
//! 进程运行器能力。测试用例从不直接创建进程：它们把 [`CommandRequest`] 交给
//! [`ProcessRunner`] 并得到 [`CommandResult`]。[`ShellRunner`] 是真实实现；
//! 测试中使用脚本化的实现。

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::core::models::CommandResult;

/// Exit status GNU `timeout` uses when it had to stop the command.
const TIMEOUT_EXIT: i32 = 124;
/// Exit status when `timeout -k` escalated to SIGKILL.
const TIMEOUT_KILLED_EXIT: i32 = 137;
/// Grace period between SIGTERM and SIGKILL for timed-out commands.
const KILL_GRACE_SECS: u64 = 10;

/// A shell command to execute.
/// 待执行的 shell 命令。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// The command line, interpreted by `sh -c`.
    /// 命令行，由 `sh -c` 解释执行。
    pub command: String,
    /// Run with elevated privileges (`sudo`) unless already root.
    /// 以提升的权限（`sudo`）运行，已是 root 时除外。
    pub sudo: bool,
    pub cwd: Option<PathBuf>,
    /// Kill the command (and its children) after this long.
    /// 超过该时长后杀死命令（及其子进程）。
    pub timeout: Option<Duration>,
    pub env: Vec<(String, String)>,
}

impl CommandRequest {
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            sudo: false,
            cwd: None,
            timeout: None,
            env: vec![],
        }
    }

    pub fn sudo(mut self) -> Self {
        self.sudo = true;
        self
    }

    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Executes shell commands on behalf of test cases.
///
/// `Err` is reserved for failures to execute at all (the shell could not be spawned);
/// a command that runs and exits non-zero is an `Ok` result with that status.
///
/// 代表测试用例执行 shell 命令。
///
/// `Err` 仅用于完全无法执行的情况（无法启动 shell）；
/// 命令运行后以非零状态退出时，返回带有该状态的 `Ok` 结果。
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, request: &CommandRequest) -> Result<CommandResult>;
}

/// Runs commands through `sh -c`, with `sudo -n` for privileged requests and
/// GNU `timeout` for time limits, so a timed-out command's whole process group
/// is stopped.
///
/// 通过 `sh -c` 运行命令；特权请求使用 `sudo -n`，时间限制使用 GNU `timeout`，
/// 从而在超时时停止整个进程组。
#[derive(Debug, Clone)]
pub struct ShellRunner {
    as_root: bool,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            as_root: effective_uid_is_root(),
        }
    }

    /// The argv that will be spawned for `request`.
    pub fn argv(&self, request: &CommandRequest) -> Vec<String> {
        let mut argv = Vec::new();
        if let Some(limit) = request.timeout {
            argv.extend([
                "timeout".to_string(),
                "-k".to_string(),
                format!("{}s", KILL_GRACE_SECS),
                format!("{}s", limit.as_secs().max(1)),
            ]);
        }
        if request.sudo && !self.as_root {
            argv.extend(["sudo".to_string(), "-n".to_string()]);
        }
        argv.extend([
            "sh".to_string(),
            "-c".to_string(),
            request.command.clone(),
        ]);
        argv
    }
}

#[async_trait]
impl ProcessRunner for ShellRunner {
    async fn run(&self, request: &CommandRequest) -> Result<CommandResult> {
        let argv = self.argv(request);
        let mut cmd = tokio::process::Command::new(&argv[0]);
        cmd.args(&argv[1..]).kill_on_drop(true);
        if let Some(dir) = &request.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &request.env {
            cmd.env(key, value);
        }

        let start_time = Instant::now();
        let capture = spawn_and_capture(cmd);
        let (status_res, stdout, stderr) = match request.timeout {
            // Backstop in case `timeout` itself hangs; the process is killed on drop.
            Some(limit) => {
                let backstop = limit + Duration::from_secs(KILL_GRACE_SECS * 2);
                match tokio::time::timeout(backstop, capture).await {
                    Ok(captured) => captured,
                    Err(_) => {
                        return Ok(CommandResult {
                            command: request.command.clone(),
                            exit_status: None,
                            stdout: String::new(),
                            stderr: String::new(),
                            duration: start_time.elapsed(),
                            timed_out: true,
                        });
                    }
                }
            }
            None => capture.await,
        };
        let status = status_res
            .with_context(|| format!("Failed to execute command: {}", request.command))?;

        let exit_status = status.code();
        let timed_out = request.timeout.is_some()
            && matches!(exit_status, Some(TIMEOUT_EXIT) | Some(TIMEOUT_KILLED_EXIT));

        Ok(CommandResult {
            command: request.command.clone(),
            exit_status: if timed_out { None } else { exit_status },
            stdout,
            stderr,
            duration: start_time.elapsed(),
            timed_out,
        })
    }
}

/// Reads the effective uid from `/proc/self/status`.
fn effective_uid_is_root() -> bool {
    fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status
                .lines()
                .find(|line| line.starts_with("Uid:"))
                .and_then(|line| line.split_whitespace().nth(2).map(|euid| euid == "0"))
        })
        .unwrap_or(false)
}

/// Quotes `value` for safe interpolation into a shell command line.
pub fn quote(value: &str) -> String {
    shlex::try_quote(value)
        .map(|q| q.into_owned())
        .unwrap_or_else(|_| format!("'{}'", value.replace('\0', "")))
}

/// Spawns a command, captures its stdout and stderr.
/// The output streams are read concurrently into two separate strings.
///
/// # Arguments
/// * `cmd` - The `tokio::process::Command` to execute.
///
/// # Returns
/// A tuple containing:
/// - The `ExitStatus` of the process wrapped in an `io::Result`.
/// - The captured stdout.
/// - The captured stderr.
///
/// 派生一个命令，捕获其 stdout 和 stderr。
/// 两个输出流被并发读取到两个独立的字符串中。
pub async fn spawn_and_capture(
    mut cmd: tokio::process::Command,
) -> (std::io::Result<std::process::ExitStatus>, String, String) {
    let mut child = match cmd
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return (Err(e), String::new(), String::new()),
    };

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return (
            Err(std::io::Error::other("Failed to capture process output")),
            String::new(),
            String::new(),
        );
    };

    // Spawn a task per stream so a chatty stderr cannot block stdout.
    // 每个输出流一个任务，避免大量 stderr 输出阻塞 stdout。
    let stdout_handle = tokio::spawn(drain(stdout));
    let stderr_handle = tokio::spawn(drain(stderr));

    let status = child.wait().await;

    let stdout = stdout_handle.await.unwrap_or_else(|e| {
        eprintln!("Failed to join stdout task: {}", e);
        String::new()
    });
    let stderr = stderr_handle.await.unwrap_or_else(|e| {
        eprintln!("Failed to join stderr task: {}", e);
        String::new()
    });

    (status, stdout, stderr)
}

/// Reads a pipe to EOF. Bytes that are not valid UTF-8 are replaced rather
/// than ending the read, so later lines still reach the evaluator.
///
/// 读取管道直到 EOF。无效的 UTF-8 字节会被替换而不是终止读取。
async fn drain<R: AsyncRead + Unpin>(mut stream: R) -> String {
    let mut bytes = Vec::new();
    if let Err(e) = stream.read_to_end(&mut bytes).await {
        bytes.extend_from_slice(format!("\n[output truncated: {}]\n", e).as_bytes());
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
