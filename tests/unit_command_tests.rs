//! # Command Module Unit Tests / Command 模块单元测试
//!
//! This module tests the real shell runner: captured output, exit codes,
//! working directories, environment variables and time limits.
//!
//! 此模块测试真实的 shell 运行器：输出捕获、退出码、工作目录、环境变量以及时间限制。

use std::time::Duration;
use tempfile::tempdir;
use tokio::process::Command;

use kernel_test_runner::infra::command::{
    CommandRequest, ProcessRunner, ShellRunner, quote, spawn_and_capture,
};

#[cfg(test)]
mod argv_tests {
    use super::*;

    #[test]
    fn test_plain_request_goes_through_sh() {
        let argv = ShellRunner::new().argv(&CommandRequest::shell("uname -r"));
        assert_eq!(argv, vec!["sh", "-c", "uname -r"]);
    }

    #[test]
    fn test_timeout_wraps_the_whole_command() {
        let request = CommandRequest::shell("make -j8").timeout(Duration::from_secs(90));
        let argv = ShellRunner::new().argv(&request);
        assert_eq!(&argv[..4], &["timeout", "-k", "10s", "90s"]);
        assert_eq!(argv.last().map(String::as_str), Some("make -j8"));
    }

    #[test]
    fn test_sub_second_timeout_rounds_up_to_one_second() {
        let request = CommandRequest::shell("true").timeout(Duration::from_millis(200));
        let argv = ShellRunner::new().argv(&request);
        assert_eq!(argv[3], "1s");
    }

    #[test]
    fn test_quote_protects_shell_metacharacters() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("a b"), "'a b'");
        assert_eq!(quote("$(reboot)"), "'$(reboot)'");
    }
}

#[cfg(test)]
mod shell_runner_tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_stderr_separately() {
        let result = ShellRunner::new()
            .run(&CommandRequest::shell("echo hello; echo oops >&2"))
            .await
            .unwrap();

        assert!(result.success());
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "oops\n");
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_result_not_an_error() {
        let result = ShellRunner::new()
            .run(&CommandRequest::shell("exit 3"))
            .await
            .unwrap();

        assert_eq!(result.exit_status, Some(3));
        assert!(!result.success());
        assert_eq!(result.status_display(), "exit status 3");
    }

    #[tokio::test]
    async fn test_working_directory_and_environment() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();

        let result = ShellRunner::new()
            .run(
                &CommandRequest::shell("ls; echo \"$CASE_NAME\"")
                    .in_dir(dir.path())
                    .env("CASE_NAME", "netstat"),
            )
            .await
            .unwrap();

        assert!(result.stdout.contains("marker.txt"));
        assert!(result.stdout.contains("netstat"));
    }

    #[tokio::test]
    async fn test_time_limit_stops_the_command() {
        let result = ShellRunner::new()
            .run(&CommandRequest::shell("sleep 5").timeout(Duration::from_secs(1)))
            .await
            .unwrap();

        assert!(result.timed_out);
        assert_eq!(result.exit_status, None);
        assert_eq!(result.status_display(), "timed out");
        assert!(result.duration < Duration::from_secs(5));
    }

    /// Output after a line that is not valid UTF-8 is still captured, so a
    /// trace printed later in `dmesg` is not lost.
    ///
    /// 无效 UTF-8 行之后的输出仍会被捕获，`dmesg` 中较晚打印的调用栈不会丢失。
    #[tokio::test]
    async fn test_invalid_utf8_does_not_truncate_output() {
        let result = ShellRunner::new()
            .run(&CommandRequest::shell(
                "printf 'boot ok\\n\\377 garbage\\n[ 9.9] Call Trace:\\n'; printf '\\376\\nlate\\n' >&2",
            ))
            .await
            .unwrap();

        assert!(result.success());
        assert!(result.stdout.starts_with("boot ok\n"));
        assert!(result.stdout.contains('\u{FFFD}'));
        assert!(result.stdout.ends_with("[ 9.9] Call Trace:\n"));
        assert!(result.stderr.ends_with("late\n"));
    }
}

#[cfg(test)]
mod spawn_and_capture_tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_and_capture_collects_both_streams() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'a\\nb\\n'; echo err >&2; exit 1");

        let (status, stdout, stderr) = spawn_and_capture(cmd).await;

        assert_eq!(status.unwrap().code(), Some(1));
        assert_eq!(stdout, "a\nb\n");
        assert_eq!(stderr, "err\n");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let cmd = Command::new("definitely-not-a-real-binary-xyz");
        let (status, stdout, stderr) = spawn_and_capture(cmd).await;

        assert!(status.is_err());
        assert!(stdout.is_empty());
        assert!(stderr.is_empty());
    }
}
