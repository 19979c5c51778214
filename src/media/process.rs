use anyhow::{Context, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one external command run. A non-zero exit is a normal
/// outcome the caller branches on, not an error.
#[derive(Debug)]
pub struct CommandOutput {
    /// Combined stdout and stderr text.
    pub text: String,
    pub success: bool,
}

impl CommandOutput {
    /// Last non-empty output line, usually the tool's own error summary.
    pub fn last_line(&self) -> &str {
        self.text
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
    }
}

/// Run an external command, capturing stdout and stderr into one buffer.
/// Errors are reserved for spawn failures and timeout expiry; the timeout
/// kills the subprocess via `kill_on_drop`.
pub async fn run_capture(program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput> {
    debug!("Running {} {}", program, args.join(" "));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| anyhow::anyhow!("{} timed out after {}s", program, timeout.as_secs()))?
        .with_context(|| format!("failed to collect output of {program}"))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(CommandOutput {
        text,
        success: output.status.success(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_capture_combines_stdout_and_stderr() {
        let output = run_capture(
            "sh",
            &args(&["-c", "echo out; echo err 1>&2"]),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(output.success);
        assert!(output.text.contains("out"));
        assert!(output.text.contains("err"));
    }

    #[tokio::test]
    async fn test_run_capture_nonzero_exit_is_not_an_error() {
        let output = run_capture("sh", &args(&["-c", "exit 3"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!output.success);
    }

    #[tokio::test]
    async fn test_run_capture_spawn_failure() {
        let result = run_capture("definitely-not-a-real-binary", &[], Duration::from_secs(5)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_capture_timeout_kills_process() {
        let result = run_capture(
            "sh",
            &args(&["-c", "sleep 30"]),
            Duration::from_millis(100),
        )
        .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }

    #[test]
    fn test_last_line() {
        let output = CommandOutput {
            text: "first\nERROR: no video\n\n".to_string(),
            success: false,
        };
        assert_eq!(output.last_line(), "ERROR: no video");
    }
}
