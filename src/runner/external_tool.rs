//! Async subprocess execution for the compiler and the trace analyzer
//!
//! Every spawned child is owned by the future awaiting it and is created with
//! `kill_on_drop`, so dropping the future (early return, cancellation, task
//! abort) always terminates the process. On Unix the child leads its own
//! process group, and cancellation kills the whole group so that `npx`/`bunx`
//! wrappers do not leave a detached `node` behind.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Command as StdCommand, Stdio};
use std::sync::OnceLock;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result from running an external tool
#[derive(Debug, Clone, Default)]
pub struct ExternalToolResult {
    /// Whether the tool ran to completion (exit code may still be non-zero)
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub return_code: Option<i32>,
    /// Whether the run was cancelled while the tool was running
    pub cancelled: bool,
    /// Error message if the tool could not be run
    pub error: Option<String>,
}

impl ExternalToolResult {
    pub fn success(stdout: String, stderr: String, return_code: i32) -> Self {
        Self {
            success: true,
            stdout,
            stderr,
            return_code: Some(return_code),
            cancelled: false,
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn cancelled(tool_name: &str) -> Self {
        Self {
            success: false,
            cancelled: true,
            error: Some(format!("{} was cancelled", tool_name)),
            ..Default::default()
        }
    }

    /// Completed with exit code 0
    pub fn exit_ok(&self) -> bool {
        self.success && self.return_code == Some(0)
    }

    /// Last `max_lines` non-empty lines of stdout+stderr, for error messages
    pub fn output_tail(&self, max_lines: usize) -> String {
        let lines: Vec<&str> = self
            .stdout
            .lines()
            .chain(self.stderr.lines())
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

/// Cached JavaScript runtime detection
static JS_RUNTIME: OnceLock<JsRuntime> = OnceLock::new();

/// JavaScript runtime type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsRuntime {
    Bun,
    Npm,
    None,
}

impl JsRuntime {
    /// Get the package executor command (bunx or npx)
    pub fn exec_cmd(&self) -> &'static str {
        match self {
            JsRuntime::Bun => "bunx",
            JsRuntime::Npm => "npx",
            JsRuntime::None => "npx", // Fallback, will fail if not installed
        }
    }
}

/// Detect available JavaScript runtime.
///
/// npm is preferred here: tsc timings under bun's node shim are not
/// comparable with historical npx runs.
pub fn get_js_runtime() -> JsRuntime {
    *JS_RUNTIME.get_or_init(|| {
        if is_tool_installed("npm") {
            debug!("Using npm runtime for JavaScript tools");
            return JsRuntime::Npm;
        }
        if is_tool_installed("bun") {
            debug!("Using Bun runtime for JavaScript tools");
            return JsRuntime::Bun;
        }
        warn!("No JavaScript runtime (npm or bun) found. Compiler commands may fail.");
        JsRuntime::None
    })
}

/// Get command to execute a JS package binary
pub fn get_js_exec_command(package: &str) -> Vec<String> {
    let runtime = get_js_runtime();
    vec![runtime.exec_cmd().to_string(), package.to_string()]
}

/// Check if a tool is installed
pub fn is_tool_installed(tool: &str) -> bool {
    StdCommand::new(tool)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run an external tool until it exits or `cancel` fires
///
/// # Arguments
/// * `cmd` - Command and arguments to run
/// * `tool_name` - Human-readable tool name for error messages
/// * `cwd` - Working directory for the tool
/// * `env` - Additional environment variables
/// * `cancel` - Kills the process when cancelled
pub async fn run_external_tool(
    cmd: &[String],
    tool_name: &str,
    cwd: Option<&Path>,
    env: Option<&HashMap<String, String>>,
    cancel: &CancellationToken,
) -> ExternalToolResult {
    let Some((program, args)) = cmd.split_first() else {
        return ExternalToolResult::failure("Empty command".to_string());
    };

    if cancel.is_cancelled() {
        return ExternalToolResult::cancelled(tool_name);
    }

    debug!("Running {}: {} {:?}", tool_name, program, args);

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    if let Some(extra_env) = env {
        command.envs(extra_env);
    }

    #[cfg(unix)]
    command.process_group(0);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            if e.kind() == std::io::ErrorKind::NotFound {
                return ExternalToolResult::failure(format!(
                    "{} not found. Please install it first.",
                    tool_name
                ));
            }
            return ExternalToolResult::failure(format!("Failed to run {}: {}", tool_name, e));
        }
    };
    let pid = child.id();

    tokio::select! {
        output = child.wait_with_output() => match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let return_code = output.status.code().unwrap_or(-1);
                ExternalToolResult::success(stdout, stderr, return_code)
            }
            Err(e) => ExternalToolResult::failure(format!("Failed to wait for {}: {}", tool_name, e)),
        },
        _ = cancel.cancelled() => {
            warn!("{} cancelled, terminating pid {:?}", tool_name, pid);
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            ExternalToolResult::cancelled(tool_name)
        }
    }
}

/// Kill the process group led by `pid`. The direct child is also killed by
/// `kill_on_drop` once its future is dropped.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let _ = StdCommand::new("kill")
        .args(["-KILL", "--", &format!("-{}", pid)])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[test]
    fn test_external_tool_result() {
        let result = ExternalToolResult::success("output".into(), "".into(), 0);
        assert!(result.success);
        assert!(result.exit_ok());
        assert_eq!(result.stdout, "output");

        let result = ExternalToolResult::success("".into(), "".into(), 2);
        assert!(result.success);
        assert!(!result.exit_ok());

        let result = ExternalToolResult::failure("error".into());
        assert!(!result.success);
        assert_eq!(result.error, Some("error".into()));

        let result = ExternalToolResult::cancelled("tsc");
        assert!(result.cancelled);
    }

    #[test]
    fn test_output_tail() {
        let result = ExternalToolResult::success("a\nb\n\nc\n".into(), "d\n".into(), 1);
        assert_eq!(result.output_tail(2), "c\nd");
        assert_eq!(result.output_tail(10), "a\nb\nc\nd");
    }

    #[tokio::test]
    async fn test_empty_command() {
        let cancel = CancellationToken::new();
        let result = run_external_tool(&[], "none", None, None, &cancel).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let cancel = CancellationToken::new();
        let cmd = vec!["ts-bench-definitely-not-installed".to_string()];
        let result = run_external_tool(&cmd, "ghost", None, None, &cancel).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_output_and_env() {
        let cancel = CancellationToken::new();
        let mut env = HashMap::new();
        env.insert("TS_BENCH_TEST_VALUE".to_string(), "42".to_string());
        let result = run_external_tool(
            &sh("echo \"value=$TS_BENCH_TEST_VALUE\"; echo oops >&2; exit 3"),
            "sh",
            None,
            Some(&env),
            &cancel,
        )
        .await;

        assert!(result.success);
        assert_eq!(result.return_code, Some(3));
        assert_eq!(result.stdout.trim(), "value=42");
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = run_external_tool(&sh("sleep 30"), "sleep", None, None, &cancel).await;

        assert!(result.cancelled);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_already_cancelled_does_not_spawn() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cmd = vec!["ts-bench-definitely-not-installed".to_string()];
        let result = run_external_tool(&cmd, "ghost", None, None, &cancel).await;
        assert!(result.cancelled);
    }
}
