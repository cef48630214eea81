// kegsmith-core/src/process.rs
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};

use kegsmith_common::error::{KegError, Result};
use tokio::process::Command;
use tracing::debug;

use crate::env::IsolatedEnv;

/// Runs `program` with `args` under the isolated environment and fails with
/// [`KegError::CommandFailed`] on a non-zero exit.
pub async fn run_isolated<I, S>(
    program: &Path,
    args: I,
    cwd: &Path,
    env: &IsolatedEnv,
) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args);
    env.apply_to_command(&mut cmd);
    cmd.current_dir(cwd);
    cmd.kill_on_drop(true);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let cmd_line = describe(&cmd);
    debug!("Running command in [{}]: {}", cwd.display(), cmd_line);

    let output = cmd.output().await.map_err(|e| KegError::CommandFailed {
        command: cmd_line.clone(),
        status: "spawn error".to_string(),
        stderr: e.to_string(),
    })?;

    if output.status.success() {
        debug!("Command finished successfully: {}", cmd_line);
        return Ok(output);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stdout.trim().is_empty() {
        debug!("Stdout:\n{}", stdout.trim());
    }
    Err(KegError::CommandFailed {
        command: cmd_line,
        status: output.status.to_string(),
        stderr: last_lines(stderr.trim(), 20),
    })
}

fn describe(cmd: &Command) -> String {
    let std_cmd = cmd.as_std();
    std::iter::once(std_cmd.get_program())
        .chain(std_cmd.get_args())
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
