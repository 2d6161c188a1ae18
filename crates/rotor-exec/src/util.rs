use std::{process::Stdio, time::Duration};

use tokio::process::Command;
use tracing::trace;

use crate::error::{ExecError, ExecResult};

pub fn cmd_program(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|s| s.as_str()));
    cmd
}

/// Run to completion and return stdout. Non-zero exit carries trimmed stderr.
///
/// The child is killed when `timeout` expires.
pub async fn run_capture(
    program: &str,
    args: &[String],
    timeout: Option<Duration>,
) -> ExecResult<String> {
    trace!(target: "rotor.exec", %program, ?args, "spawn");

    let mut cmd = cmd_program(program, args);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ExecError::MissingProgram(program.to_string()),
        _ => ExecError::Spawn(e.to_string()),
    })?;

    let output = match timeout {
        Some(after) => tokio::time::timeout(after, child.wait_with_output())
            .await
            .map_err(|_| ExecError::Timeout(after))??,
        None => child.wait_with_output().await?,
    };

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    match output.status.code() {
        Some(code) => Err(ExecError::NonZeroExit {
            code,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        None => Err(ExecError::KilledBySignal),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn arguments_are_not_shell_expanded() {
        let out = run_capture("echo", &args(&["$HOME;", "rm -rf /"]), None)
            .await
            .unwrap();
        assert_eq!(out, "$HOME; rm -rf /\n");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let err = run_capture("ls", &args(&["/definitely/not/here"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::NonZeroExit { ref stderr, .. } if !stderr.is_empty()));
    }

    #[tokio::test]
    async fn missing_program() {
        let err = run_capture("rotor-no-such-program", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::MissingProgram(_)));
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let err = run_capture("sleep", &args(&["5"]), Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout(_)));
    }
}
