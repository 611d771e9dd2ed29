//! Async external command runner.

use bridge_traits::error::{BridgeError, Result};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::process::Command;
use tracing::trace;

/// Default bound for one external command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs a program to completion and returns its trimmed stdout.
///
/// A missing program maps to [`BridgeError::NotAvailable`], a non-zero exit to
/// [`BridgeError::OperationFailed`] carrying stderr. The child is killed if
/// `timeout` elapses.
pub async fn run_command(program: &str, args: &[&str], timeout: Duration) -> Result<String> {
    trace!(program, ?args, "Running external command");

    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
            return Err(BridgeError::NotAvailable(format!(
                "{} is not installed or not on PATH",
                program
            )));
        }
        Ok(Err(e)) => return Err(BridgeError::Io(e)),
        Err(_) => return Err(BridgeError::Timeout(timeout)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BridgeError::OperationFailed(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
