//! Short-lived external tool invocation with a hard deadline.

use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Why a tool invocation produced no usable stdout
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {status}: {stderr}")]
    NonZeroExit {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Run `program` with `args`, racing it against `timeout`.
///
/// The child is spawned with `kill_on_drop`, so when the timer wins the
/// pending `wait_with_output` future is dropped and the process is killed.
/// Arguments are passed as discrete argv entries, never through a shell.
pub async fn invoke_with_timeout(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<String, InvokeError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| InvokeError::Spawn {
            program: program.to_string(),
            source,
        })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            if !output.status.success() {
                return Err(InvokeError::NonZeroExit {
                    program: program.to_string(),
                    status: output.status,
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
        Ok(Err(source)) => Err(InvokeError::Spawn {
            program: program.to_string(),
            source,
        }),
        Err(_) => Err(InvokeError::Timeout {
            program: program.to_string(),
            timeout,
        }),
    }
}
