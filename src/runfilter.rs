//! Run an external filter command and capture its stdout.
//!
//! Filters are spawned through the shell so that command templates can use
//! redirections and `||` fallbacks (the OOXML `unzip` templates rely on
//! this). stdout is drained to completion before returning; stderr is
//! captured and kept as a bounded tail on failure.

use std::process::{Command, Stdio};

use crate::error::SubprocessError;

/// Exit status the shell reports for "command not found".
const SHELL_NOT_FOUND: i32 = 127;

/// Run `cmd` via the shell and return its raw stdout bytes.
///
/// Exit status 127 maps to [`SubprocessError::Missing`]; any other
/// failure, including spawn errors, maps to [`SubprocessError::Failed`].
pub fn stdout_to_bytes(cmd: &str) -> Result<Vec<u8>, SubprocessError> {
    let output = shell_command(cmd)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| SubprocessError::failed(None, e.to_string().as_bytes()))?;

    if !output.status.success() {
        if output.status.code() == Some(SHELL_NOT_FOUND) {
            return Err(SubprocessError::Missing);
        }
        return Err(SubprocessError::failed(
            output.status.code(),
            &output.stderr,
        ));
    }
    Ok(output.stdout)
}

#[cfg(not(windows))]
fn shell_command(cmd: &str) -> Command {
    let mut command = Command::new("/bin/sh");
    command.arg("-c").arg(cmd);
    command
}

#[cfg(windows)]
fn shell_command(cmd: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(cmd);
    command
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let out = stdout_to_bytes("printf 'hello'").unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn missing_command_maps_to_missing() {
        let err = stdout_to_bytes("definitely-not-a-real-filter-binary").unwrap_err();
        assert!(matches!(err, SubprocessError::Missing));
    }

    #[test]
    fn nonzero_exit_maps_to_failed_with_stderr_tail() {
        let err = stdout_to_bytes("echo oops >&2; exit 3").unwrap_err();
        match err {
            SubprocessError::Failed {
                status,
                stderr_tail,
            } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr_tail.trim(), "oops");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn shell_fallbacks_in_templates_work() {
        // The OOXML templates rely on `||` running in a shell.
        let out = stdout_to_bytes("false || printf ok").unwrap();
        assert_eq!(out, b"ok");
    }
}
