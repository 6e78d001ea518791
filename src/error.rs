//! Typed errors for the replication core and the external-filter runner.
//!
//! Replication failures are a closed set: every variant maps to one
//! caller-observable condition, and any of them leaves the replica in a
//! recoverable state (live database and stub pointer stay consistent).

use std::fmt;

/// Error raised by the replication core.
#[derive(Debug)]
pub enum ReplicationError {
    /// The caller used the API in a way that makes no sense for the current
    /// state (multiple subdatabases, missing channel, replica path is a file).
    InvalidOperation(String),
    /// A database directory or the stub pointer could not be created,
    /// opened, or atomically replaced.
    DatabaseOpening(String),
    /// The stub pointer names a backend this build does not support.
    FeatureUnavailable(String),
    /// Protocol violation, unexpected message type, or transport deadline.
    Network(String),
}

impl fmt::Display for ReplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationError::InvalidOperation(msg) => {
                write!(f, "invalid operation: {}", msg)
            }
            ReplicationError::DatabaseOpening(msg) => {
                write!(f, "database opening failed: {}", msg)
            }
            ReplicationError::FeatureUnavailable(msg) => {
                write!(f, "feature unavailable: {}", msg)
            }
            ReplicationError::Network(msg) => write!(f, "network error: {}", msg),
        }
    }
}

impl std::error::Error for ReplicationError {}

/// How many bytes of a failed filter's stderr we keep for diagnostics.
const STDERR_TAIL_BYTES: usize = 1024;

/// Error raised when running an external document filter.
#[derive(Debug)]
pub enum SubprocessError {
    /// The shell reported the command as not found (exit status 127).
    Missing,
    /// The filter ran but failed: non-zero exit, a signal, or an I/O error
    /// while draining its output. Carries the tail of captured stderr.
    Failed {
        status: Option<i32>,
        stderr_tail: String,
    },
}

impl SubprocessError {
    /// Build a `Failed` variant, keeping only the last
    /// [`STDERR_TAIL_BYTES`] of stderr.
    pub fn failed(status: Option<i32>, stderr: &[u8]) -> Self {
        let text = String::from_utf8_lossy(stderr);
        let tail = if text.len() > STDERR_TAIL_BYTES {
            let mut start = text.len() - STDERR_TAIL_BYTES;
            while !text.is_char_boundary(start) {
                start += 1;
            }
            text[start..].to_string()
        } else {
            text.into_owned()
        };
        SubprocessError::Failed {
            status,
            stderr_tail: tail,
        }
    }
}

impl fmt::Display for SubprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubprocessError::Missing => write!(f, "filter program not found"),
            SubprocessError::Failed {
                status,
                stderr_tail,
            } => {
                match status {
                    Some(code) => write!(f, "filter failed with status {}", code)?,
                    None => write!(f, "filter terminated by signal")?,
                }
                if !stderr_tail.is_empty() {
                    write!(f, ": {}", stderr_tail.trim_end())?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for SubprocessError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_tail_is_bounded() {
        let big = vec![b'x'; 5000];
        let err = SubprocessError::failed(Some(1), &big);
        match err {
            SubprocessError::Failed { stderr_tail, .. } => {
                assert_eq!(stderr_tail.len(), 1024);
            }
            _ => panic!("expected Failed"),
        }
    }

    #[test]
    fn display_mentions_status() {
        let err = SubprocessError::failed(Some(2), b"boom");
        assert_eq!(err.to_string(), "filter failed with status 2: boom");
    }
}
