//! Asynchronous utilities for use with Tokio.
//!
//! Most of our slow work happens in external processes (`pdftocairo`,
//! `tesseract`) or in CPU-bound image decoding. The helpers here keep both
//! from stalling the async executor, and turn failing commands into useful
//! errors.

use std::{panic, process::Output};

use tracing::Level;

use crate::prelude::*;

pub mod io;

/// Report any command failures, and include any error output.
///
/// Standard output is logged at `trace`, and non-empty standard error at
/// `stderr_level` (anything but `WARN` and `ERROR` is logged at `debug`). If
/// `is_error_line` is supplied, a command which exits successfully but prints
/// a matching line on standard error is still treated as failed.
pub fn check_for_command_failure(
    command_name: &str,
    output: &Output,
    stderr_level: Level,
    is_error_line: Option<&dyn Fn(&str) -> bool>,
) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    trace!(
        command_name = command_name,
        output = %stdout,
        "Standard output from command"
    );
    if !stderr.trim().is_empty() {
        match stderr_level {
            Level::ERROR | Level::WARN => warn!(
                command_name = command_name,
                output = %stderr,
                "Standard error from command",
            ),
            _ => debug!(
                command_name = command_name,
                output = %stderr,
                "Standard error from command",
            ),
        }
    }

    if output.status.success() {
        if let Some(is_error_line) = is_error_line {
            if stderr.lines().any(|line| is_error_line(line)) {
                return Err(anyhow!(
                    "{} printed error output:\n{}",
                    command_name,
                    stderr,
                ));
            }
        }
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}

/// Wrapper around [`tokio::task::spawn_blocking`] that propagates panics from
/// the background task.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
        // Only happens if the runtime is shutting down underneath us.
        Err(err) => panic!("blocking task was cancelled: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        process::Command,
        sync::{Arc, Mutex},
    };

    use super::*;

    /// Log output captured in memory.
    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Check a successful command which chats on stderr, and return whatever
    /// was logged at `info` and above.
    fn log_chatty_command(stderr_level: Level) -> String {
        let output = Command::new("sh")
            .args(["-c", "echo 'Estimating resolution as 300' >&2"])
            .output()
            .unwrap();
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            check_for_command_failure("sh", &output, stderr_level, None).unwrap();
        });
        let bytes = log.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn stderr_is_logged_at_the_requested_level() {
        assert!(log_chatty_command(Level::WARN).contains("Estimating resolution"));
        assert!(!log_chatty_command(Level::DEBUG).contains("Estimating resolution"));
    }

    #[test]
    fn successful_command_passes() {
        let output = Command::new("sh")
            .args(["-c", "echo hello"])
            .output()
            .unwrap();
        assert!(check_for_command_failure("sh", &output, Level::WARN, None).is_ok());
    }

    #[test]
    fn failing_command_reports_exit_code() {
        let output = Command::new("sh")
            .args(["-c", "echo oops >&2; exit 3"])
            .output()
            .unwrap();
        let err = check_for_command_failure("sh", &output, Level::WARN, None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit code 3"), "{msg}");
        assert!(msg.contains("oops"), "{msg}");
    }

    #[test]
    fn error_lines_on_stderr_fail_successful_command() {
        let output = Command::new("sh")
            .args(["-c", "echo 'Error: bad page' >&2"])
            .output()
            .unwrap();
        let is_error_line = |line: &str| line.starts_with("Error");
        let result =
            check_for_command_failure("sh", &output, Level::WARN, Some(&is_error_line));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn spawn_blocking_returns_value() {
        let value = spawn_blocking_propagating_panics(|| 6 * 7).await;
        assert_eq!(value, 42);
    }
}
