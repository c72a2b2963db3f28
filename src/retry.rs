//! Support utilities for [`keen_retry`]'s retry API.

use async_openai::error::OpenAIError;
use keen_retry::RetryResult;
use reqwest::StatusCode;

/// Our usual retry result: no input to hand back, and `anyhow` errors.
pub type SimpleRetryResult<T> = RetryResult<(), (), T, anyhow::Error>;

/// Macro which implements `?`-like behavior for [`RetryResult`].
macro_rules! try_retry_result {
    ($result:expr) => {
        match $result {
            ::keen_retry::RetryResult::Ok { output, .. } => output,
            ::keen_retry::RetryResult::Transient { input, error } => {
                return ::keen_retry::RetryResult::Transient {
                    input,
                    error: From::from(error),
                };
            }
            ::keen_retry::RetryResult::Fatal { input, error } => {
                return ::keen_retry::RetryResult::Fatal {
                    input,
                    error: From::from(error),
                };
            }
        }
    };
}

// Export the macro within the crate as if it were a normal symbol.
pub(crate) use try_retry_result;

/// Build an [`RetryResult::Ok`] value.
pub(crate) fn retry_result_ok<T, E>(output: T) -> RetryResult<(), (), T, E> {
    RetryResult::Ok {
        reported_input: (),
        output,
    }
}

/// Build an [`RetryResult::Fatal`] value.
pub(crate) fn retry_result_fatal<T, E>(error: E) -> RetryResult<(), (), T, E> {
    RetryResult::Fatal { input: (), error }
}

/// Build an [`RetryResult::Transient`] value.
pub(crate) fn retry_result_transient<T, E>(error: E) -> RetryResult<(), (), T, E> {
    RetryResult::Transient { input: (), error }
}

/// Convert a [`Result`] into a [`RetryResult`].
pub trait IntoRetryResult<T, E> {
    /// Treat any error as fatal.
    fn into_fatal(self) -> RetryResult<(), (), T, E>;

    /// Treat any error as worth another try.
    fn into_transient(self) -> RetryResult<(), (), T, E>;

    /// Ask `is_transient` whether an error is worth another try.
    fn into_retry_result(
        self,
        is_transient: impl FnOnce(&E) -> bool,
    ) -> RetryResult<(), (), T, E>;
}

impl<T, E: std::fmt::Debug> IntoRetryResult<T, E> for Result<T, E> {
    fn into_fatal(self) -> RetryResult<(), (), T, E> {
        match self {
            Ok(output) => retry_result_ok(output),
            Err(error) => retry_result_fatal(error),
        }
    }

    fn into_transient(self) -> RetryResult<(), (), T, E> {
        match self {
            Ok(output) => retry_result_ok(output),
            Err(error) => {
                tracing::debug!("Potentially transient error: {:?}", error);
                retry_result_transient(error)
            }
        }
    }

    fn into_retry_result(
        self,
        is_transient: impl FnOnce(&E) -> bool,
    ) -> RetryResult<(), (), T, E> {
        match self {
            Ok(output) => retry_result_ok(output),
            Err(error) if is_transient(&error) => {
                tracing::debug!("Potentially transient error: {:?}", error);
                retry_result_transient(error)
            }
            Err(error) => retry_result_fatal(error),
        }
    }
}

/// Is this error a known transient error?
///
/// By default, we assume errors are not transient, until they've been observed
/// in the wild, investigated and determined to be transient. This prevents us
/// from doing large numbers of retries with exponential backoff on errors that
/// will never resolve.
pub trait IsKnownTransient {
    /// Is this error likely to be transient?
    fn is_known_transient(&self) -> bool;
}

impl IsKnownTransient for reqwest::Error {
    fn is_known_transient(&self) -> bool {
        if let Some(status) = self.status() {
            status.is_known_transient()
        } else {
            // Connection resets, DNS hiccups and the like. `reqwest` doesn't
            // give us enough detail to tell these apart.
            true
        }
    }
}

impl IsKnownTransient for StatusCode {
    fn is_known_transient(&self) -> bool {
        let transient_failures = [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
        ];
        transient_failures.contains(self)
    }
}

impl IsKnownTransient for OpenAIError {
    fn is_known_transient(&self) -> bool {
        match self {
            OpenAIError::Reqwest(err) => err.is_known_transient(),
            OpenAIError::ApiError(err) => {
                err.r#type.as_deref() == Some("server_error")
                    || err.code.as_deref() == Some("rate_limit_exceeded")
            }
            // Usually a truncated response body.
            OpenAIError::JSONDeserialize(_) => true,
            _ => false,
        }
    }
}
