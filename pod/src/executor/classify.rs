use std::error::Error as StdError;
use std::io::ErrorKind;

use super::transport::TransportError;

/// Names and codes that mark a timeout or abort at any level of a chain.
pub const TIMEOUT_SIGNATURES: [&str; 5] = [
    "TimeoutError",
    "AbortError",
    "ETIMEDOUT",
    "ECONNABORTED",
    "TIMEOUT",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    TimedOut,
    Failed,
}

/// Decide whether a remote failure was a timeout.
///
/// Client layers wrap lower-level errors, so the whole source chain is
/// inspected. Only when no level carries a timeout signature does the
/// top-level message get a case-insensitive look for "timeout".
pub fn classify_failure(err: &anyhow::Error) -> FailureKind {
    if err.chain().any(is_timeout_cause) {
        return FailureKind::TimedOut;
    }

    if err.to_string().to_ascii_lowercase().contains("timeout") {
        FailureKind::TimedOut
    } else {
        FailureKind::Failed
    }
}

fn is_timeout_cause(cause: &(dyn StdError + 'static)) -> bool {
    if let Some(transport) = cause.downcast_ref::<TransportError>() {
        if transport.is_timeout() {
            return true;
        }
    }
    if let Some(http) = cause.downcast_ref::<reqwest::Error>() {
        if http.is_timeout() {
            return true;
        }
    }
    if cause.is::<tokio::time::error::Elapsed>() {
        return true;
    }
    if let Some(io) = cause.downcast_ref::<std::io::Error>() {
        if matches!(io.kind(), ErrorKind::TimedOut | ErrorKind::ConnectionAborted) {
            return true;
        }
    }

    carries_signature(&cause.to_string())
}

fn carries_signature(message: &str) -> bool {
    message
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| TIMEOUT_SIGNATURES.contains(&token))
}
