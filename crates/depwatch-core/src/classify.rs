//! Maps probe outcomes onto the status taxonomy.
//!
//! Order of precedence:
//! 1. an explicit classification carried by the error
//! 2. timeout signals
//! 3. transport signals (refused/unreachable, DNS)
//! 4. TLS signals
//! 5. steps 2-4 again on the error's immediate cause
//! 6. `error`

use std::error::Error as StdError;
use std::io;

use crate::checker::CheckError;
use crate::status::{CheckResult, StatusCategory};

const DNS_PATTERNS: [&str; 6] = [
    "failed to lookup address",
    "no such host",
    "name or service not known",
    "nodename nor servname",
    "temporary failure in name resolution",
    "dns error",
];

const TLS_PATTERNS: [&str; 5] = ["tls", "ssl", "x509", "certificate", "handshake failure"];

const TIMEOUT_PATTERNS: [&str; 3] = ["timed out", "deadline has elapsed", "deadline exceeded"];

/// Classify the outcome of one probe. Success is always `ok`.
pub fn classify(outcome: &Result<(), CheckError>) -> CheckResult {
    match outcome {
        Ok(()) => CheckResult::ok(),
        Err(err) => classify_error(err),
    }
}

/// Classify a failed probe.
pub fn classify_error(err: &CheckError) -> CheckResult {
    if let Some(result) = sentinel(err) {
        return result;
    }

    let top: &(dyn StdError + 'static) = match err {
        CheckError::Io(e) => e,
        CheckError::Other(e) => &**e,
        other => other,
    };

    signal(top)
        .or_else(|| top.source().and_then(signal))
        .unwrap_or_else(|| CheckResult::plain(StatusCategory::Error))
}

/// Explicit classifications and the sentinel variants.
fn sentinel(err: &CheckError) -> Option<CheckResult> {
    match err {
        CheckError::Classified { .. } => err.classification(),
        CheckError::Timeout => Some(CheckResult::plain(StatusCategory::Timeout)),
        CheckError::ConnectionRefused(_) => Some(connection_refused()),
        CheckError::Unhealthy(_) => Some(CheckResult::plain(StatusCategory::Unhealthy)),
        CheckError::Io(_) | CheckError::Other(_) => None,
    }
}

/// Steps 2-4 against a single error, without following its cause.
fn signal(err: &(dyn StdError + 'static)) -> Option<CheckResult> {
    if let Some(check_err) = err.downcast_ref::<CheckError>() {
        if let Some(result) = sentinel(check_err) {
            return Some(result);
        }
    }

    if err.is::<tokio::time::error::Elapsed>() {
        return Some(CheckResult::plain(StatusCategory::Timeout));
    }

    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        match io_err.kind() {
            io::ErrorKind::TimedOut => return Some(CheckResult::plain(StatusCategory::Timeout)),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable => return Some(connection_refused()),
            _ => {}
        }
        if let Some(inner) = io_err.get_ref() {
            if let Some(result) = signal(inner) {
                return Some(result);
            }
        }
    }

    let msg = err.to_string().to_lowercase();
    if TIMEOUT_PATTERNS.iter().any(|p| msg.contains(p)) {
        return Some(CheckResult::plain(StatusCategory::Timeout));
    }
    if msg.contains("connection refused") {
        return Some(connection_refused());
    }
    if DNS_PATTERNS.iter().any(|p| msg.contains(p)) {
        return Some(CheckResult::plain(StatusCategory::DnsError));
    }
    if TLS_PATTERNS.iter().any(|p| msg.contains(p)) {
        return Some(CheckResult::plain(StatusCategory::TlsError));
    }

    None
}

fn connection_refused() -> CheckResult {
    CheckResult::new(StatusCategory::ConnectionError, "connection_refused")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn io_err(kind: io::ErrorKind, msg: &str) -> CheckError {
        CheckError::Io(io::Error::new(kind, msg.to_string()))
    }

    #[test]
    fn success_is_ok() {
        assert_eq!(classify(&Ok(())), CheckResult::ok());
    }

    #[test]
    fn explicit_classification_wins() {
        // Message looks like a timeout, but the checker said auth.
        let err =
            CheckError::classified(StatusCategory::AuthError, "auth_error", "login timed out");
        assert_eq!(
            classify(&Err(err)),
            CheckResult::new(StatusCategory::AuthError, "auth_error")
        );
    }

    #[test]
    fn sentinels() {
        assert_eq!(
            classify_error(&CheckError::Timeout),
            CheckResult::plain(StatusCategory::Timeout)
        );
        assert_eq!(
            classify_error(&CheckError::ConnectionRefused("db:5432".into())),
            CheckResult::new(StatusCategory::ConnectionError, "connection_refused")
        );
        assert_eq!(
            classify_error(&CheckError::Unhealthy("not serving".into())),
            CheckResult::plain(StatusCategory::Unhealthy)
        );
    }

    #[test]
    fn io_kinds() {
        assert_eq!(
            classify_error(&io_err(io::ErrorKind::ConnectionRefused, "refused")).category,
            StatusCategory::ConnectionError
        );
        assert_eq!(
            classify_error(&io_err(io::ErrorKind::HostUnreachable, "no route")).category,
            StatusCategory::ConnectionError
        );
        assert_eq!(
            classify_error(&io_err(io::ErrorKind::NetworkUnreachable, "down")).category,
            StatusCategory::ConnectionError
        );
        assert_eq!(
            classify_error(&io_err(io::ErrorKind::TimedOut, "slow")).category,
            StatusCategory::Timeout
        );
    }

    #[test]
    fn dns_by_message() {
        let err = io_err(
            io::ErrorKind::Other,
            "failed to lookup address information: Name or service not known",
        );
        assert_eq!(classify_error(&err), CheckResult::plain(StatusCategory::DnsError));
    }

    #[test]
    fn tls_by_message() {
        let err = CheckError::Other(anyhow!("invalid peer certificate: UnknownIssuer"));
        assert_eq!(classify_error(&err), CheckResult::plain(StatusCategory::TlsError));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_is_timeout() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        let err = CheckError::Other(anyhow::Error::new(elapsed));
        assert_eq!(classify_error(&err).category, StatusCategory::Timeout);
    }

    #[test]
    fn unwraps_one_level_of_cause() {
        let inner = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err = CheckError::Other(anyhow::Error::new(inner).context("probe failed"));
        assert_eq!(
            classify_error(&err),
            CheckResult::new(StatusCategory::ConnectionError, "connection_refused")
        );
    }

    #[test]
    fn does_not_unwrap_two_levels() {
        let inner = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err = CheckError::Other(
            anyhow::Error::new(inner)
                .context("level one")
                .context("level two"),
        );
        assert_eq!(classify_error(&err), CheckResult::plain(StatusCategory::Error));
    }

    #[test]
    fn classified_error_found_under_context() {
        let inner = CheckError::classified(StatusCategory::AuthError, "auth_error", "denied");
        let err = CheckError::Other(anyhow::Error::new(inner).context("redis ping"));
        assert_eq!(classify_error(&err).category, StatusCategory::AuthError);
    }

    #[test]
    fn fallback_is_error() {
        let err = CheckError::Other(anyhow!("something odd"));
        assert_eq!(classify_error(&err), CheckResult::plain(StatusCategory::Error));
    }
}
