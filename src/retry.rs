//! Retry classification: a pure function from a raw failure description to
//! a classification. A classifier trait plus a standard implementation,
//! in the same shape as a crawler's error-classification layer, but built
//! around account-lookup and block-call failure modes instead.

use std::time::Duration;

use crate::domain::outcome::{ErrorKind, UserState};

/// Everything known about one failed call, as a sum type with total pattern
/// matching rather than an optional grab-bag of fields to probe.
#[derive(Debug, Clone, Default)]
pub struct FailureSignal {
    pub http_status: Option<u16>,
    pub provider_error: Option<String>,
    pub provider_error_code: Option<String>,
    pub exception_kind: Option<ExceptionKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    ConnectTimeout,
    ConnectRefused,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Permanent(UserState),
    Transient { kind: ErrorKind, wait_hint: Duration },
    Auth,
}

/// Backoff policy constants.
pub const BACKOFF_BASE: Duration = Duration::from_secs(60);
pub const BACKOFF_CAP: Duration = Duration::from_secs(900);
const RATE_LIMIT_MIN_WAIT: u64 = 60;
const RATE_LIMIT_MAX_WAIT: u64 = 900;

/// Default retry ceiling for interactive runs; the auto-retry pass may use
/// an elevated ceiling.
pub const DEFAULT_RETRY_CEILING: u32 = 3;
pub const AUTO_RETRY_CEILING: u32 = 10;

pub trait RetryClassifier: Send + Sync {
    fn classify(&self, signal: &FailureSignal) -> Classification;
    fn backoff(&self, attempt_count: u32) -> Duration;
}

/// The standard HTTP-status and provider-error-string classification policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRetryClassifier;

impl StandardRetryClassifier {
    fn classify_provider_error(error: &str) -> Option<Classification> {
        let lower = error.to_lowercase();
        if lower.contains("suspend") {
            return Some(Classification::Permanent(UserState::Suspended));
        }
        if lower.contains("not_found") || lower.contains("not found") || lower.contains("no user matches") {
            return Some(Classification::Permanent(UserState::NotFound));
        }
        if lower.contains("deactivat") {
            return Some(Classification::Permanent(UserState::Deactivated));
        }
        if lower.contains("unavailable") || lower.contains("temporarily unavailable") {
            return Some(Classification::Transient {
                kind: ErrorKind::Unavailable,
                wait_hint: BACKOFF_BASE,
            });
        }
        None
    }
}

impl RetryClassifier for StandardRetryClassifier {
    fn classify(&self, signal: &FailureSignal) -> Classification {
        if let Some(kind) = signal.exception_kind {
            let wait_hint = match kind {
                ExceptionKind::ConnectTimeout | ExceptionKind::ConnectRefused => BACKOFF_BASE,
            };
            return Classification::Transient {
                kind: ErrorKind::Network,
                wait_hint,
            };
        }

        if let Some(error) = &signal.provider_error {
            if let Some(classification) = Self::classify_provider_error(error) {
                return classification;
            }
        }

        match signal.http_status {
            Some(401) => Classification::Auth,
            Some(429) => Classification::Transient {
                kind: ErrorKind::RateLimit,
                // The actual reset-based wait is computed by the caller (it has the
                // response header); this is the floor the clamp guarantees.
                wait_hint: Duration::from_secs(RATE_LIMIT_MIN_WAIT),
            },
            Some(500) | Some(502) | Some(503) | Some(504) => Classification::Transient {
                kind: ErrorKind::ServerError,
                wait_hint: BACKOFF_BASE,
            },
            Some(403) => Classification::Transient {
                kind: ErrorKind::Unknown,
                wait_hint: BACKOFF_BASE,
            },
            _ => Classification::Transient {
                kind: ErrorKind::Unknown,
                wait_hint: BACKOFF_BASE,
            },
        }
    }

    fn backoff(&self, attempt_count: u32) -> Duration {
        geometric_backoff_with_jitter(attempt_count)
    }
}

/// Base 60s, geometric doubling per attempt, capped at 900s, ±10% jitter.
pub fn geometric_backoff_with_jitter(attempt_count: u32) -> Duration {
    let exponent = attempt_count.saturating_sub(1).min(16);
    let doubled = BACKOFF_BASE
        .as_secs()
        .saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX));
    let capped = doubled.min(BACKOFF_CAP.as_secs());
    let jitter_range = (capped as f64 * 0.10) as i64;
    let jitter = if jitter_range > 0 {
        fastrand::i64(-jitter_range..=jitter_range)
    } else {
        0
    };
    let total = (capped as i64 + jitter).clamp(1, BACKOFF_CAP.as_secs() as i64);
    Duration::from_secs(total as u64)
}

/// Clamp a rate-limit reset hint into `[60s, 900s]`.
pub fn clamp_rate_limit_wait(reset_in: Duration) -> Duration {
    let secs = reset_in.as_secs().clamp(RATE_LIMIT_MIN_WAIT, RATE_LIMIT_MAX_WAIT);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_401_is_auth() {
        let classifier = StandardRetryClassifier;
        let signal = FailureSignal {
            http_status: Some(401),
            ..Default::default()
        };
        assert_eq!(classifier.classify(&signal), Classification::Auth);
    }

    #[test]
    fn http_429_is_rate_limit_transient() {
        let classifier = StandardRetryClassifier;
        let signal = FailureSignal {
            http_status: Some(429),
            ..Default::default()
        };
        assert!(matches!(
            classifier.classify(&signal),
            Classification::Transient { kind: ErrorKind::RateLimit, .. }
        ));
    }

    #[test]
    fn server_errors_are_transient() {
        let classifier = StandardRetryClassifier;
        for code in [500, 502, 503, 504] {
            let signal = FailureSignal {
                http_status: Some(code),
                ..Default::default()
            };
            assert!(matches!(
                classifier.classify(&signal),
                Classification::Transient { kind: ErrorKind::ServerError, .. }
            ));
        }
    }

    #[test]
    fn provider_error_strings_map_to_permanent_states() {
        let classifier = StandardRetryClassifier;
        for (text, expected) in [
            ("Account suspended", UserState::Suspended),
            ("User not_found", UserState::NotFound),
            ("Account deactivated", UserState::Deactivated),
        ] {
            let signal = FailureSignal {
                provider_error: Some(text.to_string()),
                ..Default::default()
            };
            assert_eq!(classifier.classify(&signal), Classification::Permanent(expected));
        }
    }

    #[test]
    fn network_exception_is_transient_network() {
        let classifier = StandardRetryClassifier;
        let signal = FailureSignal {
            exception_kind: Some(ExceptionKind::ConnectTimeout),
            ..Default::default()
        };
        assert!(matches!(
            classifier.classify(&signal),
            Classification::Transient { kind: ErrorKind::Network, .. }
        ));
    }

    #[test]
    fn classifier_is_deterministic() {
        let classifier = StandardRetryClassifier;
        let signal = FailureSignal {
            http_status: Some(500),
            ..Default::default()
        };
        assert_eq!(classifier.classify(&signal), classifier.classify(&signal));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let b1 = geometric_backoff_with_jitter(1).as_secs();
        let b2 = geometric_backoff_with_jitter(2).as_secs();
        assert!(b1 >= 54 && b1 <= 66, "b1={b1}");
        assert!(b2 >= 108 && b2 <= 132, "b2={b2}");
        let capped = geometric_backoff_with_jitter(20).as_secs();
        assert!(capped <= 990, "capped={capped}");
    }

    #[test]
    fn rate_limit_wait_clamped() {
        assert_eq!(clamp_rate_limit_wait(Duration::from_secs(1)).as_secs(), 60);
        assert_eq!(clamp_rate_limit_wait(Duration::from_secs(10_000)).as_secs(), 900);
        assert_eq!(clamp_rate_limit_wait(Duration::from_secs(120)).as_secs(), 120);
    }
}
