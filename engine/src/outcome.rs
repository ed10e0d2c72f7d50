//! Failure taxonomy and retry state transitions.
//!
//! Classification is by HTTP status alone; transport-level failures (no
//! connectivity, DNS, timeout) never reach a status code and are always
//! retryable by definition.

use crate::SyncState;

/// Default cap on automatic retries for retryable failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient: retry on a later cycle until the cap is hit.
    Retryable,
    /// 401/403: retryable only after the credential provider refreshes;
    /// otherwise terminal.
    Auth,
    /// Will not resolve without caller intervention; terminal immediately.
    Fatal,
}

/// Classify an HTTP status code. Returns `None` for success (2xx).
///
/// 5xx is retryable, as are request timeout (408) and throttling (429).
/// Auth statuses get their own kind so the coordinator can attempt a
/// credential refresh first. Every other 4xx is a client error the queue
/// cannot fix by itself.
pub fn classify_status(status: u16) -> Option<FailureKind> {
    match status {
        200..=299 => None,
        401 | 403 => Some(FailureKind::Auth),
        408 | 429 => Some(FailureKind::Retryable),
        400..=499 => Some(FailureKind::Fatal),
        500..=599 => Some(FailureKind::Retryable),
        // Anything outside the known ranges is treated as transient.
        _ => Some(FailureKind::Retryable),
    }
}

/// Next queue state after a failed attempt.
///
/// `retry_count` is the count *including* the attempt that just failed.
/// Auth failures are resolved to Retryable or Fatal by the coordinator
/// before this is consulted.
pub fn next_state(retry_count: u32, max_retries: u32, kind: FailureKind) -> SyncState {
    match kind {
        FailureKind::Fatal => SyncState::Failed,
        FailureKind::Retryable | FailureKind::Auth => {
            if retry_count > max_retries {
                SyncState::Failed
            } else {
                SyncState::Pending
            }
        }
    }
}
