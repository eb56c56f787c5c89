//! Outcome record: one row per attempt on one target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    Active,
    Suspended,
    NotFound,
    Deactivated,
    Unavailable,
    Unknown,
}

impl UserState {
    /// A failure with one of these states can never succeed on retry.
    pub fn is_permanent_failure(self) -> bool {
        matches!(self, Self::Suspended | Self::NotFound | Self::Deactivated)
    }
}

/// Coarse classification of *why* a target failed, carried alongside
/// `UserState` so the statistics reporter can histogram by cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    ServerError,
    Unavailable,
    Network,
    Unknown,
    Permanent,
}

/// Reason a target was skipped without any upstream call being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Following,
    FollowedBy,
    AlreadyBlocked,
    AlreadySucceeded,
    PermanentFailurePrefilter,
}

/// One row of the outcome table. Uniqueness is by (numeric id when known,
/// else handle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub handle: Option<String>,
    pub numeric_id: Option<String>,
    pub display_name: Option<String>,
    pub status: TerminalStatus,
    pub user_state: UserState,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub http_status: Option<u16>,
    pub attempt_count: u32,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub session_id: String,
}

impl OutcomeRecord {
    /// A failed record is eligible for the auto-retry pass only if its
    /// user-state is transient (not a permanent failure) and it hasn't hit
    /// the retry ceiling.
    pub fn is_retry_candidate(&self, retry_ceiling: u32) -> bool {
        self.status == TerminalStatus::Failed
            && !self.user_state.is_permanent_failure()
            && self.attempt_count < retry_ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_user_states_match_spec() {
        assert!(UserState::Suspended.is_permanent_failure());
        assert!(UserState::NotFound.is_permanent_failure());
        assert!(UserState::Deactivated.is_permanent_failure());
        assert!(!UserState::Active.is_permanent_failure());
        assert!(!UserState::Unavailable.is_permanent_failure());
    }

    fn sample(status: TerminalStatus, user_state: UserState, attempts: u32) -> OutcomeRecord {
        OutcomeRecord {
            handle: Some("alice".into()),
            numeric_id: None,
            display_name: None,
            status,
            user_state,
            error_kind: None,
            error_message: None,
            http_status: None,
            attempt_count: attempts,
            first_seen_at: Utc::now(),
            last_updated_at: Utc::now(),
            session_id: "s1".into(),
        }
    }

    #[test]
    fn retry_candidate_excludes_permanent_and_ceiling() {
        let permanent = sample(TerminalStatus::Failed, UserState::Suspended, 1);
        assert!(!permanent.is_retry_candidate(3));

        let transient = sample(TerminalStatus::Failed, UserState::Unavailable, 1);
        assert!(transient.is_retry_candidate(3));

        let at_ceiling = sample(TerminalStatus::Failed, UserState::Unavailable, 3);
        assert!(!at_ceiling.is_retry_candidate(3));

        let success = sample(TerminalStatus::Success, UserState::Active, 1);
        assert!(!success.is_retry_candidate(3));
    }
}
