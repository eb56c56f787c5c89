//! Processing manager (C6): the per-batch pipeline that ties persistence,
//! the API client, and the retry classifier together. Sequential within
//! one caller session — resolve, safety-check, and block never run
//! concurrently with each other, since block must see the relationship
//! snapshot resolve just produced.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::api::{ApiClient, BlockOutcome};
use crate::domain::outcome::{OutcomeRecord, SkipReason, TerminalStatus, UserState};
use crate::domain::target::{TargetFormat, TargetList};
use crate::error::{BlockSweepError, Result};
use crate::persistence::PersistenceStore;
use crate::retry::{clamp_rate_limit_wait, Classification, AUTO_RETRY_CEILING};

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub batch_size: usize,
    pub inter_call_delay: Duration,
    pub max_targets: Option<usize>,
    pub auto_retry: bool,
}

/// Tally emitted as a progress line after every batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchProgress {
    pub completed: u64,
    pub blocked: u64,
    pub skipped: u64,
    pub errors: u64,
}

pub struct ProcessingManager<'a> {
    store: &'a PersistenceStore,
    api: &'a ApiClient,
    config: ManagerConfig,
    session_id: String,
}

impl<'a> ProcessingManager<'a> {
    pub fn new(store: &'a PersistenceStore, api: &'a ApiClient, config: ManagerConfig, session_id: String) -> Self {
        Self { store, api, config, session_id }
    }

    /// Run the primary pass over the target list, then the auto-retry pass
    /// if enabled and anything is eligible.
    pub async fn run(&self, targets: &TargetList) -> Result<BatchProgress> {
        let capped_list = TargetList {
            format: targets.format,
            items: match self.config.max_targets {
                Some(limit) => targets.items.iter().take(limit).cloned().collect(),
                None => targets.items.clone(),
            },
        };

        let mut totals = BatchProgress::default();
        for batch in capped_list.batches(self.config.batch_size) {
            let progress = self.process_batch(batch, targets.format).await?;
            totals = totals.merge(progress);
            info!(
                completed = totals.completed,
                blocked = totals.blocked,
                skipped = totals.skipped,
                errors = totals.errors,
                "batch complete"
            );
        }

        if self.config.auto_retry {
            let candidates = self.store.list_retry_candidates(AUTO_RETRY_CEILING).await?;
            if !candidates.is_empty() {
                let ids: Vec<String> = candidates
                    .iter()
                    .filter_map(|c| match targets.format {
                        TargetFormat::UserId => c.numeric_id.clone(),
                        TargetFormat::ScreenName => c.handle.clone(),
                    })
                    .collect();
                let retry_list = TargetList { format: targets.format, items: ids };
                for batch in retry_list.batches(self.config.batch_size) {
                    let progress = self.process_batch(batch, targets.format).await?;
                    totals = totals.merge(progress);
                }
            }
        }

        Ok(totals)
    }

    async fn process_batch(&self, batch: &[String], format: TargetFormat) -> Result<BatchProgress> {
        let mut progress = BatchProgress::default();

        let batch_vec: Vec<String> = batch.to_vec();
        let permanent = self.store.get_permanent_failures(&batch_vec, format).await?;
        let successful = self.store.get_successful(&batch_vec, format).await?;
        let already_known: HashSet<&String> = permanent.keys().chain(successful.keys()).collect();

        let remaining: Vec<String> = batch.iter().filter(|id| !already_known.contains(id)).cloned().collect();
        progress.skipped += (batch.len() - remaining.len()) as u64;

        let resolved = self.api.resolve_users(format, &remaining).await;

        for id in &remaining {
            match resolved.get(id) {
                Some(Ok(resolved_target)) => {
                    if resolved_target.relationship.should_skip_block() {
                        let reason = skip_reason(&resolved_target.relationship);
                        self.record_skip(id, format, Some(&resolved_target.profile), reason).await?;
                        progress.skipped += 1;
                    } else {
                        match self.api.blocks_create(&resolved_target.profile.numeric_id, self.config.inter_call_delay).await {
                            BlockOutcome::Success => {
                                self.api.cache().invalidate_relationship(&resolved_target.profile.numeric_id);
                                self.record_success(id, format, Some(&resolved_target.profile)).await?;
                                progress.blocked += 1;
                            }
                            BlockOutcome::Failed(classification) => {
                                self.record_failure(id, format, Some(&resolved_target.profile), classification.clone()).await?;
                                progress.errors += 1;
                                match classification {
                                    Classification::Transient { wait_hint, .. } => {
                                        tokio::time::sleep(clamp_rate_limit_wait(wait_hint)).await;
                                    }
                                    Classification::Auth => return Err(self.auth_error().await),
                                    Classification::Permanent(_) => {}
                                }
                            }
                        }
                    }
                }
                Some(Err(classification)) => {
                    self.record_failure(id, format, None, classification.clone()).await?;
                    progress.errors += 1;
                    if matches!(classification, Classification::Auth) {
                        return Err(self.auth_error().await);
                    }
                }
                None => {
                    warn!(target = %id, "resolve_users returned no entry for target");
                    progress.errors += 1;
                }
            }
            progress.completed += 1;
        }

        Ok(progress)
    }

    /// A second consecutive auth rejection aborts the run: the session is
    /// unrecoverable without operator intervention, so the outcome is
    /// recorded and the run exits rather than continuing to the next target.
    async fn auth_error(&self) -> BlockSweepError {
        BlockSweepError::Auth { cookie_path: self.api.cookie_path().await }
    }

    /// Identity fields for a persisted row. A resolved profile (when on
    /// hand) carries both the handle and the numeric id, so the row gets
    /// both once a target is resolved rather than only whichever format
    /// the target list used: a later-resolved id must attach to the same
    /// row, never spawn a second one.
    fn identity_fields(id: &str, format: TargetFormat, profile: Option<&crate::domain::profile::Profile>) -> (Option<String>, Option<String>, Option<String>) {
        if let Some(profile) = profile {
            return (Some(profile.handle.clone()), Some(profile.numeric_id.clone()), Some(profile.display_name.clone()));
        }
        match format {
            TargetFormat::UserId => (None, Some(id.to_string()), None),
            TargetFormat::ScreenName => (Some(id.to_string()), None, None),
        }
    }

    async fn record_success(&self, id: &str, format: TargetFormat, profile: Option<&crate::domain::profile::Profile>) -> Result<()> {
        let (handle, numeric_id, display_name) = Self::identity_fields(id, format, profile);
        self.store
            .record_outcome(&OutcomeRecord {
                handle,
                numeric_id,
                display_name,
                status: TerminalStatus::Success,
                user_state: UserState::Active,
                error_kind: None,
                error_message: None,
                http_status: None,
                attempt_count: 1,
                first_seen_at: Utc::now(),
                last_updated_at: Utc::now(),
                session_id: self.session_id.clone(),
            })
            .await
    }

    async fn record_skip(&self, id: &str, format: TargetFormat, profile: Option<&crate::domain::profile::Profile>, reason: SkipReason) -> Result<()> {
        let (handle, numeric_id, display_name) = Self::identity_fields(id, format, profile);
        self.store
            .record_outcome(&OutcomeRecord {
                handle,
                numeric_id,
                display_name,
                status: TerminalStatus::Skipped,
                user_state: UserState::Active,
                error_kind: None,
                error_message: Some(format!("{reason:?}")),
                http_status: None,
                attempt_count: 1,
                first_seen_at: Utc::now(),
                last_updated_at: Utc::now(),
                session_id: self.session_id.clone(),
            })
            .await
    }

    async fn record_failure(&self, id: &str, format: TargetFormat, profile: Option<&crate::domain::profile::Profile>, classification: Classification) -> Result<()> {
        let (handle, numeric_id, display_name) = Self::identity_fields(id, format, profile);
        let (user_state, error_kind, error_message) = match classification {
            Classification::Permanent(state) => (state, crate::domain::outcome::ErrorKind::Permanent, None),
            Classification::Transient { kind, .. } => (UserState::Unknown, kind, None),
            Classification::Auth => (UserState::Unknown, crate::domain::outcome::ErrorKind::Unknown, Some("auth rejected".to_string())),
        };
        self.store
            .record_outcome(&OutcomeRecord {
                handle,
                numeric_id,
                display_name,
                status: TerminalStatus::Failed,
                user_state,
                error_kind: Some(error_kind),
                error_message,
                http_status: None,
                attempt_count: 1,
                first_seen_at: Utc::now(),
                last_updated_at: Utc::now(),
                session_id: self.session_id.clone(),
            })
            .await
    }
}

impl BatchProgress {
    fn merge(self, other: BatchProgress) -> BatchProgress {
        BatchProgress {
            completed: self.completed + other.completed,
            blocked: self.blocked + other.blocked,
            skipped: self.skipped + other.skipped,
            errors: self.errors + other.errors,
        }
    }
}

fn skip_reason(relationship: &crate::domain::profile::Relationship) -> SkipReason {
    if relationship.following {
        SkipReason::Following
    } else if relationship.followed_by {
        SkipReason::FollowedBy
    } else {
        SkipReason::AlreadyBlocked
    }
}
