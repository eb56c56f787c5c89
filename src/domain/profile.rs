//! Account profile and relationship snapshots, plus the generic cache entry
//! wrapper shared by every cache tier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub numeric_id: String,
    pub handle: String,
    pub display_name: String,
    pub account_state: AccountState,
    pub protected: bool,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    Active,
    Suspended,
    NotFound,
    Deactivated,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Relationship {
    pub following: bool,
    pub followed_by: bool,
    pub blocking: bool,
    pub blocked_by: bool,
    pub muted: bool,
}

impl Relationship {
    /// A target already followed, following back, or already blocked is
    /// never submitted to the block endpoint.
    pub fn should_skip_block(&self) -> bool {
        self.following || self.followed_by || self.blocking
    }
}

/// A fully resolved target: identity plus the snapshot used for the safety
/// check before a block call.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub profile: Profile,
    pub relationship: Relationship,
}

/// Wraps a cached or freshly captured value with its capture time, used by
/// every tier of the three-tier cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub captured_at: DateTime<Utc>,
    pub identifier: String,
}

impl<T> CacheEntry<T> {
    pub fn new(identifier: String, value: T) -> Self {
        Self {
            value,
            captured_at: Utc::now(),
            identifier,
        }
    }

    pub fn is_fresh(&self, ttl: chrono::Duration) -> bool {
        Utc::now() - self.captured_at < ttl
    }
}
