//! Three-tier, on-disk cache: lookups, profiles, and relationships, each
//! with its own TTL and (for profiles/relationships) a bounded size with
//! oldest-by-mtime eviction. One file per entry, serialized the same way
//! the cookie jar is — plain `serde_json` on the filesystem, no database
//! involved, so a partially-warm cache survives a crash as cleanly as the
//! outcome store does.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration as ChronoDuration;

use crate::domain::profile::{CacheEntry, Profile, Relationship};
use crate::error::{BlockSweepError, Result};

/// Lookup tier has no eviction cap — numeric-id/handle mappings never change
/// once known, so they're cheap to keep forever.
const PROFILE_CAP: usize = 1000;
const RELATIONSHIP_CAP: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub lookup: ChronoDuration,
    pub profile: ChronoDuration,
    pub relationship: ChronoDuration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            lookup: ChronoDuration::days(30),
            profile: ChronoDuration::hours(1),
            relationship: ChronoDuration::minutes(30),
        }
    }
}

/// Result of checking one target against all three tiers before an upstream
/// call: whether a fresh profile and relationship are both already on hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    FullHit,
    PartialHit,
    Miss,
}

pub struct ThreeTierCache {
    lookups_dir: PathBuf,
    profiles_dir: PathBuf,
    relationships_dir: PathBuf,
    ttls: CacheTtls,
}

impl ThreeTierCache {
    pub fn open(cache_dir: impl AsRef<Path>, ttls: CacheTtls) -> Result<Self> {
        let root = cache_dir.as_ref();
        let lookups_dir = root.join("lookups");
        let profiles_dir = root.join("profiles");
        let relationships_dir = root.join("relationships");
        for dir in [&lookups_dir, &profiles_dir, &relationships_dir] {
            fs::create_dir_all(dir)
                .map_err(|e| BlockSweepError::Config(format!("failed to create cache dir {}: {e}", dir.display())))?;
        }
        Ok(Self {
            lookups_dir,
            profiles_dir,
            relationships_dir,
            ttls,
        })
    }

    pub fn get_lookup(&self, handle: &str) -> Option<CacheEntry<String>> {
        read_entry(&entry_path(&self.lookups_dir, handle)).filter(|e| e.is_fresh(self.ttls.lookup))
    }

    pub fn put_lookup(&self, handle: &str, numeric_id: String) -> Result<()> {
        write_entry(&entry_path(&self.lookups_dir, handle), &CacheEntry::new(handle.to_string(), numeric_id))
    }

    pub fn get_profile(&self, numeric_id: &str) -> Option<CacheEntry<Profile>> {
        read_entry(&entry_path(&self.profiles_dir, numeric_id)).filter(|e| e.is_fresh(self.ttls.profile))
    }

    pub fn put_profile(&self, numeric_id: &str, profile: Profile) -> Result<()> {
        write_entry(
            &entry_path(&self.profiles_dir, numeric_id),
            &CacheEntry::new(numeric_id.to_string(), profile),
        )?;
        evict_oldest(&self.profiles_dir, PROFILE_CAP)
    }

    pub fn get_relationship(&self, numeric_id: &str) -> Option<CacheEntry<Relationship>> {
        read_entry(&entry_path(&self.relationships_dir, numeric_id)).filter(|e| e.is_fresh(self.ttls.relationship))
    }

    pub fn put_relationship(&self, numeric_id: &str, relationship: Relationship) -> Result<()> {
        write_entry(
            &entry_path(&self.relationships_dir, numeric_id),
            &CacheEntry::new(numeric_id.to_string(), relationship),
        )?;
        evict_oldest(&self.relationships_dir, RELATIONSHIP_CAP)
    }

    /// A successful block stales the relationship snapshot (following/blocked
    /// flags have just changed) but the profile is still accurate, so it is
    /// kept — re-fetching it on the next run would be wasted work.
    pub fn invalidate_relationship(&self, numeric_id: &str) {
        let _ = fs::remove_file(entry_path(&self.relationships_dir, numeric_id));
    }

    /// Whether both the profile and relationship tiers already have a fresh
    /// entry for this numeric id.
    pub fn coverage(&self, numeric_id: &str) -> Coverage {
        let profile_hit = self.get_profile(numeric_id).is_some();
        let relationship_hit = self.get_relationship(numeric_id).is_some();
        match (profile_hit, relationship_hit) {
            (true, true) => Coverage::FullHit,
            (true, false) | (false, true) => Coverage::PartialHit,
            (false, false) => Coverage::Miss,
        }
    }
}

fn entry_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.json", sanitize_key(key)))
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

fn read_entry<T: serde::de::DeserializeOwned>(path: &Path) -> Option<CacheEntry<T>> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn write_entry<T: serde::Serialize>(path: &Path, entry: &CacheEntry<T>) -> Result<()> {
    let content = serde_json::to_string(entry)
        .map_err(|e| BlockSweepError::Config(format!("failed to serialize cache entry: {e}")))?;
    fs::write(path, content)
        .map_err(|e| BlockSweepError::Config(format!("failed to write cache entry {}: {e}", path.display())))
}

/// Oldest-by-mtime eviction once a tier exceeds its cap.
fn evict_oldest(dir: &Path, cap: usize) -> Result<()> {
    let mut entries: Vec<(PathBuf, std::time::SystemTime)> = fs::read_dir(dir)
        .map_err(|e| BlockSweepError::Config(format!("failed to list cache dir {}: {e}", dir.display())))?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let path = e.path();
            let mtime = e.metadata().ok()?.modified().ok()?;
            Some((path, mtime))
        })
        .collect();

    if entries.len() <= cap {
        return Ok(());
    }

    entries.sort_by_key(|(_, mtime)| *mtime);
    let excess = entries.len() - cap;
    for (path, _) in entries.into_iter().take(excess) {
        let _ = fs::remove_file(path);
    }
    Ok(())
}
