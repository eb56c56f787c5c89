//! Run configuration and the loaders that build it: cookie jar, target
//! list, and the tunable knobs around batching, rate limiting, and the
//! 403 cool-down circuit. Resolution order is explicit args, then
//! environment variables, then defaults, resolved once into a plain
//! struct rather than a global.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::session::SessionState;
use crate::domain::target::{TargetList, TargetListFile};
use crate::error::{BlockSweepError, Result};

pub const ENV_COOKIE_PATH: &str = "BLOCKSWEEP_COOKIE_PATH";
pub const ENV_TARGET_LIST_PATH: &str = "BLOCKSWEEP_TARGET_LIST_PATH";
pub const ENV_PERSISTENCE_PATH: &str = "BLOCKSWEEP_PERSISTENCE_PATH";
pub const ENV_CACHE_DIR: &str = "BLOCKSWEEP_CACHE_DIR";

/// Fully resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub cookie_jar_path: PathBuf,
    pub target_list_path: PathBuf,
    pub persistence_path: PathBuf,
    pub cache_dir: PathBuf,
    pub batch_size: usize,
    pub inter_call_delay_ms: u64,
    pub max_targets: Option<usize>,
    pub auto_retry: bool,
    pub cooldown: CooldownConfig,
    pub feature_flags: FeatureFlags,
}

/// 403-empty-body circuit breaker tunables — kept as configuration rather
/// than fixed constants so a run can be tightened or loosened without a
/// rebuild.
#[derive(Debug, Clone, Copy)]
pub struct CooldownConfig {
    pub trigger_count: u32,
    pub trigger_window_secs: u64,
    pub cooldown_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            trigger_count: 5,
            trigger_window_secs: 300,
            cooldown_secs: 1800,
        }
    }
}

/// GraphQL feature-flag table sent on every lookup/relationship call. A
/// single editable map rather than one constant per flag, so adding or
/// retiring a flag is a one-line change plus a self-check at construction.
#[derive(Debug, Clone)]
pub struct FeatureFlags(HashMap<String, bool>);

impl Default for FeatureFlags {
    fn default() -> Self {
        let mut flags = HashMap::new();
        flags.insert("responsive_web_graphql_exclude_directive_enabled".to_string(), true);
        flags.insert("verified_phone_label_enabled".to_string(), false);
        flags.insert("responsive_web_graphql_timeline_navigation_enabled".to_string(), true);
        flags.insert("responsive_web_graphql_skip_user_profile_image_extensions_enabled".to_string(), false);
        flags.insert("creator_subscriptions_tweet_preview_api_enabled".to_string(), true);
        flags.insert("responsive_web_profile_redirect_enabled".to_string(), false);
        flags.insert("highlights_tweets_tab_ui_enabled".to_string(), true);
        flags.insert("hidden_profile_likes_enabled".to_string(), true);
        flags.insert("hidden_profile_subscriptions_enabled".to_string(), true);
        flags.insert("subscriptions_verification_info_verified_since_enabled".to_string(), true);
        Self(flags)
    }
}

impl FeatureFlags {
    pub fn as_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).expect("bool map always serializes")
    }

    /// Fails fast if the table is empty — a blank feature-flag payload is
    /// a sign of a broken default, not a valid run configuration.
    pub fn self_check(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(BlockSweepError::Config("feature flag table is empty".into()));
        }
        Ok(())
    }
}

impl RunConfig {
    /// Resolve the args-then-env-then-default layering described above.
    /// Every path must be supplied through one of those three sources;
    /// there is no hidden fourth fallback.
    pub fn resolve(args: RunConfigArgs) -> Result<Self> {
        let cookie_jar_path = args
            .cookie_jar_path
            .or_else(|| std::env::var(ENV_COOKIE_PATH).ok().map(PathBuf::from))
            .ok_or_else(|| BlockSweepError::Config(format!("cookie jar path not supplied (set --cookie-path or {ENV_COOKIE_PATH})")))?;

        let target_list_path = args
            .target_list_path
            .or_else(|| std::env::var(ENV_TARGET_LIST_PATH).ok().map(PathBuf::from))
            .ok_or_else(|| BlockSweepError::Config(format!("target list path not supplied (set --target-list-path or {ENV_TARGET_LIST_PATH})")))?;

        let persistence_path = args
            .persistence_path
            .or_else(|| std::env::var(ENV_PERSISTENCE_PATH).ok().map(PathBuf::from))
            .unwrap_or_else(default_persistence_path);

        let cache_dir = args
            .cache_dir
            .or_else(|| std::env::var(ENV_CACHE_DIR).ok().map(PathBuf::from))
            .unwrap_or_else(default_cache_dir);

        let config = Self {
            cookie_jar_path,
            target_list_path,
            persistence_path,
            cache_dir,
            batch_size: args.batch_size.unwrap_or(50),
            inter_call_delay_ms: args.inter_call_delay_ms.unwrap_or(1500),
            max_targets: args.max_targets,
            auto_retry: args.auto_retry.unwrap_or(false),
            cooldown: CooldownConfig::default(),
            feature_flags: FeatureFlags::default(),
        };
        config.feature_flags.self_check()?;
        Ok(config)
    }
}

/// Explicit, caller-supplied overrides. Every field is optional; anything
/// left `None` falls through to the environment, then the default.
#[derive(Debug, Clone, Default)]
pub struct RunConfigArgs {
    pub cookie_jar_path: Option<PathBuf>,
    pub target_list_path: Option<PathBuf>,
    pub persistence_path: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub inter_call_delay_ms: Option<u64>,
    pub max_targets: Option<usize>,
    pub auto_retry: Option<bool>,
}

fn default_persistence_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("blocksweep")
        .join("outcomes.db")
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("blocksweep")
}

pub struct SessionLoader;

impl SessionLoader {
    pub fn load(cookie_jar_path: impl AsRef<Path>) -> Result<SessionState> {
        SessionState::load(cookie_jar_path)
    }
}

pub struct TargetListLoader;

impl TargetListLoader {
    pub fn load(target_list_path: impl AsRef<Path>) -> Result<TargetList> {
        let content = std::fs::read_to_string(target_list_path.as_ref()).map_err(|e| {
            BlockSweepError::Config(format!("failed to read target list {}: {e}", target_list_path.as_ref().display()))
        })?;
        let raw: TargetListFile = serde_json::from_str(&content)
            .map_err(|e| BlockSweepError::Config(format!("malformed target list file: {e}")))?;
        TargetList::from_file(raw).map_err(BlockSweepError::Config)
    }
}
