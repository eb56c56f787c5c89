//! Resumable bulk account-blocking runner.
//!
//! A run loads a cookie-authenticated session and a target list, then
//! drives a persistence-backed pipeline: resolve each target's profile and
//! relationship (through a three-tier cache), skip anything already known
//! or already safe, and block the rest, recording every outcome so a crash
//! or restart never re-issues a block call that already succeeded.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod manager;
pub mod persistence;
pub mod retry;
pub mod stats;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::ApiClient;
use crate::cache::{CacheTtls, ThreeTierCache};
use crate::config::{RunConfig, SessionLoader, TargetListLoader};
use crate::error::Result;
use crate::manager::{ManagerConfig, ProcessingManager};
use crate::persistence::PersistenceStore;
use crate::stats::{Report, StatisticsReporter};

/// Everything one run needs, built once at startup and threaded through by
/// reference — no global or package-level mutable state.
pub struct RunContext {
    pub config: RunConfig,
    pub store: PersistenceStore,
    pub api: ApiClient,
    pub session_id: String,
    pub cancellation: CancellationToken,
}

impl RunContext {
    pub async fn build(config: RunConfig, base_url: impl Into<String>) -> Result<Self> {
        let session = SessionLoader::load(&config.cookie_jar_path)?;
        let cache = ThreeTierCache::open(&config.cache_dir, CacheTtls::default())?;
        let store = PersistenceStore::open(&config.persistence_path).await?;
        let cancellation = CancellationToken::new();
        let api = ApiClient::new(
            session,
            cache,
            config.feature_flags.clone(),
            config.cooldown,
            base_url,
            cancellation.clone(),
        )?;

        Ok(Self {
            config,
            store,
            api,
            session_id: Uuid::new_v4().to_string(),
            cancellation,
        })
    }

    /// Run the primary pass (and auto-retry pass, if configured) over the
    /// configured target list.
    pub async fn run(&self) -> Result<manager::BatchProgress> {
        let targets = TargetListLoader::load(&self.config.target_list_path)?;
        let manager_config = ManagerConfig {
            batch_size: self.config.batch_size,
            inter_call_delay: std::time::Duration::from_millis(self.config.inter_call_delay_ms),
            max_targets: self.config.max_targets,
            auto_retry: self.config.auto_retry,
        };
        let manager = ProcessingManager::new(&self.store, &self.api, manager_config, self.session_id.clone());
        manager.run(&targets).await
    }

    pub async fn reset_retry_counts(&self, scope: persistence::ResetScope) -> Result<u64> {
        self.store.reset_attempts(scope).await
    }

    pub async fn report(&self) -> Result<Report> {
        StatisticsReporter::new(&self.store).report().await
    }

    /// Cancel the in-flight run cooperatively; in-flight HTTP calls finish,
    /// their outcomes commit, then the run exits.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}

/// Install a SIGINT/terminate handler that cancels the given context.
pub fn install_cancellation_handler(context: Arc<RunContext>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("termination signal received, cancelling in-flight work");
            context.cancel();
        }
    });
}
