//! Shared scaffolding for the end-to-end scenario tests: a mocked upstream,
//! a fresh outcome store, and a fresh three-tier cache per test.

use blocksweep::api::ApiClient;
use blocksweep::cache::{CacheTtls, ThreeTierCache};
use blocksweep::config::{CooldownConfig, FeatureFlags};
use blocksweep::persistence::PersistenceStore;
use tokio_util::sync::CancellationToken;

pub struct Harness {
    pub _cookie_dir: tempfile::TempDir,
    pub _cache_dir: tempfile::TempDir,
    pub _db_dir: tempfile::TempDir,
    pub api: ApiClient,
    pub store: PersistenceStore,
}

pub async fn build(server_url: &str) -> Harness {
    let cookie_dir = tempfile::tempdir().unwrap();
    let cookie_path = cookie_dir.path().join("cookies.json");
    std::fs::write(&cookie_path, r#"{"ct0":"csrf-token","auth_token":"auth-token"}"#).unwrap();
    let session = blocksweep::domain::session::SessionState::load(&cookie_path).unwrap();

    let cache_dir = tempfile::tempdir().unwrap();
    let cache = ThreeTierCache::open(cache_dir.path(), CacheTtls::default()).unwrap();

    let db_dir = tempfile::tempdir().unwrap();
    let store = PersistenceStore::open(db_dir.path().join("outcomes.db")).await.unwrap();

    let api = ApiClient::new(
        session,
        cache,
        FeatureFlags::default(),
        CooldownConfig::default(),
        server_url,
        CancellationToken::new(),
    )
    .unwrap();

    Harness {
        _cookie_dir: cookie_dir,
        _cache_dir: cache_dir,
        _db_dir: db_dir,
        api,
        store,
    }
}
