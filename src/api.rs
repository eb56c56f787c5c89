//! API client: the only component that issues outbound HTTP. Session and
//! header management, the five-endpoint surface, per-endpoint rate-limit
//! accounting, the batched cache-aware resolve path, session recovery on
//! auth failure, and the 403 cool-down circuit all live here, around a
//! `reqwest::Client` wrapped with a `governor` rate limiter and
//! cancellation support, generalized from one limiter to a small keyed
//! table, one per endpoint family.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::cache::{Coverage, ThreeTierCache};
use crate::config::{CooldownConfig, FeatureFlags};
use crate::domain::profile::{AccountState, Profile, Relationship, ResolvedTarget};
use crate::domain::session::SessionState;
use crate::domain::target::TargetFormat;
use crate::error::{BlockSweepError, Result};
use crate::retry::{Classification, ExceptionKind, FailureSignal, RetryClassifier, StandardRetryClassifier};

const MAX_USERS_BY_REST_IDS: usize = 50;
const RATE_LIMIT_PAD: Duration = Duration::from_secs(10);
const AUTH_RECOVERY_SLEEP: Duration = Duration::from_secs(2);
/// Local politeness ceiling, independent of the upstream's own rate-limit
/// windows: a floor under the reactive `RateLimitAccountant` so a run
/// never hammers the endpoint even when the provider hasn't said no yet.
const MAX_REQUESTS_PER_SECOND: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EndpointFamily {
    GraphqlUserRead,
    RestBlockCreate,
}

/// One endpoint family's rate-limit snapshot, refreshed from response
/// headers after every call against it.
#[derive(Debug, Clone, Copy, Default)]
struct RateLimitSnapshot {
    limit: Option<u32>,
    remaining: Option<u32>,
    reset_at: Option<Instant>,
}

struct RateLimitAccountant {
    snapshots: Mutex<HashMap<EndpointFamily, RateLimitSnapshot>>,
}

impl RateLimitAccountant {
    fn new() -> Self {
        Self {
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    async fn wait_if_exhausted(&self, family: EndpointFamily) {
        let wait_duration = {
            let snapshots = self.snapshots.lock().await;
            snapshots.get(&family).and_then(|snap| match (snap.remaining, snap.reset_at) {
                (Some(0), Some(reset_at)) if reset_at > Instant::now() => {
                    Some(reset_at.saturating_duration_since(Instant::now()) + RATE_LIMIT_PAD)
                }
                _ => None,
            })
        };
        // Clamped into [60s, 900s] even when the reset header is only a few
        // seconds out: a near-immediate reset is never a reliable signal
        // that the endpoint is actually free again that soon.
        if let Some(duration) = wait_duration {
            sleep(crate::retry::clamp_rate_limit_wait(duration)).await;
        }
    }

    async fn record(&self, family: EndpointFamily, limit: Option<u32>, remaining: Option<u32>, reset_in: Option<Duration>) {
        let mut snapshots = self.snapshots.lock().await;
        let entry = snapshots.entry(family).or_default();
        if let Some(limit) = limit {
            entry.limit = Some(limit);
        }
        if let Some(remaining) = remaining {
            entry.remaining = Some(remaining);
        }
        if let Some(reset_in) = reset_in {
            entry.reset_at = Some(Instant::now() + reset_in);
        }
        tracing::trace!(?family, limit = entry.limit, remaining = entry.remaining, "rate-limit snapshot updated");
    }
}

/// The 403-empty-body throttle circuit, tracked per caller session.
struct CooldownCircuit {
    config: CooldownConfig,
    state: Mutex<CooldownState>,
}

#[derive(Debug, Default)]
struct CooldownState {
    consecutive_empty_403: u32,
    window_start: Option<Instant>,
    cooldown_until: Option<Instant>,
}

impl CooldownCircuit {
    fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CooldownState::default()),
        }
    }

    async fn wait_if_cooling_down(&self) {
        let until = self.state.lock().await.cooldown_until;
        if let Some(until) = until {
            let now = Instant::now();
            if until > now {
                sleep(until - now).await;
            }
        }
    }

    async fn record_empty_403(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(self.config.trigger_window_secs);
        let within_window = state.window_start.map(|start| now.duration_since(start) < window).unwrap_or(false);

        if within_window {
            state.consecutive_empty_403 += 1;
        } else {
            state.consecutive_empty_403 = 1;
            state.window_start = Some(now);
        }

        if state.consecutive_empty_403 >= self.config.trigger_count {
            state.cooldown_until = Some(now + Duration::from_secs(self.config.cooldown_secs));
            state.consecutive_empty_403 = 0;
            state.window_start = None;
        }
    }

    async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_empty_403 = 0;
        state.window_start = None;
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    session: Mutex<SessionState>,
    cache: ThreeTierCache,
    classifier: StandardRetryClassifier,
    rate_limits: RateLimitAccountant,
    throttle: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    cooldown: CooldownCircuit,
    feature_flags: FeatureFlags,
    base_url: String,
    cancellation: CancellationToken,
}

/// Outcome of a single block attempt, handed back to the manager for
/// outcome recording; never an `Err` for upstream-classified failures.
pub enum BlockOutcome {
    Success,
    Failed(Classification),
}

impl ApiClient {
    pub fn new(
        session: SessionState,
        cache: ThreeTierCache,
        feature_flags: FeatureFlags,
        cooldown_config: CooldownConfig,
        base_url: impl Into<String>,
        cancellation: CancellationToken,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BlockSweepError::Config(format!("failed to build HTTP client: {e}")))?;

        let throttle = RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(MAX_REQUESTS_PER_SECOND).expect("MAX_REQUESTS_PER_SECOND is nonzero"),
        ));

        Ok(Self {
            http,
            session: Mutex::new(session),
            cache,
            classifier: StandardRetryClassifier,
            rate_limits: RateLimitAccountant::new(),
            throttle,
            cooldown: CooldownCircuit::new(cooldown_config),
            feature_flags,
            base_url: base_url.into(),
            cancellation,
        })
    }

    pub fn cache(&self) -> &ThreeTierCache {
        &self.cache
    }

    /// The on-disk cookie jar path backing the current session, for a
    /// caller that needs to surface it in an `Auth` error.
    pub async fn cookie_path(&self) -> String {
        self.session.lock().await.jar_path().display().to_string()
    }

    async fn sleep_cooperative(&self, duration: Duration) {
        tokio::select! {
            _ = sleep(duration) => {},
            _ = self.cancellation.cancelled() => {},
        }
    }

    /// Build the cookie + CSRF headers for the current session snapshot.
    async fn auth_headers(&self) -> (String, String) {
        let session = self.session.lock().await;
        (session.jar.header_value(), session.jar.csrf_token().to_string())
    }

    async fn recover_session(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        session.recover()
    }

    async fn caller_id(&self) -> Option<String> {
        self.session.lock().await.caller_id.clone()
    }

    async fn set_caller_id(&self, id: String) {
        self.session.lock().await.caller_id = Some(id);
    }

    // ---- endpoint dispatch --------------------------------------------

    async fn dispatch_graphql(&self, path: &str, query: &[(&str, String)]) -> Result<DispatchOutcome> {
        self.dispatch(EndpointFamily::GraphqlUserRead, reqwest::Method::GET, path, Some(query), None)
            .await
    }

    async fn dispatch_block_create(&self, numeric_id: &str) -> Result<DispatchOutcome> {
        let form = [("user_id", numeric_id.to_string())];
        self.dispatch(EndpointFamily::RestBlockCreate, reqwest::Method::POST, "/1.1/blocks/create.json", None, Some(&form))
            .await
    }

    async fn dispatch(
        &self,
        family: EndpointFamily,
        method: reqwest::Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        form: Option<&[(&str, String)]>,
    ) -> Result<DispatchOutcome> {
        self.cooldown.wait_if_cooling_down().await;
        self.rate_limits.wait_if_exhausted(family).await;
        self.throttle.until_ready().await;

        let (cookie_header, csrf) = self.auth_headers().await;
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .http
            .request(method, &url)
            .header(reqwest::header::COOKIE, cookie_header)
            .header("x-csrf-token", csrf);

        if let Some(query) = query {
            builder = builder.query(query);
        }
        if let Some(form) = form {
            builder = builder.form(form);
        }

        let response = tokio::select! {
            result = builder.send() => result.map_err(|_| FailureSignal {
                exception_kind: Some(ExceptionKind::ConnectTimeout),
                ..Default::default()
            }),
            _ = self.cancellation.cancelled() => {
                return Err(BlockSweepError::Config("request cancelled".into()));
            }
        };

        let response = match response {
            Ok(response) => response,
            Err(signal) => {
                return Ok(DispatchOutcome::Classified(self.classifier.classify(&signal)));
            }
        };

        let status = response.status();
        let limit: Option<u32> = response
            .headers()
            .get("x-rate-limit-limit")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let remaining: Option<u32> = response
            .headers()
            .get("x-rate-limit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let reset_in: Option<Duration> = response
            .headers()
            .get("x-rate-limit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|epoch| {
                let now_epoch = chrono::Utc::now().timestamp() as u64;
                Duration::from_secs(epoch.saturating_sub(now_epoch))
            });
        self.rate_limits.record(family, limit, remaining, reset_in).await;

        if status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            if body.trim().is_empty() {
                self.cooldown.record_empty_403().await;
            }
            let signal = FailureSignal {
                http_status: Some(403),
                provider_error: if body.trim().is_empty() { None } else { Some(body) },
                ..Default::default()
            };
            return Ok(DispatchOutcome::Classified(self.classifier.classify(&signal)));
        }

        if status.is_success() {
            self.cooldown.record_success().await;
            return Ok(DispatchOutcome::Ok(response));
        }

        let body = response.text().await.unwrap_or_default();
        let signal = FailureSignal {
            http_status: Some(status.as_u16()),
            provider_error: if body.is_empty() { None } else { Some(body) },
            ..Default::default()
        };
        Ok(DispatchOutcome::Classified(self.classifier.classify(&signal)))
    }

    /// Dispatch a call, transparently retrying exactly once on `Auth`
    /// classification after reloading the cookie jar from disk.
    async fn dispatch_with_recovery<F, Fut>(&self, call: F) -> Result<DispatchOutcome>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<DispatchOutcome>>,
    {
        match call().await? {
            DispatchOutcome::Classified(Classification::Auth) => {
                self.recover_session().await?;
                self.sleep_cooperative(AUTH_RECOVERY_SLEEP).await;
                match call().await? {
                    DispatchOutcome::Classified(Classification::Auth) => Err(BlockSweepError::Auth { cookie_path: self.cookie_path().await }),
                    other => Ok(other),
                }
            }
            other => Ok(other),
        }
    }

    // ---- endpoint surface ----------------------------------------------

    pub async fn verify_credentials(&self) -> Result<String> {
        let outcome = self
            .dispatch_with_recovery(|| self.dispatch(EndpointFamily::GraphqlUserRead, reqwest::Method::GET, "/1.1/account/verify_credentials.json", None, None))
            .await?;
        match outcome {
            DispatchOutcome::Ok(response) => {
                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| BlockSweepError::Config(format!("malformed verify_credentials response: {e}")))?;
                let id = body
                    .get("id_str")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| BlockSweepError::Config("verify_credentials response missing id_str".into()))?
                    .to_string();
                self.set_caller_id(id.clone()).await;
                Ok(id)
            }
            DispatchOutcome::Classified(classification) => Err(classification_to_error(classification)),
        }
    }

    pub async fn user_by_screen_name(&self, handle: &str) -> std::result::Result<ResolvedTarget, Classification> {
        let query = [
            ("variables", serde_json::json!({ "screen_name": handle }).to_string()),
            ("features", self.feature_flags.as_json().to_string()),
        ];
        let outcome = self
            .dispatch_with_recovery(|| self.dispatch_graphql("/graphql/UserByScreenName", &query))
            .await
            .map_err(|_| Classification::Auth)?;
        self.single_target_from_outcome(outcome).await
    }

    pub async fn user_by_rest_id(&self, numeric_id: &str) -> std::result::Result<ResolvedTarget, Classification> {
        let query = [
            ("variables", serde_json::json!({ "userId": numeric_id }).to_string()),
            ("features", self.feature_flags.as_json().to_string()),
        ];
        let outcome = self
            .dispatch_with_recovery(|| self.dispatch_graphql("/graphql/UserByRestId", &query))
            .await
            .map_err(|_| Classification::Auth)?;
        self.single_target_from_outcome(outcome).await
    }

    async fn single_target_from_outcome(&self, outcome: DispatchOutcome) -> std::result::Result<ResolvedTarget, Classification> {
        match outcome {
            DispatchOutcome::Ok(response) => parse_resolved_target(response).await.map_err(|e| {
                tracing::warn!(error = %e, "malformed resolve response");
                Classification::Transient {
                    kind: crate::domain::outcome::ErrorKind::Unknown,
                    wait_hint: crate::retry::BACKOFF_BASE,
                }
            }),
            DispatchOutcome::Classified(classification) => Err(classification),
        }
    }

    pub async fn users_by_rest_ids(&self, ids: &[String]) -> std::result::Result<HashMap<String, ResolvedTarget>, Classification> {
        if ids.len() > MAX_USERS_BY_REST_IDS {
            // Caller must pre-chunk; clamp defensively rather than silently drop entries.
            let clamped = &ids[..MAX_USERS_BY_REST_IDS];
            return self.users_by_rest_ids(clamped).await;
        }
        let query = [
            ("variables", serde_json::json!({ "userIds": ids }).to_string()),
            ("features", self.feature_flags.as_json().to_string()),
        ];
        let outcome = self
            .dispatch_with_recovery(|| self.dispatch_graphql("/graphql/UsersByRestIds", &query))
            .await
            .map_err(|_| Classification::Auth)?;
        match outcome {
            DispatchOutcome::Ok(response) => parse_resolved_targets(response).await.map_err(|e| {
                tracing::warn!(error = %e, "malformed batch resolve response");
                Classification::Transient {
                    kind: crate::domain::outcome::ErrorKind::Unknown,
                    wait_hint: crate::retry::BACKOFF_BASE,
                }
            }),
            DispatchOutcome::Classified(classification) => Err(classification),
        }
    }

    pub async fn blocks_create(&self, numeric_id: &str, delay: Duration) -> BlockOutcome {
        let outcome = self.dispatch_with_recovery(|| self.dispatch_block_create(numeric_id)).await;
        let result = match outcome {
            Ok(DispatchOutcome::Ok(_)) => BlockOutcome::Success,
            Ok(DispatchOutcome::Classified(classification)) => BlockOutcome::Failed(classification),
            Err(_) => BlockOutcome::Failed(Classification::Auth),
        };
        self.sleep_cooperative(delay).await;
        result
    }

    /// Resolve a batch of targets, consulting and repopulating the cache at
    /// every tier before falling back to upstream calls. Results are keyed
    /// by the caller's original identifier (numeric id or handle, per
    /// `format`) so the manager can match them back against its batch.
    pub async fn resolve_users(
        &self,
        format: TargetFormat,
        identifiers: &[String],
    ) -> HashMap<String, std::result::Result<ResolvedTarget, Classification>> {
        match format {
            TargetFormat::UserId => self.resolve_by_numeric_id(identifiers).await,
            TargetFormat::ScreenName => self.resolve_by_handle(identifiers).await,
        }
    }

    async fn resolve_by_numeric_id(&self, ids: &[String]) -> HashMap<String, std::result::Result<ResolvedTarget, Classification>> {
        let mut results = HashMap::new();
        let mut misses = Vec::new();

        for id in ids {
            match self.cache_hit(id) {
                Some(resolved) => {
                    results.insert(id.clone(), Ok(resolved));
                }
                None => misses.push(id.clone()),
            }
        }

        self.fetch_and_populate(&misses, &mut results).await;
        results
    }

    /// Handle-format resolve: a cached lookup lets a handle ride the batch
    /// path like a numeric id; without one, the upstream surface only
    /// offers a per-handle call (spec's unavoidable exception to batching).
    async fn resolve_by_handle(&self, handles: &[String]) -> HashMap<String, std::result::Result<ResolvedTarget, Classification>> {
        let mut results = HashMap::new();
        let mut id_to_handle: HashMap<String, String> = HashMap::new();
        let mut id_misses = Vec::new();
        let mut handle_misses = Vec::new();

        for handle in handles {
            match self.cache.get_lookup(handle) {
                Some(lookup) => {
                    let numeric_id = lookup.value;
                    match self.cache_hit(&numeric_id) {
                        Some(resolved) => {
                            results.insert(handle.clone(), Ok(resolved));
                        }
                        None => {
                            id_to_handle.insert(numeric_id.clone(), handle.clone());
                            id_misses.push(numeric_id);
                        }
                    }
                }
                None => handle_misses.push(handle.clone()),
            }
        }

        let mut by_id = HashMap::new();
        self.fetch_and_populate(&id_misses, &mut by_id).await;
        for (numeric_id, result) in by_id {
            if let Some(handle) = id_to_handle.remove(&numeric_id) {
                results.insert(handle, result);
            }
        }

        for handle in handle_misses {
            match self.user_by_screen_name(&handle).await {
                Ok(resolved) => {
                    let _ = self.cache.put_lookup(&handle, resolved.profile.numeric_id.clone());
                    let _ = self.cache.put_profile(&resolved.profile.numeric_id, resolved.profile.clone());
                    let _ = self.cache.put_relationship(&resolved.profile.numeric_id, resolved.relationship);
                    results.insert(handle, Ok(resolved));
                }
                Err(classification) => {
                    results.insert(handle, Err(classification));
                }
            }
        }

        results
    }

    /// A fresh profile and relationship already on hand for `numeric_id`.
    /// Partial hits are treated as misses and refetched whole: the
    /// documented endpoint surface (§4.4.2) has no relationship-only
    /// variant to repopulate just the missing tier.
    fn cache_hit(&self, numeric_id: &str) -> Option<ResolvedTarget> {
        match self.cache.coverage(numeric_id) {
            Coverage::FullHit => {
                let profile = self.cache.get_profile(numeric_id)?.value;
                let relationship = self.cache.get_relationship(numeric_id)?.value;
                Some(ResolvedTarget { profile, relationship })
            }
            Coverage::PartialHit | Coverage::Miss => None,
        }
    }

    async fn fetch_and_populate(
        &self,
        misses: &[String],
        results: &mut HashMap<String, std::result::Result<ResolvedTarget, Classification>>,
    ) {
        for chunk in misses.chunks(MAX_USERS_BY_REST_IDS) {
            match self.users_by_rest_ids(chunk).await {
                Ok(resolved_map) => {
                    for (id, resolved) in resolved_map {
                        let _ = self.cache.put_profile(&id, resolved.profile.clone());
                        let _ = self.cache.put_relationship(&id, resolved.relationship);
                        results.insert(id, Ok(resolved));
                    }
                }
                Err(classification) => {
                    for id in chunk {
                        results.insert(id.clone(), Err(classification.clone()));
                    }
                }
            }
        }
    }
}

fn classification_to_error(classification: Classification) -> BlockSweepError {
    match classification {
        Classification::Auth => BlockSweepError::Auth { cookie_path: String::new() },
        Classification::Permanent(_) | Classification::Transient { .. } => {
            BlockSweepError::Config("unexpected classified failure on a non-recoverable path".into())
        }
    }
}

enum DispatchOutcome {
    Ok(reqwest::Response),
    Classified(Classification),
}

async fn parse_resolved_target(response: reqwest::Response) -> anyhow::Result<ResolvedTarget> {
    let body: serde_json::Value = response.json().await.context("decoding resolve response body as JSON")?;
    resolved_target_from_json(&body).ok_or_else(|| anyhow::anyhow!("resolve response missing required profile fields"))
}

async fn parse_resolved_targets(response: reqwest::Response) -> anyhow::Result<HashMap<String, ResolvedTarget>> {
    let body: serde_json::Value = response.json().await.context("decoding batch resolve response body as JSON")?;
    let map = body
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("batch resolve response was not a JSON object"))?;
    let mut out = HashMap::new();
    for (id, value) in map {
        if let Some(resolved) = resolved_target_from_json(value) {
            out.insert(id.clone(), resolved);
        }
    }
    Ok(out)
}

fn resolved_target_from_json(value: &serde_json::Value) -> Option<ResolvedTarget> {
    let profile = profile_from_json(value)?;
    let relationship = relationship_from_json(value);
    Some(ResolvedTarget { profile, relationship })
}

fn profile_from_json(value: &serde_json::Value) -> Option<Profile> {
    let numeric_id = value.get("id_str").or_else(|| value.get("id"))?.as_str()?.to_string();
    let handle = value.get("screen_name")?.as_str()?.to_string();
    let display_name = value.get("name").and_then(|v| v.as_str()).unwrap_or(&handle).to_string();
    let state_str = value.get("account_state").and_then(|v| v.as_str()).unwrap_or("active");
    let account_state = match state_str {
        "suspended" => AccountState::Suspended,
        "not_found" => AccountState::NotFound,
        "deactivated" => AccountState::Deactivated,
        _ => AccountState::Active,
    };
    Some(Profile {
        numeric_id,
        handle,
        display_name,
        account_state,
        protected: value.get("protected").and_then(|v| v.as_bool()).unwrap_or(false),
        verified: value.get("verified").and_then(|v| v.as_bool()).unwrap_or(false),
    })
}

/// Relationship flags the upstream embeds alongside a resolved profile.
/// Absent fields default to `false` rather than failing the parse — a
/// profile lookup that omits relationship data (e.g. the caller viewing
/// their own account) is not itself malformed.
fn relationship_from_json(value: &serde_json::Value) -> Relationship {
    Relationship {
        following: value.get("following").and_then(|v| v.as_bool()).unwrap_or(false),
        followed_by: value.get("followed_by").and_then(|v| v.as_bool()).unwrap_or(false),
        blocking: value.get("blocking").and_then(|v| v.as_bool()).unwrap_or(false),
        blocked_by: value.get("blocked_by").and_then(|v| v.as_bool()).unwrap_or(false),
        muted: value.get("muting").and_then(|v| v.as_bool()).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn jar_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("cookies.json");
        std::fs::write(&path, r#"{"ct0":"csrf","auth_token":"auth"}"#).unwrap();
        path
    }

    async fn build_client(server_url: &str) -> (tempfile::TempDir, Arc<ApiClient>) {
        let cookie_dir = tempfile::tempdir().unwrap();
        let path = jar_path(&cookie_dir);
        let session = SessionState::load(&path).unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = ThreeTierCache::open(cache_dir.path(), crate::cache::CacheTtls::default()).unwrap();
        let client = ApiClient::new(
            session,
            cache,
            FeatureFlags::default(),
            CooldownConfig::default(),
            server_url,
            CancellationToken::new(),
        )
        .unwrap();
        (cookie_dir, Arc::new(client))
    }

    #[tokio::test]
    async fn verify_credentials_extracts_caller_id() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/1.1/account/verify_credentials.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id_str":"999"}"#)
            .create_async()
            .await;

        let (_dir, client) = build_client(&server.url()).await;
        let id = client.verify_credentials().await.unwrap();
        assert_eq!(id, "999");
    }

    #[tokio::test]
    async fn block_create_success_returns_success_outcome() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/1.1/blocks/create.json")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let (_dir, client) = build_client(&server.url()).await;
        let outcome = client.blocks_create("100", Duration::from_millis(1)).await;
        assert!(matches!(outcome, BlockOutcome::Success));
    }

    #[tokio::test]
    async fn block_create_rate_limited_classifies_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/1.1/blocks/create.json")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let (_dir, client) = build_client(&server.url()).await;
        let outcome = client.blocks_create("100", Duration::from_millis(1)).await;
        assert!(matches!(
            outcome,
            BlockOutcome::Failed(Classification::Transient { kind: crate::domain::outcome::ErrorKind::RateLimit, .. })
        ));
    }

    #[tokio::test]
    async fn users_by_rest_ids_parses_profile_map() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Regex("/graphql/UsersByRestIds.*".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"100":{"id_str":"100","screen_name":"alice","name":"Alice"}}"#)
            .create_async()
            .await;

        let (_dir, client) = build_client(&server.url()).await;
        let profiles = client.users_by_rest_ids(&["100".to_string()]).await.unwrap();
        assert_eq!(profiles.get("100").unwrap().profile.handle, "alice");
    }

    #[tokio::test]
    async fn resolve_by_handle_falls_back_to_per_handle_call_without_a_cached_lookup() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Regex("/graphql/UserByScreenName.*".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id_str":"200","screen_name":"frank","name":"Frank"}"#)
            .create_async()
            .await;

        let (_dir, client) = build_client(&server.url()).await;
        let resolved = client.resolve_users(TargetFormat::ScreenName, &["frank".to_string()]).await;
        let entry = resolved.get("frank").unwrap().as_ref().unwrap();
        assert_eq!(entry.profile.numeric_id, "200");
        assert!(client.cache().get_lookup("frank").is_some());
    }

    #[tokio::test]
    async fn resolve_users_uses_cache_on_full_hit_without_calling_upstream() {
        let mut server = mockito::Server::new_async().await;
        let never_called = server
            .mock("GET", mockito::Matcher::Regex("/graphql/UsersByRestIds.*".into()))
            .with_status(200)
            .with_body("{}")
            .expect(0)
            .create_async()
            .await;

        let (_dir, client) = build_client(&server.url()).await;
        client
            .cache()
            .put_profile(
                "100",
                Profile {
                    numeric_id: "100".into(),
                    handle: "eve".into(),
                    display_name: "Eve".into(),
                    account_state: AccountState::Active,
                    protected: false,
                    verified: false,
                },
            )
            .unwrap();
        client
            .cache()
            .put_relationship("100", Relationship { following: true, ..Default::default() })
            .unwrap();

        let resolved = client.resolve_users(TargetFormat::UserId, &["100".to_string()]).await;
        let entry = resolved.get("100").unwrap().as_ref().unwrap();
        assert!(entry.relationship.should_skip_block());
        never_called.assert_async().await;
    }

    #[test]
    fn endpoint_family_map_starts_empty() {
        let _ = StdHashMap::<EndpointFamily, RateLimitSnapshot>::new();
    }
}
