//! End-to-end scenarios against a mocked upstream, one per named case.
//! These exercise the processing manager, persistence store, cache, and
//! API client together rather than any one component in isolation.

mod common;

use blocksweep::domain::outcome::{TerminalStatus, UserState};
use blocksweep::domain::profile::Relationship;
use blocksweep::domain::target::{TargetFormat, TargetList};
use blocksweep::manager::{ManagerConfig, ProcessingManager};

fn manager_config() -> ManagerConfig {
    ManagerConfig {
        batch_size: 50,
        inter_call_delay: std::time::Duration::from_millis(1),
        max_targets: None,
        auto_retry: false,
    }
}

fn single_handle(handle: &str) -> TargetList {
    TargetList {
        format: TargetFormat::ScreenName,
        items: vec![handle.to_string()],
    }
}

/// A resolved, unrelated active account gets blocked once; the
/// relationship cache entry is invalidated afterward but the profile stays.
#[tokio::test]
async fn resolves_and_blocks_an_unrelated_active_account() {
    let mut server = mockito::Server::new_async().await;
    let _resolve = server
        .mock("GET", mockito::Matcher::Regex("/graphql/UserByScreenName.*".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id_str":"1","screen_name":"alice","name":"Alice"}"#)
        .create_async()
        .await;
    let _block = server
        .mock("POST", "/1.1/blocks/create.json")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let harness = common::build(&server.url()).await;
    let manager = ProcessingManager::new(&harness.store, &harness.api, manager_config(), "session-1".into());

    let progress = manager.run(&single_handle("alice")).await.unwrap();
    assert_eq!(progress.blocked, 1);
    assert_eq!(progress.errors, 0);

    let successful = harness
        .store
        .get_successful(&["alice".to_string()], TargetFormat::ScreenName)
        .await
        .unwrap();
    let row = successful.get("alice").expect("alice recorded as successful");
    assert_eq!(row.status, TerminalStatus::Success);
    assert_eq!(row.user_state, UserState::Active);
    assert_eq!(row.attempt_count, 1);
    assert_eq!(row.numeric_id.as_deref(), Some("1"));

    assert!(harness.api.cache().get_relationship("1").is_none(), "relationship must be invalidated after a successful block");
    assert!(harness.api.cache().get_profile("1").is_some(), "profile must be retained after a successful block");
}

/// A suspended target is recorded as a permanent failure and never
/// re-contacted, even across a second run of the same list.
#[tokio::test]
async fn suspended_target_is_a_permanent_failure_and_is_never_recontacted() {
    let mut server = mockito::Server::new_async().await;
    let resolve_mock = server
        .mock("GET", mockito::Matcher::Regex("/graphql/UserByScreenName.*".into()))
        .with_status(400)
        .with_body("Account suspended")
        .expect(1)
        .create_async()
        .await;
    let block_mock = server
        .mock("POST", "/1.1/blocks/create.json")
        .with_status(200)
        .with_body("{}")
        .expect(0)
        .create_async()
        .await;

    let harness = common::build(&server.url()).await;
    let manager = ProcessingManager::new(&harness.store, &harness.api, manager_config(), "session-1".into());

    let first = manager.run(&single_handle("bob")).await.unwrap();
    assert_eq!(first.blocked, 0);
    assert_eq!(first.errors, 1);

    let permanent = harness
        .store
        .get_permanent_failures(&["bob".to_string()], TargetFormat::ScreenName)
        .await
        .unwrap();
    let row = permanent.get("bob").expect("bob recorded as a permanent failure");
    assert_eq!(row.status, TerminalStatus::Failed);
    assert_eq!(row.user_state, UserState::Suspended);
    assert_eq!(row.attempt_count, 1);

    // A second run over the same list must issue zero further HTTP calls:
    // the prefilter query removes bob from the batch before resolve.
    let second = manager.run(&single_handle("bob")).await.unwrap();
    assert_eq!(second.blocked, 0);
    assert_eq!(second.skipped, 1);

    resolve_mock.assert_async().await;
    block_mock.assert_async().await;
}

/// A full cache hit whose relationship says `following=true` is skipped
/// without any upstream call.
#[tokio::test]
async fn already_following_target_is_skipped_without_any_upstream_call() {
    let mut server = mockito::Server::new_async().await;
    let resolve_mock = server
        .mock("GET", mockito::Matcher::Regex("/graphql.*".into()))
        .with_status(200)
        .with_body("{}")
        .expect(0)
        .create_async()
        .await;
    let block_mock = server
        .mock("POST", "/1.1/blocks/create.json")
        .with_status(200)
        .with_body("{}")
        .expect(0)
        .create_async()
        .await;

    let harness = common::build(&server.url()).await;
    harness.api.cache().put_lookup("eve", "9".to_string()).unwrap();
    harness
        .api
        .cache()
        .put_profile(
            "9",
            blocksweep::domain::profile::Profile {
                numeric_id: "9".into(),
                handle: "eve".into(),
                display_name: "Eve".into(),
                account_state: blocksweep::domain::profile::AccountState::Active,
                protected: false,
                verified: false,
            },
        )
        .unwrap();
    harness
        .api
        .cache()
        .put_relationship("9", Relationship { following: true, ..Default::default() })
        .unwrap();

    let manager = ProcessingManager::new(&harness.store, &harness.api, manager_config(), "session-1".into());
    let progress = manager.run(&single_handle("eve")).await.unwrap();

    assert_eq!(progress.blocked, 0);
    assert_eq!(progress.skipped, 1);

    let row: (String, Option<String>) = sqlx::query_as("SELECT status, error_message FROM outcomes WHERE handle = 'eve'")
        .fetch_one(harness.store.pool())
        .await
        .unwrap();
    assert_eq!(row.0, "skipped");
    assert_eq!(row.1.as_deref(), Some("Following"));

    resolve_mock.assert_async().await;
    block_mock.assert_async().await;
}
