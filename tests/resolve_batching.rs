//! A 75-target list with no cache coverage must resolve via exactly two
//! `UsersByRestIds` calls (50 + 25), never one call per target.

mod common;

use blocksweep::domain::outcome::TerminalStatus;
use blocksweep::domain::target::{TargetFormat, TargetList};
use blocksweep::manager::{ManagerConfig, ProcessingManager};

fn body_for(ids: &[String]) -> String {
    let entries: Vec<String> = ids
        .iter()
        .map(|id| format!(r#""{id}":{{"id_str":"{id}","screen_name":"user{id}","name":"User {id}"}}"#))
        .collect();
    format!("{{{}}}", entries.join(","))
}

#[tokio::test]
async fn seventy_five_uncached_targets_resolve_in_two_batches() {
    let ids: Vec<String> = (1..=75).map(|n| n.to_string()).collect();
    let first_batch: Vec<String> = ids[..50].to_vec();
    let second_batch: Vec<String> = ids[50..].to_vec();

    let mut server = mockito::Server::new_async().await;
    // The two chunk requests are told apart by a percent-encoded id that is
    // only ever a quoted token in one chunk's `userIds` array: "51" never
    // appears as its own quoted element among 1..=50, and vice versa.
    let first_call = server
        .mock("GET", mockito::Matcher::Regex("/graphql/UsersByRestIds.*".into()))
        .match_query(mockito::Matcher::Regex("%221%22".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body_for(&first_batch))
        .expect(1)
        .create_async()
        .await;
    let second_call = server
        .mock("GET", mockito::Matcher::Regex("/graphql/UsersByRestIds.*".into()))
        .match_query(mockito::Matcher::Regex("%2251%22".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body_for(&second_batch))
        .expect(1)
        .create_async()
        .await;
    let block_mock = server
        .mock("POST", "/1.1/blocks/create.json")
        .with_status(200)
        .with_body("{}")
        .expect(75)
        .create_async()
        .await;

    let harness = common::build(&server.url()).await;
    let manager = ProcessingManager::new(
        &harness.store,
        &harness.api,
        ManagerConfig {
            batch_size: 75,
            inter_call_delay: std::time::Duration::from_millis(1),
            max_targets: None,
            auto_retry: false,
        },
        "session-1".into(),
    );

    let progress = manager
        .run(&TargetList { format: TargetFormat::UserId, items: ids.clone() })
        .await
        .unwrap();

    assert_eq!(progress.blocked, 75);
    assert_eq!(progress.errors, 0);

    let successful = harness.store.get_successful(&ids, TargetFormat::UserId).await.unwrap();
    assert_eq!(successful.len(), 75);
    for id in &ids {
        let row = successful.get(id).expect("every target recorded as successful");
        assert_eq!(row.status, TerminalStatus::Success);
    }

    first_call.assert_async().await;
    second_call.assert_async().await;
    block_mock.assert_async().await;
}
