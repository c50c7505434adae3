//! Suggestion aggregation against a mocked completion endpoint.

use std::time::Duration;

use caselog_suggest::{SuggestionAggregator, SuggestionConfig};
use caselog_types::{ProcedureRecord, SuggestionOrigin};
use serde_json::json;
use wiremock::MockServer;

use crate::common::{mount_reply, vision_client};

fn history() -> Vec<ProcedureRecord> {
    let raw = json!([
        {
            "id": "a1",
            "patientId": "PID-10442",
            "procedureName": "Laparoscopic Cholecystectomy",
            "date": "2025-01-08",
            "patientAge": "54 Years",
            "patientGender": "Female",
            "role": "First Assistant",
            "createdAt": 1736330000000_i64,
            "syncStatus": "synced"
        },
        {
            "id": "a2",
            "procedureName": "Laparoscopic Cholecystectomy",
            "date": "2025-01-09"
        },
        {
            "id": "a3",
            "procedureName": "Inguinal Hernia Repair",
            "date": "2025-01-10",
            "role": "Main Surgeon"
        }
    ]);
    serde_json::from_value(raw).unwrap()
}

fn fast_config() -> SuggestionConfig {
    SuggestionConfig {
        debounce: Duration::from_millis(20),
        ..SuggestionConfig::default()
    }
}

#[tokio::test]
async fn remote_completions_follow_local_matches() {
    let server = MockServer::start().await;
    mount_reply(
        &server,
        "1. Laparoscopic Cholecystectomy\n2. Laparoscopic Colectomy\n3. Laparoscopic Appendectomy",
        1,
    )
    .await;
    let (client, _clock) = vision_client(&server);
    let aggregator = SuggestionAggregator::new(client, fast_config());
    aggregator.rebuild_index(&history());
    let mut updates = aggregator.subscribe();

    let local = aggregator.on_input("Laparo");
    assert_eq!(
        local.texts().collect::<Vec<_>>(),
        ["Laparoscopic Cholecystectomy"]
    );
    updates.borrow_and_update();

    tokio::time::timeout(Duration::from_secs(5), updates.changed())
        .await
        .unwrap()
        .unwrap();
    let set = updates.borrow().clone();
    let items: Vec<(&str, SuggestionOrigin)> = set
        .items()
        .iter()
        .map(|s| (s.text.as_str(), s.origin))
        .collect();
    assert_eq!(
        items,
        [
            ("Laparoscopic Cholecystectomy", SuggestionOrigin::Local),
            ("Laparoscopic Colectomy", SuggestionOrigin::Remote),
            ("Laparoscopic Appendectomy", SuggestionOrigin::Remote),
        ]
    );
}

#[tokio::test]
async fn exact_local_match_skips_remote() {
    let server = MockServer::start().await;
    mount_reply(&server, "unused", 0).await;
    let (client, _clock) = vision_client(&server);
    let aggregator = SuggestionAggregator::new(client, fast_config());
    aggregator.rebuild_index(&history());

    let set = aggregator.on_input("inguinal hernia repair");
    assert!(!aggregator.is_fetching());
    assert_eq!(set.texts().next(), Some("Inguinal Hernia Repair"));
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn cooling_breaker_skips_remote() {
    let server = MockServer::start().await;
    mount_reply(&server, "unused", 0).await;
    let (client, _clock) = vision_client(&server);
    client.shared_breaker().trip_cooldown(Duration::from_secs(45));
    let aggregator = SuggestionAggregator::new(client, fast_config());

    let set = aggregator.on_input("Whip");
    assert_eq!(set.texts().collect::<Vec<_>>(), ["Whipple Procedure"]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!aggregator.is_fetching());
    assert_eq!(aggregator.get_suggestions("Whip"), set);
}

#[tokio::test]
async fn empty_query_offers_most_frequent() {
    let server = MockServer::start().await;
    let (client, _clock) = vision_client(&server);
    let aggregator = SuggestionAggregator::new(client, fast_config());
    aggregator.rebuild_index(&history());

    let set = aggregator.get_suggestions("");
    assert_eq!(
        set.texts().collect::<Vec<_>>(),
        ["Laparoscopic Cholecystectomy", "Inguinal Hernia Repair"]
    );
}
