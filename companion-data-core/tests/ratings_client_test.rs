//! Wiremock tests for the 17Lands ratings client: smoothing, fallback to the
//! ratings cache, backoff and cancellation.

use companion_data_core::{
    BackoffConfig, ColorRatingsQuery, DataError, JsonRatingsStore, MemoryRatingsStore,
    RatingRecord, RatingsCacheStore, RatingsClient, RatingsConfig, RatingsQuery, RatingsSource,
};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn card_ratings_json() -> serde_json::Value {
    serde_json::json!([
        {
            "name": "Mabel's Mettle",
            "mtga_id": 91234,
            "color": "W",
            "rarity": "uncommon",
            "avg_seen": 4.1,
            "avg_pick": 3.2,
            "# games": 9000,
            "win_rate": 0.561,
            "# ever_drawn": 5,
            "ever_drawn_win_rate": 0.8,
            "# drawn": 2000,
            "drawn_win_rate": 0.57
        },
        {
            "name": "Brambleguard Captain",
            "mtga_id": 91235,
            "color": "R",
            "rarity": "uncommon",
            "# ever_drawn": 0,
            "ever_drawn_win_rate": null
        }
    ])
}

fn seeded_records() -> Vec<RatingRecord> {
    serde_json::from_value(serde_json::json!([
        {"name": "Cached Card", "ever_drawn_win_rate": 0.8, "# ever_drawn": 5}
    ]))
    .unwrap()
}

fn config_for(server: &MockServer) -> RatingsConfig {
    RatingsConfig::default()
        .with_base_url(server.uri())
        .with_rate_interval(Duration::ZERO)
        .with_backoff(BackoffConfig {
            failure_threshold: 3,
            initial_backoff: Duration::from_secs(60),
            ..BackoffConfig::default()
        })
}

fn client_with_store(server: &MockServer, store: Arc<dyn RatingsCacheStore>) -> RatingsClient {
    RatingsClient::new(config_for(server), Some(store)).unwrap()
}

async fn mount_failure(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/card_ratings/data"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

#[tokio::test]
async fn success_smooths_and_persists() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/card_ratings/data"))
        .and(query_param("expansion", "BLB"))
        .and(query_param("format", "PremierDraft"))
        .and(query_param("colors", "WG"))
        .respond_with(ResponseTemplate::new(200).set_body_json(card_ratings_json()))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(JsonRatingsStore::new(temp_dir.path().to_path_buf()).unwrap());
    let client = client_with_store(&server, store.clone());
    let query = RatingsQuery::new("blb", "PremierDraft").with_colors("gw");

    let table = client
        .get_card_ratings(&query, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(table.source, RatingsSource::Upstream);
    assert_eq!(table.key, "BLB|PremierDraft|WG");
    assert_eq!(table.records.len(), 2);
    assert_eq!(table.records[0].smoothed.gih_wr, Some(56.0));
    assert!(table.records[0].smoothed.gih_adjusted);
    assert_eq!(table.records[1].smoothed.gih_wr, None);

    let cached = store.load_card_ratings("BLB|PremierDraft|WG").unwrap().unwrap();
    assert_eq!(cached.records.len(), 2);
    assert_eq!(cached.records[0].gih_wr, Some(0.8));

    let stats = client.stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful_requests, 1);
    assert_eq!(stats.failed_requests, 0);
    assert!(stats.last_success_at.is_some());
}

#[tokio::test]
async fn upstream_failure_serves_cached_table() {
    let server = MockServer::start().await;
    mount_failure(&server, 503).await;

    let store = Arc::new(MemoryRatingsStore::new());
    let query = RatingsQuery::new("BLB", "PremierDraft");
    store.save_card_ratings(&query.cache_key(), &seeded_records()).unwrap();
    let client = client_with_store(&server, store);

    let table = client
        .get_card_ratings(&query, &CancellationToken::new())
        .await
        .unwrap();

    assert!(table.is_from_cache());
    assert_eq!(table.records.len(), 1);
    assert_eq!(table.records[0].name, "Cached Card");
    assert_eq!(table.records[0].smoothed.gih_wr, Some(56.0));

    let stats = client.stats();
    assert_eq!(stats.failed_requests, 1);
    assert_eq!(stats.cached_responses, 1);
    assert_eq!(stats.consecutive_failures, 1);
}

#[tokio::test]
async fn malformed_body_falls_back_like_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/card_ratings/data"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryRatingsStore::new());
    let query = RatingsQuery::new("BLB", "PremierDraft");
    store.save_card_ratings(&query.cache_key(), &seeded_records()).unwrap();
    let client = client_with_store(&server, store);

    let table = client
        .get_card_ratings(&query, &CancellationToken::new())
        .await
        .unwrap();
    assert!(table.is_from_cache());
    assert_eq!(client.stats().failed_requests, 1);
}

#[tokio::test]
async fn failure_with_empty_cache_is_stats_unavailable() {
    let server = MockServer::start().await;
    mount_failure(&server, 500).await;

    let client = client_with_store(&server, Arc::new(MemoryRatingsStore::new()));
    let err = client
        .get_card_ratings(&RatingsQuery::new("BLB", "PremierDraft"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DataError::StatsUnavailable { .. }));
    let cause = err.source().expect("upstream cause is kept");
    assert!(cause.to_string().contains("500"));
}

#[tokio::test]
async fn cancellation_is_not_a_failure_and_skips_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/card_ratings/data"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(card_ratings_json())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryRatingsStore::new());
    let query = RatingsQuery::new("BLB", "PremierDraft");
    store.save_card_ratings(&query.cache_key(), &seeded_records()).unwrap();
    let client = client_with_store(&server, store);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = client.get_card_ratings(&query, &cancel).await;
    assert!(matches!(result, Err(DataError::Cancelled)));

    let stats = client.stats();
    assert_eq!(stats.failed_requests, 0);
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(stats.cached_responses, 0);
}

#[tokio::test]
async fn backoff_stops_upstream_calls_after_threshold() {
    let server = MockServer::start().await;
    mount_failure(&server, 502).await;

    let client = RatingsClient::new(config_for(&server), None).unwrap();
    let query = RatingsQuery::new("BLB", "PremierDraft");
    let cancel = CancellationToken::new();

    for _ in 0..3 {
        assert!(client.get_card_ratings(&query, &cancel).await.is_err());
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert!(client.cooldown_remaining().is_some());

    let err = client.get_card_ratings(&query, &cancel).await.unwrap_err();
    match err {
        DataError::StatsUnavailable { source: Some(cause), .. } => {
            assert!(matches!(*cause, DataError::BackoffActive { .. }))
        }
        other => panic!("expected StatsUnavailable, got {:?}", other),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(client.stats().failed_requests, 3);

    client.reset_backoff();
    assert!(client.get_card_ratings(&query, &cancel).await.is_err());
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn success_after_failures_resets_consecutive_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/card_ratings/data"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/card_ratings/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(card_ratings_json()))
        .mount(&server)
        .await;

    let client = RatingsClient::new(config_for(&server), None).unwrap();
    let query = RatingsQuery::new("BLB", "PremierDraft");
    let cancel = CancellationToken::new();

    assert!(client.get_card_ratings(&query, &cancel).await.is_err());
    assert!(client.get_card_ratings(&query, &cancel).await.is_err());
    assert_eq!(client.stats().consecutive_failures, 2);

    client.get_card_ratings(&query, &cancel).await.unwrap();
    let stats = client.stats();
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(stats.failed_requests, 2);
    assert_eq!(stats.total_requests, 3);

    client.reset_stats();
    assert_eq!(client.stats().total_requests, 0);
}

#[tokio::test]
async fn color_ratings_fetch_and_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/color_ratings/data"))
        .and(query_param("expansion", "BLB"))
        .and(query_param("event_type", "PremierDraft"))
        .and(query_param("combine_splash", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"is_summary": false, "color_name": "Azorius (WU)", "wins": 5500, "games": 10000},
            {"is_summary": true, "color_name": "Two-color", "wins": 40000, "games": 75000}
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/color_ratings/data"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryRatingsStore::new());
    let client = client_with_store(&server, store);
    let query = ColorRatingsQuery::new("BLB", "PremierDraft").with_combine_splash(true);
    let cancel = CancellationToken::new();

    let fresh = client.get_color_ratings(&query, &cancel).await.unwrap();
    assert_eq!(fresh.source, RatingsSource::Upstream);
    assert_eq!(fresh.records[0].win_rate_percent(), Some(55.0));

    let cached = client.get_color_ratings(&query, &cancel).await.unwrap();
    assert!(cached.is_from_cache());
    assert_eq!(cached.records, fresh.records);
}

#[tokio::test]
async fn invalid_query_makes_no_request() {
    let server = MockServer::start().await;
    let client = RatingsClient::new(config_for(&server), None).unwrap();

    let result = client
        .get_color_ratings(&ColorRatingsQuery::new("BLB", ""), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(DataError::InvalidParams(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}
