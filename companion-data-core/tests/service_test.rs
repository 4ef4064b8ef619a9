//! End-to-end card resolution: Scryfall on a mock server, SQLite on disk.

use companion_data_core::{
    CardMetadataSource, CardService, CardStore, CollectionIdentifier, RefreshReport, ScryfallClient,
    ScryfallConfig, ServiceConfig, SqliteCardStore,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn card_json(arena_id: u32, name: &str) -> serde_json::Value {
    serde_json::json!({
        "id": format!("card-{}", arena_id),
        "arena_id": arena_id,
        "name": name,
        "type_line": "Creature — Elf Druid",
        "mana_cost": "{G}",
        "cmc": 1.0,
        "colors": ["G"],
        "color_identity": ["G"],
        "rarity": "common",
        "power": "1",
        "toughness": "1",
        "set": "fdn",
        "set_name": "Foundations",
        "collector_number": arena_id.to_string(),
        "released_at": "2024-11-15",
        "layout": "normal",
        "legalities": {"standard": "legal"}
    })
}

async fn mount_card(server: &MockServer, arena_id: u32, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/cards/arena/{}", arena_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(card_json(arena_id, name)))
        .expect(1)
        .mount(server)
        .await;
}

fn service(server: &MockServer, db_path: &std::path::Path) -> CardService {
    let source: Arc<dyn CardMetadataSource> = Arc::new(
        ScryfallClient::with_config(
            ScryfallConfig::default()
                .with_base_url(server.uri())
                .with_rate_interval(Duration::ZERO),
        )
        .unwrap(),
    );
    let store: Arc<dyn CardStore> = Arc::new(SqliteCardStore::open(db_path).unwrap());
    CardService::new(ServiceConfig::default(), source, Some(store))
}

#[tokio::test]
async fn batch_resolution_skips_failures_and_persists_the_rest() {
    let server = MockServer::start().await;
    mount_card(&server, 100, "Llanowar Elves").await;
    mount_card(&server, 101, "Elvish Mystic").await;
    mount_card(&server, 103, "Fyndhorn Elves").await;
    Mock::given(method("GET"))
        .and(path("/cards/arena/102"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("cards.sqlite3");
    let cancel = CancellationToken::new();

    let cards = service(&server, &db_path)
        .resolve_many(&[100, 101, 102, 103, 100], &cancel)
        .await;
    assert_eq!(cards.len(), 3);
    assert!(!cards.contains_key(&102));

    // A fresh service on the same database answers without upstream; the
    // `.expect(1)` mocks fail on drop if the cards are fetched again.
    let reopened = service(&server, &db_path);
    let card = reopened.resolve(101, &cancel).await.unwrap();
    assert_eq!(card.name, "Elvish Mystic");
    assert_eq!(card.power.as_deref(), Some("1"));

    let found = reopened.search_by_name("elves", &cancel).await.unwrap();
    let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Fyndhorn Elves", "Llanowar Elves"]);
}

#[tokio::test]
async fn name_search_falls_back_to_exact_upstream_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/named"))
        .and(query_param("exact", "Gilded Goose"))
        .respond_with(ResponseTemplate::new(200).set_body_json(card_json(70000, "Gilded Goose")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cards/named"))
        .and(query_param("exact", "No Such Card"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let service = service(&server, &temp_dir.path().join("cards.sqlite3"));
    let cancel = CancellationToken::new();

    let found = service.search_by_name("Gilded Goose", &cancel).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].arena_id, 70000);

    // Now stored, so the second search does not reach upstream.
    let again = service.search_by_name("gilded", &cancel).await.unwrap();
    assert_eq!(again.len(), 1);

    assert!(service.search_by_name("No Such Card", &cancel).await.unwrap().is_empty());
}

#[tokio::test]
async fn resolve_by_names_stores_found_cards() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cards/collection"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "not_found": [{"name": "Made Up Card"}],
            "data": [card_json(200, "Tangled Florahedron")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("cards.sqlite3");
    let service = service(&server, &db_path);
    let names = vec![
        "Tangled Florahedron".to_string(),
        "Made Up Card".to_string(),
        " Tangled Florahedron ".to_string(),
    ];

    let result = service
        .resolve_by_names(&names, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.cards.len(), 1);
    assert_eq!(result.not_found, vec![CollectionIdentifier::name("Made Up Card")]);

    let store = SqliteCardStore::open(&db_path).unwrap();
    assert_eq!(store.get(200).unwrap().unwrap().name, "Tangled Florahedron");
}

#[tokio::test]
async fn stale_rows_are_refreshed_from_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/arena/300"))
        .respond_with(ResponseTemplate::new(200).set_body_json(card_json(300, "Beast-Kin Ranger")))
        .expect(2)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("cards.sqlite3");
    let cancel = CancellationToken::new();
    service(&server, &db_path).resolve(300, &cancel).await.unwrap();

    // Push the row three weeks into the past.
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute("UPDATE cards SET updated_at = updated_at - ?1", [21 * 86_400])
        .unwrap();
    drop(conn);

    let service = service(&server, &db_path);
    let before = service.freshness().unwrap().unwrap();
    assert_eq!((before.stale, before.very_stale), (1, 1));

    let report = service.refresh_stale(10, &cancel).await.unwrap();
    assert_eq!(
        report,
        RefreshReport {
            checked: 1,
            refreshed: 1,
            failed: 0,
        }
    );
    let after = service.freshness().unwrap().unwrap();
    assert_eq!((after.fresh, after.stale), (1, 0));

    assert_eq!(service.stored_card_count().unwrap(), Some(1));
}
