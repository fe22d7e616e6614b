use std::time::Duration;

use catalog_sync::domain::gateways::SourceGateway;
use catalog_sync::infrastructure::katana::{KatanaClient, KatanaSettings};
use chrono::{TimeZone, Utc};
use secrecy::Secret;
use serde_json::json;
use stockbridge_common::RetryConfig;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, page_size: u32) -> KatanaClient {
    KatanaClient::new(
        KatanaSettings {
            base_url: format!("{}/v1", server.uri()),
            api_key: Secret::new("katana-key".to_string()),
            page_size,
            request_timeout: Duration::from_secs(5),
        },
        RetryConfig::new(3, Duration::from_millis(10), Duration::from_millis(50)),
    )
    .unwrap()
}

fn katana_product(id: i64, sku: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("Ürün {}", id),
        "uom": "pcs",
        "category_name": "Temizlik",
        "archived_at": null,
        "updated_at": "2026-03-01T10:00:00Z",
        "variants": [
            { "id": id * 10, "sku": sku, "sales_price": 12.5, "registered_barcode": "8690000000017" }
        ]
    })
}

#[tokio::test]
async fn test_fetch_walks_pages_until_short_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/products"))
        .and(header("authorization", "Bearer katana-key"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [katana_product(1, "SKU-1"), katana_product(2, "SKU-2")]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/products"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [katana_product(3, " ")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let products = client(&server, 2).fetch_changed_products(None).await.unwrap();

    assert_eq!(products.len(), 3);
    assert_eq!(products[0].base_code(), "SKU-1");
    assert_eq!(products[0].barcode(), Some("8690000000017"));
    assert_eq!(products[2].base_code(), "KAT-30");
}

#[tokio::test]
async fn test_fetch_sends_updated_since_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/products"))
        .and(query_param("updated_at_min", "2026-03-01T08:30:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let since = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
    let products = client(&server, 50)
        .fetch_changed_products(Some(since))
        .await
        .unwrap();

    assert!(products.is_empty());
}

#[tokio::test]
async fn test_fetch_retries_unavailable_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/products"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [katana_product(1, "SKU-1")]
        })))
        .mount(&server)
        .await;

    let products = assert_ok!(client(&server, 50).fetch_changed_products(None).await);

    assert_eq!(products.len(), 1);
}

#[tokio::test]
async fn test_fetch_gives_up_on_client_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/products"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server, 50).fetch_changed_products(None).await;

    assert_err!(result);
}
