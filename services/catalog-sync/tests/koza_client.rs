use std::time::Duration;

use catalog_sync::domain::gateways::{
    DownstreamError, DownstreamGateway, PayloadDefaults, StockCardPayload,
};
use catalog_sync::domain::entities::SourceProduct;
use catalog_sync::domain::services::VersioningPolicy;
use catalog_sync::domain::value_objects::{CanonicalCode, DownstreamId, SourceProductId};
use catalog_sync::infrastructure::koza::{KozaClient, KozaSettings};
use chrono::NaiveDate;
use secrecy::Secret;
use serde_json::json;
use stockbridge_common::Pagination;
use stockbridge_config::default_duplicate_markers;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "5F3C1A9E2B";

fn client(server: &MockServer, branch_id: Option<i64>) -> KozaClient {
    KozaClient::new(KozaSettings {
        base_url: format!("{}/Yetki", server.uri()),
        org_code: "1422649".to_string(),
        username: "entegrasyon".to_string(),
        password: Secret::new("gizli".to_string()),
        branch_id,
        session_ttl: Duration::from_secs(20 * 60),
        request_timeout: Duration::from_secs(5),
        duplicate_markers: default_duplicate_markers(),
        session_expired_codes: vec![1003],
    })
    .unwrap()
}

fn login_ok() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("set-cookie", format!("JSESSIONID={}; Path=/Yetki; HttpOnly", TOKEN).as_str())
        .set_body_json(json!({ "code": 0 }))
}

fn payload() -> StockCardPayload {
    let product = SourceProduct::new(SourceProductId::new("kat-1"), "abc-1", "Kırmızı Kalem");
    let mapping = VersioningPolicy::default()
        .decide(product, None)
        .pending()
        .cloned()
        .unwrap();
    StockCardPayload::from_mapping(
        &mapping,
        &PayloadDefaults::default(),
        NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
    )
}

#[tokio::test]
async fn test_login_reads_session_cookie() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/Giris.do"))
        .and(body_partial_json(json!({ "orgCode": "1422649", "userName": "entegrasyon" })))
        .respond_with(login_ok())
        .expect(1)
        .mount(&server)
        .await;

    let session = client(&server, None).login().await.unwrap();

    assert_eq!(session.token, TOKEN);
    assert!(session.expires_at > chrono::Utc::now());
}

#[tokio::test]
async fn test_login_selects_configured_branch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/Giris.do"))
        .respond_with(login_ok())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Yetki/GuncelleYtkSirketSubeDegistir.do"))
        .and(header("cookie", format!("JSESSIONID={}", TOKEN).as_str()))
        .and(body_partial_json(json!({ "orgSirketSubeId": 854 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client(&server, Some(854)).login().await.unwrap();

    assert_eq!(session.token, TOKEN);
}

#[tokio::test]
async fn test_login_without_cookie_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/Giris.do"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
        .mount(&server)
        .await;

    let err = client(&server, None).login().await.unwrap_err();

    assert!(matches!(err, DownstreamError::Auth(_)));
}

#[tokio::test]
async fn test_html_login_page_is_bad_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/ListeleStkSkart.do"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<!DOCTYPE html><html><body>Giriş</body></html>", "text/html"),
        )
        .mount(&server)
        .await;

    let err = client(&server, None)
        .find_by_code(TOKEN, &CanonicalCode::new("ABC-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, DownstreamError::BadSessionOrResponse(_)));
}

#[tokio::test]
async fn test_expired_session_code_is_bad_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/ListeleStkSkart.do"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "error": true, "code": 1003, "message": "Oturum sonlandı" })),
        )
        .mount(&server)
        .await;

    let err = client(&server, None)
        .find_by_code(TOKEN, &CanonicalCode::new("ABC-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, DownstreamError::BadSessionOrResponse(_)));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/ListeleStkSkart.do"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let err = client(&server, None)
        .find_by_code(TOKEN, &CanonicalCode::new("ABC-1"))
        .await
        .unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn test_find_matches_canonical_row_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/ListeleStkSkart.do"))
        .and(header("cookie", format!("JSESSIONID={}", TOKEN).as_str()))
        .and(body_partial_json(json!({ "stkSkart": { "kodBas": "ABC-1", "kodOp": "between" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stkSkart": [],
            "list": [
                { "kartKodu": "ABC-10", "skartId": 11 },
                { "kartKodu": "abc-1 ", "skartId": 42 }
            ]
        })))
        .mount(&server)
        .await;

    let found = client(&server, None)
        .find_by_code(TOKEN, &CanonicalCode::new("ABC-1"))
        .await
        .unwrap();

    assert_eq!(found, Some(DownstreamId(42)));
}

#[tokio::test]
async fn test_find_returns_none_without_matching_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/ListeleStkSkart.do"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "list": [] })))
        .mount(&server)
        .await;

    let found = client(&server, None)
        .find_by_code(TOKEN, &CanonicalCode::new("ABC-1"))
        .await
        .unwrap();

    assert_eq!(found, None);
}

#[tokio::test]
async fn test_create_returns_new_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/EkleStkWsSkart.do"))
        .and(body_partial_json(json!({ "kartKodu": "ABC-1", "kartAdi": "Kırmızı Kalem" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "skartId": 9001 })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client(&server, None).create(TOKEN, &payload()).await.unwrap();

    assert_eq!(id, Some(DownstreamId(9001)));
}

#[tokio::test]
async fn test_duplicate_message_becomes_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/EkleStkWsSkart.do"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": true,
            "code": 1,
            "message": "Bu KART KODU DAHA ÖNCE KULLANILMIŞ",
            "stokKartId": 314
        })))
        .mount(&server)
        .await;

    let err = client(&server, None).create(TOKEN, &payload()).await.unwrap_err();

    match err {
        DownstreamError::Conflict { existing_id, .. } => {
            assert_eq!(existing_id, Some(DownstreamId(314)));
        }
        other => panic!("expected conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn test_other_business_error_is_validation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/EkleStkWsSkart.do"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": true,
            "message": "Ölçü birimi bulunamadı"
        })))
        .mount(&server)
        .await;

    let err = client(&server, None).create(TOKEN, &payload()).await.unwrap_err();

    assert!(matches!(err, DownstreamError::Validation(msg) if msg.contains("birimi")));
}

#[tokio::test]
async fn test_list_page_reads_nested_rows() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/ListeleStkSkart.do"))
        .and(body_partial_json(json!({ "start": 100, "limit": 100 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "stokKartlari": [
                    { "kartKodu": "ABC-1", "skartId": 1 },
                    { "kod": "ABC-2", "id": "2" },
                    { "kartKodu": "", "skartId": 3 }
                ]
            }
        })))
        .mount(&server)
        .await;

    let rows = client(&server, None)
        .list_page(TOKEN, Pagination::new(2, 100))
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].code, "ABC-1");
    assert_eq!(rows[1].id, DownstreamId(2));
}

#[tokio::test]
async fn test_conflict_status_with_text_body_is_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/EkleStkWsSkart.do"))
        .respond_with(ResponseTemplate::new(409).set_body_string("Conflict: card code already exists"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, None).create(TOKEN, &payload()).await.unwrap_err();

    assert!(matches!(err, DownstreamError::Conflict { existing_id: None, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_conflict_status_with_empty_body_is_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Yetki/EkleStkWsSkart.do"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, None).create(TOKEN, &payload()).await.unwrap_err();

    assert!(matches!(err, DownstreamError::Conflict { existing_id: None, .. }));
}
