//! HTTP boundary tests

use actix_web::{http::StatusCode, test, web, App};
use ledger_core::{
    handlers::configure_routes, LedgerRepository, LedgerService, MemoryStore, RepositoryOptions,
};
use message_bus::InMemoryChannel;
use serde_json::{json, Value};
use std::sync::Arc;

fn service() -> (Arc<InMemoryChannel>, Arc<LedgerRepository>, LedgerService) {
    let channel = Arc::new(InMemoryChannel::new());
    let repository = Arc::new(LedgerRepository::new(
        Arc::new(MemoryStore::seeded()),
        channel.clone(),
        RepositoryOptions::default(),
    ));
    let service = LedgerService::new(repository.clone());
    (channel, repository, service)
}

#[actix_web::test]
async fn test_invoice_then_balances() {
    let (_channel, repository, service) = service();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(service))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/invoice")
        .set_json(json!({"currency_code": 643, "amount": 150.5, "wallet_number": 123456789}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["client_id"], 3456);

    let req = test::TestRequest::get()
        .uri("/frozen-balance")
        .set_json(json!({"wallet_number": 123456789}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["frozen_balance"], 150.5);

    repository.promote_pending().await.unwrap();

    let req = test::TestRequest::get()
        .uri("/available-balance")
        .set_json(json!({"card_number": 5321300240335856i64}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["available_balance"], 150.5);
}

#[actix_web::test]
async fn test_withdraw_negates_amount() {
    let (_channel, _repository, service) = service();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(service))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/withdraw")
        .set_json(json!({"currency_code": 643, "amount": 20, "wallet_number": 123456789}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["amount"], -20.0);
}

#[actix_web::test]
async fn test_malformed_body_is_bad_input() {
    let (_channel, _repository, service) = service();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(service))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/invoice")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "bad input");
    assert_eq!(body["error"]["type"], "validation_error");
}

#[actix_web::test]
async fn test_operation_failures_are_500() {
    let (channel, _repository, service) = service();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(service))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/invoice")
        .set_json(json!({"currency_code": 999, "amount": 1, "wallet_number": 123456789}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "operation failed");
    assert_eq!(body["error"]["type"], "currency_not_found");

    channel.fail_publishes(true);
    let req = test::TestRequest::post()
        .uri("/invoice")
        .set_json(json!({"currency_code": 643, "amount": 1, "wallet_number": 123456789}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "publish_failure");

    let req = test::TestRequest::get()
        .uri("/available-balance")
        .set_json(json!({"wallet_number": 1}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[actix_web::test]
async fn test_ping_and_metrics() {
    let (_channel, _repository, service) = service();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(service))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/ping").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"message": "200 OK"}));

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}
