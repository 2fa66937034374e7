//! HTTP request boundary

use crate::{
    metrics,
    service::LedgerService,
    types::{Requisites, Transaction},
    Error,
};
use actix_web::{web, HttpRequest, HttpResponse};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Credit/debit payload. Absent numbers default to zero, which means
/// "not supplied" for the wallet and card.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TransactionRequest {
    /// ISO 4217 numeric code
    pub currency_code: i32,

    /// Amount as given by the caller
    pub amount: Decimal,

    /// Wallet number, 0 when absent
    pub wallet_number: i64,

    /// Card number, 0 when absent
    pub card_number: i64,
}

impl TransactionRequest {
    fn requisites(&self) -> Requisites {
        Requisites::new(self.wallet_number, self.card_number)
    }
}

/// Balance payload
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BalanceRequest {
    /// Wallet number, 0 when absent
    pub wallet_number: i64,

    /// Card number, 0 when absent
    pub card_number: i64,
}

/// `{"available_balance": n}`
#[derive(Debug, Serialize, Deserialize)]
pub struct AvailableBalanceResponse {
    /// Sum of Finalized amounts
    pub available_balance: Decimal,
}

/// `{"frozen_balance": n}`
#[derive(Debug, Serialize, Deserialize)]
pub struct FrozenBalanceResponse {
    /// Sum of Pending amounts
    pub frozen_balance: Decimal,
}

/// Credit
pub async fn invoice(
    service: web::Data<LedgerService>,
    request: web::Json<TransactionRequest>,
) -> Result<web::Json<Transaction>, Error> {
    let transaction = service
        .credit(request.currency_code, request.amount, request.requisites())
        .await?;
    Ok(web::Json(transaction))
}

/// Debit
pub async fn withdraw(
    service: web::Data<LedgerService>,
    request: web::Json<TransactionRequest>,
) -> Result<web::Json<Transaction>, Error> {
    let transaction = service
        .debit(request.currency_code, request.amount, request.requisites())
        .await?;
    Ok(web::Json(transaction))
}

/// Finalized balance
pub async fn available_balance(
    service: web::Data<LedgerService>,
    request: web::Json<BalanceRequest>,
) -> Result<web::Json<AvailableBalanceResponse>, Error> {
    let requisites = Requisites::new(request.wallet_number, request.card_number);
    let available_balance = service.available_balance(requisites).await?;
    Ok(web::Json(AvailableBalanceResponse { available_balance }))
}

/// Pending balance
pub async fn frozen_balance(
    service: web::Data<LedgerService>,
    request: web::Json<BalanceRequest>,
) -> Result<web::Json<FrozenBalanceResponse>, Error> {
    let requisites = Requisites::new(request.wallet_number, request.card_number);
    let frozen_balance = service.frozen_balance(requisites).await?;
    Ok(web::Json(FrozenBalanceResponse { frozen_balance }))
}

/// Liveness probe
pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": "200 OK" }))
}

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "ledger-core",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Prometheus scrape endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::render())
}

/// Reject malformed JSON bodies as bad input
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req: &HttpRequest| {
        Error::Validation(err.to_string()).into()
    })
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/invoice", web::post().to(invoice))
        .route("/withdraw", web::post().to(withdraw))
        .route("/available-balance", web::get().to(available_balance))
        .route("/frozen-balance", web::get().to(frozen_balance))
        .route("/ping", web::get().to(ping))
        .route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(metrics_endpoint));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_to_zero() {
        let request: TransactionRequest =
            serde_json::from_str(r#"{"currency_code": 643, "amount": 10.5, "wallet_number": 123456789}"#)
                .unwrap();
        assert_eq!(request.card_number, 0);
        assert_eq!(request.requisites(), Requisites::wallet(123456789));
    }
}
