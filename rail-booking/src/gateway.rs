//! Payment gateway adapters.
//!
//! `HttpPaymentGateway` speaks a hosted-checkout API: a form-encoded session
//! request that returns a redirect URL, and a validation endpoint queried
//! with the validation id the gateway hands back on redirect or IPN.
//! `MockPaymentGateway` validates ids it minted itself, for local runs.

use async_trait::async_trait;
use rail_catalog::pricing::{format_major, parse_major};
use rail_core::payment::{
    GatewayError, GatewaySession, PaymentGateway, SessionRequest, ValidatedPayment, ValidationStatus,
};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const SESSION_PATH: &str = "/gwprocess/v4/api.php";
const VALIDATION_PATH: &str = "/validator/api/validationserverAPI.php";

#[derive(Clone)]
pub struct HttpPaymentGateway {
    http_client: Client,
    base_url: String,
    store_id: String,
    store_password: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: &str, store_id: &str, store_password: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            store_id: store_id.to_string(),
            store_password: store_password.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    status: String,
    #[serde(default)]
    failedreason: Option<String>,
    #[serde(default)]
    sessionkey: Option<String>,
    #[serde(rename = "GatewayPageURL", default)]
    gateway_page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    status: String,
    #[serde(default)]
    val_id: Option<String>,
    #[serde(default)]
    tran_id: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    bank_tran_id: Option<String>,
    #[serde(default)]
    card_type: Option<String>,
    #[serde(default)]
    card_brand: Option<String>,
}

fn session_from_response(response: SessionResponse) -> Result<GatewaySession, GatewayError> {
    if !response.status.eq_ignore_ascii_case("SUCCESS") {
        return Err(GatewayError::Rejected(
            response
                .failedreason
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| format!("session status {}", response.status)),
        ));
    }

    match (response.sessionkey, response.gateway_page_url) {
        (Some(session_key), Some(gateway_url)) if !gateway_url.is_empty() => Ok(GatewaySession {
            session_key,
            gateway_url,
        }),
        _ => Err(GatewayError::Malformed("session response without key or redirect URL".to_string())),
    }
}

fn validation_from_response(requested_id: &str, response: ValidationResponse) -> ValidatedPayment {
    let status = match response.status.to_ascii_uppercase().as_str() {
        "VALID" => ValidationStatus::Valid,
        "VALIDATED" => ValidationStatus::Validated,
        "PENDING" => ValidationStatus::Pending,
        _ => ValidationStatus::Invalid,
    };

    ValidatedPayment {
        status,
        validation_id: response.val_id.unwrap_or_else(|| requested_id.to_string()),
        transaction_id: response.tran_id.as_deref().and_then(|t| Uuid::parse_str(t).ok()),
        amount_minor: response.amount.as_deref().and_then(parse_major),
        currency: response.currency,
        bank_transaction_id: response.bank_tran_id,
        card_type: response.card_type,
        card_brand: response.card_brand,
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<GatewaySession, GatewayError> {
        let total_amount = format_major(request.amount_minor);
        let tran_id = request.transaction_id.to_string();
        let params = [
            ("store_id", self.store_id.as_str()),
            ("store_passwd", self.store_password.as_str()),
            ("total_amount", total_amount.as_str()),
            ("currency", request.currency.as_str()),
            ("tran_id", tran_id.as_str()),
            ("success_url", request.success_url.as_str()),
            ("fail_url", request.fail_url.as_str()),
            ("cancel_url", request.cancel_url.as_str()),
            ("ipn_url", request.ipn_url.as_str()),
            ("cus_name", request.customer_name.as_str()),
            ("value_a", request.customer_id.as_str()),
            ("product_name", request.product_name.as_str()),
            ("product_category", "railway-ticket"),
            ("product_profile", "general"),
            ("shipping_method", "NO"),
        ];

        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, SESSION_PATH))
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "Gateway session request failed");
            return Err(GatewayError::Transport(format!("session endpoint returned {}", status)));
        }

        let parsed: SessionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        debug!(transaction_id = %request.transaction_id, status = %parsed.status, "Gateway session response");
        session_from_response(parsed)
    }

    async fn validate(&self, validation_id: &str) -> Result<ValidatedPayment, GatewayError> {
        let response = self
            .http_client
            .get(format!("{}{}", self.base_url, VALIDATION_PATH))
            .query(&[
                ("val_id", validation_id),
                ("store_id", self.store_id.as_str()),
                ("store_passwd", self.store_password.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Transport(format!(
                "validation endpoint returned {}",
                response.status()
            )));
        }

        let parsed: ValidationResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        Ok(validation_from_response(validation_id, parsed))
    }
}

/// Development gateway. Sessions point at a local URL and validation ids
/// have the form `MOCK-{transaction}-{amount_minor}`.
#[derive(Debug, Clone)]
pub struct MockPaymentGateway {
    base_url: String,
    currency: String,
}

impl MockPaymentGateway {
    pub fn new(base_url: &str, currency: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            currency: currency.to_string(),
        }
    }

    pub fn validation_id_for(transaction_id: Uuid, amount_minor: i64) -> String {
        format!("MOCK-{}-{}", transaction_id.simple(), amount_minor)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<GatewaySession, GatewayError> {
        Ok(GatewaySession {
            session_key: format!("mock_session_{}", request.transaction_id.simple()),
            gateway_url: format!(
                "{}/mock/checkout/{}?val_id={}",
                self.base_url,
                request.transaction_id,
                Self::validation_id_for(request.transaction_id, request.amount_minor)
            ),
        })
    }

    async fn validate(&self, validation_id: &str) -> Result<ValidatedPayment, GatewayError> {
        let parsed = validation_id.strip_prefix("MOCK-").and_then(|rest| {
            let (txn, amount) = rest.split_once('-')?;
            Some((Uuid::parse_str(txn).ok()?, amount.parse::<i64>().ok()?))
        });

        Ok(match parsed {
            Some((transaction_id, amount_minor)) => ValidatedPayment {
                status: ValidationStatus::Valid,
                validation_id: validation_id.to_string(),
                transaction_id: Some(transaction_id),
                amount_minor: Some(amount_minor),
                currency: Some(self.currency.clone()),
                bank_transaction_id: Some(format!("mock_bank_{}", transaction_id.simple())),
                card_type: Some("MOCK-VISA".to_string()),
                card_brand: Some("VISA".to_string()),
            },
            None => ValidatedPayment {
                status: ValidationStatus::Invalid,
                validation_id: validation_id.to_string(),
                transaction_id: None,
                amount_minor: None,
                currency: None,
                bank_transaction_id: None,
                card_type: None,
                card_brand: None,
            },
        })
    }
}
