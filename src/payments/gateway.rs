use std::time::Duration;

use axum::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::PaymentGatewayConfig;
use crate::payments::repo_types::PaymentStatus;

#[derive(Debug, Clone)]
pub struct PreferenceRequest {
    pub external_reference: String,
    pub title: String,
    pub amount: f64,
    pub currency: String,
    pub payer_email: String,
}

#[derive(Debug, Clone)]
pub struct Preference {
    pub id: String,
    pub init_point: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayPayment {
    pub id: String,
    pub status: Option<PaymentStatus>,
    pub external_reference: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway not configured")]
    Unconfigured,
    #[error("payment gateway unreachable: {0}")]
    Unavailable(String),
    #[error("unexpected gateway response: {0}")]
    Protocol(String),
}

/// Payment gateway seam: create a checkout preference, fetch a payment to
/// resolve its external reference when a webhook omits it.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_preference(&self, req: &PreferenceRequest) -> Result<Preference, GatewayError>;
    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError>;
}

pub struct NullPaymentGateway;

#[async_trait]
impl PaymentGateway for NullPaymentGateway {
    async fn create_preference(&self, _: &PreferenceRequest) -> Result<Preference, GatewayError> {
        Err(GatewayError::Unconfigured)
    }
    async fn fetch_payment(&self, _: &str) -> Result<GatewayPayment, GatewayError> {
        Err(GatewayError::Unconfigured)
    }
}

/// REST client for a Mercado Pago-shaped gateway.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &PaymentGatewayConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_preference(&self, req: &PreferenceRequest) -> Result<Preference, GatewayError> {
        let body = json!({
            "items": [{
                "title": req.title,
                "quantity": 1,
                "unit_price": req.amount,
                "currency_id": req.currency,
            }],
            "payer": { "email": req.payer_email },
            "external_reference": req.external_reference,
            "back_urls": { "success": "/", "failure": "/", "pending": "/" },
            "auto_return": "approved",
        });

        let res = self
            .client
            .post(format!("{}/checkout/preferences", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = res.status();
        let payload: Value = res
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::Protocol(format!("status {status}")));
        }

        let id = payload["id"]
            .as_str()
            .ok_or_else(|| GatewayError::Protocol("missing preference id".into()))?;
        debug!(preference_id = id, "preference created");
        Ok(Preference {
            id: id.to_string(),
            init_point: payload["init_point"].as_str().map(str::to_string),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let res = self
            .client
            .get(format!("{}/v1/payments/{payment_id}", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = res.status();
        let payload: Value = res
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::Protocol(format!("status {status}")));
        }

        Ok(GatewayPayment {
            id: payment_id.to_string(),
            status: payload["status"].as_str().and_then(PaymentStatus::parse),
            external_reference: payload["external_reference"].as_str().map(str::to_string),
        })
    }
}
