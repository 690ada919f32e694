use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::payments::repo_types::{PaymentRecord, PaymentStatus};

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub creator_uid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub ok: bool,
    pub external_reference: String,
    pub preference_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_point: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentHistoryItem {
    pub external_reference: String,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<PaymentRecord> for PaymentHistoryItem {
    fn from(r: PaymentRecord) -> Self {
        Self {
            external_reference: r.external_reference,
            amount: r.amount,
            currency: r.currency,
            status: r.status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Webhook body, parsed loosely: gateways nest the interesting fields
/// differently across notification versions.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<WebhookData>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl WebhookPayload {
    pub fn external_reference(&self) -> Option<&str> {
        self.external_reference
            .as_deref()
            .or_else(|| self.data.as_ref()?.external_reference.as_deref())
    }

    pub fn status(&self) -> Option<PaymentStatus> {
        let raw = self
            .status
            .as_deref()
            .or_else(|| self.data.as_ref()?.status.as_deref())?;
        PaymentStatus::parse(raw)
    }

    /// Gateway payment id, tolerated as either a JSON string or number.
    pub fn payment_id(&self) -> Option<String> {
        match self.data.as_ref()?.id.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_fields_resolve_from_either_level() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"data":{"id":123,"status":"approved"},"external_reference":"ref-1"}"#,
        )
        .unwrap();
        assert_eq!(payload.external_reference(), Some("ref-1"));
        assert_eq!(payload.status(), Some(PaymentStatus::Approved));
        assert_eq!(payload.payment_id().as_deref(), Some("123"));
    }

    #[test]
    fn webhook_with_string_id_and_nested_reference() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"data":{"id":"pay_9","external_reference":"ref-2"},"status":"rejected"}"#,
        )
        .unwrap();
        assert_eq!(payload.external_reference(), Some("ref-2"));
        assert_eq!(payload.status(), Some(PaymentStatus::Rejected));
        assert_eq!(payload.payment_id().as_deref(), Some("pay_9"));
    }

    #[test]
    fn empty_webhook_resolves_to_nothing() {
        let payload: WebhookPayload = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.external_reference(), None);
        assert_eq!(payload.status(), None);
        assert_eq!(payload.payment_id(), None);
    }
}
