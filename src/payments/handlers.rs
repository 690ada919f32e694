use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use bytes::Bytes;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::payments::dto::{
    CreatePaymentRequest, CreatePaymentResponse, PaymentHistoryItem, WebhookPayload,
};
use crate::payments::gateway::PreferenceRequest;
use crate::payments::repo_types::{NewPayment, Transition};
use crate::payments::signature;
use crate::session::SessionUser;
use crate::state::AppState;

const DEFAULT_CURRENCY: &str = "UYU";

#[instrument(skip(state, payload))]
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>, ApiError> {
    if !(payload.amount.is_finite() && payload.amount > 0.0) {
        return Err(ApiError::Validation("amount must be positive".into()));
    }

    let external_reference = Uuid::new_v4().to_string();
    let currency = payload
        .currency
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
    let description = payload
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| "Compra PlayTimeUY".to_string());

    // Record first, gateway second: a webhook can only be correlated if the
    // reference already exists.
    state
        .payments
        .insert_pending(NewPayment {
            external_reference: external_reference.clone(),
            buyer_uid: user.uid.clone(),
            creator_uid: payload.creator_uid.clone(),
            amount: payload.amount,
            currency: currency.clone(),
        })
        .await?;

    let preference = state
        .gateway
        .create_preference(&PreferenceRequest {
            external_reference: external_reference.clone(),
            title: description,
            amount: payload.amount,
            currency,
            payer_email: user.email.clone(),
        })
        .await
        .map_err(|e| {
            warn!(error = %e, %external_reference, "preference creation failed");
            ApiError::Upstream
        })?;

    state
        .payments
        .set_preference_id(&external_reference, &preference.id)
        .await?;
    info!(%external_reference, preference_id = %preference.id, "payment preference created");

    Ok(Json(CreatePaymentResponse {
        ok: true,
        external_reference,
        preference_id: preference.id,
        init_point: preference.init_point,
    }))
}

#[instrument(skip_all)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Some(secret) = state.config.webhook_secret.as_deref() else {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "webhook secret not configured"
        )));
    };

    let sig = headers
        .get(signature::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !signature::verify(secret, &body, sig) {
        return Err(ApiError::Signature);
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("malformed webhook body: {e}")))?;

    let (external_reference, status) = match (payload.external_reference(), payload.status()) {
        (Some(r), Some(s)) => (r.to_string(), s),
        _ => match payload.payment_id() {
            // Reference or status missing: resolve through the gateway.
            Some(payment_id) => {
                let payment = state.gateway.fetch_payment(&payment_id).await.map_err(|e| {
                    warn!(error = %e, payment_id, "payment lookup failed");
                    ApiError::Upstream
                })?;
                match (payment.external_reference, payment.status) {
                    (Some(r), Some(s)) => (r, s),
                    _ => {
                        info!(payment_id, "webhook without resolvable reference; ignored");
                        return Ok((StatusCode::OK, Json(json!({ "ok": true }))));
                    }
                }
            }
            None => {
                info!("webhook without payment id; ignored");
                return Ok((StatusCode::OK, Json(json!({ "ok": true }))));
            }
        },
    };

    match state.payments.apply_status(&external_reference, status).await? {
        Transition::Apply(_) | Transition::Noop => {}
        Transition::Invalid => {
            warn!(%external_reference, status = status.as_str(), "ignored invalid status transition");
        }
    }
    Ok((StatusCode::OK, Json(json!({ "ok": true }))))
}

#[instrument(skip(state))]
pub async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> Result<Json<Vec<PaymentHistoryItem>>, ApiError> {
    let records = state.payments.list_by_buyer(&user.uid).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}
