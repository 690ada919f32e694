use std::time::Duration;

use axum::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::IdentityProviderConfig;

/// Account data as the remote provider reports it. Nothing beyond these
/// fields may leak into the rest of the system.
#[derive(Debug, Clone)]
pub struct RemoteAccount {
    pub uid: String,
    pub email: String,
    pub id_token: String,
}

#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub uid: String,
    pub email: String,
    pub email_verified: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("identity provider not configured")]
    Unconfigured,
    #[error("identity provider unreachable: {0}")]
    Unavailable(String),
    #[error("email already exists")]
    EmailExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("password rejected by provider")]
    WeakPassword,
    #[error("unexpected provider response: {0}")]
    Protocol(String),
}

impl ProviderError {
    /// Transient failures may be retried and trigger the local fallback.
    /// Authentication failures never do.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }

    /// Whether the authenticator should fall back to the credential store.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            ProviderError::Unconfigured
                | ProviderError::Unavailable(_)
                | ProviderError::Protocol(_)
        )
    }
}

/// Remote identity service seam: account creation, sign-in, account info
/// lookup and the verification/reset mails.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_account(&self, email: &str, password: &str)
        -> Result<RemoteAccount, ProviderError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<RemoteAccount, ProviderError>;
    async fn fetch_account(&self, id_token: &str) -> Result<AccountInfo, ProviderError>;
    async fn send_verification_email(&self, id_token: &str) -> Result<(), ProviderError>;
    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError>;
}

/// Stand-in used when no provider is configured; every call reports
/// `Unconfigured` so the authenticator takes the local path.
pub struct NullIdentityProvider;

#[async_trait]
impl IdentityProvider for NullIdentityProvider {
    async fn create_account(&self, _: &str, _: &str) -> Result<RemoteAccount, ProviderError> {
        Err(ProviderError::Unconfigured)
    }
    async fn sign_in(&self, _: &str, _: &str) -> Result<RemoteAccount, ProviderError> {
        Err(ProviderError::Unconfigured)
    }
    async fn fetch_account(&self, _: &str) -> Result<AccountInfo, ProviderError> {
        Err(ProviderError::Unconfigured)
    }
    async fn send_verification_email(&self, _: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unconfigured)
    }
    async fn send_password_reset(&self, _: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unconfigured)
    }
}

/// REST client for an identitytoolkit-style provider.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpIdentityProvider {
    pub fn new(config: &IdentityProviderConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, op: &str) -> String {
        format!("{}/v1/accounts:{}?key={}", self.base_url, op, self.api_key)
    }

    async fn post(&self, op: &str, body: Value) -> Result<Value, ProviderError> {
        let res = self
            .client
            .post(self.endpoint(op))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = res.status();
        let payload: Value = res
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(e.to_string()))?;

        if status.is_success() {
            return Ok(payload);
        }
        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("status {status}")));
        }

        let code = payload["error"]["message"].as_str().unwrap_or_default();
        debug!(op, code, "identity provider rejected request");
        match code {
            "EMAIL_EXISTS" => Err(ProviderError::EmailExists),
            // Provider appends detail after a colon for weak passwords.
            c if c.starts_with("WEAK_PASSWORD") => Err(ProviderError::WeakPassword),
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS"
            | "USER_DISABLED" => Err(ProviderError::InvalidCredentials),
            other => Err(ProviderError::Protocol(format!(
                "status {status}, code {other:?}"
            ))),
        }
    }

    fn account_from(payload: &Value) -> Result<RemoteAccount, ProviderError> {
        let uid = payload["localId"]
            .as_str()
            .ok_or_else(|| ProviderError::Protocol("missing localId".into()))?;
        let email = payload["email"].as_str().unwrap_or_default();
        let id_token = payload["idToken"].as_str().unwrap_or_default();
        Ok(RemoteAccount {
            uid: uid.to_string(),
            email: email.to_lowercase(),
            id_token: id_token.to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<RemoteAccount, ProviderError> {
        let payload = self
            .post(
                "signUp",
                json!({ "email": email, "password": password, "returnSecureToken": true }),
            )
            .await?;
        Self::account_from(&payload)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<RemoteAccount, ProviderError> {
        let payload = self
            .post(
                "signInWithPassword",
                json!({ "email": email, "password": password, "returnSecureToken": true }),
            )
            .await?;
        Self::account_from(&payload)
    }

    async fn fetch_account(&self, id_token: &str) -> Result<AccountInfo, ProviderError> {
        let payload = self
            .post("lookup", json!({ "idToken": id_token }))
            .await?;
        let user = payload["users"]
            .get(0)
            .ok_or_else(|| ProviderError::Protocol("empty lookup response".into()))?;
        let uid = user["localId"]
            .as_str()
            .ok_or_else(|| ProviderError::Protocol("missing localId".into()))?;
        Ok(AccountInfo {
            uid: uid.to_string(),
            email: user["email"].as_str().unwrap_or_default().to_lowercase(),
            email_verified: user["emailVerified"].as_bool().unwrap_or(false),
        })
    }

    async fn send_verification_email(&self, id_token: &str) -> Result<(), ProviderError> {
        self.post(
            "sendOobCode",
            json!({ "requestType": "VERIFY_EMAIL", "idToken": id_token }),
        )
        .await
        .map(|_| ())
        .map_err(|e| {
            warn!(error = %e, "verification email request failed");
            e
        })
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        self.post(
            "sendOobCode",
            json!({ "requestType": "PASSWORD_RESET", "email": email }),
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        assert!(ProviderError::Unavailable("timeout".into()).is_transient());
        assert!(!ProviderError::InvalidCredentials.is_transient());
        assert!(!ProviderError::EmailExists.is_transient());
        assert!(!ProviderError::Unconfigured.is_transient());
    }

    #[test]
    fn auth_failures_never_trigger_fallback() {
        assert!(ProviderError::Unconfigured.triggers_fallback());
        assert!(ProviderError::Unavailable("down".into()).triggers_fallback());
        assert!(!ProviderError::InvalidCredentials.triggers_fallback());
        assert!(!ProviderError::EmailExists.triggers_fallback());
        assert!(!ProviderError::WeakPassword.triggers_fallback());
    }
}
