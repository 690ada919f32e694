use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::provider::{IdentityProvider, ProviderError};
use crate::auth::repo::{CredentialStore, StoreError};
use crate::auth::repo_types::{NewUser, Role, UserRecord};
use crate::error::AuthError;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

const MIN_PASSWORD_LEN: usize = 6;

/// Profile fields supplied at registration.
#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub username: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Two-tier authenticator: remote identity provider first, local credential
/// store as the degraded path.
///
/// The fallback only ever fires on transient or configuration failures.
/// Authentication rejections from the provider are terminal, and the login
/// fallback is strictly read-only: an outage can never mint a local record
/// with a different password for a remotely-registered user.
pub struct FallbackAuthenticator {
    remote: Arc<dyn IdentityProvider>,
    local: Arc<dyn CredentialStore>,
    retry: RetryPolicy,
}

impl FallbackAuthenticator {
    pub fn new(remote: Arc<dyn IdentityProvider>, local: Arc<dyn CredentialStore>) -> Self {
        Self {
            remote,
            local,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Retries transient provider failures with exponential backoff. Any
    /// other outcome is returned as-is on the first attempt.
    async fn call_remote<T, F, Fut>(&self, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.retry.attempts => {
                    attempt += 1;
                    let delay = self.retry.base_delay * 2u32.saturating_pow(attempt - 1);
                    debug!(attempt, ?delay, error = %e, "retrying identity provider call");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        profile: NewProfile,
    ) -> Result<UserRecord, AuthError> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(AuthError::Validation("invalid email address".into()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let username = profile
            .username
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or(&email).to_string());
        let full_name = profile.full_name.unwrap_or_default();

        match self
            .call_remote(|| self.remote.create_account(&email, password))
            .await
        {
            Ok(account) => {
                if let Err(e) = self
                    .remote
                    .send_verification_email(&account.id_token)
                    .await
                {
                    warn!(error = %e, "could not send verification email");
                }
                let mirror = NewUser {
                    uid: account.uid.clone(),
                    email: email.clone(),
                    password_hash: None,
                    username,
                    full_name,
                    role: Role::Buyer,
                    is_admin: false,
                    email_verified: false,
                };
                let record = match self.local.create(mirror).await {
                    Ok(record) => record,
                    // A mirror can already exist after a partial earlier
                    // registration; the remote uid wins.
                    Err(StoreError::EmailExists) => self
                        .local
                        .find_by_email(&email)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("mirror record vanished"))?,
                    Err(StoreError::Other(e)) => return Err(e.into()),
                };
                info!(uid = %record.uid, "user registered via identity provider");
                Ok(record)
            }
            Err(ProviderError::EmailExists) => Err(AuthError::EmailAlreadyExists),
            Err(ProviderError::WeakPassword) => {
                Err(AuthError::Validation("password rejected: too weak".into()))
            }
            Err(ProviderError::InvalidCredentials) => Err(AuthError::InvalidCredentials),
            Err(e) => {
                debug_assert!(e.triggers_fallback());
                warn!(error = %e, "identity provider unavailable; registering locally");
                self.register_local(&email, password, username, full_name)
                    .await
            }
        }
    }

    async fn register_local(
        &self,
        email: &str,
        password: &str,
        username: String,
        full_name: String,
    ) -> Result<UserRecord, AuthError> {
        let new = NewUser {
            uid: Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_hash: Some(hash_password(password)?),
            username,
            full_name,
            role: Role::Buyer,
            is_admin: false,
            email_verified: false,
        };
        match self.local.create(new).await {
            Ok(record) => {
                info!(uid = %record.uid, "user registered locally");
                Ok(record)
            }
            Err(StoreError::EmailExists) => Err(AuthError::EmailAlreadyExists),
            Err(StoreError::Other(e)) => Err(e.into()),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserRecord, AuthError> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) || password.is_empty() {
            // Same response as a bad password; no account enumeration.
            return Err(AuthError::InvalidCredentials);
        }

        match self
            .call_remote(|| self.remote.sign_in(&email, password))
            .await
        {
            Ok(account) => {
                let record = match self.local.find_by_uid(&account.uid).await? {
                    Some(record) => record,
                    None => {
                        // First remote login on this instance: materialize a
                        // minimal local record with the default role.
                        info!(uid = %account.uid, "materializing local record for remote user");
                        match self
                            .local
                            .create(NewUser::materialized(&account.uid, &email))
                            .await
                        {
                            Ok(record) => record,
                            Err(StoreError::EmailExists) => self
                                .local
                                .find_by_email(&email)
                                .await?
                                .ok_or_else(|| anyhow::anyhow!("local record vanished"))?,
                            Err(StoreError::Other(e)) => return Err(e.into()),
                        }
                    }
                };
                if !record.email_verified {
                    if let Ok(info) = self.remote.fetch_account(&account.id_token).await {
                        if info.email_verified {
                            self.local.mark_email_verified(&record.uid).await?;
                        }
                    }
                }
                Ok(record)
            }
            Err(ProviderError::InvalidCredentials) => Err(AuthError::InvalidCredentials),
            Err(e) if e.triggers_fallback() => {
                warn!(error = %e, "identity provider unavailable; verifying locally");
                self.login_local(&email, password).await
            }
            Err(e) => {
                warn!(error = %e, "identity provider rejected login");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Read-only local verification. Never creates or mutates records.
    async fn login_local(&self, email: &str, password: &str) -> Result<UserRecord, AuthError> {
        let Some(record) = self.local.find_by_email(email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        let Some(hash) = record.password_hash.as_deref() else {
            // Remote-only account during an outage; nothing to verify against.
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::async_trait;
    use parking_lot::Mutex;

    use crate::auth::provider::{AccountInfo, NullIdentityProvider, RemoteAccount};
    use crate::auth::repo::MemoryCredentialStore;

    /// Scriptable remote provider: one account, switchable outage flag.
    #[derive(Default)]
    struct ScriptedProvider {
        account: Mutex<Option<(String, String, String)>>, // uid, email, password
        down: Mutex<bool>,
        sign_in_calls: Mutex<u32>,
    }

    impl ScriptedProvider {
        fn with_account(uid: &str, email: &str, password: &str) -> Self {
            Self {
                account: Mutex::new(Some((
                    uid.to_string(),
                    email.to_string(),
                    password.to_string(),
                ))),
                ..Default::default()
            }
        }

        fn set_down(&self, down: bool) {
            *self.down.lock() = down;
        }
    }

    #[async_trait]
    impl IdentityProvider for ScriptedProvider {
        async fn create_account(
            &self,
            email: &str,
            password: &str,
        ) -> Result<RemoteAccount, ProviderError> {
            if *self.down.lock() {
                return Err(ProviderError::Unavailable("scripted outage".into()));
            }
            let mut slot = self.account.lock();
            if let Some((_, existing, _)) = slot.as_ref() {
                if existing == email {
                    return Err(ProviderError::EmailExists);
                }
            }
            let uid = format!("remote-{email}");
            *slot = Some((uid.clone(), email.to_string(), password.to_string()));
            Ok(RemoteAccount {
                uid,
                email: email.to_string(),
                id_token: "token".into(),
            })
        }

        async fn sign_in(
            &self,
            email: &str,
            password: &str,
        ) -> Result<RemoteAccount, ProviderError> {
            *self.sign_in_calls.lock() += 1;
            if *self.down.lock() {
                return Err(ProviderError::Unavailable("scripted outage".into()));
            }
            match self.account.lock().as_ref() {
                Some((uid, e, p)) if e == email && p == password => Ok(RemoteAccount {
                    uid: uid.clone(),
                    email: email.to_string(),
                    id_token: "token".into(),
                }),
                _ => Err(ProviderError::InvalidCredentials),
            }
        }

        async fn fetch_account(&self, _: &str) -> Result<AccountInfo, ProviderError> {
            match self.account.lock().as_ref() {
                Some((uid, email, _)) => Ok(AccountInfo {
                    uid: uid.clone(),
                    email: email.clone(),
                    email_verified: true,
                }),
                None => Err(ProviderError::Protocol("no account".into())),
            }
        }

        async fn send_verification_email(&self, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn send_password_reset(&self, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn local_only() -> FallbackAuthenticator {
        FallbackAuthenticator::new(
            Arc::new(NullIdentityProvider),
            Arc::new(MemoryCredentialStore::default()),
        )
    }

    fn no_retry_delay() -> RetryPolicy {
        RetryPolicy {
            attempts: 1,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn register_then_login_yields_same_uid() {
        let auth = local_only();
        let registered = auth
            .register("a@b.com", "secret1", NewProfile::default())
            .await
            .unwrap();
        let logged_in = auth.login("a@b.com", "secret1").await.unwrap();
        assert_eq!(registered.uid, logged_in.uid);
        assert_eq!(logged_in.role, Role::Buyer);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let auth = local_only();
        auth.register("a@b.com", "secret1", NewProfile::default())
            .await
            .unwrap();
        let err = auth
            .register("A@B.com", "other22", NewProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailAlreadyExists));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_indistinguishable() {
        let auth = local_only();
        auth.register("a@b.com", "secret1", NewProfile::default())
            .await
            .unwrap();
        let wrong_password = auth.login("a@b.com", "wrong12").await.unwrap_err();
        let unknown_email = auth.login("ghost@b.com", "secret1").await.unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn rejects_short_password_and_bad_email() {
        let auth = local_only();
        assert!(matches!(
            auth.register("a@b.com", "short", NewProfile::default())
                .await
                .unwrap_err(),
            AuthError::Validation(_)
        ));
        assert!(matches!(
            auth.register("not-an-email", "secret1", NewProfile::default())
                .await
                .unwrap_err(),
            AuthError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn remote_login_materializes_local_record_with_buyer_role() {
        let provider = Arc::new(ScriptedProvider::with_account(
            "remote-1",
            "a@b.com",
            "secret1",
        ));
        let store = Arc::new(MemoryCredentialStore::default());
        let auth = FallbackAuthenticator::new(provider, store.clone());

        let record = auth.login("a@b.com", "secret1").await.unwrap();
        assert_eq!(record.uid, "remote-1");
        assert_eq!(record.role, Role::Buyer);
        assert!(store.find_by_uid("remote-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn outage_login_is_read_only() {
        let provider = Arc::new(ScriptedProvider::with_account(
            "remote-1",
            "a@b.com",
            "secret1",
        ));
        let store = Arc::new(MemoryCredentialStore::default());
        let auth = FallbackAuthenticator::new(provider.clone(), store.clone())
            .with_retry(no_retry_delay());

        provider.set_down(true);
        // Remote-only user, never seen locally: must fail without creating
        // a phantom local record.
        let err = auth.login("a@b.com", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(store.find_by_email("a@b.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn outage_registration_falls_back_to_local() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = Arc::new(MemoryCredentialStore::default());
        let auth = FallbackAuthenticator::new(provider.clone(), store.clone())
            .with_retry(no_retry_delay());

        provider.set_down(true);
        let record = auth
            .register("a@b.com", "secret1", NewProfile::default())
            .await
            .unwrap();
        assert!(record.password_hash.is_some());

        // Local record verifies during the outage.
        let logged_in = auth.login("a@b.com", "secret1").await.unwrap();
        assert_eq!(logged_in.uid, record.uid);
    }

    #[tokio::test]
    async fn remote_rejection_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::with_account(
            "remote-1",
            "a@b.com",
            "secret1",
        ));
        let auth = FallbackAuthenticator::new(
            provider.clone(),
            Arc::new(MemoryCredentialStore::default()),
        )
        .with_retry(RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        });

        let err = auth.login("a@b.com", "wrong12").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(*provider.sign_in_calls.lock(), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_with_bound() {
        let provider = Arc::new(ScriptedProvider::with_account(
            "remote-1",
            "a@b.com",
            "secret1",
        ));
        provider.set_down(true);
        let auth = FallbackAuthenticator::new(
            provider.clone(),
            Arc::new(MemoryCredentialStore::default()),
        )
        .with_retry(RetryPolicy {
            attempts: 2,
            base_delay: Duration::from_millis(1),
        });

        let _ = auth.login("a@b.com", "secret1").await;
        // 1 initial attempt + 2 retries.
        assert_eq!(*provider.sign_in_calls.lock(), 3);
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("u.ser+tag@sub.example.co"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user example@x.com"));
        assert!(!is_valid_email("@example.com"));
    }
}
