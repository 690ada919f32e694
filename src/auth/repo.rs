use axum::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::auth::password::verify_password;
use crate::auth::repo_types::{NewUser, UserRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    EmailExists,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence seam for local user records.
///
/// `create` must be safe under concurrent registrations for the same email;
/// the Postgres implementation relies on the unique index on `lower(email)`
/// to serialize the race.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create(&self, new: NewUser) -> Result<UserRecord, StoreError>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>>;
    async fn find_by_uid(&self, uid: &str) -> anyhow::Result<Option<UserRecord>>;
    async fn verify(&self, email: &str, password: &str) -> anyhow::Result<bool>;
    async fn update_profile(
        &self,
        uid: &str,
        username: Option<&str>,
        full_name: Option<&str>,
    ) -> anyhow::Result<Option<UserRecord>>;
    async fn mark_email_verified(&self, uid: &str) -> anyhow::Result<()>;
}

const SELECT_COLUMNS: &str =
    "uid, email, password_hash, username, full_name, role, is_admin, email_verified, created_at";

pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create(&self, new: NewUser) -> Result<UserRecord, StoreError> {
        let query = format!(
            r#"
            INSERT INTO users (uid, email, password_hash, username, full_name, role, is_admin, email_verified)
            VALUES ($1, lower($2), $3, $4, $5, $6, $7, $8)
            RETURNING {SELECT_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(&new.uid)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(&new.username)
            .bind(&new.full_name)
            .bind(new.role.as_str())
            .bind(new.is_admin)
            .bind(new.email_verified)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::EmailExists
                } else {
                    StoreError::Other(e.into())
                }
            })?;
        debug!(uid = %user.uid, "user record created");
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM users WHERE email = lower($1)");
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_uid(&self, uid: &str) -> anyhow::Result<Option<UserRecord>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM users WHERE uid = $1");
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(uid)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn verify(&self, email: &str, password: &str) -> anyhow::Result<bool> {
        match self.find_by_email(email).await? {
            Some(UserRecord {
                password_hash: Some(hash),
                ..
            }) => verify_password(password, &hash),
            _ => Ok(false),
        }
    }

    async fn update_profile(
        &self,
        uid: &str,
        username: Option<&str>,
        full_name: Option<&str>,
    ) -> anyhow::Result<Option<UserRecord>> {
        let query = format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                full_name = COALESCE($3, full_name)
            WHERE uid = $1
            RETURNING {SELECT_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(uid)
            .bind(username)
            .bind(full_name)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn mark_email_verified(&self, uid: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET email_verified = TRUE WHERE uid = $1")
            .bind(uid)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// In-memory store keyed by email, with a uid scan for session resolution.
/// Backs `AppState::fake()` and the authenticator tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: parking_lot::RwLock<std::collections::HashMap<String, UserRecord>>,
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create(&self, new: NewUser) -> Result<UserRecord, StoreError> {
        let mut users = self.users.write();
        let email = new.email.trim().to_lowercase();
        if users.contains_key(&email) {
            return Err(StoreError::EmailExists);
        }
        let record = UserRecord {
            uid: new.uid,
            email: email.clone(),
            password_hash: new.password_hash,
            username: new.username,
            full_name: new.full_name,
            role: new.role,
            is_admin: new.is_admin,
            email_verified: new.email_verified,
            created_at: time::OffsetDateTime::now_utc(),
        };
        users.insert(email, record.clone());
        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>> {
        Ok(self.users.read().get(&email.trim().to_lowercase()).cloned())
    }

    async fn find_by_uid(&self, uid: &str) -> anyhow::Result<Option<UserRecord>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.uid == uid)
            .cloned())
    }

    async fn verify(&self, email: &str, password: &str) -> anyhow::Result<bool> {
        match self.find_by_email(email).await? {
            Some(UserRecord {
                password_hash: Some(hash),
                ..
            }) => verify_password(password, &hash),
            _ => Ok(false),
        }
    }

    async fn update_profile(
        &self,
        uid: &str,
        username: Option<&str>,
        full_name: Option<&str>,
    ) -> anyhow::Result<Option<UserRecord>> {
        let mut users = self.users.write();
        let record = users.values_mut().find(|u| u.uid == uid);
        Ok(record.map(|u| {
            if let Some(name) = username {
                u.username = name.to_string();
            }
            if let Some(full) = full_name {
                u.full_name = full.to_string();
            }
            u.clone()
        }))
    }

    async fn mark_email_verified(&self, uid: &str) -> anyhow::Result<()> {
        let mut users = self.users.write();
        if let Some(u) = users.values_mut().find(|u| u.uid == uid) {
            u.email_verified = true;
        }
        Ok(())
    }
}
