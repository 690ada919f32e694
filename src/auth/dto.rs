use serde::{Deserialize, Serialize};

use crate::auth::repo_types::{Role, UserRecord};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileEditRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub uid: String,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub is_admin: bool,
    pub email_verified: bool,
}

impl From<&UserRecord> for PublicUser {
    fn from(record: &UserRecord) -> Self {
        Self {
            uid: record.uid.clone(),
            email: record.email.clone(),
            username: record.username.clone(),
            full_name: record.full_name.clone(),
            role: record.role,
            is_admin: record.is_admin,
            email_verified: record.email_verified,
        }
    }
}

/// Response returned after login; the rotated CSRF token comes along so the
/// client can keep issuing mutating requests.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub ok: bool,
    pub user: PublicUser,
    pub csrf_token: String,
}

#[derive(Debug, Serialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn public_user_never_serializes_password_material() {
        let record = UserRecord {
            uid: "u1".into(),
            email: "a@b.com".into(),
            password_hash: Some("argon2-hash".into()),
            username: "a".into(),
            full_name: "A B".into(),
            role: Role::Buyer,
            is_admin: false,
            email_verified: false,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&PublicUser::from(&record)).unwrap();
        assert!(json.contains("a@b.com"));
        assert!(json.contains(r#""role":"buyer""#));
        assert!(!json.contains("argon2-hash"));
        assert!(!json.contains("password"));
    }
}
