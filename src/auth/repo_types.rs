use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Account roles. `Admin` passes every role gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Creator,
    Promoter,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Creator => "creator",
            Role::Promoter => "promoter",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "buyer" => Some(Role::Buyer),
            "creator" => Some(Role::Creator),
            "promoter" => Some(Role::Promoter),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Buyer
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Role::parse(&value).ok_or_else(|| format!("unknown role: {value}"))
    }
}

/// User record as persisted in the credential store.
///
/// `password_hash` is only present for locally-authenticated accounts; records
/// mirrored from the remote identity provider carry `None` and can never be
/// verified locally.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub uid: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub username: String,
    pub full_name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_admin: bool,
    pub email_verified: bool,
    pub created_at: OffsetDateTime,
}

/// Fields required to create a user record.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uid: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub is_admin: bool,
    pub email_verified: bool,
}

impl NewUser {
    /// Minimal record for an account that only exists remotely, used when a
    /// remote login has no local counterpart yet.
    pub fn materialized(uid: &str, email: &str) -> Self {
        Self {
            uid: uid.to_string(),
            email: email.to_string(),
            password_hash: None,
            username: email.split('@').next().unwrap_or(email).to_string(),
            full_name: String::new(),
            role: Role::Buyer,
            is_admin: false,
            email_verified: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_text() {
        for role in [Role::Buyer, Role::Creator, Role::Promoter, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn materialized_record_defaults_to_buyer() {
        let new = NewUser::materialized("uid-1", "a@b.com");
        assert_eq!(new.role, Role::Buyer);
        assert_eq!(new.username, "a");
        assert!(new.password_hash.is_none());
        assert!(!new.is_admin);
    }
}
