pub mod cookies;
pub mod store;

use time::OffsetDateTime;

use crate::auth::repo_types::{Role, UserRecord};

/// Sessions past this age are treated as gone.
pub const SESSION_TTL: time::Duration = time::Duration::hours(24);

/// Authenticated identity attached to a session.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub uid: String,
    pub email: String,
    pub role: Role,
    pub is_admin: bool,
}

impl From<&UserRecord> for SessionUser {
    fn from(record: &UserRecord) -> Self {
        Self {
            uid: record.uid.clone(),
            email: record.email.clone(),
            role: record.role,
            is_admin: record.is_admin,
        }
    }
}

/// Server-side session record, keyed by an opaque random token carried in an
/// HttpOnly cookie. A session starts anonymous (carrying only the CSRF
/// token) and becomes active when a user is attached at login.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub csrf_token: String,
    pub issued_at: OffsetDateTime,
    pub user: Option<SessionUser>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            token: store::generate_token(),
            csrf_token: store::generate_token(),
            issued_at: OffsetDateTime::now_utc(),
            user: None,
        }
    }

    /// Fresh session for a just-authenticated user. A new token pair is
    /// minted so login always rotates the session.
    pub fn for_user(record: &UserRecord) -> Self {
        Self {
            token: store::generate_token(),
            csrf_token: store::generate_token(),
            issued_at: OffsetDateTime::now_utc(),
            user: Some(SessionUser::from(record)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now - self.issued_at >= SESSION_TTL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_sessions_have_csrf_but_no_user() {
        let s = Session::anonymous();
        assert!(!s.is_active());
        assert!(!s.csrf_token.is_empty());
    }

    #[test]
    fn login_rotates_both_tokens() {
        let record = UserRecord {
            uid: "u1".into(),
            email: "a@b.com".into(),
            password_hash: None,
            username: "a".into(),
            full_name: String::new(),
            role: Role::Buyer,
            is_admin: false,
            email_verified: true,
            created_at: OffsetDateTime::now_utc(),
        };
        let before = Session::anonymous();
        let after = Session::for_user(&record);
        assert!(after.is_active());
        assert_ne!(before.token, after.token);
        assert_ne!(before.csrf_token, after.csrf_token);
    }

    #[test]
    fn sessions_expire_after_the_ttl() {
        let s = Session::anonymous();
        let now = OffsetDateTime::now_utc();
        assert!(!s.is_expired(now));
        assert!(s.is_expired(now + SESSION_TTL));
    }
}
