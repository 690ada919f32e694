use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use crate::auth::repo_types::Role;
use crate::session::{Session, SessionUser};

pub const LOGIN_REDIRECT: &str = "/login?notice=login_required";
const ROLE_REDIRECT: &str = "/dashboard";

/// Requires an active (authenticated) session; otherwise redirects to the
/// login entry point with a notice. On success the `SessionUser` is added
/// to the request extensions for handlers and role gates downstream.
pub async fn require_session(mut req: Request, next: Next) -> Response {
    let user = req
        .extensions()
        .get::<Session>()
        .and_then(|s| s.user.clone());
    match user {
        Some(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        None => {
            debug!(path = %req.uri().path(), "no active session");
            Redirect::to(LOGIN_REDIRECT).into_response()
        }
    }
}

/// Role gates compose after `require_session`. A mismatch redirects to the
/// dashboard landing page instead of erroring, so restricted areas aren't
/// advertised. Admins pass every gate.
async fn require_any(req: Request, next: Next, allowed: &[Role]) -> Response {
    match req.extensions().get::<SessionUser>() {
        Some(user) if user.is_admin || user.role == Role::Admin || allowed.contains(&user.role) => {
            next.run(req).await
        }
        Some(user) => {
            debug!(uid = %user.uid, role = user.role.as_str(), "role mismatch");
            Redirect::to(ROLE_REDIRECT).into_response()
        }
        None => Redirect::to(LOGIN_REDIRECT).into_response(),
    }
}

pub async fn require_buyer(req: Request, next: Next) -> Response {
    require_any(req, next, &[Role::Buyer]).await
}

pub async fn require_creator(req: Request, next: Next) -> Response {
    require_any(req, next, &[Role::Creator]).await
}

pub async fn require_promoter(req: Request, next: Next) -> Response {
    require_any(req, next, &[Role::Promoter]).await
}

pub async fn require_admin(req: Request, next: Next) -> Response {
    require_any(req, next, &[]).await
}
