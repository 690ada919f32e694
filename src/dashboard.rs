//! Role-dispatched dashboards. `/dashboard` re-validates the session user
//! against the credential store and bounces to the role-specific view; the
//! per-role routes sit behind the role gates.

use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    Extension, Json,
};
use serde_json::json;
use tracing::{instrument, warn};

use crate::auth::repo_types::Role;
use crate::error::ApiError;
use crate::middleware::gate::LOGIN_REDIRECT;
use crate::session::{cookies, Session, SessionUser};
use crate::state::AppState;

pub fn role_path(role: Role) -> &'static str {
    match role {
        Role::Buyer => "/dashboard/buyer",
        Role::Creator => "/dashboard/creator",
        Role::Promoter => "/dashboard/promoter",
        Role::Admin => "/dashboard/admin",
    }
}

#[instrument(skip(state, session, user))]
pub async fn dispatch(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(user): Extension<SessionUser>,
) -> Result<Response, ApiError> {
    // Stale sessions (deleted account) drop back to login.
    match state.users.find_by_uid(&user.uid).await? {
        Some(record) => Ok(Redirect::to(role_path(record.role)).into_response()),
        None => {
            warn!(uid = %user.uid, "session user no longer exists; invalidating session");
            state.sessions.destroy(&session.token).await;
            let cookie = cookies::clear(&state.config.session_cookie_name);
            Ok((
                AppendHeaders([(SET_COOKIE, cookie)]),
                Redirect::to(LOGIN_REDIRECT),
            )
                .into_response())
        }
    }
}

fn view(section: &str, user: &SessionUser) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "dashboard": section,
        "user": {
            "uid": user.uid,
            "email": user.email,
            "role": user.role.as_str(),
            "is_admin": user.is_admin,
        },
    }))
}

pub async fn buyer(Extension(user): Extension<SessionUser>) -> impl IntoResponse {
    view("buyer", &user)
}

pub async fn creator(Extension(user): Extension<SessionUser>) -> impl IntoResponse {
    view("creator", &user)
}

pub async fn promoter(Extension(user): Extension<SessionUser>) -> impl IntoResponse {
    view("promoter", &user)
}

pub async fn admin(Extension(user): Extension<SessionUser>) -> impl IntoResponse {
    view("admin", &user)
}
