use axum::{
    extract::State,
    http::{header::SET_COOKIE, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    Extension, Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::auth::dto::{
    AuthResponse, CsrfResponse, LoginRequest, PasswordResetRequest, ProfileEditRequest,
    PublicUser, RegisterRequest,
};
use crate::auth::fallback::{is_valid_email, NewProfile};
use crate::error::ApiError;
use crate::middleware::gate::LOGIN_REDIRECT;
use crate::session::{cookies, Session, SessionUser};
use crate::state::AppState;

/// Hands out the session-bound CSRF token; the session cookie itself is set
/// by the session middleware on the way out.
pub async fn csrf_token(Extension(session): Extension<Session>) -> Json<CsrfResponse> {
    Json(CsrfResponse {
        csrf_token: session.csrf_token,
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let user = state
        .authenticator
        .register(
            &payload.email,
            &payload.password,
            NewProfile {
                username: payload.username,
                full_name: payload.full_name,
            },
        )
        .await?;

    info!(uid = %user.uid, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "user": PublicUser::from(&user) })),
    ))
}

/// Login rotates the session: the anonymous session (and its CSRF token)
/// is destroyed and a fresh active one is issued.
#[instrument(skip(state, session, payload))]
pub async fn login(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let user = state
        .authenticator
        .login(&payload.email, &payload.password)
        .await?;

    state.sessions.destroy(&session.token).await;
    let fresh = Session::for_user(&user);
    state.sessions.save(fresh.clone()).await;
    info!(uid = %user.uid, "user logged in");

    let cookie = cookies::build(&state.config.session_cookie_name, &fresh.token);
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(AuthResponse {
            ok: true,
            user: PublicUser::from(&user),
            csrf_token: fresh.csrf_token,
        }),
    )
        .into_response())
}

#[instrument(skip(state, session))]
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Response {
    state.sessions.destroy(&session.token).await;
    let cookie = cookies::clear(&state.config.session_cookie_name);
    (AppendHeaders([(SET_COOKIE, cookie)]), Redirect::to("/login")).into_response()
}

/// Fire-and-forget reset mail. Always answers 202 so the response cannot be
/// used to probe which emails exist.
#[instrument(skip(state, payload))]
pub async fn password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let email = payload.email.trim().to_lowercase();
    if is_valid_email(&email) {
        if let Err(e) = state.identity.send_password_reset(&email).await {
            warn!(error = %e, "password reset request failed");
        }
    }
    (StatusCode::ACCEPTED, Json(json!({ "ok": true })))
}

/// Re-validates the session against the credential store; a deleted account
/// invalidates the session instead of serving stale data.
#[instrument(skip(state, session, user))]
pub async fn profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(user): Extension<SessionUser>,
) -> Result<Response, ApiError> {
    match state.users.find_by_uid(&user.uid).await? {
        Some(record) => Ok(Json(PublicUser::from(&record)).into_response()),
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

fn valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.-]{1,32}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

#[instrument(skip(state, payload))]
pub async fn profile_edit(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Json(payload): Json<ProfileEditRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let username = payload.username.as_deref().map(str::trim);
    if let Some(name) = username {
        if !valid_username(name) {
            return Err(ApiError::Validation(
                "username must be 1-32 chars of letters, digits, '_', '.' or '-'".into(),
            ));
        }
    }
    let full_name = payload.full_name.as_deref().map(str::trim);
    if let Some(full) = full_name {
        if full.len() > 128 {
            return Err(ApiError::Validation("full name too long".into()));
        }
    }

    match state.users.update_profile(&user.uid, username, full_name).await? {
        Some(record) => Ok(Json(json!({ "ok": true, "user": PublicUser::from(&record) }))),
        None => Err(ApiError::Validation("account not found".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_validation() {
        assert!(valid_username("jugador_01"));
        assert!(valid_username("a.b-c"));
        assert!(!valid_username(""));
        assert!(!valid_username("has space"));
        assert!(!valid_username("<script>"));
        assert!(!valid_username(&"x".repeat(33)));
    }
}
