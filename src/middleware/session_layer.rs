use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::session::{cookies, Session};
use crate::state::AppState;

/// Resolves the server-side session for every request and stashes it in the
/// request extensions. A request without a (known) session cookie gets a
/// fresh anonymous session and the cookie is set on the way out.
///
/// This runs before the CSRF guard, which needs the session's token, and is
/// a plain in-memory lookup so it stays cheap.
pub async fn resolve(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let cookie_name = state.config.session_cookie_name.clone();
    let existing = cookies::session_token(req.headers(), &cookie_name);

    let mut fresh = false;
    let session = match existing {
        Some(token) => state.sessions.load(&token).await,
        None => None,
    };
    let session = match session {
        Some(s) => s,
        None => {
            fresh = true;
            let s = Session::anonymous();
            debug!("issuing anonymous session");
            state.sessions.save(s.clone()).await;
            s
        }
    };

    let token = session.token.clone();
    req.extensions_mut().insert(session);

    let mut res = next.run(req).await;
    if fresh {
        if let Ok(value) = HeaderValue::from_str(&cookies::build(&cookie_name, &token)) {
            res.headers_mut().append(SET_COOKIE, value);
        }
    }
    res
}
