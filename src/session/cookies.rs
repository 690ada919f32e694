use axum::http::HeaderMap;

/// Pull the session token out of the `Cookie` header, if any.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    for cookie in raw.split(';') {
        if let Some((name, value)) = cookie.trim().split_once('=') {
            if name == cookie_name {
                return Some(value.to_string());
            }
        }
    }
    None
}

pub fn build(cookie_name: &str, token: &str) -> String {
    format!("{cookie_name}={token}; Path=/; HttpOnly; SameSite=Lax")
}

/// Expired cookie, used on logout.
pub fn clear(cookie_name: &str) -> String {
    format!("{cookie_name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
