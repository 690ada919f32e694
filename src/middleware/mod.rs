//! Request guards: session resolution, CSRF, rate limiting and the
//! session/role gates. Ordering contract: rate-limit and CSRF run before the
//! session gate, which runs before any role check.

pub mod csrf;
pub mod gate;
pub mod rate_limit;
pub mod session_layer;
