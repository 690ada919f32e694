use std::net::SocketAddr;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{csrf, gate, rate_limit, session_layer};
use crate::state::AppState;
use crate::{auth, dashboard, payments};

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn role_view(path: &str, handler: axum::routing::MethodRouter<AppState>) -> Router<AppState> {
    Router::new()
        .route(path, handler)
        .route_layer(from_fn(gate::require_session))
}

/// Assembles the router. Guard ordering on mutating routes is rate limit,
/// then CSRF, then session requirement, then role checks; `route_layer`
/// wraps outermost-last, so the calls below read innermost first. Session
/// resolution is scoped to the routes that use sessions, so `/health` and
/// the webhook never mint one.
pub fn build_app(state: AppState) -> Router {
    let public = Router::new().route("/health", get(health));

    let csrf_issue = Router::new()
        .route("/csrf", get(auth::handlers::csrf_token))
        .route_layer(from_fn_with_state(state.clone(), session_layer::resolve));

    // Pre-login mutations: CSRF inside, rate limit outside.
    let auth_mutations = Router::new()
        .route("/register", post(auth::handlers::register))
        .route("/login", post(auth::handlers::login))
        .route("/password/reset", post(auth::handlers::password_reset))
        .route_layer(from_fn(csrf::guard))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::guard))
        .route_layer(from_fn_with_state(state.clone(), session_layer::resolve));

    // Signed-in surface. CSRF runs before the session gate so a missing
    // token on a mutation is rejected rather than redirected; it is a no-op
    // on GETs, so one guard covers both methods.
    let account = Router::new()
        .route("/logout", get(auth::handlers::logout))
        .route("/dashboard", get(dashboard::dispatch))
        .route(
            "/profile",
            get(auth::handlers::profile).post(auth::handlers::profile_edit),
        )
        .route("/payment/history", get(payments::handlers::history))
        .route_layer(from_fn(gate::require_session))
        .route_layer(from_fn(csrf::guard))
        .route_layer(from_fn_with_state(state.clone(), session_layer::resolve));

    let dashboards = Router::new()
        .merge(role_view(
            "/dashboard/buyer",
            get(dashboard::buyer).route_layer(from_fn(gate::require_buyer)),
        ))
        .merge(role_view(
            "/dashboard/creator",
            get(dashboard::creator).route_layer(from_fn(gate::require_creator)),
        ))
        .merge(role_view(
            "/dashboard/promoter",
            get(dashboard::promoter).route_layer(from_fn(gate::require_promoter)),
        ))
        .merge(role_view(
            "/dashboard/admin",
            get(dashboard::admin).route_layer(from_fn(gate::require_admin)),
        ))
        .route_layer(from_fn_with_state(state.clone(), session_layer::resolve));

    let payment_create = Router::new()
        .route("/payment/create", post(payments::handlers::create))
        .route_layer(from_fn(gate::require_session))
        .route_layer(from_fn(csrf::guard))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::guard))
        .route_layer(from_fn_with_state(state.clone(), session_layer::resolve));

    // Authenticated by HMAC signature, never by session, so it sits outside
    // the session and CSRF guards.
    let webhook = Router::new().route("/payment/webhook", post(payments::handlers::webhook));

    Router::new()
        .merge(public)
        .merge(csrf_issue)
        .merge(auth_mutations)
        .merge(account)
        .merge(dashboards)
        .merge(payment_create)
        .merge(webhook)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
