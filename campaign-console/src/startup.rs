use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use time::Duration;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::guard::RoutePolicy;
use crate::handlers::{
    app::{health_check, index},
    auth::{login_handler, login_page, logout_handler},
    metrics::metrics,
    pages,
    session::current_session,
};
use crate::middleware::guard::{route_guard, GuardState};
use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(state.session_settings.secure_cookie)
        .with_expiry(Expiry::OnInactivity(Duration::minutes(i64::from(
            state.session_settings.idle_timeout_minutes,
        ))));

    let guard = GuardState::new(
        state.sessions.clone(),
        RoutePolicy::authenticated(),
        state.routes.clone(),
    )
    .with_outcome_counter(state.metrics.guard_outcomes.clone());
    let admin_guard = guard.with_policy(RoutePolicy::admin_only());

    let staff_routes = Router::new()
        .route("/dashboard", get(pages::dashboard))
        .route("/campaigns", get(pages::campaigns))
        .route_layer(from_fn_with_state(guard, route_guard));

    let admin_routes = Router::new()
        .route("/settings/panels", get(pages::panels))
        .route("/settings/panel-users", get(pages::panel_users))
        .route("/settings/panel3-credentials", get(pages::panel3_credentials))
        .route("/settings/sms-api", get(pages::sms_api_settings))
        .route("/team-members", get(pages::team_members))
        .route_layer(from_fn_with_state(admin_guard, route_guard));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/session", get(current_session))
        .route("/login", get(login_page).post(login_handler))
        .route("/logout", post(logout_handler))
        .merge(staff_routes)
        .merge(admin_routes)
        .nest_service("/static", ServeDir::new(concat!(env!("CARGO_MANIFEST_DIR"), "/static")))
        .layer(session_layer)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn_with_state(state.metrics.http.clone(), metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
